//! Bit-level helpers for component values.

/// Number of set bits in a component value.
#[inline(always)]
pub const fn popcount(x: u64) -> u32 {
    x.count_ones()
}

/// Returns `true` iff `x` has strictly fewer than `limit` set bits.
///
/// Clears the lowest set bit at most `limit` times, so callers on the hot
/// path pay for the bound rather than a full population count.
#[inline(always)]
pub const fn popcount_below(x: u64, limit: u32) -> bool {
    let mut n = x;
    let mut m = limit;
    while n != 0 && m != 0 {
        m -= 1;
        n &= n - 1;
    }
    m != 0
}

/// Weight of a rank-1 term: the product of its three factor popcounts.
#[inline(always)]
pub const fn term_weight(d: u64, e: u64, f: u64) -> u64 {
    (popcount(d) as u64) * (popcount(e) as u64) * (popcount(f) as u64)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{RngCore, SeedableRng};
    use rand_xorshift::XorShiftRng;

    #[test]
    fn popcount_matches_count_ones() {
        assert_eq!(popcount(0), 0);
        assert_eq!(popcount(1), 1);
        assert_eq!(popcount(0xFFFF_FFFF_FFFF_FFFF), 64);
        assert_eq!(popcount(0b1011_0001), 4);
    }

    #[test]
    fn popcount_below_basic_bounds() {
        assert!(popcount_below(0x7, 4)); // 3 bits < 4
        assert!(!popcount_below(0xF, 4)); // 4 bits, not < 4
        assert!(popcount_below(0, 1));
        assert!(!popcount_below(0, 0));
        assert!(!popcount_below(u64::MAX, 64));
        assert!(popcount_below(u64::MAX >> 1, 64));
    }

    #[test]
    fn popcount_below_agrees_with_full_count() {
        let mut rng = XorShiftRng::seed_from_u64(0xB175);
        for _ in 0..2_000 {
            let x = rng.next_u64();
            for limit in 0..=65u32 {
                assert_eq!(
                    popcount_below(x, limit),
                    x.count_ones() < limit,
                    "mismatch for x={x:#x}, limit={limit}"
                );
            }
        }
    }

    #[test]
    fn term_weight_is_product_of_popcounts() {
        assert_eq!(term_weight(0, 0b11, 0b111), 0);
        assert_eq!(term_weight(1, 1, 1), 1);
        assert_eq!(term_weight(0b11, 0b101, 0b1111), 2 * 2 * 4);
        assert_eq!(term_weight(u64::MAX, u64::MAX, u64::MAX), 64 * 64 * 64);
    }
}
