//! Decomposition state: the component array and its triple partition.
//!
//! A decomposition is a flat array of 64-bit component values grouped into
//! consecutive rank-1 terms of three slots each. Under the 6-fold symmetry
//! two adjacent terms form one orbit and always move together. The engines
//! treat the values as opaque identifiers; all algebraic meaning lives with
//! whoever produced the input file.

/// Component array plus the read-only partition tables derived from its
/// length and symmetry.
///
/// Representation:
/// - `values[s]` is the component held by slot `s`; `0` marks a deleted slot.
/// - `preds[s]` / `succs[s]` close each term's three slots into a 3-cycle.
/// - `permit` is the row-major orbit filter: `permits(p, q)` is `false` iff
///   `p` and `q` belong to the same symmetry orbit.
pub struct Decomposition {
    values: Vec<u64>,
    preds: Vec<u32>,
    succs: Vec<u32>,
    permit: Vec<bool>,
    symm: usize,
}

impl Decomposition {
    /// Builds the partition tables for a component array.
    ///
    /// # Panics
    /// Panics if `symm` is not 3 or 6, or if the array length is not a
    /// positive multiple of `symm`.
    pub fn new(values: Vec<u64>, symm: usize) -> Self {
        assert!(symm == 3 || symm == 6, "symmetry must be 3 or 6");
        let n = values.len();
        assert!(n > 0 && n % symm == 0, "slot count must be a positive multiple of symm");

        let mut preds = vec![0u32; n];
        let mut succs = vec![0u32; n];
        for base in (0..n).step_by(3) {
            let b = base as u32;
            preds[base] = b + 2;
            succs[base] = b + 1;
            preds[base + 1] = b;
            succs[base + 1] = b + 2;
            preds[base + 2] = b + 1;
            succs[base + 2] = b;
        }

        let mut permit = vec![false; n * n];
        for i in 0..n {
            for j in 0..n {
                permit[i * n + j] = i / symm != j / symm;
            }
        }

        Self {
            values,
            preds,
            succs,
            permit,
            symm,
        }
    }

    /// Number of slots.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns whether the decomposition has no slots. Never true for a
    /// constructed instance; provided for container-API symmetry.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The symmetry order (3 or 6).
    #[inline(always)]
    pub fn symm(&self) -> usize {
        self.symm
    }

    /// The component held by slot `s`.
    #[inline(always)]
    pub fn value(&self, s: usize) -> u64 {
        self.values[s]
    }

    /// Writes slot `s`. Triple-level invariants are the engines' business.
    #[inline(always)]
    pub fn set(&mut self, s: usize, value: u64) {
        self.values[s] = value;
    }

    /// The full component array.
    #[inline(always)]
    pub fn values(&self) -> &[u64] {
        &self.values
    }

    /// The predecessor of `s` in its term's 3-cycle.
    #[inline(always)]
    pub fn pred(&self, s: usize) -> usize {
        self.preds[s] as usize
    }

    /// The successor of `s` in its term's 3-cycle.
    #[inline(always)]
    pub fn succ(&self, s: usize) -> usize {
        self.succs[s] as usize
    }

    /// The slot paired with `s` in the other half of its sextuple.
    /// Meaningful only under 6-fold symmetry.
    #[inline(always)]
    pub fn twin(&self, s: usize) -> usize {
        debug_assert_eq!(self.symm, 6);
        if s % 6 < 3 {
            s + 3
        } else {
            s - 3
        }
    }

    /// The symmetry orbit of slot `s`.
    #[inline(always)]
    pub fn orbit(&self, s: usize) -> usize {
        s / self.symm
    }

    /// Whether a flip between slots `p` and `q` is allowed (they belong to
    /// different orbits).
    #[inline(always)]
    pub fn permits(&self, p: usize, q: usize) -> bool {
        self.permit[p * self.values.len() + q]
    }

    /// Number of live (nonzero) slots.
    pub fn live_count(&self) -> usize {
        self.values.iter().filter(|&&v| v != 0).count()
    }

    /// The lowest deleted slot, if any. Collapsed terms are reclaimed from
    /// here when the decomposition is re-expanded.
    #[inline]
    pub fn first_free_slot(&self) -> Option<usize> {
        self.values.iter().position(|&v| v == 0)
    }
}

// ============================================================================
// Tests
// ============================================================================
