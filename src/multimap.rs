//! Duplicate tracking for component values.
//!
//! The flip engine only ever rewrites pairs of slots that currently hold the
//! same component value, so the whole search hinges on answering two queries
//! in O(1): "which slots hold value `v`?" and "give me a uniformly random
//! value that is held by at least two slots". [`SlotMultimap`] maintains both
//! views incrementally under single-slot insertions and removals, with every
//! byte of backing storage reserved at construction so the hot loop never
//! allocates.

use rand::RngCore;

// ============================================================================
// Fixed-capacity dictionary
// ============================================================================

/// Bucket count of the closed-addressing dictionary. Prime, so component
/// values (which are highly structured bit patterns) spread acceptably under
/// plain modulo hashing.
const BUCKET_COUNT: usize = 65_213;

/// Entries per bucket. A cohort overflow would silently corrupt the table, so
/// insertion asserts the bound in debug builds; 16 is far beyond any observed
/// cohort on real decompositions.
const BUCKET_WIDTH: usize = 16;

/// Closed-addressing hash map from a component value to a small index.
///
/// All operations assume the caller already knows whether the key is present:
/// `insert` requires an absent key, `get`/`set`/`remove` require a present
/// one. The engines uphold this by construction, so there are no error paths
/// (and no branches for them on the hot path).
pub(crate) struct FixedDict {
    counts: Vec<u8>,
    keys: Vec<u64>,
    values: Vec<u32>,
}

impl FixedDict {
    pub(crate) fn new() -> Self {
        Self {
            counts: vec![0; BUCKET_COUNT],
            keys: vec![0; BUCKET_COUNT * BUCKET_WIDTH],
            values: vec![0; BUCKET_COUNT * BUCKET_WIDTH],
        }
    }

    #[inline(always)]
    fn bucket(key: u64) -> usize {
        (key % BUCKET_COUNT as u64) as usize
    }

    #[inline]
    pub(crate) fn contains(&self, key: u64) -> bool {
        let b = Self::bucket(key);
        let base = b * BUCKET_WIDTH;
        let n = self.counts[b] as usize;
        self.keys[base..base + n].contains(&key)
    }

    /// Looks up the value stored for `key`. The key must be present.
    #[inline]
    pub(crate) fn get(&self, key: u64) -> u32 {
        let b = Self::bucket(key);
        let base = b * BUCKET_WIDTH;
        let n = self.counts[b] as usize;
        for i in 0..n {
            if self.keys[base + i] == key {
                return self.values[base + i];
            }
        }
        unreachable!("lookup of absent key {key:#x}");
    }

    /// Inserts a key/value pair. The key must not already be present.
    #[inline]
    pub(crate) fn insert(&mut self, key: u64, value: u32) {
        debug_assert!(!self.contains(key), "duplicate insert of key {key:#x}");
        let b = Self::bucket(key);
        let n = self.counts[b] as usize;
        debug_assert!(n < BUCKET_WIDTH, "bucket cohort overflow");
        let at = b * BUCKET_WIDTH + n;
        self.keys[at] = key;
        self.values[at] = value;
        self.counts[b] = (n + 1) as u8;
    }

    /// Replaces the value stored for `key`. The key must be present.
    #[inline]
    pub(crate) fn set(&mut self, key: u64, value: u32) {
        let b = Self::bucket(key);
        let base = b * BUCKET_WIDTH;
        let n = self.counts[b] as usize;
        for i in 0..n {
            if self.keys[base + i] == key {
                self.values[base + i] = value;
                return;
            }
        }
        unreachable!("replace of absent key {key:#x}");
    }

    /// Removes `key` by swapping the last cohort entry into its place.
    /// The key must be present.
    #[inline]
    pub(crate) fn remove(&mut self, key: u64) {
        let b = Self::bucket(key);
        let base = b * BUCKET_WIDTH;
        let n = self.counts[b] as usize;
        for i in 0..n {
            if self.keys[base + i] == key {
                let last = base + n - 1;
                self.keys[base + i] = self.keys[last];
                self.values[base + i] = self.values[last];
                self.counts[b] = (n - 1) as u8;
                return;
            }
        }
        unreachable!("removal of absent key {key:#x}");
    }

    /// Total number of stored keys. O(buckets); test-only.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.counts.iter().map(|&c| c as usize).sum()
    }
}

// ============================================================================
// SlotMultimap
// ============================================================================

/// Maps every live component value to the multiset of slots holding it, and
/// keeps the values with multiplicity >= 2 in a side list for O(1) uniform
/// sampling.
///
/// Layout: per-value slot lists live in one flat arena of `nomuls`
/// fixed-stride buckets (`[len, slot, slot, ...]`), recycled through a free
/// stack. Two dictionaries index the arena: one over all values, one over the
/// colliding values only, the latter pointing into the dense colliding list
/// so both membership transitions at the 1<->2 multiplicity boundary are
/// swap-with-last and O(1).
pub struct SlotMultimap {
    /// Value -> bucket base offset in `arena`.
    index: FixedDict,
    /// Bucket arena: stride `nomuls + 1`, first cell of a bucket is its length.
    arena: Vec<u32>,
    /// Free bucket bases.
    avail: Vec<u32>,
    /// Value -> position in `colliding`.
    coll_index: FixedDict,
    /// Dense list of values currently held by two or more slots.
    colliding: Vec<u64>,
    stride: usize,
}

impl SlotMultimap {
    /// Creates an empty multimap able to track `nomuls` slots.
    pub fn new(nomuls: usize) -> Self {
        let stride = nomuls + 1;
        Self {
            index: FixedDict::new(),
            arena: vec![0; nomuls * stride],
            avail: (0..nomuls).map(|i| (i * stride) as u32).collect(),
            coll_index: FixedDict::new(),
            colliding: Vec::with_capacity(nomuls),
            stride,
        }
    }

    /// Returns whether any slot currently holds `value`.
    #[inline]
    pub fn contains(&self, value: u64) -> bool {
        self.index.contains(value)
    }

    /// Number of slots currently holding `value` (zero if none).
    #[inline]
    pub fn multiplicity(&self, value: u64) -> usize {
        if self.index.contains(value) {
            self.arena[self.index.get(value) as usize] as usize
        } else {
            0
        }
    }

    /// The slots currently holding `value`, in arbitrary but stable order.
    /// The value must be present.
    #[inline]
    pub fn slots(&self, value: u64) -> &[u32] {
        let base = self.index.get(value) as usize;
        let len = self.arena[base] as usize;
        &self.arena[base + 1..base + 1 + len]
    }

    /// Records that `slot` now holds `value`.
    ///
    /// Zero is the deleted sentinel and must never be inserted; when the
    /// multiplicity crosses 1 -> 2 the value enters the colliding list.
    #[inline]
    pub fn add(&mut self, value: u64, slot: usize) {
        debug_assert!(value != 0, "the zero sentinel must not be tracked");
        if self.index.contains(value) {
            let base = self.index.get(value) as usize;
            let len = self.arena[base] as usize;
            if len == 1 {
                self.coll_index.insert(value, self.colliding.len() as u32);
                self.colliding.push(value);
            }
            self.arena[base + 1 + len] = slot as u32;
            self.arena[base] = (len + 1) as u32;
        } else {
            let base = self
                .avail
                .pop()
                .expect("a free bucket always exists while distinct values <= slot count")
                as usize;
            self.index.insert(value, base as u32);
            self.arena[base] = 1;
            self.arena[base + 1] = slot as u32;
        }
    }

    /// Records that `slot` no longer holds `value`.
    ///
    /// The pair must be present. When the multiplicity crosses 2 -> 1 the
    /// value leaves the colliding list (swap-with-last); when it reaches 0
    /// the value is forgotten and its bucket recycled.
    #[inline]
    pub fn remove(&mut self, value: u64, slot: usize) {
        let base = self.index.get(value) as usize;
        let len = self.arena[base] as usize;
        if len == 2 {
            let at = self.coll_index.get(value) as usize;
            let last = self.colliding[self.colliding.len() - 1];
            self.coll_index.set(last, at as u32);
            self.colliding[at] = last;
            self.colliding.pop();
            self.coll_index.remove(value);
        }
        if len == 1 {
            self.avail.push(base as u32);
            self.index.remove(value);
        } else {
            let list = &mut self.arena[base + 1..base + 1 + len];
            let at = list
                .iter()
                .position(|&s| s as usize == slot)
                .expect("removal of a slot not recorded under this value");
            list[at] = list[len - 1];
            self.arena[base] = (len - 1) as u32;
        }
    }

    /// The values currently held by two or more slots.
    #[inline]
    pub fn colliding(&self) -> &[u64] {
        &self.colliding
    }

    /// Returns whether no value is held by two or more slots.
    #[inline]
    pub fn no_collisions(&self) -> bool {
        self.colliding.is_empty()
    }

    /// Picks a colliding value uniformly from one 32-bit random word and
    /// returns it with its slot list. The caller keeps the word, because its
    /// remaining bits also drive the ordered-pair choice within the list.
    ///
    /// Must not be called while [`Self::no_collisions`] holds.
    #[inline]
    pub fn pick_colliding(&self, word: u32) -> (u64, &[u32]) {
        debug_assert!(!self.colliding.is_empty());
        let value = self.colliding[word as usize % self.colliding.len()];
        (value, self.slots(value))
    }

    /// Draws one word from `rng` and picks a colliding value with it.
    ///
    /// Convenience over [`Self::pick_colliding`] for callers that do not need
    /// the raw word back.
    pub fn sample_collision<R: RngCore>(&self, rng: &mut R) -> (u64, &[u32]) {
        self.pick_colliding(rng.next_u32())
    }

    /// Number of distinct values currently tracked.
    pub fn distinct_len(&self) -> usize {
        self.arena.len() / self.stride - self.avail.len()
    }
}

// ============================================================================
// Tests
// ============================================================================
