//! Deterministic consistency checking of the engine structures.
//!
//! The engines never check their own invariants on the hot path; this module
//! recomputes everything from first principles so debug builds and tests can
//! compare. [`check_consistency`] is the oracle behind the solver's
//! per-step debug assertion, and [`check_run_state`] backs the binary's
//! `--check` mode.

use crate::decomp::Decomposition;
use crate::multimap::SlotMultimap;
use crate::statefile::RunState;
use std::collections::{HashMap, HashSet};
use std::fmt;

// ============================================================================
// Errors
// ============================================================================

/// A violated engine invariant, with enough context to debug it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsistencyError {
    /// The index stores a different number of slots for a value than the
    /// component array holds.
    MultiplicityMismatch {
        /// The component value.
        value: u64,
        /// Occurrences in the component array.
        expected: usize,
        /// Occurrences recorded by the index.
        got: usize,
    },
    /// The index lists the right number of slots for a value, but not the
    /// right ones.
    SlotSetMismatch {
        /// The component value.
        value: u64,
    },
    /// The index tracks a different number of distinct values than the
    /// component array holds.
    DistinctCountMismatch {
        /// Distinct nonzero values in the array.
        expected: usize,
        /// Distinct values tracked by the index.
        got: usize,
    },
    /// The colliding list length disagrees with the number of values of
    /// multiplicity two or more.
    CollidingCountMismatch {
        /// Values with multiplicity >= 2 in the array.
        expected: usize,
        /// Length of the colliding list.
        got: usize,
    },
    /// A value appears in the colliding list more than once.
    DuplicateColliding {
        /// The duplicated value.
        value: u64,
    },
    /// A value sits in the colliding list despite multiplicity below two.
    NotColliding {
        /// The listed value.
        value: u64,
        /// Its actual multiplicity.
        multiplicity: usize,
    },
    /// A term mixes zero and nonzero slots.
    TornTerm {
        /// Index of the offending term.
        term: usize,
    },
    /// The tracked live count differs from the number of nonzero slots.
    LiveCountMismatch {
        /// Nonzero slots in the array.
        expected: usize,
        /// The tracked count.
        got: usize,
    },
    /// The orbit filter gives the wrong answer for a slot pair.
    PermitMismatch {
        /// Row slot.
        i: usize,
        /// Column slot.
        j: usize,
    },
}

impl fmt::Display for ConsistencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyError::MultiplicityMismatch { value, expected, got } => write!(
                f,
                "value {value:#x} held by {expected} slots but indexed with {got}"
            ),
            ConsistencyError::SlotSetMismatch { value } => {
                write!(f, "index lists the wrong slots for value {value:#x}")
            }
            ConsistencyError::DistinctCountMismatch { expected, got } => write!(
                f,
                "array holds {expected} distinct values, index tracks {got}"
            ),
            ConsistencyError::CollidingCountMismatch { expected, got } => write!(
                f,
                "{expected} values collide but the colliding list holds {got}"
            ),
            ConsistencyError::DuplicateColliding { value } => {
                write!(f, "value {value:#x} listed as colliding more than once")
            }
            ConsistencyError::NotColliding { value, multiplicity } => write!(
                f,
                "value {value:#x} listed as colliding at multiplicity {multiplicity}"
            ),
            ConsistencyError::TornTerm { term } => {
                write!(f, "term {term} mixes zero and nonzero slots")
            }
            ConsistencyError::LiveCountMismatch { expected, got } => {
                write!(f, "{expected} slots are live but the counter says {got}")
            }
            ConsistencyError::PermitMismatch { i, j } => {
                write!(f, "orbit filter wrong for slot pair ({i}, {j})")
            }
        }
    }
}

impl std::error::Error for ConsistencyError {}

// ============================================================================
// Checks
// ============================================================================

/// Verifies every invariant tying the duplicate index to the component
/// array: multiset agreement per value, colliding-list membership exactly at
/// multiplicity >= 2, the all-or-nothing zero pattern of each term, the live
/// counter, and the orbit filter.
///
/// # Errors
/// Returns the first violated invariant found.
pub fn check_consistency(
    decomp: &Decomposition,
    dupes: &SlotMultimap,
    achieved: usize,
) -> Result<(), ConsistencyError> {
    let mut reference: HashMap<u64, Vec<u32>> = HashMap::new();
    let mut live = 0usize;
    for (slot, &value) in decomp.values().iter().enumerate() {
        if value != 0 {
            reference.entry(value).or_default().push(slot as u32);
            live += 1;
        }
    }

    if live != achieved {
        return Err(ConsistencyError::LiveCountMismatch {
            expected: live,
            got: achieved,
        });
    }
    if dupes.distinct_len() != reference.len() {
        return Err(ConsistencyError::DistinctCountMismatch {
            expected: reference.len(),
            got: dupes.distinct_len(),
        });
    }

    for (&value, slots) in &reference {
        let got = dupes.multiplicity(value);
        if got != slots.len() {
            return Err(ConsistencyError::MultiplicityMismatch {
                value,
                expected: slots.len(),
                got,
            });
        }
        let mut indexed = dupes.slots(value).to_vec();
        indexed.sort_unstable();
        let mut expected = slots.clone();
        expected.sort_unstable();
        if indexed != expected {
            return Err(ConsistencyError::SlotSetMismatch { value });
        }
    }

    let colliding_expected = reference.values().filter(|s| s.len() >= 2).count();
    if dupes.colliding().len() != colliding_expected {
        return Err(ConsistencyError::CollidingCountMismatch {
            expected: colliding_expected,
            got: dupes.colliding().len(),
        });
    }
    let mut seen = HashSet::new();
    for &value in dupes.colliding() {
        if !seen.insert(value) {
            return Err(ConsistencyError::DuplicateColliding { value });
        }
        let multiplicity = reference.get(&value).map_or(0, Vec::len);
        if multiplicity < 2 {
            return Err(ConsistencyError::NotColliding { value, multiplicity });
        }
    }

    for (term, chunk) in decomp.values().chunks(3).enumerate() {
        let live_slots = chunk.iter().filter(|&&v| v != 0).count();
        if live_slots != 0 && live_slots != chunk.len() {
            return Err(ConsistencyError::TornTerm { term });
        }
    }

    let n = decomp.len();
    let symm = decomp.symm();
    for i in 0..n {
        for j in 0..n {
            if decomp.permits(i, j) != (i / symm != j / symm) {
                return Err(ConsistencyError::PermitMismatch { i, j });
            }
        }
    }

    Ok(())
}

/// Validates a parsed state file the way the solver would see it: builds the
/// decomposition and its duplicate index, then runs the full consistency
/// check.
///
/// # Errors
/// Returns a message naming the violated structural invariant.
pub fn check_run_state(state: &RunState) -> Result<(), String> {
    let decomp = Decomposition::new(state.muls.clone(), state.header.symm);
    let mut dupes = SlotMultimap::new(decomp.len());
    let mut achieved = 0;
    for s in 0..decomp.len() {
        let v = decomp.value(s);
        if v != 0 {
            dupes.add(v, s);
            achieved += 1;
        }
    }
    check_consistency(&decomp, &dupes, achieved).map_err(|e| e.to_string())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statefile::parse_state;

    fn indexed(muls: &[u64], symm: usize) -> (Decomposition, SlotMultimap, usize) {
        let decomp = Decomposition::new(muls.to_vec(), symm);
        let mut dupes = SlotMultimap::new(decomp.len());
        let mut achieved = 0;
        for s in 0..decomp.len() {
            if decomp.value(s) != 0 {
                dupes.add(decomp.value(s), s);
                achieved += 1;
            }
        }
        (decomp, dupes, achieved)
    }

    #[test]
    fn consistent_state_passes() {
        let (decomp, dupes, achieved) = indexed(&[1, 2, 3, 1, 2, 3, 0, 0, 0], 3);
        check_consistency(&decomp, &dupes, achieved).unwrap();
    }

    #[test]
    fn wrong_live_count_is_reported() {
        let (decomp, dupes, achieved) = indexed(&[1, 2, 3, 4, 5, 6], 3);
        let err = check_consistency(&decomp, &dupes, achieved + 3).unwrap_err();
        assert_eq!(
            err,
            ConsistencyError::LiveCountMismatch {
                expected: 6,
                got: 9
            }
        );
    }

    #[test]
    fn missing_index_entry_is_reported() {
        let (decomp, mut dupes, achieved) = indexed(&[1, 2, 3, 4, 5, 6], 3);
        dupes.remove(4, 3);
        let err = check_consistency(&decomp, &dupes, achieved).unwrap_err();
        assert_eq!(
            err,
            ConsistencyError::DistinctCountMismatch {
                expected: 6,
                got: 5
            }
        );
    }

    #[test]
    fn stale_slot_entry_is_reported() {
        let (decomp, mut dupes, achieved) = indexed(&[1, 2, 3, 4, 5, 6], 3);
        dupes.remove(4, 3);
        dupes.add(4, 0); // right multiplicity, wrong slot
        let err = check_consistency(&decomp, &dupes, achieved).unwrap_err();
        assert_eq!(err, ConsistencyError::SlotSetMismatch { value: 4 });
    }

    #[test]
    fn torn_term_is_reported() {
        let mut decomp = Decomposition::new(vec![1, 2, 3, 4, 5, 6], 3);
        let mut dupes = SlotMultimap::new(6);
        decomp.set(4, 0);
        for s in [0usize, 1, 2, 3, 5] {
            dupes.add(decomp.value(s), s);
        }
        let err = check_consistency(&decomp, &dupes, 5).unwrap_err();
        assert_eq!(err, ConsistencyError::TornTerm { term: 1 });
    }

    #[test]
    fn sub_triples_of_a_sextuple_are_checked_separately() {
        // First triple of the sextuple zeroed, second one live: torn at the
        // sextuple level is fine only if each aligned triple is uniform.
        let (decomp, dupes, achieved) = indexed(&[0, 0, 0, 4, 5, 6, 7, 8, 9, 10, 11, 12], 6);
        check_consistency(&decomp, &dupes, achieved).unwrap();
    }

    #[test]
    fn check_run_state_accepts_a_clean_file() {
        let text = "6 0 0 3 1000 50 0 7 3 6 0 6 0 1 2 3 1 2 3";
        let state = parse_state(text).unwrap();
        check_run_state(&state).unwrap();
    }

    #[test]
    fn check_run_state_rejects_a_torn_file() {
        let text = "6 0 0 3 1000 50 0 7 3 6 0 6 0 1 0 3 4 5 6";
        let state = parse_state(text).unwrap();
        let err = check_run_state(&state).unwrap_err();
        assert!(err.contains("term 0"), "unexpected message: {err}");
    }
}
