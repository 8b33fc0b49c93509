//! Reading and writing the run-state text file.
//!
//! One file is both input and output: a header line of thirteen integers
//! followed by one component value per slot. The file is overwritten with the
//! same shape on completion and at every recovery snapshot, so an interrupted
//! run can be handed straight back in. Tokenization is whitespace-insensitive
//! across lines, matching what upstream tooling emits.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Header fields as they mean on *input*.
///
/// The last three positions are overloaded: a fresh input carries
/// `split minmuls maxsize` there, while a finished or snapshotted run wrote
/// `achieved minmuls plus` into the same positions. All thirteen are read
/// either way; `minmuls` is reinitialized from the live state anyway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunHeader {
    /// Total slot count; a multiple of `symm`.
    pub nomuls: usize,
    /// Flip-budget units already consumed (nonzero when resuming).
    pub flips: u64,
    /// Stop code of the previous run; ignored on input.
    pub rcode: i64,
    /// Live-slot count at which the search succeeds.
    pub target: usize,
    /// Global flip budget.
    pub flimit: u64,
    /// Plus-move schedule: a fixed step when non-negative, a randomized
    /// window when negative.
    pub plimit: i64,
    /// Termination-policy selector.
    pub termination: i64,
    /// Seed for the run's generator.
    pub rseed: u32,
    /// Symmetry order, 3 or 6.
    pub symm: usize,
    /// Live-slot ceiling above which plus moves are suspended.
    pub maxplus: usize,
    /// Percentage of `flimit` granted to the upper phase of a split
    /// termination policy.
    pub split: u64,
    /// Best live-slot count previously seen; recomputed on load.
    pub minmuls: usize,
    /// Component-size screening: off when 0, a term-weight cap when
    /// positive, a popcount bound when negative.
    pub maxsize: i64,
}

/// A parsed run-state file.
#[derive(Clone, Debug)]
pub struct RunState {
    /// The thirteen header integers.
    pub header: RunHeader,
    /// The initial component array, `nomuls` values.
    pub muls: Vec<u64>,
}

/// Header fields as written on *output* (final or recovery snapshot).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotHeader {
    /// Total slot count.
    pub nomuls: usize,
    /// Flip-budget units consumed so far.
    pub flips: u64,
    /// Stop code, or `2` for a mid-run recovery snapshot.
    pub rcode: i64,
    /// Live-slot count at which the search succeeds.
    pub target: usize,
    /// Global flip budget.
    pub flimit: u64,
    /// Plus-move schedule parameter, echoed.
    pub plimit: i64,
    /// Termination-policy selector, echoed.
    pub termination: i64,
    /// Generator seed, echoed.
    pub rseed: u32,
    /// Symmetry order, echoed.
    pub symm: usize,
    /// Plus-move ceiling, echoed.
    pub maxplus: usize,
    /// Current live-slot count.
    pub achieved: usize,
    /// Best live-slot count seen.
    pub minmuls: usize,
    /// Slots added by plus moves so far.
    pub plus: u64,
}

// ============================================================================
// Errors
// ============================================================================

/// Errors encountered while reading a run-state file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateFileError {
    /// I/O failure (file not found, etc.).
    Io(String),
    /// Fewer whitespace-separated integers than the header and component
    /// array require.
    TooFewTokens {
        /// Number of tokens required.
        expected: usize,
        /// Number of tokens found.
        got: usize,
    },
    /// A token failed to parse as an integer of the required signedness.
    InvalidToken {
        /// Zero-based token position in the file.
        index: usize,
        /// The offending token.
        token: String,
    },
    /// The symmetry field is neither 3 nor 6.
    UnsupportedSymmetry {
        /// The value found.
        symm: i64,
    },
    /// The slot count is not a positive multiple of the symmetry.
    MisalignedSlotCount {
        /// The slot count found.
        nomuls: usize,
        /// The symmetry found.
        symm: usize,
    },
}

impl fmt::Display for StateFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateFileError::Io(msg) => write!(f, "I/O error: {msg}"),
            StateFileError::TooFewTokens { expected, got } => {
                write!(f, "state file has {got} integers, expected {expected}")
            }
            StateFileError::InvalidToken { index, token } => {
                write!(f, "invalid integer {token:?} at token {index}")
            }
            StateFileError::UnsupportedSymmetry { symm } => {
                write!(f, "symmetry must be 3 or 6, got {symm}")
            }
            StateFileError::MisalignedSlotCount { nomuls, symm } => {
                write!(
                    f,
                    "slot count {nomuls} is not a positive multiple of symmetry {symm}"
                )
            }
        }
    }
}

impl std::error::Error for StateFileError {}

// ============================================================================
// Reading
// ============================================================================

/// Number of integers on the header line.
pub const HEADER_FIELDS: usize = 13;

/// Reads and parses a run-state file.
///
/// # Errors
/// Returns an error if the file cannot be read or does not contain a valid
/// header plus `nomuls` component values.
pub fn read_state(path: impl AsRef<Path>) -> Result<RunState, StateFileError> {
    let text = fs::read_to_string(path).map_err(|e| StateFileError::Io(e.to_string()))?;
    parse_state(&text)
}

/// Parses run-state text.
///
/// # Errors
/// Returns an error if the text does not contain a valid header plus
/// `nomuls` component values. Trailing tokens are ignored.
pub fn parse_state(text: &str) -> Result<RunState, StateFileError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() < HEADER_FIELDS {
        return Err(StateFileError::TooFewTokens {
            expected: HEADER_FIELDS,
            got: tokens.len(),
        });
    }

    let int = |index: usize| -> Result<i64, StateFileError> {
        tokens[index].parse::<i64>().map_err(|_| StateFileError::InvalidToken {
            index,
            token: tokens[index].to_string(),
        })
    };
    let unsigned = |index: usize| -> Result<u64, StateFileError> {
        tokens[index].parse::<u64>().map_err(|_| StateFileError::InvalidToken {
            index,
            token: tokens[index].to_string(),
        })
    };
    let count = |index: usize| -> Result<usize, StateFileError> {
        Ok(unsigned(index)? as usize)
    };

    let symm_raw = int(8)?;
    if symm_raw != 3 && symm_raw != 6 {
        return Err(StateFileError::UnsupportedSymmetry { symm: symm_raw });
    }
    let symm = symm_raw as usize;

    let header = RunHeader {
        nomuls: count(0)?,
        flips: unsigned(1)?,
        rcode: int(2)?,
        target: count(3)?,
        flimit: unsigned(4)?,
        plimit: int(5)?,
        termination: int(6)?,
        rseed: int(7)? as u32,
        symm,
        maxplus: count(9)?,
        split: unsigned(10)?,
        minmuls: count(11)?,
        maxsize: int(12)?,
    };

    if header.nomuls == 0 || header.nomuls % symm != 0 {
        return Err(StateFileError::MisalignedSlotCount {
            nomuls: header.nomuls,
            symm,
        });
    }

    let expected = HEADER_FIELDS + header.nomuls;
    if tokens.len() < expected {
        return Err(StateFileError::TooFewTokens {
            expected,
            got: tokens.len(),
        });
    }

    let mut muls = Vec::with_capacity(header.nomuls);
    for index in HEADER_FIELDS..expected {
        muls.push(unsigned(index)?);
    }

    Ok(RunState { header, muls })
}

// ============================================================================
// Writing
// ============================================================================

/// Formats a snapshot as run-state text.
pub fn format_state(header: &SnapshotHeader, values: &[u64]) -> String {
    debug_assert_eq!(header.nomuls, values.len());
    let mut out = String::with_capacity(values.len() * 12 + 96);
    out.push_str(&format!(
        "{} {} {} {} {} {} {} {} {} {} {} {} {}\n",
        header.nomuls,
        header.flips,
        header.rcode,
        header.target,
        header.flimit,
        header.plimit,
        header.termination,
        header.rseed,
        header.symm,
        header.maxplus,
        header.achieved,
        header.minmuls,
        header.plus,
    ));
    for &v in values {
        out.push_str(&format!("{v}\n"));
    }
    out
}

/// Overwrites `path` with a snapshot.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_state(
    path: impl AsRef<Path>,
    header: &SnapshotHeader,
    values: &[u64],
) -> io::Result<()> {
    let mut f = fs::File::create(path)?;
    f.write_all(format_state(header, values).as_bytes())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> SnapshotHeader {
        SnapshotHeader {
            nomuls: 6,
            flips: 42,
            rcode: 1,
            target: 3,
            flimit: 1_000_000,
            plimit: -500,
            termination: 1,
            rseed: 12345,
            symm: 3,
            maxplus: 9,
            achieved: 6,
            minmuls: 6,
            plus: 0,
        }
    }

    #[test]
    fn parse_reads_header_and_values() {
        let text = "6 0 0 3 1000000 -500 1 12345 3 9 50 6 -4\n1\n2\n3\n4\n5\n6\n";
        let state = parse_state(text).unwrap();
        assert_eq!(state.header.nomuls, 6);
        assert_eq!(state.header.flips, 0);
        assert_eq!(state.header.target, 3);
        assert_eq!(state.header.flimit, 1_000_000);
        assert_eq!(state.header.plimit, -500);
        assert_eq!(state.header.termination, 1);
        assert_eq!(state.header.rseed, 12345);
        assert_eq!(state.header.symm, 3);
        assert_eq!(state.header.maxplus, 9);
        assert_eq!(state.header.split, 50);
        assert_eq!(state.header.minmuls, 6);
        assert_eq!(state.header.maxsize, -4);
        assert_eq!(state.muls, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn parse_is_whitespace_insensitive() {
        let text = "6 0 0 3 1000000 -500 1 12345 3 9 50 6 -4 1 2 3 4 5 6";
        let state = parse_state(text).unwrap();
        assert_eq!(state.muls.len(), 6);
    }

    #[test]
    fn parse_ignores_trailing_tokens() {
        let text = "3 0 0 0 10 5 0 1 3 3 0 3 0 7 8 9 999";
        let state = parse_state(text).unwrap();
        assert_eq!(state.muls, vec![7, 8, 9]);
    }

    #[test]
    fn parse_rejects_short_header() {
        let err = parse_state("1 2 3").unwrap_err();
        assert!(matches!(err, StateFileError::TooFewTokens { expected: 13, got: 3 }));
    }

    #[test]
    fn parse_rejects_missing_values() {
        let text = "6 0 0 3 1000000 -500 1 12345 3 9 50 6 -4 1 2 3";
        let err = parse_state(text).unwrap_err();
        assert!(matches!(err, StateFileError::TooFewTokens { expected: 19, got: 16 }));
    }

    #[test]
    fn parse_rejects_bad_integer() {
        let text = "6 0 0 3 1000000 -500 1 12345 3 9 50 6 -4 1 2 x 4 5 6";
        let err = parse_state(text).unwrap_err();
        assert_eq!(
            err,
            StateFileError::InvalidToken {
                index: 15,
                token: "x".to_string()
            }
        );
    }

    #[test]
    fn parse_rejects_negative_component() {
        let text = "3 0 0 0 10 5 0 1 3 3 0 3 0 1 -2 3";
        let err = parse_state(text).unwrap_err();
        assert!(matches!(err, StateFileError::InvalidToken { index: 14, .. }));
    }

    #[test]
    fn parse_rejects_unsupported_symmetry() {
        let text = "6 0 0 3 1000000 -500 1 12345 4 9 50 6 -4 1 2 3 4 5 6";
        let err = parse_state(text).unwrap_err();
        assert_eq!(err, StateFileError::UnsupportedSymmetry { symm: 4 });
    }

    #[test]
    fn parse_rejects_misaligned_slot_count() {
        let text = "8 0 0 3 1000000 -500 1 12345 3 9 50 6 -4 1 2 3 4 5 6 7 8";
        let err = parse_state(text).unwrap_err();
        assert_eq!(
            err,
            StateFileError::MisalignedSlotCount { nomuls: 8, symm: 3 }
        );
    }

    #[test]
    fn format_then_parse_round_trips() {
        let header = sample_header();
        let values = [10u64, 20, 30, u64::MAX, 50, 60];
        let text = format_state(&header, &values);

        let state = parse_state(&text).unwrap();
        assert_eq!(state.muls, values);
        assert_eq!(state.header.nomuls, header.nomuls);
        assert_eq!(state.header.flips, header.flips);
        assert_eq!(state.header.rcode, header.rcode);
        assert_eq!(state.header.rseed, header.rseed);
        // Output overloads the last three header positions.
        assert_eq!(state.header.split, header.achieved as u64);
        assert_eq!(state.header.minmuls, header.minmuls);
        assert_eq!(state.header.maxsize, header.plus as i64);
    }

    #[test]
    fn write_and_read_round_trip() {
        let header = sample_header();
        let values = [1u64, 2, 3, 4, 5, 6];
        let path = std::env::temp_dir().join(format!(
            "flipgraph_statefile_roundtrip_{}.txt",
            std::process::id()
        ));

        write_state(&path, &header, &values).unwrap();
        let state = read_state(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(state.muls, values);
        assert_eq!(state.header.flips, 42);
        assert_eq!(state.header.rcode, 1);
    }

    #[test]
    fn read_state_reports_missing_file() {
        let err = read_state("/nonexistent/flipgraph/state.txt").unwrap_err();
        assert!(matches!(err, StateFileError::Io(_)));
    }
}
