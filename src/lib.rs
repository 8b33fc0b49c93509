//! # Flip-Graph Rank Search
//!
//! A randomized walk over the flip graph of a bilinear decomposition,
//! searching for shorter (lower-rank) decompositions over GF(2).
//!
//! A decomposition is a flat array of 64-bit components grouped into rank-1
//! terms of three slots. Two terms sharing a component admit a *flip*: a
//! local XOR rewrite that preserves the bilinear form the decomposition
//! computes. When a rewritten component cancels to zero its whole term
//! collapses and the rank drops by one. Scheduled *plus moves* re-expand two
//! terms into three to escape plateaus.
//!
//! This crate provides:
//! - A fixed-capacity multimap tracking duplicate components with O(1)
//!   uniform sampling of colliding values ([`multimap`]).
//! - The flip and plus state-transition engines that keep that index
//!   consistent under every rewrite, including cascade deletions
//!   ([`flip`], [`plus`]).
//! - A deterministic single-threaded search driver with budget policies and
//!   crash-resumable snapshots ([`search`], [`statefile`]).
//!
//! ## Quick Start
//!
//! ```no_run
//! use flipgraph::prelude::*;
//! use rand_mt::Mt;
//!
//! let params = Params {
//!     target: 3,
//!     flimit: 1_000_000,
//!     plimit: 20_000,
//!     termination: 0,
//!     split: 0,
//!     symm: 3,
//!     maxplus: 6,
//!     maxsize: 0,
//!     rseed: 7,
//! };
//! let muls = vec![1, 2, 3, 1, 2, 3];
//! let mut solver = Solver::new(params, muls, 0, Mt::new(7));
//! let stop = solver.run().unwrap();
//! println!("{stop}: best rank {}", solver.minmuls());
//! ```
//!
//! ## Determinism
//!
//! The walk is single-threaded and consults one generator (a Mersenne
//! Twister seeded from the run file) for sampling, plus scheduling, and
//! expansion candidates. Identical input state and seed reproduce the exact
//! sequence of flips, plus moves, and the final outcome.
//!
//! ## Performance Notes
//!
//! - Every structure is allocated at construction; the hot loop performs no
//!   allocation.
//! - Release builds skip all invariant checking; debug builds verify the
//!   full index consistency after every completed step.
//! - For maximum throughput, compile with
//!   `RUSTFLAGS="-C target-cpu=native" cargo build --release`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)] // p/q/pp/qq slot soup is the domain notation
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::inline_always)] // Intentional for hot-path code
#![allow(clippy::many_single_char_names)]

pub mod bits;
pub mod decomp;
pub mod flip;
pub mod multimap;
pub mod plus;
pub mod search;
pub mod statefile;
pub mod validate;

#[cfg(test)]
mod test_support;

/// Re-export of the types a typical embedding needs.
pub mod prelude {
    pub use crate::decomp::Decomposition;
    pub use crate::multimap::SlotMultimap;
    pub use crate::search::{Params, Solver, StopReason};
    pub use crate::statefile::{read_state, write_state, RunState};
    pub use crate::validate::check_run_state;
}
