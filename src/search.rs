//! Search driver: budgets, counters, and the outer flip loop.
//!
//! The solver owns every mutable structure of the walk and advances one flip
//! per [`Solver::step`]. Everything is allocated up front; the loop itself is
//! allocation-free and fully deterministic for a given generator seed.

use crate::decomp::Decomposition;
use crate::flip::OrderedPairs;
use crate::multimap::SlotMultimap;
use crate::statefile::{RunHeader, SnapshotHeader};
use rand::RngCore;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Budget units between recovery snapshots.
pub(crate) const RECOVERY_INTERVAL: u64 = 5_000_000_000;

// ============================================================================
// Parameters
// ============================================================================

/// Immutable knobs of one search run, taken from the state-file header.
#[derive(Clone, Debug)]
pub struct Params {
    /// Live-slot count at which the search succeeds.
    pub target: usize,
    /// Global flip budget.
    pub flimit: u64,
    /// Plus-move schedule: every `plimit` budget units when non-negative;
    /// when negative, a fresh uniform draw from
    /// `[symm, symm + 2*|plimit| - 1]` after every reschedule.
    pub plimit: i64,
    /// Termination policy selector choosing how the flip deadline is
    /// recomputed at each new minimum.
    pub termination: i64,
    /// Percentage of `flimit` granted to the upper phase of a split policy.
    pub split: u64,
    /// Symmetry order (3 or 6); also the budget cost of one flip.
    pub symm: usize,
    /// Live-slot ceiling at or above which plus moves are suspended.
    pub maxplus: usize,
    /// Component-size screening: 0 disables it, a positive value caps the
    /// weight of every rewritten term, a negative value bounds the popcount
    /// of every fresh component below `1 - maxsize`.
    pub maxsize: i64,
    /// Generator seed, echoed into every snapshot so a run can be replayed.
    pub rseed: u32,
}

impl Params {
    /// Extracts the run parameters from a parsed state-file header.
    pub fn from_header(header: &RunHeader) -> Self {
        Self {
            target: header.target,
            flimit: header.flimit,
            plimit: header.plimit,
            termination: header.termination,
            split: header.split,
            symm: header.symm,
            maxplus: header.maxplus,
            maxsize: header.maxsize,
            rseed: header.rseed,
        }
    }
}

// ============================================================================
// Stop reasons
// ============================================================================

/// Why a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The live-slot count dropped to the target.
    TargetReached,
    /// No colliding components remain, so no further flip exists.
    CollisionsExhausted,
    /// The global flip budget was spent.
    FlipLimitReached,
    /// The per-minimum deadline passed before the global budget did.
    SplitLimitReached,
    /// The size screen rejected 1000 consecutive samples.
    SizeRejected,
}

impl StopReason {
    /// The code stored in the state-file header for this outcome.
    pub fn code(self) -> i64 {
        match self {
            StopReason::TargetReached => 0,
            StopReason::CollisionsExhausted => -1,
            StopReason::FlipLimitReached => 1,
            StopReason::SplitLimitReached => 2,
            StopReason::SizeRejected => 6,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            StopReason::TargetReached => "target rank reached",
            StopReason::CollisionsExhausted => "no colliding components remain",
            StopReason::FlipLimitReached => "flip limit reached",
            StopReason::SplitLimitReached => "intermediate deadline reached",
            StopReason::SizeRejected => "size screen rejected 1000 consecutive samples",
        };
        f.write_str(msg)
    }
}

// ============================================================================
// Termination policy
// ============================================================================

/// Computes the flip deadline granted after reaching a new minimum.
///
/// | `termination` | deadline |
/// |---|---|
/// | 0 | the global budget |
/// | 1 | remaining budget split evenly over the ranks left to the target |
/// | 2 | a full budget from now |
/// | t >= 3, above `t` | like 1, against `split`% of the budget and rank `t` |
/// | t >= 3, at or below `t` | like 1 |
///
/// Integer division throughout. Callers guarantee `achieved > target` (and
/// both multiples of `symm`), so every divisor is at least 1.
pub(crate) fn flip_deadline(
    flips: u64,
    termination: i64,
    split: u64,
    achieved: usize,
    target: usize,
    symm: usize,
    flimit: u64,
) -> u64 {
    debug_assert!(achieved > target);
    match termination {
        0 => flimit,
        1 => {
            let steps = ((achieved - target) / symm) as u64;
            debug_assert!(steps > 0);
            flips + flimit.saturating_sub(flips) / steps
        }
        2 => flips + flimit,
        t if t >= 3 => {
            let slimit = split * flimit / 100;
            if achieved as i64 > t {
                let steps = ((achieved - t as usize) / symm) as u64;
                debug_assert!(steps > 0);
                flips + slimit.saturating_sub(flips) / steps
            } else {
                let steps = ((achieved - target) / symm) as u64;
                debug_assert!(steps > 0);
                flips + flimit.saturating_sub(flips) / steps
            }
        }
        _ => flimit,
    }
}

// ============================================================================
// Solver
// ============================================================================

/// All mutable state of one search run.
///
/// Generic over the random generator so tests can drive the walk with
/// scripted or counting generators; production runs use the seeded
/// Mersenne Twister from `rand_mt`.
pub struct Solver<R: RngCore> {
    pub(crate) params: Params,
    pub(crate) rng: R,
    pub(crate) decomp: Decomposition,
    pub(crate) dupes: SlotMultimap,
    pub(crate) pairs: OrderedPairs,
    /// Flip-budget units consumed; each flip costs `symm`.
    pub(crate) flips: u64,
    /// Slots added by plus moves.
    pub(crate) plus: u64,
    /// Live slot count.
    pub(crate) achieved: usize,
    /// Best (lowest) live slot count seen.
    pub(crate) minmuls: usize,
    /// Component array captured at the most recent minimum.
    pub(crate) best: Vec<u64>,
    /// Deadline for reaching the next minimum.
    pub(crate) limit: u64,
    /// Budget point at which the next plus move fires.
    pub(crate) plusby: u64,
    /// Budget point at which the next recovery snapshot is written.
    pub(crate) recovery: u64,
    /// Where recovery snapshots go; `None` disables persistence.
    pub(crate) snapshot_path: Option<PathBuf>,
}

impl<R: RngCore> Solver<R> {
    /// Builds a solver over an initial component array.
    ///
    /// `flips` is nonzero when resuming a snapshotted run. The live count,
    /// duplicate index, and budgets are all derived from the array itself.
    ///
    /// # Panics
    /// Panics if the array length is not a positive multiple of
    /// `params.symm`, or if `params.symm` is not 3 or 6.
    pub fn new(params: Params, muls: Vec<u64>, flips: u64, rng: R) -> Self {
        let decomp = Decomposition::new(muls, params.symm);
        let mut dupes = SlotMultimap::new(decomp.len());
        let mut achieved = 0;
        for s in 0..decomp.len() {
            let v = decomp.value(s);
            if v != 0 {
                dupes.add(v, s);
                achieved += 1;
            }
        }
        let limit = if achieved > params.target {
            flip_deadline(
                flips,
                params.termination,
                params.split,
                achieved,
                params.target,
                params.symm,
                params.flimit,
            )
        } else {
            params.flimit
        };
        let pairs = OrderedPairs::new(decomp.len());
        let best = decomp.values().to_vec();
        let mut solver = Self {
            params,
            rng,
            decomp,
            dupes,
            pairs,
            flips,
            plus: 0,
            achieved,
            minmuls: achieved,
            best,
            limit,
            plusby: 0,
            recovery: RECOVERY_INTERVAL,
            snapshot_path: None,
        };
        solver.reschedule_plus();
        solver
    }

    /// Enables recovery snapshots, written to `path` on the fixed cadence.
    pub fn set_snapshot_path(&mut self, path: impl Into<PathBuf>) {
        self.snapshot_path = Some(path.into());
    }

    /// Performs one flip plus its budget bookkeeping.
    ///
    /// Returns `Ok(Some(_))` when the run is over.
    ///
    /// # Errors
    /// Returns an error if a due recovery snapshot cannot be written.
    pub fn step(&mut self) -> io::Result<Option<StopReason>> {
        self.flips += self.params.symm as u64;

        let stopped = if self.params.symm == 3 {
            self.flip_step3()
        } else {
            self.flip_step6()
        };
        if stopped.is_some() {
            return Ok(stopped);
        }

        if self.flips >= self.plusby {
            self.write_recovery_snapshot_if_due()?;
            if self.params.symm == 3 {
                self.plus_move3();
            } else {
                self.plus_move6();
            }
        }

        if self.flips >= self.limit {
            return Ok(Some(if self.flips >= self.params.flimit {
                StopReason::FlipLimitReached
            } else {
                StopReason::SplitLimitReached
            }));
        }
        Ok(None)
    }

    /// Runs until a stop condition fires.
    ///
    /// # Errors
    /// Returns an error if a due recovery snapshot cannot be written.
    pub fn run(&mut self) -> io::Result<StopReason> {
        loop {
            if let Some(stop) = self.step()? {
                return Ok(stop);
            }
        }
    }

    /// Flip-budget units consumed so far.
    pub fn flips(&self) -> u64 {
        self.flips
    }

    /// Slots added by plus moves so far.
    pub fn plus_moves(&self) -> u64 {
        self.plus
    }

    /// Current live slot count.
    pub fn achieved(&self) -> usize {
        self.achieved
    }

    /// Best live slot count seen during the run.
    pub fn minmuls(&self) -> usize {
        self.minmuls
    }

    /// The decomposition being walked.
    pub fn decomposition(&self) -> &Decomposition {
        &self.decomp
    }

    /// The duplicate index over the decomposition.
    pub fn duplicates(&self) -> &SlotMultimap {
        &self.dupes
    }

    /// The component array to report: the best snapshot if the walk improved
    /// past the current state, otherwise the current array.
    pub fn output_values(&self) -> &[u64] {
        if self.minmuls < self.achieved {
            &self.best
        } else {
            self.decomp.values()
        }
    }

    /// Header for a snapshot of the current state under stop code `rcode`.
    pub fn snapshot_header(&self, rcode: i64) -> SnapshotHeader {
        SnapshotHeader {
            nomuls: self.decomp.len(),
            flips: self.flips,
            rcode,
            target: self.params.target,
            flimit: self.params.flimit,
            plimit: self.params.plimit,
            termination: self.params.termination,
            rseed: self.params.rseed,
            symm: self.params.symm,
            maxplus: self.params.maxplus,
            achieved: self.achieved,
            minmuls: self.minmuls,
            plus: self.plus,
        }
    }

    /// Full consistency check of the engine structures; free in release
    /// builds, a panic naming the violated invariant otherwise.
    #[inline]
    pub(crate) fn debug_check(&self) {
        #[cfg(debug_assertions)]
        if let Err(e) = crate::validate::check_consistency(&self.decomp, &self.dupes, self.achieved)
        {
            panic!("engine invariant violated after a completed step: {e}");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
