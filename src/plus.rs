//! Plus engine: the 2-into-3 term rewrite that re-expands the decomposition.
//!
//! Descending through the flip graph stalls once the remaining collisions
//! stop producing cancellations. On a schedule (or when the flip engine finds
//! itself boxed in) two live terms are rewritten into three, reusing the
//! lowest collapsed term. The rank goes up by one term, but the fresh
//! components open new collision structure for the flips to chew on.

use crate::bits::{popcount_below, term_weight};
use crate::search::{Solver, RECOVERY_INTERVAL};
use rand::RngCore;
use std::io;

/// Stop code written into recovery snapshots. Indistinguishable from an
/// intermediate-deadline stop on purpose: a run killed between snapshots
/// leaves a file that resumes cleanly.
const RECOVERY_RCODE: i64 = 2;

impl<R: RngCore> Solver<R> {
    /// Recomputes the budget point of the next plus move.
    ///
    /// At or above the `maxplus` ceiling the move is pushed beyond any
    /// reachable budget. A negative `plimit` draws the gap uniformly from
    /// `[symm, symm + 2*|plimit| - 1]`; a non-negative one is a fixed gap.
    pub(crate) fn reschedule_plus(&mut self) {
        self.plusby = if self.achieved >= self.params.maxplus {
            self.params.flimit.saturating_mul(1007)
        } else if self.params.plimit < 0 {
            let window = 2 * self.params.plimit.unsigned_abs();
            self.flips + self.params.symm as u64 + u64::from(self.rng.next_u32()) % window
        } else {
            self.flips + self.params.plimit as u64
        };
    }

    /// Persists the current state if the snapshot cadence came due.
    ///
    /// Called just before a plus move fires, mirroring the schedule the
    /// budget counters are compared against.
    ///
    /// # Errors
    /// Returns an error if the snapshot file cannot be written.
    pub(crate) fn write_recovery_snapshot_if_due(&mut self) -> io::Result<()> {
        if self.flips >= self.recovery {
            self.recovery += RECOVERY_INTERVAL;
            if let Some(path) = &self.snapshot_path {
                let header = self.snapshot_header(RECOVERY_RCODE);
                crate::statefile::write_state(path, &header, self.decomp.values())?;
            }
        }
        Ok(())
    }

    /// One plus move under 3-fold symmetry.
    ///
    /// Samples slot pairs until one satisfies liveness, componentwise
    /// distinctness, the orbit filter, and the size screen, then rewrites
    /// terms `p` and `q` into three terms across `p`, `q`, and the lowest
    /// collapsed slot.
    pub(crate) fn plus_move3(&mut self) {
        let Some(r) = self.decomp.first_free_slot() else {
            // Nothing left to expand into; push the schedule along so the
            // walk is not stuck re-entering this path every step.
            self.reschedule_plus();
            return;
        };
        let (er, fr) = (self.decomp.pred(r), self.decomp.succ(r));
        let n = self.decomp.len();

        loop {
            let p = self.rng.next_u32() as usize % n;
            let q = self.rng.next_u32() as usize % n;

            let d = &self.decomp;
            let pd = d.value(p);
            let qd = d.value(q);
            let (ep, fp) = (d.pred(p), d.succ(p));
            let (eq, fq) = (d.pred(q), d.succ(q));
            let pe = d.value(ep);
            let pf = d.value(fp);
            let qe = d.value(eq);
            let qf = d.value(fq);

            if pd == 0 || qd == 0 {
                continue;
            }
            if pd == qd || pe == qe || pf == qf {
                continue;
            }
            if !d.permits(p, q) {
                continue;
            }

            let new_pe = pe ^ qe;
            let new_qf = pf ^ qf;
            let new_rd = pd ^ qd;
            if !self.expansion_fits(pd, pf, qe, qf, new_pe, new_qf, new_rd) {
                continue;
            }

            self.dupes.remove(pe, ep);
            self.dupes.add(new_pe, ep);
            self.dupes.remove(qd, q);
            self.dupes.add(pd, q);
            self.dupes.remove(qf, fq);
            self.dupes.add(new_qf, fq);
            self.dupes.add(new_rd, r);
            self.dupes.add(qe, er);
            self.dupes.add(qf, fr);

            self.decomp.set(ep, new_pe);
            self.decomp.set(q, pd);
            self.decomp.set(fq, new_qf);
            self.decomp.set(r, new_rd);
            self.decomp.set(er, qe);
            self.decomp.set(fr, qf);
            break;
        }

        self.plus += 3;
        self.achieved += 3;
        self.reschedule_plus();
        self.debug_check();
    }

    /// One plus move under 6-fold symmetry: the rewrite of [`Self::plus_move3`]
    /// applied to the sampled pair and to its twin pair, expanding into the
    /// collapsed sextuple at `r` and `r + 3`.
    pub(crate) fn plus_move6(&mut self) {
        let Some(r) = self.decomp.first_free_slot() else {
            self.reschedule_plus();
            return;
        };
        let rr = r + 3;
        let (er, fr) = (self.decomp.pred(r), self.decomp.succ(r));
        let (err, frr) = (self.decomp.pred(rr), self.decomp.succ(rr));
        let n = self.decomp.len();

        loop {
            let p = self.rng.next_u32() as usize % n;
            let q = self.rng.next_u32() as usize % n;

            let d = &self.decomp;
            let pp = d.twin(p);
            let qq = d.twin(q);
            let pd = d.value(p);
            let qd = d.value(q);
            let ppd = d.value(pp);
            let qqd = d.value(qq);
            let (ep, fp) = (d.pred(p), d.succ(p));
            let (eq, fq) = (d.pred(q), d.succ(q));
            let (epp, fpp) = (d.pred(pp), d.succ(pp));
            let (eqq, fqq) = (d.pred(qq), d.succ(qq));
            let pe = d.value(ep);
            let pf = d.value(fp);
            let qe = d.value(eq);
            let qf = d.value(fq);
            let ppe = d.value(epp);
            let ppf = d.value(fpp);
            let qqe = d.value(eqq);
            let qqf = d.value(fqq);

            if pd == 0 || qd == 0 || ppd == 0 || qqd == 0 {
                continue;
            }
            if pd == qd || pe == qe || pf == qf {
                continue;
            }
            if ppd == qqd || ppe == qqe || ppf == qqf {
                continue;
            }
            if !d.permits(p, q) {
                continue;
            }

            let new_pe = pe ^ qe;
            let new_qf = pf ^ qf;
            let new_rd = pd ^ qd;
            let new_ppe = ppe ^ qqe;
            let new_qqf = ppf ^ qqf;
            let new_rrd = ppd ^ qqd;
            // The size screen inspects the sampled half only; its twin is
            // accepted alongside it.
            if !self.expansion_fits(pd, pf, qe, qf, new_pe, new_qf, new_rd) {
                continue;
            }

            self.dupes.remove(pe, ep);
            self.dupes.add(new_pe, ep);
            self.dupes.remove(qd, q);
            self.dupes.add(pd, q);
            self.dupes.remove(qf, fq);
            self.dupes.add(new_qf, fq);
            self.dupes.add(new_rd, r);
            self.dupes.add(qe, er);
            self.dupes.add(qf, fr);

            self.dupes.remove(ppe, epp);
            self.dupes.add(new_ppe, epp);
            self.dupes.remove(qqd, qq);
            self.dupes.add(ppd, qq);
            self.dupes.remove(qqf, fqq);
            self.dupes.add(new_qqf, fqq);
            self.dupes.add(new_rrd, rr);
            self.dupes.add(qqe, err);
            self.dupes.add(qqf, frr);

            self.decomp.set(ep, new_pe);
            self.decomp.set(q, pd);
            self.decomp.set(fq, new_qf);
            self.decomp.set(r, new_rd);
            self.decomp.set(er, qe);
            self.decomp.set(fr, qf);
            self.decomp.set(epp, new_ppe);
            self.decomp.set(qq, ppd);
            self.decomp.set(fqq, new_qqf);
            self.decomp.set(rr, new_rrd);
            self.decomp.set(err, qqe);
            self.decomp.set(frr, qqf);
            break;
        }

        self.plus += 6;
        self.achieved += 6;
        self.reschedule_plus();
        self.debug_check();
    }

    /// Size screen for the three terms an expansion produces.
    #[inline]
    fn expansion_fits(
        &self,
        pd: u64,
        pf: u64,
        qe: u64,
        qf: u64,
        new_pe: u64,
        new_qf: u64,
        new_rd: u64,
    ) -> bool {
        match self.params.maxsize {
            0 => true,
            cap if cap > 0 => {
                let cap = cap as u64;
                term_weight(pd, new_pe, pf) <= cap
                    && term_weight(pd, qe, new_qf) <= cap
                    && term_weight(new_rd, qe, qf) <= cap
            }
            neg => {
                let exceed = (1 - neg) as u32;
                popcount_below(new_pe, exceed)
                    && popcount_below(new_qf, exceed)
                    && popcount_below(new_rd, exceed)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::Params;
    use crate::test_support::ScriptRng;
    use crate::validate::check_consistency;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    fn params(symm: usize) -> Params {
        Params {
            target: 0,
            flimit: 1_000_000,
            plimit: 1_000_000,
            termination: 0,
            split: 0,
            symm,
            maxplus: 0,
            maxsize: 0,
            rseed: 0,
        }
    }

    // -------------------------------------------------------------------------
    // Rewrite correctness
    // -------------------------------------------------------------------------

    #[test]
    fn expansion_rewrites_two_terms_into_three() {
        // Terms (1,2,4) and (8,16,32), one collapsed term. Forcing the pair
        // p = 0, q = 3 expands into slot 6:
        //   pred(0) <- 4 ^ 32, slot 3 <- 1, succ(3) <- 2 ^ 16,
        //   slot 6 <- 1 ^ 8, pred(6) <- 32, succ(6) <- 16.
        let mut cfg = params(3);
        cfg.maxplus = 9;
        let muls = vec![1, 2, 4, 8, 16, 32, 0, 0, 0];
        let mut solver = Solver::new(cfg, muls, 0, ScriptRng::new(&[0, 3]));
        assert_eq!(solver.achieved(), 6);

        solver.plus_move3();

        assert_eq!(
            solver.decomposition().values(),
            &[1, 2, 36, 1, 18, 32, 9, 16, 32]
        );
        assert_eq!(solver.achieved(), 9);
        assert_eq!(solver.plus_moves(), 3);
        check_consistency(solver.decomposition(), solver.duplicates(), solver.achieved()).unwrap();
    }

    #[test]
    fn expansion_rejects_degenerate_pairs() {
        // The first three sampled pairs are rejected (dead slot, duplicate
        // d-component, same orbit); only the fourth fires.
        let mut cfg = params(3);
        cfg.maxplus = 12;
        let muls = vec![1, 2, 4, 1, 16, 32, 0, 0, 0, 64, 128, 256];
        let words = [
            6, 0, // p dead
            0, 3, // d-components equal (1 == 1)
            0, 1, // same orbit
            0, 9, // accepted
        ];
        let mut solver = Solver::new(cfg, muls, 0, ScriptRng::new(&words));

        solver.plus_move3();

        assert_eq!(solver.achieved(), 12);
        assert_eq!(solver.decomposition().value(3), 1); // untouched term
        check_consistency(solver.decomposition(), solver.duplicates(), solver.achieved()).unwrap();
    }

    #[test]
    fn expansion_without_free_term_only_reschedules() {
        let mut cfg = params(3);
        cfg.maxplus = 9;
        cfg.plimit = 77;
        let mut solver = Solver::new(
            cfg,
            vec![1, 2, 4, 8, 16, 32],
            0,
            XorShiftRng::seed_from_u64(5),
        );
        let values_before = solver.decomposition().values().to_vec();

        solver.plus_move3();

        assert_eq!(solver.decomposition().values(), values_before.as_slice());
        assert_eq!(solver.plus_moves(), 0);
        assert_eq!(solver.achieved(), 6);
        assert_eq!(solver.plusby, 77);
    }

    #[test]
    fn sextuple_expansion_rewrites_both_halves() {
        let mut cfg = params(6);
        cfg.maxplus = 18;
        // One live sextuple of distinct components, one collapsed sextuple.
        let muls = vec![
            1, 2, 4, 8, 16, 32, // live
            1 << 10, 1 << 11, 1 << 12, 1 << 13, 1 << 14, 1 << 15, // live
            0, 0, 0, 0, 0, 0, // collapsed
        ];
        // p = 0 (twin 3), q = 6 (twin 9); r = 12, rr = 15.
        let mut solver = Solver::new(cfg, muls, 0, ScriptRng::new(&[0, 6]));

        solver.plus_move6();

        assert_eq!(solver.achieved(), 18);
        assert_eq!(solver.plus_moves(), 6);
        let v = solver.decomposition().values();
        // Sampled half: pred(0) <- 4 ^ (1<<12), slot 6 <- 1,
        // succ(6) <- 2 ^ (1<<11), slot 12 <- 1 ^ (1<<10),
        // pred(12) = 14 <- 1<<12, succ(12) = 13 <- 1<<11.
        assert_eq!(v[2], 4 | 1 << 12);
        assert_eq!(v[6], 1);
        assert_eq!(v[7], 2 | 1 << 11);
        assert_eq!(v[12], 1 | 1 << 10);
        assert_eq!(v[14], 1 << 12);
        assert_eq!(v[13], 1 << 11);
        // Twin half: pred(3) <- 32 ^ (1<<15), slot 9 <- 8,
        // succ(9) <- 16 ^ (1<<14), slot 15 <- 8 ^ (1<<13),
        // pred(15) = 17 <- 1<<15, succ(15) = 16 <- 1<<14.
        assert_eq!(v[5], 32 | 1 << 15);
        assert_eq!(v[9], 8);
        assert_eq!(v[10], 16 | 1 << 14);
        assert_eq!(v[15], 8 | 1 << 13);
        assert_eq!(v[17], 1 << 15);
        assert_eq!(v[16], 1 << 14);
        check_consistency(solver.decomposition(), solver.duplicates(), solver.achieved()).unwrap();
    }

    // -------------------------------------------------------------------------
    // Scheduling
    // -------------------------------------------------------------------------

    #[test]
    fn negative_plimit_draws_a_bounded_uniform_window() {
        let mut cfg = params(3);
        cfg.maxplus = 100;
        cfg.plimit = -10;
        let mut solver = Solver::new(
            cfg,
            vec![1, 2, 3, 4, 5, 6],
            0,
            XorShiftRng::seed_from_u64(0x9A2B),
        );
        solver.flips = 1_000;

        let mut seen_low = u64::MAX;
        let mut seen_high = 0;
        for _ in 0..500 {
            solver.reschedule_plus();
            let gap = solver.plusby - solver.flips;
            assert!((3..=22).contains(&gap), "gap {gap} outside the window");
            seen_low = seen_low.min(gap);
            seen_high = seen_high.max(gap);
        }
        assert_eq!(seen_low, 3);
        assert_eq!(seen_high, 22);
    }

    #[test]
    fn plus_ceiling_suspends_the_schedule() {
        let mut cfg = params(3);
        cfg.maxplus = 6;
        cfg.flimit = 1_000;
        let mut solver = Solver::new(
            cfg,
            vec![1, 2, 3, 4, 5, 6],
            0,
            XorShiftRng::seed_from_u64(2),
        );
        solver.reschedule_plus();
        assert_eq!(solver.plusby, 1_000 * 1007);
    }

    #[test]
    fn fixed_plimit_schedules_a_constant_gap() {
        let mut cfg = params(3);
        cfg.maxplus = 100;
        cfg.plimit = 240;
        let mut solver = Solver::new(
            cfg,
            vec![1, 2, 3, 4, 5, 6],
            0,
            XorShiftRng::seed_from_u64(2),
        );
        solver.flips = 60;
        solver.reschedule_plus();
        assert_eq!(solver.plusby, 300);
    }

    // -------------------------------------------------------------------------
    // Recovery snapshots
    // -------------------------------------------------------------------------

    #[test]
    fn recovery_snapshot_fires_on_cadence_and_advances() {
        let path = std::env::temp_dir().join(format!(
            "flipgraph_recovery_test_{}.txt",
            std::process::id()
        ));
        std::fs::remove_file(&path).ok();
        let mut cfg = params(3);
        cfg.rseed = 99;
        let mut solver = Solver::new(
            cfg,
            vec![5, 6, 7, 5, 8, 9],
            0,
            XorShiftRng::seed_from_u64(4),
        );
        solver.set_snapshot_path(&path);

        // Below the cadence: nothing written.
        solver.flips = 4_999_999_999;
        solver.write_recovery_snapshot_if_due().unwrap();
        assert!(!path.exists());
        assert_eq!(solver.recovery, 5_000_000_000);

        // Past it: the state lands on disk with the resumable stop code.
        solver.flips = 5_000_000_010;
        solver.write_recovery_snapshot_if_due().unwrap();
        let written = crate::statefile::read_state(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(solver.recovery, 10_000_000_000);
        assert_eq!(written.header.rcode, 2);
        assert_eq!(written.header.flips, 5_000_000_010);
        assert_eq!(written.header.rseed, 99);
        assert_eq!(written.muls, vec![5, 6, 7, 5, 8, 9]);
    }

    #[test]
    fn recovery_cadence_advances_even_without_a_path() {
        let mut solver = Solver::new(
            params(3),
            vec![1, 2, 3],
            0,
            XorShiftRng::seed_from_u64(4),
        );
        solver.flips = 5_000_000_001;
        solver.write_recovery_snapshot_if_due().unwrap();
        assert_eq!(solver.recovery, 10_000_000_000);
    }
}
