//! Flip engine: one local rewrite per step, plus the cascade bookkeeping.
//!
//! A flip takes two slots `p`, `q` of different orbits that hold the same
//! component, and XORs one partner of `q` into the matching partner of `p`
//! (and vice versa). The bilinear form the decomposition computes is
//! unchanged; what changes is which components collide. When a rewritten
//! component cancels to zero, its whole term collapses and the rank drops.

use crate::bits::{popcount_below, term_weight};
use crate::search::{flip_deadline, Solver, StopReason};
use rand::RngCore;

/// Consecutive sampler rejections tolerated before a size-screened run gives
/// up.
pub(crate) const MAX_SAMPLE_TRIES: usize = 1000;

// ============================================================================
// Ordered-pair tables
// ============================================================================

/// Enumeration of all ordered distinct index pairs over a list of up to
/// `max_len` elements, flattened so one table lookup turns a random word into
/// a pair.
///
/// For a list of length `l` there are `l * (l - 1)` such pairs; `counts[l]`
/// holds that product and `firsts`/`seconds` list the pairs of every length
/// consecutively, so pair `x` of any length is simply entry `x`.
pub(crate) struct OrderedPairs {
    counts: Vec<u32>,
    firsts: Vec<u32>,
    seconds: Vec<u32>,
}

impl OrderedPairs {
    pub(crate) fn new(max_len: usize) -> Self {
        let top = max_len.max(2);
        let mut counts = Vec::with_capacity(top + 1);
        counts.push(0);
        counts.push(0);
        let mut firsts = Vec::with_capacity(top * (top - 1));
        let mut seconds = Vec::with_capacity(top * (top - 1));
        for x in 1..top {
            for y in 0..x {
                firsts.push(x as u32);
                seconds.push(y as u32);
                firsts.push(y as u32);
                seconds.push(x as u32);
            }
            counts.push(firsts.len() as u32);
        }
        Self {
            counts,
            firsts,
            seconds,
        }
    }

    /// Number of ordered distinct pairs over a list of length `len`.
    #[inline(always)]
    pub(crate) fn pair_count(&self, len: usize) -> u32 {
        self.counts[len]
    }

    /// The `x`-th ordered pair of list indices.
    #[inline(always)]
    pub(crate) fn pair(&self, x: usize) -> (usize, usize) {
        (self.firsts[x] as usize, self.seconds[x] as usize)
    }
}

// ============================================================================
// Sampling
// ============================================================================

/// Outcome of one attempt to find a flippable slot pair.
pub(crate) enum FlipSample {
    /// Two permitted slots holding the same component, in sampled order.
    Pair(usize, usize),
    /// No colliding component exists at all.
    Exhausted,
    /// The size screen rejected [`MAX_SAMPLE_TRIES`] candidates in a row.
    Rejected,
}

impl<R: RngCore> Solver<R> {
    /// Draws one colliding ordered slot pair from a single 32-bit word.
    ///
    /// The low word halves pick the colliding component; bit 16 orients a
    /// two-slot list, and the upper half indexes the ordered-pair table for
    /// longer lists. Uniform over components first, then over ordered pairs
    /// within the chosen list. Deliberately not uniform over all colliding
    /// pairs: heavily duplicated components must not dominate.
    #[inline]
    fn draw_collision_pair(&mut self) -> (usize, usize) {
        let word = self.rng.next_u32();
        let (_, slots) = self.dupes.pick_colliding(word);
        if slots.len() == 2 {
            if word & 0x1_0000 != 0 {
                (slots[0] as usize, slots[1] as usize)
            } else {
                (slots[1] as usize, slots[0] as usize)
            }
        } else {
            let x = ((word >> 16) % self.pairs.pair_count(slots.len())) as usize;
            let (i, j) = self.pairs.pair(x);
            (slots[i] as usize, slots[j] as usize)
        }
    }

    /// Samples a flippable pair under the run's size screen.
    pub(crate) fn sample_flip_pair(&mut self) -> FlipSample {
        if self.dupes.no_collisions() {
            return FlipSample::Exhausted;
        }
        let maxsize = self.params.maxsize;

        if maxsize == 0 {
            loop {
                let (p, q) = self.draw_collision_pair();
                if self.decomp.permits(p, q) {
                    return FlipSample::Pair(p, q);
                }
            }
        } else if maxsize > 0 {
            let cap = maxsize as u64;
            for _ in 0..MAX_SAMPLE_TRIES {
                let (p, q) = self.draw_collision_pair();
                let d = &self.decomp;
                let (ep, fp) = (d.pred(p), d.succ(p));
                let (eq, fq) = (d.pred(q), d.succ(q));
                let new_pe = d.value(ep) ^ d.value(eq);
                let new_qf = d.value(fq) ^ d.value(fp);
                let p_weight = term_weight(d.value(p), new_pe, d.value(fp));
                let q_weight = term_weight(d.value(q), d.value(eq), new_qf);
                if d.permits(p, q) && p_weight <= cap && q_weight <= cap {
                    return FlipSample::Pair(p, q);
                }
            }
            FlipSample::Rejected
        } else {
            let exceed = (1 - maxsize) as u32;
            for _ in 0..MAX_SAMPLE_TRIES {
                let (p, q) = self.draw_collision_pair();
                let d = &self.decomp;
                let new_pe = d.value(d.pred(p)) ^ d.value(d.pred(q));
                let new_qf = d.value(d.succ(q)) ^ d.value(d.succ(p));
                if d.permits(p, q)
                    && popcount_below(new_pe, exceed)
                    && popcount_below(new_qf, exceed)
                {
                    return FlipSample::Pair(p, q);
                }
            }
            FlipSample::Rejected
        }
    }
}

// ============================================================================
// Flip steps
// ============================================================================

impl<R: RngCore> Solver<R> {
    /// Rewrites one slot: drop the old component from the duplicate index,
    /// record the new one unless it cancelled to zero, write the array.
    #[inline]
    fn commit_slot(&mut self, slot: usize, old: u64, new: u64) {
        self.dupes.remove(old, slot);
        if new != 0 {
            self.dupes.add(new, slot);
        }
        self.decomp.set(slot, new);
    }

    /// Rank bookkeeping shared by every collapse site: track the minimum,
    /// refresh the deadline, snapshot the best array, reschedule the next
    /// plus move, and decide whether the walk is over.
    fn after_collapse(&mut self) -> Option<StopReason> {
        if self.achieved < self.minmuls {
            self.minmuls = self.achieved;
            if self.achieved > self.params.target {
                self.limit = flip_deadline(
                    self.flips,
                    self.params.termination,
                    self.params.split,
                    self.achieved,
                    self.params.target,
                    self.params.symm,
                    self.params.flimit,
                );
            }
        }
        if self.achieved <= self.minmuls {
            self.best.copy_from_slice(self.decomp.values());
        }
        self.reschedule_plus();
        if self.dupes.no_collisions() {
            return Some(StopReason::CollisionsExhausted);
        }
        if self.achieved <= self.params.target {
            return Some(StopReason::TargetReached);
        }
        // Every remaining collision inside a single orbit means no permitted
        // flip can fire; force an immediate plus move to reopen the walk.
        if self.collisions_confined_to_one_orbit() {
            self.plusby = self.flips;
        }
        None
    }

    fn collisions_confined_to_one_orbit(&self) -> bool {
        self.dupes.colliding().iter().all(|&v| {
            let slots = self.dupes.slots(v);
            let orbit = self.decomp.orbit(slots[0] as usize);
            slots.iter().all(|&s| self.decomp.orbit(s as usize) == orbit)
        })
    }

    /// One flip under 3-fold symmetry.
    pub(crate) fn flip_step3(&mut self) -> Option<StopReason> {
        let (p, q) = match self.sample_flip_pair() {
            FlipSample::Pair(p, q) => (p, q),
            FlipSample::Exhausted => return Some(StopReason::CollisionsExhausted),
            FlipSample::Rejected => return Some(StopReason::SizeRejected),
        };
        let (ep, fp) = (self.decomp.pred(p), self.decomp.succ(p));
        let (eq, fq) = (self.decomp.pred(q), self.decomp.succ(q));
        let old_pe = self.decomp.value(ep);
        let old_pf = self.decomp.value(fp);
        let old_qe = self.decomp.value(eq);
        let old_qf = self.decomp.value(fq);
        let new_pe = old_pe ^ old_qe;
        let new_qf = old_qf ^ old_pf;

        self.commit_slot(ep, old_pe, new_pe);
        self.commit_slot(fq, old_qf, new_qf);

        if new_pe == 0 {
            let old_pd = self.decomp.value(p);
            self.dupes.remove(old_pd, p);
            self.dupes.remove(old_pf, fp);
            self.decomp.set(p, 0);
            self.decomp.set(fp, 0);
            self.achieved -= 3;
            if let Some(stop) = self.after_collapse() {
                return Some(stop);
            }
        }
        if new_qf == 0 {
            let old_qd = self.decomp.value(q);
            self.dupes.remove(old_qd, q);
            self.dupes.remove(old_qe, eq);
            self.decomp.set(q, 0);
            self.decomp.set(eq, 0);
            self.achieved -= 3;
            if let Some(stop) = self.after_collapse() {
                return Some(stop);
            }
        }
        self.debug_check();
        None
    }

    /// One flip under 6-fold symmetry: the sampled pair and its twin pair
    /// are rewritten together, and a term collapses either when a component
    /// cancels or when the two halves of a sextuple become identical.
    pub(crate) fn flip_step6(&mut self) -> Option<StopReason> {
        let (p, q) = match self.sample_flip_pair() {
            FlipSample::Pair(p, q) => (p, q),
            FlipSample::Exhausted => return Some(StopReason::CollisionsExhausted),
            FlipSample::Rejected => return Some(StopReason::SizeRejected),
        };
        let pp = self.decomp.twin(p);
        let qq = self.decomp.twin(q);

        let (ep, fp) = (self.decomp.pred(p), self.decomp.succ(p));
        let (eq, fq) = (self.decomp.pred(q), self.decomp.succ(q));
        let (epp, fpp) = (self.decomp.pred(pp), self.decomp.succ(pp));
        let (eqq, fqq) = (self.decomp.pred(qq), self.decomp.succ(qq));

        let old_pd = self.decomp.value(p);
        let old_pe = self.decomp.value(ep);
        let old_pf = self.decomp.value(fp);
        let old_qd = self.decomp.value(q);
        let old_qe = self.decomp.value(eq);
        let old_qf = self.decomp.value(fq);
        let old_ppd = self.decomp.value(pp);
        let old_ppe = self.decomp.value(epp);
        let old_ppf = self.decomp.value(fpp);
        let old_qqd = self.decomp.value(qq);
        let old_qqe = self.decomp.value(eqq);
        let old_qqf = self.decomp.value(fqq);

        let new_pe = old_pe ^ old_qe;
        let new_ppe = old_ppe ^ old_qqe;
        let new_qf = old_qf ^ old_pf;
        let new_qqf = old_qqf ^ old_ppf;

        self.commit_slot(ep, old_pe, new_pe);
        self.commit_slot(epp, old_ppe, new_ppe);
        self.commit_slot(fq, old_qf, new_qf);
        self.commit_slot(fqq, old_qqf, new_qqf);

        if new_pe == 0 || (old_pd == old_ppd && new_pe == new_ppe && old_pf == old_ppf) {
            self.dupes.remove(old_pd, p);
            if new_pe != 0 {
                self.dupes.remove(new_pe, ep);
            }
            self.dupes.remove(old_pf, fp);
            self.decomp.set(p, 0);
            self.decomp.set(fp, 0);
            self.dupes.remove(old_ppd, pp);
            if new_ppe != 0 {
                self.dupes.remove(new_ppe, epp);
            }
            self.dupes.remove(old_ppf, fpp);
            self.decomp.set(pp, 0);
            self.decomp.set(fpp, 0);
            // On a coincidence collapse the rewritten components are still
            // nonzero and must be cleared by hand; after a cancellation they
            // are zero already.
            if new_pe != 0 {
                self.decomp.set(ep, 0);
                self.decomp.set(epp, 0);
            }
            self.achieved -= 6;
            if let Some(stop) = self.after_collapse() {
                return Some(stop);
            }
        }

        if new_qf == 0 || (old_qd == old_qqd && old_qe == old_qqe && new_qf == new_qqf) {
            self.dupes.remove(old_qd, q);
            self.dupes.remove(old_qe, eq);
            if new_qf != 0 {
                self.dupes.remove(new_qf, fq);
            }
            self.decomp.set(q, 0);
            self.decomp.set(eq, 0);
            self.dupes.remove(old_qqd, qq);
            self.dupes.remove(old_qqe, eqq);
            if new_qqf != 0 {
                self.dupes.remove(new_qqf, fqq);
            }
            self.decomp.set(qq, 0);
            self.decomp.set(eqq, 0);
            if new_qf != 0 {
                self.decomp.set(fq, 0);
                self.decomp.set(fqq, 0);
            }
            self.achieved -= 6;
            if let Some(stop) = self.after_collapse() {
                return Some(stop);
            }
        }
        self.debug_check();
        None
    }
}

// ============================================================================
// Tests
// ============================================================================
