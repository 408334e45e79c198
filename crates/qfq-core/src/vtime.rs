//! Virtual-time engine: `V` advancement and eligibility promotion (spec §4.3).
//!
//! Wall-clock is threaded in as a monotonic nanosecond counter rather than
//! `std::time::Instant` so this crate stays `no_std`-capable; `qfq-dispatch`
//! supplies the nanoseconds from its own clock source.

use crate::fixed::{FixedPoint, ONE_FP};

const NSEC_PER_SEC: u64 = 1_000_000_000;

/// Default link speed, a 10 GbE link with framing overhead subtracted
/// (spec §6 "Link parameters").
pub const DEFAULT_LINK_SPEED_MBPS: u64 = 9800;

/// Maintains `V`, the two charge accumulators, and the drain-rate fallback
/// that keeps `V` tracking wall-clock while the link is idle.
pub struct VirtualTimeEngine {
    v: FixedPoint,
    v_diff_sum: FixedPoint,
    t_diff_sum: u64,
    last_updated_ns: u64,
    link_speed_mbps: u64,
}

impl VirtualTimeEngine {
    /// `v_last_updated` is initialized here, at construction, rather than
    /// lazily on first dequeue (DESIGN.md decision 3).
    pub fn new(link_speed_mbps: u64, now_ns: u64) -> Self {
        Self {
            v: FixedPoint::ZERO,
            v_diff_sum: FixedPoint::ZERO,
            t_diff_sum: 0,
            last_updated_ns: now_ns,
            link_speed_mbps,
        }
    }

    pub fn v(&self) -> FixedPoint {
        self.v
    }

    /// `QFQ_DRAIN_RATE = LINK_SPEED_Mbps * 125000 * ONE_FP / NSEC_PER_SEC`.
    pub fn drain_rate(&self) -> u64 {
        mul_div(self.link_speed_mbps * 125_000, ONE_FP, NSEC_PER_SEC)
    }

    /// Records a dequeued packet's contribution to the two running sums
    /// (spec §4.3 "V advancement").
    pub fn charge(&mut self, len: u32, wsum_active: u64) {
        let denom = core::cmp::max(self.link_speed_mbps, wsum_active);
        let dv = mul_div(len as u64, ONE_FP, denom);
        self.v_diff_sum = self.v_diff_sum.wrapping_add(FixedPoint::new(dv));

        let dt = mul_div(len as u64, NSEC_PER_SEC, 125_000 * self.link_speed_mbps);
        self.t_diff_sum = self.t_diff_sum.saturating_add(dt);
    }

    /// Advances `V` given the current wall-clock `now_ns` and whether ER is
    /// currently empty. Returns `(old_v, new_v)` so the caller can derive the
    /// eligibility-promotion mask.
    pub fn update(&mut self, now_ns: u64, er_empty: bool) -> (FixedPoint, FixedPoint) {
        let old_v = self.v;
        let t = now_ns.saturating_sub(self.last_updated_ns);

        if self.t_diff_sum > 0 && t >= self.t_diff_sum {
            self.v = self.v.wrapping_add(self.v_diff_sum);
            let remaining = t - self.t_diff_sum;
            self.v_diff_sum = FixedPoint::ZERO;
            self.t_diff_sum = 0;
            if er_empty {
                self.v = self
                    .v
                    .wrapping_add(FixedPoint::new(mul_div(self.drain_rate(), remaining, 1)));
            }
        } else if self.t_diff_sum > 0 {
            let share = mul_div(self.v_diff_sum.raw(), t, self.t_diff_sum);
            self.v = self.v.wrapping_add(FixedPoint::new(share));
            self.v_diff_sum = FixedPoint::new(self.v_diff_sum.raw().saturating_sub(share));
            self.t_diff_sum -= t;
        } else if er_empty {
            self.v = self
                .v
                .wrapping_add(FixedPoint::new(mul_div(self.drain_rate(), t, 1)));
        }

        self.last_updated_ns = now_ns;
        (old_v, self.v)
    }
}

/// `a * b / c` computed in 128-bit intermediate precision.
#[inline]
fn mul_div(a: u64, b: u64, c: u64) -> u64 {
    if c == 0 {
        return 0;
    }
    ((a as u128 * b as u128) / c as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_link_tracks_drain_rate() {
        let mut e = VirtualTimeEngine::new(DEFAULT_LINK_SPEED_MBPS, 0);
        let (old_v, new_v) = e.update(1_000_000, true);
        assert_eq!(old_v, FixedPoint::ZERO);
        assert!(new_v.gt(old_v));
        assert_eq!(new_v.raw(), mul_div(e.drain_rate(), 1_000_000, 1));
    }

    #[test]
    fn busy_link_with_full_backlog_applies_then_drains_remainder() {
        let mut e = VirtualTimeEngine::new(DEFAULT_LINK_SPEED_MBPS, 0);
        e.charge(1500, 10);
        let backlog_ns = e.t_diff_sum;
        let (_, v_after) = e.update(backlog_ns + 500, true);
        assert!(v_after.gt(FixedPoint::ZERO));
    }

    #[test]
    fn busy_link_with_er_nonempty_does_not_advance_past_proportional_share() {
        let mut e = VirtualTimeEngine::new(DEFAULT_LINK_SPEED_MBPS, 0);
        e.charge(1500, 10);
        let (old_v, new_v) = e.update(1, false);
        // tiny elapsed time against a much larger t_diff_sum: proportional share, not full charge
        assert!(new_v.gt(old_v) || new_v == old_v);
        assert!(e.t_diff_sum > 0);
    }

    #[test]
    fn no_charge_no_backlog_er_nonempty_holds_v_still() {
        let mut e = VirtualTimeEngine::new(DEFAULT_LINK_SPEED_MBPS, 0);
        let (old_v, new_v) = e.update(1_000, false);
        assert_eq!(old_v, new_v);
    }
}
