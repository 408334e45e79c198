//! Per-class and per-scheduler statistics (spec §6 "Statistics export").
//!
//! Deliberately out of the algorithmic core (spec §1), but carried here as
//! the ambient observability surface every class/scheduler already needs a
//! host to read through its stats-copy callbacks.

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassStats {
    pub packets: u64,
    pub bytes: u64,
    pub drops: u64,
    pub queue_len: usize,
    /// Exponentially-weighted moving average of bytes/sec, updated on every
    /// dequeue from the dequeue-to-dequeue wall-clock delta (SPEC_FULL.md
    /// §4.11).
    pub rate_bps: f64,
    /// Wall-clock reading at this class's previous dequeue, in nanoseconds.
    /// `None` until the class has been served once; not part of the
    /// public stats surface, so it is excluded from serialization.
    #[cfg_attr(feature = "serde", serde(skip))]
    last_dequeue_ns: Option<u64>,
}

impl ClassStats {
    /// Smoothing factor for the rate EWMA; 1/16 mirrors the shift-based
    /// EWMAs common in kernel rate estimators.
    const EWMA_ALPHA: f64 = 1.0 / 16.0;

    /// Records one served packet of `len` bytes at wall-clock `now_ns`. The
    /// instantaneous rate fed into the EWMA is derived from the delta to
    /// this class's *previous* dequeue, not from `now_ns` itself — the first
    /// dequeue for a class has no prior sample to diff against, so it seeds
    /// `last_dequeue_ns` without touching `rate_bps`.
    pub fn record_dequeue(&mut self, len: u32, now_ns: u64) {
        self.packets += 1;
        self.bytes += len as u64;

        if let Some(last) = self.last_dequeue_ns {
            if now_ns > last {
                let delta_ns = now_ns - last;
                let instantaneous_bps = len as f64 * 8.0 * 1e9 / delta_ns as f64;
                if self.rate_bps == 0.0 {
                    self.rate_bps = instantaneous_bps;
                } else {
                    self.rate_bps += Self::EWMA_ALPHA * (instantaneous_bps - self.rate_bps);
                }
            }
        }
        self.last_dequeue_ns = Some(now_ns);
    }

    pub fn record_drop(&mut self) {
        self.drops += 1;
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerStats {
    pub wsum_active: u64,
    pub wsum: u64,
    pub backlogged_classes: u32,
    pub total_packets: u64,
    pub total_bytes: u64,
    pub total_drops: u64,
}
