//! Per-CPU activation queues and the `work_bitmap` that tells the dispatcher
//! which of them have anything to drain (spec §4.5, §5).
//!
//! A 0→1 transition on a class's backlog posts one [`Activation`] record to
//! the activation queue of whichever logical executor the producer is
//! running on, then sets that executor's bit in `work_bitmap`. The
//! dispatcher never blocks on these queues: it drains whatever is there,
//! runs `Scheduler::activate` for each, and moves on.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use qfq_core::class::ClassId;

use crate::error::DispatchError;

/// Supports up to 64 producer-side logical executors — one bit per queue in
/// `work_bitmap`. Mirrors `qxk::scheduler::ReadySet`'s `assert_range` cutoff
/// at 64 priorities.
pub const MAX_EXECUTORS: usize = 64;

/// One pending `Activate(class, len)` call (spec §4.5). `len` is not carried
/// here — it is read from the class's own head packet when the dispatcher
/// actually runs the activation, so a burst of pushes before the dispatcher
/// catches up still only needs the one activation record the 0→1 gate
/// produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation {
    pub class: ClassId,
}

/// Per-executor activation queues plus the shared `work_bitmap` (spec §5:
/// "Per-CPU activation queues, each with its own lock... `work_bitmap` is a
/// shared atomic word").
pub struct ActivationQueues {
    queues: Vec<CachePadded<Mutex<VecDeque<Activation>>>>,
    work_bitmap: AtomicU64,
}

impl ActivationQueues {
    /// `executors` is the number of logical producer-side queues to
    /// provision, typically `core_affinity::get_core_ids().len()`.
    pub fn new(executors: usize, per_queue_capacity: usize) -> Result<Self, DispatchError> {
        if executors == 0 || executors > MAX_EXECUTORS {
            return Err(DispatchError::InvalidExecutorCount {
                requested: executors,
                max: MAX_EXECUTORS,
            });
        }
        let queues = (0..executors)
            .map(|_| CachePadded::new(Mutex::new(VecDeque::with_capacity(per_queue_capacity))))
            .collect();
        Ok(Self {
            queues,
            work_bitmap: AtomicU64::new(0),
        })
    }

    pub fn executor_count(&self) -> usize {
        self.queues.len()
    }

    /// Posts an activation on `executor`'s queue and sets its `work_bitmap`
    /// bit. The `SeqCst` store is the "full fence after populating an
    /// activation record and before setting the bitmap bit" spec §5 calls
    /// for (resolved in SPEC_FULL.md §5 as paired `SeqCst` ops rather than a
    /// standalone fence).
    ///
    /// Returns `Err(DispatchError::ActivationOom)` if `executor`'s queue is
    /// already at capacity (spec §7 `ActivationOOM`: "allocation failed for
    /// activation record... class not activated"). The record is dropped,
    /// not the oldest one evicted — a producer that sees this error knows
    /// its own activation did not go through.
    pub fn post(&self, executor: usize, activation: Activation) -> Result<(), DispatchError> {
        let queue = self
            .queues
            .get(executor)
            .ok_or(DispatchError::InvalidExecutorCount {
                requested: executor + 1,
                max: self.queues.len(),
            })?;
        let mut guard = queue.lock();
        if guard.capacity() > 0 && guard.len() >= guard.capacity() {
            log::warn!("qfq-dispatch: activation queue {executor} full, dropping activation");
            return Err(DispatchError::ActivationOom { executor });
        }
        guard.push_back(activation);
        drop(guard);
        self.work_bitmap.fetch_or(1u64 << executor, Ordering::SeqCst);
        Ok(())
    }

    /// Drains every activation currently queued for `executor` into `out`,
    /// clearing that executor's `work_bitmap` bit. Dispatcher-only.
    pub fn drain_into(&self, executor: usize, out: &mut Vec<Activation>) {
        if let Some(queue) = self.queues.get(executor) {
            let mut guard = queue.lock();
            out.extend(guard.drain(..));
        }
        self.work_bitmap
            .fetch_and(!(1u64 << executor), Ordering::SeqCst);
    }

    /// Snapshot of which executors have pending work. Dispatcher-only; used
    /// to avoid locking queues that are known empty.
    pub fn work_bitmap(&self) -> u64 {
        self.work_bitmap.load(Ordering::SeqCst)
    }

    pub fn has_work(&self) -> bool {
        self.work_bitmap() != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_sets_bitmap_bit() {
        let q = ActivationQueues::new(4, 8).unwrap();
        q.post(2, Activation { class: ClassId::new(1) }).unwrap();
        assert_eq!(q.work_bitmap(), 1 << 2);
        assert!(q.has_work());
    }

    #[test]
    fn drain_clears_bit_and_returns_items() {
        let q = ActivationQueues::new(4, 8).unwrap();
        q.post(0, Activation { class: ClassId::new(1) }).unwrap();
        q.post(0, Activation { class: ClassId::new(2) }).unwrap();

        let mut out = Vec::new();
        q.drain_into(0, &mut out);
        assert_eq!(out.len(), 2);
        assert_eq!(q.work_bitmap(), 0);
        assert!(!q.has_work());
    }

    #[test]
    fn post_out_of_range_executor_errors() {
        let q = ActivationQueues::new(2, 8).unwrap();
        assert!(q.post(5, Activation { class: ClassId::new(1) }).is_err());
    }

    #[test]
    fn post_to_full_queue_returns_activation_oom_without_evicting() {
        let q = ActivationQueues::new(1, 2).unwrap();
        q.post(0, Activation { class: ClassId::new(1) }).unwrap();
        q.post(0, Activation { class: ClassId::new(2) }).unwrap();

        let err = q.post(0, Activation { class: ClassId::new(3) }).unwrap_err();
        assert_eq!(err, DispatchError::ActivationOom { executor: 0 });

        let mut out = Vec::new();
        q.drain_into(0, &mut out);
        assert_eq!(
            out,
            vec![
                Activation { class: ClassId::new(1) },
                Activation { class: ClassId::new(2) },
            ]
        );
    }

    #[test]
    fn zero_executors_rejected() {
        assert!(ActivationQueues::new(0, 8).is_err());
    }
}
