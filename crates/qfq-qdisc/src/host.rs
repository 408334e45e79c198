//! The host queue-discipline contract (spec §6): `enqueue, dequeue, peek,
//! drop, init, reset, destroy`, plus class-ops `create/update/delete/graft/
//! walk/dump`. Captured here as a concrete trait rather than left as prose,
//! so the workspace documents the host boundary as a Rust seam (SPEC_FULL.md
//! §6 "Host trait").

use qfq_core::class::ClassId;
use qfq_core::packet::Packet;
use qfq_core::stats::{ClassStats, SchedulerStats};

use crate::config::ClassConfig;
use crate::error::QdiscError;

/// A queueing discipline as seen by its host framework.
///
/// `dequeue` is deliberately a no-op everywhere this trait is implemented:
/// the dispatcher thread submits packets directly to the transmit path
/// (SPEC_FULL.md §11 resolution #2), so the host must not rely on a polled
/// dequeue entry point ever returning a packet. `peek` is kept as a
/// read-only look-ahead, not a second dequeue path.
/// `init` from spec §6 is realized as [`crate::QfqRl::new`] rather than a
/// trait method: Rust's constructor idiom (a free function returning
/// `Self`) already covers it, and a trait method can't express "build a
/// `Self` with unknown concrete type" without an associated-function
/// signature no other part of this contract needs.
pub trait QdiscHost {
    /// Classifies and pushes `pkt`, posting an activation record on a 0→1
    /// transition (spec §4.5). Returns `ClassifyDrop` if no class or filter
    /// matched, or whatever [`qfq_core::error::SchedError`] the inner push
    /// surfaced (e.g. `EnqueueDrop` at capacity).
    fn enqueue(&mut self, pkt: Packet) -> Result<(), QdiscError>;

    /// Always a no-op (spec §6); retained only so a host's polling loop
    /// compiles against the same shape a conventional qdisc would expose.
    fn dequeue(&mut self) -> Option<Packet> {
        None
    }

    /// Read-only look-ahead at the next packet a given class would serve,
    /// without removing it (the dispatcher's own `next_len`/`cl_qlen`
    /// accessor, spec §4.6 step 4 — exposed here for host introspection,
    /// not as a dequeue substitute).
    fn peek(&self, class: ClassId) -> Option<u32>;

    /// Creates a class from validated configuration.
    fn create_class(&mut self, id: ClassId, config: ClassConfig) -> Result<(), QdiscError>;

    /// Updates an existing class's weight/lmax.
    fn update_class(&mut self, id: ClassId, config: ClassConfig) -> Result<(), QdiscError>;

    /// Deletes a class. Fails with `SchedError::ClassBusy` while some
    /// classifier binding still references the class (`filter_cnt > 0`,
    /// spec §4.4 "Delete", §8 S5).
    fn delete_class(&mut self, id: ClassId) -> Result<(), QdiscError>;

    /// Attaches a child queueing discipline to a class. QFQ-RL classes are
    /// always leaves — there is no nested qdisc to graft onto — so this
    /// always rejects with `InvalidConfig`; kept in the trait so the host
    /// contract's shape matches a conventional Linux qdisc's class-ops even
    /// where this scheduler has nothing to attach.
    fn graft_class(&mut self, id: ClassId, _child: ()) -> Result<(), QdiscError> {
        Err(QdiscError::InvalidConfig(format!(
            "{id} is a leaf class; grafting is not supported"
        )))
    }

    /// Iterates registered class ids, calling `f` for each.
    fn walk_classes(&self, f: &mut dyn FnMut(ClassId));

    /// Per-class statistics snapshot (spec §6 "Statistics export").
    fn dump_class(&self, id: ClassId) -> Option<ClassStats>;

    /// Scheduler-wide statistics snapshot.
    fn dump_scheduler(&self) -> SchedulerStats;

    /// Resets all statistics counters and drops all queued packets, but
    /// keeps class registrations. No-op if nothing is queued.
    fn reset(&mut self);

    /// Tears down the discipline: stops the dispatcher and releases every
    /// class. After this call the host must not invoke any other method.
    fn destroy(self);
}
