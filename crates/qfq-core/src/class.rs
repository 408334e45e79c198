//! Flow classes and the `(weight, lmax) -> group` mapping (spec §3, §4.4).

#[cfg(feature = "std")]
use std::collections::VecDeque;

#[cfg(not(feature = "std"))]
use alloc::collections::VecDeque;

use core::fmt;

use crate::error::SchedError;
use crate::fixed::{FixedPoint, GroupIndex, DISABLED_INV_W, MAX_WEIGHT, MIN_SLOT_SHIFT, ONE_FP};
use crate::packet::Packet;
use crate::sync::Mutex;

pub use crate::sync::Arc;

/// Identifies a registered flow class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassId(u32);

impl ClassId {
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// The inner queue backing one class, shared between the dispatcher and
/// whichever producer threads classify traffic onto it (spec §5: "the
/// class's `inner_queue` has its own lock, taken by both sides").
///
/// Held by `Class` as an `Arc` rather than inline: producers need to push
/// packets onto it without going through the dispatcher-exclusive
/// `Scheduler`, so they hold a clone of this handle directly (obtained via
/// [`Class::queue_handle`] at class-creation time), never a reference into
/// the scheduler itself (spec §9: "producers holding only sharable
/// handles... per-class inner-queue locks").
pub struct ClassQueue {
    id: ClassId,
    capacity: usize,
    inner: Mutex<VecDeque<Packet>>,
}

impl ClassQueue {
    fn new(id: ClassId, capacity: usize) -> Self {
        Self {
            id,
            capacity,
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Pushes a packet onto the queue. Returns `Ok(true)` if this push
    /// transitioned the queue from empty to non-empty (the caller uses this
    /// to decide whether an activation is needed), `Err` if the queue is at
    /// capacity (spec §7 `EnqueueDrop`).
    pub fn push(&self, pkt: Packet) -> Result<bool, SchedError> {
        let mut queue = self.inner.lock();
        if queue.len() >= self.capacity {
            return Err(SchedError::EnqueueDrop { class: self.id });
        }
        let was_empty = queue.is_empty();
        queue.push_back(pkt);
        Ok(was_empty)
    }

    pub fn pop(&self) -> Option<Packet> {
        self.inner.lock().pop_front()
    }

    /// Length of the next packet to dequeue, or `0` if the queue is empty
    /// (spec §4.1 `next_len(c)`).
    pub fn next_len(&self) -> u32 {
        self.inner.lock().front().map(|p| p.len).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A registered flow class: its weight-derived index, its timestamps, and
/// a handle to the inner queue backing it.
pub struct Class {
    id: ClassId,
    weight: u32,
    lmax: u32,
    inv_w: u64,
    group: GroupIndex,
    /// The group this class is physically sitting in a slot of, if any.
    ///
    /// Distinct from `group` (the target computed by [`calc_index`] from the
    /// class's *current* weight/lmax): a weight/lmax change recomputes
    /// `group` immediately, but the class keeps occupying whatever slot it
    /// was already in until the scheduler relocates or removes it (spec
    /// §4.4 "Update").
    slot_group: Option<GroupIndex>,
    pub s: FixedPoint,
    pub f: FixedPoint,
    backlogged: bool,
    queue: Arc<ClassQueue>,
    /// Count of external filter/classifier bindings referencing this class
    /// (spec §3 "reference counters for external holders";
    /// [`Scheduler::delete_class`](crate::scheduler::Scheduler::delete_class)
    /// rejects with `ClassBusy` while this is non-zero, spec §4.4 "Delete").
    filter_cnt: u32,
    /// Count of other external holders of this class (e.g. a host-side
    /// handle taken before the class is fully configured). Distinct from
    /// `filter_cnt`: spec §3 lists both counters, only the former gates
    /// deletion.
    refcnt: u32,
}

impl Class {
    pub fn new(id: ClassId, weight: u32, lmax: u32, capacity: usize) -> Result<Self, SchedError> {
        let inv_w = weight_to_inv_w(weight)?;
        validate_lmax(lmax)?;
        let group = calc_index(inv_w, lmax);
        Ok(Self {
            id,
            weight,
            lmax,
            inv_w,
            group,
            slot_group: None,
            s: FixedPoint::ZERO,
            f: FixedPoint::ZERO,
            backlogged: false,
            queue: Arc::new(ClassQueue::new(id, capacity)),
            filter_cnt: 0,
            refcnt: 0,
        })
    }

    /// Returns a cloned handle to this class's inner queue, for a producer
    /// thread to push packets onto directly without touching the
    /// dispatcher-exclusive `Scheduler` (spec §5, §9).
    pub fn queue_handle(&self) -> Arc<ClassQueue> {
        Arc::clone(&self.queue)
    }

    pub fn slot_group(&self) -> Option<GroupIndex> {
        self.slot_group
    }

    pub fn set_slot_group(&mut self, group: Option<GroupIndex>) {
        self.slot_group = group;
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn lmax(&self) -> u32 {
        self.lmax
    }

    pub fn inv_w(&self) -> u64 {
        self.inv_w
    }

    pub fn group(&self) -> GroupIndex {
        self.group
    }

    pub fn is_disabled(&self) -> bool {
        self.inv_w == DISABLED_INV_W
    }

    pub fn is_backlogged(&self) -> bool {
        self.backlogged
    }

    pub fn set_backlogged(&mut self, backlogged: bool) {
        self.backlogged = backlogged;
    }

    /// Updates weight and/or lmax, recomputing the class's group index.
    ///
    /// Returns the previous group index so the caller (the scheduler, which
    /// owns the group array) can relocate a currently-backlogged class
    /// (spec §4.4 "Update": deactivate, update, relocate, reactivate).
    pub fn set_weight_lmax(
        &mut self,
        weight: u32,
        lmax: u32,
    ) -> Result<GroupIndex, SchedError> {
        let inv_w = weight_to_inv_w(weight)?;
        validate_lmax(lmax)?;
        let old_group = self.group;
        self.weight = weight;
        self.lmax = lmax;
        self.inv_w = inv_w;
        self.group = calc_index(inv_w, lmax);
        Ok(old_group)
    }

    /// Pushes a packet onto the inner queue; see [`ClassQueue::push`]. The
    /// dispatcher uses this when it owns the only handle (e.g. tests and the
    /// demo binary); a producer thread instead pushes through its own
    /// [`Class::queue_handle`] clone.
    pub fn push(&self, pkt: Packet) -> Result<bool, SchedError> {
        self.queue.push(pkt)
    }

    pub fn pop(&self) -> Option<Packet> {
        self.queue.pop()
    }

    /// Length of the next packet to dequeue, or `0` if the inner queue is
    /// empty (spec §4.1 `next_len(c)`).
    pub fn next_len(&self) -> u32 {
        self.queue.next_len()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn filter_cnt(&self) -> u32 {
        self.filter_cnt
    }

    pub fn inc_filter_cnt(&mut self) {
        self.filter_cnt += 1;
    }

    /// Saturating: an unbind on an already-zero count is a caller bug, not
    /// something that should underflow the counter.
    pub fn dec_filter_cnt(&mut self) {
        self.filter_cnt = self.filter_cnt.saturating_sub(1);
    }

    pub fn refcnt(&self) -> u32 {
        self.refcnt
    }

    pub fn inc_refcnt(&mut self) {
        self.refcnt += 1;
    }

    pub fn dec_refcnt(&mut self) {
        self.refcnt = self.refcnt.saturating_sub(1);
    }
}

fn validate_lmax(lmax: u32) -> Result<(), SchedError> {
    use crate::fixed::LMAX;
    if lmax == 0 || lmax > LMAX {
        Err(SchedError::InvalidLmax { lmax })
    } else {
        Ok(())
    }
}

/// Converts a class weight into its fixed-point reciprocal, or the
/// [`DISABLED_INV_W`] sentinel for `weight == 0` (spec §4.4).
pub fn weight_to_inv_w(weight: u32) -> Result<u64, SchedError> {
    if weight == 0 {
        return Ok(DISABLED_INV_W);
    }
    if weight > MAX_WEIGHT {
        return Err(SchedError::InvalidWeight { weight });
    }
    Ok(ONE_FP / weight as u64)
}

/// Maps `(inv_w, lmax)` to a permanent group index (spec §4.4).
///
/// `slot_size = lmax * inv_w`; `size_map = slot_size >> MIN_SLOT_SHIFT`; the
/// index is the 1-indexed bit position of `size_map`'s highest set bit
/// (`fls`), decremented by one when `slot_size` itself sits exactly on a
/// power-of-two slot boundary, then clamped to `MAX_INDEX`.
pub fn calc_index(inv_w: u64, lmax: u32) -> GroupIndex {
    if inv_w == DISABLED_INV_W {
        return GroupIndex::new(0).expect("0 is always a valid group index");
    }
    let slot_size = (lmax as u64) * inv_w;
    let size_map = slot_size >> MIN_SLOT_SHIFT;
    if size_map == 0 {
        return GroupIndex::new(0).expect("0 is always a valid group index");
    }
    let mut index = fls64(size_map);
    if slot_size & (slot_size - 1) == 0 {
        index -= 1;
    }
    GroupIndex::clamp(index as u8)
}

/// Active weight contribution of a class whose reciprocal weight is
/// `inv_w`, i.e. `ONE_FP / inv_w` (spec §4.5 step 5, §3 `wsum_active`
/// invariant) — `0` for a disabled class.
#[inline]
pub fn weight_fp(inv_w: u64) -> u64 {
    if inv_w == DISABLED_INV_W || inv_w == 0 {
        0
    } else {
        ONE_FP / inv_w
    }
}

/// 1-indexed position of the highest set bit (`0` iff `x == 0`).
#[inline]
fn fls64(x: u64) -> u32 {
    if x == 0 {
        0
    } else {
        64 - x.leading_zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_zero_is_disabled() {
        assert_eq!(weight_to_inv_w(0).unwrap(), DISABLED_INV_W);
    }

    #[test]
    fn weight_over_max_is_rejected() {
        assert!(weight_to_inv_w(MAX_WEIGHT + 1).is_err());
    }

    #[test]
    fn disabled_class_maps_to_group_zero() {
        assert_eq!(calc_index(DISABLED_INV_W, 1500).get(), 0);
    }

    #[test]
    fn heavier_weight_class_gets_lower_or_equal_index() {
        let light = weight_to_inv_w(1).unwrap();
        let heavy = weight_to_inv_w(1000).unwrap();
        let idx_light = calc_index(light, 1500);
        let idx_heavy = calc_index(heavy, 1500);
        assert!(idx_heavy.get() <= idx_light.get());
    }

    #[test]
    fn power_of_two_slot_size_decrements_index() {
        // Pick inv_w/lmax so slot_size lands exactly on a power of two.
        let inv_w = 1u64 << MIN_SLOT_SHIFT;
        let lmax = 2u32;
        let idx_boundary = calc_index(inv_w, lmax);
        let idx_just_above = calc_index(inv_w, lmax + 1);
        assert!(idx_just_above.get() >= idx_boundary.get());
    }

    #[test]
    fn push_transitions_empty_to_nonempty() {
        let c = Class::new(ClassId::new(1), 10, 1500, 8).unwrap();
        assert!(c.push(Packet::new(100, 0)).unwrap());
        assert!(!c.push(Packet::new(100, 0)).unwrap());
        assert_eq!(c.queue_len(), 2);
    }

    #[test]
    fn push_past_capacity_drops() {
        let c = Class::new(ClassId::new(1), 10, 1500, 1).unwrap();
        c.push(Packet::new(100, 0)).unwrap();
        assert!(matches!(
            c.push(Packet::new(100, 0)),
            Err(SchedError::EnqueueDrop { .. })
        ));
    }

    #[test]
    fn filter_cnt_tracks_bind_unbind() {
        let mut c = Class::new(ClassId::new(1), 10, 1500, 8).unwrap();
        assert_eq!(c.filter_cnt(), 0);
        c.inc_filter_cnt();
        c.inc_filter_cnt();
        assert_eq!(c.filter_cnt(), 2);
        c.dec_filter_cnt();
        assert_eq!(c.filter_cnt(), 1);
        c.dec_filter_cnt();
        c.dec_filter_cnt(); // saturates, does not underflow
        assert_eq!(c.filter_cnt(), 0);
    }
}
