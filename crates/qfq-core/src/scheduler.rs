//! Ties fixed-point arithmetic, the bitmaps, the group/slot store, and class
//! lifecycle into the scheduler's three public operations: `enqueue`
//! (producer-side push + activation posting), `activate` (dispatcher-run
//! §4.5), and `dequeue` (dispatcher-run §4.6).
//!
//! A `Scheduler` is exclusively owned by the dispatcher thread (spec §5):
//! nothing here is `Sync`. Producers never call into this type directly;
//! `qfq-dispatch` is the seam that turns producer-side pushes into the
//! activation records this type consumes.

use alloc::collections::BTreeMap;
use core::array;

use crate::bitmap::{self, Bitmaps, GroupState};
use crate::class::{weight_fp, Class, ClassId};
use crate::error::SchedError;
use crate::fixed::{FixedPoint, GroupIndex, GROUP_MASK, MAX_WSUM, NUM_GROUPS};
use crate::group::Group;
use crate::packet::Packet;
use crate::stats::{ClassStats, SchedulerStats};
use crate::vtime::{VirtualTimeEngine, DEFAULT_LINK_SPEED_MBPS};

/// A packet handed back by [`Scheduler::dequeue`], paired with the class it
/// was served from (the dispatcher needs both to update per-class stats and
/// hand the packet to the transmit path).
#[derive(Debug, Clone)]
pub struct DequeuedPacket {
    pub class: ClassId,
    pub packet: Packet,
}

/// Construction-time knobs for a [`Scheduler`].
#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    /// Compile-time default is `9800` (spec §6); overridable per instance.
    pub link_speed_mbps: u64,
    /// Per-class inner-queue depth before `EnqueueDrop` (spec §7).
    pub inner_queue_capacity: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            link_speed_mbps: DEFAULT_LINK_SPEED_MBPS,
            inner_queue_capacity: 1024,
        }
    }
}

/// The scheduling core: groups, bitmaps, classes, and the virtual-time
/// engine. Every method here assumes single-threaded, exclusive access —
/// that exclusivity is the dispatcher's contract, not this type's (spec §5,
/// §9 "The dispatcher").
pub struct Scheduler {
    groups: [Group; NUM_GROUPS],
    bitmaps: Bitmaps,
    classes: BTreeMap<ClassId, Class>,
    vtime: VirtualTimeEngine,
    wsum: u64,
    wsum_active: u64,
    backlog: u32,
    options: SchedulerOptions,
    class_stats: BTreeMap<ClassId, ClassStats>,
}

impl Scheduler {
    pub fn new(options: SchedulerOptions, now_ns: u64) -> Self {
        Self {
            groups: array::from_fn(|i| {
                Group::new(GroupIndex::new(i as u8).expect("i < NUM_GROUPS"))
            }),
            bitmaps: Bitmaps::new(),
            classes: BTreeMap::new(),
            vtime: VirtualTimeEngine::new(options.link_speed_mbps, now_ns),
            wsum: 0,
            wsum_active: 0,
            backlog: 0,
            options,
            class_stats: BTreeMap::new(),
        }
    }

    pub fn wsum(&self) -> u64 {
        self.wsum
    }

    pub fn wsum_active(&self) -> u64 {
        self.wsum_active
    }

    pub fn backlog(&self) -> u32 {
        self.backlog
    }

    pub fn v(&self) -> FixedPoint {
        self.vtime.v()
    }

    pub fn class(&self, id: ClassId) -> Option<&Class> {
        self.classes.get(&id)
    }

    /// Hands out a cloned handle to `id`'s inner queue so a producer thread
    /// can push packets directly, without going through this
    /// dispatcher-exclusive `&mut self` API (spec §5, §9).
    pub fn class_queue_handle(&self, id: ClassId) -> Option<crate::class::Arc<crate::class::ClassQueue>> {
        self.classes.get(&id).map(|c| c.queue_handle())
    }

    pub fn class_stats(&self, id: ClassId) -> Option<ClassStats> {
        self.class_stats.get(&id).copied()
    }

    pub fn stats(&self) -> SchedulerStats {
        let mut s = SchedulerStats {
            wsum_active: self.wsum_active,
            wsum: self.wsum,
            backlogged_classes: self.backlog,
            ..Default::default()
        };
        for cs in self.class_stats.values() {
            s.total_packets += cs.packets;
            s.total_bytes += cs.bytes;
            s.total_drops += cs.drops;
        }
        s
    }

    /// Drops every queued packet and resets all timestamps, bitmaps, and
    /// stats counters, but keeps every class registration in place (host
    /// contract's `reset`, SPEC_FULL.md §6: "resets statistics and drops
    /// queued packets, keeps class registrations").
    pub fn reset(&mut self, now_ns: u64) {
        for g in self.groups.iter_mut() {
            *g = Group::new(g.index());
        }
        self.bitmaps = Bitmaps::new();
        self.vtime = VirtualTimeEngine::new(self.options.link_speed_mbps, now_ns);
        self.wsum_active = 0;
        self.backlog = 0;
        for stats in self.class_stats.values_mut() {
            *stats = ClassStats::default();
        }
        for class in self.classes.values_mut() {
            while class.pop().is_some() {}
            class.set_backlogged(false);
            class.set_slot_group(None);
            class.s = FixedPoint::ZERO;
            class.f = FixedPoint::ZERO;
        }
        log::debug!("qfq-core: scheduler reset");
    }

    // ---- class lifecycle (spec §4.4) -------------------------------------

    /// Creates a class idle, assigned to `groups[calc_index(weight, lmax)]`.
    pub fn create_class(&mut self, id: ClassId, weight: u32, lmax: u32) -> Result<(), SchedError> {
        if self.classes.contains_key(&id) {
            return Err(SchedError::ClassExists { class: id });
        }
        let new_wsum = self.wsum + weight as u64;
        if new_wsum > MAX_WSUM {
            return Err(SchedError::WsumExceeded {
                attempted: new_wsum,
                max: MAX_WSUM,
            });
        }
        let class = Class::new(id, weight, lmax, self.options.inner_queue_capacity)?;
        self.wsum = new_wsum;
        self.classes.insert(id, class);
        self.class_stats.insert(id, ClassStats::default());
        log::debug!("qfq-core: created {id} weight={weight} lmax={lmax}");
        Ok(())
    }

    /// Updates weight and/or lmax. See spec §4.4 "Update" for the exact
    /// deactivate/relocate/reactivate policy realized here.
    pub fn update_class(&mut self, id: ClassId, weight: u32, lmax: u32) -> Result<(), SchedError> {
        let (old_weight, old_lmax) = {
            let c = self
                .classes
                .get(&id)
                .ok_or(SchedError::UnknownClass { class: id })?;
            (c.weight(), c.lmax())
        };
        if weight == old_weight && lmax == old_lmax {
            return Ok(()); // L3: round-trip no-op
        }

        let new_wsum = self.wsum - old_weight as u64 + weight as u64;
        if new_wsum > MAX_WSUM {
            return Err(SchedError::WsumExceeded {
                attempted: new_wsum,
                max: MAX_WSUM,
            });
        }

        let old_phys_group = self.classes[&id].slot_group();
        let old_inv_w = self.classes[&id].inv_w();
        let old_s = self.classes[&id].s;

        let class = self.classes.get_mut(&id).expect("checked above");
        class.set_weight_lmax(weight, lmax)?;
        self.wsum = new_wsum;
        let new_group = self.classes[&id].group();
        let now_disabled = self.classes[&id].is_disabled();

        if let Some(old_g) = old_phys_group {
            if weight == 0 {
                // Disabling: leave the class sitting in its current slot so
                // it still gets served once more (spec §8 boundary case:
                // "its slot is vacated on its next dequeue"). `wsum_active`
                // reflects the weight contribution, which is known now and
                // unrecoverable later (inv_w becomes the disabled sentinel,
                // collapsing `weight_fp` to 0), so it is subtracted here,
                // not at the deferred vacate.
                self.wsum_active = self.wsum_active.saturating_sub(weight_fp(old_inv_w));
                log::debug!("qfq-core: {id} disabled, vacate deferred to next dequeue");
            } else if new_group != old_g {
                // weight != 0 here (the weight == 0 case was handled above),
                // so the class is always re-activated into its new group,
                // never left idle.
                debug_assert!(!now_disabled);
                self.groups[old_g.get() as usize].remove(id, old_s);
                self.wsum_active = self.wsum_active.saturating_sub(weight_fp(old_inv_w));
                let class = self.classes.get_mut(&id).expect("present");
                class.f = class.s; // no charge for the unserved head packet
                class.set_slot_group(None);
                self.backlog = self.backlog.saturating_sub(1);
                self.activate(id)?;
            } else {
                // Same group: no relocation, just reconcile wsum_active.
                let new_inv_w = self.classes[&id].inv_w();
                self.wsum_active = self.wsum_active - weight_fp(old_inv_w) + weight_fp(new_inv_w);
            }
        } else if !now_disabled && self.classes[&id].queue_len() > 0 {
            // Was idle/disabled-and-already-vacated but has queued packets
            // and just became (or stayed) enabled: reactivate now.
            self.activate(id)?;
        }

        log::debug!("qfq-core: updated {id} weight={weight} lmax={lmax}");
        Ok(())
    }

    /// Deletes a class. Fails with `ClassBusy` while `filter_cnt` — bumped by
    /// [`Self::bind_filter`], dropped by [`Self::unbind_filter`] — is
    /// non-zero (spec §4.4 "Delete", §8 S5): some classifier binding still
    /// references this class.
    pub fn delete_class(&mut self, id: ClassId) -> Result<(), SchedError> {
        let class = self
            .classes
            .get(&id)
            .ok_or(SchedError::UnknownClass { class: id })?;
        if class.filter_cnt() > 0 {
            return Err(SchedError::ClassBusy { class: id });
        }
        if let Some(g) = class.slot_group() {
            let s = class.s;
            let gi = g.get() as usize;
            self.groups[gi].remove(id, s);
            self.wsum_active = self.wsum_active.saturating_sub(weight_fp(class.inv_w()));
            if self.groups[gi].is_empty() {
                self.bitmaps.clear_group(g.get());
            }
        }
        self.wsum = self.wsum.saturating_sub(self.classes[&id].weight() as u64);
        self.classes.remove(&id);
        self.class_stats.remove(&id);
        log::debug!("qfq-core: deleted {id}");
        Ok(())
    }

    /// Registers one external filter binding against `id`, bumping its
    /// `filter_cnt` (spec §3 "reference counters for external holders").
    /// Called by the classify layer's `PriorityTable`/filter-chain bind
    /// paths, never internally.
    pub fn bind_filter(&mut self, id: ClassId) -> Result<(), SchedError> {
        let class = self
            .classes
            .get_mut(&id)
            .ok_or(SchedError::UnknownClass { class: id })?;
        class.inc_filter_cnt();
        Ok(())
    }

    /// Releases one external filter binding against `id`, dropping its
    /// `filter_cnt` by one (never below zero).
    pub fn unbind_filter(&mut self, id: ClassId) -> Result<(), SchedError> {
        let class = self
            .classes
            .get_mut(&id)
            .ok_or(SchedError::UnknownClass { class: id })?;
        class.dec_filter_cnt();
        Ok(())
    }

    // ---- enqueue / activation (spec §4.5) --------------------------------

    /// Pushes a packet onto `id`'s inner queue. Returns `Ok(true)` iff the
    /// caller (the classify/dispatch layer) must post an activation record —
    /// the 0→1 transition, gated on the class not being disabled (spec §4.5
    /// step 3; the idempotence of "was_idle?" is what makes L2 hold).
    pub fn push(&mut self, id: ClassId, pkt: Packet) -> Result<bool, SchedError> {
        let class = self
            .classes
            .get(&id)
            .ok_or(SchedError::UnknownClass { class: id })?;
        let became_backlogged = class.push(pkt)?;
        Ok(became_backlogged && !class.is_disabled())
    }

    /// Runs `Activate(class, len)` (spec §4.5): the dispatcher-only
    /// 0→1-transition handler. `len` is read from the class's own head
    /// packet, so no length needs to be threaded through from the producer.
    pub fn activate(&mut self, id: ClassId) -> Result<(), SchedError> {
        self.update_start(id);
        let (len, group_idx, inv_w) = {
            let c = self
                .classes
                .get(&id)
                .ok_or(SchedError::UnknownClass { class: id })?;
            (c.next_len(), c.group(), c.inv_w())
        };
        let gi = group_idx.get() as usize;

        let s = self.classes[&id].s;
        let f = s.wrapping_add(FixedPoint::new((len as u64).wrapping_mul(inv_w)));
        self.classes.get_mut(&id).unwrap().f = f;

        let rounded_s = self.groups[gi].round_down(s);
        let group_was_occupied = !self.groups[gi].is_empty();

        if group_was_occupied && self.groups[gi].s.gt(s) {
            self.groups[gi].rotate(rounded_s);
            self.bitmaps.ir &= !(1u32 << group_idx.get());
            self.bitmaps.ib &= !(1u32 << group_idx.get());
        } else if !group_was_occupied {
            let shift = group_idx.slot_shift();
            self.groups[gi].s = rounded_s;
            self.groups[gi].f = rounded_s.wrapping_add(FixedPoint::new(2u64 << shift));
            let state = self.classify_group(group_idx.get());
            self.bitmaps.set_group(group_idx.get(), state);
        }

        self.groups[gi].insert(id, rounded_s);
        self.wsum_active += weight_fp(inv_w);
        self.backlog += 1;
        let class = self.classes.get_mut(&id).unwrap();
        class.set_backlogged(true);
        class.set_slot_group(Some(group_idx));
        log::trace!("qfq-core: activated {id} in group {}", group_idx.get());
        Ok(())
    }

    /// `update_start(c)` (spec §4.5): decides the class's new virtual start
    /// time on activation, distinguishing a "fresh" finish timestamp from a
    /// stale one that must be re-derived from the current ER frontier.
    fn update_start(&mut self, id: ClassId) {
        let (f, group_idx) = {
            let c = &self.classes[&id];
            (c.f, c.group())
        };
        let shift = group_idx.slot_shift();
        let v = self.vtime.v();
        let limit = v
            .round_down(shift)
            .wrapping_add(FixedPoint::new(1u64 << shift));
        let rounded_f = f.round_down(shift);

        let new_s = if f.gt(v) && !rounded_f.gt(limit) {
            f
        } else if let Some(next_idx) = self.bitmaps.lowest_at_or_above(GroupState::Er, group_idx.get())
        {
            let next_f = self.groups[next_idx as usize].f;
            if rounded_f.gt(next_f) && limit.gt(next_f) {
                next_f
            } else if rounded_f.gt(next_f) {
                limit
            } else {
                v
            }
        } else {
            v
        };
        self.classes.get_mut(&id).unwrap().s = new_s;
    }

    // ---- dequeue (spec §4.6) ----------------------------------------------

    /// Runs one iteration of `dequeue()`. `now_ns` is a monotonic nanosecond
    /// clock reading supplied by the caller (the dispatcher); this crate
    /// never reads wall-clock itself so it stays portable to `no_std`.
    pub fn dequeue(&mut self, now_ns: u64) -> Option<DequeuedPacket> {
        let er_empty_before = self.bitmaps.er == 0;
        let (old_v, new_v) = self.vtime.update(now_ns, er_empty_before);
        let mask = bitmap::promotion_mask(old_v, new_v);
        if mask != 0 {
            self.bitmaps.promote(mask);
        }

        let g_idx = self.bitmaps.lowest_er()?;
        let gi = g_idx as usize;
        let c_id = self.groups[gi].head()?;

        let (packet, next_len, _cl_qlen) = {
            let class = self.classes.get(&c_id).expect("head() returned a live class");
            let pkt = class.pop()?;
            (pkt, class.next_len(), class.queue_len())
        };

        self.vtime.charge(packet.len, self.wsum_active);

        let old_f = self.groups[gi].f;
        let needs_group_update = self.update_class_after_serve(g_idx, c_id, next_len);

        if needs_group_update {
            self.refresh_group_after_serve(g_idx, old_f);
        }

        if let Some(stats) = self.class_stats.get_mut(&c_id) {
            stats.record_dequeue(packet.len, now_ns);
        }

        Some(DequeuedPacket {
            class: c_id,
            packet,
        })
    }

    /// `update_class(g, c, next_len)` (spec §4.6 step 6). Returns whether the
    /// group needs its S/F/bitmap state refreshed (step 7).
    fn update_class_after_serve(&mut self, g_idx: u8, c_id: ClassId, next_len: u32) -> bool {
        let gi = g_idx as usize;

        let was_disabled = {
            let class = self.classes.get_mut(&c_id).unwrap();
            class.s = class.f;
            class.is_disabled()
        };

        if next_len == 0 {
            self.groups[gi].remove_front(c_id);
            let class = self.classes.get_mut(&c_id).unwrap();
            class.set_backlogged(false);
            class.set_slot_group(None);
            self.wsum_active = self.wsum_active.saturating_sub(weight_fp(class.inv_w()));
            self.backlog = self.backlog.saturating_sub(1);
            return true;
        }

        if was_disabled {
            self.groups[gi].remove_front(c_id);
            let class = self.classes.get_mut(&c_id).unwrap();
            class.set_backlogged(false);
            class.set_slot_group(None);
            // `wsum_active` was already debited in `update_class` at the
            // moment of disabling; nothing to subtract here.
            self.backlog = self.backlog.saturating_sub(1);
            return true;
        }

        let inv_w = self.classes[&c_id].inv_w();
        let s = self.classes[&c_id].s;
        let new_f = s.wrapping_add(FixedPoint::new((next_len as u64).wrapping_mul(inv_w)));
        self.classes.get_mut(&c_id).unwrap().f = new_f;

        let rounded_s = self.groups[gi].round_down(s);
        if rounded_s == self.groups[gi].s {
            // Stays in place; slot position unchanged, no group refresh.
            false
        } else {
            self.groups[gi].remove_front(c_id);
            self.groups[gi].insert(c_id, rounded_s);
            true
        }
    }

    /// Step 7's group-refresh branch: scan for the new head, update the
    /// group's own `S`/`F`, recompute its bitmap state, then run the unblock
    /// cascade against the pre-serve `F` (spec §4.3 "Unblock cascade").
    fn refresh_group_after_serve(&mut self, g_idx: u8, old_f: FixedPoint) {
        let gi = g_idx as usize;
        match self.groups[gi].scan() {
            None => {
                self.bitmaps.clear_group(g_idx);
            }
            Some(head) => {
                let shift = self.groups[gi].slot_shift();
                let head_s = self.classes[&head].s;
                let rounded = self.groups[gi].round_down(head_s);
                self.groups[gi].s = rounded;
                self.groups[gi].f = rounded.wrapping_add(FixedPoint::new(2u64 << shift));
                let state = self.classify_group(g_idx);
                self.bitmaps.set_group(g_idx, state);
            }
        }
        self.unblock_cascade(g_idx, old_f);
    }

    /// Group state classification (spec §4.3): eligible iff `S <= V`;
    /// blocked iff the lowest ER group above this one has a smaller `F`.
    fn classify_group(&self, index: u8) -> GroupState {
        let s = self.groups[index as usize].s;
        let f = self.groups[index as usize].f;
        let eligible = !s.gt(self.vtime.v());
        let blocked = match self.bitmaps.lowest_above(GroupState::Er, index) {
            Some(next) => f.gt(self.groups[next as usize].f),
            None => false,
        };
        match (eligible, blocked) {
            (true, false) => GroupState::Er,
            (false, false) => GroupState::Ir,
            (true, true) => GroupState::Eb,
            (false, true) => GroupState::Ib,
        }
    }

    /// Unblock cascade (spec §4.3): always run after a group's `F` moves
    /// forward, regardless of whether its rounded `S` changed — the
    /// `goto skip_unblock` shortcut is resolved in favor of correctness
    /// (DESIGN.md decision 1).
    fn unblock_cascade(&mut self, served_index: u8, old_f: FixedPoint) {
        let cascades = match self.bitmaps.lowest_above(GroupState::Er, served_index) {
            Some(next) => self.groups[next as usize].f.lt(old_f),
            None => true,
        };
        if !cascades {
            return;
        }
        let mask = bitmap::mask_below(GROUP_MASK, served_index);
        if mask != 0 {
            log::trace!(
                "qfq-core: unblock cascade below group {served_index} (mask {mask:#x})"
            );
            self.bitmaps.unblock(mask);
        }
    }
}
