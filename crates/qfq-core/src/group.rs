//! Group / slot store (spec §3, §4.2).
//!
//! Each group is a 32-slot circular buffer of class lists. The physical
//! slot array never moves; `front` tracks which physical slot is logical
//! slot 0, and `full_slots` is a front-relative occupancy bitmap.

#[cfg(feature = "std")]
use std::collections::VecDeque;

#[cfg(not(feature = "std"))]
use alloc::collections::VecDeque;

use alloc::vec::Vec;

use crate::class::ClassId;
use crate::fixed::{slot_shift, FixedPoint, GroupIndex, NUM_SLOTS};

/// One of the `NUM_GROUPS` permanent bins a class falls into based on its
/// `L / w` ratio.
pub struct Group {
    index: GroupIndex,
    slot_shift: u32,
    pub s: FixedPoint,
    pub f: FixedPoint,
    front: u8,
    full_slots: u32,
    slots: Vec<VecDeque<ClassId>>,
}

impl Group {
    pub fn new(index: GroupIndex) -> Self {
        Self {
            index,
            slot_shift: slot_shift(index.get()),
            s: FixedPoint::ZERO,
            f: FixedPoint::ZERO,
            front: 0,
            full_slots: 0,
            slots: (0..NUM_SLOTS).map(|_| VecDeque::new()).collect(),
        }
    }

    pub fn index(&self) -> GroupIndex {
        self.index
    }

    pub fn slot_shift(&self) -> u32 {
        self.slot_shift
    }

    pub fn full_slots(&self) -> u32 {
        self.full_slots
    }

    pub fn is_empty(&self) -> bool {
        self.full_slots == 0
    }

    /// Quantizes a class timestamp to this group's slot resolution.
    pub fn round_down(&self, t: FixedPoint) -> FixedPoint {
        t.round_down(self.slot_shift)
    }

    fn logical_slot(&self, rounded_s: FixedPoint) -> u32 {
        rounded_s.wrapping_sub(self.s).shr(self.slot_shift)
    }

    fn physical(&self, logical: u8) -> usize {
        ((self.front as usize) + logical as usize) % NUM_SLOTS
    }

    /// Inserts `c` (already rounded to `rounded_s`) into its slot.
    ///
    /// Returns the logical slot used. A computed slot `>= 32` is an
    /// invariant violation (spec §7 `SlotOverflow`): debug builds assert,
    /// release builds clamp to 31 and log once (spec's resolved Open
    /// Question, see SPEC_FULL.md §11.4).
    pub fn insert(&mut self, c: ClassId, rounded_s: FixedPoint) -> u8 {
        let raw_slot = self.logical_slot(rounded_s);
        debug_assert!(
            raw_slot < NUM_SLOTS as u64,
            "slot overflow: group {} computed slot {}",
            self.index.get(),
            raw_slot
        );
        let logical = if raw_slot < NUM_SLOTS as u64 {
            raw_slot as u8
        } else {
            log::warn!(
                "qfq-core: slot overflow in group {} (raw slot {}), clamping to 31",
                self.index.get(),
                raw_slot
            );
            31
        };
        let phys = self.physical(logical);
        self.slots[phys].push_front(c);
        self.full_slots |= 1u32 << logical;
        logical
    }

    /// Removes `c`, whose (pre-removal) start timestamp was `s_of_c`.
    pub fn remove(&mut self, c: ClassId, s_of_c: FixedPoint) {
        let rounded = self.round_down(s_of_c);
        let raw_slot = self.logical_slot(rounded);
        let logical = raw_slot.min(NUM_SLOTS as u64 - 1) as u8;
        let phys = self.physical(logical);
        if let Some(pos) = self.slots[phys].iter().position(|&id| id == c) {
            self.slots[phys].remove(pos);
        }
        if self.slots[phys].is_empty() {
            self.full_slots &= !(1u32 << logical);
        }
    }

    /// First class at logical slot 0 (the physical slot at `front`).
    pub fn head(&self) -> Option<ClassId> {
        self.slots[self.front as usize].front().copied()
    }

    /// Removes `c` from the front (logical slot 0) slot directly, without
    /// recomputing its slot from a timestamp. Used when serving a class:
    /// the served class is always the group's current head (spec §4.6).
    pub fn remove_front(&mut self, c: ClassId) {
        let phys = self.front as usize;
        if let Some(pos) = self.slots[phys].iter().position(|&id| id == c) {
            self.slots[phys].remove(pos);
        }
        if self.slots[phys].is_empty() {
            self.full_slots &= !1u32;
        }
    }

    /// Advances the logical origin to the lowest non-empty slot and returns
    /// its head class.
    pub fn scan(&mut self) -> Option<ClassId> {
        if self.full_slots == 0 {
            return None;
        }
        let i = self.full_slots.trailing_zeros();
        self.front = ((self.front as u32 + i) % NUM_SLOTS as u32) as u8;
        self.full_slots >>= i;
        self.head()
    }

    /// Retreats the group's origin to `rounded_s < self.s`, shifting
    /// `full_slots` and `front` to match, and setting `s = rounded_s`.
    pub fn rotate(&mut self, rounded_s: FixedPoint) {
        debug_assert!(
            rounded_s.lt(self.s),
            "rotate called with rounded_s >= group.s"
        );
        let i = self.s.wrapping_sub(rounded_s).shr(self.slot_shift);
        let i = i.min(NUM_SLOTS as u64 - 1) as u32;
        self.full_slots = if i >= 32 { 0 } else { self.full_slots << i };
        self.front = ((self.front as i32 - i as i32).rem_euclid(NUM_SLOTS as i32)) as u8;
        self.s = rounded_s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grp(index: u8) -> Group {
        Group::new(GroupIndex::new(index).unwrap())
    }

    #[test]
    fn insert_and_head_roundtrip() {
        let mut g = grp(0);
        g.s = FixedPoint::ZERO;
        let c = ClassId::new(1);
        let rounded = g.round_down(FixedPoint::new(0));
        g.insert(c, rounded);
        assert_eq!(g.head(), Some(c));
        assert_eq!(g.full_slots(), 1);
    }

    #[test]
    fn scan_advances_to_lowest_nonempty_slot() {
        let mut g = grp(0);
        g.s = FixedPoint::ZERO;
        let shift = g.slot_shift();
        let c1 = ClassId::new(1);
        let c2 = ClassId::new(2);
        g.insert(c1, FixedPoint::ZERO);
        g.insert(c2, FixedPoint::new(3u64 << shift));
        // slot 0 occupied by c1; scanning from empty front stays at slot 0
        assert_eq!(g.scan(), Some(c1));
        g.remove(c1, FixedPoint::ZERO);
        assert_eq!(g.scan(), Some(c2));
    }

    #[test]
    fn rotate_retreats_origin_and_shifts_occupancy() {
        let mut g = grp(0);
        let shift = g.slot_shift();
        g.s = FixedPoint::new(10u64 << shift);
        let c = ClassId::new(1);
        let rounded = g.round_down(FixedPoint::new(10u64 << shift));
        g.insert(c, rounded);
        assert_eq!(g.full_slots(), 1);

        let new_s = FixedPoint::new(8u64 << shift);
        g.rotate(new_s);
        assert_eq!(g.s, new_s);
        // occupancy moved from logical slot 0 to logical slot 2
        assert_eq!(g.full_slots(), 0b100);
    }

    #[test]
    fn identical_start_classes_stay_in_one_slot() {
        // S6: 33 classes with identical S never overflow full_slots.
        let mut g = grp(0);
        g.s = FixedPoint::ZERO;
        for i in 0..33u32 {
            g.insert(ClassId::new(i), FixedPoint::ZERO);
        }
        assert_eq!(g.full_slots(), 1);
    }
}
