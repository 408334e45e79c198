//! Drives `Scheduler` the way the dispatcher would (push, activate, dequeue
//! in strict sequence) against the concrete scenarios and laws spec.md §8
//! names (S1-S6, L1-L3).

use std::collections::HashSet;

use qfq_core::class::ClassId;
use qfq_core::error::SchedError;
use qfq_core::packet::Packet;
use qfq_core::scheduler::{Scheduler, SchedulerOptions};

fn sched() -> Scheduler {
    Scheduler::new(SchedulerOptions::default(), 0)
}

fn fill(scheduler: &mut Scheduler, id: ClassId, count: u32, len: u32) {
    for _ in 0..count {
        scheduler.push(id, Packet::new(len, 0)).unwrap();
    }
    scheduler.activate(id).unwrap();
}

fn drain_all(scheduler: &mut Scheduler) -> Vec<ClassId> {
    drain_all_from(scheduler, 0)
}

/// Like [`drain_all`], but starting the clock at `start_ns` — for callers
/// that already advanced the scheduler's clock past `0` themselves, keeping
/// the nanosecond reading handed to `dequeue` monotonic throughout the test.
fn drain_all_from(scheduler: &mut Scheduler, start_ns: u64) -> Vec<ClassId> {
    let mut served = Vec::new();
    let mut now_ns = start_ns;
    while let Some(dequeued) = scheduler.dequeue(now_ns) {
        served.push(dequeued.class);
        now_ns += 1_000;
    }
    served
}

/// S1/L1: long-run byte ratios track weight ratios within about one packet.
#[test]
fn s1_weighted_fairness_within_one_packet() {
    let mut scheduler = sched();
    let a = ClassId::new(1);
    let b = ClassId::new(2);
    let c = ClassId::new(3);
    scheduler.create_class(a, 1, 2048).unwrap();
    scheduler.create_class(b, 2, 2048).unwrap();
    scheduler.create_class(c, 1, 2048).unwrap();

    fill(&mut scheduler, a, 1000, 1500);
    fill(&mut scheduler, b, 1000, 1500);
    fill(&mut scheduler, c, 1000, 1500);

    drain_all(&mut scheduler);

    let bytes_a = scheduler.class_stats(a).unwrap().bytes;
    let bytes_b = scheduler.class_stats(b).unwrap().bytes;
    let bytes_c = scheduler.class_stats(c).unwrap().bytes;

    assert_eq!(bytes_a, 1000 * 1500);
    assert_eq!(bytes_c, 1000 * 1500);
    let diff_ac = bytes_a.abs_diff(bytes_c);
    assert!(diff_ac <= 1500, "A/C byte gap {diff_ac} exceeds one packet");

    let diff_b = (bytes_b as i64 - 2 * bytes_a as i64).unsigned_abs();
    assert!(diff_b <= 1500, "B should track 2x A within one packet, got {diff_b}");
}

/// S2: a lone backlogged class serves its packet on the very first dequeue.
#[test]
fn s2_single_class_serves_on_first_dequeue() {
    let mut scheduler = sched();
    let a = ClassId::new(1);
    scheduler.create_class(a, 10, 1500).unwrap();
    fill(&mut scheduler, a, 1, 1000);

    let served = scheduler.dequeue(1_000_000).expect("A should be immediately eligible");
    assert_eq!(served.class, a);
    assert_eq!(served.packet.len, 1000);
    assert_eq!(scheduler.backlog(), 0);
}

/// S3: a class that goes backlogged while another is already being served
/// gets picked up without disturbing the already-running one.
#[test]
fn s3_newly_backlogged_class_joins_without_disrupting_the_running_one() {
    let mut scheduler = sched();
    let a = ClassId::new(1);
    let b = ClassId::new(2);
    // Different weight/lmax so A and B land in different groups.
    scheduler.create_class(a, 1, 2048).unwrap();
    scheduler.create_class(b, 1000, 2048).unwrap();
    assert_ne!(
        scheduler.class(a).unwrap().group().get(),
        scheduler.class(b).unwrap().group().get(),
        "test setup should put A and B in different groups"
    );

    fill(&mut scheduler, a, 5, 1000);
    let mut now_ns = 0u64;
    let first = scheduler.dequeue(now_ns).unwrap();
    assert_eq!(first.class, a);

    // B becomes backlogged only now, after A is already mid-service.
    fill(&mut scheduler, b, 5, 1000);

    let mut served = HashSet::new();
    served.insert(first.class);
    while scheduler.backlog() > 0 {
        now_ns += 1_000;
        if let Some(dequeued) = scheduler.dequeue(now_ns) {
            served.insert(dequeued.class);
        }
    }
    assert!(served.contains(&a));
    assert!(served.contains(&b));
    assert_eq!(scheduler.class_stats(a).unwrap().packets, 5);
    assert_eq!(scheduler.class_stats(b).unwrap().packets, 5);
}

/// S4: disabling a class (weight -> 0) mid-service drops it from
/// `wsum_active` immediately and serves only its already-queued head packet
/// once more; subsequent dequeues never return it again.
#[test]
fn s4_disabling_a_class_mid_service_retires_it_after_one_more_dequeue() {
    let mut scheduler = sched();
    let a = ClassId::new(1);
    let b = ClassId::new(2);
    let c = ClassId::new(3);
    scheduler.create_class(a, 10, 1500).unwrap();
    scheduler.create_class(b, 10, 1500).unwrap();
    scheduler.create_class(c, 10, 1500).unwrap();

    fill(&mut scheduler, a, 2, 1000);
    let first = scheduler.dequeue(0).unwrap();
    assert_eq!(first.class, a);

    let wsum_active_before = scheduler.wsum_active();
    scheduler.update_class(a, 0, 1500).unwrap();
    assert!(scheduler.class(a).unwrap().is_disabled());
    assert!(
        scheduler.wsum_active() < wsum_active_before,
        "disabling should drop wsum_active immediately (spec §8 S4)"
    );

    // A's last queued packet is still served once, since its slot was
    // already occupied when it got disabled.
    let second = scheduler.dequeue(1_000).unwrap();
    assert_eq!(second.class, a);
    assert_eq!(scheduler.class_stats(a).unwrap().packets, 2);

    fill(&mut scheduler, b, 3, 1000);
    fill(&mut scheduler, c, 3, 1000);
    let served = drain_all_from(&mut scheduler, 2_000);
    assert!(served.iter().all(|&id| id != a), "A must never be served again once disabled");
    assert_eq!(scheduler.class_stats(a).unwrap().packets, 2);
    assert_eq!(scheduler.class_stats(b).unwrap().packets, 3);
    assert_eq!(scheduler.class_stats(c).unwrap().packets, 3);
}

/// S5: deleting a class while `filter_cnt > 0` is rejected with `ClassBusy`
/// and leaves the class registered; releasing the binding allows deletion.
#[test]
fn s5_delete_while_bound_is_rejected_then_succeeds_after_unbind() {
    let mut scheduler = sched();
    let c = ClassId::new(3);
    scheduler.create_class(c, 10, 1500).unwrap();
    scheduler.bind_filter(c).unwrap();

    assert_eq!(
        scheduler.delete_class(c),
        Err(SchedError::ClassBusy { class: c })
    );
    assert!(scheduler.class(c).is_some(), "state must be unchanged after the rejected delete");

    scheduler.unbind_filter(c).unwrap();
    assert!(scheduler.delete_class(c).is_ok());
    assert!(scheduler.class(c).is_none());
}

/// S6: 33 classes sharing a group via identical weight/lmax (and therefore
/// identical initial S) all land in one logical slot; no `SlotOverflow`.
#[test]
fn s6_many_classes_with_identical_start_share_one_slot_without_overflow() {
    let mut scheduler = sched();
    let ids: Vec<ClassId> = (0..33u32).map(ClassId::new).collect();
    for &id in &ids {
        scheduler.create_class(id, 10, 1500).unwrap();
    }
    for &id in &ids {
        fill(&mut scheduler, id, 1, 100);
    }
    assert_eq!(scheduler.backlog(), 33);

    let served = drain_all(&mut scheduler);
    assert_eq!(served.len(), 33);
    let unique: HashSet<ClassId> = served.into_iter().collect();
    assert_eq!(unique.len(), 33, "every class should be served exactly once");
}

/// L2: re-entering push on an already-backlogged class reports no further
/// activation is needed, and a single activate() still drains every packet.
#[test]
fn l2_reentrant_push_on_backlogged_class_does_not_require_a_second_activation() {
    let mut scheduler = sched();
    let a = ClassId::new(1);
    scheduler.create_class(a, 10, 1500).unwrap();

    assert!(scheduler.push(a, Packet::new(100, 0)).unwrap(), "first push is the 0->1 transition");
    assert!(!scheduler.push(a, Packet::new(100, 0)).unwrap(), "second push must not re-request activation");

    scheduler.activate(a).unwrap();
    let served = drain_all(&mut scheduler);
    assert_eq!(served, vec![a, a]);
}

/// L3: updating a class to its own (weight, lmax) is a no-op on scheduling
/// state, not just a successful call.
#[test]
fn l3_round_trip_update_is_a_scheduling_state_no_op() {
    let mut scheduler = sched();
    let a = ClassId::new(1);
    scheduler.create_class(a, 10, 1500).unwrap();
    fill(&mut scheduler, a, 3, 1000);

    let wsum_before = scheduler.wsum();
    let wsum_active_before = scheduler.wsum_active();
    let s_before = scheduler.class(a).unwrap().s;
    let f_before = scheduler.class(a).unwrap().f;
    let slot_before = scheduler.class(a).unwrap().slot_group();

    scheduler.update_class(a, 10, 1500).unwrap();

    assert_eq!(scheduler.wsum(), wsum_before);
    assert_eq!(scheduler.wsum_active(), wsum_active_before);
    assert_eq!(scheduler.class(a).unwrap().s, s_before);
    assert_eq!(scheduler.class(a).unwrap().f, f_before);
    assert_eq!(scheduler.class(a).unwrap().slot_group(), slot_before);
}
