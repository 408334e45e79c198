//! Drives a real dispatcher thread against a burst of activations posted
//! from a separate thread, the way `qxk/tests/thread_integration.rs` drives
//! its kernel (SPEC_FULL.md §10).
//!
//! Packets are pushed before the scheduler is handed to the dispatcher:
//! `Scheduler::push` takes `&mut self`, and the scheduler's interior is
//! dispatcher-exclusive once spawned (spec §5), so a producer's only
//! cross-thread handle is the activation queue, not the scheduler itself.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use qfq_core::class::ClassId;
use qfq_core::packet::Packet;
use qfq_core::scheduler::{Scheduler, SchedulerOptions};
use qfq_dispatch::{Activation, ActivationQueues, ConfigQueue, Dispatcher, DispatcherConfig};

#[test]
fn activations_posted_from_another_thread_are_drained_and_transmitted() {
    let mut scheduler = Scheduler::new(SchedulerOptions::default(), 0);
    let class_a = ClassId::new(1);
    let class_b = ClassId::new(2);
    scheduler.create_class(class_a, 10, 1500).unwrap();
    scheduler.create_class(class_b, 20, 1500).unwrap();
    for _ in 0..10 {
        scheduler.push(class_a, Packet::new(500, 0)).unwrap();
    }
    for _ in 0..10 {
        scheduler.push(class_b, Packet::new(500, 0)).unwrap();
    }

    let queues = Arc::new(ActivationQueues::new(1, 64).unwrap());

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let transmit = move |class: ClassId, packet: Packet| {
        sink.lock().unwrap().push((class, packet.len));
    };

    let config_queue = Arc::new(ConfigQueue::new());
    let dispatcher = Dispatcher::new(
        scheduler,
        Arc::clone(&queues),
        config_queue,
        transmit,
        DispatcherConfig {
            spin_cpu: -1,
            realtime_priority: None,
        },
    );
    let (handle, shutdown) = dispatcher.spawn();

    let poster_queues = Arc::clone(&queues);
    let poster = std::thread::spawn(move || {
        poster_queues.post(0, Activation { class: class_a }).unwrap();
        poster_queues.post(0, Activation { class: class_b }).unwrap();
    });
    poster.join().unwrap();

    std::thread::sleep(Duration::from_millis(50));
    shutdown.shutdown();
    let scheduler = handle.join().expect("dispatcher thread panicked");

    assert_eq!(scheduler.backlog(), 0);
    let events = received.lock().unwrap();
    assert_eq!(events.len(), 20);
    assert_eq!(events.iter().filter(|(c, _)| *c == class_a).count(), 10);
    assert_eq!(events.iter().filter(|(c, _)| *c == class_b).count(), 10);
}

#[test]
fn both_classes_are_served_within_the_first_round() {
    let mut scheduler = Scheduler::new(SchedulerOptions::default(), 0);
    let heavy = ClassId::new(1);
    let light = ClassId::new(2);
    scheduler.create_class(heavy, 20, 1500).unwrap();
    scheduler.create_class(light, 10, 1500).unwrap();
    scheduler.push(light, Packet::new(1000, 0)).unwrap();
    scheduler.push(heavy, Packet::new(1000, 0)).unwrap();

    let queues = Arc::new(ActivationQueues::new(1, 8).unwrap());
    queues.post(0, Activation { class: light }).unwrap();
    queues.post(0, Activation { class: heavy }).unwrap();

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let transmit = move |class: ClassId, _packet: Packet| {
        sink.lock().unwrap().push(class);
    };

    let config_queue = Arc::new(ConfigQueue::new());
    let dispatcher = Dispatcher::new(
        scheduler,
        queues,
        config_queue,
        transmit,
        DispatcherConfig {
            spin_cpu: -1,
            realtime_priority: None,
        },
    );
    let (handle, shutdown) = dispatcher.spawn();

    std::thread::sleep(Duration::from_millis(20));
    shutdown.shutdown();
    let _scheduler = handle.join().expect("dispatcher thread panicked");

    let events = received.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert!(events.contains(&heavy));
    assert!(events.contains(&light));
}
