//! The dispatcher loop (spec §5, §4.5 step 3 "Activation is never performed
//! inline...the dispatcher performs it"): a single thread, pinned to a
//! configured CPU, that owns the [`qfq_core::scheduler::Scheduler`] outright
//! and alternates between draining activation queues and calling
//! `Scheduler::dequeue`.
//!
//! Grounded on `qxk::kernel::QxkKernel::dispatch_once`/`run_until_idle`: the
//! same "drain one unit of work, loop until nothing left" shape, generalized
//! from active-object dispatch to activation-then-dequeue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use qfq_core::scheduler::Scheduler;

use crate::activation::{Activation, ActivationQueues};
use crate::config_queue::{ConfigCommand, ConfigQueue, ConfigRequest};
use crate::pin::{pin_to_cpu, set_realtime_priority};

/// After this many consecutive iterations with work to do, the dispatcher
/// yields once anyway so it cannot starve other threads on the same core
/// under a sustained flood (spec §5: "yields every ~100k iterations").
const BUSY_YIELD_INTERVAL: u64 = 100_000;

/// While there is nothing to do, the dispatcher spins this many times before
/// yielding, rather than sleeping immediately — avoids paying a scheduler
/// round-trip for a backlog that clears within a few microseconds (spec §5:
/// "yielding every ~10k spins while waiting").
const IDLE_SPIN_INTERVAL: u64 = 10_000;

/// Receives packets the dispatcher has dequeued. Kept as a plain trait
/// (rather than a channel) so a host can transmit directly with no extra
/// hop — the dispatcher calls this inline, on its own thread, per spec's
/// resolution that `QdiscHost::dequeue` is a no-op and transmission happens
/// through a callback supplied at construction time (SPEC_FULL.md §11.2).
pub trait Transmit: Send {
    fn transmit(&mut self, class: qfq_core::class::ClassId, packet: qfq_core::packet::Packet);
}

impl<F> Transmit for F
where
    F: FnMut(qfq_core::class::ClassId, qfq_core::packet::Packet) + Send,
{
    fn transmit(&mut self, class: qfq_core::class::ClassId, packet: qfq_core::packet::Packet) {
        (self)(class, packet)
    }
}

/// Construction-time knobs for the dispatcher thread.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// CPU to pin the dispatcher thread to; negative disables pinning
    /// (spec §6 `spin_cpu`, default `2`).
    pub spin_cpu: i32,
    /// `SCHED_FIFO` priority to request; `None` leaves the default
    /// scheduling class untouched.
    pub realtime_priority: Option<i32>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            spin_cpu: 2,
            realtime_priority: None,
        }
    }
}

/// A cooperative stop signal for a running dispatcher (spec §5 "Cooperative
/// shutdown via flag").
#[derive(Clone)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The dispatcher itself. Owns the scheduler outright — nothing here is
/// `Sync`, matching the "dispatcher-exclusive ownership" rule in spec §5.
pub struct Dispatcher<T: Transmit> {
    scheduler: Scheduler,
    queues: Arc<ActivationQueues>,
    config_queue: Arc<ConfigQueue>,
    transmit: T,
    shutdown: Arc<AtomicBool>,
    config: DispatcherConfig,
    epoch: Instant,
}

impl<T: Transmit + 'static> Dispatcher<T> {
    pub fn new(
        scheduler: Scheduler,
        queues: Arc<ActivationQueues>,
        config_queue: Arc<ConfigQueue>,
        transmit: T,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            scheduler,
            queues,
            config_queue,
            transmit,
            shutdown: Arc::new(AtomicBool::new(false)),
            config,
            epoch: Instant::now(),
        }
    }

    /// Spawns the dispatcher loop on its own OS thread, pinned and
    /// (optionally) raised to `SCHED_FIFO` before entering the loop. Returns
    /// a join handle plus a [`ShutdownHandle`] the caller uses to stop it.
    pub fn spawn(self) -> (JoinHandle<Scheduler>, ShutdownHandle) {
        let shutdown = ShutdownHandle(Arc::clone(&self.shutdown));
        let handle = std::thread::Builder::new()
            .name("qfq-dispatch".into())
            .spawn(move || self.run())
            .expect("failed to spawn dispatcher thread");
        (handle, shutdown)
    }

    /// Runs the loop until shutdown, returning the scheduler so a caller
    /// that only needed a bounded run (tests, the demo binary) can inspect
    /// final state.
    fn run(mut self) -> Scheduler {
        pin_to_cpu(self.config.spin_cpu);
        if let Some(priority) = self.config.realtime_priority {
            set_realtime_priority(priority);
        }
        log::debug!("qfq-dispatch: dispatcher started (spin_cpu={})", self.config.spin_cpu);

        let mut busy_iterations: u64 = 0;
        let mut idle_spins: u64 = 0;
        let mut batch: Vec<Activation> = Vec::new();

        while !self.shutdown.load(Ordering::Relaxed) {
            let did_work = self.step(&mut batch);

            if did_work {
                idle_spins = 0;
                busy_iterations += 1;
                if busy_iterations >= BUSY_YIELD_INTERVAL {
                    std::thread::yield_now();
                    busy_iterations = 0;
                }
            } else {
                busy_iterations = 0;
                idle_spins += 1;
                if idle_spins >= IDLE_SPIN_INTERVAL {
                    std::thread::yield_now();
                    idle_spins = 0;
                }
            }
        }

        log::debug!("qfq-dispatch: dispatcher stopped");
        self.scheduler
    }

    /// One iteration: drain every activation queue with pending work, then
    /// attempt a single dequeue-and-transmit. Returns whether anything
    /// happened, which drives the busy/idle cadence in [`Self::run`].
    fn step(&mut self, batch: &mut Vec<Activation>) -> bool {
        let mut did_work = false;

        if !self.config_queue.is_empty() {
            did_work = true;
            self.drain_config_requests();
        }

        if self.queues.has_work() {
            for executor in 0..self.queues.executor_count() {
                batch.clear();
                self.queues.drain_into(executor, batch);
                if batch.is_empty() {
                    continue;
                }
                did_work = true;
                log::trace!(
                    "qfq-dispatch: draining {} activation(s) from executor {executor}",
                    batch.len()
                );
                for activation in batch.drain(..) {
                    if let Err(err) = self.scheduler.activate(activation.class) {
                        log::warn!("qfq-dispatch: activate({}) failed: {err}", activation.class);
                    }
                }
            }
        }

        let now_ns = self.epoch.elapsed().as_nanos() as u64;
        if let Some(dequeued) = self.scheduler.dequeue(now_ns) {
            did_work = true;
            self.transmit.transmit(dequeued.class, dequeued.packet);
        }

        did_work
    }

    /// Applies every pending configuration command in submission order,
    /// replying to each caller before moving on — the "tree lock held by
    /// configuration paths" realized as dispatcher-exclusive mutation
    /// rather than a literal shared lock (spec §5).
    fn drain_config_requests(&mut self) {
        let mut requests: Vec<ConfigRequest> = Vec::new();
        self.config_queue.drain_into(&mut requests);
        for request in requests {
            let command = request.command;
            let result = match command {
                ConfigCommand::Create { id, weight, lmax } => self
                    .scheduler
                    .create_class(id, weight, lmax)
                    .map(|()| self.scheduler.class_queue_handle(id)),
                ConfigCommand::Update { id, weight, lmax } => {
                    self.scheduler.update_class(id, weight, lmax).map(|()| None)
                }
                ConfigCommand::Delete { id } => self.scheduler.delete_class(id).map(|()| None),
            };
            if let Err(ref err) = result {
                log::warn!("qfq-dispatch: config command failed: {err}");
            }
            request.reply(result);
        }
    }
}
