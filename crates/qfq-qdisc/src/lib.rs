#![doc = r#"# qfq-qdisc

The host-facing glue for QFQ-RL (spec §6): validated configuration types, the
[`QdiscHost`] trait capturing the host queueing-discipline contract, and
[`QfqRl`], a facade wiring `qfq-core`'s scheduler together with
`qfq-classify`'s classifier.

`QfqRl` is a *synchronous* facade: it owns its [`qfq_core::scheduler::Scheduler`]
directly and calls `push`/`activate`/`dequeue` inline on whatever thread calls
its methods, rather than handing the scheduler off to a pinned dispatcher
thread. That is the right shape for a single-threaded host, a test harness, or
the CLI demo in `bin/qfqrl-demo.rs` — anywhere the host itself already
serializes access. A host that wants the full multi-producer concurrency
model (arbitrary producer CPUs feeding one pinned dispatcher) wires
`qfq_core::scheduler::Scheduler`, `qfq_classify::Classifier`, and
`qfq_dispatch::Dispatcher` together directly instead of going through this
facade — see `qfq-dispatch`'s module docs for that path. Recorded as an Open
Question resolution in DESIGN.md.
"#]

pub mod config;
pub mod error;
pub mod host;

use std::collections::BTreeMap;

use qfq_core::class::ClassId;
use qfq_core::fixed::FixedPoint;
use qfq_core::packet::Packet;
use qfq_core::scheduler::{Scheduler, SchedulerOptions};
use qfq_core::stats::{ClassStats, SchedulerStats};

use qfq_classify::{ClassifyCache, Classifier, ConnectionId, SchedulerHandle, Verdict};
use qfq_dispatch::Transmit;

pub use config::{ClassConfig, SchedulerConfig, DEFAULT_SPIN_CPU};
pub use error::QdiscError;
pub use host::QdiscHost;

/// Default capacity of the per-connection classify cache a fresh [`QfqRl`]
/// is constructed with.
const DEFAULT_CLASSIFY_CACHE_CAPACITY: usize = 4096;

/// Wires a [`Scheduler`], a [`Classifier`], and a packet sink into the single
/// [`QdiscHost`] entry point a host calls. See the module docs for why this
/// drives the scheduler inline rather than through `qfq-dispatch`.
pub struct QfqRl<T: Transmit> {
    scheduler: Scheduler,
    classifier: Classifier,
    cache: ClassifyCache,
    class_configs: BTreeMap<ClassId, ClassConfig>,
    transmit: T,
}

impl<T: Transmit> QfqRl<T> {
    /// Builds a fresh scheduler from validated [`SchedulerConfig`], wired to
    /// `transmit` as the packet sink a successful `dequeue` hands packets to.
    pub fn new(config: SchedulerConfig, transmit: T, now_ns: u64) -> Result<Self, QdiscError> {
        config.validate()?;
        let options = SchedulerOptions {
            link_speed_mbps: config.link_speed_mbps,
            inner_queue_capacity: config.inner_queue_capacity,
        };
        Ok(Self {
            scheduler: Scheduler::new(options, now_ns),
            classifier: Classifier::new(SchedulerHandle(0)),
            cache: ClassifyCache::new(DEFAULT_CLASSIFY_CACHE_CAPACITY),
            class_configs: BTreeMap::new(),
            transmit,
        })
    }

    /// Mutable access to the classifier, for pushing filters onto the chain
    /// (spec §4.7). Priority-table bindings go through [`Self::bind_priority`]
    /// / [`Self::unbind_priority`] instead, which is the only way to keep the
    /// bound class's `filter_cnt` in sync with the table (`PriorityTable::bind`
    /// takes `&mut Scheduler`, which this accessor alone can't supply).
    pub fn classifier_mut(&mut self) -> &mut Classifier {
        &mut self.classifier
    }

    /// Binds `priority` to `class` in the direct priority table, bumping
    /// `class`'s `filter_cnt` on the scheduler (spec §3, §4.7).
    pub fn bind_priority(&mut self, priority: u8, class: ClassId) -> Result<(), QdiscError> {
        self.classifier
            .priorities_mut()
            .bind(&mut self.scheduler, priority, class)?;
        Ok(())
    }

    /// Unbinds `priority` from the priority table, releasing its bound
    /// class's `filter_cnt` hold, if any.
    pub fn unbind_priority(&mut self, priority: u8) -> Result<(), QdiscError> {
        self.classifier
            .priorities_mut()
            .unbind(&mut self.scheduler, priority)?;
        Ok(())
    }

    pub fn v(&self) -> FixedPoint {
        self.scheduler.v()
    }

    /// Classifies and enqueues `pkt` for a specific connection, consulting
    /// the classify cache keyed on `conn` (spec §4.7). [`QdiscHost::enqueue`]
    /// calls this with a connection id synthesized from the packet itself,
    /// since the host trait's `enqueue` has no connection parameter to plumb
    /// a caller-supplied one through; callers that track real per-connection
    /// state should call this directly instead.
    pub fn enqueue_for_connection(
        &mut self,
        conn: ConnectionId,
        pkt: Packet,
    ) -> Result<(), QdiscError> {
        let class = match self.classifier.classify(&mut self.cache, conn, &pkt) {
            Verdict::Class(class) => class,
            Verdict::Drop => return Err(QdiscError::ClassifyDrop),
        };
        let became_backlogged = self.scheduler.push(class, pkt)?;
        if became_backlogged {
            // The 0->1 transition; `push` already gated this on the class
            // not being disabled (spec §4.5 step 3), so activation always
            // applies here.
            self.scheduler.activate(class)?;
        }
        Ok(())
    }

    /// Runs one `dequeue()` (spec §4.6) and, if a packet was served, hands it
    /// to the configured [`Transmit`] sink. Returns whether a packet was
    /// served — the inline equivalent of one iteration of `qfq-dispatch`'s
    /// dispatcher loop body.
    pub fn dispatch_tick(&mut self, now_ns: u64) -> bool {
        match self.scheduler.dequeue(now_ns) {
            Some(dequeued) => {
                self.transmit.transmit(dequeued.class, dequeued.packet);
                true
            }
            None => false,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

impl<T: Transmit> QdiscHost for QfqRl<T> {
    fn enqueue(&mut self, pkt: Packet) -> Result<(), QdiscError> {
        let conn = ConnectionId(pkt.priority as u64);
        self.enqueue_for_connection(conn, pkt)
    }

    fn peek(&self, class: ClassId) -> Option<u32> {
        self.scheduler
            .class(class)
            .map(|c| c.next_len())
            .filter(|&len| len > 0)
    }

    fn create_class(&mut self, id: ClassId, config: ClassConfig) -> Result<(), QdiscError> {
        config.validate()?;
        self.scheduler.create_class(id, config.weight, config.lmax)?;
        self.class_configs.insert(id, config);
        Ok(())
    }

    fn update_class(&mut self, id: ClassId, config: ClassConfig) -> Result<(), QdiscError> {
        config.validate()?;
        self.scheduler.update_class(id, config.weight, config.lmax)?;
        self.class_configs.insert(id, config);
        Ok(())
    }

    fn delete_class(&mut self, id: ClassId) -> Result<(), QdiscError> {
        self.scheduler.delete_class(id)?;
        self.class_configs.remove(&id);
        Ok(())
    }

    fn walk_classes(&self, f: &mut dyn FnMut(ClassId)) {
        for id in self.class_configs.keys() {
            f(*id);
        }
    }

    fn dump_class(&self, id: ClassId) -> Option<ClassStats> {
        self.scheduler.class_stats(id)
    }

    fn dump_scheduler(&self) -> SchedulerStats {
        self.scheduler.stats()
    }

    fn reset(&mut self) {
        // `now_ns` re-anchoring on reset: the virtual-time engine's
        // `last_updated_ns` must track wall-clock from the moment of reset,
        // not drift from whenever the scheduler was first constructed.
        self.scheduler.reset(0);
    }

    fn destroy(self) {}
}
