#![doc = r#"# qfq-classify

The classifier binding for QFQ-RL (spec §4.7): a per-connection fast-path
cache on the producing endpoint, falling back to a direct priority-handle
match and then an ordered filter chain.

None of this touches scheduler state directly — it only decides *which*
[`qfq_core::class::ClassId`] a packet belongs to. The producer still pushes
the packet onto that class's inner queue itself via
[`qfq_core::scheduler::Scheduler::push`] (through whatever handle the host
wires up, typically `qfq-dispatch`'s activation path).
"#]

pub mod cache;
pub mod filter;

use qfq_core::class::ClassId;
use qfq_core::packet::Packet;

pub use cache::{ClassifyCache, ConnectionId, SchedulerHandle};
pub use filter::{Filter, FilterAction, FilterChain, PriorityTable};

/// Outcome of a full classify pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Class(ClassId),
    Drop,
}

/// Ties the per-connection cache, the direct priority table, and the
/// ordered filter chain into the single classify entry point producers
/// call (spec §4.7).
pub struct Classifier {
    scheduler: SchedulerHandle,
    priorities: PriorityTable,
    filters: FilterChain,
}

impl Classifier {
    pub fn new(scheduler: SchedulerHandle) -> Self {
        Self {
            scheduler,
            priorities: PriorityTable::new(),
            filters: FilterChain::new(),
        }
    }

    pub fn priorities_mut(&mut self) -> &mut PriorityTable {
        &mut self.priorities
    }

    pub fn filters_mut(&mut self) -> &mut FilterChain {
        &mut self.filters
    }

    /// Classifies `pkt` for `conn`, consulting `cache` first. A miss falls
    /// back to the direct priority table, then the filter chain; either
    /// fallback hit is cached for next time (spec §4.7).
    pub fn classify(
        &self,
        cache: &mut ClassifyCache,
        conn: ConnectionId,
        pkt: &Packet,
    ) -> Verdict {
        if let Some((handle, class)) = cache.lookup(conn) {
            if handle == self.scheduler {
                log::trace!("qfq-classify: cache hit {conn:?} -> {class}");
                return Verdict::Class(class);
            }
        }

        if let Some(class) = self.priorities.lookup(pkt.priority) {
            log::trace!("qfq-classify: direct priority {} -> {class}", pkt.priority);
            cache.insert(conn, self.scheduler, class);
            return Verdict::Class(class);
        }

        match self.filters.classify(pkt) {
            Some(FilterAction::Classify(class)) | Some(FilterAction::Redirect(class)) => {
                log::trace!("qfq-classify: filter chain matched -> {class}");
                cache.insert(conn, self.scheduler, class);
                Verdict::Class(class)
            }
            Some(FilterAction::Drop) | None => {
                log::trace!("qfq-classify: no match for {conn:?}, dropping");
                Verdict::Drop
            }
        }
    }
}
