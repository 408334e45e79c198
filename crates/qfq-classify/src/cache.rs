//! Per-connection classify cache (spec §4.7).
//!
//! Lives on the producing endpoint, not inside the scheduler: each producer
//! thread owns its own cache instance, so — unlike everything in
//! `qfq-core`, which is exclusively the dispatcher's — nothing here needs
//! synchronization.

use std::collections::HashMap;

use qfq_core::class::ClassId;

/// Identifies a scheduler instance a cached classification applies to (a
/// host may run more than one [`qfq_core::scheduler::Scheduler`], e.g. one
/// per egress interface).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchedulerHandle(pub u32);

/// Opaque per-connection key supplied by the caller (typically a hash of a
/// 5-tuple or a socket pointer); this crate never inspects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CacheEntry {
    scheduler: SchedulerHandle,
    class: ClassId,
}

/// A bounded per-connection classify cache. A hit short-circuits the
/// priority-table/filter-chain fallback entirely (spec §4.7).
pub struct ClassifyCache {
    entries: HashMap<ConnectionId, CacheEntry>,
    capacity: usize,
}

impl ClassifyCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn lookup(&self, conn: ConnectionId) -> Option<(SchedulerHandle, ClassId)> {
        self.entries.get(&conn).map(|e| (e.scheduler, e.class))
    }

    /// Records a classification decision. At capacity, evicts one arbitrary
    /// entry: the cache is a short-circuit, not a correctness requirement,
    /// so any eviction policy just costs one extra fallback pass for
    /// whichever connection gets evicted.
    pub fn insert(&mut self, conn: ConnectionId, scheduler: SchedulerHandle, class: ClassId) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&conn) {
            if let Some(&victim) = self.entries.keys().next() {
                self.entries.remove(&victim);
            }
        }
        self.entries.insert(conn, CacheEntry { scheduler, class });
    }

    pub fn invalidate(&mut self, conn: ConnectionId) {
        self.entries.remove(&conn);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
