//! Direct priority-handle fallback and ordered filter chain (spec §4.7).

use qfq_core::class::ClassId;
use qfq_core::error::SchedError;
use qfq_core::packet::Packet;
use qfq_core::scheduler::Scheduler;

/// Outcome of a single filter's match attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction {
    /// Route to this class.
    Classify(ClassId),
    /// Route to this class, short-circuiting the remainder of the chain
    /// (tc's `TC_ACT_REDIRECT`-shaped outcome; this crate has no nested
    /// qdisc to redirect *into*, so it is handled identically to
    /// `Classify` — the distinction is kept so a host can log it).
    Redirect(ClassId),
    /// Drop the packet (spec §7 `ClassifyDrop`).
    Drop,
}

/// One entry in the ordered filter chain.
pub trait Filter: Send + Sync {
    fn matches(&self, pkt: &Packet) -> Option<FilterAction>;
}

/// A priority → class direct-handle table, consulted before the filter
/// chain (spec §4.7: "fallback first to a direct class-handle match on
/// packet priority").
pub struct PriorityTable {
    table: [Option<ClassId>; 256],
}

impl PriorityTable {
    pub fn new() -> Self {
        Self { table: [None; 256] }
    }

    /// Binds `priority` to `class`, incrementing `class`'s `filter_cnt` on
    /// `scheduler` (spec §3 "reference counters for external holders") so
    /// `Scheduler::delete_class` rejects deletion while this binding is
    /// live (spec §8 S5). Rebinding a priority that already pointed at a
    /// different class releases that class's hold first.
    pub fn bind(
        &mut self,
        scheduler: &mut Scheduler,
        priority: u8,
        class: ClassId,
    ) -> Result<(), SchedError> {
        scheduler.bind_filter(class)?;
        if let Some(old) = self.table[priority as usize].replace(class) {
            scheduler.unbind_filter(old)?;
        }
        Ok(())
    }

    /// Unbinds `priority`, releasing the bound class's `filter_cnt` hold on
    /// `scheduler`, if any.
    pub fn unbind(&mut self, scheduler: &mut Scheduler, priority: u8) -> Result<(), SchedError> {
        if let Some(class) = self.table[priority as usize].take() {
            scheduler.unbind_filter(class)?;
        }
        Ok(())
    }

    pub fn lookup(&self, priority: u8) -> Option<ClassId> {
        self.table[priority as usize]
    }
}

impl Default for PriorityTable {
    fn default() -> Self {
        Self::new()
    }
}

/// An ordered, first-match-wins chain of filters — the last fallback before
/// a `ClassifyDrop`.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    pub fn push(&mut self, filter: Box<dyn Filter>) {
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Runs the chain in order; the first filter to produce an action wins
    /// (spec §4.7: "redirect/drop filter actions short-circuit").
    pub fn classify(&self, pkt: &Packet) -> Option<FilterAction> {
        self.filters.iter().find_map(|f| f.matches(pkt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PriorityAbove(u8, ClassId);
    impl Filter for PriorityAbove {
        fn matches(&self, pkt: &Packet) -> Option<FilterAction> {
            if pkt.priority > self.0 {
                Some(FilterAction::Classify(self.1))
            } else {
                None
            }
        }
    }

    struct AlwaysDrop;
    impl Filter for AlwaysDrop {
        fn matches(&self, _pkt: &Packet) -> Option<FilterAction> {
            Some(FilterAction::Drop)
        }
    }

    fn scheduler_with_class(id: ClassId) -> Scheduler {
        use qfq_core::scheduler::SchedulerOptions;
        let mut s = Scheduler::new(SchedulerOptions::default(), 0);
        s.create_class(id, 10, 1500).unwrap();
        s
    }

    #[test]
    fn priority_table_direct_match() {
        let class = ClassId::new(1);
        let mut scheduler = scheduler_with_class(class);
        let mut t = PriorityTable::new();
        t.bind(&mut scheduler, 5, class).unwrap();
        assert_eq!(t.lookup(5), Some(class));
        assert_eq!(t.lookup(6), None);
    }

    #[test]
    fn bind_increments_and_unbind_decrements_filter_cnt() {
        let class = ClassId::new(1);
        let mut scheduler = scheduler_with_class(class);
        let mut t = PriorityTable::new();

        t.bind(&mut scheduler, 5, class).unwrap();
        assert_eq!(scheduler.class(class).unwrap().filter_cnt(), 1);

        t.unbind(&mut scheduler, 5).unwrap();
        assert_eq!(scheduler.class(class).unwrap().filter_cnt(), 0);
    }

    #[test]
    fn rebinding_a_priority_releases_the_old_class() {
        let old = ClassId::new(1);
        let new = ClassId::new(2);
        let mut scheduler = scheduler_with_class(old);
        scheduler.create_class(new, 10, 1500).unwrap();
        let mut t = PriorityTable::new();

        t.bind(&mut scheduler, 5, old).unwrap();
        t.bind(&mut scheduler, 5, new).unwrap();

        assert_eq!(scheduler.class(old).unwrap().filter_cnt(), 0);
        assert_eq!(scheduler.class(new).unwrap().filter_cnt(), 1);
        assert_eq!(t.lookup(5), Some(new));
    }

    #[test]
    fn bind_unknown_class_errors() {
        let mut scheduler = Scheduler::new(qfq_core::scheduler::SchedulerOptions::default(), 0);
        let mut t = PriorityTable::new();
        assert!(matches!(
            t.bind(&mut scheduler, 5, ClassId::new(99)),
            Err(SchedError::UnknownClass { .. })
        ));
    }

    #[test]
    fn first_matching_filter_wins() {
        let mut chain = FilterChain::new();
        chain.push(Box::new(PriorityAbove(10, ClassId::new(2))));
        chain.push(Box::new(AlwaysDrop));

        let high = Packet::new(100, 20);
        assert_eq!(
            chain.classify(&high),
            Some(FilterAction::Classify(ClassId::new(2)))
        );

        let low = Packet::new(100, 1);
        assert_eq!(chain.classify(&low), Some(FilterAction::Drop));
    }

    #[test]
    fn empty_chain_matches_nothing() {
        let chain = FilterChain::new();
        assert_eq!(chain.classify(&Packet::new(10, 0)), None);
    }
}
