//! Dispatcher-side errors. Same shape as `qfq_core::error::SchedError`: a
//! plain enum with a hand-written `Display`, kept `no_std`-capable in
//! principle even though this crate is `std`-only in practice (spec §7,
//! §4.9).

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    /// An executor index outside `0..executor_count` was used, or
    /// `ActivationQueues::new` was asked for zero or more than
    /// [`crate::activation::MAX_EXECUTORS`] queues.
    InvalidExecutorCount { requested: usize, max: usize },
    /// The activation queue for a CPU was already at capacity and could not
    /// accept the new record; the record is dropped rather than evicting an
    /// older one (spec §7 `ActivationOOM`: "log, class not activated (next
    /// enqueue retries)").
    ActivationOom { executor: usize },
    /// Requested CPU pinning to a core id `core_affinity` does not report
    /// as available on this host.
    InvalidCpu { requested: usize, available: usize },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidExecutorCount { requested, max } => {
                write!(f, "invalid executor count {requested} (max {max})")
            }
            Self::ActivationOom { executor } => {
                write!(f, "activation queue {executor} is full, activation dropped")
            }
            Self::InvalidCpu {
                requested,
                available,
            } => write!(
                f,
                "requested cpu {requested} not in the {available} cores reported available"
            ),
        }
    }
}

impl std::error::Error for DispatchError {}
