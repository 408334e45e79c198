//! Scheduling-core errors (spec §7).

use core::fmt;

use crate::class::ClassId;

/// Errors raised by class lifecycle and enqueue operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// Requested weight is `0` or exceeds `MAX_WEIGHT`.
    InvalidWeight { weight: u32 },
    /// Requested `lmax` is `0` or exceeds `LMAX`.
    InvalidLmax { lmax: u32 },
    /// Admitting/updating this class would push `wsum` over `MAX_WSUM`.
    WsumExceeded { attempted: u64, max: u64 },
    /// Deletion was attempted while `filter_cnt > 0` — some classifier
    /// binding still references this class (spec §4.4 "Delete", §8 S5).
    ClassBusy { class: ClassId },
    /// `create_class` was called with an id that is already registered.
    ClassExists { class: ClassId },
    /// No class is registered under this id.
    UnknownClass { class: ClassId },
    /// The inner queue rejected the packet (spec §7 `EnqueueDrop`).
    EnqueueDrop { class: ClassId },
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidWeight { weight } => {
                write!(f, "invalid class weight {weight}")
            }
            Self::InvalidLmax { lmax } => {
                write!(f, "invalid class lmax {lmax}")
            }
            Self::WsumExceeded { attempted, max } => {
                write!(f, "weight sum {attempted} would exceed max {max}")
            }
            Self::ClassBusy { class } => {
                write!(f, "class {class:?} is busy (filter_cnt > 0)")
            }
            Self::ClassExists { class } => {
                write!(f, "class {class:?} is already registered")
            }
            Self::UnknownClass { class } => {
                write!(f, "class {class:?} is not registered")
            }
            Self::EnqueueDrop { class } => {
                write!(f, "inner queue full, dropped packet for class {class:?}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SchedError {}
