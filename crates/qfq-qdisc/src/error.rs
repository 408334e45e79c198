//! Host-facing errors, `thiserror`-derived in the same style as
//! `qs::TraceError` — this surface is std-only and user-facing, so it skips
//! the `no_std` double-register `qfq-core::error::SchedError` uses.

use qfq_core::class::ClassId;
use qfq_core::error::SchedError;

/// Errors returned from the [`crate::host::QdiscHost`] surface.
#[derive(Debug, thiserror::Error)]
pub enum QdiscError {
    #[error("invalid class configuration: {0}")]
    InvalidConfig(String),

    #[error("packet dropped by classifier: no class or filter matched")]
    ClassifyDrop,

    #[error(transparent)]
    Sched(#[from] SchedError),

    #[error("unknown class {0:?}")]
    UnknownClass(ClassId),
}
