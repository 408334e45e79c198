//! Configuration surface (spec §6, SPEC_FULL.md §4.10). Grounded on the
//! teacher's `serde`-gated `Event`/`EventHeader` derives (`qf::event`): a
//! plain data struct, serde derives, validated before it ever reaches
//! `qfq-core`.

use qfq_core::fixed::{LMAX, MAX_WEIGHT};
use qfq_core::vtime::DEFAULT_LINK_SPEED_MBPS;

use crate::error::QdiscError;

/// Default `spin_cpu` module parameter (spec §6).
pub const DEFAULT_SPIN_CPU: i32 = 2;

/// Per-class weight/lmax configuration, validated against spec §6's ranges
/// before being handed to [`qfq_core::scheduler::Scheduler::create_class`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ClassConfig {
    /// Default `1`, max `2^16` (spec §6 `WEIGHT`).
    pub weight: u32,
    /// Default `2^11`, max `2^11` (spec §6 `LMAX`).
    pub lmax: u32,
}

impl Default for ClassConfig {
    fn default() -> Self {
        Self {
            weight: 1,
            lmax: LMAX,
        }
    }
}

impl ClassConfig {
    /// Rejects out-of-range values up front so an invalid config never
    /// mutates scheduler state (spec §6: "invalid values produce a
    /// validation error and the class is not mutated").
    pub fn validate(&self) -> Result<(), QdiscError> {
        if self.weight == 0 || self.weight > MAX_WEIGHT {
            return Err(QdiscError::InvalidConfig(format!(
                "weight {} out of range (1..={MAX_WEIGHT})",
                self.weight
            )));
        }
        if self.lmax == 0 || self.lmax > LMAX {
            return Err(QdiscError::InvalidConfig(format!(
                "lmax {} out of range (1..={LMAX})",
                self.lmax
            )));
        }
        Ok(())
    }
}

/// Scheduler-wide configuration (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SchedulerConfig {
    /// `LINK_SPEED` module parameter, default `9800` Mbps.
    pub link_speed_mbps: u64,
    /// `spin_cpu` module parameter, default `2`; negative disables pinning.
    pub spin_cpu: i32,
    /// Per-class inner-queue depth before `EnqueueDrop` (spec §7).
    pub inner_queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            link_speed_mbps: DEFAULT_LINK_SPEED_MBPS,
            spin_cpu: DEFAULT_SPIN_CPU,
            inner_queue_capacity: 1024,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), QdiscError> {
        if self.link_speed_mbps == 0 {
            return Err(QdiscError::InvalidConfig(
                "link_speed_mbps must be nonzero".into(),
            ));
        }
        Ok(())
    }
}
