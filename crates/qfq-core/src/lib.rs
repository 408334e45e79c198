#![doc = r#"# qfq-core

The scheduling core of QFQ-RL: a Quick Fair Queueing discipline with
rate-limited dispatch. This crate implements the three subsystems that carry
the algorithmic weight of the scheduler:

- [`fixed`] — scaled fixed-point timestamp arithmetic.
- [`bitmap`] — the four group-state bitmaps (ER/IR/EB/IB) and eligibility
  promotion.
- [`group`] — the 32-slot-per-group circular buffer store.
- [`class`] — flow-class lifecycle and the `(weight, lmax) -> group` mapping.
- [`vtime`] — the virtual-time engine (`V` advancement, drain rate).
- [`scheduler`] — ties the above together into `enqueue`/`activate`/`dequeue`.

The crate builds under `std` (default) or `no_std + alloc`; only the
exclusive-owner scheduling state itself is modeled here; thread pinning and
the dispatcher loop live in `qfq-dispatch`.
"#]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod bitmap;
pub mod class;
pub mod error;
pub mod fixed;
pub mod group;
pub mod packet;
pub mod scheduler;
pub mod stats;
mod sync;
pub mod vtime;

pub use bitmap::{Bitmaps, GroupState};
pub use class::{Arc, Class, ClassId, ClassQueue};
pub use error::SchedError;
pub use fixed::{FixedPoint, GroupIndex};
pub use group::Group;
pub use packet::Packet;
pub use scheduler::{DequeuedPacket, Scheduler, SchedulerOptions};
pub use stats::{ClassStats, SchedulerStats};
