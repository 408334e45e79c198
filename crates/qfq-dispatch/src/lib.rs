//! Concurrent dispatch layer for QFQ-RL (spec §5): per-CPU activation
//! queues feeding a single pinned dispatcher thread that owns the
//! scheduler's interior exclusively.

pub mod activation;
pub mod config_queue;
pub mod dispatcher;
pub mod error;
pub mod pin;

pub use activation::{Activation, ActivationQueues, MAX_EXECUTORS};
pub use config_queue::{ConfigCommand, ConfigOutcome, ConfigQueue, ConfigRequest};
pub use dispatcher::{Dispatcher, DispatcherConfig, ShutdownHandle, Transmit};
pub use error::DispatchError;
