//! Minimal packet representation used by the scheduling core (spec §3: the
//! inner queue is assumed to expose an enqueue/peek/dequeue/drop contract
//! over *some* packet type; this is that type).

use alloc::vec::Vec;

/// A packet as seen by the scheduler: only its charged length and a
/// classifier-relevant priority matter to the core; payload bytes are
/// opaque and only carried so a host can hand the same packet on to the
/// transmit path.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    /// Bytes charged against the class (`L` in spec.md's notation).
    pub len: u32,
    /// Packet priority, used by the classifier's direct-handle fallback
    /// (spec §4.7).
    pub priority: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(len: u32, priority: u8) -> Self {
        Self {
            len,
            priority,
            payload: Vec::new(),
        }
    }

    pub fn with_payload(len: u32, priority: u8, payload: Vec<u8>) -> Self {
        Self {
            len,
            priority,
            payload,
        }
    }
}
