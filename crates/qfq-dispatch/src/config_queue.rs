//! Runtime class-configuration requests (spec §5: "`wsum` written under a
//! top-level tree lock held by configuration paths").
//!
//! Configuration never mutates the scheduler directly from a host thread —
//! like an activation, a request is posted here and applied by the
//! dispatcher thread on its next loop iteration, with the result handed
//! back over a reply channel so the calling (configuration) path blocks for
//! it exactly as a tree lock would, without actually sharing the
//! scheduler's interior across threads.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;

use parking_lot::Mutex;

use qfq_core::class::{ClassId, ClassQueue};
use qfq_core::error::SchedError;

/// A class lifecycle request the dispatcher applies on its owned
/// [`qfq_core::scheduler::Scheduler`].
#[derive(Debug, Clone, Copy)]
pub enum ConfigCommand {
    Create { id: ClassId, weight: u32, lmax: u32 },
    Update { id: ClassId, weight: u32, lmax: u32 },
    Delete { id: ClassId },
}

/// Result of applying a [`ConfigCommand`]. `Create` hands back a clone of
/// the new class's inner-queue handle so the submitting producer can push
/// packets directly without ever touching the dispatcher-exclusive
/// `Scheduler` (spec §5, §9); `Update`/`Delete` carry no payload.
pub type ConfigOutcome = Result<Option<Arc<ClassQueue>>, SchedError>;

/// One queued command plus the channel its result is reported back through.
pub struct ConfigRequest {
    pub command: ConfigCommand,
    reply: Sender<ConfigOutcome>,
}

/// A single shared inbox for configuration commands, drained by the
/// dispatcher thread each loop iteration (mirrors [`crate::activation::ActivationQueues`]'s
/// per-executor queues, but there is only ever one configuration path, so a
/// single queue suffices).
#[derive(Default)]
pub struct ConfigQueue {
    inner: Mutex<VecDeque<ConfigRequest>>,
}

impl ConfigQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Posts `command` and blocks until the dispatcher thread applies it,
    /// returning whatever [`SchedError`] the scheduler call produced.
    ///
    /// Panics if the dispatcher thread has already exited without draining
    /// this request — a caller must not submit configuration after calling
    /// `ShutdownHandle::shutdown` and joining the dispatcher.
    pub fn submit(&self, command: ConfigCommand) -> Result<(), SchedError> {
        self.submit_raw(command).map(|_| ())
    }

    /// Posts a [`ConfigCommand::Create`] and returns the new class's inner
    /// queue handle on success, so the submitting producer can push packets
    /// onto it directly (spec §5, §9).
    pub fn submit_create(
        &self,
        id: ClassId,
        weight: u32,
        lmax: u32,
    ) -> Result<Arc<ClassQueue>, SchedError> {
        let outcome = self.submit_raw(ConfigCommand::Create { id, weight, lmax })?;
        Ok(outcome.expect("Create always replies with a queue handle on success"))
    }

    fn submit_raw(&self, command: ConfigCommand) -> ConfigOutcome {
        let (reply, rx) = mpsc::channel();
        self.inner.lock().push_back(ConfigRequest { command, reply });
        rx.recv()
            .expect("dispatcher thread exited without replying to a config request")
    }

    pub(crate) fn drain_into(&self, out: &mut Vec<ConfigRequest>) {
        out.extend(self.inner.lock().drain(..));
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl ConfigRequest {
    pub(crate) fn reply(self, result: ConfigOutcome) {
        // The submitting side may have given up waiting (it never does
        // today, but a future caller-side timeout would make this a
        // legitimate disconnect) — dropping the result is correct either
        // way.
        let _ = self.reply.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_into_returns_posted_commands_in_order() {
        let queue = ConfigQueue::new();
        let q = std::sync::Arc::new(queue);
        let q2 = std::sync::Arc::clone(&q);
        let poster = std::thread::spawn(move || {
            q2.submit(ConfigCommand::Create {
                id: ClassId::new(1),
                weight: 10,
                lmax: 1500,
            })
        });

        // Give the poster a chance to enqueue before we drain.
        let mut reqs = Vec::new();
        loop {
            q.drain_into(&mut reqs);
            if !reqs.is_empty() {
                break;
            }
            std::thread::yield_now();
        }
        assert_eq!(reqs.len(), 1);
        reqs.pop().unwrap().reply(Ok(None));
        assert!(poster.join().unwrap().is_ok());
    }
}
