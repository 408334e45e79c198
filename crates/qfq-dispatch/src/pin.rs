//! CPU pinning and real-time scheduling priority for the dispatcher thread
//! (`spin_cpu` config). Meaningless inside a `no_std` embedded target, so
//! this module pulls in `core_affinity`/`libc`, recorded in DESIGN.md.

use crate::error::DispatchError;

/// Pins the calling thread to `cpu`. Follows the same defensive pattern as
/// the `cfg(target_arch = "arm")` hardware-only guards elsewhere in the
/// pack: if `core_affinity` reports fewer cores than requested, pinning is
/// skipped with a `warn!` rather than failing the dispatcher outright, since
/// a missed pin degrades throughput, not correctness.
pub fn pin_to_cpu(cpu: i32) {
    if cpu < 0 {
        log::debug!("qfq-dispatch: spin_cpu < 0, pinning disabled");
        return;
    }
    let core_ids = match core_affinity::get_core_ids() {
        Some(ids) => ids,
        None => {
            log::warn!("qfq-dispatch: core_affinity::get_core_ids() unavailable, skipping pin");
            return;
        }
    };
    match core_ids.into_iter().nth(cpu as usize) {
        Some(id) => {
            if core_affinity::set_for_current(id) {
                log::debug!("qfq-dispatch: dispatcher pinned to cpu {cpu}");
            } else {
                log::warn!("qfq-dispatch: failed to pin dispatcher to cpu {cpu}");
            }
        }
        None => {
            log::warn!(
                "qfq-dispatch: requested cpu {cpu} not available, skipping pin"
            );
        }
    }
}

/// Raises the calling thread to `SCHED_FIFO` at the given priority. Linux
/// only; other targets log a `warn!` and continue at the default scheduling
/// class, the same degrade-not-fail posture as [`pin_to_cpu`].
pub fn set_realtime_priority(priority: i32) {
    imp::set_realtime_priority(priority)
}

#[cfg(target_os = "linux")]
mod imp {
    pub fn set_realtime_priority(priority: i32) {
        // SAFETY: `sched_param` is a plain C struct with no invariants beyond
        // the fields we set; `sched_setscheduler(0, ..)` targets the calling
        // thread and its only failure modes (EPERM, EINVAL) are handled by
        // checking the return value, never by reading through a dangling
        // pointer.
        unsafe {
            let param = libc::sched_param {
                sched_priority: priority,
            };
            let rc = libc::sched_setscheduler(0, libc::SCHED_FIFO, &param);
            if rc != 0 {
                log::warn!(
                    "qfq-dispatch: sched_setscheduler(SCHED_FIFO, {priority}) failed (errno {}), \
                     dispatcher staying at default scheduling class",
                    std::io::Error::last_os_error()
                );
            } else {
                log::debug!("qfq-dispatch: dispatcher raised to SCHED_FIFO priority {priority}");
            }
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    pub fn set_realtime_priority(_priority: i32) {
        log::warn!("qfq-dispatch: realtime scheduling priority not supported on this platform");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_to_negative_cpu_is_a_noop() {
        pin_to_cpu(-1);
    }

    #[test]
    fn pin_to_absurd_cpu_does_not_panic() {
        pin_to_cpu(10_000);
    }
}
