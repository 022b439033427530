//! Best-effort real-time scheduling for the tracker thread, as recommended
//! by the core's concurrency model. Falls back to a log warning rather
//! than failing when the process lacks the privilege to raise its
//! scheduling class.

use log::warn;

/// Attempt to switch the calling thread to `SCHED_FIFO` at a modest
/// priority. No-op with a warning if unprivileged.
pub fn try_enable_realtime_scheduling() {
    #[cfg(target_os = "linux")]
    unsafe {
        let priority = libc::sched_get_priority_min(libc::SCHED_FIFO) + 1;
        let param = libc::sched_param {
            sched_priority: priority,
        };
        let rc = libc::sched_setscheduler(0, libc::SCHED_FIFO, &param);
        if rc != 0 {
            warn!(
                "could not raise tracker thread to SCHED_FIFO (errno {}); running at default priority",
                std::io::Error::last_os_error()
            );
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        warn!("real-time scheduling is only attempted on Linux; running at default priority");
    }
}
