//! Fixed-period background task.
//!
//! Each `PeriodicTask` owns one thread that runs `tick` every `period` until
//! the task is dropped. Shutdown is signalled by disconnecting a channel, so
//! a sleeping task wakes immediately instead of finishing its period.
use crossbeam_channel as xch;
use std::thread::JoinHandle;
use std::time::Duration;

pub struct PeriodicTask {
    name: &'static str,
    stop_tx: Option<xch::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    pub fn spawn<F>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = xch::bounded::<()>(0);
        let join_handle = std::thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(period) {
                    Err(xch::RecvTimeoutError::Timeout) => tick(),
                    _ => break,
                }
            }
            tracing::trace!(task = name, "periodic task exiting");
        });
        tracing::debug!(task = name, period_ms = crate::util::millis(period), "periodic task started");
        Self {
            name,
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(handle) = self.join_handle.take()
            && let Err(e) = handle.join()
        {
            tracing::warn!(task = self.name, ?e, "periodic task panicked during shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    #[test]
    fn ticks_until_dropped() {
        let n = Arc::new(AtomicUsize::new(0));
        let n2 = n.clone();
        let task = PeriodicTask::spawn("count", Duration::from_millis(2), move || {
            n2.fetch_add(1, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(40));
        drop(task);
        let after_drop = n.load(Ordering::SeqCst);
        assert!(after_drop > 0);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(n.load(Ordering::SeqCst), after_drop);
    }

    #[test]
    fn drop_does_not_wait_for_long_period() {
        let task = PeriodicTask::spawn("slow", Duration::from_secs(3600), || {});
        let t0 = Instant::now();
        drop(task);
        assert!(t0.elapsed() < Duration::from_secs(1));
    }
}
