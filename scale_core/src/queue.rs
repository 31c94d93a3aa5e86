//! Serialised access to the field bus.
//!
//! Every register transaction, foreground or background, goes through one
//! worker thread that executes jobs strictly in arrival order and keeps at
//! least `min_interval` between the completion of one job and the start of
//! the next. Each job reports back through its own [`Completion`].
//!
//! Foreground jobs (commands issued by the operator or the feed logic)
//! raise a pending counter from enqueue until they settle; background
//! pollers consult [`OperationQueue::polling_paused`] and skip their cycle
//! while it is non-zero.
use crossbeam_channel as xch;
use scale_traits::{Clock, RegisterLink};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::error::ScaleError;

/// The currently installed link, if any. Written by the reconnect supervisor,
/// used only by the queue worker.
pub type LinkSlot = Arc<Mutex<Option<Box<dyn RegisterLink>>>>;

pub type SharedClock = Arc<dyn Clock + Send + Sync>;

pub fn empty_slot() -> LinkSlot {
    Arc::new(Mutex::new(None))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// Pauses background polling until settled.
    Foreground,
    Background,
}

type Runner = Box<dyn FnOnce(Option<&mut dyn RegisterLink>) -> bool + Send>;

struct Job {
    priority: Priority,
    run: Runner,
}

/// Handle to the eventual outcome of one queued operation.
#[must_use]
pub struct Completion<T> {
    rx: xch::Receiver<Result<T, ScaleError>>,
}

impl<T> Completion<T> {
    /// Block until the operation settles.
    pub fn wait(self) -> Result<T, ScaleError> {
        self.rx.recv().unwrap_or(Err(ScaleError::Shutdown))
    }

    /// Block for at most `timeout`; the operation itself keeps its place in
    /// the queue and still runs.
    pub fn wait_timeout(self, timeout: Duration) -> Result<T, ScaleError> {
        match self.rx.recv_timeout(timeout) {
            Ok(res) => res,
            Err(xch::RecvTimeoutError::Timeout) => Err(ScaleError::Timeout),
            Err(xch::RecvTimeoutError::Disconnected) => Err(ScaleError::Shutdown),
        }
    }
}

pub struct OperationQueue {
    tx: Option<xch::Sender<Job>>,
    pending_foreground: Arc<AtomicUsize>,
    faults: xch::Receiver<()>,
    join_handle: Option<JoinHandle<()>>,
}

impl OperationQueue {
    pub fn spawn(slot: LinkSlot, min_interval: Duration, clock: SharedClock) -> Self {
        let (tx, rx) = xch::unbounded::<Job>();
        let (fault_tx, faults) = xch::bounded::<()>(1);
        let pending_foreground = Arc::new(AtomicUsize::new(0));
        let pending = pending_foreground.clone();

        let join_handle = std::thread::spawn(move || {
            let mut last_done: Option<Instant> = None;
            for job in rx.iter() {
                if let Some(done) = last_done {
                    let since = clock.now().saturating_duration_since(done);
                    if since < min_interval {
                        clock.sleep(min_interval - since);
                    }
                }
                let link_fault = {
                    let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
                    let link: Option<&mut dyn RegisterLink> = match guard.as_mut() {
                        Some(b) => Some(b.as_mut()),
                        None => None,
                    };
                    (job.run)(link)
                };
                last_done = Some(clock.now());
                if job.priority == Priority::Foreground {
                    pending.fetch_sub(1, Ordering::SeqCst);
                }
                if link_fault {
                    // Full means a fault is already pending for the supervisor.
                    let _ = fault_tx.try_send(());
                }
            }
            tracing::trace!("operation queue worker exiting");
        });

        Self {
            tx: Some(tx),
            pending_foreground,
            faults,
            join_handle: Some(join_handle),
        }
    }

    pub fn enqueue<T, F>(&self, priority: Priority, op: F) -> Completion<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn RegisterLink) -> Result<T, ScaleError> + Send + 'static,
    {
        let (done_tx, done_rx) = xch::bounded(1);
        let run: Runner = Box::new(move |link| {
            let res = match link {
                Some(link) => op(link),
                None => Err(ScaleError::NotConnected),
            };
            let fault = matches!(&res, Err(e) if e.is_link_fault());
            if let Err(e) = &res {
                tracing::debug!(error = %e, "queued operation failed");
            }
            let _ = done_tx.send(res);
            fault
        });

        if priority == Priority::Foreground {
            self.pending_foreground.fetch_add(1, Ordering::SeqCst);
        }
        let sent = self
            .tx
            .as_ref()
            .is_some_and(|tx| tx.send(Job { priority, run }).is_ok());
        if !sent && priority == Priority::Foreground {
            // The job (and its sender) was dropped; waiters see Shutdown.
            self.pending_foreground.fetch_sub(1, Ordering::SeqCst);
        }
        Completion { rx: done_rx }
    }

    /// True while at least one foreground operation is queued or running.
    pub fn polling_paused(&self) -> bool {
        self.pending_foreground.load(Ordering::SeqCst) > 0
    }

    /// Signalled (coalesced) whenever an operation fails with a link fault.
    pub fn faults(&self) -> xch::Receiver<()> {
        self.faults.clone()
    }
}

impl Drop for OperationQueue {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.join_handle.take()
            && let Err(e) = handle.join()
        {
            tracing::warn!(?e, "operation queue worker panicked during shutdown");
        }
    }
}
