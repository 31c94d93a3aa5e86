//! One supervised, serialised field-bus connection.
//!
//! `FieldBus` bundles the operation queue, the reconnect supervisor and the
//! slot they share. Drivers talk to the instrument only through
//! [`FieldBus::execute`] / [`FieldBus::submit`].
use eyre::WrapErr;
use scale_traits::{Connector, RegisterLink};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::{Result, ScaleError};
use crate::queue::{Completion, OperationQueue, Priority, SharedClock, empty_slot};
use crate::supervisor::{ReconnectCallback, ReconnectSupervisor, SupervisorCfg};
use crate::ticker::PeriodicTask;

#[derive(Debug, Clone, Copy)]
pub struct BusCfg {
    pub min_operation_interval: Duration,
    pub supervisor: SupervisorCfg,
    /// How long a caller waits for its operation to settle.
    pub op_timeout: Duration,
}

impl Default for BusCfg {
    fn default() -> Self {
        Self {
            min_operation_interval: Duration::from_millis(100),
            supervisor: SupervisorCfg::default(),
            op_timeout: Duration::from_secs(5),
        }
    }
}

pub struct FieldBus {
    // Field order is drop order: the supervisor must release its queue
    // handle before the queue joins its worker.
    supervisor: ReconnectSupervisor,
    queue: Arc<OperationQueue>,
    op_timeout: Duration,
}

impl FieldBus {
    pub fn start(connector: Box<dyn Connector>, cfg: BusCfg, clock: SharedClock) -> Self {
        let slot = empty_slot();
        let queue = Arc::new(OperationQueue::spawn(
            slot.clone(),
            cfg.min_operation_interval,
            clock,
        ));
        let supervisor = ReconnectSupervisor::spawn(connector, slot, queue.clone(), cfg.supervisor);
        Self {
            supervisor,
            queue,
            op_timeout: cfg.op_timeout,
        }
    }

    pub fn submit<T, F>(&self, priority: Priority, op: F) -> Completion<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn RegisterLink) -> std::result::Result<T, ScaleError> + Send + 'static,
    {
        self.queue.enqueue(priority, op)
    }

    /// Enqueue a foreground operation and wait for it.
    pub fn execute<T, F>(&self, what: &'static str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn RegisterLink) -> std::result::Result<T, ScaleError> + Send + 'static,
    {
        self.queue
            .enqueue(Priority::Foreground, op)
            .wait_timeout(self.op_timeout)
            .wrap_err(what)
    }

    /// Background read; does not pause pollers.
    pub fn query<T, F>(&self, what: &'static str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn RegisterLink) -> std::result::Result<T, ScaleError> + Send + 'static,
    {
        self.queue
            .enqueue(Priority::Background, op)
            .wait_timeout(self.op_timeout)
            .wrap_err(what)
    }

    pub fn polling_paused(&self) -> bool {
        self.queue.polling_paused()
    }

    pub fn on_reconnect(&self, cb: ReconnectCallback) {
        self.supervisor.on_reconnect(cb);
    }

    /// Run `read` through the queue after every reconnection, ahead of the
    /// reconnect callbacks registered after this one.
    pub fn on_reconnect_read<T, R, C>(&self, what: &'static str, read: R, on_value: C)
    where
        T: Send + 'static,
        R: Fn(&mut dyn RegisterLink) -> std::result::Result<T, ScaleError> + Send + Sync + 'static,
        C: Fn(T) + Send + Sync + 'static,
    {
        let queue = self.queue.clone();
        let timeout = self.op_timeout;
        let read = Arc::new(read);
        self.supervisor.on_reconnect(Box::new(move || {
            let read = read.clone();
            match queue
                .enqueue(Priority::Background, move |link| read(link))
                .wait_timeout(timeout)
            {
                Ok(value) => on_value(value),
                Err(e) => tracing::warn!(error = %e, "{what} after reconnect failed"),
            }
        }));
    }

    pub fn is_connected(&self) -> bool {
        self.supervisor.is_connected()
    }

    pub fn reconnect_count(&self) -> u64 {
        self.supervisor.reconnect_count()
    }

    /// Block until the supervisor has installed a link.
    pub fn wait_connected(&self, timeout: Duration) -> Result<()> {
        scale_hardware::util::wait_until_with_timeout(
            || self.is_connected(),
            timeout,
            Duration::from_millis(10),
        )
        .wrap_err("field-bus did not connect")
    }
}

/// Periodic background read through the queue. Cycles are skipped while a
/// foreground operation is pending; errors are logged and the next cycle
/// tries again.
pub struct ContinuousReader {
    active: Arc<AtomicBool>,
    _task: PeriodicTask,
}

impl ContinuousReader {
    pub fn spawn<T, R, C>(bus: Arc<FieldBus>, interval: Duration, read: R, mut on_state: C) -> Self
    where
        T: Send + 'static,
        R: Fn(&mut dyn RegisterLink) -> std::result::Result<T, ScaleError> + Send + Sync + 'static,
        C: FnMut(T) + Send + 'static,
    {
        let read = Arc::new(read);
        let active = Arc::new(AtomicBool::new(true));
        let t_active = active.clone();
        let task = PeriodicTask::spawn("continuous-read", interval, move || {
            if bus.polling_paused() {
                tracing::trace!("foreground operation pending; skipping state read");
                return;
            }
            let read = read.clone();
            let res = bus
                .submit(Priority::Background, move |link| read(link))
                .wait_timeout(bus.op_timeout);
            match res {
                Ok(state) if t_active.load(Ordering::SeqCst) => on_state(state),
                Ok(_) => {}
                Err(ScaleError::NotConnected) => tracing::debug!("state read skipped; not connected"),
                Err(e) => tracing::warn!(error = %e, "continuous state read failed"),
            }
        });
        Self {
            active,
            _task: task,
        }
    }
}

impl Drop for ContinuousReader {
    fn drop(&mut self) {
        // Suppress delivery of a read that is already in flight.
        self.active.store(false, Ordering::SeqCst);
    }
}
