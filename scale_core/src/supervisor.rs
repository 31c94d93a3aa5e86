//! Keeps one field-bus link alive.
//!
//! The supervisor thread connects on start, retries forever at a fixed
//! interval with the parameters captured in its `Connector`, and installs
//! each fresh link into the shared [`LinkSlot`]. Once connected it waits for
//! either a periodic health probe to fail or the queue to report a link
//! fault, then drops the link and starts over.
//!
//! Reconnect callbacks fire exactly once per successful connection that
//! follows a failed attempt or a lost link; an immediate first success is
//! not a reconnection.
use crossbeam_channel as xch;
use scale_traits::Connector;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::hw_error::map_boxed;
use crate::queue::{LinkSlot, OperationQueue, Priority};

pub type ReconnectCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct SupervisorCfg {
    pub retry_interval: Duration,
    /// `None` disables the periodic probe; queue-reported faults still apply.
    pub health_interval: Option<Duration>,
    /// Register read by the health probe.
    pub probe_register: u16,
}

impl Default for SupervisorCfg {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_millis(3000),
            health_interval: Some(Duration::from_millis(5000)),
            probe_register: 0,
        }
    }
}

pub struct ReconnectSupervisor {
    connected: Arc<AtomicBool>,
    reconnects: Arc<AtomicU64>,
    callbacks: Arc<Mutex<Vec<ReconnectCallback>>>,
    stop_tx: Option<xch::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

enum Phase {
    Lost,
    Stop,
}

impl ReconnectSupervisor {
    pub fn spawn(
        mut connector: Box<dyn Connector>,
        slot: LinkSlot,
        queue: Arc<OperationQueue>,
        cfg: SupervisorCfg,
    ) -> Self {
        let connected = Arc::new(AtomicBool::new(false));
        let reconnects = Arc::new(AtomicU64::new(0));
        let callbacks: Arc<Mutex<Vec<ReconnectCallback>>> = Arc::new(Mutex::new(Vec::new()));
        let (stop_tx, stop_rx) = xch::bounded::<()>(0);

        let t_connected = connected.clone();
        let t_reconnects = reconnects.clone();
        let t_callbacks = callbacks.clone();
        let join_handle = std::thread::spawn(move || {
            let endpoint = connector.endpoint();
            let faults = queue.faults();
            let mut had_failure = false;
            loop {
                // Connect phase: retry until a link is up or we are told to stop.
                loop {
                    match connector.connect() {
                        Ok(link) => {
                            *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(link);
                            t_connected.store(true, Ordering::SeqCst);
                            if had_failure {
                                t_reconnects.fetch_add(1, Ordering::SeqCst);
                                tracing::info!(%endpoint, "field-bus reconnected");
                                let cbs = t_callbacks.lock().unwrap_or_else(PoisonError::into_inner);
                                for cb in cbs.iter() {
                                    cb();
                                }
                            } else {
                                tracing::info!(%endpoint, "field-bus connected");
                            }
                            break;
                        }
                        Err(e) => {
                            had_failure = true;
                            tracing::warn!(
                                %endpoint,
                                error = %e,
                                retry_ms = crate::util::millis(cfg.retry_interval),
                                "field-bus connect failed"
                            );
                            match stop_rx.recv_timeout(cfg.retry_interval) {
                                Err(xch::RecvTimeoutError::Timeout) => {}
                                _ => return,
                            }
                        }
                    }
                }

                // Faults from the previous link are irrelevant now.
                while faults.try_recv().is_ok() {}

                match Self::watch(&stop_rx, &faults, &queue, cfg) {
                    Phase::Stop => return,
                    Phase::Lost => {
                        *slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
                        t_connected.store(false, Ordering::SeqCst);
                        had_failure = true;
                    }
                }
            }
        });

        Self {
            connected,
            reconnects,
            callbacks,
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
        }
    }

    fn watch(
        stop_rx: &xch::Receiver<()>,
        faults: &xch::Receiver<()>,
        queue: &OperationQueue,
        cfg: SupervisorCfg,
    ) -> Phase {
        let probe_tick = cfg.health_interval.map_or_else(xch::never, xch::tick);
        loop {
            xch::select! {
                recv(stop_rx) -> _ => return Phase::Stop,
                recv(faults) -> _ => {
                    tracing::warn!("field-bus fault reported; dropping link");
                    return Phase::Lost;
                }
                recv(probe_tick) -> _ => {
                    let addr = cfg.probe_register;
                    let res = queue
                        .enqueue(Priority::Background, move |link| {
                            link.read_holding_registers(addr, 1).map(|_| ()).map_err(map_boxed)
                        })
                        .wait();
                    match res {
                        Ok(()) => tracing::trace!("health probe ok"),
                        Err(e) if e.is_link_fault() => {
                            tracing::warn!(error = %e, "health probe failed; dropping link");
                            return Phase::Lost;
                        }
                        Err(e) => tracing::debug!(error = %e, "health probe answered with an error"),
                    }
                }
            }
        }
    }

    /// Register a callback fired after every successful reconnection.
    pub fn on_reconnect(&self, cb: ReconnectCallback) {
        self.callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(cb);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::SeqCst)
    }
}

impl Drop for ReconnectSupervisor {
    fn drop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(handle) = self.join_handle.take()
            && let Err(e) = handle.join()
        {
            tracing::warn!(?e, "reconnect supervisor panicked during shutdown");
        }
    }
}
