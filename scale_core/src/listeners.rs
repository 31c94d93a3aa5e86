use crossbeam_channel as xch;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::status::ScaleStatus;

/// Push subscribers keyed by connection id.
///
/// Each listener gets a small bounded channel; a listener that falls
/// behind loses snapshots rather than stalling the actor, and one whose
/// receiver is gone is dropped on the next broadcast.
#[derive(Clone, Default)]
pub struct Listeners {
    inner: Arc<RwLock<HashMap<String, xch::Sender<ScaleStatus>>>>,
}

const LISTENER_BACKLOG: usize = 16;

impl Listeners {
    pub fn register(&self, id: impl Into<String>) -> xch::Receiver<ScaleStatus> {
        let (tx, rx) = xch::bounded(LISTENER_BACKLOG);
        let id = id.into();
        tracing::debug!(%id, "listener registered");
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        rx
    }

    pub fn deregister(&self, id: &str) -> bool {
        let removed = self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some();
        if removed {
            tracing::debug!(%id, "listener deregistered");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn broadcast(&self, status: &ScaleStatus) {
        let mut gone = Vec::new();
        {
            let map = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            for (id, tx) in map.iter() {
                match tx.try_send(status.clone()) {
                    Ok(()) => {}
                    Err(xch::TrySendError::Full(_)) => {
                        tracing::trace!(%id, "listener backlog full; snapshot dropped");
                    }
                    Err(xch::TrySendError::Disconnected(_)) => gone.push(id.clone()),
                }
            }
        }
        if !gone.is_empty() {
            let mut map = self.inner.write().unwrap_or_else(PoisonError::into_inner);
            for id in gone {
                map.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{ScaleSettings, ScaleState};

    fn status() -> ScaleStatus {
        ScaleStatus::snapshot(&ScaleState::default(), &ScaleSettings::default(), None)
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let l = Listeners::default();
        let keep = l.register("a");
        drop(l.register("b"));
        l.broadcast(&status());
        assert_eq!(l.len(), 1);
        assert!(keep.try_recv().is_ok());
    }

    #[test]
    fn deregister_stops_delivery() {
        let l = Listeners::default();
        let rx = l.register("a");
        assert!(l.deregister("a"));
        assert!(!l.deregister("a"));
        l.broadcast(&status());
        assert!(rx.try_recv().is_err());
    }
}
