//! Proximity-sensor edge detection.
//!
//! The detector starts undefined; its first observation only initialises
//! the debounced value. Every later accepted change fires the callback once.
//! With `debounce_n > 1` a change must be seen on that many consecutive
//! samples before it is accepted.
use scale_traits::DigitalInput;
use std::time::Duration;

use crate::ticker::PeriodicTask;

pub type EdgeCallback = Box<dyn FnMut(bool) + Send>;

pub struct SensorEdgeDetector {
    state: Option<bool>,
    candidate: Option<(bool, u8)>,
    debounce_n: u8,
    on_change: EdgeCallback,
}

impl SensorEdgeDetector {
    pub fn new(debounce_n: u8, on_change: EdgeCallback) -> Self {
        Self {
            state: None,
            candidate: None,
            debounce_n: debounce_n.max(1),
            on_change,
        }
    }

    pub fn state(&self) -> Option<bool> {
        self.state
    }

    /// Feed one raw sample; returns the new level when a change was accepted.
    pub fn observe(&mut self, value: bool) -> Option<bool> {
        match self.state {
            None => {
                self.state = Some(value);
                self.candidate = None;
                None
            }
            Some(current) if current == value => {
                self.candidate = None;
                None
            }
            Some(_) => {
                let seen = match self.candidate {
                    Some((v, n)) if v == value => n.saturating_add(1),
                    _ => 1,
                };
                if seen >= self.debounce_n {
                    self.accept(value);
                    Some(value)
                } else {
                    self.candidate = Some((value, seen));
                    None
                }
            }
        }
    }

    /// Flip the debounced level as if the sensor had changed.
    pub fn toggle(&mut self) -> bool {
        let next = !self.state.unwrap_or(false);
        self.accept(next);
        next
    }

    fn accept(&mut self, value: bool) {
        self.state = Some(value);
        self.candidate = None;
        tracing::debug!(level = value, "sensor edge");
        (self.on_change)(value);
    }
}

/// Polls a [`DigitalInput`] and forwards every raw sample.
pub struct SensorSampler {
    _task: PeriodicTask,
}

impl SensorSampler {
    pub fn spawn<F>(mut input: Box<dyn DigitalInput>, poll: Duration, mut sink: F) -> Self
    where
        F: FnMut(bool) + Send + 'static,
    {
        let mut failing = false;
        let task = PeriodicTask::spawn("sensor-sampler", poll, move || match input.read() {
            Ok(v) => {
                if failing {
                    tracing::info!("sensor input readable again");
                    failing = false;
                }
                sink(v);
            }
            Err(e) => {
                if !failing {
                    tracing::warn!(error = %e, "sensor input read failed");
                    failing = true;
                }
            }
        });
        Self { _task: task }
    }
}
