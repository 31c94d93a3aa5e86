//! Weight-indicator drivers.
//!
//! A driver owns the register map of one instrument model and speaks to it
//! only through a shared [`FieldBus`]. The set of models is closed:
//! [`IndicatorModel`] names them and [`build_driver`] constructs them.
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::bus::FieldBus;
use crate::error::{Result, ScaleError};
use crate::queue::SharedClock;
use crate::supervisor::ReconnectCallback;

pub mod laumas_w100;
pub mod tester;

pub use laumas_w100::LaumasW100;
pub use tester::Tester;

/// Decoded snapshot of weight and digital I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightIndicatorState {
    pub weight: i32,
    pub raw_inputs: u16,
    pub raw_outputs: u16,
    pub inputs: [bool; 3],
    pub outputs: [bool; 5],
}

impl WeightIndicatorState {
    pub fn from_raw(weight: i32, raw_inputs: u16, raw_outputs: u16) -> Self {
        Self {
            weight,
            raw_inputs,
            raw_outputs,
            inputs: std::array::from_fn(|i| raw_inputs & (1 << i) != 0),
            outputs: std::array::from_fn(|i| raw_outputs & (1 << i) != 0),
        }
    }

    /// Trigger input (proximity sensor wired to the instrument).
    pub fn input1(&self) -> bool {
        self.inputs[0]
    }
}

/// Bit `i` of the result drives output `i + 1`.
pub fn output_mask(outputs: &[bool; 5]) -> u16 {
    outputs
        .iter()
        .enumerate()
        .fold(0u16, |acc, (i, on)| if *on { acc | (1 << i) } else { acc })
}

pub const COARSE: [bool; 5] = [true, false, false, false, false];
pub const FINE: [bool; 5] = [false, true, false, false, false];
pub const RESET: [bool; 5] = [false; 5];

pub type StateCallback = Box<dyn FnMut(&WeightIndicatorState) + Send>;

pub trait WeightIndicatorDriver: Send + Sync {
    fn model(&self) -> IndicatorModel;

    fn get_weight(&self) -> Result<i32>;
    fn tare(&self) -> Result<()>;
    fn zero(&self) -> Result<()>;

    fn set_output_coarse(&self) -> Result<()>;
    fn set_output_fine(&self) -> Result<()>;
    fn reset_outputs(&self) -> Result<()>;

    /// Read weight and I/O in one queued transaction.
    fn read_state(&self) -> Result<WeightIndicatorState>;
    fn start_continuous_reading(&self, interval: Duration, on_state: StateCallback);
    /// Whether `get_weight` is served from continuous reads.
    fn needs_continuous_reading(&self) -> bool {
        true
    }
    fn stop_continuous_reading(&self);
    fn last_state(&self) -> Option<WeightIndicatorState>;

    /// Development only: force the instrument's weight reading.
    fn test_set_weight(&self, grams: i32) -> Result<()>;

    fn on_reconnect(&self, cb: ReconnectCallback);
    fn is_connected(&self) -> bool;

    // Feed actuation. Output-driven instruments feed through coarse/fine
    // outputs and need no explicit start.
    fn start_feed(&self) -> Result<()> {
        Ok(())
    }
    fn feed_fast(&self, _speed: u32) -> Result<()> {
        self.set_output_coarse()
    }
    fn feed_slow(&self, _speed: u32) -> Result<()> {
        self.set_output_fine()
    }
    fn stop_feed(&self) -> Result<()> {
        self.reset_outputs()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorModel {
    LaumasW100,
    Tester,
}

impl IndicatorModel {
    pub fn key(self) -> &'static str {
        match self {
            Self::LaumasW100 => "laumas-w100",
            Self::Tester => "tester",
        }
    }
}

impl FromStr for IndicatorModel {
    type Err = ScaleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "laumas-w100" => Ok(Self::LaumasW100),
            "tester" => Ok(Self::Tester),
            other => Err(ScaleError::Config(format!("unknown indicator model '{other}'"))),
        }
    }
}

impl std::fmt::Display for IndicatorModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DriverCfg {
    /// Cached state older than this is refused by `get_weight`.
    pub stale_after: Duration,
    /// Gap between the writes of a multi-register command.
    pub command_spacing: Duration,
}

impl Default for DriverCfg {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_millis(1000),
            command_spacing: Duration::from_millis(100),
        }
    }
}

pub fn build_driver(
    model: IndicatorModel,
    bus: Arc<FieldBus>,
    cfg: DriverCfg,
    clock: SharedClock,
) -> Arc<dyn WeightIndicatorDriver> {
    tracing::info!(%model, "building weight indicator driver");
    match model {
        IndicatorModel::LaumasW100 => Arc::new(LaumasW100::new(bus, cfg, clock)),
        IndicatorModel::Tester => Arc::new(Tester::new(bus)),
    }
}
