use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::{
    COARSE, FINE, IndicatorModel, RESET, StateCallback, WeightIndicatorDriver,
    WeightIndicatorState, output_mask,
};
use crate::bus::{ContinuousReader, FieldBus};
use crate::error::{Result, ScaleError};
use crate::hw_error::map_boxed;
use crate::supervisor::ReconnectCallback;

/// Legacy bench register map: a plain feeder with start/stop/speed registers.
pub mod regs {
    pub const WEIGHT: u16 = 5;
    pub const START_FEED: u16 = 6;
    pub const STOP_FEED: u16 = 7;
    pub const SPEED_FEED: u16 = 8;
    pub const TARE: u16 = 9;
    pub const INPUTS: u16 = 10;
    pub const OUTPUTS: u16 = 11;
    pub const STATE_BLOCK_LEN: u16 = OUTPUTS - WEIGHT + 1;
}

fn read_block(
    link: &mut dyn scale_traits::RegisterLink,
) -> std::result::Result<WeightIndicatorState, ScaleError> {
    let words = link
        .read_holding_registers(regs::WEIGHT, regs::STATE_BLOCK_LEN)
        .map_err(map_boxed)?;
    let get = |addr: u16| {
        words
            .get(usize::from(addr - regs::WEIGHT))
            .copied()
            .ok_or_else(|| ScaleError::Decode(format!("missing register {addr}")))
    };
    Ok(WeightIndicatorState::from_raw(
        i32::from(get(regs::WEIGHT)?),
        get(regs::INPUTS)?,
        get(regs::OUTPUTS)?,
    ))
}

pub struct Tester {
    bus: Arc<FieldBus>,
    last: Arc<Mutex<Option<WeightIndicatorState>>>,
    reader: Mutex<Option<ContinuousReader>>,
}

impl Tester {
    pub fn new(bus: Arc<FieldBus>) -> Self {
        Self {
            bus,
            last: Arc::new(Mutex::new(None)),
            reader: Mutex::new(None),
        }
    }

    fn pulse(&self, addr: u16, what: &'static str) -> Result<()> {
        self.bus.execute(what, move |link| {
            link.write_registers(addr, &[1]).map_err(map_boxed)
        })
    }

    fn write_outputs(&self, outputs: [bool; 5]) -> Result<()> {
        let mask = output_mask(&outputs);
        self.bus.execute("write outputs", move |link| {
            link.write_registers(regs::OUTPUTS, &[mask]).map_err(map_boxed)
        })
    }

    fn write_speed(&self, speed: u32) -> Result<()> {
        let word = u16::try_from(speed).unwrap_or(u16::MAX);
        tracing::info!(speed = word, "setting feed speed");
        self.bus.execute("set feed speed", move |link| {
            link.write_registers(regs::SPEED_FEED, &[word]).map_err(map_boxed)
        })
    }
}

impl WeightIndicatorDriver for Tester {
    fn model(&self) -> IndicatorModel {
        IndicatorModel::Tester
    }

    fn get_weight(&self) -> Result<i32> {
        self.bus.query("read weight", |link| {
            let words = link
                .read_holding_registers(regs::WEIGHT, 1)
                .map_err(map_boxed)?;
            words
                .first()
                .map(|w| i32::from(*w))
                .ok_or_else(|| ScaleError::Decode("empty weight read".into()))
        })
    }

    fn tare(&self) -> Result<()> {
        self.pulse(regs::TARE, "tare")
    }

    /// The bench feeder has no separate zero command.
    fn zero(&self) -> Result<()> {
        self.pulse(regs::TARE, "zero")
    }

    fn set_output_coarse(&self) -> Result<()> {
        self.write_outputs(COARSE)
    }

    fn set_output_fine(&self) -> Result<()> {
        self.write_outputs(FINE)
    }

    fn reset_outputs(&self) -> Result<()> {
        self.write_outputs(RESET)
    }

    fn read_state(&self) -> Result<WeightIndicatorState> {
        let state = self.bus.query("read indicator state", read_block)?;
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(state);
        Ok(state)
    }

    fn start_continuous_reading(&self, interval: Duration, mut on_state: StateCallback) {
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        if reader.is_some() {
            tracing::warn!("continuous state reading already active");
            return;
        }
        let last = self.last.clone();
        *reader = Some(ContinuousReader::spawn(
            self.bus.clone(),
            interval,
            read_block,
            move |state: WeightIndicatorState| {
                *last.lock().unwrap_or_else(PoisonError::into_inner) = Some(state);
                on_state(&state);
            },
        ));
    }

    fn needs_continuous_reading(&self) -> bool {
        false
    }

    fn stop_continuous_reading(&self) {
        drop(
            self.reader
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
    }

    fn last_state(&self) -> Option<WeightIndicatorState> {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn test_set_weight(&self, grams: i32) -> Result<()> {
        let word = u16::try_from(grams.max(0)).unwrap_or(u16::MAX);
        self.bus.execute("test set weight", move |link| {
            link.write_registers(regs::WEIGHT, &[word]).map_err(map_boxed)
        })
    }

    fn on_reconnect(&self, cb: ReconnectCallback) {
        self.bus.on_reconnect(cb);
    }

    fn is_connected(&self) -> bool {
        self.bus.is_connected()
    }

    fn start_feed(&self) -> Result<()> {
        tracing::info!("start feed");
        self.pulse(regs::START_FEED, "start feed")
    }

    fn feed_fast(&self, speed: u32) -> Result<()> {
        self.write_speed(speed)
    }

    fn feed_slow(&self, speed: u32) -> Result<()> {
        self.write_speed(speed)
    }

    fn stop_feed(&self) -> Result<()> {
        tracing::info!("stop feed");
        self.pulse(regs::STOP_FEED, "stop feed")
    }
}
