use eyre::WrapErr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::{
    COARSE, DriverCfg, FINE, IndicatorModel, RESET, StateCallback, WeightIndicatorDriver,
    WeightIndicatorState, output_mask,
};
use crate::bus::{ContinuousReader, FieldBus};
use crate::error::{Result, ScaleError};
use crate::hw_error::map_boxed;
use crate::queue::SharedClock;
use crate::supervisor::ReconnectCallback;

/// 0-based holding registers.
pub mod regs {
    pub const COMMAND: u16 = 5;
    pub const WEIGHT: u16 = 7;
    pub const INPUTS: u16 = 16;
    pub const OUTPUTS: u16 = 17;
    pub const TARE_LOW: u16 = 72;
    pub const TARE_HIGH: u16 = 73;
    /// WEIGHT..=OUTPUTS
    pub const STATE_BLOCK_LEN: u16 = OUTPUTS - WEIGHT + 1;
}

pub mod commands {
    pub const SEMI_AUTO_ZERO: u16 = 8;
    pub const TARE: u16 = 130;
}

/// The instrument reports grams as a high word plus a low word in tens.
pub fn decode_weight(hi: u16, lo: u16) -> i32 {
    (i32::from(hi) << 16) | (i32::from(lo) * 10)
}

/// Inverse of [`decode_weight`] for weights below 65 536 g, at 10 g resolution.
pub fn encode_weight(grams: i32) -> [u16; 2] {
    let g = grams.max(0);
    [(g >> 16) as u16, ((g & 0xFFFF) / 10) as u16]
}

pub fn decode_state_block(words: &[u16]) -> std::result::Result<WeightIndicatorState, ScaleError> {
    let need = usize::from(regs::STATE_BLOCK_LEN);
    if words.len() < need {
        return Err(ScaleError::Decode(format!(
            "state block has {} registers, expected {need}",
            words.len()
        )));
    }
    let inputs = words[usize::from(regs::INPUTS - regs::WEIGHT)];
    let outputs = words[usize::from(regs::OUTPUTS - regs::WEIGHT)];
    Ok(WeightIndicatorState::from_raw(
        decode_weight(words[0], words[1]),
        inputs,
        outputs,
    ))
}

type Cache = Arc<Mutex<Option<(Instant, WeightIndicatorState)>>>;

/// Laumas W100 weight transmitter with PLC-mode outputs.
pub struct LaumasW100 {
    bus: Arc<FieldBus>,
    cache: Cache,
    reader: Mutex<Option<ContinuousReader>>,
    clock: SharedClock,
    cfg: DriverCfg,
}

impl LaumasW100 {
    /// The cache is refreshed on every reconnection before any callback
    /// passed to [`WeightIndicatorDriver::on_reconnect`] runs, so weight
    /// reads never see a state from before the outage once errors clear.
    pub fn new(bus: Arc<FieldBus>, cfg: DriverCfg, clock: SharedClock) -> Self {
        let cache: Cache = Arc::new(Mutex::new(None));
        {
            let cache = cache.clone();
            let clock = clock.clone();
            bus.on_reconnect_read(
                "state refresh",
                Self::read_block,
                move |state: WeightIndicatorState| Self::store(&cache, clock.now(), state),
            );
        }
        Self {
            bus,
            cache,
            reader: Mutex::new(None),
            clock,
            cfg,
        }
    }

    fn read_block(link: &mut dyn scale_traits::RegisterLink) -> std::result::Result<WeightIndicatorState, ScaleError> {
        let words = link
            .read_holding_registers(regs::WEIGHT, regs::STATE_BLOCK_LEN)
            .map_err(map_boxed)?;
        decode_state_block(&words)
    }

    fn store(cache: &Cache, at: Instant, state: WeightIndicatorState) {
        *cache.lock().unwrap_or_else(PoisonError::into_inner) = Some((at, state));
    }

    fn write_outputs(&self, outputs: [bool; 5], label: &'static str) -> Result<()> {
        let mask = output_mask(&outputs);
        tracing::info!(mask, "setting outputs: {label}");
        self.bus.execute("write outputs", move |link| {
            link.write_register(regs::OUTPUTS, mask).map_err(map_boxed)
        })
    }
}

impl WeightIndicatorDriver for LaumasW100 {
    fn model(&self) -> IndicatorModel {
        IndicatorModel::LaumasW100
    }

    fn get_weight(&self) -> Result<i32> {
        let cached = *self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let (at, state) = cached.ok_or(ScaleError::NoData)?;
        let age = self.clock.now().saturating_duration_since(at);
        if age > self.cfg.stale_after {
            return Err(ScaleError::Stale {
                age_ms: crate::util::millis(age),
            }
            .into());
        }
        Ok(state.weight)
    }

    fn tare(&self) -> Result<()> {
        let clock = self.clock.clone();
        let spacing = self.cfg.command_spacing;
        tracing::info!("performing tare");
        self.bus.execute("tare", move |link| {
            link.write_registers(regs::TARE_LOW, &[0]).map_err(map_boxed)?;
            clock.sleep(spacing);
            link.write_registers(regs::TARE_HIGH, &[0]).map_err(map_boxed)?;
            clock.sleep(spacing);
            link.write_registers(regs::COMMAND, &[commands::TARE])
                .map_err(map_boxed)
        })
    }

    fn zero(&self) -> Result<()> {
        tracing::info!("performing semi-auto zero");
        self.bus.execute("zero", |link| {
            link.write_register(regs::COMMAND, commands::SEMI_AUTO_ZERO)
                .map_err(map_boxed)
        })
    }

    fn set_output_coarse(&self) -> Result<()> {
        self.write_outputs(COARSE, "coarse")
    }

    fn set_output_fine(&self) -> Result<()> {
        self.write_outputs(FINE, "fine")
    }

    fn reset_outputs(&self) -> Result<()> {
        self.write_outputs(RESET, "reset")
    }

    fn read_state(&self) -> Result<WeightIndicatorState> {
        let state = self.bus.query("read indicator state", Self::read_block)?;
        Self::store(&self.cache, self.clock.now(), state);
        Ok(state)
    }

    fn start_continuous_reading(&self, interval: Duration, mut on_state: StateCallback) {
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        if reader.is_some() {
            tracing::warn!("continuous state reading already active");
            return;
        }
        tracing::info!(interval_ms = crate::util::millis(interval), "starting continuous state reading");
        let cache = self.cache.clone();
        let clock = self.clock.clone();
        *reader = Some(ContinuousReader::spawn(
            self.bus.clone(),
            interval,
            Self::read_block,
            move |state: WeightIndicatorState| {
                Self::store(&cache, clock.now(), state);
                on_state(&state);
            },
        ));
    }

    fn stop_continuous_reading(&self) {
        let taken = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if taken.is_some() {
            tracing::info!("stopping continuous state reading");
        } else {
            tracing::warn!("continuous state reading is not active");
        }
    }

    fn last_state(&self) -> Option<WeightIndicatorState> {
        let cached = *self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cached.map(|(_, s)| s)
    }

    fn test_set_weight(&self, grams: i32) -> Result<()> {
        let words = encode_weight(grams);
        self.bus
            .execute("test set weight", move |link| {
                link.write_registers(regs::WEIGHT, &words).map_err(map_boxed)
            })
            .wrap_err_with(|| format!("force weight to {grams} g"))
    }

    fn on_reconnect(&self, cb: ReconnectCallback) {
        self.bus.on_reconnect(cb);
    }

    fn is_connected(&self) -> bool {
        self.bus.is_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_decode_combines_words() {
        assert_eq!(decode_weight(0, 1234), 12_340);
        assert_eq!(decode_weight(1, 0), 65_536);
    }

    #[test]
    fn encode_matches_decode_at_instrument_resolution() {
        let [hi, lo] = encode_weight(12_345);
        assert_eq!(decode_weight(hi, lo), 12_340);
    }

    #[test]
    fn short_block_is_a_decode_error() {
        assert!(matches!(
            decode_state_block(&[0; 5]),
            Err(ScaleError::Decode(_))
        ));
    }

    #[test]
    fn block_offsets_pick_io_registers() {
        let mut words = vec![0u16; usize::from(regs::STATE_BLOCK_LEN)];
        words[1] = 250;
        words[9] = 0b001;
        words[10] = 0b10;
        let s = decode_state_block(&words).unwrap();
        assert_eq!(s.weight, 2500);
        assert!(s.input1());
        assert_eq!(s.outputs, [false, true, false, false, false]);
    }
}
