//! Feed state machine.
//!
//! Pure functions over [`ScaleState`]: the manager actor calls
//! [`feed_tick`] once per feed interval and hands the returned commands to
//! the actuator. Nothing here touches the bus or the clock.
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{ErrorCode, ScaleError};
use crate::record::RecordEvent;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleSettings {
    pub fast_feed_speed: u32,
    pub slow_feed_speed: u32,
    /// Fraction of the target below which the feeder runs fast.
    pub fast_slow_percentage: f64,
    /// Tolerance band as a fraction of the target.
    pub error_percentage: f64,
    /// Settling time between stop and recording, in ms.
    pub resting_time: u64,
}

impl Default for ScaleSettings {
    fn default() -> Self {
        Self {
            fast_feed_speed: 50,
            slow_feed_speed: 20,
            fast_slow_percentage: 0.95,
            error_percentage: 0.01,
            resting_time: 2000,
        }
    }
}

impl ScaleSettings {
    pub fn validate(&self) -> Result<(), ScaleError> {
        let unit = |v: f64| v.is_finite() && (0.0..=1.0).contains(&v);
        if self.fast_feed_speed == 0 || self.slow_feed_speed == 0 {
            return Err(ScaleError::InvalidArgument("feed speeds must be > 0".into()));
        }
        if !unit(self.fast_slow_percentage) {
            return Err(ScaleError::InvalidArgument(
                "fastSlowPercentage must be in [0, 1]".into(),
            ));
        }
        if !unit(self.error_percentage) {
            return Err(ScaleError::InvalidArgument(
                "errorPercentage must be in [0, 1]".into(),
            ));
        }
        Ok(())
    }
}

/// Everything the feed logic reads and writes. Owned by the manager actor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScaleState {
    pub current_weight: i32,
    pub target_weight: i32,
    pub active: bool,
    pub automatic_mode: bool,
    pub feed_started: bool,
    pub feed_fast_set: bool,
    pub feed_slow_set: bool,
    pub feed_stopped: bool,
    pub start_feed_time: i64,
    pub slow_feed_time: i64,
    pub errors: BTreeSet<ErrorCode>,
}

impl ScaleState {
    pub fn with_target(target_weight: i32) -> Self {
        Self {
            target_weight,
            ..Self::default()
        }
    }

    /// Switch on. Coming from inactive re-enables the stop, so a cycle that
    /// starts inside the tolerance band still stops and records once.
    pub fn activate(&mut self, now_ms: i64) {
        if self.active {
            return;
        }
        self.active = true;
        self.feed_stopped = false;
        if !self.feed_started {
            self.start_feed_time = now_ms;
            self.slow_feed_time = 0;
        }
    }

    /// Begin a new cycle on the next tick.
    pub fn arm(&mut self, now_ms: i64) {
        self.activate(now_ms);
        self.feed_fast_set = false;
        self.feed_slow_set = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightCheck {
    /// Below the tolerance band.
    OutOfRange,
    InRange,
    /// Above the band; the cycle is over.
    Overshoot,
}

/// Classify the current weight. Overshoot records `OVERSHOOT` and clears
/// `active` as a side effect.
pub fn check_weight(state: &mut ScaleState, settings: &ScaleSettings) -> WeightCheck {
    let target = f64::from(state.target_weight);
    let lower = target * (1.0 - settings.error_percentage);
    let upper = target * (1.0 + settings.error_percentage);
    let w = f64::from(state.current_weight);

    if w > upper {
        state.errors.insert(ErrorCode::Overshoot);
        state.active = false;
        return WeightCheck::Overshoot;
    }
    if w >= lower {
        WeightCheck::InRange
    } else {
        WeightCheck::OutOfRange
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedCommand {
    Start,
    Fast(u32),
    Slow(u32),
    Stop,
}

/// Timestamps and parameters of a finished cycle, waiting for the resting
/// time to elapse before the final weight is taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingRecord {
    pub start_feed_time: i64,
    pub slow_feed_time: i64,
    pub target_weight: i32,
    pub settings: ScaleSettings,
}

impl PendingRecord {
    pub fn finish(&self, now_ms: i64, final_weight: i32) -> RecordEvent {
        let slow_offset = if self.slow_feed_time >= self.start_feed_time {
            self.slow_feed_time - self.start_feed_time
        } else {
            0
        };
        RecordEvent {
            start_time: self.start_feed_time,
            slow_offset_ms: slow_offset,
            duration_ms: now_ms - self.start_feed_time,
            target_weight: self.target_weight,
            weight_error: final_weight - self.target_weight,
            fast_slow_percentage: self.settings.fast_slow_percentage,
            error_percentage: self.settings.error_percentage,
            resting_time: self.settings.resting_time,
            fast_feed_speed: self.settings.fast_feed_speed,
            slow_feed_speed: self.settings.slow_feed_speed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedOutcome {
    pub commands: Vec<FeedCommand>,
    pub recording: Option<PendingRecord>,
    /// Visible state changed; listeners should be notified.
    pub changed: bool,
}

pub fn feed_tick(state: &mut ScaleState, settings: &ScaleSettings, now_ms: i64) -> FeedOutcome {
    let mut out = FeedOutcome::default();

    if !state.active {
        if state.feed_started {
            state.feed_started = false;
            state.feed_fast_set = false;
            state.feed_slow_set = false;
            out.commands.push(FeedCommand::Stop);
            out.changed = true;
        }
        return out;
    }

    match check_weight(state, settings) {
        WeightCheck::OutOfRange => {
            state.feed_stopped = false;
            let slow_at = f64::from(state.target_weight) * settings.fast_slow_percentage;
            if f64::from(state.current_weight) < slow_at {
                if !state.feed_fast_set && !state.feed_slow_set {
                    tracing::info!(weight = state.current_weight, target = state.target_weight, "feed fast");
                    state.feed_fast_set = true;
                    out.commands.push(FeedCommand::Fast(settings.fast_feed_speed));
                    out.changed = true;
                }
            } else if !state.feed_slow_set {
                tracing::info!(weight = state.current_weight, target = state.target_weight, "feed slow");
                state.feed_slow_set = true;
                state.slow_feed_time = now_ms;
                out.commands.push(FeedCommand::Slow(settings.slow_feed_speed));
                out.changed = true;
            }
            if !state.feed_started {
                state.feed_started = true;
                state.start_feed_time = now_ms;
                state.slow_feed_time = 0;
                out.commands.push(FeedCommand::Start);
                out.changed = true;
            }
        }
        check @ (WeightCheck::InRange | WeightCheck::Overshoot) => {
            state.feed_started = false;
            state.feed_fast_set = false;
            state.feed_slow_set = false;
            if !state.feed_stopped {
                state.feed_stopped = true;
                state.active = false;
                tracing::info!(
                    weight = state.current_weight,
                    target = state.target_weight,
                    overshoot = check == WeightCheck::Overshoot,
                    "feed stop"
                );
                out.commands.push(FeedCommand::Stop);
                out.recording = Some(PendingRecord {
                    start_feed_time: state.start_feed_time,
                    slow_feed_time: state.slow_feed_time,
                    target_weight: state.target_weight,
                    settings: *settings,
                });
                out.changed = true;
            } else if check == WeightCheck::Overshoot {
                out.changed = true;
            }
        }
    }
    out
}
