use serde::{Deserialize, Serialize};

/// On-disk layout of a completed cycle: a 10-element JSON array.
pub type RecordTuple = (i64, i64, i64, i32, i32, f64, f64, u64, u32, u32);

/// One completed fill cycle. Serialised as [`RecordTuple`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RecordTuple", into = "RecordTuple")]
pub struct RecordEvent {
    /// Unix ms when feeding started.
    pub start_time: i64,
    pub slow_offset_ms: i64,
    /// Start to recording, resting time included.
    pub duration_ms: i64,
    pub target_weight: i32,
    /// Final weight minus target.
    pub weight_error: i32,
    pub fast_slow_percentage: f64,
    pub error_percentage: f64,
    pub resting_time: u64,
    pub fast_feed_speed: u32,
    pub slow_feed_speed: u32,
}

impl From<RecordTuple> for RecordEvent {
    fn from(t: RecordTuple) -> Self {
        Self {
            start_time: t.0,
            slow_offset_ms: t.1,
            duration_ms: t.2,
            target_weight: t.3,
            weight_error: t.4,
            fast_slow_percentage: t.5,
            error_percentage: t.6,
            resting_time: t.7,
            fast_feed_speed: t.8,
            slow_feed_speed: t.9,
        }
    }
}

impl From<RecordEvent> for RecordTuple {
    fn from(e: RecordEvent) -> Self {
        (
            e.start_time,
            e.slow_offset_ms,
            e.duration_ms,
            e.target_weight,
            e.weight_error,
            e.fast_slow_percentage,
            e.error_percentage,
            e.resting_time,
            e.fast_feed_speed,
            e.slow_feed_speed,
        )
    }
}
