//! Calendar analytics over completed cycles.
//!
//! Events that started before local midnight of "today" are folded into a
//! year → month → day → hour tree, removed from the live log and appended
//! to the cold archive. Months are zero-based (January = 0) to stay
//! compatible with previously stored trees.
//!
//! `averageError` is smoothed with a fixed factor of one half: a new bucket
//! takes the batch average, an existing bucket becomes
//! `(old + batch) / 2` for every folded event that lands in it.
use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::record::RecordEvent;
use crate::store::{ColdStorage, Database, Store};
use crate::ticker::PeriodicTask;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourBucket {
    /// target weight → number of cycles
    pub measurements: BTreeMap<i32, u64>,
    pub average_error: f64,
}

pub type Day = BTreeMap<u32, HourBucket>;
pub type Month = BTreeMap<u32, Day>;
pub type Year = BTreeMap<u32, Month>;
pub type Analytics = BTreeMap<i32, Year>;

/// Unix ms of local midnight starting the day that contains `now`.
pub fn start_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> i64 {
    let tz = now.timezone();
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| tz.from_local_datetime(&midnight).earliest())
        .map_or_else(|| now.timestamp_millis(), |d| d.timestamp_millis())
}

/// Split into (prior, current) around `midnight_ms`, preserving order.
pub fn partition_events(
    events: Vec<RecordEvent>,
    midnight_ms: i64,
) -> (Vec<RecordEvent>, Vec<RecordEvent>) {
    events.into_iter().partition(|e| e.start_time < midnight_ms)
}

/// Mean of the error-percentage field; `None` for an empty batch.
pub fn average_error(events: &[RecordEvent]) -> Option<f64> {
    if events.is_empty() {
        return None;
    }
    let sum: f64 = events.iter().map(|e| e.error_percentage).sum();
    Some(sum / events.len() as f64)
}

#[inline]
pub fn smooth(old: f64, batch: f64) -> f64 {
    (old + batch) / 2.0
}

/// Fold `prior` into `analytics`, bucketing by each event's local start time.
pub fn compose_analytics_in<Tz: TimeZone>(analytics: &mut Analytics, prior: &[RecordEvent], tz: &Tz) {
    let Some(batch) = average_error(prior) else {
        return;
    };
    for ev in prior {
        let Some(at) = tz.timestamp_millis_opt(ev.start_time).single() else {
            tracing::warn!(start = ev.start_time, "event time out of range; not bucketed");
            continue;
        };
        let bucket_slot = analytics
            .entry(at.year())
            .or_default()
            .entry(at.month0())
            .or_default()
            .entry(at.day())
            .or_default()
            .entry(at.hour());
        match bucket_slot {
            std::collections::btree_map::Entry::Vacant(v) => {
                let mut b = HourBucket {
                    average_error: batch,
                    ..HourBucket::default()
                };
                b.measurements.insert(ev.target_weight, 1);
                v.insert(b);
            }
            std::collections::btree_map::Entry::Occupied(mut o) => {
                let b = o.get_mut();
                *b.measurements.entry(ev.target_weight).or_insert(0) += 1;
                b.average_error = smooth(b.average_error, batch);
            }
        }
    }
}

/// One aggregation pass. Returns how many events were folded.
pub fn run_pass_in<Tz: TimeZone>(
    db: &dyn Store<Database>,
    cold: &dyn Store<ColdStorage>,
    now: &DateTime<Tz>,
) -> Result<usize> {
    let midnight = start_of_day(now);
    let tz = now.timezone();
    let mut folded: Vec<RecordEvent> = Vec::new();
    db.update(&mut |record: &mut Database| {
        let (prior, current) = partition_events(std::mem::take(&mut record.events), midnight);
        record.events = current;
        compose_analytics_in(&mut record.analytics, &prior, &tz);
        folded = prior;
    })?;
    if folded.is_empty() {
        tracing::debug!("analytics pass: nothing to fold");
        return Ok(0);
    }
    let n = folded.len();
    cold.update(&mut |archive: &mut ColdStorage| archive.events.append(&mut folded))?;
    tracing::info!(events = n, "analytics pass folded prior events");
    Ok(n)
}

pub fn run_pass(db: &dyn Store<Database>, cold: &dyn Store<ColdStorage>) -> Result<usize> {
    run_pass_in(db, cold, &Local::now())
}

/// Runs [`run_pass`] on construction and then every `interval`.
pub struct AnalyticsScheduler {
    _task: PeriodicTask,
}

impl AnalyticsScheduler {
    pub fn spawn(
        db: Arc<dyn Store<Database>>,
        cold: Arc<dyn Store<ColdStorage>>,
        interval: Duration,
    ) -> Self {
        let pass = move || {
            if let Err(e) = run_pass(db.as_ref(), cold.as_ref()) {
                tracing::warn!(error = %e, "analytics pass failed");
            }
        };
        pass();
        Self {
            _task: PeriodicTask::spawn("analytics", interval, pass),
        }
    }
}
