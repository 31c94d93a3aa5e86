//! Persistence contract and the JSON-file implementation.
//!
//! The manager and the analytics pass depend only on [`Store`]: a whole-
//! record `read` and an atomic read-modify-write `update`.
use eyre::WrapErr;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::analytics::Analytics;
use crate::error::{Result, ScaleError};
use crate::feed::ScaleSettings;
use crate::record::RecordEvent;
use crate::util::write_atomic;

pub trait Store<T>: Send + Sync {
    fn read(&self) -> Result<T>;
    /// Apply `mutate` and persist the result before returning.
    fn update(&self, mutate: &mut dyn FnMut(&mut T)) -> Result<()>;
}

/// The live record: settings, target weight, uncompacted events and the
/// analytics tree. Settings fields are optional so a fresh file falls back
/// to configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Database {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fast_feed_speed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow_feed_speed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fast_slow_percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resting_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_weight: Option<i32>,
    pub events: Vec<RecordEvent>,
    pub analytics: Analytics,
}

impl Database {
    pub fn settings_or(&self, defaults: &ScaleSettings) -> ScaleSettings {
        ScaleSettings {
            fast_feed_speed: self.fast_feed_speed.unwrap_or(defaults.fast_feed_speed),
            slow_feed_speed: self.slow_feed_speed.unwrap_or(defaults.slow_feed_speed),
            fast_slow_percentage: self
                .fast_slow_percentage
                .unwrap_or(defaults.fast_slow_percentage),
            error_percentage: self.error_percentage.unwrap_or(defaults.error_percentage),
            resting_time: self.resting_time.unwrap_or(defaults.resting_time),
        }
    }

    pub fn set_settings(&mut self, s: &ScaleSettings) {
        self.fast_feed_speed = Some(s.fast_feed_speed);
        self.slow_feed_speed = Some(s.slow_feed_speed);
        self.fast_slow_percentage = Some(s.fast_slow_percentage);
        self.error_percentage = Some(s.error_percentage);
        self.resting_time = Some(s.resting_time);
    }
}

/// Archive of events already folded into analytics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColdStorage {
    pub events: Vec<RecordEvent>,
}

pub struct JsonFileStore<T> {
    path: PathBuf,
    cache: Mutex<Option<T>>,
}

impl<T> JsonFileStore<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + Send,
{
    /// Open `path`, creating it (and its directory) with `T::default()` when
    /// missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let store = Self {
            path,
            cache: Mutex::new(None),
        };
        if !store.path.exists() {
            tracing::info!(path = %store.path.display(), "creating record file");
            store.persist(&T::default())?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<T> {
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| ScaleError::Storage(e.to_string()))
            .wrap_err_with(|| format!("read {}", self.path.display()))?;
        if text.trim().is_empty() {
            return Ok(T::default());
        }
        serde_json::from_str(&text)
            .map_err(|e| ScaleError::Storage(e.to_string()))
            .wrap_err_with(|| format!("parse {}", self.path.display()))
    }

    fn persist(&self, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| ScaleError::Storage(e.to_string()))?;
        write_atomic(&self.path, &bytes)
            .map_err(|e| ScaleError::Storage(e.to_string()))
            .wrap_err_with(|| format!("write {}", self.path.display()))
    }
}

impl<T> Store<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + Send,
{
    fn read(&self) -> Result<T> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(v) = cache.as_ref() {
            return Ok(v.clone());
        }
        let v = self.load()?;
        *cache = Some(v.clone());
        Ok(v)
    }

    fn update(&self, mutate: &mut dyn FnMut(&mut T)) -> Result<()> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let mut v = match cache.take() {
            Some(v) => v,
            None => self.load()?,
        };
        mutate(&mut v);
        let res = self.persist(&v);
        // Keep memory and disk in step only when the write landed.
        if res.is_ok() {
            *cache = Some(v);
        }
        res
    }
}

/// Volatile store for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore<T> {
    value: Mutex<T>,
}

impl<T> MemoryStore<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }
}

impl<T: Clone + Send> Store<T> for MemoryStore<T> {
    fn read(&self) -> Result<T> {
        Ok(self
            .value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn update(&self, mutate: &mut dyn FnMut(&mut T)) -> Result<()> {
        mutate(&mut self.value.lock().unwrap_or_else(PoisonError::into_inner));
        Ok(())
    }
}
