#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the filling-scale controller.
//!
//! - `Config` and its sections are deserialized from TOML; every section is
//!   optional and falls back to the plant defaults.
//! - `Config::validate` rejects values the runtime cannot honour before any
//!   thread is started.
use std::path::PathBuf;

use serde::Deserialize;

/// Instrument model keys accepted in `[indicator] model`.
pub const INDICATOR_MODELS: &[&str] = &["laumas-w100", "tester"];

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    #[default]
    Tcp,
    Rtu,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParityCfg {
    #[default]
    None,
    Even,
    Odd,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LinkCfg {
    pub kind: LinkKind,
    pub host: String,
    pub port: u16,
    /// Serial device path (RTU only)
    pub device: String,
    pub baud: u32,
    pub parity: ParityCfg,
    pub stop_bits: u8,
    pub slave_id: u8,
    /// Upper bound on one register transaction
    pub timeout_ms: u64,
}

impl Default for LinkCfg {
    fn default() -> Self {
        Self {
            kind: LinkKind::Tcp,
            host: "127.0.0.1".into(),
            port: 8502,
            device: "/dev/ttyUSB0".into(),
            baud: 9600,
            parity: ParityCfg::None,
            stop_bits: 1,
            slave_id: 1,
            timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndicatorCfg {
    pub model: String,
    /// Cached continuous-read state older than this is refused by `get_weight`
    pub stale_after_ms: u64,
}

impl Default for IndicatorCfg {
    fn default() -> Self {
        Self {
            model: "laumas-w100".into(),
            stale_after_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimingCfg {
    pub weight_interval_ms: u64,
    pub feed_interval_ms: u64,
    pub state_read_interval_ms: u64,
    /// Minimum spacing between the end of one bus transaction and the start of the next
    pub min_operation_interval_ms: u64,
    pub reconnect_interval_ms: u64,
    /// 0 disables the health probe
    pub health_check_ms: u64,
    pub analytics_interval_ms: u64,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            weight_interval_ms: 100,
            feed_interval_ms: 95,
            state_read_interval_ms: 250,
            min_operation_interval_ms: 100,
            reconnect_interval_ms: 3000,
            health_check_ms: 5000,
            analytics_interval_ms: 12 * 60 * 60 * 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SensorSource {
    #[default]
    None,
    /// Digital input 1 of the weight indicator, taken from continuous reads
    Indicator,
    Gpio,
    Simulated,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SensorCfg {
    pub source: SensorSource,
    pub gpio_pin: u8,
    pub active_low: bool,
    pub poll_ms: u64,
    /// Consecutive identical samples required before a change is accepted
    pub debounce_n: u8,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            source: SensorSource::None,
            gpio_pin: 7,
            active_low: false,
            poll_ms: 20,
            debounce_n: 1,
        }
    }
}

/// Initial feed settings used when the settings record is empty.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DefaultsCfg {
    pub fast_feed_speed: u32,
    pub slow_feed_speed: u32,
    pub fast_slow_percentage: f64,
    pub error_percentage: f64,
    pub resting_time_ms: u64,
    pub target_weight: i32,
}

impl Default for DefaultsCfg {
    fn default() -> Self {
        Self {
            fast_feed_speed: 50,
            slow_feed_speed: 20,
            fast_slow_percentage: 0.95,
            error_percentage: 0.01,
            resting_time_ms: 2000,
            target_weight: 25_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StorageCfg {
    /// Directory holding `db.json` and `cold.json`; `$HOME/.open-scale` when unset
    pub dir: Option<PathBuf>,
}

impl StorageCfg {
    pub fn resolved_dir(&self) -> PathBuf {
        if let Some(dir) = &self.dir {
            return dir.clone();
        }
        std::env::var_os("HOME")
            .map_or_else(|| PathBuf::from("."), PathBuf::from)
            .join(".open-scale")
    }

    pub fn db_path(&self) -> PathBuf {
        self.resolved_dir().join("db.json")
    }

    pub fn cold_path(&self) -> PathBuf {
        self.resolved_dir().join("cold.json")
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    /// Enables weight/sensor injection
    Development,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RuntimeCfg {
    pub environment: Environment,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub link: LinkCfg,
    pub indicator: IndicatorCfg,
    pub timing: TimingCfg,
    pub sensor: SensorCfg,
    pub defaults: DefaultsCfg,
    pub storage: StorageCfg,
    pub logging: Logging,
    pub runtime: RuntimeCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

fn in_unit_range(v: f64) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Link
        match self.link.kind {
            LinkKind::Tcp => {
                if self.link.host.trim().is_empty() {
                    eyre::bail!("link.host must not be empty");
                }
                if self.link.port == 0 {
                    eyre::bail!("link.port must be > 0");
                }
            }
            LinkKind::Rtu => {
                if self.link.device.trim().is_empty() {
                    eyre::bail!("link.device must not be empty");
                }
                if self.link.baud == 0 {
                    eyre::bail!("link.baud must be > 0");
                }
                if !matches!(self.link.stop_bits, 1 | 2) {
                    eyre::bail!("link.stop_bits must be 1 or 2");
                }
            }
        }
        if self.link.timeout_ms == 0 {
            eyre::bail!("link.timeout_ms must be >= 1");
        }

        // Indicator
        if !INDICATOR_MODELS.contains(&self.indicator.model.as_str()) {
            eyre::bail!(
                "indicator.model '{}' is unknown (expected one of: {})",
                self.indicator.model,
                INDICATOR_MODELS.join(", ")
            );
        }
        if self.indicator.stale_after_ms == 0 {
            eyre::bail!("indicator.stale_after_ms must be >= 1");
        }

        // Timing
        let t = &self.timing;
        for (name, v) in [
            ("weight_interval_ms", t.weight_interval_ms),
            ("feed_interval_ms", t.feed_interval_ms),
            ("state_read_interval_ms", t.state_read_interval_ms),
            ("reconnect_interval_ms", t.reconnect_interval_ms),
            ("analytics_interval_ms", t.analytics_interval_ms),
        ] {
            if v == 0 {
                eyre::bail!("timing.{name} must be >= 1");
            }
        }
        if t.min_operation_interval_ms > 60_000 {
            eyre::bail!("timing.min_operation_interval_ms is unreasonably large (>60s)");
        }

        // Sensor
        if self.sensor.debounce_n == 0 {
            eyre::bail!("sensor.debounce_n must be >= 1");
        }
        if self.sensor.poll_ms == 0 {
            eyre::bail!("sensor.poll_ms must be >= 1");
        }

        // Defaults
        let d = &self.defaults;
        if d.fast_feed_speed == 0 {
            eyre::bail!("defaults.fast_feed_speed must be > 0");
        }
        if d.slow_feed_speed == 0 {
            eyre::bail!("defaults.slow_feed_speed must be > 0");
        }
        if !in_unit_range(d.fast_slow_percentage) {
            eyre::bail!("defaults.fast_slow_percentage must be in [0.0, 1.0]");
        }
        if !in_unit_range(d.error_percentage) {
            eyre::bail!("defaults.error_percentage must be in [0.0, 1.0]");
        }
        if d.resting_time_ms > 10 * 60 * 1000 {
            eyre::bail!("defaults.resting_time_ms is unreasonably large (>10min)");
        }
        if d.target_weight <= 0 {
            eyre::bail!("defaults.target_weight must be > 0");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of: never, daily, hourly");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_plant_defaults() {
        let cfg = load_toml("").unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.link.port, 8502);
        assert_eq!(cfg.timing.feed_interval_ms, 95);
        assert_eq!(cfg.defaults.target_weight, 25_000);
        assert_eq!(cfg.runtime.environment, Environment::Production);
    }

    #[test]
    fn explicit_storage_dir_wins() {
        let s = StorageCfg {
            dir: Some(PathBuf::from("/var/lib/scale")),
        };
        assert_eq!(s.db_path(), PathBuf::from("/var/lib/scale/db.json"));
        assert_eq!(s.cold_path(), PathBuf::from("/var/lib/scale/cold.json"));
    }
}
