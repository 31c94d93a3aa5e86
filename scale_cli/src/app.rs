//! Composition root: config in, running controller out.

use eyre::{Result, WrapErr};
use scale_config::{Config, SensorSource};
use scale_core::analytics::AnalyticsScheduler;
use scale_core::conversions::{indicator_model, link_params};
use scale_core::{
    BusCfg, ColdStorage, Database, DriverCfg, FieldBus, JsonFileStore, ManagerCfg, ManagerDeps,
    ScaleManager, SensorInput, SharedClock, Store, WeightIndicatorDriver, build_driver,
};
use scale_traits::{Connector, MonotonicClock};
use std::sync::Arc;
use std::time::Duration;

/// Field-bus connector for the configured link.
#[cfg(feature = "modbus")]
pub fn make_connector(cfg: &Config) -> Box<dyn Connector> {
    let params = link_params(&cfg.link);
    tracing::info!(endpoint = %params.endpoint(), "using modbus link");
    Box::new(scale_hardware::ModbusConnector::new(params))
}

/// Without the `modbus` feature the instrument is simulated in memory.
#[cfg(not(feature = "modbus"))]
pub fn make_connector(cfg: &Config) -> Box<dyn Connector> {
    let params = link_params(&cfg.link);
    tracing::warn!(
        configured = %params.endpoint(),
        "built without modbus support; using simulated instrument"
    );
    Box::new(scale_hardware::SimulatedConnector::new(
        scale_hardware::RegisterBank::new(),
    ))
}

fn make_sensor(cfg: &Config) -> Result<SensorInput> {
    Ok(match cfg.sensor.source {
        SensorSource::None => SensorInput::None,
        SensorSource::Indicator => SensorInput::Indicator,
        SensorSource::Simulated => {
            SensorInput::Polled(Box::new(scale_hardware::SimulatedInput::new(false)))
        }
        #[cfg(all(feature = "hardware", target_os = "linux"))]
        SensorSource::Gpio => {
            let input = scale_hardware::GpioInput::new(cfg.sensor.gpio_pin, cfg.sensor.active_low)
                .wrap_err_with(|| format!("open sensor gpio {}", cfg.sensor.gpio_pin))?;
            SensorInput::Polled(Box::new(input))
        }
        #[cfg(not(all(feature = "hardware", target_os = "linux")))]
        SensorSource::Gpio => {
            eyre::bail!("sensor.source = \"gpio\" requires the `hardware` feature on Linux")
        }
    })
}

/// Open the live record and the cold archive under the configured dir.
pub fn open_stores(
    cfg: &Config,
) -> Result<(Arc<JsonFileStore<Database>>, Arc<JsonFileStore<ColdStorage>>)> {
    let db = JsonFileStore::open(cfg.storage.db_path())?;
    let cold = JsonFileStore::open(cfg.storage.cold_path())?;
    Ok((Arc::new(db), Arc::new(cold)))
}

/// Bus plus driver, without the manager. Used by `self-check`.
pub fn connect_driver(cfg: &Config, clock: SharedClock) -> Result<Arc<dyn WeightIndicatorDriver>> {
    let model = indicator_model(cfg)?;
    let bus = Arc::new(FieldBus::start(make_connector(cfg), BusCfg::from(cfg), clock.clone()));
    Ok(build_driver(model, bus, DriverCfg::from(cfg), clock))
}

/// Everything `run` keeps alive. Dropping it shuts the controller down.
pub struct App {
    // Drop order: scheduler, then manager.
    _analytics: AnalyticsScheduler,
    pub manager: ScaleManager,
}

impl App {
    pub fn build(cfg: &Config) -> Result<Self> {
        let clock: SharedClock = Arc::new(MonotonicClock::new());
        let driver = connect_driver(cfg, clock.clone())?;
        let (db, cold) = open_stores(cfg)?;
        let sensor = make_sensor(cfg)?;

        let mcfg = ManagerCfg::from(cfg);
        if mcfg.dev_mode {
            tracing::warn!("development mode: weight and sensor injection enabled");
        }
        let store: Arc<dyn Store<Database>> = db.clone();
        let manager = ScaleManager::spawn(
            ManagerDeps {
                driver,
                store,
                sensor,
                clock,
            },
            mcfg,
        )
        .wrap_err("start scale manager")?;

        let analytics = AnalyticsScheduler::spawn(
            db,
            cold,
            Duration::from_millis(cfg.timing.analytics_interval_ms),
        );
        tracing::info!(
            storage = %cfg.storage.resolved_dir().display(),
            model = %cfg.indicator.model,
            "controller running"
        );
        Ok(Self {
            _analytics: analytics,
            manager,
        })
    }
}
