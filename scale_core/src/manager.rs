//! The scale manager actor.
//!
//! One thread owns [`ScaleState`] and the settings; everything else talks
//! to it over channels. The actor `select!`s over operator commands,
//! background events (weight samples, sensor samples and edges, reconnect
//! notices, resting-time expiries, feed failures) and the feed tick. Feed
//! commands go to a separate actuator thread so the actor never waits on
//! the bus. Status snapshots are built by the actor and therefore never
//! tear.
use crossbeam_channel as xch;
use scale_traits::DigitalInput;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::analytics::Analytics;
use crate::error::{ErrorCode, Result, ScaleError};
use crate::feed::{FeedCommand, PendingRecord, ScaleSettings, ScaleState, feed_tick};
use crate::indicator::{WeightIndicatorDriver, WeightIndicatorState};
use crate::listeners::Listeners;
use crate::queue::SharedClock;
use crate::sensor::{SensorEdgeDetector, SensorSampler};
use crate::status::ScaleStatus;
use crate::store::{Database, Store};
use crate::ticker::PeriodicTask;

#[derive(Debug, Clone)]
pub struct ManagerCfg {
    pub weight_interval: Duration,
    pub feed_interval: Duration,
    pub state_read_interval: Duration,
    pub sensor_poll: Duration,
    pub sensor_debounce_n: u8,
    /// Enables `test_set_weight` and `test_toggle_sensor`.
    pub dev_mode: bool,
    /// Used when the stored record carries no settings.
    pub default_settings: ScaleSettings,
    pub default_target: i32,
    /// Upper bound on waiting for the actor to answer a call.
    pub call_timeout: Duration,
}

impl Default for ManagerCfg {
    fn default() -> Self {
        Self {
            weight_interval: Duration::from_millis(100),
            feed_interval: Duration::from_millis(95),
            state_read_interval: Duration::from_millis(250),
            sensor_poll: Duration::from_millis(20),
            sensor_debounce_n: 1,
            dev_mode: false,
            default_settings: ScaleSettings::default(),
            default_target: 25_000,
            call_timeout: Duration::from_secs(2),
        }
    }
}

/// Where presence samples come from.
pub enum SensorInput {
    None,
    /// Digital input 1 of the indicator, delivered with continuous reads.
    Indicator,
    /// A separately polled line (GPIO or simulated).
    Polled(Box<dyn DigitalInput>),
}

pub struct ManagerDeps {
    pub driver: Arc<dyn WeightIndicatorDriver>,
    pub store: Arc<dyn Store<Database>>,
    pub sensor: SensorInput,
    pub clock: SharedClock,
}

type Reply<T> = xch::Sender<T>;

enum Command {
    SetTarget(i32, Reply<bool>),
    SetActive(bool, Reply<bool>),
    UpdateSettings(ScaleSettings, Reply<bool>),
    ClearErrors(Reply<bool>),
    ReportError(ErrorCode, Reply<bool>),
    ToggleAutomatic(Reply<bool>),
    Tared(Reply<bool>),
    ToggleSensor(Reply<bool>),
    Status(Reply<ScaleStatus>),
}

enum Event {
    /// A weight poll and the instant it started.
    Weight(Instant, std::result::Result<i32, String>),
    SensorSample(bool),
    SensorEdge(bool),
    Reconnected(Instant),
    RestElapsed(PendingRecord),
    FeedFailed(FeedCommand, String),
}

pub struct ScaleManager {
    // Producers first: they must stop before the actor is joined.
    weight_poller: Option<PeriodicTask>,
    sensor_sampler: Option<SensorSampler>,
    cmd_tx: Option<xch::Sender<Command>>,
    actor: Option<JoinHandle<()>>,
    driver: Arc<dyn WeightIndicatorDriver>,
    store: Arc<dyn Store<Database>>,
    listeners: Listeners,
    dev_mode: bool,
    call_timeout: Duration,
}

impl ScaleManager {
    pub fn spawn(deps: ManagerDeps, cfg: ManagerCfg) -> Result<Self> {
        let ManagerDeps {
            driver,
            store,
            sensor,
            clock,
        } = deps;

        let record = store.read()?;
        let settings = record.settings_or(&cfg.default_settings);
        let target = record.target_weight.unwrap_or(cfg.default_target);
        tracing::info!(target, ?settings, "scale manager starting");

        let (cmd_tx, cmd_rx) = xch::unbounded::<Command>();
        let (event_tx, event_rx) = xch::unbounded::<Event>();
        let listeners = Listeners::default();

        {
            let tx = event_tx.clone();
            let clock = clock.clone();
            driver.on_reconnect(Box::new(move || {
                let _ = tx.send(Event::Reconnected(clock.now()));
            }));
        }

        let forward_input = matches!(sensor, SensorInput::Indicator);
        if driver.needs_continuous_reading() || forward_input {
            let tx = event_tx.clone();
            driver.start_continuous_reading(
                cfg.state_read_interval,
                Box::new(move |state: &WeightIndicatorState| {
                    if forward_input {
                        let _ = tx.send(Event::SensorSample(state.input1()));
                    }
                }),
            );
        }

        let sensor_sampler = match sensor {
            SensorInput::Polled(input) => {
                let tx = event_tx.clone();
                Some(SensorSampler::spawn(input, cfg.sensor_poll, move |v| {
                    let _ = tx.send(Event::SensorSample(v));
                }))
            }
            SensorInput::None | SensorInput::Indicator => None,
        };

        let weight_poller = {
            let tx = event_tx.clone();
            let driver = driver.clone();
            let clock = clock.clone();
            PeriodicTask::spawn("weight-poll", cfg.weight_interval, move || {
                let started = clock.now();
                let res = driver.get_weight().map_err(|e| format!("{e:#}"));
                let _ = tx.send(Event::Weight(started, res));
            })
        };

        let actor = Actor {
            state: ScaleState::with_target(target),
            settings,
            detector: {
                let tx = event_tx.clone();
                SensorEdgeDetector::new(
                    cfg.sensor_debounce_n,
                    Box::new(move |v: bool| {
                        let _ = tx.send(Event::SensorEdge(v));
                    }),
                )
            },
            listeners: listeners.clone(),
            store: store.clone(),
            clock,
            event_tx,
            dev_mode: cfg.dev_mode,
            weight_failing: false,
            reconnected_at: None,
        };
        let actuator_driver = driver.clone();
        let feed_interval = cfg.feed_interval;
        let handle = std::thread::spawn(move || {
            actor.run(cmd_rx, event_rx, actuator_driver, feed_interval);
        });

        Ok(Self {
            weight_poller: Some(weight_poller),
            sensor_sampler,
            cmd_tx: Some(cmd_tx),
            actor: Some(handle),
            driver,
            store,
            listeners,
            dev_mode: cfg.dev_mode,
            call_timeout: cfg.call_timeout,
        })
    }

    fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Option<T> {
        let (tx, rx) = xch::bounded(1);
        self.cmd_tx.as_ref()?.send(make(tx)).ok()?;
        rx.recv_timeout(self.call_timeout).ok()
    }

    pub fn set_target_weight(&self, grams: i32) -> bool {
        self.call(|r| Command::SetTarget(grams, r)).unwrap_or(false)
    }

    pub fn set_active(&self, active: bool) -> bool {
        self.call(|r| Command::SetActive(active, r)).unwrap_or(false)
    }

    pub fn start(&self) -> bool {
        self.set_active(true)
    }

    pub fn stop(&self) -> bool {
        self.set_active(false)
    }

    /// Tare the instrument; the local weight reads 0 once it acknowledges.
    pub fn tare(&self) -> bool {
        match self.driver.tare() {
            Ok(()) => self.call(Command::Tared).unwrap_or(false),
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "tare failed");
                false
            }
        }
    }

    pub fn zero(&self) -> bool {
        self.driver
            .zero()
            .map_err(|e| tracing::warn!(error = %format!("{e:#}"), "zero failed"))
            .is_ok()
    }

    pub fn update_settings(&self, settings: ScaleSettings) -> bool {
        self.call(|r| Command::UpdateSettings(settings, r))
            .unwrap_or(false)
    }

    pub fn clear_errors(&self) -> bool {
        self.call(Command::ClearErrors).unwrap_or(false)
    }

    /// Flag an error observed outside the engine (e.g. `NO_SERVER` from a
    /// front end that lost its upstream).
    pub fn report_error(&self, code: ErrorCode) -> bool {
        self.call(|r| Command::ReportError(code, r)).unwrap_or(false)
    }

    pub fn toggle_automatic_mode(&self) -> bool {
        self.call(Command::ToggleAutomatic).unwrap_or(false)
    }

    pub fn get_status(&self) -> Result<ScaleStatus> {
        Ok(self.call(Command::Status).ok_or(ScaleError::Shutdown)?)
    }

    pub fn register_listener(&self, id: impl Into<String>) -> xch::Receiver<ScaleStatus> {
        self.listeners.register(id)
    }

    pub fn deregister_listener(&self, id: &str) -> bool {
        self.listeners.deregister(id)
    }

    pub fn analytics(&self) -> Result<Analytics> {
        Ok(self.store.read()?.analytics)
    }

    pub fn test_set_weight(&self, grams: i32) -> bool {
        if !self.dev_mode {
            tracing::warn!("test_set_weight refused outside development mode");
            return false;
        }
        self.driver
            .test_set_weight(grams)
            .map_err(|e| tracing::warn!(error = %format!("{e:#}"), "test_set_weight failed"))
            .is_ok()
    }

    pub fn test_toggle_sensor(&self) -> bool {
        if !self.dev_mode {
            tracing::warn!("test_toggle_sensor refused outside development mode");
            return false;
        }
        self.call(Command::ToggleSensor).unwrap_or(false)
    }
}

impl Drop for ScaleManager {
    fn drop(&mut self) {
        self.weight_poller.take();
        self.sensor_sampler.take();
        self.driver.stop_continuous_reading();
        drop(self.cmd_tx.take());
        if let Some(handle) = self.actor.take()
            && let Err(e) = handle.join()
        {
            tracing::warn!(?e, "scale manager actor panicked during shutdown");
        }
    }
}

struct Actor {
    state: ScaleState,
    settings: ScaleSettings,
    detector: SensorEdgeDetector,
    listeners: Listeners,
    store: Arc<dyn Store<Database>>,
    clock: SharedClock,
    event_tx: xch::Sender<Event>,
    dev_mode: bool,
    weight_failing: bool,
    /// Polls that started before this instant saw the old link.
    reconnected_at: Option<Instant>,
}

impl Actor {
    fn run(
        mut self,
        cmd_rx: xch::Receiver<Command>,
        event_rx: xch::Receiver<Event>,
        driver: Arc<dyn WeightIndicatorDriver>,
        feed_interval: Duration,
    ) {
        let (act_tx, act_handle) = spawn_actuator(driver, self.event_tx.clone());
        let feed_tick_rx = xch::tick(feed_interval);
        loop {
            xch::select! {
                recv(cmd_rx) -> msg => match msg {
                    Ok(cmd) => self.on_command(cmd),
                    Err(_) => break,
                },
                recv(event_rx) -> msg => {
                    if let Ok(ev) = msg {
                        self.on_event(ev);
                    }
                }
                recv(feed_tick_rx) -> _ => self.on_feed_tick(&act_tx),
            }
        }
        drop(act_tx);
        if let Err(e) = act_handle.join() {
            tracing::warn!(?e, "actuator thread panicked during shutdown");
        }
        tracing::debug!("scale manager actor exiting");
    }

    fn status(&self) -> ScaleStatus {
        ScaleStatus::snapshot(&self.state, &self.settings, self.detector.state())
    }

    fn broadcast(&self) {
        self.listeners.broadcast(&self.status());
    }

    fn add_error(&mut self, code: ErrorCode) {
        if self.state.errors.insert(code) {
            tracing::warn!(%code, "error flagged");
            self.broadcast();
        }
    }

    fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::SetTarget(grams, reply) => {
                let ok = grams > 0
                    && self
                        .store
                        .update(&mut |db: &mut Database| db.target_weight = Some(grams))
                        .map_err(|e| tracing::warn!(error = %format!("{e:#}"), "persist target failed"))
                        .is_ok();
                if ok {
                    tracing::info!(target = grams, "target weight set");
                    self.state.target_weight = grams;
                    self.broadcast();
                }
                let _ = reply.send(ok);
            }
            Command::SetActive(active, reply) => {
                tracing::info!(active, "set active");
                if active {
                    self.state.activate(self.clock.unix_ms());
                } else {
                    self.state.active = false;
                }
                self.broadcast();
                let _ = reply.send(true);
            }
            Command::UpdateSettings(settings, reply) => {
                let ok = match settings.validate() {
                    Err(e) => {
                        tracing::warn!(error = %e, "settings rejected");
                        false
                    }
                    Ok(()) => self
                        .store
                        .update(&mut |db: &mut Database| db.set_settings(&settings))
                        .map_err(|e| tracing::warn!(error = %format!("{e:#}"), "persist settings failed"))
                        .is_ok(),
                };
                if ok {
                    tracing::info!(?settings, "settings updated");
                    self.settings = settings;
                    self.broadcast();
                }
                let _ = reply.send(ok);
            }
            Command::ClearErrors(reply) => {
                self.state.errors.clear();
                self.broadcast();
                let _ = reply.send(true);
            }
            Command::ReportError(code, reply) => {
                self.add_error(code);
                let _ = reply.send(true);
            }
            Command::ToggleAutomatic(reply) => {
                self.state.automatic_mode = !self.state.automatic_mode;
                tracing::info!(automatic = self.state.automatic_mode, "automatic mode toggled");
                self.broadcast();
                let _ = reply.send(true);
            }
            Command::Tared(reply) => {
                self.state.current_weight = 0;
                self.broadcast();
                let _ = reply.send(true);
            }
            Command::ToggleSensor(reply) => {
                let ok = self.dev_mode;
                if ok {
                    self.detector.toggle();
                }
                let _ = reply.send(ok);
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
        }
    }

    fn on_event(&mut self, ev: Event) {
        match ev {
            Event::Weight(_, Ok(w)) => {
                if self.weight_failing {
                    tracing::info!("weight readings restored");
                    self.weight_failing = false;
                }
                if w != self.state.current_weight {
                    self.state.current_weight = w;
                    self.broadcast();
                }
            }
            Event::Weight(started, Err(e)) => {
                if let Some(at) = self.reconnected_at
                    && started < at
                {
                    tracing::debug!(error = %e, "ignoring weight failure from before reconnect");
                    return;
                }
                if !self.weight_failing {
                    tracing::warn!(error = %e, "weight read failed");
                    self.weight_failing = true;
                }
                self.add_error(ErrorCode::NoWeight);
            }
            Event::SensorSample(v) => {
                self.detector.observe(v);
            }
            Event::SensorEdge(high) => {
                if high && self.state.automatic_mode {
                    tracing::info!("sensor triggered; starting cycle");
                    self.state.arm(self.clock.unix_ms());
                }
                self.broadcast();
            }
            Event::Reconnected(at) => {
                tracing::info!("indicator reconnected; clearing errors");
                self.reconnected_at = Some(at);
                self.state.errors.clear();
                self.broadcast();
            }
            Event::RestElapsed(pending) => {
                let event = pending.finish(self.clock.unix_ms(), self.state.current_weight);
                tracing::info!(?event, "recording fill cycle");
                if let Err(e) = self.store.update(&mut |db: &mut Database| db.events.push(event)) {
                    tracing::warn!(error = %format!("{e:#}"), "failed to persist fill cycle");
                }
            }
            Event::FeedFailed(cmd, e) => {
                tracing::warn!(?cmd, error = %e, "feed command failed");
                self.add_error(ErrorCode::NoFeed);
            }
        }
    }

    fn on_feed_tick(&mut self, act_tx: &xch::Sender<FeedCommand>) {
        let out = feed_tick(&mut self.state, &self.settings, self.clock.unix_ms());
        for cmd in out.commands {
            if act_tx.send(cmd).is_err() {
                self.add_error(ErrorCode::NoFeed);
            }
        }
        if let Some(pending) = out.recording {
            let tx = self.event_tx.clone();
            let clock = self.clock.clone();
            let rest = Duration::from_millis(pending.settings.resting_time);
            std::thread::spawn(move || {
                clock.sleep(rest);
                let _ = tx.send(Event::RestElapsed(pending));
            });
        }
        if out.changed {
            self.broadcast();
        }
    }
}

fn spawn_actuator(
    driver: Arc<dyn WeightIndicatorDriver>,
    events: xch::Sender<Event>,
) -> (xch::Sender<FeedCommand>, JoinHandle<()>) {
    let (tx, rx) = xch::unbounded::<FeedCommand>();
    let handle = std::thread::spawn(move || {
        for cmd in rx.iter() {
            let res = match cmd {
                FeedCommand::Start => driver.start_feed(),
                FeedCommand::Fast(speed) => driver.feed_fast(speed),
                FeedCommand::Slow(speed) => driver.feed_slow(speed),
                FeedCommand::Stop => driver.stop_feed(),
            };
            if let Err(e) = res {
                let _ = events.send(Event::FeedFailed(cmd, format!("{e:#}")));
            }
        }
    });
    (tx, handle)
}
