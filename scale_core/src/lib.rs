#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Filling-scale control engine (hardware-agnostic).
//!
//! Field-bus access goes through `scale_traits::Connector` and
//! `scale_traits::RegisterLink`; the presence sensor through
//! `scale_traits::DigitalInput`.
//!
//! ## Architecture
//!
//! - **Bus** (`queue`, `supervisor`, `bus`): one worker thread serialises
//!   every register transaction with a minimum spacing; a supervisor keeps
//!   the link connected and reports reconnections.
//! - **Drivers** (`indicator`): per-model register maps behind
//!   [`WeightIndicatorDriver`].
//! - **Feed** (`feed`): the pure fast/slow/stop state machine.
//! - **Manager** (`manager`): the actor that owns [`ScaleState`], runs the
//!   pollers and broadcasts [`ScaleStatus`] snapshots.
//! - **Analytics** (`analytics`, `store`): calendar buckets over completed
//!   cycles, persisted through the [`Store`] contract.
//!
//! Weights are integer grams; timestamps are Unix milliseconds.

pub mod analytics;
pub mod bus;
pub mod conversions;
pub mod error;
pub mod feed;
pub mod hw_error;
pub mod indicator;
pub mod listeners;
pub mod manager;
pub mod queue;
pub mod record;
pub mod sensor;
pub mod status;
pub mod store;
pub mod supervisor;
pub mod ticker;
pub mod util;

pub use analytics::{Analytics, AnalyticsScheduler, HourBucket};
pub use bus::{BusCfg, ContinuousReader, FieldBus};
pub use error::{ErrorCode, Result, ScaleError};
pub use feed::{FeedCommand, ScaleSettings, ScaleState};
pub use indicator::{
    DriverCfg, IndicatorModel, WeightIndicatorDriver, WeightIndicatorState, build_driver,
};
pub use listeners::Listeners;
pub use manager::{ManagerCfg, ManagerDeps, ScaleManager, SensorInput};
pub use queue::{OperationQueue, Priority, SharedClock};
pub use record::RecordEvent;
pub use sensor::SensorEdgeDetector;
pub use status::ScaleStatus;
pub use store::{ColdStorage, Database, JsonFileStore, MemoryStore, Store};
pub use supervisor::{ReconnectSupervisor, SupervisorCfg};
