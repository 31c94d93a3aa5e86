//! Instrument drivers against the simulated register bank.

use rstest::rstest;
use scale_core::bus::{BusCfg, FieldBus};
use scale_core::indicator::{
    DriverCfg, IndicatorModel, WeightIndicatorDriver, WeightIndicatorState, build_driver,
    laumas_w100, tester,
};
use scale_core::queue::SharedClock;
use scale_core::supervisor::SupervisorCfg;
use scale_core::ScaleError;
use scale_hardware::util::wait_until_with_timeout;
use scale_hardware::{RegisterBank, SimulatedConnector, WriteRecord};
use scale_traits::MonotonicClock;
use scale_traits::clock::test_clock::TestClock;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

fn bus_over(bank: &RegisterBank, clock: SharedClock) -> Arc<FieldBus> {
    let cfg = BusCfg {
        min_operation_interval: Duration::from_millis(1),
        supervisor: SupervisorCfg {
            retry_interval: Duration::from_millis(20),
            health_interval: None,
            probe_register: 0,
        },
        op_timeout: Duration::from_secs(2),
    };
    let bus = Arc::new(FieldBus::start(
        Box::new(SimulatedConnector::new(bank.clone())),
        cfg,
        clock,
    ));
    bus.wait_connected(Duration::from_secs(2)).unwrap();
    bus
}

fn driver(model: IndicatorModel, bank: &RegisterBank) -> Arc<dyn WeightIndicatorDriver> {
    let clock: SharedClock = Arc::new(MonotonicClock::new());
    let cfg = DriverCfg {
        command_spacing: Duration::from_millis(1),
        ..DriverCfg::default()
    };
    build_driver(model, bus_over(bank, clock.clone()), cfg, clock)
}

fn w(addr: u16, values: &[u16]) -> WriteRecord {
    WriteRecord {
        addr,
        values: values.to_vec(),
    }
}

#[test]
fn w100_tare_writes_low_high_then_command() {
    let bank = RegisterBank::new();
    let d = driver(IndicatorModel::LaumasW100, &bank);
    d.tare().unwrap();
    assert_eq!(
        bank.writes(),
        vec![
            w(laumas_w100::regs::TARE_LOW, &[0]),
            w(laumas_w100::regs::TARE_HIGH, &[0]),
            w(laumas_w100::regs::COMMAND, &[laumas_w100::commands::TARE]),
        ]
    );
}

#[test]
fn w100_zero_writes_semi_auto_zero() {
    let bank = RegisterBank::new();
    let d = driver(IndicatorModel::LaumasW100, &bank);
    d.zero().unwrap();
    assert_eq!(bank.get(laumas_w100::regs::COMMAND), 8);
}

#[rstest]
#[case::coarse(0b01)]
#[case::fine(0b10)]
#[case::reset(0b00)]
fn w100_output_masks(#[case] expected: u16) {
    let bank = RegisterBank::new();
    let d = driver(IndicatorModel::LaumasW100, &bank);
    bank.set(laumas_w100::regs::OUTPUTS, 0xFF);
    match expected {
        0b01 => d.set_output_coarse().unwrap(),
        0b10 => d.set_output_fine().unwrap(),
        _ => d.reset_outputs().unwrap(),
    }
    assert_eq!(bank.get(laumas_w100::regs::OUTPUTS), expected);
}

#[test]
fn w100_feed_hooks_drive_outputs() {
    let bank = RegisterBank::new();
    let d = driver(IndicatorModel::LaumasW100, &bank);
    d.start_feed().unwrap();
    assert!(bank.writes().is_empty());
    d.feed_fast(50).unwrap();
    assert_eq!(bank.get(laumas_w100::regs::OUTPUTS), 0b01);
    d.feed_slow(20).unwrap();
    assert_eq!(bank.get(laumas_w100::regs::OUTPUTS), 0b10);
    d.stop_feed().unwrap();
    assert_eq!(bank.get(laumas_w100::regs::OUTPUTS), 0);
}

#[test]
fn w100_weight_comes_from_continuous_reads() {
    let bank = RegisterBank::new();
    let d = driver(IndicatorModel::LaumasW100, &bank);

    let err = d.get_weight().unwrap_err();
    assert_eq!(err.downcast_ref::<ScaleError>(), Some(&ScaleError::NoData));

    bank.set_many(laumas_w100::regs::WEIGHT, &[0, 1234]);
    bank.set(laumas_w100::regs::INPUTS, 0b1);
    let seen: Arc<Mutex<Vec<WeightIndicatorState>>> = Arc::default();
    let sink = seen.clone();
    d.start_continuous_reading(
        Duration::from_millis(10),
        Box::new(move |s: &WeightIndicatorState| sink.lock().unwrap().push(*s)),
    );
    wait_until_with_timeout(
        || d.get_weight().is_ok_and(|g| g == 12_340),
        Duration::from_secs(2),
        Duration::from_millis(5),
    )
    .unwrap();
    d.stop_continuous_reading();

    let states = seen.lock().unwrap();
    assert!(!states.is_empty());
    assert!(states[0].input1());
    assert_eq!(d.last_state().map(|s| s.weight), Some(12_340));
}

#[test]
fn w100_refuses_stale_state() {
    let bank = RegisterBank::new();
    bank.set_many(laumas_w100::regs::WEIGHT, &[0, 50]);
    let clock = TestClock::new();
    let shared: SharedClock = Arc::new(clock.clone());
    let d = build_driver(
        IndicatorModel::LaumasW100,
        bus_over(&bank, shared.clone()),
        DriverCfg {
            stale_after: Duration::from_millis(1000),
            command_spacing: Duration::ZERO,
        },
        shared,
    );

    d.read_state().unwrap();
    assert_eq!(d.get_weight().unwrap(), 500);

    clock.advance(Duration::from_millis(1500));
    let err = d.get_weight().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ScaleError>(),
        Some(ScaleError::Stale { .. })
    ));
}

#[test]
fn w100_test_weight_round_trips_through_the_instrument() {
    let bank = RegisterBank::new();
    let d = driver(IndicatorModel::LaumasW100, &bank);
    d.test_set_weight(25_000).unwrap();
    let state = d.read_state().unwrap();
    assert_eq!(state.weight, 25_000);
}

#[test]
fn tester_uses_legacy_feed_registers() {
    let bank = RegisterBank::new();
    let d = driver(IndicatorModel::Tester, &bank);
    assert!(!d.needs_continuous_reading());

    d.feed_fast(50).unwrap();
    d.start_feed().unwrap();
    d.feed_slow(20).unwrap();
    d.stop_feed().unwrap();
    assert_eq!(
        bank.writes(),
        vec![
            w(tester::regs::SPEED_FEED, &[50]),
            w(tester::regs::START_FEED, &[1]),
            w(tester::regs::SPEED_FEED, &[20]),
            w(tester::regs::STOP_FEED, &[1]),
        ]
    );
}

#[test]
fn tester_reads_weight_directly() {
    let bank = RegisterBank::new();
    let d = driver(IndicatorModel::Tester, &bank);
    bank.set(tester::regs::WEIGHT, 777);
    assert_eq!(d.get_weight().unwrap(), 777);
    d.test_set_weight(1200).unwrap();
    // The cache only moves with the next state read.
    assert_eq!(d.get_weight().unwrap(), 25_000);
    d.read_state().unwrap();
    assert_eq!(d.get_weight().unwrap(), 1200);
}

#[test]
fn w100_cache_is_fresh_when_reconnect_callbacks_run() {
    let bank = RegisterBank::new();
    bank.set_many(laumas_w100::regs::WEIGHT, &[0, 50]);
    let clock = TestClock::new();
    let shared: SharedClock = Arc::new(clock.clone());
    let d = build_driver(
        IndicatorModel::LaumasW100,
        bus_over(&bank, shared.clone()),
        DriverCfg {
            stale_after: Duration::from_millis(1000),
            command_spacing: Duration::ZERO,
        },
        shared,
    );
    d.read_state().unwrap();

    let handle: Arc<OnceLock<Weak<dyn WeightIndicatorDriver>>> = Arc::new(OnceLock::new());
    let seen: Arc<Mutex<Option<Result<i32, String>>>> = Arc::new(Mutex::new(None));
    {
        let handle = handle.clone();
        let seen = seen.clone();
        d.on_reconnect(Box::new(move || {
            let weight = handle
                .get()
                .and_then(Weak::upgrade)
                .map(|d| d.get_weight().map_err(|e| format!("{e:#}")));
            *seen.lock().unwrap() = weight;
        }));
    }
    let _ = handle.set(Arc::downgrade(&d));

    bank.set_online(false);
    assert!(d.read_state().is_err());
    wait_until_with_timeout(|| !d.is_connected(), Duration::from_secs(2), Duration::from_millis(5))
        .unwrap();
    clock.advance(Duration::from_millis(1500));
    assert!(d.get_weight().is_err());

    bank.set_many(laumas_w100::regs::WEIGHT, &[0, 80]);
    bank.set_online(true);
    wait_until_with_timeout(
        || seen.lock().unwrap().is_some(),
        Duration::from_secs(2),
        Duration::from_millis(5),
    )
    .unwrap();
    assert_eq!(*seen.lock().unwrap(), Some(Ok(800)));
}

#[test]
fn reads_fail_while_the_instrument_is_away() {
    let bank = RegisterBank::new();
    let d = driver(IndicatorModel::Tester, &bank);
    bank.set_online(false);
    assert!(d.get_weight().is_err());
}
