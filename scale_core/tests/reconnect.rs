//! Reconnect supervisor behaviour over the simulated register bank.

use scale_core::bus::{BusCfg, FieldBus};
use scale_core::hw_error::map_boxed;
use scale_core::supervisor::SupervisorCfg;
use scale_hardware::util::wait_until_with_timeout;
use scale_hardware::{RegisterBank, SimulatedConnector};
use scale_traits::MonotonicClock;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn fast_cfg() -> BusCfg {
    BusCfg {
        min_operation_interval: Duration::from_millis(1),
        supervisor: SupervisorCfg {
            retry_interval: Duration::from_millis(20),
            health_interval: Some(Duration::from_millis(20)),
            probe_register: 0,
        },
        op_timeout: Duration::from_secs(1),
    }
}

fn start(connector: &SimulatedConnector) -> (FieldBus, Arc<AtomicUsize>) {
    let bus = FieldBus::start(
        Box::new(connector.clone()),
        fast_cfg(),
        Arc::new(MonotonicClock::new()),
    );
    let fired = Arc::new(AtomicUsize::new(0));
    let f = fired.clone();
    bus.on_reconnect(Box::new(move || {
        f.fetch_add(1, Ordering::SeqCst);
    }));
    (bus, fired)
}

fn eventually(cond: impl Fn() -> bool) {
    wait_until_with_timeout(cond, Duration::from_secs(3), Duration::from_millis(5)).unwrap();
}

#[test]
fn first_connect_fires_no_callback() {
    let connector = SimulatedConnector::new(RegisterBank::new());
    let (bus, fired) = start(&connector);
    bus.wait_connected(Duration::from_secs(2)).unwrap();
    std::thread::sleep(Duration::from_millis(80));
    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(bus.reconnect_count(), 0);
}

#[test]
fn connect_failures_are_retried_then_callback_fires_once() {
    let connector = SimulatedConnector::new(RegisterBank::new());
    connector.fail_next(3);
    let (bus, fired) = start(&connector);

    bus.wait_connected(Duration::from_secs(2)).unwrap();
    assert!(connector.attempts() >= 4);
    eventually(|| fired.load(Ordering::SeqCst) == 1);
    std::thread::sleep(Duration::from_millis(80));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn each_outage_yields_exactly_one_reconnect() {
    let bank = RegisterBank::new();
    let connector = SimulatedConnector::new(bank.clone());
    let (bus, fired) = start(&connector);
    bus.wait_connected(Duration::from_secs(2)).unwrap();

    for round in 1..=2 {
        bank.set_online(false);
        eventually(|| !bus.is_connected());
        // Several retries happen while the instrument is away.
        std::thread::sleep(Duration::from_millis(70));
        assert_eq!(fired.load(Ordering::SeqCst), round - 1);

        bank.set_online(true);
        eventually(|| fired.load(Ordering::SeqCst) == round);
        assert!(bus.is_connected());
    }
    assert_eq!(bus.reconnect_count(), 2);
}

#[test]
fn queued_link_fault_drops_the_link_without_waiting_for_probe() {
    let bank = RegisterBank::new();
    let connector = SimulatedConnector::new(bank.clone());
    let mut cfg = fast_cfg();
    cfg.supervisor.health_interval = None;
    let bus = FieldBus::start(Box::new(connector), cfg, Arc::new(MonotonicClock::new()));
    bus.wait_connected(Duration::from_secs(2)).unwrap();

    bank.set_online(false);
    let res = bus.execute("read weight", |link| {
        link.read_holding_registers(7, 2).map_err(map_boxed)
    });
    assert!(res.is_err());
    eventually(|| !bus.is_connected());

    bank.set_online(true);
    eventually(|| bus.is_connected());
    assert_eq!(bus.reconnect_count(), 1);
}
