use rstest::rstest;
use scale_config::{Environment, LinkKind, ParityCfg, SensorSource, load_toml};

fn expect_rejected(toml: &str, needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("config should be rejected");
    let msg = format!("{err}").to_lowercase();
    assert!(msg.contains(needle), "'{msg}' does not mention '{needle}'");
}

#[test]
fn full_plant_config_parses_and_validates() {
    let toml = r#"
[link]
kind = "rtu"
device = "/dev/ttyAMA0"
baud = 19200
parity = "even"
stop_bits = 2
slave_id = 4
timeout_ms = 500

[indicator]
model = "laumas-w100"
stale_after_ms = 800

[timing]
weight_interval_ms = 100
feed_interval_ms = 95
health_check_ms = 0

[sensor]
source = "gpio"
gpio_pin = 7
active_low = true
debounce_n = 3

[defaults]
fast_feed_speed = 60
slow_feed_speed = 15
fast_slow_percentage = 0.9
error_percentage = 0.02
resting_time_ms = 1500
target_weight = 10000

[storage]
dir = "/tmp/openscale"

[logging]
level = "debug"
rotation = "daily"

[runtime]
environment = "development"
"#;
    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid config");
    assert_eq!(cfg.link.kind, LinkKind::Rtu);
    assert_eq!(cfg.link.parity, ParityCfg::Even);
    assert_eq!(cfg.sensor.source, SensorSource::Gpio);
    assert_eq!(cfg.sensor.debounce_n, 3);
    assert_eq!(cfg.timing.health_check_ms, 0);
    assert_eq!(cfg.runtime.environment, Environment::Development);
    assert_eq!(cfg.storage.db_path().to_str(), Some("/tmp/openscale/db.json"));
}

#[test]
fn rejects_unknown_indicator_model() {
    expect_rejected(
        "[indicator]\nmodel = \"acme-9000\"\n",
        "indicator.model 'acme-9000' is unknown",
    );
}

#[test]
fn unknown_sensor_source_fails_to_parse() {
    assert!(load_toml("[sensor]\nsource = \"laser\"\n").is_err());
}

#[rstest]
#[case("[defaults]\nfast_feed_speed = 0\n", "fast_feed_speed must be > 0")]
#[case("[defaults]\nslow_feed_speed = 0\n", "slow_feed_speed must be > 0")]
#[case("[defaults]\nfast_slow_percentage = 1.5\n", "fast_slow_percentage")]
#[case("[defaults]\nerror_percentage = -0.1\n", "error_percentage")]
#[case("[defaults]\ntarget_weight = 0\n", "target_weight must be > 0")]
#[case("[timing]\nfeed_interval_ms = 0\n", "timing.feed_interval_ms must be >= 1")]
#[case("[timing]\nreconnect_interval_ms = 0\n", "reconnect_interval_ms")]
#[case("[sensor]\ndebounce_n = 0\n", "sensor.debounce_n must be >= 1")]
#[case("[link]\nport = 0\n", "link.port must be > 0")]
#[case("[link]\nkind = \"rtu\"\nstop_bits = 3\n", "stop_bits must be 1 or 2")]
#[case("[link]\ntimeout_ms = 0\n", "timeout_ms must be >= 1")]
#[case("[logging]\nrotation = \"weekly\"\n", "logging.rotation")]
fn rejects_out_of_range_values(#[case] toml: &str, #[case] needle: &str) {
    expect_rejected(toml, needle);
}

#[test]
fn tcp_link_ignores_serial_fields() {
    let cfg = load_toml("[link]\nkind = \"tcp\"\nstop_bits = 9\n").expect("parse");
    cfg.validate().expect("serial fields unused over tcp");
}

#[test]
fn shipped_sample_config_is_valid() {
    let cfg = load_toml(include_str!("../../etc/openscale.toml")).expect("parse sample");
    cfg.validate().expect("sample validates");
    assert_eq!(cfg.sensor.source, SensorSource::Indicator);
    assert_eq!(cfg.logging.rotation.as_deref(), Some("daily"));
}
