//! Bridges from `scale_config` sections to runtime configuration.
//!
//! The CLI only loads and validates a `Config`; everything downstream takes
//! the types built here.

use std::time::Duration;

use scale_config::{Config, LinkCfg, LinkKind, ParityCfg};
use scale_hardware::{LinkParams, Parity, Transport};

use crate::bus::BusCfg;
use crate::error::ScaleError;
use crate::feed::ScaleSettings;
use crate::indicator::{DriverCfg, IndicatorModel};
use crate::manager::ManagerCfg;
use crate::supervisor::SupervisorCfg;

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

impl From<&scale_config::DefaultsCfg> for ScaleSettings {
    fn from(c: &scale_config::DefaultsCfg) -> Self {
        Self {
            fast_feed_speed: c.fast_feed_speed,
            slow_feed_speed: c.slow_feed_speed,
            fast_slow_percentage: c.fast_slow_percentage,
            error_percentage: c.error_percentage,
            resting_time: c.resting_time_ms,
        }
    }
}

impl From<&scale_config::TimingCfg> for SupervisorCfg {
    fn from(c: &scale_config::TimingCfg) -> Self {
        Self {
            retry_interval: ms(c.reconnect_interval_ms),
            health_interval: (c.health_check_ms > 0).then(|| ms(c.health_check_ms)),
            ..Self::default()
        }
    }
}

impl From<&Config> for BusCfg {
    fn from(c: &Config) -> Self {
        // Callers wait at least a few transaction timeouts plus queue spacing.
        let op_timeout = ms(c.link.timeout_ms.saturating_mul(3))
            + ms(c.timing.min_operation_interval_ms.saturating_mul(4));
        Self {
            min_operation_interval: ms(c.timing.min_operation_interval_ms),
            supervisor: SupervisorCfg::from(&c.timing),
            op_timeout,
        }
    }
}

impl From<&Config> for DriverCfg {
    fn from(c: &Config) -> Self {
        Self {
            stale_after: ms(c.indicator.stale_after_ms),
            command_spacing: ms(c.timing.min_operation_interval_ms),
        }
    }
}

impl From<&Config> for ManagerCfg {
    fn from(c: &Config) -> Self {
        Self {
            weight_interval: ms(c.timing.weight_interval_ms),
            feed_interval: ms(c.timing.feed_interval_ms),
            state_read_interval: ms(c.timing.state_read_interval_ms),
            sensor_poll: ms(c.sensor.poll_ms),
            sensor_debounce_n: c.sensor.debounce_n,
            dev_mode: c.runtime.environment == scale_config::Environment::Development,
            default_settings: ScaleSettings::from(&c.defaults),
            default_target: c.defaults.target_weight,
            ..Self::default()
        }
    }
}

fn parity(p: ParityCfg) -> Parity {
    match p {
        ParityCfg::None => Parity::None,
        ParityCfg::Even => Parity::Even,
        ParityCfg::Odd => Parity::Odd,
    }
}

/// Connection parameters for the configured transport.
pub fn link_params(c: &LinkCfg) -> LinkParams {
    let transport = match c.kind {
        LinkKind::Tcp => Transport::Tcp {
            host: c.host.clone(),
            port: c.port,
        },
        LinkKind::Rtu => Transport::Rtu {
            device: c.device.clone(),
            baud: c.baud,
            parity: parity(c.parity),
            stop_bits: c.stop_bits,
        },
    };
    LinkParams {
        transport,
        slave_id: c.slave_id,
        timeout: ms(c.timeout_ms),
    }
}

pub fn indicator_model(c: &Config) -> Result<IndicatorModel, ScaleError> {
    c.indicator.model.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_check_zero_disables_probe() {
        let mut c = Config::default();
        assert_eq!(
            SupervisorCfg::from(&c.timing).health_interval,
            Some(Duration::from_secs(5))
        );
        c.timing.health_check_ms = 0;
        assert!(SupervisorCfg::from(&c.timing).health_interval.is_none());
    }

    #[test]
    fn rtu_link_keeps_serial_settings() {
        let cfg = LinkCfg {
            kind: LinkKind::Rtu,
            parity: ParityCfg::Odd,
            stop_bits: 2,
            slave_id: 4,
            ..LinkCfg::default()
        };
        let p = link_params(&cfg);
        assert_eq!(p.slave_id, 4);
        assert_eq!(
            p.transport,
            Transport::Rtu {
                device: "/dev/ttyUSB0".into(),
                baud: 9600,
                parity: Parity::Odd,
                stop_bits: 2,
            }
        );
    }

    #[rstest::rstest]
    #[case(ParityCfg::None, Parity::None)]
    #[case(ParityCfg::Even, Parity::Even)]
    #[case(ParityCfg::Odd, Parity::Odd)]
    fn serial_parity_maps_one_to_one(#[case] cfg: ParityCfg, #[case] expected: Parity) {
        assert_eq!(parity(cfg), expected);
    }

    #[test]
    fn manager_cfg_follows_sections() {
        let mut c = Config::default();
        c.runtime.environment = scale_config::Environment::Development;
        c.defaults.target_weight = 1500;
        c.timing.feed_interval_ms = 50;
        let m = ManagerCfg::from(&c);
        assert!(m.dev_mode);
        assert_eq!(m.default_target, 1500);
        assert_eq!(m.feed_interval, Duration::from_millis(50));
        assert_eq!(m.default_settings, ScaleSettings::default());
    }

    #[test]
    fn model_keys_parse() {
        let mut c = Config::default();
        assert_eq!(indicator_model(&c).unwrap(), IndicatorModel::LaumasW100);
        c.indicator.model = "tester".into();
        assert_eq!(indicator_model(&c).unwrap(), IndicatorModel::Tester);
        c.indicator.model = "acme".into();
        assert!(indicator_model(&c).is_err());
    }
}
