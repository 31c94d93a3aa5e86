//! Field-bus connection parameters, captured once and reused on every
//! reconnect attempt.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    #[default]
    None,
    Even,
    Odd,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Tcp {
        host: String,
        port: u16,
    },
    Rtu {
        device: String,
        baud: u32,
        parity: Parity,
        stop_bits: u8,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkParams {
    pub transport: Transport,
    pub slave_id: u8,
    /// Upper bound on a single transaction.
    pub timeout: Duration,
}

impl LinkParams {
    pub fn endpoint(&self) -> String {
        match &self.transport {
            Transport::Tcp { host, port } => format!("tcp://{host}:{port}#{}", self.slave_id),
            Transport::Rtu {
                device,
                baud,
                parity,
                stop_bits,
            } => format!(
                "rtu://{device}?baud={baud}&parity={parity:?}&stop={stop_bits}#{}",
                self.slave_id
            ),
        }
    }
}

impl Default for LinkParams {
    fn default() -> Self {
        Self {
            transport: Transport::Tcp {
                host: "127.0.0.1".into(),
                port: 8502,
            },
            slave_id: 1,
            timeout: Duration::from_millis(1000),
        }
    }
}
