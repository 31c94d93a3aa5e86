//! Modbus TCP/RTU links built on the synchronous `tokio-modbus` client.
use std::net::{SocketAddr, ToSocketAddrs};

use scale_traits::{Connector, RegisterLink};
use tokio_modbus::Slave;
use tokio_modbus::client::sync::{self, Reader, Writer};
use tracing::debug;

use crate::error::{HwError, Result};
use crate::params::{LinkParams, Parity, Transport};

pub struct ModbusConnector {
    params: LinkParams,
}

impl ModbusConnector {
    pub fn new(params: LinkParams) -> Self {
        Self { params }
    }

    fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
        (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| HwError::InvalidParams(format!("cannot resolve {host}:{port}")))
    }

    fn open(&self) -> Result<sync::Context> {
        let slave = Slave(self.params.slave_id);
        let timeout = Some(self.params.timeout);
        let ctx = match &self.params.transport {
            Transport::Tcp { host, port } => {
                let addr = Self::resolve(host, *port)?;
                sync::tcp::connect_slave_with_timeout(addr, slave, timeout)?
            }
            Transport::Rtu {
                device,
                baud,
                parity,
                stop_bits,
            } => {
                let parity = match parity {
                    Parity::None => tokio_serial::Parity::None,
                    Parity::Even => tokio_serial::Parity::Even,
                    Parity::Odd => tokio_serial::Parity::Odd,
                };
                let stop_bits = match stop_bits {
                    1 => tokio_serial::StopBits::One,
                    2 => tokio_serial::StopBits::Two,
                    n => {
                        return Err(HwError::InvalidParams(format!("stop_bits {n} unsupported")));
                    }
                };
                let builder = tokio_serial::new(device.as_str(), *baud)
                    .parity(parity)
                    .stop_bits(stop_bits)
                    .timeout(self.params.timeout);
                sync::rtu::connect_slave_with_timeout(&builder, slave, timeout)?
            }
        };
        Ok(ctx)
    }
}

impl Connector for ModbusConnector {
    fn connect(
        &mut self,
    ) -> std::result::Result<Box<dyn RegisterLink>, Box<dyn std::error::Error + Send + Sync>> {
        let ctx = self.open()?;
        debug!(endpoint = %self.params.endpoint(), "modbus link open");
        Ok(Box::new(ModbusLink { ctx }))
    }

    fn endpoint(&self) -> String {
        self.params.endpoint()
    }
}

pub struct ModbusLink {
    ctx: sync::Context,
}

/// Collapse tokio-modbus' transport/exception layers into one typed error.
fn flatten<T>(r: tokio_modbus::Result<T>) -> Result<T> {
    match r {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(code)) => Err(HwError::Exception(format!("{code:?}"))),
        Err(e) => {
            let msg = e.to_string();
            if msg.to_ascii_lowercase().contains("timed out") {
                Err(HwError::Timeout)
            } else {
                Err(HwError::Transport(msg))
            }
        }
    }
}

impl RegisterLink for ModbusLink {
    fn read_holding_registers(
        &mut self,
        addr: u16,
        count: u16,
    ) -> std::result::Result<Vec<u16>, Box<dyn std::error::Error + Send + Sync>> {
        let words = flatten(self.ctx.read_holding_registers(addr, count))?;
        if words.len() < usize::from(count) {
            return Err(Box::new(HwError::ShortRead {
                expected: count,
                got: words.len(),
            }));
        }
        Ok(words)
    }

    fn write_register(
        &mut self,
        addr: u16,
        value: u16,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(flatten(self.ctx.write_single_register(addr, value))?)
    }

    fn write_registers(
        &mut self,
        addr: u16,
        values: &[u16],
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(flatten(self.ctx.write_multiple_registers(addr, values))?)
    }
}
