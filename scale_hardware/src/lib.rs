//! Field-bus and sensor back-ends for the filling-scale controller.
//!
//! Everything here implements the seams from `scale_traits`; the controller
//! never names a concrete transport.

pub mod error;
pub mod params;
pub mod sim;
pub mod util;

#[cfg(feature = "modbus")]
pub mod modbus;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

pub use params::{LinkParams, Parity, Transport};
pub use sim::{RegisterBank, SimulatedConnector, SimulatedInput, SimulatedLink, WriteRecord};

#[cfg(feature = "modbus")]
pub use modbus::{ModbusConnector, ModbusLink};

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use gpio::GpioInput;
