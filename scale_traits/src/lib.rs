pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// One physical field-bus connection to the weight instrument.
///
/// Implementations are not reentrant: callers must guarantee that only one
/// transaction is in flight at a time (the core funnels every call through a
/// single queue worker).
pub trait RegisterLink: Send {
    fn read_holding_registers(
        &mut self,
        addr: u16,
        count: u16,
    ) -> Result<Vec<u16>, Box<dyn std::error::Error + Send + Sync>>;
    fn write_register(
        &mut self,
        addr: u16,
        value: u16,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn write_registers(
        &mut self,
        addr: u16,
        values: &[u16],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Establishes a `RegisterLink` from parameters captured at construction.
pub trait Connector: Send {
    fn connect(&mut self) -> Result<Box<dyn RegisterLink>, Box<dyn std::error::Error + Send + Sync>>;
    /// Human-readable endpoint for logs (e.g. `tcp://127.0.0.1:8502`).
    fn endpoint(&self) -> String;
}

/// A single digital input line (proximity sensor, trigger switch).
pub trait DigitalInput: Send {
    fn read(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}
