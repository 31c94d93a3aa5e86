//! In-memory stand-ins for the field bus and the proximity sensor.
//!
//! A [`RegisterBank`] is shared between the test (or the dev-mode runtime)
//! and every [`SimulatedLink`] handed out by a [`SimulatedConnector`], so
//! writes made by the controller are visible to whoever scripts the
//! instrument, and vice versa.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use scale_traits::{Connector, DigitalInput, RegisterLink};
use tracing::trace;

use crate::error::HwError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A write observed on the bus, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub addr: u16,
    pub values: Vec<u16>,
}

#[derive(Default)]
struct BankInner {
    regs: BTreeMap<u16, u16>,
    writes: Vec<WriteRecord>,
    reads: usize,
}

/// Holding registers of a simulated instrument. Unset registers read as 0.
#[derive(Clone)]
pub struct RegisterBank {
    inner: Arc<Mutex<BankInner>>,
    online: Arc<AtomicBool>,
}

impl Default for RegisterBank {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterBank {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BankInner::default())),
            online: Arc::new(AtomicBool::new(true)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BankInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, addr: u16) -> u16 {
        self.lock().regs.get(&addr).copied().unwrap_or(0)
    }

    pub fn set(&self, addr: u16, value: u16) {
        self.lock().regs.insert(addr, value);
    }

    pub fn set_many(&self, addr: u16, values: &[u16]) {
        let mut g = self.lock();
        for (i, v) in values.iter().enumerate() {
            g.regs.insert(addr.wrapping_add(i as u16), *v);
        }
    }

    /// Take the instrument off the wire; open links fail and new connects are refused.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    pub fn read_count(&self) -> usize {
        self.lock().reads
    }
}

pub struct SimulatedLink {
    bank: RegisterBank,
}

impl SimulatedLink {
    pub fn new(bank: RegisterBank) -> Self {
        Self { bank }
    }

    fn ensure_online(&self) -> Result<(), HwError> {
        if self.bank.is_online() {
            Ok(())
        } else {
            Err(HwError::Disconnected)
        }
    }
}

impl RegisterLink for SimulatedLink {
    fn read_holding_registers(&mut self, addr: u16, count: u16) -> Result<Vec<u16>, BoxError> {
        self.ensure_online()?;
        let mut g = self.bank.lock();
        g.reads += 1;
        let words = (0..count)
            .map(|i| {
                g.regs
                    .get(&addr.wrapping_add(i))
                    .copied()
                    .unwrap_or(0)
            })
            .collect();
        trace!(addr, count, "sim read");
        Ok(words)
    }

    fn write_register(&mut self, addr: u16, value: u16) -> Result<(), BoxError> {
        self.write_registers(addr, &[value])
    }

    fn write_registers(&mut self, addr: u16, values: &[u16]) -> Result<(), BoxError> {
        self.ensure_online()?;
        let mut g = self.bank.lock();
        for (i, v) in values.iter().enumerate() {
            g.regs.insert(addr.wrapping_add(i as u16), *v);
        }
        g.writes.push(WriteRecord {
            addr,
            values: values.to_vec(),
        });
        trace!(addr, n = values.len(), "sim write");
        Ok(())
    }
}

/// Hands out [`SimulatedLink`]s over one shared bank. Connects fail while the
/// bank is offline, or for the next `n` attempts after [`fail_next`](Self::fail_next).
#[derive(Clone)]
pub struct SimulatedConnector {
    bank: RegisterBank,
    fail_next: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

impl SimulatedConnector {
    pub fn new(bank: RegisterBank) -> Self {
        Self {
            bank,
            fail_next: Arc::new(AtomicUsize::new(0)),
            attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn bank(&self) -> &RegisterBank {
        &self.bank
    }

    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for SimulatedConnector {
    fn connect(&mut self) -> Result<Box<dyn RegisterLink>, BoxError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let scripted_failure = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure || !self.bank.is_online() {
            return Err(Box::new(HwError::Disconnected));
        }
        Ok(Box::new(SimulatedLink::new(self.bank.clone())))
    }

    fn endpoint(&self) -> String {
        "sim://register-bank".into()
    }
}

/// A presence input whose level is set from the outside.
#[derive(Clone, Default)]
pub struct SimulatedInput {
    level: Arc<AtomicBool>,
}

impl SimulatedInput {
    pub fn new(initial: bool) -> Self {
        Self {
            level: Arc::new(AtomicBool::new(initial)),
        }
    }

    pub fn set(&self, level: bool) {
        self.level.store(level, Ordering::SeqCst);
    }

    /// Flip the level and return the new value.
    pub fn toggle(&self) -> bool {
        !self.level.fetch_xor(true, Ordering::SeqCst)
    }
}

impl DigitalInput for SimulatedInput {
    fn read(&mut self) -> Result<bool, BoxError> {
        Ok(self.level.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_registers_read_zero() {
        let bank = RegisterBank::new();
        bank.set(8, 42);
        let mut link = SimulatedLink::new(bank.clone());
        let words = link.read_holding_registers(7, 3).unwrap();
        assert_eq!(words, vec![0, 42, 0]);
        assert_eq!(bank.read_count(), 1);
    }

    #[test]
    fn offline_bank_rejects_io() {
        let bank = RegisterBank::new();
        let mut link = SimulatedLink::new(bank.clone());
        bank.set_online(false);
        assert!(link.write_register(5, 1).is_err());
        assert!(bank.writes().is_empty());
    }

    #[test]
    fn toggle_returns_new_level() {
        let input = SimulatedInput::new(false);
        assert!(input.toggle());
        assert!(!input.toggle());
    }
}
