//! `MockDevice`: a test double for `BusDevice`.
//!
//! Useful in bus tests to observe exactly which addresses were dispatched to
//! a device and in what order.

use std::sync::{Arc, Mutex};

use crate::BusDevice;

/// One bus access observed by a `MockDevice`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read(u16),
    Write(u16, u8),
}

/// Behaviour injected into `MockDevice` at construction time.
pub enum MockBehaviour {
    /// Every read returns this byte.
    ReturnValue(u8),
    /// Reads return the last value written (0 before any write).
    EchoLastWrite,
}

/// A mock device that records every access it receives.
pub struct MockDevice {
    pub behaviour: MockBehaviour,
    /// All accesses seen by this device (in order). Clone the handle before
    /// moving the device onto a bus to inspect it afterwards.
    pub accesses: Arc<Mutex<Vec<Access>>>,
    last_write: u8,
}

impl MockDevice {
    /// Create a mock whose reads always return `value`.
    pub fn returning(value: u8) -> Self {
        Self {
            behaviour: MockBehaviour::ReturnValue(value),
            accesses: Arc::new(Mutex::new(Vec::new())),
            last_write: 0,
        }
    }

    /// Create a mock that reads back whatever was last written.
    pub fn echoing() -> Self {
        Self {
            behaviour: MockBehaviour::EchoLastWrite,
            accesses: Arc::new(Mutex::new(Vec::new())),
            last_write: 0,
        }
    }

    /// Number of reads and writes this device has seen.
    pub fn call_count(&self) -> usize {
        self.accesses.lock().unwrap().len()
    }
}

impl BusDevice for MockDevice {
    fn read(&mut self, address: u16) -> u8 {
        self.accesses.lock().unwrap().push(Access::Read(address));
        self.peek(address)
    }

    fn peek(&self, _address: u16) -> u8 {
        match self.behaviour {
            MockBehaviour::ReturnValue(value) => value,
            MockBehaviour::EchoLastWrite => self.last_write,
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        self.accesses
            .lock()
            .unwrap()
            .push(Access::Write(address, value));
        self.last_write = value;
    }
}
