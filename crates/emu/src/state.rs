//! Serializable CPU register snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Status;

/// Registers and cycle count at an instruction boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuState {
    pub pc: u16,
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub s: u8,
    pub p: u8,
    pub cycles: u64,
}

impl CpuState {
    /// Flags as `NV-DIZC` letters, `-` where clear.
    pub fn flag_summary(&self) -> String {
        let p = Status::from_bits_truncate(self.p);
        let mut summary = String::with_capacity(6);
        for (flag, letter) in [
            (Status::NEGATIVE, 'N'),
            (Status::OVERFLOW, 'V'),
            (Status::DECIMAL, 'D'),
            (Status::INTERRUPT_DISABLE, 'I'),
            (Status::ZERO, 'Z'),
            (Status::CARRY, 'C'),
        ] {
            summary.push(if p.contains(flag) { letter } else { '-' });
        }
        summary
    }
}

impl fmt::Display for CpuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X} CYC:{}",
            self.a, self.x, self.y, self.p, self.s, self.cycles
        )
    }
}
