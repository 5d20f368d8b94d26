//! `emu` crate: the 2A03 CPU core, the NES system bus and the run loop.

pub mod bus;
pub mod cpu;
pub mod disasm;
pub mod emulator;
pub mod error;
pub mod mapper;
pub mod state;
pub mod system;

pub use bus::{Bus, FlatBus};
pub use cpu::{Cpu, Status};
pub use disasm::{disassemble, Disassembly};
pub use emulator::{Emulator, EmulatorConfig, RunSummary, StepRecord, StopReason};
pub use error::EmuError;
pub use state::CpuState;
pub use system::System;

#[cfg(test)]
mod emulator_tests;
