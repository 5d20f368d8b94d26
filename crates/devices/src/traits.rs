//! The `BusDevice` trait: the contract every memory-mapped peripheral fulfils.

/// A peripheral mapped into the CPU address space.
///
/// Addresses are passed through unmodified; each device decodes its own
/// register mirrors.
pub trait BusDevice {
    /// Read a register. Reads may have side effects (latch resets, shifts).
    fn read(&mut self, address: u16) -> u8;

    /// Read a register without side effects, for tracing and disassembly.
    fn peek(&self, address: u16) -> u8;

    /// Write a register.
    fn write(&mut self, address: u16, value: u8);
}
