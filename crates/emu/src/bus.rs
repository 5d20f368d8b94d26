//! The CPU-facing bus abstraction.

/// Everything the CPU core needs from the machine around it.
///
/// Only memory access is required; the timing and interrupt hooks default to
/// a machine with no peripherals.
pub trait Bus {
    /// Read a byte. May trigger device side effects.
    fn read(&mut self, address: u16) -> u8;

    /// Read a byte without side effects.
    fn peek(&self, address: u16) -> u8;

    fn write(&mut self, address: u16, value: u8);

    /// Called with the cycles consumed by every instruction, interrupt entry
    /// and reset sequence.
    fn tick(&mut self, _cpu_cycles: u64) {}

    /// Consume a pending NMI edge.
    fn poll_nmi(&mut self) -> bool {
        false
    }

    /// Level of the IRQ line.
    fn irq_line(&self) -> bool {
        false
    }

    /// Cycles the CPU must stall for (e.g. OAM DMA), consumed on read.
    fn take_stall_cycles(&mut self) -> u64 {
        0
    }
}

/// A flat 64 KiB RAM with externally driven interrupt lines.
///
/// Used for CPU tests and for disassembling raw binaries.
pub struct FlatBus {
    pub memory: Vec<u8>,
    pub nmi: bool,
    pub irq: bool,
}

impl Default for FlatBus {
    fn default() -> Self {
        Self {
            memory: vec![0; 0x10000],
            nmi: false,
            irq: false,
        }
    }
}

impl FlatBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `bytes` into memory starting at `address`, wrapping at `$FFFF`.
    pub fn load(&mut self, address: u16, bytes: &[u8]) {
        for (offset, &byte) in bytes.iter().enumerate() {
            let target = address.wrapping_add(offset as u16);
            self.memory[target as usize] = byte;
        }
    }

    /// Point the reset vector at `address`.
    pub fn set_reset_vector(&mut self, address: u16) {
        self.load(0xfffc, &address.to_le_bytes());
    }
}

impl Bus for FlatBus {
    fn read(&mut self, address: u16) -> u8 {
        self.memory[address as usize]
    }

    fn peek(&self, address: u16) -> u8 {
        self.memory[address as usize]
    }

    fn write(&mut self, address: u16, value: u8) {
        self.memory[address as usize] = value;
    }

    fn poll_nmi(&mut self) -> bool {
        std::mem::take(&mut self.nmi)
    }

    fn irq_line(&self) -> bool {
        self.irq
    }
}
