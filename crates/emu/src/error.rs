//! Emulator-level error types.

use thiserror::Error;

/// Errors produced while building a system or executing code.
#[derive(Debug, Error)]
pub enum EmuError {
    // ------ Setup errors ------
    /// The ROM could not be loaded or decoded.
    #[error("cartridge error: {0}")]
    Cart(#[from] cart::CartError),

    #[error("mapper {0} is not supported (only NROM / mapper 0)")]
    UnsupportedMapper(u8),

    #[error("cartridge has no PRG-ROM")]
    EmptyPrgRom,

    // ------ Execution errors ------
    /// The byte at `pc` is not an official 6502 opcode.
    #[error("illegal opcode ${opcode:02X} at ${pc:04X}")]
    IllegalOpcode { opcode: u8, pc: u16 },

    /// A run was started with no instruction limit, no frame limit and the
    /// self-loop stop disabled, so nothing could ever end it.
    #[error("run has no stop condition")]
    NoStopCondition,
}
