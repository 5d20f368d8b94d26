//! Cartridge mappers.
//!
//! Only NROM (mapper 0) is implemented.
//!
//! See: <https://www.nesdev.org/wiki/NROM>

use cart::Cart;
use devices::BusDevice;
use tracing::trace;

use crate::EmuError;

/// NROM: 16 or 32 KiB of fixed PRG-ROM at `$8000-$FFFF`.
///
/// A single 16 KiB page is mirrored into `$C000-$FFFF`.
#[derive(Debug)]
pub struct Nrom {
    prg_rom: Vec<u8>,
}

impl Nrom {
    pub fn new(cart: &Cart) -> Result<Self, EmuError> {
        if cart.mapper != 0 {
            return Err(EmuError::UnsupportedMapper(cart.mapper));
        }
        if cart.prg_rom_pages.is_empty() {
            return Err(EmuError::EmptyPrgRom);
        }
        Ok(Self {
            prg_rom: cart.prg_rom_pages.concat(),
        })
    }

    fn offset(&self, address: u16) -> usize {
        (address as usize - 0x8000) % self.prg_rom.len()
    }
}

impl BusDevice for Nrom {
    fn read(&mut self, address: u16) -> u8 {
        self.peek(address)
    }

    fn peek(&self, address: u16) -> u8 {
        self.prg_rom[self.offset(address)]
    }

    fn write(&mut self, address: u16, value: u8) {
        trace!("ignored write of ${value:02X} to NROM at ${address:04X}");
    }
}
