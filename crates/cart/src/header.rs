//! iNES header decoding.
//!
//! See: <https://www.nesdev.org/wiki/INES>

use serde::{Deserialize, Serialize};

use crate::{CartError, Mirroring};

/// Size of the fixed iNES header in bytes.
pub const HEADER_LEN: usize = 16;
/// Size of the optional trainer block that precedes PRG data.
pub const TRAINER_LEN: usize = 512;
/// One PRG-ROM page.
pub const PRG_PAGE_SIZE: usize = 16 * 1024;
/// One CHR-ROM page.
pub const CHR_PAGE_SIZE: usize = 8 * 1024;

const MAGIC: &[u8; 4] = b"NES\x1a";

const FLAG_VERTICAL: u8 = 0x01;
const FLAG_BATTERY: u8 = 0x02;
const FLAG_TRAINER: u8 = 0x04;
const FLAG_FOUR_SCREEN: u8 = 0x08;

/// Decoded contents of the 16-byte iNES header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct INesHeader {
    /// PRG-ROM size in 16 KiB pages.
    pub prg_rom_pages: usize,
    /// CHR-ROM size in 8 KiB pages. Zero means the board carries CHR-RAM.
    pub chr_rom_pages: usize,
    pub mirroring: Mirroring,
    pub battery_present: bool,
    pub trainer_present: bool,
    pub mapper: u8,
}

impl INesHeader {
    /// Decode the header at the start of `bytes`.
    ///
    /// # Errors
    /// [`CartError::NotARom`] if fewer than 16 bytes are present or the magic
    /// tag does not match.
    pub fn parse(bytes: &[u8]) -> Result<Self, CartError> {
        if bytes.len() < HEADER_LEN || &bytes[0..4] != MAGIC {
            return Err(CartError::NotARom);
        }

        let flags6 = bytes[6];
        let flags7 = bytes[7];

        let mirroring = if flags6 & FLAG_FOUR_SCREEN != 0 {
            Mirroring::FourScreen
        } else if flags6 & FLAG_VERTICAL != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };

        Ok(Self {
            prg_rom_pages: bytes[4] as usize,
            chr_rom_pages: bytes[5] as usize,
            mirroring,
            battery_present: flags6 & FLAG_BATTERY != 0,
            trainer_present: flags6 & FLAG_TRAINER != 0,
            mapper: (flags6 >> 4) | (flags7 & 0xf0),
        })
    }

    /// Total file size implied by the header.
    pub fn expected_len(&self) -> usize {
        let trainer = if self.trainer_present { TRAINER_LEN } else { 0 };
        HEADER_LEN
            + trainer
            + self.prg_rom_pages * PRG_PAGE_SIZE
            + self.chr_rom_pages * CHR_PAGE_SIZE
    }
}
