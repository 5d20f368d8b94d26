//! In-memory cartridge model.
//!
//! A `Cart` is the decoded form of an iNES file: header fields plus the PRG
//! and CHR pages copied out in file order.  Bus mapping lives in the `emu`
//! crate; this type only carries data.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::header::{INesHeader, CHR_PAGE_SIZE, HEADER_LEN, PRG_PAGE_SIZE, TRAINER_LEN};
use crate::CartError;

// ---------------------------------------------------------------------------
// Mirroring
// ---------------------------------------------------------------------------

/// Nametable mirroring arrangement wired on the cartridge board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mirroring {
    Horizontal,
    Vertical,
    FourScreen,
}

impl fmt::Display for Mirroring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Horizontal => write!(f, "horizontal"),
            Self::Vertical => write!(f, "vertical"),
            Self::FourScreen => write!(f, "four-screen"),
        }
    }
}

// ---------------------------------------------------------------------------
// Cart
// ---------------------------------------------------------------------------

pub struct Cart {
    header: INesHeader,
    pub mirroring: Mirroring,
    pub mapper: u8,
    pub battery_present: bool,
    pub trainer: Option<Vec<u8>>,
    /// 16 KiB pages in file order.
    pub prg_rom_pages: Vec<Vec<u8>>,
    /// 8 KiB pages in file order.
    pub chr_rom_pages: Vec<Vec<u8>>,
}

impl fmt::Debug for Cart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cart")
            .field("prg_rom_pages", &self.prg_rom_pages.len())
            .field("chr_rom_pages", &self.chr_rom_pages.len())
            .field("mirroring", &self.mirroring)
            .field("mapper", &self.mapper)
            .finish()
    }
}

impl Cart {
    /// Decode a complete iNES image.
    ///
    /// # Errors
    /// - [`CartError::NotARom`] if the header is missing or mis-tagged.
    /// - [`CartError::Truncated`] if the file is shorter than the header says.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CartError> {
        let header = INesHeader::parse(bytes)?;

        let expected = header.expected_len();
        if bytes.len() < expected {
            return Err(CartError::Truncated {
                expected,
                actual: bytes.len(),
            });
        }
        if bytes.len() > expected {
            warn!(
                "ROM has {} trailing bytes past the declared size",
                bytes.len() - expected
            );
        }

        let mut offset = HEADER_LEN;
        let trainer = if header.trainer_present {
            let block = bytes[offset..offset + TRAINER_LEN].to_vec();
            offset += TRAINER_LEN;
            Some(block)
        } else {
            None
        };

        let prg_end = offset + header.prg_rom_pages * PRG_PAGE_SIZE;
        let prg_rom_pages = bytes[offset..prg_end]
            .chunks_exact(PRG_PAGE_SIZE)
            .map(<[u8]>::to_vec)
            .collect();
        offset = prg_end;

        let chr_end = offset + header.chr_rom_pages * CHR_PAGE_SIZE;
        let chr_rom_pages = bytes[offset..chr_end]
            .chunks_exact(CHR_PAGE_SIZE)
            .map(<[u8]>::to_vec)
            .collect();

        debug!(
            prg = header.prg_rom_pages,
            chr = header.chr_rom_pages,
            mapper = header.mapper,
            mirroring = %header.mirroring,
            "decoded iNES image"
        );

        Ok(Self {
            header,
            mirroring: header.mirroring,
            mapper: header.mapper,
            battery_present: header.battery_present,
            trainer,
            prg_rom_pages,
            chr_rom_pages,
        })
    }

    pub fn header(&self) -> &INesHeader {
        &self.header
    }

    /// Whether the board uses writable CHR-RAM instead of CHR-ROM.
    pub fn has_chr_ram(&self) -> bool {
        self.chr_rom_pages.is_empty()
    }

    /// Pattern table contents as seen by the PPU at `$0000-$1FFF`.
    ///
    /// Boards without CHR-ROM get 8 KiB of zeroed CHR-RAM.
    pub fn chr_data(&self) -> Vec<u8> {
        if self.has_chr_ram() {
            vec![0; CHR_PAGE_SIZE]
        } else {
            self.chr_rom_pages.concat()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(prg: u8, chr: u8, flags6: u8) -> Vec<u8> {
        let mut bytes = vec![b'N', b'E', b'S', 0x1a, prg, chr, flags6, 0];
        bytes.resize(HEADER_LEN, 0);
        if flags6 & 0x04 != 0 {
            bytes.resize(bytes.len() + TRAINER_LEN, 0xee);
        }
        for page in 0..prg {
            bytes.resize(bytes.len() + PRG_PAGE_SIZE, 0x10 + page);
        }
        for page in 0..chr {
            bytes.resize(bytes.len() + CHR_PAGE_SIZE, 0x80 + page);
        }
        bytes
    }

    #[test]
    fn pages_are_split_in_file_order() {
        let cart = Cart::from_bytes(&image(2, 1, 0)).unwrap();
        assert_eq!(cart.prg_rom_pages.len(), 2);
        assert_eq!(cart.prg_rom_pages[0][0], 0x10);
        assert_eq!(cart.prg_rom_pages[1][PRG_PAGE_SIZE - 1], 0x11);
        assert_eq!(cart.chr_rom_pages.len(), 1);
        assert_eq!(cart.chr_rom_pages[0][0], 0x80);
        assert!(cart.trainer.is_none());
    }

    #[test]
    fn trainer_is_skipped_before_prg() {
        let cart = Cart::from_bytes(&image(1, 0, 0x04)).unwrap();
        let trainer = cart.trainer.as_ref().expect("trainer present");
        assert_eq!(trainer.len(), TRAINER_LEN);
        assert_eq!(trainer[0], 0xee);
        assert_eq!(cart.prg_rom_pages[0][0], 0x10);
    }

    #[test]
    fn truncated_image_is_rejected() {
        let mut bytes = image(1, 1, 0);
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            Cart::from_bytes(&bytes),
            Err(CartError::Truncated { expected, actual }) if expected == actual + 1
        ));
    }

    #[test]
    fn missing_chr_rom_means_chr_ram() {
        let cart = Cart::from_bytes(&image(1, 0, 0)).unwrap();
        assert!(cart.has_chr_ram());
        assert_eq!(cart.chr_data(), vec![0; CHR_PAGE_SIZE]);
    }

    #[test]
    fn debug_output_omits_page_bytes() {
        let cart = Cart::from_bytes(&image(1, 1, 0x01)).unwrap();
        let rendered = format!("{cart:?}");
        assert!(rendered.contains("prg_rom_pages: 1"));
        assert!(rendered.contains("Vertical"));
    }
}
