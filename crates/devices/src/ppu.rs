//! Picture Processing Unit (PPU) register file, VRAM and frame timing.
//!
//! Pixels are not produced; the PPU models what the CPU can observe:
//! registers, VRAM/OAM contents, vblank timing and the NMI it raises.
//!
//! See: <https://www.nesdev.org/wiki/PPU_registers>

use cart::Mirroring;
use tracing::{debug, trace};

use crate::BusDevice;

pub const DOTS_PER_SCANLINE: u16 = 341;
pub const SCANLINES_PER_FRAME: u16 = 262;
const VBLANK_SCANLINE: u16 = 241;
const PRE_RENDER_SCANLINE: u16 = 261;

const CTRL_INCREMENT_32: u8 = 0x04;
const CTRL_NMI_ENABLE: u8 = 0x80;

const STATUS_OVERFLOW: u8 = 0x20;
const STATUS_SPRITE_ZERO: u8 = 0x40;
const STATUS_VBLANK: u8 = 0x80;

pub struct Ppu {
    ctrl: u8,
    mask: u8,
    status: u8,
    oam_addr: u8,
    oam: [u8; 256],

    /// Current VRAM address (`v`).
    vram_addr: u16,
    /// Temporary VRAM address (`t`), loaded by `$2000/$2005/$2006` writes.
    temp_addr: u16,
    fine_x: u8,
    /// Shared first/second write toggle for `$2005` and `$2006`.
    write_toggle: bool,
    read_buffer: u8,
    /// Last value driven onto the PPU data bus by a register write.
    open_bus: u8,

    chr: Vec<u8>,
    chr_writable: bool,
    mirroring: Mirroring,
    nametables: [u8; 0x1000],
    palette: [u8; 32],

    scanline: u16,
    dot: u16,
    frame: u64,
    nmi_pending: bool,
}

impl std::fmt::Debug for Ppu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ppu")
            .field("ctrl", &self.ctrl)
            .field("mask", &self.mask)
            .field("status", &self.status)
            .field("scanline", &self.scanline)
            .field("dot", &self.dot)
            .field("frame", &self.frame)
            .finish()
    }
}

impl Ppu {
    /// Create a PPU in its power-up state.
    ///
    /// `chr` is the pattern table data; `chr_writable` marks it as CHR-RAM.
    pub fn new(chr: Vec<u8>, chr_writable: bool, mirroring: Mirroring) -> Self {
        Self {
            ctrl: 0,
            mask: 0,
            status: 0,
            oam_addr: 0,
            oam: [0; 256],
            vram_addr: 0,
            temp_addr: 0,
            fine_x: 0,
            write_toggle: false,
            read_buffer: 0,
            open_bus: 0,
            chr,
            chr_writable,
            mirroring,
            nametables: [0; 0x1000],
            palette: [0; 32],
            scanline: 0,
            dot: 0,
            frame: 0,
            nmi_pending: false,
        }
    }

    // Timing ------------------------------------------------------------------------------------

    /// Advance the PPU by `dots` dots (three per CPU cycle on NTSC).
    pub fn tick(&mut self, dots: u64) {
        for _ in 0..dots {
            self.dot += 1;
            if self.dot == DOTS_PER_SCANLINE {
                self.dot = 0;
                self.scanline += 1;
                if self.scanline == SCANLINES_PER_FRAME {
                    self.scanline = 0;
                    self.frame += 1;
                }
            }

            if self.dot == 1 {
                match self.scanline {
                    VBLANK_SCANLINE => {
                        self.status |= STATUS_VBLANK;
                        if self.ctrl & CTRL_NMI_ENABLE != 0 {
                            self.nmi_pending = true;
                        }
                    }
                    PRE_RENDER_SCANLINE => {
                        self.status &= !(STATUS_VBLANK | STATUS_SPRITE_ZERO | STATUS_OVERFLOW);
                    }
                    _ => {}
                }
            }
        }
    }

    /// Consume a pending NMI, if any.
    pub fn take_nmi(&mut self) -> bool {
        std::mem::take(&mut self.nmi_pending)
    }

    /// Number of frames completed since power-up.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn scanline(&self) -> u16 {
        self.scanline
    }

    pub fn dot(&self) -> u16 {
        self.dot
    }

    /// Whether PPUCTRL asks for an NMI at the start of vblank.
    pub fn nmi_enabled(&self) -> bool {
        self.ctrl & CTRL_NMI_ENABLE != 0
    }

    pub fn in_vblank(&self) -> bool {
        self.status & STATUS_VBLANK != 0
    }

    pub fn vram_addr(&self) -> u16 {
        self.vram_addr
    }

    /// Coarse/fine scroll as loaded into `t` plus fine X.
    pub fn scroll_registers(&self) -> (u16, u8) {
        (self.temp_addr, self.fine_x)
    }

    // OAM ---------------------------------------------------------------------------------------

    pub fn oam(&self) -> &[u8; 256] {
        &self.oam
    }

    /// Copy a full page into OAM starting at OAMADDR, as `$4014` DMA does.
    pub fn write_oam_dma(&mut self, page: &[u8; 256]) {
        for &byte in page {
            self.oam[self.oam_addr as usize] = byte;
            self.oam_addr = self.oam_addr.wrapping_add(1);
        }
    }

    // VRAM --------------------------------------------------------------------------------------

    fn nametable_index(&self, address: u16) -> usize {
        let index = (address as usize - 0x2000) & 0x0fff;
        let table = index / 0x400;
        let offset = index % 0x400;
        let physical = match self.mirroring {
            Mirroring::Horizontal => table / 2,
            Mirroring::Vertical => table % 2,
            Mirroring::FourScreen => table,
        };
        physical * 0x400 + offset
    }

    fn palette_index(address: u16) -> usize {
        let index = (address & 0x1f) as usize;
        // Sprite backdrop entries alias the background ones
        if index >= 0x10 && index & 0x03 == 0 {
            index - 0x10
        } else {
            index
        }
    }

    fn vram_read(&self, address: u16) -> u8 {
        let address = address & 0x3fff;
        match address {
            0x0000..=0x1fff => self.chr.get(address as usize).copied().unwrap_or(0),
            0x2000..=0x3eff => self.nametables[self.nametable_index(address)],
            _ => self.palette[Self::palette_index(address)],
        }
    }

    fn vram_write(&mut self, address: u16, value: u8) {
        let address = address & 0x3fff;
        match address {
            0x0000..=0x1fff => {
                if !self.chr_writable {
                    trace!("ignored write of ${value:02X} to CHR-ROM ${address:04X}");
                } else if let Some(slot) = self.chr.get_mut(address as usize) {
                    *slot = value;
                }
            }
            0x2000..=0x3eff => {
                let index = self.nametable_index(address);
                self.nametables[index] = value;
            }
            _ => self.palette[Self::palette_index(address)] = value,
        }
    }

    fn increment_vram_addr(&mut self) {
        let step = if self.ctrl & CTRL_INCREMENT_32 != 0 {
            32
        } else {
            1
        };
        self.vram_addr = self.vram_addr.wrapping_add(step) & 0x3fff;
    }

    fn write_ctrl(&mut self, value: u8) {
        let nmi_was_enabled = self.nmi_enabled();
        self.ctrl = value;
        if nmi_was_enabled != self.nmi_enabled() {
            debug!(
                enabled = self.nmi_enabled(),
                frame = self.frame,
                "vblank NMI toggled"
            );
        }
        self.temp_addr = (self.temp_addr & !0x0c00) | (((value & 0x03) as u16) << 10);
        // Enabling NMI during vblank fires immediately
        if !nmi_was_enabled && self.nmi_enabled() && self.in_vblank() {
            self.nmi_pending = true;
        }
    }
}

impl BusDevice for Ppu {
    fn read(&mut self, address: u16) -> u8 {
        match address & 0x0007 {
            2 => {
                let value = (self.status & 0xe0) | (self.open_bus & 0x1f);
                self.status &= !STATUS_VBLANK;
                self.write_toggle = false;
                value
            }
            4 => self.oam[self.oam_addr as usize],
            7 => {
                let address = self.vram_addr;
                let value = if address >= 0x3f00 {
                    // Palette reads bypass the buffer, which picks up the nametable underneath
                    self.read_buffer = self.vram_read(address - 0x1000);
                    self.vram_read(address)
                } else {
                    let fetched = self.vram_read(address);
                    std::mem::replace(&mut self.read_buffer, fetched)
                };
                self.increment_vram_addr();
                value
            }
            _ => self.open_bus,
        }
    }

    fn peek(&self, address: u16) -> u8 {
        match address & 0x0007 {
            2 => (self.status & 0xe0) | (self.open_bus & 0x1f),
            4 => self.oam[self.oam_addr as usize],
            7 if self.vram_addr >= 0x3f00 => self.vram_read(self.vram_addr),
            7 => self.read_buffer,
            _ => self.open_bus,
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        self.open_bus = value;
        match address & 0x0007 {
            0 => self.write_ctrl(value),
            1 => self.mask = value,
            2 => trace!("ignored write of ${value:02X} to PPUSTATUS"),
            3 => self.oam_addr = value,
            4 => {
                self.oam[self.oam_addr as usize] = value;
                self.oam_addr = self.oam_addr.wrapping_add(1);
            }
            5 => {
                if !self.write_toggle {
                    self.temp_addr = (self.temp_addr & !0x001f) | (value >> 3) as u16;
                    self.fine_x = value & 0x07;
                } else {
                    self.temp_addr = (self.temp_addr & !0x73e0)
                        | (((value & 0x07) as u16) << 12)
                        | (((value & 0xf8) as u16) << 2);
                }
                self.write_toggle = !self.write_toggle;
            }
            6 => {
                if !self.write_toggle {
                    self.temp_addr = (self.temp_addr & 0x00ff) | (((value & 0x3f) as u16) << 8);
                } else {
                    self.temp_addr = (self.temp_addr & 0xff00) | value as u16;
                    self.vram_addr = self.temp_addr;
                }
                self.write_toggle = !self.write_toggle;
            }
            _ => {
                self.vram_write(self.vram_addr, value);
                self.increment_vram_addr();
            }
        }
    }
}
