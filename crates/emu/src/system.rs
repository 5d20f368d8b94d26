//! The NES CPU memory map.
//!
//! See: <https://www.nesdev.org/wiki/CPU_memory_map>

use cart::Cart;
use devices::{Apu, BusDevice, ControllerPorts, Ppu};
use tracing::{debug, trace};

use crate::mapper::Nrom;
use crate::{Bus, EmuError};

const RAM_SIZE: usize = 0x800;
const PRG_RAM_SIZE: usize = 0x2000;
const OAM_DMA: u16 = 0x4014;
const OAM_DMA_CYCLES: u64 = 513;

/// The console: internal RAM, PPU, APU, controllers and the cartridge.
pub struct System {
    ram: Box<[u8; RAM_SIZE]>,
    prg_ram: Box<[u8; PRG_RAM_SIZE]>,
    ppu: Ppu,
    apu: Apu,
    controllers: ControllerPorts,
    mapper: Nrom,
    /// Optional device on the expansion port (`$4020-$5FFF`).
    expansion: Option<Box<dyn BusDevice>>,
    cycles: u64,
    stall_cycles: u64,
}

impl std::fmt::Debug for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("System")
            .field("ppu", &self.ppu)
            .field("mapper", &self.mapper)
            .field("cycles", &self.cycles)
            .finish()
    }
}

impl System {
    /// Wire a cartridge into a freshly powered-on console.
    ///
    /// # Errors
    /// [`EmuError::UnsupportedMapper`] or [`EmuError::EmptyPrgRom`] if the
    /// cartridge cannot be mapped.
    pub fn new(cart: Cart) -> Result<Self, EmuError> {
        let mapper = Nrom::new(&cart)?;
        let ppu = Ppu::new(cart.chr_data(), cart.has_chr_ram(), cart.mirroring);
        debug!("System wired with {cart:?}");

        Ok(Self {
            ram: Box::new([0; RAM_SIZE]),
            prg_ram: Box::new([0; PRG_RAM_SIZE]),
            ppu,
            apu: Apu::new(),
            controllers: ControllerPorts::new(),
            mapper,
            expansion: None,
            cycles: 0,
            stall_cycles: 0,
        })
    }

    pub fn attach_expansion(&mut self, device: Box<dyn BusDevice>) {
        self.expansion = Some(device);
    }

    pub fn ppu(&self) -> &Ppu {
        &self.ppu
    }

    pub fn apu(&self) -> &Apu {
        &self.apu
    }

    pub fn controllers_mut(&mut self) -> &mut ControllerPorts {
        &mut self.controllers
    }

    /// CPU cycles elapsed since power-on, as reported through `tick`.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    fn oam_dma(&mut self, page: u8) {
        let base = (page as u16) << 8;
        let mut buffer = [0u8; 256];
        for (offset, slot) in buffer.iter_mut().enumerate() {
            *slot = self.read(base | offset as u16);
        }
        self.ppu.write_oam_dma(&buffer);
        // One extra alignment cycle when the DMA starts on an odd CPU cycle
        self.stall_cycles += OAM_DMA_CYCLES + (self.cycles & 1);
    }
}

impl Bus for System {
    fn read(&mut self, address: u16) -> u8 {
        match address {
            0x0000..=0x1fff => self.ram[address as usize & (RAM_SIZE - 1)],
            0x2000..=0x3fff => self.ppu.read(address),
            0x4016 | 0x4017 => self.controllers.read(address),
            0x4000..=0x401f => self.apu.read(address),
            0x4020..=0x5fff => match self.expansion.as_mut() {
                Some(device) => device.read(address),
                None => 0,
            },
            0x6000..=0x7fff => self.prg_ram[address as usize - 0x6000],
            0x8000..=0xffff => self.mapper.read(address),
        }
    }

    fn peek(&self, address: u16) -> u8 {
        match address {
            0x0000..=0x1fff => self.ram[address as usize & (RAM_SIZE - 1)],
            0x2000..=0x3fff => self.ppu.peek(address),
            0x4016 | 0x4017 => self.controllers.peek(address),
            0x4000..=0x401f => self.apu.peek(address),
            0x4020..=0x5fff => self
                .expansion
                .as_ref()
                .map_or(0, |device| device.peek(address)),
            0x6000..=0x7fff => self.prg_ram[address as usize - 0x6000],
            0x8000..=0xffff => self.mapper.peek(address),
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        match address {
            0x0000..=0x1fff => self.ram[address as usize & (RAM_SIZE - 1)] = value,
            0x2000..=0x3fff => self.ppu.write(address, value),
            OAM_DMA => self.oam_dma(value),
            0x4016 => self.controllers.write(address, value),
            // $4017 writes go to the APU frame counter
            0x4000..=0x401f => self.apu.write(address, value),
            0x4020..=0x5fff => match self.expansion.as_mut() {
                Some(device) => device.write(address, value),
                None => trace!("ignored write of ${value:02X} to ${address:04X}"),
            },
            0x6000..=0x7fff => self.prg_ram[address as usize - 0x6000] = value,
            0x8000..=0xffff => self.mapper.write(address, value),
        }
    }

    fn tick(&mut self, cpu_cycles: u64) {
        self.cycles += cpu_cycles;
        self.ppu.tick(cpu_cycles * 3);
    }

    fn poll_nmi(&mut self) -> bool {
        self.ppu.take_nmi()
    }

    fn take_stall_cycles(&mut self) -> u64 {
        std::mem::take(&mut self.stall_cycles)
    }
}

#[cfg(test)]
mod tests {
    use devices::mock::{Access, MockDevice};
    use devices::Button;

    use super::*;

    /// Build an NROM image whose PRG pages are filled with `page_fill[i]`.
    fn cart_with_pages(page_fill: &[u8]) -> Cart {
        let mut bytes = vec![b'N', b'E', b'S', 0x1a, page_fill.len() as u8, 1, 0, 0];
        bytes.resize(16, 0);
        for &fill in page_fill {
            bytes.resize(bytes.len() + 0x4000, fill);
        }
        bytes.resize(bytes.len() + 0x2000, 0);
        Cart::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn internal_ram_mirrors_every_2k() {
        let mut system = System::new(cart_with_pages(&[0xea])).unwrap();
        system.write(0x0001, 0x42);
        assert_eq!(system.read(0x0801), 0x42);
        assert_eq!(system.read(0x1801), 0x42);
        system.write(0x1fff, 0x24);
        assert_eq!(system.read(0x07ff), 0x24);
    }

    #[test]
    fn single_prg_page_is_mirrored_into_upper_bank() {
        let mut system = System::new(cart_with_pages(&[0x11])).unwrap();
        assert_eq!(system.read(0x8000), 0x11);
        assert_eq!(system.read(0xc000), 0x11);
        assert_eq!(system.read(0xffff), 0x11);
    }

    #[test]
    fn two_prg_pages_map_lower_and_upper_banks() {
        let mut system = System::new(cart_with_pages(&[0x11, 0x22])).unwrap();
        assert_eq!(system.read(0xbfff), 0x11);
        assert_eq!(system.read(0xc000), 0x22);
    }

    #[test]
    fn rom_writes_are_ignored() {
        let mut system = System::new(cart_with_pages(&[0x11])).unwrap();
        system.write(0x8000, 0x99);
        assert_eq!(system.read(0x8000), 0x11);
    }

    #[test]
    fn prg_ram_is_read_write() {
        let mut system = System::new(cart_with_pages(&[0x11])).unwrap();
        system.write(0x6000, 0x5a);
        assert_eq!(system.read(0x6000), 0x5a);
    }

    #[test]
    fn unsupported_mapper_is_rejected() {
        let mut bytes = vec![b'N', b'E', b'S', 0x1a, 1, 0, 0x10, 0];
        bytes.resize(16 + 0x4000, 0);
        let cart = Cart::from_bytes(&bytes).unwrap();
        assert!(matches!(
            System::new(cart),
            Err(EmuError::UnsupportedMapper(1))
        ));
    }

    #[test]
    fn empty_prg_is_rejected() {
        let mut bytes = vec![b'N', b'E', b'S', 0x1a, 0, 0, 0, 0];
        bytes.resize(16, 0);
        let cart = Cart::from_bytes(&bytes).unwrap();
        assert!(matches!(System::new(cart), Err(EmuError::EmptyPrgRom)));
    }

    #[test]
    fn ppu_status_read_through_bus_clears_vblank() {
        let mut system = System::new(cart_with_pages(&[0xea])).unwrap();
        // 241 scanlines of 341 dots, plus one, at 3 dots per CPU cycle
        system.tick((241 * 341 + 1) / 3 + 1);
        assert!(system.ppu().in_vblank());
        assert_eq!(system.peek(0x2002) & 0x80, 0x80);
        assert_eq!(system.read(0x2002) & 0x80, 0x80);
        assert_eq!(system.read(0x2002) & 0x80, 0);
    }

    #[test]
    fn oam_dma_copies_page_and_stalls() {
        let mut system = System::new(cart_with_pages(&[0xea])).unwrap();
        for i in 0..=255u8 {
            system.write(0x0200 + i as u16, i);
        }
        system.write(0x4014, 0x02);
        assert_eq!(system.ppu().oam()[0x10], 0x10);
        assert_eq!(system.ppu().oam()[0xff], 0xff);
        assert_eq!(system.take_stall_cycles(), 513);
        assert_eq!(system.take_stall_cycles(), 0);

        system.tick(1);
        system.write(0x4014, 0x02);
        assert_eq!(system.take_stall_cycles(), 514);
    }

    #[test]
    fn controller_port_reads_shift_buttons() {
        let mut system = System::new(cart_with_pages(&[0xea])).unwrap();
        system.controllers_mut().ports[0].set_pressed(Button::B, true);
        system.write(0x4016, 1);
        system.write(0x4016, 0);
        assert_eq!(system.read(0x4016), 0);
        assert_eq!(system.read(0x4016), 1);
    }

    #[test]
    fn apu_writes_are_latched_and_frame_counter_goes_to_apu() {
        let mut system = System::new(cart_with_pages(&[0xea])).unwrap();
        system.write(0x4015, 0x1f);
        system.write(0x4017, 0x40);
        assert_eq!(system.apu().latched(0x4015), Some(0x1f));
        assert_eq!(system.apu().latched(0x4017), Some(0x40));
    }

    #[test]
    fn expansion_port_dispatches_to_attached_device() {
        let mut system = System::new(cart_with_pages(&[0xea])).unwrap();
        assert_eq!(system.read(0x5000), 0);

        let device = MockDevice::returning(0x77);
        let accesses = device.accesses.clone();
        system.attach_expansion(Box::new(device));

        assert_eq!(system.read(0x5000), 0x77);
        system.write(0x4020, 0x01);
        assert_eq!(system.peek(0x5fff), 0x77);
        assert_eq!(
            *accesses.lock().unwrap(),
            vec![Access::Read(0x5000), Access::Write(0x4020, 0x01)]
        );
    }
}
