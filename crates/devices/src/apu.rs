use tracing::trace;

/// Audio Processing Unit (APU) register stub.
///
/// Register writes are latched so they can be inspected; no audio is
/// produced and the status register always reads back as zero.
#[derive(Debug, Default)]
pub struct Apu {
    registers: [u8; 0x18],
}

impl Apu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last value written to the register at `address`, if it is an APU register.
    pub fn latched(&self, address: u16) -> Option<u8> {
        match address {
            0x4000..=0x4013 | 0x4015 | 0x4017 => Some(self.registers[(address - 0x4000) as usize]),
            _ => None,
        }
    }
}

impl crate::BusDevice for Apu {
    fn read(&mut self, address: u16) -> u8 {
        self.peek(address)
    }

    fn peek(&self, _address: u16) -> u8 {
        0
    }

    fn write(&mut self, address: u16, value: u8) {
        if self.latched(address).is_some() {
            self.registers[(address - 0x4000) as usize] = value;
        } else {
            trace!("ignored write of ${value:02X} to ${address:04X}");
        }
    }
}
