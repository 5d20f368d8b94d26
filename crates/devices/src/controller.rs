//! Standard NES controllers on `$4016`/`$4017`.
//!
//! See: <https://www.nesdev.org/wiki/Standard_controller>

use crate::BusDevice;

/// Buttons in the order the shift register reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    A,
    B,
    Select,
    Start,
    Up,
    Down,
    Left,
    Right,
}

impl Button {
    fn mask(self) -> u8 {
        1 << self as u8
    }
}

#[derive(Debug, Default, Clone)]
pub struct Controller {
    buttons: u8,
    shift: u8,
    strobe: bool,
}

impl Controller {
    pub fn set_pressed(&mut self, button: Button, pressed: bool) {
        if pressed {
            self.buttons |= button.mask();
        } else {
            self.buttons &= !button.mask();
        }
    }

    fn set_strobe(&mut self, strobe: bool) {
        // The register reloads for as long as strobe is high, so the falling
        // edge latches whatever is held at that moment
        if self.strobe || strobe {
            self.shift = self.buttons;
        }
        self.strobe = strobe;
    }

    fn peek_bit(&self) -> u8 {
        if self.strobe {
            self.buttons & 1
        } else {
            self.shift & 1
        }
    }

    fn read_bit(&mut self) -> u8 {
        let bit = self.peek_bit();
        if !self.strobe {
            // Official pads shift in ones once all eight buttons are out
            self.shift = (self.shift >> 1) | 0x80;
        }
        bit
    }
}

/// Both controller ports. Writes strobe both pads; reads address one.
#[derive(Debug, Default)]
pub struct ControllerPorts {
    pub ports: [Controller; 2],
}

impl ControllerPorts {
    pub fn new() -> Self {
        Self::default()
    }

    fn port(address: u16) -> usize {
        (address & 1) as usize
    }
}

impl BusDevice for ControllerPorts {
    fn read(&mut self, address: u16) -> u8 {
        self.ports[Self::port(address)].read_bit()
    }

    fn peek(&self, address: u16) -> u8 {
        self.ports[Self::port(address)].peek_bit()
    }

    fn write(&mut self, _address: u16, value: u8) {
        for pad in &mut self.ports {
            pad.set_strobe(value & 1 == 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latch(ports: &mut ControllerPorts) {
        ports.write(0x4016, 1);
        ports.write(0x4016, 0);
    }

    #[test]
    fn shifts_buttons_in_report_order_then_ones() {
        let mut ports = ControllerPorts::new();
        ports.ports[0].set_pressed(Button::A, true);
        ports.ports[0].set_pressed(Button::Start, true);
        ports.ports[0].set_pressed(Button::Right, true);
        latch(&mut ports);

        let bits: Vec<u8> = (0..10).map(|_| ports.read(0x4016)).collect();
        assert_eq!(bits, vec![1, 0, 0, 1, 0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn strobe_high_keeps_reporting_a() {
        let mut ports = ControllerPorts::new();
        ports.ports[0].set_pressed(Button::A, true);
        ports.write(0x4016, 1);
        assert_eq!(ports.read(0x4016), 1);
        assert_eq!(ports.read(0x4016), 1);
    }

    #[test]
    fn falling_strobe_latches_buttons_pressed_while_high() {
        let mut ports = ControllerPorts::new();
        ports.write(0x4016, 1);
        ports.ports[0].set_pressed(Button::Select, true);
        ports.write(0x4016, 0);

        let bits: Vec<u8> = (0..3).map(|_| ports.read(0x4016)).collect();
        assert_eq!(bits, vec![0, 0, 1]);
    }

    #[test]
    fn writing_zero_while_low_keeps_the_shift_position() {
        let mut ports = ControllerPorts::new();
        ports.ports[0].set_pressed(Button::B, true);
        latch(&mut ports);
        assert_eq!(ports.read(0x4016), 0);

        ports.write(0x4016, 0);
        assert_eq!(ports.read(0x4016), 1);
    }

    #[test]
    fn ports_are_independent() {
        let mut ports = ControllerPorts::new();
        ports.ports[1].set_pressed(Button::B, true);
        latch(&mut ports);
        assert_eq!(ports.read(0x4016), 0);
        assert_eq!(ports.read(0x4017), 0);
        assert_eq!(ports.read(0x4017), 1);
    }

    #[test]
    fn released_button_is_cleared() {
        let mut pad = Controller::default();
        pad.set_pressed(Button::Up, true);
        pad.set_pressed(Button::Up, false);
        assert_eq!(pad.buttons, 0);
    }
}
