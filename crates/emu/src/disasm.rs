//! Side-effect free disassembly of single instructions.

use serde::Serialize;

use crate::cpu::opcodes::{decode, AddrMode};
use crate::Bus;

/// One disassembled instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Disassembly {
    pub address: u16,
    pub bytes: Vec<u8>,
    pub text: String,
}

impl Disassembly {
    /// Encoded length in bytes.
    pub fn size(&self) -> u16 {
        self.bytes.len() as u16
    }

    /// Address of the instruction that follows this one.
    pub fn next_address(&self) -> u16 {
        self.address.wrapping_add(self.size())
    }

    /// Space-separated hex bytes, e.g. `4C F5 C5`.
    pub fn hex_bytes(&self) -> String {
        self.bytes
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Disassemble the instruction at `address` using `peek`, so device state is
/// left untouched.
pub fn disassemble<B: Bus + ?Sized>(bus: &B, address: u16) -> Disassembly {
    let opcode = bus.peek(address);
    let Some(instruction) = decode(opcode) else {
        return Disassembly {
            address,
            bytes: vec![opcode],
            text: format!(".db ${opcode:02X}"),
        };
    };

    let bytes: Vec<u8> = (0..instruction.size())
        .map(|offset| bus.peek(address.wrapping_add(offset)))
        .collect();
    let byte = bytes.get(1).copied().unwrap_or(0);
    let word = u16::from_le_bytes([byte, bytes.get(2).copied().unwrap_or(0)]);

    let operand = match instruction.mode {
        AddrMode::Implied => String::new(),
        AddrMode::Accumulator => "A".to_owned(),
        AddrMode::Immediate => format!("#${byte:02X}"),
        AddrMode::ZeroPage => format!("${byte:02X}"),
        AddrMode::ZeroPageX => format!("${byte:02X},X"),
        AddrMode::ZeroPageY => format!("${byte:02X},Y"),
        AddrMode::Relative => {
            let target = address.wrapping_add(2).wrapping_add(byte as i8 as u16);
            format!("${target:04X}")
        }
        AddrMode::Absolute => format!("${word:04X}"),
        AddrMode::AbsoluteX => format!("${word:04X},X"),
        AddrMode::AbsoluteY => format!("${word:04X},Y"),
        AddrMode::Indirect => format!("(${word:04X})"),
        AddrMode::IndirectX => format!("(${byte:02X},X)"),
        AddrMode::IndirectY => format!("(${byte:02X}),Y"),
    };

    let text = if operand.is_empty() {
        instruction.mnemonic.to_string()
    } else {
        format!("{} {operand}", instruction.mnemonic)
    };

    Disassembly {
        address,
        bytes,
        text,
    }
}
