//! The 2A03 NES CPU core, which is based on the 6502 processor.
//!
//! The core is instruction-stepped: [`Cpu::step`] executes one whole
//! instruction, charges its cycles, lets the bus catch up, and then services
//! any pending interrupt.
//!
//! See: <https://www.nesdev.org/wiki/CPU>

pub mod opcodes;

use bitflags::bitflags;

use crate::{Bus, CpuState, EmuError};
use opcodes::{decode, AddrMode, Instruction, Mnemonic};

pub const NMI_VECTOR: u16 = 0xfffa;
pub const RESET_VECTOR: u16 = 0xfffc;
pub const IRQ_VECTOR: u16 = 0xfffe;

const STACK_BASE: u16 = 0x0100;
const INTERRUPT_CYCLES: u64 = 7;
/// Cycles consumed by the reset sequence before the first instruction.
const RESET_CYCLES: u64 = 7;

bitflags! {
    /// Processor status register.
    ///
    /// See: <https://www.nesdev.org/wiki/Status_flags>
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        const CARRY = 0x01;
        const ZERO = 0x02;
        const INTERRUPT_DISABLE = 0x04;
        /// Stored but ignored; the 2A03 has no BCD mode.
        const DECIMAL = 0x08;
        /// Only exists in the pushed copy of P.
        const BREAK = 0x10;
        /// Always reads back as 1.
        const UNUSED = 0x20;
        const OVERFLOW = 0x40;
        const NEGATIVE = 0x80;
    }
}

/// Where an instruction's operand lives once its addressing mode is resolved.
#[derive(Debug, Clone, Copy)]
enum Operand {
    None,
    Accumulator,
    Address(u16),
}

/// Outcome of a single [`Cpu::step`].
#[derive(Debug, Clone, Copy)]
pub struct Executed {
    pub instruction: Instruction,
    /// Cycles consumed, including DMA stalls and any interrupt entry.
    pub cycles: u64,
}

pub struct Cpu<B: Bus> {
    /// Accumulator
    pub a: u8,

    /// Indexes used for several addressing modes
    pub x: u8,
    pub y: u8,

    /// Program counter
    pub pc: u16,

    /// Stack pointer
    pub s: u8,

    pub p: Status,

    cycles: u64,
    bus: B,
}

impl<B: Bus> Cpu<B> {
    /// Create a new CPU, in the power up state, and jump through the reset vector.
    ///
    /// See: <https://www.nesdev.org/wiki/CPU_power_up_state>
    pub fn new(bus: B) -> Self {
        let mut cpu = Self {
            a: 0,
            x: 0,
            y: 0,
            pc: 0,
            s: 0xfd,
            p: Status::INTERRUPT_DISABLE | Status::UNUSED,
            cycles: 0,
            bus,
        };
        cpu.run_reset_sequence();
        cpu
    }

    /// Reset button: registers survive, S drops by three, I is set.
    ///
    /// See: <https://www.nesdev.org/wiki/CPU_power_up_state#After_reset>
    pub fn reset(&mut self) {
        self.s = self.s.wrapping_sub(3);
        self.p.insert(Status::INTERRUPT_DISABLE);
        self.run_reset_sequence();
    }

    fn run_reset_sequence(&mut self) {
        self.pc = self.read_word(RESET_VECTOR);
        self.cycles += RESET_CYCLES;
        self.bus.tick(RESET_CYCLES);
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_bus(self) -> B {
        self.bus
    }

    /// Total cycles since power-up.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn state(&self) -> CpuState {
        CpuState {
            pc: self.pc,
            a: self.a,
            x: self.x,
            y: self.y,
            s: self.s,
            p: self.p.bits(),
            cycles: self.cycles,
        }
    }

    /// Execute one instruction.
    ///
    /// # Errors
    /// [`EmuError::IllegalOpcode`] if the byte at PC is not an official
    /// opcode. No state is modified in that case.
    pub fn step(&mut self) -> Result<Executed, EmuError> {
        let start = self.cycles;
        let opcode = self.bus.read(self.pc);
        let instruction = decode(opcode).ok_or(EmuError::IllegalOpcode {
            opcode,
            pc: self.pc,
        })?;

        let (operand, page_crossed) = self.resolve(instruction.mode);
        self.pc = self.pc.wrapping_add(instruction.size());
        self.cycles += instruction.cycles as u64;
        if page_crossed && instruction.mnemonic.pays_page_penalty() {
            self.cycles += 1;
        }

        self.execute(instruction.mnemonic, operand);

        self.cycles += self.bus.take_stall_cycles();
        self.bus.tick(self.cycles - start);

        if self.bus.poll_nmi() {
            self.interrupt(NMI_VECTOR);
        } else if self.bus.irq_line() && !self.p.contains(Status::INTERRUPT_DISABLE) {
            self.interrupt(IRQ_VECTOR);
        }

        Ok(Executed {
            instruction,
            cycles: self.cycles - start,
        })
    }

    /// Enter the NMI handler immediately.
    pub fn nmi(&mut self) {
        self.interrupt(NMI_VECTOR);
    }

    /// Enter the IRQ handler if interrupts are enabled. Returns whether it was taken.
    pub fn irq(&mut self) -> bool {
        if self.p.contains(Status::INTERRUPT_DISABLE) {
            return false;
        }
        self.interrupt(IRQ_VECTOR);
        true
    }

    fn interrupt(&mut self, vector: u16) {
        self.push_word(self.pc);
        let pushed = (self.p | Status::UNUSED) - Status::BREAK;
        self.push(pushed.bits());
        self.p.insert(Status::INTERRUPT_DISABLE);
        self.pc = self.read_word(vector);
        self.cycles += INTERRUPT_CYCLES;
        self.bus.tick(INTERRUPT_CYCLES);
    }

    // Memory helpers ----------------------------------------------------------------------------

    fn read_word(&mut self, address: u16) -> u16 {
        let lo = self.bus.read(address);
        let hi = self.bus.read(address.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    /// Read a pointer stored in page zero; the high byte wraps within the page.
    fn read_zero_page_word(&mut self, address: u8) -> u16 {
        let lo = self.bus.read(address as u16);
        let hi = self.bus.read(address.wrapping_add(1) as u16);
        u16::from_le_bytes([lo, hi])
    }

    fn push(&mut self, value: u8) {
        self.bus.write(STACK_BASE | self.s as u16, value);
        self.s = self.s.wrapping_sub(1);
    }

    fn pull(&mut self) -> u8 {
        self.s = self.s.wrapping_add(1);
        self.bus.read(STACK_BASE | self.s as u16)
    }

    fn push_word(&mut self, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.push(hi);
        self.push(lo);
    }

    fn pull_word(&mut self) -> u16 {
        let lo = self.pull();
        let hi = self.pull();
        u16::from_le_bytes([lo, hi])
    }

    // Addressing modes --------------------------------------------------------------------------

    /// Resolve the operand of the instruction at PC. The second value reports
    /// whether indexing crossed a page boundary.
    fn resolve(&mut self, mode: AddrMode) -> (Operand, bool) {
        let arg_address = self.pc.wrapping_add(1);

        match mode {
            AddrMode::Implied => (Operand::None, false),
            AddrMode::Accumulator => (Operand::Accumulator, false),
            AddrMode::Immediate => (Operand::Address(arg_address), false),
            AddrMode::ZeroPage => {
                let address = self.bus.read(arg_address) as u16;
                (Operand::Address(address), false)
            }
            AddrMode::ZeroPageX => {
                let address = self.bus.read(arg_address).wrapping_add(self.x) as u16;
                (Operand::Address(address), false)
            }
            AddrMode::ZeroPageY => {
                let address = self.bus.read(arg_address).wrapping_add(self.y) as u16;
                (Operand::Address(address), false)
            }
            AddrMode::Relative => {
                let offset = self.bus.read(arg_address) as i8;
                let next = self.pc.wrapping_add(2);
                (Operand::Address(next.wrapping_add(offset as u16)), false)
            }
            AddrMode::Absolute => (Operand::Address(self.read_word(arg_address)), false),
            AddrMode::AbsoluteX => {
                let base = self.read_word(arg_address);
                let address = base.wrapping_add(self.x as u16);
                (Operand::Address(address), crosses_page(base, address))
            }
            AddrMode::AbsoluteY => {
                let base = self.read_word(arg_address);
                let address = base.wrapping_add(self.y as u16);
                (Operand::Address(address), crosses_page(base, address))
            }
            AddrMode::Indirect => {
                let pointer = self.read_word(arg_address);
                // The 6502 never carries into the high byte of the pointer
                let lo = self.bus.read(pointer);
                let hi = self.bus.read((pointer & 0xff00) | (pointer.wrapping_add(1) & 0x00ff));
                (Operand::Address(u16::from_le_bytes([lo, hi])), false)
            }
            AddrMode::IndirectX => {
                let pointer = self.bus.read(arg_address).wrapping_add(self.x);
                (Operand::Address(self.read_zero_page_word(pointer)), false)
            }
            AddrMode::IndirectY => {
                let pointer = self.bus.read(arg_address);
                let base = self.read_zero_page_word(pointer);
                let address = base.wrapping_add(self.y as u16);
                (Operand::Address(address), crosses_page(base, address))
            }
        }
    }

    fn load(&mut self, operand: Operand) -> u8 {
        match operand {
            Operand::Accumulator => self.a,
            Operand::Address(address) => self.bus.read(address),
            Operand::None => 0,
        }
    }

    fn store(&mut self, operand: Operand, value: u8) {
        match operand {
            Operand::Accumulator => self.a = value,
            Operand::Address(address) => self.bus.write(address, value),
            Operand::None => {}
        }
    }

    fn target(operand: Operand) -> u16 {
        match operand {
            Operand::Address(address) => address,
            _ => 0,
        }
    }

    // Helpers for setting flags -----------------------------------------------------------------

    fn set_zn(&mut self, value: u8) {
        self.p.set(Status::ZERO, value == 0);
        self.p.set(Status::NEGATIVE, value & 0x80 != 0);
    }

    fn add_with_carry(&mut self, value: u8) {
        let carry_in = self.p.contains(Status::CARRY) as u16;
        let sum = self.a as u16 + value as u16 + carry_in;
        let result = sum as u8;

        self.p.set(Status::CARRY, sum > 0xff);
        // Signed overflow: both inputs share a sign that the result does not
        self.p.set(
            Status::OVERFLOW,
            (self.a ^ result) & (value ^ result) & 0x80 != 0,
        );
        self.a = result;
        self.set_zn(result);
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.p.set(Status::CARRY, register >= value);
        self.set_zn(register.wrapping_sub(value));
    }

    fn branch_if(&mut self, condition: bool, operand: Operand) {
        if !condition {
            return;
        }
        let target = Self::target(operand);
        self.cycles += 1;
        if crosses_page(self.pc, target) {
            self.cycles += 1;
        }
        self.pc = target;
    }

    /// Apply a read-modify-write operation to memory or the accumulator.
    fn modify(&mut self, operand: Operand, op: impl FnOnce(&mut Self, u8) -> u8) {
        let value = self.load(operand);
        let result = op(self, value);
        self.store(operand, result);
        self.set_zn(result);
    }

    // Execution ---------------------------------------------------------------------------------

    fn execute(&mut self, mnemonic: Mnemonic, operand: Operand) {
        match mnemonic {
            // Logical and arithmetic commands
            Mnemonic::Ora => {
                let value = self.load(operand);
                self.a |= value;
                self.set_zn(self.a);
            }
            Mnemonic::And => {
                let value = self.load(operand);
                self.a &= value;
                self.set_zn(self.a);
            }
            Mnemonic::Eor => {
                let value = self.load(operand);
                self.a ^= value;
                self.set_zn(self.a);
            }
            Mnemonic::Adc => {
                let value = self.load(operand);
                self.add_with_carry(value);
            }
            Mnemonic::Sbc => {
                let value = self.load(operand);
                self.add_with_carry(!value);
            }
            Mnemonic::Cmp => {
                let value = self.load(operand);
                self.compare(self.a, value);
            }
            Mnemonic::Cpx => {
                let value = self.load(operand);
                self.compare(self.x, value);
            }
            Mnemonic::Cpy => {
                let value = self.load(operand);
                self.compare(self.y, value);
            }
            Mnemonic::Dec => self.modify(operand, |_, v| v.wrapping_sub(1)),
            Mnemonic::Inc => self.modify(operand, |_, v| v.wrapping_add(1)),
            Mnemonic::Dex => {
                self.x = self.x.wrapping_sub(1);
                self.set_zn(self.x);
            }
            Mnemonic::Dey => {
                self.y = self.y.wrapping_sub(1);
                self.set_zn(self.y);
            }
            Mnemonic::Inx => {
                self.x = self.x.wrapping_add(1);
                self.set_zn(self.x);
            }
            Mnemonic::Iny => {
                self.y = self.y.wrapping_add(1);
                self.set_zn(self.y);
            }
            Mnemonic::Asl => self.modify(operand, |cpu, v| {
                cpu.p.set(Status::CARRY, v & 0x80 != 0);
                v << 1
            }),
            Mnemonic::Lsr => self.modify(operand, |cpu, v| {
                cpu.p.set(Status::CARRY, v & 0x01 != 0);
                v >> 1
            }),
            Mnemonic::Rol => self.modify(operand, |cpu, v| {
                let carry_in = cpu.p.contains(Status::CARRY) as u8;
                cpu.p.set(Status::CARRY, v & 0x80 != 0);
                (v << 1) | carry_in
            }),
            Mnemonic::Ror => self.modify(operand, |cpu, v| {
                let carry_in = (cpu.p.contains(Status::CARRY) as u8) << 7;
                cpu.p.set(Status::CARRY, v & 0x01 != 0);
                (v >> 1) | carry_in
            }),

            // Move commands
            Mnemonic::Lda => {
                self.a = self.load(operand);
                self.set_zn(self.a);
            }
            Mnemonic::Ldx => {
                self.x = self.load(operand);
                self.set_zn(self.x);
            }
            Mnemonic::Ldy => {
                self.y = self.load(operand);
                self.set_zn(self.y);
            }
            Mnemonic::Sta => self.store(operand, self.a),
            Mnemonic::Stx => self.store(operand, self.x),
            Mnemonic::Sty => self.store(operand, self.y),
            Mnemonic::Tax => {
                self.x = self.a;
                self.set_zn(self.x);
            }
            Mnemonic::Txa => {
                self.a = self.x;
                self.set_zn(self.a);
            }
            Mnemonic::Tay => {
                self.y = self.a;
                self.set_zn(self.y);
            }
            Mnemonic::Tya => {
                self.a = self.y;
                self.set_zn(self.a);
            }
            Mnemonic::Tsx => {
                self.x = self.s;
                self.set_zn(self.x);
            }
            Mnemonic::Txs => self.s = self.x,
            Mnemonic::Pla => {
                self.a = self.pull();
                self.set_zn(self.a);
            }
            Mnemonic::Pha => self.push(self.a),
            Mnemonic::Plp => {
                let pulled = Status::from_bits_truncate(self.pull());
                self.p = (pulled - Status::BREAK) | Status::UNUSED;
            }
            Mnemonic::Php => {
                let pushed = self.p | Status::BREAK | Status::UNUSED;
                self.push(pushed.bits());
            }

            // Jump/Flag commands
            Mnemonic::Bpl => self.branch_if(!self.p.contains(Status::NEGATIVE), operand),
            Mnemonic::Bmi => self.branch_if(self.p.contains(Status::NEGATIVE), operand),
            Mnemonic::Bvc => self.branch_if(!self.p.contains(Status::OVERFLOW), operand),
            Mnemonic::Bvs => self.branch_if(self.p.contains(Status::OVERFLOW), operand),
            Mnemonic::Bcc => self.branch_if(!self.p.contains(Status::CARRY), operand),
            Mnemonic::Bcs => self.branch_if(self.p.contains(Status::CARRY), operand),
            Mnemonic::Bne => self.branch_if(!self.p.contains(Status::ZERO), operand),
            Mnemonic::Beq => self.branch_if(self.p.contains(Status::ZERO), operand),
            Mnemonic::Brk => {
                // PC already points past the opcode; BRK skips a padding byte too
                self.push_word(self.pc.wrapping_add(1));
                let pushed = self.p | Status::BREAK | Status::UNUSED;
                self.push(pushed.bits());
                self.p.insert(Status::INTERRUPT_DISABLE);
                self.pc = self.read_word(IRQ_VECTOR);
            }
            Mnemonic::Rti => {
                let pulled = Status::from_bits_truncate(self.pull());
                self.p = (pulled - Status::BREAK) | Status::UNUSED;
                self.pc = self.pull_word();
            }
            Mnemonic::Jsr => {
                // Pushes the address of the last byte of the JSR itself
                self.push_word(self.pc.wrapping_sub(1));
                self.pc = Self::target(operand);
            }
            Mnemonic::Rts => self.pc = self.pull_word().wrapping_add(1),
            Mnemonic::Jmp => self.pc = Self::target(operand),
            Mnemonic::Bit => {
                let value = self.load(operand);
                self.p.set(Status::ZERO, value & self.a == 0);
                self.p.set(Status::NEGATIVE, value & 0x80 != 0);
                self.p.set(Status::OVERFLOW, value & 0x40 != 0);
            }
            Mnemonic::Clc => self.p.remove(Status::CARRY),
            Mnemonic::Sec => self.p.insert(Status::CARRY),
            Mnemonic::Cld => self.p.remove(Status::DECIMAL),
            Mnemonic::Sed => self.p.insert(Status::DECIMAL),
            Mnemonic::Cli => self.p.remove(Status::INTERRUPT_DISABLE),
            Mnemonic::Sei => self.p.insert(Status::INTERRUPT_DISABLE),
            Mnemonic::Clv => self.p.remove(Status::OVERFLOW),
            Mnemonic::Nop => {}
        }
    }
}

fn crosses_page(from: u16, to: u16) -> bool {
    from & 0xff00 != to & 0xff00
}
