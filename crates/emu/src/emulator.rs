//! The emulator run loop.
//!
//! `Emulator` is the central driver:
//! 1. Wires a cartridge into a `System` and powers up the CPU.
//! 2. Steps the CPU one instruction at a time, handing each step to an observer.
//! 3. Stops on the configured instruction or frame limit, or when the program
//!    parks itself in a jump-to-self loop with no interrupt able to wake it.
//! 4. Reports a `RunSummary` for the stretch it just ran.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::cpu::opcodes::Mnemonic;
use crate::disasm::{disassemble, Disassembly};
use crate::{Cpu, CpuState, EmuError, System};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Stop conditions for [`Emulator::run`]. Limits count from the start of
/// each `run` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulatorConfig {
    /// Stop after this many instructions.
    pub max_instructions: Option<u64>,
    /// Stop once this many frames have completed.
    pub max_frames: Option<u64>,
    /// Stop when the program jumps to itself with interrupts unable to fire.
    pub stop_on_self_loop: bool,
}

impl EmulatorConfig {
    /// Whether at least one stop condition is configured.
    pub fn is_bounded(&self) -> bool {
        self.max_instructions.is_some() || self.max_frames.is_some() || self.stop_on_self_loop
    }
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            max_instructions: Some(100),
            max_frames: None,
            stop_on_self_loop: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-step and per-run output
// ---------------------------------------------------------------------------

/// One executed instruction, as seen just before it ran.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub before: CpuState,
    pub disassembly: Disassembly,
    pub mnemonic: Mnemonic,
    /// Cycles consumed, including stalls and interrupt entry.
    pub cycles: u64,
    /// PC after the instruction (and any interrupt entry).
    pub next_pc: u16,
}

impl StepRecord {
    /// A single trace line, e.g.
    /// `C000  4C F5 C5  JMP $C5F5       A:00 X:00 Y:00 P:24 SP:FD CYC:7`.
    pub fn trace_line(&self) -> String {
        format!(
            "{:04X}  {:<8}  {:<14}  {}",
            self.before.pc,
            self.disassembly.hex_bytes(),
            self.disassembly.text,
            self.before
        )
    }

    fn is_self_jump(&self) -> bool {
        self.next_pc == self.before.pc
            && (self.mnemonic == Mnemonic::Jmp || self.mnemonic.is_branch())
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    InstructionLimit,
    FrameLimit,
    SelfLoop,
}

/// The result of one [`Emulator::run`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub instructions: u64,
    pub cycles: u64,
    pub frames: u64,
    pub stop_reason: StopReason,
    pub final_state: CpuState,
}

// ---------------------------------------------------------------------------
// Emulator
// ---------------------------------------------------------------------------

pub struct Emulator {
    cpu: Cpu<System>,
    config: EmulatorConfig,
}

impl Emulator {
    pub fn new(system: System, config: EmulatorConfig) -> Self {
        Self {
            cpu: Cpu::new(system),
            config,
        }
    }

    pub fn from_cart(cart: cart::Cart, config: EmulatorConfig) -> Result<Self, EmuError> {
        Ok(Self::new(System::new(cart)?, config))
    }

    pub fn from_path(path: impl AsRef<Path>, config: EmulatorConfig) -> Result<Self, EmuError> {
        let cart = cart::load_from_path(path)?;
        Self::from_cart(cart, config)
    }

    pub fn cpu(&self) -> &Cpu<System> {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu<System> {
        &mut self.cpu
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: EmulatorConfig) {
        self.config = config;
    }

    /// Frames completed since power-up.
    pub fn frames(&self) -> u64 {
        self.cpu.bus().ppu().frame()
    }

    /// Execute a single instruction.
    pub fn step(&mut self) -> Result<StepRecord, EmuError> {
        let before = self.cpu.state();
        let disassembly = disassemble(self.cpu.bus(), before.pc);
        let executed = self.cpu.step()?;

        Ok(StepRecord {
            before,
            disassembly,
            mnemonic: executed.instruction.mnemonic,
            cycles: executed.cycles,
            next_pc: self.cpu.pc,
        })
    }

    /// Run until a stop condition, calling `observer` after every instruction.
    ///
    /// # Errors
    /// Returns `EmuError::IllegalOpcode` if execution reaches a byte that is
    /// not an official opcode, and `EmuError::NoStopCondition` up front when
    /// the config sets no limit and disables the self-loop stop.
    #[instrument(skip(self, observer), fields(pc = self.cpu.pc))]
    pub fn run<F>(&mut self, mut observer: F) -> Result<RunSummary, EmuError>
    where
        F: FnMut(&StepRecord),
    {
        if !self.config.is_bounded() {
            error!("run refused: nothing would ever stop it");
            return Err(EmuError::NoStopCondition);
        }

        let start_cycles = self.cpu.cycles();
        let start_frame = self.frames();
        let mut instructions = 0u64;
        debug!(config = ?self.config, "run started");

        let stop_reason = loop {
            if let Some(limit) = self.config.max_instructions {
                if instructions >= limit {
                    break StopReason::InstructionLimit;
                }
            }
            if let Some(limit) = self.config.max_frames {
                if self.frames() - start_frame >= limit {
                    break StopReason::FrameLimit;
                }
            }

            let record = match self.step() {
                Ok(record) => record,
                Err(err) => {
                    error!("execution stopped after {instructions} instructions: {err}");
                    return Err(err);
                }
            };
            instructions += 1;
            observer(&record);

            if self.config.stop_on_self_loop
                && record.is_self_jump()
                && !self.can_be_interrupted()
            {
                break StopReason::SelfLoop;
            }
        };

        let summary = RunSummary {
            instructions,
            cycles: self.cpu.cycles() - start_cycles,
            frames: self.frames() - start_frame,
            stop_reason,
            final_state: self.cpu.state(),
        };

        info!(
            "run stopped ({:?}) after {} instructions, {} cycles, {} frames; flags {}",
            summary.stop_reason,
            summary.instructions,
            summary.cycles,
            summary.frames,
            summary.final_state.flag_summary()
        );

        Ok(summary)
    }

    /// Whether anything could still pull the CPU out of a jump-to-self loop.
    ///
    /// Only the PPU's vblank NMI is wired up; the APU stub never raises IRQ.
    fn can_be_interrupted(&self) -> bool {
        self.cpu.bus().ppu().nmi_enabled()
    }
}
