//! Tests for the emulator run loop.
//!
//! Each test assembles a tiny NROM cartridge in memory: one 16 KiB PRG page
//! mapped at both `$8000` and `$C000`, with the program at `$C000`.

use std::io::Write;

use cart::{Cart, CartError};

use crate::cpu::opcodes::Mnemonic;
use crate::{Bus, EmuError, Emulator, EmulatorConfig, StopReason};

const PRG_PAGE: usize = 0x4000;
const ENTRY: u16 = 0xc000;

/// Build an iNES image with `program` at `$C000` and `nmi_handler`, if any, at `$C010`.
fn image(program: &[u8], nmi_handler: Option<&[u8]>, flags6: u8) -> Vec<u8> {
    let mut prg = vec![0xea; PRG_PAGE];
    prg[..program.len()].copy_from_slice(program);
    if let Some(handler) = nmi_handler {
        prg[0x10..0x10 + handler.len()].copy_from_slice(handler);
    }
    prg[0x3ffa..0x3ffc].copy_from_slice(&0xc010u16.to_le_bytes());
    prg[0x3ffc..0x3ffe].copy_from_slice(&ENTRY.to_le_bytes());

    let mut bytes = vec![b'N', b'E', b'S', 0x1a, 1, 1, flags6, 0];
    bytes.resize(16, 0);
    bytes.extend_from_slice(&prg);
    bytes.resize(bytes.len() + 0x2000, 0);
    bytes
}

fn emulator(program: &[u8], config: EmulatorConfig) -> Emulator {
    let rom = image(program, None, 0);
    let cart = Cart::from_bytes(&rom).expect("valid image");
    Emulator::from_cart(cart, config).unwrap()
}

fn limited(instructions: u64) -> EmulatorConfig {
    EmulatorConfig {
        max_instructions: Some(instructions),
        ..EmulatorConfig::default()
    }
}

// ============================================================
// Construction
// ============================================================

#[test]
fn powers_up_at_reset_vector() {
    let emu = emulator(&[], EmulatorConfig::default());
    assert_eq!(emu.cpu().pc, ENTRY);
    assert_eq!(emu.cpu().cycles(), 7);
    assert_eq!(emu.cpu().bus().cycles(), 7);
    assert_eq!(emu.frames(), 0);
}

#[test]
fn reset_keeps_cpu_and_system_clocks_in_step() {
    let mut emu = emulator(&[], limited(3));
    emu.run(|_| {}).unwrap();
    let offset = emu.cpu().cycles() - emu.cpu().bus().cycles();

    emu.cpu_mut().reset();

    assert_eq!(emu.cpu().cycles() - emu.cpu().bus().cycles(), offset);
    assert_eq!(emu.cpu().bus().cycles(), 7 + 6 + 7);
    assert_eq!(emu.cpu().pc, ENTRY);
    assert_eq!(emu.cpu().s, 0xfa);
}

#[test]
fn default_config_runs_one_hundred_instructions() {
    let config = EmulatorConfig::default();
    assert_eq!(config.max_instructions, Some(100));
    assert_eq!(config.max_frames, None);
    assert!(config.stop_on_self_loop);
}

#[test]
fn unsupported_mapper_is_rejected() {
    let rom = image(&[], None, 0x10);
    let cart = Cart::from_bytes(&rom).expect("valid image");
    let err = Emulator::from_cart(cart, EmulatorConfig::default())
        .err()
        .expect("mapper 1 should be rejected");
    assert!(matches!(err, EmuError::UnsupportedMapper(1)));
}

#[test]
fn loads_rom_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    let rom = image(&[0x4c, 0x00, 0xc0], None, 0);
    file.write_all(&rom).unwrap();

    let config = EmulatorConfig::default();
    let mut emu = Emulator::from_path(file.path(), config).unwrap();
    let summary = emu.run(|_| {}).unwrap();
    assert_eq!(summary.stop_reason, StopReason::SelfLoop);
}

#[test]
fn missing_rom_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.nes");

    let err = Emulator::from_path(&missing, EmulatorConfig::default())
        .err()
        .expect("file does not exist");
    match err {
        EmuError::Cart(CartError::FileNotFound(path)) => assert_eq!(path, missing),
        other => panic!("unexpected error: {other}"),
    }
}

// ============================================================
// Stop conditions
// ============================================================

#[test]
fn stops_at_instruction_limit() {
    // All NOPs
    let mut emu = emulator(&[], EmulatorConfig::default());
    let summary = emu.run(|_| {}).unwrap();

    assert_eq!(summary.stop_reason, StopReason::InstructionLimit);
    assert_eq!(summary.instructions, 100);
    assert_eq!(summary.cycles, 200);
    assert_eq!(summary.final_state.pc, ENTRY + 100);
}

#[test]
fn limits_count_from_each_run_call() {
    let mut emu = emulator(&[], limited(10));

    let first = emu.run(|_| {}).unwrap();
    let second = emu.run(|_| {}).unwrap();

    assert_eq!(first.instructions, 10);
    assert_eq!(second.instructions, 10);
    assert_eq!(second.final_state.pc, ENTRY + 20);
    assert_eq!(emu.cpu().cycles(), 7 + 40);
}

#[test]
fn stops_on_jump_to_self_without_nmi() {
    // LDX #$01; JMP $C002
    let mut emu = emulator(&[0xa2, 0x01, 0x4c, 0x02, 0xc0], EmulatorConfig::default());
    let summary = emu.run(|_| {}).unwrap();

    assert_eq!(summary.stop_reason, StopReason::SelfLoop);
    assert_eq!(summary.instructions, 2);
    assert_eq!(summary.final_state.pc, 0xc002);
    assert_eq!(summary.final_state.x, 1);
}

#[test]
fn branch_to_self_also_counts_as_a_loop() {
    // LDA #$00; BEQ -2
    let mut emu = emulator(&[0xa9, 0x00, 0xf0, 0xfe], EmulatorConfig::default());
    let summary = emu.run(|_| {}).unwrap();

    assert_eq!(summary.stop_reason, StopReason::SelfLoop);
    assert_eq!(summary.instructions, 2);
}

#[test]
fn jump_to_self_keeps_running_while_nmi_is_enabled() {
    // LDA #$80; STA $2000; JMP $C005
    let program = [0xa9, 0x80, 0x8d, 0x00, 0x20, 0x4c, 0x05, 0xc0];
    let mut emu = emulator(&program, limited(50));
    let summary = emu.run(|_| {}).unwrap();

    assert_eq!(summary.stop_reason, StopReason::InstructionLimit);
    assert_eq!(summary.instructions, 50);
}

#[test]
fn self_loop_stop_can_be_disabled() {
    let config = EmulatorConfig {
        max_instructions: Some(25),
        stop_on_self_loop: false,
        ..EmulatorConfig::default()
    };
    let mut emu = emulator(&[0x4c, 0x00, 0xc0], config);
    let summary = emu.run(|_| {}).unwrap();

    assert_eq!(summary.stop_reason, StopReason::InstructionLimit);
    assert_eq!(summary.cycles, 25 * 3);
}

#[test]
fn stops_at_frame_limit() {
    let config = EmulatorConfig {
        max_instructions: None,
        max_frames: Some(1),
        stop_on_self_loop: false,
    };
    let mut emu = emulator(&[0x4c, 0x00, 0xc0], config);
    let summary = emu.run(|_| {}).unwrap();

    assert_eq!(summary.stop_reason, StopReason::FrameLimit);
    assert_eq!(summary.frames, 1);
    // 341 x 262 dots at three dots per CPU cycle, counted from power-up so
    // the reset sequence is included
    assert!(emu.cpu().cycles() >= 29_780);
    assert!(emu.cpu().cycles() < 29_780 + 3);
    assert_eq!(summary.cycles, emu.cpu().cycles() - 7);
}

#[test]
fn run_without_any_stop_condition_is_refused() {
    let config = EmulatorConfig {
        max_instructions: None,
        max_frames: None,
        stop_on_self_loop: false,
    };
    assert!(!config.is_bounded());
    let mut emu = emulator(&[0x4c, 0x00, 0xc0], config);

    let err = emu.run(|_| {}).unwrap_err();

    assert!(matches!(err, EmuError::NoStopCondition));
    assert_eq!(emu.cpu().pc, ENTRY);
    assert_eq!(emu.cpu().cycles(), 7);
}

#[test]
fn vblank_nmi_runs_handler_once_per_frame() {
    // LDA #$80; STA $2000; JMP $C005 ... $C010: INC $10; RTI
    let program = [0xa9, 0x80, 0x8d, 0x00, 0x20, 0x4c, 0x05, 0xc0];
    let handler = [0xe6, 0x10, 0x40];
    let rom = image(&program, Some(&handler), 0);
    let cart = Cart::from_bytes(&rom).unwrap();
    let config = EmulatorConfig {
        max_instructions: None,
        max_frames: Some(3),
        stop_on_self_loop: true,
    };
    let mut emu = Emulator::from_cart(cart, config).unwrap();

    let summary = emu.run(|_| {}).unwrap();

    assert_eq!(summary.stop_reason, StopReason::FrameLimit);
    assert_eq!(emu.frames(), 3);
    assert_eq!(emu.cpu().bus().peek(0x0010), 3);
}

// ============================================================
// Observation and errors
// ============================================================

#[test]
fn observer_sees_every_step_with_trace_line() {
    // LDA #$05; JMP $C002
    let mut emu = emulator(&[0xa9, 0x05, 0x4c, 0x02, 0xc0], EmulatorConfig::default());
    let mut lines = Vec::new();

    emu.run(|record| lines.push(record.trace_line())).unwrap();

    assert_eq!(
        lines,
        vec![
            "C000  A9 05     LDA #$05        A:00 X:00 Y:00 P:24 SP:FD CYC:7".to_owned(),
            "C002  4C 02 C0  JMP $C002       A:05 X:00 Y:00 P:24 SP:FD CYC:9".to_owned(),
        ]
    );
}

#[test]
fn step_reports_mnemonic_cycles_and_next_pc() {
    // JSR $C010
    let mut emu = emulator(&[0x20, 0x10, 0xc0], EmulatorConfig::default());
    let record = emu.step().unwrap();

    assert_eq!(record.mnemonic, Mnemonic::Jsr);
    assert_eq!(record.cycles, 6);
    assert_eq!(record.before.pc, ENTRY);
    assert_eq!(record.next_pc, 0xc010);
    assert_eq!(record.disassembly.text, "JSR $C010");
}

#[test]
fn illegal_opcode_aborts_the_run() {
    // NOP; KIL
    let mut emu = emulator(&[0xea, 0x02], EmulatorConfig::default());
    let mut seen = 0;

    let err = emu.run(|_| seen += 1).unwrap_err();

    assert!(matches!(
        err,
        EmuError::IllegalOpcode {
            opcode: 0x02,
            pc: 0xc001
        }
    ));
    assert_eq!(seen, 1);
}

#[test]
fn run_summary_serializes_to_json() {
    let mut emu = emulator(&[0x4c, 0x00, 0xc0], EmulatorConfig::default());
    let summary = emu.run(|_| {}).unwrap();

    let json = serde_json::to_value(&summary).unwrap();
    assert_eq!(json["stop_reason"], "self_loop");
    assert_eq!(json["instructions"], 1);
    assert_eq!(json["final_state"]["pc"], 0xc000);
    assert_eq!(json["final_state"]["s"], 0xfd);
}
