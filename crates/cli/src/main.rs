//! `rusty-nes` CLI entry-point.
//!
//! Available sub-commands:
//! - `run`: execute a ROM headlessly and report where it stopped.
//! - `info`: print the parsed iNES header of a ROM.
//! - `disasm`: disassemble instructions from a ROM's address space.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use emu::{disassemble, Bus, EmuError, Emulator, EmulatorConfig, RunSummary, StopReason, System};
use tracing::{info, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// NTSC frame rate.
const FRAMES_PER_SECOND: f64 = 60.0988;

#[derive(Parser)]
#[command(name = "rusty-nes", about = "Headless NES emulator", version)]
struct Cli {
    /// Log at debug level regardless of RUST_LOG.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, env = "RUSTY_NES_JSON_LOGS")]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a ROM until an instruction or frame limit, or a jump-to-self loop.
    Run {
        /// Path to the iNES ROM file.
        rom: PathBuf,
        /// Instructions to execute (default 100 unless --frames is given).
        #[arg(long)]
        instructions: Option<u64>,
        /// Frames to execute.
        #[arg(long)]
        frames: Option<u64>,
        /// Print one trace line per instruction.
        #[arg(long)]
        trace: bool,
        /// Print the run summary as JSON.
        #[arg(long)]
        json: bool,
        /// Pace emulation at the NTSC frame rate.
        #[arg(long)]
        realtime: bool,
    },
    /// Print the iNES header of a ROM.
    Info {
        rom: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Disassemble instructions, starting at the reset vector by default.
    Disasm {
        rom: PathBuf,
        /// Start address in hex, e.g. `C000` or `$C000`.
        #[arg(long, value_parser = parse_address)]
        start: Option<u16>,
        #[arg(long, default_value_t = 16)]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs, cli.verbose);

    match cli.command {
        Command::Run {
            rom,
            instructions,
            frames,
            trace,
            json,
            realtime,
        } => {
            let config = EmulatorConfig {
                max_instructions: match (instructions, frames) {
                    (Some(limit), _) => Some(limit),
                    (None, Some(_)) => None,
                    (None, None) => EmulatorConfig::default().max_instructions,
                },
                max_frames: frames,
                ..EmulatorConfig::default()
            };
            let mut emulator = Emulator::from_path(&rom, config)
                .with_context(|| format!("cannot start emulator for {}", rom.display()))?;
            info!("Running {}", rom.display());

            let summary = if realtime {
                run_realtime(&mut emulator, trace).await?
            } else {
                emulator
                    .run(|step| print_step(trace, step))
                    .context("emulation failed")?
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_summary(&summary);
            }
        }
        Command::Info { rom, json } => {
            let cart = load_cart(&rom)?;
            let header = cart.header();
            if json {
                println!("{}", serde_json::to_string_pretty(header)?);
            } else {
                println!("PRG ROM:   {} x 16 KiB", header.prg_rom_pages);
                if cart.has_chr_ram() {
                    println!("CHR:       8 KiB RAM");
                } else {
                    println!("CHR ROM:   {} x 8 KiB", header.chr_rom_pages);
                }
                println!("Mapper:    {}", header.mapper);
                println!("Mirroring: {}", header.mirroring);
                println!("Battery:   {}", header.battery_present);
                println!("Trainer:   {}", header.trainer_present);
            }
        }
        Command::Disasm { rom, start, count } => {
            let system = System::new(load_cart(&rom)?)
                .with_context(|| format!("cannot map {}", rom.display()))?;
            let mut address = start.unwrap_or_else(|| {
                u16::from_le_bytes([system.peek(0xfffc), system.peek(0xfffd)])
            });
            for _ in 0..count {
                let line = disassemble(&system, address);
                println!(
                    "{:04X}  {:<8}  {}",
                    line.address,
                    line.hex_bytes(),
                    line.text
                );
                address = line.next_address();
            }
        }
    }

    Ok(())
}

/// Configure the global subscriber. `--verbose` forces debug; otherwise
/// `RUST_LOG` applies with `info` as the fallback.
fn init_tracing(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new(Level::DEBUG.as_str())
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(Level::INFO.as_str()))
    };

    // stdout is reserved for traces and JSON output
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
}

fn frame_period() -> Duration {
    Duration::from_secs_f64(1.0 / FRAMES_PER_SECOND)
}

fn load_cart(rom: &Path) -> Result<cart::Cart> {
    cart::load_from_path(rom)
        .with_context(|| format!("cannot load ROM {}", rom.display()))
}

fn parse_address(s: &str) -> Result<u16, String> {
    let digits = s
        .strip_prefix('$')
        .or_else(|| s.strip_prefix("0x"))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16)
        .map_err(|e| format!("invalid address {s:?}: {e}"))
}

fn print_step(trace: bool, step: &emu::StepRecord) {
    if trace {
        println!("{}", step.trace_line());
    }
}

fn print_summary(summary: &RunSummary) {
    let reason = match summary.stop_reason {
        StopReason::InstructionLimit => "instruction limit reached",
        StopReason::FrameLimit => "frame limit reached",
        StopReason::SelfLoop => "program parked in a jump-to-self loop",
    };
    println!(
        "Stopped: {reason} after {} instructions ({} cycles, {} frames)",
        summary.instructions, summary.cycles, summary.frames
    );
    println!("PC:{:04X} {}", summary.final_state.pc, summary.final_state);
}

/// Run one frame per tick of a 60.0988 Hz interval until the emulator's
/// configured limits are reached. The config is restored afterwards.
async fn run_realtime(emulator: &mut Emulator, trace: bool) -> Result<RunSummary> {
    let limits = emulator.config().clone();
    if !limits.is_bounded() {
        return Err(EmuError::NoStopCondition.into());
    }

    let mut interval = tokio::time::interval(frame_period());
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let start_cycles = emulator.cpu().cycles();
    let mut instructions = 0u64;
    let mut frames = 0u64;

    let stop_reason = loop {
        if limits.max_frames.is_some_and(|limit| frames >= limit) {
            break StopReason::FrameLimit;
        }
        if let Some(limit) = limits.max_instructions {
            if instructions >= limit {
                break StopReason::InstructionLimit;
            }
        }

        interval.tick().await;
        emulator.set_config(EmulatorConfig {
            max_instructions: limits.max_instructions.map(|limit| limit - instructions),
            max_frames: Some(1),
            stop_on_self_loop: limits.stop_on_self_loop,
        });
        let slice = emulator
            .run(|step| print_step(trace, step))
            .context("emulation failed")?;
        instructions += slice.instructions;
        frames += slice.frames;

        if slice.stop_reason == StopReason::SelfLoop {
            break StopReason::SelfLoop;
        }
    };

    emulator.set_config(limits);
    Ok(RunSummary {
        instructions,
        cycles: emulator.cpu().cycles() - start_cycles,
        frames,
        stop_reason,
        final_state: emulator.cpu().state(),
    })
}
