//! `devices` crate: the `BusDevice` trait and the memory-mapped NES peripherals.
//!
//! Every peripheral the CPU bus dispatches to implements [`BusDevice`].
//! The `emu` crate owns one of each and routes addresses to them.

pub mod apu;
pub mod controller;
pub mod mock;
pub mod ppu;
pub mod traits;

pub use apu::Apu;
pub use controller::{Button, Controller, ControllerPorts};
pub use ppu::Ppu;
pub use traits::BusDevice;
