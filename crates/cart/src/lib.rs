//! `cart` crate: iNES parsing and the in-memory cartridge.
//!
//! Provides the header decoder, the `Cart` model and a loader that reads a
//! ROM file from disk.  No emulation logic lives here.

pub mod error;
pub mod header;
pub mod loader;
pub mod models;

pub use error::CartError;
pub use header::INesHeader;
pub use loader::load_from_path;
pub use models::{Cart, Mirroring};
