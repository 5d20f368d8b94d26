//! Typed error type for the cart crate.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CartError {
    #[error("ROM file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing `NES\x1A` tag or a header shorter than 16 bytes.
    #[error("file is not an iNES ROM")]
    NotARom,

    #[error("ROM truncated: header declares {expected} bytes, file has {actual}")]
    Truncated { expected: usize, actual: usize },
}
