//! Reading ROM files from disk.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::info;

use crate::{Cart, CartError};

/// Read the file at `path` and decode it as an iNES image.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Cart, CartError> {
    let path = path.as_ref();
    let contents = fs::read(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => CartError::FileNotFound(path.to_path_buf()),
        _ => CartError::Io(err),
    })?;

    info!("Loading ROM {} ({} bytes)", path.display(), contents.len());
    Cart::from_bytes(&contents)
}
