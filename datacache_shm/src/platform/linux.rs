//! Linux-specific shared memory mapping operations.

use crate::error::ShmError;
use memmap2::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;

/// Create a new shared-memory file at `path` and map it writable.
///
/// Fails with [`std::io::ErrorKind::AlreadyExists`] if the file exists —
/// the caller decides whether that means adopting the stale segment
/// ([`resize_and_attach_mmap`]) or treating it as a live conflict.
pub fn create_segment_mmap(path: &str, size: usize) -> Result<MmapMut, ShmError> {
    let file = OpenOptions::new()
        .create_new(true)
        .read(true)
        .write(true)
        .mode(0o600)
        .open(path)?;

    file.set_len(size as u64)?;
    let mmap = unsafe { MmapOptions::new().populate().map_mut(&file)? };
    Ok(mmap)
}

/// Attach to an existing shared-memory file without resizing it.
pub fn attach_segment_mmap(path: &str) -> Result<MmapMut, ShmError> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let mmap = unsafe { MmapOptions::new().map_mut(&file)? };
    Ok(mmap)
}

/// Attach to an existing shared-memory file, resizing it to `size` first.
///
/// Used to adopt a stale segment left behind by a prior crashed run whose
/// dataset no longer matches the requested size.
pub fn resize_and_attach_mmap(path: &str, size: usize) -> Result<MmapMut, ShmError> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    file.set_len(size as u64)?;
    let mmap = unsafe { MmapOptions::new().populate().map_mut(&file)? };
    Ok(mmap)
}
