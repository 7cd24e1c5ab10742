//! SHM (Shared Memory) constants.
//!
//! Single source of truth for the segment size envelope and the OS-level
//! naming convention (`/shm_<id>`) that the loader and the registry both
//! need to agree on.

/// Minimum shared memory segment size in bytes.
///
/// One memory page (4KB) — segments smaller than this would have
/// excessive per-segment overhead relative to payload.
pub const SHM_MIN_SIZE: usize = 4096;

/// Maximum shared memory segment size in bytes.
///
/// 16GB, comfortably above any single dataset partition this daemon is
/// expected to serve while still catching runaway size computations.
pub const SHM_MAX_SIZE: usize = 16 * 1024 * 1024 * 1024;

/// Magic number stamped into every segment header for adopt/validate checks.
pub const DATACACHE_SHM_MAGIC: u64 = 0x4441_5441_4341_4348; // "DATACACH" in ASCII hex

/// Prefix used for OS shared-memory object names.
pub const SHM_NAME_PREFIX: &str = "shm_";

/// Round `size` up to the nearest multiple of [`SHM_MIN_SIZE`].
pub const fn page_align(size: usize) -> usize {
    (size + SHM_MIN_SIZE - 1) / SHM_MIN_SIZE * SHM_MIN_SIZE
}
