//! Error types for shared-memory segment operations.

use thiserror::Error;

/// Errors that can occur while creating, adopting, or unlinking a segment.
#[derive(Error, Debug)]
pub enum ShmError {
    /// Exclusive creation failed because the segment is already resident
    /// and owned by this daemon (not a stale leftover eligible for adoption).
    #[error("segment already exists: {name}")]
    AlreadyExists {
        /// Segment name.
        name: String,
    },

    /// Attach or unlink was attempted on a segment that isn't mapped.
    #[error("segment not found: {name}")]
    NotFound {
        /// Segment name.
        name: String,
    },

    /// Requested size falls outside `[SHM_MIN_SIZE, SHM_MAX_SIZE]` or isn't
    /// page-aligned.
    #[error("invalid segment size: {size} bytes")]
    InvalidSize {
        /// Attempted size in bytes.
        size: usize,
    },

    /// IO error from the underlying file or mmap syscalls.
    #[error("IO error: {source}")]
    Io {
        /// Source IO error.
        #[from]
        source: std::io::Error,
    },

    /// Nix system call error.
    #[error("system call error: {source}")]
    Nix {
        /// Source nix error.
        #[from]
        source: nix::Error,
    },
}

/// Result type for shared memory operations.
pub type ShmResult<T> = Result<T, ShmError>;
