//! Platform-specific shared-memory mapping primitives.
//!
//! Currently only Linux is supported, matching the target deployment
//! environment for the cache daemon.

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "linux")]
pub use linux::{attach_segment_mmap, create_segment_mmap, resize_and_attach_mmap};
