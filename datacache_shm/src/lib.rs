//! Shared-memory segment lifecycle for the datacache daemon.
//!
//! A segment is created once by the loader worker, written once, and from
//! then on is immutable until it's unlinked on eviction or shutdown. This
//! crate owns the `/dev/shm` mechanics only — attaching to a published
//! segment and decoding its rows is a client-side concern out of scope here.
//!
//! # Usage
//!
//! ```no_run
//! use datacache_shm::{SegmentWriter, unlink_segment};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut writer = SegmentWriter::create_or_adopt("2024-06-01_equities", 1 << 20)?;
//! writer.write(b"...")?;
//! // later, on eviction or shutdown:
//! unlink_segment(writer.name())?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod error;
pub mod lifecycle;
pub mod platform;
pub mod segment;
pub mod writer;

pub use error::{ShmError, ShmResult};
pub use lifecycle::unlink_segment;
pub use segment::{SegmentHeader, SharedMemorySegment};
pub use writer::SegmentWriter;
