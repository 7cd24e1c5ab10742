//! Shared memory segment structures.
//!
//! Segments in this crate are write-once: a [`crate::writer::SegmentWriter`]
//! creates or adopts the backing `/dev/shm` file, copies the dataset bytes in
//! exactly once, and from then on the segment is immutable until it is
//! unlinked. There is no version counter and no reader-count bookkeeping —
//! the client-side attach-and-decode path is out of scope here.

use crate::error::{ShmError, ShmResult};
use datacache_common::shm::consts::{DATACACHE_SHM_MAGIC, SHM_MAX_SIZE, SHM_MIN_SIZE};
use memmap2::MmapMut;
use std::time::{SystemTime, UNIX_EPOCH};

/// Segment header written at offset zero of every mapped segment.
#[repr(C)]
pub struct SegmentHeader {
    /// Magic number for validation.
    pub magic: u64,
    /// Data section size in bytes.
    pub size: u64,
    /// Creation timestamp, nanoseconds since `UNIX_EPOCH`.
    pub created_ts: u64,
}

impl SegmentHeader {
    /// Build a new header for a segment holding `size` bytes of data.
    pub fn new(size: usize) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;

        Self {
            magic: DATACACHE_SHM_MAGIC,
            size: size as u64,
            created_ts: now,
        }
    }

    /// Validate the header magic.
    pub fn validate(&self) -> ShmResult<()> {
        if self.magic != DATACACHE_SHM_MAGIC {
            return Err(ShmError::NotFound {
                name: "invalid magic".to_string(),
            });
        }
        Ok(())
    }
}

/// A mapped shared-memory segment: header followed by the dataset bytes.
pub struct SharedMemorySegment {
    /// Segment name (without the `/dev/shm` path or name prefix).
    pub name: String,
    /// Total mapped size, including the header.
    pub total_size: usize,
    /// Data section size.
    pub data_size: usize,
    mmap: MmapMut,
}

impl SharedMemorySegment {
    /// Wrap a freshly mapped region as a segment, validating the requested
    /// data size.
    pub fn new(name: String, data_size: usize, mmap: MmapMut) -> ShmResult<Self> {
        validate_segment_size(data_size)?;

        Ok(Self {
            name,
            total_size: data_size + std::mem::size_of::<SegmentHeader>(),
            data_size,
            mmap,
        })
    }

    /// Borrow the header.
    pub fn header(&self) -> &SegmentHeader {
        unsafe { &*(self.mmap.as_ptr() as *const SegmentHeader) }
    }

    /// Mutably borrow the header.
    pub fn header_mut(&mut self) -> &mut SegmentHeader {
        unsafe { &mut *(self.mmap.as_mut_ptr() as *mut SegmentHeader) }
    }

    fn data_ptr(&self) -> *const u8 {
        unsafe { self.mmap.as_ptr().add(std::mem::size_of::<SegmentHeader>()) }
    }

    fn data_ptr_mut(&mut self) -> *mut u8 {
        unsafe {
            self.mmap
                .as_mut_ptr()
                .add(std::mem::size_of::<SegmentHeader>())
        }
    }

    /// Borrow the data section.
    pub fn data(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.data_ptr(), self.data_size) }
    }

    /// Mutably borrow the data section.
    pub fn data_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.data_ptr_mut(), self.data_size) }
    }

    /// Flush the mapping to its backing file.
    pub fn flush(&self) -> ShmResult<()> {
        self.mmap.flush()?;
        Ok(())
    }
}

/// Validate that `size` falls within the supported range and is page-aligned.
pub fn validate_segment_size(size: usize) -> ShmResult<()> {
    if size < SHM_MIN_SIZE || size > SHM_MAX_SIZE || size % SHM_MIN_SIZE != 0 {
        return Err(ShmError::InvalidSize { size });
    }
    Ok(())
}
