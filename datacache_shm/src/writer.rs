//! Single-writer segment creation: the loader worker's path for publishing a
//! dataset into shared memory.
//!
//! A segment is written exactly once. [`SegmentWriter::create_or_adopt`]
//! either creates a fresh `/dev/shm` file or, if one already exists under
//! this name, adopts it: a previous daemon run must have crashed before
//! unlinking its segments, so the leftover file is resized and reused rather
//! than treated as a live conflict (there is only ever one writer process in
//! this model).

use crate::error::{ShmError, ShmResult};
use crate::platform::{create_segment_mmap, resize_and_attach_mmap};
use crate::segment::{SegmentHeader, SharedMemorySegment, validate_segment_size};
use datacache_common::shm::consts::SHM_NAME_PREFIX;

fn segment_path(name: &str) -> String {
    format!("/dev/shm/{SHM_NAME_PREFIX}{name}")
}

/// Exclusive write handle used to create (or adopt) and populate a segment.
pub struct SegmentWriter {
    segment: SharedMemorySegment,
}

impl SegmentWriter {
    /// Create a new segment for `name` sized to hold `size` bytes of data,
    /// adopting and resizing a stale leftover segment if one is found.
    pub fn create_or_adopt(name: &str, size: usize) -> ShmResult<Self> {
        validate_segment_size(size)?;

        let path = segment_path(name);
        let total_size = size + std::mem::size_of::<SegmentHeader>();

        let mut mmap = match create_segment_mmap(&path, total_size) {
            Ok(mmap) => mmap,
            Err(ShmError::Io { source }) if source.kind() == std::io::ErrorKind::AlreadyExists => {
                resize_and_attach_mmap(&path, total_size)?
            }
            Err(e) => return Err(e),
        };

        {
            let header = unsafe { &mut *(mmap.as_mut_ptr() as *mut SegmentHeader) };
            *header = SegmentHeader::new(size);
        }

        let segment = SharedMemorySegment::new(name.to_string(), size, mmap)?;
        Ok(Self { segment })
    }

    /// Copy `data` into the segment's data section and flush it to
    /// `/dev/shm`. The segment is immutable to readers from this point on.
    pub fn write(&mut self, data: &[u8]) -> ShmResult<()> {
        if data.len() > self.segment.data_size {
            return Err(ShmError::InvalidSize { size: data.len() });
        }

        self.segment.data_mut()[..data.len()].copy_from_slice(data);
        self.segment.flush()
    }

    /// Segment name as published in the registry.
    pub fn name(&self) -> &str {
        &self.segment.name
    }

    /// Data section size in bytes.
    pub fn data_size(&self) -> usize {
        self.segment.data_size
    }

    /// OS-visible segment path under `/dev/shm`.
    pub fn path(&self) -> String {
        segment_path(&self.segment.name)
    }

    /// The POSIX shared-memory object name reported to clients, e.g.
    /// `/shm_2024-01-01_trades`.
    pub fn shm_name(&self) -> String {
        format!("/{SHM_NAME_PREFIX}{}", self.segment.name)
    }
}
