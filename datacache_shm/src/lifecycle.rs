//! Segment teardown: unlinking `/dev/shm` files on eviction or shutdown.

use crate::error::ShmResult;
use datacache_common::shm::consts::SHM_NAME_PREFIX;

/// Remove the backing `/dev/shm` file for `name`, if present.
///
/// Used by the eviction path (a segment loses its last pin and is reclaimed)
/// and by the lifecycle guard's shutdown sequence (every resident segment is
/// unlinked before the daemon exits).
pub fn unlink_segment(name: &str) -> ShmResult<()> {
    let path = format!("/dev/shm/{SHM_NAME_PREFIX}{name}");
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
