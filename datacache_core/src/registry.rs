//! Dataset identifier → segment descriptor map, owned exclusively by the
//! coordinator behind its mutex (no `Clone`/shared access — segment
//! discovery state stays private to its owning component rather than a
//! freely shared type).

use datacache_common::protocol::Descriptor;
use std::collections::HashMap;

struct ResidentEntry {
    descriptor: Descriptor,
    size: u64,
}

/// The set of datasets currently materialized in shared memory.
#[derive(Default)]
pub struct SegmentRegistry {
    entries: HashMap<String, ResidentEntry>,
    cache_usage: u64,
}

impl SegmentRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The published descriptor for `id`, if resident.
    pub fn get(&self, id: &str) -> Option<&Descriptor> {
        self.entries.get(id).map(|e| &e.descriptor)
    }

    /// Whether `id` is resident.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Insert a newly published segment, adding `size` to `cache_usage`.
    /// Only the loader worker should call this, after the segment is fully
    /// written.
    pub fn insert(&mut self, id: String, descriptor: Descriptor, size: u64) {
        self.entries.insert(id, ResidentEntry { descriptor, size });
        self.cache_usage += size;
    }

    /// Remove a resident segment's descriptor, subtracting its size from
    /// `cache_usage`. Only the coordinator's eviction path should call
    /// this, after unlinking the OS segment.
    pub fn remove(&mut self, id: &str) -> Option<Descriptor> {
        let entry = self.entries.remove(id)?;
        self.cache_usage -= entry.size;
        Some(entry.descriptor)
    }

    /// Total bytes occupied by resident (published) segments.
    pub fn cache_usage(&self) -> u64 {
        self.cache_usage
    }

    /// Number of resident datasets.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry holds no resident datasets.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over resident dataset identifiers, for shutdown teardown.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
