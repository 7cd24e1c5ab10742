//! The cache coordinator's core: priority index, segment registry, loader
//! worker, and the coordinator state machine tying them together.
//!
//! # Module Structure
//!
//! - [`priority_index`] - keyed dual-orientation priority structure
//! - [`registry`] - dataset identifier → segment descriptor map
//! - [`loader`] - the background worker that materializes datasets
//! - [`coordinator`] - admission, eviction, and pin bookkeeping

pub mod coordinator;
pub mod loader;
pub mod priority_index;
pub mod registry;

pub use coordinator::{AdmitResult, CacheCoordinator, CheckResult, CoordinatorError, LoadJob};
pub use loader::{DatasetDecoder, LoaderHandle, RawBytesDecoder};
pub use priority_index::{Orientation, PriorityIndex, PriorityIndexError};
pub use registry::SegmentRegistry;
