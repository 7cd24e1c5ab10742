//! The cache coordinator: admission, eviction, capacity accounting, and pin
//! bookkeeping, all behind one mutex. All disk I/O and segment creation
//! happens in the loader worker, outside this lock — the coordinator only
//! ever does cheap map/heap bookkeeping while holding it.

use crate::priority_index::{Orientation, PriorityIndex};
use crate::registry::SegmentRegistry;
use datacache_common::protocol::Descriptor;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::mpsc::{SyncSender, TrySendError};
use thiserror::Error;

/// Errors surfaced by coordinator operations. The request server maps all
/// of these onto `INVALID_REQUEST` — none of them are fatal.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// `COMPLETE` (or an internal decrement) for an id with no outstanding pin.
    #[error("dataset {id} has no outstanding reference")]
    NotHeld {
        /// Dataset identifier.
        id: String,
    },

    /// The on-disk dataset file could not be stat'd at admission time.
    #[error("dataset {id} is unavailable: {source}")]
    DatasetUnavailable {
        /// Dataset identifier.
        id: String,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },

    /// The loader worker has shut down; no further jobs can be scheduled.
    #[error("loader queue is closed")]
    LoaderQueueClosed,
}

/// Outcome of `request`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmitResult {
    /// The dataset is already resident; pin was incremented.
    Ready(Descriptor),
    /// Not yet resident; client should poll with `CHECK`.
    Wait,
}

/// Outcome of `check`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    /// Resident; `CHECK` never pins.
    Ready(Descriptor),
    /// Scheduled or pending.
    Wait,
    /// Never requested, or its load failed.
    Unknown,
}

struct State {
    registry: SegmentRegistry,
    residency: PriorityIndex<String>,
    demand: PriorityIndex<String>,
    reserved: std::collections::HashMap<String, u64>,
}

impl State {
    fn cache_usage(&self) -> u64 {
        self.registry.cache_usage() + self.reserved.values().sum::<u64>()
    }
}

/// A job handed to the loader worker: materialize `id` into shared memory.
#[derive(Debug, Clone)]
pub struct LoadJob {
    /// Dataset identifier to load.
    pub id: String,
}

/// The single mutex-guarded admission/eviction state machine.
///
/// Only the three facts admission actually needs are held directly
/// (capacity, data root, extension) rather than the whole
/// [`datacache_common::config::DaemonConfig`] — this keeps the coordinator
/// constructible in isolation for tests with an arbitrary byte capacity,
/// independent of the config's GiB-granular `cache_size` field.
pub struct CacheCoordinator {
    state: Mutex<State>,
    job_sender: SyncSender<LoadJob>,
    capacity_bytes: u64,
    data_path: PathBuf,
    dataset_extension: String,
}

impl CacheCoordinator {
    /// Build a coordinator over an empty cache, sending load jobs on
    /// `job_sender`. Datasets resolve to `<data_path>/<id>.<dataset_extension>`.
    pub fn new(
        capacity_bytes: u64,
        data_path: PathBuf,
        dataset_extension: String,
        job_sender: SyncSender<LoadJob>,
    ) -> Self {
        Self {
            state: Mutex::new(State {
                registry: SegmentRegistry::new(),
                residency: PriorityIndex::new(Orientation::MinOnWeight),
                demand: PriorityIndex::new(Orientation::MaxOnWeight),
                reserved: std::collections::HashMap::new(),
            }),
            job_sender,
            capacity_bytes,
            data_path,
            dataset_extension,
        }
    }

    /// The on-disk path datasets resolve to (mirrors
    /// [`datacache_common::config::DaemonConfig::dataset_path`]).
    pub fn dataset_path(&self, id: &str) -> PathBuf {
        self.data_path.join(format!("{id}.{}", self.dataset_extension))
    }

    fn reserve_size(&self, id: &str) -> Result<u64, CoordinatorError> {
        std::fs::metadata(self.dataset_path(id))
            .map(|m| m.len())
            .map_err(|source| CoordinatorError::DatasetUnavailable {
                id: id.to_string(),
                source,
            })
    }

    fn enqueue(&self, id: &str) -> Result<(), CoordinatorError> {
        match self.job_sender.try_send(LoadJob { id: id.to_string() }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Disconnected(_)) => Err(CoordinatorError::LoaderQueueClosed),
            Err(TrySendError::Full(_)) => {
                // The job queue is a bounded FIFO; a full queue means the
                // loader is behind. Block until there's room rather than
                // drop the job or fail the request.
                self.job_sender
                    .send(LoadJob { id: id.to_string() })
                    .map_err(|_| CoordinatorError::LoaderQueueClosed)
            }
        }
    }

    /// `REQUEST#<id>` — admission.
    pub fn request(&self, id: &str) -> Result<AdmitResult, CoordinatorError> {
        let mut state = self.state.lock();

        if let Some(descriptor) = state.registry.get(id) {
            let descriptor = descriptor.clone();
            state
                .residency
                .adjust(&id.to_string(), 1)
                .expect("residency weight for a resident id cannot go negative on increment");
            return Ok(AdmitResult::Ready(descriptor));
        }

        if state.residency.contains(&id.to_string()) {
            state
                .residency
                .adjust(&id.to_string(), 1)
                .expect("residency weight for a scheduled id cannot go negative on increment");
            return Ok(AdmitResult::Wait);
        }

        if state.demand.contains(&id.to_string()) {
            // Already waiting for capacity; stack onto that demand entry
            // rather than re-reserving, which would leave the id tracked in
            // both `demand` and `residency` at once.
            state
                .demand
                .adjust(&id.to_string(), 1)
                .expect("demand weight saturates at zero, never errors on increment");
            return Ok(AdmitResult::Wait);
        }

        let reserve = self.reserve_size(id)?;
        if state.cache_usage() + reserve <= self.capacity_bytes {
            state.reserved.insert(id.to_string(), reserve);
            state.residency.insert_or_update(id.to_string(), 1);
            drop(state);
            self.enqueue(id)?;
            return Ok(AdmitResult::Wait);
        }

        state
            .demand
            .adjust(&id.to_string(), 1)
            .expect("demand weight saturates at zero, never errors on increment");
        let to_schedule = self.reclaim_and_admit(&mut state);
        drop(state);
        self.enqueue_many(to_schedule);
        Ok(AdmitResult::Wait)
    }

    /// `CHECK#<id>` — pure poll, never pins.
    pub fn check(&self, id: &str) -> CheckResult {
        let state = self.state.lock();
        if let Some(descriptor) = state.registry.get(id) {
            return CheckResult::Ready(descriptor.clone());
        }
        if state.residency.contains(&id.to_string()) || state.demand.contains(&id.to_string()) {
            return CheckResult::Wait;
        }
        CheckResult::Unknown
    }

    /// `COMPLETE#<id>` — release one pin.
    pub fn complete(&self, id: &str) -> Result<(), CoordinatorError> {
        let mut state = self.state.lock();
        state
            .residency
            .adjust(&id.to_string(), -1)
            .map_err(|_| CoordinatorError::NotHeld { id: id.to_string() })?;
        let to_schedule = self.reclaim_and_admit(&mut state);
        drop(state);
        self.enqueue_many(to_schedule);
        Ok(())
    }

    /// Evict unpinned residents and reserve room for pending demand while
    /// capacity allows. Called with the lock held; returns the ids now
    /// reserved so the caller can enqueue their load jobs after releasing
    /// the lock — enqueuing can block on a full job queue, and no
    /// coordinator operation may suspend while holding it.
    fn reclaim_and_admit(&self, state: &mut State) -> Vec<String> {
        while !state.demand.is_empty() {
            let Some((front_id, front_weight)) = state.residency.peek() else {
                break;
            };
            if front_weight != 0 {
                break;
            }
            if !state.registry.contains(&front_id) {
                // Still mid-load (pin dropped to 0 before publish); not
                // evictable yet — nothing else at the front can change
                // that, so stop rather than spin.
                break;
            }
            if let Some(descriptor) = state.registry.remove(&front_id) {
                if let Err(e) = datacache_shm::unlink_segment(&front_id) {
                    tracing::warn!(id = %front_id, error = %e, "failed to unlink evicted segment");
                }
                tracing::debug!(id = %front_id, segment = %descriptor.segment_name, "evicted");
            }
            state.residency.pop();
        }

        let mut to_schedule = Vec::new();
        while !state.demand.is_empty()
            && state.cache_usage() < self.capacity_bytes
        {
            let Some((id, weight)) = state.demand.pop() else {
                break;
            };
            match self.reserve_size(&id) {
                Ok(reserve) => {
                    state.reserved.insert(id.clone(), reserve);
                    state.residency.insert_or_update(id.clone(), weight);
                    to_schedule.push(id);
                }
                Err(e) => {
                    tracing::error!(id = %id, error = %e, "dropping pending request for unreadable dataset");
                }
            }
        }

        to_schedule
    }

    /// Enqueue each reclaimed id's load job outside the coordinator lock.
    /// A failure (the loader queue has been torn down) reverts that id's
    /// reservation rather than surfacing to an unrelated caller — the
    /// request or completion that triggered this reclaim pass has already
    /// succeeded by the time this runs.
    fn enqueue_many(&self, ids: Vec<String>) {
        for id in ids {
            if let Err(e) = self.enqueue(&id) {
                tracing::error!(id = %id, error = %e, "failed to enqueue reclaimed admission, reverting reservation");
                let mut state = self.state.lock();
                state.reserved.remove(&id);
                state.residency.remove(&id.to_string());
            }
        }
    }

    /// Called by the loader worker once a segment is fully written.
    pub fn publish(&self, id: &str, descriptor: Descriptor, actual_size: u64) {
        let mut state = self.state.lock();
        state.reserved.remove(id);
        state.registry.insert(id.to_string(), descriptor, actual_size);
        let to_schedule = self.reclaim_and_admit(&mut state);
        drop(state);
        self.enqueue_many(to_schedule);
    }

    /// Called by the loader worker when a scheduled load fails (missing or
    /// unreadable file, or a shared-memory fault). The identifier reverts
    /// to `Unknown` for subsequent `CHECK`s.
    pub fn loader_fault(&self, id: &str) {
        let mut state = self.state.lock();
        state.reserved.remove(id);
        // Drop the id's own entry, not whatever happens to be at the
        // residency heap's front — `pop()` removes the extremum, which on
        // a fault with other unpinned residents present would delete a
        // live resident's index entry instead, orphaning it in the
        // registry forever.
        state.residency.remove(&id.to_string());
        tracing::error!(id = %id, "load failed, dataset reverted to unknown");
        // The bytes this id had reserved are now free; let any pending
        // demand take the room rather than waiting for the next
        // request/complete/publish to notice.
        let to_schedule = self.reclaim_and_admit(&mut state);
        drop(state);
        self.enqueue_many(to_schedule);
    }

    /// Unlink every resident segment and drain the registry. Used by the
    /// lifecycle guard during shutdown.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        let ids: Vec<String> = state.registry.ids().map(str::to_string).collect();
        for id in ids {
            if state.registry.remove(&id).is_some() {
                if let Err(e) = datacache_shm::unlink_segment(&id) {
                    tracing::warn!(id = %id, error = %e, "failed to unlink segment during shutdown");
                }
            }
        }
    }

    /// Current cache usage in bytes, including in-flight reservations.
    pub fn cache_usage(&self) -> u64 {
        self.state.lock().cache_usage()
    }

    /// Current pin (residency weight) for `id`, or `None` if not tracked.
    pub fn pin(&self, id: &str) -> Option<u64> {
        self.state.lock().residency.weight(&id.to_string())
    }

    /// Whether `id` is already published in the registry. The loader checks
    /// this before doing any work, to drop a job made redundant by an
    /// earlier publish.
    pub fn is_resident(&self, id: &str) -> bool {
        self.state.lock().registry.contains(id)
    }
}
