//! Coordinator state-machine tests driven directly through its public API,
//! without a running loader thread — jobs are observed and resolved by hand
//! via `publish`/`loader_fault`, the same two calls the real loader worker
//! makes, so these exercise the admission/eviction/reclaim logic in
//! isolation from disk I/O and shared-memory segment creation.

use datacache_common::protocol::{Descriptor, Shape};
use datacache_core::{AdmitResult, CacheCoordinator, CheckResult};
use std::sync::mpsc::{sync_channel, Receiver};

fn descriptor_for(id: &str) -> Descriptor {
    Descriptor {
        segment_name: format!("shm_{id}"),
        shape: Shape(vec![1]),
        dtype: "uint8".to_string(),
    }
}

fn write_dataset(dir: &std::path::Path, id: &str, bytes: usize) {
    std::fs::write(dir.join(format!("{id}.bin")), vec![0u8; bytes]).unwrap();
}

fn new_coordinator(
    dir: &std::path::Path,
    capacity: u64,
) -> (CacheCoordinator, Receiver<datacache_core::LoadJob>) {
    let (sender, receiver) = sync_channel(64);
    let coordinator = CacheCoordinator::new(capacity, dir.to_path_buf(), "bin".to_string(), sender);
    (coordinator, receiver)
}

fn drain_one_job(receiver: &Receiver<datacache_core::LoadJob>) -> String {
    receiver.try_recv().expect("expected a load job to be enqueued").id
}

/// A first `REQUEST` for a readable dataset reserves its size,
/// schedules exactly one load job, and returns `Wait`.
#[test]
fn request_schedules_one_job_and_waits() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "a", 40);
    let (coordinator, receiver) = new_coordinator(dir.path(), 1000);

    let result = coordinator.request("a").unwrap();
    assert_eq!(result, AdmitResult::Wait);
    assert_eq!(coordinator.cache_usage(), 40, "reservation counts toward usage before publish");
    drain_one_job(&receiver);
    assert!(receiver.try_recv().is_err(), "only one job should have been enqueued");
}

/// A `REQUEST` for a dataset with no backing file is rejected and leaves no
/// trace in the residency index.
#[test]
fn request_for_missing_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (coordinator, _receiver) = new_coordinator(dir.path(), 1000);

    let err = coordinator.request("missing").unwrap_err();
    assert!(matches!(err, datacache_core::CoordinatorError::DatasetUnavailable { .. }));
    assert_eq!(coordinator.pin("missing"), None);
    assert!(matches!(coordinator.check("missing"), CheckResult::Unknown));
}

/// Concurrent duplicate `REQUEST`s for the same pending id accumulate
/// pins on one scheduled load rather than scheduling a second job.
#[test]
fn duplicate_requests_share_one_load_and_stack_pins() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "x", 16);
    let (coordinator, receiver) = new_coordinator(dir.path(), 1000);

    assert_eq!(coordinator.request("x").unwrap(), AdmitResult::Wait);
    assert_eq!(coordinator.request("x").unwrap(), AdmitResult::Wait);
    assert_eq!(coordinator.pin("x"), Some(2));
    drain_one_job(&receiver);
    assert!(receiver.try_recv().is_err(), "two requests for the same pending id share one job");

    coordinator.publish("x", descriptor_for("x"), 16);
    assert_eq!(coordinator.request("x").unwrap(), AdmitResult::Ready(descriptor_for("x")));
    assert_eq!(coordinator.pin("x"), Some(3));
}

/// `CHECK` never pins, whether the dataset is pending, resident, or unknown.
#[test]
fn check_never_increments_pin() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "a", 16);
    let (coordinator, _receiver) = new_coordinator(dir.path(), 1000);

    coordinator.request("a").unwrap();
    assert_eq!(coordinator.pin("a"), Some(1));
    assert!(matches!(coordinator.check("a"), CheckResult::Wait));
    assert_eq!(coordinator.pin("a"), Some(1), "CHECK must not pin a pending dataset");

    coordinator.publish("a", descriptor_for("a"), 16);
    assert!(matches!(coordinator.check("a"), CheckResult::Ready(_)));
    assert_eq!(coordinator.pin("a"), Some(1), "CHECK must not pin a resident dataset");
}

/// `COMPLETE` for an id with no outstanding pin is rejected and leaves
/// other state untouched.
#[test]
fn complete_without_prior_request_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "a", 16);
    let (coordinator, _receiver) = new_coordinator(dir.path(), 1000);

    coordinator.request("a").unwrap();
    coordinator.publish("a", descriptor_for("a"), 16);

    let err = coordinator.complete("never_requested").unwrap_err();
    assert!(matches!(err, datacache_core::CoordinatorError::NotHeld { .. }));
    assert_eq!(coordinator.pin("a"), Some(1), "unrelated pin must be untouched");
}

/// Once capacity is exhausted by pinned residents, a competing
/// request is queued as demand rather than admitted, and stays `Wait` until
/// room is reclaimed.
#[test]
fn full_capacity_defers_admission_to_demand() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "a", 60);
    write_dataset(dir.path(), "b", 40);
    write_dataset(dir.path(), "c", 40);
    let (coordinator, receiver) = new_coordinator(dir.path(), 100);

    coordinator.request("a").unwrap();
    coordinator.publish("a", descriptor_for("a"), 60);
    drain_one_job(&receiver);

    coordinator.request("b").unwrap();
    coordinator.publish("b", descriptor_for("b"), 40);
    drain_one_job(&receiver);

    assert_eq!(coordinator.request("c").unwrap(), AdmitResult::Wait);
    assert!(receiver.try_recv().is_err(), "c must not be scheduled while both residents are pinned");
    assert!(matches!(coordinator.check("c"), CheckResult::Wait), "c should be tracked as demand");

    coordinator.complete("a").unwrap();
    assert!(matches!(coordinator.check("a"), CheckResult::Unknown), "a should have been evicted");
    let job = drain_one_job(&receiver);
    assert_eq!(job, "c", "reclaim_and_admit should now schedule c");
}

/// While every resident is pinned, demand accumulates indefinitely and
/// never forces an eviction.
#[test]
fn pinned_residents_block_eviction_indefinitely() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "a", 100);
    write_dataset(dir.path(), "b", 10);
    write_dataset(dir.path(), "c", 10);
    let (coordinator, receiver) = new_coordinator(dir.path(), 100);

    coordinator.request("a").unwrap();
    coordinator.publish("a", descriptor_for("a"), 100);
    drain_one_job(&receiver);

    for id in ["b", "c"] {
        assert_eq!(coordinator.request(id).unwrap(), AdmitResult::Wait);
    }
    assert!(receiver.try_recv().is_err(), "no room exists while a stays pinned");
    assert!(matches!(coordinator.check("b"), CheckResult::Wait));
    assert!(matches!(coordinator.check("c"), CheckResult::Wait));
    assert_eq!(coordinator.pin("a"), Some(1), "a's single pin still blocks eviction");
}

/// A failed load (missing file discovered by the loader after scheduling,
/// or a shared-memory fault) reverts the id to `Unknown` rather than
/// leaving it stuck in `Wait` forever.
#[test]
fn loader_fault_reverts_dataset_to_unknown() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "a", 16);
    let (coordinator, receiver) = new_coordinator(dir.path(), 1000);

    coordinator.request("a").unwrap();
    drain_one_job(&receiver);
    coordinator.loader_fault("a");

    assert!(matches!(coordinator.check("a"), CheckResult::Unknown));
    assert_eq!(coordinator.pin("a"), None);
    assert_eq!(coordinator.cache_usage(), 0, "a failed reservation must not linger in usage");
}

/// A loader fault for one id must not disturb an unrelated unpinned
/// resident that happens to sit at the front of the residency heap —
/// `loader_fault` must drop the faulting id's own entry, not whatever the
/// heap's extremum happens to be.
#[test]
fn loader_fault_does_not_orphan_an_unrelated_resident() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "b", 16);
    write_dataset(dir.path(), "a", 16);
    write_dataset(dir.path(), "c", 16);
    let (coordinator, receiver) = new_coordinator(dir.path(), 32);

    coordinator.request("b").unwrap();
    coordinator.publish("b", descriptor_for("b"), 16);
    drain_one_job(&receiver);
    coordinator.complete("b").unwrap();
    assert_eq!(coordinator.pin("b"), Some(0), "b is resident but unpinned");

    coordinator.request("a").unwrap();
    drain_one_job(&receiver);
    coordinator.loader_fault("a");

    assert!(matches!(coordinator.check("a"), CheckResult::Unknown));
    assert!(
        matches!(coordinator.check("b"), CheckResult::Ready(_)),
        "b must still be resident and reachable after a's fault"
    );
    assert_eq!(coordinator.cache_usage(), 16, "only b's bytes should remain accounted for");

    // Requesting c fills the remaining 16 bytes of capacity; b must still be
    // evictable through the normal reclaim path once c later needs its room
    // too, proving b's residency-index entry (not just its registry entry)
    // survived the earlier fault.
    assert_eq!(coordinator.request("c").unwrap(), AdmitResult::Wait);
    drain_one_job(&receiver);
    coordinator.publish("c", descriptor_for("c"), 16);
    coordinator.complete("c").unwrap();

    assert_eq!(coordinator.request("a").unwrap(), AdmitResult::Wait);
    let evicted = drain_one_job(&receiver);
    assert_eq!(evicted, "a", "a is reloaded; b (the oldest unpinned resident) must have been evicted to make room");
    assert!(matches!(coordinator.check("b"), CheckResult::Unknown), "b should now be evicted, not orphaned-but-stuck");
}

/// A duplicate `REQUEST` for an id already waiting on capacity (tracked in
/// `demand`, not yet reserved) must stack onto that demand entry rather
/// than attempting a fresh reservation, which would otherwise leave the id
/// tracked in both `demand` and `residency` once capacity frees up.
#[test]
fn duplicate_request_while_pending_demand_stacks_rather_than_double_admits() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "a", 50);
    write_dataset(dir.path(), "big", 50);
    let (coordinator, receiver) = new_coordinator(dir.path(), 50);

    coordinator.request("a").unwrap();
    drain_one_job(&receiver);

    assert_eq!(coordinator.request("big").unwrap(), AdmitResult::Wait);
    assert!(receiver.try_recv().is_err(), "big has no room yet and must only be tracked as demand");
    assert_eq!(coordinator.request("big").unwrap(), AdmitResult::Wait);
    assert!(receiver.try_recv().is_err(), "a second request for a still-pending id must not trigger a reservation");

    coordinator.publish("a", descriptor_for("a"), 50);
    coordinator.complete("a").unwrap();
    assert!(matches!(coordinator.check("a"), CheckResult::Unknown), "a's only pin dropped to zero and must be reclaimed to free room for big");
    assert_eq!(drain_one_job(&receiver), "big", "freed capacity must admit the accumulated demand for big");
    assert_eq!(coordinator.pin("big"), Some(2), "both earlier requests' pins must have carried over");
}

/// `shutdown` drains every resident entry from the registry.
#[test]
fn shutdown_clears_residents() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "a", 16);
    write_dataset(dir.path(), "b", 16);
    let (coordinator, receiver) = new_coordinator(dir.path(), 1000);

    coordinator.request("a").unwrap();
    coordinator.publish("a", descriptor_for("a"), 16);
    drain_one_job(&receiver);
    coordinator.request("b").unwrap();
    coordinator.publish("b", descriptor_for("b"), 16);
    drain_one_job(&receiver);

    coordinator.shutdown();
    assert_eq!(coordinator.cache_usage(), 0);
    assert!(matches!(coordinator.check("a"), CheckResult::Unknown));
    assert!(matches!(coordinator.check("b"), CheckResult::Unknown));
}

/// The loader's idempotency guard: a redundant job for an id already
/// published must be a safe no-op from the coordinator's point of view.
#[test]
fn is_resident_reflects_publish_state() {
    let dir = tempfile::tempdir().unwrap();
    write_dataset(dir.path(), "a", 16);
    let (coordinator, receiver) = new_coordinator(dir.path(), 1000);

    coordinator.request("a").unwrap();
    drain_one_job(&receiver);
    assert!(!coordinator.is_resident("a"));

    coordinator.publish("a", descriptor_for("a"), 16);
    assert!(coordinator.is_resident("a"));
}
