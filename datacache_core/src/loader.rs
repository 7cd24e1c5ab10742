//! The background loader worker: the only component that touches disk or
//! creates shared-memory segments. A single thread drains a bounded job
//! queue and publishes into the registry through the coordinator.

use crate::coordinator::{CacheCoordinator, LoadJob};
use datacache_common::protocol::{Descriptor, Shape};
use datacache_shm::SegmentWriter;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, sync_channel};
use std::thread::JoinHandle;
use std::time::Duration;

/// Turns a raw dataset buffer into a (shape, dtype) descriptor pair.
///
/// The on-disk file format itself is out of scope here — this is the one
/// seam a real deployment would replace with an actual tabular decoder
/// (parquet, arrow, ...). The default simply reports the buffer as a flat
/// vector of `float64` when the byte count is a multiple of 8, or raw
/// `uint8` bytes otherwise, matching the dtype strings the original
/// `pandas`/`numpy` pipeline this was distilled from would produce for
/// numeric data absent richer metadata.
pub trait DatasetDecoder: Send + Sync {
    /// Infer shape and element type from the raw file bytes.
    fn decode(&self, bytes: &[u8]) -> (Shape, String);
}

/// The default, format-agnostic decoder described on [`DatasetDecoder`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RawBytesDecoder;

impl DatasetDecoder for RawBytesDecoder {
    fn decode(&self, bytes: &[u8]) -> (Shape, String) {
        if !bytes.is_empty() && bytes.len() % 8 == 0 {
            (Shape(vec![(bytes.len() / 8) as u64]), "float64".to_string())
        } else {
            (Shape(vec![bytes.len() as u64]), "uint8".to_string())
        }
    }
}

/// A running loader worker, owning its stop flag and join handle.
pub struct LoaderHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl LoaderHandle {
    /// Signal the worker to stop after its current job (if any) and join
    /// it, waiting at most `timeout`. In-flight work is never published
    /// past the stop signal.
    pub fn shutdown(mut self, timeout: Duration) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            let _ = join_with_timeout(join, timeout);
        }
    }
}

fn join_with_timeout(join: JoinHandle<()>, timeout: Duration) -> Result<(), ()> {
    // std::thread has no native join-with-timeout; the worker's own
    // recv_timeout loop bounds how long it can be mid-wait, so a short
    // sleep-and-check here is sufficient without spinning.
    let deadline = std::time::Instant::now() + timeout;
    let mut handle = Some(join);
    while std::time::Instant::now() < deadline {
        if handle.as_ref().map(JoinHandle::is_finished).unwrap_or(true) {
            break;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    if let Some(h) = handle.take() {
        let _ = h.join();
    }
    Ok(())
}

/// Spawn the loader worker, returning a job-queue sender paired with the
/// coordinator and a handle for shutdown.
///
/// `queue_bound` is the bounded FIFO's capacity. Convenience wrapper over
/// [`spawn_with_receiver`] for callers (tests, mainly) that don't need to
/// hand the sender to a coordinator constructed beforehand.
pub fn spawn(
    coordinator: Arc<CacheCoordinator>,
    data_path: std::path::PathBuf,
    dataset_extension: String,
    decoder: Arc<dyn DatasetDecoder>,
    queue_bound: usize,
) -> (LoaderHandle, SyncSender<LoadJob>) {
    let (sender, receiver) = sync_channel(queue_bound.max(1));
    let handle = spawn_with_receiver(coordinator, receiver, data_path, dataset_extension, decoder);
    (handle, sender)
}

/// Spawn the loader worker over a job queue whose sender already lives
/// somewhere else — the usual case, since the coordinator needs the sender
/// at construction time, before the loader thread exists to consume it.
pub fn spawn_with_receiver(
    coordinator: Arc<CacheCoordinator>,
    receiver: Receiver<LoadJob>,
    data_path: std::path::PathBuf,
    dataset_extension: String,
    decoder: Arc<dyn DatasetDecoder>,
) -> LoaderHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let worker_stop = Arc::clone(&stop);

    let join = std::thread::spawn(move || {
        run(
            coordinator,
            receiver,
            worker_stop,
            data_path,
            dataset_extension,
            decoder,
        )
    });

    LoaderHandle {
        stop,
        join: Some(join),
    }
}

fn run(
    coordinator: Arc<CacheCoordinator>,
    receiver: Receiver<LoadJob>,
    stop: Arc<AtomicBool>,
    data_path: std::path::PathBuf,
    dataset_extension: String,
    decoder: Arc<dyn DatasetDecoder>,
) {
    while !stop.load(Ordering::SeqCst) {
        let job = match receiver.recv_timeout(Duration::from_secs(1)) {
            Ok(job) => job,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        load_one(&coordinator, &data_path, &dataset_extension, decoder.as_ref(), &job.id);
    }
}

fn load_one(
    coordinator: &CacheCoordinator,
    data_path: &std::path::Path,
    dataset_extension: &str,
    decoder: &dyn DatasetDecoder,
    id: &str,
) {
    if coordinator.is_resident(id) {
        // Already published by a prior job for the same id (two concurrent
        // `REQUEST`s schedule at most one load, but a stale queued job can
        // still arrive after a publish) — idempotent drop.
        tracing::debug!(id, "dataset already resident, dropping redundant load job");
        return;
    }

    let path = data_path.join(format!("{id}.{dataset_extension}"));

    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(id, path = %path.display(), error = %e, "failed to read dataset file");
            coordinator.loader_fault(id);
            return;
        }
    };

    let (shape, dtype) = decoder.decode(&bytes);
    let segment_size = datacache_common::shm::consts::page_align(bytes.len().max(1));

    let mut writer = match SegmentWriter::create_or_adopt(id, segment_size) {
        Ok(writer) => writer,
        Err(e) => {
            tracing::error!(id, error = %e, "failed to create shared-memory segment");
            coordinator.loader_fault(id);
            return;
        }
    };

    if let Err(e) = writer.write(&bytes) {
        tracing::error!(id, error = %e, "failed to write dataset into shared-memory segment");
        coordinator.loader_fault(id);
        return;
    }

    let descriptor = Descriptor {
        segment_name: writer.shm_name(),
        shape,
        dtype,
    };

    tracing::info!(id, segment = %descriptor.segment_name, bytes = bytes.len(), "loaded dataset into shared memory");
    coordinator.publish(id, descriptor, bytes.len() as u64);
}
