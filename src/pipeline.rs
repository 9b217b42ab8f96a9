//! Producer/consumer task harnesses shared by ingest and query.
//!
//! Ingest runs a bounded pipeline: one task scans the tar file and feeds a
//! fixed-capacity channel, a pool of worker tasks upload alert bytes to the
//! blob store concurrently, and a single task applies index writes
//! serially so `kvtable::Table::append`'s read-modify-write never races
//! against itself for the same key. Query runs the mirror image: an
//! unbounded URL queue feeds a worker pool that downloads and decodes
//! alerts, pushing results onto an unbounded result queue the caller drains
//! in submission order... except ordering isn't actually preserved across
//! workers, so callers that need input order must re-sort by candidate id.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::{AlertbaseError, Result};

/// Bounded channel capacity between the tar scanner and the upload workers.
/// Matches the natural backpressure point: once this many alerts are
/// buffered waiting for an uploader, the scanner blocks rather than reading
/// the whole tarfile into memory.
pub const INGEST_QUEUE_CAPACITY: usize = 100;

/// One scanned alert, queued for upload.
pub struct PendingUpload {
    pub candidate_id: u64,
    pub object_id: String,
    pub pixel: u64,
    pub unix_nanos: u64,
    pub raw_bytes: Vec<u8>,
}

/// Runs `scan` (which pushes `PendingUpload`s into the returned sender) and
/// `upload` (one per worker, consuming uploads and reporting index writes
/// through the returned receiver) concurrently with a single downstream
/// index-writer loop described by the caller, per spec: scan -> bounded
/// queue -> N upload workers -> single-writer index apply.
///
/// `scan_fn` drives the producer side, `upload_fn` is cloned onto each of
/// `worker_count` tasks and called once per queued item, and `on_uploaded`
/// is invoked serially (never concurrently) on this task for each
/// successful upload, in arrival order from whichever worker finishes
/// first.
pub async fn run_ingest_pipeline<S, U, O>(
    worker_count: usize,
    scan_fn: S,
    upload_fn: U,
    mut on_uploaded: O,
) -> Result<u64>
where
    S: FnOnce(mpsc::Sender<PendingUpload>) -> Result<()> + Send + 'static,
    U: Fn(PendingUpload) -> futures_core::future::BoxFuture<'static, Result<(String, PendingUpload)>>
        + Send
        + Sync
        + 'static,
    O: FnMut(String, PendingUpload) -> Result<()>,
{
    let (tx, rx) = mpsc::channel::<PendingUpload>(INGEST_QUEUE_CAPACITY);
    let rx = Arc::new(tokio::sync::Mutex::new(rx));
    let upload_fn = Arc::new(upload_fn);

    let scan_task = tokio::task::spawn_blocking(move || scan_fn(tx));

    let (result_tx, mut result_rx) = mpsc::unbounded_channel::<Result<(String, PendingUpload)>>();

    let mut worker_handles = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let rx = Arc::clone(&rx);
        let upload_fn = Arc::clone(&upload_fn);
        let result_tx = result_tx.clone();
        worker_handles.push(tokio::spawn(async move {
            loop {
                let item = {
                    let mut guard = rx.lock().await;
                    guard.recv().await
                };
                let Some(item) = item else {
                    break;
                };
                let result = upload_fn(item).await;
                if result_tx.send(result).is_err() {
                    break;
                }
            }
        }));
    }
    drop(result_tx);

    let mut uploaded = 0u64;
    while let Some(result) = result_rx.recv().await {
        let (url, item) = result?;
        on_uploaded(url, item)?;
        uploaded += 1;
    }

    for handle in worker_handles {
        handle.await.map_err(|_| AlertbaseError::PipelineCanceled)?;
    }
    scan_task
        .await
        .map_err(|_| AlertbaseError::PipelineCanceled)??;

    info!(uploaded, "ingest pipeline complete");
    Ok(uploaded)
}

/// Runs a query fan-out: each item in `items` (e.g. a URL or candidate id)
/// is resolved by one of `worker_count` concurrent tasks, with results
/// delivered back through an unbounded channel in completion order (not
/// necessarily the order `items` was given in).
pub async fn run_query_pipeline<I, F, T>(
    items: Vec<I>,
    worker_count: usize,
    fetch_fn: F,
) -> Result<Vec<T>>
where
    I: Send + 'static,
    F: Fn(I) -> futures_core::future::BoxFuture<'static, Result<T>> + Send + Sync + 'static,
    T: Send + 'static,
{
    let fetch_fn = Arc::new(fetch_fn);
    let item_count = items.len();
    let (work_tx, work_rx) = mpsc::unbounded_channel::<I>();
    let work_rx = Arc::new(tokio::sync::Mutex::new(work_rx));

    for item in items {
        if work_tx.send(item).is_err() {
            warn!("query work queue closed early");
        }
    }
    drop(work_tx);

    let (result_tx, mut result_rx) = mpsc::unbounded_channel::<Result<T>>();

    let mut handles = Vec::with_capacity(worker_count);
    for _ in 0..worker_count.max(1) {
        let work_rx = Arc::clone(&work_rx);
        let fetch_fn = Arc::clone(&fetch_fn);
        let result_tx = result_tx.clone();
        handles.push(tokio::spawn(async move {
            loop {
                let id = {
                    let mut guard = work_rx.lock().await;
                    guard.recv().await
                };
                let Some(id) = id else {
                    break;
                };
                let result = fetch_fn(id).await;
                if result_tx.send(result).is_err() {
                    break;
                }
            }
        }));
    }
    drop(result_tx);

    let mut out = Vec::with_capacity(item_count);
    while let Some(result) = result_rx.recv().await {
        out.push(result?);
    }

    for handle in handles {
        handle.await.map_err(|_| AlertbaseError::PipelineCanceled)?;
    }

    Ok(out)
}
