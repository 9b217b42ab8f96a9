//! The top-level facade binding the index store, blob store, and manifest
//! into the ingest and query operations callers actually use.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::blobstore::{BlobStore, DEFAULT_MAX_CONCURRENCY};
use crate::codec::timestamp;
use crate::error::{AlertbaseError, Result};
use crate::index::IndexStore;
use crate::manifest::Manifest;
use crate::pipeline::{self, PendingUpload};
use crate::record::{AlertRecord, Position};
use crate::spatial;
use crate::tar_reader::TarAlertReader;

/// The fixed HEALPix order new databases are created with. Promoted to a
/// manifest field (see `Manifest::healpix_order`) so a reader need not
/// assume this constant never changes across builds.
pub const DEFAULT_HEALPIX_ORDER: u8 = 12;

pub struct Database {
    root: PathBuf,
    index: Arc<IndexStore>,
    blobstore: Arc<BlobStore>,
    manifest: Manifest,
    healpix_order: u8,
    any_writes: bool,
}

impl Database {
    /// Opens an existing database at `db_root`. Fails with
    /// `DatabaseNotFound` if the directory or its manifest is absent.
    pub async fn open(db_root: impl AsRef<Path>, s3_region: &str) -> Result<Self> {
        let root = db_root.as_ref().to_path_buf();
        let manifest = Manifest::load(&root)?
            .ok_or_else(|| AlertbaseError::DatabaseNotFound(root.display().to_string()))?;

        let index = Arc::new(IndexStore::open(&root)?);
        let blobstore = Arc::new(
            BlobStore::connect(s3_region, &manifest.s3_bucket, DEFAULT_MAX_CONCURRENCY).await,
        );
        let healpix_order = manifest.healpix_order;

        Ok(Self {
            root,
            index,
            blobstore,
            manifest,
            healpix_order,
            any_writes: false,
        })
    }

    /// Opens an existing database at `db_root` using a caller-supplied blob
    /// store rather than connecting to real S3. Exists so tests (and any
    /// other embedder that already manages its own S3 client) can swap in a
    /// fake [`crate::blobstore::ObjectTransport`] without touching the
    /// network.
    pub async fn open_with_blobstore(
        db_root: impl AsRef<Path>,
        blobstore: BlobStore,
    ) -> Result<Self> {
        let root = db_root.as_ref().to_path_buf();
        let manifest = Manifest::load(&root)?
            .ok_or_else(|| AlertbaseError::DatabaseNotFound(root.display().to_string()))?;

        let index = Arc::new(IndexStore::open(&root)?);
        let healpix_order = manifest.healpix_order;

        Ok(Self {
            root,
            index,
            blobstore: Arc::new(blobstore),
            manifest,
            healpix_order,
            any_writes: false,
        })
    }

    /// Creates a fresh database at `db_root`. Fails with `DatabaseExists` if
    /// a manifest is already present there.
    pub async fn create(
        db_root: impl AsRef<Path>,
        s3_bucket: &str,
        s3_region: &str,
        healpix_order: u8,
    ) -> Result<Self> {
        let root = db_root.as_ref().to_path_buf();
        if Manifest::load(&root)?.is_some() {
            return Err(AlertbaseError::DatabaseExists(root.display().to_string()));
        }
        std::fs::create_dir_all(&root)?;

        let manifest = Manifest::new(s3_bucket.to_string(), s3_region.to_string(), healpix_order);
        manifest.write(&root)?;

        let index = Arc::new(IndexStore::open(&root)?);
        let blobstore =
            Arc::new(BlobStore::connect(s3_region, s3_bucket, DEFAULT_MAX_CONCURRENCY).await);

        Ok(Self {
            root,
            index,
            blobstore,
            manifest,
            healpix_order,
            any_writes: false,
        })
    }

    /// Recomputes and rewrites the manifest if any write occurred during
    /// this session, per the lifecycle rule in the manifest module. The
    /// manifest write itself is best-effort: a failure here is logged by
    /// the caller rather than treated as fatal to the session's other work.
    pub fn close(mut self) -> Result<()> {
        if self.any_writes {
            self.manifest.recompute(&self.index)?;
        }
        self.manifest.write(&self.root)?;
        Ok(())
    }

    /// Streams a gzipped tar archive of alert envelopes into the database.
    /// A blocking scan task decodes records and applies `skip_existing`
    /// directly against the shared index handle, feeding a bounded queue;
    /// `worker_count` upload tasks push to the blob store concurrently,
    /// while every index write happens back on this task, serially.
    pub async fn ingest_tar(
        &mut self,
        tar_path: impl AsRef<Path>,
        worker_count: usize,
        limit: Option<u64>,
        skip_existing: bool,
    ) -> Result<u64> {
        let tar_path = tar_path.as_ref().to_path_buf();
        let healpix_order = self.healpix_order;
        let scan_index = Arc::clone(&self.index);

        let file = std::fs::File::open(&tar_path)?;
        let mut reader = TarAlertReader::new(file)?;

        let scan_fn = move |tx: tokio::sync::mpsc::Sender<PendingUpload>| -> Result<()> {
            let mut emitted = 0u64;
            loop {
                let Some(raw) = reader.next_entry()? else {
                    break;
                };
                let record = AlertRecord::decode_minimal(&raw)?;

                if skip_existing && scan_index.get_url(record.candidate_id)?.is_some() {
                    debug!(candidate_id = record.candidate_id, "skipping existing candidate");
                    continue;
                }

                let pixel = spatial::position_to_pixel(healpix_order, record.position);
                let unix_nanos = timestamp::nanos_from_unix_seconds(record.unix_seconds());

                info!(candidate_id = record.candidate_id, "scanned alert");

                tx.blocking_send(PendingUpload {
                    candidate_id: record.candidate_id,
                    object_id: record.object_id,
                    pixel,
                    unix_nanos,
                    raw_bytes: record.raw_payload,
                })
                .map_err(|_| AlertbaseError::PipelineCanceled)?;

                emitted += 1;
                if let Some(limit) = limit {
                    if emitted >= limit {
                        break;
                    }
                }
            }
            debug!(emitted, "tar scan complete");
            Ok(())
        };

        let upload_blobstore = Arc::clone(&self.blobstore);
        let upload_fn = move |item: PendingUpload| -> futures_core::future::BoxFuture<
            'static,
            Result<(String, PendingUpload)>,
        > {
            let blobstore = Arc::clone(&upload_blobstore);
            Box::pin(async move {
                let PendingUpload {
                    candidate_id,
                    object_id,
                    pixel,
                    unix_nanos,
                    raw_bytes,
                } = item;
                let session = blobstore.session().await;
                let url = session.put(&object_id, candidate_id, raw_bytes).await?;
                Ok((
                    url,
                    PendingUpload {
                        candidate_id,
                        object_id,
                        pixel,
                        unix_nanos,
                        raw_bytes: Vec::new(),
                    },
                ))
            })
        };

        let index = Arc::clone(&self.index);
        let uploaded = pipeline::run_ingest_pipeline(worker_count, scan_fn, upload_fn, |url, item| {
            index.insert(&url, item.candidate_id, &item.object_id, item.pixel, item.unix_nanos)
        })
        .await?;

        if uploaded > 0 {
            self.any_writes = true;
        }

        Ok(uploaded)
    }

    /// Looks up the alert indexed under `candidate_id`. Per the blob store's
    /// error contract, an index entry whose blob has gone missing
    /// (`ObjectNotFound`) is reported as absent rather than as an error --
    /// the same "not found" a caller would see for an unindexed id.
    pub async fn get_by_candidate_id(&self, candidate_id: u64) -> Result<Option<AlertRecord>> {
        let Some(url) = self.index.get_url(candidate_id)? else {
            return Ok(None);
        };
        let session = self.blobstore.session().await;
        let bytes = match session.get(&url).await {
            Ok(bytes) => bytes,
            Err(AlertbaseError::ObjectNotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(Some(AlertRecord::decode_full(&bytes)?))
    }

    pub async fn get_by_object_id(
        &self,
        object_id: &str,
        worker_count: usize,
    ) -> Result<Vec<AlertRecord>> {
        let candidate_ids = self.index.object_candidate_ids(object_id)?;
        self.fetch_all(candidate_ids, worker_count).await
    }

    pub async fn get_by_time_range(
        &self,
        start_unix_seconds: f64,
        end_unix_seconds: f64,
        worker_count: usize,
    ) -> Result<Vec<AlertRecord>> {
        let start_nanos = timestamp::nanos_from_unix_seconds(start_unix_seconds);
        let end_nanos = timestamp::nanos_from_unix_seconds(end_unix_seconds);
        let candidate_ids = self
            .index
            .time_range_candidate_ids(start_nanos, end_nanos)?;
        self.fetch_all(candidate_ids, worker_count).await
    }

    /// Returns every alert whose pixel at the database's fixed HEALPix
    /// order might fall within `radius_deg` of `center`. Pixel-accurate,
    /// not disc-accurate: candidates outside the true disc but sharing a
    /// partially-overlapping pixel are included, by design -- an exact
    /// angular-distance re-filter is left to the caller.
    pub async fn get_by_cone_search(
        &self,
        center: Position,
        radius_deg: f64,
        worker_count: usize,
    ) -> Result<Vec<AlertRecord>> {
        let pixels = spatial::disc_to_pixels(self.healpix_order, center, radius_deg);
        let ranges = spatial::compact_ranges(&pixels);

        let mut candidate_ids = Vec::new();
        for (start, end) in ranges {
            candidate_ids.extend(self.index.pixel_range_candidate_ids(start, end)?);
        }
        self.fetch_all(candidate_ids, worker_count).await
    }

    async fn fetch_all(
        &self,
        candidate_ids: Vec<u64>,
        worker_count: usize,
    ) -> Result<Vec<AlertRecord>> {
        let mut urls = Vec::with_capacity(candidate_ids.len());
        for id in &candidate_ids {
            let url = self
                .index
                .get_url(*id)?
                .ok_or_else(|| AlertbaseError::InvalidUrl(format!("no url for candidate {id}")))?;
            urls.push(url);
        }

        let blobstore = Arc::clone(&self.blobstore);
        pipeline::run_query_pipeline(urls, worker_count, move |url| {
            let blobstore = Arc::clone(&blobstore);
            Box::pin(async move {
                let session = blobstore.session().await;
                let bytes = session.get(&url).await?;
                AlertRecord::decode_full(&bytes)
            })
        })
        .await
    }
}
