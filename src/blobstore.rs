//! An S3-backed blob store for raw alert bytes, with a bounded number of
//! concurrent requests in flight.
//!
//! A `tokio::sync::Semaphore` guards every request, since alerts are
//! uploaded and downloaded whole and never listed or deleted. The
//! transport itself is abstracted behind [`ObjectTransport`] so tests can
//! substitute an in-memory fake instead of talking to real S3.

use std::sync::Arc;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::{AlertbaseError, Result};
use crate::index::parse_s3_url;

/// Default bound on concurrent in-flight S3 requests.
pub const DEFAULT_MAX_CONCURRENCY: usize = 50;

fn object_key(object_id: &str, candidate_id: u64) -> String {
    format!("alerts/v2/{object_id}/{candidate_id}")
}

/// The put/get surface a blob store backend must provide. The production
/// implementation is [`S3Transport`]; tests substitute an in-memory fake
/// instead of making real network calls.
#[async_trait]
pub trait ObjectTransport: Send + Sync {
    async fn put_object(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<()>;
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
}

/// The real transport, backed by `aws-sdk-s3`.
pub struct S3Transport {
    client: aws_sdk_s3::Client,
}

impl S3Transport {
    pub async fn connect(region: &str) -> Self {
        // Standard-mode retries with a generous attempt budget: transient
        // put/get failures should not surface to the caller as fatal.
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .retry_config(aws_config::retry::RetryConfig::standard().with_max_attempts(10))
            .load()
            .await;
        Self {
            client: aws_sdk_s3::Client::new(&config),
        }
    }
}

#[async_trait]
impl ObjectTransport for S3Transport {
    async fn put_object(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| AlertbaseError::BlobIo(Box::new(e)))?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AlertbaseError::BlobIo(Box::new(e)))?;

        let body = resp
            .body
            .collect()
            .await
            .map_err(|e| AlertbaseError::BlobIo(Box::new(e)))?;

        Ok(body.into_bytes().to_vec())
    }
}

/// A single acquired-permit session against the blob store. Holding one
/// guarantees the store's concurrency bound is respected for as long as the
/// session is alive; dropping it releases the permit.
pub struct BlobSession<'a> {
    store: &'a BlobStore,
    _permit: OwnedSemaphorePermit,
}

impl<'a> BlobSession<'a> {
    pub async fn put(&self, object_id: &str, candidate_id: u64, bytes: Vec<u8>) -> Result<String> {
        let key = object_key(object_id, candidate_id);
        let url = format!("s3://{}/{}", self.store.bucket, key);
        debug!(%url, "uploading alert");
        self.store.transport.put_object(&self.store.bucket, &key, bytes).await?;
        Ok(url)
    }

    pub async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let (bucket, key) = parse_s3_url(url)?;
        debug!(%url, "downloading alert");
        self.store.transport.get_object(&bucket, &key).await
    }
}

/// A handle to one bucket, with a semaphore bounding how many requests may
/// be outstanding against it at once.
pub struct BlobStore {
    transport: Arc<dyn ObjectTransport>,
    bucket: String,
    region: String,
    semaphore: Arc<Semaphore>,
}

impl BlobStore {
    pub async fn connect(region: &str, bucket: &str, max_concurrency: usize) -> Self {
        let transport = S3Transport::connect(region).await;
        Self::with_transport(Arc::new(transport), region, bucket, max_concurrency)
    }

    /// Builds a store around an arbitrary transport. Used in tests to
    /// substitute an in-memory fake for real S3 calls.
    pub fn with_transport(
        transport: Arc<dyn ObjectTransport>,
        region: &str,
        bucket: &str,
        max_concurrency: usize,
    ) -> Self {
        Self {
            transport,
            bucket: bucket.to_string(),
            region: region.to_string(),
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Acquires a concurrency permit and returns a session through which a
    /// single upload or download may be performed. Blocks until a permit is
    /// available if the store is already at its concurrency bound.
    pub async fn session(&self) -> BlobSession<'_> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .expect("blob store semaphore is never closed");
        BlobSession {
            store: self,
            _permit: permit,
        }
    }
}
