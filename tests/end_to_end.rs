//! End-to-end scenarios exercising `Database` against a real on-disk index
//! and a fake in-memory blob transport, since these tests run with no
//! network access.

use std::sync::Arc;

use async_trait::async_trait;
use tempfile::tempdir;

use alertbase::blobstore::{BlobStore, ObjectTransport, DEFAULT_MAX_CONCURRENCY};
use alertbase::db::{Database, DEFAULT_HEALPIX_ORDER};
use alertbase::error::{AlertbaseError, Result};
use alertbase::manifest::Manifest;
use alertbase::Position;

/// An in-memory stand-in for S3, so these tests never touch the network.
#[derive(Default)]
struct FakeTransport {
    objects: std::sync::Mutex<std::collections::HashMap<(String, String), Vec<u8>>>,
}

#[async_trait]
impl ObjectTransport for FakeTransport {
    async fn put_object(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), bytes);
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| AlertbaseError::ObjectNotFound {
                key: key.to_string(),
            })
    }
}

/// Builds a minimal, valid single-record Avro-style container, matching the
/// layout the record decoder expects. Mirrors the fixture builder in
/// `record::tests`, since that one is private to its own crate module.
fn build_alert(object_id: &str, candid: i64, jd: f64, ra: f64, dec: f64) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(b"Obj\x01");
    buf.push(0x00);
    buf.extend_from_slice(&[0u8; 16]);

    fn push_long(buf: &mut Vec<u8>, n: i64) {
        let mut u = ((n << 1) ^ (n >> 63)) as u64;
        loop {
            let chunk = (u & 0x7f) as u8;
            u >>= 7;
            if u != 0 {
                buf.push(chunk | 0x80);
            } else {
                buf.push(chunk);
                break;
            }
        }
    }
    fn push_string(buf: &mut Vec<u8>, s: &str) {
        push_long(buf, s.len() as i64);
        buf.extend_from_slice(s.as_bytes());
    }
    fn push_null(buf: &mut Vec<u8>) {
        push_long(buf, 0);
    }

    push_long(&mut buf, 1);
    push_long(&mut buf, 0);

    push_string(&mut buf, "4.02");
    push_string(&mut buf, "ztf");

    push_string(&mut buf, object_id);
    push_long(&mut buf, candid);

    buf.extend_from_slice(&jd.to_le_bytes());

    push_long(&mut buf, 1);
    push_long(&mut buf, 123);
    push_null(&mut buf);
    push_null(&mut buf);
    push_null(&mut buf);
    push_long(&mut buf, 1);
    push_long(&mut buf, candid);
    push_string(&mut buf, "t");
    push_null(&mut buf);
    push_null(&mut buf);
    push_null(&mut buf);
    push_null(&mut buf);
    push_null(&mut buf);
    push_null(&mut buf);

    buf.extend_from_slice(&ra.to_le_bytes());
    buf.extend_from_slice(&dec.to_le_bytes());

    buf
}

fn build_tar_gz(entries: &[Vec<u8>]) -> Vec<u8> {
    use std::io::Write;

    let mut builder = tar::Builder::new(Vec::new());
    for (i, entry) in entries.iter().enumerate() {
        let mut header = tar::Header::new_gnu();
        header.set_path(format!("alert_{i}.avro")).unwrap();
        header.set_size(entry.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, entry.as_slice()).unwrap();
    }
    let tar_bytes = builder.into_inner().unwrap();

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&tar_bytes).unwrap();
    encoder.finish().unwrap()
}

/// Creates a database rooted at a temp directory, backed by an in-memory
/// blob transport instead of real S3.
async fn test_database(dir: &std::path::Path) -> Database {
    let manifest = Manifest::new(
        "test-bucket".to_string(),
        "us-west-2".to_string(),
        DEFAULT_HEALPIX_ORDER,
    );
    manifest.write(dir).unwrap();

    let transport: Arc<dyn ObjectTransport> = Arc::new(FakeTransport::default());
    let blobstore = BlobStore::with_transport(
        transport,
        "us-west-2",
        "test-bucket",
        DEFAULT_MAX_CONCURRENCY,
    );

    Database::open_with_blobstore(dir, blobstore).await.unwrap()
}

#[tokio::test]
async fn ingest_then_lookup_by_candidate_id() {
    let dir = tempdir().unwrap();
    let mut db = test_database(dir.path()).await;

    let alerts = vec![build_alert("ZTF18aaylcqb", 1311156250015010003, 2459065.65625, 234.1362886, 16.6055949)];
    let tar_gz = build_tar_gz(&alerts);
    let tar_path = dir.path().join("alerts.tar.gz");
    std::fs::write(&tar_path, tar_gz).unwrap();

    let uploaded = db.ingest_tar(&tar_path, 2, None, true).await.unwrap();
    assert_eq!(uploaded, 1);

    let record = db
        .get_by_candidate_id(1311156250015010003)
        .await
        .unwrap()
        .expect("candidate should be indexed");
    assert_eq!(record.object_id, "ZTF18aaylcqb");
    assert!((record.position.ra_deg - 234.1362886).abs() < 1e-9);

    db.close().unwrap();
}

#[tokio::test]
async fn skip_existing_avoids_reupload() {
    let dir = tempdir().unwrap();
    let mut db = test_database(dir.path()).await;

    let alerts = vec![build_alert("ZTF18aaylcqb", 42, 2459065.0, 10.0, 20.0)];
    let tar_path = dir.path().join("alerts.tar.gz");
    std::fs::write(&tar_path, build_tar_gz(&alerts)).unwrap();

    let first = db.ingest_tar(&tar_path, 1, None, true).await.unwrap();
    assert_eq!(first, 1);

    let second = db.ingest_tar(&tar_path, 1, None, true).await.unwrap();
    assert_eq!(second, 0, "skip_existing should drop the already-indexed candidate");

    db.close().unwrap();
}

#[tokio::test]
async fn get_by_object_id_returns_every_candidate_for_that_object() {
    let dir = tempdir().unwrap();
    let mut db = test_database(dir.path()).await;

    let alerts = vec![
        build_alert("ZTF18aaylcqb", 1, 2459065.0, 10.0, 20.0),
        build_alert("ZTF18aaylcqb", 2, 2459066.0, 10.0, 20.0),
        build_alert("ZTF18other0000", 3, 2459067.0, 10.0, 20.0),
    ];
    let tar_path = dir.path().join("alerts.tar.gz");
    std::fs::write(&tar_path, build_tar_gz(&alerts)).unwrap();

    db.ingest_tar(&tar_path, 2, None, true).await.unwrap();

    let records = db.get_by_object_id("ZTF18aaylcqb", 2).await.unwrap();
    assert_eq!(records.len(), 2);
    let mut ids: Vec<u64> = records.iter().map(|r| r.candidate_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);

    db.close().unwrap();
}

#[tokio::test]
async fn get_by_time_range_narrows_to_the_window() {
    let dir = tempdir().unwrap();
    let mut db = test_database(dir.path()).await;

    // jd values chosen far enough apart that their unix-second timestamps
    // fall cleanly inside or outside the query window below.
    let alerts = vec![
        build_alert("obj_early", 1, 2459000.0, 10.0, 20.0),
        build_alert("obj_mid", 2, 2459065.0, 10.0, 20.0),
        build_alert("obj_late", 3, 2459200.0, 10.0, 20.0),
    ];
    let tar_path = dir.path().join("alerts.tar.gz");
    std::fs::write(&tar_path, build_tar_gz(&alerts)).unwrap();

    db.ingest_tar(&tar_path, 2, None, true).await.unwrap();

    let start = alertbase::codec::jd_to_unix_seconds(2459060.0);
    let end = alertbase::codec::jd_to_unix_seconds(2459070.0);
    let records = db.get_by_time_range(start, end, 2).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].object_id, "obj_mid");

    db.close().unwrap();
}

#[tokio::test]
async fn cone_search_finds_the_nearby_alert_and_excludes_the_distant_one() {
    let dir = tempdir().unwrap();
    let mut db = test_database(dir.path()).await;

    let alerts = vec![
        build_alert("near", 1, 2459065.0, 10.0, 20.0),
        build_alert("far", 2, 2459065.0, 190.0, -45.0),
    ];
    let tar_path = dir.path().join("alerts.tar.gz");
    std::fs::write(&tar_path, build_tar_gz(&alerts)).unwrap();

    db.ingest_tar(&tar_path, 2, None, true).await.unwrap();

    let records = db
        .get_by_cone_search(Position::new(10.0, 20.0), 1.0, 2)
        .await
        .unwrap();
    let ids: Vec<u64> = records.iter().map(|r| r.candidate_id).collect();
    assert!(ids.contains(&1));
    assert!(!ids.contains(&2));

    db.close().unwrap();
}

#[tokio::test]
async fn limit_caps_the_number_of_records_accepted() {
    let dir = tempdir().unwrap();
    let mut db = test_database(dir.path()).await;

    let alerts: Vec<Vec<u8>> = (1..=5)
        .map(|i| build_alert(&format!("obj{i}"), i, 2459065.0, 10.0, 20.0))
        .collect();
    let tar_path = dir.path().join("alerts.tar.gz");
    std::fs::write(&tar_path, build_tar_gz(&alerts)).unwrap();

    let uploaded = db.ingest_tar(&tar_path, 2, Some(2), true).await.unwrap();
    assert_eq!(uploaded, 2);

    db.close().unwrap();
}
