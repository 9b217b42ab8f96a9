//! An archival store for time-domain transient alerts: binary codecs, a
//! minimal record decoder, HEALPix spatial indexing, a RocksDB-backed
//! secondary index, and an S3 blob store client, bound together by
//! [`db::Database`].

pub mod blobstore;
pub mod codec;
pub mod db;
pub mod error;
pub mod index;
pub mod kvtable;
pub mod manifest;
pub mod pipeline;
pub mod record;
pub mod spatial;
pub mod tar_reader;

pub use db::Database;
pub use error::{AlertbaseError, Result};
pub use record::{AlertRecord, Position};
