use thiserror::Error;

/// Errors surfaced anywhere in the alertbase storage engine.
///
/// Variant names follow the kinds named in the storage design rather than
/// the library that happened to raise them, so callers can match on "what
/// went wrong" instead of "which crate threw."
#[derive(Error, Debug)]
pub enum AlertbaseError {
    #[error("value out of encodable range at offset {offset}")]
    EncodeRange { offset: usize },

    #[error("truncated buffer while decoding at offset {offset}")]
    DecodeTruncated { offset: usize },

    #[error("invalid utf-8 while decoding at offset {offset}")]
    DecodeUtf8 { offset: usize },

    #[error("schema mismatch while decoding at offset {offset}: {detail}")]
    DecodeSchemaMismatch { offset: usize, detail: String },

    #[error("index store io error: {0}")]
    IndexIo(#[from] rocksdb::Error),

    #[error("blob store io error: {0}")]
    BlobIo(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

    #[error("object not found in blob store: {key}")]
    ObjectNotFound { key: String },

    #[error("invalid stored url: {0}")]
    InvalidUrl(String),

    #[error("database not found at {0}")]
    DatabaseNotFound(String),

    #[error("database already exists at {0}")]
    DatabaseExists(String),

    #[error("pipeline canceled")]
    PipelineCanceled,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest serialization error: {0}")]
    ManifestSerde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AlertbaseError>;
