use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use alertbase::db::{Database, DEFAULT_HEALPIX_ORDER};

/// Ingests a gzipped tar archive of alert envelopes into an alertbase
/// database, uploading each alert's raw bytes to S3 and recording its
/// secondary-index entries locally.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// Path to the local index database directory.
    db_path: PathBuf,

    /// Path to the gzipped tar archive to ingest.
    tarfile: PathBuf,

    /// S3 bucket alert payloads are stored in. Required when creating a new
    /// database; ignored (the manifest's value is used) otherwise.
    #[arg(long)]
    bucket: Option<String>,

    /// AWS region for the S3 bucket.
    #[arg(long, default_value = "us-west-2")]
    s3_region: String,

    /// Create the database at `db_path` if it does not already exist.
    #[arg(long, default_value_t = false)]
    create_db: bool,

    /// Skip candidates already present in the index rather than
    /// re-uploading and re-indexing them.
    #[arg(long = "skip-existing", overrides_with = "no_skip_existing")]
    skip_existing: bool,

    #[arg(long = "no-skip-existing", overrides_with = "skip_existing")]
    no_skip_existing: bool,

    /// Stop after ingesting this many accepted records.
    #[arg(long)]
    limit: Option<u64>,

    /// Number of concurrent upload workers.
    #[arg(long = "upload-worker-count", default_value_t = 8)]
    upload_worker_count: usize,

    /// Raise the log level from info to debug.
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match run(args).await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "upload_tarfile failed");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> alertbase::Result<()> {
    let skip_existing = args.skip_existing || !args.no_skip_existing;

    let mut db = if args.create_db {
        let bucket = args.bucket.clone().ok_or_else(|| {
            alertbase::AlertbaseError::InvalidArgument(
                "--bucket is required with --create-db".to_string(),
            )
        })?;
        Database::create(&args.db_path, &bucket, &args.s3_region, DEFAULT_HEALPIX_ORDER).await?
    } else {
        Database::open(&args.db_path, &args.s3_region).await?
    };

    let uploaded = db
        .ingest_tar(
            &args.tarfile,
            args.upload_worker_count,
            args.limit,
            skip_existing,
        )
        .await?;

    tracing::info!(uploaded, "ingest complete");

    db.close()?;
    Ok(())
}
