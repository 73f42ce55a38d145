use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Instrument;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use adscreen_archive::{FsImageStore, GcsImageStore, ImageDownloader, ImageRecordStore};
use adscreen_common::file_config::load_config_or_default;
use adscreen_common::{AppConfig, StorageBackend};
use adscreen_retriever::traits::ImageStore;
use adscreen_retriever::{Retriever, RetrieverConfig};
use snapshot_client::SnapshotClient;

#[derive(Parser)]
#[command(
    name = "adscreen-retriever",
    about = "Fetch, fingerprint and archive ad creative images"
)]
struct Cli {
    /// Path to config TOML file
    #[arg(long, default_value = "./config/adscreen.toml")]
    config: PathBuf,

    /// Cap on archive IDs processed this run (-1 for no limit)
    #[arg(long, allow_negative_numbers = true)]
    max_archive_ids: Option<i64>,

    /// Archive IDs per committed chunk
    #[arg(long)]
    batch_size: Option<usize>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));
    if cli.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!("Starting adscreen-retriever");

    let mut file_config = load_config_or_default(&cli.config)?;
    if let Some(n) = cli.max_archive_ids {
        file_config.limits.max_archive_ids = n;
    }
    if let Some(n) = cli.batch_size {
        file_config.limits.batch_size = n;
    }
    file_config.validate()?;

    let config = AppConfig::from_env()?;
    let timeout = Duration::from_secs(file_config.http.timeout_secs);

    let db = ImageRecordStore::connect(&config.database_url)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let archive_ids = db
        .archive_ids_missing_image(file_config.max_archive_ids())
        .await?;
    tracing::info!(
        count = archive_ids.len(),
        limit = ?file_config.max_archive_ids(),
        "Archive IDs missing an image"
    );
    if archive_ids.is_empty() {
        tracing::info!("Nothing to do");
        return Ok(());
    }

    let mut snapshots = SnapshotClient::builder(&config.fb_access_token).timeout(timeout);
    if let Some(base_url) = &file_config.http.snapshot_base_url {
        snapshots = snapshots.base_url(base_url);
    }
    let snapshots = snapshots.build()?;
    let images = ImageDownloader::new(timeout)?;

    let storage: Box<dyn ImageStore> = match file_config.storage.backend {
        StorageBackend::Gcs => {
            let token = config
                .gcs_access_token
                .as_deref()
                .context("GCS_ACCESS_TOKEN is required for the gcs storage backend")?;
            Box::new(GcsImageStore::new(&file_config.storage.bucket, token, timeout)?)
        }
        StorageBackend::Fs => Box::new(FsImageStore::new(
            file_config.storage.root.clone(),
            file_config.storage.public_base_url.as_deref(),
        )),
    };
    tracing::info!(backend = ?file_config.storage.backend, "Object storage ready");

    let retriever = Retriever::new(
        &snapshots,
        &images,
        storage.as_ref(),
        &db,
        RetrieverConfig::from(&file_config),
    );
    let run_id = Uuid::new_v4();
    let report = retriever
        .run(&archive_ids)
        .instrument(tracing::info_span!("retriever_run", %run_id))
        .await;
    report.into_result()?;

    tracing::info!("adscreen-retriever finished");
    Ok(())
}
