// Postgres persistence for retriever results.
//
// Reads archive IDs from the collector-owned `ads` table and writes one
// `ad_snapshot_images` row per archive ID. Rows are only ever written a whole
// chunk at a time inside one transaction.

use adscreen_common::{ArchiveId, FetchStatus, StoredImageRecord};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info};

use crate::error::Result;

pub struct ImageRecordStore {
    pool: PgPool,
}

/// A row from the ad_snapshot_images table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ImageRecordRow {
    pub archive_id: i64,
    pub snapshot_fetch_time: DateTime<Utc>,
    pub image_url_found_in_snapshot: bool,
    pub image_url: Option<String>,
    pub image_url_fetch_status: Option<i32>,
    pub sim_hash: Option<String>,
}

impl ImageRecordRow {
    pub fn fetch_status(&self) -> Option<FetchStatus> {
        self.image_url_fetch_status.and_then(FetchStatus::from_code)
    }
}

impl ImageRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Archive IDs with no result row yet, ascending. `None` means no limit.
    pub async fn archive_ids_missing_image(&self, limit: Option<i64>) -> Result<Vec<ArchiveId>> {
        // LIMIT NULL is LIMIT ALL in Postgres.
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT a.archive_id
            FROM ads a
            WHERE NOT EXISTS (
                SELECT 1 FROM ad_snapshot_images i WHERE i.archive_id = a.archive_id
            )
            ORDER BY a.archive_id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        debug!(count = ids.len(), ?limit, "Fetched archive IDs missing image");
        Ok(ids.into_iter().map(ArchiveId).collect())
    }

    /// Write every record of a chunk in one transaction. Either all rows land
    /// or none do.
    pub async fn insert_records(&self, records: &[StoredImageRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for r in records {
            sqlx::query(
                r#"
                INSERT INTO ad_snapshot_images
                    (archive_id, snapshot_fetch_time, image_url_found_in_snapshot,
                     image_url, image_url_fetch_status, sim_hash)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(r.archive_id().0)
            .bind(r.snapshot_fetch_time())
            .bind(r.image_url_found_in_snapshot())
            .bind(r.public_storage_url())
            .bind(r.fetch_status().map(FetchStatus::code))
            .bind(r.fingerprint())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!(rows = records.len(), "Committed ad image records");
        Ok(())
    }

    /// All rows for one archive ID, oldest first.
    pub async fn records_for(&self, archive_id: ArchiveId) -> Result<Vec<ImageRecordRow>> {
        let rows = sqlx::query_as::<_, ImageRecordRow>(
            r#"
            SELECT archive_id, snapshot_fetch_time, image_url_found_in_snapshot,
                   image_url, image_url_fetch_status, sim_hash
            FROM ad_snapshot_images
            WHERE archive_id = $1
            ORDER BY snapshot_fetch_time ASC
            "#,
        )
        .bind(archive_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Archive IDs whose stored image shares a fingerprint.
    pub async fn archive_ids_by_fingerprint(&self, fingerprint: &str) -> Result<Vec<ArchiveId>> {
        let ids = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT DISTINCT archive_id FROM ad_snapshot_images
            WHERE sim_hash = $1
            ORDER BY archive_id
            "#,
        )
        .bind(fingerprint)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(ArchiveId).collect())
    }
}
