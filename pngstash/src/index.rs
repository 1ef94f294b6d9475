//! Optional index of stored images.
//!
//! The image directory is the source of truth; the index is an observational record kept on a
//! best-effort basis. Records are written from a spawned task after the upload response has been
//! produced, each bounded by `index.timeout`. A failing or slow index never fails an upload and
//! never removes a file that has already been written.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::{debug, info, warn};

use crate::{config::IndexConfig, ingest::StoredImage};

/// One row of the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub filename: String,
    pub label: String,
    pub size_bytes: u64,
    pub stored_at: DateTime<Utc>,
}

impl IndexEntry {
    pub fn new(image: &StoredImage, label: &str) -> Self {
        Self {
            filename: image.filename.clone(),
            label: label.to_string(),
            size_bytes: image.size_bytes,
            stored_at: image.stored_at,
        }
    }
}

#[async_trait]
pub trait ImageIndex: Send + Sync {
    async fn record(&self, entry: &IndexEntry) -> anyhow::Result<()>;
}

/// Get the index database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Index backed by an `images` table in PostgreSQL.
#[derive(Debug, Clone)]
pub struct PostgresImageIndex {
    pool: PgPool,
}

impl PostgresImageIndex {
    /// Build a lazily-connecting pool. No connection is attempted here.
    pub fn connect_lazy(url: &str, config: &IndexConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.timeout)
            .connect_lazy(url)?;
        Ok(Self { pool })
    }

    /// Run pending migrations, creating the `images` table on first start.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        migrator().run(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ImageIndex for PostgresImageIndex {
    async fn record(&self, entry: &IndexEntry) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO images (filename, label, size_bytes, stored_at) VALUES ($1, $2, $3, $4)")
            .bind(&entry.filename)
            .bind(&entry.label)
            .bind(i64::try_from(entry.size_bytes)?)
            .bind(entry.stored_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Set up the PostgreSQL index if one is configured.
///
/// An unreachable database at startup is logged and tolerated: the pool stays lazy and later
/// records simply fail (and are logged) until it comes back.
pub async fn setup_index(config: &IndexConfig) -> anyhow::Result<Option<PostgresImageIndex>> {
    let Some(url) = config.url.as_deref() else {
        info!("No index database configured, stored images will not be indexed");
        return Ok(None);
    };

    let index = PostgresImageIndex::connect_lazy(url, config)?;
    match tokio::time::timeout(config.timeout, index.ensure_schema()).await {
        Ok(Ok(())) => info!("Image index ready"),
        Ok(Err(e)) => warn!("Image index unavailable, uploads will not be indexed until it recovers: {:#}", e),
        Err(_) => warn!("Timed out preparing image index after {:?}", config.timeout),
    }

    Ok(Some(index))
}

/// Record `entry` in the background, bounded by `timeout`. Never fails the caller.
pub fn spawn_record(index: Arc<dyn ImageIndex>, entry: IndexEntry, timeout: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::time::timeout(timeout, index.record(&entry)).await {
            Ok(Ok(())) => debug!(filename = %entry.filename, "Indexed image"),
            Ok(Err(e)) => warn!(filename = %entry.filename, "Failed to index image: {:#}", e),
            Err(_) => warn!(filename = %entry.filename, "Indexing image timed out after {:?}", timeout),
        }
    })
}
