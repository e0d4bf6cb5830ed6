//! Test utilities for engine testing.
//!
//! Sets up an in-memory SQLite database with migrations applied, a file
//! store rooted in a temporary directory, and CSV fixtures.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use tempfile::TempDir;
use uuid::Uuid;

use catalog_ingest::config::IngestConfig;
use catalog_ingest::ingest::{BatchEngine, CreateBatchOptions};
use catalog_ingest::storage::LocalFileStore;

/// Header with every required column plus name-based references.
pub const HEADER: &str = "product_name,product_description,product_sku,cost_price,regular_price,\
sale_price,discount_percentage,discount_label,minimum_price,wholesale_quantity,\
wholesale_discount_percentage,supplier_name,catalog_name,category_name";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// A data row for [`HEADER`] whose discount matches its prices.
pub fn product_row(name: &str, sku: &str, regular: f64, sale: f64) -> String {
    let discount = if regular > 0.0 {
        ((regular - sale) / regular * 100.0).round()
    } else {
        0.0
    };
    format!(
        "{name},{name} description,{sku},{cost},{regular},{sale},{discount},Launch,{minimum},10,5,\
Acme Supply,Main Catalog,Gear",
        cost = sale / 2.0,
        minimum = sale / 2.0,
    )
}

/// Joins a header and rows into CSV text.
pub fn csv_text(header: &str, rows: &[String]) -> String {
    let mut text = String::from(header);
    for row in rows {
        text.push('\n');
        text.push_str(row);
    }
    text.push('\n');
    text
}

/// Engine over an in-memory database with uploads in a temporary directory.
pub struct TestHarness {
    pub db: DatabaseConnection,
    pub engine: BatchEngine,
    pub store: LocalFileStore,
    uploads: TempDir,
    inputs: TempDir,
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        Self::with_config(|_| {}).await
    }

    /// Harness whose config is adjusted by `configure` before the engine is built.
    /// Stored files are kept after completion unless `configure` says otherwise.
    pub async fn with_config(configure: impl FnOnce(&mut IngestConfig)) -> Result<Self> {
        let db = setup_test_db().await?;
        let uploads = TempDir::new()?;
        let inputs = TempDir::new()?;

        let mut config = IngestConfig {
            upload_dir: uploads.path().to_path_buf(),
            cleanup_on_complete: false,
            ..IngestConfig::default()
        };
        configure(&mut config);

        let store = LocalFileStore::new(uploads.path());
        let engine = BatchEngine::new(db.clone(), Arc::new(store.clone()), config);

        Ok(Self {
            db,
            engine,
            store,
            uploads,
            inputs,
        })
    }

    /// Writes `contents` to a fresh input file outside the upload directory.
    pub fn write_input(&self, name: &str, contents: &str) -> Result<PathBuf> {
        let path = self.inputs.path().join(name);
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    /// Creates a pending batch and attaches `contents` as its file.
    pub async fn pending_batch(&self, contents: &str) -> Result<Uuid> {
        self.pending_batch_with(contents, CreateBatchOptions::default())
            .await
    }

    pub async fn pending_batch_with(
        &self,
        contents: &str,
        options: CreateBatchOptions,
    ) -> Result<Uuid> {
        let created = self.engine.create_batch("catalog.csv", options).await;
        let batch = created
            .data
            .ok_or_else(|| anyhow!("create failed: {:?}", created.error))?;

        let input = self.write_input(&format!("{}.csv", batch.id), contents)?;
        let attached = self.engine.attach_file(batch.id, &input).await;
        if !attached.success {
            return Err(anyhow!("attach failed: {:?}", attached.error));
        }
        Ok(batch.id)
    }

    /// Path of the stored copy of a batch's file.
    pub fn stored_path(&self, batch_id: Uuid) -> PathBuf {
        self.uploads.path().join(format!("{batch_id}.csv"))
    }
}
