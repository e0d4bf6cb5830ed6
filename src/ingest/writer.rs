//! Per-row transactional write.
//!
//! A row's product, its log entries and the advanced cursor commit together,
//! and only while the worker still holds its run. A worker that lost the
//! batch to another run rolls the row back and stops.

use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use uuid::Uuid;

use crate::error::{IngestError, RowIssue};
use crate::ingest::attributes;
use crate::ingest::progress::BatchProgress;
use crate::ingest::resolver::ResolvedRefs;
use crate::ingest::validator::ProductDraft;
use crate::models::product;
use crate::repositories::{BatchErrorRepository, BatchJobRepository, ProductRepository};

/// Where a row's write left the batch.
#[derive(Debug)]
pub enum RowCommit<T> {
    Committed(T),
    /// Another worker claimed the batch; nothing from this row was kept.
    Superseded,
}

/// Scope of one worker's writes to a batch.
#[derive(Debug, Clone, Copy)]
pub struct RunScope {
    pub batch_id: Uuid,
    pub run: i32,
}

/// Inserts the product and its attribute selections, appends `issues`
/// (warnings) and stores `progress`, all in one transaction. On any error
/// the transaction is dropped and nothing from this row remains.
pub async fn write_product(
    db: &DatabaseConnection,
    scope: RunScope,
    mut draft: ProductDraft,
    refs: ResolvedRefs,
    issues: &[RowIssue],
    progress: &BatchProgress,
) -> Result<RowCommit<product::Model>, IngestError> {
    let columns = std::mem::take(&mut draft.attributes);
    let new_product = draft.into_new_product(
        refs.category_id,
        refs.catalog_id,
        refs.supplier_id,
        Some(scope.batch_id),
    );

    let txn = db.begin().await?;

    let product = ProductRepository::insert(&txn, new_product).await?;
    attributes::apply(&txn, product.id, &columns).await?;

    if !record(&txn, scope, issues, progress).await? {
        txn.rollback().await?;
        return Ok(RowCommit::Superseded);
    }

    txn.commit().await?;

    Ok(RowCommit::Committed(product))
}

/// Appends a rejected row's issues and stores `progress` in one transaction.
pub async fn write_rejection(
    db: &DatabaseConnection,
    scope: RunScope,
    issues: &[RowIssue],
    progress: &BatchProgress,
) -> Result<RowCommit<()>, IngestError> {
    let txn = db.begin().await?;

    if !record(&txn, scope, issues, progress).await? {
        txn.rollback().await?;
        return Ok(RowCommit::Superseded);
    }

    txn.commit().await?;

    Ok(RowCommit::Committed(()))
}

// Cursor first: on Postgres this locks the batch row for the rest of the txn.
async fn record<C: ConnectionTrait>(
    conn: &C,
    scope: RunScope,
    issues: &[RowIssue],
    progress: &BatchProgress,
) -> Result<bool, IngestError> {
    let held =
        BatchJobRepository::save_run_progress(conn, scope.batch_id, scope.run, progress).await?;
    if held {
        BatchErrorRepository::append_on(conn, scope.batch_id, issues).await?;
    }
    Ok(held)
}
