//! Batch engine: the operator surface and the single-worker row loop.
//!
//! Every public operation returns an [`OperationResult`]. The row loop polls
//! the stored status before each row so pause and cancel requests made by
//! another process take effect between rows, never inside one. Each loop
//! claims a run generation first; rows commit only under the current run, so
//! a resume that races a still-running worker hands the batch over instead
//! of running it twice.

use std::path::Path;
use std::sync::Arc;

use sea_orm::DatabaseConnection;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::error::{IngestError, OperationError, OperationResult, RowIssue, Severity};
use crate::ingest::progress::BatchProgress;
use crate::ingest::reader::{RowItem, StoredRows, count_stored};
use crate::ingest::state::{self, BatchAction, BatchStatus};
use crate::ingest::validator::Validator;
use crate::ingest::writer::{self, RowCommit, RunScope};
use crate::ingest::{resolver, template};
use crate::models::{batch_job, batch_row_error};
use crate::repositories::{
    BatchErrorRepository, BatchJobRepository, IssueCounts, ProductRepository, ReferenceRepository,
};
use crate::slug::slugify;
use crate::storage::{FileStore, LocalFileStore};
use crate::telemetry::{self, RowOutcome};

/// Options accepted when a batch is created.
#[derive(Debug, Clone, Default)]
pub struct CreateBatchOptions {
    /// Catalog for rows that name none; falls back to the configured default.
    pub default_catalog_id: Option<i32>,
}

/// Operator view of a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub batch: batch_job::Model,
    pub issues: IssueCounts,
    pub products_created: u64,
}

#[derive(Clone)]
pub struct BatchEngine {
    db: DatabaseConnection,
    store: Arc<dyn FileStore>,
    config: IngestConfig,
    jobs: BatchJobRepository,
    errors: BatchErrorRepository,
}

impl BatchEngine {
    pub fn new(db: DatabaseConnection, store: Arc<dyn FileStore>, config: IngestConfig) -> Self {
        Self {
            jobs: BatchJobRepository::new(db.clone()),
            errors: BatchErrorRepository::new(db.clone()),
            db,
            store,
            config,
        }
    }

    /// Engine storing uploads under the configured upload directory.
    pub fn with_local_store(db: DatabaseConnection, config: IngestConfig) -> Self {
        let store = Arc::new(LocalFileStore::new(config.upload_dir.clone()));
        Self::new(db, store, config)
    }

    #[instrument(skip(self, options))]
    pub async fn create_batch(
        &self,
        filename: &str,
        options: CreateBatchOptions,
    ) -> OperationResult<batch_job::Model> {
        self.try_create_batch(filename, options).await.into()
    }

    async fn try_create_batch(
        &self,
        filename: &str,
        options: CreateBatchOptions,
    ) -> Result<batch_job::Model, IngestError> {
        let default_catalog_id = options
            .default_catalog_id
            .or(self.config.default_catalog_id);
        if let Some(id) = default_catalog_id {
            ReferenceRepository::catalog_by_id(&self.db, id).await?;
        }
        self.jobs.create(filename, default_catalog_id).await
    }

    /// Copies `source` into the file store and records it on a pending batch.
    #[instrument(skip(self), fields(batch_id = %batch_id))]
    pub async fn attach_file(
        &self,
        batch_id: Uuid,
        source: &Path,
    ) -> OperationResult<batch_job::Model> {
        self.try_attach_file(batch_id, source).await.into()
    }

    async fn try_attach_file(
        &self,
        batch_id: Uuid,
        source: &Path,
    ) -> Result<batch_job::Model, IngestError> {
        let batch = self.jobs.get(batch_id).await?;
        let status = batch.batch_status();
        if status != BatchStatus::Pending {
            return Err(IngestError::InvalidTransition {
                action: "attach a file to",
                from: status,
                allowed: vec![BatchStatus::Pending],
            });
        }

        let stored = self.store.put(batch_id, source).await?;
        self.jobs.attach_file(batch_id, &stored).await
    }

    pub async fn get_batch(&self, batch_id: Uuid) -> OperationResult<batch_job::Model> {
        self.jobs.get(batch_id).await.into()
    }

    pub async fn list_batches(
        &self,
        status: Option<BatchStatus>,
    ) -> OperationResult<Vec<batch_job::Model>> {
        self.jobs.list(status).await.into()
    }

    /// The batch's log, in row order.
    pub async fn list_errors(
        &self,
        batch_id: Uuid,
    ) -> OperationResult<Vec<batch_row_error::Model>> {
        let result = async {
            self.jobs.get(batch_id).await?;
            self.errors.list(batch_id).await
        }
        .await;
        result.into()
    }

    pub async fn summary(&self, batch_id: Uuid) -> OperationResult<BatchSummary> {
        let result = async {
            let batch = self.jobs.get(batch_id).await?;
            let issues = self.errors.counts(batch_id).await?;
            let products_created = ProductRepository::count_for_batch(&self.db, batch_id).await?;
            Ok::<_, IngestError>(BatchSummary {
                batch,
                issues,
                products_created,
            })
        }
        .await;
        result.into()
    }

    /// `pending -> processing`, then runs the row loop to its end or a pause.
    #[instrument(skip(self), fields(batch_id = %batch_id))]
    pub async fn start(&self, batch_id: Uuid) -> OperationResult<batch_job::Model> {
        match self.prepare_start(batch_id).await {
            Ok(()) => self.process(batch_id).await,
            Err(err) => self.rejected("start", batch_id, err),
        }
    }

    async fn prepare_start(&self, batch_id: Uuid) -> Result<(), IngestError> {
        let batch = self.jobs.get(batch_id).await?;
        state::transition(batch.batch_status(), BatchAction::Start)?;
        let path = self.checked_file(&batch).await?;
        let total = count_stored(self.store.open(&path).await?).await?;

        let batch = self.jobs.transition(batch_id, BatchAction::Start).await?;
        self.jobs
            .save_progress(batch_id, &BatchProgress::from_model(&batch).with_total(total))
            .await?;
        self.audit(batch_id, format!("batch started with {total} records"))
            .await
    }

    /// Requests a pause. The worker stops before its next row and then marks
    /// the batch resumable.
    #[instrument(skip(self), fields(batch_id = %batch_id))]
    pub async fn pause(&self, batch_id: Uuid) -> OperationResult<batch_job::Model> {
        match self.try_pause(batch_id).await {
            Ok(batch) => OperationResult::ok(batch),
            Err(err) => self.rejected("pause", batch_id, err),
        }
    }

    async fn try_pause(&self, batch_id: Uuid) -> Result<batch_job::Model, IngestError> {
        let batch = self.jobs.transition(batch_id, BatchAction::Pause).await?;
        self.audit(
            batch_id,
            format!("batch paused after row {}", batch.last_processed_row),
        )
        .await?;
        Ok(batch)
    }

    /// `paused -> resumable`. The stored file must still be there.
    #[instrument(skip(self), fields(batch_id = %batch_id))]
    pub async fn mark_resumable(&self, batch_id: Uuid) -> OperationResult<batch_job::Model> {
        let result = async {
            let batch = self.jobs.get(batch_id).await?;
            state::transition(batch.batch_status(), BatchAction::Park)?;
            self.checked_file(&batch).await?;
            let batch = self.jobs.transition(batch_id, BatchAction::Park).await?;
            self.audit(
                batch_id,
                format!("batch resumable after row {}", batch.last_processed_row),
            )
            .await?;
            Ok::<_, IngestError>(batch)
        }
        .await;

        match result {
            Ok(batch) => OperationResult::ok(batch),
            Err(err) => self.rejected("mark resumable", batch_id, err),
        }
    }

    /// Continues a paused or resumable batch right after its cursor. Counters
    /// add to what earlier runs stored.
    #[instrument(skip(self), fields(batch_id = %batch_id))]
    pub async fn resume(&self, batch_id: Uuid) -> OperationResult<batch_job::Model> {
        match self.prepare_resume(batch_id).await {
            Ok(()) => self.process(batch_id).await,
            Err(err) => self.rejected("resume", batch_id, err),
        }
    }

    async fn prepare_resume(&self, batch_id: Uuid) -> Result<(), IngestError> {
        let batch = self.jobs.get(batch_id).await?;
        state::transition(batch.batch_status(), BatchAction::Resume)?;
        self.checked_file(&batch).await?;

        let batch = self.jobs.transition(batch_id, BatchAction::Resume).await?;
        self.audit(
            batch_id,
            format!("batch resumed after row {}", batch.last_processed_row),
        )
        .await
    }

    /// Reprocesses a failed batch from its first row with a fresh log.
    ///
    /// Products written by earlier attempts stay, so their rows now fail the
    /// SKU check.
    #[instrument(skip(self), fields(batch_id = %batch_id))]
    pub async fn retry(&self, batch_id: Uuid) -> OperationResult<batch_job::Model> {
        match self.prepare_retry(batch_id).await {
            Ok(()) => self.process(batch_id).await,
            Err(err) => self.rejected("retry", batch_id, err),
        }
    }

    async fn prepare_retry(&self, batch_id: Uuid) -> Result<(), IngestError> {
        let batch = self.jobs.get(batch_id).await?;
        state::transition(batch.batch_status(), BatchAction::Retry)?;
        let path = self.checked_file(&batch).await?;
        let total = count_stored(self.store.open(&path).await?).await?;

        let batch = self.jobs.transition(batch_id, BatchAction::Retry).await?;
        let cleared = self.errors.clear(batch_id).await?;
        self.jobs
            .save_progress(batch_id, &BatchProgress::from_model(&batch).with_total(total))
            .await?;
        self.audit(
            batch_id,
            format!(
                "retry #{} started with {total} records; {cleared} earlier log entries cleared",
                batch.retry_count
            ),
        )
        .await
    }

    /// Terminal. A running worker notices before its next row.
    #[instrument(skip(self), fields(batch_id = %batch_id))]
    pub async fn cancel(&self, batch_id: Uuid) -> OperationResult<batch_job::Model> {
        match self.try_cancel(batch_id).await {
            Ok(batch) => OperationResult::ok(batch),
            Err(err) => self.rejected("cancel", batch_id, err),
        }
    }

    async fn try_cancel(&self, batch_id: Uuid) -> Result<batch_job::Model, IngestError> {
        let batch = self.jobs.transition(batch_id, BatchAction::Cancel).await?;
        self.audit(
            batch_id,
            format!("batch cancelled after row {}", batch.last_processed_row),
        )
        .await?;
        if self.config.cleanup_on_complete {
            self.release_file(&batch).await;
        }
        Ok(batch)
    }

    /// Removes a batch that is not running, its log, and its stored file.
    #[instrument(skip(self), fields(batch_id = %batch_id))]
    pub async fn delete(&self, batch_id: Uuid) -> OperationResult<batch_job::Model> {
        match self.try_delete(batch_id).await {
            Ok(batch) => OperationResult::ok(batch),
            Err(err) => self.rejected("delete", batch_id, err),
        }
    }

    async fn try_delete(&self, batch_id: Uuid) -> Result<batch_job::Model, IngestError> {
        let batch = self.jobs.get(batch_id).await?;
        let status = batch.batch_status();
        if status.is_running() {
            return Err(IngestError::InvalidTransition {
                action: "delete",
                from: status,
                allowed: vec![
                    BatchStatus::Pending,
                    BatchStatus::Paused,
                    BatchStatus::Resumable,
                    BatchStatus::Completed,
                    BatchStatus::Failed,
                    BatchStatus::Cancelled,
                ],
            });
        }

        if let Some(path) = &batch.file_path {
            self.store.remove(path).await?;
        }
        self.errors.clear(batch_id).await?;
        self.jobs.delete(batch_id).await?;

        info!(batch_id = %batch_id, "Batch deleted");
        Ok(batch)
    }

    /// CSV skeleton listing the fixed columns and known attributes.
    pub async fn template(&self, catalog_id: Option<i32>) -> OperationResult<String> {
        template::generate(&self.db, catalog_id, &self.config.attribute_prefix)
            .await
            .into()
    }

    /// Runs the row loop for a batch that is already `processing` or
    /// `retrying`.
    ///
    /// The worker first claims a new run of the batch. Any worker still
    /// holding an older run stops at its next row without writing it. An
    /// error escaping the loop is logged as a system entry and moves the
    /// batch to `failed`.
    #[instrument(skip(self), fields(batch_id = %batch_id))]
    pub async fn process(&self, batch_id: Uuid) -> OperationResult<batch_job::Model> {
        let claimed = match self.jobs.claim_run(batch_id).await {
            Ok(batch) => batch,
            Err(err) => return self.rejected("process", batch_id, err),
        };

        match self.drive(&claimed).await {
            Ok(batch) => self.outcome(batch).await,
            Err(err) => self.abort(&claimed, err).await,
        }
    }

    async fn drive(&self, claimed: &batch_job::Model) -> Result<batch_job::Model, IngestError> {
        let batch_id = claimed.id;
        let scope = RunScope {
            batch_id,
            run: claimed.run_generation,
        };
        let path = claimed
            .file_path
            .clone()
            .ok_or(IngestError::FileNotAttached { batch_id })?;

        let validator = Validator::new(
            self.config.attribute_prefix.as_str(),
            self.config.discount_tolerance,
            claimed.default_catalog_id.is_some(),
        );
        let mut progress = BatchProgress::from_model(claimed);
        let mut rows = StoredRows::open(self.store.open(&path).await?, progress.cursor).await?;

        debug!(
            batch_id = %batch_id,
            run = scope.run,
            cursor = progress.cursor,
            total = progress.total,
            "Row loop starting"
        );

        loop {
            let current = self.jobs.get(batch_id).await?;
            if current.run_generation != scope.run {
                info!(batch_id = %batch_id, run = scope.run, "Row loop superseded by a newer run");
                return Ok(current);
            }
            match current.batch_status() {
                BatchStatus::Paused => return self.park(scope, progress).await,
                status if status.is_running() => {}
                status => {
                    info!(batch_id = %batch_id, status = %status, "Row loop stopped");
                    return Ok(current);
                }
            }

            let Some(item) = rows.next().await else {
                break;
            };
            match self.process_row(claimed, scope, &validator, progress, item?).await? {
                RowCommit::Committed(next) => progress = next,
                RowCommit::Superseded => {
                    info!(batch_id = %batch_id, run = scope.run, "Row loop superseded by a newer run");
                    return self.jobs.get(batch_id).await;
                }
            }
        }

        self.finish(scope, progress).await
    }

    /// Validates and writes one row, returning the updated counters once
    /// they are stored. Row failures are logged and counted; only
    /// infrastructure errors escape.
    async fn process_row(
        &self,
        batch: &batch_job::Model,
        scope: RunScope,
        validator: &Validator,
        progress: BatchProgress,
        item: RowItem,
    ) -> Result<RowCommit<BatchProgress>, IngestError> {
        let row = match item {
            RowItem::Row(row) => row,
            RowItem::Malformed { index, message } => {
                let issues = [RowIssue::validation_error(index, "row", message)];
                report_issues(batch.id, &issues);
                return self
                    .reject_row(scope, &issues, progress.row_failed(index), RowOutcome::Rejected)
                    .await;
            }
        };
        let index = row.index;

        let mut validation = validator.validate(&row);
        if let Some(sku) = row.get("product_sku") {
            let slug = slugify(sku);
            if !slug.is_empty() && ProductRepository::slug_exists(&self.db, &slug).await? {
                validation.reject(Validator::slug_taken(index, sku, &slug));
            }
        }
        report_issues(batch.id, &validation.issues);

        let Some(draft) = validation.draft else {
            return self
                .reject_row(
                    scope,
                    &validation.issues,
                    progress.row_failed(index),
                    RowOutcome::Rejected,
                )
                .await;
        };

        let succeeded = progress.row_succeeded(index);
        let written = match resolver::resolve(&self.db, &draft, batch.default_catalog_id).await {
            Ok(refs) => {
                writer::write_product(&self.db, scope, draft, refs, &validation.issues, &succeeded)
                    .await
            }
            Err(err) => Err(err),
        };

        match written {
            Ok(RowCommit::Committed(product)) => {
                debug!(batch_id = %batch.id, row = index, product_id = product.id, "Row imported");
                telemetry::record_row(RowOutcome::Imported);
                Ok(RowCommit::Committed(succeeded))
            }
            Ok(RowCommit::Superseded) => Ok(RowCommit::Superseded),
            Err(err) => {
                warn!(batch_id = %batch.id, row = index, error = %err, "Row write failed");
                let failure = RowIssue::processing(index, err.to_string());
                report_issues(batch.id, std::slice::from_ref(&failure));

                let mut issues = validation.issues;
                issues.push(failure);
                self.reject_row(scope, &issues, progress.row_failed(index), RowOutcome::Failed)
                    .await
            }
        }
    }

    /// Stores a row that produced no product together with its log entries.
    async fn reject_row(
        &self,
        scope: RunScope,
        issues: &[RowIssue],
        progress: BatchProgress,
        outcome: RowOutcome,
    ) -> Result<RowCommit<BatchProgress>, IngestError> {
        match writer::write_rejection(&self.db, scope, issues, &progress).await? {
            RowCommit::Committed(()) => {
                telemetry::record_row(outcome);
                Ok(RowCommit::Committed(progress))
            }
            RowCommit::Superseded => Ok(RowCommit::Superseded),
        }
    }

    /// Worker side of a pause: `paused -> resumable` for its own run.
    async fn park(
        &self,
        scope: RunScope,
        progress: BatchProgress,
    ) -> Result<batch_job::Model, IngestError> {
        let batch = match self
            .jobs
            .transition_in_run(scope.batch_id, BatchAction::Park, scope.run)
            .await
        {
            Ok(batch) => batch,
            Err(err) => return self.settle(err, scope.batch_id).await,
        };
        self.audit(
            scope.batch_id,
            format!("batch resumable after row {}", progress.cursor),
        )
        .await?;
        Ok(batch)
    }

    async fn finish(
        &self,
        scope: RunScope,
        progress: BatchProgress,
    ) -> Result<batch_job::Model, IngestError> {
        let batch_id = scope.batch_id;
        let action = if progress.has_errors() {
            BatchAction::Fail
        } else {
            BatchAction::Complete
        };
        let batch = match self
            .jobs
            .transition_in_run(batch_id, action, scope.run)
            .await
        {
            Ok(batch) => batch,
            Err(err) => return self.settle(err, batch_id).await,
        };
        let status = batch.batch_status();

        self.audit(
            batch_id,
            format!(
                "batch {status}: {} of {} rows imported, {} failed",
                progress.success, progress.processed, progress.errors
            ),
        )
        .await?;
        telemetry::record_batch_finished(status);
        info!(
            batch_id = %batch_id,
            status = %status,
            success = progress.success,
            errors = progress.errors,
            "Batch finished"
        );

        if status == BatchStatus::Completed && self.config.cleanup_on_complete {
            self.release_file(&batch).await;
            return self.jobs.get(batch_id).await;
        }
        Ok(batch)
    }

    /// A transition lost to an operator request or a newer run leaves the
    /// batch as they put it.
    async fn settle(
        &self,
        err: IngestError,
        batch_id: Uuid,
    ) -> Result<batch_job::Model, IngestError> {
        match err {
            IngestError::InvalidTransition { from, .. } => {
                info!(batch_id = %batch_id, status = %from, "Batch moved by another request");
                self.jobs.get(batch_id).await
            }
            IngestError::RunSuperseded { run, .. } => {
                info!(batch_id = %batch_id, run, "Batch taken over by a newer run");
                self.jobs.get(batch_id).await
            }
            other => Err(other),
        }
    }

    /// Fails the batch after the loop of run `claimed` crashed, unless the
    /// batch has moved on without it.
    async fn abort(
        &self,
        claimed: &batch_job::Model,
        err: IngestError,
    ) -> OperationResult<batch_job::Model> {
        let batch_id = claimed.id;
        error!(batch_id = %batch_id, error = %err, "Batch processing aborted");

        match self.jobs.force_failed(batch_id, claimed.run_generation).await {
            Ok(true) => {
                let issue = RowIssue::system(0, format!("processing aborted: {err}"));
                telemetry::record_issue(&issue);
                if let Err(log_err) = self.errors.append(batch_id, &issue).await {
                    error!(batch_id = %batch_id, error = %log_err, "Failed to record abort");
                }
                telemetry::record_batch_finished(BatchStatus::Failed);
            }
            Ok(false) => {
                info!(batch_id = %batch_id, "Batch no longer held by this run; left as is");
            }
            Err(state_err) => {
                error!(batch_id = %batch_id, error = %state_err, "Failed to mark batch failed");
            }
        }

        let row_errors = self.errors.list_blocking(batch_id).await.unwrap_or_default();
        OperationResult::fail(OperationError::from(&err).with_row_errors(row_errors))
    }

    async fn outcome(&self, batch: batch_job::Model) -> OperationResult<batch_job::Model> {
        if batch.batch_status() != BatchStatus::Failed {
            return OperationResult::ok(batch);
        }

        match self.errors.list_blocking(batch.id).await {
            Ok(row_errors) => {
                let error = OperationError::new(
                    "BATCH_FAILED".to_string(),
                    format!(
                        "{} of {} rows failed",
                        batch.error_count, batch.processed_records
                    ),
                )
                .with_row_errors(row_errors);
                OperationResult::fail_with(batch, error)
            }
            Err(err) => OperationResult::fail(err),
        }
    }

    /// Path of the batch's stored file. A missing file is also written to
    /// the batch log as a system error.
    async fn checked_file(&self, batch: &batch_job::Model) -> Result<String, IngestError> {
        let checked = match &batch.file_path {
            None => Err(IngestError::FileNotAttached { batch_id: batch.id }),
            Some(path) => {
                if self.store.exists(path).await? {
                    Ok(path.clone())
                } else {
                    Err(IngestError::FileMissing { path: path.clone() })
                }
            }
        };

        if let Err(err) = &checked {
            let issue = RowIssue::system(0, err.to_string());
            telemetry::record_issue(&issue);
            self.errors.append(batch.id, &issue).await?;
        }
        checked
    }

    async fn release_file(&self, batch: &batch_job::Model) {
        let Some(path) = &batch.file_path else {
            return;
        };
        let released = async {
            self.store.remove(path).await?;
            self.jobs.detach_file(batch.id).await
        }
        .await;
        if let Err(err) = released {
            warn!(batch_id = %batch.id, error = %err, "Failed to remove batch file");
        }
    }

    async fn audit(&self, batch_id: Uuid, message: String) -> Result<(), IngestError> {
        info!(batch_id = %batch_id, "{message}");
        self.errors.append(batch_id, &RowIssue::audit(message)).await
    }

    fn rejected<T>(
        &self,
        action: &str,
        batch_id: Uuid,
        err: IngestError,
    ) -> OperationResult<T> {
        warn!(batch_id = %batch_id, action, error = %err, "Batch operation rejected");
        OperationResult::fail(err)
    }
}

/// Traces and counts row issues; storing them is part of the row's commit.
fn report_issues(batch_id: Uuid, issues: &[RowIssue]) {
    for issue in issues {
        telemetry::record_issue(issue);
        match issue.severity {
            Severity::Error => debug!(
                batch_id = %batch_id,
                row = issue.row,
                field = issue.field.as_deref(),
                "{}", issue.message
            ),
            _ => warn!(
                batch_id = %batch_id,
                row = issue.row,
                field = issue.field.as_deref(),
                "{}", issue.message
            ),
        }
    }
}
