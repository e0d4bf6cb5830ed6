//! # BatchJob Repository
//!
//! Repository operations for the batch_jobs table. Status changes are
//! compare-and-set on the current status so an operator request and the
//! worker cannot overwrite each other. Worker writes are further scoped to
//! the run generation the worker claimed, so a superseded worker can no
//! longer touch the batch.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use uuid::Uuid;

use crate::error::IngestError;
use crate::ingest::progress::BatchProgress;
use crate::ingest::state::{self, BatchAction, BatchStatus};
use crate::models::batch_job::{ActiveModel, Column, Entity, Model};

/// Repository for batch job database operations
#[derive(Clone)]
pub struct BatchJobRepository {
    db: DatabaseConnection,
}

impl BatchJobRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Insert a new `pending` batch with zeroed counters
    pub async fn create(
        &self,
        filename: &str,
        default_catalog_id: Option<i32>,
    ) -> Result<Model, IngestError> {
        let now = Utc::now().fixed_offset();

        let batch = ActiveModel {
            id: Set(Uuid::new_v4()),
            filename: Set(filename.to_string()),
            file_path: Set(None),
            status: Set(BatchStatus::Pending.as_str().to_string()),
            default_catalog_id: Set(default_catalog_id),
            total_records: Set(0),
            processed_records: Set(0),
            success_count: Set(0),
            error_count: Set(0),
            last_processed_row: Set(0),
            retry_count: Set(0),
            run_generation: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
            started_at: Set(None),
            paused_at: Set(None),
            resumed_at: Set(None),
            completed_at: Set(None),
            cancelled_at: Set(None),
            failed_at: Set(None),
        };

        let result = batch.insert(&self.db).await?;

        tracing::info!(batch_id = %result.id, filename = %result.filename, "Batch created");

        Ok(result)
    }

    pub async fn find(&self, batch_id: Uuid) -> Result<Option<Model>, IngestError> {
        Ok(Entity::find_by_id(batch_id).one(&self.db).await?)
    }

    /// Like [`find`](Self::find) but a missing batch is an error.
    pub async fn get(&self, batch_id: Uuid) -> Result<Model, IngestError> {
        self.find(batch_id)
            .await?
            .ok_or(IngestError::BatchNotFound(batch_id))
    }

    /// List batches, newest first, optionally filtered by status
    pub async fn list(&self, status: Option<BatchStatus>) -> Result<Vec<Model>, IngestError> {
        let mut query = Entity::find().order_by_desc(Column::CreatedAt);

        if let Some(status) = status {
            query = query.filter(Column::Status.eq(status.as_str()));
        }

        Ok(query.all(&self.db).await?)
    }

    pub async fn attach_file(&self, batch_id: Uuid, path: &str) -> Result<Model, IngestError> {
        let batch = self.get(batch_id).await?;

        let mut active: ActiveModel = batch.into();
        active.file_path = Set(Some(path.to_string()));
        active.updated_at = Set(Utc::now().fixed_offset());

        Ok(active.update(&self.db).await?)
    }

    pub async fn detach_file(&self, batch_id: Uuid) -> Result<(), IngestError> {
        Entity::update_many()
            .col_expr(Column::FilePath, Expr::value(Option::<String>::None))
            .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(Column::Id.eq(batch_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Persist counters and cursor. Never touches the status column.
    pub async fn save_progress(
        &self,
        batch_id: Uuid,
        progress: &BatchProgress,
    ) -> Result<(), IngestError> {
        progress_update(progress)
            .filter(Column::Id.eq(batch_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Persist counters for run `run` only. Returns `false` when another
    /// worker has claimed the batch since, in which case nothing is written.
    ///
    /// Takes any connection so the row loop can commit a row's product, log
    /// entries and cursor together.
    pub async fn save_run_progress<C: ConnectionTrait>(
        conn: &C,
        batch_id: Uuid,
        run: i32,
        progress: &BatchProgress,
    ) -> Result<bool, IngestError> {
        let result = progress_update(progress)
            .filter(Column::Id.eq(batch_id))
            .filter(Column::RunGeneration.eq(run))
            .exec(conn)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Takes the batch over for a new worker by bumping its run generation.
    ///
    /// The bump is compare-and-set on the generation that was read, so two
    /// workers claiming at once never end up with the same value.
    pub async fn claim_run(&self, batch_id: Uuid) -> Result<Model, IngestError> {
        loop {
            let current = self.get(batch_id).await?;
            let result = Entity::update_many()
                .col_expr(
                    Column::RunGeneration,
                    Expr::value(current.run_generation + 1),
                )
                .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
                .filter(Column::Id.eq(batch_id))
                .filter(Column::RunGeneration.eq(current.run_generation))
                .exec(&self.db)
                .await?;

            if result.rows_affected > 0 {
                let claimed = self.get(batch_id).await?;
                tracing::debug!(
                    batch_id = %batch_id,
                    run = claimed.run_generation,
                    "Batch run claimed"
                );
                return Ok(claimed);
            }
        }
    }

    /// Apply `action` to the batch if its stored status still allows it.
    ///
    /// Side columns follow the action: timestamps, the pause cursor, and the
    /// counter reset plus retry count bump on retry.
    pub async fn transition(
        &self,
        batch_id: Uuid,
        action: BatchAction,
    ) -> Result<Model, IngestError> {
        self.apply(batch_id, action, None).await
    }

    /// Like [`transition`](Self::transition), for the worker holding `run`.
    /// Fails with [`IngestError::RunSuperseded`] once another worker claimed
    /// the batch.
    pub async fn transition_in_run(
        &self,
        batch_id: Uuid,
        action: BatchAction,
        run: i32,
    ) -> Result<Model, IngestError> {
        self.apply(batch_id, action, Some(run)).await
    }

    async fn apply(
        &self,
        batch_id: Uuid,
        action: BatchAction,
        run: Option<i32>,
    ) -> Result<Model, IngestError> {
        let current = self.get(batch_id).await?;
        if let Some(run) = run
            && current.run_generation != run
        {
            return Err(IngestError::RunSuperseded { batch_id, run });
        }
        let from = current.batch_status();
        let to = state::transition(from, action)?;
        let now = Utc::now().fixed_offset();
        let none = Option::<chrono::DateTime<chrono::FixedOffset>>::None;

        let mut update = Entity::update_many()
            .col_expr(Column::Status, Expr::value(to.as_str()))
            .col_expr(Column::UpdatedAt, Expr::value(now));

        update = match action {
            BatchAction::Start => update.col_expr(Column::StartedAt, Expr::value(now)),
            BatchAction::Pause => update
                .col_expr(Column::PausedAt, Expr::value(now))
                .col_expr(
                    Column::LastProcessedRow,
                    Expr::col(Column::ProcessedRecords).into(),
                ),
            BatchAction::Park => update,
            BatchAction::Resume => update.col_expr(Column::ResumedAt, Expr::value(now)),
            BatchAction::Retry => update
                .col_expr(Column::StartedAt, Expr::value(now))
                .col_expr(Column::FailedAt, Expr::value(none))
                .col_expr(Column::ProcessedRecords, Expr::value(0))
                .col_expr(Column::SuccessCount, Expr::value(0))
                .col_expr(Column::ErrorCount, Expr::value(0))
                .col_expr(Column::LastProcessedRow, Expr::value(0))
                .col_expr(Column::RetryCount, Expr::col(Column::RetryCount).add(1)),
            BatchAction::Cancel => update.col_expr(Column::CancelledAt, Expr::value(now)),
            BatchAction::Complete => update.col_expr(Column::CompletedAt, Expr::value(now)),
            BatchAction::Fail => update.col_expr(Column::FailedAt, Expr::value(now)),
        };

        let mut update = update
            .filter(Column::Id.eq(batch_id))
            .filter(Column::Status.eq(from.as_str()));
        if let Some(run) = run {
            update = update.filter(Column::RunGeneration.eq(run));
        }
        let result = update.exec(&self.db).await?;

        if result.rows_affected == 0 {
            // Someone else moved the batch between our read and write.
            let latest = self.get(batch_id).await?;
            if let Some(run) = run
                && latest.run_generation != run
            {
                return Err(IngestError::RunSuperseded { batch_id, run });
            }
            return Err(IngestError::InvalidTransition {
                action: action.verb(),
                from: latest.batch_status(),
                allowed: action.allowed_from().to_vec(),
            });
        }

        tracing::info!(
            batch_id = %batch_id,
            from = %from,
            to = %to,
            "Batch status changed"
        );

        self.get(batch_id).await
    }

    /// Force a running batch into `failed` after run `run` crashed. A batch
    /// that is no longer running, or that another worker took over, is left
    /// alone. Returns whether the batch was failed.
    pub async fn force_failed(&self, batch_id: Uuid, run: i32) -> Result<bool, IngestError> {
        let now = Utc::now().fixed_offset();
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(BatchStatus::Failed.as_str()))
            .col_expr(Column::FailedAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(batch_id))
            .filter(Column::Status.is_in([
                BatchStatus::Processing.as_str(),
                BatchStatus::Retrying.as_str(),
            ]))
            .filter(Column::RunGeneration.eq(run))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn delete(&self, batch_id: Uuid) -> Result<bool, IngestError> {
        let result = Entity::delete_by_id(batch_id).exec(&self.db).await?;
        Ok(result.rows_affected > 0)
    }
}

fn progress_update(progress: &BatchProgress) -> sea_orm::UpdateMany<Entity> {
    Entity::update_many()
        .col_expr(Column::TotalRecords, Expr::value(progress.total))
        .col_expr(Column::ProcessedRecords, Expr::value(progress.processed))
        .col_expr(Column::SuccessCount, Expr::value(progress.success))
        .col_expr(Column::ErrorCount, Expr::value(progress.errors))
        .col_expr(Column::LastProcessedRow, Expr::value(progress.cursor))
        .col_expr(Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
}
