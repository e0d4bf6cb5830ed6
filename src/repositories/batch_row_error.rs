//! # Batch error log repository
//!
//! Append-only access to batch_row_errors. The only destructive operation is
//! clearing a batch's entries before a retry.

use chrono::Utc;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{IngestError, IssueType, RowIssue, Severity};
use crate::models::batch_row_error::{ActiveModel, Column, Entity, Model};

/// Entry counts per issue type and severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IssueCounts {
    pub validation: u64,
    pub processing: u64,
    pub system: u64,
    pub warnings: u64,
    pub audit: u64,
}

#[derive(Clone)]
pub struct BatchErrorRepository {
    db: DatabaseConnection,
}

impl BatchErrorRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn append(&self, batch_id: Uuid, issue: &RowIssue) -> Result<(), IngestError> {
        self.append_many(batch_id, std::slice::from_ref(issue))
            .await
    }

    pub async fn append_many(&self, batch_id: Uuid, issues: &[RowIssue]) -> Result<(), IngestError> {
        Self::append_on(&self.db, batch_id, issues).await
    }

    /// Appends on the given connection, e.g. inside a row transaction.
    pub async fn append_on<C: ConnectionTrait>(
        conn: &C,
        batch_id: Uuid,
        issues: &[RowIssue],
    ) -> Result<(), IngestError> {
        if issues.is_empty() {
            return Ok(());
        }

        let now = Utc::now().fixed_offset();
        let rows = issues.iter().map(|issue| ActiveModel {
            batch_id: Set(batch_id),
            row_index: Set(issue.row),
            error_type: Set(issue.issue_type.as_str().to_string()),
            severity: Set(issue.severity.as_str().to_string()),
            message: Set(issue.message.clone()),
            field: Set(issue.field.clone()),
            created_at: Set(now),
            ..Default::default()
        });

        Entity::insert_many(rows).exec(conn).await?;
        Ok(())
    }

    /// Entries for a batch in row order, then insertion order
    pub async fn list(&self, batch_id: Uuid) -> Result<Vec<Model>, IngestError> {
        Ok(Entity::find()
            .filter(Column::BatchId.eq(batch_id))
            .order_by_asc(Column::RowIndex)
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?)
    }

    /// Entries that block a row or abort a batch (severity `error`)
    pub async fn list_blocking(&self, batch_id: Uuid) -> Result<Vec<Model>, IngestError> {
        Ok(Entity::find()
            .filter(Column::BatchId.eq(batch_id))
            .filter(Column::Severity.eq(Severity::Error.as_str()))
            .order_by_asc(Column::RowIndex)
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await?)
    }

    pub async fn count_by_type(
        &self,
        batch_id: Uuid,
        issue_type: IssueType,
        severity: Severity,
    ) -> Result<u64, IngestError> {
        Ok(Entity::find()
            .filter(Column::BatchId.eq(batch_id))
            .filter(Column::ErrorType.eq(issue_type.as_str()))
            .filter(Column::Severity.eq(severity.as_str()))
            .count(&self.db)
            .await?)
    }

    pub async fn counts(&self, batch_id: Uuid) -> Result<IssueCounts, IngestError> {
        let warnings = Entity::find()
            .filter(Column::BatchId.eq(batch_id))
            .filter(Column::Severity.eq(Severity::Warning.as_str()))
            .count(&self.db)
            .await?;

        Ok(IssueCounts {
            validation: self
                .count_by_type(batch_id, IssueType::Validation, Severity::Error)
                .await?,
            processing: self
                .count_by_type(batch_id, IssueType::Processing, Severity::Error)
                .await?,
            system: self
                .count_by_type(batch_id, IssueType::System, Severity::Error)
                .await?,
            warnings,
            audit: self
                .count_by_type(batch_id, IssueType::System, Severity::Info)
                .await?,
        })
    }

    /// Remove every entry for a batch; returns how many were deleted.
    pub async fn clear(&self, batch_id: Uuid) -> Result<u64, IngestError> {
        let result = Entity::delete_many()
            .filter(Column::BatchId.eq(batch_id))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
