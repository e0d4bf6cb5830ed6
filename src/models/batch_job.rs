//! BatchJob entity model
//!
//! This module contains the SeaORM entity model for the batch_jobs table,
//! which tracks one uploaded catalog file through its ingestion lifecycle.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Serialize;
use uuid::Uuid;

use crate::ingest::state::BatchStatus;

/// BatchJob entity representing one CSV upload and its processing state
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "batch_jobs")]
pub struct Model {
    /// Unique identifier for the batch (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Original name of the uploaded file
    pub filename: String,

    /// Location of the stored CSV, set once a file is attached
    pub file_path: Option<String>,

    /// Current lifecycle status (see [`BatchStatus`])
    pub status: String,

    /// Catalog used for rows that name no catalog of their own
    pub default_catalog_id: Option<i32>,

    /// Number of data rows in the file
    pub total_records: i32,

    /// Rows processed so far, accepted or rejected
    pub processed_records: i32,

    /// Rows that produced a product
    pub success_count: i32,

    /// Rows that were rejected or failed to write
    pub error_count: i32,

    /// Resume cursor: index of the last fully processed row
    pub last_processed_row: i32,

    /// Number of times the batch was retried after failing
    pub retry_count: i32,

    /// Bumped by every worker that takes over the batch; only the holder of
    /// the current value may write progress or finish the run
    pub run_generation: i32,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
    pub started_at: Option<DateTimeWithTimeZone>,
    pub paused_at: Option<DateTimeWithTimeZone>,
    pub resumed_at: Option<DateTimeWithTimeZone>,
    pub completed_at: Option<DateTimeWithTimeZone>,
    pub cancelled_at: Option<DateTimeWithTimeZone>,
    pub failed_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Parsed lifecycle status. Unknown values read as `Failed` so they can be retried.
    pub fn batch_status(&self) -> BatchStatus {
        self.status.parse().unwrap_or(BatchStatus::Failed)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::batch_row_error::Entity")]
    BatchRowError,
}

impl Related<super::batch_row_error::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BatchRowError.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
