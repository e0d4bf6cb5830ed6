//! BatchRowError entity model
//!
//! Append-only log entries attached to a batch: row-level validation and
//! processing issues, system failures and operator audit notes.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "batch_row_errors")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub batch_id: Uuid,

    /// 1-based data row index; 0 for batch-level entries
    pub row_index: i32,

    /// `validation`, `processing` or `system`
    pub error_type: String,

    /// `error`, `warning` or `info`
    pub severity: String,

    pub message: String,

    /// CSV column the issue refers to, when there is one
    pub field: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::batch_job::Entity",
        from = "Column::BatchId",
        to = "super::batch_job::Column::Id",
        on_delete = "Cascade"
    )]
    BatchJob,
}

impl Related<super::batch_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BatchJob.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
