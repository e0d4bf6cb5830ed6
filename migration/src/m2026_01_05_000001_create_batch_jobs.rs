//! Migration to create the batch_jobs table.
//!
//! One row per uploaded catalog file, carrying the lifecycle status, progress
//! counters and the row cursor used to resume interrupted ingestion.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BatchJobs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(BatchJobs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(BatchJobs::Filename).text().not_null())
                    .col(ColumnDef::new(BatchJobs::FilePath).text().null())
                    .col(
                        ColumnDef::new(BatchJobs::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(BatchJobs::DefaultCatalogId).integer().null())
                    .col(
                        ColumnDef::new(BatchJobs::TotalRecords)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BatchJobs::ProcessedRecords)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BatchJobs::SuccessCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BatchJobs::ErrorCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BatchJobs::LastProcessedRow)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BatchJobs::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BatchJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(BatchJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(BatchJobs::StartedAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(BatchJobs::PausedAt).timestamp_with_time_zone().null())
                    .col(ColumnDef::new(BatchJobs::ResumedAt).timestamp_with_time_zone().null())
                    .col(
                        ColumnDef::new(BatchJobs::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(BatchJobs::CancelledAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(BatchJobs::FailedAt).timestamp_with_time_zone().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_batch_jobs_status_created")
                    .table(BatchJobs::Table)
                    .col(BatchJobs::Status)
                    .col(BatchJobs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_batch_jobs_status_created").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(BatchJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum BatchJobs {
    Table,
    Id,
    Filename,
    FilePath,
    Status,
    DefaultCatalogId,
    TotalRecords,
    ProcessedRecords,
    SuccessCount,
    ErrorCount,
    LastProcessedRow,
    RetryCount,
    CreatedAt,
    UpdatedAt,
    StartedAt,
    PausedAt,
    ResumedAt,
    CompletedAt,
    CancelledAt,
    FailedAt,
}
