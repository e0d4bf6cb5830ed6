//! Migration to create the batch_row_errors table.
//!
//! Append-only log of per-row issues and operator audit notes. Rows cascade
//! away with their batch.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BatchRowErrors::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BatchRowErrors::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BatchRowErrors::BatchId).uuid().not_null())
                    .col(ColumnDef::new(BatchRowErrors::RowIndex).integer().not_null())
                    .col(ColumnDef::new(BatchRowErrors::ErrorType).text().not_null())
                    .col(ColumnDef::new(BatchRowErrors::Severity).text().not_null())
                    .col(ColumnDef::new(BatchRowErrors::Message).text().not_null())
                    .col(ColumnDef::new(BatchRowErrors::Field).text().null())
                    .col(
                        ColumnDef::new(BatchRowErrors::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_batch_row_errors_batch_id")
                            .from(BatchRowErrors::Table, BatchRowErrors::BatchId)
                            .to(BatchJobs::Table, BatchJobs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_batch_row_errors_batch_row")
                    .table(BatchRowErrors::Table)
                    .col(BatchRowErrors::BatchId)
                    .col(BatchRowErrors::RowIndex)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_batch_row_errors_batch_row").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(BatchRowErrors::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum BatchRowErrors {
    Table,
    Id,
    BatchId,
    RowIndex,
    ErrorType,
    Severity,
    Message,
    Field,
    CreatedAt,
}

#[derive(DeriveIden)]
enum BatchJobs {
    Table,
    Id,
}
