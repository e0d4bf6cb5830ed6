//! Adds the run generation to batch_jobs.
//!
//! Each worker that takes over a batch bumps the generation and only writes
//! progress or status while the stored value is still its own.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(BatchJobs::Table)
                    .add_column(
                        ColumnDef::new(BatchJobs::RunGeneration)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(BatchJobs::Table)
                    .drop_column(BatchJobs::RunGeneration)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum BatchJobs {
    Table,
    RunGeneration,
}
