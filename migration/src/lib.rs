//! Database migrations for the catalog ingestion engine.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_01_05_000001_create_batch_jobs;
mod m2026_01_05_000002_create_batch_row_errors;
mod m2026_01_05_000003_create_reference_tables;
mod m2026_01_05_000004_create_attributes;
mod m2026_01_05_000005_create_products;
mod m2026_01_05_000006_add_batch_run_generation;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_01_05_000001_create_batch_jobs::Migration),
            Box::new(m2026_01_05_000002_create_batch_row_errors::Migration),
            Box::new(m2026_01_05_000003_create_reference_tables::Migration),
            Box::new(m2026_01_05_000004_create_attributes::Migration),
            Box::new(m2026_01_05_000005_create_products::Migration),
            Box::new(m2026_01_05_000006_add_batch_run_generation::Migration),
        ]
    }
}
