//! # Catalog Ingest
//!
//! Batch ingestion of supplier product catalogs from CSV files: per-row
//! validation, reference-data resolution, transactional product writes and
//! a pausable, resumable and retryable batch lifecycle with a persistent
//! error log.

pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod models;
pub mod repositories;
pub mod slug;
pub mod storage;
pub mod telemetry;
pub use migration;
