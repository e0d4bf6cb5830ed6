//! # Ingestion
//!
//! The batch pipeline: streaming the stored CSV, validating each row,
//! resolving reference data, writing products with their attribute
//! selections, and the lifecycle state machine that drives it all.

pub mod attributes;
pub mod engine;
pub mod progress;
pub mod reader;
pub mod resolver;
pub mod state;
pub mod template;
pub mod validator;
pub mod writer;

pub use engine::{BatchEngine, BatchSummary, CreateBatchOptions};
pub use progress::BatchProgress;
pub use state::{BatchAction, BatchStatus};
pub use validator::Validator;
