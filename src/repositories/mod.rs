//! # Repository Layer
//!
//! Repositories encapsulate the SeaORM operations behind the engine. Batch
//! and error-log repositories own a pooled connection; dictionary and product
//! repositories take any connection so they can run inside a row transaction.

pub mod attribute;
pub mod batch_job;
pub mod batch_row_error;
pub mod product;
pub mod reference;

pub use attribute::AttributeRepository;
pub use batch_job::BatchJobRepository;
pub use batch_row_error::{BatchErrorRepository, IssueCounts};
pub use product::{NewProduct, ProductRepository};
pub use reference::ReferenceRepository;
