//! # Data Models
//!
//! SeaORM entities for batch jobs, their error log, the shared reference
//! dictionaries and the products created by ingestion.

pub mod attribute;
pub mod attribute_option;
pub mod batch_job;
pub mod batch_row_error;
pub mod catalog;
pub mod category;
pub mod product;
pub mod product_attribute;
pub mod supplier;

pub use attribute::Entity as Attribute;
pub use attribute_option::Entity as AttributeOption;
pub use batch_job::Entity as BatchJob;
pub use batch_row_error::Entity as BatchRowError;
pub use catalog::Entity as Catalog;
pub use category::Entity as Category;
pub use product::Entity as Product;
pub use product_attribute::Entity as ProductAttribute;
pub use supplier::Entity as Supplier;
