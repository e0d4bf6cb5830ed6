//! Category, catalog and supplier resolution.
//!
//! A supplied id is used as-is once it is known to exist; otherwise the name
//! is matched case-insensitively and created when absent. Resolution runs on
//! the pooled connection ahead of the row transaction, so dictionary rows it
//! creates stay committed even if the product write later rolls back.

use sea_orm::ConnectionTrait;

use crate::error::IngestError;
use crate::ingest::validator::{ProductDraft, ReferenceKey};
use crate::repositories::ReferenceRepository;

/// Ids a product row points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRefs {
    pub category_id: i32,
    pub catalog_id: i32,
    pub supplier_id: i32,
}

/// Resolves category (with parent), supplier, then catalog (with supplier).
pub async fn resolve<C: ConnectionTrait>(
    conn: &C,
    draft: &ProductDraft,
    default_catalog_id: Option<i32>,
) -> Result<ResolvedRefs, IngestError> {
    let category_id = resolve_category(conn, &draft.category, draft.parent_category.as_deref()).await?;
    let supplier_id = resolve_supplier(conn, &draft.supplier).await?;
    let catalog_id = resolve_catalog(conn, &draft.catalog, default_catalog_id, supplier_id).await?;

    Ok(ResolvedRefs {
        category_id,
        catalog_id,
        supplier_id,
    })
}

async fn resolve_category<C: ConnectionTrait>(
    conn: &C,
    key: &ReferenceKey,
    parent_name: Option<&str>,
) -> Result<i32, IngestError> {
    let category = match (&key.id, &key.name) {
        (Some(id), _) => ReferenceRepository::category_by_id(conn, *id).await?,
        (None, Some(name)) => ReferenceRepository::upsert_category(conn, name).await?,
        (None, None) => return Err(missing("category")),
    };

    // Last write wins when rows disagree about the parent.
    let category = match parent_name {
        Some(parent_name) => {
            let parent = ReferenceRepository::upsert_category(conn, parent_name).await?;
            ReferenceRepository::set_category_parent(conn, category, parent.id).await?
        }
        None => category,
    };

    Ok(category.id)
}

async fn resolve_supplier<C: ConnectionTrait>(
    conn: &C,
    key: &ReferenceKey,
) -> Result<i32, IngestError> {
    let supplier = match (&key.id, &key.name) {
        (Some(id), _) => ReferenceRepository::supplier_by_id(conn, *id).await?,
        (None, Some(name)) => ReferenceRepository::upsert_supplier(conn, name).await?,
        (None, None) => return Err(missing("supplier")),
    };
    Ok(supplier.id)
}

async fn resolve_catalog<C: ConnectionTrait>(
    conn: &C,
    key: &ReferenceKey,
    default_catalog_id: Option<i32>,
    supplier_id: i32,
) -> Result<i32, IngestError> {
    let catalog = match (&key.id, &key.name, default_catalog_id) {
        (Some(id), _, _) => ReferenceRepository::catalog_by_id(conn, *id).await?,
        (None, Some(name), _) => ReferenceRepository::upsert_catalog(conn, name).await?,
        (None, None, Some(id)) => ReferenceRepository::catalog_by_id(conn, id).await?,
        (None, None, None) => return Err(missing("catalog")),
    };

    let catalog = ReferenceRepository::set_catalog_supplier(conn, catalog, supplier_id).await?;
    Ok(catalog.id)
}

// Validation rejects these rows first; reaching here means a caller skipped it.
fn missing(entity: &'static str) -> IngestError {
    IngestError::ReferenceNotFound { entity, id: 0 }
}
