//! # Reference dictionary repository
//!
//! Categories, catalogs and suppliers are shared across batches and keyed by
//! a lower-cased name. Creation is an insert that does nothing on a
//! `name_key` conflict followed by a select of whichever row won, so two
//! writers racing on the same name converge on one record.

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};

use crate::error::IngestError;
use crate::models::{catalog, category, supplier};
use crate::slug::{name_key, slugify};

pub struct ReferenceRepository;

impl ReferenceRepository {
    pub async fn category_by_id<C: ConnectionTrait>(
        conn: &C,
        id: i32,
    ) -> Result<category::Model, IngestError> {
        category::Entity::find_by_id(id)
            .one(conn)
            .await?
            .ok_or(IngestError::ReferenceNotFound {
                entity: "category",
                id,
            })
    }

    pub async fn catalog_by_id<C: ConnectionTrait>(
        conn: &C,
        id: i32,
    ) -> Result<catalog::Model, IngestError> {
        catalog::Entity::find_by_id(id)
            .one(conn)
            .await?
            .ok_or(IngestError::ReferenceNotFound {
                entity: "catalog",
                id,
            })
    }

    pub async fn supplier_by_id<C: ConnectionTrait>(
        conn: &C,
        id: i32,
    ) -> Result<supplier::Model, IngestError> {
        supplier::Entity::find_by_id(id)
            .one(conn)
            .await?
            .ok_or(IngestError::ReferenceNotFound {
                entity: "supplier",
                id,
            })
    }

    /// Find a category by case-insensitive name, creating it if absent.
    pub async fn upsert_category<C: ConnectionTrait>(
        conn: &C,
        name: &str,
    ) -> Result<category::Model, IngestError> {
        let key = name_key(name);
        let now = Utc::now().fixed_offset();

        let row = category::ActiveModel {
            name: Set(name.trim().to_string()),
            name_key: Set(key.clone()),
            slug: Set(slugify(name)),
            parent_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        category::Entity::insert(row)
            .on_conflict(
                OnConflict::column(category::Column::NameKey)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;

        category::Entity::find()
            .filter(category::Column::NameKey.eq(key))
            .one(conn)
            .await?
            .ok_or_else(|| IngestError::Database(sea_orm::DbErr::RecordNotFound(name.to_string())))
    }

    /// Point a category at `parent_id`, overwriting any previous parent.
    pub async fn set_category_parent<C: ConnectionTrait>(
        conn: &C,
        category: category::Model,
        parent_id: i32,
    ) -> Result<category::Model, IngestError> {
        if category.parent_id == Some(parent_id) || category.id == parent_id {
            return Ok(category);
        }

        let mut active: category::ActiveModel = category.into();
        active.parent_id = Set(Some(parent_id));
        active.updated_at = Set(Utc::now().fixed_offset());
        Ok(active.update(conn).await?)
    }

    pub async fn upsert_supplier<C: ConnectionTrait>(
        conn: &C,
        name: &str,
    ) -> Result<supplier::Model, IngestError> {
        let key = name_key(name);
        let now = Utc::now().fixed_offset();

        let row = supplier::ActiveModel {
            name: Set(name.trim().to_string()),
            name_key: Set(key.clone()),
            slug: Set(slugify(name)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        supplier::Entity::insert(row)
            .on_conflict(
                OnConflict::column(supplier::Column::NameKey)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;

        supplier::Entity::find()
            .filter(supplier::Column::NameKey.eq(key))
            .one(conn)
            .await?
            .ok_or_else(|| IngestError::Database(sea_orm::DbErr::RecordNotFound(name.to_string())))
    }

    pub async fn upsert_catalog<C: ConnectionTrait>(
        conn: &C,
        name: &str,
    ) -> Result<catalog::Model, IngestError> {
        let key = name_key(name);
        let now = Utc::now().fixed_offset();

        let row = catalog::ActiveModel {
            name: Set(name.trim().to_string()),
            name_key: Set(key.clone()),
            slug: Set(slugify(name)),
            supplier_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        catalog::Entity::insert(row)
            .on_conflict(
                OnConflict::column(catalog::Column::NameKey)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;

        catalog::Entity::find()
            .filter(catalog::Column::NameKey.eq(key))
            .one(conn)
            .await?
            .ok_or_else(|| IngestError::Database(sea_orm::DbErr::RecordNotFound(name.to_string())))
    }

    /// Attach a supplier to a catalog, overwriting any previous supplier.
    pub async fn set_catalog_supplier<C: ConnectionTrait>(
        conn: &C,
        catalog: catalog::Model,
        supplier_id: i32,
    ) -> Result<catalog::Model, IngestError> {
        if catalog.supplier_id == Some(supplier_id) {
            return Ok(catalog);
        }

        let mut active: catalog::ActiveModel = catalog.into();
        active.supplier_id = Set(Some(supplier_id));
        active.updated_at = Set(Utc::now().fixed_offset());
        Ok(active.update(conn).await?)
    }
}
