//! # Product repository

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
};
use uuid::Uuid;

use crate::error::{IngestError, is_unique_violation};
use crate::models::product::{ActiveModel, Column, Entity, Model};

/// Field values for a new product.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub sku: String,
    pub slug: String,
    pub cost_price: f64,
    pub regular_price: f64,
    pub sale_price: f64,
    pub discount_percentage: f64,
    pub discount_label: String,
    pub minimum_price: f64,
    pub wholesale_quantity: i32,
    pub wholesale_discount_percentage: f64,
    pub stock_quantity: Option<i32>,
    pub category_id: i32,
    pub catalog_id: i32,
    pub supplier_id: i32,
    pub batch_id: Option<Uuid>,
}

pub struct ProductRepository;

impl ProductRepository {
    pub async fn slug_exists<C: ConnectionTrait>(conn: &C, slug: &str) -> Result<bool, IngestError> {
        let count = Entity::find()
            .filter(Column::Slug.eq(slug))
            .count(conn)
            .await?;
        Ok(count > 0)
    }

    /// Inserts one product. A slug or SKU taken since the caller checked
    /// surfaces as [`IngestError::DuplicateProduct`].
    pub async fn insert<C: ConnectionTrait>(conn: &C, product: NewProduct) -> Result<Model, IngestError> {
        let now = Utc::now().fixed_offset();
        let slug = product.slug.clone();

        let row = ActiveModel {
            name: Set(product.name),
            description: Set(product.description),
            sku: Set(product.sku),
            slug: Set(product.slug),
            cost_price: Set(product.cost_price),
            regular_price: Set(product.regular_price),
            sale_price: Set(product.sale_price),
            discount_percentage: Set(product.discount_percentage),
            discount_label: Set(product.discount_label),
            minimum_price: Set(product.minimum_price),
            wholesale_quantity: Set(product.wholesale_quantity),
            wholesale_discount_percentage: Set(product.wholesale_discount_percentage),
            stock_quantity: Set(product.stock_quantity),
            category_id: Set(product.category_id),
            catalog_id: Set(product.catalog_id),
            supplier_id: Set(product.supplier_id),
            batch_id: Set(product.batch_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        row.insert(conn).await.map_err(|err| {
            if is_unique_violation(&err) {
                IngestError::DuplicateProduct { slug }
            } else {
                err.into()
            }
        })
    }

    pub async fn find_by_sku<C: ConnectionTrait>(
        conn: &C,
        sku: &str,
    ) -> Result<Option<Model>, IngestError> {
        Ok(Entity::find().filter(Column::Sku.eq(sku)).one(conn).await?)
    }

    pub async fn count_for_batch<C: ConnectionTrait>(
        conn: &C,
        batch_id: Uuid,
    ) -> Result<u64, IngestError> {
        Ok(Entity::find()
            .filter(Column::BatchId.eq(batch_id))
            .count(conn)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::ReferenceRepository;
    use migration::{Migrator, MigratorTrait};
    use sea_orm::Database;

    async fn new_product(conn: &sea_orm::DatabaseConnection, sku: &str, slug: &str) -> NewProduct {
        let category = ReferenceRepository::upsert_category(conn, "Gear").await.unwrap();
        let catalog = ReferenceRepository::upsert_catalog(conn, "Main").await.unwrap();
        let supplier = ReferenceRepository::upsert_supplier(conn, "Acme").await.unwrap();
        NewProduct {
            name: "Lamp".to_string(),
            description: "Desk lamp".to_string(),
            sku: sku.to_string(),
            slug: slug.to_string(),
            cost_price: 5.0,
            regular_price: 20.0,
            sale_price: 15.0,
            discount_percentage: 25.0,
            discount_label: "Sale".to_string(),
            minimum_price: 10.0,
            wholesale_quantity: 10,
            wholesale_discount_percentage: 5.0,
            stock_quantity: None,
            category_id: category.id,
            catalog_id: catalog.id,
            supplier_id: supplier.id,
            batch_id: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_slug_is_reported() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();

        let first = new_product(&db, "LAMP-1", "lamp-1").await;
        let stored = ProductRepository::insert(&db, first).await.unwrap();
        assert!(ProductRepository::slug_exists(&db, "lamp-1").await.unwrap());
        assert_eq!(
            ProductRepository::find_by_sku(&db, "LAMP-1").await.unwrap().map(|p| p.id),
            Some(stored.id)
        );

        let second = new_product(&db, "lamp 1", "lamp-1").await;
        let err = ProductRepository::insert(&db, second).await.unwrap_err();
        assert!(matches!(err, IngestError::DuplicateProduct { ref slug } if slug == "lamp-1"));
    }
}
