//! Product entity model
//!
//! This module contains the SeaORM entity model for the products table.
//! Ingestion only ever inserts products; there is no update-by-SKU path.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub description: String,
    #[sea_orm(unique)]
    pub sku: String,
    /// Slugified SKU; unique
    #[sea_orm(unique)]
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
    /// Batch that created the product
    pub batch_id: Option<Uuid>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::Id"
    )]
    Category,
    #[sea_orm(
        belongs_to = "super::catalog::Entity",
        from = "Column::CatalogId",
        to = "super::catalog::Column::Id"
    )]
    Catalog,
    #[sea_orm(has_many = "super::product_attribute::Entity")]
    ProductAttribute,
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl Related<super::catalog::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Catalog.def()
    }
}

impl Related<super::product_attribute::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ProductAttribute.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
