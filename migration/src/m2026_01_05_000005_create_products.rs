//! Migration to create the products and product_attributes tables.
//!
//! Products are insert-only from ingestion and unique by slug and SKU. A
//! product holds exactly one selection row per attribute.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Products::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Products::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Products::Name).text().not_null())
                    .col(ColumnDef::new(Products::Description).text().not_null())
                    .col(ColumnDef::new(Products::Sku).text().not_null().unique_key())
                    .col(ColumnDef::new(Products::Slug).text().not_null().unique_key())
                    .col(ColumnDef::new(Products::CostPrice).double().not_null())
                    .col(ColumnDef::new(Products::RegularPrice).double().not_null())
                    .col(ColumnDef::new(Products::SalePrice).double().not_null())
                    .col(ColumnDef::new(Products::DiscountPercentage).double().not_null())
                    .col(ColumnDef::new(Products::DiscountLabel).text().not_null())
                    .col(ColumnDef::new(Products::MinimumPrice).double().not_null())
                    .col(ColumnDef::new(Products::WholesaleQuantity).integer().not_null())
                    .col(
                        ColumnDef::new(Products::WholesaleDiscountPercentage)
                            .double()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Products::StockQuantity).integer().null())
                    .col(ColumnDef::new(Products::CategoryId).integer().not_null())
                    .col(ColumnDef::new(Products::CatalogId).integer().not_null())
                    .col(ColumnDef::new(Products::SupplierId).integer().not_null())
                    .col(ColumnDef::new(Products::BatchId).uuid().null())
                    .col(
                        ColumnDef::new(Products::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Products::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_products_category_id")
                            .from(Products::Table, Products::CategoryId)
                            .to(Categories::Table, Categories::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_products_catalog_id")
                            .from(Products::Table, Products::CatalogId)
                            .to(Catalogs::Table, Catalogs::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_products_supplier_id")
                            .from(Products::Table, Products::SupplierId)
                            .to(Suppliers::Table, Suppliers::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ProductAttributes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProductAttributes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProductAttributes::ProductId).integer().not_null())
                    .col(
                        ColumnDef::new(ProductAttributes::AttributeId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProductAttributes::OptionIds).json().not_null())
                    .col(ColumnDef::new(ProductAttributes::TextValue).text().null())
                    .col(
                        ColumnDef::new(ProductAttributes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ProductAttributes::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_attributes_product_id")
                            .from(ProductAttributes::Table, ProductAttributes::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_product_attributes_attribute_id")
                            .from(ProductAttributes::Table, ProductAttributes::AttributeId)
                            .to(Attributes::Table, Attributes::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_product_attributes_product_attribute")
                    .table(ProductAttributes::Table)
                    .col(ProductAttributes::ProductId)
                    .col(ProductAttributes::AttributeId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_products_batch_id")
                    .table(Products::Table)
                    .col(Products::BatchId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_products_batch_id").to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_product_attributes_product_attribute")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(ProductAttributes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Products::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Products {
    Table,
    Id,
    Name,
    Description,
    Sku,
    Slug,
    CostPrice,
    RegularPrice,
    SalePrice,
    DiscountPercentage,
    DiscountLabel,
    MinimumPrice,
    WholesaleQuantity,
    WholesaleDiscountPercentage,
    StockQuantity,
    CategoryId,
    CatalogId,
    SupplierId,
    BatchId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ProductAttributes {
    Table,
    Id,
    ProductId,
    AttributeId,
    OptionIds,
    TextValue,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Categories {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Catalogs {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Suppliers {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Attributes {
    Table,
    Id,
}
