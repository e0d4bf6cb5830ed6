//! Migration to create the attribute dictionaries.
//!
//! Attributes are global (or optionally scoped to a catalog) and options are
//! unique per `(attribute_id, value)`.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Attributes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Attributes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Attributes::Name).text().not_null().unique_key())
                    .col(ColumnDef::new(Attributes::DisplayName).text().not_null())
                    .col(
                        ColumnDef::new(Attributes::AttributeType)
                            .text()
                            .not_null()
                            .default("select"),
                    )
                    .col(ColumnDef::new(Attributes::CatalogId).integer().null())
                    .col(
                        ColumnDef::new(Attributes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_attributes_catalog_id")
                            .from(Attributes::Table, Attributes::CatalogId)
                            .to(Catalogs::Table, Catalogs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AttributeOptions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AttributeOptions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AttributeOptions::AttributeId)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AttributeOptions::Value).text().not_null())
                    .col(
                        ColumnDef::new(AttributeOptions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_attribute_options_attribute_id")
                            .from(AttributeOptions::Table, AttributeOptions::AttributeId)
                            .to(Attributes::Table, Attributes::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_attribute_options_attribute_value")
                    .table(AttributeOptions::Table)
                    .col(AttributeOptions::AttributeId)
                    .col(AttributeOptions::Value)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_attribute_options_attribute_value")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(AttributeOptions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Attributes::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Attributes {
    Table,
    Id,
    Name,
    DisplayName,
    AttributeType,
    CatalogId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum AttributeOptions {
    Table,
    Id,
    AttributeId,
    Value,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Catalogs {
    Table,
    Id,
}
