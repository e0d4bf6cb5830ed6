//! # Attribute repository
//!
//! Global attribute and option dictionaries, plus the per-product selection
//! rows. All writes take a generic connection so they can run inside a row
//! transaction.

use chrono::Utc;
use sea_orm::sea_query::{Condition, OnConflict};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde_json::json;

use crate::error::IngestError;
use crate::models::{attribute, attribute_option, product_attribute};

pub struct AttributeRepository;

impl AttributeRepository {
    /// Exact match on either the machine name or the display name.
    pub async fn find_by_name<C: ConnectionTrait>(
        conn: &C,
        name: &str,
    ) -> Result<Option<attribute::Model>, IngestError> {
        Ok(attribute::Entity::find()
            .filter(
                Condition::any()
                    .add(attribute::Column::Name.eq(name))
                    .add(attribute::Column::DisplayName.eq(name)),
            )
            .order_by_asc(attribute::Column::Id)
            .one(conn)
            .await?)
    }

    /// Insert a global attribute unless one with `name` exists; returns the stored row.
    pub async fn upsert<C: ConnectionTrait>(
        conn: &C,
        name: &str,
        display_name: &str,
        attribute_type: &str,
    ) -> Result<attribute::Model, IngestError> {
        let row = attribute::ActiveModel {
            name: Set(name.to_string()),
            display_name: Set(display_name.to_string()),
            attribute_type: Set(attribute_type.to_string()),
            catalog_id: Set(None),
            created_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };

        attribute::Entity::insert(row)
            .on_conflict(
                OnConflict::column(attribute::Column::Name)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;

        attribute::Entity::find()
            .filter(attribute::Column::Name.eq(name))
            .one(conn)
            .await?
            .ok_or_else(|| IngestError::Database(sea_orm::DbErr::RecordNotFound(name.to_string())))
    }

    /// Insert an option scoped to `attribute_id` unless `value` already exists.
    pub async fn upsert_option<C: ConnectionTrait>(
        conn: &C,
        attribute_id: i32,
        value: &str,
    ) -> Result<attribute_option::Model, IngestError> {
        let row = attribute_option::ActiveModel {
            attribute_id: Set(attribute_id),
            value: Set(value.to_string()),
            created_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };

        attribute_option::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    attribute_option::Column::AttributeId,
                    attribute_option::Column::Value,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;

        attribute_option::Entity::find()
            .filter(attribute_option::Column::AttributeId.eq(attribute_id))
            .filter(attribute_option::Column::Value.eq(value))
            .one(conn)
            .await?
            .ok_or_else(|| IngestError::Database(sea_orm::DbErr::RecordNotFound(value.to_string())))
    }

    /// Global attributes, plus those scoped to `catalog_id` when given.
    pub async fn list_for_catalog<C: ConnectionTrait>(
        conn: &C,
        catalog_id: Option<i32>,
    ) -> Result<Vec<attribute::Model>, IngestError> {
        let mut scope = Condition::any().add(attribute::Column::CatalogId.is_null());
        if let Some(catalog_id) = catalog_id {
            scope = scope.add(attribute::Column::CatalogId.eq(catalog_id));
        }

        Ok(attribute::Entity::find()
            .filter(scope)
            .order_by_asc(attribute::Column::Id)
            .all(conn)
            .await?)
    }

    pub async fn options<C: ConnectionTrait>(
        conn: &C,
        attribute_id: i32,
    ) -> Result<Vec<attribute_option::Model>, IngestError> {
        Ok(attribute_option::Entity::find()
            .filter(attribute_option::Column::AttributeId.eq(attribute_id))
            .order_by_asc(attribute_option::Column::Id)
            .all(conn)
            .await?)
    }

    /// Store the complete selection for `(product_id, attribute_id)`,
    /// replacing whatever was selected before.
    pub async fn replace_selection<C: ConnectionTrait>(
        conn: &C,
        product_id: i32,
        attribute_id: i32,
        option_ids: &[i32],
        text_value: Option<String>,
    ) -> Result<(), IngestError> {
        let now = Utc::now().fixed_offset();
        let row = product_attribute::ActiveModel {
            product_id: Set(product_id),
            attribute_id: Set(attribute_id),
            option_ids: Set(json!(option_ids)),
            text_value: Set(text_value),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        product_attribute::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    product_attribute::Column::ProductId,
                    product_attribute::Column::AttributeId,
                ])
                .update_columns([
                    product_attribute::Column::OptionIds,
                    product_attribute::Column::TextValue,
                    product_attribute::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;

        Ok(())
    }

    pub async fn selections<C: ConnectionTrait>(
        conn: &C,
        product_id: i32,
    ) -> Result<Vec<product_attribute::Model>, IngestError> {
        Ok(product_attribute::Entity::find()
            .filter(product_attribute::Column::ProductId.eq(product_id))
            .order_by_asc(product_attribute::Column::AttributeId)
            .all(conn)
            .await?)
    }
}
