//! Row pipeline: validation, reference resolution, attributes and templates.

#[path = "test_utils/mod.rs"]
mod test_utils;

use anyhow::Result;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

use catalog_ingest::ingest::{BatchStatus, CreateBatchOptions};
use catalog_ingest::models::{attribute, attribute_option, category};
use catalog_ingest::repositories::{AttributeRepository, ProductRepository, ReferenceRepository};
use test_utils::{HEADER, TestHarness, csv_text, product_row};

/// Required columns only; callers append reference columns.
const BASE_HEADER: &str = "product_name,product_description,product_sku,cost_price,regular_price,\
sale_price,discount_percentage,discount_label,minimum_price,wholesale_quantity,\
wholesale_discount_percentage";

fn base_fields(name: &str, sku: &str) -> String {
    format!("{name},{name} description,{sku},40,100,80,20,Launch,60,10,5")
}

#[tokio::test]
async fn test_attribute_values_are_deduplicated() -> Result<()> {
    let h = TestHarness::new().await?;
    let header = format!("{HEADER},attr_color,attr_size");
    let row = format!(
        "{},\"Red, Blue, Blue\",M",
        product_row("Trail Jacket", "TJ-001", 100.0, 80.0)
    );
    let batch_id = h.pending_batch(&csv_text(&header, &[row])).await?;

    let result = h.engine.start(batch_id).await;
    assert!(result.success, "{:?}", result.error);

    let color = AttributeRepository::find_by_name(&h.db, "color")
        .await?
        .expect("color attribute created");
    assert_eq!(color.attribute_type, "color");
    assert_eq!(color.display_name, "Color");

    let options = AttributeRepository::options(&h.db, color.id).await?;
    let values: Vec<&str> = options.iter().map(|o| o.value.as_str()).collect();
    assert_eq!(values.len(), 2);
    assert!(values.contains(&"Red"));
    assert!(values.contains(&"Blue"));

    let product = ProductRepository::find_by_sku(&h.db, "TJ-001")
        .await?
        .expect("product written");
    let selections = AttributeRepository::selections(&h.db, product.id).await?;
    assert_eq!(selections.len(), 2);

    let color_selection = selections
        .iter()
        .find(|s| s.attribute_id == color.id)
        .expect("color selection");
    assert_eq!(color_selection.option_ids.as_array().map(Vec::len), Some(2));
    assert!(color_selection.text_value.is_none());

    let size = AttributeRepository::find_by_name(&h.db, "size").await?.unwrap();
    assert_eq!(size.attribute_type, "select");

    Ok(())
}

#[tokio::test]
async fn test_free_text_attribute_keeps_first_value() -> Result<()> {
    let h = TestHarness::new().await?;
    let header = format!("{HEADER},attr_material");
    let row = format!(
        "{},\"Cotton, Linen\"",
        product_row("Camp Shirt", "CS-001", 60.0, 45.0)
    );
    let batch_id = h.pending_batch(&csv_text(&header, &[row])).await?;

    let result = h.engine.start(batch_id).await;
    assert!(result.success, "{:?}", result.error);

    let material = AttributeRepository::find_by_name(&h.db, "material")
        .await?
        .expect("material attribute created");
    assert_eq!(material.attribute_type, "text");

    let options = AttributeRepository::options(&h.db, material.id).await?;
    assert_eq!(options.len(), 2);

    let product = ProductRepository::find_by_sku(&h.db, "CS-001")
        .await?
        .expect("product written");
    let selections = AttributeRepository::selections(&h.db, product.id).await?;
    assert_eq!(selections.len(), 1);
    let selection = &selections[0];
    assert_eq!(selection.attribute_id, material.id);
    assert_eq!(selection.option_ids.as_array().map(Vec::len), Some(2));
    for option in &options {
        assert!(
            selection
                .option_ids
                .as_array()
                .is_some_and(|ids| ids.iter().any(|id| id.as_i64() == Some(i64::from(option.id))))
        );
    }
    assert_eq!(selection.text_value.as_deref(), Some("Cotton"));

    Ok(())
}

#[tokio::test]
async fn test_attribute_options_are_shared_across_rows() -> Result<()> {
    let h = TestHarness::new().await?;
    let header = format!("{HEADER},attr_color");
    let rows = [
        format!("{},Red", product_row("Trail Jacket", "TJ-001", 100.0, 80.0)),
        format!("{},\"Red, Green\"", product_row("Rain Jacket", "RJ-002", 100.0, 80.0)),
    ];
    let batch_id = h.pending_batch(&csv_text(&header, &rows)).await?;
    assert!(h.engine.start(batch_id).await.success);

    let attributes = attribute::Entity::find()
        .filter(attribute::Column::Name.eq("color"))
        .all(&h.db)
        .await?;
    assert_eq!(attributes.len(), 1);

    let options = attribute_option::Entity::find()
        .filter(attribute_option::Column::AttributeId.eq(attributes[0].id))
        .all(&h.db)
        .await?;
    assert_eq!(options.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_duplicate_slug_rejects_later_row() -> Result<()> {
    let h = TestHarness::new().await?;
    let rows = [
        product_row("Trail Jacket", "TJ-001", 100.0, 80.0),
        product_row("Trail Jacket Copy", "tj 001", 100.0, 80.0),
    ];
    let batch_id = h.pending_batch(&csv_text(HEADER, &rows)).await?;

    let result = h.engine.start(batch_id).await;
    let batch = result.data.as_ref().unwrap();
    assert_eq!(batch.batch_status(), BatchStatus::Failed);
    assert_eq!(batch.success_count, 1);
    assert_eq!(batch.error_count, 1);

    let row_errors = &result.error.as_ref().unwrap().row_errors;
    assert_eq!(row_errors.len(), 1);
    assert_eq!(row_errors[0].row_index, 2);
    assert_eq!(row_errors[0].error_type, "validation");
    assert_eq!(row_errors[0].field.as_deref(), Some("product_sku"));
    assert!(row_errors[0].message.contains("tj-001"));

    assert!(ProductRepository::find_by_sku(&h.db, "tj 001").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_warnings_do_not_block_rows() -> Result<()> {
    let h = TestHarness::new().await?;
    // Declared discount 5% against a computed 20%.
    let header = format!("{BASE_HEADER},supplier_name,catalog_name,category_name");
    let row = "Trail Jacket,Shell,TJ-001,40,100,80,5,Launch,60,10,5,Acme,Main,Gear".to_string();
    let batch_id = h.pending_batch(&csv_text(&header, &[row])).await?;

    let result = h.engine.start(batch_id).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.data.unwrap().success_count, 1);

    let summary = h.engine.summary(batch_id).await.data.unwrap();
    assert_eq!(summary.issues.warnings, 1);
    assert_eq!(summary.issues.validation, 0);

    let log = h.engine.list_errors(batch_id).await.data.unwrap();
    let warning = log.iter().find(|e| e.severity == "warning").unwrap();
    assert_eq!(warning.row_index, 1);
    assert_eq!(warning.field.as_deref(), Some("discount_percentage"));

    Ok(())
}

#[tokio::test]
async fn test_missing_required_values_reject_row() -> Result<()> {
    let h = TestHarness::new().await?;
    let header = format!("{BASE_HEADER},supplier_name,catalog_name,category_name");
    let row = "Trail Jacket,Shell,,40,100,abc,20,Launch,60,10,5,,Main,Gear".to_string();
    let batch_id = h.pending_batch(&csv_text(&header, &[row])).await?;

    let result = h.engine.start(batch_id).await;
    assert_eq!(result.error_code(), Some("BATCH_FAILED"));

    let fields: Vec<Option<String>> = result
        .error
        .unwrap()
        .row_errors
        .into_iter()
        .map(|e| e.field)
        .collect();
    assert!(fields.contains(&Some("product_sku".to_string())));
    assert!(fields.contains(&Some("sale_price".to_string())));
    assert!(fields.contains(&Some("supplier_name".to_string())));

    Ok(())
}

#[tokio::test]
async fn test_references_are_created_by_name_and_reused() -> Result<()> {
    let h = TestHarness::new().await?;
    let header = format!("{BASE_HEADER},supplier_name,catalog_name,category_name,parent_category_name");
    let rows = [
        format!("{},Acme,Main,Jackets,Apparel", base_fields("Trail Jacket", "TJ-001")),
        format!("{},ACME,main,jackets,", base_fields("Rain Jacket", "RJ-002")),
    ];
    let batch_id = h.pending_batch(&csv_text(&header, &rows)).await?;
    assert!(h.engine.start(batch_id).await.success);

    let first = ProductRepository::find_by_sku(&h.db, "TJ-001").await?.unwrap();
    let second = ProductRepository::find_by_sku(&h.db, "RJ-002").await?.unwrap();
    assert_eq!(first.category_id, second.category_id);
    assert_eq!(first.catalog_id, second.catalog_id);
    assert_eq!(first.supplier_id, second.supplier_id);

    let jackets = ReferenceRepository::category_by_id(&h.db, first.category_id).await?;
    assert_eq!(jackets.name, "Jackets");
    let parent_id = jackets.parent_id.expect("parent linked");
    let apparel = ReferenceRepository::category_by_id(&h.db, parent_id).await?;
    assert_eq!(apparel.name, "Apparel");

    let catalog = ReferenceRepository::catalog_by_id(&h.db, first.catalog_id).await?;
    assert_eq!(catalog.supplier_id, Some(first.supplier_id));

    Ok(())
}

#[tokio::test]
async fn test_failed_write_keeps_resolved_category() -> Result<()> {
    let h = TestHarness::new().await?;
    let header = format!("{BASE_HEADER},supplier_name,catalog_id,category_name");
    let row = format!("{},Acme,999,Brand New Category", base_fields("Trail Jacket", "TJ-001"));
    let batch_id = h.pending_batch(&csv_text(&header, &[row])).await?;

    let result = h.engine.start(batch_id).await;
    assert_eq!(result.error_code(), Some("BATCH_FAILED"));

    let row_errors = result.error.unwrap().row_errors;
    assert_eq!(row_errors.len(), 1);
    assert_eq!(row_errors[0].error_type, "processing");
    assert_eq!(row_errors[0].row_index, 1);
    assert!(row_errors[0].message.contains("999"));

    assert!(ProductRepository::find_by_sku(&h.db, "TJ-001").await?.is_none());
    let created = category::Entity::find()
        .filter(category::Column::Name.eq("Brand New Category"))
        .one(&h.db)
        .await?;
    assert!(created.is_some());

    Ok(())
}

#[tokio::test]
async fn test_default_catalog_applies_to_rows_without_catalog() -> Result<()> {
    let h = TestHarness::new().await?;
    let house = ReferenceRepository::upsert_catalog(&h.db, "House Catalog").await?;

    let header = format!("{BASE_HEADER},supplier_name,category_name");
    let row = format!("{},Acme,Gear", base_fields("Trail Jacket", "TJ-001"));
    let csv = csv_text(&header, &[row]);

    // Without a default the catalog is required.
    let plain = h.pending_batch(&csv).await?;
    assert_eq!(
        h.engine.start(plain).await.error_code(),
        Some("BATCH_FAILED")
    );

    let batch_id = h
        .pending_batch_with(
            &csv,
            CreateBatchOptions {
                default_catalog_id: Some(house.id),
            },
        )
        .await?;
    let result = h.engine.start(batch_id).await;
    assert!(result.success, "{:?}", result.error);

    let product = ProductRepository::find_by_sku(&h.db, "TJ-001").await?.unwrap();
    assert_eq!(product.catalog_id, house.id);

    Ok(())
}

#[tokio::test]
async fn test_create_batch_rejects_unknown_default_catalog() -> Result<()> {
    let h = TestHarness::new().await?;
    let result = h
        .engine
        .create_batch(
            "catalog.csv",
            CreateBatchOptions {
                default_catalog_id: Some(42),
            },
        )
        .await;
    assert_eq!(result.error_code(), Some("REFERENCE_NOT_FOUND"));

    let configured = TestHarness::with_config(|config| config.default_catalog_id = Some(7)).await?;
    let result = configured
        .engine
        .create_batch("catalog.csv", CreateBatchOptions::default())
        .await;
    assert_eq!(result.error_code(), Some("REFERENCE_NOT_FOUND"));

    Ok(())
}

#[tokio::test]
async fn test_attach_only_while_pending() -> Result<()> {
    let h = TestHarness::new().await?;
    let csv = csv_text(HEADER, &[product_row("Trail Jacket", "TJ-001", 100.0, 80.0)]);
    let batch_id = h.pending_batch(&csv).await?;
    assert!(h.engine.start(batch_id).await.success);

    let input = h.write_input("late.csv", &csv)?;
    let result = h.engine.attach_file(batch_id, &input).await;
    assert_eq!(result.error_code(), Some("INVALID_TRANSITION"));

    let missing = h.engine.create_batch("gone.csv", Default::default()).await;
    let missing_id = missing.data.unwrap().id;
    let result = h
        .engine
        .attach_file(missing_id, std::path::Path::new("/nonexistent/gone.csv"))
        .await;
    assert_eq!(result.error_code(), Some("FILE_NOT_FOUND"));

    Ok(())
}

#[tokio::test]
async fn test_generated_template_imports_cleanly() -> Result<()> {
    let h = TestHarness::new().await?;
    let header = format!("{HEADER},attr_color");
    let seed = format!("{},\"Red, Blue\"", product_row("Seed", "SEED-1", 10.0, 8.0));
    let seed_batch = h.pending_batch(&csv_text(&header, &[seed])).await?;
    assert!(h.engine.start(seed_batch).await.success);

    let template = h.engine.template(None).await.data.unwrap();
    let first_line = template.lines().next().unwrap();
    assert!(first_line.starts_with("product_name,"));
    assert!(first_line.ends_with(",attr_color"));

    let batch_id = h.pending_batch(&template).await?;
    let result = h.engine.start(batch_id).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.data.unwrap().success_count, 2);

    assert_eq!(
        h.engine.template(Some(999)).await.error_code(),
        Some("REFERENCE_NOT_FOUND")
    );

    Ok(())
}
