//! CSV template generation.

use sea_orm::ConnectionTrait;

use crate::error::IngestError;
use crate::ingest::attributes::AttributeKind;
use crate::ingest::validator::{OPTIONAL_COLUMNS, REFERENCE_COLUMNS, REQUIRED_COLUMNS};
use crate::repositories::{AttributeRepository, ReferenceRepository};

const EXAMPLE_ROWS: [&[&str]; 2] = [
    &[
        "Trail Jacket",
        "Waterproof shell with taped seams",
        "TJ-001",
        "45.00",
        "120.00",
        "96.00",
        "20",
        "Spring Sale",
        "80.00",
        "10",
        "5",
    ],
    &[
        "Camp Mug",
        "Enamel mug, 350ml",
        "CM-002",
        "3.50",
        "12.00",
        "9.00",
        "25",
        "Clearance",
        "8.00",
        "24",
        "10",
    ],
];

/// Builds a CSV skeleton: the fixed columns, then one attribute column per
/// global attribute (plus those scoped to `catalog_id`), with two example rows.
pub async fn generate<C: ConnectionTrait>(
    conn: &C,
    catalog_id: Option<i32>,
    attribute_prefix: &str,
) -> Result<String, IngestError> {
    let catalog = match catalog_id {
        Some(id) => Some(ReferenceRepository::catalog_by_id(conn, id).await?),
        None => None,
    };
    let attributes = AttributeRepository::list_for_catalog(conn, catalog_id).await?;

    let mut header: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .chain(REFERENCE_COLUMNS)
        .chain(OPTIONAL_COLUMNS)
        .map(|c| c.to_string())
        .collect();

    let mut samples: Vec<[String; 2]> = Vec::with_capacity(attributes.len());
    for attribute in &attributes {
        header.push(format!("{attribute_prefix}{}", attribute.name));

        let options = AttributeRepository::options(conn, attribute.id).await?;
        let kind = attribute
            .attribute_type
            .parse()
            .unwrap_or(AttributeKind::Select);
        let values: Vec<&str> = options.iter().map(|o| o.value.as_str()).collect();
        samples.push(match (kind, values.as_slice()) {
            (_, []) => [String::new(), String::new()],
            (AttributeKind::Select | AttributeKind::Color, [first, second, ..]) => {
                [format!("{first}, {second}"), second.to_string()]
            }
            (_, [first, ..]) => [first.to_string(), first.to_string()],
        });
    }

    let catalog_name = catalog
        .as_ref()
        .map(|c| c.name.as_str())
        .unwrap_or("Outdoor Essentials");

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&header)?;

    for (i, base) in EXAMPLE_ROWS.iter().enumerate() {
        let mut record: Vec<String> = base.iter().map(|v| v.to_string()).collect();
        record.extend([
            String::new(),
            "Northwind Supply".to_string(),
            String::new(),
            catalog_name.to_string(),
            String::new(),
            if i == 0 { "Jackets" } else { "Kitchen" }.to_string(),
            if i == 0 { "Apparel" } else { "Camping" }.to_string(),
            if i == 0 { "25" } else { "" }.to_string(),
        ]);
        record.extend(samples.iter().map(|pair| pair[i].clone()));
        writer.write_record(&record)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| IngestError::Storage(err.into_error()))?;
    String::from_utf8(bytes).map_err(|err| {
        IngestError::Storage(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::reader::{RowItem, RowStream};
    use crate::ingest::validator::Validator;
    use migration::{Migrator, MigratorTrait};

    #[test]
    fn test_example_rows_match_required_columns() {
        for row in EXAMPLE_ROWS {
            assert_eq!(row.len(), REQUIRED_COLUMNS.len());
        }
    }

    #[tokio::test]
    async fn test_template_without_attributes_validates_cleanly() {
        let db = sea_orm::Database::connect("sqlite::memory:").await.unwrap();
        Migrator::up(&db, None).await.unwrap();

        let csv = generate(&db, None, "attr_").await.unwrap();
        let validator = Validator::new("attr_", 1.0, false);

        let mut count = 0;
        for item in RowStream::new(csv.as_bytes(), 0).unwrap() {
            match item.unwrap() {
                RowItem::Row(row) => {
                    let validation = validator.validate(&row);
                    assert!(validation.issues.is_empty(), "{:?}", validation.issues);
                    count += 1;
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(count, 2);
    }
}
