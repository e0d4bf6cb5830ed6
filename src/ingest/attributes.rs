//! Attribute columns: value parsing, type inference and product linking.

use std::fmt;
use std::str::FromStr;

use sea_orm::ConnectionTrait;

use crate::error::IngestError;
use crate::ingest::validator::AttributeColumn;
use crate::repositories::AttributeRepository;

/// Input kind of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Select,
    Color,
    Text,
    Textarea,
    Number,
}

impl AttributeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeKind::Select => "select",
            AttributeKind::Color => "color",
            AttributeKind::Text => "text",
            AttributeKind::Textarea => "textarea",
            AttributeKind::Number => "number",
        }
    }

    /// Free-text kinds also keep their first value as the scalar text value.
    pub fn is_free_text(&self) -> bool {
        matches!(self, AttributeKind::Text | AttributeKind::Textarea)
    }

    /// Kind for a newly seen attribute name; anything unknown is a `select`.
    pub fn infer(name: &str) -> Self {
        match name.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "color" | "colour" => AttributeKind::Color,
            "material" | "brand" | "model" | "origin" | "country_of_origin" => AttributeKind::Text,
            "description" | "notes" | "care_instructions" | "features" => AttributeKind::Textarea,
            "weight" | "length" | "width" | "height" | "depth" | "capacity" | "volume" => {
                AttributeKind::Number
            }
            _ => AttributeKind::Select,
        }
    }
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "select" => Ok(AttributeKind::Select),
            "color" => Ok(AttributeKind::Color),
            "text" => Ok(AttributeKind::Text),
            "textarea" => Ok(AttributeKind::Textarea),
            "number" => Ok(AttributeKind::Number),
            other => Err(format!("unknown attribute type '{other}'")),
        }
    }
}

/// Splits a cell on commas, trimming and dropping empty and repeated values.
pub fn split_values(cell: &str) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();
    for value in cell.split(',').map(str::trim).filter(|v| !v.is_empty()) {
        if !values.iter().any(|seen| seen == value) {
            values.push(value.to_string());
        }
    }
    values
}

/// `pattern_size` -> `Pattern Size`
pub fn display_name(name: &str) -> String {
    name.split(['_', ' '])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolves every attribute column of a row and stores the product's
/// selections. Runs on the row's transaction.
pub async fn apply<C: ConnectionTrait>(
    conn: &C,
    product_id: i32,
    columns: &[AttributeColumn],
) -> Result<(), IngestError> {
    for column in columns {
        let attribute = match AttributeRepository::find_by_name(conn, &column.name).await? {
            Some(existing) => existing,
            None => {
                let kind = AttributeKind::infer(&column.name);
                AttributeRepository::upsert(
                    conn,
                    &column.name,
                    &display_name(&column.name),
                    kind.as_str(),
                )
                .await?
            }
        };
        let kind = attribute
            .attribute_type
            .parse()
            .unwrap_or(AttributeKind::Select);

        let mut option_ids = Vec::with_capacity(column.values.len());
        for value in &column.values {
            let option = AttributeRepository::upsert_option(conn, attribute.id, value).await?;
            if !option_ids.contains(&option.id) {
                option_ids.push(option.id);
            }
        }

        let text_value = kind
            .is_free_text()
            .then(|| column.values.first().cloned())
            .flatten();

        AttributeRepository::replace_selection(
            conn,
            product_id,
            attribute.id,
            &option_ids,
            text_value,
        )
        .await?;

        tracing::trace!(
            product_id,
            attribute = %attribute.name,
            options = option_ids.len(),
            "Attribute selection stored"
        );
    }

    Ok(())
}
