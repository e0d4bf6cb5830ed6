//! Row validation.
//!
//! Every rule runs independently and reports its own issue, so one row can
//! carry several entries. Only `error` severity rejects the row; warnings are
//! logged and the row proceeds.

use crate::error::RowIssue;
use crate::ingest::reader::CsvRow;
use crate::repositories::NewProduct;
use crate::slug::slugify;

/// Columns every row must fill.
pub const REQUIRED_COLUMNS: &[&str] = &[
    "product_name",
    "product_description",
    "product_sku",
    "cost_price",
    "regular_price",
    "sale_price",
    "discount_percentage",
    "discount_label",
    "minimum_price",
    "wholesale_quantity",
    "wholesale_discount_percentage",
];

/// Reference columns; each pair needs at least one value.
pub const REFERENCE_COLUMNS: &[&str] = &[
    "supplier_id",
    "supplier_name",
    "catalog_id",
    "catalog_name",
    "category_id",
    "category_name",
    "parent_category_name",
];

pub const OPTIONAL_COLUMNS: &[&str] = &["stock_quantity"];

const PRICE_COLUMNS: [&str; 6] = [
    "cost_price",
    "regular_price",
    "sale_price",
    "discount_percentage",
    "minimum_price",
    "wholesale_discount_percentage",
];

/// A category, catalog or supplier as named by a row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReferenceKey {
    pub id: Option<i32>,
    pub name: Option<String>,
}

impl ReferenceKey {
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.name.is_none()
    }
}

/// One `attr_*` column with its parsed values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeColumn {
    pub name: String,
    pub values: Vec<String>,
}

/// A row that passed validation, ready to be resolved and written.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDraft {
    pub row: i32,
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
    pub supplier: ReferenceKey,
    pub catalog: ReferenceKey,
    pub category: ReferenceKey,
    pub parent_category: Option<String>,
    pub attributes: Vec<AttributeColumn>,
}

impl ProductDraft {
    pub fn into_new_product(
        self,
        category_id: i32,
        catalog_id: i32,
        supplier_id: i32,
        batch_id: Option<uuid::Uuid>,
    ) -> NewProduct {
        NewProduct {
            name: self.name,
            description: self.description,
            sku: self.sku,
            slug: self.slug,
            cost_price: self.cost_price,
            regular_price: self.regular_price,
            sale_price: self.sale_price,
            discount_percentage: self.discount_percentage,
            discount_label: self.discount_label,
            minimum_price: self.minimum_price,
            wholesale_quantity: self.wholesale_quantity,
            wholesale_discount_percentage: self.wholesale_discount_percentage,
            stock_quantity: self.stock_quantity,
            category_id,
            catalog_id,
            supplier_id,
            batch_id,
        }
    }
}

/// Outcome of validating one row.
#[derive(Debug, Clone)]
pub struct Validation {
    pub issues: Vec<RowIssue>,
    /// Present only when no issue is blocking.
    pub draft: Option<ProductDraft>,
}

impl Validation {
    pub fn is_rejected(&self) -> bool {
        self.draft.is_none()
    }

    /// Adds a blocking issue found outside the validator and drops the draft.
    pub fn reject(&mut self, issue: RowIssue) {
        self.issues.push(issue);
        self.draft = None;
    }
}

/// Stateless field and pricing rules. The slug uniqueness check needs the
/// store and is added by the caller through [`Validator::slug_taken`].
#[derive(Debug, Clone)]
pub struct Validator {
    attribute_prefix: String,
    discount_tolerance: f64,
    has_default_catalog: bool,
}

impl Validator {
    pub fn new(
        attribute_prefix: impl Into<String>,
        discount_tolerance: f64,
        has_default_catalog: bool,
    ) -> Self {
        Self {
            attribute_prefix: attribute_prefix.into(),
            discount_tolerance,
            has_default_catalog,
        }
    }

    pub fn validate(&self, row: &CsvRow) -> Validation {
        let index = row.index;
        let mut issues = Vec::new();

        for column in REQUIRED_COLUMNS {
            if row.get(column).is_none() {
                issues.push(RowIssue::validation_error(
                    index,
                    column,
                    format!("{column} is required"),
                ));
            }
        }

        let supplier = reference(row, "supplier", &mut issues);
        let catalog = reference(row, "catalog", &mut issues);
        let category = reference(row, "category", &mut issues);

        if supplier.is_empty() {
            issues.push(RowIssue::validation_error(
                index,
                "supplier_name",
                "either supplier_id or supplier_name is required",
            ));
        }
        if catalog.is_empty() && !self.has_default_catalog {
            issues.push(RowIssue::validation_error(
                index,
                "catalog_name",
                "either catalog_id or catalog_name is required",
            ));
        }
        if category.is_empty() {
            issues.push(RowIssue::validation_error(
                index,
                "category_name",
                "either category_id or category_name is required",
            ));
        }

        let [cost, regular, sale, discount, minimum, wholesale_discount] =
            PRICE_COLUMNS.map(|column| number(row, column, &mut issues));
        let wholesale_quantity = integer(row, "wholesale_quantity", &mut issues);
        let stock_quantity = integer(row, "stock_quantity", &mut issues);

        if let (Some(sale), Some(regular)) = (sale, regular)
            && sale > regular
        {
            issues.push(RowIssue::validation_error(
                index,
                "sale_price",
                format!("sale price {sale} exceeds regular price {regular}"),
            ));
        }
        if let (Some(sale), Some(minimum)) = (sale, minimum)
            && sale < minimum
        {
            issues.push(RowIssue::validation_error(
                index,
                "sale_price",
                format!("sale price {sale} is below minimum price {minimum}"),
            ));
        }
        if let (Some(sale), Some(cost)) = (sale, cost)
            && sale < cost
        {
            issues.push(RowIssue::validation_warning(
                index,
                "sale_price",
                format!("sale price {sale} is below cost price {cost}"),
            ));
        }
        if let (Some(regular), Some(sale), Some(discount)) = (regular, sale, discount)
            && let Some(expected) = expected_discount(regular, sale)
            && (discount - expected).abs() > self.discount_tolerance
        {
            issues.push(RowIssue::validation_warning(
                index,
                "discount_percentage",
                format!("discount {discount}% does not match computed {expected}%"),
            ));
        }

        let slug = row.get("product_sku").map(slugify);
        if slug.as_deref() == Some("") {
            issues.push(RowIssue::validation_error(
                index,
                "product_sku",
                "product_sku must contain at least one letter or digit",
            ));
        }

        let attributes = self.attribute_columns(row);

        if issues.iter().any(RowIssue::is_blocking) {
            return Validation {
                issues,
                draft: None,
            };
        }

        let text = |column: &str| row.get(column).unwrap_or_default().to_string();

        // Missing values were blocking above.
        let draft = ProductDraft {
            row: index,
            name: text("product_name"),
            description: text("product_description"),
            sku: text("product_sku"),
            slug: slug.unwrap_or_default(),
            cost_price: cost.unwrap_or_default(),
            regular_price: regular.unwrap_or_default(),
            sale_price: sale.unwrap_or_default(),
            discount_percentage: discount.unwrap_or_default(),
            discount_label: text("discount_label"),
            minimum_price: minimum.unwrap_or_default(),
            wholesale_quantity: wholesale_quantity.unwrap_or_default(),
            wholesale_discount_percentage: wholesale_discount.unwrap_or_default(),
            stock_quantity,
            supplier,
            catalog,
            category,
            parent_category: row.get("parent_category_name").map(str::to_string),
            attributes,
        };

        Validation {
            issues,
            draft: Some(draft),
        }
    }

    /// Issue for a SKU whose slug is already used by a stored product.
    pub fn slug_taken(row: i32, sku: &str, slug: &str) -> RowIssue {
        RowIssue::validation_error(
            row,
            "product_sku",
            format!("a product with slug '{slug}' already exists (sku {sku})"),
        )
    }

    fn attribute_columns(&self, row: &CsvRow) -> Vec<AttributeColumn> {
        row.fields()
            .filter_map(|(column, value)| {
                let name = column.strip_prefix(self.attribute_prefix.as_str())?.trim();
                if name.is_empty() {
                    return None;
                }
                let values = crate::ingest::attributes::split_values(value);
                (!values.is_empty()).then(|| AttributeColumn {
                    name: name.to_string(),
                    values,
                })
            })
            .collect()
    }
}

/// `(regular - sale) / regular * 100`, rounded; `None` without a regular price.
pub fn expected_discount(regular: f64, sale: f64) -> Option<f64> {
    (regular > 0.0).then(|| ((regular - sale) / regular * 100.0).round())
}

fn number(row: &CsvRow, column: &str, issues: &mut Vec<RowIssue>) -> Option<f64> {
    let raw = row.get(column)?;
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            issues.push(RowIssue::validation_error(
                row.index,
                column,
                format!("{column} must be a number, got '{raw}'"),
            ));
            None
        }
    }
}

/// Whole-number cell. Integral decimals such as `10.0` are accepted.
fn integer(row: &CsvRow, column: &str, issues: &mut Vec<RowIssue>) -> Option<i32> {
    let raw = row.get(column)?;
    let parsed = raw.parse::<i32>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|value| value.fract() == 0.0)
            .filter(|value| (f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(value))
            .map(|value| value as i32)
    });
    match parsed {
        Some(value) => Some(value),
        None => {
            issues.push(RowIssue::validation_error(
                row.index,
                column,
                format!("{column} must be a whole number, got '{raw}'"),
            ));
            None
        }
    }
}

fn reference(row: &CsvRow, entity: &str, issues: &mut Vec<RowIssue>) -> ReferenceKey {
    let id_column = format!("{entity}_id");
    ReferenceKey {
        id: integer(row, &id_column, issues),
        name: row.get(&format!("{entity}_name")).map(str::to_string),
    }
}
