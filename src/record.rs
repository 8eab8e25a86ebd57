use std::cmp::Ordering;

use serde::Deserialize;

/// One immutable product as delivered by the record source. A refresh
/// replaces the whole collection, single records are never mutated.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Product {
    pub id: u64,
    pub title: String,
    // Some payloads omit the brand entirely.
    #[serde(default)]
    pub brand: String,
    pub category: String,
    pub price: f64,
    pub rating: f64,
    pub stock: u64,
    #[serde(default)]
    pub thumbnail: String,
}

/// A single cell, typed so sorting can use the natural ordering of the
/// underlying field instead of its string form.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue<'a> {
    Text(&'a str),
    Number(f64),
    Count(u64),
}

impl CellValue<'_> {
    /// Raw stringification, the value filters match against. This is the
    /// plain `9.99` form, never the `$9.99` display form.
    pub fn raw(&self) -> String {
        match self {
            CellValue::Text(s) => (*s).to_string(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Count(n) => n.to_string(),
        }
    }

    pub fn compare(&self, other: &CellValue) -> Ordering {
        match (self, other) {
            (CellValue::Text(a), CellValue::Text(b)) => a.cmp(b),
            (CellValue::Number(a), CellValue::Number(b)) => a.total_cmp(b),
            (CellValue::Count(a), CellValue::Count(b)) => a.cmp(b),
            // A column always yields one variant, but keep the comparison total.
            (a, b) => a.raw().cmp(&b.raw()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColumnId {
    Title,
    Brand,
    Category,
    Price,
    Rating,
    Stock,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Align {
    Left,
    Center,
}

/// Static per-column metadata. The set of columns is fixed for the life of
/// the program, only their presentation order changes.
#[derive(Debug)]
pub struct ColumnSpec {
    pub id: ColumnId,
    pub label: &'static str,
    pub sortable: bool,
    pub filterable: bool,
    pub align: Align,
    /// Marks columns whose filter box renders as a numeric-style input.
    /// Matching is unaffected, it always runs on the raw string.
    pub numeric: bool,
}

pub const COLUMNS: [ColumnSpec; 6] = [
    ColumnSpec {
        id: ColumnId::Title,
        label: "Title",
        sortable: true,
        filterable: true,
        align: Align::Left,
        numeric: false,
    },
    ColumnSpec {
        id: ColumnId::Brand,
        label: "Brand",
        sortable: true,
        filterable: true,
        align: Align::Center,
        numeric: false,
    },
    ColumnSpec {
        id: ColumnId::Category,
        label: "Category",
        sortable: true,
        filterable: true,
        align: Align::Center,
        numeric: false,
    },
    ColumnSpec {
        id: ColumnId::Price,
        label: "Price",
        sortable: true,
        filterable: true,
        align: Align::Center,
        numeric: true,
    },
    ColumnSpec {
        id: ColumnId::Rating,
        label: "Rating",
        sortable: true,
        filterable: true,
        align: Align::Center,
        numeric: true,
    },
    ColumnSpec {
        id: ColumnId::Stock,
        label: "Stock",
        sortable: true,
        filterable: true,
        align: Align::Center,
        numeric: true,
    },
];

impl ColumnId {
    /// Pure accessor from a record to the typed field value.
    pub fn value<'a>(&self, product: &'a Product) -> CellValue<'a> {
        match self {
            ColumnId::Title => CellValue::Text(&product.title),
            ColumnId::Brand => CellValue::Text(&product.brand),
            ColumnId::Category => CellValue::Text(&product.category),
            ColumnId::Price => CellValue::Number(product.price),
            ColumnId::Rating => CellValue::Number(product.rating),
            ColumnId::Stock => CellValue::Count(product.stock),
        }
    }

    /// The cell as the UI renders it. Prices get a currency prefix and two
    /// fraction digits, ratings one fraction digit.
    pub fn display(&self, product: &Product) -> String {
        match self {
            ColumnId::Price => format!("${:.2}", product.price),
            ColumnId::Rating => format!("{:.1}", product.rating),
            _ => self.value(product).raw(),
        }
    }

    pub fn spec(&self) -> &'static ColumnSpec {
        COLUMNS
            .iter()
            .find(|spec| spec.id == *self)
            .expect("every column id has a spec entry")
    }
}

/// Declaration order of the column table, the default presentation order.
pub fn default_order() -> Vec<ColumnId> {
    COLUMNS.iter().map(|spec| spec.id).collect()
}

/// Field list for the record detail view, including the fields that have no
/// table column of their own.
pub fn detail_fields(product: &Product) -> Vec<(&'static str, String)> {
    vec![
        ("Id", product.id.to_string()),
        ("Title", product.title.clone()),
        ("Brand", product.brand.clone()),
        ("Category", product.category.clone()),
        ("Price", ColumnId::Price.display(product)),
        ("Rating", ColumnId::Rating.display(product)),
        ("Stock", product.stock.to_string()),
        ("Thumbnail", product.thumbnail.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phone() -> Product {
        Product {
            id: 1,
            title: "iPhone 9".to_string(),
            brand: "Apple".to_string(),
            category: "smartphones".to_string(),
            price: 549.0,
            rating: 4.69,
            stock: 94,
            thumbnail: "https://example.com/1.png".to_string(),
        }
    }

    #[test]
    fn raw_values_are_unformatted() {
        let p = phone();
        assert_eq!(ColumnId::Price.value(&p).raw(), "549");
        assert_eq!(ColumnId::Rating.value(&p).raw(), "4.69");
        assert_eq!(ColumnId::Stock.value(&p).raw(), "94");
    }

    #[test]
    fn display_values_are_formatted() {
        let p = phone();
        assert_eq!(ColumnId::Price.display(&p), "$549.00");
        assert_eq!(ColumnId::Rating.display(&p), "4.7");
        assert_eq!(ColumnId::Title.display(&p), "iPhone 9");
    }

    #[test]
    fn missing_brand_defaults_to_empty() {
        let p: Product = serde_json::from_str(
            r#"{"id":7,"title":"Oil","category":"groceries",
                "price":9.99,"rating":4.25,"stock":22}"#,
        )
        .unwrap();
        assert_eq!(p.brand, "");
        assert_eq!(ColumnId::Price.value(&p).raw(), "9.99");
    }

    #[test]
    fn default_order_matches_declaration() {
        assert_eq!(
            default_order(),
            vec![
                ColumnId::Title,
                ColumnId::Brand,
                ColumnId::Category,
                ColumnId::Price,
                ColumnId::Rating,
                ColumnId::Stock,
            ]
        );
    }
}
