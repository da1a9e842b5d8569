//! Typed view over an imported product row.
//!
//! [`PRODUCT_FIELD_ORDER`] is the single place that defines which columns
//! become block properties and in which order. The rendering side discovers
//! product fields by position, so this order must match the spreadsheet
//! column order.

use crate::sheet_parser::RowRecord;

/// Block property order, identical to the product model's column order.
pub const PRODUCT_FIELD_ORDER: [&str; 9] = [
    "category",
    "release_region",
    "release_date",
    "product_title",
    "product_descr",
    "product_price",
    "remarks",
    "allergy",
    "product_image",
];

/// Column holding rich text; sent wrapped in a paragraph.
pub const RICH_TEXT_FIELD: &str = "product_descr";

/// Columns tried, in order, for the node name.
const NAME_COLUMNS: [&str; 3] = ["name", "Name", "NAME"];

/// Product columns. `Some` means the column exists in the sheet, even when
/// the cell is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFields {
    pub category: Option<String>,
    pub release_region: Option<String>,
    pub release_date: Option<String>,
    pub product_title: Option<String>,
    pub product_descr: Option<String>,
    pub product_price: Option<String>,
    pub remarks: Option<String>,
    pub allergy: Option<String>,
    pub product_image: Option<String>,
}

impl ProductFields {
    pub fn from_record(record: &RowRecord) -> Self {
        let mut fields = Self::default();
        for key in PRODUCT_FIELD_ORDER {
            if let (Some(slot), Some(value)) = (fields.slot_mut(key), record.get(key)) {
                *slot = Some(value.to_string());
            }
        }
        fields
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let slot = match key {
            "category" => &self.category,
            "release_region" => &self.release_region,
            "release_date" => &self.release_date,
            "product_title" => &self.product_title,
            "product_descr" => &self.product_descr,
            "product_price" => &self.product_price,
            "remarks" => &self.remarks,
            "allergy" => &self.allergy,
            "product_image" => &self.product_image,
            _ => return None,
        };
        slot.as_deref()
    }

    fn slot_mut(&mut self, key: &str) -> Option<&mut Option<String>> {
        Some(match key {
            "category" => &mut self.category,
            "release_region" => &mut self.release_region,
            "release_date" => &mut self.release_date,
            "product_title" => &mut self.product_title,
            "product_descr" => &mut self.product_descr,
            "product_price" => &mut self.product_price,
            "remarks" => &mut self.remarks,
            "allergy" => &mut self.allergy,
            "product_image" => &mut self.product_image,
            _ => return None,
        })
    }

    /// Present fields in [`PRODUCT_FIELD_ORDER`].
    pub fn ordered(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        PRODUCT_FIELD_ORDER
            .into_iter()
            .filter_map(move |key| self.get(key).map(|value| (key, value)))
    }
}

/// Lower-cased category of a row, `default` when missing or empty.
pub fn resolve_category(record: &RowRecord, default: &str) -> String {
    record
        .non_empty("category")
        .unwrap_or(default)
        .to_lowercase()
}

/// Node name of a row: `name`/`Name`/`NAME`, else `item-{index}`.
pub fn resolve_name(record: &RowRecord, index: usize) -> String {
    NAME_COLUMNS
        .iter()
        .find_map(|c| record.non_empty(c))
        .map(str::to_string)
        .unwrap_or_else(|| format!("item-{}", index))
}

/// One row ready for import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRow {
    /// Zero-based position in the sheet.
    pub index: usize,
    pub name: String,
    pub category: String,
    /// Label used in progress reports and results.
    pub display_title: String,
    /// Value of the `name` column, stored as the block's `jcr:title`.
    pub block_title: Option<String>,
    pub fields: ProductFields,
}

impl ProductRow {
    pub fn from_record(index: usize, record: &RowRecord, default_category: &str) -> Self {
        let name = resolve_name(record, index);
        let display_title = record
            .non_empty("product_title")
            .or_else(|| record.non_empty("productTitle"))
            .map(str::to_string)
            .unwrap_or_else(|| name.clone());

        Self {
            index,
            category: resolve_category(record, default_category),
            display_title,
            block_title: record.non_empty("name").map(str::to_string),
            fields: ProductFields::from_record(record),
            name,
        }
    }

    /// Page title, from a non-empty `product_title`.
    pub fn page_title(&self) -> Option<&str> {
        self.fields.product_title.as_deref().filter(|t| !t.is_empty())
    }

    /// Staging-relative image file, when the row names one.
    pub fn image(&self) -> Option<&str> {
        self.fields.product_image.as_deref().filter(|i| !i.is_empty())
    }

    pub fn set_image(&mut self, path: impl Into<String>) {
        self.fields.product_image = Some(path.into());
    }

    /// Block properties in storage order, rich text wrapped in `<p>`.
    pub fn block_properties(&self) -> Vec<(&'static str, String)> {
        self.fields
            .ordered()
            .map(|(key, value)| {
                if key == RICH_TEXT_FIELD {
                    (key, format!("<p>{}</p>", value))
                } else {
                    (key, value.to_string())
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> RowRecord {
        let headers: Vec<String> = pairs.iter().map(|(k, _)| k.to_string()).collect();
        let cells = pairs.iter().map(|(_, v)| v.to_string()).collect();
        RowRecord::from_cells(&headers, cells)
    }

    #[test]
    fn test_name_resolution() {
        assert_eq!(resolve_name(&record(&[("name", "sake")]), 3), "sake");
        assert_eq!(resolve_name(&record(&[("Name", "ume")]), 3), "ume");
        assert_eq!(
            resolve_name(&record(&[("name", ""), ("NAME", "konbu")]), 3),
            "konbu"
        );
        assert_eq!(resolve_name(&record(&[("name", "")]), 7), "item-7");
    }

    #[test]
    fn test_category_resolution() {
        assert_eq!(resolve_category(&record(&[("category", "Bento")]), "omusubi"), "bento");
        assert_eq!(resolve_category(&record(&[("category", "")]), "omusubi"), "omusubi");
        assert_eq!(resolve_category(&record(&[("name", "x")]), "omusubi"), "omusubi");
    }

    #[test]
    fn test_block_properties_follow_model_order() {
        // Sheet columns deliberately out of model order
        let row = ProductRow::from_record(
            0,
            &record(&[
                ("product_image", "sake.png"),
                ("name", "sake"),
                ("product_descr", "Grilled salmon"),
                ("category", "Omusubi"),
                ("unknown", "ignored"),
                ("product_price", "180"),
            ]),
            "omusubi",
        );
        let props = row.block_properties();
        let keys: Vec<_> = props.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            keys,
            vec!["category", "product_descr", "product_price", "product_image"]
        );
        assert_eq!(props[0].1, "Omusubi");
        assert_eq!(props[1].1, "<p>Grilled salmon</p>");
    }

    #[test]
    fn test_empty_columns_are_still_present() {
        let row = ProductRow::from_record(0, &record(&[("remarks", "")]), "omusubi");
        assert_eq!(row.block_properties(), vec![("remarks", String::new())]);
    }

    #[test]
    fn test_titles() {
        let row = ProductRow::from_record(
            2,
            &record(&[("name", "sake"), ("product_title", "Salmon")]),
            "omusubi",
        );
        assert_eq!(row.display_title, "Salmon");
        assert_eq!(row.page_title(), Some("Salmon"));
        assert_eq!(row.block_title.as_deref(), Some("sake"));

        let untitled = ProductRow::from_record(4, &record(&[("product_title", "")]), "omusubi");
        assert_eq!(untitled.name, "item-4");
        assert_eq!(untitled.display_title, "item-4");
        assert_eq!(untitled.page_title(), None);
        assert_eq!(untitled.block_title, None);
    }

    #[test]
    fn test_set_image() {
        let mut row = ProductRow::from_record(0, &record(&[("product_image", "a.png")]), "x");
        assert_eq!(row.image(), Some("a.png"));
        row.set_image("/content/dam/fma/goods/x/a.png");
        assert_eq!(row.image(), Some("/content/dam/fma/goods/x/a.png"));
    }
}
