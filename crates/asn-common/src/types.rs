//! Common types used across the ASN workspace

use serde::{Deserialize, Serialize};

/// One shipment container parsed from an ASN manifest.
///
/// A box is opened by an `HDR` record and owns every `LINE` record that
/// follows it up to the next `HDR` or the end of the file. The `box_id` is
/// the natural identifier and is unique across all ingested boxes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxRecord {
    pub supplier_id: String,
    pub box_id: String,
    /// Line items in source order; may be empty.
    pub contents: Vec<BoxContent>,
}

impl BoxRecord {
    pub fn new(supplier_id: impl Into<String>, box_id: impl Into<String>) -> Self {
        Self {
            supplier_id: supplier_id.into(),
            box_id: box_id.into(),
            contents: Vec::new(),
        }
    }
}

/// One line item inside a box: a purchase order, a product identifier and a
/// quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxContent {
    pub po_number: String,
    pub isbn: String,
    pub quantity: u32,
}

impl BoxContent {
    pub fn new(po_number: impl Into<String>, isbn: impl Into<String>, quantity: u32) -> Self {
        Self {
            po_number: po_number.into(),
            isbn: isbn.into(),
            quantity,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_box_record_new_starts_empty() {
        let rec = BoxRecord::new("TRSP117", "6874454I");
        assert_eq!(rec.supplier_id, "TRSP117");
        assert_eq!(rec.box_id, "6874454I");
        assert!(rec.contents.is_empty());
    }

    #[test]
    fn test_box_content_new() {
        let content = BoxContent::new("P000001661", "9781465121550", 12);
        assert_eq!(content.po_number, "P000001661");
        assert_eq!(content.isbn, "9781465121550");
        assert_eq!(content.quantity, 12);
    }
}
