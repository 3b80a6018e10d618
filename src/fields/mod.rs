// src/fields/mod.rs

mod extract;

pub use extract::{MatchMode, extract_fields, extract_fields_with};

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

/// Value stored for any field the model reply did not mention.
pub const SENTINEL: &str = "NA";

/// One column of the invoice schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub default: &'static str,
}

const fn field(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        default: SENTINEL,
    }
}

/// The fixed field schema. Order is the column order of every output row.
pub const FIELDS: [FieldSpec; 17] = [
    field("PO Number"),
    field("Invoice Number"),
    field("Invoice Amount"),
    field("Invoice Date"),
    field("CGST Amount"),
    field("SGST Amount"),
    field("IGST Amount"),
    field("Total Tax Amount"),
    field("Taxable Amount"),
    field("TCS Amount"),
    field("IRN Number"),
    field("Receiver GSTIN"),
    field("Receiver Name"),
    field("Vendor GSTIN"),
    field("Vendor Name"),
    field("Remarks"),
    field("Vendor Code"),
];

/// Extracted values for one invoice, one slot per entry in [`FIELDS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRecord {
    values: [String; FIELDS.len()],
}

impl Default for InvoiceRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl InvoiceRecord {
    /// A record with every field at its default.
    pub fn new() -> Self {
        Self {
            values: FIELDS.map(|f| f.default.to_string()),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        FIELDS
            .iter()
            .position(|f| f.name == name)
            .map(|i| self.values[i].as_str())
    }

    pub(crate) fn set(&mut self, index: usize, value: String) {
        self.values[index] = value;
    }

    /// `(name, value)` pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> + '_ {
        FIELDS
            .iter()
            .zip(self.values.iter())
            .map(|(f, v)| (f.name, v.as_str()))
    }

    /// The row appended to every sink.
    pub fn to_row(&self) -> Vec<String> {
        self.values.to_vec()
    }

    pub fn header_row() -> Vec<String> {
        FIELDS.iter().map(|f| f.name.to_string()).collect()
    }

    /// How many fields hold something other than their default.
    pub fn coverage(&self) -> (usize, usize) {
        let filled = FIELDS
            .iter()
            .zip(self.values.iter())
            .filter(|(f, v)| v.as_str() != f.default)
            .count();
        (filled, FIELDS.len())
    }
}

impl Serialize for InvoiceRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FIELDS.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_all_sentinel() {
        let record = InvoiceRecord::new();
        assert_eq!(record.iter().count(), 17);
        assert!(record.iter().all(|(_, v)| v == SENTINEL));
        assert_eq!(record.coverage(), (0, 17));
    }

    #[test]
    fn test_row_follows_schema_order() {
        let mut record = InvoiceRecord::new();
        record.set(0, "PO-1".into());
        record.set(16, "V-9".into());

        let row = record.to_row();
        assert_eq!(row.len(), 17);
        assert_eq!(row[0], "PO-1");
        assert_eq!(row[1], "NA");
        assert_eq!(row[16], "V-9");
        assert_eq!(record.get("Vendor Code"), Some("V-9"));
        assert_eq!(record.get("Unknown Field"), None);
        assert_eq!(record.coverage(), (2, 17));
    }

    #[test]
    fn test_header_row_matches_field_names() {
        let header = InvoiceRecord::header_row();
        assert_eq!(header.first().map(String::as_str), Some("PO Number"));
        assert_eq!(header.last().map(String::as_str), Some("Vendor Code"));
        assert_eq!(header.len(), FIELDS.len());
    }

    #[test]
    fn test_json_keeps_field_order() {
        let mut record = InvoiceRecord::new();
        record.set(2, "1234.50".into());
        let json = serde_json::to_string(&record).unwrap();

        assert!(json.starts_with(r#"{"PO Number":"NA","Invoice Number":"NA","Invoice Amount":"1234.50""#));
        assert!(json.ends_with(r#""Vendor Code":"NA"}"#));
    }
}
