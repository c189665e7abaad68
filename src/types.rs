//! Shared types passed between the pipeline components.
//!
//! [`PhotoDocument`] is the unit of record: it is built by the staging
//! reconciler, buffered by the write engine and serialized into the
//! document store as JSON.

use serde::{Deserialize, Serialize};

/// One ingested photo as persisted in the document store.
///
/// Optional fields are omitted from the serialized form when absent, so a
/// document without a city stores no `city` key at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoDocument {
    /// Final filename in the destination directory.
    pub name: String,
    /// Capture year parsed from the filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// Name of the depth-one subfolder the source file lived in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    /// Shuffled multiple-choice options containing the true year.
    #[serde(
        default,
        rename = "yearOptions",
        skip_serializing_if = "Option::is_none"
    )]
    pub year_options: Option<Vec<i32>>,
}

impl PhotoDocument {
    pub fn new(name: impl Into<String>, year: Option<i32>, city: Option<String>) -> Self {
        Self {
            name: name.into(),
            year,
            city,
            year_options: None,
        }
    }

    /// True when at least one of `year` or `city` is present.
    pub fn has_metadata(&self) -> bool {
        self.richness() > 0
    }

    /// Number of metadata fields present (0, 1 or 2).
    ///
    /// Used to decide which of two documents competing for the same
    /// destination name carries more information.
    pub fn richness(&self) -> u8 {
        u8::from(self.year.is_some()) + u8::from(self.city.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_are_not_serialized() {
        let doc = PhotoDocument::new("root_photo.png", None, None);
        let json = serde_json::to_string(&doc).unwrap();
        assert_eq!(json, r#"{"name":"root_photo.png"}"#);
    }

    #[test]
    fn year_options_use_camel_case_key() {
        let mut doc = PhotoDocument::new("a.jpg", Some(2023), None);
        doc.year_options = Some(vec![2021, 2023, 2025, 2020]);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["yearOptions"], serde_json::json!([2021, 2023, 2025, 2020]));
        assert!(json.get("year_options").is_none());
    }

    #[test]
    fn richness_counts_present_fields() {
        assert_eq!(PhotoDocument::new("a", None, None).richness(), 0);
        assert_eq!(PhotoDocument::new("a", Some(2001), None).richness(), 1);
        assert_eq!(
            PhotoDocument::new("a", Some(2001), Some("paris".into())).richness(),
            2
        );
        assert!(!PhotoDocument::new("a", None, None).has_metadata());
    }
}
