use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const TITLE: &str = "title";
pub const DATE: &str = "date";
pub const TIME: &str = "time";
pub const LOCATION: &str = "location";
pub const APPLY: &str = "apply";
pub const CATEGORY: &str = "category";
pub const TARGET: &str = "target";
pub const BODY: &str = "body";
pub const URL: &str = "url";
pub const PROVENANCE: &str = "provenance";
/// `YYYY-MM` the date text resolves against, set by calendar extractors.
pub const REFERENCE: &str = "reference";

/// Unvalidated field bag produced by an extractor for one source item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    fields: BTreeMap<String, String>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Empty values are not stored, so `get` never returns `Some("")`.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        let value = value.trim();
        if value.is_empty() {
            self.fields.remove(key);
        } else {
            self.fields.insert(key.to_string(), value.to_string());
        }
    }

    /// Append a line to a multi-line field.
    pub fn append(&mut self, key: &str, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        match self.fields.get_mut(key) {
            Some(existing) => {
                existing.push('\n');
                existing.push_str(value);
            }
            None => {
                self.fields.insert(key.to_string(), value.to_string());
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn text(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    pub fn has(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_are_not_stored() {
        let r = RawRecord::new().with(TITLE, "  ").with(DATE, "3月5日");
        assert!(!r.has(TITLE));
        assert_eq!(r.text(TITLE), "");
        assert_eq!(r.get(DATE), Some("3月5日"));
    }

    #[test]
    fn append_joins_lines() {
        let mut r = RawRecord::new();
        r.append(BODY, "持ち物：バスタオル");
        r.append(BODY, "");
        r.append(BODY, "※雨天中止");
        assert_eq!(r.text(BODY), "持ち物：バスタオル\n※雨天中止");
    }

    #[test]
    fn deserializes_from_flat_object() {
        let r: RawRecord =
            serde_json::from_str(r#"{"title":"絵本の会","date":"2026年3月5日"}"#).unwrap();
        assert_eq!(r.text(TITLE), "絵本の会");
        assert_eq!(r.text(DATE), "2026年3月5日");
    }
}
