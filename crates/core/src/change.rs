//! Snapshot-and-compare change tracking.
//!
//! Capture a [`Snapshot`] when a record is loaded, mutate the record, then
//! diff the snapshot against the record's new state to learn which fields
//! changed. Snapshots are built from the record's serde representation, so
//! any `Serialize` struct works and field names match the wire names.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::error::{DomainError, DomainResult};

/// Old and new value of a single changed field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub old: Value,
    pub new: Value,
}

/// Flattened top-level field values of a record at one point in time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    fields: BTreeMap<String, Value>,
}

impl Snapshot {
    /// Capture the current state of `record`.
    ///
    /// The record must serialize to a JSON object.
    pub fn capture<T: Serialize>(record: &T) -> DomainResult<Self> {
        match serde_json::to_value(record) {
            Ok(Value::Object(map)) => Ok(Self {
                fields: map.into_iter().collect(),
            }),
            Ok(_) => Err(DomainError::invariant("snapshot target must be a struct")),
            Err(e) => Err(DomainError::invariant(format!("snapshot failed: {e}"))),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Fields whose value differs between `self` (before) and `after`, in
    /// field-name order. Fields present on only one side count as changed.
    pub fn diff(&self, after: &Snapshot) -> Vec<FieldChange> {
        let mut names: Vec<&String> = self.fields.keys().chain(after.fields.keys()).collect();
        names.sort();
        names.dedup();

        names
            .into_iter()
            .filter_map(|name| {
                let old = self.fields.get(name).cloned().unwrap_or(Value::Null);
                let new = after.fields.get(name).cloned().unwrap_or(Value::Null);
                (old != new).then(|| FieldChange {
                    field: name.clone(),
                    old,
                    new,
                })
            })
            .collect()
    }

    /// Diff ignoring the given fields (bookkeeping such as `updated_at`).
    pub fn diff_except(&self, after: &Snapshot, ignored: &[&str]) -> Vec<FieldChange> {
        self.diff(after)
            .into_iter()
            .filter(|c| !ignored.contains(&c.field.as_str()))
            .collect()
    }

    pub fn has_changed(&self, after: &Snapshot) -> bool {
        !self.diff(after).is_empty()
    }

    pub fn changed_fields(&self, after: &Snapshot) -> Vec<String> {
        self.diff(after).into_iter().map(|c| c.field).collect()
    }

    /// Diff for a single field, `None` if unchanged.
    pub fn field_diff(&self, after: &Snapshot, field: &str) -> Option<FieldChange> {
        self.diff(after).into_iter().find(|c| c.field == field)
    }
}

/// Render a JSON value for a log line: strings unquoted, null as empty.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize, Clone)]
    struct Place {
        rank: u32,
        name: String,
        categories: Option<Vec<u32>>,
    }

    fn place() -> Place {
        Place {
            rank: 0,
            name: "depot".to_string(),
            categories: None,
        }
    }

    #[test]
    fn unchanged_record_has_no_diff() {
        let p = place();
        let before = Snapshot::capture(&p).unwrap();
        let after = Snapshot::capture(&p).unwrap();
        assert!(!before.has_changed(&after));
        assert!(before.changed_fields(&after).is_empty());
    }

    #[test]
    fn reports_changed_fields_with_old_and_new_values() {
        let mut p = place();
        let before = Snapshot::capture(&p).unwrap();
        p.rank = 42;
        p.categories = Some(vec![1, 3, 5]);
        let after = Snapshot::capture(&p).unwrap();

        assert_eq!(before.changed_fields(&after), vec!["categories", "rank"]);
        let rank = before.field_diff(&after, "rank").unwrap();
        assert_eq!(rank.old, Value::from(0));
        assert_eq!(rank.new, Value::from(42));
        assert!(before.field_diff(&after, "name").is_none());
    }

    #[test]
    fn ignored_fields_are_filtered() {
        let mut p = place();
        let before = Snapshot::capture(&p).unwrap();
        p.rank = 1;
        let after = Snapshot::capture(&p).unwrap();
        assert!(before.diff_except(&after, &["rank"]).is_empty());
    }

    #[test]
    fn non_struct_values_are_rejected() {
        assert!(Snapshot::capture(&5u32).is_err());
    }

    #[test]
    fn display_value_unquotes_strings() {
        assert_eq!(display_value(&Value::from("abc")), "abc");
        assert_eq!(display_value(&Value::Null), "");
        assert_eq!(display_value(&Value::from(1.5)), "1.5");
    }
}
