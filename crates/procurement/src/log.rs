//! Append-only change log of a purchase request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use epro_core::change::display_value;
use epro_core::{DomainError, DomainResult, Entity, FieldChange, LogEntryId, RequestId, UserId};

use crate::status::RequestStatus;

/// Bookkeeping fields left out of request change logs.
pub const UNTRACKED_FIELDS: &[&str] = &["updated_at", "updated_by"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub id: LogEntryId,
    pub request_id: RequestId,
    pub field_ref: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub description: Option<String>,
    pub manual: bool,
    pub changed_by: Option<UserId>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewManualLogEntry {
    pub field_ref: Option<String>,
    pub description: String,
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

impl RequestLogEntry {
    pub fn from_change(
        request_id: RequestId,
        change: &FieldChange,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LogEntryId::new(),
            request_id,
            field_ref: change.field.clone(),
            old_value: non_empty(display_value(&change.old)),
            new_value: non_empty(display_value(&change.new)),
            description: None,
            manual: false,
            changed_by: actor,
            changed_at: now,
        }
    }

    pub fn status_change(
        request_id: RequestId,
        from: RequestStatus,
        to: RequestStatus,
        notes: Option<String>,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LogEntryId::new(),
            request_id,
            field_ref: "status".to_string(),
            old_value: Some(from.to_string()),
            new_value: Some(to.to_string()),
            description: notes,
            manual: false,
            changed_by: Some(actor),
            changed_at: now,
        }
    }

    pub fn manual(
        request_id: RequestId,
        new: NewManualLogEntry,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let description = new.description.trim();
        if description.is_empty() {
            return Err(DomainError::validation("log description is required"));
        }
        Ok(Self {
            id: LogEntryId::new(),
            request_id,
            field_ref: new
                .field_ref
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty())
                .unwrap_or_else(|| "note".to_string()),
            old_value: None,
            new_value: None,
            description: Some(description.to_string()),
            manual: true,
            changed_by: actor,
            changed_at: now,
        })
    }
}

/// One log entry per changed field.
pub fn entries_for_changes(
    request_id: RequestId,
    changes: &[FieldChange],
    actor: Option<UserId>,
    now: DateTime<Utc>,
) -> Vec<RequestLogEntry> {
    changes
        .iter()
        .map(|c| RequestLogEntry::from_change(request_id, c, actor, now))
        .collect()
}

impl Entity for RequestLogEntry {
    type Id = LogEntryId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn change_entry_renders_plain_values() {
        let change = FieldChange {
            field: "delivery_address".to_string(),
            old: Value::from("Depot"),
            new: Value::from("Main warehouse"),
        };
        let entry = RequestLogEntry::from_change(RequestId::new(), &change, None, Utc::now());
        assert_eq!(entry.field_ref, "delivery_address");
        assert_eq!(entry.old_value.as_deref(), Some("Depot"));
        assert_eq!(entry.new_value.as_deref(), Some("Main warehouse"));
        assert!(!entry.manual);
    }

    #[test]
    fn null_values_are_recorded_as_absent() {
        let change = FieldChange {
            field: "notes".to_string(),
            old: Value::Null,
            new: Value::from("urgent"),
        };
        let entry = RequestLogEntry::from_change(RequestId::new(), &change, None, Utc::now());
        assert_eq!(entry.old_value, None);
    }

    #[test]
    fn status_entry_names_both_states() {
        let entry = RequestLogEntry::status_change(
            RequestId::new(),
            RequestStatus::Drafted,
            RequestStatus::ProcurementVerified,
            None,
            UserId::new(),
            Utc::now(),
        );
        assert_eq!(entry.field_ref, "status");
        assert_eq!(entry.old_value.as_deref(), Some("drafted"));
        assert_eq!(entry.new_value.as_deref(), Some("procurement_verified"));
    }

    #[test]
    fn manual_entry_needs_a_description() {
        let new = NewManualLogEntry {
            field_ref: None,
            description: "  ".to_string(),
        };
        assert!(RequestLogEntry::manual(RequestId::new(), new, None, Utc::now()).is_err());

        let new = NewManualLogEntry {
            field_ref: None,
            description: "called vendor".to_string(),
        };
        let entry = RequestLogEntry::manual(RequestId::new(), new, None, Utc::now()).unwrap();
        assert!(entry.manual);
        assert_eq!(entry.field_ref, "note");
    }
}
