//! Creation / modification stamps carried by every stored record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStamp {
    pub created_at: DateTime<Utc>,
    pub created_by: Option<UserId>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<UserId>,
}

impl AuditStamp {
    pub fn created(actor: Option<UserId>, now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            created_by: actor,
            updated_at: None,
            updated_by: None,
        }
    }

    /// Record a modification. The creator is never overwritten.
    pub fn touch(&mut self, actor: Option<UserId>, now: DateTime<Utc>) {
        self.updated_at = Some(now);
        self.updated_by = actor;
    }
}
