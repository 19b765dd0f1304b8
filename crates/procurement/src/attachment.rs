//! Files attached to request items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use epro_core::{AttachmentId, AuditStamp, DomainError, DomainResult, Entity, ItemId, RequestId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAttachment {
    pub id: AttachmentId,
    pub item_id: ItemId,
    pub file_name: String,
    /// Storage-relative path of the file.
    pub path: String,
    pub content_type: Option<String>,
    pub size_bytes: u64,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewAttachment {
    pub file_name: String,
    pub content_type: Option<String>,
}

/// Reduce an uploaded name to its final path component.
pub fn sanitize_file_name(name: &str) -> DomainResult<String> {
    let last = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if last.is_empty() || last == "." || last == ".." || last.chars().any(char::is_control) {
        return Err(DomainError::validation("attachment file name is not valid"));
    }
    Ok(last.to_string())
}

fn path_segment(value: &str) -> String {
    let segment: String = value
        .trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
        .collect();
    match segment.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => segment,
    }
}

/// `purchase_request/{office}/pr_{request}/item_{item}/{file}`.
pub fn storage_path(office_name: &str, request_id: RequestId, item_id: ItemId, file_name: &str) -> String {
    format!(
        "purchase_request/{}/pr_{request_id}/item_{item_id}/{file_name}",
        path_segment(office_name)
    )
}

impl ItemAttachment {
    pub fn create(
        office_name: &str,
        request_id: RequestId,
        item_id: ItemId,
        new: NewAttachment,
        size_bytes: u64,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let file_name = sanitize_file_name(&new.file_name)?;
        Ok(Self {
            id: AttachmentId::new(),
            item_id,
            path: storage_path(office_name, request_id, item_id, &file_name),
            file_name,
            content_type: new.content_type.filter(|c| !c.trim().is_empty()),
            size_bytes,
            audit: AuditStamp::created(actor, now),
        })
    }
}

impl Entity for ItemAttachment {
    type Id = AttachmentId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_keeps_only_last_component() {
        assert_eq!(sanitize_file_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_file_name("C:\\docs\\quote.pdf").unwrap(), "quote.pdf");
        assert!(sanitize_file_name("uploads/").is_err());
        assert!(sanitize_file_name("..").is_err());
    }

    #[test]
    fn path_is_derived_from_owners() {
        let request = RequestId::new();
        let item = ItemId::new();
        let path = storage_path("Kabul/Main", request, item, "quote.pdf");
        assert_eq!(
            path,
            format!("purchase_request/Kabul_Main/pr_{request}/item_{item}/quote.pdf")
        );
    }

    #[test]
    fn create_records_size_and_type() {
        let a = ItemAttachment::create(
            "Kabul",
            RequestId::new(),
            ItemId::new(),
            NewAttachment {
                file_name: "datasheet.pdf".to_string(),
                content_type: Some("application/pdf".to_string()),
            },
            1024,
            None,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(a.file_name, "datasheet.pdf");
        assert_eq!(a.size_bytes, 1024);
        assert!(a.path.ends_with("/datasheet.pdf"));
    }
}
