//! Item attachments: the record lives in the procurement store, the bytes in a
//! [`FileStore`].
//!
//! The record is inserted first so a duplicate name fails before anything is
//! written. If the file write then fails the record is removed again. File
//! deletions after a committed delete are best-effort.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use epro_core::{AttachmentId, ItemId, UserId};
use epro_procurement::{ItemAttachment, NewAttachment};

use crate::files::FileStore;
use crate::store::{Removed, SharedStore, StoreResult};

#[derive(Clone)]
pub struct AttachmentService {
    store: SharedStore,
    files: Arc<dyn FileStore>,
}

impl AttachmentService {
    pub fn new(store: SharedStore, files: Arc<dyn FileStore>) -> Self {
        Self { store, files }
    }

    pub async fn add(
        &self,
        item_id: ItemId,
        new: NewAttachment,
        bytes: &[u8],
        actor: Option<UserId>,
    ) -> StoreResult<ItemAttachment> {
        let location = self.store.item_location(item_id).await?;
        let attachment = ItemAttachment::create(
            &location.office_name,
            location.request_id,
            location.item_id,
            new,
            bytes.len() as u64,
            actor,
            Utc::now(),
        )?;
        let attachment = self.store.insert_attachment(attachment).await?;

        if let Err(err) = self.files.write(&attachment.path, bytes).await {
            if let Err(undo) = self.store.delete_attachment(attachment.id).await {
                warn!(attachment_id = %attachment.id, error = %undo, "failed to remove attachment record after write failure");
            }
            return Err(err);
        }

        info!(
            item_id = %item_id,
            attachment_id = %attachment.id,
            size = attachment.size_bytes,
            "attachment stored"
        );
        Ok(attachment)
    }

    pub async fn list(&self, item_id: ItemId) -> StoreResult<Vec<ItemAttachment>> {
        self.store.list_attachments(item_id).await
    }

    pub async fn delete(&self, id: AttachmentId) -> StoreResult<ItemAttachment> {
        let attachment = self.store.delete_attachment(id).await?;
        self.remove_file(&attachment.path).await;
        info!(attachment_id = %id, "attachment deleted");
        Ok(attachment)
    }

    /// Delete the files of attachments whose records a cascade already removed.
    pub async fn cleanup(&self, removed: &Removed) {
        for path in &removed.attachment_paths {
            self.remove_file(path).await;
        }
    }

    async fn remove_file(&self, path: &str) {
        if let Err(err) = self.files.delete(path).await {
            warn!(path, error = %err, "failed to delete attachment file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use epro_core::DomainError;
    use epro_procurement::{NewCurrency, NewItem, NewOffice, NewPurchaseRequest, NewUnit, PrType};

    use crate::files::InMemoryFileStore;
    use crate::store::{InMemoryProcurementStore, ProcurementStore, StoreError};

    struct BrokenFiles;

    #[async_trait]
    impl FileStore for BrokenFiles {
        async fn write(&self, _: &str, _: &[u8]) -> StoreResult<()> {
            Err(StoreError::Io("disk full".to_string()))
        }

        async fn read(&self, path: &str) -> StoreResult<Vec<u8>> {
            Err(StoreError::Io(format!("{path}: not found")))
        }

        async fn delete(&self, _: &str) -> StoreResult<()> {
            Err(StoreError::Io("read-only".to_string()))
        }
    }

    async fn seeded_item(store: &InMemoryProcurementStore) -> (epro_core::RequestId, ItemId) {
        let office = store
            .create_office(
                NewOffice {
                    name: "Herat".to_string(),
                    country_code: "AF".to_string(),
                },
                None,
            )
            .await
            .unwrap();
        let currency = store
            .create_currency(
                NewCurrency {
                    country_code: "AF".to_string(),
                    code: "AFN".to_string(),
                    name: None,
                },
                None,
            )
            .await
            .unwrap();
        let unit = store
            .create_unit(
                NewUnit {
                    mnemonic: "box".to_string(),
                    description: None,
                },
                None,
            )
            .await
            .unwrap();
        let request = store
            .create_request(
                NewPurchaseRequest {
                    office_id: Some(office.id),
                    currency_id: Some(currency.id),
                    exchange_rate: dec!(1.00),
                    delivery_address: "Herat office".to_string(),
                    project_reference: "Education".to_string(),
                    required_date: NaiveDate::from_ymd_opt(2026, 11, 1).unwrap(),
                    originator: Some(UserId::new()),
                    approver1: Some(UserId::new()),
                    approver2: None,
                    pr_type: PrType::Goods,
                    expense_type: None,
                    notes: None,
                    preferred_supplier: false,
                },
                None,
            )
            .await
            .unwrap();
        let item = store
            .add_item(
                request.id,
                NewItem {
                    quantity: 2,
                    unit_id: unit.id,
                    description_pr: "Notebooks".to_string(),
                    description_po: None,
                    unit_price_local: dec!(5.00),
                },
                None,
            )
            .await
            .unwrap();
        (request.id, item.id)
    }

    fn upload(name: &str) -> NewAttachment {
        NewAttachment {
            file_name: name.to_string(),
            content_type: Some("application/pdf".to_string()),
        }
    }

    #[tokio::test]
    async fn add_writes_file_at_derived_path() {
        let store = Arc::new(InMemoryProcurementStore::new());
        let files = Arc::new(InMemoryFileStore::new());
        let (request_id, item_id) = seeded_item(&store).await;
        let service = AttachmentService::new(store.clone(), files.clone());

        let attachment = service
            .add(item_id, upload("../quote.pdf"), b"%PDF", None)
            .await
            .unwrap();

        assert_eq!(attachment.file_name, "quote.pdf");
        assert_eq!(attachment.size_bytes, 4);
        assert_eq!(
            attachment.path,
            format!("purchase_request/Herat/pr_{request_id}/item_{item_id}/quote.pdf")
        );
        assert_eq!(files.read(&attachment.path).await.unwrap(), b"%PDF");
        assert_eq!(service.list(item_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_name_is_conflict_and_keeps_first_file() {
        let store = Arc::new(InMemoryProcurementStore::new());
        let files = Arc::new(InMemoryFileStore::new());
        let (_, item_id) = seeded_item(&store).await;
        let service = AttachmentService::new(store.clone(), files.clone());

        let first = service.add(item_id, upload("quote.pdf"), b"one", None).await.unwrap();
        let err = service
            .add(item_id, upload("quote.pdf"), b"two", None)
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Domain(DomainError::Conflict(_))));
        assert_eq!(files.read(&first.path).await.unwrap(), b"one");
    }

    #[tokio::test]
    async fn failed_write_removes_record() {
        let store = Arc::new(InMemoryProcurementStore::new());
        let (_, item_id) = seeded_item(&store).await;
        let service = AttachmentService::new(store.clone(), Arc::new(BrokenFiles));

        let err = service
            .add(item_id, upload("quote.pdf"), b"bytes", None)
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Io(_)));
        assert!(store.list_attachments(item_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_record_even_if_file_delete_fails() {
        let store = Arc::new(InMemoryProcurementStore::new());
        let (_, item_id) = seeded_item(&store).await;
        let files = Arc::new(InMemoryFileStore::new());
        let service = AttachmentService::new(store.clone(), files);
        let attachment = service.add(item_id, upload("a.pdf"), b"a", None).await.unwrap();

        let broken = AttachmentService::new(store.clone(), Arc::new(BrokenFiles));
        broken.delete(attachment.id).await.unwrap();

        assert!(store.list_attachments(item_id).await.unwrap().is_empty());
        assert!(matches!(
            broken.delete(attachment.id).await,
            Err(StoreError::Domain(DomainError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn cleanup_deletes_cascaded_files() {
        let store = Arc::new(InMemoryProcurementStore::new());
        let files = Arc::new(InMemoryFileStore::new());
        let (request_id, item_id) = seeded_item(&store).await;
        let service = AttachmentService::new(store.clone(), files.clone());
        service.add(item_id, upload("a.pdf"), b"a", None).await.unwrap();
        service.add(item_id, upload("b.pdf"), b"b", None).await.unwrap();
        assert_eq!(files.len(), 2);

        let removed = store.delete_request(request_id).await.unwrap();
        assert_eq!(removed.attachment_paths.len(), 2);
        service.cleanup(&removed).await;

        assert!(files.is_empty());
    }
}
