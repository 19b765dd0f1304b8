//! Procurement storage boundary.
//!
//! `ProcurementStore` is the single persistence seam of the service. Every
//! write operation is atomic: derived fields, sequence numbers, change-log
//! entries and cascades are computed and persisted together or not at all.
//!
//! ## Implementations
//!
//! - [`InMemoryProcurementStore`]: tests/dev; one process-wide write lock.
//! - [`PostgresProcurementStore`]: production; one transaction per operation,
//!   with `SELECT ... FOR UPDATE` on the parent scope where a read-compute-write
//!   must be serialized (sequence numbers, allocation totals, receipts).
//!
//! Operations that cascade to attachments return the storage paths of the
//! removed files; deleting the files themselves is the caller's job (see
//! [`crate::attachments`]).

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;

use epro_core::{
    AttachmentId, DomainError, FinanceCodesId, ItemId, OfficeId, PurchaseOrderId,
    PurchaseOrderItemId, QuotationAnalysisId, RequestId, RfqId, UserId, VendorId,
    GoodsReceivedNoteId,
};
use epro_procurement::{
    Assignment, Code, CodeKind, Currency, FinanceCodes, GrnDetail, Item, ItemAttachment,
    ItemPatch, NewCode, NewCurrency, NewFinanceCodes, NewGoodsReceivedNote, NewItem,
    NewManualLogEntry, NewOffice, NewPurchaseOrder, NewPurchaseOrderItem, NewPurchaseRequest,
    NewQuotationAnalysis, NewRequestForQuotation, NewRfqItem, NewUnit, NewVendor, Office,
    OrderDetail, PurchaseOrder, PurchaseRequest, QuotationAnalysis, RequestForQuotation,
    RequestLogEntry, RequestPatch, RfqDetail, StatusTransition, Unit, Vendor,
};

pub use memory::InMemoryProcurementStore;
pub use postgres::PostgresProcurementStore;

/// Storage operation error.
///
/// Domain failures pass through unchanged; storage failures are flattened to
/// strings so callers never depend on the backend's error types.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("database error: {0}")]
    Database(String),

    #[error("file storage error: {0}")]
    Io(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn not_found(what: &'static str) -> Self {
        StoreError::Domain(DomainError::not_found(what))
    }
}

/// Where an item lives, for deriving attachment paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemLocation {
    pub office_name: String,
    pub request_id: RequestId,
    pub item_id: ItemId,
}

/// Result of a delete that cascaded to attachments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Removed {
    /// Storage paths of attachment files whose records were deleted.
    pub attachment_paths: Vec<String>,
}

#[async_trait::async_trait]
pub trait ProcurementStore: Send + Sync {
    // Reference data.
    async fn create_office(&self, new: NewOffice, actor: Option<UserId>) -> StoreResult<Office>;
    async fn list_offices(&self) -> StoreResult<Vec<Office>>;
    async fn get_office(&self, id: OfficeId) -> StoreResult<Office>;
    async fn create_currency(&self, new: NewCurrency, actor: Option<UserId>)
    -> StoreResult<Currency>;
    async fn list_currencies(&self) -> StoreResult<Vec<Currency>>;
    async fn create_unit(&self, new: NewUnit, actor: Option<UserId>) -> StoreResult<Unit>;
    async fn list_units(&self) -> StoreResult<Vec<Unit>>;
    async fn create_vendor(&self, new: NewVendor, actor: Option<UserId>) -> StoreResult<Vendor>;
    async fn list_vendors(&self) -> StoreResult<Vec<Vendor>>;
    async fn get_vendor(&self, id: VendorId) -> StoreResult<Vendor>;
    async fn create_code(
        &self,
        kind: CodeKind,
        new: NewCode,
        actor: Option<UserId>,
    ) -> StoreResult<Code>;
    async fn list_codes(&self, kind: CodeKind) -> StoreResult<Vec<Code>>;

    // Purchase requests.
    /// Create a request, assigning the next `sno` of its office.
    async fn create_request(
        &self,
        new: NewPurchaseRequest,
        actor: Option<UserId>,
    ) -> StoreResult<PurchaseRequest>;
    async fn get_request(&self, id: RequestId) -> StoreResult<PurchaseRequest>;
    async fn list_requests(&self, office_id: Option<OfficeId>) -> StoreResult<Vec<PurchaseRequest>>;
    /// Apply a patch, log one entry per changed field, and reprice every item
    /// when the exchange rate changed.
    async fn update_request(
        &self,
        id: RequestId,
        patch: RequestPatch,
        actor: Option<UserId>,
    ) -> StoreResult<PurchaseRequest>;
    async fn transition_request(
        &self,
        id: RequestId,
        transition: StatusTransition,
        actor: UserId,
    ) -> StoreResult<PurchaseRequest>;
    async fn assign_request(
        &self,
        id: RequestId,
        assignment: Assignment,
        actor: Option<UserId>,
    ) -> StoreResult<PurchaseRequest>;
    async fn request_cancellation(&self, id: RequestId, actor: UserId)
    -> StoreResult<PurchaseRequest>;
    async fn delete_request(&self, id: RequestId) -> StoreResult<Removed>;
    async fn request_log(&self, id: RequestId) -> StoreResult<Vec<RequestLogEntry>>;
    async fn add_log_entry(
        &self,
        id: RequestId,
        entry: NewManualLogEntry,
        actor: Option<UserId>,
    ) -> StoreResult<RequestLogEntry>;

    // Items.
    /// Add an item, assigning the next `item_sno` of its request.
    async fn add_item(
        &self,
        request_id: RequestId,
        new: NewItem,
        actor: Option<UserId>,
    ) -> StoreResult<Item>;
    async fn get_item(&self, id: ItemId) -> StoreResult<Item>;
    async fn list_items(&self, request_id: RequestId) -> StoreResult<Vec<Item>>;
    async fn update_item(&self, id: ItemId, patch: ItemPatch, actor: Option<UserId>)
    -> StoreResult<Item>;
    async fn delete_item(&self, id: ItemId) -> StoreResult<Removed>;
    /// Mark an item as its request's finance-code template, clearing siblings.
    async fn set_default_finance_item(&self, id: ItemId, actor: Option<UserId>)
    -> StoreResult<Item>;
    async fn unset_default_finance_item(
        &self,
        id: ItemId,
        actor: Option<UserId>,
    ) -> StoreResult<Item>;
    /// Replace every other item's splits with copies of the template's.
    async fn apply_default_finance_codes(
        &self,
        request_id: RequestId,
        actor: Option<UserId>,
    ) -> StoreResult<Vec<FinanceCodes>>;

    // Finance codes.
    async fn add_finance_codes(
        &self,
        item_id: ItemId,
        new: NewFinanceCodes,
        actor: Option<UserId>,
    ) -> StoreResult<FinanceCodes>;
    async fn update_finance_codes(
        &self,
        id: FinanceCodesId,
        new: NewFinanceCodes,
        actor: Option<UserId>,
    ) -> StoreResult<FinanceCodes>;
    async fn delete_finance_codes(&self, id: FinanceCodesId) -> StoreResult<()>;
    async fn list_finance_codes(&self, item_id: ItemId) -> StoreResult<Vec<FinanceCodes>>;
    async fn allocation_total(&self, item_id: ItemId) -> StoreResult<Decimal>;

    // Attachments.
    async fn item_location(&self, item_id: ItemId) -> StoreResult<ItemLocation>;
    async fn insert_attachment(&self, attachment: ItemAttachment) -> StoreResult<ItemAttachment>;
    async fn list_attachments(&self, item_id: ItemId) -> StoreResult<Vec<ItemAttachment>>;
    async fn delete_attachment(&self, id: AttachmentId) -> StoreResult<ItemAttachment>;

    // Quotations.
    async fn create_quotation_analysis(
        &self,
        new: NewQuotationAnalysis,
        actor: Option<UserId>,
    ) -> StoreResult<QuotationAnalysis>;
    async fn get_quotation_analysis(&self, id: QuotationAnalysisId)
    -> StoreResult<QuotationAnalysis>;
    async fn create_rfq(
        &self,
        request_id: RequestId,
        new: NewRequestForQuotation,
        actor: Option<UserId>,
    ) -> StoreResult<RequestForQuotation>;
    async fn get_rfq(&self, id: RfqId) -> StoreResult<RfqDetail>;
    async fn list_rfqs(&self, request_id: RequestId) -> StoreResult<Vec<RequestForQuotation>>;
    /// Add a quoted line and refresh the RFQ's complete-order delivery date.
    async fn add_rfq_item(
        &self,
        rfq_id: RfqId,
        new: NewRfqItem,
        actor: Option<UserId>,
    ) -> StoreResult<RfqDetail>;

    // Purchase orders.
    async fn create_order(
        &self,
        request_id: RequestId,
        new: NewPurchaseOrder,
        actor: Option<UserId>,
    ) -> StoreResult<PurchaseOrder>;
    async fn get_order(&self, id: PurchaseOrderId) -> StoreResult<OrderDetail>;
    async fn list_orders(&self, request_id: RequestId) -> StoreResult<Vec<PurchaseOrder>>;
    /// Add an ordered line and refresh the order totals.
    async fn add_order_item(
        &self,
        order_id: PurchaseOrderId,
        new: NewPurchaseOrderItem,
        actor: Option<UserId>,
    ) -> StoreResult<OrderDetail>;
    /// Remove an ordered line and refresh the order totals.
    async fn remove_order_item(&self, id: PurchaseOrderItemId) -> StoreResult<OrderDetail>;

    // Goods received.
    async fn create_grn(
        &self,
        order_id: PurchaseOrderId,
        new: NewGoodsReceivedNote,
        actor: Option<UserId>,
    ) -> StoreResult<GrnDetail>;
    async fn get_grn(&self, id: GoodsReceivedNoteId) -> StoreResult<GrnDetail>;
}

/// Shared handle used by the API layer.
pub type SharedStore = Arc<dyn ProcurementStore>;

/// Check a referenced catalog code exists and belongs to the expected catalog.
pub(crate) fn ensure_code(code: Option<&Code>, expected: CodeKind) -> StoreResult<()> {
    match code {
        Some(code) => Ok(code.ensure_kind(expected)?),
        None => Err(DomainError::validation(format!("unknown {expected} code")).into()),
    }
}

/// A referenced record that does not exist is a validation failure of the
/// input naming it, not a missing resource.
pub(crate) fn unknown(what: &str) -> StoreError {
    StoreError::Domain(DomainError::validation(format!("unknown {what}")))
}
