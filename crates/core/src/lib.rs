//! `epro-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! typed identifiers, the domain error model, money rounding, audit stamps and
//! snapshot-based change tracking.

pub mod audit;
pub mod change;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;

pub use audit::AuditStamp;
pub use change::{FieldChange, Snapshot};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    AttachmentId, CodeId, CurrencyId, FinanceCodesId, GoodsReceivedNoteId,
    GoodsReceivedNoteItemId, ItemId, LogEntryId, OfficeId, PurchaseOrderId, PurchaseOrderItemId,
    QuotationAnalysisId, RequestId, RfqId, RfqItemId, UnitId, UserId, VendorId,
};
