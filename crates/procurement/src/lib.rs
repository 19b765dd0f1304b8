//! Procurement domain module (purchase requests through goods receipt).
//!
//! This crate contains business rules for the procurement workflow,
//! implemented purely as deterministic domain logic (no IO, no HTTP, no
//! storage). Sequence numbers are handed in by the storage layer, which owns
//! the locking needed to compute them.

pub mod attachment;
pub mod finance;
pub mod item;
pub mod log;
pub mod order;
pub mod pricing;
pub mod quotation;
pub mod receiving;
pub mod reference;
pub mod request;
pub mod status;

pub use attachment::{ItemAttachment, NewAttachment};
pub use finance::{
    AllocationPercent, FinanceCodes, GlAccount, NewFinanceCodes, allocation_total,
    check_allocation,
};
pub use item::{Item, ItemPatch, NewItem};
pub use log::{NewManualLogEntry, RequestLogEntry};
pub use order::{NewPurchaseOrder, NewPurchaseOrderItem, OrderDetail, PurchaseOrder, PurchaseOrderItem};
pub use pricing::{LinePricing, price_line};
pub use quotation::{
    NewQuotationAnalysis, NewRequestForQuotation, NewRfqItem, QuotationAnalysis,
    RequestForQuotation, RfqDetail, RfqItem,
};
pub use receiving::{GoodsReceivedNote, GoodsReceivedNoteItem, GrnDetail, NewGoodsReceivedNote, NewGrnItem};
pub use reference::{
    Code, CodeKind, Currency, NewCode, NewCurrency, NewOffice, NewUnit, NewVendor, Office, Unit,
    Vendor,
};
pub use request::{
    Assignment, ExpenseType, NewPurchaseRequest, PrType, PurchaseRequest, RequestPatch,
    StatusTransition,
};
pub use status::RequestStatus;
