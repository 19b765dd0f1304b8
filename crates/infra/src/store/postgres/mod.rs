//! Postgres-backed procurement store.
//!
//! Every write runs in one transaction. Read-compute-write sequences lock the
//! row that scopes them (`SELECT ... FOR UPDATE`) before reading:
//!
//! | Operation | Locked row |
//! |-----------|------------|
//! | create request (`sno`) | office |
//! | item writes (`item_sno`, repricing) | purchase request |
//! | finance code writes (allocation total) | item |
//! | order lines, receipts (totals, received quantities) | purchase order |
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |----------------------|------------|----------|
//! | `23505` unique violation | `Domain(Conflict)` | duplicate code, concurrent sequence number |
//! | `23503` foreign key violation | `Domain(Validation)` | referenced record does not exist |
//! | `23514` check violation | `Domain(Validation)` | value rejected by a column check |
//! | other | `Database` | connectivity, pool closed, decode failures |

mod items;
mod orders;
mod quotations;
mod reference;
mod requests;
mod rows;

use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::sequence::{SequenceScope, next_after};

use epro_core::{
    AttachmentId, DomainError, FinanceCodesId, GoodsReceivedNoteId, ItemId, OfficeId,
    PurchaseOrderId, PurchaseOrderItemId, QuotationAnalysisId, RequestId, RfqId, UserId, VendorId,
};
use epro_procurement::{
    Assignment, Code, CodeKind, Currency, FinanceCodes, GrnDetail, Item, ItemAttachment,
    ItemPatch, NewCode, NewCurrency, NewFinanceCodes, NewGoodsReceivedNote, NewItem,
    NewManualLogEntry, NewOffice, NewPurchaseOrder, NewPurchaseOrderItem, NewPurchaseRequest,
    NewQuotationAnalysis, NewRequestForQuotation, NewRfqItem, NewUnit, NewVendor, Office,
    OrderDetail, PurchaseOrder, PurchaseRequest, QuotationAnalysis, RequestForQuotation,
    RequestLogEntry, RequestPatch, RfqDetail, StatusTransition, Unit, Vendor,
};

use super::{ItemLocation, ProcurementStore, Removed, StoreError, StoreResult};

const SCHEMA: &str = include_str!("../../../migrations/0001_procurement.sql");

/// Postgres-backed procurement store.
#[derive(Debug, Clone)]
pub struct PostgresProcurementStore {
    pool: Arc<PgPool>,
}

impl PostgresProcurementStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create missing tables and indexes.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        info!("procurement schema applied");
        Ok(())
    }

    async fn begin(&self) -> StoreResult<sqlx::Transaction<'static, sqlx::Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }

    async fn conn(&self) -> StoreResult<sqlx::pool::PoolConnection<sqlx::Postgres>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire_connection", e))
    }
}

async fn commit(tx: sqlx::Transaction<'_, sqlx::Postgres>) -> StoreResult<()> {
    tx.commit()
        .await
        .map_err(|e| map_sqlx_error("commit_transaction", e))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Domain(DomainError::conflict(msg)),
                Some("23503") | Some("23514") => StoreError::Domain(DomainError::validation(msg)),
                _ => StoreError::Database(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Database(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Database(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Fetch at most one row by id and decode it.
async fn fetch_optional<T>(
    conn: &mut PgConnection,
    sql: &str,
    id: Uuid,
    decode: fn(&PgRow) -> Result<T, sqlx::Error>,
) -> StoreResult<Option<T>> {
    let row = sqlx::query(sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_optional", e))?;
    row.as_ref()
        .map(decode)
        .transpose()
        .map_err(|e| map_sqlx_error("decode_row", e))
}

/// Fetch one row by id, reporting `what` as not found when absent.
async fn fetch_one<T>(
    conn: &mut PgConnection,
    sql: &str,
    id: Uuid,
    decode: fn(&PgRow) -> Result<T, sqlx::Error>,
    what: &'static str,
) -> StoreResult<T> {
    fetch_optional(conn, sql, id, decode)
        .await?
        .ok_or_else(|| StoreError::not_found(what))
}

/// Fetch every row matching a single-parameter query.
async fn fetch_all<T>(
    conn: &mut PgConnection,
    sql: &str,
    id: Uuid,
    decode: fn(&PgRow) -> Result<T, sqlx::Error>,
) -> StoreResult<Vec<T>> {
    let records = sqlx::query(sql)
        .bind(id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("fetch_all", e))?;
    records.iter()
        .map(decode)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| map_sqlx_error("decode_row", e))
}

fn opt_uuid<T: Into<Uuid>>(id: Option<T>) -> Option<Uuid> {
    id.map(Into::into)
}

/// Lock a sequence scope's parent row and compute its next number.
///
/// Returns `None` when the parent row does not exist. The lock is held until
/// the surrounding transaction ends.
async fn next_number(conn: &mut PgConnection, scope: SequenceScope) -> StoreResult<Option<u32>> {
    let locked = sqlx::query(scope.lock_sql())
        .bind(scope.parent_id())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("lock_sequence_scope", e))?;
    if locked.is_none() {
        return Ok(None);
    }

    let row = sqlx::query(scope.max_sql())
        .bind(scope.parent_id())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("read_sequence", e))?;
    let current: Option<i64> = row
        .try_get("current")
        .map_err(|e| map_sqlx_error("read_sequence", e))?;
    let current = current
        .map(u32::try_from)
        .transpose()
        .map_err(|_| StoreError::Database(format!("{} sequence out of range", scope.parent_name())))?;
    Ok(Some(next_after(current)))
}

#[async_trait::async_trait]
impl ProcurementStore for PostgresProcurementStore {
    async fn create_office(&self, new: NewOffice, actor: Option<UserId>) -> StoreResult<Office> {
        self.create_office(new, actor).await
    }

    async fn list_offices(&self) -> StoreResult<Vec<Office>> {
        self.list_offices().await
    }

    async fn get_office(&self, id: OfficeId) -> StoreResult<Office> {
        self.get_office(id).await
    }

    async fn create_currency(&self, new: NewCurrency, actor: Option<UserId>) -> StoreResult<Currency> {
        self.create_currency(new, actor).await
    }

    async fn list_currencies(&self) -> StoreResult<Vec<Currency>> {
        self.list_currencies().await
    }

    async fn create_unit(&self, new: NewUnit, actor: Option<UserId>) -> StoreResult<Unit> {
        self.create_unit(new, actor).await
    }

    async fn list_units(&self) -> StoreResult<Vec<Unit>> {
        self.list_units().await
    }

    async fn create_vendor(&self, new: NewVendor, actor: Option<UserId>) -> StoreResult<Vendor> {
        self.create_vendor(new, actor).await
    }

    async fn list_vendors(&self) -> StoreResult<Vec<Vendor>> {
        self.list_vendors().await
    }

    async fn get_vendor(&self, id: VendorId) -> StoreResult<Vendor> {
        self.get_vendor(id).await
    }

    async fn create_code(&self, kind: CodeKind, new: NewCode, actor: Option<UserId>) -> StoreResult<Code> {
        self.create_code(kind, new, actor).await
    }

    async fn list_codes(&self, kind: CodeKind) -> StoreResult<Vec<Code>> {
        self.list_codes(kind).await
    }

    async fn create_request(
        &self,
        new: NewPurchaseRequest,
        actor: Option<UserId>,
    ) -> StoreResult<PurchaseRequest> {
        self.create_request(new, actor).await
    }

    async fn get_request(&self, id: RequestId) -> StoreResult<PurchaseRequest> {
        self.get_request(id).await
    }

    async fn list_requests(&self, office_id: Option<OfficeId>) -> StoreResult<Vec<PurchaseRequest>> {
        self.list_requests(office_id).await
    }

    async fn update_request(
        &self,
        id: RequestId,
        patch: RequestPatch,
        actor: Option<UserId>,
    ) -> StoreResult<PurchaseRequest> {
        self.update_request(id, patch, actor).await
    }

    async fn transition_request(
        &self,
        id: RequestId,
        transition: StatusTransition,
        actor: UserId,
    ) -> StoreResult<PurchaseRequest> {
        self.transition_request(id, transition, actor).await
    }

    async fn assign_request(
        &self,
        id: RequestId,
        assignment: Assignment,
        actor: Option<UserId>,
    ) -> StoreResult<PurchaseRequest> {
        self.assign_request(id, assignment, actor).await
    }

    async fn request_cancellation(&self, id: RequestId, actor: UserId) -> StoreResult<PurchaseRequest> {
        self.request_cancellation(id, actor).await
    }

    async fn delete_request(&self, id: RequestId) -> StoreResult<Removed> {
        self.delete_request(id).await
    }

    async fn request_log(&self, id: RequestId) -> StoreResult<Vec<RequestLogEntry>> {
        self.request_log(id).await
    }

    async fn add_log_entry(
        &self,
        id: RequestId,
        entry: NewManualLogEntry,
        actor: Option<UserId>,
    ) -> StoreResult<RequestLogEntry> {
        self.add_log_entry(id, entry, actor).await
    }

    async fn add_item(&self, request_id: RequestId, new: NewItem, actor: Option<UserId>) -> StoreResult<Item> {
        self.add_item(request_id, new, actor).await
    }

    async fn get_item(&self, id: ItemId) -> StoreResult<Item> {
        self.get_item(id).await
    }

    async fn list_items(&self, request_id: RequestId) -> StoreResult<Vec<Item>> {
        self.list_items(request_id).await
    }

    async fn update_item(&self, id: ItemId, patch: ItemPatch, actor: Option<UserId>) -> StoreResult<Item> {
        self.update_item(id, patch, actor).await
    }

    async fn delete_item(&self, id: ItemId) -> StoreResult<Removed> {
        self.delete_item(id).await
    }

    async fn set_default_finance_item(&self, id: ItemId, actor: Option<UserId>) -> StoreResult<Item> {
        self.set_default_finance_item(id, actor).await
    }

    async fn unset_default_finance_item(&self, id: ItemId, actor: Option<UserId>) -> StoreResult<Item> {
        self.unset_default_finance_item(id, actor).await
    }

    async fn apply_default_finance_codes(
        &self,
        request_id: RequestId,
        actor: Option<UserId>,
    ) -> StoreResult<Vec<FinanceCodes>> {
        self.apply_default_finance_codes(request_id, actor).await
    }

    async fn add_finance_codes(
        &self,
        item_id: ItemId,
        new: NewFinanceCodes,
        actor: Option<UserId>,
    ) -> StoreResult<FinanceCodes> {
        self.add_finance_codes(item_id, new, actor).await
    }

    async fn update_finance_codes(
        &self,
        id: FinanceCodesId,
        new: NewFinanceCodes,
        actor: Option<UserId>,
    ) -> StoreResult<FinanceCodes> {
        self.update_finance_codes(id, new, actor).await
    }

    async fn delete_finance_codes(&self, id: FinanceCodesId) -> StoreResult<()> {
        self.delete_finance_codes(id).await
    }

    async fn list_finance_codes(&self, item_id: ItemId) -> StoreResult<Vec<FinanceCodes>> {
        self.list_finance_codes(item_id).await
    }

    async fn allocation_total(&self, item_id: ItemId) -> StoreResult<Decimal> {
        self.allocation_total(item_id).await
    }

    async fn item_location(&self, item_id: ItemId) -> StoreResult<ItemLocation> {
        self.item_location(item_id).await
    }

    async fn insert_attachment(&self, attachment: ItemAttachment) -> StoreResult<ItemAttachment> {
        self.insert_attachment(attachment).await
    }

    async fn list_attachments(&self, item_id: ItemId) -> StoreResult<Vec<ItemAttachment>> {
        self.list_attachments(item_id).await
    }

    async fn delete_attachment(&self, id: AttachmentId) -> StoreResult<ItemAttachment> {
        self.delete_attachment(id).await
    }

    async fn create_quotation_analysis(
        &self,
        new: NewQuotationAnalysis,
        actor: Option<UserId>,
    ) -> StoreResult<QuotationAnalysis> {
        self.create_quotation_analysis(new, actor).await
    }

    async fn get_quotation_analysis(&self, id: QuotationAnalysisId) -> StoreResult<QuotationAnalysis> {
        self.get_quotation_analysis(id).await
    }

    async fn create_rfq(
        &self,
        request_id: RequestId,
        new: NewRequestForQuotation,
        actor: Option<UserId>,
    ) -> StoreResult<RequestForQuotation> {
        self.create_rfq(request_id, new, actor).await
    }

    async fn get_rfq(&self, id: RfqId) -> StoreResult<RfqDetail> {
        self.get_rfq(id).await
    }

    async fn list_rfqs(&self, request_id: RequestId) -> StoreResult<Vec<RequestForQuotation>> {
        self.list_rfqs(request_id).await
    }

    async fn add_rfq_item(&self, rfq_id: RfqId, new: NewRfqItem, actor: Option<UserId>) -> StoreResult<RfqDetail> {
        self.add_rfq_item(rfq_id, new, actor).await
    }

    async fn create_order(
        &self,
        request_id: RequestId,
        new: NewPurchaseOrder,
        actor: Option<UserId>,
    ) -> StoreResult<PurchaseOrder> {
        self.create_order(request_id, new, actor).await
    }

    async fn get_order(&self, id: PurchaseOrderId) -> StoreResult<OrderDetail> {
        self.get_order(id).await
    }

    async fn list_orders(&self, request_id: RequestId) -> StoreResult<Vec<PurchaseOrder>> {
        self.list_orders(request_id).await
    }

    async fn add_order_item(
        &self,
        order_id: PurchaseOrderId,
        new: NewPurchaseOrderItem,
        actor: Option<UserId>,
    ) -> StoreResult<OrderDetail> {
        self.add_order_item(order_id, new, actor).await
    }

    async fn remove_order_item(&self, id: PurchaseOrderItemId) -> StoreResult<OrderDetail> {
        self.remove_order_item(id).await
    }

    async fn create_grn(
        &self,
        order_id: PurchaseOrderId,
        new: NewGoodsReceivedNote,
        actor: Option<UserId>,
    ) -> StoreResult<GrnDetail> {
        self.create_grn(order_id, new, actor).await
    }

    async fn get_grn(&self, id: GoodsReceivedNoteId) -> StoreResult<GrnDetail> {
        self.get_grn(id).await
    }
}
