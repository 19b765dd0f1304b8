//! Row decoding.
//!
//! Counts (`u32` in the domain) are stored as `BIGINT`; enums are stored as
//! their lowercase `TEXT` names.

use core::str::FromStr;

use sqlx::Row;
use sqlx::postgres::PgRow;
use uuid::Uuid;

use epro_core::AuditStamp;
use epro_procurement::{
    AllocationPercent, Code, Currency, FinanceCodes, GlAccount, GoodsReceivedNote,
    GoodsReceivedNoteItem, Item, ItemAttachment, Office, PurchaseOrder, PurchaseOrderItem,
    PurchaseRequest, QuotationAnalysis, RequestForQuotation, RequestLogEntry, RfqItem, Unit,
    Vendor,
};

type RowResult<T> = Result<T, sqlx::Error>;

fn decode_error(column: &str, source: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(source),
    }
}

fn id<T: From<Uuid>>(row: &PgRow, column: &str) -> RowResult<T> {
    Ok(T::from(row.try_get::<Uuid, _>(column)?))
}

fn opt_id<T: From<Uuid>>(row: &PgRow, column: &str) -> RowResult<Option<T>> {
    Ok(row.try_get::<Option<Uuid>, _>(column)?.map(T::from))
}

fn count(row: &PgRow, column: &str) -> RowResult<u32> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value).map_err(|e| decode_error(column, e))
}

fn opt_count(row: &PgRow, column: &str) -> RowResult<Option<u32>> {
    row.try_get::<Option<i64>, _>(column)?
        .map(|v| u32::try_from(v).map_err(|e| decode_error(column, e)))
        .transpose()
}

fn parsed<T>(row: &PgRow, column: &str) -> RowResult<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.try_get(column)?;
    text.parse().map_err(|e| decode_error(column, e))
}

fn opt_parsed<T>(row: &PgRow, column: &str) -> RowResult<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    row.try_get::<Option<String>, _>(column)?
        .map(|text| text.parse().map_err(|e| decode_error(column, e)))
        .transpose()
}

fn audit(row: &PgRow) -> RowResult<AuditStamp> {
    Ok(AuditStamp {
        created_at: row.try_get("created_at")?,
        created_by: opt_id(row, "created_by")?,
        updated_at: row.try_get("updated_at")?,
        updated_by: opt_id(row, "updated_by")?,
    })
}

pub(super) fn office(row: &PgRow) -> RowResult<Office> {
    Ok(Office {
        id: id(row, "id")?,
        name: row.try_get("name")?,
        country_code: row.try_get("country_code")?,
        audit: audit(row)?,
    })
}

pub(super) fn currency(row: &PgRow) -> RowResult<Currency> {
    Ok(Currency {
        id: id(row, "id")?,
        country_code: row.try_get("country_code")?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        audit: audit(row)?,
    })
}

pub(super) fn unit(row: &PgRow) -> RowResult<Unit> {
    Ok(Unit {
        id: id(row, "id")?,
        mnemonic: row.try_get("mnemonic")?,
        description: row.try_get("description")?,
        audit: audit(row)?,
    })
}

pub(super) fn vendor(row: &PgRow) -> RowResult<Vendor> {
    Ok(Vendor {
        id: id(row, "id")?,
        country_code: row.try_get("country_code")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        contact_person: row.try_get("contact_person")?,
        address: row.try_get("address")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        black_listed: row.try_get("black_listed")?,
        reason_black_listed: row.try_get("reason_black_listed")?,
        black_listed_date: row.try_get("black_listed_date")?,
        audit: audit(row)?,
    })
}

pub(super) fn code(row: &PgRow) -> RowResult<Code> {
    Ok(Code {
        id: id(row, "id")?,
        kind: parsed(row, "kind")?,
        country_code: row.try_get("country_code")?,
        code: row.try_get("code")?,
        audit: audit(row)?,
    })
}

pub(super) fn request(row: &PgRow) -> RowResult<PurchaseRequest> {
    Ok(PurchaseRequest {
        id: id(row, "id")?,
        sno: count(row, "sno")?,
        office_id: id(row, "office_id")?,
        country_code: row.try_get("country_code")?,
        currency_id: id(row, "currency_id")?,
        exchange_rate: row.try_get("exchange_rate")?,
        delivery_address: row.try_get("delivery_address")?,
        project_reference: row.try_get("project_reference")?,
        required_date: row.try_get("required_date")?,
        originator: id(row, "originator")?,
        origination_date: row.try_get("origination_date")?,
        procurement_review_by: opt_id(row, "procurement_review_by")?,
        procurement_review_date: row.try_get("procurement_review_date")?,
        approver1: id(row, "approver1")?,
        approval1_date: row.try_get("approval1_date")?,
        approver2: opt_id(row, "approver2")?,
        approval2_date: row.try_get("approval2_date")?,
        finance_reviewer: opt_id(row, "finance_reviewer")?,
        finance_review_date: row.try_get("finance_review_date")?,
        submission_date: row.try_get("submission_date")?,
        status: parsed(row, "status")?,
        status_notes: row.try_get("status_notes")?,
        pr_type: parsed(row, "pr_type")?,
        expense_type: opt_parsed(row, "expense_type")?,
        processing_office_id: opt_id(row, "processing_office_id")?,
        assigned_by: opt_id(row, "assigned_by")?,
        assigned_to: opt_id(row, "assigned_to")?,
        assigned_date: row.try_get("assigned_date")?,
        notes: row.try_get("notes")?,
        preferred_supplier: row.try_get("preferred_supplier")?,
        cancellation_requested_date: row.try_get("cancellation_requested_date")?,
        cancellation_requested_by: opt_id(row, "cancellation_requested_by")?,
        cancelled_by: opt_id(row, "cancelled_by")?,
        cancellation_date: row.try_get("cancellation_date")?,
        audit: audit(row)?,
    })
}

pub(super) fn log_entry(row: &PgRow) -> RowResult<RequestLogEntry> {
    Ok(RequestLogEntry {
        id: id(row, "id")?,
        request_id: id(row, "request_id")?,
        field_ref: row.try_get("field_ref")?,
        old_value: row.try_get("old_value")?,
        new_value: row.try_get("new_value")?,
        description: row.try_get("description")?,
        manual: row.try_get("manual")?,
        changed_by: opt_id(row, "changed_by")?,
        changed_at: row.try_get("changed_at")?,
    })
}

pub(super) fn item(row: &PgRow) -> RowResult<Item> {
    Ok(Item {
        id: id(row, "id")?,
        request_id: id(row, "request_id")?,
        item_sno: count(row, "item_sno")?,
        quantity: count(row, "quantity")?,
        unit_id: id(row, "unit_id")?,
        description_pr: row.try_get("description_pr")?,
        description_po: row.try_get("description_po")?,
        unit_price_local: row.try_get("unit_price_local")?,
        unit_price_usd: row.try_get("unit_price_usd")?,
        subtotal_local: row.try_get("subtotal_local")?,
        subtotal_usd: row.try_get("subtotal_usd")?,
        default_finance_codes: row.try_get("default_finance_codes")?,
        audit: audit(row)?,
    })
}

pub(super) fn finance_codes(row: &PgRow) -> RowResult<FinanceCodes> {
    let gl_account: i32 = row.try_get("gl_account")?;
    Ok(FinanceCodes {
        id: id(row, "id")?,
        item_id: id(row, "item_id")?,
        gl_account: GlAccount::new(i64::from(gl_account)).map_err(|e| decode_error("gl_account", e))?,
        fund_code_id: id(row, "fund_code_id")?,
        dept_code_id: id(row, "dept_code_id")?,
        office_code_id: id(row, "office_code_id")?,
        lin_code_id: opt_id(row, "lin_code_id")?,
        activity_code_id: opt_id(row, "activity_code_id")?,
        employee_id: opt_count(row, "employee_id")?,
        allocation_percent: AllocationPercent::new(row.try_get("allocation_percent")?)
            .map_err(|e| decode_error("allocation_percent", e))?,
        audit: audit(row)?,
    })
}

pub(super) fn attachment(row: &PgRow) -> RowResult<ItemAttachment> {
    let size: i64 = row.try_get("size_bytes")?;
    Ok(ItemAttachment {
        id: id(row, "id")?,
        item_id: id(row, "item_id")?,
        file_name: row.try_get("file_name")?,
        path: row.try_get("path")?,
        content_type: row.try_get("content_type")?,
        size_bytes: u64::try_from(size).map_err(|e| decode_error("size_bytes", e))?,
        audit: audit(row)?,
    })
}

pub(super) fn analysis(row: &PgRow) -> RowResult<QuotationAnalysis> {
    Ok(QuotationAnalysis {
        id: id(row, "id")?,
        analysis_date: row.try_get("analysis_date")?,
        delivery_date: row.try_get("delivery_date")?,
        selected_vendor_id: opt_id(row, "selected_vendor_id")?,
        justification: row.try_get("justification")?,
        notes: row.try_get("notes")?,
        audit: audit(row)?,
    })
}

pub(super) fn rfq(row: &PgRow) -> RowResult<RequestForQuotation> {
    Ok(RequestForQuotation {
        id: id(row, "id")?,
        request_id: id(row, "request_id")?,
        vendor_id: opt_id(row, "vendor_id")?,
        date_submitted_to_vendor: row.try_get("date_submitted_to_vendor")?,
        date_received_from_vendor: row.try_get("date_received_from_vendor")?,
        insurance: row.try_get("insurance")?,
        shipping_and_handling: row.try_get("shipping_and_handling")?,
        vat: row.try_get("vat")?,
        meets_specs: row.try_get("meets_specs")?,
        meets_compliance: row.try_get("meets_compliance")?,
        complete_order_delivery_date: row.try_get("complete_order_delivery_date")?,
        complete_order_payment_terms: row.try_get("complete_order_payment_terms")?,
        notes: row.try_get("notes")?,
        quotation_analysis_id: opt_id(row, "quotation_analysis_id")?,
        audit: audit(row)?,
    })
}

pub(super) fn rfq_item(row: &PgRow) -> RowResult<RfqItem> {
    Ok(RfqItem {
        id: id(row, "id")?,
        rfq_id: id(row, "rfq_id")?,
        item_id: id(row, "item_id")?,
        quoted_price_local: row.try_get("quoted_price_local")?,
        quoted_subtotal_local: row.try_get("quoted_subtotal_local")?,
        payment_terms: row.try_get("payment_terms")?,
        delivery_date: row.try_get("delivery_date")?,
        warranty: row.try_get("warranty")?,
        validity_of_offer: row.try_get("validity_of_offer")?,
        origin_of_goods: row.try_get("origin_of_goods")?,
        remarks: row.try_get("remarks")?,
        audit: audit(row)?,
    })
}

pub(super) fn order(row: &PgRow) -> RowResult<PurchaseOrder> {
    Ok(PurchaseOrder {
        id: id(row, "id")?,
        request_id: id(row, "request_id")?,
        country_code: row.try_get("country_code")?,
        office_id: id(row, "office_id")?,
        currency_id: opt_id(row, "currency_id")?,
        po_issued_date: row.try_get("po_issued_date")?,
        vendor_id: opt_id(row, "vendor_id")?,
        expected_delivery_date: row.try_get("expected_delivery_date")?,
        notes: row.try_get("notes")?,
        total_local: row.try_get("total_local")?,
        total_usd: row.try_get("total_usd")?,
        quotation_analysis_id: opt_id(row, "quotation_analysis_id")?,
        audit: audit(row)?,
    })
}

pub(super) fn order_item(row: &PgRow) -> RowResult<PurchaseOrderItem> {
    Ok(PurchaseOrderItem {
        id: id(row, "id")?,
        order_id: id(row, "order_id")?,
        item_id: id(row, "item_id")?,
        quantity_ordered: count(row, "quantity_ordered")?,
        price_local: row.try_get("price_local")?,
        price_usd: row.try_get("price_usd")?,
        subtotal_local: row.try_get("subtotal_local")?,
        subtotal_usd: row.try_get("subtotal_usd")?,
        audit: audit(row)?,
    })
}

pub(super) fn grn(row: &PgRow) -> RowResult<GoodsReceivedNote> {
    Ok(GoodsReceivedNote {
        id: id(row, "id")?,
        request_id: id(row, "request_id")?,
        order_id: id(row, "order_id")?,
        country_code: row.try_get("country_code")?,
        office_id: id(row, "office_id")?,
        received_date: row.try_get("received_date")?,
        audit: audit(row)?,
    })
}

pub(super) fn grn_item(row: &PgRow) -> RowResult<GoodsReceivedNoteItem> {
    Ok(GoodsReceivedNoteItem {
        id: id(row, "id")?,
        grn_id: id(row, "grn_id")?,
        order_item_id: id(row, "order_item_id")?,
        quantity_received: count(row, "quantity_received")?,
        audit: audit(row)?,
    })
}
