//! Quotation analyses and requests for quotation.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::{info, instrument};

use epro_core::{QuotationAnalysisId, RequestId, RfqId, UserId};
use epro_procurement::{
    Item, NewQuotationAnalysis, NewRequestForQuotation, NewRfqItem, QuotationAnalysis,
    RequestForQuotation, RfqDetail, RfqItem,
};

use super::reference::vendor_ref;
use super::requests::{lock_editable_request, lock_request};
use super::{
    PostgresProcurementStore, commit, fetch_all, fetch_one, fetch_optional, map_sqlx_error,
    opt_uuid, rows,
};
use crate::store::{StoreResult, unknown};

pub(super) async fn analysis_ref(
    conn: &mut PgConnection,
    id: Option<QuotationAnalysisId>,
) -> StoreResult<Option<QuotationAnalysis>> {
    match id {
        Some(id) => Ok(Some(
            fetch_optional(conn, "SELECT * FROM quotation_analyses WHERE id = $1", *id.as_uuid(), rows::analysis)
                .await?
                .ok_or_else(|| unknown("quotation analysis"))?,
        )),
        None => Ok(None),
    }
}

async fn rfq_items_of(conn: &mut PgConnection, rfq_id: RfqId) -> StoreResult<Vec<RfqItem>> {
    fetch_all(
        conn,
        "SELECT * FROM rfq_items WHERE rfq_id = $1 ORDER BY created_at, id",
        *rfq_id.as_uuid(),
        rows::rfq_item,
    )
    .await
}

async fn lock_rfq(conn: &mut PgConnection, id: RfqId) -> StoreResult<RequestForQuotation> {
    fetch_one(conn, "SELECT * FROM rfqs WHERE id = $1 FOR UPDATE", *id.as_uuid(), rows::rfq, "rfq").await
}

async fn save_rfq_derived(conn: &mut PgConnection, rfq: &RequestForQuotation) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE rfqs
        SET complete_order_delivery_date = $2, updated_at = $3, updated_by = $4
        WHERE id = $1
        "#,
    )
    .bind(rfq.id.as_uuid())
    .bind(rfq.complete_order_delivery_date)
    .bind(rfq.audit.updated_at)
    .bind(opt_uuid(rfq.audit.updated_by))
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("save_rfq", e))?;
    Ok(())
}

/// Recompute an RFQ's derived fields from its current lines.
pub(super) async fn refresh_rfq(conn: &mut PgConnection, id: RfqId) -> StoreResult<RequestForQuotation> {
    let mut rfq = lock_rfq(conn, id).await?;
    let items = rfq_items_of(conn, id).await?;
    rfq.recompute(&items);
    save_rfq_derived(conn, &rfq).await?;
    Ok(rfq)
}

/// Recompute the quoted subtotal of every line quoting `item`.
pub(super) async fn requote_item(
    conn: &mut PgConnection,
    item: &Item,
    actor: Option<UserId>,
    now: DateTime<Utc>,
) -> StoreResult<usize> {
    let quotes = fetch_all(
        conn,
        "SELECT * FROM rfq_items WHERE item_id = $1 FOR UPDATE",
        *item.id.as_uuid(),
        rows::rfq_item,
    )
    .await?;
    let count = quotes.len();
    for mut quote in quotes {
        quote.requote(item, actor, now)?;
        sqlx::query(
            r#"
            UPDATE rfq_items
            SET quoted_subtotal_local = $2, updated_at = $3, updated_by = $4
            WHERE id = $1
            "#,
        )
        .bind(quote.id.as_uuid())
        .bind(quote.quoted_subtotal_local)
        .bind(quote.audit.updated_at)
        .bind(opt_uuid(quote.audit.updated_by))
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("requote_item", e))?;
    }
    Ok(count)
}

impl PostgresProcurementStore {
    #[instrument(skip(self, new), err)]
    pub(super) async fn create_quotation_analysis(
        &self,
        new: NewQuotationAnalysis,
        actor: Option<UserId>,
    ) -> StoreResult<QuotationAnalysis> {
        let mut tx = self.begin().await?;
        let vendor = vendor_ref(&mut tx, new.selected_vendor_id).await?;
        let analysis = QuotationAnalysis::create(new, vendor.as_ref(), actor, Utc::now())?;
        sqlx::query(
            r#"
            INSERT INTO quotation_analyses (
                id, analysis_date, delivery_date, selected_vendor_id, justification, notes,
                created_at, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(analysis.id.as_uuid())
        .bind(analysis.analysis_date)
        .bind(analysis.delivery_date)
        .bind(opt_uuid(analysis.selected_vendor_id))
        .bind(&analysis.justification)
        .bind(&analysis.notes)
        .bind(analysis.audit.created_at)
        .bind(opt_uuid(analysis.audit.created_by))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_quotation_analysis", e))?;
        commit(tx).await?;
        Ok(analysis)
    }

    #[instrument(skip(self), fields(analysis_id = %id), err)]
    pub(super) async fn get_quotation_analysis(&self, id: QuotationAnalysisId) -> StoreResult<QuotationAnalysis> {
        let mut conn = self.conn().await?;
        fetch_one(
            &mut conn,
            "SELECT * FROM quotation_analyses WHERE id = $1",
            *id.as_uuid(),
            rows::analysis,
            "quotation analysis",
        )
        .await
    }

    #[instrument(skip(self, new), fields(request_id = %request_id), err)]
    pub(super) async fn create_rfq(
        &self,
        request_id: RequestId,
        new: NewRequestForQuotation,
        actor: Option<UserId>,
    ) -> StoreResult<RequestForQuotation> {
        let mut tx = self.begin().await?;
        let request = lock_request(&mut tx, request_id).await?;
        let vendor = vendor_ref(&mut tx, new.vendor_id).await?;
        analysis_ref(&mut tx, new.quotation_analysis_id).await?;
        let rfq = RequestForQuotation::create(&request, new, vendor.as_ref(), actor, Utc::now())?;
        sqlx::query(
            r#"
            INSERT INTO rfqs (
                id, request_id, vendor_id, date_submitted_to_vendor, date_received_from_vendor,
                insurance, shipping_and_handling, vat, meets_specs, meets_compliance,
                complete_order_delivery_date, complete_order_payment_terms, notes,
                quotation_analysis_id, created_at, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(rfq.id.as_uuid())
        .bind(rfq.request_id.as_uuid())
        .bind(opt_uuid(rfq.vendor_id))
        .bind(rfq.date_submitted_to_vendor)
        .bind(rfq.date_received_from_vendor)
        .bind(rfq.insurance)
        .bind(rfq.shipping_and_handling)
        .bind(rfq.vat)
        .bind(rfq.meets_specs)
        .bind(rfq.meets_compliance)
        .bind(rfq.complete_order_delivery_date)
        .bind(&rfq.complete_order_payment_terms)
        .bind(&rfq.notes)
        .bind(opt_uuid(rfq.quotation_analysis_id))
        .bind(rfq.audit.created_at)
        .bind(opt_uuid(rfq.audit.created_by))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_rfq", e))?;
        commit(tx).await?;
        info!(request_id = %request_id, rfq_id = %rfq.id, "rfq created");
        Ok(rfq)
    }

    #[instrument(skip(self), fields(rfq_id = %id), err)]
    pub(super) async fn get_rfq(&self, id: RfqId) -> StoreResult<RfqDetail> {
        let mut conn = self.conn().await?;
        let rfq = fetch_one(&mut conn, "SELECT * FROM rfqs WHERE id = $1", *id.as_uuid(), rows::rfq, "rfq").await?;
        let items = rfq_items_of(&mut conn, id).await?;
        Ok(RfqDetail::new(rfq, items))
    }

    #[instrument(skip(self), fields(request_id = %request_id), err)]
    pub(super) async fn list_rfqs(&self, request_id: RequestId) -> StoreResult<Vec<RequestForQuotation>> {
        let mut conn = self.conn().await?;
        fetch_one(
            &mut conn,
            "SELECT * FROM purchase_requests WHERE id = $1",
            *request_id.as_uuid(),
            rows::request,
            "purchase request",
        )
        .await?;
        fetch_all(
            &mut conn,
            "SELECT * FROM rfqs WHERE request_id = $1 ORDER BY created_at, id",
            *request_id.as_uuid(),
            rows::rfq,
        )
        .await
    }

    #[instrument(skip(self, new), fields(rfq_id = %rfq_id), err)]
    pub(super) async fn add_rfq_item(
        &self,
        rfq_id: RfqId,
        new: NewRfqItem,
        actor: Option<UserId>,
    ) -> StoreResult<RfqDetail> {
        let now = Utc::now();
        let mut tx = self.begin().await?;
        let request_id = fetch_one(&mut tx, "SELECT * FROM rfqs WHERE id = $1", *rfq_id.as_uuid(), rows::rfq, "rfq")
            .await?
            .request_id;
        lock_editable_request(&mut tx, request_id).await?;
        let rfq = lock_rfq(&mut tx, rfq_id).await?;
        let item = fetch_optional(&mut tx, "SELECT * FROM items WHERE id = $1", *new.item_id.as_uuid(), rows::item)
            .await?
            .ok_or_else(|| unknown("item"))?;

        let line = RfqItem::create(&rfq, &item, new, actor, now)?;
        sqlx::query(
            r#"
            INSERT INTO rfq_items (
                id, rfq_id, item_id, quoted_price_local, quoted_subtotal_local, payment_terms,
                delivery_date, warranty, validity_of_offer, origin_of_goods, remarks,
                created_at, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(line.id.as_uuid())
        .bind(line.rfq_id.as_uuid())
        .bind(line.item_id.as_uuid())
        .bind(line.quoted_price_local)
        .bind(line.quoted_subtotal_local)
        .bind(&line.payment_terms)
        .bind(line.delivery_date)
        .bind(&line.warranty)
        .bind(&line.validity_of_offer)
        .bind(&line.origin_of_goods)
        .bind(&line.remarks)
        .bind(line.audit.created_at)
        .bind(opt_uuid(line.audit.created_by))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("add_rfq_item", e))?;

        let mut rfq = lock_rfq(&mut tx, rfq_id).await?;
        let items = rfq_items_of(&mut tx, rfq_id).await?;
        rfq.recompute(&items);
        rfq.audit.touch(actor, now);
        save_rfq_derived(&mut tx, &rfq).await?;
        commit(tx).await?;
        Ok(RfqDetail::new(rfq, items))
    }
}
