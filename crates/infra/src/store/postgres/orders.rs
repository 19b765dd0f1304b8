//! Purchase orders and goods received notes.

use chrono::Utc;
use sqlx::{PgConnection, Row};
use tracing::{info, instrument};

use epro_core::{DomainError, GoodsReceivedNoteId, PurchaseOrderId, PurchaseOrderItemId, RequestId, UserId};
use epro_procurement::{
    GoodsReceivedNote, GrnDetail, NewGoodsReceivedNote, NewPurchaseOrder, NewPurchaseOrderItem,
    OrderDetail, PurchaseOrder, PurchaseOrderItem,
};

use super::quotations::analysis_ref;
use super::reference::vendor_ref;
use super::requests::{lock_editable_request, lock_request};
use super::{
    PostgresProcurementStore, commit, fetch_all, fetch_one, fetch_optional, map_sqlx_error,
    opt_uuid, rows,
};
use crate::store::{StoreError, StoreResult, unknown};

async fn lock_order(conn: &mut PgConnection, id: PurchaseOrderId) -> StoreResult<PurchaseOrder> {
    fetch_one(
        conn,
        "SELECT * FROM purchase_orders WHERE id = $1 FOR UPDATE",
        *id.as_uuid(),
        rows::order,
        "purchase order",
    )
    .await
}

async fn order_items_of(conn: &mut PgConnection, order_id: PurchaseOrderId) -> StoreResult<Vec<PurchaseOrderItem>> {
    fetch_all(
        conn,
        "SELECT * FROM purchase_order_items WHERE order_id = $1 ORDER BY created_at, id",
        *order_id.as_uuid(),
        rows::order_item,
    )
    .await
}

async fn save_order_derived(conn: &mut PgConnection, order: &PurchaseOrder) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE purchase_orders
        SET total_local = $2,
            total_usd = $3,
            vendor_id = $4,
            expected_delivery_date = $5,
            updated_at = $6,
            updated_by = $7
        WHERE id = $1
        "#,
    )
    .bind(order.id.as_uuid())
    .bind(order.total_local)
    .bind(order.total_usd)
    .bind(opt_uuid(order.vendor_id))
    .bind(order.expected_delivery_date)
    .bind(order.audit.updated_at)
    .bind(opt_uuid(order.audit.updated_by))
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("save_order", e))?;
    Ok(())
}

/// Recompute an order's totals (and analysis-derived fields) from its lines.
pub(super) async fn refresh_order(conn: &mut PgConnection, id: PurchaseOrderId) -> StoreResult<OrderDetail> {
    let mut order = lock_order(conn, id).await?;
    let items = order_items_of(conn, id).await?;
    let analysis = analysis_ref(conn, order.quotation_analysis_id).await?;
    order.recompute(&items, analysis.as_ref())?;
    save_order_derived(conn, &order).await?;
    Ok(OrderDetail { order, items })
}

impl PostgresProcurementStore {
    #[instrument(skip(self, new), fields(request_id = %request_id), err)]
    pub(super) async fn create_order(
        &self,
        request_id: RequestId,
        new: NewPurchaseOrder,
        actor: Option<UserId>,
    ) -> StoreResult<PurchaseOrder> {
        let mut tx = self.begin().await?;
        let request = lock_request(&mut tx, request_id).await?;
        let vendor = vendor_ref(&mut tx, new.vendor_id).await?;
        let analysis = analysis_ref(&mut tx, new.quotation_analysis_id).await?;
        let order = PurchaseOrder::create(&request, new, vendor.as_ref(), analysis.as_ref(), actor, Utc::now())?;
        sqlx::query(
            r#"
            INSERT INTO purchase_orders (
                id, request_id, country_code, office_id, currency_id, po_issued_date, vendor_id,
                expected_delivery_date, notes, total_local, total_usd, quotation_analysis_id,
                created_at, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.request_id.as_uuid())
        .bind(&order.country_code)
        .bind(order.office_id.as_uuid())
        .bind(opt_uuid(order.currency_id))
        .bind(order.po_issued_date)
        .bind(opt_uuid(order.vendor_id))
        .bind(order.expected_delivery_date)
        .bind(&order.notes)
        .bind(order.total_local)
        .bind(order.total_usd)
        .bind(opt_uuid(order.quotation_analysis_id))
        .bind(order.audit.created_at)
        .bind(opt_uuid(order.audit.created_by))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_order", e))?;
        commit(tx).await?;
        info!(request_id = %request_id, order_id = %order.id, "purchase order created");
        Ok(order)
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    pub(super) async fn get_order(&self, id: PurchaseOrderId) -> StoreResult<OrderDetail> {
        let mut conn = self.conn().await?;
        let order = fetch_one(
            &mut conn,
            "SELECT * FROM purchase_orders WHERE id = $1",
            *id.as_uuid(),
            rows::order,
            "purchase order",
        )
        .await?;
        let items = order_items_of(&mut conn, id).await?;
        Ok(OrderDetail { order, items })
    }

    #[instrument(skip(self), fields(request_id = %request_id), err)]
    pub(super) async fn list_orders(&self, request_id: RequestId) -> StoreResult<Vec<PurchaseOrder>> {
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
            "SELECT * FROM purchase_orders WHERE request_id = $1 ORDER BY created_at, id",
            *request_id.as_uuid(),
            rows::order,
        )
        .await
    }

    #[instrument(skip(self, new), fields(order_id = %order_id), err)]
    pub(super) async fn add_order_item(
        &self,
        order_id: PurchaseOrderId,
        new: NewPurchaseOrderItem,
        actor: Option<UserId>,
    ) -> StoreResult<OrderDetail> {
        let now = Utc::now();
        let mut tx = self.begin().await?;
        let request_id = fetch_one(
            &mut tx,
            "SELECT * FROM purchase_orders WHERE id = $1",
            *order_id.as_uuid(),
            rows::order,
            "purchase order",
        )
        .await?
        .request_id;
        let request = lock_editable_request(&mut tx, request_id).await?;
        let order = lock_order(&mut tx, order_id).await?;
        let item = fetch_optional(&mut tx, "SELECT * FROM items WHERE id = $1", *new.item_id.as_uuid(), rows::item)
            .await?
            .ok_or_else(|| unknown("item"))?;

        let line = PurchaseOrderItem::create(&order, &item, new, request.exchange_rate, actor, now)?;
        sqlx::query(
            r#"
            INSERT INTO purchase_order_items (
                id, order_id, item_id, quantity_ordered, price_local, price_usd,
                subtotal_local, subtotal_usd, created_at, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(line.id.as_uuid())
        .bind(line.order_id.as_uuid())
        .bind(line.item_id.as_uuid())
        .bind(i64::from(line.quantity_ordered))
        .bind(line.price_local)
        .bind(line.price_usd)
        .bind(line.subtotal_local)
        .bind(line.subtotal_usd)
        .bind(line.audit.created_at)
        .bind(opt_uuid(line.audit.created_by))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("add_order_item", e))?;

        let mut detail = refresh_order(&mut tx, order_id).await?;
        detail.order.audit.touch(actor, now);
        save_order_derived(&mut tx, &detail.order).await?;
        commit(tx).await?;
        Ok(detail)
    }

    #[instrument(skip(self), fields(order_item_id = %id), err)]
    pub(super) async fn remove_order_item(&self, id: PurchaseOrderItemId) -> StoreResult<OrderDetail> {
        let mut tx = self.begin().await?;
        let line = fetch_one(
            &mut tx,
            "SELECT * FROM purchase_order_items WHERE id = $1",
            *id.as_uuid(),
            rows::order_item,
            "purchase order item",
        )
        .await?;
        lock_order(&mut tx, line.order_id).await?;

        let received = sqlx::query("SELECT EXISTS (SELECT 1 FROM grn_items WHERE order_item_id = $1) AS received")
            .bind(id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .and_then(|row| row.try_get::<bool, _>("received"))
            .map_err(|e| map_sqlx_error("check_received", e))?;
        if received {
            return Err(DomainError::conflict("goods were already received against this order item").into());
        }

        sqlx::query("DELETE FROM purchase_order_items WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("remove_order_item", e))?;
        let detail = refresh_order(&mut tx, line.order_id).await?;
        commit(tx).await?;
        Ok(detail)
    }

    /// Record a receipt. The order row is locked so concurrent receipts against
    /// the same order see each other's quantities.
    #[instrument(skip(self, new), fields(order_id = %order_id, lines = new.items.len()), err)]
    pub(super) async fn create_grn(
        &self,
        order_id: PurchaseOrderId,
        new: NewGoodsReceivedNote,
        actor: Option<UserId>,
    ) -> StoreResult<GrnDetail> {
        let mut tx = self.begin().await?;
        let order = lock_order(&mut tx, order_id).await?;

        let mut order_lines = Vec::with_capacity(new.items.len());
        for line in &new.items {
            let order_item = fetch_optional(
                &mut tx,
                "SELECT * FROM purchase_order_items WHERE id = $1",
                *line.order_item_id.as_uuid(),
                rows::order_item,
            )
            .await?
            .ok_or_else(|| unknown("order item"))?;
            let already = sqlx::query(
                "SELECT COALESCE(SUM(quantity_received), 0)::BIGINT AS received FROM grn_items WHERE order_item_id = $1",
            )
            .bind(line.order_item_id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .and_then(|row| row.try_get::<i64, _>("received"))
            .map_err(|e| map_sqlx_error("sum_received", e))?;
            let already = u32::try_from(already)
                .map_err(|_| StoreError::Database("received quantity out of range".to_string()))?;
            order_lines.push((order_item, already));
        }
        let lines: Vec<_> = new
            .items
            .into_iter()
            .zip(order_lines.iter())
            .map(|(line, (order_item, already))| (line, order_item, *already))
            .collect();

        let (note, items) = GoodsReceivedNote::create(&order, new.received_date, &lines, actor, Utc::now())?;
        sqlx::query(
            r#"
            INSERT INTO goods_received_notes (
                id, request_id, order_id, country_code, office_id, received_date,
                created_at, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(note.id.as_uuid())
        .bind(note.request_id.as_uuid())
        .bind(note.order_id.as_uuid())
        .bind(&note.country_code)
        .bind(note.office_id.as_uuid())
        .bind(note.received_date)
        .bind(note.audit.created_at)
        .bind(opt_uuid(note.audit.created_by))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_grn", e))?;
        for item in &items {
            sqlx::query(
                r#"
                INSERT INTO grn_items (id, grn_id, order_item_id, quantity_received, created_at, created_by)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.grn_id.as_uuid())
            .bind(item.order_item_id.as_uuid())
            .bind(i64::from(item.quantity_received))
            .bind(item.audit.created_at)
            .bind(opt_uuid(item.audit.created_by))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("create_grn_item", e))?;
        }
        commit(tx).await?;
        info!(order_id = %order_id, grn_id = %note.id, lines = items.len(), "goods received");
        Ok(GrnDetail { note, items })
    }

    #[instrument(skip(self), fields(grn_id = %id), err)]
    pub(super) async fn get_grn(&self, id: GoodsReceivedNoteId) -> StoreResult<GrnDetail> {
        let mut conn = self.conn().await?;
        let note = fetch_one(
            &mut conn,
            "SELECT * FROM goods_received_notes WHERE id = $1",
            *id.as_uuid(),
            rows::grn,
            "goods received note",
        )
        .await?;
        let items = fetch_all(
            &mut conn,
            "SELECT * FROM grn_items WHERE grn_id = $1 ORDER BY created_at, id",
            *id.as_uuid(),
            rows::grn_item,
        )
        .await?;
        Ok(GrnDetail { note, items })
    }
}
