//! Items, their finance code splits and attachments.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgConnection, Row};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use epro_core::{AttachmentId, DomainError, FinanceCodesId, ItemId, RequestId, UserId};
use epro_procurement::{
    CodeKind, FinanceCodes, Item, ItemAttachment, ItemPatch, NewFinanceCodes, NewItem,
    allocation_total, check_allocation,
};

use super::reference::{check_code, ensure_office, ensure_unit};
use super::requests::lock_editable_request;
use super::{
    PostgresProcurementStore, commit, fetch_all, fetch_one, map_sqlx_error, next_number, opt_uuid,
    rows,
};
use crate::sequence::SequenceScope;
use crate::store::{ItemLocation, Removed, StoreError, StoreResult};

/// Insert or overwrite every column of an item.
pub(super) async fn save_item(conn: &mut PgConnection, item: &Item) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO items (
            id, request_id, item_sno, quantity, unit_id, description_pr, description_po,
            unit_price_local, unit_price_usd, subtotal_local, subtotal_usd, default_finance_codes,
            created_at, created_by, updated_at, updated_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
        ON CONFLICT (id) DO UPDATE SET
            quantity = EXCLUDED.quantity,
            unit_id = EXCLUDED.unit_id,
            description_pr = EXCLUDED.description_pr,
            description_po = EXCLUDED.description_po,
            unit_price_local = EXCLUDED.unit_price_local,
            unit_price_usd = EXCLUDED.unit_price_usd,
            subtotal_local = EXCLUDED.subtotal_local,
            subtotal_usd = EXCLUDED.subtotal_usd,
            default_finance_codes = EXCLUDED.default_finance_codes,
            updated_at = EXCLUDED.updated_at,
            updated_by = EXCLUDED.updated_by
        "#,
    )
    .bind(item.id.as_uuid())
    .bind(item.request_id.as_uuid())
    .bind(i64::from(item.item_sno))
    .bind(i64::from(item.quantity))
    .bind(item.unit_id.as_uuid())
    .bind(&item.description_pr)
    .bind(&item.description_po)
    .bind(item.unit_price_local)
    .bind(item.unit_price_usd)
    .bind(item.subtotal_local)
    .bind(item.subtotal_usd)
    .bind(item.default_finance_codes)
    .bind(item.audit.created_at)
    .bind(opt_uuid(item.audit.created_by))
    .bind(item.audit.updated_at)
    .bind(opt_uuid(item.audit.updated_by))
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("save_item", e))?;
    Ok(())
}

async fn save_finance_codes(conn: &mut PgConnection, split: &FinanceCodes) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO finance_codes (
            id, item_id, gl_account, fund_code_id, dept_code_id, office_code_id, lin_code_id,
            activity_code_id, employee_id, allocation_percent,
            created_at, created_by, updated_at, updated_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        ON CONFLICT (id) DO UPDATE SET
            gl_account = EXCLUDED.gl_account,
            fund_code_id = EXCLUDED.fund_code_id,
            dept_code_id = EXCLUDED.dept_code_id,
            office_code_id = EXCLUDED.office_code_id,
            lin_code_id = EXCLUDED.lin_code_id,
            activity_code_id = EXCLUDED.activity_code_id,
            employee_id = EXCLUDED.employee_id,
            allocation_percent = EXCLUDED.allocation_percent,
            updated_at = EXCLUDED.updated_at,
            updated_by = EXCLUDED.updated_by
        "#,
    )
    .bind(split.id.as_uuid())
    .bind(split.item_id.as_uuid())
    .bind(i32::from(split.gl_account.value()))
    .bind(split.fund_code_id.as_uuid())
    .bind(split.dept_code_id.as_uuid())
    .bind(split.office_code_id.as_uuid())
    .bind(opt_uuid(split.lin_code_id))
    .bind(opt_uuid(split.activity_code_id))
    .bind(split.employee_id.map(i64::from))
    .bind(split.allocation_percent.value())
    .bind(split.audit.created_at)
    .bind(opt_uuid(split.audit.created_by))
    .bind(split.audit.updated_at)
    .bind(opt_uuid(split.audit.updated_by))
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("save_finance_codes", e))?;
    Ok(())
}

async fn find_item(conn: &mut PgConnection, id: ItemId) -> StoreResult<Item> {
    fetch_one(conn, "SELECT * FROM items WHERE id = $1", *id.as_uuid(), rows::item, "item").await
}

async fn lock_item(conn: &mut PgConnection, id: ItemId) -> StoreResult<Item> {
    fetch_one(conn, "SELECT * FROM items WHERE id = $1 FOR UPDATE", *id.as_uuid(), rows::item, "item").await
}

/// Lock the item's request (checking it is editable), then the item itself.
async fn lock_editable_item(conn: &mut PgConnection, id: ItemId) -> StoreResult<(Item, Decimal)> {
    let request_id = find_item(conn, id).await?.request_id;
    let request = lock_editable_request(conn, request_id).await?;
    let item = lock_item(conn, id).await?;
    Ok((item, request.exchange_rate))
}

async fn splits_of(conn: &mut PgConnection, item_id: ItemId) -> StoreResult<Vec<FinanceCodes>> {
    fetch_all(
        conn,
        "SELECT * FROM finance_codes WHERE item_id = $1 ORDER BY created_at, id",
        *item_id.as_uuid(),
        rows::finance_codes,
    )
    .await
}

async fn items_of(conn: &mut PgConnection, request_id: RequestId) -> StoreResult<Vec<Item>> {
    fetch_all(
        conn,
        "SELECT * FROM items WHERE request_id = $1 ORDER BY item_sno",
        *request_id.as_uuid(),
        rows::item,
    )
    .await
}

async fn check_finance_refs(conn: &mut PgConnection, new: &NewFinanceCodes) -> StoreResult<()> {
    check_code(conn, new.fund_code_id, CodeKind::Fund).await?;
    check_code(conn, new.dept_code_id, CodeKind::Department).await?;
    if let Some(id) = new.lin_code_id {
        check_code(conn, id, CodeKind::Lin).await?;
    }
    if let Some(id) = new.activity_code_id {
        check_code(conn, id, CodeKind::Activity).await?;
    }
    ensure_office(conn, new.office_code_id, "office code").await
}

impl PostgresProcurementStore {
    #[instrument(skip(self, new), fields(request_id = %request_id), err)]
    pub(super) async fn add_item(&self, request_id: RequestId, new: NewItem, actor: Option<UserId>) -> StoreResult<Item> {
        let mut tx = self.begin().await?;
        let request = lock_editable_request(&mut tx, request_id).await?;
        ensure_unit(&mut tx, new.unit_id).await?;
        let item_sno = next_number(&mut tx, SequenceScope::Request(request_id))
            .await?
            .ok_or_else(|| StoreError::not_found("purchase request"))?;
        let item = Item::create(&request, new, item_sno, actor, Utc::now())?;
        save_item(&mut tx, &item).await?;
        commit(tx).await?;
        info!(request_id = %request_id, item_id = %item.id, item_sno, "item added");
        Ok(item)
    }

    #[instrument(skip(self), fields(item_id = %id), err)]
    pub(super) async fn get_item(&self, id: ItemId) -> StoreResult<Item> {
        let mut conn = self.conn().await?;
        find_item(&mut conn, id).await
    }

    #[instrument(skip(self), fields(request_id = %request_id), err)]
    pub(super) async fn list_items(&self, request_id: RequestId) -> StoreResult<Vec<Item>> {
        let mut conn = self.conn().await?;
        fetch_one(
            &mut conn,
            "SELECT id FROM purchase_requests WHERE id = $1",
            *request_id.as_uuid(),
            |row| row.try_get::<Uuid, _>("id"),
            "purchase request",
        )
        .await?;
        items_of(&mut conn, request_id).await
    }

    #[instrument(skip(self, patch), fields(item_id = %id), err)]
    pub(super) async fn update_item(&self, id: ItemId, patch: ItemPatch, actor: Option<UserId>) -> StoreResult<Item> {
        let mut tx = self.begin().await?;
        let (mut item, rate) = lock_editable_item(&mut tx, id).await?;
        if let Some(unit_id) = patch.unit_id {
            ensure_unit(&mut tx, unit_id).await?;
        }
        let now = Utc::now();
        let old_quantity = item.quantity;
        item.apply_patch(patch, rate, actor, now)?;
        save_item(&mut tx, &item).await?;
        if item.quantity != old_quantity {
            let requoted = super::quotations::requote_item(&mut tx, &item, actor, now).await?;
            debug!(item_id = %id, requoted, "quoted subtotals refreshed");
        }
        commit(tx).await?;
        Ok(item)
    }

    /// Delete an item. Splits, attachments, quoted and ordered lines go with it;
    /// orders and RFQs that lost a line have their derived fields refreshed.
    #[instrument(skip(self), fields(item_id = %id), err)]
    pub(super) async fn delete_item(&self, id: ItemId) -> StoreResult<Removed> {
        let mut tx = self.begin().await?;
        lock_editable_item(&mut tx, id).await?;

        let attachment_paths = fetch_all(
            &mut tx,
            "SELECT path FROM item_attachments WHERE item_id = $1",
            *id.as_uuid(),
            |row| row.try_get::<String, _>("path"),
        )
        .await?;
        let order_ids = fetch_all(
            &mut tx,
            "SELECT DISTINCT order_id FROM purchase_order_items WHERE item_id = $1",
            *id.as_uuid(),
            |row| row.try_get::<Uuid, _>("order_id"),
        )
        .await?;
        let rfq_ids = fetch_all(
            &mut tx,
            "SELECT DISTINCT rfq_id FROM rfq_items WHERE item_id = $1",
            *id.as_uuid(),
            |row| row.try_get::<Uuid, _>("rfq_id"),
        )
        .await?;

        sqlx::query("DELETE FROM items WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_item", e))?;

        for order_id in order_ids {
            super::orders::refresh_order(&mut tx, order_id.into()).await?;
        }
        for rfq_id in rfq_ids {
            super::quotations::refresh_rfq(&mut tx, rfq_id.into()).await?;
        }
        commit(tx).await?;
        info!(item_id = %id, files = attachment_paths.len(), "item deleted");
        Ok(Removed { attachment_paths })
    }

    #[instrument(skip(self), fields(item_id = %id), err)]
    pub(super) async fn set_default_finance_item(&self, id: ItemId, actor: Option<UserId>) -> StoreResult<Item> {
        let now = Utc::now();
        let mut tx = self.begin().await?;
        let (item, _) = lock_editable_item(&mut tx, id).await?;
        let mut chosen = item.clone();
        for mut sibling in items_of(&mut tx, item.request_id).await? {
            let is_template = sibling.id == id;
            if sibling.default_finance_codes != is_template {
                sibling.default_finance_codes = is_template;
                sibling.audit.touch(actor, now);
                save_item(&mut tx, &sibling).await?;
            }
            if is_template {
                chosen = sibling;
            }
        }
        commit(tx).await?;
        Ok(chosen)
    }

    #[instrument(skip(self), fields(item_id = %id), err)]
    pub(super) async fn unset_default_finance_item(&self, id: ItemId, actor: Option<UserId>) -> StoreResult<Item> {
        let mut tx = self.begin().await?;
        let (mut item, _) = lock_editable_item(&mut tx, id).await?;
        if item.default_finance_codes {
            item.default_finance_codes = false;
            item.audit.touch(actor, Utc::now());
            save_item(&mut tx, &item).await?;
        }
        commit(tx).await?;
        Ok(item)
    }

    #[instrument(skip(self), fields(request_id = %request_id), err)]
    pub(super) async fn apply_default_finance_codes(
        &self,
        request_id: RequestId,
        actor: Option<UserId>,
    ) -> StoreResult<Vec<FinanceCodes>> {
        let now = Utc::now();
        let mut tx = self.begin().await?;
        lock_editable_request(&mut tx, request_id).await?;
        let items = items_of(&mut tx, request_id).await?;
        let template = items
            .iter()
            .find(|i| i.default_finance_codes)
            .ok_or_else(|| DomainError::invariant("no item is marked as the default finance codes"))?;
        let splits = splits_of(&mut tx, template.id).await?;

        let mut copies = Vec::new();
        for target in items.iter().filter(|i| i.id != template.id) {
            sqlx::query("DELETE FROM finance_codes WHERE item_id = $1")
                .bind(target.id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("clear_finance_codes", e))?;
            for split in &splits {
                let copy = split.copy_to(target.id, actor, now);
                save_finance_codes(&mut tx, &copy).await?;
                copies.push(copy);
            }
        }
        commit(tx).await?;
        info!(request_id = %request_id, copies = copies.len(), "default finance codes applied");
        Ok(copies)
    }

    #[instrument(skip(self, new), fields(item_id = %item_id), err)]
    pub(super) async fn add_finance_codes(
        &self,
        item_id: ItemId,
        new: NewFinanceCodes,
        actor: Option<UserId>,
    ) -> StoreResult<FinanceCodes> {
        let mut tx = self.begin().await?;
        lock_editable_item(&mut tx, item_id).await?;
        check_finance_refs(&mut tx, &new).await?;
        check_allocation(&splits_of(&mut tx, item_id).await?, None, new.allocation_percent)?;
        let split = FinanceCodes::create(item_id, new, actor, Utc::now())?;
        save_finance_codes(&mut tx, &split).await?;
        commit(tx).await?;
        Ok(split)
    }

    #[instrument(skip(self, new), fields(finance_codes_id = %id), err)]
    pub(super) async fn update_finance_codes(
        &self,
        id: FinanceCodesId,
        new: NewFinanceCodes,
        actor: Option<UserId>,
    ) -> StoreResult<FinanceCodes> {
        let mut tx = self.begin().await?;
        let item_id = fetch_one(
            &mut tx,
            "SELECT * FROM finance_codes WHERE id = $1",
            *id.as_uuid(),
            rows::finance_codes,
            "finance codes",
        )
        .await?
        .item_id;
        lock_editable_item(&mut tx, item_id).await?;
        let mut split = fetch_one(
            &mut tx,
            "SELECT * FROM finance_codes WHERE id = $1",
            *id.as_uuid(),
            rows::finance_codes,
            "finance codes",
        )
        .await?;
        check_finance_refs(&mut tx, &new).await?;
        check_allocation(&splits_of(&mut tx, item_id).await?, Some(id), new.allocation_percent)?;
        split.replace(new, actor, Utc::now())?;
        save_finance_codes(&mut tx, &split).await?;
        commit(tx).await?;
        Ok(split)
    }

    #[instrument(skip(self), fields(finance_codes_id = %id), err)]
    pub(super) async fn delete_finance_codes(&self, id: FinanceCodesId) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        let split = fetch_one(
            &mut tx,
            "SELECT * FROM finance_codes WHERE id = $1",
            *id.as_uuid(),
            rows::finance_codes,
            "finance codes",
        )
        .await?;
        lock_editable_item(&mut tx, split.item_id).await?;
        sqlx::query("DELETE FROM finance_codes WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_finance_codes", e))?;
        commit(tx).await
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    pub(super) async fn list_finance_codes(&self, item_id: ItemId) -> StoreResult<Vec<FinanceCodes>> {
        let mut conn = self.conn().await?;
        find_item(&mut conn, item_id).await?;
        splits_of(&mut conn, item_id).await
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    pub(super) async fn allocation_total(&self, item_id: ItemId) -> StoreResult<Decimal> {
        let mut conn = self.conn().await?;
        find_item(&mut conn, item_id).await?;
        Ok(allocation_total(&splits_of(&mut conn, item_id).await?))
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    pub(super) async fn item_location(&self, item_id: ItemId) -> StoreResult<ItemLocation> {
        let row = sqlx::query(
            r#"
            SELECT o.name AS office_name, r.id AS request_id
            FROM items i
            JOIN purchase_requests r ON r.id = i.request_id
            JOIN offices o ON o.id = r.office_id
            WHERE i.id = $1
            "#,
        )
        .bind(item_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("item_location", e))?
        .ok_or_else(|| StoreError::not_found("item"))?;
        let office_name: String = row
            .try_get("office_name")
            .map_err(|e| map_sqlx_error("decode_item_location", e))?;
        let request_id: Uuid = row
            .try_get("request_id")
            .map_err(|e| map_sqlx_error("decode_item_location", e))?;
        Ok(ItemLocation {
            office_name,
            request_id: request_id.into(),
            item_id,
        })
    }

    #[instrument(skip(self, attachment), fields(item_id = %attachment.item_id), err)]
    pub(super) async fn insert_attachment(&self, attachment: ItemAttachment) -> StoreResult<ItemAttachment> {
        let mut tx = self.begin().await?;
        find_item(&mut tx, attachment.item_id).await?;
        sqlx::query(
            r#"
            INSERT INTO item_attachments (
                id, item_id, file_name, path, content_type, size_bytes, created_at, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(attachment.id.as_uuid())
        .bind(attachment.item_id.as_uuid())
        .bind(&attachment.file_name)
        .bind(&attachment.path)
        .bind(&attachment.content_type)
        .bind(i64::try_from(attachment.size_bytes).map_err(|_| {
            StoreError::Domain(DomainError::validation("attachment is too large"))
        })?)
        .bind(attachment.audit.created_at)
        .bind(opt_uuid(attachment.audit.created_by))
        .execute(&mut *tx)
        .await
        .map_err(|e| match map_sqlx_error("insert_attachment", e) {
            StoreError::Domain(DomainError::Conflict(_)) => StoreError::Domain(DomainError::conflict(format!(
                "an attachment named '{}' already exists on this item",
                attachment.file_name
            ))),
            other => other,
        })?;
        commit(tx).await?;
        Ok(attachment)
    }

    #[instrument(skip(self), fields(item_id = %item_id), err)]
    pub(super) async fn list_attachments(&self, item_id: ItemId) -> StoreResult<Vec<ItemAttachment>> {
        let mut conn = self.conn().await?;
        find_item(&mut conn, item_id).await?;
        fetch_all(
            &mut conn,
            "SELECT * FROM item_attachments WHERE item_id = $1 ORDER BY created_at, id",
            *item_id.as_uuid(),
            rows::attachment,
        )
        .await
    }

    #[instrument(skip(self), fields(attachment_id = %id), err)]
    pub(super) async fn delete_attachment(&self, id: AttachmentId) -> StoreResult<ItemAttachment> {
        let row = sqlx::query("DELETE FROM item_attachments WHERE id = $1 RETURNING *")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_attachment", e))?
            .ok_or_else(|| StoreError::not_found("attachment"))?;
        rows::attachment(&row).map_err(|e| map_sqlx_error("decode_attachment", e))
    }
}
