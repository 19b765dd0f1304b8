//! Purchase requests and their change log.

use chrono::Utc;
use sqlx::{PgConnection, Row};
use tracing::{info, instrument};
use uuid::Uuid;

use epro_core::{OfficeId, RequestId, Snapshot, UserId};
use epro_procurement::log::{UNTRACKED_FIELDS, entries_for_changes};
use epro_procurement::{
    Assignment, NewManualLogEntry, NewPurchaseRequest, PurchaseRequest, RequestLogEntry,
    RequestPatch, StatusTransition,
};

use super::items::save_item;
use super::reference::{ensure_currency, ensure_office, office_by_id};
use super::{
    PostgresProcurementStore, commit, fetch_all, fetch_one, map_sqlx_error, next_number, opt_uuid,
    rows,
};
use crate::sequence::SequenceScope;
use crate::store::{Removed, StoreResult, unknown};

/// Lock a request row for the rest of the transaction.
pub(super) async fn lock_request(conn: &mut PgConnection, id: RequestId) -> StoreResult<PurchaseRequest> {
    fetch_one(
        conn,
        "SELECT * FROM purchase_requests WHERE id = $1 FOR UPDATE",
        *id.as_uuid(),
        rows::request,
        "purchase request",
    )
    .await
}

/// Lock a request row and check it still accepts edits.
pub(super) async fn lock_editable_request(conn: &mut PgConnection, id: RequestId) -> StoreResult<PurchaseRequest> {
    let request = lock_request(conn, id).await?;
    request.ensure_editable()?;
    Ok(request)
}

async fn ensure_request(conn: &mut PgConnection, id: RequestId) -> StoreResult<()> {
    fetch_one(
        conn,
        "SELECT id FROM purchase_requests WHERE id = $1",
        *id.as_uuid(),
        |row| row.try_get::<Uuid, _>("id"),
        "purchase request",
    )
    .await
    .map(|_| ())
}

/// Insert or overwrite every column of a request.
async fn save_request(conn: &mut PgConnection, r: &PurchaseRequest) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO purchase_requests (
            id, sno, office_id, country_code, currency_id, exchange_rate,
            delivery_address, project_reference, required_date,
            originator, origination_date, procurement_review_by, procurement_review_date,
            approver1, approval1_date, approver2, approval2_date,
            finance_reviewer, finance_review_date, submission_date,
            status, status_notes, pr_type, expense_type,
            processing_office_id, assigned_by, assigned_to, assigned_date,
            notes, preferred_supplier,
            cancellation_requested_date, cancellation_requested_by, cancelled_by, cancellation_date,
            created_at, created_by, updated_at, updated_by
        )
        VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19,
            $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32, $33, $34, $35, $36,
            $37, $38
        )
        ON CONFLICT (id) DO UPDATE SET
            currency_id = EXCLUDED.currency_id,
            exchange_rate = EXCLUDED.exchange_rate,
            delivery_address = EXCLUDED.delivery_address,
            project_reference = EXCLUDED.project_reference,
            required_date = EXCLUDED.required_date,
            procurement_review_by = EXCLUDED.procurement_review_by,
            procurement_review_date = EXCLUDED.procurement_review_date,
            approver1 = EXCLUDED.approver1,
            approval1_date = EXCLUDED.approval1_date,
            approver2 = EXCLUDED.approver2,
            approval2_date = EXCLUDED.approval2_date,
            finance_reviewer = EXCLUDED.finance_reviewer,
            finance_review_date = EXCLUDED.finance_review_date,
            submission_date = EXCLUDED.submission_date,
            status = EXCLUDED.status,
            status_notes = EXCLUDED.status_notes,
            pr_type = EXCLUDED.pr_type,
            expense_type = EXCLUDED.expense_type,
            processing_office_id = EXCLUDED.processing_office_id,
            assigned_by = EXCLUDED.assigned_by,
            assigned_to = EXCLUDED.assigned_to,
            assigned_date = EXCLUDED.assigned_date,
            notes = EXCLUDED.notes,
            preferred_supplier = EXCLUDED.preferred_supplier,
            cancellation_requested_date = EXCLUDED.cancellation_requested_date,
            cancellation_requested_by = EXCLUDED.cancellation_requested_by,
            cancelled_by = EXCLUDED.cancelled_by,
            cancellation_date = EXCLUDED.cancellation_date,
            updated_at = EXCLUDED.updated_at,
            updated_by = EXCLUDED.updated_by
        "#,
    )
    .bind(r.id.as_uuid())
    .bind(i64::from(r.sno))
    .bind(r.office_id.as_uuid())
    .bind(&r.country_code)
    .bind(r.currency_id.as_uuid())
    .bind(r.exchange_rate)
    .bind(&r.delivery_address)
    .bind(&r.project_reference)
    .bind(r.required_date)
    .bind(r.originator.as_uuid())
    .bind(r.origination_date)
    .bind(opt_uuid(r.procurement_review_by))
    .bind(r.procurement_review_date)
    .bind(r.approver1.as_uuid())
    .bind(r.approval1_date)
    .bind(opt_uuid(r.approver2))
    .bind(r.approval2_date)
    .bind(opt_uuid(r.finance_reviewer))
    .bind(r.finance_review_date)
    .bind(r.submission_date)
    .bind(r.status.as_str())
    .bind(&r.status_notes)
    .bind(r.pr_type.as_str())
    .bind(r.expense_type.map(|e| e.as_str()))
    .bind(opt_uuid(r.processing_office_id))
    .bind(opt_uuid(r.assigned_by))
    .bind(opt_uuid(r.assigned_to))
    .bind(r.assigned_date)
    .bind(&r.notes)
    .bind(r.preferred_supplier)
    .bind(r.cancellation_requested_date)
    .bind(opt_uuid(r.cancellation_requested_by))
    .bind(opt_uuid(r.cancelled_by))
    .bind(r.cancellation_date)
    .bind(r.audit.created_at)
    .bind(opt_uuid(r.audit.created_by))
    .bind(r.audit.updated_at)
    .bind(opt_uuid(r.audit.updated_by))
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("save_request", e))?;
    Ok(())
}

async fn insert_log(conn: &mut PgConnection, entry: &RequestLogEntry) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO request_log (
            id, request_id, field_ref, old_value, new_value, description, manual,
            changed_by, changed_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(entry.id.as_uuid())
    .bind(entry.request_id.as_uuid())
    .bind(&entry.field_ref)
    .bind(&entry.old_value)
    .bind(&entry.new_value)
    .bind(&entry.description)
    .bind(entry.manual)
    .bind(opt_uuid(entry.changed_by))
    .bind(entry.changed_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("insert_log", e))?;
    Ok(())
}

impl PostgresProcurementStore {
    #[instrument(skip(self, new), fields(office_id = ?new.office_id), err)]
    pub(super) async fn create_request(
        &self,
        new: NewPurchaseRequest,
        actor: Option<UserId>,
    ) -> StoreResult<PurchaseRequest> {
        let refs = new.validate()?;
        let mut tx = self.begin().await?;

        let sno = next_number(&mut tx, SequenceScope::Office(refs.office_id))
            .await?
            .ok_or_else(|| unknown("office"))?;
        let office = office_by_id(&mut tx, refs.office_id)
            .await?
            .ok_or_else(|| unknown("office"))?;
        ensure_currency(&mut tx, refs.currency_id).await?;

        let request = PurchaseRequest::draft(new, &office, sno, actor, Utc::now())?;
        save_request(&mut tx, &request).await?;
        commit(tx).await?;
        info!(request_id = %request.id, office_id = %office.id, sno, "purchase request created");
        Ok(request)
    }

    #[instrument(skip(self), fields(request_id = %id), err)]
    pub(super) async fn get_request(&self, id: RequestId) -> StoreResult<PurchaseRequest> {
        let mut conn = self.conn().await?;
        fetch_one(
            &mut conn,
            "SELECT * FROM purchase_requests WHERE id = $1",
            *id.as_uuid(),
            rows::request,
            "purchase request",
        )
        .await
    }

    #[instrument(skip(self), err)]
    pub(super) async fn list_requests(&self, office_id: Option<OfficeId>) -> StoreResult<Vec<PurchaseRequest>> {
        let records = sqlx::query(
            r#"
            SELECT * FROM purchase_requests
            WHERE $1::uuid IS NULL OR office_id = $1
            ORDER BY office_id, sno
            "#,
        )
        .bind(opt_uuid(office_id))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_requests", e))?;
        records
            .iter()
            .map(rows::request)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("decode_request", e))
    }

    #[instrument(skip(self, patch), fields(request_id = %id), err)]
    pub(super) async fn update_request(
        &self,
        id: RequestId,
        patch: RequestPatch,
        actor: Option<UserId>,
    ) -> StoreResult<PurchaseRequest> {
        let now = Utc::now();
        let mut tx = self.begin().await?;
        let mut request = lock_request(&mut tx, id).await?;
        if let Some(currency_id) = patch.currency_id {
            ensure_currency(&mut tx, currency_id).await?;
        }

        let before = Snapshot::capture(&request)?;
        let rate_changed = request.apply_patch(patch, actor, now)?;
        let after = Snapshot::capture(&request)?;
        let changes = before.diff_except(&after, UNTRACKED_FIELDS);

        if rate_changed {
            let items = fetch_all(
                &mut tx,
                "SELECT * FROM items WHERE request_id = $1 ORDER BY item_sno",
                *id.as_uuid(),
                rows::item,
            )
            .await?;
            for mut item in items {
                item.reprice(request.exchange_rate, actor, now)?;
                save_item(&mut tx, &item).await?;
            }
        }
        for entry in entries_for_changes(id, &changes, actor, now) {
            insert_log(&mut tx, &entry).await?;
        }
        save_request(&mut tx, &request).await?;
        commit(tx).await?;
        info!(request_id = %id, changed = changes.len(), rate_changed, "purchase request updated");
        Ok(request)
    }

    #[instrument(skip(self, transition), fields(request_id = %id, to = %transition.to), err)]
    pub(super) async fn transition_request(
        &self,
        id: RequestId,
        transition: StatusTransition,
        actor: UserId,
    ) -> StoreResult<PurchaseRequest> {
        let now = Utc::now();
        let mut tx = self.begin().await?;
        let mut request = lock_request(&mut tx, id).await?;
        let notes = transition.notes.clone();
        let from = request.transition(transition, actor, now)?;
        save_request(&mut tx, &request).await?;
        let entry = RequestLogEntry::status_change(id, from, request.status, notes, actor, now);
        insert_log(&mut tx, &entry).await?;
        commit(tx).await?;
        info!(request_id = %id, %from, to = %request.status, "purchase request transitioned");
        Ok(request)
    }

    #[instrument(skip(self, assignment), fields(request_id = %id), err)]
    pub(super) async fn assign_request(
        &self,
        id: RequestId,
        assignment: Assignment,
        actor: Option<UserId>,
    ) -> StoreResult<PurchaseRequest> {
        let mut tx = self.begin().await?;
        let mut request = lock_request(&mut tx, id).await?;
        if let Some(office_id) = assignment.processing_office_id {
            ensure_office(&mut tx, office_id, "processing office").await?;
        }
        request.assign(assignment, actor, Utc::now())?;
        save_request(&mut tx, &request).await?;
        commit(tx).await?;
        Ok(request)
    }

    #[instrument(skip(self), fields(request_id = %id), err)]
    pub(super) async fn request_cancellation(&self, id: RequestId, actor: UserId) -> StoreResult<PurchaseRequest> {
        let mut tx = self.begin().await?;
        let mut request = lock_request(&mut tx, id).await?;
        request.request_cancellation(actor, Utc::now())?;
        save_request(&mut tx, &request).await?;
        commit(tx).await?;
        Ok(request)
    }

    /// Delete a request; every dependent row goes with it via `ON DELETE CASCADE`.
    #[instrument(skip(self), fields(request_id = %id), err)]
    pub(super) async fn delete_request(&self, id: RequestId) -> StoreResult<Removed> {
        let mut tx = self.begin().await?;
        lock_request(&mut tx, id).await?;
        let attachment_paths = fetch_all(
            &mut tx,
            r#"
            SELECT a.path
            FROM item_attachments a
            JOIN items i ON i.id = a.item_id
            WHERE i.request_id = $1
            "#,
            *id.as_uuid(),
            |row| row.try_get::<String, _>("path"),
        )
        .await?;
        sqlx::query("DELETE FROM purchase_requests WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_request", e))?;
        commit(tx).await?;
        info!(request_id = %id, files = attachment_paths.len(), "purchase request deleted");
        Ok(Removed { attachment_paths })
    }

    #[instrument(skip(self), fields(request_id = %id), err)]
    pub(super) async fn request_log(&self, id: RequestId) -> StoreResult<Vec<RequestLogEntry>> {
        let mut conn = self.conn().await?;
        ensure_request(&mut conn, id).await?;
        fetch_all(
            &mut conn,
            "SELECT * FROM request_log WHERE request_id = $1 ORDER BY changed_at, id",
            *id.as_uuid(),
            rows::log_entry,
        )
        .await
    }

    #[instrument(skip(self, entry), fields(request_id = %id), err)]
    pub(super) async fn add_log_entry(
        &self,
        id: RequestId,
        entry: NewManualLogEntry,
        actor: Option<UserId>,
    ) -> StoreResult<RequestLogEntry> {
        let mut tx = self.begin().await?;
        ensure_request(&mut tx, id).await?;
        let entry = RequestLogEntry::manual(id, entry, actor, Utc::now())?;
        insert_log(&mut tx, &entry).await?;
        commit(tx).await?;
        Ok(entry)
    }
}
