//! In-memory procurement store.
//!
//! Intended for tests/dev. Every operation takes the single state lock for
//! its whole duration, which serializes sequence assignment and allocation
//! checks the way row locks do in Postgres.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;

use epro_core::{
    AttachmentId, CodeId, CurrencyId, DomainError, FinanceCodesId, GoodsReceivedNoteId,
    GoodsReceivedNoteItemId, ItemId, LogEntryId, OfficeId, PurchaseOrderId, PurchaseOrderItemId,
    QuotationAnalysisId, RequestId, RfqId, RfqItemId, Snapshot, UnitId, UserId, VendorId,
};
use epro_procurement::log::{UNTRACKED_FIELDS, entries_for_changes};
use epro_procurement::{
    Assignment, Code, CodeKind, Currency, FinanceCodes, GoodsReceivedNote, GoodsReceivedNoteItem,
    GrnDetail, Item, ItemAttachment, ItemPatch, NewCode, NewCurrency, NewFinanceCodes,
    NewGoodsReceivedNote, NewItem, NewManualLogEntry, NewOffice, NewPurchaseOrder,
    NewPurchaseOrderItem, NewPurchaseRequest, NewQuotationAnalysis, NewRequestForQuotation,
    NewRfqItem, NewUnit, NewVendor, Office, OrderDetail, PurchaseOrder, PurchaseOrderItem,
    PurchaseRequest, QuotationAnalysis, RequestForQuotation, RequestLogEntry, RequestPatch,
    RfqDetail, RfqItem, StatusTransition, Unit, Vendor, check_allocation,
};

use super::{
    ItemLocation, ProcurementStore, Removed, StoreError, StoreResult, ensure_code, unknown,
};
use crate::sequence::next_in;

#[derive(Debug, Default)]
struct State {
    offices: BTreeMap<OfficeId, Office>,
    currencies: BTreeMap<CurrencyId, Currency>,
    units: BTreeMap<UnitId, Unit>,
    vendors: BTreeMap<VendorId, Vendor>,
    codes: BTreeMap<CodeId, Code>,
    requests: BTreeMap<RequestId, PurchaseRequest>,
    logs: BTreeMap<LogEntryId, RequestLogEntry>,
    items: BTreeMap<ItemId, Item>,
    finance_codes: BTreeMap<FinanceCodesId, FinanceCodes>,
    attachments: BTreeMap<AttachmentId, ItemAttachment>,
    analyses: BTreeMap<QuotationAnalysisId, QuotationAnalysis>,
    rfqs: BTreeMap<RfqId, RequestForQuotation>,
    rfq_items: BTreeMap<RfqItemId, RfqItem>,
    orders: BTreeMap<PurchaseOrderId, PurchaseOrder>,
    order_items: BTreeMap<PurchaseOrderItemId, PurchaseOrderItem>,
    grns: BTreeMap<GoodsReceivedNoteId, GoodsReceivedNote>,
    grn_items: BTreeMap<GoodsReceivedNoteItemId, GoodsReceivedNoteItem>,
}

fn found<'a, K: Ord, V>(
    map: &'a BTreeMap<K, V>,
    id: &K,
    what: &'static str,
) -> StoreResult<&'a V> {
    map.get(id).ok_or_else(|| StoreError::not_found(what))
}

fn found_mut<'a, K: Ord, V>(
    map: &'a mut BTreeMap<K, V>,
    id: &K,
    what: &'static str,
) -> StoreResult<&'a mut V> {
    map.get_mut(id).ok_or_else(|| StoreError::not_found(what))
}

impl State {
    fn items_of(&self, request_id: RequestId) -> Vec<Item> {
        let mut items: Vec<Item> = self
            .items
            .values()
            .filter(|i| i.request_id == request_id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.item_sno);
        items
    }

    fn splits_of(&self, item_id: ItemId) -> Vec<FinanceCodes> {
        self.finance_codes
            .values()
            .filter(|f| f.item_id == item_id)
            .cloned()
            .collect()
    }

    fn rfq_items_of(&self, rfq_id: RfqId) -> Vec<RfqItem> {
        self.rfq_items
            .values()
            .filter(|i| i.rfq_id == rfq_id)
            .cloned()
            .collect()
    }

    fn order_items_of(&self, order_id: PurchaseOrderId) -> Vec<PurchaseOrderItem> {
        self.order_items
            .values()
            .filter(|i| i.order_id == order_id)
            .cloned()
            .collect()
    }

    fn editable_request(&self, id: RequestId) -> StoreResult<&PurchaseRequest> {
        let request = found(&self.requests, &id, "purchase request")?;
        request.ensure_editable()?;
        Ok(request)
    }

    fn vendor_ref(&self, id: Option<VendorId>) -> StoreResult<Option<&Vendor>> {
        id.map(|id| self.vendors.get(&id).ok_or_else(|| unknown("vendor")))
            .transpose()
    }

    fn analysis_ref(&self, id: Option<QuotationAnalysisId>) -> StoreResult<Option<&QuotationAnalysis>> {
        id.map(|id| self.analyses.get(&id).ok_or_else(|| unknown("quotation analysis")))
            .transpose()
    }

    fn check_finance_refs(&self, new: &NewFinanceCodes) -> StoreResult<()> {
        ensure_code(self.codes.get(&new.fund_code_id), CodeKind::Fund)?;
        ensure_code(self.codes.get(&new.dept_code_id), CodeKind::Department)?;
        if let Some(id) = new.lin_code_id {
            ensure_code(self.codes.get(&id), CodeKind::Lin)?;
        }
        if let Some(id) = new.activity_code_id {
            ensure_code(self.codes.get(&id), CodeKind::Activity)?;
        }
        if !self.offices.contains_key(&new.office_code_id) {
            return Err(unknown("office code"));
        }
        Ok(())
    }

    fn refresh_rfq(&mut self, rfq_id: RfqId) {
        let items = self.rfq_items_of(rfq_id);
        if let Some(rfq) = self.rfqs.get_mut(&rfq_id) {
            rfq.recompute(&items);
        }
    }

    fn refresh_order(&mut self, order_id: PurchaseOrderId) -> StoreResult<()> {
        let items = self.order_items_of(order_id);
        let analysis = self
            .orders
            .get(&order_id)
            .and_then(|o| o.quotation_analysis_id)
            .and_then(|id| self.analyses.get(&id))
            .cloned();
        if let Some(order) = self.orders.get_mut(&order_id) {
            order.recompute(&items, analysis.as_ref())?;
        }
        Ok(())
    }

    /// Remove an item and everything hanging off it. Returns the attachment
    /// paths removed.
    fn cascade_item(&mut self, item_id: ItemId) -> StoreResult<Vec<String>> {
        self.items.remove(&item_id);
        self.finance_codes.retain(|_, f| f.item_id != item_id);

        let mut paths = Vec::new();
        self.attachments.retain(|_, a| {
            if a.item_id == item_id {
                paths.push(a.path.clone());
                false
            } else {
                true
            }
        });

        let mut touched_rfqs = Vec::new();
        self.rfq_items.retain(|_, i| {
            if i.item_id == item_id {
                touched_rfqs.push(i.rfq_id);
                false
            } else {
                true
            }
        });
        for rfq_id in touched_rfqs {
            self.refresh_rfq(rfq_id);
        }

        let removed_lines: Vec<(PurchaseOrderItemId, PurchaseOrderId)> = self
            .order_items
            .values()
            .filter(|i| i.item_id == item_id)
            .map(|i| (i.id, i.order_id))
            .collect();
        for (line_id, order_id) in removed_lines {
            self.order_items.remove(&line_id);
            self.grn_items.retain(|_, g| g.order_item_id != line_id);
            self.refresh_order(order_id)?;
        }
        Ok(paths)
    }

    fn log(&mut self, entries: Vec<RequestLogEntry>) {
        for entry in entries {
            self.logs.insert(entry.id, entry);
        }
    }
}

/// In-memory procurement store.
#[derive(Debug, Default)]
pub struct InMemoryProcurementStore {
    state: RwLock<State>,
}

impl InMemoryProcurementStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::Database("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::Database("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl ProcurementStore for InMemoryProcurementStore {
    async fn create_office(&self, new: NewOffice, actor: Option<UserId>) -> StoreResult<Office> {
        let office = Office::create(new, actor, Utc::now())?;
        self.write()?.offices.insert(office.id, office.clone());
        info!(office_id = %office.id, "office created");
        Ok(office)
    }

    async fn list_offices(&self) -> StoreResult<Vec<Office>> {
        Ok(self.read()?.offices.values().cloned().collect())
    }

    async fn get_office(&self, id: OfficeId) -> StoreResult<Office> {
        found(&self.read()?.offices, &id, "office").cloned()
    }

    async fn create_currency(&self, new: NewCurrency, actor: Option<UserId>) -> StoreResult<Currency> {
        let currency = Currency::create(new, actor, Utc::now())?;
        let mut s = self.write()?;
        if s.currencies.values().any(|c| c.code == currency.code) {
            return Err(DomainError::conflict(format!(
                "currency '{}' already exists",
                currency.code
            ))
            .into());
        }
        s.currencies.insert(currency.id, currency.clone());
        Ok(currency)
    }

    async fn list_currencies(&self) -> StoreResult<Vec<Currency>> {
        Ok(self.read()?.currencies.values().cloned().collect())
    }

    async fn create_unit(&self, new: NewUnit, actor: Option<UserId>) -> StoreResult<Unit> {
        let unit = Unit::create(new, actor, Utc::now())?;
        let mut s = self.write()?;
        if s.units.values().any(|u| u.mnemonic == unit.mnemonic) {
            return Err(DomainError::conflict(format!("unit '{}' already exists", unit.mnemonic)).into());
        }
        s.units.insert(unit.id, unit.clone());
        Ok(unit)
    }

    async fn list_units(&self) -> StoreResult<Vec<Unit>> {
        Ok(self.read()?.units.values().cloned().collect())
    }

    async fn create_vendor(&self, new: NewVendor, actor: Option<UserId>) -> StoreResult<Vendor> {
        let vendor = Vendor::create(new, actor, Utc::now())?;
        self.write()?.vendors.insert(vendor.id, vendor.clone());
        info!(vendor_id = %vendor.id, black_listed = vendor.black_listed, "vendor created");
        Ok(vendor)
    }

    async fn list_vendors(&self) -> StoreResult<Vec<Vendor>> {
        Ok(self.read()?.vendors.values().cloned().collect())
    }

    async fn get_vendor(&self, id: VendorId) -> StoreResult<Vendor> {
        found(&self.read()?.vendors, &id, "vendor").cloned()
    }

    async fn create_code(&self, kind: CodeKind, new: NewCode, actor: Option<UserId>) -> StoreResult<Code> {
        let code = Code::create(kind, new, actor, Utc::now())?;
        let mut s = self.write()?;
        if s.codes.values().any(|c| c.kind == kind && c.code == code.code) {
            return Err(DomainError::conflict(format!("{kind} code '{}' already exists", code.code)).into());
        }
        s.codes.insert(code.id, code.clone());
        Ok(code)
    }

    async fn list_codes(&self, kind: CodeKind) -> StoreResult<Vec<Code>> {
        Ok(self
            .read()?
            .codes
            .values()
            .filter(|c| c.kind == kind)
            .cloned()
            .collect())
    }

    async fn create_request(
        &self,
        new: NewPurchaseRequest,
        actor: Option<UserId>,
    ) -> StoreResult<PurchaseRequest> {
        let refs = new.validate()?;
        let mut s = self.write()?;
        let office = s.offices.get(&refs.office_id).ok_or_else(|| unknown("office"))?.clone();
        if !s.currencies.contains_key(&refs.currency_id) {
            return Err(unknown("currency"));
        }

        let sno = next_in(
            s.requests
                .values()
                .filter(|r| r.office_id == office.id)
                .map(|r| r.sno),
        );
        let request = PurchaseRequest::draft(new, &office, sno, actor, Utc::now())?;
        s.requests.insert(request.id, request.clone());
        info!(request_id = %request.id, office_id = %office.id, sno, "purchase request created");
        Ok(request)
    }

    async fn get_request(&self, id: RequestId) -> StoreResult<PurchaseRequest> {
        found(&self.read()?.requests, &id, "purchase request").cloned()
    }

    async fn list_requests(&self, office_id: Option<OfficeId>) -> StoreResult<Vec<PurchaseRequest>> {
        let s = self.read()?;
        let mut requests: Vec<PurchaseRequest> = s
            .requests
            .values()
            .filter(|r| office_id.is_none_or(|o| r.office_id == o))
            .cloned()
            .collect();
        requests.sort_by(|a, b| a.office_id.cmp(&b.office_id).then(a.sno.cmp(&b.sno)));
        Ok(requests)
    }

    async fn update_request(
        &self,
        id: RequestId,
        patch: RequestPatch,
        actor: Option<UserId>,
    ) -> StoreResult<PurchaseRequest> {
        let now = Utc::now();
        let mut s = self.write()?;
        if let Some(currency_id) = patch.currency_id {
            if !s.currencies.contains_key(&currency_id) {
                return Err(unknown("currency"));
            }
        }

        let mut request = found(&s.requests, &id, "purchase request")?.clone();
        let before = Snapshot::capture(&request)?;
        let rate_changed = request.apply_patch(patch, actor, now)?;
        let after = Snapshot::capture(&request)?;
        let changes = before.diff_except(&after, UNTRACKED_FIELDS);

        let mut items = s.items_of(id);
        if rate_changed {
            for item in &mut items {
                item.reprice(request.exchange_rate, actor, now)?;
            }
        }

        s.log(entries_for_changes(id, &changes, actor, now));
        if rate_changed {
            for item in items {
                s.items.insert(item.id, item);
            }
        }
        s.requests.insert(id, request.clone());
        info!(request_id = %id, changed = changes.len(), rate_changed, "purchase request updated");
        Ok(request)
    }

    async fn transition_request(
        &self,
        id: RequestId,
        transition: StatusTransition,
        actor: UserId,
    ) -> StoreResult<PurchaseRequest> {
        let now = Utc::now();
        let mut s = self.write()?;
        let request = found_mut(&mut s.requests, &id, "purchase request")?;
        let notes = transition.notes.clone();
        let from = request.transition(transition, actor, now)?;
        let to = request.status;
        let updated = request.clone();
        s.log(vec![RequestLogEntry::status_change(id, from, to, notes, actor, now)]);
        info!(request_id = %id, %from, %to, "purchase request transitioned");
        Ok(updated)
    }

    async fn assign_request(
        &self,
        id: RequestId,
        assignment: Assignment,
        actor: Option<UserId>,
    ) -> StoreResult<PurchaseRequest> {
        let mut s = self.write()?;
        if let Some(office_id) = assignment.processing_office_id {
            if !s.offices.contains_key(&office_id) {
                return Err(unknown("processing office"));
            }
        }
        let request = found_mut(&mut s.requests, &id, "purchase request")?;
        request.assign(assignment, actor, Utc::now())?;
        Ok(request.clone())
    }

    async fn request_cancellation(&self, id: RequestId, actor: UserId) -> StoreResult<PurchaseRequest> {
        let mut s = self.write()?;
        let request = found_mut(&mut s.requests, &id, "purchase request")?;
        request.request_cancellation(actor, Utc::now())?;
        Ok(request.clone())
    }

    async fn delete_request(&self, id: RequestId) -> StoreResult<Removed> {
        let mut s = self.write()?;
        found(&s.requests, &id, "purchase request")?;

        let mut attachment_paths = Vec::new();
        let item_ids: Vec<ItemId> = s.items_of(id).iter().map(|i| i.id).collect();
        for item_id in item_ids {
            attachment_paths.extend(s.cascade_item(item_id)?);
        }

        let order_ids: Vec<PurchaseOrderId> = s
            .orders
            .values()
            .filter(|o| o.request_id == id)
            .map(|o| o.id)
            .collect();
        s.order_items.retain(|_, i| !order_ids.contains(&i.order_id));
        let grn_ids: Vec<GoodsReceivedNoteId> = s
            .grns
            .values()
            .filter(|g| g.request_id == id)
            .map(|g| g.id)
            .collect();
        s.grn_items.retain(|_, i| !grn_ids.contains(&i.grn_id));
        s.grns.retain(|_, g| g.request_id != id);
        s.orders.retain(|_, o| o.request_id != id);

        let rfq_ids: Vec<RfqId> = s
            .rfqs
            .values()
            .filter(|r| r.request_id == id)
            .map(|r| r.id)
            .collect();
        s.rfq_items.retain(|_, i| !rfq_ids.contains(&i.rfq_id));
        s.rfqs.retain(|_, r| r.request_id != id);

        s.logs.retain(|_, l| l.request_id != id);
        s.requests.remove(&id);
        info!(request_id = %id, files = attachment_paths.len(), "purchase request deleted");
        Ok(Removed { attachment_paths })
    }

    async fn request_log(&self, id: RequestId) -> StoreResult<Vec<RequestLogEntry>> {
        let s = self.read()?;
        found(&s.requests, &id, "purchase request")?;
        let mut entries: Vec<RequestLogEntry> = s
            .logs
            .values()
            .filter(|l| l.request_id == id)
            .cloned()
            .collect();
        entries.sort_by_key(|l| (l.changed_at, l.id));
        Ok(entries)
    }

    async fn add_log_entry(
        &self,
        id: RequestId,
        entry: NewManualLogEntry,
        actor: Option<UserId>,
    ) -> StoreResult<RequestLogEntry> {
        let mut s = self.write()?;
        found(&s.requests, &id, "purchase request")?;
        let entry = RequestLogEntry::manual(id, entry, actor, Utc::now())?;
        s.log(vec![entry.clone()]);
        Ok(entry)
    }

    async fn add_item(&self, request_id: RequestId, new: NewItem, actor: Option<UserId>) -> StoreResult<Item> {
        let mut s = self.write()?;
        let request = s.editable_request(request_id)?.clone();
        if !s.units.contains_key(&new.unit_id) {
            return Err(unknown("unit"));
        }
        let item_sno = next_in(
            s.items
                .values()
                .filter(|i| i.request_id == request_id)
                .map(|i| i.item_sno),
        );
        let item = Item::create(&request, new, item_sno, actor, Utc::now())?;
        s.items.insert(item.id, item.clone());
        info!(request_id = %request_id, item_id = %item.id, item_sno, "item added");
        Ok(item)
    }

    async fn get_item(&self, id: ItemId) -> StoreResult<Item> {
        found(&self.read()?.items, &id, "item").cloned()
    }

    async fn list_items(&self, request_id: RequestId) -> StoreResult<Vec<Item>> {
        let s = self.read()?;
        found(&s.requests, &request_id, "purchase request")?;
        Ok(s.items_of(request_id))
    }

    async fn update_item(&self, id: ItemId, patch: ItemPatch, actor: Option<UserId>) -> StoreResult<Item> {
        let mut s = self.write()?;
        let request_id = found(&s.items, &id, "item")?.request_id;
        let rate = s.editable_request(request_id)?.exchange_rate;
        if let Some(unit_id) = patch.unit_id {
            if !s.units.contains_key(&unit_id) {
                return Err(unknown("unit"));
            }
        }
        let now = Utc::now();
        let mut item = found(&s.items, &id, "item")?.clone();
        let old_quantity = item.quantity;
        item.apply_patch(patch, rate, actor, now)?;

        let mut quotes: Vec<RfqItem> = Vec::new();
        if item.quantity != old_quantity {
            quotes = s.rfq_items.values().filter(|q| q.item_id == id).cloned().collect();
            for quote in &mut quotes {
                quote.requote(&item, actor, now)?;
            }
        }
        s.items.insert(id, item.clone());
        for quote in quotes {
            s.rfq_items.insert(quote.id, quote);
        }
        Ok(item)
    }

    async fn delete_item(&self, id: ItemId) -> StoreResult<Removed> {
        let mut s = self.write()?;
        let request_id = found(&s.items, &id, "item")?.request_id;
        s.editable_request(request_id)?;
        let attachment_paths = s.cascade_item(id)?;
        info!(item_id = %id, files = attachment_paths.len(), "item deleted");
        Ok(Removed { attachment_paths })
    }

    async fn set_default_finance_item(&self, id: ItemId, actor: Option<UserId>) -> StoreResult<Item> {
        let now = Utc::now();
        let mut s = self.write()?;
        let request_id = found(&s.items, &id, "item")?.request_id;
        s.editable_request(request_id)?;
        for item in s.items.values_mut().filter(|i| i.request_id == request_id) {
            let is_template = item.id == id;
            if item.default_finance_codes != is_template {
                item.default_finance_codes = is_template;
                item.audit.touch(actor, now);
            }
        }
        found(&s.items, &id, "item").cloned()
    }

    async fn unset_default_finance_item(&self, id: ItemId, actor: Option<UserId>) -> StoreResult<Item> {
        let mut s = self.write()?;
        let request_id = found(&s.items, &id, "item")?.request_id;
        s.editable_request(request_id)?;
        let item = found_mut(&mut s.items, &id, "item")?;
        if item.default_finance_codes {
            item.default_finance_codes = false;
            item.audit.touch(actor, Utc::now());
        }
        Ok(item.clone())
    }

    async fn apply_default_finance_codes(
        &self,
        request_id: RequestId,
        actor: Option<UserId>,
    ) -> StoreResult<Vec<FinanceCodes>> {
        let now = Utc::now();
        let mut s = self.write()?;
        s.editable_request(request_id)?;
        let items = s.items_of(request_id);
        let template = items
            .iter()
            .find(|i| i.default_finance_codes)
            .ok_or_else(|| DomainError::invariant("no item is marked as the default finance codes"))?;
        let splits = s.splits_of(template.id);

        let mut copies = Vec::new();
        for target in items.iter().filter(|i| i.id != template.id) {
            s.finance_codes.retain(|_, f| f.item_id != target.id);
            for split in &splits {
                let copy = split.copy_to(target.id, actor, now);
                s.finance_codes.insert(copy.id, copy.clone());
                copies.push(copy);
            }
        }
        info!(request_id = %request_id, copies = copies.len(), "default finance codes applied");
        Ok(copies)
    }

    async fn add_finance_codes(
        &self,
        item_id: ItemId,
        new: NewFinanceCodes,
        actor: Option<UserId>,
    ) -> StoreResult<FinanceCodes> {
        let mut s = self.write()?;
        let request_id = found(&s.items, &item_id, "item")?.request_id;
        s.editable_request(request_id)?;
        s.check_finance_refs(&new)?;
        check_allocation(&s.splits_of(item_id), None, new.allocation_percent)?;
        let split = FinanceCodes::create(item_id, new, actor, Utc::now())?;
        s.finance_codes.insert(split.id, split.clone());
        Ok(split)
    }

    async fn update_finance_codes(
        &self,
        id: FinanceCodesId,
        new: NewFinanceCodes,
        actor: Option<UserId>,
    ) -> StoreResult<FinanceCodes> {
        let mut s = self.write()?;
        let mut split = found(&s.finance_codes, &id, "finance codes")?.clone();
        let request_id = found(&s.items, &split.item_id, "item")?.request_id;
        s.editable_request(request_id)?;
        s.check_finance_refs(&new)?;
        check_allocation(&s.splits_of(split.item_id), Some(id), new.allocation_percent)?;
        split.replace(new, actor, Utc::now())?;
        s.finance_codes.insert(id, split.clone());
        Ok(split)
    }

    async fn delete_finance_codes(&self, id: FinanceCodesId) -> StoreResult<()> {
        let mut s = self.write()?;
        let item_id = found(&s.finance_codes, &id, "finance codes")?.item_id;
        let request_id = found(&s.items, &item_id, "item")?.request_id;
        s.editable_request(request_id)?;
        s.finance_codes.remove(&id);
        Ok(())
    }

    async fn list_finance_codes(&self, item_id: ItemId) -> StoreResult<Vec<FinanceCodes>> {
        let s = self.read()?;
        found(&s.items, &item_id, "item")?;
        Ok(s.splits_of(item_id))
    }

    async fn allocation_total(&self, item_id: ItemId) -> StoreResult<Decimal> {
        let s = self.read()?;
        found(&s.items, &item_id, "item")?;
        Ok(epro_procurement::allocation_total(&s.splits_of(item_id)))
    }

    async fn item_location(&self, item_id: ItemId) -> StoreResult<ItemLocation> {
        let s = self.read()?;
        let item = found(&s.items, &item_id, "item")?;
        let request = found(&s.requests, &item.request_id, "purchase request")?;
        let office = found(&s.offices, &request.office_id, "office")?;
        Ok(ItemLocation {
            office_name: office.name.clone(),
            request_id: request.id,
            item_id,
        })
    }

    async fn insert_attachment(&self, attachment: ItemAttachment) -> StoreResult<ItemAttachment> {
        let mut s = self.write()?;
        found(&s.items, &attachment.item_id, "item")?;
        if s.attachments.values().any(|a| a.path == attachment.path) {
            return Err(DomainError::conflict(format!(
                "an attachment named '{}' already exists on this item",
                attachment.file_name
            ))
            .into());
        }
        s.attachments.insert(attachment.id, attachment.clone());
        Ok(attachment)
    }

    async fn list_attachments(&self, item_id: ItemId) -> StoreResult<Vec<ItemAttachment>> {
        let s = self.read()?;
        found(&s.items, &item_id, "item")?;
        Ok(s
            .attachments
            .values()
            .filter(|a| a.item_id == item_id)
            .cloned()
            .collect())
    }

    async fn delete_attachment(&self, id: AttachmentId) -> StoreResult<ItemAttachment> {
        self.write()?
            .attachments
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("attachment"))
    }

    async fn create_quotation_analysis(
        &self,
        new: NewQuotationAnalysis,
        actor: Option<UserId>,
    ) -> StoreResult<QuotationAnalysis> {
        let mut s = self.write()?;
        let vendor = s.vendor_ref(new.selected_vendor_id)?.cloned();
        let analysis = QuotationAnalysis::create(new, vendor.as_ref(), actor, Utc::now())?;
        s.analyses.insert(analysis.id, analysis.clone());
        Ok(analysis)
    }

    async fn get_quotation_analysis(&self, id: QuotationAnalysisId) -> StoreResult<QuotationAnalysis> {
        found(&self.read()?.analyses, &id, "quotation analysis").cloned()
    }

    async fn create_rfq(
        &self,
        request_id: RequestId,
        new: NewRequestForQuotation,
        actor: Option<UserId>,
    ) -> StoreResult<RequestForQuotation> {
        let mut s = self.write()?;
        let request = found(&s.requests, &request_id, "purchase request")?.clone();
        let vendor = s.vendor_ref(new.vendor_id)?.cloned();
        s.analysis_ref(new.quotation_analysis_id)?;
        let rfq = RequestForQuotation::create(&request, new, vendor.as_ref(), actor, Utc::now())?;
        s.rfqs.insert(rfq.id, rfq.clone());
        info!(request_id = %request_id, rfq_id = %rfq.id, "rfq created");
        Ok(rfq)
    }

    async fn get_rfq(&self, id: RfqId) -> StoreResult<RfqDetail> {
        let s = self.read()?;
        let rfq = found(&s.rfqs, &id, "rfq")?.clone();
        Ok(RfqDetail::new(rfq, s.rfq_items_of(id)))
    }

    async fn list_rfqs(&self, request_id: RequestId) -> StoreResult<Vec<RequestForQuotation>> {
        let s = self.read()?;
        found(&s.requests, &request_id, "purchase request")?;
        Ok(s.rfqs.values().filter(|r| r.request_id == request_id).cloned().collect())
    }

    async fn add_rfq_item(&self, rfq_id: RfqId, new: NewRfqItem, actor: Option<UserId>) -> StoreResult<RfqDetail> {
        let now = Utc::now();
        let mut s = self.write()?;
        let rfq = found(&s.rfqs, &rfq_id, "rfq")?.clone();
        s.editable_request(rfq.request_id)?;
        let item = s.items.get(&new.item_id).ok_or_else(|| unknown("item"))?.clone();
        let line = RfqItem::create(&rfq, &item, new, actor, now)?;
        s.rfq_items.insert(line.id, line);
        s.refresh_rfq(rfq_id);
        let rfq = found_mut(&mut s.rfqs, &rfq_id, "rfq")?;
        rfq.audit.touch(actor, now);
        let rfq = rfq.clone();
        Ok(RfqDetail::new(rfq, s.rfq_items_of(rfq_id)))
    }

    async fn create_order(
        &self,
        request_id: RequestId,
        new: NewPurchaseOrder,
        actor: Option<UserId>,
    ) -> StoreResult<PurchaseOrder> {
        let mut s = self.write()?;
        let request = found(&s.requests, &request_id, "purchase request")?.clone();
        let vendor = s.vendor_ref(new.vendor_id)?.cloned();
        let analysis = s.analysis_ref(new.quotation_analysis_id)?.cloned();
        let order = PurchaseOrder::create(&request, new, vendor.as_ref(), analysis.as_ref(), actor, Utc::now())?;
        s.orders.insert(order.id, order.clone());
        info!(request_id = %request_id, order_id = %order.id, "purchase order created");
        Ok(order)
    }

    async fn get_order(&self, id: PurchaseOrderId) -> StoreResult<OrderDetail> {
        let s = self.read()?;
        let order = found(&s.orders, &id, "purchase order")?.clone();
        Ok(OrderDetail {
            order,
            items: s.order_items_of(id),
        })
    }

    async fn list_orders(&self, request_id: RequestId) -> StoreResult<Vec<PurchaseOrder>> {
        let s = self.read()?;
        found(&s.requests, &request_id, "purchase request")?;
        Ok(s.orders.values().filter(|o| o.request_id == request_id).cloned().collect())
    }

    async fn add_order_item(
        &self,
        order_id: PurchaseOrderId,
        new: NewPurchaseOrderItem,
        actor: Option<UserId>,
    ) -> StoreResult<OrderDetail> {
        let now = Utc::now();
        let mut s = self.write()?;
        let order = found(&s.orders, &order_id, "purchase order")?.clone();
        let rate = s.editable_request(order.request_id)?.exchange_rate;
        let item = s.items.get(&new.item_id).ok_or_else(|| unknown("item"))?.clone();
        let line = PurchaseOrderItem::create(&order, &item, new, rate, actor, now)?;
        let line_id = line.id;
        s.order_items.insert(line_id, line);
        if let Err(err) = s.refresh_order(order_id) {
            s.order_items.remove(&line_id);
            return Err(err);
        }
        let order = found_mut(&mut s.orders, &order_id, "purchase order")?;
        order.audit.touch(actor, now);
        let order = order.clone();
        Ok(OrderDetail {
            order,
            items: s.order_items_of(order_id),
        })
    }

    async fn remove_order_item(&self, id: PurchaseOrderItemId) -> StoreResult<OrderDetail> {
        let mut s = self.write()?;
        let order_id = found(&s.order_items, &id, "purchase order item")?.order_id;
        if s.grn_items.values().any(|g| g.order_item_id == id) {
            return Err(DomainError::conflict("goods were already received against this order item").into());
        }
        s.order_items.remove(&id);
        s.refresh_order(order_id)?;
        let order = found(&s.orders, &order_id, "purchase order")?.clone();
        Ok(OrderDetail {
            order,
            items: s.order_items_of(order_id),
        })
    }

    async fn create_grn(
        &self,
        order_id: PurchaseOrderId,
        new: NewGoodsReceivedNote,
        actor: Option<UserId>,
    ) -> StoreResult<GrnDetail> {
        let mut s = self.write()?;
        let order = found(&s.orders, &order_id, "purchase order")?.clone();

        let mut order_lines = Vec::with_capacity(new.items.len());
        for line in &new.items {
            let order_item = s
                .order_items
                .get(&line.order_item_id)
                .ok_or_else(|| unknown("order item"))?
                .clone();
            let already: u32 = s
                .grn_items
                .values()
                .filter(|g| g.order_item_id == line.order_item_id)
                .map(|g| g.quantity_received)
                .sum();
            order_lines.push((order_item, already));
        }
        let lines: Vec<_> = new
            .items
            .into_iter()
            .zip(order_lines.iter())
            .map(|(line, (order_item, already))| (line, order_item, *already))
            .collect();

        let (note, items) = GoodsReceivedNote::create(&order, new.received_date, &lines, actor, Utc::now())?;
        s.grns.insert(note.id, note.clone());
        for item in &items {
            s.grn_items.insert(item.id, item.clone());
        }
        info!(order_id = %order_id, grn_id = %note.id, lines = items.len(), "goods received");
        Ok(GrnDetail { note, items })
    }

    async fn get_grn(&self, id: GoodsReceivedNoteId) -> StoreResult<GrnDetail> {
        let s = self.read()?;
        let note = found(&s.grns, &id, "goods received note")?.clone();
        let items = s.grn_items.values().filter(|i| i.grn_id == id).cloned().collect();
        Ok(GrnDetail { note, items })
    }
}
