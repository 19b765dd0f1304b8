//! Purchase orders and their ordered lines.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use epro_core::{
    AuditStamp, CurrencyId, DomainError, DomainResult, Entity, ItemId, OfficeId, PurchaseOrderId,
    PurchaseOrderItemId, QuotationAnalysisId, RequestId, UserId, VendorId,
};

use epro_core::money::sum_amounts;

use crate::item::Item;
use crate::pricing::price_line;
use crate::quotation::QuotationAnalysis;
use crate::reference::Vendor;
use crate::request::PurchaseRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: PurchaseOrderId,
    pub request_id: RequestId,
    pub country_code: String,
    pub office_id: OfficeId,
    pub currency_id: Option<CurrencyId>,
    pub po_issued_date: Option<NaiveDate>,
    pub vendor_id: Option<VendorId>,
    pub expected_delivery_date: Option<NaiveDate>,
    pub notes: String,
    pub total_local: Decimal,
    pub total_usd: Decimal,
    pub quotation_analysis_id: Option<QuotationAnalysisId>,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPurchaseOrder {
    pub po_issued_date: Option<NaiveDate>,
    pub vendor_id: Option<VendorId>,
    pub expected_delivery_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: String,
    pub quotation_analysis_id: Option<QuotationAnalysisId>,
}

impl PurchaseOrder {
    /// Open an order for a request. `vendor` and `analysis` must be the
    /// records named by `new`.
    pub fn create(
        request: &PurchaseRequest,
        new: NewPurchaseOrder,
        vendor: Option<&Vendor>,
        analysis: Option<&QuotationAnalysis>,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        request.ensure_editable()?;
        if vendor.map(|v| v.id) != new.vendor_id {
            return Err(DomainError::invariant("vendor does not match order"));
        }
        if analysis.map(|a| a.id) != new.quotation_analysis_id {
            return Err(DomainError::invariant("quotation analysis does not match order"));
        }
        if let Some(vendor) = vendor {
            vendor.ensure_selectable()?;
        }

        let mut order = Self {
            id: PurchaseOrderId::new(),
            request_id: request.id,
            country_code: request.country_code.clone(),
            office_id: request.office_id,
            currency_id: Some(request.currency_id),
            po_issued_date: new.po_issued_date,
            vendor_id: new.vendor_id,
            expected_delivery_date: new.expected_delivery_date,
            notes: new.notes,
            total_local: Decimal::ZERO,
            total_usd: Decimal::ZERO,
            quotation_analysis_id: new.quotation_analysis_id,
            audit: AuditStamp::created(actor, now),
        };
        order.recompute(&[], analysis)?;
        Ok(order)
    }

    /// Refresh totals from the order's items and, when an analysis is linked,
    /// take the selected vendor and delivery date from it.
    pub fn recompute(
        &mut self,
        items: &[PurchaseOrderItem],
        analysis: Option<&QuotationAnalysis>,
    ) -> DomainResult<()> {
        self.total_local = sum_amounts("order total", items.iter().map(|i| i.subtotal_local))?;
        self.total_usd = sum_amounts("order total (USD)", items.iter().map(|i| i.subtotal_usd))?;
        if let Some(analysis) = analysis {
            self.vendor_id = analysis.selected_vendor_id;
            self.expected_delivery_date = analysis.delivery_date;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderItem {
    pub id: PurchaseOrderItemId,
    pub order_id: PurchaseOrderId,
    pub item_id: ItemId,
    pub quantity_ordered: u32,
    pub price_local: Decimal,
    pub price_usd: Decimal,
    pub subtotal_local: Decimal,
    pub subtotal_usd: Decimal,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPurchaseOrderItem {
    pub item_id: ItemId,
    pub quantity_ordered: u32,
    /// Defaults to the request item's unit price.
    pub price_local: Option<Decimal>,
}

impl PurchaseOrderItem {
    pub fn create(
        order: &PurchaseOrder,
        item: &Item,
        new: NewPurchaseOrderItem,
        exchange_rate: Decimal,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if item.id != new.item_id {
            return Err(DomainError::invariant("item does not match order line"));
        }
        if item.request_id != order.request_id {
            return Err(DomainError::validation(
                "item does not belong to the order's purchase request",
            ));
        }
        if new.quantity_ordered == 0 {
            return Err(DomainError::validation("quantity ordered must be greater than zero"));
        }
        let pricing = price_line(
            new.quantity_ordered,
            new.price_local.unwrap_or(item.unit_price_local),
            exchange_rate,
        )?;

        Ok(Self {
            id: PurchaseOrderItemId::new(),
            order_id: order.id,
            item_id: item.id,
            quantity_ordered: new.quantity_ordered,
            price_local: pricing.unit_price_local,
            price_usd: pricing.unit_price_reference,
            subtotal_local: pricing.local_subtotal,
            subtotal_usd: pricing.reference_subtotal,
            audit: AuditStamp::created(actor, now),
        })
    }
}

/// An order with its lines, as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: PurchaseOrder,
    pub items: Vec<PurchaseOrderItem>,
}

impl Entity for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

impl Entity for PurchaseOrderItem {
    type Id = PurchaseOrderItemId;

    fn id(&self) -> Self::Id {
        self.id
    }
}
