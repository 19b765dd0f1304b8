//! Vendor quotations (RFQs) and quotation analyses.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use epro_core::money::{check_amount, line_total};
use epro_core::{
    AuditStamp, DomainError, DomainResult, Entity, ItemId, QuotationAnalysisId, RequestId,
    RfqId, RfqItemId, UserId, VendorId,
};

use crate::item::Item;
use crate::reference::Vendor;
use crate::request::PurchaseRequest;

/// Comparison of the quotations received for a request, naming the winner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotationAnalysis {
    pub id: QuotationAnalysisId,
    pub analysis_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub selected_vendor_id: Option<VendorId>,
    pub justification: Option<String>,
    pub notes: Option<String>,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewQuotationAnalysis {
    pub analysis_date: Option<NaiveDate>,
    pub delivery_date: Option<NaiveDate>,
    pub selected_vendor_id: Option<VendorId>,
    pub justification: Option<String>,
    pub notes: Option<String>,
}

impl QuotationAnalysis {
    /// `selected_vendor` must be the vendor named by `new.selected_vendor_id`.
    pub fn create(
        new: NewQuotationAnalysis,
        selected_vendor: Option<&Vendor>,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if selected_vendor.map(|v| v.id) != new.selected_vendor_id {
            return Err(DomainError::invariant("selected vendor does not match analysis"));
        }
        if let Some(vendor) = selected_vendor {
            vendor.ensure_selectable()?;
        }
        Ok(Self {
            id: QuotationAnalysisId::new(),
            analysis_date: new.analysis_date,
            delivery_date: new.delivery_date,
            selected_vendor_id: new.selected_vendor_id,
            justification: new.justification,
            notes: new.notes,
            audit: AuditStamp::created(actor, now),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestForQuotation {
    pub id: RfqId,
    pub request_id: RequestId,
    pub vendor_id: Option<VendorId>,
    pub date_submitted_to_vendor: Option<NaiveDate>,
    pub date_received_from_vendor: Option<NaiveDate>,
    pub insurance: Decimal,
    pub shipping_and_handling: Decimal,
    pub vat: Decimal,
    pub meets_specs: bool,
    pub meets_compliance: bool,
    /// Latest delivery date quoted across the RFQ's items.
    pub complete_order_delivery_date: Option<NaiveDate>,
    pub complete_order_payment_terms: Option<String>,
    pub notes: Option<String>,
    pub quotation_analysis_id: Option<QuotationAnalysisId>,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRequestForQuotation {
    pub vendor_id: Option<VendorId>,
    pub date_submitted_to_vendor: Option<NaiveDate>,
    pub date_received_from_vendor: Option<NaiveDate>,
    #[serde(default)]
    pub insurance: Decimal,
    #[serde(default)]
    pub shipping_and_handling: Decimal,
    #[serde(default)]
    pub vat: Decimal,
    #[serde(default)]
    pub meets_specs: bool,
    #[serde(default)]
    pub meets_compliance: bool,
    pub complete_order_payment_terms: Option<String>,
    pub notes: Option<String>,
    pub quotation_analysis_id: Option<QuotationAnalysisId>,
}

impl RequestForQuotation {
    /// `vendor` must be the vendor named by `new.vendor_id`.
    pub fn create(
        request: &PurchaseRequest,
        new: NewRequestForQuotation,
        vendor: Option<&Vendor>,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        request.ensure_editable()?;
        if vendor.map(|v| v.id) != new.vendor_id {
            return Err(DomainError::invariant("vendor does not match quotation"));
        }
        if let Some(vendor) = vendor {
            vendor.ensure_selectable()?;
        }
        let insurance = check_amount("insurance", new.insurance)?;
        let shipping_and_handling = check_amount("shipping and handling", new.shipping_and_handling)?;
        let vat = check_amount("vat", new.vat)?;

        Ok(Self {
            id: RfqId::new(),
            request_id: request.id,
            vendor_id: new.vendor_id,
            date_submitted_to_vendor: new.date_submitted_to_vendor,
            date_received_from_vendor: new.date_received_from_vendor,
            insurance,
            shipping_and_handling,
            vat,
            meets_specs: new.meets_specs,
            meets_compliance: new.meets_compliance,
            complete_order_delivery_date: None,
            complete_order_payment_terms: new.complete_order_payment_terms,
            notes: new.notes,
            quotation_analysis_id: new.quotation_analysis_id,
            audit: AuditStamp::created(actor, now),
        })
    }

    /// Refresh derived fields from the RFQ's current items.
    pub fn recompute(&mut self, items: &[RfqItem]) {
        self.complete_order_delivery_date = items.iter().filter_map(|i| i.delivery_date).max();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfqItem {
    pub id: RfqItemId,
    pub rfq_id: RfqId,
    pub item_id: ItemId,
    pub quoted_price_local: Decimal,
    pub quoted_subtotal_local: Decimal,
    pub payment_terms: Option<String>,
    pub delivery_date: Option<NaiveDate>,
    pub warranty: Option<String>,
    pub validity_of_offer: Option<String>,
    pub origin_of_goods: Option<String>,
    pub remarks: Option<String>,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRfqItem {
    pub item_id: ItemId,
    pub quoted_price_local: Decimal,
    pub payment_terms: Option<String>,
    pub delivery_date: Option<NaiveDate>,
    pub warranty: Option<String>,
    pub validity_of_offer: Option<String>,
    pub origin_of_goods: Option<String>,
    pub remarks: Option<String>,
}

impl RfqItem {
    /// Quote a request item. The item must belong to the RFQ's request.
    pub fn create(
        rfq: &RequestForQuotation,
        item: &Item,
        new: NewRfqItem,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if item.id != new.item_id {
            return Err(DomainError::invariant("item does not match quotation line"));
        }
        if item.request_id != rfq.request_id {
            return Err(DomainError::validation(
                "item does not belong to the quotation's purchase request",
            ));
        }
        let price = check_amount("quoted price", new.quoted_price_local)?;

        Ok(Self {
            id: RfqItemId::new(),
            rfq_id: rfq.id,
            item_id: item.id,
            quoted_price_local: price,
            quoted_subtotal_local: line_total(price, item.quantity)?,
            payment_terms: new.payment_terms,
            delivery_date: new.delivery_date,
            warranty: new.warranty,
            validity_of_offer: new.validity_of_offer,
            origin_of_goods: new.origin_of_goods,
            remarks: new.remarks,
            audit: AuditStamp::created(actor, now),
        })
    }

    /// Recompute the quoted subtotal after the quoted item's quantity changed.
    pub fn requote(
        &mut self,
        item: &Item,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if item.id != self.item_id {
            return Err(DomainError::invariant("item does not match quotation line"));
        }
        self.quoted_subtotal_local = line_total(self.quoted_price_local, item.quantity)?;
        self.audit.touch(actor, now);
        Ok(())
    }
}

/// Sum of the quoted item subtotals.
pub fn quoted_total(items: &[RfqItem]) -> Decimal {
    items.iter().map(|i| i.quoted_subtotal_local).sum()
}

/// An RFQ with its items, as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct RfqDetail {
    #[serde(flatten)]
    pub rfq: RequestForQuotation,
    pub items: Vec<RfqItem>,
    pub quoted_total: Decimal,
}

impl RfqDetail {
    pub fn new(rfq: RequestForQuotation, items: Vec<RfqItem>) -> Self {
        let quoted_total = quoted_total(&items);
        Self {
            rfq,
            items,
            quoted_total,
        }
    }
}

impl Entity for QuotationAnalysis {
    type Id = QuotationAnalysisId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

impl Entity for RequestForQuotation {
    type Id = RfqId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

impl Entity for RfqItem {
    type Id = RfqItemId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::NewItem;
    use crate::reference::{NewOffice, NewVendor, Office};
    use crate::request::{NewPurchaseRequest, PrType};
    use epro_core::{CurrencyId, UnitId};
    use rust_decimal_macros::dec;

    fn request() -> PurchaseRequest {
        let office = Office::create(
            NewOffice {
                name: "Mazar".to_string(),
                country_code: "AF".to_string(),
            },
            None,
            Utc::now(),
        )
        .unwrap();
        let new = NewPurchaseRequest {
            office_id: Some(office.id),
            currency_id: Some(CurrencyId::new()),
            exchange_rate: dec!(2.00),
            delivery_address: "Depot".to_string(),
            project_reference: "Shelter".to_string(),
            required_date: NaiveDate::from_ymd_opt(2026, 12, 15).unwrap(),
            originator: Some(UserId::new()),
            approver1: Some(UserId::new()),
            approver2: None,
            pr_type: PrType::Goods,
            expense_type: None,
            notes: None,
            preferred_supplier: false,
        };
        PurchaseRequest::draft(new, &office, 1, None, Utc::now()).unwrap()
    }

    fn item(pr: &PurchaseRequest, quantity: u32) -> Item {
        Item::create(
            pr,
            NewItem {
                quantity,
                unit_id: UnitId::new(),
                description_pr: "Tarpaulin".to_string(),
                description_po: None,
                unit_price_local: dec!(12.00),
            },
            1,
            None,
            Utc::now(),
        )
        .unwrap()
    }

    fn vendor(black_listed: bool) -> Vendor {
        Vendor::create(
            NewVendor {
                country_code: None,
                name: "Acme".to_string(),
                description: None,
                contact_person: None,
                address: None,
                phone: None,
                email: None,
                black_listed,
                reason_black_listed: black_listed.then(|| "fraud".to_string()),
                black_listed_date: None,
            },
            None,
            Utc::now(),
        )
        .unwrap()
    }

    fn quote(item_id: ItemId, price: Decimal, delivery: Option<NaiveDate>) -> NewRfqItem {
        NewRfqItem {
            item_id,
            quoted_price_local: price,
            payment_terms: None,
            delivery_date: delivery,
            warranty: None,
            validity_of_offer: None,
            origin_of_goods: None,
            remarks: None,
        }
    }

    #[test]
    fn complete_delivery_date_is_latest_item_date() {
        let pr = request();
        let it = item(&pr, 2);
        let mut rfq =
            RequestForQuotation::create(&pr, NewRequestForQuotation::default(), None, None, Utc::now())
                .unwrap();
        let d1 = NaiveDate::from_ymd_opt(2026, 11, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2026, 11, 20).unwrap();
        let items = vec![
            RfqItem::create(&rfq, &it, quote(it.id, dec!(10), Some(d2)), None, Utc::now()).unwrap(),
            RfqItem::create(&rfq, &it, quote(it.id, dec!(11), Some(d1)), None, Utc::now()).unwrap(),
            RfqItem::create(&rfq, &it, quote(it.id, dec!(12), None), None, Utc::now()).unwrap(),
        ];
        rfq.recompute(&items);
        assert_eq!(rfq.complete_order_delivery_date, Some(d2));

        rfq.recompute(&[]);
        assert_eq!(rfq.complete_order_delivery_date, None);
    }

    #[test]
    fn quoted_subtotal_uses_item_quantity() {
        let pr = request();
        let it = item(&pr, 3);
        let rfq =
            RequestForQuotation::create(&pr, NewRequestForQuotation::default(), None, None, Utc::now())
                .unwrap();
        let line = RfqItem::create(&rfq, &it, quote(it.id, dec!(9.99), None), None, Utc::now()).unwrap();
        assert_eq!(line.quoted_subtotal_local, dec!(29.97));
        assert_eq!(RfqDetail::new(rfq, vec![line]).quoted_total, dec!(29.97));
    }

    #[test]
    fn requote_follows_item_quantity() {
        let pr = request();
        let mut it = item(&pr, 3);
        let rfq =
            RequestForQuotation::create(&pr, NewRequestForQuotation::default(), None, None, Utc::now())
                .unwrap();
        let mut line =
            RfqItem::create(&rfq, &it, quote(it.id, dec!(9.00), None), None, Utc::now()).unwrap();
        assert_eq!(line.quoted_subtotal_local, dec!(27.00));

        it.quantity = 5;
        line.requote(&it, None, Utc::now()).unwrap();
        assert_eq!(line.quoted_subtotal_local, dec!(45.00));

        let other = item(&pr, 1);
        assert!(line.requote(&other, None, Utc::now()).is_err());
    }

    #[test]
    fn sub_cent_quotes_and_charges_are_rejected() {
        let pr = request();
        let it = item(&pr, 1);
        let rfq =
            RequestForQuotation::create(&pr, NewRequestForQuotation::default(), None, None, Utc::now())
                .unwrap();
        let err = RfqItem::create(&rfq, &it, quote(it.id, dec!(1.005), None), None, Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::validation("quoted price cannot have more than two decimal places")
        );
        let huge = quote(it.id, Decimal::MAX, None);
        assert!(RfqItem::create(&rfq, &it, huge, None, Utc::now()).is_err());

        let new = NewRequestForQuotation {
            insurance: dec!(0.001),
            ..NewRequestForQuotation::default()
        };
        assert!(RequestForQuotation::create(&pr, new, None, None, Utc::now()).is_err());
    }

    #[test]
    fn blacklisted_vendor_cannot_be_quoted_or_selected() {
        let pr = request();
        let bad = vendor(true);
        let new = NewRequestForQuotation {
            vendor_id: Some(bad.id),
            ..NewRequestForQuotation::default()
        };
        assert!(RequestForQuotation::create(&pr, new, Some(&bad), None, Utc::now()).is_err());

        let analysis = NewQuotationAnalysis {
            selected_vendor_id: Some(bad.id),
            ..NewQuotationAnalysis::default()
        };
        assert!(QuotationAnalysis::create(analysis, Some(&bad), None, Utc::now()).is_err());
    }

    #[test]
    fn negative_charges_are_rejected() {
        let pr = request();
        let new = NewRequestForQuotation {
            vat: dec!(-1),
            ..NewRequestForQuotation::default()
        };
        let err = RequestForQuotation::create(&pr, new, None, None, Utc::now()).unwrap_err();
        assert_eq!(err, DomainError::validation("vat cannot be negative"));
    }

    #[test]
    fn item_from_another_request_is_rejected() {
        let pr = request();
        let other = request();
        let foreign = item(&other, 1);
        let rfq =
            RequestForQuotation::create(&pr, NewRequestForQuotation::default(), None, None, Utc::now())
                .unwrap();
        assert!(matches!(
            RfqItem::create(&rfq, &foreign, quote(foreign.id, dec!(1), None), None, Utc::now()),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn selectable_vendor_is_accepted() {
        let good = vendor(false);
        let analysis = QuotationAnalysis::create(
            NewQuotationAnalysis {
                selected_vendor_id: Some(good.id),
                ..NewQuotationAnalysis::default()
            },
            Some(&good),
            None,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(analysis.selected_vendor_id, Some(good.id));
    }
}
