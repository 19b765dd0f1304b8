//! Requested line items.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use epro_core::{AuditStamp, DomainError, DomainResult, Entity, ItemId, RequestId, UnitId, UserId};

use crate::pricing::{LinePricing, price_line};
use crate::request::PurchaseRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub request_id: RequestId,
    /// Per-request serial number, assigned once at creation.
    pub item_sno: u32,
    pub quantity: u32,
    pub unit_id: UnitId,
    pub description_pr: String,
    /// Description as rewritten by the processing office.
    pub description_po: Option<String>,
    pub unit_price_local: Decimal,
    pub unit_price_usd: Decimal,
    pub subtotal_local: Decimal,
    pub subtotal_usd: Decimal,
    pub default_finance_codes: bool,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewItem {
    pub quantity: u32,
    pub unit_id: UnitId,
    pub description_pr: String,
    pub description_po: Option<String>,
    pub unit_price_local: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemPatch {
    pub quantity: Option<u32>,
    pub unit_id: Option<UnitId>,
    pub description_pr: Option<String>,
    pub description_po: Option<String>,
    pub unit_price_local: Option<Decimal>,
}

fn check_quantity(quantity: u32) -> DomainResult<u32> {
    if quantity == 0 {
        return Err(DomainError::validation("quantity must be greater than zero"));
    }
    Ok(quantity)
}

fn check_description(value: &str) -> DomainResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DomainError::validation("item description is required"));
    }
    Ok(value.to_string())
}

impl Item {
    pub fn create(
        request: &PurchaseRequest,
        new: NewItem,
        item_sno: u32,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        request.ensure_editable()?;
        if item_sno == 0 {
            return Err(DomainError::invariant("sequence numbers start at 1"));
        }
        let mut item = Self {
            id: ItemId::new(),
            request_id: request.id,
            item_sno,
            quantity: check_quantity(new.quantity)?,
            unit_id: new.unit_id,
            description_pr: check_description(&new.description_pr)?,
            description_po: new.description_po.filter(|d| !d.trim().is_empty()),
            unit_price_local: new.unit_price_local,
            unit_price_usd: Decimal::ZERO,
            subtotal_local: Decimal::ZERO,
            subtotal_usd: Decimal::ZERO,
            default_finance_codes: false,
            audit: AuditStamp::created(actor, now),
        };
        item.recompute(request.exchange_rate)?;
        Ok(item)
    }

    pub fn apply_patch(
        &mut self,
        patch: ItemPatch,
        exchange_rate: Decimal,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if let Some(quantity) = patch.quantity {
            self.quantity = check_quantity(quantity)?;
        }
        if let Some(unit_id) = patch.unit_id {
            self.unit_id = unit_id;
        }
        if let Some(description) = patch.description_pr {
            self.description_pr = check_description(&description)?;
        }
        if let Some(description) = patch.description_po {
            self.description_po = Some(description);
        }
        if let Some(price) = patch.unit_price_local {
            self.unit_price_local = price;
        }
        self.recompute(exchange_rate)?;
        self.audit.touch(actor, now);
        Ok(())
    }

    /// Recompute prices after the parent request's exchange rate changed.
    pub fn reprice(
        &mut self,
        exchange_rate: Decimal,
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        self.recompute(exchange_rate)?;
        self.audit.touch(actor, now);
        Ok(())
    }

    fn recompute(&mut self, exchange_rate: Decimal) -> DomainResult<()> {
        if self.description_po.is_none() {
            self.description_po = Some(self.description_pr.clone());
        }
        let LinePricing {
            unit_price_local,
            unit_price_reference,
            local_subtotal,
            reference_subtotal,
        } = price_line(self.quantity, self.unit_price_local, exchange_rate)?;
        self.unit_price_local = unit_price_local;
        self.unit_price_usd = unit_price_reference;
        self.subtotal_local = local_subtotal;
        self.subtotal_usd = reference_subtotal;
        Ok(())
    }
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{NewOffice, Office};
    use crate::request::{NewPurchaseRequest, PrType};
    use chrono::NaiveDate;
    use epro_core::CurrencyId;
    use rust_decimal_macros::dec;

    fn request(rate: Decimal) -> PurchaseRequest {
        let office = Office::create(
            NewOffice {
                name: "Herat".to_string(),
                country_code: "AF".to_string(),
            },
            None,
            Utc::now(),
        )
        .unwrap();
        let new = NewPurchaseRequest {
            office_id: Some(office.id),
            currency_id: Some(CurrencyId::new()),
            exchange_rate: rate,
            delivery_address: "Depot".to_string(),
            project_reference: "WASH".to_string(),
            required_date: NaiveDate::from_ymd_opt(2026, 11, 30).unwrap(),
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

    fn new_item(quantity: u32, price: Decimal) -> NewItem {
        NewItem {
            quantity,
            unit_id: UnitId::new(),
            description_pr: "Blanket".to_string(),
            description_po: None,
            unit_price_local: price,
        }
    }

    #[test]
    fn create_prices_the_line_and_copies_description() {
        let pr = request(dec!(2.00));
        let item = Item::create(&pr, new_item(3, dec!(10.00)), 1, None, Utc::now()).unwrap();
        assert_eq!(item.subtotal_local, dec!(30.00));
        assert_eq!(item.unit_price_usd, dec!(5.00));
        assert_eq!(item.subtotal_usd, dec!(15.00));
        assert_eq!(item.description_po.as_deref(), Some("Blanket"));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let pr = request(dec!(2.00));
        let err = Item::create(&pr, new_item(0, dec!(10.00)), 1, None, Utc::now()).unwrap_err();
        assert_eq!(err, DomainError::validation("quantity must be greater than zero"));
    }

    #[test]
    fn negative_price_is_rejected() {
        let pr = request(dec!(2.00));
        assert!(Item::create(&pr, new_item(1, dec!(-5)), 1, None, Utc::now()).is_err());
    }

    #[test]
    fn sub_cent_price_is_rejected() {
        let pr = request(dec!(2.00));
        let err = Item::create(&pr, new_item(3, dec!(1.005)), 1, None, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            DomainError::validation("unit price cannot have more than two decimal places")
        );
    }

    #[test]
    fn overflowing_price_is_rejected() {
        let pr = request(dec!(2.00));
        let err = Item::create(&pr, new_item(2, Decimal::MAX), 1, None, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn patch_recomputes_subtotals() {
        let pr = request(dec!(2.00));
        let mut item = Item::create(&pr, new_item(3, dec!(10.00)), 1, None, Utc::now()).unwrap();
        item.apply_patch(
            ItemPatch {
                quantity: Some(4),
                ..ItemPatch::default()
            },
            pr.exchange_rate,
            None,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(item.subtotal_local, dec!(40.00));
        assert_eq!(item.subtotal_usd, dec!(20.00));
    }

    #[test]
    fn reprice_follows_new_exchange_rate() {
        let pr = request(dec!(2.00));
        let mut item = Item::create(&pr, new_item(3, dec!(10.00)), 1, None, Utc::now()).unwrap();
        item.reprice(dec!(3.00), None, Utc::now()).unwrap();
        assert_eq!(item.unit_price_usd, dec!(3.33));
        assert_eq!(item.subtotal_usd, dec!(9.99));
        assert_eq!(item.subtotal_local, dec!(30.00));
    }

    #[test]
    fn explicit_processing_description_is_kept() {
        let pr = request(dec!(2.00));
        let mut new = new_item(1, dec!(1));
        new.description_po = Some("Wool blanket, 2x1.5m".to_string());
        let item = Item::create(&pr, new, 1, None, Utc::now()).unwrap();
        assert_eq!(item.description_po.as_deref(), Some("Wool blanket, 2x1.5m"));
    }
}
