//! Goods received notes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use epro_core::{
    AuditStamp, DomainError, DomainResult, Entity, GoodsReceivedNoteId, GoodsReceivedNoteItemId,
    OfficeId, PurchaseOrderId, PurchaseOrderItemId, RequestId, UserId,
};

use crate::order::{PurchaseOrder, PurchaseOrderItem};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceivedNote {
    pub id: GoodsReceivedNoteId,
    pub request_id: RequestId,
    pub order_id: PurchaseOrderId,
    pub country_code: String,
    pub office_id: OfficeId,
    pub received_date: Option<NaiveDate>,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceivedNoteItem {
    pub id: GoodsReceivedNoteItemId,
    pub grn_id: GoodsReceivedNoteId,
    pub order_item_id: PurchaseOrderItemId,
    pub quantity_received: u32,
    #[serde(flatten)]
    pub audit: AuditStamp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewGrnItem {
    pub order_item_id: PurchaseOrderItemId,
    pub quantity_received: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewGoodsReceivedNote {
    pub received_date: Option<NaiveDate>,
    pub items: Vec<NewGrnItem>,
}

/// Check one receipt line against its order line.
///
/// `already_received` is the quantity recorded on earlier notes for the same
/// order line.
pub fn check_receivable(
    order: &PurchaseOrder,
    order_item: &PurchaseOrderItem,
    already_received: u32,
    quantity: u32,
) -> DomainResult<()> {
    if order_item.order_id != order.id {
        return Err(DomainError::validation(
            "order item does not belong to the purchase order",
        ));
    }
    if quantity == 0 {
        return Err(DomainError::validation("quantity received must be greater than zero"));
    }
    let total = already_received.saturating_add(quantity);
    if total > order_item.quantity_ordered {
        return Err(DomainError::validation(format!(
            "cannot receive {quantity}: {already_received} of {} already received",
            order_item.quantity_ordered
        )));
    }
    Ok(())
}

impl GoodsReceivedNote {
    /// Build a note and its lines.
    ///
    /// `lines` pairs each requested line with its order line and the quantity
    /// already received on it. Lines for the same order item within one note
    /// are accumulated before checking.
    pub fn create(
        order: &PurchaseOrder,
        received_date: Option<NaiveDate>,
        lines: &[(NewGrnItem, &PurchaseOrderItem, u32)],
        actor: Option<UserId>,
        now: DateTime<Utc>,
    ) -> DomainResult<(Self, Vec<GoodsReceivedNoteItem>)> {
        if lines.is_empty() {
            return Err(DomainError::validation("a goods received note needs at least one item"));
        }
        let note = Self {
            id: GoodsReceivedNoteId::new(),
            request_id: order.request_id,
            order_id: order.id,
            country_code: order.country_code.clone(),
            office_id: order.office_id,
            received_date,
            audit: AuditStamp::created(actor, now),
        };

        let mut items: Vec<GoodsReceivedNoteItem> = Vec::with_capacity(lines.len());
        for (new, order_item, already_received) in lines {
            if new.order_item_id != order_item.id {
                return Err(DomainError::invariant("order item does not match receipt line"));
            }
            let in_this_note: u32 = items
                .iter()
                .filter(|i| i.order_item_id == order_item.id)
                .map(|i| i.quantity_received)
                .sum();
            check_receivable(
                order,
                order_item,
                already_received.saturating_add(in_this_note),
                new.quantity_received,
            )?;
            items.push(GoodsReceivedNoteItem {
                id: GoodsReceivedNoteItemId::new(),
                grn_id: note.id,
                order_item_id: order_item.id,
                quantity_received: new.quantity_received,
                audit: AuditStamp::created(actor, now),
            });
        }
        Ok((note, items))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GrnDetail {
    #[serde(flatten)]
    pub note: GoodsReceivedNote,
    pub items: Vec<GoodsReceivedNoteItem>,
}

impl Entity for GoodsReceivedNote {
    type Id = GoodsReceivedNoteId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

impl Entity for GoodsReceivedNoteItem {
    type Id = GoodsReceivedNoteItemId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epro_core::{CurrencyId, ItemId};
    use rust_decimal::Decimal;

    fn order() -> PurchaseOrder {
        PurchaseOrder {
            id: PurchaseOrderId::new(),
            request_id: RequestId::new(),
            country_code: "AF".to_string(),
            office_id: OfficeId::new(),
            currency_id: Some(CurrencyId::new()),
            po_issued_date: None,
            vendor_id: None,
            expected_delivery_date: None,
            notes: String::new(),
            total_local: Decimal::ZERO,
            total_usd: Decimal::ZERO,
            quotation_analysis_id: None,
            audit: AuditStamp::created(None, Utc::now()),
        }
    }

    fn order_item(order: &PurchaseOrder, quantity_ordered: u32) -> PurchaseOrderItem {
        PurchaseOrderItem {
            id: PurchaseOrderItemId::new(),
            order_id: order.id,
            item_id: ItemId::new(),
            quantity_ordered,
            price_local: Decimal::ONE,
            price_usd: Decimal::ONE,
            subtotal_local: Decimal::ONE,
            subtotal_usd: Decimal::ONE,
            audit: AuditStamp::created(None, Utc::now()),
        }
    }

    #[test]
    fn receipts_cannot_exceed_ordered_quantity() {
        let po = order();
        let line = order_item(&po, 10);
        assert!(check_receivable(&po, &line, 6, 4).is_ok());
        let err = check_receivable(&po, &line, 6, 5).unwrap_err();
        assert_eq!(
            err,
            DomainError::validation("cannot receive 5: 6 of 10 already received")
        );
    }

    #[test]
    fn order_item_from_another_order_is_rejected() {
        let po = order();
        let other = order();
        let line = order_item(&other, 10);
        assert!(matches!(
            check_receivable(&po, &line, 0, 1),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn repeated_lines_in_one_note_are_accumulated() {
        let po = order();
        let line = order_item(&po, 5);
        let new = |q| NewGrnItem {
            order_item_id: line.id,
            quantity_received: q,
        };
        let ok = GoodsReceivedNote::create(&po, None, &[(new(2), &line, 0), (new(3), &line, 0)], None, Utc::now());
        let (note, items) = ok.unwrap();
        assert_eq!(note.order_id, po.id);
        assert_eq!(items.len(), 2);

        let over = GoodsReceivedNote::create(&po, None, &[(new(3), &line, 0), (new(3), &line, 0)], None, Utc::now());
        assert!(over.is_err());
    }

    #[test]
    fn empty_note_is_rejected() {
        let po = order();
        assert!(GoodsReceivedNote::create(&po, None, &[], None, Utc::now()).is_err());
    }
}
