//! Line pricing in local and reference (USD) currency.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use epro_core::money::{check_amount, line_total, to_reference};
use epro_core::DomainResult;

/// Derived prices of one line (item, ordered item).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinePricing {
    pub unit_price_local: Decimal,
    pub unit_price_reference: Decimal,
    pub local_subtotal: Decimal,
    pub reference_subtotal: Decimal,
}

/// Price a line.
///
/// The reference subtotal is computed from the *rounded* reference unit
/// price, so it always equals `unit_price_reference * quantity` exactly.
pub fn price_line(
    quantity: u32,
    unit_price_local: Decimal,
    exchange_rate: Decimal,
) -> DomainResult<LinePricing> {
    let unit_price_local = check_amount("unit price", unit_price_local)?;
    let unit_price_reference = to_reference(unit_price_local, exchange_rate)?;
    Ok(LinePricing {
        unit_price_local,
        unit_price_reference,
        local_subtotal: line_total(unit_price_local, quantity)?,
        reference_subtotal: line_total(unit_price_reference, quantity)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use epro_core::money::round_money;
    use epro_core::DomainError;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn prices_ten_times_three_at_rate_two() {
        let p = price_line(3, dec!(10.00), dec!(2.00)).unwrap();
        assert_eq!(p.local_subtotal, dec!(30.00));
        assert_eq!(p.unit_price_reference, dec!(5.00));
        assert_eq!(p.reference_subtotal, dec!(15.00));
    }

    #[test]
    fn reference_subtotal_uses_rounded_unit_price() {
        // 10 / 3 = 3.333.. -> 3.33; 3.33 * 3 = 9.99 (not 10.00)
        let p = price_line(3, dec!(10.00), dec!(3.00)).unwrap();
        assert_eq!(p.unit_price_reference, dec!(3.33));
        assert_eq!(p.reference_subtotal, dec!(9.99));
        assert_eq!(p.local_subtotal, dec!(30.00));
    }

    #[test]
    fn negative_price_is_rejected() {
        let err = price_line(1, dec!(-1), dec!(1)).unwrap_err();
        assert_eq!(err, DomainError::validation("unit price cannot be negative"));
    }

    #[test]
    fn sub_cent_price_is_rejected() {
        let err = price_line(3, dec!(1.005), dec!(1.00)).unwrap_err();
        assert_eq!(
            err,
            DomainError::validation("unit price cannot have more than two decimal places")
        );
    }

    #[test]
    fn huge_price_is_an_error_not_a_panic() {
        assert!(price_line(2, Decimal::MAX, dec!(1.00)).is_err());
        assert!(price_line(100_000, dec!(999999999.99), dec!(1.00)).is_err());
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(price_line(1, dec!(1), Decimal::ZERO).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        #[test]
        fn subtotals_match_their_definitions(
            price_cents in 0i64..100_000_000i64,
            quantity in 1u32..10_000u32,
            rate_cents in 1i64..10_000_000i64,
        ) {
            let price = Decimal::new(price_cents, 2);
            let rate = Decimal::new(rate_cents, 2);
            let p = price_line(quantity, price, rate).unwrap();
            let qty = Decimal::from(quantity);

            prop_assert_eq!(p.local_subtotal, round_money(price * qty));
            prop_assert_eq!(
                p.reference_subtotal,
                round_money(round_money(price / rate) * qty)
            );
        }
    }
}
