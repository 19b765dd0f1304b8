//! Monetary arithmetic helpers.
//!
//! All stored amounts carry two decimal places. Rounding is half away from
//! zero, so `2.345` becomes `2.35` and `-2.345` becomes `-2.35`. Banker's
//! rounding (half to even) is intentionally not used.
//!
//! Arithmetic is checked: an amount outside `0..=MAX_AMOUNT` is a validation
//! error, never a panic.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{DomainError, DomainResult};

/// Decimal places kept on every stored amount.
pub const MONEY_DP: u32 = 2;

/// Largest storable amount, `999_999_999_999.99` (`NUMERIC(14,2)`).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0x107A_3FFF, 0x5AF3, 0, false, MONEY_DP);

/// Round an amount to [`MONEY_DP`] places.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero)
}

fn within_bounds(field: &str, value: Decimal) -> DomainResult<Decimal> {
    if value > MAX_AMOUNT {
        return Err(DomainError::validation(format!(
            "{field} cannot be greater than {MAX_AMOUNT}"
        )));
    }
    Ok(value)
}

/// `round(unit_price * quantity, 2)`.
pub fn line_total(unit_price: Decimal, quantity: u32) -> DomainResult<Decimal> {
    let total = unit_price
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(|| DomainError::validation("line total is too large"))?;
    within_bounds("line total", round_money(total))
}

/// Sum amounts, rejecting a total that cannot be stored.
pub fn sum_amounts<I>(field: &str, amounts: I) -> DomainResult<Decimal>
where
    I: IntoIterator<Item = Decimal>,
{
    let mut total = Decimal::ZERO;
    for amount in amounts {
        total = total
            .checked_add(amount)
            .ok_or_else(|| DomainError::validation(format!("{field} is too large")))?;
    }
    within_bounds(field, total)
}

/// Convert a local-currency amount to the reference currency.
///
/// `exchange_rate` is expressed as local units per reference unit.
pub fn to_reference(amount_local: Decimal, exchange_rate: Decimal) -> DomainResult<Decimal> {
    if exchange_rate <= Decimal::ZERO {
        return Err(DomainError::validation("exchange rate must be greater than zero"));
    }
    let converted = amount_local
        .checked_div(exchange_rate)
        .map(round_money)
        .ok_or_else(|| DomainError::validation("amount overflows when converted"))?;
    within_bounds("converted amount", converted)
}

/// Reject negative amounts, naming the offending field.
pub fn ensure_non_negative(field: &str, value: Decimal) -> DomainResult<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(DomainError::validation(format!("{field} cannot be negative")));
    }
    Ok(())
}

/// Validate a money input: non-negative, at most two decimal places and
/// no greater than [`MAX_AMOUNT`].
pub fn check_amount(field: &str, value: Decimal) -> DomainResult<Decimal> {
    ensure_non_negative(field, value)?;
    if value.normalize().scale() > MONEY_DP {
        return Err(DomainError::validation(format!(
            "{field} cannot have more than two decimal places"
        )));
    }
    within_bounds(field, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rounds_midpoint_away_from_zero() {
        assert_eq!(round_money(dec!(2.345)), dec!(2.35));
        assert_eq!(round_money(dec!(2.344)), dec!(2.34));
        assert_eq!(round_money(dec!(0.125)), dec!(0.13));
    }

    #[test]
    fn converts_with_two_decimals() {
        assert_eq!(to_reference(dec!(10.00), dec!(3.00)).unwrap(), dec!(3.33));
        assert_eq!(to_reference(dec!(10.00), dec!(2.00)).unwrap(), dec!(5.00));
    }

    #[test]
    fn zero_exchange_rate_is_rejected() {
        let err = to_reference(dec!(10.00), Decimal::ZERO).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("exchange rate")));
    }

    #[test]
    fn negative_amounts_are_named() {
        let err = ensure_non_negative("vat", dec!(-0.01)).unwrap_err();
        assert_eq!(err, DomainError::validation("vat cannot be negative"));
        assert!(ensure_non_negative("vat", Decimal::ZERO).is_ok());
    }

    #[test]
    fn max_amount_is_the_column_limit() {
        assert_eq!(MAX_AMOUNT, dec!(999999999999.99));
    }

    #[test]
    fn overflowing_line_total_is_an_error() {
        let err = line_total(Decimal::MAX, 2).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(line_total(MAX_AMOUNT, 2).is_err());
        assert_eq!(line_total(MAX_AMOUNT, 1).unwrap(), MAX_AMOUNT);
    }

    #[test]
    fn sums_reject_unstorable_totals() {
        assert_eq!(sum_amounts("total", [dec!(1.10), dec!(2.20)]).unwrap(), dec!(3.30));
        assert!(sum_amounts("total", [MAX_AMOUNT, dec!(0.01)]).is_err());
        assert!(sum_amounts("total", [Decimal::MAX, Decimal::MAX]).is_err());
    }

    #[test]
    fn small_rates_cannot_inflate_past_the_limit() {
        assert!(to_reference(MAX_AMOUNT, dec!(0.5)).is_err());
    }

    #[test]
    fn amounts_are_checked_for_scale_and_range() {
        assert_eq!(check_amount("price", dec!(1.50)).unwrap(), dec!(1.50));
        assert!(check_amount("price", dec!(1.500)).is_ok());
        assert_eq!(
            check_amount("price", dec!(1.005)).unwrap_err(),
            DomainError::validation("price cannot have more than two decimal places")
        );
        assert!(check_amount("price", dec!(-1)).is_err());
        assert!(check_amount("price", dec!(1000000000000)).is_err());
    }

    proptest! {
        #[test]
        fn line_total_never_has_more_than_two_decimals(
            cents in 0i64..10_000_000i64,
            quantity in 0u32..100_000u32,
        ) {
            let price = Decimal::new(cents, 2);
            let total = line_total(price, quantity).unwrap();
            prop_assert!(total.scale() <= MONEY_DP);
            prop_assert_eq!(total, price * Decimal::from(quantity));
        }
    }
}
