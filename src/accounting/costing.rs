use bigdecimal::{num_traits::Zero, BigDecimal};
use serde::Serialize;

use super::money::{percent, to_cents, to_cost};

pub const DEFAULT_PROFIT_MARGIN: i32 = 30;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CostingError {
    #[error("received quantity must not be negative")]
    NegativeQuantity,
    #[error("unit price must not be negative")]
    NegativePrice,
    #[error("profit margin must not be negative")]
    NegativeMargin,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockValuation {
    pub stock_quantity: BigDecimal,
    pub cost_per_unit: BigDecimal,
}

/// Moving weighted average after receiving `qty` units at `unit_price`.
///
/// A negative opening stock (sold before it was purchased) carries no
/// value into the average. When the resulting stock is not positive the
/// previous cost is kept.
pub fn weighted_average(
    stock_quantity: &BigDecimal,
    cost_per_unit: &BigDecimal,
    qty: &BigDecimal,
    unit_price: &BigDecimal,
) -> Result<StockValuation, CostingError> {
    if *qty < BigDecimal::zero() {
        return Err(CostingError::NegativeQuantity);
    }
    if *unit_price < BigDecimal::zero() {
        return Err(CostingError::NegativePrice);
    }

    let new_qty = to_cost(&(stock_quantity + qty));
    let opening = if *stock_quantity > BigDecimal::zero() {
        stock_quantity.clone()
    } else {
        BigDecimal::zero()
    };
    let valued_qty = &opening + qty;

    let new_cost = if new_qty > BigDecimal::zero() && valued_qty > BigDecimal::zero() {
        to_cost(&((&opening * cost_per_unit + qty * unit_price) / valued_qty))
    } else {
        to_cost(cost_per_unit)
    };

    Ok(StockValuation {
        stock_quantity: new_qty,
        cost_per_unit: new_cost,
    })
}

pub fn ingredient_cost(quantity: &BigDecimal, cost_per_unit: &BigDecimal) -> BigDecimal {
    to_cost(&(quantity * cost_per_unit))
}

pub fn meal_cost<'a>(ingredient_costs: impl IntoIterator<Item = &'a BigDecimal>) -> BigDecimal {
    to_cents(
        &ingredient_costs
            .into_iter()
            .fold(BigDecimal::zero(), |acc, c| acc + c),
    )
}

pub fn selling_price(cost: &BigDecimal, margin_percent: &BigDecimal) -> Result<BigDecimal, CostingError> {
    if *margin_percent < BigDecimal::zero() {
        return Err(CostingError::NegativeMargin);
    }
    Ok(to_cents(&(cost * (BigDecimal::from(1) + percent(margin_percent)))))
}

pub fn stock_value(quantity: &BigDecimal, cost_per_unit: &BigDecimal) -> BigDecimal {
    to_cents(&(quantity * cost_per_unit))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn d(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn averages_old_and_new_stock() {
        let v = weighted_average(&d("10"), &d("4"), &d("30"), &d("6")).unwrap();
        assert_eq!(v.stock_quantity, d("40"));
        assert_eq!(v.cost_per_unit, d("5.5"));
    }

    #[test]
    fn first_receipt_takes_purchase_price() {
        let v = weighted_average(&d("0"), &d("0"), &d("3"), &d("2.3333")).unwrap();
        assert_eq!(v.cost_per_unit, d("2.3333"));
    }

    #[test]
    fn negative_opening_stock_has_no_value() {
        let v = weighted_average(&d("-2"), &d("9"), &d("5"), &d("3")).unwrap();
        assert_eq!(v.stock_quantity, d("3"));
        assert_eq!(v.cost_per_unit, d("3"));
    }

    #[test]
    fn keeps_cost_when_stock_stays_empty() {
        let v = weighted_average(&d("-5"), &d("7.25"), &d("2"), &d("3")).unwrap();
        assert_eq!(v.stock_quantity, d("-3"));
        assert_eq!(v.cost_per_unit, d("7.25"));
    }

    #[test]
    fn rounds_cost_to_four_places() {
        let v = weighted_average(&d("1"), &d("1"), &d("2"), &d("1.5")).unwrap();
        assert_eq!(v.cost_per_unit, d("1.3333"));
    }

    #[test]
    fn meal_price_from_ingredients() {
        let a = ingredient_cost(&d("0.25"), &d("40"));
        let b = ingredient_cost(&d("2"), &d("1.125"));
        let cost = meal_cost([&a, &b]);
        assert_eq!(cost, d("12.25"));
        assert_eq!(
            selling_price(&cost, &BigDecimal::from(DEFAULT_PROFIT_MARGIN)).unwrap(),
            d("15.93")
        );
        assert_eq!(
            selling_price(&cost, &d("-1")),
            Err(CostingError::NegativeMargin)
        );
    }

    #[test]
    fn rejects_negative_receipts() {
        assert_eq!(
            weighted_average(&d("1"), &d("1"), &d("-1"), &d("1")),
            Err(CostingError::NegativeQuantity)
        );
    }
}
