use bigdecimal::{num_traits::Zero, BigDecimal};
use serde::{Deserialize, Serialize};

use super::money::{percent, to_cents, zero};

#[derive(Debug, Clone, PartialEq, Default, Deserialize, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Discount {
    #[default]
    None,
    Percent(BigDecimal),
    Amount(BigDecimal),
}

#[derive(Debug, Clone)]
pub struct LineInput {
    pub description: String,
    pub quantity: BigDecimal,
    pub unit_price: BigDecimal,
    pub discount: Discount,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineTotals {
    pub description: String,
    pub quantity: BigDecimal,
    pub unit_price: BigDecimal,
    pub gross: BigDecimal,
    pub tax: BigDecimal,
    pub discount: BigDecimal,
    pub total: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceTotals {
    pub lines: Vec<LineTotals>,
    pub total_before_tax: BigDecimal,
    pub tax_amount: BigDecimal,
    pub discount_amount: BigDecimal,
    pub total_after_tax_discount: BigDecimal,
}

impl InvoiceTotals {
    /// Revenue or cost recognised by the invoice: what is left once the
    /// discount is taken off the pre-tax amount.
    pub fn net_of_discount(&self) -> BigDecimal {
        &self.total_before_tax - &self.discount_amount
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TotalsError {
    #[error("line '{0}': quantity must not be negative")]
    NegativeQuantity(String),
    #[error("line '{0}': unit price must not be negative")]
    NegativePrice(String),
    #[error("line '{0}': discount must not be negative")]
    NegativeDiscount(String),
    #[error("line '{0}': discount percent must be between 0 and 100")]
    PercentOutOfRange(String),
    #[error("vat rate must be between 0 and 100, got {0}")]
    VatRate(BigDecimal),
    #[error("invoice has no line with a positive quantity")]
    Empty,
}

pub fn check_vat_rate(rate: &BigDecimal) -> Result<(), TotalsError> {
    if *rate < BigDecimal::zero() || *rate > BigDecimal::from(100) {
        return Err(TotalsError::VatRate(rate.clone()));
    }
    Ok(())
}

pub fn compute_line(line: &LineInput, vat_rate: &BigDecimal) -> Result<LineTotals, TotalsError> {
    check_vat_rate(vat_rate)?;
    if line.quantity < BigDecimal::zero() {
        return Err(TotalsError::NegativeQuantity(line.description.clone()));
    }
    if line.unit_price < BigDecimal::zero() {
        return Err(TotalsError::NegativePrice(line.description.clone()));
    }

    let rate = percent(vat_rate);
    let gross = to_cents(&(&line.quantity * &line.unit_price));

    let (tax, discount) = match &line.discount {
        Discount::None => (to_cents(&(&gross * &rate)), zero()),
        Discount::Percent(p) => {
            if *p < BigDecimal::zero() {
                return Err(TotalsError::NegativeDiscount(line.description.clone()));
            }
            if *p > BigDecimal::from(100) {
                return Err(TotalsError::PercentOutOfRange(line.description.clone()));
            }
            let tax = to_cents(&(&gross * &rate));
            let discount = to_cents(&((&gross + &tax) * percent(p)));
            (tax, discount)
        }
        Discount::Amount(a) => {
            if *a < BigDecimal::zero() {
                return Err(TotalsError::NegativeDiscount(line.description.clone()));
            }
            let discount = to_cents(if *a > gross { &gross } else { a });
            let tax = to_cents(&((&gross - &discount) * &rate));
            (tax, discount)
        }
    };

    let total = &gross + &tax - &discount;
    Ok(LineTotals {
        description: line.description.clone(),
        quantity: line.quantity.clone(),
        unit_price: line.unit_price.clone(),
        gross,
        tax,
        discount,
        total,
    })
}

/// Sums line components into the invoice header. Lines with a zero
/// quantity are dropped before summing.
pub fn compute_invoice(
    lines: &[LineInput],
    vat_rate: &BigDecimal,
) -> Result<InvoiceTotals, TotalsError> {
    let mut computed = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity.is_zero() {
            continue;
        }
        computed.push(compute_line(line, vat_rate)?);
    }
    if computed.is_empty() {
        return Err(TotalsError::Empty);
    }

    let (before, tax, discount) = computed
        .iter()
        .fold((zero(), zero(), zero()), |(b, t, d), l| {
            (b + &l.gross, t + &l.tax, d + &l.discount)
        });
    let after = &before + &tax - &discount;

    Ok(InvoiceTotals {
        lines: computed,
        total_before_tax: before,
        tax_amount: tax,
        discount_amount: discount,
        total_after_tax_discount: after,
    })
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn d(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn line(q: &str, p: &str, discount: Discount) -> LineInput {
        LineInput {
            description: "item".to_string(),
            quantity: d(q),
            unit_price: d(p),
            discount,
        }
    }

    #[test]
    fn percent_discount_applies_after_tax() {
        let l = compute_line(&line("2", "50", Discount::Percent(d("10"))), &d("15")).unwrap();
        assert_eq!(l.gross, d("100.00"));
        assert_eq!(l.tax, d("15.00"));
        assert_eq!(l.discount, d("11.50"));
        assert_eq!(l.total, d("103.50"));
    }

    #[test]
    fn amount_discount_reduces_taxable_base() {
        let l = compute_line(&line("4", "25", Discount::Amount(d("20"))), &d("15")).unwrap();
        assert_eq!(l.gross, d("100.00"));
        assert_eq!(l.discount, d("20.00"));
        assert_eq!(l.tax, d("12.00"));
        assert_eq!(l.total, d("92.00"));
    }

    #[test]
    fn amount_discount_is_capped_at_gross() {
        let l = compute_line(&line("1", "10", Discount::Amount(d("30"))), &d("15")).unwrap();
        assert_eq!(l.discount, d("10.00"));
        assert_eq!(l.tax, d("0.00"));
        assert_eq!(l.total, d("0.00"));
    }

    #[test]
    fn header_is_sum_of_lines() {
        let totals = compute_invoice(
            &[
                line("3", "12.50", Discount::None),
                line("0", "99", Discount::None),
                line("1", "7.333", Discount::Percent(d("5"))),
            ],
            &d("15"),
        )
        .unwrap();

        assert_eq!(totals.lines.len(), 2);
        let sum_total = totals
            .lines
            .iter()
            .fold(zero(), |acc, l| acc + &l.total);
        assert_eq!(sum_total, totals.total_after_tax_discount);
        assert_eq!(
            totals.total_after_tax_discount,
            &totals.total_before_tax + &totals.tax_amount - &totals.discount_amount
        );
        assert_eq!(totals.total_before_tax, d("44.83"));
    }

    #[test]
    fn zero_vat_invoice() {
        let totals = compute_invoice(&[line("2", "5", Discount::None)], &d("0")).unwrap();
        assert_eq!(totals.tax_amount, d("0"));
        assert_eq!(totals.total_after_tax_discount, d("10"));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(
            compute_invoice(&[line("0", "5", Discount::None)], &d("15")),
            Err(TotalsError::Empty)
        );
        assert!(matches!(
            compute_line(&line("-1", "5", Discount::None), &d("15")),
            Err(TotalsError::NegativeQuantity(_))
        ));
        assert!(matches!(
            compute_line(&line("1", "5", Discount::Percent(d("120"))), &d("15")),
            Err(TotalsError::PercentOutOfRange(_))
        ));
        assert!(matches!(
            compute_line(&line("1", "5", Discount::None), &d("101")),
            Err(TotalsError::VatRate(_))
        ));
    }
}
