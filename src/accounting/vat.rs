use bigdecimal::BigDecimal;
use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use super::money::{to_cents, zero};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum VatError {
    #[error("quarter must be between 1 and 4, got {0}")]
    Quarter(u32),
    #[error("year {0} is out of range")]
    Year(i32),
}

pub fn quarter_of(date: NaiveDate) -> u32 {
    (date.month() - 1) / 3 + 1
}

pub fn quarter_bounds(year: i32, quarter: u32) -> Result<(NaiveDate, NaiveDate), VatError> {
    if !(1..=4).contains(&quarter) {
        return Err(VatError::Quarter(quarter));
    }
    let first_month = (quarter - 1) * 3 + 1;
    let start = NaiveDate::from_ymd_opt(year, first_month, 1).ok_or(VatError::Year(year))?;
    let end = match quarter {
        4 => NaiveDate::from_ymd_opt(year, 12, 31),
        _ => NaiveDate::from_ymd_opt(year, first_month + 3, 1).and_then(|d| d.pred_opt()),
    };
    let end = end.ok_or(VatError::Year(year))?;
    Ok((start, end))
}

#[derive(Debug, Clone, Serialize)]
pub struct BranchSales {
    pub branch: String,
    pub name: String,
    /// Gross base before discounts; the VAT base is not reduced by them.
    pub sales_before_tax: BigDecimal,
    pub discounts: BigDecimal,
    pub output_vat: BigDecimal,
}

/// Sums read from the invoice tables for one quarter.
#[derive(Debug, Clone, Default)]
pub struct VatInputs {
    pub branches: Vec<BranchSales>,
    pub purchases_before_tax: BigDecimal,
    pub purchases_vat: BigDecimal,
    pub expenses_before_tax: BigDecimal,
    pub expenses_vat: BigDecimal,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Company {
    pub name: String,
    pub tax_number: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VatReturn {
    pub year: i32,
    pub quarter: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub company: Company,
    pub branches: Vec<BranchSales>,
    pub total_sales: BigDecimal,
    pub purchases_before_tax: BigDecimal,
    pub expenses_before_tax: BigDecimal,
    pub output_vat: BigDecimal,
    pub input_vat: BigDecimal,
    pub net_vat: BigDecimal,
}

/// Output VAT comes from the tax recorded on each sales invoice, not from
/// re-applying today's rate to the base.
pub fn build_return(
    year: i32,
    quarter: u32,
    company: Company,
    inputs: VatInputs,
) -> Result<VatReturn, VatError> {
    let (start, end) = quarter_bounds(year, quarter)?;
    let (total_sales, output_vat) = inputs.branches.iter().fold((zero(), zero()), |(s, v), b| {
        (s + &b.sales_before_tax, v + &b.output_vat)
    });
    let input_vat = to_cents(&(&inputs.purchases_vat + &inputs.expenses_vat));
    let net_vat = to_cents(&(&output_vat - &input_vat));

    Ok(VatReturn {
        year,
        quarter,
        start,
        end,
        company,
        branches: inputs.branches,
        total_sales: to_cents(&total_sales),
        purchases_before_tax: to_cents(&inputs.purchases_before_tax),
        expenses_before_tax: to_cents(&inputs.expenses_before_tax),
        output_vat: to_cents(&output_vat),
        input_vat,
        net_vat,
    })
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn d(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn ymd(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn quarters() {
        assert_eq!(quarter_bounds(2024, 1).unwrap(), (ymd(2024, 1, 1), ymd(2024, 3, 31)));
        assert_eq!(quarter_bounds(2024, 2).unwrap(), (ymd(2024, 4, 1), ymd(2024, 6, 30)));
        assert_eq!(quarter_bounds(2024, 4).unwrap(), (ymd(2024, 10, 1), ymd(2024, 12, 31)));
        assert_eq!(quarter_bounds(2024, 5), Err(VatError::Quarter(5)));
        assert_eq!(quarter_bounds(2024, 0), Err(VatError::Quarter(0)));
        assert_eq!(quarter_of(ymd(2024, 3, 31)), 1);
        assert_eq!(quarter_of(ymd(2024, 7, 1)), 3);
        assert_eq!(quarter_of(ymd(2024, 12, 31)), 4);
    }

    #[test]
    fn return_nets_input_against_output() {
        let r = build_return(
            2024,
            1,
            Company {
                name: "Resto".to_string(),
                tax_number: "300000000000003".to_string(),
                currency: "SAR".to_string(),
            },
            VatInputs {
                branches: vec![
                    BranchSales {
                        branch: "place_india".to_string(),
                        name: "Place India".to_string(),
                        sales_before_tax: d("1000"),
                        discounts: zero(),
                        output_vat: d("150"),
                    },
                    BranchSales {
                        branch: "china_town".to_string(),
                        name: "China Town".to_string(),
                        sales_before_tax: d("500"),
                        discounts: zero(),
                        output_vat: d("75"),
                    },
                ],
                purchases_before_tax: d("600"),
                purchases_vat: d("90"),
                expenses_before_tax: d("100"),
                expenses_vat: d("15"),
            },
        )
        .unwrap();
        assert_eq!(r.total_sales, d("1500"));
        assert_eq!(r.output_vat, d("225"));
        assert_eq!(r.input_vat, d("105"));
        assert_eq!(r.net_vat, d("120"));
        assert_eq!(r.end, ymd(2024, 3, 31));
    }

    #[test]
    fn discounts_do_not_reduce_sales_base() {
        let r = build_return(
            2024,
            2,
            Company::default(),
            VatInputs {
                branches: vec![BranchSales {
                    branch: "place_india".to_string(),
                    name: "Place India".to_string(),
                    sales_before_tax: d("200"),
                    discounts: d("20"),
                    output_vat: d("30"),
                }],
                ..VatInputs::default()
            },
        )
        .unwrap();
        assert_eq!(r.total_sales, d("200"));
        assert_eq!(r.output_vat, d("30"));
        assert_eq!(r.net_vat, d("30"));
        assert_eq!(r.branches[0].discounts, d("20"));
    }
}
