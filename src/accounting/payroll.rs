use bigdecimal::{num_traits::Zero, BigDecimal};
use chrono::{Datelike, NaiveDate};

use super::{
    money::{max_zero, to_cents},
    reconciliation::{remaining, status_for, PaymentStatus},
};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PayrollError {
    #[error("{0} must not be negative")]
    NegativeComponent(&'static str),
    #[error("month must be between 1 and 12, got {0}")]
    MonthOutOfRange(u32),
    #[error("salary for {year}-{month:02} is in the future")]
    FutureMonth { year: i32, month: u32 },
    #[error("invalid month '{0}', expected YYYY-MM")]
    InvalidMonth(String),
    #[error("salary is already paid")]
    AlreadyPaid,
    #[error("payment amount must be greater than zero")]
    NotPositive,
}

#[derive(Debug, Clone)]
pub struct SalaryComponents {
    pub basic: BigDecimal,
    pub allowances: BigDecimal,
    pub deductions: BigDecimal,
    pub previous_due: BigDecimal,
}

pub fn salary_total(c: &SalaryComponents) -> Result<BigDecimal, PayrollError> {
    for (name, v) in [
        ("basic salary", &c.basic),
        ("allowances", &c.allowances),
        ("deductions", &c.deductions),
        ("previous due", &c.previous_due),
    ] {
        if *v < BigDecimal::zero() {
            return Err(PayrollError::NegativeComponent(name));
        }
    }
    Ok(max_zero(to_cents(
        &(&c.basic + &c.allowances - &c.deductions + &c.previous_due),
    )))
}

/// A salary may be recorded for the current month or any month before it.
pub fn check_salary_month(year: i32, month: u32, today: NaiveDate) -> Result<(), PayrollError> {
    if !(1..=12).contains(&month) {
        return Err(PayrollError::MonthOutOfRange(month));
    }
    if (year, month) > (today.year(), today.month()) {
        return Err(PayrollError::FutureMonth { year, month });
    }
    Ok(())
}

pub fn last_day_of_month(year: i32, month: u32) -> Result<NaiveDate, PayrollError> {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(ny, nm, 1)
        .and_then(|d| d.pred_opt())
        .ok_or(PayrollError::MonthOutOfRange(month))
}

/// Parses `YYYY-MM`.
pub fn parse_month(s: &str) -> Result<(i32, u32), PayrollError> {
    let invalid = || PayrollError::InvalidMonth(s.to_string());
    let (y, m) = s.trim().split_once('-').ok_or_else(invalid)?;
    let year: i32 = y.parse().map_err(|_| invalid())?;
    let month: u32 = m.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) {
        return Err(PayrollError::MonthOutOfRange(month));
    }
    Ok((year, month))
}

/// Document number of a salary, used for its journals.
pub fn salary_reference(employee_code: &str, year: i32, month: u32) -> String {
    format!("SALARY-{}-{year}-{month:02}", employee_code.trim())
}

/// Amount actually paid: the request capped at what is still owed.
pub fn pay_amount(
    requested: &BigDecimal,
    total: &BigDecimal,
    paid: &BigDecimal,
) -> Result<BigDecimal, PayrollError> {
    if *requested <= BigDecimal::zero() {
        return Err(PayrollError::NotPositive);
    }
    if status_for(total, paid) == PaymentStatus::Paid {
        return Err(PayrollError::AlreadyPaid);
    }
    let left = remaining(total, paid);
    Ok(if *requested > left { left } else { to_cents(requested) })
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn d(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn components(basic: &str, allowances: &str, deductions: &str, previous: &str) -> SalaryComponents {
        SalaryComponents {
            basic: d(basic),
            allowances: d(allowances),
            deductions: d(deductions),
            previous_due: d(previous),
        }
    }

    #[test]
    fn totals() {
        assert_eq!(salary_total(&components("3000", "500", "200", "100")).unwrap(), d("3400"));
        assert_eq!(salary_total(&components("100", "0", "300", "0")).unwrap(), d("0"));
        assert_eq!(
            salary_total(&components("100", "-1", "0", "0")),
            Err(PayrollError::NegativeComponent("allowances"))
        );
    }

    #[test]
    fn months() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 15).unwrap();
        assert!(check_salary_month(2024, 5, today).is_ok());
        assert!(check_salary_month(2023, 12, today).is_ok());
        assert_eq!(
            check_salary_month(2024, 6, today),
            Err(PayrollError::FutureMonth { year: 2024, month: 6 })
        );
        assert_eq!(check_salary_month(2024, 13, today), Err(PayrollError::MonthOutOfRange(13)));
        assert_eq!(last_day_of_month(2024, 2).unwrap(), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(last_day_of_month(2024, 12).unwrap(), NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert_eq!(parse_month("2024-03").unwrap(), (2024, 3));
        assert!(matches!(parse_month("March"), Err(PayrollError::InvalidMonth(_))));
        assert_eq!(salary_reference(" E001 ", 2024, 3), "SALARY-E001-2024-03");
    }

    #[test]
    fn payment_is_capped() {
        assert_eq!(pay_amount(&d("500"), &d("3000"), &d("2800")).unwrap(), d("200"));
        assert_eq!(pay_amount(&d("100"), &d("3000"), &d("0")).unwrap(), d("100"));
        assert_eq!(pay_amount(&d("1"), &d("3000"), &d("3000")), Err(PayrollError::AlreadyPaid));
        assert_eq!(pay_amount(&d("0"), &d("3000"), &d("0")), Err(PayrollError::NotPositive));
    }
}
