use std::{fmt, str::FromStr};

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{
    journal::{statement, AccountType, LedgerMovement, StatementLine},
    money::{to_cents, zero},
    reconciliation::DocumentKind,
};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PartyError {
    #[error("unknown customer type '{0}'")]
    UnknownCustomerType(String),
    #[error("{0} is inactive")]
    Inactive(String),
    #[error("sales on account need a registered credit customer")]
    CreditCustomerRequired,
    #[error("discount percent must be between 0 and 100, got {0}")]
    DiscountOutOfRange(BigDecimal),
    #[error("{0} invoices have no registered party")]
    NoRegistry(DocumentKind),
}

/// Customers buy on sales invoices; suppliers bill purchases and expenses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyKind {
    Customer,
    Supplier,
}

impl PartyKind {
    pub fn for_document(kind: DocumentKind) -> Result<Self, PartyError> {
        match kind {
            DocumentKind::Sales => Ok(PartyKind::Customer),
            DocumentKind::Purchase | DocumentKind::Expense => Ok(PartyKind::Supplier),
            DocumentKind::Salary => Err(PartyError::NoRegistry(kind)),
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            PartyKind::Customer => "customers",
            PartyKind::Supplier => "suppliers",
        }
    }

    pub fn documents(&self) -> &'static [DocumentKind] {
        match self {
            PartyKind::Customer => &[DocumentKind::Sales],
            PartyKind::Supplier => &[DocumentKind::Purchase, DocumentKind::Expense],
        }
    }

    /// Receivables are debit balances, payables credit balances.
    pub fn account_type(&self) -> AccountType {
        match self {
            PartyKind::Customer => AccountType::Asset,
            PartyKind::Supplier => AccountType::Liability,
        }
    }
}

impl fmt::Display for PartyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PartyKind::Customer => "customer",
            PartyKind::Supplier => "supplier",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomerType {
    #[default]
    Cash,
    Credit,
}

impl CustomerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerType::Cash => "cash",
            CustomerType::Credit => "credit",
        }
    }
}

impl FromStr for CustomerType {
    type Err = PartyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "cash" => Ok(CustomerType::Cash),
            "credit" => Ok(CustomerType::Credit),
            other => Err(PartyError::UnknownCustomerType(other.to_string())),
        }
    }
}

/// A sale left open for later payment must name a credit customer.
/// Purchases and expenses may stay open against any supplier.
pub fn check_on_account(
    kind: DocumentKind,
    customer: Option<CustomerType>,
    on_account: bool,
) -> Result<(), PartyError> {
    if kind == DocumentKind::Sales && on_account && customer != Some(CustomerType::Credit) {
        return Err(PartyError::CreditCustomerRequired);
    }
    Ok(())
}

pub fn check_discount_percent(v: &BigDecimal) -> Result<BigDecimal, PartyError> {
    if *v < zero() || *v > BigDecimal::from(100) {
        return Err(PartyError::DiscountOutOfRange(v.clone()));
    }
    Ok(to_cents(v))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementKind {
    Invoice,
    Payment,
}

/// An invoice issued to or received from a party, or a payment against one.
#[derive(Debug, Clone)]
pub struct PartyMovement {
    pub date: NaiveDate,
    pub reference: String,
    pub kind: MovementKind,
    pub amount: BigDecimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartyStatement {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub opening: BigDecimal,
    pub lines: Vec<StatementLine>,
    pub invoiced: BigDecimal,
    pub paid: BigDecimal,
    pub closing: BigDecimal,
}

/// Running balance of what the party owes (customers) or is owed
/// (suppliers). On the same day invoices come before payments.
pub fn party_statement(
    party: PartyKind,
    start: NaiveDate,
    end: NaiveDate,
    opening: &BigDecimal,
    mut movements: Vec<PartyMovement>,
) -> PartyStatement {
    movements.sort_by_key(|m| (m.date, m.kind == MovementKind::Payment));
    let mut invoiced = zero();
    let mut paid = zero();
    let ledger = movements
        .into_iter()
        .map(|m| {
            let amount = to_cents(&m.amount);
            let increases = m.kind == MovementKind::Invoice;
            if increases {
                invoiced = &invoiced + &amount;
            } else {
                paid = &paid + &amount;
            }
            // the side that grows the balance depends on the party
            let debit_side = increases == (party == PartyKind::Customer);
            let (debit, credit) = if debit_side { (amount, zero()) } else { (zero(), amount) };
            LedgerMovement {
                date: m.date,
                entry_number: m.reference,
                description: match m.kind {
                    MovementKind::Invoice => "invoice".to_string(),
                    MovementKind::Payment => "payment".to_string(),
                },
                debit,
                credit,
            }
        })
        .collect();

    let lines = statement(party.account_type(), opening, ledger);
    let closing = lines.last().map(|l| l.balance.clone()).unwrap_or_else(|| to_cents(opening));
    PartyStatement {
        start,
        end,
        opening: to_cents(opening),
        lines,
        invoiced,
        paid,
        closing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn ymd(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn movement(day: u32, reference: &str, kind: MovementKind, amount: &str) -> PartyMovement {
        PartyMovement {
            date: ymd(3, day),
            reference: reference.to_string(),
            kind,
            amount: d(amount),
        }
    }

    #[test]
    fn customer_types() {
        assert_eq!("Credit".parse::<CustomerType>().unwrap(), CustomerType::Credit);
        assert_eq!("".parse::<CustomerType>().unwrap(), CustomerType::Cash);
        assert!("monthly".parse::<CustomerType>().is_err());
    }

    #[test]
    fn sales_on_account_need_credit_customer() {
        assert!(check_on_account(DocumentKind::Sales, Some(CustomerType::Credit), true).is_ok());
        assert_eq!(
            check_on_account(DocumentKind::Sales, Some(CustomerType::Cash), true),
            Err(PartyError::CreditCustomerRequired)
        );
        assert_eq!(
            check_on_account(DocumentKind::Sales, None, true),
            Err(PartyError::CreditCustomerRequired)
        );
        assert!(check_on_account(DocumentKind::Sales, None, false).is_ok());
        assert!(check_on_account(DocumentKind::Purchase, None, true).is_ok());
    }

    #[test]
    fn discount_bounds() {
        assert_eq!(check_discount_percent(&d("12.5")).unwrap(), d("12.50"));
        assert!(check_discount_percent(&d("100")).is_ok());
        assert!(check_discount_percent(&d("100.01")).is_err());
        assert!(check_discount_percent(&d("-1")).is_err());
    }

    #[test]
    fn registry_per_document() {
        assert_eq!(PartyKind::for_document(DocumentKind::Sales), Ok(PartyKind::Customer));
        assert_eq!(PartyKind::for_document(DocumentKind::Expense), Ok(PartyKind::Supplier));
        assert!(PartyKind::for_document(DocumentKind::Salary).is_err());
    }

    #[test]
    fn customer_statement_runs_receivable() {
        let st = party_statement(
            PartyKind::Customer,
            ymd(3, 1),
            ymd(3, 31),
            &d("100"),
            vec![
                movement(9, "SAL-2024-004", MovementKind::Payment, "80"),
                movement(5, "SAL-2024-003", MovementKind::Invoice, "230"),
                movement(9, "SAL-2024-005", MovementKind::Invoice, "50"),
            ],
        );
        let balances: Vec<_> = st.lines.iter().map(|l| l.balance.clone()).collect();
        assert_eq!(balances, vec![d("330"), d("380"), d("300")]);
        assert_eq!(st.lines[0].debit, d("230"));
        assert_eq!(st.lines[2].credit, d("80"));
        assert_eq!(st.invoiced, d("280"));
        assert_eq!(st.paid, d("80"));
        assert_eq!(st.closing, d("300"));
    }

    #[test]
    fn supplier_statement_runs_payable() {
        let st = party_statement(
            PartyKind::Supplier,
            ymd(3, 1),
            ymd(3, 31),
            &zero(),
            vec![
                movement(2, "PUR-2024-001", MovementKind::Invoice, "500"),
                movement(20, "PUR-2024-001", MovementKind::Payment, "200"),
            ],
        );
        assert_eq!(st.lines[0].credit, d("500"));
        assert_eq!(st.lines[1].debit, d("200"));
        assert_eq!(st.closing, d("300"));
    }

    #[test]
    fn empty_statement_closes_at_opening() {
        let st = party_statement(PartyKind::Customer, ymd(3, 1), ymd(3, 31), &d("42"), Vec::new());
        assert!(st.lines.is_empty());
        assert_eq!(st.closing, d("42"));
    }
}
