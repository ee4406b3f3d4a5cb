use std::{fmt, str::FromStr};

use bigdecimal::{num_traits::Zero, BigDecimal};
use serde::Serialize;
use uuid::Uuid;

use super::money::{max_zero, settlement_tolerance, to_cents};

/// Documents a payment can be registered against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Sales,
    Purchase,
    Expense,
    Salary,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Sales => "sales",
            DocumentKind::Purchase => "purchase",
            DocumentKind::Expense => "expense",
            DocumentKind::Salary => "salary",
        }
    }

    /// Invoice number prefix, `None` for salaries.
    pub fn number_prefix(&self) -> Option<&'static str> {
        match self {
            DocumentKind::Sales => Some("SAL"),
            DocumentKind::Purchase => Some("PUR"),
            DocumentKind::Expense => Some("EXP"),
            DocumentKind::Salary => None,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sales" | "sale" => Ok(DocumentKind::Sales),
            "purchase" | "purchases" => Ok(DocumentKind::Purchase),
            "expense" | "expenses" => Ok(DocumentKind::Expense),
            "salary" | "salaries" => Ok(DocumentKind::Salary),
            other => Err(PaymentError::UnknownDocument(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Unpaid,
    Partial,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
        }
    }

    /// Salaries call an unpaid balance "due".
    pub fn as_salary_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "due",
            other => other.as_str(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unpaid" | "due" => Some(PaymentStatus::Unpaid),
            "partial" => Some(PaymentStatus::Partial),
            "paid" => Some(PaymentStatus::Paid),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PaymentError {
    #[error("payment amount must be greater than zero")]
    NotPositive,
    #[error("payment of {amount} exceeds the remaining balance of {remaining}")]
    Overpayment {
        amount: BigDecimal,
        remaining: BigDecimal,
    },
    #[error("document is already settled")]
    Settled,
    #[error("unknown document type '{0}'")]
    UnknownDocument(String),
    #[error("no open invoices for supplier '{0}'")]
    NothingOpen(String),
}

pub fn status_for(total: &BigDecimal, paid: &BigDecimal) -> PaymentStatus {
    if to_cents(&(total - paid)) <= settlement_tolerance() {
        PaymentStatus::Paid
    } else if *paid > BigDecimal::zero() {
        PaymentStatus::Partial
    } else {
        PaymentStatus::Unpaid
    }
}

pub fn remaining(total: &BigDecimal, paid: &BigDecimal) -> BigDecimal {
    max_zero(to_cents(&(total - paid)))
}

pub fn check_payment(
    amount: &BigDecimal,
    total: &BigDecimal,
    paid: &BigDecimal,
) -> Result<(), PaymentError> {
    if *amount <= BigDecimal::zero() {
        return Err(PaymentError::NotPositive);
    }
    if status_for(total, paid) == PaymentStatus::Paid {
        return Err(PaymentError::Settled);
    }
    let left = remaining(total, paid);
    if *amount > &left + settlement_tolerance() {
        return Err(PaymentError::Overpayment {
            amount: amount.clone(),
            remaining: left,
        });
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct OpenDocument {
    pub id: Uuid,
    pub number: String,
    pub total: BigDecimal,
    pub paid: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    pub id: Uuid,
    pub number: String,
    pub amount: BigDecimal,
}

/// Spreads `amount` over `documents` in the order given. Returns the
/// allocations and whatever could not be placed.
pub fn allocate_oldest_first(
    amount: &BigDecimal,
    documents: &[OpenDocument],
) -> (Vec<Allocation>, BigDecimal) {
    let mut left = to_cents(amount);
    let mut allocations = Vec::new();

    for doc in documents {
        if left <= BigDecimal::zero() {
            break;
        }
        let open = remaining(&doc.total, &doc.paid);
        if open <= BigDecimal::zero() {
            continue;
        }
        let take = if left < open { left.clone() } else { open };
        left = &left - &take;
        allocations.push(Allocation {
            id: doc.id,
            number: doc.number.clone(),
            amount: take,
        });
    }

    (allocations, max_zero(left))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn doc(number: &str, total: &str, paid: &str) -> OpenDocument {
        OpenDocument {
            id: Uuid::new_v4(),
            number: number.to_string(),
            total: d(total),
            paid: d(paid),
        }
    }

    #[test]
    fn status_follows_paid_sum() {
        assert_eq!(status_for(&d("100"), &d("0")), PaymentStatus::Unpaid);
        assert_eq!(status_for(&d("100"), &d("40")), PaymentStatus::Partial);
        assert_eq!(status_for(&d("100"), &d("99.99")), PaymentStatus::Paid);
        assert_eq!(status_for(&d("100"), &d("120")), PaymentStatus::Paid);
        assert_eq!(status_for(&d("0"), &d("0")), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::Unpaid.as_salary_str(), "due");
    }

    #[test]
    fn payment_checks() {
        assert_eq!(
            check_payment(&d("0"), &d("10"), &d("0")),
            Err(PaymentError::NotPositive)
        );
        assert_eq!(
            check_payment(&d("5"), &d("10"), &d("10")),
            Err(PaymentError::Settled)
        );
        assert!(matches!(
            check_payment(&d("6.02"), &d("10"), &d("4")),
            Err(PaymentError::Overpayment { .. })
        ));
        assert!(check_payment(&d("6.01"), &d("10"), &d("4")).is_ok());
        assert_eq!(remaining(&d("10"), &d("12")), d("0"));
    }

    #[test]
    fn allocates_to_oldest_first() {
        let docs = [
            doc("PUR-2024-001", "100", "100"),
            doc("PUR-2024-002", "80", "30"),
            doc("PUR-2024-003", "40", "0"),
        ];
        let (allocs, rest) = allocate_oldest_first(&d("70"), &docs);
        assert_eq!(allocs.len(), 2);
        assert_eq!(allocs[0].number, "PUR-2024-002");
        assert_eq!(allocs[0].amount, d("50"));
        assert_eq!(allocs[1].amount, d("20"));
        assert_eq!(rest, d("0"));

        let (allocs, rest) = allocate_oldest_first(&d("200"), &docs);
        assert_eq!(allocs.len(), 2);
        assert_eq!(rest, d("110"));
    }

    #[test]
    fn parses_document_kinds() {
        assert_eq!("Purchase".parse::<DocumentKind>().unwrap(), DocumentKind::Purchase);
        assert!("rent".parse::<DocumentKind>().is_err());
        assert_eq!(DocumentKind::Expense.number_prefix(), Some("EXP"));
    }
}
