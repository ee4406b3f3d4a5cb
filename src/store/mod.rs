//! Database operations. Every function that writes more than one row runs
//! inside a single transaction; the `*_in` variants take a connection that
//! already belongs to one so callers can compose them.

pub mod accounts;
pub mod audit;
pub mod fiscal;
pub mod inventory;
pub mod invoices;
pub mod journal;
pub mod parties;
pub mod payments;
pub mod payroll;
pub mod pos;
pub mod reports;
pub mod settings;
pub mod users;

use crate::accounting_service::AccountingService;

#[derive(Debug, thiserror::Error)]
#[error("{0} not found")]
pub struct NotFound(pub String);

/// Input rejected before anything was written.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct Invalid(pub String);

pub fn invalid(msg: impl Into<String>) -> anyhow::Error {
    Invalid(msg.into()).into()
}

/// Who is posting and under which rules.
#[derive(Clone, Copy)]
pub struct PostingContext<'a> {
    pub user: &'a str,
    pub require_fiscal_year: bool,
    pub service: Option<&'a AccountingService>,
}

pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .and_then(|e| e.as_database_error())
            .map(|e| e.is_unique_violation())
            .unwrap_or(false)
    })
}

/// `LIKE` pattern matching `prefix` literally.
pub fn like_prefix(prefix: &str) -> String {
    let escaped = prefix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("{escaped}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_prefix_escapes_wildcards() {
        assert_eq!(like_prefix("JE-SAL-2024-001"), "JE-SAL-2024-001%");
        assert_eq!(like_prefix("a_b%"), "a\\_b\\%%");
    }
}
