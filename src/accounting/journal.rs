use std::{fmt, str::FromStr};

use bigdecimal::{num_traits::Zero, BigDecimal};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{
    fiscal::PeriodError,
    money::{nearly_equal, to_cents, zero},
    reconciliation::DocumentKind,
    totals::InvoiceTotals,
};

pub mod codes {
    pub const CASH: &str = "1111";
    pub const BANK: &str = "1121";
    pub const RECEIVABLES: &str = "1141";
    pub const INVENTORY: &str = "1161";
    pub const VAT_INPUT: &str = "1170";
    pub const PAYABLES: &str = "2111";
    pub const SALARIES_PAYABLE: &str = "2121";
    pub const VAT_OUTPUT: &str = "2141";
    pub const SALES_REVENUE: &str = "4111";
    pub const GENERAL_EXPENSES: &str = "5200";
    pub const SALARIES_EXPENSE: &str = "5310";

    /// Accounts holding money; a credit balance on one of them is suspicious.
    pub const MONEY_ACCOUNTS: [&str; 3] = ["1111", "1112", "1121"];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Cogs,
    Expense,
    OtherIncome,
    OtherExpense,
    Tax,
}

impl AccountType {
    pub const ALL: [AccountType; 9] = [
        AccountType::Asset,
        AccountType::Liability,
        AccountType::Equity,
        AccountType::Revenue,
        AccountType::Cogs,
        AccountType::Expense,
        AccountType::OtherIncome,
        AccountType::OtherExpense,
        AccountType::Tax,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Asset => "ASSET",
            AccountType::Liability => "LIABILITY",
            AccountType::Equity => "EQUITY",
            AccountType::Revenue => "REVENUE",
            AccountType::Cogs => "COGS",
            AccountType::Expense => "EXPENSE",
            AccountType::OtherIncome => "OTHER_INCOME",
            AccountType::OtherExpense => "OTHER_EXPENSE",
            AccountType::Tax => "TAX",
        }
    }

    pub fn is_credit_normal(&self) -> bool {
        matches!(
            self,
            AccountType::Liability
                | AccountType::Equity
                | AccountType::Revenue
                | AccountType::OtherIncome
                | AccountType::Tax
        )
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = PostingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        AccountType::ALL
            .into_iter()
            .find(|t| t.as_str() == upper)
            .ok_or(PostingError::UnknownAccountType(s.to_string()))
    }
}

/// Balance of an account expressed on its normal side.
pub fn balance(account_type: AccountType, debit: &BigDecimal, credit: &BigDecimal) -> BigDecimal {
    if account_type.is_credit_normal() {
        to_cents(&(credit - debit))
    } else {
        to_cents(&(debit - credit))
    }
}

pub fn normalize_method(method: &str) -> String {
    let m = method.trim().to_ascii_uppercase();
    if m.is_empty() {
        "CASH".to_string()
    } else {
        m
    }
}

pub fn money_account_for(method: &str) -> &'static str {
    match normalize_method(method).as_str() {
        "BANK" | "TRANSFER" | "CARD" | "VISA" | "MASTERCARD" => codes::BANK,
        _ => codes::CASH,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalSource {
    Sales,
    Purchase,
    Expense,
    Payment,
    SalaryAccrual,
    SalaryPayment,
    Manual,
    Import,
}

impl JournalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalSource::Sales => "sales",
            JournalSource::Purchase => "purchase",
            JournalSource::Expense => "expense",
            JournalSource::Payment => "payment",
            JournalSource::SalaryAccrual => "salary_accrual",
            JournalSource::SalaryPayment => "salary_payment",
            JournalSource::Manual => "manual",
            JournalSource::Import => "import",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftLine {
    pub account_code: String,
    #[serde(default = "zero")]
    pub debit: BigDecimal,
    #[serde(default = "zero")]
    pub credit: BigDecimal,
    #[serde(default)]
    pub description: Option<String>,
}

impl DraftLine {
    pub fn debit(code: &str, amount: &BigDecimal) -> Self {
        DraftLine {
            account_code: code.to_string(),
            debit: to_cents(amount),
            credit: zero(),
            description: None,
        }
    }

    pub fn credit(code: &str, amount: &BigDecimal) -> Self {
        DraftLine {
            account_code: code.to_string(),
            debit: zero(),
            credit: to_cents(amount),
            description: None,
        }
    }

    fn is_empty(&self) -> bool {
        self.debit.is_zero() && self.credit.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalDraft {
    pub date: NaiveDate,
    pub description: String,
    pub source: JournalSource,
    /// Document number the entry was generated from.
    #[serde(default)]
    pub source_ref: Option<String>,
    pub lines: Vec<DraftLine>,
}

impl JournalDraft {
    fn new(
        date: NaiveDate,
        description: String,
        source: JournalSource,
        source_ref: &str,
        lines: Vec<DraftLine>,
    ) -> Self {
        JournalDraft {
            date,
            description,
            source,
            source_ref: Some(source_ref.to_string()),
            lines: lines.into_iter().filter(|l| !l.is_empty()).collect(),
        }
    }

    pub fn total_debit(&self) -> BigDecimal {
        self.lines.iter().fold(zero(), |acc, l| acc + &l.debit)
    }

    pub fn total_credit(&self) -> BigDecimal {
        self.lines.iter().fold(zero(), |acc, l| acc + &l.credit)
    }

    /// Entry number before collision handling.
    pub fn base_entry_number(&self) -> String {
        match &self.source_ref {
            Some(r) if !r.trim().is_empty() => format!("JE-{}", r.trim()),
            _ => format!("JE-{}-{}", self.date.format("%Y%m%d"), self.source.as_str().to_uppercase()),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PostingError {
    #[error("a journal entry needs at least two lines")]
    TooFewLines,
    #[error("line {0}: amounts must not be negative")]
    NegativeAmount(usize),
    #[error("line {0}: exactly one of debit or credit must be set")]
    OneSided(usize),
    #[error("entry is not balanced: debit {debit}, credit {credit}")]
    Unbalanced {
        debit: BigDecimal,
        credit: BigDecimal,
    },
    #[error("entry total must be greater than zero")]
    ZeroTotal,
    #[error("account '{0}' does not exist")]
    UnknownAccount(String),
    #[error("account '{0}' is inactive")]
    InactiveAccount(String),
    #[error("account '{0}' does not allow posting")]
    NotPostable(String),
    #[error("unknown account type '{0}'")]
    UnknownAccountType(String),
    #[error(transparent)]
    Period(#[from] PeriodError),
}

/// Gates every draft passes before it is written. Returns the entry total.
pub fn validate_draft(draft: &JournalDraft) -> Result<BigDecimal, PostingError> {
    if draft.lines.len() < 2 {
        return Err(PostingError::TooFewLines);
    }
    for (i, line) in draft.lines.iter().enumerate() {
        let n = i + 1;
        if line.debit < BigDecimal::zero() || line.credit < BigDecimal::zero() {
            return Err(PostingError::NegativeAmount(n));
        }
        if line.debit.is_zero() == line.credit.is_zero() {
            return Err(PostingError::OneSided(n));
        }
    }

    let debit = to_cents(&draft.total_debit());
    let credit = to_cents(&draft.total_credit());
    if debit != credit {
        return Err(PostingError::Unbalanced { debit, credit });
    }
    if debit <= BigDecimal::zero() {
        return Err(PostingError::ZeroTotal);
    }
    Ok(debit)
}

/// `base`, then `base-2`, `base-3`... skipping the numbers already taken.
pub fn unique_entry_number(base: &str, taken: &[String]) -> String {
    if !taken.iter().any(|t| t == base) {
        return base.to_string();
    }
    (2..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// Where an invoice's total lands: the money account when it was settled
/// on creation, receivables/payables otherwise.
pub enum Settlement<'a> {
    Settled { method: &'a str },
    OnAccount,
}

pub fn sales_invoice_draft(
    number: &str,
    date: NaiveDate,
    totals: &InvoiceTotals,
    settlement: Settlement,
) -> JournalDraft {
    let debit_code = match settlement {
        Settlement::Settled { method } => money_account_for(method),
        Settlement::OnAccount => codes::RECEIVABLES,
    };
    JournalDraft::new(
        date,
        format!("Sales invoice {number}"),
        JournalSource::Sales,
        number,
        vec![
            DraftLine::debit(debit_code, &totals.total_after_tax_discount),
            DraftLine::credit(codes::SALES_REVENUE, &totals.net_of_discount()),
            DraftLine::credit(codes::VAT_OUTPUT, &totals.tax_amount),
        ],
    )
}

pub fn purchase_invoice_draft(
    number: &str,
    date: NaiveDate,
    totals: &InvoiceTotals,
    settlement: Settlement,
) -> JournalDraft {
    cost_invoice_draft(
        JournalSource::Purchase,
        format!("Purchase invoice {number}"),
        codes::INVENTORY,
        number,
        date,
        totals,
        settlement,
    )
}

pub fn expense_invoice_draft(
    number: &str,
    date: NaiveDate,
    totals: &InvoiceTotals,
    expense_account: &str,
    settlement: Settlement,
) -> JournalDraft {
    cost_invoice_draft(
        JournalSource::Expense,
        format!("Expense invoice {number}"),
        expense_account,
        number,
        date,
        totals,
        settlement,
    )
}

fn cost_invoice_draft(
    source: JournalSource,
    description: String,
    cost_code: &str,
    number: &str,
    date: NaiveDate,
    totals: &InvoiceTotals,
    settlement: Settlement,
) -> JournalDraft {
    let credit_code = match settlement {
        Settlement::Settled { method } => money_account_for(method),
        Settlement::OnAccount => codes::PAYABLES,
    };
    JournalDraft::new(
        date,
        description,
        source,
        number,
        vec![
            DraftLine::debit(cost_code, &totals.net_of_discount()),
            DraftLine::debit(codes::VAT_INPUT, &totals.tax_amount),
            DraftLine::credit(credit_code, &totals.total_after_tax_discount),
        ],
    )
}

pub fn payment_draft(
    kind: DocumentKind,
    document_number: &str,
    date: NaiveDate,
    amount: &BigDecimal,
    method: &str,
) -> JournalDraft {
    let money = money_account_for(method);
    let (lines, source) = match kind {
        DocumentKind::Sales => (
            vec![
                DraftLine::debit(money, amount),
                DraftLine::credit(codes::RECEIVABLES, amount),
            ],
            JournalSource::Payment,
        ),
        DocumentKind::Purchase | DocumentKind::Expense => (
            vec![
                DraftLine::debit(codes::PAYABLES, amount),
                DraftLine::credit(money, amount),
            ],
            JournalSource::Payment,
        ),
        DocumentKind::Salary => (
            vec![
                DraftLine::debit(codes::SALARIES_PAYABLE, amount),
                DraftLine::credit(money, amount),
            ],
            JournalSource::SalaryPayment,
        ),
    };
    JournalDraft::new(
        date,
        format!("Payment for {kind} {document_number}"),
        source,
        &format!("PAY-{document_number}"),
        lines,
    )
}

pub fn salary_accrual_draft(
    reference: &str,
    employee: &str,
    date: NaiveDate,
    total: &BigDecimal,
) -> JournalDraft {
    JournalDraft::new(
        date,
        format!("Salary accrual {employee} {}", date.format("%Y-%m")),
        JournalSource::SalaryAccrual,
        reference,
        vec![
            DraftLine::debit(codes::SALARIES_EXPENSE, total),
            DraftLine::credit(codes::SALARIES_PAYABLE, total),
        ],
    )
}

#[derive(Debug, Clone)]
pub struct AccountTotals {
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub debit: BigDecimal,
    pub credit: BigDecimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrialBalanceRow {
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub debit: BigDecimal,
    pub credit: BigDecimal,
    pub balance: BigDecimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrialBalance {
    pub as_of: NaiveDate,
    pub rows: Vec<TrialBalanceRow>,
    pub total_debit: BigDecimal,
    pub total_credit: BigDecimal,
    pub balanced: bool,
}

pub fn trial_balance(as_of: NaiveDate, accounts: Vec<AccountTotals>) -> TrialBalance {
    let mut total_debit = zero();
    let mut total_credit = zero();
    let rows: Vec<TrialBalanceRow> = accounts
        .into_iter()
        .filter(|a| !(a.debit.is_zero() && a.credit.is_zero()))
        .map(|a| {
            total_debit = &total_debit + &a.debit;
            total_credit = &total_credit + &a.credit;
            TrialBalanceRow {
                balance: balance(a.account_type, &a.debit, &a.credit),
                debit: to_cents(&a.debit),
                credit: to_cents(&a.credit),
                code: a.code,
                name: a.name,
                account_type: a.account_type,
            }
        })
        .collect();

    TrialBalance {
        as_of,
        balanced: nearly_equal(&total_debit, &total_credit),
        rows,
        total_debit: to_cents(&total_debit),
        total_credit: to_cents(&total_credit),
    }
}

#[derive(Debug, Clone)]
pub struct LedgerMovement {
    pub date: NaiveDate,
    pub entry_number: String,
    pub description: String,
    pub debit: BigDecimal,
    pub credit: BigDecimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatementLine {
    pub date: NaiveDate,
    pub entry_number: String,
    pub description: String,
    pub debit: BigDecimal,
    pub credit: BigDecimal,
    pub balance: BigDecimal,
}

/// Running balance on the account's normal side, starting at `opening`.
pub fn statement(
    account_type: AccountType,
    opening: &BigDecimal,
    movements: Vec<LedgerMovement>,
) -> Vec<StatementLine> {
    let mut running = to_cents(opening);
    movements
        .into_iter()
        .map(|m| {
            running = &running + balance(account_type, &m.debit, &m.credit);
            StatementLine {
                date: m.date,
                entry_number: m.entry_number,
                description: m.description,
                debit: m.debit,
                credit: m.credit,
                balance: running.clone(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportLine {
    pub code: String,
    pub name: String,
    pub amount: BigDecimal,
}

/// Accounts of some types with their balances on the normal side.
#[derive(Debug, Clone, Serialize)]
pub struct ReportSection {
    pub lines: Vec<ReportLine>,
    pub total: BigDecimal,
}

impl ReportSection {
    fn of(accounts: &[AccountTotals], types: &[AccountType]) -> Self {
        let lines: Vec<ReportLine> = accounts
            .iter()
            .filter(|a| types.contains(&a.account_type))
            .map(|a| ReportLine {
                code: a.code.clone(),
                name: a.name.clone(),
                amount: balance(a.account_type, &a.debit, &a.credit),
            })
            .filter(|l| !l.amount.is_zero())
            .collect();
        let total = lines.iter().fold(zero(), |t, l| t + &l.amount);
        Self { lines, total }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IncomeStatement {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub revenue: ReportSection,
    pub cogs: ReportSection,
    pub gross_profit: BigDecimal,
    pub expenses: ReportSection,
    pub operating_profit: BigDecimal,
    pub other_income: ReportSection,
    pub other_expenses: ReportSection,
    pub net_profit: BigDecimal,
}

/// Profit and loss over movements between `start` and `end`. VAT accounts
/// are balance sheet items and never reach it.
pub fn income_statement(start: NaiveDate, end: NaiveDate, accounts: Vec<AccountTotals>) -> IncomeStatement {
    let revenue = ReportSection::of(&accounts, &[AccountType::Revenue]);
    let cogs = ReportSection::of(&accounts, &[AccountType::Cogs]);
    let expenses = ReportSection::of(&accounts, &[AccountType::Expense]);
    let other_income = ReportSection::of(&accounts, &[AccountType::OtherIncome]);
    let other_expenses = ReportSection::of(&accounts, &[AccountType::OtherExpense]);

    let gross_profit = &revenue.total - &cogs.total;
    let operating_profit = &gross_profit - &expenses.total;
    let net_profit = &operating_profit + &other_income.total - &other_expenses.total;

    IncomeStatement {
        start,
        end,
        revenue,
        cogs,
        gross_profit: to_cents(&gross_profit),
        expenses,
        operating_profit: to_cents(&operating_profit),
        other_income,
        other_expenses,
        net_profit: to_cents(&net_profit),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceSheet {
    pub as_of: NaiveDate,
    pub assets: ReportSection,
    pub liabilities: ReportSection,
    pub equity: ReportSection,
    /// Profit not yet closed into equity.
    pub current_earnings: BigDecimal,
    pub total_liabilities_and_equity: BigDecimal,
    pub balanced: bool,
}

/// Position at `as_of` from cumulative totals. Tax accounts are shown
/// with liabilities; an input VAT debit balance reduces them.
pub fn balance_sheet(as_of: NaiveDate, accounts: Vec<AccountTotals>) -> BalanceSheet {
    let assets = ReportSection::of(&accounts, &[AccountType::Asset]);
    let liabilities = ReportSection::of(&accounts, &[AccountType::Liability, AccountType::Tax]);
    let equity = ReportSection::of(&accounts, &[AccountType::Equity]);
    let current_earnings = income_statement(as_of, as_of, accounts).net_profit;

    let total = &liabilities.total + &equity.total + &current_earnings;
    BalanceSheet {
        as_of,
        balanced: nearly_equal(&assets.total, &total),
        assets,
        liabilities,
        equity,
        current_earnings,
        total_liabilities_and_equity: to_cents(&total),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::totals::{compute_invoice, Discount, LineInput};

    fn d(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()
    }

    fn totals() -> InvoiceTotals {
        compute_invoice(
            &[LineInput {
                description: "rice".to_string(),
                quantity: d("2"),
                unit_price: d("50"),
                discount: Discount::Percent(d("10")),
            }],
            &d("15"),
        )
        .unwrap()
    }

    fn code_amounts(draft: &JournalDraft) -> Vec<(&str, String, String)> {
        draft
            .lines
            .iter()
            .map(|l| (l.account_code.as_str(), l.debit.to_string(), l.credit.to_string()))
            .collect()
    }

    #[test]
    fn normal_sides() {
        assert_eq!(balance(AccountType::Asset, &d("100"), &d("30")), d("70"));
        assert_eq!(balance(AccountType::Revenue, &d("10"), &d("30")), d("20"));
        assert_eq!(balance(AccountType::Tax, &d("0"), &d("15")), d("15"));
        assert_eq!(balance(AccountType::Expense, &d("0"), &d("15")), d("-15"));
        assert_eq!("other_income".parse::<AccountType>().unwrap(), AccountType::OtherIncome);
    }

    #[test]
    fn payment_methods_map_to_money_accounts() {
        assert_eq!(money_account_for("visa"), codes::BANK);
        assert_eq!(money_account_for(" Transfer "), codes::BANK);
        assert_eq!(money_account_for("cash"), codes::CASH);
        assert_eq!(money_account_for(""), codes::CASH);
        assert_eq!(normalize_method(" mada "), "MADA");
    }

    #[test]
    fn gates_reject_bad_drafts() {
        let mut draft = JournalDraft {
            date: date(),
            description: "manual".to_string(),
            source: JournalSource::Manual,
            source_ref: None,
            lines: vec![DraftLine::debit(codes::CASH, &d("10"))],
        };
        assert_eq!(validate_draft(&draft), Err(PostingError::TooFewLines));

        draft.lines.push(DraftLine::credit("3110", &d("9.98")));
        assert!(matches!(
            validate_draft(&draft),
            Err(PostingError::Unbalanced { .. })
        ));

        draft.lines[1] = DraftLine {
            account_code: "3110".to_string(),
            debit: d("1"),
            credit: d("10"),
            description: None,
        };
        assert_eq!(validate_draft(&draft), Err(PostingError::OneSided(2)));

        draft.lines[1] = DraftLine::credit("3110", &d("-10"));
        draft.lines[0] = DraftLine::debit(codes::CASH, &d("-10"));
        assert_eq!(validate_draft(&draft), Err(PostingError::NegativeAmount(1)));

        draft.lines[0] = DraftLine::debit(codes::CASH, &d("10"));
        draft.lines[1] = DraftLine::credit("3110", &d("10"));
        assert_eq!(validate_draft(&draft), Ok(d("10.00")));
    }

    #[test]
    fn sales_template() {
        let t = totals();
        let draft = sales_invoice_draft("SAL-2024-001", date(), &t, Settlement::OnAccount);
        assert_eq!(
            code_amounts(&draft),
            vec![
                ("1141", "103.50".to_string(), "0.00".to_string()),
                ("4111", "0.00".to_string(), "88.50".to_string()),
                ("2141", "0.00".to_string(), "15.00".to_string()),
            ]
        );
        assert_eq!(validate_draft(&draft), Ok(d("103.50")));
        assert_eq!(draft.base_entry_number(), "JE-SAL-2024-001");

        let paid = sales_invoice_draft("SAL-2024-002", date(), &t, Settlement::Settled { method: "card" });
        assert_eq!(paid.lines[0].account_code, codes::BANK);
    }

    #[test]
    fn purchase_and_expense_templates() {
        let t = totals();
        let p = purchase_invoice_draft("PUR-2024-001", date(), &t, Settlement::OnAccount);
        assert_eq!(p.lines[0].account_code, codes::INVENTORY);
        assert_eq!(p.lines[1].account_code, codes::VAT_INPUT);
        assert_eq!(p.lines[2].account_code, codes::PAYABLES);
        assert!(validate_draft(&p).is_ok());

        let e = expense_invoice_draft(
            "EXP-2024-001",
            date(),
            &t,
            codes::GENERAL_EXPENSES,
            Settlement::Settled { method: "cash" },
        );
        assert_eq!(e.lines[0].account_code, codes::GENERAL_EXPENSES);
        assert_eq!(e.lines[2].account_code, codes::CASH);
        assert!(validate_draft(&e).is_ok());
    }

    #[test]
    fn zero_tax_line_is_dropped() {
        let t = compute_invoice(
            &[LineInput {
                description: "water".to_string(),
                quantity: d("1"),
                unit_price: d("5"),
                discount: Discount::None,
            }],
            &d("0"),
        )
        .unwrap();
        let draft = sales_invoice_draft("SAL-2024-003", date(), &t, Settlement::OnAccount);
        assert_eq!(draft.lines.len(), 2);
        assert!(validate_draft(&draft).is_ok());
    }

    #[test]
    fn payment_and_salary_templates() {
        let sale = payment_draft(DocumentKind::Sales, "SAL-2024-001", date(), &d("40"), "cash");
        assert_eq!(
            code_amounts(&sale),
            vec![
                ("1111", "40.00".to_string(), "0.00".to_string()),
                ("1141", "0.00".to_string(), "40.00".to_string()),
            ]
        );
        assert_eq!(sale.base_entry_number(), "JE-PAY-SAL-2024-001");

        let supplier = payment_draft(DocumentKind::Purchase, "PUR-2024-001", date(), &d("40"), "bank");
        assert_eq!(supplier.lines[0].account_code, codes::PAYABLES);
        assert_eq!(supplier.lines[1].account_code, codes::BANK);

        let salary = payment_draft(DocumentKind::Salary, "SAL-E001-2024-03", date(), &d("40"), "cash");
        assert_eq!(salary.source, JournalSource::SalaryPayment);
        assert_eq!(salary.lines[0].account_code, codes::SALARIES_PAYABLE);

        let accrual = salary_accrual_draft("E001-2024-03", "Ali", date(), &d("3000"));
        assert_eq!(accrual.lines[0].account_code, codes::SALARIES_EXPENSE);
        assert_eq!(accrual.lines[1].account_code, codes::SALARIES_PAYABLE);
        assert!(validate_draft(&accrual).is_ok());
    }

    #[test]
    fn entry_numbers_get_suffixes() {
        let taken = vec!["JE-PAY-SAL-1".to_string(), "JE-PAY-SAL-1-2".to_string()];
        assert_eq!(unique_entry_number("JE-PAY-SAL-1", &taken), "JE-PAY-SAL-1-3");
        assert_eq!(unique_entry_number("JE-X", &taken), "JE-X");
    }

    #[test]
    fn trial_balance_totals() {
        let tb = trial_balance(
            date(),
            vec![
                AccountTotals {
                    code: "1111".to_string(),
                    name: "Cash".to_string(),
                    account_type: AccountType::Asset,
                    debit: d("150"),
                    credit: d("40"),
                },
                AccountTotals {
                    code: "4111".to_string(),
                    name: "Sales".to_string(),
                    account_type: AccountType::Revenue,
                    debit: d("0"),
                    credit: d("110"),
                },
                AccountTotals {
                    code: "5200".to_string(),
                    name: "Unused".to_string(),
                    account_type: AccountType::Expense,
                    debit: d("0"),
                    credit: d("0"),
                },
                AccountTotals {
                    code: "2111".to_string(),
                    name: "Payables".to_string(),
                    account_type: AccountType::Liability,
                    debit: d("40"),
                    credit: d("40"),
                },
            ],
        );
        assert_eq!(tb.rows.len(), 3);
        assert_eq!(tb.rows[0].balance, d("110"));
        assert_eq!(tb.rows[1].balance, d("110"));
        assert_eq!(tb.total_debit, d("190"));
        assert!(tb.balanced);
    }

    #[test]
    fn running_statement() {
        let lines = statement(
            AccountType::Asset,
            &d("100"),
            vec![
                LedgerMovement {
                    date: date(),
                    entry_number: "JE-1".to_string(),
                    description: "in".to_string(),
                    debit: d("50"),
                    credit: d("0"),
                },
                LedgerMovement {
                    date: date(),
                    entry_number: "JE-2".to_string(),
                    description: "out".to_string(),
                    debit: d("0"),
                    credit: d("30"),
                },
            ],
        );
        assert_eq!(lines[0].balance, d("150"));
        assert_eq!(lines[1].balance, d("120"));
    }

    fn totals_of(code: &str, account_type: AccountType, debit: &str, credit: &str) -> AccountTotals {
        AccountTotals {
            code: code.to_string(),
            name: code.to_string(),
            account_type,
            debit: d(debit),
            credit: d(credit),
        }
    }

    fn ledger() -> Vec<AccountTotals> {
        vec![
            totals_of("1111", AccountType::Asset, "1725", "300"),
            totals_of("1161", AccountType::Asset, "200", "120"),
            totals_of("1170", AccountType::Asset, "30", "0"),
            totals_of("2111", AccountType::Liability, "100", "230"),
            totals_of("2141", AccountType::Tax, "0", "225"),
            totals_of("3110", AccountType::Equity, "0", "500"),
            totals_of("4111", AccountType::Revenue, "0", "1500"),
            totals_of("4210", AccountType::OtherIncome, "0", "20"),
            totals_of("5100", AccountType::Cogs, "120", "0"),
            totals_of("5200", AccountType::Expense, "200", "0"),
            totals_of("5900", AccountType::OtherExpense, "0", "0"),
        ]
    }

    #[test]
    fn income_statement_by_type() {
        let is = income_statement(date(), date(), ledger());
        assert_eq!(is.revenue.total, d("1500"));
        assert_eq!(is.cogs.total, d("120"));
        assert_eq!(is.gross_profit, d("1380"));
        assert_eq!(is.expenses.total, d("200"));
        assert_eq!(is.operating_profit, d("1180"));
        assert_eq!(is.other_income.total, d("20"));
        assert!(is.other_expenses.lines.is_empty());
        assert_eq!(is.net_profit, d("1200"));
        assert!(is.revenue.lines.iter().all(|l| l.code != "2141"));
    }

    #[test]
    fn balance_sheet_includes_current_earnings() {
        let bs = balance_sheet(date(), ledger());
        assert_eq!(bs.assets.total, d("1535"));
        assert_eq!(bs.liabilities.total, d("355"));
        assert_eq!(bs.equity.total, d("500"));
        assert_eq!(bs.current_earnings, d("1200"));
        assert_eq!(bs.total_liabilities_and_equity, d("2055"));
        assert!(!bs.balanced);
    }

    #[test]
    fn balanced_ledger_gives_balanced_sheet() {
        // capital 500 in cash, a 100 sale with 15 VAT, 40 of expenses paid
        let bs = balance_sheet(
            date(),
            vec![
                totals_of("1111", AccountType::Asset, "615", "40"),
                totals_of("2141", AccountType::Tax, "0", "15"),
                totals_of("3110", AccountType::Equity, "0", "500"),
                totals_of("4111", AccountType::Revenue, "0", "100"),
                totals_of("5200", AccountType::Expense, "40", "0"),
            ],
        );
        assert_eq!(bs.assets.total, d("575"));
        assert_eq!(bs.current_earnings, d("60"));
        assert_eq!(bs.total_liabilities_and_equity, d("575"));
        assert!(bs.balanced);
    }
}
