//! Heuristic consistency checks over posted journals and invoices.
//!
//! The engine is pure: callers load an [`AuditDataset`] (journals dated up
//! to the end of the range, so balances are cumulative) and get back a
//! numbered report. Fiscal transitions keep only the [`AuditSnapshot`].

use std::collections::{BTreeMap, HashMap};

use bigdecimal::{num_traits::Zero, BigDecimal};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{
    fiscal::FiscalYearStatus,
    journal::codes,
    money::{nearly_equal, settlement_tolerance, to_cents, zero},
    reconciliation::DocumentKind,
};

const MISSING_JOURNAL_SAMPLES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub number: usize,
    pub category: String,
    pub place: String,
    pub reference: String,
    pub date: Option<NaiveDate>,
    pub description: String,
    pub details: String,
    pub root_cause: String,
    pub severity: Severity,
    pub correction: String,
}

impl Finding {
    fn new(
        severity: Severity,
        category: &str,
        place: &str,
        reference: impl Into<String>,
        date: Option<NaiveDate>,
    ) -> Self {
        Finding {
            number: 0,
            category: category.to_string(),
            place: place.to_string(),
            reference: reference.into(),
            date,
            description: String::new(),
            details: String::new(),
            root_cause: String::new(),
            severity,
            correction: String::new(),
        }
    }

    fn describe(mut self, description: impl Into<String>, details: impl Into<String>) -> Self {
        self.description = description.into();
        self.details = details.into();
        self
    }

    fn cause(mut self, root_cause: &str, correction: &str) -> Self {
        self.root_cause = root_cause.to_string();
        self.correction = correction.to_string();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub run_at: DateTime<Utc>,
    pub findings: Vec<Finding>,
    pub summary: Summary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSnapshot {
    pub run_at: DateTime<Utc>,
    pub summary: Summary,
}

pub fn snapshot(report: &AuditReport) -> AuditSnapshot {
    AuditSnapshot {
        run_at: report.run_at,
        summary: report.summary.clone(),
    }
}

#[derive(Debug, Clone)]
pub struct AuditAccount {
    pub code: String,
    pub name: String,
    pub active: bool,
    pub allow_posting: bool,
}

#[derive(Debug, Clone)]
pub struct AuditLine {
    pub account_code: String,
    pub debit: BigDecimal,
    pub credit: BigDecimal,
}

#[derive(Debug, Clone)]
pub struct AuditJournal {
    pub entry_number: String,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub total_debit: BigDecimal,
    pub total_credit: BigDecimal,
    pub lines: Vec<AuditLine>,
}

#[derive(Debug, Clone)]
pub struct AuditInvoice {
    pub kind: DocumentKind,
    pub number: String,
    pub date: NaiveDate,
    pub party: String,
    pub total: BigDecimal,
    pub tax_amount: BigDecimal,
    pub paid: BigDecimal,
    pub journal_number: Option<String>,
    pub external_journal_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuditFiscalYear {
    pub year: i32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub status: FiscalYearStatus,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct AuditDataset {
    pub accounts: Vec<AuditAccount>,
    pub journals: Vec<AuditJournal>,
    pub invoices: Vec<AuditInvoice>,
    pub fiscal_years: Vec<AuditFiscalYear>,
}

struct Range {
    start: NaiveDate,
    end: NaiveDate,
}

impl Range {
    fn contains(&self, d: NaiveDate) -> bool {
        self.start <= d && d <= self.end
    }
}

pub fn run_audit(
    ds: &AuditDataset,
    start: NaiveDate,
    end: NaiveDate,
    run_at: DateTime<Utc>,
) -> AuditReport {
    let range = Range { start, end };
    let journals: Vec<&AuditJournal> = ds.journals.iter().filter(|j| range.contains(j.date)).collect();
    let invoices: Vec<&AuditInvoice> = ds.invoices.iter().filter(|i| range.contains(i.date)).collect();

    let mut findings = Vec::new();
    check_entries(&journals, &mut findings);
    check_vat(&invoices, &ds.journals, &mut findings);
    check_uncovered_dates(&journals, ds, &mut findings);
    check_accounts(&journals, ds, &mut findings);
    check_global_balance(&journals, &range, &mut findings);
    check_cash_credit(ds, &range, &mut findings);
    check_missing_journals(&invoices, &mut findings);
    check_closed_periods(&journals, ds, &mut findings);
    check_supplier_overpayment(&invoices, &mut findings);

    let mut summary = Summary::default();
    for (i, f) in findings.iter_mut().enumerate() {
        f.number = i + 1;
        summary.total += 1;
        match f.severity {
            Severity::High => summary.high += 1,
            Severity::Medium => summary.medium += 1,
            Severity::Low => summary.low += 1,
        }
    }

    AuditReport {
        start,
        end,
        run_at,
        findings,
        summary,
    }
}

fn line_sums(j: &AuditJournal) -> (BigDecimal, BigDecimal) {
    j.lines.iter().fold((zero(), zero()), |(d, c), l| (d + &l.debit, c + &l.credit))
}

fn check_entries(journals: &[&AuditJournal], out: &mut Vec<Finding>) {
    for j in journals {
        if j.lines.is_empty() {
            out.push(
                Finding::new(Severity::High, "empty_entry", "journal_entries", &j.entry_number, Some(j.date))
                    .describe("posted journal entry has no lines", "")
                    .cause("entry header saved without its lines", "delete the entry or add its lines"),
            );
            continue;
        }

        let (debit, credit) = line_sums(j);
        if !nearly_equal(&debit, &credit) {
            out.push(
                Finding::new(Severity::High, "unbalanced", "journal_lines", &j.entry_number, Some(j.date))
                    .describe(
                        "journal lines do not balance",
                        format!("debit {} credit {}", to_cents(&debit), to_cents(&credit)),
                    )
                    .cause("lines edited or imported outside the posting gates", "correct the lines so debits equal credits"),
            );
        }

        if !nearly_equal(&j.total_debit, &j.total_credit) {
            out.push(
                Finding::new(Severity::High, "header_mismatch", "journal_entries", &j.entry_number, Some(j.date))
                    .describe(
                        "header debit and credit totals differ",
                        format!("header debit {} credit {}", j.total_debit, j.total_credit),
                    )
                    .cause("header totals not maintained with the lines", "recompute the header totals"),
            );
        } else if !nearly_equal(&j.total_debit, &debit) || !nearly_equal(&j.total_credit, &credit) {
            out.push(
                Finding::new(Severity::Medium, "header_mismatch", "journal_entries", &j.entry_number, Some(j.date))
                    .describe(
                        "header totals differ from the sum of the lines",
                        format!(
                            "header {} / {}, lines {} / {}",
                            j.total_debit,
                            j.total_credit,
                            to_cents(&debit),
                            to_cents(&credit)
                        ),
                    )
                    .cause("lines changed after the header was written", "recompute the header totals"),
            );
        }
    }
}

fn check_vat(invoices: &[&AuditInvoice], all_journals: &[AuditJournal], out: &mut Vec<Finding>) {
    let by_number: HashMap<&str, &AuditJournal> = all_journals
        .iter()
        .map(|j| (j.entry_number.as_str(), j))
        .collect();

    for inv in invoices {
        if inv.tax_amount <= BigDecimal::zero() {
            continue;
        }
        let Some(journal) = inv.journal_number.as_deref().and_then(|n| by_number.get(n)) else {
            continue;
        };
        let (code, recorded) = match inv.kind {
            DocumentKind::Sales => (
                codes::VAT_OUTPUT,
                journal
                    .lines
                    .iter()
                    .filter(|l| l.account_code == codes::VAT_OUTPUT)
                    .fold(zero(), |acc, l| acc + &l.credit - &l.debit),
            ),
            _ => (
                codes::VAT_INPUT,
                journal
                    .lines
                    .iter()
                    .filter(|l| l.account_code == codes::VAT_INPUT)
                    .fold(zero(), |acc, l| acc + &l.debit - &l.credit),
            ),
        };
        if recorded.is_zero() || !nearly_equal(&recorded, &inv.tax_amount) {
            out.push(
                Finding::new(Severity::Medium, "vat", inv.kind.as_str(), &inv.number, Some(inv.date))
                    .describe(
                        format!("VAT on account {code} does not match the invoice"),
                        format!("invoice tax {} journal {} {}", inv.tax_amount, journal.entry_number, to_cents(&recorded)),
                    )
                    .cause("tax line missing or posted with a different amount", "post a correcting entry for the VAT difference"),
            );
        }
    }
}

fn check_uncovered_dates(journals: &[&AuditJournal], ds: &AuditDataset, out: &mut Vec<Finding>) {
    for j in journals {
        let covered = ds
            .fiscal_years
            .iter()
            .any(|y| y.start_date <= j.date && j.date <= y.end_date);
        if !covered {
            out.push(
                Finding::new(Severity::Medium, "uncovered_date", "journal_entries", &j.entry_number, Some(j.date))
                    .describe("entry date is outside every fiscal year", "")
                    .cause("fiscal year not created before posting", "create the fiscal year or correct the entry date"),
            );
        }
    }
}

fn check_accounts(journals: &[&AuditJournal], ds: &AuditDataset, out: &mut Vec<Finding>) {
    let accounts: HashMap<&str, &AuditAccount> =
        ds.accounts.iter().map(|a| (a.code.as_str(), a)).collect();

    for j in journals {
        for l in &j.lines {
            match accounts.get(l.account_code.as_str()) {
                None => out.push(
                    Finding::new(Severity::High, "accounts", "journal_lines", &j.entry_number, Some(j.date))
                        .describe(format!("line references missing account {}", l.account_code), "")
                        .cause("account deleted or code mistyped", "recreate the account or repost the line"),
                ),
                Some(a) if !a.active || !a.allow_posting => out.push(
                    Finding::new(Severity::Medium, "accounts", "journal_lines", &j.entry_number, Some(j.date))
                        .describe(
                            format!("line posted to account {} {}", a.code, a.name),
                            if a.active { "account does not allow posting" } else { "account is inactive" },
                        )
                        .cause("account settings changed after posting", "move the amount to a postable account"),
                ),
                Some(_) => {}
            }
        }
    }
}

fn check_global_balance(journals: &[&AuditJournal], range: &Range, out: &mut Vec<Finding>) {
    let (debit, credit) = journals.iter().fold((zero(), zero()), |(d, c), j| {
        let (jd, jc) = line_sums(j);
        (d + jd, c + jc)
    });
    if !nearly_equal(&debit, &credit) {
        out.push(
            Finding::new(Severity::High, "global_balance", "journal_lines", "ALL", None)
                .describe(
                    format!("ledger does not balance between {} and {}", range.start, range.end),
                    format!("debit {} credit {}", to_cents(&debit), to_cents(&credit)),
                )
                .cause("one or more unbalanced entries", "fix the unbalanced entries listed in this report"),
        );
    }
}

fn check_cash_credit(ds: &AuditDataset, range: &Range, out: &mut Vec<Finding>) {
    let mut balances: BTreeMap<&str, BigDecimal> = BTreeMap::new();
    for j in ds.journals.iter().filter(|j| j.date <= range.end) {
        for l in &j.lines {
            if codes::MONEY_ACCOUNTS.contains(&l.account_code.as_str()) {
                let b = balances.entry(l.account_code.as_str()).or_insert_with(zero);
                *b = &*b + &l.debit - &l.credit;
            }
        }
    }
    for (code, b) in balances {
        if to_cents(&b) < BigDecimal::zero() {
            out.push(
                Finding::new(Severity::Medium, "cash_credit", "accounts", code, Some(range.end))
                    .describe(
                        format!("money account {code} has a credit balance"),
                        format!("balance {}", to_cents(&b)),
                    )
                    .cause("payments recorded before the matching receipts", "check payment methods and missing receipts"),
            );
        }
    }
}

fn check_missing_journals(invoices: &[&AuditInvoice], out: &mut Vec<Finding>) {
    for kind in [DocumentKind::Sales, DocumentKind::Purchase, DocumentKind::Expense] {
        let missing: Vec<&str> = invoices
            .iter()
            .filter(|i| i.kind == kind && i.journal_number.is_none() && i.external_journal_id.is_none())
            .map(|i| i.number.as_str())
            .collect();
        if missing.is_empty() {
            continue;
        }
        let sample: Vec<&str> = missing.iter().take(MISSING_JOURNAL_SAMPLES).copied().collect();
        out.push(
            Finding::new(Severity::Medium, "missing_journal", kind.as_str(), sample.join(", "), None)
                .describe(
                    format!("{} {kind} invoices have no journal entry", missing.len()),
                    format!("sample: {}", sample.join(", ")),
                )
                .cause("invoice saved while posting was skipped or failed", "post the missing journals"),
        );
    }
}

fn check_closed_periods(journals: &[&AuditJournal], ds: &AuditDataset, out: &mut Vec<Finding>) {
    for j in journals {
        let year = ds
            .fiscal_years
            .iter()
            .filter(|y| y.start_date <= j.date && j.date <= y.end_date)
            .max_by_key(|y| y.start_date);
        let Some(year) = year else { continue };
        if year.status != FiscalYearStatus::Closed {
            continue;
        }
        if let Some(closed_at) = year.closed_at {
            if j.created_at > closed_at {
                out.push(
                    Finding::new(Severity::High, "closed_period", "journal_entries", &j.entry_number, Some(j.date))
                        .describe(
                            format!("entry created after fiscal year {} was closed", year.year),
                            format!("created {} closed {}", j.created_at, closed_at),
                        )
                        .cause("posting bypassed the period check", "reverse the entry or reopen the year"),
                );
            }
        }
    }
}

fn check_supplier_overpayment(invoices: &[&AuditInvoice], out: &mut Vec<Finding>) {
    let mut per_supplier: BTreeMap<String, (BigDecimal, BigDecimal)> = BTreeMap::new();
    for inv in invoices.iter().filter(|i| i.kind == DocumentKind::Purchase) {
        let e = per_supplier
            .entry(inv.party.trim().to_lowercase())
            .or_insert_with(|| (zero(), zero()));
        e.0 = &e.0 + &inv.total;
        e.1 = &e.1 + &inv.paid;
    }
    for (supplier, (total, paid)) in per_supplier {
        if to_cents(&(&paid - &total)) > settlement_tolerance() {
            out.push(
                Finding::new(Severity::High, "supplier_overpayment", "payments", &supplier, None)
                    .describe(
                        format!("supplier {supplier} was paid more than invoiced"),
                        format!("invoiced {} paid {}", to_cents(&total), to_cents(&paid)),
                    )
                    .cause("duplicate or misallocated payment", "recover the excess or record a supplier credit"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::TimeZone;

    use super::*;

    fn d(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    fn ymd(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ts(y: i32, m: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, day, 12, 0, 0).unwrap()
    }

    fn line(code: &str, debit: &str, credit: &str) -> AuditLine {
        AuditLine {
            account_code: code.to_string(),
            debit: d(debit),
            credit: d(credit),
        }
    }

    fn journal(number: &str, date: NaiveDate, lines: Vec<AuditLine>) -> AuditJournal {
        let (debit, credit) = lines
            .iter()
            .fold((zero(), zero()), |(a, b), l| (a + &l.debit, b + &l.credit));
        AuditJournal {
            entry_number: number.to_string(),
            date,
            created_at: ts(2024, 1, 1),
            total_debit: debit,
            total_credit: credit,
            lines,
        }
    }

    fn account(code: &str) -> AuditAccount {
        AuditAccount {
            code: code.to_string(),
            name: code.to_string(),
            active: true,
            allow_posting: true,
        }
    }

    fn invoice(kind: DocumentKind, number: &str, total: &str, tax: &str, paid: &str, journal: Option<&str>) -> AuditInvoice {
        AuditInvoice {
            kind,
            number: number.to_string(),
            date: ymd(2024, 3, 1),
            party: "Fresh Farms".to_string(),
            total: d(total),
            tax_amount: d(tax),
            paid: d(paid),
            journal_number: journal.map(str::to_string),
            external_journal_id: None,
        }
    }

    fn base() -> AuditDataset {
        AuditDataset {
            accounts: ["1111", "1141", "1161", "1170", "2111", "2141", "4111"]
                .into_iter()
                .map(account)
                .collect(),
            journals: vec![journal(
                "JE-SAL-2024-001",
                ymd(2024, 3, 1),
                vec![line("1141", "115", "0"), line("4111", "0", "100"), line("2141", "0", "15")],
            )],
            invoices: vec![invoice(DocumentKind::Sales, "SAL-2024-001", "115", "15", "0", Some("JE-SAL-2024-001"))],
            fiscal_years: vec![AuditFiscalYear {
                year: 2024,
                start_date: ymd(2024, 1, 1),
                end_date: ymd(2024, 12, 31),
                status: FiscalYearStatus::Open,
                closed_at: None,
            }],
        }
    }

    fn run(ds: &AuditDataset) -> AuditReport {
        run_audit(ds, ymd(2024, 1, 1), ymd(2024, 12, 31), ts(2024, 12, 31))
    }

    fn categories(r: &AuditReport) -> Vec<&str> {
        r.findings.iter().map(|f| f.category.as_str()).collect()
    }

    #[test]
    fn clean_books_have_no_findings() {
        let r = run(&base());
        assert!(r.findings.is_empty(), "{:?}", r.findings);
        assert_eq!(r.summary, Summary::default());
    }

    #[test]
    fn unbalanced_entry_is_high() {
        let mut ds = base();
        ds.journals.push(journal(
            "JE-BAD",
            ymd(2024, 4, 1),
            vec![line("1111", "10", "0"), line("4111", "0", "9")],
        ));
        let r = run(&ds);
        assert_eq!(categories(&r), vec!["unbalanced", "header_mismatch", "global_balance"]);
        assert_eq!(r.summary.high, 3);
        assert_eq!(r.findings[0].number, 1);
        assert_eq!(r.findings[2].number, 3);
    }

    #[test]
    fn header_out_of_step_with_lines() {
        let mut ds = base();
        ds.journals[0].total_debit = d("120");
        ds.journals[0].total_credit = d("120");
        let r = run(&ds);
        assert_eq!(categories(&r), vec!["header_mismatch"]);
        assert_eq!(r.findings[0].severity, Severity::Medium);
    }

    #[test]
    fn empty_entry() {
        let mut ds = base();
        ds.journals.push(journal("JE-EMPTY", ymd(2024, 5, 1), vec![]));
        assert_eq!(categories(&run(&ds)), vec!["empty_entry"]);
    }

    #[test]
    fn vat_mismatch() {
        let mut ds = base();
        ds.invoices[0].tax_amount = d("17");
        let r = run(&ds);
        assert_eq!(categories(&r), vec!["vat"]);
        assert_eq!(r.summary.medium, 1);
    }

    #[test]
    fn uncovered_date() {
        let mut ds = base();
        ds.fiscal_years.clear();
        assert_eq!(categories(&run(&ds)), vec!["uncovered_date"]);
    }

    #[test]
    fn missing_and_inactive_accounts() {
        let mut ds = base();
        ds.accounts.retain(|a| a.code != "4111");
        ds.accounts.iter_mut().find(|a| a.code == "2141").unwrap().active = false;
        let r = run(&ds);
        assert_eq!(categories(&r), vec!["accounts", "accounts"]);
        assert_eq!(r.findings[0].severity, Severity::High);
        assert_eq!(r.findings[1].severity, Severity::Medium);
    }

    #[test]
    fn cash_with_credit_balance() {
        let mut ds = base();
        ds.accounts.push(account("2111"));
        ds.journals.push(journal(
            "JE-PAY",
            ymd(2024, 6, 1),
            vec![line("2111", "50", "0"), line("1111", "0", "50")],
        ));
        assert_eq!(categories(&run(&ds)), vec!["cash_credit"]);
    }

    #[test]
    fn missing_journal_samples_five() {
        let mut ds = base();
        for n in 2..=8 {
            ds.invoices.push(invoice(DocumentKind::Sales, &format!("SAL-2024-00{n}"), "10", "0", "0", None));
        }
        let r = run(&ds);
        assert_eq!(categories(&r), vec!["missing_journal"]);
        assert_eq!(r.findings[0].reference.split(", ").count(), 5);
        assert!(r.findings[0].description.starts_with("7 sales"));
    }

    #[test]
    fn entries_after_close() {
        let mut ds = base();
        ds.fiscal_years[0].status = FiscalYearStatus::Closed;
        ds.fiscal_years[0].closed_at = Some(ts(2023, 12, 31));
        assert_eq!(categories(&run(&ds)), vec!["closed_period"]);
    }

    #[test]
    fn supplier_paid_too_much() {
        let mut ds = base();
        ds.invoices.push(invoice(DocumentKind::Purchase, "PUR-2024-001", "100", "0", "100", Some("JE-X")));
        ds.invoices.push(invoice(DocumentKind::Purchase, "PUR-2024-002", "50", "0", "80", Some("JE-Y")));
        let r = run(&ds);
        assert_eq!(categories(&r), vec!["supplier_overpayment"]);
        assert_eq!(r.findings[0].reference, "fresh farms");
    }

    #[test]
    fn snapshot_keeps_summary() {
        let mut ds = base();
        ds.fiscal_years.clear();
        let r = run(&ds);
        let s = snapshot(&r);
        assert_eq!(s.summary.total, 1);
        assert_eq!(s.run_at, r.run_at);
    }
}
