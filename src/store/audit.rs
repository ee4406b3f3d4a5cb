use std::collections::HashMap;

use anyhow::anyhow;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::accounting::{
    audit::{
        run_audit, AuditAccount, AuditDataset, AuditFiscalYear, AuditInvoice, AuditJournal,
        AuditLine, AuditReport,
    },
    fiscal::FiscalYearStatus,
};

#[derive(sqlx::FromRow)]
struct JournalRow {
    id: Uuid,
    entry_number: String,
    entry_date: NaiveDate,
    created_at: DateTime<Utc>,
    total_debit: BigDecimal,
    total_credit: BigDecimal,
}

#[derive(sqlx::FromRow)]
struct LineRow {
    journal_id: Uuid,
    account_code: String,
    debit: BigDecimal,
    credit: BigDecimal,
}

#[derive(sqlx::FromRow)]
struct InvoiceRow {
    kind: String,
    invoice_number: String,
    date: NaiveDate,
    party_name: String,
    total: BigDecimal,
    tax_amount: BigDecimal,
    paid: BigDecimal,
    journal_number: Option<String>,
    external_journal_id: Option<String>,
}

#[derive(sqlx::FromRow)]
struct YearRow {
    year: i32,
    start_date: NaiveDate,
    end_date: NaiveDate,
    status: String,
    closed_at: Option<DateTime<Utc>>,
}

/// Everything the audit rules look at, dated up to `end`.
pub async fn load_dataset(conn: &mut PgConnection, end: NaiveDate) -> anyhow::Result<AuditDataset> {
    let accounts = sqlx::query_as::<_, (String, String, bool, bool)>(
        "SELECT code, name, active, allow_posting FROM accounts",
    )
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|(code, name, active, allow_posting)| AuditAccount {
        code,
        name,
        active,
        allow_posting,
    })
    .collect();

    let journal_rows = sqlx::query_as::<_, JournalRow>(
        r#"
        SELECT id, entry_number, entry_date, created_at, total_debit, total_credit
        FROM journal_entries
        WHERE entry_date <= $1 AND status = 'posted'
        ORDER BY entry_date, entry_number
        "#,
    )
    .bind(end)
    .fetch_all(&mut *conn)
    .await?;

    let line_rows = sqlx::query_as::<_, LineRow>(
        r#"
        SELECT l.journal_id, l.account_code, l.debit, l.credit
        FROM journal_lines l
        JOIN journal_entries e ON e.id = l.journal_id
        WHERE e.entry_date <= $1
        ORDER BY l.journal_id, l.line_no
        "#,
    )
    .bind(end)
    .fetch_all(&mut *conn)
    .await?;

    let mut lines: HashMap<Uuid, Vec<AuditLine>> = HashMap::new();
    for l in line_rows {
        lines.entry(l.journal_id).or_default().push(AuditLine {
            account_code: l.account_code,
            debit: l.debit,
            credit: l.credit,
        });
    }

    let journals = journal_rows
        .into_iter()
        .map(|j| AuditJournal {
            lines: lines.remove(&j.id).unwrap_or_default(),
            entry_number: j.entry_number,
            date: j.entry_date,
            created_at: j.created_at,
            total_debit: j.total_debit,
            total_credit: j.total_credit,
        })
        .collect();

    let invoices = sqlx::query_as::<_, InvoiceRow>(
        r#"
        SELECT 'sales' AS kind, i.invoice_number, i.date, i.party_name,
               i.total_after_tax_discount AS total, i.tax_amount,
               COALESCE((SELECT SUM(p.amount) FROM payments p
                         WHERE p.invoice_type = 'sales' AND p.invoice_id = i.id), 0) AS paid,
               i.journal_number, i.external_journal_id
        FROM sales_invoices i WHERE i.date <= $1
        UNION ALL
        SELECT 'purchase', i.invoice_number, i.date, i.party_name,
               i.total_after_tax_discount, i.tax_amount,
               COALESCE((SELECT SUM(p.amount) FROM payments p
                         WHERE p.invoice_type = 'purchase' AND p.invoice_id = i.id), 0),
               i.journal_number, i.external_journal_id
        FROM purchase_invoices i WHERE i.date <= $1
        UNION ALL
        SELECT 'expense', i.invoice_number, i.date, i.party_name,
               i.total_after_tax_discount, i.tax_amount,
               COALESCE((SELECT SUM(p.amount) FROM payments p
                         WHERE p.invoice_type = 'expense' AND p.invoice_id = i.id), 0),
               i.journal_number, i.external_journal_id
        FROM expense_invoices i WHERE i.date <= $1
        ORDER BY date, invoice_number
        "#,
    )
    .bind(end)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|r| {
        Ok(AuditInvoice {
            kind: r.kind.parse()?,
            number: r.invoice_number,
            date: r.date,
            party: r.party_name,
            total: r.total,
            tax_amount: r.tax_amount,
            paid: r.paid,
            journal_number: r.journal_number,
            external_journal_id: r.external_journal_id,
        })
    })
    .collect::<anyhow::Result<Vec<_>>>()?;

    let fiscal_years = sqlx::query_as::<_, YearRow>(
        "SELECT year, start_date, end_date, status, closed_at FROM fiscal_years",
    )
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|y| {
        Ok(AuditFiscalYear {
            status: FiscalYearStatus::parse(&y.status)
                .ok_or_else(|| anyhow!("unknown fiscal year status '{}'", y.status))?,
            year: y.year,
            start_date: y.start_date,
            end_date: y.end_date,
            closed_at: y.closed_at,
        })
    })
    .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(AuditDataset {
        accounts,
        journals,
        invoices,
        fiscal_years,
    })
}

pub async fn run(conn: &mut PgConnection, start: NaiveDate, end: NaiveDate) -> anyhow::Result<AuditReport> {
    let ds = load_dataset(conn, end).await?;
    let report = run_audit(&ds, start, end, Utc::now());
    log::info!(
        "audit {}..{}: {} findings ({} high)",
        start,
        end,
        report.summary.total,
        report.summary.high
    );
    Ok(report)
}
