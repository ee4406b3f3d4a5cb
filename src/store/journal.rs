use std::io;

use anyhow::Context;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{fiscal, invalid, like_prefix, NotFound, PostingContext};
use crate::{
    accounting::{
        import::read_groups,
        journal::{
            balance_sheet as build_balance_sheet, income_statement as build_income_statement,
            statement as running_statement, trial_balance as build_trial_balance, unique_entry_number,
            validate_draft, AccountTotals, AccountType, BalanceSheet, IncomeStatement, JournalDraft,
            LedgerMovement, PostingError, StatementLine, TrialBalance,
        },
        money::zero,
    },
    models,
};

#[derive(Debug, Clone, Serialize)]
pub struct Posted {
    pub id: Uuid,
    pub entry_number: String,
}

#[derive(sqlx::FromRow)]
struct AccountRef {
    id: Uuid,
    code: String,
    active: bool,
    allow_posting: bool,
}

async fn resolve_account(conn: &mut PgConnection, code: &str) -> anyhow::Result<AccountRef> {
    let acc = sqlx::query_as::<_, AccountRef>(
        "SELECT id, code, active, allow_posting FROM accounts WHERE code = $1",
    )
    .bind(code.trim())
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| PostingError::UnknownAccount(code.to_string()))?;

    if !acc.active {
        return Err(PostingError::InactiveAccount(acc.code).into());
    }
    if !acc.allow_posting {
        return Err(PostingError::NotPostable(acc.code).into());
    }
    Ok(acc)
}

async fn next_entry_number(conn: &mut PgConnection, base: &str) -> anyhow::Result<String> {
    let taken: Vec<String> = sqlx::query_scalar(
        "SELECT entry_number FROM journal_entries WHERE entry_number LIKE $1",
    )
    .bind(like_prefix(base))
    .fetch_all(conn)
    .await?;
    Ok(unique_entry_number(base, &taken))
}

/// Writes a draft to the ledger: header, numbered lines and the mirrored
/// ledger rows. Runs on the caller's transaction.
pub async fn post(conn: &mut PgConnection, draft: &JournalDraft, ctx: PostingContext<'_>) -> anyhow::Result<Posted> {
    let total = validate_draft(draft)?;
    fiscal::check_period(&mut *conn, draft.date, ctx.require_fiscal_year).await?;

    let mut accounts = Vec::with_capacity(draft.lines.len());
    for line in &draft.lines {
        accounts.push(resolve_account(&mut *conn, &line.account_code).await?);
    }

    let entry_number = next_entry_number(&mut *conn, &draft.base_entry_number()).await?;
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO journal_entries
            (id, entry_number, entry_date, description, source, source_ref, total_debit, total_credit, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $7, $8)
        "#,
    )
    .bind(id)
    .bind(&entry_number)
    .bind(draft.date)
    .bind(&draft.description)
    .bind(draft.source.as_str())
    .bind(&draft.source_ref)
    .bind(&total)
    .bind(ctx.user)
    .execute(&mut *conn)
    .await?;

    for (n, (line, acc)) in draft.lines.iter().zip(&accounts).enumerate() {
        let line_id = Uuid::new_v4();
        let description = line.description.clone().unwrap_or_else(|| draft.description.clone());
        sqlx::query(
            r#"
            INSERT INTO journal_lines
                (id, journal_id, line_no, account_id, account_code, debit, credit, description, line_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(line_id)
        .bind(id)
        .bind(n as i32 + 1)
        .bind(acc.id)
        .bind(&acc.code)
        .bind(&line.debit)
        .bind(&line.credit)
        .bind(&description)
        .bind(draft.date)
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, journal_id, journal_line_id, account_id, entry_date, debit, credit, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(id)
        .bind(line_id)
        .bind(acc.id)
        .bind(draft.date)
        .bind(&line.debit)
        .bind(&line.credit)
        .bind(&description)
        .execute(&mut *conn)
        .await?;
    }

    log::info!("journal {} posted ({}, total {})", entry_number, draft.source.as_str(), total);
    Ok(Posted { id, entry_number })
}

/// Posts a manually entered draft in its own transaction.
pub async fn create(p: &PgPool, draft: &JournalDraft, ctx: PostingContext<'_>) -> anyhow::Result<Posted> {
    let mut tx = p.begin().await?;
    let posted = post(&mut tx, draft, ctx).await?;
    tx.commit().await?;
    Ok(posted)
}

pub async fn delete(p: &PgPool, id: Uuid, require_fiscal_year: bool) -> anyhow::Result<String> {
    let mut tx = p.begin().await?;
    let (entry_number, date): (String, NaiveDate) =
        sqlx::query_as("SELECT entry_number, entry_date FROM journal_entries WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| NotFound(format!("journal entry {id}")))?;
    fiscal::check_period(&mut tx, date, require_fiscal_year).await?;

    for table in ["sales_invoices", "purchase_invoices", "expense_invoices", "payments", "salaries"] {
        sqlx::query(&format!("UPDATE {table} SET journal_number = NULL WHERE journal_number = $1"))
            .bind(&entry_number)
            .execute(&mut *tx)
            .await?;
    }
    sqlx::query("DELETE FROM ledger_entries WHERE journal_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM journal_entries WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    log::info!("journal {} deleted", entry_number);
    Ok(entry_number)
}

const ENTRY_COLUMNS: &str = r#"
    id, entry_number, entry_date, description, source, source_ref,
    total_debit, total_credit, created_by, created_at
"#;

pub async fn count(p: &PgPool) -> anyhow::Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM journal_entries")
        .fetch_one(p)
        .await?)
}

pub async fn list(p: &PgPool, offset: i64, limit: i64) -> anyhow::Result<Vec<models::JournalEntry>> {
    Ok(sqlx::query_as::<_, models::JournalEntry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM journal_entries ORDER BY entry_date DESC, entry_number DESC OFFSET $1 LIMIT $2"
    ))
    .bind(offset)
    .bind(limit)
    .fetch_all(p)
    .await?)
}

pub async fn get(p: &PgPool, id: Uuid) -> anyhow::Result<(models::JournalEntry, Vec<models::JournalLine>)> {
    let entry = sqlx::query_as::<_, models::JournalEntry>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(p)
    .await?
    .ok_or_else(|| NotFound(format!("journal entry {id}")))?;

    let lines = sqlx::query_as::<_, models::JournalLine>(
        r#"
        SELECT l.line_no, l.account_code, a.name AS account_name, l.debit, l.credit, l.description
        FROM journal_lines l
        JOIN accounts a ON a.id = l.account_id
        WHERE l.journal_id = $1
        ORDER BY l.line_no
        "#,
    )
    .bind(id)
    .fetch_all(p)
    .await?;
    Ok((entry, lines))
}

#[derive(sqlx::FromRow)]
struct TotalsRow {
    code: String,
    name: String,
    account_type: String,
    debit: BigDecimal,
    credit: BigDecimal,
}

/// Posted totals per account for lines dated up to `end`, and from `start`
/// when given.
async fn account_totals(p: &PgPool, start: Option<NaiveDate>, end: NaiveDate) -> anyhow::Result<Vec<AccountTotals>> {
    let rows = sqlx::query_as::<_, TotalsRow>(
        r#"
        SELECT a.code, a.name, a.account_type,
               COALESCE(t.debit, 0) AS debit,
               COALESCE(t.credit, 0) AS credit
        FROM accounts a
        LEFT JOIN (
            SELECT l.account_id, SUM(l.debit) AS debit, SUM(l.credit) AS credit
            FROM journal_lines l
            JOIN journal_entries e ON e.id = l.journal_id
            WHERE e.status = 'posted'
              AND ($1::date IS NULL OR l.line_date >= $1)
              AND l.line_date <= $2
            GROUP BY l.account_id
        ) t ON t.account_id = a.id
        ORDER BY a.code
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(p)
    .await?;

    rows.into_iter()
        .map(|r| {
            Ok(AccountTotals {
                account_type: r.account_type.parse::<AccountType>()?,
                code: r.code,
                name: r.name,
                debit: r.debit,
                credit: r.credit,
            })
        })
        .collect()
}

pub async fn trial_balance(p: &PgPool, as_of: NaiveDate) -> anyhow::Result<TrialBalance> {
    Ok(build_trial_balance(as_of, account_totals(p, None, as_of).await?))
}

pub async fn income_statement(p: &PgPool, start: NaiveDate, end: NaiveDate) -> anyhow::Result<IncomeStatement> {
    if start > end {
        return Err(invalid("start date is after end date"));
    }
    let is = build_income_statement(start, end, account_totals(p, Some(start), end).await?);
    log::debug!("income statement {} to {}: net {}", start, end, is.net_profit);
    Ok(is)
}

pub async fn balance_sheet(p: &PgPool, as_of: NaiveDate) -> anyhow::Result<BalanceSheet> {
    let bs = build_balance_sheet(as_of, account_totals(p, None, as_of).await?);
    if !bs.balanced {
        log::warn!(
            "balance sheet at {} does not balance: assets {} against {}",
            as_of,
            bs.assets.total,
            bs.total_liabilities_and_equity
        );
    }
    Ok(bs)
}

#[derive(Debug, Serialize)]
pub struct Statement {
    pub account: models::Account,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub opening: BigDecimal,
    pub lines: Vec<StatementLine>,
    pub closing: BigDecimal,
}

#[derive(sqlx::FromRow)]
struct MovementRow {
    entry_date: NaiveDate,
    entry_number: String,
    description: String,
    debit: BigDecimal,
    credit: BigDecimal,
}

pub async fn statement(p: &PgPool, account_id: Uuid, start: NaiveDate, end: NaiveDate) -> anyhow::Result<Statement> {
    let account = super::accounts::get(p, account_id).await?;
    let account_type: AccountType = account.account_type.parse()?;

    let (debit, credit): (BigDecimal, BigDecimal) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(debit), 0), COALESCE(SUM(credit), 0)
        FROM ledger_entries
        WHERE account_id = $1 AND entry_date < $2
        "#,
    )
    .bind(account_id)
    .bind(start)
    .fetch_one(p)
    .await?;
    let opening = crate::accounting::journal::balance(account_type, &debit, &credit);

    let movements = sqlx::query_as::<_, MovementRow>(
        r#"
        SELECT le.entry_date, e.entry_number, COALESCE(le.description, e.description) AS description,
               le.debit, le.credit
        FROM ledger_entries le
        JOIN journal_entries e ON e.id = le.journal_id
        WHERE le.account_id = $1 AND le.entry_date BETWEEN $2 AND $3
        ORDER BY le.entry_date, e.entry_number
        "#,
    )
    .bind(account_id)
    .bind(start)
    .bind(end)
    .fetch_all(p)
    .await?
    .into_iter()
    .map(|m| LedgerMovement {
        date: m.entry_date,
        entry_number: m.entry_number,
        description: m.description,
        debit: m.debit,
        credit: m.credit,
    })
    .collect();

    let lines = running_statement(account_type, &opening, movements);
    let closing = lines.last().map(|l| l.balance.clone()).unwrap_or_else(|| opening.clone());
    Ok(Statement {
        account,
        start,
        end,
        opening,
        lines,
        closing,
    })
}

#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub posted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// Posts every entry group of a CSV file into the given fiscal year. Each
/// group is committed on its own; a failing group is reported and skipped.
pub async fn import_csv(
    p: &PgPool,
    fiscal_year_id: Uuid,
    data: impl io::Read,
    ctx: PostingContext<'_>,
) -> anyhow::Result<ImportReport> {
    let fy = fiscal::get(p, fiscal_year_id).await?;
    let groups = read_groups(data, fy.start_date, fy.end_date).context("could not read journal CSV")?;

    let mut report = ImportReport::default();
    for group in groups {
        let draft = match group.draft {
            Ok(d) => d,
            Err(msg) => {
                log::warn!("import {}: {}", group.entry_number, msg);
                report.failed.push((group.entry_number, msg));
                continue;
            }
        };
        match create(p, &draft, ctx).await {
            Ok(posted) => report.posted.push(posted.entry_number),
            Err(err) => {
                log::warn!("import {}: {}", group.entry_number, err);
                report.failed.push((group.entry_number, err.to_string()));
            }
        }
    }

    log::info!(
        "journal import into fiscal year {}: {} posted, {} failed",
        fy.year,
        report.posted.len(),
        report.failed.len()
    );
    Ok(report)
}

/// Sum of posted amounts on `code` up to and including `as_of`.
pub async fn account_movement(conn: &mut PgConnection, code: &str, as_of: NaiveDate) -> anyhow::Result<(BigDecimal, BigDecimal)> {
    let row: Option<(BigDecimal, BigDecimal)> = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(le.debit), 0), COALESCE(SUM(le.credit), 0)
        FROM ledger_entries le
        JOIN accounts a ON a.id = le.account_id
        WHERE a.code = $1 AND le.entry_date <= $2
        "#,
    )
    .bind(code)
    .bind(as_of)
    .fetch_optional(conn)
    .await?;
    Ok(row.unwrap_or_else(|| (zero(), zero())))
}
