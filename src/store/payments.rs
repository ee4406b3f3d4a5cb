use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{journal, NotFound, PostingContext};
use crate::{
    accounting::{
        journal::{normalize_method, payment_draft},
        money::{to_cents, zero},
        reconciliation::{
            allocate_oldest_first, check_payment, remaining, status_for, Allocation, DocumentKind, OpenDocument,
            PaymentError,
        },
    },
    accounting_service::{idempotency_key, Endpoint, PaymentPayload, SOURCE_SYSTEM},
    models,
};

/// Header table and total column of the documents of `kind`.
pub fn document_table(kind: DocumentKind) -> (&'static str, &'static str) {
    match kind {
        DocumentKind::Sales => ("sales_invoices", "total_after_tax_discount"),
        DocumentKind::Purchase => ("purchase_invoices", "total_after_tax_discount"),
        DocumentKind::Expense => ("expense_invoices", "total_after_tax_discount"),
        DocumentKind::Salary => ("salaries", "total_salary"),
    }
}

pub async fn paid_total(conn: &mut PgConnection, kind: DocumentKind, id: Uuid) -> anyhow::Result<BigDecimal> {
    Ok(sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE invoice_type = $1 AND invoice_id = $2",
    )
    .bind(kind.as_str())
    .bind(id)
    .fetch_one(conn)
    .await?)
}

/// Recomputes a document's status from the sum of its payments.
pub async fn refresh_status(conn: &mut PgConnection, kind: DocumentKind, id: Uuid) -> anyhow::Result<String> {
    let (table, total_col) = document_table(kind);
    let total: BigDecimal = sqlx::query_scalar(&format!("SELECT {total_col} FROM {table} WHERE id = $1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| NotFound(format!("{kind} {id}")))?;
    let paid = paid_total(&mut *conn, kind, id).await?;

    let status = status_for(&total, &paid);
    let status = match kind {
        DocumentKind::Salary => status.as_salary_str(),
        _ => status.as_str(),
    };
    sqlx::query(&format!("UPDATE {table} SET status = $2 WHERE id = $1"))
        .bind(id)
        .bind(status)
        .execute(conn)
        .await?;
    Ok(status.to_string())
}

pub struct PaymentRecord<'a> {
    pub id: Uuid,
    pub kind: DocumentKind,
    pub document_id: Uuid,
    pub amount: BigDecimal,
    pub date: NaiveDate,
    pub method: &'a str,
    pub reference: Option<&'a str>,
    pub journal_number: Option<String>,
    pub external_journal_id: Option<String>,
}

/// Inserts the payment row only. Journal and status are the caller's.
pub async fn insert(conn: &mut PgConnection, r: &PaymentRecord<'_>, user: &str) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO payments
            (id, invoice_id, invoice_type, amount, payment_date, payment_method, reference,
             journal_number, external_journal_id, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(r.id)
    .bind(r.document_id)
    .bind(r.kind.as_str())
    .bind(to_cents(&r.amount))
    .bind(r.date)
    .bind(normalize_method(r.method))
    .bind(r.reference)
    .bind(&r.journal_number)
    .bind(&r.external_journal_id)
    .bind(user)
    .execute(conn)
    .await?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct Recorded {
    pub payment_id: Uuid,
    pub document_number: String,
    pub amount: BigDecimal,
    pub status: String,
    pub journal_number: Option<String>,
    pub external_journal_id: Option<String>,
}

/// Registers a payment against an invoice: checks the amount and period,
/// journalises it and refreshes the invoice status.
pub async fn record_in(
    conn: &mut PgConnection,
    kind: DocumentKind,
    invoice_id: Uuid,
    amount: &BigDecimal,
    date: NaiveDate,
    method: &str,
    reference: Option<&str>,
    ctx: PostingContext<'_>,
) -> anyhow::Result<Recorded> {
    if kind == DocumentKind::Salary {
        return Err(PaymentError::UnknownDocument(kind.to_string()).into());
    }
    let (table, total_col) = document_table(kind);
    let (number, total): (String, BigDecimal) = sqlx::query_as(&format!(
        "SELECT invoice_number, {total_col} FROM {table} WHERE id = $1 FOR UPDATE"
    ))
    .bind(invoice_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| NotFound(format!("{kind} invoice {invoice_id}")))?;

    let paid = paid_total(&mut *conn, kind, invoice_id).await?;
    let amount = to_cents(amount);
    check_payment(&amount, &total, &paid)?;
    super::fiscal::check_period(&mut *conn, date, ctx.require_fiscal_year).await?;

    let payment_id = Uuid::new_v4();
    let (journal_number, external_journal_id) = match ctx.service {
        Some(service) => {
            let payload = PaymentPayload {
                source_system: SOURCE_SYSTEM,
                idempotency_key: idempotency_key("payment", &payment_id.to_string()),
                invoice_type: kind.as_str(),
                invoice_number: number.clone(),
                amount: amount.clone(),
                date,
                payment_method: method.to_string(),
                reference: reference.map(str::to_string),
            };
            (None, service.send(Endpoint::Payment, &payload).await?)
        }
        None => {
            let draft = payment_draft(kind, &number, date, &amount, method);
            (Some(journal::post(&mut *conn, &draft, ctx).await?.entry_number), None)
        }
    };

    let record = PaymentRecord {
        id: payment_id,
        kind,
        document_id: invoice_id,
        amount: amount.clone(),
        date,
        method,
        reference,
        journal_number,
        external_journal_id,
    };
    insert(&mut *conn, &record, ctx.user).await?;
    let status = refresh_status(&mut *conn, kind, invoice_id).await?;

    log::info!("payment of {} registered on {} ({})", amount, number, status);
    Ok(Recorded {
        payment_id,
        document_number: number,
        amount,
        status,
        journal_number: record.journal_number,
        external_journal_id: record.external_journal_id,
    })
}

pub async fn register(
    p: &PgPool,
    kind: DocumentKind,
    invoice_id: Uuid,
    amount: &BigDecimal,
    date: NaiveDate,
    method: &str,
    reference: Option<&str>,
    ctx: PostingContext<'_>,
) -> anyhow::Result<Recorded> {
    let mut tx = p.begin().await?;
    let recorded = record_in(&mut tx, kind, invoice_id, amount, date, method, reference, ctx).await?;
    tx.commit().await?;
    Ok(recorded)
}

#[derive(sqlx::FromRow)]
struct OpenRow {
    id: Uuid,
    invoice_number: String,
    total: BigDecimal,
    paid: BigDecimal,
}

async fn open_documents(
    conn: &mut PgConnection,
    kind: DocumentKind,
    supplier: Option<&str>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> anyhow::Result<Vec<OpenDocument>> {
    let (table, total_col) = document_table(kind);
    let rows = sqlx::query_as::<_, OpenRow>(&format!(
        r#"
        SELECT i.id, i.invoice_number, i.{total_col} AS total,
               COALESCE((SELECT SUM(p.amount) FROM payments p
                         WHERE p.invoice_type = $1 AND p.invoice_id = i.id), 0) AS paid
        FROM {table} i
        WHERE i.status <> 'paid'
          AND ($2::text IS NULL OR lower(i.party_name) = lower($2))
          AND ($3::date IS NULL OR i.date >= $3)
          AND ($4::date IS NULL OR i.date <= $4)
        ORDER BY i.date, i.invoice_number
        FOR UPDATE OF i
        "#
    ))
    .bind(kind.as_str())
    .bind(supplier.map(str::trim))
    .bind(from)
    .bind(to)
    .fetch_all(conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| OpenDocument {
            id: r.id,
            number: r.invoice_number,
            total: r.total,
            paid: r.paid,
        })
        .collect())
}

#[derive(Debug, Serialize)]
pub struct Distribution {
    pub allocations: Vec<Allocation>,
    pub unallocated: BigDecimal,
}

/// Spreads one supplier payment over the supplier's open purchase
/// invoices, oldest first.
pub async fn supplier_payment(
    p: &PgPool,
    supplier: &str,
    amount: &BigDecimal,
    date: NaiveDate,
    method: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    ctx: PostingContext<'_>,
) -> anyhow::Result<Distribution> {
    if *amount <= zero() {
        return Err(PaymentError::NotPositive.into());
    }
    let mut tx = p.begin().await?;
    let open = open_documents(&mut tx, DocumentKind::Purchase, Some(supplier), from, to).await?;
    let (allocations, unallocated) = allocate_oldest_first(amount, &open);
    if allocations.is_empty() {
        return Err(PaymentError::NothingOpen(supplier.trim().to_string()).into());
    }

    let reference = format!("supplier payment {}", supplier.trim());
    for a in &allocations {
        record_in(&mut tx, DocumentKind::Purchase, a.id, &a.amount, date, method, Some(&reference), ctx).await?;
    }
    tx.commit().await?;

    log::info!(
        "supplier payment for '{}' spread over {} invoices, {} unallocated",
        supplier.trim(),
        allocations.len(),
        unallocated
    );
    Ok(Distribution {
        allocations,
        unallocated,
    })
}

/// Settles every open purchase and expense invoice in full.
pub async fn pay_all(p: &PgPool, date: NaiveDate, method: &str, ctx: PostingContext<'_>) -> anyhow::Result<Vec<Allocation>> {
    let mut tx = p.begin().await?;
    let mut settled = Vec::new();
    for kind in [DocumentKind::Purchase, DocumentKind::Expense] {
        for doc in open_documents(&mut tx, kind, None, None, None).await? {
            let amount = remaining(&doc.total, &doc.paid);
            if amount <= zero() {
                continue;
            }
            record_in(&mut tx, kind, doc.id, &amount, date, method, Some("pay all"), ctx).await?;
            settled.push(Allocation {
                id: doc.id,
                number: doc.number,
                amount,
            });
        }
    }
    tx.commit().await?;

    log::info!("settled {} open invoices", settled.len());
    Ok(settled)
}

pub async fn for_document(p: &PgPool, kind: DocumentKind, id: Uuid) -> anyhow::Result<Vec<models::Payment>> {
    Ok(sqlx::query_as::<_, models::Payment>(
        r#"
        SELECT id, invoice_id, invoice_type, amount, payment_date, payment_method, reference,
               journal_number, external_journal_id, created_by
        FROM payments
        WHERE invoice_type = $1 AND invoice_id = $2
        ORDER BY payment_date, created_at
        "#,
    )
    .bind(kind.as_str())
    .bind(id)
    .fetch_all(p)
    .await?)
}

#[derive(sqlx::FromRow, Serialize, Default)]
pub struct PaymentRow {
    pub payment_date: NaiveDate,
    pub invoice_type: String,
    pub document_number: String,
    pub amount: BigDecimal,
    pub payment_method: String,
    pub reference: Option<String>,
    pub journal_number: Option<String>,
}

pub async fn count(p: &PgPool) -> anyhow::Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM payments")
        .fetch_one(p)
        .await?)
}

pub async fn list(p: &PgPool, offset: i64, limit: i64) -> anyhow::Result<Vec<PaymentRow>> {
    Ok(sqlx::query_as::<_, PaymentRow>(
        r#"
        SELECT p.payment_date, p.invoice_type,
               COALESCE(s.invoice_number, pu.invoice_number, e.invoice_number,
                        emp.employee_code || ' ' || sa.year || '-' || lpad(sa.month::text, 2, '0'),
                        '') AS document_number,
               p.amount, p.payment_method, p.reference, p.journal_number
        FROM payments p
        LEFT JOIN sales_invoices s ON p.invoice_type = 'sales' AND s.id = p.invoice_id
        LEFT JOIN purchase_invoices pu ON p.invoice_type = 'purchase' AND pu.id = p.invoice_id
        LEFT JOIN expense_invoices e ON p.invoice_type = 'expense' AND e.id = p.invoice_id
        LEFT JOIN salaries sa ON p.invoice_type = 'salary' AND sa.id = p.invoice_id
        LEFT JOIN employees emp ON emp.id = sa.employee_id
        ORDER BY p.payment_date DESC, p.created_at DESC
        OFFSET $1 LIMIT $2
        "#,
    )
    .bind(offset)
    .bind(limit)
    .fetch_all(p)
    .await?)
}
