use bigdecimal::{num_traits::Zero, BigDecimal};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{invalid, inventory, journal, like_prefix, parties, payments, settings, NotFound, PostingContext};
use crate::{
    accounting::{
        journal::{
            codes, expense_invoice_draft, normalize_method, purchase_invoice_draft, sales_invoice_draft, Settlement,
        },
        money::{to_cents, zero},
        parties::check_on_account,
        reconciliation::{check_payment, DocumentKind, PaymentError, PaymentStatus},
        totals::{compute_invoice, Discount, InvoiceTotals, LineInput, LineTotals},
    },
    accounting_service::{idempotency_key, Endpoint, ExternalLine, InvoicePayload, SOURCE_SYSTEM},
    models,
};

#[derive(Debug, Clone, Deserialize)]
pub struct NewInvoiceLine {
    pub description: String,
    pub quantity: BigDecimal,
    pub unit_price: BigDecimal,
    #[serde(default)]
    pub discount: Discount,
    /// Sales lines may reference the meal sold.
    #[serde(default)]
    pub meal_id: Option<Uuid>,
    /// Purchase lines reference the raw material received; an unknown one
    /// is created from the description.
    #[serde(default)]
    pub raw_material_id: Option<Uuid>,
    #[serde(default)]
    pub unit: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialPayment {
    #[default]
    Unpaid,
    Paid,
    Partial,
}

fn default_method() -> String {
    "CASH".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInvoice {
    pub date: NaiveDate,
    pub branch_code: String,
    /// Registered customer (sales) or supplier (purchases, expenses).
    #[serde(default)]
    pub party_id: Option<Uuid>,
    /// Free text for walk-in customers; replaced by the registry name when
    /// `party_id` is given.
    #[serde(default)]
    pub party_name: String,
    #[serde(default = "default_method")]
    pub payment_method: String,
    #[serde(default = "default_true")]
    pub vat: bool,
    #[serde(default)]
    pub expense_account_code: Option<String>,
    #[serde(default)]
    pub payment: InitialPayment,
    #[serde(default)]
    pub paid_amount: Option<BigDecimal>,
    pub lines: Vec<NewInvoiceLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Created {
    pub id: Uuid,
    pub invoice_number: String,
    pub totals: InvoiceTotals,
    pub status: String,
    pub journal_number: Option<String>,
    pub external_journal_id: Option<String>,
}

/// `PREFIX-YYYY-NNN` following the highest sequence already used that year.
pub fn next_invoice_number(prefix: &str, year: i32, taken: &[String]) -> String {
    let head = format!("{prefix}-{year}-");
    let last = taken
        .iter()
        .filter_map(|n| n.strip_prefix(&head))
        .filter_map(|seq| seq.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("{head}{:03}", last + 1)
}

/// Pairs each request line with its computed totals. Zero-quantity lines
/// have no totals and are skipped on both sides.
fn priced_lines<'a>(
    lines: &'a [NewInvoiceLine],
    totals: &'a InvoiceTotals,
) -> impl Iterator<Item = (&'a NewInvoiceLine, &'a LineTotals)> {
    lines.iter().filter(|l| !l.quantity.is_zero()).zip(&totals.lines)
}

fn item_table(kind: DocumentKind) -> anyhow::Result<&'static str> {
    match kind {
        DocumentKind::Sales => Ok("sales_invoice_items"),
        DocumentKind::Purchase => Ok("purchase_invoice_items"),
        DocumentKind::Expense => Ok("expense_invoice_items"),
        DocumentKind::Salary => Err(PaymentError::UnknownDocument(kind.to_string()).into()),
    }
}

fn endpoint(kind: DocumentKind) -> Endpoint {
    match kind {
        DocumentKind::Sales => Endpoint::SalesInvoice,
        DocumentKind::Purchase => Endpoint::PurchaseInvoice,
        _ => Endpoint::ExpenseInvoice,
    }
}

async fn next_number(conn: &mut PgConnection, kind: DocumentKind, year: i32) -> anyhow::Result<String> {
    let prefix = kind
        .number_prefix()
        .ok_or_else(|| PaymentError::UnknownDocument(kind.to_string()))?;
    let (table, _) = payments::document_table(kind);
    // serialises numbering between concurrent creations of the same kind
    sqlx::query(&format!("LOCK TABLE {table} IN SHARE ROW EXCLUSIVE MODE"))
        .execute(&mut *conn)
        .await?;
    let taken: Vec<String> = sqlx::query_scalar(&format!(
        "SELECT invoice_number FROM {table} WHERE invoice_number LIKE $1"
    ))
    .bind(like_prefix(&format!("{prefix}-{year}-")))
    .fetch_all(conn)
    .await?;
    Ok(next_invoice_number(prefix, year, &taken))
}

/// Creates an invoice on the caller's transaction: totals, number, items,
/// stock for purchases, the journal and the optional initial payment.
pub async fn create_in(
    conn: &mut PgConnection,
    kind: DocumentKind,
    inv: &NewInvoice,
    ctx: PostingContext<'_>,
) -> anyhow::Result<Created> {
    let items = item_table(kind)?;
    let (table, _) = payments::document_table(kind);
    if !settings::branch_exists(&mut *conn, &inv.branch_code).await? {
        return Err(invalid(format!("unknown branch '{}'", inv.branch_code)));
    }

    let rate = if inv.vat {
        settings::vat_rate(&mut *conn).await?
    } else {
        zero()
    };
    let inputs: Vec<LineInput> = inv
        .lines
        .iter()
        .map(|l| LineInput {
            description: l.description.trim().to_string(),
            quantity: l.quantity.clone(),
            unit_price: l.unit_price.clone(),
            discount: l.discount.clone(),
        })
        .collect();
    let totals = compute_invoice(&inputs, &rate)?;
    let total = totals.total_after_tax_discount.clone();
    super::fiscal::check_period(&mut *conn, inv.date, ctx.require_fiscal_year).await?;

    let initial = match inv.payment {
        InitialPayment::Unpaid => None,
        InitialPayment::Paid => Some(total.clone()),
        InitialPayment::Partial => {
            let amount = to_cents(inv.paid_amount.as_ref().ok_or(PaymentError::NotPositive)?);
            check_payment(&amount, &total, &zero())?;
            Some(amount)
        }
    }
    .filter(|a| *a > zero());
    let settled = initial.as_ref().is_some_and(|a| *a == total);

    let party = match inv.party_id {
        Some(id) => Some(parties::resolve_in(&mut *conn, kind, id).await?),
        None => None,
    };
    check_on_account(kind, party.as_ref().and_then(|p| p.customer_type), !settled && total > zero())?;
    let party_name = party
        .as_ref()
        .map(|p| p.name.clone())
        .unwrap_or_else(|| inv.party_name.trim().to_string());

    let expense_account = match kind {
        DocumentKind::Expense => Some(
            inv.expense_account_code
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or(codes::GENERAL_EXPENSES)
                .to_string(),
        ),
        _ => None,
    };

    let number = next_number(&mut *conn, kind, inv.date.year()).await?;
    let method = normalize_method(&inv.payment_method);
    let id = Uuid::new_v4();

    sqlx::query(&format!(
        r#"
        INSERT INTO {table}
            (id, invoice_number, date, branch_code, party_id, party_name, payment_method,
             total_before_tax, tax_amount, discount_amount, total_after_tax_discount, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#
    ))
    .bind(id)
    .bind(&number)
    .bind(inv.date)
    .bind(&inv.branch_code)
    .bind(party.as_ref().map(|p| p.id))
    .bind(&party_name)
    .bind(&method)
    .bind(&totals.total_before_tax)
    .bind(&totals.tax_amount)
    .bind(&totals.discount_amount)
    .bind(&total)
    .bind(ctx.user)
    .execute(&mut *conn)
    .await?;
    if let Some(code) = &expense_account {
        sqlx::query("UPDATE expense_invoices SET expense_account_code = $2 WHERE id = $1")
            .bind(id)
            .bind(code)
            .execute(&mut *conn)
            .await?;
    }

    let mut received = Vec::new();
    for (line, t) in priced_lines(&inv.lines, &totals) {
        let item_id = Uuid::new_v4();
        sqlx::query(&format!(
            r#"
            INSERT INTO {items} (id, invoice_id, description, quantity, unit_price, discount, tax, total)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#
        ))
        .bind(item_id)
        .bind(id)
        .bind(&t.description)
        .bind(&t.quantity)
        .bind(&t.unit_price)
        .bind(&t.discount)
        .bind(&t.tax)
        .bind(&t.total)
        .execute(&mut *conn)
        .await?;

        match kind {
            DocumentKind::Sales if line.meal_id.is_some() => {
                sqlx::query("UPDATE sales_invoice_items SET meal_id = $2 WHERE id = $1")
                    .bind(item_id)
                    .bind(line.meal_id)
                    .execute(&mut *conn)
                    .await?;
            }
            DocumentKind::Purchase => {
                let material = match line.raw_material_id {
                    Some(m) => m,
                    None => inventory::find_or_create_material(&mut *conn, &t.description, &line.unit).await?,
                };
                inventory::receive(&mut *conn, material, &t.quantity, &t.unit_price).await?;
                sqlx::query("UPDATE purchase_invoice_items SET raw_material_id = $2 WHERE id = $1")
                    .bind(item_id)
                    .bind(material)
                    .execute(&mut *conn)
                    .await?;
                received.push(material);
            }
            _ => {}
        }
    }
    if !received.is_empty() {
        let repriced = inventory::recompute_for_materials(&mut *conn, &received).await?;
        log::info!("{} received {} materials, {} meals repriced", number, received.len(), repriced);
    }

    let (journal_number, external_journal_id) = if total <= zero() {
        (None, None)
    } else if let Some(service) = ctx.service {
        let payload = InvoicePayload {
            source_system: SOURCE_SYSTEM,
            idempotency_key: idempotency_key(kind.as_str(), &number),
            invoice_type: kind.as_str(),
            invoice_number: number.clone(),
            date: inv.date,
            branch: inv.branch_code.clone(),
            party_name: party_name.clone(),
            payment_method: method.clone(),
            total_before_tax: totals.total_before_tax.clone(),
            tax_amount: totals.tax_amount.clone(),
            discount_amount: totals.discount_amount.clone(),
            total_after_tax_discount: total.clone(),
            paid: settled,
            expense_account_code: expense_account.clone(),
            items: totals
                .lines
                .iter()
                .map(|t| ExternalLine {
                    description: t.description.clone(),
                    quantity: t.quantity.clone(),
                    unit_price: t.unit_price.clone(),
                    discount: t.discount.clone(),
                    tax: t.tax.clone(),
                    total: t.total.clone(),
                })
                .collect(),
        };
        (None, service.send(endpoint(kind), &payload).await?)
    } else {
        let settlement = if settled {
            Settlement::Settled { method: &method }
        } else {
            Settlement::OnAccount
        };
        let draft = match kind {
            DocumentKind::Sales => sales_invoice_draft(&number, inv.date, &totals, settlement),
            DocumentKind::Purchase => purchase_invoice_draft(&number, inv.date, &totals, settlement),
            _ => expense_invoice_draft(
                &number,
                inv.date,
                &totals,
                expense_account.as_deref().unwrap_or(codes::GENERAL_EXPENSES),
                settlement,
            ),
        };
        (Some(journal::post(&mut *conn, &draft, ctx).await?.entry_number), None)
    };
    sqlx::query(&format!(
        "UPDATE {table} SET journal_number = $2, external_journal_id = $3 WHERE id = $1"
    ))
    .bind(id)
    .bind(&journal_number)
    .bind(&external_journal_id)
    .execute(&mut *conn)
    .await?;

    match initial {
        // settled at creation: the invoice journal already moved the money
        Some(amount) if settled => {
            payments::insert(
                &mut *conn,
                &payments::PaymentRecord {
                    id: Uuid::new_v4(),
                    kind,
                    document_id: id,
                    amount,
                    date: inv.date,
                    method: &method,
                    reference: Some("paid on creation"),
                    journal_number: journal_number.clone(),
                    external_journal_id: external_journal_id.clone(),
                },
                ctx.user,
            )
            .await?;
        }
        Some(amount) => {
            payments::record_in(&mut *conn, kind, id, &amount, inv.date, &method, Some("initial payment"), ctx).await?;
        }
        None => {}
    }
    let status = payments::refresh_status(&mut *conn, kind, id).await?;

    log::info!("{} invoice {} created, total {} ({})", kind, number, total, status);
    Ok(Created {
        id,
        invoice_number: number,
        totals,
        status,
        journal_number,
        external_journal_id,
    })
}

pub async fn create(p: &PgPool, kind: DocumentKind, inv: &NewInvoice, ctx: PostingContext<'_>) -> anyhow::Result<Created> {
    let mut tx = p.begin().await?;
    let created = create_in(&mut tx, kind, inv, ctx).await?;
    tx.commit().await?;
    Ok(created)
}

#[derive(Debug, Default, Deserialize, Serialize, Clone)]
pub struct Filter {
    pub branch: Option<String>,
    pub status: Option<String>,
}

impl Filter {
    fn branch(&self) -> Option<&str> {
        self.branch.as_deref().filter(|b| !b.is_empty())
    }

    /// Unknown statuses do not filter; "due" is read as unpaid.
    fn status(&self) -> Option<&'static str> {
        self.status
            .as_deref()
            .and_then(PaymentStatus::parse)
            .map(|s| s.as_str())
    }
}

fn header_select(kind: DocumentKind) -> String {
    let (table, _) = payments::document_table(kind);
    let expense_col = if kind == DocumentKind::Expense {
        "expense_account_code"
    } else {
        "NULL::text AS expense_account_code"
    };
    format!(
        r#"
        SELECT id, invoice_number, date, branch_code, party_id, party_name, payment_method, {expense_col},
               total_before_tax, tax_amount, discount_amount, total_after_tax_discount, status,
               journal_number, external_journal_id, created_by, created_at
        FROM {table}
        "#
    )
}

pub async fn count(p: &PgPool, kind: DocumentKind, f: &Filter) -> anyhow::Result<i64> {
    let (table, _) = payments::document_table(kind);
    Ok(sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM {table} WHERE ($1::text IS NULL OR branch_code = $1) AND ($2::text IS NULL OR status = $2)"
    ))
    .bind(f.branch())
    .bind(f.status())
    .fetch_one(p)
    .await?)
}

pub async fn list(p: &PgPool, kind: DocumentKind, f: &Filter, offset: i64, limit: i64) -> anyhow::Result<Vec<models::Invoice>> {
    Ok(sqlx::query_as::<_, models::Invoice>(&format!(
        r#"
        {}
        WHERE ($1::text IS NULL OR branch_code = $1) AND ($2::text IS NULL OR status = $2)
        ORDER BY date DESC, invoice_number DESC
        OFFSET $3 LIMIT $4
        "#,
        header_select(kind)
    ))
    .bind(f.branch())
    .bind(f.status())
    .bind(offset)
    .bind(limit)
    .fetch_all(p)
    .await?)
}

#[derive(Debug, Serialize)]
pub struct Detail {
    pub invoice: models::Invoice,
    pub items: Vec<models::InvoiceItem>,
    pub payments: Vec<models::Payment>,
    pub paid: BigDecimal,
    pub remaining: BigDecimal,
}

pub async fn get(p: &PgPool, kind: DocumentKind, id: Uuid) -> anyhow::Result<Detail> {
    let items_table = item_table(kind)?;
    let invoice = sqlx::query_as::<_, models::Invoice>(&format!("{} WHERE id = $1", header_select(kind)))
        .bind(id)
        .fetch_optional(p)
        .await?
        .ok_or_else(|| NotFound(format!("{kind} invoice {id}")))?;

    let items = sqlx::query_as::<_, models::InvoiceItem>(&format!(
        r#"
        SELECT id, description, quantity, unit_price, discount, tax, total
        FROM {items_table}
        WHERE invoice_id = $1
        "#
    ))
    .bind(id)
    .fetch_all(p)
    .await?;

    let payments = payments::for_document(p, kind, id).await?;
    let paid = to_cents(&payments.iter().fold(zero(), |acc, p| acc + &p.amount));
    let remaining = crate::accounting::reconciliation::remaining(&invoice.total_after_tax_discount, &paid);
    Ok(Detail {
        invoice,
        items,
        payments,
        paid,
        remaining,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_follow_the_highest_sequence() {
        let taken = vec![
            "SAL-2024-001".to_string(),
            "SAL-2024-007".to_string(),
            "SAL-2024-003".to_string(),
            "SAL-2023-042".to_string(),
        ];
        assert_eq!(next_invoice_number("SAL", 2024, &taken), "SAL-2024-008");
        assert_eq!(next_invoice_number("SAL", 2025, &taken), "SAL-2025-001");
        assert_eq!(next_invoice_number("PUR", 2024, &[]), "PUR-2024-001");
    }

    #[test]
    fn sequence_grows_past_three_digits() {
        let taken = vec!["EXP-2024-999".to_string(), "EXP-2024-abc".to_string()];
        assert_eq!(next_invoice_number("EXP", 2024, &taken), "EXP-2024-1000");
    }

    #[test]
    fn invoice_payload_defaults() {
        let inv: NewInvoice = serde_json::from_str(
            r#"{
                "date": "2024-03-05",
                "branch_code": "china_town",
                "lines": [{"description": "rice", "quantity": "2", "unit_price": "5"}]
            }"#,
        )
        .unwrap();
        assert!(inv.vat);
        assert_eq!(inv.payment, InitialPayment::Unpaid);
        assert_eq!(inv.payment_method, "CASH");
        assert_eq!(inv.lines[0].discount, Discount::None);
    }

    #[test]
    fn zero_quantity_line_does_not_shift_materials() {
        let flour = Uuid::new_v4();
        let rice = Uuid::new_v4();
        let inv: NewInvoice = serde_json::from_value(serde_json::json!({
            "date": "2024-03-05",
            "branch_code": "china_town",
            "lines": [
                {"description": "flour", "quantity": "0", "unit_price": "3", "raw_material_id": flour},
                {"description": "rice", "quantity": "5", "unit_price": "4", "raw_material_id": rice},
                {"description": "oil", "quantity": "1", "unit_price": "9"}
            ]
        }))
        .unwrap();
        let inputs: Vec<LineInput> = inv
            .lines
            .iter()
            .map(|l| LineInput {
                description: l.description.clone(),
                quantity: l.quantity.clone(),
                unit_price: l.unit_price.clone(),
                discount: l.discount.clone(),
            })
            .collect();
        let totals = compute_invoice(&inputs, &BigDecimal::from(15)).unwrap();

        let pairs: Vec<(Option<Uuid>, &str)> = priced_lines(&inv.lines, &totals)
            .map(|(line, t)| (line.raw_material_id, t.description.as_str()))
            .collect();
        assert_eq!(pairs, vec![(Some(rice), "rice"), (None, "oil")]);
    }

    #[test]
    fn filter_status_is_normalized() {
        let f = |status: &str| Filter {
            branch: None,
            status: Some(status.to_string()),
        };
        assert_eq!(f("paid").status(), Some("paid"));
        assert_eq!(f("due").status(), Some("unpaid"));
        assert_eq!(f("").status(), None);
        assert_eq!(f("paid' OR 1=1").status(), None);
        assert_eq!(Filter::default().status(), None);
    }
}
