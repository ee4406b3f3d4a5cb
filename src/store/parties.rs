//! Customer and supplier registries. Invoices reference a registered party
//! by id and keep a copy of its name for printing.

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{invalid, like_prefix, payments, NotFound};
use crate::{
    accounting::{
        journal::normalize_method,
        money::{to_cents, zero},
        parties::{
            check_discount_percent, party_statement, CustomerType, MovementKind, PartyError, PartyKind,
            PartyMovement, PartyStatement,
        },
        reconciliation::DocumentKind,
    },
    models,
};

const CUSTOMER_COLUMNS: &str = "id, name, phone, customer_type, discount_percent, active, created_at";
const SUPPLIER_COLUMNS: &str =
    "id, name, contact_person, phone, email, tax_number, address, payment_method, notes, active, created_at";

#[derive(Debug, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub customer_type: String,
    #[serde(default)]
    pub discount_percent: Option<BigDecimal>,
}

#[derive(Debug, Deserialize, Default)]
pub struct NewSupplier {
    pub name: String,
    #[serde(default)]
    pub contact_person: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub tax_number: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub notes: String,
}

pub async fn create_customer(p: &PgPool, c: NewCustomer) -> anyhow::Result<Uuid> {
    let name = c.name.trim();
    if name.is_empty() {
        return Err(invalid("customer name is required"));
    }
    let customer_type: CustomerType = c.customer_type.parse()?;
    let discount = check_discount_percent(&c.discount_percent.unwrap_or_else(zero))?;

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO customers (id, name, phone, customer_type, discount_percent)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(c.phone.trim())
    .bind(customer_type.as_str())
    .bind(&discount)
    .execute(p)
    .await?;

    log::info!("{} customer '{}' registered", customer_type.as_str(), name);
    Ok(id)
}

pub async fn create_supplier(p: &PgPool, s: NewSupplier) -> anyhow::Result<Uuid> {
    let name = s.name.trim();
    if name.is_empty() {
        return Err(invalid("supplier name is required"));
    }

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO suppliers
            (id, name, contact_person, phone, email, tax_number, address, payment_method, notes)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(id)
    .bind(name)
    .bind(s.contact_person.trim())
    .bind(s.phone.trim())
    .bind(s.email.trim())
    .bind(s.tax_number.trim())
    .bind(s.address.trim())
    .bind(normalize_method(&s.payment_method))
    .bind(s.notes.trim())
    .execute(p)
    .await?;

    log::info!("supplier '{}' registered", name);
    Ok(id)
}

/// Sum still owed on the party's open documents.
fn outstanding_sql(kind: PartyKind) -> String {
    kind.documents()
        .iter()
        .map(|doc| {
            let (table, total_col) = payments::document_table(*doc);
            format!(
                r#"
                COALESCE((SELECT SUM(i.{total_col} - COALESCE(
                              (SELECT SUM(p.amount) FROM payments p
                               WHERE p.invoice_type = '{doc}' AND p.invoice_id = i.id), 0))
                          FROM {table} i WHERE i.party_id = c.id AND i.status <> 'paid'), 0)"#,
                doc = doc.as_str(),
            )
        })
        .collect::<Vec<_>>()
        .join(" +")
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct CustomerBalance {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub customer: models::Customer,
    pub outstanding: BigDecimal,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct SupplierBalance {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub supplier: models::Supplier,
    pub outstanding: BigDecimal,
}

pub async fn list_customers(p: &PgPool) -> anyhow::Result<Vec<CustomerBalance>> {
    Ok(sqlx::query_as::<_, CustomerBalance>(&format!(
        "SELECT {CUSTOMER_COLUMNS}, {} AS outstanding FROM customers c ORDER BY c.name",
        outstanding_sql(PartyKind::Customer)
    ))
    .fetch_all(p)
    .await?)
}

pub async fn list_suppliers(p: &PgPool) -> anyhow::Result<Vec<SupplierBalance>> {
    Ok(sqlx::query_as::<_, SupplierBalance>(&format!(
        "SELECT {SUPPLIER_COLUMNS}, {} AS outstanding FROM suppliers c ORDER BY c.name",
        outstanding_sql(PartyKind::Supplier)
    ))
    .fetch_all(p)
    .await?)
}

/// `%q%` on name or phone, escaped for `LIKE`.
fn contains_pattern(q: &str) -> String {
    format!("%{}", like_prefix(q.trim()))
}

/// Active customers matching `q` on name or phone, for the invoice and
/// POS pickers.
pub async fn search_customers(p: &PgPool, q: &str) -> anyhow::Result<Vec<models::Customer>> {
    Ok(sqlx::query_as::<_, models::Customer>(&format!(
        r#"
        SELECT {CUSTOMER_COLUMNS} FROM customers
        WHERE active AND (name ILIKE $1 OR phone ILIKE $1)
        ORDER BY name
        LIMIT 20
        "#
    ))
    .bind(contains_pattern(q))
    .fetch_all(p)
    .await?)
}

pub async fn search_suppliers(p: &PgPool, q: &str) -> anyhow::Result<Vec<models::Supplier>> {
    Ok(sqlx::query_as::<_, models::Supplier>(&format!(
        r#"
        SELECT {SUPPLIER_COLUMNS} FROM suppliers
        WHERE active AND (name ILIKE $1 OR phone ILIKE $1)
        ORDER BY name
        LIMIT 20
        "#
    ))
    .bind(contains_pattern(q))
    .fetch_all(p)
    .await?)
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PartyOption {
    pub id: Uuid,
    pub name: String,
}

/// Active parties for a select box.
pub async fn options(p: &PgPool, kind: PartyKind) -> anyhow::Result<Vec<PartyOption>> {
    Ok(sqlx::query_as::<_, PartyOption>(&format!(
        "SELECT id, name FROM {} WHERE active ORDER BY name",
        kind.table()
    ))
    .fetch_all(p)
    .await?)
}

/// Flips the active flag and returns the new value.
pub async fn toggle(p: &PgPool, kind: PartyKind, id: Uuid) -> anyhow::Result<bool> {
    let active: bool = sqlx::query_scalar(&format!(
        "UPDATE {} SET active = NOT active WHERE id = $1 RETURNING active",
        kind.table()
    ))
    .bind(id)
    .fetch_optional(p)
    .await?
    .ok_or_else(|| NotFound(format!("{kind} {id}")))?;

    log::info!("{} {} is now {}", kind, id, if active { "active" } else { "inactive" });
    Ok(active)
}

/// The registered party an invoice of `kind` points at.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub id: Uuid,
    pub name: String,
    pub customer_type: Option<CustomerType>,
}

pub async fn resolve_in(conn: &mut PgConnection, kind: DocumentKind, id: Uuid) -> anyhow::Result<Resolved> {
    let party = PartyKind::for_document(kind)?;
    let sql = match party {
        PartyKind::Customer => "SELECT name, active, customer_type FROM customers WHERE id = $1",
        PartyKind::Supplier => "SELECT name, active, NULL::text FROM suppliers WHERE id = $1",
    };
    let (name, active, customer_type) = sqlx::query_as::<_, (String, bool, Option<String>)>(sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| NotFound(format!("{party} {id}")))?;

    if !active {
        return Err(PartyError::Inactive(format!("{party} '{name}'")).into());
    }
    Ok(Resolved {
        id,
        customer_type: customer_type.map(|t| t.parse()).transpose()?,
        name,
    })
}

async fn party_name(p: &PgPool, kind: PartyKind, id: Uuid) -> anyhow::Result<String> {
    sqlx::query_scalar(&format!("SELECT name FROM {} WHERE id = $1", kind.table()))
        .bind(id)
        .fetch_optional(p)
        .await?
        .ok_or_else(|| NotFound(format!("{kind} {id}")).into())
}

#[derive(sqlx::FromRow)]
struct MovementRow {
    date: NaiveDate,
    reference: String,
    is_payment: bool,
    amount: BigDecimal,
}

#[derive(Debug, Serialize)]
pub struct Statement {
    pub id: Uuid,
    pub kind: PartyKind,
    pub name: String,
    #[serde(flatten)]
    pub statement: PartyStatement,
}

/// Invoices and payments of one party between `start` and `end`, opened
/// with everything invoiced minus everything paid before `start`.
pub async fn statement(p: &PgPool, kind: PartyKind, id: Uuid, start: NaiveDate, end: NaiveDate) -> anyhow::Result<Statement> {
    if start > end {
        return Err(invalid("start date is after end date"));
    }
    let name = party_name(p, kind, id).await?;

    let mut opening = zero();
    let mut movements = Vec::new();
    for doc in kind.documents() {
        let (table, total_col) = payments::document_table(*doc);
        let (invoiced, paid): (BigDecimal, BigDecimal) = sqlx::query_as(&format!(
            r#"
            SELECT
                COALESCE((SELECT SUM(i.{total_col}) FROM {table} i WHERE i.party_id = $1 AND i.date < $2), 0),
                COALESCE((SELECT SUM(pm.amount) FROM payments pm
                          JOIN {table} i ON i.id = pm.invoice_id
                          WHERE pm.invoice_type = $3 AND i.party_id = $1 AND pm.payment_date < $2), 0)
            "#
        ))
        .bind(id)
        .bind(start)
        .bind(doc.as_str())
        .fetch_one(p)
        .await?;
        opening = opening + invoiced - paid;

        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            r#"
            SELECT i.date, i.invoice_number AS reference, FALSE AS is_payment, i.{total_col} AS amount
            FROM {table} i
            WHERE i.party_id = $1 AND i.date BETWEEN $2 AND $3
            UNION ALL
            SELECT pm.payment_date, i.invoice_number, TRUE, pm.amount
            FROM payments pm
            JOIN {table} i ON i.id = pm.invoice_id
            WHERE pm.invoice_type = $4 AND i.party_id = $1 AND pm.payment_date BETWEEN $2 AND $3
            "#
        ))
        .bind(id)
        .bind(start)
        .bind(end)
        .bind(doc.as_str())
        .fetch_all(p)
        .await?;
        movements.extend(rows.into_iter().map(|r| PartyMovement {
            date: r.date,
            reference: r.reference,
            kind: if r.is_payment {
                MovementKind::Payment
            } else {
                MovementKind::Invoice
            },
            amount: r.amount,
        }));
    }

    Ok(Statement {
        id,
        kind,
        name,
        statement: party_statement(kind, start, end, &to_cents(&opening), movements),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_pattern_matches_anywhere() {
        assert_eq!(contains_pattern(" Farm "), "%Farm%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn suppliers_owe_over_purchases_and_expenses() {
        let sql = outstanding_sql(PartyKind::Supplier);
        assert!(sql.contains("FROM purchase_invoices i"));
        assert!(sql.contains("FROM expense_invoices i"));
        assert!(sql.contains("p.invoice_type = 'expense'"));

        let sql = outstanding_sql(PartyKind::Customer);
        assert!(sql.contains("FROM sales_invoices i"));
        assert!(!sql.contains("purchase"));
    }

    #[test]
    fn supplier_form_defaults() {
        let s: NewSupplier = serde_json::from_str(r#"{"name": "Fresh Farms"}"#).unwrap();
        assert_eq!(s.name, "Fresh Farms");
        assert!(s.payment_method.is_empty());
        assert_eq!(normalize_method(&s.payment_method), "CASH");
    }
}
