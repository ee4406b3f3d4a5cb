use anyhow::anyhow;
use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{
    invalid, inventory,
    invoices::{self, InitialPayment, NewInvoice, NewInvoiceLine},
    NotFound, PostingContext,
};
use crate::{
    accounting::{
        journal::normalize_method,
        money::{to_cents, to_cost, zero},
        reconciliation::DocumentKind,
        totals::Discount,
    },
    models,
};

/// Payment method that leaves the checkout invoice open.
pub const CREDIT: &str = "CREDIT";

pub async fn tables(p: &PgPool, branch: &str) -> anyhow::Result<Vec<models::DiningTable>> {
    Ok(sqlx::query_as::<_, models::DiningTable>(
        "SELECT id, branch_code, table_number, status FROM dining_tables WHERE branch_code = $1 ORDER BY table_number",
    )
    .bind(branch)
    .fetch_all(p)
    .await?)
}

async fn ensure_table(conn: &mut PgConnection, branch: &str, table_number: i32) -> anyhow::Result<()> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM dining_tables WHERE branch_code = $1 AND table_number = $2)",
    )
    .bind(branch)
    .bind(table_number)
    .fetch_one(conn)
    .await?;
    if !exists {
        return Err(NotFound(format!("table {table_number} in branch {branch}")).into());
    }
    Ok(())
}

async fn set_table_status(conn: &mut PgConnection, branch: &str, table_number: i32, status: &str) -> anyhow::Result<()> {
    sqlx::query("UPDATE dining_tables SET status = $3 WHERE branch_code = $1 AND table_number = $2")
        .bind(branch)
        .bind(table_number)
        .bind(status)
        .execute(conn)
        .await?;
    Ok(())
}

async fn open_order(conn: &mut PgConnection, branch: &str, table_number: i32) -> anyhow::Result<Option<models::DraftOrder>> {
    Ok(sqlx::query_as::<_, models::DraftOrder>(
        r#"
        SELECT id, branch_code, table_number, status, created_at
        FROM draft_orders
        WHERE branch_code = $1 AND table_number = $2 AND status = 'open'
        FOR UPDATE
        "#,
    )
    .bind(branch)
    .bind(table_number)
    .fetch_optional(conn)
    .await?)
}

async fn items(conn: &mut PgConnection, draft_id: Uuid) -> anyhow::Result<Vec<models::DraftOrderItem>> {
    Ok(sqlx::query_as::<_, models::DraftOrderItem>(
        "SELECT id, meal_id, description, quantity, unit_price FROM draft_order_items WHERE draft_id = $1 ORDER BY description",
    )
    .bind(draft_id)
    .fetch_all(conn)
    .await?)
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub order: models::DraftOrder,
    pub items: Vec<models::DraftOrderItem>,
    /// Before tax and discount.
    pub subtotal: BigDecimal,
}

async fn view(conn: &mut PgConnection, order: models::DraftOrder) -> anyhow::Result<OrderView> {
    let items = items(&mut *conn, order.id).await?;
    let subtotal = to_cents(
        &items
            .iter()
            .fold(zero(), |acc, i| acc + &i.quantity * &i.unit_price),
    );
    Ok(OrderView { order, items, subtotal })
}

pub async fn table_order(p: &PgPool, branch: &str, table_number: i32) -> anyhow::Result<Option<OrderView>> {
    let mut tx = p.begin().await?;
    ensure_table(&mut tx, branch, table_number).await?;
    let res = match open_order(&mut tx, branch, table_number).await? {
        Some(order) => Some(view(&mut tx, order).await?),
        None => None,
    };
    tx.commit().await?;
    Ok(res)
}

/// Adds a meal to the table's open order, opening one when needed.
pub async fn add_item(
    p: &PgPool,
    branch: &str,
    table_number: i32,
    meal_id: Uuid,
    quantity: &BigDecimal,
    user: &str,
) -> anyhow::Result<OrderView> {
    if *quantity <= zero() {
        return Err(invalid("quantity must be greater than zero"));
    }
    let mut tx = p.begin().await?;
    ensure_table(&mut tx, branch, table_number).await?;
    let meal = inventory::meal(&mut tx, meal_id).await?;
    if !meal.active {
        return Err(invalid(format!("meal '{}' is not available", meal.name)));
    }

    let order = match open_order(&mut tx, branch, table_number).await? {
        Some(o) => o,
        None => {
            let id = Uuid::new_v4();
            sqlx::query(
                "INSERT INTO draft_orders (id, branch_code, table_number, created_by) VALUES ($1, $2, $3, $4)",
            )
            .bind(id)
            .bind(branch)
            .bind(table_number)
            .bind(user)
            .execute(&mut *tx)
            .await?;
            set_table_status(&mut tx, branch, table_number, "occupied").await?;
            log::info!("order opened on table {} ({})", table_number, branch);
            open_order(&mut tx, branch, table_number)
                .await?
                .ok_or_else(|| anyhow!("order for table {} vanished", table_number))?
        }
    };

    sqlx::query(
        r#"
        INSERT INTO draft_order_items (id, draft_id, meal_id, description, quantity, unit_price)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(order.id)
    .bind(meal.id)
    .bind(&meal.name)
    .bind(to_cost(quantity))
    .bind(&meal.selling_price)
    .execute(&mut *tx)
    .await?;

    let v = view(&mut tx, order).await?;
    tx.commit().await?;
    Ok(v)
}

pub async fn remove_item(p: &PgPool, branch: &str, table_number: i32, item_id: Uuid) -> anyhow::Result<OrderView> {
    let mut tx = p.begin().await?;
    let order = open_order(&mut tx, branch, table_number)
        .await?
        .ok_or_else(|| NotFound(format!("open order on table {table_number}")))?;
    let res = sqlx::query("DELETE FROM draft_order_items WHERE id = $1 AND draft_id = $2")
        .bind(item_id)
        .bind(order.id)
        .execute(&mut *tx)
        .await?;
    if res.rows_affected() == 0 {
        return Err(NotFound(format!("order item {item_id}")).into());
    }
    let v = view(&mut tx, order).await?;
    tx.commit().await?;
    Ok(v)
}

pub async fn cancel(p: &PgPool, branch: &str, table_number: i32) -> anyhow::Result<()> {
    let mut tx = p.begin().await?;
    let order = open_order(&mut tx, branch, table_number)
        .await?
        .ok_or_else(|| NotFound(format!("open order on table {table_number}")))?;
    sqlx::query("UPDATE draft_orders SET status = 'cancelled' WHERE id = $1")
        .bind(order.id)
        .execute(&mut *tx)
        .await?;
    set_table_status(&mut tx, branch, table_number, "available").await?;
    tx.commit().await?;

    log::info!("order on table {} ({}) cancelled", table_number, branch);
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct Checkout {
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub discount_percent: Option<BigDecimal>,
    #[serde(default)]
    pub customer_name: String,
    /// Required when the bill goes on a credit customer's account.
    #[serde(default)]
    pub customer_id: Option<Uuid>,
}

/// Turns the table's open order into a sales invoice and frees the table.
pub async fn checkout(
    p: &PgPool,
    branch: &str,
    table_number: i32,
    c: Checkout,
    ctx: PostingContext<'_>,
) -> anyhow::Result<invoices::Created> {
    let mut tx = p.begin().await?;
    let order = open_order(&mut tx, branch, table_number)
        .await?
        .ok_or_else(|| NotFound(format!("open order on table {table_number}")))?;
    let lines = items(&mut tx, order.id).await?;
    if lines.is_empty() {
        return Err(invalid(format!("order on table {} has no items", table_number)));
    }

    let method = normalize_method(&c.payment_method);
    let discount = match c.discount_percent {
        Some(p) if p > zero() => Discount::Percent(p),
        _ => Discount::None,
    };
    let invoice = NewInvoice {
        date: Utc::now().date_naive(),
        branch_code: branch.to_string(),
        party_id: c.customer_id,
        party_name: c.customer_name,
        payment_method: method.clone(),
        vat: true,
        expense_account_code: None,
        payment: if method == CREDIT {
            InitialPayment::Unpaid
        } else {
            InitialPayment::Paid
        },
        paid_amount: None,
        lines: lines
            .into_iter()
            .map(|i| NewInvoiceLine {
                description: i.description,
                quantity: i.quantity,
                unit_price: i.unit_price,
                discount: discount.clone(),
                meal_id: Some(i.meal_id),
                raw_material_id: None,
                unit: String::new(),
            })
            .collect(),
    };
    let created = invoices::create_in(&mut tx, DocumentKind::Sales, &invoice, ctx).await?;

    sqlx::query("UPDATE draft_orders SET status = 'completed', invoice_id = $2 WHERE id = $1")
        .bind(order.id)
        .bind(created.id)
        .execute(&mut *tx)
        .await?;
    set_table_status(&mut tx, branch, table_number, "available").await?;
    tx.commit().await?;

    log::info!("table {} ({}) checked out as {}", table_number, branch, created.invoice_number);
    Ok(created)
}
