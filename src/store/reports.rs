use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::Serialize;
use sqlx::PgPool;

use super::settings;
use crate::{
    accounting::{
        fiscal::covering_year,
        journal::codes,
        money::to_cents,
        vat::{build_return, quarter_bounds, BranchSales, Company, VatInputs, VatReturn},
    },
    models,
};

async fn cost_sums(p: &PgPool, table: &str, start: NaiveDate, end: NaiveDate) -> anyhow::Result<(BigDecimal, BigDecimal)> {
    Ok(sqlx::query_as(&format!(
        r#"
        SELECT COALESCE(SUM(total_before_tax), 0), COALESCE(SUM(tax_amount), 0)
        FROM {table}
        WHERE date BETWEEN $1 AND $2
        "#
    ))
    .bind(start)
    .bind(end)
    .fetch_one(p)
    .await?)
}

pub async fn vat_return(p: &PgPool, year: i32, quarter: u32) -> anyhow::Result<VatReturn> {
    let (start, end) = quarter_bounds(year, quarter)?;
    let mut conn = p.acquire().await?;
    let s = settings::get(&mut conn).await?;

    let branches = sqlx::query_as::<_, (String, String, BigDecimal, BigDecimal, BigDecimal)>(
        r#"
        SELECT b.code, b.name,
               COALESCE(SUM(i.total_before_tax), 0),
               COALESCE(SUM(i.discount_amount), 0),
               COALESCE(SUM(i.tax_amount), 0)
        FROM branches b
        LEFT JOIN sales_invoices i ON i.branch_code = b.code AND i.date BETWEEN $1 AND $2
        GROUP BY b.code, b.name
        ORDER BY b.code
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|(branch, name, sales, discounts, vat)| BranchSales {
        branch,
        name,
        sales_before_tax: to_cents(&sales),
        discounts: to_cents(&discounts),
        output_vat: to_cents(&vat),
    })
    .collect();

    let (purchases_before_tax, purchases_vat) = cost_sums(p, "purchase_invoices", start, end).await?;
    let (expenses_before_tax, expenses_vat) = cost_sums(p, "expense_invoices", start, end).await?;

    let ret = build_return(
        year,
        quarter,
        Company {
            name: s.company_name,
            tax_number: s.tax_number,
            currency: s.currency,
        },
        VatInputs {
            branches,
            purchases_before_tax,
            purchases_vat,
            expenses_before_tax,
            expenses_vat,
        },
    )?;
    log::info!("vat return {} Q{}: net {}", year, quarter, ret.net_vat);
    Ok(ret)
}

#[derive(Debug, Serialize)]
pub struct BranchDay {
    pub branch: String,
    pub name: String,
    pub invoices: i64,
    pub total: BigDecimal,
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub date: NaiveDate,
    pub sales_today: Vec<BranchDay>,
    pub open_receivables: BigDecimal,
    pub open_payables: BigDecimal,
    pub cash_balance: BigDecimal,
    pub fiscal_year: Option<models::FiscalYear>,
}

async fn open_amount(p: &PgPool, kind: &str, table: &str) -> anyhow::Result<BigDecimal> {
    let v: BigDecimal = sqlx::query_scalar(&format!(
        r#"
        SELECT COALESCE(SUM(i.total_after_tax_discount - COALESCE(
                   (SELECT SUM(p.amount) FROM payments p
                    WHERE p.invoice_type = $1 AND p.invoice_id = i.id), 0)), 0)
        FROM {table} i
        WHERE i.status <> 'paid'
        "#
    ))
    .bind(kind)
    .fetch_one(p)
    .await?;
    Ok(to_cents(&v))
}

pub async fn dashboard(p: &PgPool, date: NaiveDate) -> anyhow::Result<Dashboard> {
    let sales_today = sqlx::query_as::<_, (String, String, i64, BigDecimal)>(
        r#"
        SELECT b.code, b.name, COUNT(i.id), COALESCE(SUM(i.total_after_tax_discount), 0)
        FROM branches b
        LEFT JOIN sales_invoices i ON i.branch_code = b.code AND i.date = $1
        GROUP BY b.code, b.name
        ORDER BY b.code
        "#,
    )
    .bind(date)
    .fetch_all(p)
    .await?
    .into_iter()
    .map(|(branch, name, invoices, total)| BranchDay {
        branch,
        name,
        invoices,
        total: to_cents(&total),
    })
    .collect();

    let open_receivables = open_amount(p, "sales", "sales_invoices").await?;
    let open_payables = &open_amount(p, "purchase", "purchase_invoices").await?
        + &open_amount(p, "expense", "expense_invoices").await?;

    let mut conn = p.acquire().await?;
    let mut cash_balance = BigDecimal::from(0);
    for code in [codes::CASH, codes::BANK] {
        let (debit, credit) = super::journal::account_movement(&mut conn, code, date).await?;
        cash_balance = &cash_balance + &debit - &credit;
    }

    let years = super::fiscal::list(p).await?;
    let states = years.iter().map(|y| y.state()).collect::<anyhow::Result<Vec<_>>>()?;
    let fiscal_year = covering_year(&states, date).and_then(|s| years.iter().find(|y| y.id == s.id).cloned());

    Ok(Dashboard {
        date,
        sales_today,
        open_receivables,
        open_payables,
        cash_balance: to_cents(&cash_balance),
        fiscal_year,
    })
}
