use anyhow::Context;
use bigdecimal::BigDecimal;
use sqlx::{PgConnection, PgPool};

use crate::{accounting::totals::check_vat_rate, models};

pub async fn get(conn: &mut PgConnection) -> anyhow::Result<models::Settings> {
    sqlx::query_as::<_, models::Settings>(
        r#"
        SELECT company_name, tax_number, address, phone, email, vat_rate, currency
        FROM settings
        WHERE id = 1
        "#,
    )
    .fetch_optional(conn)
    .await?
    .context("settings row is missing")
}

pub async fn vat_rate(conn: &mut PgConnection) -> anyhow::Result<BigDecimal> {
    Ok(get(conn).await?.vat_rate)
}

pub async fn branches(p: &PgPool) -> anyhow::Result<Vec<models::Branch>> {
    Ok(
        sqlx::query_as::<_, models::Branch>("SELECT code, name FROM branches ORDER BY code")
            .fetch_all(p)
            .await?,
    )
}

pub async fn branch_exists(conn: &mut PgConnection, code: &str) -> anyhow::Result<bool> {
    Ok(sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM branches WHERE code = $1)")
        .bind(code)
        .fetch_one(conn)
        .await?)
}

pub async fn update(
    p: &PgPool,
    s: &models::Settings,
    branch_names: &[(String, String)],
) -> anyhow::Result<()> {
    check_vat_rate(&s.vat_rate)?;

    let mut tx = p.begin().await?;
    sqlx::query(
        r#"
        UPDATE settings
        SET company_name = $1, tax_number = $2, address = $3, phone = $4,
            email = $5, vat_rate = $6, currency = $7, updated_at = now()
        WHERE id = 1
        "#,
    )
    .bind(&s.company_name)
    .bind(&s.tax_number)
    .bind(&s.address)
    .bind(&s.phone)
    .bind(&s.email)
    .bind(&s.vat_rate)
    .bind(&s.currency)
    .execute(&mut *tx)
    .await?;

    for (code, name) in branch_names {
        if name.trim().is_empty() {
            continue;
        }
        sqlx::query("UPDATE branches SET name = $2 WHERE code = $1")
            .bind(code)
            .bind(name.trim())
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    log::info!("settings updated (vat {}%)", s.vat_rate);
    Ok(())
}
