use sqlx::PgPool;
use uuid::Uuid;

use super::{invalid, NotFound};
use crate::{accounting::journal::AccountType, models};

const ACCOUNT_COLUMNS: &str = "id, code, name, account_type, parent_code, active, allow_posting";

pub struct NewAccount {
    pub code: String,
    pub name: String,
    pub account_type: String,
    pub parent_code: Option<String>,
    pub allow_posting: bool,
}

pub async fn count(p: &PgPool) -> anyhow::Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
        .fetch_one(p)
        .await?)
}

pub async fn list(p: &PgPool, offset: i64, limit: i64) -> anyhow::Result<Vec<models::Account>> {
    Ok(sqlx::query_as::<_, models::Account>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY code OFFSET $1 LIMIT $2"
    ))
    .bind(offset)
    .bind(limit)
    .fetch_all(p)
    .await?)
}

/// Accounts a manual journal line may use.
pub async fn postable(p: &PgPool) -> anyhow::Result<Vec<models::Account>> {
    Ok(sqlx::query_as::<_, models::Account>(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE active AND allow_posting ORDER BY code"
    ))
    .fetch_all(p)
    .await?)
}

pub async fn get(p: &PgPool, id: Uuid) -> anyhow::Result<models::Account> {
    sqlx::query_as::<_, models::Account>(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"))
        .bind(id)
        .fetch_optional(p)
        .await?
        .ok_or_else(|| NotFound(format!("account {id}")).into())
}

pub async fn create(p: &PgPool, a: NewAccount) -> anyhow::Result<Uuid> {
    let code = a.code.trim();
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("account code must be numeric"));
    }
    if a.name.trim().is_empty() {
        return Err(invalid("account name must not be empty"));
    }
    let account_type: AccountType = a.account_type.parse()?;
    let parent = a.parent_code.as_deref().map(str::trim).filter(|c| !c.is_empty());

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO accounts (id, code, name, account_type, parent_code, allow_posting)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(code)
    .bind(a.name.trim())
    .bind(account_type.as_str())
    .bind(parent)
    .bind(a.allow_posting)
    .execute(p)
    .await?;

    log::info!("account {} '{}' created", code, a.name.trim());
    Ok(id)
}
