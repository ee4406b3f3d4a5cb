use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::invalid;
use crate::models;

pub const ROLES: [&str; 2] = ["admin", "user"];

pub async fn find_by_username(p: &PgPool, username: &str) -> anyhow::Result<Option<models::User>> {
    Ok(sqlx::query_as::<_, models::User>(
        "SELECT id, username, password_hash, role, active, created_at FROM users WHERE username = $1",
    )
    .bind(username)
    .fetch_optional(p)
    .await?)
}

pub async fn list(p: &PgPool) -> anyhow::Result<Vec<models::User>> {
    Ok(sqlx::query_as::<_, models::User>(
        "SELECT id, username, password_hash, role, active, created_at FROM users ORDER BY username",
    )
    .fetch_all(p)
    .await?)
}

pub async fn create(p: &PgPool, username: &str, password: &str, role: &str) -> anyhow::Result<Uuid> {
    let username = username.trim();
    if username.is_empty() {
        return Err(invalid("username must not be empty"));
    }
    if password.len() < 4 {
        return Err(invalid("password must have at least 4 characters"));
    }
    if !ROLES.contains(&role) {
        return Err(invalid(format!("unknown role '{}'", role)));
    }

    let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, username, password_hash, role) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(username)
        .bind(&hash)
        .bind(role)
        .execute(p)
        .await?;

    log::info!("user '{}' created with role {}", username, role);
    Ok(id)
}

/// Creates the `admin` user when the table is empty.
pub async fn ensure_admin(p: &PgPool, password: &str) -> anyhow::Result<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(p)
        .await?;
    if count > 0 {
        return Ok(());
    }
    create(p, "admin", password, "admin").await?;
    log::warn!("no users found, created bootstrap admin account");
    Ok(())
}

/// Returns the user when the password matches and the account is active.
pub async fn authenticate(p: &PgPool, username: &str, password: &str) -> anyhow::Result<Option<models::User>> {
    let Some(user) = find_by_username(p, username.trim()).await? else {
        return Ok(None);
    };
    if !user.active {
        return Ok(None);
    }
    if !bcrypt::verify(password, &user.password_hash)? {
        return Ok(None);
    }
    Ok(Some(user))
}

pub async fn create_session(p: &PgPool, user_id: Uuid, hours: i64) -> anyhow::Result<Uuid> {
    let token = Uuid::new_v4();
    sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3)")
        .bind(token)
        .bind(user_id)
        .bind(Utc::now() + Duration::hours(hours))
        .execute(p)
        .await?;
    Ok(token)
}

pub async fn session_user(p: &PgPool, token: Uuid) -> anyhow::Result<Option<models::User>> {
    Ok(sqlx::query_as::<_, models::User>(
        r#"
        SELECT u.id, u.username, u.password_hash, u.role, u.active, u.created_at
        FROM sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.token = $1 AND s.expires_at > now() AND u.active
        "#,
    )
    .bind(token)
    .fetch_optional(p)
    .await?)
}

pub async fn delete_session(p: &PgPool, token: Uuid) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token = $1 OR expires_at <= now()")
        .bind(token)
        .execute(p)
        .await?;
    Ok(())
}
