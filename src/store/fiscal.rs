use chrono::{NaiveDate, Utc};
use serde_json::json;
use sqlx::{types::Json, PgConnection, PgPool};
use uuid::Uuid;

use super::{audit, NotFound};
use crate::{
    accounting::{
        audit::{snapshot, AuditSnapshot},
        fiscal::{
            check_close, check_exceptional, check_override, check_partial_close, check_period as period_rule,
            check_reopen, validate_new_year, ExceptionalPeriod, FiscalYearState,
        },
    },
    models,
};

const FISCAL_YEAR_COLUMNS: &str = r#"
    id, year, start_date, end_date, status, closed_until, closed_at, closed_by,
    close_reason, reopened_at, reopened_by, reopen_reason, created_at
"#;

pub const LOG_PAGE_SIZE: i64 = 20;

pub async fn list(p: &PgPool) -> anyhow::Result<Vec<models::FiscalYear>> {
    Ok(sqlx::query_as::<_, models::FiscalYear>(&format!(
        "SELECT {FISCAL_YEAR_COLUMNS} FROM fiscal_years ORDER BY start_date DESC"
    ))
    .fetch_all(p)
    .await?)
}

async fn get_in(conn: &mut PgConnection, id: Uuid, lock: bool) -> anyhow::Result<models::FiscalYear> {
    let sql = format!(
        "SELECT {FISCAL_YEAR_COLUMNS} FROM fiscal_years WHERE id = $1 {}",
        if lock { "FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, models::FiscalYear>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| NotFound(format!("fiscal year {id}")).into())
}

pub async fn get(p: &PgPool, id: Uuid) -> anyhow::Result<models::FiscalYear> {
    let mut conn = p.acquire().await?;
    get_in(&mut conn, id, false).await
}

async fn states(conn: &mut PgConnection) -> anyhow::Result<Vec<FiscalYearState>> {
    sqlx::query_as::<_, models::FiscalYear>(&format!("SELECT {FISCAL_YEAR_COLUMNS} FROM fiscal_years"))
        .fetch_all(conn)
        .await?
        .iter()
        .map(|y| y.state())
        .collect()
}

async fn exceptional(conn: &mut PgConnection) -> anyhow::Result<Vec<ExceptionalPeriod>> {
    Ok(sqlx::query_as::<_, (Uuid, NaiveDate, NaiveDate)>(
        "SELECT fiscal_year_id, start_date, end_date FROM fiscal_year_exceptional_periods",
    )
    .fetch_all(conn)
    .await?
    .into_iter()
    .map(|(fiscal_year_id, start_date, end_date)| ExceptionalPeriod {
        fiscal_year_id,
        start_date,
        end_date,
    })
    .collect())
}

/// Fails with a `PeriodError` when `date` may not be posted.
pub async fn check_period(conn: &mut PgConnection, date: NaiveDate, require_year: bool) -> anyhow::Result<()> {
    let years = states(&mut *conn).await?;
    let periods = exceptional(&mut *conn).await?;
    period_rule(&years, &periods, date, require_year)?;
    Ok(())
}

pub async fn exceptional_periods(p: &PgPool, fiscal_year_id: Uuid) -> anyhow::Result<Vec<models::ExceptionalPeriod>> {
    Ok(sqlx::query_as::<_, models::ExceptionalPeriod>(
        r#"
        SELECT id, fiscal_year_id, start_date, end_date, reason, created_by, created_at
        FROM fiscal_year_exceptional_periods
        WHERE fiscal_year_id = $1
        ORDER BY start_date
        "#,
    )
    .bind(fiscal_year_id)
    .fetch_all(p)
    .await?)
}

pub async fn logs(p: &PgPool, fiscal_year_id: Uuid) -> anyhow::Result<Vec<models::FiscalYearAuditLog>> {
    Ok(sqlx::query_as::<_, models::FiscalYearAuditLog>(
        r#"
        SELECT id, action, username, details, created_at
        FROM fiscal_year_audit_logs
        WHERE fiscal_year_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(fiscal_year_id)
    .bind(LOG_PAGE_SIZE)
    .fetch_all(p)
    .await?)
}

/// Last audit snapshot stored for the year, never recomputed here.
pub async fn latest_snapshot(p: &PgPool, fiscal_year_id: Uuid) -> anyhow::Result<Option<AuditSnapshot>> {
    let row: Option<Json<AuditSnapshot>> = sqlx::query_scalar(
        r#"
        SELECT snapshot FROM audit_snapshots
        WHERE fiscal_year_id = $1
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(fiscal_year_id)
    .fetch_optional(p)
    .await?;
    Ok(row.map(|j| j.0))
}

async fn append_log(
    conn: &mut PgConnection,
    fiscal_year_id: Uuid,
    action: &str,
    user: &str,
    details: serde_json::Value,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO fiscal_year_audit_logs (id, fiscal_year_id, action, username, details) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(fiscal_year_id)
    .bind(action)
    .bind(user)
    .bind(Json(details))
    .execute(conn)
    .await?;
    Ok(())
}

async fn store_snapshot(
    conn: &mut PgConnection,
    fiscal_year_id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
    snap: &AuditSnapshot,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO audit_snapshots (id, fiscal_year_id, start_date, end_date, snapshot) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(fiscal_year_id)
    .bind(start)
    .bind(end)
    .bind(Json(snap))
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn create(p: &PgPool, year: i32, start: NaiveDate, end: NaiveDate, user: &str) -> anyhow::Result<Uuid> {
    let mut tx = p.begin().await?;
    let existing = states(&mut tx).await?;
    validate_new_year(&existing, year, start, end)?;

    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO fiscal_years (id, year, start_date, end_date) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(year)
        .bind(start)
        .bind(end)
        .execute(&mut *tx)
        .await?;
    append_log(&mut tx, id, "create", user, json!({ "start_date": start, "end_date": end })).await?;
    tx.commit().await?;

    log::info!("fiscal year {} created ({}..{})", year, start, end);
    Ok(id)
}

pub async fn close(p: &PgPool, id: Uuid, user: &str, reason: Option<&str>) -> anyhow::Result<AuditSnapshot> {
    let mut tx = p.begin().await?;
    let fy = get_in(&mut tx, id, true).await?;
    check_close(&fy.state()?)?;

    let report = audit::run(&mut tx, fy.start_date, fy.end_date).await?;
    let overridden = check_override(report.summary.high, reason)?;
    let snap = snapshot(&report);

    sqlx::query(
        r#"
        UPDATE fiscal_years
        SET status = 'closed', closed_until = NULL, closed_at = now(), closed_by = $2, close_reason = $3
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(user)
    .bind(reason)
    .execute(&mut *tx)
    .await?;

    let action = if overridden { "close_override" } else { "close" };
    append_log(&mut tx, id, action, user, json!({ "audit": &snap, "reason": reason })).await?;
    store_snapshot(&mut tx, id, fy.start_date, fy.end_date, &snap).await?;
    tx.commit().await?;

    log::info!("fiscal year {} closed by {} ({})", fy.year, user, action);
    Ok(snap)
}

pub async fn partial_close(
    p: &PgPool,
    id: Uuid,
    closed_until: NaiveDate,
    user: &str,
    reason: Option<&str>,
) -> anyhow::Result<AuditSnapshot> {
    let mut tx = p.begin().await?;
    let fy = get_in(&mut tx, id, true).await?;
    check_partial_close(&fy.state()?, closed_until)?;

    let report = audit::run(&mut tx, fy.start_date, closed_until).await?;
    let overridden = check_override(report.summary.high, reason)?;
    let snap = snapshot(&report);

    sqlx::query(
        r#"
        UPDATE fiscal_years
        SET status = 'partial', closed_until = $2, closed_at = now(), closed_by = $3, close_reason = $4
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(closed_until)
    .bind(user)
    .bind(reason)
    .execute(&mut *tx)
    .await?;

    append_log(
        &mut tx,
        id,
        "partial_close",
        user,
        json!({ "closed_until": closed_until, "audit": &snap, "reason": reason, "override": overridden }),
    )
    .await?;
    store_snapshot(&mut tx, id, fy.start_date, closed_until, &snap).await?;
    tx.commit().await?;

    log::info!("fiscal year {} closed until {} by {}", fy.year, closed_until, user);
    Ok(snap)
}

pub async fn reopen(p: &PgPool, id: Uuid, user: &str, reason: Option<&str>) -> anyhow::Result<AuditSnapshot> {
    let mut tx = p.begin().await?;
    let fy = get_in(&mut tx, id, true).await?;
    check_reopen(&fy.state()?, reason)?;

    sqlx::query(
        r#"
        UPDATE fiscal_years
        SET status = 'open', closed_until = NULL, reopened_at = now(), reopened_by = $2, reopen_reason = $3
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(user)
    .bind(reason)
    .execute(&mut *tx)
    .await?;

    let report = audit::run(&mut tx, fy.start_date, fy.end_date).await?;
    let snap = snapshot(&report);
    append_log(
        &mut tx,
        id,
        "reopen",
        user,
        json!({ "previous_status": fy.status, "audit": &snap, "reason": reason }),
    )
    .await?;
    store_snapshot(&mut tx, id, fy.start_date, fy.end_date, &snap).await?;
    tx.commit().await?;

    log::info!("fiscal year {} reopened by {}", fy.year, user);
    Ok(snap)
}

pub async fn add_exceptional_period(
    p: &PgPool,
    id: Uuid,
    start: NaiveDate,
    end: NaiveDate,
    reason: &str,
    user: &str,
) -> anyhow::Result<()> {
    let mut tx = p.begin().await?;
    let fy = get_in(&mut tx, id, false).await?;
    check_exceptional(&fy.state()?, start, end)?;

    sqlx::query(
        r#"
        INSERT INTO fiscal_year_exceptional_periods (id, fiscal_year_id, start_date, end_date, reason, created_by)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(id)
    .bind(start)
    .bind(end)
    .bind(reason)
    .bind(user)
    .execute(&mut *tx)
    .await?;
    append_log(
        &mut tx,
        id,
        "open_exceptional",
        user,
        json!({ "start_date": start, "end_date": end, "reason": reason, "at": Utc::now() }),
    )
    .await?;
    tx.commit().await?;

    log::info!("exceptional period {}..{} opened in fiscal year {}", start, end, fy.year);
    Ok(())
}
