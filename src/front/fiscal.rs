use axum::{
    extract::{Multipart, Path, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{auth::CurrentUser, message::AppMessage, AppState};
use crate::{
    accounting::audit::AuditSnapshot,
    models,
    store::{fiscal, invalid, journal},
};

pub fn new_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(detail))
        .route("/:id/close", post(close))
        .route("/:id/partial-close", post(partial_close))
        .route("/:id/reopen", post(reopen))
        .route("/:id/exceptional-period", post(exceptional_period))
        .route("/:id/import-journal", post(import_journal))
}

fn detail_url(id: Uuid) -> Redirect {
    Redirect::to(&format!("/fiscal-years/{id}"))
}

fn reason(r: &Option<String>) -> Option<&str> {
    r.as_deref().map(str::trim).filter(|r| !r.is_empty())
}

async fn list(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> Result<Response, AppMessage> {
    let years = fiscal::list(&s.p).await.map_err(s.fail(&user))?;

    #[derive(Serialize)]
    struct Ctx {
        years: Vec<models::FiscalYear>,
    }
    s.page("fiscal_years.get.hbs", "Fiscal years", &user, &Ctx { years })
}

#[derive(Deserialize)]
struct NewYear {
    year: i32,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

async fn create(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(f): Form<NewYear>,
) -> Result<Response, AppMessage> {
    let id = fiscal::create(&s.p, f.year, f.start_date, f.end_date, &user.username)
        .await
        .map_err(s.fail(&user))?;
    Ok(detail_url(id).into_response())
}

async fn detail(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppMessage> {
    let year = fiscal::get(&s.p, id).await.map_err(s.fail(&user))?;
    let exceptional_periods = fiscal::exceptional_periods(&s.p, id).await.map_err(s.fail(&user))?;
    let logs = fiscal::logs(&s.p, id).await.map_err(s.fail(&user))?;
    let snapshot = fiscal::latest_snapshot(&s.p, id).await.map_err(s.fail(&user))?;

    #[derive(Serialize)]
    struct Ctx {
        year: models::FiscalYear,
        exceptional_periods: Vec<models::ExceptionalPeriod>,
        logs: Vec<models::FiscalYearAuditLog>,
        snapshot: Option<AuditSnapshot>,
        is_open: bool,
        is_closed: bool,
    }
    let is_open = year.status == "open";
    let is_closed = year.status == "closed";
    s.page(
        "fiscal_year.get.hbs",
        "Fiscal year",
        &user,
        &Ctx {
            year,
            exceptional_periods,
            logs,
            snapshot,
            is_open,
            is_closed,
        },
    )
}

#[derive(Deserialize)]
struct Reason {
    #[serde(default)]
    reason: Option<String>,
}

async fn close(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Form(f): Form<Reason>,
) -> Result<Response, AppMessage> {
    fiscal::close(&s.p, id, &user.username, reason(&f.reason))
        .await
        .map_err(s.fail(&user))?;
    Ok(detail_url(id).into_response())
}

#[derive(Deserialize)]
struct PartialClose {
    closed_until: NaiveDate,
    #[serde(default)]
    reason: Option<String>,
}

async fn partial_close(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Form(f): Form<PartialClose>,
) -> Result<Response, AppMessage> {
    fiscal::partial_close(&s.p, id, f.closed_until, &user.username, reason(&f.reason))
        .await
        .map_err(s.fail(&user))?;
    Ok(detail_url(id).into_response())
}

async fn reopen(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Form(f): Form<Reason>,
) -> Result<Response, AppMessage> {
    fiscal::reopen(&s.p, id, &user.username, reason(&f.reason))
        .await
        .map_err(s.fail(&user))?;
    Ok(detail_url(id).into_response())
}

#[derive(Deserialize)]
struct ExceptionalPeriod {
    start_date: NaiveDate,
    end_date: NaiveDate,
    #[serde(default)]
    reason: String,
}

async fn exceptional_period(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Form(f): Form<ExceptionalPeriod>,
) -> Result<Response, AppMessage> {
    fiscal::add_exceptional_period(&s.p, id, f.start_date, f.end_date, f.reason.trim(), &user.username)
        .await
        .map_err(s.fail(&user))?;
    Ok(detail_url(id).into_response())
}

#[axum_macros::debug_handler(state = AppState)]
async fn import_journal(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Response, AppMessage> {
    let mut data = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| s.fail(&user)(invalid(err.body_text())))?
    {
        if field.name() != Some("file") {
            continue;
        }
        log::info!("journal import file '{}'", field.file_name().unwrap_or("unnamed"));
        let bytes = field
            .bytes()
            .await
            .map_err(|err| s.fail(&user)(invalid(err.body_text())))?;
        data = Some(bytes);
    }
    let data = data.ok_or_else(|| s.fail(&user)(invalid("no file uploaded")))?;

    let year = fiscal::get(&s.p, id).await.map_err(s.fail(&user))?;
    let report = journal::import_csv(&s.p, id, data.as_ref(), s.posting(&user))
        .await
        .map_err(s.fail(&user))?;

    #[derive(Serialize)]
    struct Failure {
        entry_number: String,
        error: String,
    }
    #[derive(Serialize)]
    struct Ctx {
        year: models::FiscalYear,
        posted: Vec<String>,
        failed: Vec<Failure>,
    }
    s.page(
        "import.get.hbs",
        "Journal import",
        &user,
        &Ctx {
            year,
            posted: report.posted,
            failed: report
                .failed
                .into_iter()
                .map(|(entry_number, error)| Failure { entry_number, error })
                .collect(),
        },
    )
}
