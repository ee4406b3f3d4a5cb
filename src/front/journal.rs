use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    auth::CurrentUser,
    components::table::{self, TableComponent},
    form,
    message::{ApiError, AppMessage},
    AppState,
};
use crate::{
    accounting::journal::{DraftLine, JournalDraft, JournalSource, TrialBalance},
    models,
    store::{accounts, journal},
};

pub fn new_router() -> Router<AppState> {
    Router::new()
        .route("/", get(page))
        .route("/:id", get(detail))
        .route("/:id/delete", post(delete))
}

pub fn new_api_router() -> Router<AppState> {
    Router::new().route("/", get(get_table).post(create))
}

pub fn new_trial_balance_router() -> Router<AppState> {
    Router::new().route("/", get(trial_balance_page))
}

pub fn new_trial_balance_api_router() -> Router<AppState> {
    Router::new().route("/", get(trial_balance))
}

#[derive(Serialize, Default)]
struct Row {
    number: String,
    date: String,
    description: String,
    source: String,
    debit: String,
    credit: String,
    link: String,
}

impl From<models::JournalEntry> for Row {
    fn from(e: models::JournalEntry) -> Self {
        Self {
            link: format!("/journal/{}", e.id),
            number: e.entry_number,
            date: e.entry_date.to_string(),
            description: e.description,
            source: e.source,
            debit: e.total_debit.to_string(),
            credit: e.total_credit.to_string(),
        }
    }
}

async fn table(s: &AppState, q: &table::Query) -> anyhow::Result<String> {
    let q = q.normalize();
    let count = journal::count(&s.p).await?;
    let rows = journal::list(&s.p, q.offset(), q.limit())
        .await?
        .into_iter()
        .map(Row::from)
        .collect();

    #[derive(Serialize)]
    struct Ctx {
        data: TableComponent<Row>,
    }
    let data = TableComponent::new(rows, count, "/api/journal", q)?;
    s.t.render_string("component.table.hbs", &Ctx { data })
}

async fn page(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> Result<Response, AppMessage> {
    let table = table(&s, &table::Query::default()).await.map_err(s.fail(&user))?;
    let accounts = accounts::postable(&s.p).await.map_err(s.fail(&user))?;

    #[derive(Serialize)]
    struct Ctx {
        table: String,
        accounts: Vec<models::Account>,
        today: NaiveDate,
    }
    s.page(
        "journal.get.hbs",
        "Journal",
        &user,
        &Ctx {
            table,
            accounts,
            today: Utc::now().date_naive(),
        },
    )
}

async fn get_table(
    State(s): State<AppState>,
    CurrentUser(_): CurrentUser,
    Query(q): Query<table::Query>,
) -> Result<Response, AppMessage> {
    let html = table(&s, &q)
        .await
        .map_err(|err| AppMessage::new_error_notification(err, &s))?;
    Ok(Html(html).into_response())
}

async fn detail(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppMessage> {
    let (entry, lines) = journal::get(&s.p, id).await.map_err(s.fail(&user))?;

    #[derive(Serialize)]
    struct Ctx {
        entry: models::JournalEntry,
        lines: Vec<models::JournalLine>,
    }
    s.page("journal_entry.get.hbs", "Journal entry", &user, &Ctx { entry, lines })
}

async fn delete(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppMessage> {
    journal::delete(&s.p, id, s.config.fiscal.require_fiscal_year)
        .await
        .map_err(s.fail(&user))?;
    Ok(Redirect::to("/journal").into_response())
}

#[derive(Deserialize)]
struct ManualEntry {
    date: NaiveDate,
    description: String,
    #[serde(default)]
    reference: Option<String>,
    lines: Vec<DraftLine>,
}

async fn create(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(m): Json<ManualEntry>,
) -> Result<(StatusCode, Json<journal::Posted>), ApiError> {
    let draft = JournalDraft {
        date: m.date,
        description: m.description,
        source: JournalSource::Manual,
        source_ref: m.reference.filter(|r| !r.trim().is_empty()),
        lines: m.lines,
    };
    let posted = journal::create(&s.p, &draft, s.posting(&user)).await?;
    Ok((StatusCode::CREATED, Json(posted)))
}

#[derive(Deserialize)]
struct AsOf {
    #[serde(default, deserialize_with = "form::optional_date")]
    as_of: Option<NaiveDate>,
}

async fn trial_balance_page(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<AsOf>,
) -> Result<Response, AppMessage> {
    let tb = journal::trial_balance(&s.p, q.as_of.unwrap_or_else(|| Utc::now().date_naive()))
        .await
        .map_err(s.fail(&user))?;
    s.page("trial_balance.get.hbs", "Trial balance", &user, &tb)
}

async fn trial_balance(
    State(s): State<AppState>,
    CurrentUser(_): CurrentUser,
    Query(q): Query<AsOf>,
) -> Result<Json<TrialBalance>, ApiError> {
    let tb = journal::trial_balance(&s.p, q.as_of.unwrap_or_else(|| Utc::now().date_naive())).await?;
    Ok(Json(tb))
}
