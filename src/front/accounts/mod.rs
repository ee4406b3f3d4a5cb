pub mod api;

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{auth::CurrentUser, components::table, form, message::AppMessage, AppState};
use crate::{
    accounting::journal::AccountType,
    store::{accounts, journal},
};

pub fn new_router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_accounts).post(post_account))
        .route("/:id/statement", get(statement))
}

async fn get_accounts(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> Result<Response, AppMessage> {
    let table = api::table(&s, &table::Query::default()).await.map_err(s.fail(&user))?;

    #[derive(Serialize)]
    struct Ctx {
        table: String,
        account_types: Vec<&'static str>,
    }
    s.page(
        "accounts.get.hbs",
        "Chart of accounts",
        &user,
        &Ctx {
            table,
            account_types: AccountType::ALL.iter().map(|t| t.as_str()).collect(),
        },
    )
}

#[derive(Deserialize)]
struct AccountForm {
    code: String,
    name: String,
    account_type: String,
    #[serde(default)]
    parent_code: Option<String>,
    #[serde(default, deserialize_with = "form::checkbox")]
    allow_posting: bool,
}

async fn post_account(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(f): Form<AccountForm>,
) -> Result<Response, AppMessage> {
    accounts::create(
        &s.p,
        accounts::NewAccount {
            code: f.code,
            name: f.name,
            account_type: f.account_type,
            parent_code: f.parent_code,
            allow_posting: f.allow_posting,
        },
    )
    .await
    .map_err(s.fail(&user))?;
    Ok(Redirect::to("/accounts").into_response())
}

#[derive(Deserialize)]
struct Period {
    #[serde(default, deserialize_with = "form::optional_date")]
    start: Option<NaiveDate>,
    #[serde(default, deserialize_with = "form::optional_date")]
    end: Option<NaiveDate>,
}

async fn statement(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Query(q): Query<Period>,
) -> Result<Response, AppMessage> {
    let today = Utc::now().date_naive();
    let start = q
        .start
        .or_else(|| NaiveDate::from_ymd_opt(today.year(), 1, 1))
        .unwrap_or(today);
    let end = q.end.unwrap_or(today);
    let st = journal::statement(&s.p, id, start, end).await.map_err(s.fail(&user))?;
    s.page("statement.get.hbs", "Account statement", &user, &st)
}
