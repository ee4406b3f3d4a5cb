use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse, Response},
    Router,
};
use serde::Serialize;

use crate::{
    front::{auth::CurrentUser, components::table, message::AppMessage, AppState},
    models,
    store::accounts,
};

pub fn new_router() -> Router<AppState> {
    Router::new().route("/", axum::routing::get(get))
}

#[derive(Default, Serialize)]
struct Record {
    code: String,
    name: String,
    account_type: String,
    parent_code: String,
    active: bool,
    allow_posting: bool,
    link: String,
}

impl From<models::Account> for Record {
    fn from(a: models::Account) -> Self {
        Self {
            link: format!("/accounts/{}/statement", a.id),
            code: a.code,
            name: a.name,
            account_type: a.account_type,
            parent_code: a.parent_code.unwrap_or_default(),
            active: a.active,
            allow_posting: a.allow_posting,
        }
    }
}

pub async fn table(s: &AppState, q: &table::Query) -> anyhow::Result<String> {
    let q = q.normalize();
    let count = accounts::count(&s.p).await?;
    let records = accounts::list(&s.p, q.offset(), q.limit())
        .await?
        .into_iter()
        .map(Record::from)
        .collect();

    #[derive(Serialize)]
    struct Ctx {
        data: table::TableComponent<Record>,
    }
    let ctx = Ctx {
        data: table::TableComponent::<Record>::new(records, count, "/api/accounts", q)?,
    };
    s.t.render_string("component.table.hbs", &ctx)
}

#[axum::debug_handler(state = AppState)]
async fn get(
    State(s): State<AppState>,
    CurrentUser(_): CurrentUser,
    Query(q): Query<table::Query>,
) -> Result<Response, AppMessage> {
    let html = table(&s, &q)
        .await
        .map_err(|err| AppMessage::new_error_notification(err, &s))?;
    Ok(Html(html).into_response())
}
