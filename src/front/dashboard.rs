use axum::{extract::State, response::Response, routing::get, Router};
use chrono::Utc;

use super::{auth::CurrentUser, message::AppMessage, AppState};
use crate::store::reports;

pub fn new_router() -> Router<AppState> {
    Router::new().route("/", get(dashboard))
}

async fn dashboard(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> Result<Response, AppMessage> {
    let d = reports::dashboard(&s.p, Utc::now().date_naive())
        .await
        .map_err(s.fail(&user))?;
    s.page("dashboard.get.hbs", "Dashboard", &user, &d)
}
