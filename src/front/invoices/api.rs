use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Extension, Json, Router,
};

use super::table;
use crate::{
    accounting::reconciliation::DocumentKind,
    front::{
        auth::CurrentUser,
        components::table::Query as PageQuery,
        message::{ApiError, AppMessage},
        AppState,
    },
    store::invoices,
};

pub fn new_router(kind: DocumentKind) -> Router<AppState> {
    Router::new()
        .route("/", get(get_table).post(create))
        .layer(Extension(kind))
}

async fn get_table(
    State(s): State<AppState>,
    Extension(kind): Extension<DocumentKind>,
    CurrentUser(_): CurrentUser,
    Query(f): Query<invoices::Filter>,
    Query(q): Query<PageQuery>,
) -> Result<Response, AppMessage> {
    let html = table(&s, kind, &f, &q)
        .await
        .map_err(|err| AppMessage::new_error_notification(err, &s))?;
    Ok(Html(html).into_response())
}

#[axum::debug_handler(state = AppState)]
async fn create(
    State(s): State<AppState>,
    Extension(kind): Extension<DocumentKind>,
    CurrentUser(user): CurrentUser,
    Json(inv): Json<invoices::NewInvoice>,
) -> Result<(StatusCode, Json<invoices::Created>), ApiError> {
    let created = invoices::create(&s.p, kind, &inv, s.posting(&user)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}
