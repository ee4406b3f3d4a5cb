use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bigdecimal::BigDecimal;
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
    accounting::reconciliation::{Allocation, DocumentKind},
    store::payments,
};

pub fn new_router() -> Router<AppState> {
    Router::new().route("/", get(page))
}

pub fn new_api_router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_table).post(register))
        .route("/supplier", post(supplier))
        .route("/pay-all", post(pay_all))
}

async fn table(s: &AppState, q: &table::Query) -> anyhow::Result<String> {
    let q = q.normalize();
    let count = payments::count(&s.p).await?;
    let rows = payments::list(&s.p, q.offset(), q.limit()).await?;

    #[derive(Serialize)]
    struct Ctx {
        data: TableComponent<payments::PaymentRow>,
    }
    let data = TableComponent::new(rows, count, "/api/payments", q)?;
    s.t.render_string("component.table.hbs", &Ctx { data })
}

async fn page(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> Result<Response, AppMessage> {
    let table = table(&s, &table::Query::default()).await.map_err(s.fail(&user))?;

    #[derive(Serialize)]
    struct Ctx {
        table: String,
        today: NaiveDate,
    }
    s.page(
        "payments.get.hbs",
        "Payments",
        &user,
        &Ctx {
            table,
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

fn default_method() -> String {
    "CASH".to_string()
}

#[derive(Deserialize)]
struct NewPayment {
    invoice_type: String,
    invoice_id: Uuid,
    #[serde(deserialize_with = "form::amount")]
    amount: BigDecimal,
    #[serde(default, deserialize_with = "form::optional_date")]
    payment_date: Option<NaiveDate>,
    #[serde(default = "default_method")]
    payment_method: String,
    #[serde(default)]
    reference: Option<String>,
}

async fn register(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(r): Json<NewPayment>,
) -> Result<(StatusCode, Json<payments::Recorded>), ApiError> {
    let kind: DocumentKind = r.invoice_type.parse()?;
    let date = r.payment_date.unwrap_or_else(|| Utc::now().date_naive());
    let recorded = payments::register(
        &s.p,
        kind,
        r.invoice_id,
        &r.amount,
        date,
        &r.payment_method,
        r.reference.as_deref().filter(|r| !r.trim().is_empty()),
        s.posting(&user),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

#[derive(Deserialize)]
struct SupplierPayment {
    supplier: String,
    #[serde(deserialize_with = "form::amount")]
    amount: BigDecimal,
    #[serde(default, deserialize_with = "form::optional_date")]
    payment_date: Option<NaiveDate>,
    #[serde(default = "default_method")]
    payment_method: String,
    #[serde(default, deserialize_with = "form::optional_date")]
    from: Option<NaiveDate>,
    #[serde(default, deserialize_with = "form::optional_date")]
    to: Option<NaiveDate>,
}

async fn supplier(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(r): Json<SupplierPayment>,
) -> Result<Json<payments::Distribution>, ApiError> {
    let date = r.payment_date.unwrap_or_else(|| Utc::now().date_naive());
    let d = payments::supplier_payment(
        &s.p,
        &r.supplier,
        &r.amount,
        date,
        &r.payment_method,
        r.from,
        r.to,
        s.posting(&user),
    )
    .await?;
    Ok(Json(d))
}

#[derive(Deserialize)]
struct PayAll {
    #[serde(default, deserialize_with = "form::optional_date")]
    payment_date: Option<NaiveDate>,
    #[serde(default = "default_method")]
    payment_method: String,
}

async fn pay_all(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(r): Json<PayAll>,
) -> Result<Json<Vec<Allocation>>, ApiError> {
    let date = r.payment_date.unwrap_or_else(|| Utc::now().date_naive());
    let settled = payments::pay_all(&s.p, date, &r.payment_method, s.posting(&user)).await?;
    Ok(Json(settled))
}
