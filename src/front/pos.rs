use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    auth::CurrentUser,
    form,
    message::{ApiError, AppMessage},
    AppState,
};
use crate::{
    accounting::parties::PartyKind,
    models,
    store::{
        invoices, inventory, parties,
        pos::{self, OrderView},
        settings, NotFound,
    },
};

pub fn new_router() -> Router<AppState> {
    Router::new().route("/:branch", get(page))
}

pub fn new_api_router() -> Router<AppState> {
    Router::new()
        .route("/:branch/tables/:no", get(order))
        .route("/:branch/tables/:no/items", post(add_item))
        .route("/:branch/tables/:no/items/:item", delete(remove_item))
        .route("/:branch/tables/:no/checkout", post(checkout))
        .route("/:branch/tables/:no/cancel", post(cancel))
}

async fn page(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(branch): Path<String>,
) -> Result<Response, AppMessage> {
    let branch = settings::branches(&s.p)
        .await
        .map_err(s.fail(&user))?
        .into_iter()
        .find(|b| b.code == branch)
        .ok_or_else(|| anyhow::Error::from(NotFound(format!("branch {branch}"))))
        .map_err(s.fail(&user))?;
    let tables = pos::tables(&s.p, &branch.code).await.map_err(s.fail(&user))?;
    let meals = inventory::meals(&s.p).await.map_err(s.fail(&user))?;
    let customers = parties::options(&s.p, PartyKind::Customer).await.map_err(s.fail(&user))?;

    #[derive(Serialize)]
    struct Ctx {
        branch: models::Branch,
        tables: Vec<models::DiningTable>,
        meals: Vec<models::Meal>,
        customers: Vec<parties::PartyOption>,
        credit: &'static str,
    }
    s.page(
        "pos.get.hbs",
        "Point of sale",
        &user,
        &Ctx {
            branch,
            tables,
            meals,
            customers,
            credit: pos::CREDIT,
        },
    )
}

async fn order(
    State(s): State<AppState>,
    CurrentUser(_): CurrentUser,
    Path((branch, no)): Path<(String, i32)>,
) -> Result<Json<Option<OrderView>>, ApiError> {
    Ok(Json(pos::table_order(&s.p, &branch, no).await?))
}

#[derive(Deserialize)]
struct NewItem {
    meal_id: Uuid,
    #[serde(deserialize_with = "form::amount")]
    quantity: BigDecimal,
}

async fn add_item(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((branch, no)): Path<(String, i32)>,
    Json(i): Json<NewItem>,
) -> Result<Json<OrderView>, ApiError> {
    Ok(Json(
        pos::add_item(&s.p, &branch, no, i.meal_id, &i.quantity, &user.username).await?,
    ))
}

async fn remove_item(
    State(s): State<AppState>,
    CurrentUser(_): CurrentUser,
    Path((branch, no, item)): Path<(String, i32, Uuid)>,
) -> Result<Json<OrderView>, ApiError> {
    Ok(Json(pos::remove_item(&s.p, &branch, no, item).await?))
}

async fn checkout(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((branch, no)): Path<(String, i32)>,
    Json(c): Json<pos::Checkout>,
) -> Result<(StatusCode, Json<invoices::Created>), ApiError> {
    let created = pos::checkout(&s.p, &branch, no, c, s.posting(&user)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn cancel(
    State(s): State<AppState>,
    CurrentUser(_): CurrentUser,
    Path((branch, no)): Path<(String, i32)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    pos::cancel(&s.p, &branch, no).await?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
