use std::collections::HashMap;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
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
use crate::{models, store::inventory};

pub fn new_router() -> Router<AppState> {
    Router::new()
        .route("/", get(page))
        .route("/materials", post(create_material))
}

pub fn new_api_router() -> Router<AppState> {
    Router::new()
        .route("/materials", get(materials))
        .route("/valuation", get(valuation))
}

pub fn new_meals_router() -> Router<AppState> {
    Router::new().route("/", get(meals_page))
}

pub fn new_meals_api_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_meal))
        .route("/recalculate", post(recalculate))
}

async fn page(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> Result<Response, AppMessage> {
    let valuation = inventory::valuation(&s.p).await.map_err(s.fail(&user))?;
    s.page("inventory.get.hbs", "Inventory", &user, &valuation)
}

#[derive(Deserialize)]
struct NewMaterial {
    name: String,
    #[serde(default)]
    unit: String,
    #[serde(default, deserialize_with = "form::optional_amount")]
    stock_quantity: Option<BigDecimal>,
    #[serde(default, deserialize_with = "form::optional_amount")]
    cost_per_unit: Option<BigDecimal>,
}

async fn create_material(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(f): Form<NewMaterial>,
) -> Result<Response, AppMessage> {
    inventory::create_material(
        &s.p,
        &f.name,
        &f.unit,
        &f.stock_quantity.unwrap_or_default(),
        &f.cost_per_unit.unwrap_or_default(),
    )
    .await
    .map_err(s.fail(&user))?;
    Ok(Redirect::to("/inventory").into_response())
}

async fn materials(
    State(s): State<AppState>,
    CurrentUser(_): CurrentUser,
) -> Result<Json<Vec<models::RawMaterial>>, ApiError> {
    Ok(Json(inventory::materials(&s.p).await?))
}

async fn valuation(State(s): State<AppState>, CurrentUser(_): CurrentUser) -> Result<Json<inventory::Valuation>, ApiError> {
    Ok(Json(inventory::valuation(&s.p).await?))
}

#[derive(Serialize)]
struct MealView {
    #[serde(flatten)]
    meal: models::Meal,
    ingredients: Vec<models::MealIngredient>,
}

async fn meals_page(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> Result<Response, AppMessage> {
    let meals = inventory::meals(&s.p).await.map_err(s.fail(&user))?;
    let mut ingredients: HashMap<Uuid, Vec<models::MealIngredient>> = HashMap::new();
    for i in inventory::ingredients(&s.p).await.map_err(s.fail(&user))? {
        ingredients.entry(i.meal_id).or_default().push(i);
    }
    let materials = inventory::materials(&s.p).await.map_err(s.fail(&user))?;

    #[derive(Serialize)]
    struct Ctx {
        meals: Vec<MealView>,
        materials: Vec<models::RawMaterial>,
    }
    let meals = meals
        .into_iter()
        .map(|meal| MealView {
            ingredients: ingredients.remove(&meal.id).unwrap_or_default(),
            meal,
        })
        .collect();
    s.page("meals.get.hbs", "Meals", &user, &Ctx { meals, materials })
}

async fn create_meal(
    State(s): State<AppState>,
    CurrentUser(_): CurrentUser,
    Json(m): Json<inventory::NewMeal>,
) -> Result<(StatusCode, Json<models::Meal>), ApiError> {
    let meal = inventory::create_meal(&s.p, m).await?;
    Ok((StatusCode::CREATED, Json(meal)))
}

async fn recalculate(State(s): State<AppState>, CurrentUser(_): CurrentUser) -> Result<Json<serde_json::Value>, ApiError> {
    let updated = inventory::recompute_all(&s.p).await?;
    Ok(Json(serde_json::json!({ "status": "ok", "updated": updated })))
}
