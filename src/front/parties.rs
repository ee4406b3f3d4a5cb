//! Customer and supplier registries. Toggling and statements are shared;
//! each router carries its `PartyKind` as an extension.

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Form, Json, Router,
};
use bigdecimal::BigDecimal;
use chrono::{Datelike, NaiveDate, Utc};
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
    store::parties::{self, CustomerBalance, NewCustomer, NewSupplier, SupplierBalance},
};

pub fn new_customers_router() -> Router<AppState> {
    Router::new()
        .route("/", get(customers_page).post(create_customer))
        .merge(shared())
        .layer(Extension(PartyKind::Customer))
}

pub fn new_suppliers_router() -> Router<AppState> {
    Router::new()
        .route("/", get(suppliers_page).post(create_supplier))
        .merge(shared())
        .layer(Extension(PartyKind::Supplier))
}

pub fn new_customers_api_router() -> Router<AppState> {
    Router::new().route("/", get(search_customers))
}

pub fn new_suppliers_api_router() -> Router<AppState> {
    Router::new().route("/", get(search_suppliers))
}

fn shared() -> Router<AppState> {
    Router::new()
        .route("/:id/toggle", post(toggle))
        .route("/:id/statement", get(statement))
}

fn area(kind: PartyKind) -> &'static str {
    match kind {
        PartyKind::Customer => "customers",
        PartyKind::Supplier => "suppliers",
    }
}

async fn customers_page(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> Result<Response, AppMessage> {
    let customers = parties::list_customers(&s.p).await.map_err(s.fail(&user))?;

    #[derive(Serialize)]
    struct Ctx {
        customers: Vec<CustomerBalance>,
    }
    s.page("customers.get.hbs", "Customers", &user, &Ctx { customers })
}

#[derive(Deserialize)]
struct CustomerForm {
    name: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    customer_type: String,
    #[serde(default, deserialize_with = "form::optional_amount")]
    discount_percent: Option<BigDecimal>,
}

async fn create_customer(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(f): Form<CustomerForm>,
) -> Result<Response, AppMessage> {
    let c = NewCustomer {
        name: f.name,
        phone: f.phone,
        customer_type: f.customer_type,
        discount_percent: f.discount_percent,
    };
    parties::create_customer(&s.p, c).await.map_err(s.fail(&user))?;
    Ok(Redirect::to("/customers").into_response())
}

async fn suppliers_page(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> Result<Response, AppMessage> {
    let suppliers = parties::list_suppliers(&s.p).await.map_err(s.fail(&user))?;

    #[derive(Serialize)]
    struct Ctx {
        suppliers: Vec<SupplierBalance>,
    }
    s.page("suppliers.get.hbs", "Suppliers", &user, &Ctx { suppliers })
}

async fn create_supplier(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(f): Form<NewSupplier>,
) -> Result<Response, AppMessage> {
    parties::create_supplier(&s.p, f).await.map_err(s.fail(&user))?;
    Ok(Redirect::to("/suppliers").into_response())
}

async fn toggle(
    State(s): State<AppState>,
    Extension(kind): Extension<PartyKind>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppMessage> {
    parties::toggle(&s.p, kind, id).await.map_err(s.fail(&user))?;
    Ok(Redirect::to(&format!("/{}", area(kind))).into_response())
}

#[derive(Deserialize, Default)]
struct StatementQuery {
    #[serde(default, deserialize_with = "form::optional_date")]
    start: Option<NaiveDate>,
    #[serde(default, deserialize_with = "form::optional_date")]
    end: Option<NaiveDate>,
}

impl StatementQuery {
    /// From the first of the month until today unless given.
    fn range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let start = self.start.unwrap_or_else(|| today.with_day(1).unwrap_or(today));
        (start, self.end.unwrap_or(today))
    }
}

async fn statement(
    State(s): State<AppState>,
    Extension(kind): Extension<PartyKind>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Query(q): Query<StatementQuery>,
) -> Result<Response, AppMessage> {
    let (start, end) = q.range(Utc::now().date_naive());
    let statement = parties::statement(&s.p, kind, id, start, end)
        .await
        .map_err(s.fail(&user))?;

    #[derive(Serialize)]
    struct Ctx {
        area: &'static str,
        #[serde(flatten)]
        statement: parties::Statement,
    }
    s.page(
        "party_statement.get.hbs",
        "Statement",
        &user,
        &Ctx {
            area: area(kind),
            statement,
        },
    )
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[derive(Serialize)]
struct Results<T> {
    results: Vec<T>,
}

async fn search_customers(
    State(s): State<AppState>,
    CurrentUser(_): CurrentUser,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Results<models::Customer>>, ApiError> {
    let results = parties::search_customers(&s.p, &q.q).await?;
    Ok(Json(Results { results }))
}

async fn search_suppliers(
    State(s): State<AppState>,
    CurrentUser(_): CurrentUser,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Results<models::Supplier>>, ApiError> {
    let results = parties::search_suppliers(&s.p, &q.q).await?;
    Ok(Json(Results { results }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, d).unwrap()
    }

    #[test]
    fn statement_range_defaults() {
        assert_eq!(StatementQuery::default().range(ymd(4, 18)), (ymd(4, 1), ymd(4, 18)));
        let q = StatementQuery {
            start: Some(ymd(1, 1)),
            end: Some(ymd(3, 31)),
        };
        assert_eq!(q.range(ymd(4, 18)), (ymd(1, 1), ymd(3, 31)));
    }

    #[test]
    fn customer_form_fields() {
        let f: CustomerForm =
            serde_json::from_str(r#"{"name": "Keeta", "customer_type": "credit", "discount_percent": "٥"}"#).unwrap();
        assert_eq!(f.name, "Keeta");
        assert_eq!(f.customer_type, "credit");
        assert_eq!(f.discount_percent, Some(BigDecimal::from(5)));
        assert!(f.phone.is_empty());
    }
}
