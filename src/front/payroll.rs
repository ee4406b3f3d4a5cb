use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
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
    accounting::payroll::parse_month,
    models,
    store::{payments, payroll, settings},
};

pub fn new_router() -> Router<AppState> {
    Router::new()
        .route("/", get(page).post(create_employee))
        .route("/:id/deactivate", post(deactivate))
}

pub fn new_salaries_router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_salary))
        .route("/:id/pay", post(pay_salary))
}

pub fn new_summary_router() -> Router<AppState> {
    Router::new().route("/summary", get(summary))
}

async fn page(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> Result<Response, AppMessage> {
    let employees = payroll::list_employees(&s.p).await.map_err(s.fail(&user))?;
    let branches = settings::branches(&s.p).await.map_err(s.fail(&user))?;
    let today = Utc::now().date_naive();

    #[derive(Serialize)]
    struct Ctx {
        employees: Vec<models::Employee>,
        branches: Vec<models::Branch>,
        today: NaiveDate,
        month: String,
    }
    s.page(
        "employees.get.hbs",
        "Employees",
        &user,
        &Ctx {
            employees,
            branches,
            today,
            month: format!("{}-{:02}", today.year(), today.month()),
        },
    )
}

#[derive(Deserialize)]
struct EmployeeForm {
    employee_code: String,
    name: String,
    national_id: String,
    branch_code: String,
    #[serde(default)]
    job_title: String,
    #[serde(deserialize_with = "form::amount")]
    basic_salary: BigDecimal,
    #[serde(default, deserialize_with = "form::optional_date")]
    hire_date: Option<NaiveDate>,
}

async fn create_employee(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(f): Form<EmployeeForm>,
) -> Result<Response, AppMessage> {
    let e = payroll::NewEmployee {
        employee_code: f.employee_code,
        name: f.name,
        national_id: f.national_id,
        branch_code: f.branch_code,
        job_title: f.job_title,
        basic_salary: f.basic_salary,
        hire_date: f.hire_date.unwrap_or_else(|| Utc::now().date_naive()),
    };
    payroll::create_employee(&s.p, e).await.map_err(s.fail(&user))?;
    Ok(Redirect::to("/employees").into_response())
}

async fn deactivate(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppMessage> {
    payroll::deactivate(&s.p, id).await.map_err(s.fail(&user))?;
    Ok(Redirect::to("/employees").into_response())
}

async fn create_salary(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(n): Json<payroll::NewSalary>,
) -> Result<(StatusCode, Json<payroll::SalaryCreated>), ApiError> {
    let created = payroll::create_salary(&s.p, n, s.posting(&user)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[derive(Deserialize)]
struct SalaryPayment {
    #[serde(deserialize_with = "form::amount")]
    amount: BigDecimal,
    #[serde(default, deserialize_with = "form::optional_date")]
    payment_date: Option<NaiveDate>,
    #[serde(default)]
    payment_method: String,
}

async fn pay_salary(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(r): Json<SalaryPayment>,
) -> Result<(StatusCode, Json<payments::Recorded>), ApiError> {
    let date = r.payment_date.unwrap_or_else(|| Utc::now().date_naive());
    let recorded = payroll::pay_salary(&s.p, id, &r.amount, date, &r.payment_method, s.posting(&user)).await?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

#[derive(Deserialize)]
struct SummaryQuery {
    month: Option<String>,
}

async fn summary(
    State(s): State<AppState>,
    CurrentUser(_): CurrentUser,
    Query(q): Query<SummaryQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (year, month) = match q.month.as_deref().filter(|m| !m.trim().is_empty()) {
        Some(m) => parse_month(m)?,
        None => {
            let today = Utc::now().date_naive();
            (today.year(), today.month())
        }
    };
    let rows = payroll::summary(&s.p, year, month).await?;
    Ok(Json(serde_json::json!({
        "month": format!("{year}-{month:02}"),
        "salaries": rows,
    })))
}
