//! Audit, VAT and financial statements, each as a page and as JSON.

use axum::{
    extract::{Query, State},
    response::Response,
    routing::get,
    Json, Router,
};
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
    accounting::{
        audit::AuditReport,
        journal::{BalanceSheet, IncomeStatement},
        vat::{quarter_of, VatReturn},
    },
    models,
    store::{audit, fiscal, journal, reports},
};

pub fn new_audit_router() -> Router<AppState> {
    Router::new().route("/", get(audit_page))
}

pub fn new_audit_api_router() -> Router<AppState> {
    Router::new().route("/", get(audit_json))
}

pub fn new_vat_router() -> Router<AppState> {
    Router::new().route("/", get(vat_page))
}

pub fn new_vat_api_router() -> Router<AppState> {
    Router::new().route("/", get(vat_json))
}

pub fn new_income_statement_router() -> Router<AppState> {
    Router::new().route("/", get(income_statement_page))
}

pub fn new_income_statement_api_router() -> Router<AppState> {
    Router::new().route("/", get(income_statement_json))
}

pub fn new_balance_sheet_router() -> Router<AppState> {
    Router::new().route("/", get(balance_sheet_page))
}

pub fn new_balance_sheet_api_router() -> Router<AppState> {
    Router::new().route("/", get(balance_sheet_json))
}

#[derive(Deserialize)]
struct AuditQuery {
    #[serde(default)]
    fiscal_year_id: Option<Uuid>,
    #[serde(default, deserialize_with = "form::optional_date")]
    start: Option<NaiveDate>,
    #[serde(default, deserialize_with = "form::optional_date")]
    end: Option<NaiveDate>,
}

/// A fiscal year's range when one is named, else the explicit dates,
/// else the start of the current year until today.
async fn run_audit(s: &AppState, q: &AuditQuery) -> anyhow::Result<AuditReport> {
    let today = Utc::now().date_naive();
    let (start, end) = match q.fiscal_year_id {
        Some(id) => {
            let fy = fiscal::get(&s.p, id).await?;
            (fy.start_date, fy.end_date)
        }
        None => (
            q.start
                .or_else(|| NaiveDate::from_ymd_opt(today.year(), 1, 1))
                .unwrap_or(today),
            q.end.unwrap_or(today),
        ),
    };
    let mut conn = s.p.acquire().await?;
    audit::run(&mut conn, start, end).await
}

async fn audit_page(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<AuditQuery>,
) -> Result<Response, AppMessage> {
    let report = run_audit(&s, &q).await.map_err(s.fail(&user))?;
    let years = fiscal::list(&s.p).await.map_err(s.fail(&user))?;

    #[derive(Serialize)]
    struct Ctx {
        report: AuditReport,
        years: Vec<models::FiscalYear>,
    }
    s.page("audit.get.hbs", "Audit", &user, &Ctx { report, years })
}

async fn audit_json(
    State(s): State<AppState>,
    CurrentUser(_): CurrentUser,
    Query(q): Query<AuditQuery>,
) -> Result<Json<AuditReport>, ApiError> {
    Ok(Json(run_audit(&s, &q).await?))
}

#[derive(Deserialize)]
struct VatQuery {
    year: Option<i32>,
    quarter: Option<u32>,
}

async fn vat_return(s: &AppState, q: &VatQuery) -> anyhow::Result<VatReturn> {
    let today = Utc::now().date_naive();
    reports::vat_return(
        &s.p,
        q.year.unwrap_or(today.year()),
        q.quarter.unwrap_or_else(|| quarter_of(today)),
    )
    .await
}

async fn vat_page(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<VatQuery>,
) -> Result<Response, AppMessage> {
    let r = vat_return(&s, &q).await.map_err(s.fail(&user))?;
    s.page("vat.get.hbs", "VAT return", &user, &r)
}

async fn vat_json(
    State(s): State<AppState>,
    CurrentUser(_): CurrentUser,
    Query(q): Query<VatQuery>,
) -> Result<Json<VatReturn>, ApiError> {
    Ok(Json(vat_return(&s, &q).await?))
}

#[derive(Deserialize, Default)]
struct PeriodQuery {
    #[serde(default, deserialize_with = "form::optional_date")]
    start: Option<NaiveDate>,
    #[serde(default, deserialize_with = "form::optional_date")]
    end: Option<NaiveDate>,
}

impl PeriodQuery {
    /// Defaults to the month of `today` up to `today`.
    fn range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let end = self.end.unwrap_or(today);
        let start = self.start.unwrap_or_else(|| end.with_day(1).unwrap_or(end));
        (start, end)
    }
}

async fn income_statement(s: &AppState, q: &PeriodQuery) -> anyhow::Result<IncomeStatement> {
    let (start, end) = q.range(Utc::now().date_naive());
    journal::income_statement(&s.p, start, end).await
}

async fn income_statement_page(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<PeriodQuery>,
) -> Result<Response, AppMessage> {
    let r = income_statement(&s, &q).await.map_err(s.fail(&user))?;
    s.page("income_statement.get.hbs", "Income statement", &user, &r)
}

async fn income_statement_json(
    State(s): State<AppState>,
    CurrentUser(_): CurrentUser,
    Query(q): Query<PeriodQuery>,
) -> Result<Json<IncomeStatement>, ApiError> {
    Ok(Json(income_statement(&s, &q).await?))
}

#[derive(Deserialize)]
struct AsOfQuery {
    #[serde(default, deserialize_with = "form::optional_date")]
    as_of: Option<NaiveDate>,
}

async fn balance_sheet_page(
    State(s): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<AsOfQuery>,
) -> Result<Response, AppMessage> {
    let as_of = q.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let r = journal::balance_sheet(&s.p, as_of).await.map_err(s.fail(&user))?;
    s.page("balance_sheet.get.hbs", "Balance sheet", &user, &r)
}

async fn balance_sheet_json(
    State(s): State<AppState>,
    CurrentUser(_): CurrentUser,
    Query(q): Query<AsOfQuery>,
) -> Result<Json<BalanceSheet>, ApiError> {
    let as_of = q.as_of.unwrap_or_else(|| Utc::now().date_naive());
    Ok(Json(journal::balance_sheet(&s.p, as_of).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn period_defaults_to_month_to_date() {
        let today = ymd(2024, 5, 17);
        assert_eq!(PeriodQuery::default().range(today), (ymd(2024, 5, 1), today));

        let q = PeriodQuery {
            start: None,
            end: Some(ymd(2024, 2, 29)),
        };
        assert_eq!(q.range(today), (ymd(2024, 2, 1), ymd(2024, 2, 29)));

        let q = PeriodQuery {
            start: Some(ymd(2024, 1, 1)),
            end: None,
        };
        assert_eq!(q.range(today), (ymd(2024, 1, 1), today));
    }
}
