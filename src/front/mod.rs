pub mod accounts;
pub mod auth;
pub mod components;
pub mod dashboard;
pub mod fiscal;
pub mod form;
pub mod inventory;
pub mod invoices;
pub mod journal;
pub mod message;
pub mod parties;
pub mod payments;
pub mod payroll;
pub mod pos;
pub mod reports;
pub mod settings;
pub mod template;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    response::{Redirect, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use sqlx::PgPool;
use tower_http::services::ServeDir;

use self::{auth::limiter::LoginLimiter, message::AppMessage};
use crate::{
    accounting::reconciliation::DocumentKind, accounting_service::AccountingService, config::AppConfig, models,
    store::PostingContext,
};

#[derive(Clone)]
pub struct AppState {
    pub p: PgPool,
    pub t: template::Template,
    pub config: Arc<AppConfig>,
    pub limiter: Arc<LoginLimiter>,
    pub service: Option<AccountingService>,
}

impl AppState {
    pub fn posting<'a>(&'a self, user: &'a models::User) -> PostingContext<'a> {
        PostingContext {
            user: &user.username,
            require_fiscal_year: self.config.fiscal.require_fiscal_year,
            service: self.service.as_ref(),
        }
    }

    /// Renders a full page for the signed-in user.
    pub fn page<T: Serialize>(&self, name: &str, title: &str, user: &models::User, data: &T) -> Result<Response, AppMessage> {
        self.t
            .page(name, title, Some(user), data)
            .map_err(|err| AppMessage::new_user_error(err, self, Some(user)))
    }

    /// Turns a failure into an error page for `user`.
    pub fn fail<'a>(&'a self, user: &'a models::User) -> impl Fn(anyhow::Error) -> AppMessage + 'a {
        move |err| AppMessage::new_user_error(err, self, Some(user))
    }
}

pub fn new_router(state: AppState) -> Router {
    let public = ServeDir::new(&state.config.paths.public);
    Router::new()
        .route("/", get(|| async { Redirect::to("/dashboard") }))
        .merge(auth::new_router())
        .nest("/dashboard", dashboard::new_router())
        .nest("/sales", invoices::new_router(DocumentKind::Sales))
        .nest("/purchases", invoices::new_router(DocumentKind::Purchase))
        .nest("/expenses", invoices::new_router(DocumentKind::Expense))
        .nest("/api/sales", invoices::api::new_router(DocumentKind::Sales))
        .nest("/api/purchases", invoices::api::new_router(DocumentKind::Purchase))
        .nest("/api/expenses", invoices::api::new_router(DocumentKind::Expense))
        .nest("/customers", parties::new_customers_router())
        .nest("/api/customers", parties::new_customers_api_router())
        .nest("/suppliers", parties::new_suppliers_router())
        .nest("/api/suppliers", parties::new_suppliers_api_router())
        .nest("/payments", payments::new_router())
        .nest("/api/payments", payments::new_api_router())
        .nest("/inventory", inventory::new_router())
        .nest("/api/inventory", inventory::new_api_router())
        .nest("/meals", inventory::new_meals_router())
        .nest("/api/meals", inventory::new_meals_api_router())
        .nest("/pos", pos::new_router())
        .nest("/api/pos", pos::new_api_router())
        .nest("/employees", payroll::new_router())
        .nest("/api/salaries", payroll::new_salaries_router())
        .nest("/api/payroll", payroll::new_summary_router())
        .nest("/accounts", accounts::new_router())
        .nest("/api/accounts", accounts::api::new_router())
        .nest("/journal", journal::new_router())
        .nest("/api/journal", journal::new_api_router())
        .nest("/trial-balance", journal::new_trial_balance_router())
        .nest("/api/trial-balance", journal::new_trial_balance_api_router())
        .nest("/fiscal-years", fiscal::new_router())
        .nest("/audit", reports::new_audit_router())
        .nest("/api/audit", reports::new_audit_api_router())
        .nest("/vat", reports::new_vat_router())
        .nest("/api/vat", reports::new_vat_api_router())
        .nest("/income-statement", reports::new_income_statement_router())
        .nest("/api/income-statement", reports::new_income_statement_api_router())
        .nest("/balance-sheet", reports::new_balance_sheet_router())
        .nest("/api/balance-sheet", reports::new_balance_sheet_api_router())
        .nest("/settings", settings::new_router())
        .nest("/users", settings::new_users_router())
        .nest_service("/public", public)
        .with_state(state)
}

pub async fn start_web_server(
    p: PgPool,
    config: AppConfig,
    service: Option<AccountingService>,
) -> anyhow::Result<()> {
    log::info!("loading templates from {}", config.paths.templates);
    let t = template::Template::new(&config.paths.templates)?;
    let limiter = LoginLimiter::new(config.auth.max_login_attempts, config.auth.lockout_minutes);
    let bind = config.server.bind.clone();

    let app = new_router(AppState {
        p,
        t,
        config: Arc::new(config),
        limiter: Arc::new(limiter),
        service,
    });

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("cannot bind {bind}"))?;
    log::info!("listening on http://{}", bind);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
