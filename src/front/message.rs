use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use super::AppState;
use crate::{
    accounting::{
        costing::CostingError,
        fiscal::{FiscalTransitionError, PeriodError},
        import::ImportError,
        journal::PostingError,
        money::AmountError,
        parties::PartyError,
        payroll::PayrollError,
        reconciliation::PaymentError,
        totals::TotalsError,
        vat::VatError,
    },
    accounting_service::AccountingServiceError,
    models,
    store::{is_unique_violation, Invalid, NotFound},
};

/// Maps an error to the HTTP status the client should see.
pub fn classify(err: &anyhow::Error) -> StatusCode {
    if is_unique_violation(err) {
        return StatusCode::CONFLICT;
    }
    for cause in err.chain() {
        if cause.is::<NotFound>() {
            return StatusCode::NOT_FOUND;
        }
        if cause.is::<PeriodError>() {
            return StatusCode::FORBIDDEN;
        }
        if let Some(e) = cause.downcast_ref::<PostingError>() {
            return match e {
                PostingError::Period(_) => StatusCode::FORBIDDEN,
                _ => StatusCode::BAD_REQUEST,
            };
        }
        if let Some(e) = cause.downcast_ref::<AccountingServiceError>() {
            return match e {
                AccountingServiceError::FiscalYearClosed => StatusCode::FORBIDDEN,
                AccountingServiceError::BadRequest(_) => StatusCode::BAD_REQUEST,
                AccountingServiceError::InvalidApiKey => StatusCode::INTERNAL_SERVER_ERROR,
                AccountingServiceError::Unavailable(_) => StatusCode::BAD_GATEWAY,
            };
        }
        if cause.is::<Invalid>()
            || cause.is::<AmountError>()
            || cause.is::<TotalsError>()
            || cause.is::<FiscalTransitionError>()
            || cause.is::<PaymentError>()
            || cause.is::<PayrollError>()
            || cause.is::<CostingError>()
            || cause.is::<VatError>()
            || cause.is::<ImportError>()
            || cause.is::<PartyError>()
        {
            return StatusCode::BAD_REQUEST;
        }
    }
    StatusCode::INTERNAL_SERVER_ERROR
}

fn log_error(status: StatusCode, err: &anyhow::Error) {
    if status.is_server_error() {
        log::error!("request failed: {:#}", err);
    } else {
        log::warn!("request rejected ({}): {:#}", status.as_u16(), err);
    }
}

#[derive(Serialize)]
struct Notification {
    error: String,
}

pub struct AppMessage(Response);

impl AppMessage {
    fn render(s: &AppState, status: StatusCode, name: &str, ctx: &Notification, user: Option<&models::User>) -> Self {
        let res = if name == "base.notification.hbs" {
            s.t.render(name, ctx)
        } else {
            s.t.page(name, "Error", user, ctx)
        };
        match res {
            Ok(r) => Self((status, r).into_response()),
            Err(err) => {
                log::error!("cannot render message: {:#}", err);
                Self((status, ctx.error.clone()).into_response())
            }
        }
    }

    /// A notification fragment, for requests that load a partial.
    pub fn new_error_notification(err: anyhow::Error, s: &AppState) -> AppMessage {
        let status = classify(&err);
        log_error(status, &err);
        let ctx = Notification { error: err.to_string() };
        Self::render(s, status, "base.notification.hbs", &ctx, None)
    }

    /// A full error page.
    pub fn new_error(err: anyhow::Error, s: &AppState) -> AppMessage {
        Self::new_user_error(err, s, None)
    }

    pub fn new_user_error(err: anyhow::Error, s: &AppState, user: Option<&models::User>) -> AppMessage {
        let status = classify(&err);
        log_error(status, &err);
        let ctx = Notification { error: err.to_string() };
        Self::render(s, status, "error.get.hbs", &ctx, user)
    }
}

impl IntoResponse for AppMessage {
    fn into_response(self) -> Response {
        self.0
    }
}

/// Error body of the JSON endpoints.
pub struct ApiError(anyhow::Error);

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct Body {
            status: &'static str,
            message: String,
        }

        let status = classify(&self.0);
        log_error(status, &self.0);
        let message = if status.is_server_error() && status != StatusCode::BAD_GATEWAY {
            "internal error".to_string()
        } else {
            self.0.to_string()
        };
        (status, Json(Body { status: "error", message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::invalid;

    #[test]
    fn statuses() {
        assert_eq!(classify(&NotFound("meal".to_string()).into()), StatusCode::NOT_FOUND);
        assert_eq!(classify(&invalid("bad")), StatusCode::BAD_REQUEST);
        assert_eq!(
            classify(&PostingError::Period(PeriodError::NoFiscalYear(
                chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
            ))
            .into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(classify(&PostingError::ZeroTotal.into()), StatusCode::BAD_REQUEST);
        assert_eq!(classify(&PartyError::CreditCustomerRequired.into()), StatusCode::BAD_REQUEST);
        assert_eq!(
            classify(&AccountingServiceError::Unavailable("timeout".to_string()).into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(classify(&anyhow::anyhow!("boom")), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn context_does_not_hide_the_cause() {
        let err = anyhow::Error::from(PaymentError::NothingOpen("Fresh Farms".to_string())).context("paying supplier");
        assert_eq!(classify(&err), StatusCode::BAD_REQUEST);
    }
}
