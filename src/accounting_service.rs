//! Client for the external accounting service. When it is configured,
//! invoices, payments and salaries are journalised there instead of in the
//! local ledger and the returned journal id is kept on the document.

use std::time::Duration;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use reqwest::{header::HeaderValue, StatusCode};
use serde::{Serialize, Serializer};

use crate::{
    accounting::{journal::normalize_method, money::to_cents},
    config::AccountingServiceConfig,
};

pub const SOURCE_SYSTEM: &str = "restopos";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AccountingServiceError {
    #[error("accounting service rejected the request: {0}")]
    BadRequest(String),
    #[error("accounting service rejected the API key")]
    InvalidApiKey,
    #[error("accounting service reports the fiscal year is closed")]
    FiscalYearClosed,
    #[error("accounting service unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    SalesInvoice,
    PurchaseInvoice,
    ExpenseInvoice,
    Payment,
    SalaryPayment,
    SalaryAccrual,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::SalesInvoice => "/api/external/sales-invoice",
            Endpoint::PurchaseInvoice => "/api/external/purchase-invoice",
            Endpoint::ExpenseInvoice => "/api/external/expense-invoice",
            Endpoint::Payment => "/api/external/payment",
            Endpoint::SalaryPayment => "/api/external/salary-payment",
            Endpoint::SalaryAccrual => "/api/external/salary-accrual",
        }
    }
}

fn cents<S: Serializer>(v: &BigDecimal, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&to_cents(v).to_string())
}

fn method<S: Serializer>(v: &str, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&normalize_method(v))
}

#[derive(Debug, Clone, Serialize)]
pub struct ExternalLine {
    pub description: String,
    pub quantity: BigDecimal,
    #[serde(serialize_with = "cents")]
    pub unit_price: BigDecimal,
    #[serde(serialize_with = "cents")]
    pub discount: BigDecimal,
    #[serde(serialize_with = "cents")]
    pub tax: BigDecimal,
    #[serde(serialize_with = "cents")]
    pub total: BigDecimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoicePayload {
    pub source_system: &'static str,
    pub idempotency_key: String,
    pub invoice_type: &'static str,
    pub invoice_number: String,
    pub date: NaiveDate,
    pub branch: String,
    pub party_name: String,
    #[serde(serialize_with = "method")]
    pub payment_method: String,
    #[serde(serialize_with = "cents")]
    pub total_before_tax: BigDecimal,
    #[serde(serialize_with = "cents")]
    pub tax_amount: BigDecimal,
    #[serde(serialize_with = "cents")]
    pub discount_amount: BigDecimal,
    #[serde(serialize_with = "cents")]
    pub total_after_tax_discount: BigDecimal,
    pub paid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expense_account_code: Option<String>,
    pub items: Vec<ExternalLine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentPayload {
    pub source_system: &'static str,
    pub idempotency_key: String,
    pub invoice_type: &'static str,
    pub invoice_number: String,
    #[serde(serialize_with = "cents")]
    pub amount: BigDecimal,
    pub date: NaiveDate,
    #[serde(serialize_with = "method")]
    pub payment_method: String,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SalaryPayload {
    pub source_system: &'static str,
    pub idempotency_key: String,
    pub employee_code: String,
    pub employee_name: String,
    pub year: i32,
    pub month: i32,
    #[serde(serialize_with = "cents")]
    pub amount: BigDecimal,
    pub date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
}

pub fn idempotency_key(kind: &str, reference: &str) -> String {
    format!("{SOURCE_SYSTEM}-{kind}-{reference}")
}

fn journal_id(body: &str) -> Option<String> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    match v.get("journal_entry_id")? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.chars().take(200).collect())
}

/// Maps a response to the journal id it carries. A 409 is a replay of a
/// request the service already accepted.
pub fn map_response(status: StatusCode, body: &str) -> Result<Option<String>, AccountingServiceError> {
    match status.as_u16() {
        200 | 201 => journal_id(body)
            .map(Some)
            .ok_or_else(|| AccountingServiceError::Unavailable("response without journal_entry_id".to_string())),
        409 => Ok(journal_id(body)),
        400 => Err(AccountingServiceError::BadRequest(message(body))),
        401 => Err(AccountingServiceError::InvalidApiKey),
        403 => Err(AccountingServiceError::FiscalYearClosed),
        other => Err(AccountingServiceError::Unavailable(format!("status {other}"))),
    }
}

#[derive(Clone)]
pub struct AccountingService {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AccountingService {
    /// `None` when the service is not configured or switched off.
    pub fn from_config(cfg: &AccountingServiceConfig) -> anyhow::Result<Option<Self>> {
        if !cfg.enabled() {
            return Ok(None);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_seconds))
            .build()?;
        Ok(Some(Self {
            client,
            base_url: cfg.url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
        }))
    }

    pub async fn send<T: Serialize>(
        &self,
        endpoint: Endpoint,
        payload: &T,
    ) -> Result<Option<String>, AccountingServiceError> {
        let url = format!("{}{}", self.base_url, endpoint.path());
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|_| AccountingServiceError::InvalidApiKey)?;

        let resp = self
            .client
            .post(&url)
            .header("X-API-KEY", key)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                log::warn!("accounting service call to {} failed: {}", url, e);
                AccountingServiceError::Unavailable(e.to_string())
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| AccountingServiceError::Unavailable(e.to_string()))?;
        let res = map_response(status, &body);
        match &res {
            Ok(id) => log::info!("accounting service {} -> journal {:?}", endpoint.path(), id),
            Err(err) => log::warn!("accounting service {} -> {}", endpoint.path(), err),
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn d(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            map_response(StatusCode::CREATED, r#"{"journal_entry_id": 42}"#),
            Ok(Some("42".to_string()))
        );
        assert_eq!(
            map_response(StatusCode::OK, r#"{"journal_entry_id": "JE-9"}"#),
            Ok(Some("JE-9".to_string()))
        );
        assert!(matches!(
            map_response(StatusCode::OK, "{}"),
            Err(AccountingServiceError::Unavailable(_))
        ));
        assert_eq!(map_response(StatusCode::CONFLICT, "{}"), Ok(None));
        assert_eq!(
            map_response(StatusCode::BAD_REQUEST, r#"{"message": "unbalanced"}"#),
            Err(AccountingServiceError::BadRequest("unbalanced".to_string()))
        );
        assert_eq!(
            map_response(StatusCode::UNAUTHORIZED, ""),
            Err(AccountingServiceError::InvalidApiKey)
        );
        assert_eq!(
            map_response(StatusCode::FORBIDDEN, ""),
            Err(AccountingServiceError::FiscalYearClosed)
        );
        assert!(matches!(
            map_response(StatusCode::TOO_MANY_REQUESTS, ""),
            Err(AccountingServiceError::Unavailable(_))
        ));
        assert!(matches!(
            map_response(StatusCode::BAD_GATEWAY, ""),
            Err(AccountingServiceError::Unavailable(_))
        ));
    }

    #[test]
    fn payment_payload_shape() {
        let p = PaymentPayload {
            source_system: SOURCE_SYSTEM,
            idempotency_key: idempotency_key("payment", "abc"),
            invoice_type: "purchase",
            invoice_number: "PUR-2024-001".to_string(),
            amount: d("10.005"),
            date: NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
            payment_method: "visa".to_string(),
            reference: None,
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["source_system"], "restopos");
        assert_eq!(v["idempotency_key"], "restopos-payment-abc");
        assert_eq!(v["amount"], "10.01");
        assert_eq!(v["payment_method"], "VISA");
        assert_eq!(v["date"], "2024-04-02");
    }

    #[test]
    fn disabled_without_key() {
        let cfg = AccountingServiceConfig {
            url: "http://ledger".to_string(),
            api_key: String::new(),
            timeout_seconds: 5,
            disabled: false,
        };
        assert!(AccountingService::from_config(&cfg).unwrap().is_none());
    }
}
