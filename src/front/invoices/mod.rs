//! Sales, purchase and expense invoices share one set of handlers; the
//! router of each kind carries its `DocumentKind` as an extension.

pub mod api;

use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::get,
    Extension, Router,
};
use serde::Serialize;
use uuid::Uuid;

use super::{
    auth::CurrentUser,
    components::table::{self, TableComponent},
    message::AppMessage,
    AppState,
};
use crate::{
    accounting::{parties::PartyKind, reconciliation::DocumentKind},
    models,
    store::{invoices, parties, settings},
};

pub fn new_router(kind: DocumentKind) -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/:id", get(detail))
        .layer(Extension(kind))
}

/// URL segment and page title of each invoice kind.
pub fn area(kind: DocumentKind) -> (&'static str, &'static str) {
    match kind {
        DocumentKind::Sales => ("sales", "Sales invoices"),
        DocumentKind::Purchase => ("purchases", "Purchase invoices"),
        DocumentKind::Expense => ("expenses", "Expense invoices"),
        DocumentKind::Salary => ("payroll", "Salaries"),
    }
}

#[derive(Serialize, Default)]
pub struct Row {
    number: String,
    date: String,
    branch: String,
    party: String,
    total: String,
    status: String,
    journal: String,
    link: String,
}

impl Row {
    fn new(area: &str, i: models::Invoice) -> Self {
        Self {
            link: format!("/{area}/{}", i.id),
            number: i.invoice_number,
            date: i.date.to_string(),
            branch: i.branch_code,
            party: i.party_name,
            total: i.total_after_tax_discount.to_string(),
            status: i.status,
            journal: i.journal_number.or(i.external_journal_id).unwrap_or_default(),
        }
    }
}

/// Table API path carrying the non-empty filter fields.
fn table_path(area: &str, f: &invoices::Filter) -> anyhow::Result<String> {
    let params: Vec<(&str, &str)> = [("branch", &f.branch), ("status", &f.status)]
        .into_iter()
        .filter_map(|(k, v)| v.as_deref().filter(|v| !v.is_empty()).map(|v| (k, v)))
        .collect();
    if params.is_empty() {
        return Ok(format!("/api/{area}"));
    }
    Ok(format!("/api/{area}?{}", serde_urlencoded::to_string(&params)?))
}

/// Renders one page of the invoice table for the filter.
pub async fn table(s: &AppState, kind: DocumentKind, f: &invoices::Filter, q: &table::Query) -> anyhow::Result<String> {
    let (area, _) = area(kind);
    let q = q.normalize();
    let count = invoices::count(&s.p, kind, f).await?;
    let rows = invoices::list(&s.p, kind, f, q.offset(), q.limit())
        .await?
        .into_iter()
        .map(|i| Row::new(area, i))
        .collect();

    let path = table_path(area, f)?;

    #[derive(Serialize)]
    struct Ctx {
        data: TableComponent<Row>,
    }
    let data = TableComponent::new(rows, count, path, q)?;
    s.t.render_string("component.table.hbs", &Ctx { data })
}

async fn list(
    State(s): State<AppState>,
    Extension(kind): Extension<DocumentKind>,
    CurrentUser(user): CurrentUser,
    Query(f): Query<invoices::Filter>,
) -> Result<Response, AppMessage> {
    let (area, title) = area(kind);
    let table = table(&s, kind, &f, &table::Query::default())
        .await
        .map_err(s.fail(&user))?;
    let branches = settings::branches(&s.p).await.map_err(s.fail(&user))?;
    let parties = match PartyKind::for_document(kind) {
        Ok(party) => parties::options(&s.p, party).await.map_err(s.fail(&user))?,
        Err(_) => Vec::new(),
    };

    #[derive(Serialize)]
    struct Ctx<'a> {
        kind: DocumentKind,
        area: &'a str,
        title: &'a str,
        table: String,
        branches: Vec<models::Branch>,
        parties: Vec<parties::PartyOption>,
        filter: invoices::Filter,
        is_expense: bool,
    }

    s.page(
        "invoices.get.hbs",
        title,
        &user,
        &Ctx {
            kind,
            area,
            title,
            table,
            branches,
            parties,
            filter: f,
            is_expense: kind == DocumentKind::Expense,
        },
    )
}

async fn detail(
    State(s): State<AppState>,
    Extension(kind): Extension<DocumentKind>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Response, AppMessage> {
    let (area, title) = area(kind);
    let detail = invoices::get(&s.p, kind, id).await.map_err(s.fail(&user))?;

    #[derive(Serialize)]
    struct Ctx<'a> {
        area: &'a str,
        kind: DocumentKind,
        #[serde(flatten)]
        detail: invoices::Detail,
    }

    s.page(
        "invoice.get.hbs",
        title,
        &user,
        &Ctx {
            area,
            kind,
            detail,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_path_encodes_filters() {
        let f = invoices::Filter {
            branch: Some("place india&x=1".to_string()),
            status: Some("paid".to_string()),
        };
        assert_eq!(table_path("sales", &f).unwrap(), "/api/sales?branch=place+india%26x%3D1&status=paid");

        let f = invoices::Filter {
            branch: Some(String::new()),
            status: None,
        };
        assert_eq!(table_path("purchases", &f).unwrap(), "/api/purchases");
    }
}
