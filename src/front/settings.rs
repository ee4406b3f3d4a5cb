//! Company settings and user administration.

use std::collections::HashMap;

use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use serde::{Deserialize, Serialize};

use super::{
    auth::{AdminUser, CurrentUser},
    message::AppMessage,
    AppState,
};
use crate::{
    accounting::money::parse_non_negative,
    models,
    store::{invalid, settings, users},
};

const BRANCH_FIELD: &str = "branch_";

pub fn new_router() -> Router<AppState> {
    Router::new().route("/", get(get_settings).post(post_settings))
}

pub fn new_users_router() -> Router<AppState> {
    Router::new().route("/", get(get_users).post(post_user))
}

async fn get_settings(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> Result<Response, AppMessage> {
    let mut conn = s.p.acquire().await.map_err(|err| s.fail(&user)(err.into()))?;
    let current = settings::get(&mut conn).await.map_err(s.fail(&user))?;
    let branches = settings::branches(&s.p).await.map_err(s.fail(&user))?;

    #[derive(Serialize)]
    struct Ctx {
        settings: models::Settings,
        branches: Vec<models::Branch>,
        can_edit: bool,
    }
    let can_edit = user.is_admin();
    s.page(
        "settings.get.hbs",
        "Settings",
        &user,
        &Ctx {
            settings: current,
            branches,
            can_edit,
        },
    )
}

fn field(f: &HashMap<String, String>, name: &str) -> String {
    f.get(name).map(|v| v.trim().to_string()).unwrap_or_default()
}

/// Reads the settings form; branch labels come as `branch_<code>` fields.
fn parse_settings_form(f: &HashMap<String, String>) -> anyhow::Result<(models::Settings, Vec<(String, String)>)> {
    let company_name = field(f, "company_name");
    if company_name.is_empty() {
        return Err(invalid("company name must not be empty"));
    }
    let vat_rate = field(f, "vat_rate");
    if vat_rate.is_empty() {
        return Err(invalid("VAT rate is required"));
    }
    let vat_rate = parse_non_negative(&vat_rate)?;
    let currency = field(f, "currency").to_uppercase();

    let mut branches: Vec<(String, String)> = f
        .iter()
        .filter_map(|(k, v)| k.strip_prefix(BRANCH_FIELD).map(|code| (code.to_string(), v.trim().to_string())))
        .collect();
    branches.sort();

    Ok((
        models::Settings {
            company_name,
            tax_number: field(f, "tax_number"),
            address: field(f, "address"),
            phone: field(f, "phone"),
            email: field(f, "email"),
            vat_rate,
            currency: if currency.is_empty() { "SAR".to_string() } else { currency },
        },
        branches,
    ))
}

async fn post_settings(
    State(s): State<AppState>,
    AdminUser(user): AdminUser,
    Form(f): Form<HashMap<String, String>>,
) -> Result<Response, AppMessage> {
    let (new, branches) = parse_settings_form(&f).map_err(s.fail(&user))?;
    settings::update(&s.p, &new, &branches).await.map_err(s.fail(&user))?;
    Ok(Redirect::to("/settings").into_response())
}

async fn get_users(State(s): State<AppState>, AdminUser(user): AdminUser) -> Result<Response, AppMessage> {
    let list = users::list(&s.p).await.map_err(s.fail(&user))?;

    #[derive(Serialize)]
    struct Ctx {
        users: Vec<models::User>,
        roles: [&'static str; 2],
    }
    s.page(
        "users.get.hbs",
        "Users",
        &user,
        &Ctx {
            users: list,
            roles: users::ROLES,
        },
    )
}

#[derive(Deserialize)]
struct NewUser {
    username: String,
    password: String,
    role: String,
}

async fn post_user(
    State(s): State<AppState>,
    AdminUser(user): AdminUser,
    Form(f): Form<NewUser>,
) -> Result<Response, AppMessage> {
    users::create(&s.p, &f.username, &f.password, &f.role)
        .await
        .map_err(s.fail(&user))?;
    Ok(Redirect::to("/users").into_response())
}

#[cfg(test)]
mod tests {
    use bigdecimal::BigDecimal;

    use super::*;

    fn form(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn reads_settings_and_branch_labels() {
        let (s, branches) = parse_settings_form(&form(&[
            ("company_name", " Resto Co "),
            ("vat_rate", "١٥"),
            ("currency", "sar"),
            ("branch_place_india", "Place India"),
            ("branch_china_town", " China Town "),
        ]))
        .unwrap();
        assert_eq!(s.company_name, "Resto Co");
        assert_eq!(s.vat_rate, BigDecimal::from(15));
        assert_eq!(s.currency, "SAR");
        assert_eq!(
            branches,
            vec![
                ("china_town".to_string(), "China Town".to_string()),
                ("place_india".to_string(), "Place India".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_missing_fields() {
        assert!(parse_settings_form(&form(&[("vat_rate", "15")])).is_err());
        assert!(parse_settings_form(&form(&[("company_name", "X")])).is_err());
        assert!(parse_settings_form(&form(&[("company_name", "X"), ("vat_rate", "abc")])).is_err());
        assert!(parse_settings_form(&form(&[("company_name", "X"), ("vat_rate", "-5")])).is_err());
    }
}
