pub mod limiter;

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts, OriginalUri, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{message::AppMessage, AppState};
use crate::{models, store::users};

pub const SESSION_COOKIE: &str = "restopos_session";

pub fn new_router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login_page).post(login))
        .route("/logout", post(logout))
}

fn session_token(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

fn session_cookie(value: &str, max_age: i64) -> Result<HeaderValue, header::InvalidHeaderValue> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}"
    ))
}

fn is_api(parts: &Parts) -> bool {
    let path = parts
        .extensions
        .get::<OriginalUri>()
        .map(|u| u.0.path().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());
    path.starts_with("/api/")
}

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "status": "error", "message": message }))).into_response()
}

/// The user behind the session cookie. Pages without one redirect to the
/// login form; API calls get 401.
pub struct CurrentUser(pub models::User);

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, s: &AppState) -> Result<Self, Self::Rejection> {
        let user = match session_token(&parts.headers) {
            Some(token) => users::session_user(&s.p, token).await.map_err(|err| {
                log::error!("session lookup failed: {:#}", err);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            })?,
            None => None,
        };
        match user {
            Some(u) => Ok(CurrentUser(u)),
            None if is_api(parts) => Err(json_error(StatusCode::UNAUTHORIZED, "login required")),
            None => Err(Redirect::to("/login").into_response()),
        }
    }
}

pub struct AdminUser(pub models::User);

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, s: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, s).await?;
        if user.is_admin() {
            return Ok(AdminUser(user));
        }
        log::warn!("user '{}' denied access to {}", user.username, parts.uri.path());
        if is_api(parts) {
            Err(json_error(StatusCode::FORBIDDEN, "administrator role required"))
        } else {
            Err((StatusCode::FORBIDDEN, "administrator role required").into_response())
        }
    }
}

#[derive(Serialize, Default)]
struct LoginCtx {
    username: String,
    error: Option<String>,
}

fn render_login(s: &AppState, status: StatusCode, ctx: &LoginCtx) -> Result<Response, AppMessage> {
    let page = s
        .t
        .page("login.get.hbs", "Login", None, ctx)
        .map_err(|err| AppMessage::new_error(err, s))?;
    Ok((status, page).into_response())
}

async fn login_page(State(s): State<AppState>) -> Result<Response, AppMessage> {
    render_login(&s, StatusCode::OK, &LoginCtx::default())
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login(
    State(s): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Form(f): Form<LoginForm>,
) -> Result<Response, AppMessage> {
    let ip = addr.ip();
    let now = Utc::now();

    if let Some(until) = s.limiter.locked_until(ip, now).await {
        log::warn!("login from {} refused, locked until {}", ip, until);
        let ctx = LoginCtx {
            username: f.username,
            error: Some(format!(
                "Too many failed attempts, try again after {}",
                until.format("%H:%M UTC")
            )),
        };
        return render_login(&s, StatusCode::TOO_MANY_REQUESTS, &ctx);
    }

    let user = users::authenticate(&s.p, &f.username, &f.password)
        .await
        .map_err(|err| AppMessage::new_error(err, &s))?;
    let Some(user) = user else {
        let failures = s.limiter.failure(ip, now).await;
        log::warn!("failed login for '{}' from {} ({} in a row)", f.username.trim(), ip, failures);
        let ctx = LoginCtx {
            username: f.username,
            error: Some("Invalid username or password".to_string()),
        };
        return render_login(&s, StatusCode::UNAUTHORIZED, &ctx);
    };

    s.limiter.success(ip).await;
    let hours = s.config.auth.session_hours;
    let token = users::create_session(&s.p, user.id, hours)
        .await
        .map_err(|err| AppMessage::new_error(err, &s))?;
    let cookie = session_cookie(&token.to_string(), hours * 3600)
        .map_err(|err| AppMessage::new_error(err.into(), &s))?;

    log::info!("user '{}' logged in from {}", user.username, ip);
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/dashboard")).into_response())
}

async fn logout(State(s): State<AppState>, headers: HeaderMap) -> Result<Response, AppMessage> {
    if let Some(token) = session_token(&headers) {
        users::delete_session(&s.p, token)
            .await
            .map_err(|err| AppMessage::new_error(err, &s))?;
    }
    let cookie = session_cookie("", 0).map_err(|err| AppMessage::new_error(err.into(), &s))?;
    Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/login")).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_session_cookie() {
        let token = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {SESSION_COOKIE}={token}")).unwrap(),
        );
        assert_eq!(session_token(&headers), Some(token));

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("restopos_session=garbage"));
        assert_eq!(session_token(&headers), None);
        assert_eq!(session_token(&HeaderMap::new()), None);
    }

    #[test]
    fn cookie_attributes() {
        let c = session_cookie("abc", 3600).unwrap();
        let c = c.to_str().unwrap();
        assert!(c.starts_with("restopos_session=abc;"));
        assert!(c.contains("HttpOnly") && c.contains("SameSite=Lax") && c.contains("Max-Age=3600"));
    }
}
