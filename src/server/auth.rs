//! Login gate
//!
//! A single shared operator password exchanged for an HTTP-only session
//! cookie. Page navigations without the cookie are redirected to the login
//! page; API routes and static assets pass through so the login endpoint
//! itself stays reachable.

use std::sync::Arc;

use axum::{
    Json,
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use super::router::AppState;
use crate::config::AuthConfig;

/// Login request body.
#[derive(Debug, Deserialize)]
struct LoginRequest {
    password: Option<String>,
}

/// POST /api/auth/login
pub async fn login_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let password = serde_json::from_slice::<LoginRequest>(&body)
        .ok()
        .and_then(|r| r.password)
        .filter(|p| !p.is_empty());

    let Some(password) = password else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Password required"})),
        )
            .into_response();
    };

    let Some(expected) = state.config.auth.app_password.as_deref() else {
        warn!("APP_PASSWORD is not configured; rejecting login");
        return unauthorized();
    };

    if bool::from(password.as_bytes().ct_eq(expected.as_bytes())) {
        debug!("Operator login succeeded");
        let mut response = (
            StatusCode::OK,
            Json(json!({"success": true, "message": "Authenticated"})),
        )
            .into_response();
        response
            .headers_mut()
            .append(header::SET_COOKIE, session_cookie(&state.config.auth));
        response
    } else {
        warn!("Operator login failed");
        unauthorized()
    }
}

/// POST /api/auth/logout
pub async fn logout_handler(State(state): State<Arc<AppState>>) -> Response {
    let mut response = (StatusCode::OK, Json(json!({"success": true}))).into_response();
    response
        .headers_mut()
        .append(header::SET_COOKIE, clear_cookie(&state.config.auth));
    response
}

/// Middleware gating page navigations behind the session cookie.
pub async fn session_gate(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path();

    if is_public_path(path) {
        return next.run(request).await;
    }

    if has_session(request.headers(), &state.config.auth.cookie_name) {
        return next.run(request).await;
    }

    debug!(path = %path, "Unauthenticated page request, redirecting to login");
    Redirect::temporary("/login").into_response()
}

/// Paths that bypass the gate: the login page, API routes, liveness, and
/// static assets.
fn is_public_path(path: &str) -> bool {
    path == "/login"
        || path == "/health"
        || path == "/favicon.ico"
        || path.starts_with("/api/")
        || path.starts_with("/assets/")
}

fn has_session(headers: &HeaderMap, cookie_name: &str) -> bool {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.split_once('='))
        .any(|(name, value)| name.trim() == cookie_name && value.trim() == "true")
}

fn session_cookie(auth: &AuthConfig) -> HeaderValue {
    let mut cookie = format!(
        "{}=true; HttpOnly; SameSite=Lax; Max-Age={}; Path=/",
        auth.cookie_name, auth.session_ttl_secs
    );
    if auth.secure_cookies {
        cookie.push_str("; Secure");
    }
    cookie.parse().unwrap()
}

fn clear_cookie(auth: &AuthConfig) -> HeaderValue {
    format!(
        "{}=; HttpOnly; SameSite=Lax; Max-Age=0; Path=/",
        auth.cookie_name
    )
    .parse()
    .unwrap()
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": "Invalid password"})),
    )
        .into_response()
}

/// GET /login: minimal login form posting to the auth endpoint.
pub async fn login_page() -> impl IntoResponse {
    Html(LOGIN_PAGE)
}

const LOGIN_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>n8n-bridge login</title></head>
<body>
<form id="login">
  <label>Password <input type="password" name="password" autofocus></label>
  <button type="submit">Sign in</button>
  <p id="status"></p>
</form>
<script>
document.getElementById("login").addEventListener("submit", async (e) => {
  e.preventDefault();
  const password = new FormData(e.target).get("password");
  const res = await fetch("/api/auth/login", {
    method: "POST",
    headers: {"content-type": "application/json"},
    body: JSON.stringify({password}),
  });
  if (res.ok) { location.href = "/"; }
  else { document.getElementById("status").textContent = "Invalid password"; }
});
</script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn public_paths_bypass_the_gate() {
        assert!(is_public_path("/login"));
        assert!(is_public_path("/health"));
        assert!(is_public_path("/api/execute-workflow"));
        assert!(is_public_path("/api/auth/login"));
        assert!(is_public_path("/assets/app.css"));
        assert!(!is_public_path("/"));
        assert!(!is_public_path("/history"));
    }

    #[test]
    fn session_cookie_is_parsed_out_of_the_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            "theme=dark; isAuthenticated=true".parse().unwrap(),
        );
        assert!(has_session(&headers, "isAuthenticated"));
        assert!(!has_session(&headers, "other"));

        let mut wrong = HeaderMap::new();
        wrong.insert(header::COOKIE, "isAuthenticated=false".parse().unwrap());
        assert!(!has_session(&wrong, "isAuthenticated"));

        assert!(!has_session(&HeaderMap::new(), "isAuthenticated"));
    }

    #[test]
    fn session_cookie_attributes() {
        let auth = AuthConfig::default();
        let cookie = session_cookie(&auth);
        let cookie = cookie.to_str().unwrap();
        assert_eq!(
            cookie,
            "isAuthenticated=true; HttpOnly; SameSite=Lax; Max-Age=86400; Path=/"
        );

        let secure = AuthConfig {
            secure_cookies: true,
            ..AuthConfig::default()
        };
        assert!(session_cookie(&secure).to_str().unwrap().ends_with("; Secure"));
    }

    #[test]
    fn clear_cookie_expires_immediately() {
        let cookie = clear_cookie(&AuthConfig::default());
        assert!(cookie.to_str().unwrap().contains("Max-Age=0"));
    }
}
