//! Basic-Auth middleware for protected routes

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use serde_json::json;

use crate::server::AppState;

/// Prefix of every principal produced by this backend
pub const USERID_PREFIX: &str = "ldap";

/// Identity attached to requests that passed [`basic_auth`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub username: String,
}

impl AuthenticatedUser {
    /// Principal identifier, e.g. `ldap:alice@example.com`
    pub fn userid(&self) -> String {
        format!("{}:{}", USERID_PREFIX, self.username)
    }
}

/// Basic authentication middleware
///
/// On success the request carries an [`AuthenticatedUser`] extension.
/// Every failure, whatever its cause, is the same 401 challenge.
pub async fn basic_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    match state.authenticator.authenticate(header.as_deref()).await {
        Some(username) => {
            request
                .extensions_mut()
                .insert(AuthenticatedUser { username });
            next.run(request).await
        }
        None => unauthorized(&state.config.auth.realm),
    }
}

/// 401 carrying the `WWW-Authenticate` challenge for `realm`
pub fn unauthorized(realm: &str) -> Response {
    let challenge = HeaderValue::from_str(&format!("Basic realm=\"{}\"", realm))
        .unwrap_or_else(|_| HeaderValue::from_static("Basic"));

    let body = Json(json!({
        "code": 401,
        "error": "Unauthorized",
        "message": "Please authenticate yourself to use this endpoint.",
    }));

    (StatusCode::UNAUTHORIZED, [(WWW_AUTHENTICATE, challenge)], body).into_response()
}
