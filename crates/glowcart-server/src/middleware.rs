use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use glowcart_core::BasicCredentials;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::WebhookError;

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Basic auth settings for the webhook route.
///
/// With credentials configured the decoded `user:password` must match them.
/// Without, any well-formed Basic header passes the gate; signature
/// verification is what authenticates the event.
#[derive(Debug, Clone, Default)]
pub struct BasicAuthState {
    credentials: Option<BasicCredentials>,
}

impl BasicAuthState {
    #[must_use]
    pub fn new(credentials: Option<BasicCredentials>) -> Self {
        if credentials.is_none() {
            tracing::warn!(
                "webhook Basic credentials not configured; only the presence of a Basic header is checked"
            );
        }
        Self { credentials }
    }

    fn allows(&self, user: &str, password: &str) -> bool {
        match &self.credentials {
            None => true,
            Some(expected) => {
                let user_ok = user.as_bytes().ct_eq(expected.username.as_bytes());
                let password_ok = password.as_bytes().ct_eq(expected.password.as_bytes());
                (user_ok & password_ok).into()
            }
        }
    }
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Middleware rejecting requests without acceptable Basic credentials.
///
/// Runs before the handler touches the body.
pub async fn require_basic_auth(
    State(auth): State<BasicAuthState>,
    req: Request,
    next: Next,
) -> Response {
    match extract_basic_credentials(req.headers().get(AUTHORIZATION)) {
        Some((user, password)) if auth.allows(&user, &password) => next.run(req).await,
        _ => WebhookError::Unauthorized.into_response(),
    }
}

/// The auth scheme name is matched case-insensitively.
fn extract_basic_credentials(value: Option<&HeaderValue>) -> Option<(String, String)> {
    let (scheme, encoded) = value.and_then(|v| v.to_str().ok())?.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let encoded = Some(encoded.trim()).filter(|s| !s.is_empty())?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_owned(), password.to_owned()))
}
