//! # Authentication & Authorization Middleware
//!
//! Bearer token middleware that turns the `Authorization` header into a
//! [`CallerIdentity`] (user id + [`Role`]).
//!
//! ## Token Format
//!
//! ```text
//! Bearer {role}:{user_id}:{secret}   — per-user token
//! Bearer {secret}                     — operator token (admin, nil user id)
//! ```
//!
//! Roles are `applicant`, `admission_officer` and `admin`. Only `admin`
//! may leave the user id empty, which maps to the nil user id.
//!
//! Requests without an `Authorization` header pass through anonymously so
//! public catalog reads work. Handlers that need a caller take
//! [`CallerIdentity`] as an extractor, which rejects anonymous requests
//! with 401. A header that is present but invalid is rejected here.

use admit_core::{Actor, Role, UserId};
use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{AppError, ErrorBody};

// ── Secrets ─────────────────────────────────────────────────────────────────

/// Bearer secret that is wiped from memory on drop and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller, injected by [`auth_middleware`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    pub role: Role,
    pub user_id: UserId,
}

impl CallerIdentity {
    pub fn new(role: Role, user_id: UserId) -> Self {
        Self { role, user_id }
    }

    /// Operator identity used for the bare-secret token.
    pub fn operator() -> Self {
        Self::new(Role::Admin, UserId::system())
    }

    /// The explicit actor passed to every service call.
    pub fn actor(&self) -> Actor {
        Actor::new(self.user_id, self.role)
    }
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .copied()
            .ok_or_else(|| AppError::Unauthorized("missing authorization header".into()))
    }
}

/// 403 unless the caller is an admin.
pub fn require_admin(caller: &CallerIdentity) -> Result<(), AppError> {
    if caller.role == Role::Admin {
        Ok(())
    } else {
        Err(AppError::forbidden(format!(
            "role 'admin' required, caller has '{}'",
            caller.role
        )))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// `None` disables secret checking (development mode).
    pub token: Option<SecretString>,
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer secrets.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Split `{role}:{user_id}:{secret}` into an identity and the secret.
fn parse_identity(token: &str) -> Result<Option<(CallerIdentity, &str)>, String> {
    let parts: Vec<&str> = token.splitn(3, ':').collect();
    match parts.as_slice() {
        [_secret] => Ok(None),
        [role, user, secret] => {
            let role: Role = role.parse().map_err(|_| format!("unknown role: {role}"))?;
            let user_id = if user.is_empty() {
                if role != Role::Admin {
                    return Err(format!("role '{role}' requires a user id"));
                }
                UserId::system()
            } else {
                user.parse::<UserId>()
                    .map_err(|e| format!("invalid user id: {e}"))?
            };
            Ok(Some((CallerIdentity::new(role, user_id), *secret)))
        }
        _ => Err("invalid token format, expected {role}:{user_id}:{secret} or {secret}".into()),
    }
}

/// Validate a bearer token against the configured secret.
pub fn parse_bearer_token(provided: &str, expected: &SecretString) -> Result<CallerIdentity, String> {
    match parse_identity(provided)? {
        None if constant_time_token_eq(provided, expected.expose()) => Ok(CallerIdentity::operator()),
        Some((identity, secret)) if constant_time_token_eq(secret, expected.expose()) => {
            Ok(identity)
        }
        _ => Err("invalid bearer token".into()),
    }
}

// ── Middleware ───────────────────────────────────────────────────────────────

/// Resolve the caller from the `Authorization` header.
///
/// With auth disabled, a `{role}:{user_id}:{anything}` token still selects
/// the identity so local clients can act as applicants; anything else
/// runs as the operator.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let config = request
        .extensions()
        .get::<AuthConfig>()
        .cloned()
        .unwrap_or_default();

    let provided = match request.headers().get(header::AUTHORIZATION) {
        None => None,
        Some(value) => match value.to_str().ok().and_then(|v| v.strip_prefix("Bearer ")) {
            Some(token) => Some(token.trim().to_string()),
            None => {
                tracing::warn!("authentication failed: non-Bearer authorization scheme");
                return unauthorized_response("authorization header must use Bearer scheme");
            }
        },
    };

    let identity = match (&config.token, provided) {
        (Some(expected), Some(token)) => match parse_bearer_token(&token, expected) {
            Ok(identity) => Some(identity),
            Err(msg) => {
                tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
                return unauthorized_response(&msg);
            }
        },
        (Some(_), None) => None,
        (None, token) => Some(
            token
                .as_deref()
                .and_then(|t| parse_identity(t).ok().flatten())
                .map(|(identity, _)| identity)
                .unwrap_or_else(CallerIdentity::operator),
        ),
    };

    if let Some(identity) = identity {
        tracing::debug!(role = %identity.role, user_id = %identity.user_id, "caller resolved");
        request.extensions_mut().insert(identity);
    }
    next.run(request).await
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: message.to_string(),
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
