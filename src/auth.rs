use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{StatusCode, header, request::Parts},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;

/// ROLE_SUPER_ADMIN grants the administrative entitlement override and write access
/// to the catalog. Role names mirror the billing service's vocabulary.
pub const ROLE_SUPER_ADMIN: &str = "ROLE_SUPER_ADMIN";
pub const ROLE_USER: &str = "ROLE_USER";

/// Claims
///
/// The payload carried inside a billing-issued bearer token. This application never
/// holds the signing secret — identity is entirely delegated to the billing service,
/// which re-verifies the token on every authenticated billing call. Locally the
/// payload is only parsed for the username, roles and expiry.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    pub roles: Vec<String>,
    /// Expiration time as a Unix timestamp. Expired tokens are rejected locally
    /// without a billing round trip.
    pub exp: i64,
}

/// AuthUser
///
/// The resolved identity of an authenticated request. Carries the role set for
/// authorization checks and the opaque `api_token` that is attached as a bearer
/// header to every onward billing call made on the user's behalf.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub username: String,
    pub roles: Vec<String>,
    pub api_token: String,
}

impl AuthUser {
    /// Whether the administrative override applies (entitlement bypass, catalog writes).
    pub fn is_super_admin(&self) -> bool {
        self.roles.iter().any(|r| r == ROLE_SUPER_ADMIN)
    }
}

/// decode_claims
///
/// Parses the payload segment of a JWT-shaped token without signature verification
/// (the billing service is the verifier of record). Returns `None` for anything that
/// is not a well-formed, unexpired token.
pub fn decode_claims(token: &str) -> Option<Claims> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;

    if claims.exp <= Utc::now().timestamp() {
        return None;
    }

    Some(claims)
}

/// encode_token
///
/// Produces a JWT-shaped token around the given claims. The signature segment is a
/// placeholder — used by the mock billing service and tests only; the real billing
/// service issues properly signed tokens that this application never validates itself.
pub fn encode_token(claims: &Claims) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap_or_default());
    format!("{header}.{payload}.signature")
}

fn user_from_parts(parts: &Parts) -> Option<AuthUser> {
    let auth_header = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?;

    let token = auth_header.strip_prefix("Bearer ")?;
    let claims = decode_claims(token)?;

    Some(AuthUser {
        username: claims.username,
        roles: claims.roles,
        api_token: token.to_string(),
    })
}

/// AuthUser Extractor Implementation
///
/// Makes AuthUser usable as a function argument in any authenticated handler and as
/// the gate of the authenticated route layer. Rejects with 401 when the bearer token
/// is missing, malformed, or expired.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_from_parts(parts).ok_or(StatusCode::UNAUTHORIZED)
    }
}

/// Optional Extractor Implementation
///
/// Public read endpoints (catalog listing, course/lesson show) serve anonymous and
/// authenticated users alike. A missing or unusable token simply means an anonymous
/// requester — never a rejection.
impl<S> OptionalFromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(user_from_parts(parts))
    }
}
