use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Defines endpoints accessible to any client, anonymous or logged-in. The catalog
/// read routes take an *optional* identity: an anonymous requester sees the free
/// subset, an authenticated one sees entitlement-aware views. Gate-keeping happens in
/// the entitlement resolver, not here.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Unauthenticated liveness probe for monitoring and load balancer checks.
        .route("/health", get(|| async { "ok" }))
        // POST /auth/login
        // Credential exchange against the billing service. 401 on bad credentials,
        // 503 when the billing host is unreachable.
        .route("/auth/login", post(handlers::login))
        // POST /auth/register
        // Account creation at the billing service; returns a token payload directly.
        .route("/auth/register", post(handlers::register))
        // POST /auth/refresh
        // Refresh-token exchange.
        .route("/auth/refresh", post(handlers::refresh_token))
        // GET /courses
        // The merged catalog listing (local courses joined with billing metadata).
        .route("/courses", get(handlers::get_courses))
        // GET /courses/{id}
        // Entitlement-gated course detail: 200 / 303-to-login / 406 / 404.
        .route("/courses/{id}", get(handlers::get_course))
        // GET /lessons/{id}
        // Gated by the parent course's entitlement outcome.
        .route("/lessons/{id}", get(handlers::get_lesson))
}
