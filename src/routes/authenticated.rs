use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Routes for any user with a valid billing-issued bearer token. Every handler here
/// relies on the `AuthUser` extractor middleware layered above this module, which
/// guarantees a resolved identity carrying the token for onward billing calls.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        // The caller's billing profile (username, roles, balance).
        .route("/me", get(handlers::get_me))
        // GET /me/transactions
        // Full billing history of the caller, sorted by creation time.
        .route("/me/transactions", get(handlers::get_my_transactions))
        // POST /courses/{id}/pay
        // Pays for a course; a rejected payment surfaces as 402 with the billing
        // service's message.
        .route("/courses/{id}/pay", post(handlers::pay_course))
}
