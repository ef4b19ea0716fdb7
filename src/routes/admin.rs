use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{post, put},
};

/// Admin Router Module
///
/// Catalog write endpoints. The routes sit behind the same authentication layer as
/// the authenticated module; the ROLE_SUPER_ADMIN check is performed inside each
/// handler and yields 403 for ordinary users. Write protection is a role capability,
/// deliberately distinct from the read-side entitlement outcomes (303/406).
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // POST /courses
        // Creates a course: billing sync first, then the local record (409 on a
        // duplicate code).
        .route("/courses", post(handlers::create_course))
        // PUT/DELETE /courses/{id}
        // Edits sync billing under the previous code; deletion cascades to lessons.
        .route(
            "/courses/{id}",
            put(handlers::update_course).delete(handlers::delete_course),
        )
        // POST /courses/{id}/lessons
        // Adds a lesson (number bounded to 1..=10000).
        .route("/courses/{id}/lessons", post(handlers::create_lesson))
        // PUT/DELETE /lessons/{id}
        .route(
            "/lessons/{id}",
            put(handlers::update_lesson).delete(handlers::delete_lesson),
        )
}
