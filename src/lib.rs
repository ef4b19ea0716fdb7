use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod billing;
pub mod config;
pub mod entitlement;
pub mod handlers;
pub mod models;
pub mod repository;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

// Makes core state types easily accessible to the application entry point and tests.
pub use billing::{BillingState, HttpBillingClient, MockBillingService};
pub use config::AppConfig;
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// Auto-generates the OpenAPI documentation for the application, aggregating all
/// handler paths and schemas. Served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::register, handlers::refresh_token,
        handlers::get_courses, handlers::get_course, handlers::get_lesson,
        handlers::get_me, handlers::get_my_transactions, handlers::pay_course,
        handlers::create_course, handlers::update_course, handlers::delete_course,
        handlers::create_lesson, handlers::update_lesson, handlers::delete_lesson,
    ),
    components(
        schemas(
            models::Course, models::Lesson, models::CourseType, models::BillingCourse,
            models::TransactionType, models::Transaction, models::AuthResponse,
            models::CurrentUser, models::PayReceipt, models::LoginRequest,
            models::RegisterRequest, models::RefreshRequest, models::CreateCourseRequest,
            models::UpdateCourseRequest, models::CreateLessonRequest,
            models::UpdateLessonRequest, models::BillingInfo, models::CourseRow,
            models::CourseDetail,
        )
    ),
    tags(
        (name = "course-portal", description = "Course catalog with billing-gated access")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, thread-safe container holding all shared application services:
/// the local catalog repository, the billing gateway, and the immutable
/// configuration. Shared across all incoming requests.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: local Course/Lesson persistence.
    pub repo: RepositoryState,
    /// Billing Gateway: the external system of record for identity and payments.
    pub billing: BillingState,
    /// Configuration: the loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Allow handlers and extractors to selectively pull components from the shared state.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for BillingState {
    fn from_ref(app_state: &AppState) -> BillingState {
        app_state.billing.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Enforces authentication for the protected route modules. The `AuthUser` extractor
/// rejects the request with 401 before the handler runs when the bearer token is
/// missing, malformed, or expired.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the application's routing structure, applies global and scoped
/// middleware, and registers the application state.
pub fn create_router(state: AppState) -> Router {
    // Permissive CORS; the API is bearer-token based, not cookie based.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Correlation header shared by the set/propagate layers and the span logger.
    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        // Documentation: serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: anonymous and authenticated reads, auth endpoints.
        .merge(public::public_routes())
        // Authenticated Routes: profile, history, payment.
        .merge(
            authenticated::authenticated_routes()
                .route_layer(middleware::from_fn(auth_middleware)),
        )
        // Admin Routes: catalog writes. Same authentication layer; the
        // ROLE_SUPER_ADMIN check happens inside the handlers (403 otherwise).
        .merge(admin::admin_routes().route_layer(middleware::from_fn(auth_middleware)))
        // Apply the unified state to all routes.
        .with_state(state);

    // Outermost: assign a request id, trace the request/response pair under it,
    // and echo the id back to the client.
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(request_span)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// request_span
///
/// Span factory for `TraceLayer`: every log line emitted while serving one request
/// carries its method, path and generated request id.
fn request_span(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("-");

    tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id,
    )
}
