use crate::{
    AppState,
    auth::AuthUser,
    billing::BillingError,
    entitlement::{AccessDecision, resolve_course_access},
    models::{
        AuthResponse, BillingCourseUpsert, Course, CourseDetail, CourseRow, CourseType,
        CreateCourseRequest, CreateLessonRequest, CurrentUser, Lesson, LoginRequest, PayReceipt,
        RefreshRequest, RegisterRequest, Transaction, TransactionFilter, UpdateCourseRequest,
        UpdateLessonRequest,
    },
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;
use uuid::Uuid;

/// Where anonymous requesters of paid content are sent. A re-entry path, not an error.
pub const LOGIN_ROUTE: &str = "/auth/login";

// --- Response Helpers ---

/// The terminal entitlement denial: the course exists but this requester may not view
/// it. 406 keeps it distinct from 404 (no such route/entity) and 403 (missing role).
fn not_available() -> Response {
    (
        StatusCode::NOT_ACCEPTABLE,
        Json(json!({ "message": "This course is not available to you." })),
    )
        .into_response()
}

fn lesson_number_valid(number: i32) -> bool {
    (1..=10000).contains(&number)
}

fn invalid_lesson_number() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "message": "Lesson number must be between 1 and 10000." })),
    )
        .into_response()
}

// --- Authentication Handlers ---

/// login
///
/// [Public Route] Exchanges credentials for a billing-issued token payload. The
/// password is forwarded to the billing service and never stored or logged locally.
/// Bad credentials yield 401 without revealing which field was wrong; an unreachable
/// billing host yields 503.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 503, description = "Billing unavailable")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, BillingError> {
    let response = state
        .billing
        .auth(&payload.username, &payload.password)
        .await?;
    Ok(Json(response))
}

/// register
///
/// [Public Route] Creates an account at the billing service and returns the token
/// payload directly, so the client is logged in immediately after registration.
/// Structured validation errors (e.g. a duplicate username) surface as 422.
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Registered", body = AuthResponse),
        (status = 422, description = "Validation errors")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, BillingError> {
    let response = state
        .billing
        .register(&payload.username, &payload.password)
        .await?;
    Ok(Json(response))
}

/// refresh_token
///
/// [Public Route] Exchanges a refresh token for a fresh token payload.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses((status = 200, description = "Refreshed", body = AuthResponse))
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, BillingError> {
    let response = state.billing.refresh_token(&payload.refresh_token).await?;
    Ok(Json(response))
}

// --- Catalog Read Handlers ---

/// get_courses
///
/// [Public Route] The merged catalog listing. Anonymous requesters see only courses
/// that are free (or unknown to billing); authenticated requesters see every local
/// course with its billing metadata and their matching active payment. The merge
/// performs exactly one batched transactions fetch regardless of course count.
#[utoipa::path(
    get,
    path = "/courses",
    responses((status = 200, description = "Catalog listing", body = [CourseRow]))
)]
pub async fn get_courses(
    user: Option<AuthUser>,
    State(state): State<AppState>,
) -> Result<Json<Vec<CourseRow>>, BillingError> {
    let local_courses = state.repo.all_courses().await;
    let rows =
        crate::entitlement::build_catalog(&*state.billing, local_courses, user.as_ref()).await?;
    Ok(Json(rows))
}

/// get_course
///
/// [Public Route] Course detail, gated by the entitlement resolver: free or unknown
/// codes are open to everyone; paid courses require an active payment or the
/// administrative override. Anonymous requesters of paid courses are redirected to
/// the login route (303) rather than denied.
#[utoipa::path(
    get,
    path = "/courses/{id}",
    params(("id" = Uuid, Path, description = "Course ID")),
    responses(
        (status = 200, description = "Course with lessons", body = CourseDetail),
        (status = 303, description = "Anonymous on a paid course"),
        (status = 404, description = "Not found"),
        (status = 406, description = "Not available to this user")
    )
)]
pub async fn get_course(
    user: Option<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, BillingError> {
    let Some(course) = state.repo.course(id).await else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    match resolve_course_access(&*state.billing, &course.code, user.as_ref()).await? {
        AccessDecision::Granted => {
            let lessons = state.repo.lessons_for_course(course.id).await;
            Ok(Json(CourseDetail { course, lessons }).into_response())
        }
        AccessDecision::LoginRequired => Ok(Redirect::to(LOGIN_ROUTE).into_response()),
        AccessDecision::NotAvailable => Ok(not_available()),
    }
}

/// get_lesson
///
/// [Public Route] A lesson inherits exactly its parent course's entitlement outcome;
/// there is no per-lesson entitlement.
#[utoipa::path(
    get,
    path = "/lessons/{id}",
    params(("id" = Uuid, Path, description = "Lesson ID")),
    responses(
        (status = 200, description = "Lesson", body = Lesson),
        (status = 303, description = "Anonymous on a paid course"),
        (status = 404, description = "Not found"),
        (status = 406, description = "Not available to this user")
    )
)]
pub async fn get_lesson(
    user: Option<AuthUser>,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, BillingError> {
    let Some(lesson) = state.repo.lesson(id).await else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };
    let Some(course) = state.repo.course(lesson.course_id).await else {
        // A lesson without its course should not exist; treat as gone.
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    match resolve_course_access(&*state.billing, &course.code, user.as_ref()).await? {
        AccessDecision::Granted => Ok(Json(lesson).into_response()),
        AccessDecision::LoginRequired => Ok(Redirect::to(LOGIN_ROUTE).into_response()),
        AccessDecision::NotAvailable => Ok(not_available()),
    }
}

// --- Profile Handlers ---

/// get_me
///
/// [Authenticated Route] Proxies the billing profile (username, roles, balance) for
/// the token's owner.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Profile", body = CurrentUser))
)]
pub async fn get_me(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<CurrentUser>, BillingError> {
    let profile = state.billing.current_user(&user.api_token).await?;
    Ok(Json(profile))
}

/// get_my_transactions
///
/// [Authenticated Route] The caller's full billing history, sorted by creation time.
#[utoipa::path(
    get,
    path = "/me/transactions",
    responses((status = 200, description = "Transaction history", body = [Transaction]))
)]
pub async fn get_my_transactions(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<Transaction>>, BillingError> {
    let mut transactions = state
        .billing
        .transactions(&TransactionFilter::default(), &user.api_token)
        .await?;
    transactions.sort_by_key(|tx| tx.created_at);
    Ok(Json(transactions))
}

/// pay_course
///
/// [Authenticated Route] Pays for a course on the caller's behalf. A rejected payment
/// (e.g. insufficient balance) surfaces as 402 with the billing service's message.
#[utoipa::path(
    post,
    path = "/courses/{id}/pay",
    params(("id" = Uuid, Path, description = "Course ID")),
    responses(
        (status = 200, description = "Receipt", body = PayReceipt),
        (status = 402, description = "Payment rejected"),
        (status = 404, description = "Not found")
    )
)]
pub async fn pay_course(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, BillingError> {
    let Some(course) = state.repo.course(id).await else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    let receipt = state.billing.pay(&course.code, &user.api_token).await?;
    Ok(Json(receipt).into_response())
}

// --- Admin Catalog Handlers ---

/// create_course
///
/// [Admin Route] Registers the course with the billing service first (type, price),
/// then writes the local record. A duplicate local code is rejected up front so the
/// two catalogs cannot drift apart.
#[utoipa::path(
    post,
    path = "/courses",
    request_body = CreateCourseRequest,
    responses(
        (status = 201, description = "Created", body = Course),
        (status = 403, description = "Not an administrator"),
        (status = 409, description = "Duplicate code"),
        (status = 422, description = "Billing validation errors")
    )
)]
pub async fn create_course(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateCourseRequest>,
) -> Result<Response, BillingError> {
    if !user.is_super_admin() {
        return Ok(StatusCode::FORBIDDEN.into_response());
    }
    if state.repo.course_by_code(&payload.code).await.is_some() {
        return Ok((
            StatusCode::CONFLICT,
            Json(json!({ "message": "A course with this code already exists." })),
        )
            .into_response());
    }

    state
        .billing
        .create_course(
            &BillingCourseUpsert {
                code: payload.code.clone(),
                title: payload.name.clone(),
                course_type: payload.course_type,
                price: payload.price,
            },
            &user.api_token,
        )
        .await?;

    match state.repo.create_course(payload).await {
        Some(course) => Ok((StatusCode::CREATED, Json(course)).into_response()),
        // Lost the race against a concurrent insert of the same code.
        None => Ok(StatusCode::CONFLICT.into_response()),
    }
}

/// update_course
///
/// [Admin Route] Synchronizes billing under the course's previous code, then applies
/// the partial update locally. Commercial fields missing from the payload keep their
/// current billing values.
#[utoipa::path(
    put,
    path = "/courses/{id}",
    params(("id" = Uuid, Path, description = "Course ID")),
    request_body = UpdateCourseRequest,
    responses(
        (status = 200, description = "Updated", body = Course),
        (status = 403, description = "Not an administrator"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Duplicate code"),
        (status = 422, description = "Billing validation errors")
    )
)]
pub async fn update_course(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCourseRequest>,
) -> Result<Response, BillingError> {
    if !user.is_super_admin() {
        return Ok(StatusCode::FORBIDDEN.into_response());
    }
    let Some(existing) = state.repo.course(id).await else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    // Renaming onto a code another course already holds would violate uniqueness.
    if let Some(new_code) = payload.code.as_deref() {
        if new_code != existing.code && state.repo.course_by_code(new_code).await.is_some() {
            return Ok((
                StatusCode::CONFLICT,
                Json(json!({ "message": "A course with this code already exists." })),
            )
                .into_response());
        }
    }

    // Current commercial metadata fills in whatever the partial payload leaves out.
    let billing_course = state.billing.course_by_code(&existing.code).await?;
    let upsert = BillingCourseUpsert {
        code: payload.code.clone().unwrap_or_else(|| existing.code.clone()),
        title: payload.name.clone().unwrap_or_else(|| existing.name.clone()),
        course_type: payload.course_type.unwrap_or_else(|| {
            billing_course
                .as_ref()
                .map(|bc| bc.course_type)
                .unwrap_or(CourseType::Free)
        }),
        price: payload
            .price
            .unwrap_or_else(|| billing_course.as_ref().map(|bc| bc.price).unwrap_or(0.0)),
    };
    state
        .billing
        .update_course(&existing.code, &upsert, &user.api_token)
        .await?;

    match state.repo.update_course(id, payload).await {
        Some(course) => Ok(Json(course).into_response()),
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

/// delete_course
///
/// [Admin Route] Deletes the course and, with it, all of its lessons.
#[utoipa::path(
    delete,
    path = "/courses/{id}",
    params(("id" = Uuid, Path, description = "Course ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not an administrator"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_course(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> StatusCode {
    if !user.is_super_admin() {
        return StatusCode::FORBIDDEN;
    }
    if state.repo.delete_course(id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

/// create_lesson
///
/// [Admin Route] Adds a lesson to a course. The `number` field is bounded to
/// 1..=10000 at this boundary.
#[utoipa::path(
    post,
    path = "/courses/{id}/lessons",
    params(("id" = Uuid, Path, description = "Course ID")),
    request_body = CreateLessonRequest,
    responses(
        (status = 201, description = "Created", body = Lesson),
        (status = 400, description = "Invalid lesson number"),
        (status = 403, description = "Not an administrator"),
        (status = 404, description = "Course not found")
    )
)]
pub async fn create_lesson(
    user: AuthUser,
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
    Json(payload): Json<CreateLessonRequest>,
) -> Response {
    if !user.is_super_admin() {
        return StatusCode::FORBIDDEN.into_response();
    }
    if !lesson_number_valid(payload.number) {
        return invalid_lesson_number();
    }

    match state.repo.create_lesson(course_id, payload).await {
        Some(lesson) => (StatusCode::CREATED, Json(lesson)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// update_lesson
///
/// [Admin Route] Partial update of a lesson.
#[utoipa::path(
    put,
    path = "/lessons/{id}",
    params(("id" = Uuid, Path, description = "Lesson ID")),
    request_body = UpdateLessonRequest,
    responses(
        (status = 200, description = "Updated", body = Lesson),
        (status = 400, description = "Invalid lesson number"),
        (status = 403, description = "Not an administrator"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_lesson(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateLessonRequest>,
) -> Response {
    if !user.is_super_admin() {
        return StatusCode::FORBIDDEN.into_response();
    }
    if let Some(number) = payload.number {
        if !lesson_number_valid(number) {
            return invalid_lesson_number();
        }
    }

    match state.repo.update_lesson(id, payload).await {
        Some(lesson) => Json(lesson).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// delete_lesson
///
/// [Admin Route] Deletes a single lesson; the parent course is untouched.
#[utoipa::path(
    delete,
    path = "/lessons/{id}",
    params(("id" = Uuid, Path, description = "Lesson ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not an administrator"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_lesson(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> StatusCode {
    if !user.is_super_admin() {
        return StatusCode::FORBIDDEN;
    }
    if state.repo.delete_lesson(id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}
