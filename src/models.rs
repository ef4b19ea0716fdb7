use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Local Catalog Schemas (Mapped to Database) ---

/// Course
///
/// Represents a course record from the `public.courses` table. The `code` field is the
/// unique join key against the billing service's course catalog; it is the only link
/// between local content and remote commercial metadata (type, price).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Course {
    pub id: Uuid,
    /// Unique short code, e.g. "PPBI". Sole join key against the billing catalog.
    pub code: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lesson
///
/// Belongs to exactly one course and is destroyed together with it. Lessons carry no
/// entitlement data of their own — visibility is always decided by the parent course.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Lesson {
    pub id: Uuid,
    // FK to public.courses.id (owning course).
    pub course_id: Uuid,
    pub name: String,
    pub content: String,
    /// Ordering position within the course, 1..=10000.
    pub number: i32,
}

// --- Billing Service Schemas (Remote, never persisted) ---

/// CourseType
///
/// Commercial classification assigned by the billing service. `Free` courses are
/// visible to everyone; `Rent` and `Buy` courses require an active payment transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum CourseType {
    #[default]
    Free,
    Rent,
    Buy,
}

/// BillingCourse
///
/// Commercial metadata for one course as reported by `GET /api/v1/courses/`.
/// Fetched fresh on every request; a local course with no matching entry here
/// is treated as free (fail-open).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct BillingCourse {
    pub code: String,
    #[serde(rename = "type")]
    pub course_type: CourseType,
    pub price: f64,
}

/// TransactionType
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum TransactionType {
    #[default]
    Payment,
    Deposit,
}

/// Transaction
///
/// One entry of the billing ledger. A `payment` transaction with a `course_code` and a
/// missing or future `expires_at` is the evidence of active entitlement to that course.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct Transaction {
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// TransactionFilter
///
/// Narrowing criteria forwarded to `GET /api/v1/transactions/` as query parameters.
/// `skip_expired` drops transactions whose `expires_at` has already passed; entries
/// without an expiry are kept.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub transaction_type: Option<TransactionType>,
    pub course_code: Option<String>,
    pub skip_expired: bool,
}

impl TransactionFilter {
    /// The filter used by every entitlement check: active payments for one course.
    pub fn active_payments_for(code: &str) -> Self {
        Self {
            transaction_type: Some(TransactionType::Payment),
            course_code: Some(code.to_string()),
            skip_expired: true,
        }
    }

    /// The filter used by the catalog listing: active payments across all courses.
    pub fn active_payments() -> Self {
        Self {
            transaction_type: Some(TransactionType::Payment),
            course_code: None,
            skip_expired: true,
        }
    }
}

/// AuthResponse
///
/// Token payload issued by the billing service on login, registration and refresh.
/// The `token` is opaque to this application and forwarded as a bearer header on
/// every subsequent billing call.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct AuthResponse {
    pub token: String,
    #[serde(rename = "refreshToken")]
    pub refresh_token: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// CurrentUser
///
/// Profile data returned by `GET /api/v1/users/current`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CurrentUser {
    pub username: String,
    pub roles: Vec<String>,
    pub balance: f64,
}

/// PayReceipt
///
/// Successful response of `POST /api/v1/courses/{code}/pay`. For rented courses the
/// billing service reports when the entitlement will lapse.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct PayReceipt {
    #[serde(rename = "type")]
    pub course_type: CourseType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// BillingCourseUpsert
///
/// Payload sent to the billing service when an administrator creates or edits a
/// course, keeping the remote catalog in sync with the local one.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BillingCourseUpsert {
    pub code: String,
    pub title: String,
    #[serde(rename = "type")]
    pub course_type: CourseType,
    pub price: f64,
}

// --- Request Payloads (Input Schemas) ---

/// LoginRequest
///
/// Credentials are passed straight through to the billing service and never stored
/// or logged locally.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// RegisterRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

/// RefreshRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// CreateCourseRequest
///
/// Input payload for the admin course creation endpoint. `type` and `price` are
/// forwarded to the billing service; the remaining fields become the local record.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateCourseRequest {
    pub code: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub course_type: CourseType,
    pub price: f64,
}

/// UpdateCourseRequest
///
/// Partial update payload. Only provided fields are changed locally; the billing sync
/// always sends the resulting full commercial payload.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateCourseRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub course_type: Option<CourseType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

/// CreateLessonRequest
///
/// The `number` field is validated at the handler boundary (1..=10000).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateLessonRequest {
    pub name: String,
    pub content: String,
    pub number: i32,
}

/// UpdateLessonRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateLessonRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<i32>,
}

// --- Composite View Schemas (Output) ---

/// BillingInfo
///
/// The commercial metadata attached to one catalog row. Courses unknown to the
/// billing service are presented as free with no price.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct BillingInfo {
    #[serde(rename = "type")]
    pub course_type: CourseType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

impl From<&BillingCourse> for BillingInfo {
    fn from(bc: &BillingCourse) -> Self {
        Self {
            course_type: bc.course_type,
            price: Some(bc.price),
        }
    }
}

/// CourseRow
///
/// One row of the merged catalog listing: the local course joined by `code` with its
/// billing metadata and, for authenticated users, the matching active payment.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CourseRow {
    pub course: Course,
    pub billing_info: BillingInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,
}

/// CourseDetail
///
/// Full course view served once the entitlement check has granted access.
/// Lessons are ordered by their `number` field.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CourseDetail {
    pub course: Course,
    pub lessons: Vec<Lesson>,
}
