use crate::config::AppConfig;
use crate::models::{
    AuthResponse, BillingCourse, BillingCourseUpsert, CourseType, CurrentUser, PayReceipt,
    Transaction, TransactionFilter, TransactionType,
};
use async_trait::async_trait;
use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};
use chrono::{TimeZone, Utc};
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

// 1. Billing Error Taxonomy

/// BillingError
///
/// Every outbound billing call resolves into exactly one of these variants.
/// Transport failures and API-level error payloads are kept apart so the handlers
/// can surface them differently (generic "try later" vs. field-level messages).
/// No call is ever retried — a failure is surfaced once to the caller.
#[derive(Debug, Error)]
pub enum BillingError {
    /// The billing host did not answer (connection error, timeout, malformed body).
    #[error("Billing service is unavailable. Please try again later.")]
    Unavailable,

    /// A 401-shaped body during authentication. Deliberately does not reveal which
    /// of username/password was wrong.
    #[error("Check the username and password you entered.")]
    InvalidCredentials,

    /// A successfully transported response carrying a structured `errors` payload
    /// (e.g. duplicate username on registration).
    #[error("Billing service rejected the request.")]
    Api(Value),

    /// A non-success payment response with a user-facing message.
    #[error("{0}")]
    Failed(String),
}

impl IntoResponse for BillingError {
    /// Maps the taxonomy onto HTTP responses: 503 for transport failures, 401 for bad
    /// credentials, 422 with the structured payload for validation errors, and 402 for
    /// rejected payments.
    fn into_response(self) -> Response {
        match self {
            Self::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "message": self.to_string() })),
            )
                .into_response(),
            Self::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "message": self.to_string() })),
            )
                .into_response(),
            Self::Api(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "errors": errors })),
            )
                .into_response(),
            Self::Failed(message) => (
                StatusCode::PAYMENT_REQUIRED,
                Json(json!({ "message": message })),
            )
                .into_response(),
        }
    }
}

// 2. BillingService Contract

/// BillingService
///
/// Defines the abstract contract for all interactions with the external billing
/// service, which is the system of record for identity, payment state, and course
/// commercial metadata. The trait allows swapping the real HTTP client
/// (HttpBillingClient) for the in-memory mock (MockBillingService) during testing
/// without affecting the calling handlers.
#[async_trait]
pub trait BillingService: Send + Sync {
    /// Exchanges credentials for a token payload. `InvalidCredentials` when the
    /// service reports an unauthorized status.
    async fn auth(&self, username: &str, password: &str) -> Result<AuthResponse, BillingError>;

    /// Registers a new account. `Api` with field errors on e.g. a duplicate username.
    async fn register(&self, username: &str, password: &str)
    -> Result<AuthResponse, BillingError>;

    /// Fetches the profile (username, roles, balance) behind a token.
    async fn current_user(&self, token: &str) -> Result<CurrentUser, BillingError>;

    /// Lists the billing course catalog, optionally narrowed by type server-side.
    async fn courses(
        &self,
        course_type: Option<CourseType>,
    ) -> Result<Vec<BillingCourse>, BillingError>;

    /// Fetches one billing course; `None` when the code is unknown to billing.
    async fn course_by_code(&self, code: &str) -> Result<Option<BillingCourse>, BillingError>;

    /// Lists the caller's transactions, narrowed by the filter. `skip_expired` keeps
    /// transactions whose `expires_at` is absent or in the future.
    async fn transactions(
        &self,
        filter: &TransactionFilter,
        token: &str,
    ) -> Result<Vec<Transaction>, BillingError>;

    /// Pays for a course on behalf of the token's owner. `Failed(message)` when the
    /// response status is not success.
    async fn pay(&self, code: &str, token: &str) -> Result<PayReceipt, BillingError>;

    /// Exchanges a refresh token for a fresh token payload.
    async fn refresh_token(&self, refresh_token: &str) -> Result<AuthResponse, BillingError>;

    /// Registers a new course with billing. Called by the admin create flow before
    /// the local record is written.
    async fn create_course(
        &self,
        payload: &BillingCourseUpsert,
        token: &str,
    ) -> Result<(), BillingError>;

    /// Updates the billing record addressed by the course's previous code.
    async fn update_course(
        &self,
        old_code: &str,
        payload: &BillingCourseUpsert,
        token: &str,
    ) -> Result<(), BillingError>;
}

/// BillingState
///
/// The concrete type used to share the billing gateway across the application state.
pub type BillingState = Arc<dyn BillingService>;

// 3. The Real Implementation (HTTP)

/// HttpBillingClient
///
/// The concrete implementation speaking JSON over HTTP to the billing service.
/// One shared reqwest client carries the bounded per-request timeout from AppConfig,
/// so an unreachable billing host fails each page request quickly instead of hanging.
pub struct HttpBillingClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBillingClient {
    /// new
    ///
    /// Constructs the client from the injected configuration (base URL, timeout).
    ///
    /// # Panics
    /// Panics if the underlying TLS backend cannot be initialized; this is a startup
    /// fail-fast condition, consistent with configuration loading.
    pub fn new(config: &AppConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.billing_timeout)
            .build()
            .expect("FATAL: failed to construct the billing HTTP client");

        Self {
            http,
            base_url: config.billing_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    /// Reads a transported response: an `errors` field anywhere in the body becomes
    /// `Api`, anything else is deserialized into the expected shape. A body that
    /// matches neither is treated as the service misbehaving (`Unavailable`).
    async fn read_body<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, BillingError> {
        let value = response
            .json::<Value>()
            .await
            .map_err(|_| BillingError::Unavailable)?;

        if let Some(errors) = value.get("errors") {
            return Err(BillingError::Api(errors.clone()));
        }

        serde_json::from_value(value).map_err(|_| BillingError::Unavailable)
    }
}

#[async_trait]
impl BillingService for HttpBillingClient {
    /// POST /api/v1/auth
    ///
    /// A `{code: 401}`-shaped body is the service's "user not found" answer and maps
    /// to `InvalidCredentials` rather than a generic billing error.
    async fn auth(&self, username: &str, password: &str) -> Result<AuthResponse, BillingError> {
        let response = self
            .http
            .post(self.url("/api/v1/auth"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(|_| BillingError::Unavailable)?;

        let value = response
            .json::<Value>()
            .await
            .map_err(|_| BillingError::Unavailable)?;

        if value.get("code").and_then(Value::as_i64) == Some(401) {
            return Err(BillingError::InvalidCredentials);
        }
        if let Some(errors) = value.get("errors") {
            return Err(BillingError::Api(errors.clone()));
        }

        serde_json::from_value(value).map_err(|_| BillingError::Unavailable)
    }

    /// POST /api/v1/register
    async fn register(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AuthResponse, BillingError> {
        let response = self
            .http
            .post(self.url("/api/v1/register"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(|_| BillingError::Unavailable)?;

        Self::read_body(response).await
    }

    /// GET /api/v1/users/current
    async fn current_user(&self, token: &str) -> Result<CurrentUser, BillingError> {
        let response = self
            .http
            .get(self.url("/api/v1/users/current"))
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await
            .map_err(|_| BillingError::Unavailable)?;

        Self::read_body(response).await
    }

    /// GET /api/v1/courses/
    async fn courses(
        &self,
        course_type: Option<CourseType>,
    ) -> Result<Vec<BillingCourse>, BillingError> {
        let mut request = self.http.get(self.url("/api/v1/courses/"));
        if let Some(ct) = course_type {
            request = request.query(&[("type", course_type_str(ct))]);
        }

        let response = request.send().await.map_err(|_| BillingError::Unavailable)?;

        Self::read_body(response).await
    }

    /// GET /api/v1/courses/{code}
    ///
    /// A 404 means billing does not know this code; the caller treats such courses
    /// as free (fail-open), so absence is a value here, not an error.
    async fn course_by_code(&self, code: &str) -> Result<Option<BillingCourse>, BillingError> {
        let response = self
            .http
            .get(self.url(&format!("/api/v1/courses/{code}")))
            .send()
            .await
            .map_err(|_| BillingError::Unavailable)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Self::read_body(response).await.map(Some)
    }

    /// GET /api/v1/transactions/
    async fn transactions(
        &self,
        filter: &TransactionFilter,
        token: &str,
    ) -> Result<Vec<Transaction>, BillingError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(tt) = filter.transaction_type {
            query.push(("type", transaction_type_str(tt).to_string()));
        }
        if let Some(code) = &filter.course_code {
            query.push(("course_code", code.clone()));
        }
        if filter.skip_expired {
            query.push(("skip_expired", "1".to_string()));
        }

        let response = self
            .http
            .get(self.url("/api/v1/transactions/"))
            .query(&query)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await
            .map_err(|_| BillingError::Unavailable)?;

        Self::read_body(response).await
    }

    /// POST /api/v1/courses/{code}/pay
    async fn pay(&self, code: &str, token: &str) -> Result<PayReceipt, BillingError> {
        let response = self
            .http
            .post(self.url(&format!("/api/v1/courses/{code}/pay")))
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .send()
            .await
            .map_err(|_| BillingError::Unavailable)?;

        if !response.status().is_success() {
            // Failure shape: {status_code, message}. The message is user-facing.
            let value = response
                .json::<Value>()
                .await
                .map_err(|_| BillingError::Unavailable)?;
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Payment was rejected.")
                .to_string();
            return Err(BillingError::Failed(message));
        }

        Self::read_body(response).await
    }

    /// POST /api/v1/token/refresh
    async fn refresh_token(&self, refresh_token: &str) -> Result<AuthResponse, BillingError> {
        let response = self
            .http
            .post(self.url("/api/v1/token/refresh"))
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|_| BillingError::Unavailable)?;

        Self::read_body(response).await
    }

    /// POST /api/v1/courses/
    async fn create_course(
        &self,
        payload: &BillingCourseUpsert,
        token: &str,
    ) -> Result<(), BillingError> {
        let response = self
            .http
            .post(self.url("/api/v1/courses/"))
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .json(payload)
            .send()
            .await
            .map_err(|_| BillingError::Unavailable)?;

        Self::read_body::<Value>(response).await.map(|_| ())
    }

    /// POST /api/v1/courses/{code}
    async fn update_course(
        &self,
        old_code: &str,
        payload: &BillingCourseUpsert,
        token: &str,
    ) -> Result<(), BillingError> {
        let response = self
            .http
            .post(self.url(&format!("/api/v1/courses/{old_code}")))
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .json(payload)
            .send()
            .await
            .map_err(|_| BillingError::Unavailable)?;

        Self::read_body::<Value>(response).await.map(|_| ())
    }
}

// 4. The Mock Implementation (For Tests)

/// Canned account known to the mock billing service.
pub const MOCK_USER: &str = "user@study-on.local";
/// Canned administrator account known to the mock billing service.
pub const MOCK_ADMIN: &str = "admin@study-on.local";
/// Shared password of both canned accounts.
pub const MOCK_PASSWORD: &str = "Qwerty123";

/// MockBillingService
///
/// An in-memory stand-in for the billing service used by the integration tests.
/// Seeded with the same fixture the access-control scenarios are written against:
/// two accounts, seven courses across all three types, and a transaction history
/// containing one active payment (PPBI), one expired payment (PPBI) and one
/// payment without an expiry (MSC). Payments made through `pay` are recorded and
/// show up in subsequent transaction queries.
pub struct MockBillingService {
    courses: Mutex<Vec<BillingCourse>>,
    // Canned history of MOCK_USER. MOCK_ADMIN deliberately has no transactions so the
    // administrative override path is exercised without entitlement.
    canned: Vec<Transaction>,
    // (username, transaction) pairs recorded by pay().
    purchases: Mutex<Vec<(String, Transaction)>>,
    transaction_calls: AtomicUsize,
}

impl Default for MockBillingService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBillingService {
    pub fn new() -> Self {
        let courses = vec![
            mock_course("PPBIB", CourseType::Free, 2000.0),
            mock_course("PPBI", CourseType::Rent, 2000.0),
            mock_course("PPBI2", CourseType::Buy, 2000.0),
            mock_course("MSCB", CourseType::Free, 1000.0),
            mock_course("MSC", CourseType::Buy, 1000.0),
            mock_course("CAMPB", CourseType::Free, 3000.0),
            mock_course("CAMP", CourseType::Rent, 3000.0),
        ];

        let now = Utc::now();
        let canned = vec![
            Transaction {
                transaction_type: TransactionType::Deposit,
                amount: 10000.0,
                created_at: mock_date(2022, 6, 1),
                course_code: None,
                expires_at: None,
            },
            // No expiry: a bought course stays available forever.
            Transaction {
                transaction_type: TransactionType::Payment,
                amount: 1000.0,
                created_at: mock_date(2022, 6, 5),
                course_code: Some("MSC".to_string()),
                expires_at: None,
            },
            // Lapsed rent period; must be dropped by skip_expired.
            Transaction {
                transaction_type: TransactionType::Payment,
                amount: 1000.0,
                created_at: mock_date(2022, 6, 8),
                course_code: Some("PPBI".to_string()),
                expires_at: Some(mock_date(2022, 6, 15)),
            },
            // Active rent, one week out.
            Transaction {
                transaction_type: TransactionType::Payment,
                amount: 1000.0,
                created_at: now,
                course_code: Some("PPBI".to_string()),
                expires_at: Some(now + chrono::Duration::weeks(1)),
            },
        ];

        Self {
            courses: Mutex::new(courses),
            canned,
            purchases: Mutex::new(Vec::new()),
            transaction_calls: AtomicUsize::new(0),
        }
    }

    /// Number of `transactions` calls observed. Used to assert the catalog listing
    /// performs exactly one batched fetch regardless of course count.
    pub fn transaction_call_count(&self) -> usize {
        self.transaction_calls.load(Ordering::SeqCst)
    }

    fn issue(&self, username: &str, roles: Vec<String>) -> AuthResponse {
        let now = Utc::now().timestamp();
        let token = crate::auth::encode_token(&crate::auth::Claims {
            username: username.to_string(),
            roles: roles.clone(),
            exp: now + 3600,
        });
        let refresh_token = crate::auth::encode_token(&crate::auth::Claims {
            username: username.to_string(),
            roles: roles.clone(),
            exp: now + 30 * 24 * 3600,
        });
        AuthResponse {
            token,
            refresh_token,
            roles,
        }
    }

    fn claims_for(token: &str) -> Result<crate::auth::Claims, BillingError> {
        crate::auth::decode_claims(token)
            .ok_or_else(|| BillingError::Api(json!({ "security": ["Invalid bearer token."] })))
    }
}

fn mock_course(code: &str, course_type: CourseType, price: f64) -> BillingCourse {
    BillingCourse {
        code: code.to_string(),
        course_type,
        price,
    }
}

fn mock_date(year: i32, month: u32, day: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

fn matches_filter(tx: &Transaction, filter: &TransactionFilter, now: chrono::DateTime<Utc>) -> bool {
    if let Some(tt) = filter.transaction_type {
        if tx.transaction_type != tt {
            return false;
        }
    }
    if let Some(code) = &filter.course_code {
        if tx.course_code.as_deref() != Some(code.as_str()) {
            return false;
        }
    }
    if filter.skip_expired {
        // A transaction without an expiry never expires.
        if let Some(expires_at) = tx.expires_at {
            if expires_at <= now {
                return false;
            }
        }
    }
    true
}

#[async_trait]
impl BillingService for MockBillingService {
    async fn auth(&self, username: &str, password: &str) -> Result<AuthResponse, BillingError> {
        if password != MOCK_PASSWORD {
            return Err(BillingError::InvalidCredentials);
        }
        match username {
            MOCK_USER => Ok(self.issue(MOCK_USER, vec![crate::auth::ROLE_USER.to_string()])),
            MOCK_ADMIN => Ok(self.issue(
                MOCK_ADMIN,
                vec![
                    crate::auth::ROLE_SUPER_ADMIN.to_string(),
                    crate::auth::ROLE_USER.to_string(),
                ],
            )),
            _ => Err(BillingError::InvalidCredentials),
        }
    }

    async fn register(
        &self,
        username: &str,
        _password: &str,
    ) -> Result<AuthResponse, BillingError> {
        if username == MOCK_USER || username == MOCK_ADMIN {
            return Err(BillingError::Api(
                json!({ "username": ["A user with this username already exists."] }),
            ));
        }
        Ok(self.issue(username, vec![crate::auth::ROLE_USER.to_string()]))
    }

    async fn current_user(&self, token: &str) -> Result<CurrentUser, BillingError> {
        let claims = Self::claims_for(token)?;
        // Canned opening deposit minus the three canned payments.
        let balance = match claims.username.as_str() {
            MOCK_USER => 7000.0,
            MOCK_ADMIN => 2000.0,
            _ => 0.0,
        };
        Ok(CurrentUser {
            username: claims.username,
            roles: claims.roles,
            balance,
        })
    }

    async fn courses(
        &self,
        course_type: Option<CourseType>,
    ) -> Result<Vec<BillingCourse>, BillingError> {
        let courses = self.courses.lock().expect("mock courses lock");
        Ok(courses
            .iter()
            .filter(|c| course_type.is_none_or(|ct| c.course_type == ct))
            .cloned()
            .collect())
    }

    async fn course_by_code(&self, code: &str) -> Result<Option<BillingCourse>, BillingError> {
        let courses = self.courses.lock().expect("mock courses lock");
        Ok(courses.iter().find(|c| c.code == code).cloned())
    }

    async fn transactions(
        &self,
        filter: &TransactionFilter,
        token: &str,
    ) -> Result<Vec<Transaction>, BillingError> {
        self.transaction_calls.fetch_add(1, Ordering::SeqCst);
        let claims = Self::claims_for(token)?;
        let now = Utc::now();

        let mut history: Vec<Transaction> = if claims.username == MOCK_USER {
            self.canned.clone()
        } else {
            Vec::new()
        };
        let purchases = self.purchases.lock().expect("mock purchases lock");
        history.extend(
            purchases
                .iter()
                .filter(|(username, _)| *username == claims.username)
                .map(|(_, tx)| tx.clone()),
        );

        Ok(history
            .into_iter()
            .filter(|tx| matches_filter(tx, filter, now))
            .collect())
    }

    async fn pay(&self, code: &str, token: &str) -> Result<PayReceipt, BillingError> {
        let claims = Self::claims_for(token)?;
        let course = self.course_by_code(code).await?.ok_or_else(|| {
            BillingError::Failed("Unknown course code.".to_string())
        })?;
        if course.course_type == CourseType::Free {
            return Err(BillingError::Failed(
                "This course is free and cannot be paid for.".to_string(),
            ));
        }

        let now = Utc::now();
        let expires_at = match course.course_type {
            CourseType::Rent => Some(now + chrono::Duration::weeks(1)),
            _ => None,
        };

        let tx = Transaction {
            transaction_type: TransactionType::Payment,
            amount: course.price,
            created_at: now,
            course_code: Some(course.code.clone()),
            expires_at,
        };
        self.purchases
            .lock()
            .expect("mock purchases lock")
            .push((claims.username, tx));

        Ok(PayReceipt {
            course_type: course.course_type,
            expires_at,
        })
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<AuthResponse, BillingError> {
        let claims = crate::auth::decode_claims(refresh_token)
            .ok_or(BillingError::InvalidCredentials)?;
        Ok(self.issue(&claims.username, claims.roles))
    }

    async fn create_course(
        &self,
        payload: &BillingCourseUpsert,
        token: &str,
    ) -> Result<(), BillingError> {
        Self::claims_for(token)?;
        let mut courses = self.courses.lock().expect("mock courses lock");
        if courses.iter().any(|c| c.code == payload.code) {
            return Err(BillingError::Api(
                json!({ "code": ["A course with this code already exists."] }),
            ));
        }
        courses.push(BillingCourse {
            code: payload.code.clone(),
            course_type: payload.course_type,
            price: payload.price,
        });
        Ok(())
    }

    async fn update_course(
        &self,
        old_code: &str,
        payload: &BillingCourseUpsert,
        token: &str,
    ) -> Result<(), BillingError> {
        Self::claims_for(token)?;
        let mut courses = self.courses.lock().expect("mock courses lock");
        match courses.iter_mut().find(|c| c.code == old_code) {
            Some(course) => {
                course.code = payload.code.clone();
                course.course_type = payload.course_type;
                course.price = payload.price;
                Ok(())
            }
            None => Err(BillingError::Api(
                json!({ "code": ["No billing course with this code."] }),
            )),
        }
    }
}

fn course_type_str(ct: CourseType) -> &'static str {
    match ct {
        CourseType::Free => "free",
        CourseType::Rent => "rent",
        CourseType::Buy => "buy",
    }
}

fn transaction_type_str(tt: TransactionType) -> &'static str {
    match tt {
        TransactionType::Payment => "payment",
        TransactionType::Deposit => "deposit",
    }
}
