#![allow(dead_code)]

use course_portal::{
    AppConfig, AppState, MemoryRepository, MockBillingService, create_router,
    billing::{BillingState, MOCK_ADMIN, MOCK_PASSWORD, MOCK_USER},
    models::{AuthResponse, CreateCourseRequest, CreateLessonRequest},
    repository::{CatalogRepository, RepositoryState},
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

/// TestApp
///
/// One fully wired application instance listening on an ephemeral port, backed by the
/// in-memory repository and the mock billing service. Tests drive it over real HTTP;
/// the mock handles are kept around so tests can inspect and assert against the
/// billing side directly.
pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub billing: Arc<MockBillingService>,
    pub repo: Arc<MemoryRepository>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    /// Logs in through the HTTP endpoint and returns the issued token payload.
    pub async fn login(&self, username: &str, password: &str) -> AuthResponse {
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("login request");
        assert!(
            response.status().is_success(),
            "login failed with {}",
            response.status()
        );
        response.json().await.expect("login body")
    }

    pub async fn login_user(&self) -> AuthResponse {
        self.login(MOCK_USER, MOCK_PASSWORD).await
    }

    pub async fn login_admin(&self) -> AuthResponse {
        self.login(MOCK_ADMIN, MOCK_PASSWORD).await
    }

    pub async fn course_id(&self, code: &str) -> Uuid {
        self.repo
            .course_by_code(code)
            .await
            .expect("seeded course")
            .id
    }

    /// The first (lowest-numbered) seeded lesson of a course.
    pub async fn first_lesson_id(&self, code: &str) -> Uuid {
        let course_id = self.course_id(code).await;
        self.repo
            .lessons_for_course(course_id)
            .await
            .first()
            .expect("seeded lesson")
            .id
    }
}

/// spawn_app
///
/// Boots the application on 127.0.0.1:0 and returns a handle for driving it.
/// Redirects are not followed so tests can observe the 303-to-login outcome directly.
pub async fn spawn_app() -> TestApp {
    let repo = Arc::new(MemoryRepository::new());
    let billing = Arc::new(MockBillingService::new());

    seed_catalog(repo.as_ref()).await;

    let state = AppState {
        repo: repo.clone() as RepositoryState,
        billing: billing.clone() as BillingState,
        config: AppConfig::default(),
    };

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let address = format!("http://{}", listener.local_addr().expect("local addr"));

    tokio::spawn(async move {
        axum::serve(listener, create_router(state))
            .await
            .expect("test server");
    });

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .expect("test client");

    TestApp {
        address,
        client,
        billing,
        repo,
    }
}

/// Local catalog fixture. The codes line up with the mock billing catalog, except
/// "LOCAL" which billing does not know about and is therefore served as free.
async fn seed_catalog(repo: &MemoryRepository) {
    let seed = [
        ("PPBIB", "Python programming for beginners"),
        ("PPBI", "Python programming"),
        ("PPBI2", "Advanced Python programming"),
        ("MSCB", "Public speaking basics"),
        ("MSC", "Public speaking"),
        ("CAMP", "Summer camp"),
        ("LOCAL", "Editorial drafts"),
    ];

    for (code, name) in seed {
        let course = repo
            .create_course(CreateCourseRequest {
                code: code.to_string(),
                name: name.to_string(),
                description: format!("All about {name}."),
                ..Default::default()
            })
            .await
            .expect("seed course");

        for number in 1..=2 {
            repo.create_lesson(
                course.id,
                CreateLessonRequest {
                    name: format!("{name}, part {number}"),
                    content: format!("Lesson {number} content."),
                    number,
                },
            )
            .await
            .expect("seed lesson");
        }
    }
}
