use course_portal::{
    AppConfig, AppState, HttpBillingClient, MemoryRepository, create_router,
    billing::BillingState,
    models::CreateCourseRequest,
    repository::{CatalogRepository, RepositoryState},
};
use reqwest::StatusCode;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use uuid::Uuid;

/// The application wired to the real HTTP billing client, pointed at a port with
/// nothing listening behind it. Every billing call fails at the transport level,
/// which must surface to clients as 503, never as a hang or a panic.
async fn spawn_app_with_dead_billing() -> (String, reqwest::Client, Uuid) {
    let repo = Arc::new(MemoryRepository::new());
    let course = repo
        .create_course(CreateCourseRequest {
            code: "PPBI".to_string(),
            name: "Python programming".to_string(),
            description: String::new(),
            ..Default::default()
        })
        .await
        .expect("seed course");

    // Bind-then-drop reserves an address that refuses connections immediately.
    let vacated = TcpListener::bind("127.0.0.1:0").await.expect("spare port");
    let billing_addr = vacated.local_addr().expect("local addr");
    drop(vacated);

    let config = AppConfig {
        billing_url: format!("http://{billing_addr}"),
        billing_timeout: Duration::from_secs(1),
        ..Default::default()
    };
    let billing = Arc::new(HttpBillingClient::new(&config)) as BillingState;

    let state = AppState {
        repo: repo as RepositoryState,
        billing,
        config,
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

    (address, client, course.id)
}

#[tokio::test]
async fn login_surfaces_unreachable_billing_as_service_unavailable() {
    let (address, client, _) = spawn_app_with_dead_billing().await;

    let response = client
        .post(format!("{address}/auth/login"))
        .json(&json!({ "username": "user@study-on.local", "password": "Qwerty123" }))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json().await.expect("body");
    assert_eq!(
        body["message"],
        "Billing service is unavailable. Please try again later."
    );
}

#[tokio::test]
async fn listing_surfaces_unreachable_billing_as_service_unavailable() {
    let (address, client, _) = spawn_app_with_dead_billing().await;

    let response = client
        .get(format!("{address}/courses"))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json().await.expect("body");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn course_detail_surfaces_unreachable_billing_as_service_unavailable() {
    let (address, client, course_id) = spawn_app_with_dead_billing().await;

    let response = client
        .get(format!("{address}/courses/{course_id}"))
        .send()
        .await
        .expect("request");

    // The entitlement check needs the billing catalog, so the page fails closed
    // with 503 rather than guessing at visibility.
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
