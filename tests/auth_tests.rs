mod common;

use common::spawn_app;
use course_portal::{
    billing::{MOCK_PASSWORD, MOCK_USER},
    models::{AuthResponse, CurrentUser, Transaction, TransactionType},
};
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn login_issues_a_token_payload() {
    let app = spawn_app().await;

    let auth = app.login_user().await;
    assert!(!auth.token.is_empty());
    assert!(!auth.refresh_token.is_empty());
    assert!(auth.roles.iter().any(|r| r == "ROLE_USER"));
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/auth/login"))
        .json(&json!({ "username": MOCK_USER, "password": "wrong" }))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_with_unknown_user_is_unauthorized() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/auth/login"))
        .json(&json!({ "username": "nobody@study-on.local", "password": MOCK_PASSWORD }))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_logs_the_new_account_in() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/auth/register"))
        .json(&json!({ "username": "new@study-on.local", "password": "S3cretPass" }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let auth: AuthResponse = response.json().await.expect("body");

    // The issued token is immediately usable.
    let me = app
        .client
        .get(app.url("/me"))
        .bearer_auth(&auth.token)
        .send()
        .await
        .expect("me request");
    assert_eq!(me.status(), StatusCode::OK);
    let profile: CurrentUser = me.json().await.expect("profile");
    assert_eq!(profile.username, "new@study-on.local");
    assert_eq!(profile.balance, 0.0);
}

#[tokio::test]
async fn registering_a_taken_username_fails_validation() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(app.url("/auth/register"))
        .json(&json!({ "username": MOCK_USER, "password": "S3cretPass" }))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = response.json().await.expect("body");
    assert!(body["errors"]["username"].is_array());
}

#[tokio::test]
async fn profile_requires_a_token() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/me"))
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn profile_reports_roles_and_balance() {
    let app = spawn_app().await;

    let user_auth = app.login_user().await;
    let user: CurrentUser = app
        .client
        .get(app.url("/me"))
        .bearer_auth(&user_auth.token)
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("body");
    assert_eq!(user.username, MOCK_USER);
    assert_eq!(user.balance, 7000.0);

    let admin_auth = app.login_admin().await;
    let admin: CurrentUser = app
        .client
        .get(app.url("/me"))
        .bearer_auth(&admin_auth.token)
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("body");
    assert!(admin.roles.iter().any(|r| r == "ROLE_SUPER_ADMIN"));
    assert_eq!(admin.balance, 2000.0);
}

#[tokio::test]
async fn history_is_complete_and_sorted() {
    let app = spawn_app().await;
    let auth = app.login_user().await;

    let response = app
        .client
        .get(app.url("/me/transactions"))
        .bearer_auth(&auth.token)
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let history: Vec<Transaction> = response.json().await.expect("body");
    // Full ledger: the opening deposit, both PPBI rents (expired one included) and
    // the MSC purchase.
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].transaction_type, TransactionType::Deposit);
    assert!(history.windows(2).all(|w| w[0].created_at <= w[1].created_at));
}

#[tokio::test]
async fn admin_history_is_empty() {
    let app = spawn_app().await;
    let auth = app.login_admin().await;

    let history: Vec<Transaction> = app
        .client
        .get(app.url("/me/transactions"))
        .bearer_auth(&auth.token)
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("body");

    assert!(history.is_empty());
}

#[tokio::test]
async fn payment_shows_up_in_the_history() {
    let app = spawn_app().await;
    let auth = app.login_user().await;
    let id = app.course_id("PPBI2").await;

    app.client
        .post(app.url(&format!("/courses/{id}/pay")))
        .bearer_auth(&auth.token)
        .send()
        .await
        .expect("pay request");

    let history: Vec<Transaction> = app
        .client
        .get(app.url("/me/transactions"))
        .bearer_auth(&auth.token)
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("body");

    assert_eq!(history.len(), 5);
    assert!(
        history
            .iter()
            .any(|tx| tx.course_code.as_deref() == Some("PPBI2"))
    );
}

#[tokio::test]
async fn refresh_exchanges_the_refresh_token() {
    let app = spawn_app().await;
    let auth = app.login_user().await;

    let response = app
        .client
        .post(app.url("/auth/refresh"))
        .json(&json!({ "refresh_token": auth.refresh_token }))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);
    let refreshed: AuthResponse = response.json().await.expect("body");

    let me = app
        .client
        .get(app.url("/me"))
        .bearer_auth(&refreshed.token)
        .send()
        .await
        .expect("me request");
    assert_eq!(me.status(), StatusCode::OK);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let app = spawn_app().await;
    let token = course_portal::auth::encode_token(&course_portal::auth::Claims {
        username: MOCK_USER.to_string(),
        roles: vec!["ROLE_USER".to_string()],
        exp: chrono::Utc::now().timestamp() - 60,
    });

    let response = app
        .client
        .get(app.url("/me"))
        .bearer_auth(&token)
        .send()
        .await
        .expect("request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
