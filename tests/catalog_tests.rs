mod common;

use common::spawn_app;
use course_portal::models::{CourseRow, CourseType};
use reqwest::StatusCode;

#[tokio::test]
async fn anonymous_listing_holds_only_free_courses() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/courses"))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let rows: Vec<CourseRow> = response.json().await.expect("body");
    let codes: Vec<&str> = rows.iter().map(|r| r.course.code.as_str()).collect();

    // Free billing courses plus the one billing has never heard of, in local order.
    assert_eq!(codes, vec!["PPBIB", "MSCB", "LOCAL"]);
    for row in &rows {
        assert_eq!(row.billing_info.course_type, CourseType::Free);
        assert!(row.transaction.is_none());
    }
}

#[tokio::test]
async fn authenticated_listing_holds_every_course_with_billing_data() {
    let app = spawn_app().await;
    let auth = app.login_user().await;

    let response = app
        .client
        .get(app.url("/courses"))
        .bearer_auth(&auth.token)
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    let rows: Vec<CourseRow> = response.json().await.expect("body");
    let codes: Vec<&str> = rows.iter().map(|r| r.course.code.as_str()).collect();
    assert_eq!(
        codes,
        vec!["PPBIB", "PPBI", "PPBI2", "MSCB", "MSC", "CAMP", "LOCAL"]
    );

    let row = |code: &str| rows.iter().find(|r| r.course.code == code).expect(code);

    // Commercial metadata comes straight from billing.
    assert_eq!(row("PPBI2").billing_info.course_type, CourseType::Buy);
    assert_eq!(row("PPBI2").billing_info.price, Some(2000.0));
    assert_eq!(row("CAMP").billing_info.course_type, CourseType::Rent);
    // Unknown to billing: rendered as free with no price.
    assert_eq!(row("LOCAL").billing_info.course_type, CourseType::Free);
    assert!(row("LOCAL").billing_info.price.is_none());

    // Active payments are attached to their rows; everything else has none.
    assert!(row("MSC").transaction.is_some());
    assert!(row("PPBI").transaction.is_some());
    assert!(row("PPBI2").transaction.is_none());
    assert!(row("PPBIB").transaction.is_none());
}

#[tokio::test]
async fn expired_rent_does_not_surface_in_the_listing() {
    let app = spawn_app().await;
    let auth = app.login_user().await;

    let response = app
        .client
        .get(app.url("/courses"))
        .bearer_auth(&auth.token)
        .send()
        .await
        .expect("request");
    let rows: Vec<CourseRow> = response.json().await.expect("body");

    // PPBI has two canned payments, one lapsed; the attached one must be the
    // still-active rent.
    let ppbi = rows
        .iter()
        .find(|r| r.course.code == "PPBI")
        .expect("PPBI row");
    let tx = ppbi.transaction.as_ref().expect("active transaction");
    assert!(tx.expires_at.expect("rent expiry") > chrono::Utc::now());
}

#[tokio::test]
async fn listing_fetches_transactions_exactly_once() {
    let app = spawn_app().await;
    let auth = app.login_user().await;

    let response = app
        .client
        .get(app.url("/courses"))
        .bearer_auth(&auth.token)
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    // One batched history fetch for the whole catalog, never one per course.
    assert_eq!(app.billing.transaction_call_count(), 1);
}

#[tokio::test]
async fn anonymous_listing_never_touches_transactions() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/courses"))
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(app.billing.transaction_call_count(), 0);
}
