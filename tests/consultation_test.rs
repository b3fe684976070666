mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use common::{TestApp, CLIENT_EMAIL};
use repairdesk_api::{entities::OtpPurpose, entities::WorkOrderStatus, errors::ServiceError};
use serde_json::json;

async fn token_for_cli001(app: &TestApp) -> String {
    let otp = &app.services().otp;
    otp.issue("CLI001", OtpPurpose::Consultation, Some(CLIENT_EMAIL))
        .await
        .unwrap();
    otp.validate("CLI001", OtpPurpose::Consultation, &app.last_code())
        .await
        .unwrap()
        .token
        .expect("token")
}

#[tokio::test]
async fn order_status_is_scoped_to_token_owner() {
    let app = TestApp::new().await;
    app.seed_parties().await;
    let own = app.create_order("CLI001", "EQ1", "TEC1").await;
    let foreign = app.create_order("CLI002", "EQ2", "TEC1").await;
    let token = token_for_cli001(&app).await;
    let consultation = &app.services().consultation;

    let view = consultation
        .order_status(&token, &own.order_number)
        .await
        .unwrap();
    assert_eq!(view.order_number, "OT-00001");
    assert_eq!(view.status, WorkOrderStatus::Pending);
    assert_eq!(view.equipment, "Laptop Lenovo ThinkPad T14");

    assert_matches!(
        consultation
            .order_status(&token, &foreign.order_number)
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        consultation.order_status("not-a-token", &own.order_number).await,
        Err(ServiceError::Unauthorized(_))
    );
}

#[tokio::test]
async fn order_history_lists_newest_first_until_token_expires() {
    let app = TestApp::new().await;
    app.seed_parties().await;
    app.create_order("CLI001", "EQ1", "TEC1").await;
    app.clock.advance_secs(60);
    app.create_order("CLI002", "EQ2", "TEC1").await;
    app.clock.advance_secs(60);
    app.create_order("CLI001", "EQ1", "TEC2").await;

    let token = token_for_cli001(&app).await;
    let consultation = &app.services().consultation;

    let history = consultation.order_history(&token).await.unwrap();
    let numbers: Vec<&str> = history.iter().map(|o| o.order_number.as_str()).collect();
    assert_eq!(numbers, vec!["OT-00003", "OT-00001"]);

    app.clock.advance_secs(901);
    assert_matches!(
        consultation.order_history(&token).await,
        Err(ServiceError::Unauthorized(_))
    );
}

#[tokio::test]
async fn public_http_flow() {
    let app = TestApp::new().await;
    app.seed_parties().await;
    let order = app.create_order("CLI001", "EQ1", "TEC1").await;

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/public/otp",
            Some(json!({ "client_id": "CLI001", "email": CLIENT_EMAIL })),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/public/otp/verify",
            Some(json!({ "client_id": "CLI001", "code": common::wrong_code(&app.last_code()) })),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["reason"], "INCORRECT");

    let (_, body) = app
        .request(
            Method::POST,
            "/api/v1/public/otp/verify",
            Some(json!({ "client_id": "CLI001", "code": app.last_code() })),
            &[],
        )
        .await;
    assert_eq!(body["success"], true);
    assert_eq!(body["token_ttl_seconds"], 900);
    let token = body["token"].as_str().expect("token").to_string();
    let bearer = format!("Bearer {}", token);

    let (status, body) = app
        .request(
            Method::GET,
            &format!("/api/v1/public/orders/{}", order.order_number),
            None,
            &[("authorization", bearer.as_str())],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order_number"], "OT-00001");
    assert_eq!(body["status"], "PENDING");

    let (status, body) = app
        .request(
            Method::GET,
            "/api/v1/public/orders",
            None,
            &[("authorization", bearer.as_str())],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let (status, _) = app
        .request(Method::GET, "/api/v1/public/orders", None, &[])
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn mismatched_email_is_unauthorized_over_http() {
    let app = TestApp::new().await;
    app.seed_parties().await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/public/otp",
            Some(json!({ "client_id": "CLI001", "email": "someone@else.test" })),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
    assert!(app.mailer.sent().is_empty());
}
