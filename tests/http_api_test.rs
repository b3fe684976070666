mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use repairdesk_api::entities::CatalogItemType;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::str::FromStr;

fn create_body(technician_id: Option<&str>) -> Value {
    let mut body = json!({
        "client_id": "CLI001",
        "equipment_id": "EQ1",
        "intake": {
            "contact_medium": "Phone",
            "reported_problem": "Screen flickers",
            "accessories": "Charger"
        },
        "classification": { "service_type": "REPAIR", "priority": "HIGH" }
    });
    if let Some(id) = technician_id {
        body["technician_id"] = json!(id);
    }
    body
}

fn decimal(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("decimal string")).expect("decimal")
}

#[tokio::test]
async fn health_reports_database_up() {
    let app = TestApp::new().await;
    let (status, body) = app.request(Method::GET, "/health", None, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], "up");
}

#[tokio::test]
async fn work_order_flow_over_http() {
    let app = TestApp::new().await;
    app.seed_parties().await;
    let item = app
        .seed_catalog_item(CatalogItemType::Product, "Display cable", dec!(10.00), true)
        .await;
    let labour = app
        .seed_catalog_item(CatalogItemType::Service, "Labour", dec!(50.00), true)
        .await;

    let (status, order) = app
        .request_as_technician(
            Method::POST,
            "/api/v1/work-orders",
            Some(create_body(None)),
            "TEC2",
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["order_number"], "OT-00001");
    assert_eq!(order["technician_id"], "TEC2");
    assert_eq!(order["status"], "PENDING");
    let id = order["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .request(
            Method::POST,
            &format!("/api/v1/work-orders/{id}/reception"),
            Some(json!({})),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .request(
            Method::PUT,
            &format!("/api/v1/work-orders/{id}/status"),
            Some(json!({ "status": "in_repair" })),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "IN_REPAIR");

    let (status, line) = app
        .request(
            Method::POST,
            &format!("/api/v1/work-orders/{id}/costs"),
            Some(json!({ "catalog_item_id": item, "quantity": 1 })),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let line_id = line["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/api/v1/cost-lines/{line_id}"),
            Some(json!({ "quantity": 2 })),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    app.request(
        Method::POST,
        &format!("/api/v1/work-orders/{id}/costs"),
        Some(json!({ "catalog_item_id": labour, "quantity": 1 })),
        &[],
    )
    .await;

    let (status, totals) = app
        .request(
            Method::GET,
            &format!("/api/v1/work-orders/{id}/costs/totals"),
            None,
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal(&totals["subtotal"]), dec!(70.00));
    assert_eq!(decimal(&totals["tax"]), dec!(10.50));
    assert_eq!(decimal(&totals["total"]), dec!(80.50));

    let (status, lines) = app
        .request(
            Method::GET,
            &format!("/api/v1/work-orders/{id}/costs"),
            None,
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lines.as_array().map(Vec::len), Some(2));

    let (status, closed) = app
        .request(
            Method::POST,
            &format!("/api/v1/work-orders/{id}/delivery"),
            Some(json!({
                "diagnosis": "Replaced display cable",
                "technician_signed": true,
                "client_signed": true,
                "received_satisfied": true
            })),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(closed["status"], "CLOSED");

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/api/v1/work-orders/{id}/delivery"),
            Some(json!({})),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Conflict");

    let (status, _) = app
        .request(
            Method::DELETE,
            &format!("/api/v1/cost-lines/{line_id}"),
            None,
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, doc) = app
        .request(
            Method::GET,
            &format!("/api/v1/work-orders/{id}/documents/delivery"),
            None,
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(doc["document"], "delivery");
    assert_eq!(doc["lines"].as_array().map(Vec::len), Some(2));
    assert_eq!(decimal(&doc["total"]), dec!(80.50));
}

#[tokio::test]
async fn list_filters_and_detail_over_http() {
    let app = TestApp::new().await;
    app.seed_parties().await;
    app.create_order("CLI001", "EQ1", "TEC1").await;
    app.clock.advance_secs(10);
    let second = app.create_order("CLI002", "EQ2", "TEC2").await;

    let (status, all) = app
        .request(Method::GET, "/api/v1/work-orders", None, &[])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all.as_array().map(Vec::len), Some(2));
    assert_eq!(all[0]["order_number"], "OT-00002");

    let (_, filtered) = app
        .request(
            Method::GET,
            "/api/v1/work-orders?technician_id=TEC1",
            None,
            &[],
        )
        .await;
    assert_eq!(filtered.as_array().map(Vec::len), Some(1));
    assert_eq!(filtered[0]["order_number"], "OT-00001");

    let (status, detail) = app
        .request(
            Method::GET,
            &format!("/api/v1/work-orders/{}", second.id),
            None,
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["client"]["id"], "CLI002");
    assert_eq!(detail["technical_sheet"], Value::Null);

    let (status, intake) = app
        .request(
            Method::GET,
            &format!("/api/v1/work-orders/{}/documents/intake", second.id),
            None,
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(intake["document"], "intake");
    assert_eq!(intake["parties"]["client_name"], "Bruno Vega");
}

#[tokio::test]
async fn http_errors_map_to_status_codes() {
    let app = TestApp::new().await;
    app.seed_parties().await;
    let order = app.create_order("CLI001", "EQ1", "TEC1").await;

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/work-orders",
            Some(create_body(None)),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .request(
            Method::GET,
            &format!("/api/v1/work-orders/{}", uuid::Uuid::new_v4()),
            None,
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not Found");

    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/api/v1/work-orders/{}/status", order.id),
            Some(json!({ "status": "SHIPPED" })),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .request(
            Method::PUT,
            &format!("/api/v1/work-orders/{}/technical-sheet", order.id),
            Some(json!({ "sheet_number": "FT-9", "findings": "Corroded port" })),
            &[],
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}
