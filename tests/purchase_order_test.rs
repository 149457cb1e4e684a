//! Supplier purchase orders and receiving stock.

mod common;

use axum::http::{Method, StatusCode};
use common::{money, TestApp};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

async fn order(app: &TestApp, product: Uuid, quantity: i32, unit_cost: &str) -> Value {
    let reply = app
        .owner(
            Method::POST,
            "/api/v1/purchase-orders",
            Some(json!({
                "supplier_name": "Accra Wholesale",
                "items": [{ "product_id": product, "quantity": quantity, "unit_cost": unit_cost }],
                "expected_date": "2026-11-01",
            })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    reply.data().clone()
}

#[tokio::test]
async fn receiving_adds_stock_and_updates_cost() {
    let app = TestApp::new().await;
    let sugar = app.create_product("SUGAR-1", "1.80", "1.20", 4).await;

    let po = order(&app, sugar, 24, "1.10").await;
    assert_eq!(po["status"], "pending");
    assert_eq!(money(&po["total_cost"]), dec!(26.40));
    assert!(po["po_number"].as_str().unwrap().starts_with("PO-"));
    assert_eq!(app.product(sugar).await["stock_quantity"], 4);

    let id = po["id"].as_str().unwrap();
    let received = app
        .owner(
            Method::POST,
            &format!("/api/v1/purchase-orders/{id}/receive"),
            Some(json!({ "update_cost_price": true })),
        )
        .await;
    assert_eq!(received.status, StatusCode::OK, "{}", received.body);
    assert_eq!(received.data()["status"], "received");

    let product = app.product(sugar).await;
    assert_eq!(product["stock_quantity"], 28);
    assert_eq!(money(&product["cost_price"]), dec!(1.10));
}

#[tokio::test]
async fn receiving_without_cost_update_keeps_cost_price() {
    let app = TestApp::new().await;
    let sugar = app.create_product("SUGAR-1", "1.80", "1.20", 0).await;
    let po = order(&app, sugar, 10, "1.00").await;
    let id = po["id"].as_str().unwrap();

    let received = app
        .owner(Method::POST, &format!("/api/v1/purchase-orders/{id}/receive"), None)
        .await;
    assert_eq!(received.status, StatusCode::OK, "{}", received.body);

    let product = app.product(sugar).await;
    assert_eq!(product["stock_quantity"], 10);
    assert_eq!(money(&product["cost_price"]), dec!(1.20));
}

#[tokio::test]
async fn received_and_cancelled_orders_are_terminal() {
    let app = TestApp::new().await;
    let sugar = app.create_product("SUGAR-1", "1.80", "1.20", 0).await;

    let received = order(&app, sugar, 5, "1.00").await;
    let received_id = received["id"].as_str().unwrap();
    app.owner(Method::POST, &format!("/api/v1/purchase-orders/{received_id}/receive"), None)
        .await;
    let again = app
        .owner(Method::POST, &format!("/api/v1/purchase-orders/{received_id}/receive"), None)
        .await;
    assert_eq!(again.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.product(sugar).await["stock_quantity"], 5);

    let cancelled = order(&app, sugar, 5, "1.00").await;
    let cancelled_id = cancelled["id"].as_str().unwrap();
    let cancel = app
        .owner(Method::POST, &format!("/api/v1/purchase-orders/{cancelled_id}/cancel"), None)
        .await;
    assert_eq!(cancel.status, StatusCode::OK);
    assert_eq!(cancel.data()["status"], "cancelled");

    let receive = app
        .owner(Method::POST, &format!("/api/v1/purchase-orders/{cancelled_id}/receive"), None)
        .await;
    assert_eq!(receive.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.product(sugar).await["stock_quantity"], 5);
}

#[tokio::test]
async fn order_lines_must_be_positive() {
    let app = TestApp::new().await;
    let sugar = app.create_product("SUGAR-1", "1.80", "1.20", 0).await;

    let reply = app
        .owner(
            Method::POST,
            "/api/v1/purchase-orders",
            Some(json!({
                "supplier_name": "Accra Wholesale",
                "items": [{ "product_id": sugar, "quantity": 0, "unit_cost": "1.00" }],
            })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let list = app.owner(Method::GET, "/api/v1/purchase-orders", None).await;
    assert_eq!(list.data()["total"], 0);
}
