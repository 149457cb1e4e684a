//! Cart quoting and checkout through the HTTP surface.

mod common;

use axum::http::{Method, StatusCode};
use common::{money, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn quote_prices_cart_without_touching_stock() {
    let app = TestApp::new().await;
    let rice = app.create_product("RICE-5", "12.50", "9.00", 10).await;

    let reply = app
        .owner(
            Method::POST,
            "/api/v1/cart/quote",
            Some(json!({
                "items": [{ "product_id": rice, "quantity": 2 }],
                "discount": "5.00",
                "tax_rate": "0.10",
            })),
        )
        .await;

    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    let totals = reply.data();
    assert_eq!(money(&totals["subtotal"]), dec!(25.00));
    assert_eq!(money(&totals["tax"]), dec!(2.00));
    assert_eq!(money(&totals["total"]), dec!(22.00));
    assert_eq!(app.product(rice).await["stock_quantity"], 10);
}

#[tokio::test]
async fn cash_checkout_records_sale_change_and_stock() {
    let app = TestApp::new().await;
    let rice = app.create_product("RICE-5", "12.50", "9.00", 10).await;
    let oil = app.create_product("OIL-1", "4.20", "3.10", 5).await;

    let reply = app
        .checkout(json!({
            "items": [
                { "product_id": rice, "quantity": 2 },
                { "product_id": oil, "quantity": 1 },
            ],
            "payment_method": "cash",
            "amount_paid": "50.00",
        }))
        .await;

    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    let sale = reply.data();
    assert_eq!(money(&sale["total_amount"]), dec!(29.20));
    assert_eq!(money(&sale["amount_paid"]), dec!(29.20));
    assert_eq!(money(&sale["change_amount"]), dec!(20.80));
    assert_eq!(money(&sale["outstanding_balance"]), dec!(0));
    assert_eq!(sale["status"], "completed");
    assert_eq!(sale["items"].as_array().map(Vec::len), Some(2));
    assert!(sale["receipt_number"].as_str().unwrap().starts_with("RCP-"));

    assert_eq!(app.product(rice).await["stock_quantity"], 8);
    assert_eq!(app.product(oil).await["stock_quantity"], 4);

    let history = app
        .owner(Method::GET, &format!("/api/v1/products/{rice}/stock-history"), None)
        .await;
    assert_eq!(history.status, StatusCode::OK);
    let kinds: Vec<_> = history.data()["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|h| h["change_type"].as_str().unwrap_or_default().to_string())
        .collect();
    assert!(kinds.iter().any(|k| k == "sale"), "history: {kinds:?}");
}

#[tokio::test]
async fn underpaid_cash_sale_is_rejected() {
    let app = TestApp::new().await;
    let rice = app.create_product("RICE-5", "12.50", "9.00", 10).await;

    let reply = app
        .checkout(json!({
            "items": [{ "product_id": rice, "quantity": 2 }],
            "payment_method": "cash",
            "amount_paid": "20.00",
        }))
        .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.product(rice).await["stock_quantity"], 10);
}

#[tokio::test]
async fn checkout_beyond_stock_fails_and_leaves_stock_untouched() {
    let app = TestApp::new().await;
    let rice = app.create_product("RICE-5", "12.50", "9.00", 3).await;
    let oil = app.create_product("OIL-1", "4.20", "3.10", 5).await;

    let reply = app
        .checkout(json!({
            "items": [
                { "product_id": oil, "quantity": 2 },
                { "product_id": rice, "quantity": 4 },
            ],
            "payment_method": "card",
            "amount_paid": "100.00",
        }))
        .await;

    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY, "{}", reply.body);
    assert_eq!(app.product(rice).await["stock_quantity"], 3);
    assert_eq!(app.product(oil).await["stock_quantity"], 5);
}

#[tokio::test]
async fn empty_cart_and_zero_quantity_are_rejected() {
    let app = TestApp::new().await;
    let rice = app.create_product("RICE-5", "12.50", "9.00", 3).await;

    let empty = app
        .checkout(json!({ "items": [], "payment_method": "cash", "amount_paid": "1.00" }))
        .await;
    assert_eq!(empty.status, StatusCode::BAD_REQUEST);

    let zero = app
        .checkout(json!({
            "items": [{ "product_id": rice, "quantity": 0 }],
            "payment_method": "cash",
            "amount_paid": "1.00",
        }))
        .await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn idempotent_checkout_replays_first_response() {
    let app = TestApp::new().await;
    let rice = app.create_product("RICE-5", "12.50", "9.00", 10).await;
    let body = json!({
        "items": [{ "product_id": rice, "quantity": 1 }],
        "payment_method": "cash",
        "amount_paid": "20.00",
    });
    let bearer = format!("Bearer {}", app.token);
    let headers = [("idempotency-key", "sale-42"), ("authorization", bearer.as_str())];

    let first = app
        .send_with_headers(Method::POST, "/api/v1/checkout", None, Some(body.clone()), &headers)
        .await;
    let second = app
        .send_with_headers(Method::POST, "/api/v1/checkout", None, Some(body), &headers)
        .await;

    assert_eq!(first.status, StatusCode::CREATED, "{}", first.body);
    assert_eq!(second.status, StatusCode::CREATED);
    assert_eq!(first.data()["id"], second.data()["id"]);
    assert_eq!(app.product(rice).await["stock_quantity"], 9);
}

#[tokio::test]
async fn transactions_are_listed_and_fetched() {
    let app = TestApp::new().await;
    let rice = app.create_product("RICE-5", "12.50", "9.00", 10).await;
    let sale = app
        .checkout(json!({
            "items": [{ "product_id": rice, "quantity": 1 }],
            "payment_method": "mobile",
            "amount_paid": "12.50",
        }))
        .await;
    let id = sale.data()["id"].as_str().unwrap().to_string();

    let list = app.owner(Method::GET, "/api/v1/transactions?limit=5", None).await;
    assert_eq!(list.status, StatusCode::OK);
    assert_eq!(list.data()["total"], 1);

    let found = app
        .owner(Method::GET, &format!("/api/v1/transactions/{id}"), None)
        .await;
    assert_eq!(found.status, StatusCode::OK);
    assert_eq!(found.data()["payment_method"], "mobile");
}
