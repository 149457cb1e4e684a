//! Stock never goes negative, however sales and adjustments interleave.

mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use futures::future::join_all;
use serde_json::json;

#[tokio::test]
async fn racing_sales_cannot_oversell() {
    let app = TestApp::new().await;
    let sugar = app.create_product("SUGAR-1", "1.80", "1.20", 3).await;

    let attempts = (0..6).map(|_| {
        app.checkout(json!({
            "items": [{ "product_id": sugar, "quantity": 1 }],
            "payment_method": "cash",
            "amount_paid": "2.00",
        }))
    });
    let replies = join_all(attempts).await;

    for reply in &replies {
        assert!(
            reply.status == StatusCode::CREATED || reply.status == StatusCode::UNPROCESSABLE_ENTITY,
            "unexpected {}: {}",
            reply.status,
            reply.body
        );
    }
    let sold = replies.iter().filter(|r| r.status == StatusCode::CREATED).count();
    let refused = replies
        .iter()
        .filter(|r| r.status == StatusCode::UNPROCESSABLE_ENTITY)
        .count();
    assert_eq!(sold, 3);
    assert_eq!(refused, 3);
    assert_eq!(app.product(sugar).await["stock_quantity"], 0);
}

#[tokio::test]
async fn manual_adjustments_are_recorded_and_bounded() {
    let app = TestApp::new().await;
    let sugar = app.create_product("SUGAR-1", "1.80", "1.20", 3).await;
    let uri = format!("/api/v1/products/{sugar}/stock-adjustments");

    let add = app
        .owner(
            Method::POST,
            &uri,
            Some(json!({ "quantity_change": 7, "note": "stock count" })),
        )
        .await;
    assert_eq!(add.status, StatusCode::OK, "{}", add.body);
    assert_eq!(add.data()["previous_quantity"], 3);
    assert_eq!(add.data()["new_quantity"], 10);

    let too_many = app
        .owner(
            Method::POST,
            &uri,
            Some(json!({ "quantity_change": -11, "note": "breakage" })),
        )
        .await;
    assert_eq!(too_many.status, StatusCode::UNPROCESSABLE_ENTITY);

    let zero = app
        .owner(Method::POST, &uri, Some(json!({ "quantity_change": 0, "note": "noop" })))
        .await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);

    let history = app
        .owner(Method::GET, &format!("/api/v1/products/{sugar}/stock-history"), None)
        .await;
    assert_eq!(history.data()["total"], 2);
    assert_eq!(app.product(sugar).await["stock_quantity"], 10);
}

#[tokio::test]
async fn low_stock_lists_products_at_or_below_minimum() {
    let app = TestApp::new().await;
    let sugar = app.create_product("SUGAR-1", "1.80", "1.20", 2).await;
    app.create_product("RICE-5", "12.50", "9.00", 40).await;

    let reply = app.owner(Method::GET, "/api/v1/products/low-stock", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    let low = reply.data().as_array().unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0]["id"], json!(sugar));
}

#[tokio::test]
async fn referenced_products_are_deactivated_instead_of_deleted() {
    let app = TestApp::new().await;
    let sold = app.create_product("SUGAR-1", "1.80", "1.20", 5).await;
    let unused = app.create_product("RICE-5", "12.50", "9.00", 5).await;
    app.checkout(json!({
        "items": [{ "product_id": sold, "quantity": 1 }],
        "payment_method": "cash",
        "amount_paid": "1.80",
    }))
    .await;

    let soft = app
        .owner(Method::DELETE, &format!("/api/v1/products/{sold}"), None)
        .await;
    assert_eq!(soft.status, StatusCode::OK, "{}", soft.body);
    assert_eq!(soft.data()["deleted"], false);
    assert_eq!(app.product(sold).await["is_active"], false);

    let hard = app
        .owner(Method::DELETE, &format!("/api/v1/products/{unused}"), None)
        .await;
    assert_eq!(hard.data()["deleted"], true);
    let gone = app
        .owner(Method::GET, &format!("/api/v1/products/{unused}"), None)
        .await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}
