//! Authentication, staff accounts and role-based access.

mod common;

use axum::http::{Method, StatusCode};
use common::TestApp;
use rstest::rstest;
use serde_json::json;

#[tokio::test]
async fn requests_without_a_token_are_unauthorized() {
    let app = TestApp::new().await;
    let reply = app.send(Method::GET, "/api/v1/products", None, None).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let garbage = app
        .send(Method::GET, "/api/v1/products", Some("not-a-jwt"), None)
        .await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_refresh_and_me() {
    let app = TestApp::new().await;

    let bad = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "owner@corner.shop", "password": "wrong-password" })),
        )
        .await;
    assert_eq!(bad.status, StatusCode::UNAUTHORIZED);

    let login = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "Owner@Corner.Shop", "password": "password123" })),
        )
        .await;
    assert_eq!(login.status, StatusCode::OK, "{}", login.body);
    let refresh_token = login.data()["tokens"]["refresh_token"].as_str().unwrap().to_string();

    let refreshed = app
        .send(
            Method::POST,
            "/api/v1/auth/refresh",
            None,
            Some(json!({ "refresh_token": refresh_token })),
        )
        .await;
    assert_eq!(refreshed.status, StatusCode::OK, "{}", refreshed.body);
    let access = refreshed.data()["access_token"].as_str().unwrap().to_string();

    let me = app.send(Method::GET, "/api/v1/auth/me", Some(&access), None).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.data()["user"]["role"], "owner");
    assert_eq!(me.data()["tenant"]["name"], "Corner Shop");

    // A refresh token is not an access token.
    let misuse = app
        .send(Method::GET, "/api/v1/auth/me", Some(&refresh_token), None)
        .await;
    assert_eq!(misuse.status, StatusCode::UNAUTHORIZED);
}

#[rstest]
#[case(Method::GET, "/api/v1/reports/dashboard")]
#[case(Method::GET, "/api/v1/purchase-orders")]
#[case(Method::GET, "/api/v1/users")]
#[case(Method::POST, "/api/v1/expenses")]
#[tokio::test]
async fn cashier_is_forbidden_from_back_office(#[case] method: Method, #[case] uri: &str) {
    let app = TestApp::new().await;
    let cashier = app.staff_token("cashier@corner.shop", "cashier").await;

    let body = (method == Method::POST).then(|| json!({ "category": "rent", "amount": "1.00" }));
    let reply = app.send(method, uri, Some(&cashier), body).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN, "{uri}: {}", reply.body);
}

#[tokio::test]
async fn cashier_can_sell_and_collect_debt() {
    let app = TestApp::new().await;
    let rice = app.create_product("RICE-5", "12.50", "9.00", 10).await;
    let cashier = app.staff_token("cashier@corner.shop", "cashier").await;

    let sale = app
        .send(
            Method::POST,
            "/api/v1/checkout",
            Some(&cashier),
            Some(json!({
                "items": [{ "product_id": rice, "quantity": 1 }],
                "payment_method": "cash",
                "amount_paid": "12.50",
            })),
        )
        .await;
    assert_eq!(sale.status, StatusCode::CREATED, "{}", sale.body);

    let adjust = app
        .send(
            Method::POST,
            &format!("/api/v1/products/{rice}/stock-adjustments"),
            Some(&cashier),
            Some(json!({ "quantity_change": 5, "note": "found a box" })),
        )
        .await;
    assert_eq!(adjust.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn deactivated_staff_are_locked_out() {
    let app = TestApp::new().await;
    let token = app.staff_token("cashier@corner.shop", "cashier").await;

    let users = app.owner(Method::GET, "/api/v1/users", None).await;
    let cashier = users
        .data()
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["email"] == "cashier@corner.shop")
        .cloned()
        .unwrap();
    assert!(cashier.get("password_hash").is_none());

    let id = cashier["id"].as_str().unwrap();
    let off = app
        .owner(
            Method::PUT,
            &format!("/api/v1/users/{id}/active"),
            Some(json!({ "active": false })),
        )
        .await;
    assert_eq!(off.status, StatusCode::OK, "{}", off.body);

    let login = app
        .send(
            Method::POST,
            "/api/v1/auth/login",
            None,
            Some(json!({ "email": "cashier@corner.shop", "password": "password123" })),
        )
        .await;
    assert_eq!(login.status, StatusCode::FORBIDDEN);

    // a token issued before deactivation stops working too
    let me = app.send(Method::GET, "/api/v1/auth/me", Some(&token), None).await;
    assert_eq!(me.status, StatusCode::FORBIDDEN);
    let listed = app.send(Method::GET, "/api/v1/transactions", Some(&token), None).await;
    assert_eq!(listed.status, StatusCode::FORBIDDEN);

    let on = app
        .owner(
            Method::PUT,
            &format!("/api/v1/users/{id}/active"),
            Some(json!({ "active": true })),
        )
        .await;
    assert_eq!(on.status, StatusCode::OK, "{}", on.body);
    let me = app.send(Method::GET, "/api/v1/auth/me", Some(&token), None).await;
    assert_eq!(me.status, StatusCode::OK);
}

#[tokio::test]
async fn a_second_owner_cannot_be_created() {
    let app = TestApp::new().await;
    let reply = app
        .owner(
            Method::POST,
            "/api/v1/users",
            Some(json!({
                "name": "Usurper",
                "email": "usurper@corner.shop",
                "password": "password123",
                "role": "owner",
            })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}
