//! Credit sales, debt collection and the customer ledger.

mod common;

use axum::http::{Method, StatusCode};
use common::{money, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

async fn credit_sale(app: &TestApp, product: Uuid, customer: Uuid, qty: i32, paid: &str) -> String {
    let reply = app
        .checkout(json!({
            "items": [{ "product_id": product, "quantity": qty }],
            "customer_id": customer,
            "payment_method": "debt",
            "amount_paid": paid,
        }))
        .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    reply.data()["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn debt_sale_opens_balance_on_customer() {
    let app = TestApp::new().await;
    let oil = app.create_product("OIL-1", "10.00", "7.00", 20).await;
    let kofi = app.create_customer("Kofi", Some("100.00")).await;

    let sale_id = credit_sale(&app, oil, kofi, 3, "5.00").await;

    let sale = app
        .owner(Method::GET, &format!("/api/v1/transactions/{sale_id}"), None)
        .await;
    assert_eq!(sale.data()["status"], "debt_pending");
    assert_eq!(money(&sale.data()["outstanding_balance"]), dec!(25.00));

    let customer = app.customer(kofi).await;
    assert_eq!(money(&customer["outstanding_balance"]), dec!(25.00));
    assert_eq!(money(&customer["available_credit"]), dec!(75.00));
}

#[tokio::test]
async fn debt_sale_requires_customer() {
    let app = TestApp::new().await;
    let oil = app.create_product("OIL-1", "10.00", "7.00", 20).await;

    let reply = app
        .checkout(json!({
            "items": [{ "product_id": oil, "quantity": 1 }],
            "payment_method": "debt",
            "amount_paid": "0",
        }))
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn credit_limit_blocks_new_debt() {
    let app = TestApp::new().await;
    let oil = app.create_product("OIL-1", "10.00", "7.00", 50).await;
    let kofi = app.create_customer("Kofi", Some("30.00")).await;

    credit_sale(&app, oil, kofi, 2, "0").await;
    let reply = app
        .checkout(json!({
            "items": [{ "product_id": oil, "quantity": 2 }],
            "customer_id": kofi,
            "payment_method": "debt",
            "amount_paid": "0",
        }))
        .await;

    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY, "{}", reply.body);
    assert_eq!(money(&app.customer(kofi).await["outstanding_balance"]), dec!(20.00));
    assert_eq!(app.product(oil).await["stock_quantity"], 48);
}

#[tokio::test]
async fn payments_reduce_balance_until_settled() {
    let app = TestApp::new().await;
    let oil = app.create_product("OIL-1", "10.00", "7.00", 20).await;
    let kofi = app.create_customer("Kofi", None).await;
    let sale_id = credit_sale(&app, oil, kofi, 4, "0").await;
    let uri = format!("/api/v1/transactions/{sale_id}/payments");

    let partial = app
        .owner(
            Method::POST,
            &uri,
            Some(json!({ "amount": "15.00", "payment_method": "cash" })),
        )
        .await;
    assert_eq!(partial.status, StatusCode::CREATED, "{}", partial.body);
    assert_eq!(money(&partial.data()["transaction"]["outstanding_balance"]), dec!(25.00));

    let over = app
        .owner(
            Method::POST,
            &uri,
            Some(json!({ "amount": "30.00", "payment_method": "cash" })),
        )
        .await;
    assert_eq!(over.status, StatusCode::BAD_REQUEST);

    let rest = app
        .owner(
            Method::POST,
            &uri,
            Some(json!({ "amount": "25.00", "payment_method": "mobile" })),
        )
        .await;
    assert_eq!(rest.status, StatusCode::CREATED);
    assert_eq!(rest.data()["transaction"]["status"], "completed");
    assert_eq!(money(&rest.data()["customer"]["outstanding_balance"]), dec!(0));

    let history = app.owner(Method::GET, &uri, None).await;
    assert_eq!(history.data().as_array().map(Vec::len), Some(2));

    let again = app
        .owner(
            Method::POST,
            &uri,
            Some(json!({ "amount": "1.00", "payment_method": "cash" })),
        )
        .await;
    assert_eq!(again.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn ledger_and_open_debts_match_balances() {
    let app = TestApp::new().await;
    let oil = app.create_product("OIL-1", "10.00", "7.00", 20).await;
    let kofi = app.create_customer("Kofi", None).await;
    let first = credit_sale(&app, oil, kofi, 2, "0").await;
    credit_sale(&app, oil, kofi, 1, "0").await;

    app.owner(
        Method::POST,
        &format!("/api/v1/transactions/{first}/payments"),
        Some(json!({ "amount": "20.00", "payment_method": "cash" })),
    )
    .await;

    let ledger = app
        .owner(Method::GET, &format!("/api/v1/customers/{kofi}/ledger"), None)
        .await;
    assert_eq!(ledger.status, StatusCode::OK, "{}", ledger.body);
    assert_eq!(money(&ledger.data()["total_debt"]), dec!(30.00));
    assert_eq!(money(&ledger.data()["total_paid"]), dec!(20.00));
    assert_eq!(money(&ledger.data()["outstanding"]), dec!(10.00));

    let debts = app
        .owner(Method::GET, &format!("/api/v1/customers/{kofi}/debts"), None)
        .await;
    assert_eq!(debts.data()["open_transactions"].as_array().map(Vec::len), Some(1));

    let open = app.owner(Method::GET, "/api/v1/debts", None).await;
    assert_eq!(open.data()["total"], 1);
}

#[tokio::test]
async fn reconcile_reports_no_drift_for_consistent_books() {
    let app = TestApp::new().await;
    let oil = app.create_product("OIL-1", "10.00", "7.00", 20).await;
    let kofi = app.create_customer("Kofi", None).await;
    credit_sale(&app, oil, kofi, 2, "5.00").await;

    let report = app
        .owner(Method::POST, &format!("/api/v1/customers/{kofi}/reconcile"), None)
        .await;
    assert_eq!(report.status, StatusCode::OK, "{}", report.body);
    assert_eq!(money(&report.data()["computed_balance"]), dec!(15.00));
    assert_eq!(money(&report.data()["drift"]), dec!(0));
    assert_eq!(report.data()["corrected"], false);
}

#[tokio::test]
async fn customer_with_debt_cannot_be_deleted() {
    let app = TestApp::new().await;
    let oil = app.create_product("OIL-1", "10.00", "7.00", 20).await;
    let kofi = app.create_customer("Kofi", None).await;
    let ama = app.create_customer("Ama", None).await;
    credit_sale(&app, oil, kofi, 1, "0").await;

    let refused = app
        .owner(Method::DELETE, &format!("/api/v1/customers/{kofi}"), None)
        .await;
    assert_eq!(refused.status, StatusCode::BAD_REQUEST);

    let deleted = app
        .owner(Method::DELETE, &format!("/api/v1/customers/{ama}"), None)
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
}
