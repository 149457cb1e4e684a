//! Return requests: creation, review and reversal.

mod common;

use axum::http::{Method, StatusCode};
use common::{money, Reply, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

struct Sold {
    product: Uuid,
    customer: Uuid,
    sale: Value,
}

/// Sells 4 units at 10.00 on credit, 10.00 paid upfront.
async fn credit_sale(app: &TestApp) -> Sold {
    let product = app.create_product("TEA-100", "10.00", "6.00", 10).await;
    let customer = app.create_customer("Kofi", None).await;
    let reply = app
        .checkout(json!({
            "items": [{ "product_id": product, "quantity": 4 }],
            "customer_id": customer,
            "payment_method": "debt",
            "amount_paid": "10.00",
        }))
        .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    Sold {
        product,
        customer,
        sale: reply.data().clone(),
    }
}

async fn request_return(app: &TestApp, sold: &Sold, quantity: i32) -> (StatusCode, Value) {
    let reply = app
        .owner(
            Method::POST,
            "/api/v1/returns",
            Some(json!({
                "transaction_id": sold.sale["id"],
                "items": [{ "transaction_item_id": sold.sale["items"][0]["id"], "quantity": quantity }],
                "reason": "damaged packaging",
            })),
        )
        .await;
    (reply.status, reply.data().clone())
}

#[tokio::test]
async fn pending_return_changes_nothing_until_approved() {
    let app = TestApp::new().await;
    let sold = credit_sale(&app).await;

    let (status, ret) = request_return(&app, &sold, 1).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(ret["status"], "pending");
    assert_eq!(money(&ret["refund_amount"]), dec!(10.00));

    assert_eq!(app.product(sold.product).await["stock_quantity"], 6);
    assert_eq!(money(&app.customer(sold.customer).await["outstanding_balance"]), dec!(30.00));
}

#[tokio::test]
async fn approval_restocks_and_credits_debt() {
    let app = TestApp::new().await;
    let sold = credit_sale(&app).await;
    let (_, ret) = request_return(&app, &sold, 2).await;
    let id = ret["id"].as_str().unwrap();

    let approved = app
        .owner(
            Method::POST,
            &format!("/api/v1/returns/{id}/approve"),
            Some(json!({ "note": "checked" })),
        )
        .await;
    assert_eq!(approved.status, StatusCode::OK, "{}", approved.body);
    assert_eq!(approved.data()["status"], "approved");
    assert_eq!(money(&approved.data()["debt_credit"]), dec!(20.00));

    assert_eq!(app.product(sold.product).await["stock_quantity"], 8);
    assert_eq!(money(&app.customer(sold.customer).await["outstanding_balance"]), dec!(10.00));

    let sale = app
        .owner(
            Method::GET,
            &format!("/api/v1/transactions/{}", sold.sale["id"].as_str().unwrap()),
            None,
        )
        .await;
    assert_eq!(money(&sale.data()["refunded_amount"]), dec!(20.00));
    assert_eq!(money(&sale.data()["outstanding_balance"]), dec!(10.00));

    let twice = app
        .owner(Method::POST, &format!("/api/v1/returns/{id}/approve"), None)
        .await;
    assert_eq!(twice.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn return_cannot_exceed_sold_quantity() {
    let app = TestApp::new().await;
    let sold = credit_sale(&app).await;

    let (status, _) = request_return(&app, &sold, 5).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, first) = request_return(&app, &sold, 3).await;
    let id = first["id"].as_str().unwrap();
    app.owner(Method::POST, &format!("/api/v1/returns/{id}/approve"), None)
        .await;

    let (status, _) = request_return(&app, &sold, 2).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rejection_is_final_and_has_no_effect() {
    let app = TestApp::new().await;
    let sold = credit_sale(&app).await;
    let (_, ret) = request_return(&app, &sold, 1).await;
    let id = ret["id"].as_str().unwrap();

    let rejected = app
        .owner(Method::POST, &format!("/api/v1/returns/{id}/reject"), None)
        .await;
    assert_eq!(rejected.status, StatusCode::OK, "{}", rejected.body);
    assert_eq!(rejected.data()["status"], "rejected");

    let approve = app
        .owner(Method::POST, &format!("/api/v1/returns/{id}/approve"), None)
        .await;
    assert_eq!(approve.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.product(sold.product).await["stock_quantity"], 6);
}

#[tokio::test]
async fn revert_restores_stock_and_debt() {
    let app = TestApp::new().await;
    let sold = credit_sale(&app).await;
    let (_, ret) = request_return(&app, &sold, 2).await;
    let id = ret["id"].as_str().unwrap();
    app.owner(Method::POST, &format!("/api/v1/returns/{id}/approve"), None)
        .await;

    let reverted = app
        .owner(Method::POST, &format!("/api/v1/returns/{id}/revert"), None)
        .await;
    assert_eq!(reverted.status, StatusCode::OK, "{}", reverted.body);
    assert_eq!(reverted.data()["status"], "pending");

    assert_eq!(app.product(sold.product).await["stock_quantity"], 6);
    let customer = app.customer(sold.customer).await;
    assert_eq!(money(&customer["outstanding_balance"]), dec!(30.00));
    assert_eq!(money(&customer["total_purchases"]), dec!(40.00));

    let listed = app.owner(Method::GET, "/api/v1/returns?status=pending", None).await;
    assert_eq!(listed.data()["total"], 1);
}

#[tokio::test]
async fn cashier_may_request_but_not_review() {
    let app = TestApp::new().await;
    let sold = credit_sale(&app).await;
    let cashier = app.staff_token("cashier@corner.shop", "cashier").await;

    let created = app
        .send(
            Method::POST,
            "/api/v1/returns",
            Some(&cashier),
            Some(json!({
                "transaction_id": sold.sale["id"],
                "items": [{ "transaction_item_id": sold.sale["items"][0]["id"], "quantity": 1 }],
                "reason": "wrong flavour",
            })),
        )
        .await;
    assert_eq!(created.status, StatusCode::CREATED, "{}", created.body);

    let id = created.data()["id"].as_str().unwrap();
    let review = app
        .send(
            Method::POST,
            &format!("/api/v1/returns/{id}/approve"),
            Some(&cashier),
            None,
        )
        .await;
    assert_eq!(review.status, StatusCode::FORBIDDEN);
}

async fn return_lines(app: &TestApp, sale: &Value, quantity: i32) -> Reply {
    app.owner(
        Method::POST,
        "/api/v1/returns",
        Some(json!({
            "transaction_id": sale["id"],
            "items": [{ "transaction_item_id": sale["items"][0]["id"], "quantity": quantity }],
            "reason": "customer changed their mind",
        })),
    )
    .await
}

#[tokio::test]
async fn refunds_honour_the_order_discount() {
    let app = TestApp::new().await;
    let soap = app.create_product("SOAP-1", "10.00", "6.00", 20).await;
    let reply = app
        .checkout(json!({
            "items": [{ "product_id": soap, "quantity": 10 }],
            "payment_method": "cash",
            "discount": "50.00",
            "amount_paid": "50.00",
        }))
        .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    let sale = reply.data().clone();
    assert_eq!(money(&sale["total_amount"]), dec!(50.00));

    let part = return_lines(&app, &sale, 4).await;
    assert_eq!(part.status, StatusCode::CREATED, "{}", part.body);
    assert_eq!(money(&part.data()["refund_amount"]), dec!(20.00));

    let rest = return_lines(&app, &sale, 6).await;
    assert_eq!(rest.status, StatusCode::CREATED, "{}", rest.body);
    assert_eq!(money(&rest.data()["refund_amount"]), dec!(30.00));

    for ret in [&part, &rest] {
        let id = ret.data()["id"].as_str().unwrap();
        let approved = app
            .owner(Method::POST, &format!("/api/v1/returns/{id}/approve"), None)
            .await;
        assert_eq!(approved.status, StatusCode::OK, "{}", approved.body);
    }

    let stored = app
        .owner(
            Method::GET,
            &format!("/api/v1/transactions/{}", sale["id"].as_str().unwrap()),
            None,
        )
        .await;
    assert_eq!(money(&stored.data()["refunded_amount"]), dec!(50.00));
}

#[tokio::test]
async fn returning_a_taxed_credit_sale_clears_the_debt() {
    let app = TestApp::new().await;
    let soap = app.create_product("SOAP-1", "10.00", "6.00", 20).await;
    let kofi = app.create_customer("Kofi", None).await;
    let reply = app
        .checkout(json!({
            "items": [{ "product_id": soap, "quantity": 10 }],
            "customer_id": kofi,
            "payment_method": "debt",
            "tax_rate": "0.10",
            "amount_paid": "0.00",
        }))
        .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    let sale = reply.data().clone();
    assert_eq!(money(&sale["total_amount"]), dec!(110.00));

    let ret = return_lines(&app, &sale, 10).await;
    assert_eq!(money(&ret.data()["refund_amount"]), dec!(110.00));
    let id = ret.data()["id"].as_str().unwrap();
    let approved = app
        .owner(Method::POST, &format!("/api/v1/returns/{id}/approve"), None)
        .await;
    assert_eq!(approved.status, StatusCode::OK, "{}", approved.body);
    assert_eq!(money(&approved.data()["debt_credit"]), dec!(110.00));

    let customer = app.customer(kofi).await;
    assert_eq!(money(&customer["outstanding_balance"]), Decimal::ZERO);
    assert_eq!(money(&customer["total_purchases"]), Decimal::ZERO);

    let ledger = app
        .owner(Method::GET, &format!("/api/v1/customers/{kofi}/ledger"), None)
        .await;
    assert_eq!(money(&ledger.data()["returned_credit"]), dec!(110.00));
    assert_eq!(ledger.data()["balanced"], true);
}

#[tokio::test]
async fn revert_is_refused_once_the_restocked_goods_are_sold() {
    let app = TestApp::new().await;
    let sold = credit_sale(&app).await;
    let (_, ret) = request_return(&app, &sold, 2).await;
    let id = ret["id"].as_str().unwrap();
    app.owner(Method::POST, &format!("/api/v1/returns/{id}/approve"), None)
        .await;
    assert_eq!(app.product(sold.product).await["stock_quantity"], 8);

    let resale = app
        .checkout(json!({
            "items": [{ "product_id": sold.product, "quantity": 8 }],
            "payment_method": "cash",
            "amount_paid": "80.00",
        }))
        .await;
    assert_eq!(resale.status, StatusCode::CREATED, "{}", resale.body);

    let reverted = app
        .owner(Method::POST, &format!("/api/v1/returns/{id}/revert"), None)
        .await;
    assert_eq!(reverted.status, StatusCode::UNPROCESSABLE_ENTITY, "{}", reverted.body);

    assert_eq!(app.product(sold.product).await["stock_quantity"], 0);
    assert_eq!(money(&app.customer(sold.customer).await["outstanding_balance"]), dec!(10.00));
    let still = app.owner(Method::GET, &format!("/api/v1/returns/{id}"), None).await;
    assert_eq!(still.data()["status"], "approved");
}
