//! Expenses and the reporting figures built on top of sales and costs.

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use common::{money, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn expenses_crud_and_category_summary() {
    let app = TestApp::new().await;

    for (category, amount) in [("rent", "300.00"), ("utilities", "45.50"), ("utilities", "20.00")] {
        let reply = app
            .owner(
                Method::POST,
                "/api/v1/expenses",
                Some(json!({ "category": category, "amount": amount })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    }

    let summary = app.owner(Method::GET, "/api/v1/expenses/summary", None).await;
    assert_eq!(summary.status, StatusCode::OK, "{}", summary.body);
    assert_eq!(money(&summary.data()["total"]), dec!(365.50));
    let categories = summary.data()["categories"].as_array().unwrap();
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[1]["category"], "utilities");
    assert_eq!(categories[1]["count"], 2);

    let filtered = app
        .owner(Method::GET, "/api/v1/expenses?category=rent", None)
        .await;
    assert_eq!(filtered.data()["total"], 1);
    let rent_id = filtered.data()["items"][0]["id"].as_str().unwrap().to_string();

    let updated = app
        .owner(
            Method::PUT,
            &format!("/api/v1/expenses/{rent_id}"),
            Some(json!({ "amount": "320.00" })),
        )
        .await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(money(&updated.data()["amount"]), dec!(320.00));

    let deleted = app
        .owner(Method::DELETE, &format!("/api/v1/expenses/{rent_id}"), None)
        .await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    let gone = app
        .owner(Method::GET, &format!("/api/v1/expenses/{rent_id}"), None)
        .await;
    assert_eq!(gone.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_positive_expense_is_rejected() {
    let app = TestApp::new().await;
    let reply = app
        .owner(
            Method::POST,
            "/api/v1/expenses",
            Some(json!({ "category": "rent", "amount": "0" })),
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dashboard_combines_sales_debt_costs_and_expenses() {
    let app = TestApp::new().await;
    let rice = app.create_product("RICE-5", "12.50", "9.00", 20).await;
    let oil = app.create_product("OIL-1", "10.00", "7.00", 1).await;
    let kofi = app.create_customer("Kofi", None).await;

    app.checkout(json!({
        "items": [{ "product_id": rice, "quantity": 2 }],
        "payment_method": "cash",
        "amount_paid": "25.00",
    }))
    .await;
    app.checkout(json!({
        "items": [{ "product_id": oil, "quantity": 1 }],
        "customer_id": kofi,
        "payment_method": "debt",
        "amount_paid": "0",
    }))
    .await;
    app.owner(
        Method::POST,
        "/api/v1/expenses",
        Some(json!({ "category": "transport", "amount": "5.00" })),
    )
    .await;

    let reply = app.owner(Method::GET, "/api/v1/reports/dashboard", None).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.body);
    let d = reply.data();
    assert_eq!(money(&d["revenue"]), dec!(35.00));
    assert_eq!(d["transaction_count"], 2);
    assert_eq!(money(&d["average_ticket"]), dec!(17.50));
    assert_eq!(money(&d["cash_collected"]), dec!(25.00));
    assert_eq!(money(&d["outstanding_debt"]), dec!(10.00));
    assert_eq!(money(&d["cost_of_goods_sold"]), dec!(25.00));
    assert_eq!(money(&d["gross_profit"]), dec!(10.00));
    assert_eq!(money(&d["expenses_total"]), dec!(5.00));
    assert_eq!(money(&d["net_profit"]), dec!(5.00));
    assert_eq!(d["low_stock_count"], 1);
}

#[tokio::test]
async fn daily_sales_and_top_products() {
    let app = TestApp::new().await;
    let rice = app.create_product("RICE-5", "12.50", "9.00", 20).await;
    let tea = app.create_product("TEA-100", "3.50", "2.40", 20).await;

    app.checkout(json!({
        "items": [
            { "product_id": rice, "quantity": 1 },
            { "product_id": tea, "quantity": 4 },
        ],
        "payment_method": "cash",
        "amount_paid": "30.00",
    }))
    .await;

    let today = Utc::now().date_naive();
    let from = today - Duration::days(6);
    let daily = app
        .owner(
            Method::GET,
            &format!("/api/v1/reports/daily-sales?from={from}&to={today}"),
            None,
        )
        .await;
    assert_eq!(daily.status, StatusCode::OK, "{}", daily.body);
    let days = daily.data().as_array().unwrap();
    assert_eq!(days.len(), 7);
    assert_eq!(money(&days[6]["revenue"]), dec!(26.50));
    assert_eq!(money(&days[0]["revenue"]), dec!(0));

    let top = app
        .owner(Method::GET, "/api/v1/reports/top-products?limit=1", None)
        .await;
    assert_eq!(top.status, StatusCode::OK);
    let ranked = top.data().as_array().unwrap();
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0]["product_id"], json!(tea));
    assert_eq!(ranked[0]["quantity_sold"], 4);
}

#[tokio::test]
async fn inverted_report_range_is_rejected() {
    let app = TestApp::new().await;
    let reply = app
        .owner(
            Method::GET,
            "/api/v1/reports/dashboard?from=2026-03-10&to=2026-03-01",
            None,
        )
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
}
