#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use retail_pos_api::{build_router, config::AppConfig, db, events, AppState};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

const TEST_SECRET: &str = "integration_test_secret_that_is_long_enough_0123";

/// A full application backed by a throwaway SQLite file.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    /// Owner token of the shop registered at startup
    pub token: String,
    pub tenant_id: Uuid,
    _dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

/// Status plus decoded JSON body of a response.
pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
}

impl Reply {
    /// The `data` field of the success envelope.
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_owner("owner@corner.shop").await
    }

    pub async fn with_owner(email: &str) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("pos.db").display());

        let mut cfg = AppConfig::new(url, TEST_SECRET);
        cfg.environment = "test".to_string();
        // several connections, so concurrent requests contend for real
        cfg.db_max_connections = 8;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("connect test database");
        db::run_migrations(&pool).await.expect("run migrations");

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));
        let state = AppState::new(Arc::new(pool), cfg, events::EventSender::new(event_tx));
        let router = build_router(state.clone());

        let mut app = Self {
            router,
            state,
            token: String::new(),
            tenant_id: Uuid::nil(),
            _dir: dir,
            _event_task: event_task,
        };

        let session = app.register_shop("Corner Shop", email).await;
        app.token = session["tokens"]["access_token"]
            .as_str()
            .expect("access token")
            .to_string();
        app.tenant_id = uuid_of(&session["tenant"]["id"]);
        app
    }

    /// Registers another shop and returns its session payload.
    pub async fn register_shop(&self, business: &str, email: &str) -> Value {
        let reply = self
            .send(
                Method::POST,
                "/api/v1/auth/register",
                None,
                Some(json!({
                    "name": "Owner",
                    "email": email,
                    "password": "password123",
                    "business_name": business,
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "register: {}", reply.body);
        reply.data().clone()
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Reply {
        self.send_with_headers(method, uri, token, body, &[]).await
    }

    pub async fn send_with_headers(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> Reply {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        decode(response).await
    }

    /// Sends a request as the shop owner.
    pub async fn owner(&self, method: Method, uri: &str, body: Option<Value>) -> Reply {
        self.send(method, uri, Some(&self.token), body).await
    }

    pub async fn create_product(&self, sku: &str, price: &str, cost: &str, stock: i32) -> Uuid {
        let reply = self
            .owner(
                Method::POST,
                "/api/v1/products",
                Some(json!({
                    "name": format!("Product {sku}"),
                    "sku": sku,
                    "price": price,
                    "cost_price": cost,
                    "initial_stock": stock,
                    "min_stock_level": 2,
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "create product: {}", reply.body);
        uuid_of(&reply.data()["id"])
    }

    pub async fn create_customer(&self, name: &str, credit_limit: Option<&str>) -> Uuid {
        let reply = self
            .owner(
                Method::POST,
                "/api/v1/customers",
                Some(json!({ "name": name, "credit_limit": credit_limit })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "create customer: {}", reply.body);
        uuid_of(&reply.data()["id"])
    }

    /// Creates a staff account and logs it in, returning its access token.
    pub async fn staff_token(&self, email: &str, role: &str) -> String {
        let reply = self
            .owner(
                Method::POST,
                "/api/v1/users",
                Some(json!({
                    "name": "Staff",
                    "email": email,
                    "password": "password123",
                    "role": role,
                })),
            )
            .await;
        assert_eq!(reply.status, StatusCode::CREATED, "create user: {}", reply.body);

        let login = self
            .send(
                Method::POST,
                "/api/v1/auth/login",
                None,
                Some(json!({ "email": email, "password": "password123" })),
            )
            .await;
        assert_eq!(login.status, StatusCode::OK, "login: {}", login.body);
        login.data()["tokens"]["access_token"]
            .as_str()
            .expect("access token")
            .to_string()
    }

    pub async fn checkout(&self, body: Value) -> Reply {
        self.owner(Method::POST, "/api/v1/checkout", Some(body)).await
    }

    pub async fn product(&self, id: Uuid) -> Value {
        let reply = self
            .owner(Method::GET, &format!("/api/v1/products/{id}"), None)
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        reply.data().clone()
    }

    pub async fn customer(&self, id: Uuid) -> Value {
        let reply = self
            .owner(Method::GET, &format!("/api/v1/customers/{id}"), None)
            .await;
        assert_eq!(reply.status, StatusCode::OK);
        reply.data().clone()
    }
}

pub async fn decode(response: Response) -> Reply {
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    Reply { status, body }
}

pub fn uuid_of(value: &Value) -> Uuid {
    Uuid::parse_str(value.as_str().expect("uuid string")).expect("valid uuid")
}

/// Reads a money field whether it was serialized as a string or a number.
pub fn money(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("not a money value: {other}"),
    }
}
