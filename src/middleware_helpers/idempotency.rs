use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use dashmap::{mapref::entry::Entry, DashMap};
use http_body_util::BodyExt as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::AuthService;
use crate::errors::ServiceError;

pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";
const TTL: Duration = Duration::from_secs(600);

#[derive(Clone)]
enum Slot {
    InFlight(Instant),
    Done(StoredResponse),
}

impl Slot {
    fn stored_at(&self) -> Instant {
        match self {
            Slot::InFlight(at) => *at,
            Slot::Done(sr) => sr.stored_at,
        }
    }
}

/// Replay cache for mutating requests that carry an `Idempotency-Key`.
#[derive(Clone)]
pub struct IdempotencyStore {
    entries: Arc<DashMap<String, Slot>>,
    ttl: Duration,
}

impl Default for IdempotencyStore {
    fn default() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl: TTL,
        }
    }
}

impl IdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn cleanup(&self) {
        let now = Instant::now();
        let ttl = self.ttl;
        self.entries
            .retain(|_, slot| now.duration_since(slot.stored_at()) < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Claims `key`. Returns the stored response when one exists, or an error
    /// when the same key is still being processed.
    fn claim(&self, key: &str) -> Result<Option<StoredResponse>, ServiceError> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().stored_at().elapsed() >= self.ttl {
                    occupied.insert(Slot::InFlight(Instant::now()));
                    return Ok(None);
                }
                match occupied.get() {
                    Slot::Done(sr) => Ok(Some(sr.clone())),
                    Slot::InFlight(_) => Err(ServiceError::Conflict(
                        "A request with this idempotency key is already in progress".into(),
                    )),
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::InFlight(Instant::now()));
                Ok(None)
            }
        }
    }

    fn complete(&self, key: &str, sr: StoredResponse) {
        self.entries.insert(key.to_string(), Slot::Done(sr));
    }

    fn release(&self, key: &str) {
        self.entries.remove(key);
    }
}

#[derive(Clone)]
pub struct StoredResponse {
    pub status: StatusCode,
    pub body: Bytes,
    pub content_type: Option<HeaderValue>,
    pub stored_at: Instant,
}

impl StoredResponse {
    fn replay(&self) -> Response {
        let mut resp = Response::new(axum::body::Body::from(self.body.clone()));
        *resp.status_mut() = self.status;
        if let Some(ct) = self.content_type.clone() {
            resp.headers_mut().insert(header::CONTENT_TYPE, ct);
        }
        resp.headers_mut()
            .insert("idempotent-replayed", HeaderValue::from_static("true"));
        resp
    }
}

/// Holds an in-flight claim and frees it unless the response was stored.
/// The request future can be dropped at any await point (client gone,
/// timeout layer), and the key must not stay locked when that happens.
struct Claim {
    store: IdempotencyStore,
    key: String,
    settled: bool,
}

impl Claim {
    fn new(store: IdempotencyStore, key: String) -> Self {
        Self {
            store,
            key,
            settled: false,
        }
    }

    fn complete(mut self, sr: StoredResponse) {
        self.store.complete(&self.key, sr);
        self.settled = true;
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if !self.settled {
            self.store.release(&self.key);
        }
    }
}

/// The tenant and user behind the request's access token. Scoping by identity
/// rather than by token keeps a retry after a token refresh on the same key.
fn caller_scope(req: &Request) -> Option<String> {
    let auth = req.extensions().get::<Arc<AuthService>>()?;
    let token = req
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?
        .trim();
    let user = auth.validate_token(token).ok()?;
    Some(format!("{}:{}", user.tenant_id, user.user_id))
}

fn scoped_key(scope: &str, req: &Request, key: &str) -> String {
    format!("{}:{}:{}:{}", scope, req.method(), req.uri().path(), key)
}

/// Replays the stored response for a repeated `Idempotency-Key`.
///
/// Only authenticated requests are cached; anonymous ones (login, register)
/// have no caller to scope the key to and pass straight through.
pub async fn idempotency_middleware(
    State(store): State<IdempotencyStore>,
    req: Request,
    next: Next,
) -> Response {
    let is_mutating = matches!(req.method().as_str(), "POST" | "PUT" | "PATCH" | "DELETE");
    if !is_mutating {
        return next.run(req).await;
    }

    let Some(raw_key) = req
        .headers()
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
    else {
        return next.run(req).await;
    };
    let Some(scope) = caller_scope(&req) else {
        return next.run(req).await;
    };

    store.cleanup();
    let key = scoped_key(&scope, &req, &raw_key);

    match store.claim(&key) {
        Ok(Some(stored)) => {
            tracing::debug!(idempotency_key = %raw_key, "replaying stored response");
            return stored.replay();
        }
        Ok(None) => {}
        Err(err) => return err.into_response(),
    }
    let claim = Claim::new(store, key);

    let resp = next.run(req).await;

    // Server errors are not cached so the client can retry.
    if resp.status().is_server_error() {
        return resp;
    }

    let (parts, body) = resp.into_parts();
    match body.collect().await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            claim.complete(StoredResponse {
                status: parts.status,
                body: bytes.clone(),
                content_type: parts.headers.get(header::CONTENT_TYPE).cloned(),
                stored_at: Instant::now(),
            });
            Response::from_parts(parts, axum::body::Body::from(bytes))
        }
        Err(_) => Response::from_parts(parts, axum::body::Body::empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use crate::entities::user::{self, UserRole};
    use axum::{body::Body, routing::post, Extension, Router};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn auth() -> Arc<AuthService> {
        Arc::new(AuthService::new(AuthConfig::new(
            "idempotency_test_secret_that_is_long_enough".to_string(),
            Duration::from_secs(300),
        )))
    }

    fn cashier(tenant_id: Uuid) -> user::Model {
        user::Model {
            id: Uuid::new_v4(),
            tenant_id,
            name: "Ama".to_string(),
            email: "ama@corner.shop".to_string(),
            password_hash: String::new(),
            role: UserRole::Cashier,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn bearer(auth: &AuthService, user: &user::Model) -> String {
        format!("Bearer {}", auth.generate_token(user).unwrap().access_token)
    }

    /// The first sale takes `first_delay` to complete.
    fn app(
        store: IdempotencyStore,
        auth: Arc<AuthService>,
        hits: Arc<AtomicUsize>,
        first_delay: Duration,
    ) -> Router {
        Router::new()
            .route(
                "/sell",
                post(move || {
                    let hits = hits.clone();
                    async move {
                        let n = hits.fetch_add(1, Ordering::SeqCst) + 1;
                        if n == 1 {
                            tokio::time::sleep(first_delay).await;
                        }
                        (StatusCode::CREATED, format!("sale-{}", n))
                    }
                }),
            )
            .layer(axum::middleware::from_fn_with_state(
                store,
                idempotency_middleware,
            ))
            .layer(Extension(auth))
    }

    fn request(key: Option<&str>, auth: Option<&str>) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::builder().method("POST").uri("/sell");
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        if let Some(key) = key {
            builder = builder.header(IDEMPOTENCY_HEADER, key);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_text(resp: Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn repeated_key_replays_first_response() {
        let (store, auth, hits) = (IdempotencyStore::new(), auth(), Arc::new(AtomicUsize::new(0)));
        let token = bearer(&auth, &cashier(Uuid::new_v4()));

        let first = app(store.clone(), auth.clone(), hits.clone(), Duration::ZERO)
            .oneshot(request(Some("k1"), Some(&token)))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::CREATED);
        assert_eq!(body_text(first).await, "sale-1");

        let second = app(store.clone(), auth.clone(), hits.clone(), Duration::ZERO)
            .oneshot(request(Some("k1"), Some(&token)))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::CREATED);
        assert!(second.headers().contains_key("idempotent-replayed"));
        assert_eq!(body_text(second).await, "sale-1");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_refreshed_token_still_replays() {
        let (store, auth, hits) = (IdempotencyStore::new(), auth(), Arc::new(AtomicUsize::new(0)));
        let user = cashier(Uuid::new_v4());
        let old_token = bearer(&auth, &user);
        let new_token = bearer(&auth, &user);
        assert_ne!(old_token, new_token);

        app(store.clone(), auth.clone(), hits.clone(), Duration::ZERO)
            .oneshot(request(Some("sale-42"), Some(&old_token)))
            .await
            .unwrap();
        let retry = app(store.clone(), auth.clone(), hits.clone(), Duration::ZERO)
            .oneshot(request(Some("sale-42"), Some(&new_token)))
            .await
            .unwrap();

        assert_eq!(body_text(retry).await, "sale-1");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn keys_are_scoped_per_caller() {
        let (store, auth, hits) = (IdempotencyStore::new(), auth(), Arc::new(AtomicUsize::new(0)));
        let shop_a = bearer(&auth, &cashier(Uuid::new_v4()));
        let shop_b = bearer(&auth, &cashier(Uuid::new_v4()));

        app(store.clone(), auth.clone(), hits.clone(), Duration::ZERO)
            .oneshot(request(Some("shared"), Some(&shop_a)))
            .await
            .unwrap();
        let other = app(store.clone(), auth.clone(), hits.clone(), Duration::ZERO)
            .oneshot(request(Some("shared"), Some(&shop_b)))
            .await
            .unwrap();

        assert_eq!(body_text(other).await, "sale-2");
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn unauthenticated_and_keyless_requests_are_not_cached() {
        let (store, auth, hits) = (IdempotencyStore::new(), auth(), Arc::new(AtomicUsize::new(0)));
        let token = bearer(&auth, &cashier(Uuid::new_v4()));

        for req in [
            request(None, Some(&token)),
            request(None, Some(&token)),
            request(Some("k1"), None),
            request(Some("k1"), Some("Bearer not-a-jwt")),
        ] {
            app(store.clone(), auth.clone(), hits.clone(), Duration::ZERO)
                .oneshot(req)
                .await
                .unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 4);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn cancelled_request_frees_its_key() {
        let (store, auth, hits) = (IdempotencyStore::new(), auth(), Arc::new(AtomicUsize::new(0)));
        let token = bearer(&auth, &cashier(Uuid::new_v4()));

        let slow = app(store.clone(), auth.clone(), hits.clone(), Duration::from_secs(30))
            .oneshot(request(Some("k1"), Some(&token)));
        assert!(tokio::time::timeout(Duration::from_millis(50), slow)
            .await
            .is_err());
        assert!(store.is_empty());

        let retry = app(store.clone(), auth.clone(), hits.clone(), Duration::ZERO)
            .oneshot(request(Some("k1"), Some(&token)))
            .await
            .unwrap();
        assert_eq!(retry.status(), StatusCode::CREATED);
        assert_eq!(body_text(retry).await, "sale-2");
    }

    #[test]
    fn in_flight_key_is_a_conflict() {
        let store = IdempotencyStore::new();
        assert!(store.claim("k").unwrap().is_none());
        assert!(matches!(store.claim("k"), Err(ServiceError::Conflict(_))));
        store.release("k");
        assert!(store.claim("k").unwrap().is_none());
    }

    #[test]
    fn dropped_claim_releases_the_key() {
        let store = IdempotencyStore::new();
        assert!(store.claim("k").unwrap().is_none());
        drop(Claim::new(store.clone(), "k".to_string()));
        assert!(store.is_empty());
    }
}
