/*!
 * # Authentication and Authorization Module
 *
 * Stateless HS256 JWT authentication for shop staff:
 *
 * - Access/refresh token pairs issued at login and registration
 * - An auth middleware that turns a bearer token into an [`AuthUser`]
 * - Permission and role gates layered per route group (see [`rbac`])
 */

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::user::{self, UserRole};

pub mod password;
pub mod rbac;

pub use rbac::{check_permission, permissions, permissions_for_role};

const ACCESS_TOKEN: &str = "access";
const REFRESH_TOKEN: &str = "refresh";

/// Claim structure for JWT tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub tenant_id: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
    pub iss: String,
    pub aud: String,
    /// `access` or `refresh`
    pub token_use: String,
}

/// Authenticated caller, inserted into request extensions by [`auth_middleware`].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub token_id: String,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions
            .iter()
            .any(|granted| check_permission(granted, permission))
    }

    /// Owners and admins bypass permission checks.
    pub fn is_admin(&self) -> bool {
        self.has_role(UserRole::Owner.as_str()) || self.has_role(UserRole::Admin.as_str())
    }

    fn from_claims(claims: Claims) -> Result<Self, AuthError> {
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        let tenant_id = Uuid::parse_str(&claims.tenant_id).map_err(|_| AuthError::InvalidToken)?;
        Ok(Self {
            user_id,
            tenant_id,
            name: claims.name,
            email: claims.email,
            roles: claims.roles,
            permissions: claims.permissions,
            token_id: claims.jti,
        })
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingAuth)
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub access_token_expiration: Duration,
    pub refresh_token_expiration: Duration,
}

impl AuthConfig {
    pub fn new(jwt_secret: String, access_token_expiration: Duration) -> Self {
        Self {
            jwt_secret,
            jwt_audience: "retail-pos-api".to_string(),
            jwt_issuer: "retail-pos-auth".to_string(),
            access_token_expiration,
            refresh_token_expiration: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// Issues and validates tokens. Holds no per-token state.
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    pub fn generate_token(&self, user: &user::Model) -> Result<TokenPair, AuthError> {
        let access_token = self.encode_claims(user, ACCESS_TOKEN, self.config.access_token_expiration)?;
        let refresh_token =
            self.encode_claims(user, REFRESH_TOKEN, self.config.refresh_token_expiration)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_expiration.as_secs() as i64,
            refresh_expires_in: self.config.refresh_token_expiration.as_secs() as i64,
        })
    }

    fn encode_claims(
        &self,
        user: &user::Model,
        token_use: &str,
        lifetime: Duration,
    ) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.to_string(),
            name: Some(user.name.clone()),
            email: Some(user.email.clone()),
            roles: vec![user.role.as_str().to_string()],
            permissions: permissions_for_role(user.role),
            tenant_id: user.tenant_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + lifetime.as_secs() as i64,
            nbf: now,
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
            token_use: token_use.to_string(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
    }

    /// Validates an access token and returns the caller.
    pub fn validate_token(&self, token: &str) -> Result<AuthUser, AuthError> {
        let claims = self.decode_claims(token)?;
        if claims.token_use != ACCESS_TOKEN {
            return Err(AuthError::InvalidToken);
        }
        AuthUser::from_claims(claims)
    }

    /// Validates a refresh token and returns the user id it was issued to.
    pub fn validate_refresh_token(&self, token: &str) -> Result<Uuid, AuthError> {
        let claims = self.decode_claims(token)?;
        if claims.token_use != REFRESH_TOKEN {
            return Err(AuthError::InvalidToken);
        }
        Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Account is disabled")]
    AccountDisabled,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message): (StatusCode, &str, String) = match &self {
            Self::MissingAuth => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING",
                "Authentication required".to_string(),
            ),
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_TOKEN",
                "Invalid authentication token".to_string(),
            ),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "AUTH_TOKEN_EXPIRED",
                "Token has expired".to_string(),
            ),
            Self::TokenCreation(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_TOKEN_CREATION_FAILED",
                "Could not issue token".to_string(),
            ),
            Self::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                "AUTH_INSUFFICIENT_PERMISSIONS",
                "Insufficient permissions".to_string(),
            ),
            Self::AccountDisabled => (
                StatusCode::FORBIDDEN,
                "AUTH_ACCOUNT_DISABLED",
                "Account is disabled".to_string(),
            ),
            Self::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_INTERNAL_ERROR",
                "Authentication unavailable".to_string(),
            ),
        };

        let body = Json(serde_json::json!({
            "error": {
                "code": error_code,
                "message": error_message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<AuthError> for crate::errors::ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InsufficientPermissions | AuthError::AccountDisabled => {
                Self::Forbidden(err.to_string())
            }
            AuthError::TokenCreation(msg) => Self::JwtError(msg),
            AuthError::InternalError(msg) => Self::InternalError(msg),
            other => Self::Unauthorized(other.to_string()),
        }
    }
}

/// Rejects callers lacking `required_permission`; owners and admins pass.
pub async fn permission_middleware(
    State(required_permission): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingAuth)?;

    if !user.is_admin() && !user.has_permission(&required_permission) {
        debug!(
            user_id = %user.user_id,
            permission = %required_permission,
            "permission denied"
        );
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

pub async fn role_middleware(
    State(required_role): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingAuth)?;

    if !user.has_role(&required_role) {
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Validates the bearer token and stores the [`AuthUser`] in request extensions.
///
/// Expects `Arc<AuthService>` and `Arc<DbPool>` extensions installed by an
/// outer layer. The account behind the token is looked up on every request,
/// so deactivating a user locks out tokens that are still unexpired.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let (Some(auth_service), Some(db)) = (
        request.extensions().get::<Arc<AuthService>>().cloned(),
        request.extensions().get::<Arc<DbPool>>().cloned(),
    ) else {
        return AuthError::InternalError("auth service missing".to_string()).into_response();
    };

    let user = match extract_auth_from_headers(request.headers(), &auth_service) {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };
    if let Err(e) = ensure_account_active(&db, &user).await {
        return e.into_response();
    }

    request.extensions_mut().insert(user);
    next.run(request).await
}

/// Rejects tokens whose account was deactivated or removed after issue.
async fn ensure_account_active(db: &DbPool, user: &AuthUser) -> Result<(), AuthError> {
    let account = user::Entity::find_by_id(user.user_id)
        .filter(user::Column::TenantId.eq(user.tenant_id))
        .one(db)
        .await
        .map_err(|e| AuthError::InternalError(e.to_string()))?;

    match account {
        Some(account) if account.active => Ok(()),
        Some(_) => {
            debug!(user_id = %user.user_id, "token presented for a disabled account");
            Err(AuthError::AccountDisabled)
        }
        None => Err(AuthError::InvalidToken),
    }
}

fn extract_auth_from_headers(
    headers: &HeaderMap,
    auth_service: &AuthService,
) -> Result<AuthUser, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingAuth)?;

    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(AuthError::MissingAuth)?;

    auth_service.validate_token(token)
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_permission(self, permission: &str) -> Self;
    fn with_role(self, role: &str) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_permission(self, permission: &str) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            permission.to_string(),
            permission_middleware,
        ))
        .with_auth()
    }

    fn with_role(self, role: &str) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            role.to_string(),
            role_middleware,
        ))
        .with_auth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn service() -> AuthService {
        AuthService::new(AuthConfig::new(
            "test-secret-that-is-at-least-32-characters".to_string(),
            Duration::from_secs(900),
        ))
    }

    fn cashier() -> user::Model {
        let now = Utc::now();
        user::Model {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "Ama".to_string(),
            email: "ama@example.com".to_string(),
            password_hash: String::new(),
            role: UserRole::Cashier,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn access_token_round_trips_identity() {
        let svc = service();
        let user = cashier();
        let pair = svc.generate_token(&user).unwrap();

        let auth = svc.validate_token(&pair.access_token).unwrap();
        assert_eq!(auth.user_id, user.id);
        assert_eq!(auth.tenant_id, user.tenant_id);
        assert!(auth.has_role("cashier"));
        assert!(!auth.is_admin());
        assert!(auth.has_permission(permissions::SALES_CREATE));
        assert!(!auth.has_permission(permissions::RETURNS_REVIEW));
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let svc = service();
        let user = cashier();
        let pair = svc.generate_token(&user).unwrap();

        assert_matches!(
            svc.validate_token(&pair.refresh_token),
            Err(AuthError::InvalidToken)
        );
        assert_eq!(svc.validate_refresh_token(&pair.refresh_token).unwrap(), user.id);
        assert_matches!(
            svc.validate_refresh_token(&pair.access_token),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let pair = service().generate_token(&cashier()).unwrap();
        let other = AuthService::new(AuthConfig::new(
            "another-secret-that-is-at-least-32-chars!".to_string(),
            Duration::from_secs(900),
        ));
        assert_matches!(
            other.validate_token(&pair.access_token),
            Err(AuthError::InvalidToken)
        );
    }
}
