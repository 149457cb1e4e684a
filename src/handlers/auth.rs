use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tracing::info;

use super::common::{created_response, success_response};
use crate::{
    auth::{AuthRouterExt, AuthUser, TokenPair},
    errors::ServiceError,
    handlers::AppState,
    services::tenancy::{LoginRequest, Me, RefreshRequest, RegisterRequest, Session},
};

/// Register a new shop with its owner account
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Shop registered", body = crate::ApiResponse<Session>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state.services.tenancy.register(payload).await?;
    info!(tenant_id = %session.tenant.id, "registration completed");
    Ok(created_response(session))
}

/// Sign in with email and password
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = crate::ApiResponse<Session>),
        (status = 401, description = "Invalid credentials", body = crate::errors::ErrorResponse),
        (status = 403, description = "Account deactivated", body = crate::errors::ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state.services.tenancy.login(payload).await?;
    Ok(success_response(session))
}

/// Exchange a refresh token for a new token pair
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens refreshed", body = crate::ApiResponse<TokenPair>),
        (status = 401, description = "Invalid refresh token", body = crate::errors::ErrorResponse)
    ),
    tag = "Auth"
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let tokens = state.services.tenancy.refresh(&payload.refresh_token).await?;
    Ok(success_response(tokens))
}

/// The signed-in user, their shop and permissions
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current user", body = crate::ApiResponse<Me>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Auth"
)]
pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let me = state.services.tenancy.me(&user).await?;
    Ok(success_response(me))
}

pub fn routes() -> Router<AppState> {
    let public = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh));

    let session = Router::new().route("/me", get(me)).with_auth();

    public.merge(session)
}
