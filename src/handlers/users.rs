use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, put},
    Router,
};
use uuid::Uuid;

use super::common::{created_response, success_response};
use crate::{
    auth::{permissions, AuthRouterExt, AuthUser},
    errors::ServiceError,
    handlers::AppState,
    services::tenancy::{CreateUserRequest, SetUserActiveRequest, UserView},
};

/// List the shop's staff accounts
#[utoipa::path(
    get,
    path = "/api/v1/users",
    responses(
        (status = 200, description = "Staff accounts", body = crate::ApiResponse<Vec<UserView>>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Users"
)]
pub async fn list_users(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let users = state.services.tenancy.list_users(user.tenant_id).await?;
    Ok(success_response(users))
}

/// Add a staff account
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = crate::ApiResponse<UserView>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Users"
)]
pub async fn create_user(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state
        .services
        .tenancy
        .create_user(user.tenant_id, payload)
        .await?;
    Ok(created_response(created))
}

/// Activate or deactivate a staff account
#[utoipa::path(
    put,
    path = "/api/v1/users/:id/active",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = SetUserActiveRequest,
    responses(
        (status = 200, description = "Status changed", body = crate::ApiResponse<UserView>),
        (status = 400, description = "Cannot deactivate this account", body = crate::errors::ErrorResponse),
        (status = 404, description = "User not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Users"
)]
pub async fn set_user_active(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetUserActiveRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let updated = state
        .services
        .tenancy
        .set_user_active(user.tenant_id, user.user_id, id, payload.active)
        .await?;
    Ok(success_response(updated))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id/active", put(set_user_active))
        .with_permission(permissions::USERS_MANAGE)
}
