use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use super::common::{created_response, page_response, success_response};
use crate::{
    auth::{permissions, AuthRouterExt, AuthUser},
    entities::return_request,
    errors::ServiceError,
    handlers::AppState,
    services::returns::{CreateReturnRequest, ReturnDetail, ReturnFilter, ReviewReturnRequest},
    ListQuery,
};

/// Request a return against a completed sale
#[utoipa::path(
    post,
    path = "/api/v1/returns",
    request_body = CreateReturnRequest,
    responses(
        (status = 201, description = "Return requested", body = crate::ApiResponse<ReturnDetail>),
        (status = 400, description = "Invalid return", body = crate::errors::ErrorResponse),
        (status = 404, description = "Sale not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Returns"
)]
pub async fn create_return(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateReturnRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state
        .services
        .returns
        .create_return(user.tenant_id, user.user_id, payload)
        .await?;
    Ok(created_response(created))
}

/// List returns
#[utoipa::path(
    get,
    path = "/api/v1/returns",
    params(ListQuery, ReturnFilter),
    responses(
        (status = 200, description = "Returns", body = crate::ApiResponse<crate::PaginatedResponse<return_request::Model>>)
    ),
    security(("Bearer" = [])),
    tag = "Returns"
)]
pub async fn list_returns(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
    Query(filter): Query<ReturnFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = state.page(&query);
    let rows = state
        .services
        .returns
        .list_returns(user.tenant_id, filter, page, limit)
        .await?;
    Ok(page_response(rows, page, limit))
}

/// Get a return with its lines
#[utoipa::path(
    get,
    path = "/api/v1/returns/:id",
    params(("id" = Uuid, Path, description = "Return ID")),
    responses(
        (status = 200, description = "Return", body = crate::ApiResponse<ReturnDetail>),
        (status = 404, description = "Return not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Returns"
)]
pub async fn get_return(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let found = state.services.returns.get_return(user.tenant_id, id).await?;
    Ok(success_response(found))
}

/// Approve a pending return: restock, refund and credit any open debt
#[utoipa::path(
    post,
    path = "/api/v1/returns/:id/approve",
    params(("id" = Uuid, Path, description = "Return ID")),
    request_body(content = ReviewReturnRequest, description = "Optional review note"),
    responses(
        (status = 200, description = "Return approved", body = crate::ApiResponse<ReturnDetail>),
        (status = 400, description = "Return is not pending", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Returns"
)]
pub async fn approve_return(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<ReviewReturnRequest>>,
) -> Result<impl IntoResponse, ServiceError> {
    let review = payload.map(|Json(r)| r).unwrap_or_default();
    let approved = state
        .services
        .returns
        .approve_return(user.tenant_id, id, user.user_id, review)
        .await?;
    Ok(success_response(approved))
}

/// Reject a pending return
#[utoipa::path(
    post,
    path = "/api/v1/returns/:id/reject",
    params(("id" = Uuid, Path, description = "Return ID")),
    request_body(content = ReviewReturnRequest, description = "Optional review note"),
    responses(
        (status = 200, description = "Return rejected", body = crate::ApiResponse<ReturnDetail>),
        (status = 400, description = "Return is not pending", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Returns"
)]
pub async fn reject_return(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<ReviewReturnRequest>>,
) -> Result<impl IntoResponse, ServiceError> {
    let review = payload.map(|Json(r)| r).unwrap_or_default();
    let rejected = state
        .services
        .returns
        .reject_return(user.tenant_id, id, user.user_id, review)
        .await?;
    Ok(success_response(rejected))
}

/// Undo an approved return, restoring stock, refunds and debt
#[utoipa::path(
    post,
    path = "/api/v1/returns/:id/revert",
    params(("id" = Uuid, Path, description = "Return ID")),
    responses(
        (status = 200, description = "Return reverted to pending", body = crate::ApiResponse<ReturnDetail>),
        (status = 400, description = "Return is not approved", body = crate::errors::ErrorResponse),
        (status = 422, description = "Returned stock already sold", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Returns"
)]
pub async fn revert_return(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let reverted = state
        .services
        .returns
        .revert_return(user.tenant_id, id, user.user_id)
        .await?;
    Ok(success_response(reverted))
}

pub fn routes() -> Router<AppState> {
    let create = Router::new()
        .route("/returns", post(create_return))
        .with_permission(permissions::RETURNS_CREATE);

    let read = Router::new()
        .route("/returns", get(list_returns))
        .route("/returns/:id", get(get_return))
        .with_permission(permissions::RETURNS_READ);

    let review = Router::new()
        .route("/returns/:id/approve", post(approve_return))
        .route("/returns/:id/reject", post(reject_return))
        .route("/returns/:id/revert", post(revert_return))
        .with_permission(permissions::RETURNS_REVIEW);

    create.merge(read).merge(review)
}
