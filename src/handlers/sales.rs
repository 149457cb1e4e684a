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
    entities::transaction,
    errors::ServiceError,
    handlers::AppState,
    services::{
        cart::CartTotals,
        sales::{CheckoutRequest, QuoteRequest, TransactionDetail, TransactionFilter},
    },
    ListQuery,
};

/// Price a cart without touching stock
#[utoipa::path(
    post,
    path = "/api/v1/cart/quote",
    request_body = QuoteRequest,
    responses(
        (status = 200, description = "Cart totals", body = crate::ApiResponse<CartTotals>),
        (status = 400, description = "Invalid cart", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Sales"
)]
pub async fn quote(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<QuoteRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let totals = state.services.sales.quote(user.tenant_id, payload).await?;
    Ok(success_response(totals))
}

/// Complete a sale
#[utoipa::path(
    post,
    path = "/api/v1/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Sale completed", body = crate::ApiResponse<TransactionDetail>),
        (status = 400, description = "Invalid sale", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock or credit", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Sales"
)]
pub async fn checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let sale = state
        .services
        .sales
        .checkout(user.tenant_id, user.user_id, payload)
        .await?;
    Ok(created_response(sale))
}

/// List sales
#[utoipa::path(
    get,
    path = "/api/v1/transactions",
    params(ListQuery, TransactionFilter),
    responses(
        (status = 200, description = "Sales", body = crate::ApiResponse<crate::PaginatedResponse<transaction::Model>>)
    ),
    security(("Bearer" = [])),
    tag = "Sales"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
    Query(filter): Query<TransactionFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = state.page(&query);
    let rows = state
        .services
        .sales
        .list_transactions(user.tenant_id, filter, page, limit)
        .await?;
    Ok(page_response(rows, page, limit))
}

/// Get a sale with its lines, customer and payments
#[utoipa::path(
    get,
    path = "/api/v1/transactions/:id",
    params(("id" = Uuid, Path, description = "Transaction ID")),
    responses(
        (status = 200, description = "Sale", body = crate::ApiResponse<TransactionDetail>),
        (status = 404, description = "Transaction not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Sales"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let sale = state
        .services
        .sales
        .get_transaction(user.tenant_id, id)
        .await?;
    Ok(success_response(sale))
}

pub fn routes() -> Router<AppState> {
    let sell = Router::new()
        .route("/cart/quote", post(quote))
        .route("/checkout", post(checkout))
        .with_permission(permissions::SALES_CREATE);

    let read = Router::new()
        .route("/transactions", get(list_transactions))
        .route("/transactions/:id", get(get_transaction))
        .with_permission(permissions::SALES_READ);

    sell.merge(read)
}
