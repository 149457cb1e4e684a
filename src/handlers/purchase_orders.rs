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
    entities::purchase_order,
    errors::ServiceError,
    handlers::AppState,
    services::purchase_orders::{
        CreatePurchaseOrderRequest, PurchaseOrderDetail, PurchaseOrderFilter,
        ReceivePurchaseOrderRequest,
    },
    ListQuery,
};

/// List purchase orders
#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders",
    params(ListQuery, PurchaseOrderFilter),
    responses(
        (status = 200, description = "Purchase orders", body = crate::ApiResponse<crate::PaginatedResponse<purchase_order::Model>>)
    ),
    security(("Bearer" = [])),
    tag = "Purchase Orders"
)]
pub async fn list_purchase_orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
    Query(filter): Query<PurchaseOrderFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = state.page(&query);
    let rows = state
        .services
        .purchase_orders
        .list_purchase_orders(user.tenant_id, filter, page, limit)
        .await?;
    Ok(page_response(rows, page, limit))
}

/// Get a purchase order with its lines
#[utoipa::path(
    get,
    path = "/api/v1/purchase-orders/:id",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Purchase order", body = crate::ApiResponse<PurchaseOrderDetail>),
        (status = 404, description = "Purchase order not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Purchase Orders"
)]
pub async fn get_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .purchase_orders
        .get_purchase_order(user.tenant_id, id)
        .await?;
    Ok(success_response(order))
}

/// Place a purchase order with a supplier
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders",
    request_body = CreatePurchaseOrderRequest,
    responses(
        (status = 201, description = "Purchase order created", body = crate::ApiResponse<PurchaseOrderDetail>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Purchase Orders"
)]
pub async fn create_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreatePurchaseOrderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .purchase_orders
        .create_purchase_order(user.tenant_id, user.user_id, payload)
        .await?;
    Ok(created_response(order))
}

/// Cancel a pending purchase order
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/:id/cancel",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    responses(
        (status = 200, description = "Purchase order cancelled", body = crate::ApiResponse<purchase_order::Model>),
        (status = 400, description = "Purchase order is not pending", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Purchase Orders"
)]
pub async fn cancel_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .purchase_orders
        .cancel_purchase_order(user.tenant_id, id)
        .await?;
    Ok(success_response(order))
}

/// Receive a pending purchase order into stock
#[utoipa::path(
    post,
    path = "/api/v1/purchase-orders/:id/receive",
    params(("id" = Uuid, Path, description = "Purchase order ID")),
    request_body(content = ReceivePurchaseOrderRequest, description = "Receiving options"),
    responses(
        (status = 200, description = "Purchase order received", body = crate::ApiResponse<PurchaseOrderDetail>),
        (status = 400, description = "Purchase order is not pending", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Purchase Orders"
)]
pub async fn receive_purchase_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    payload: Option<Json<ReceivePurchaseOrderRequest>>,
) -> Result<impl IntoResponse, ServiceError> {
    let options = payload.map(|Json(r)| r).unwrap_or_default();
    let order = state
        .services
        .purchase_orders
        .receive_purchase_order(user.tenant_id, id, user.user_id, options)
        .await?;
    Ok(success_response(order))
}

pub fn routes() -> Router<AppState> {
    let read = Router::new()
        .route("/purchase-orders", get(list_purchase_orders))
        .route("/purchase-orders/:id", get(get_purchase_order))
        .with_permission(permissions::PURCHASE_ORDERS_READ);

    let write = Router::new()
        .route("/purchase-orders", post(create_purchase_order))
        .route("/purchase-orders/:id/cancel", post(cancel_purchase_order))
        .with_permission(permissions::PURCHASE_ORDERS_WRITE);

    let receive = Router::new()
        .route("/purchase-orders/:id/receive", post(receive_purchase_order))
        .with_permission(permissions::PURCHASE_ORDERS_RECEIVE);

    read.merge(write).merge(receive)
}
