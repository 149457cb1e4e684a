use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::{created_response, page_response, success_response};
use crate::{
    auth::{permissions, AuthRouterExt, AuthUser},
    entities::{product, stock_history},
    errors::ServiceError,
    handlers::AppState,
    services::products::{
        AdjustStockRequest, CreateProductRequest, ProductFilter, StockMovement,
        UpdateProductRequest,
    },
    ListQuery,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductRemoval {
    pub id: Uuid,
    /// False when the product was only deactivated because sales or orders reference it
    pub deleted: bool,
}

/// List products
#[utoipa::path(
    get,
    path = "/api/v1/products",
    params(ListQuery, ProductFilter),
    responses(
        (status = 200, description = "Products", body = crate::ApiResponse<crate::PaginatedResponse<product::Model>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
    Query(filter): Query<ProductFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = state.page(&query);
    let rows = state
        .services
        .products
        .list_products(user.tenant_id, filter, page, limit)
        .await?;
    Ok(page_response(rows, page, limit))
}

/// Get a product
#[utoipa::path(
    get,
    path = "/api/v1/products/:id",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product", body = crate::ApiResponse<product::Model>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn get_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let found = state.services.products.get_product(user.tenant_id, id).await?;
    Ok(success_response(found))
}

/// Active products at or below their minimum stock level
#[utoipa::path(
    get,
    path = "/api/v1/products/low-stock",
    responses(
        (status = 200, description = "Low stock products", body = crate::ApiResponse<Vec<product::Model>>)
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn low_stock(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ServiceError> {
    let products = state.services.products.low_stock(user.tenant_id).await?;
    Ok(success_response(products))
}

/// Stock movements for a product, newest first
#[utoipa::path(
    get,
    path = "/api/v1/products/:id/stock-history",
    params(("id" = Uuid, Path, description = "Product ID"), ListQuery),
    responses(
        (status = 200, description = "Stock history", body = crate::ApiResponse<crate::PaginatedResponse<stock_history::Model>>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn stock_history(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = state.page(&query);
    let rows = state
        .services
        .products
        .stock_history(user.tenant_id, id, page, limit)
        .await?;
    Ok(page_response(rows, page, limit))
}

/// Create a product
#[utoipa::path(
    post,
    path = "/api/v1/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = crate::ApiResponse<product::Model>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 409, description = "SKU already in use", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateProductRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state
        .services
        .products
        .create_product(user.tenant_id, user.user_id, payload)
        .await?;
    Ok(created_response(created))
}

/// Update a product's details
#[utoipa::path(
    put,
    path = "/api/v1/products/:id",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Product updated", body = crate::ApiResponse<product::Model>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn update_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let updated = state
        .services
        .products
        .update_product(user.tenant_id, id, payload)
        .await?;
    Ok(success_response(updated))
}

/// Delete a product, or deactivate it when it has history
#[utoipa::path(
    delete,
    path = "/api/v1/products/:id",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product removed", body = crate::ApiResponse<ProductRemoval>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn delete_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let deleted = state
        .services
        .products
        .delete_product(user.tenant_id, id)
        .await?;
    Ok(success_response(ProductRemoval { id, deleted }))
}

/// Manually correct a product's stock
#[utoipa::path(
    post,
    path = "/api/v1/products/:id/stock-adjustments",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = AdjustStockRequest,
    responses(
        (status = 200, description = "Stock adjusted", body = crate::ApiResponse<StockMovement>),
        (status = 422, description = "Stock would go negative", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Products"
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdjustStockRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let movement = state
        .services
        .products
        .adjust_stock(user.tenant_id, id, user.user_id, payload)
        .await?;
    Ok(success_response(movement))
}

pub fn routes() -> Router<AppState> {
    let read = Router::new()
        .route("/products", get(list_products))
        .route("/products/low-stock", get(low_stock))
        .route("/products/:id", get(get_product))
        .route("/products/:id/stock-history", get(stock_history))
        .with_permission(permissions::PRODUCTS_READ);

    let write = Router::new()
        .route("/products", post(create_product))
        .route(
            "/products/:id",
            axum::routing::put(update_product).delete(delete_product),
        )
        .with_permission(permissions::PRODUCTS_WRITE);

    let adjust = Router::new()
        .route("/products/:id/stock-adjustments", post(adjust_stock))
        .with_permission(permissions::STOCK_ADJUST);

    read.merge(write).merge(adjust)
}
