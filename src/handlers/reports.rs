use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;

use super::common::success_response;
use crate::{
    auth::{permissions, AuthRouterExt, AuthUser},
    errors::ServiceError,
    handlers::AppState,
    services::reports::{DailySales, Dashboard, ReportRange, TopProduct},
};

const DEFAULT_TOP_PRODUCTS: usize = 10;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct TopProductsQuery {
    /// How many products to return, at most 100
    pub limit: Option<usize>,
}

/// Headline figures for a date range
#[utoipa::path(
    get,
    path = "/api/v1/reports/dashboard",
    params(ReportRange),
    responses(
        (status = 200, description = "Dashboard", body = crate::ApiResponse<Dashboard>),
        (status = 400, description = "Invalid range", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Reports"
)]
pub async fn dashboard(
    State(state): State<AppState>,
    user: AuthUser,
    Query(range): Query<ReportRange>,
) -> Result<impl IntoResponse, ServiceError> {
    let report = state.services.reports.dashboard(user.tenant_id, range).await?;
    Ok(success_response(report))
}

/// Revenue per day
#[utoipa::path(
    get,
    path = "/api/v1/reports/daily-sales",
    params(ReportRange),
    responses(
        (status = 200, description = "Daily sales", body = crate::ApiResponse<Vec<DailySales>>),
        (status = 400, description = "Invalid range", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Reports"
)]
pub async fn daily_sales(
    State(state): State<AppState>,
    user: AuthUser,
    Query(range): Query<ReportRange>,
) -> Result<impl IntoResponse, ServiceError> {
    let series = state
        .services
        .reports
        .daily_sales(user.tenant_id, range)
        .await?;
    Ok(success_response(series))
}

/// Best sellers by units
#[utoipa::path(
    get,
    path = "/api/v1/reports/top-products",
    params(ReportRange, TopProductsQuery),
    responses(
        (status = 200, description = "Top products", body = crate::ApiResponse<Vec<TopProduct>>),
        (status = 400, description = "Invalid range", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Reports"
)]
pub async fn top_products(
    State(state): State<AppState>,
    user: AuthUser,
    Query(range): Query<ReportRange>,
    Query(query): Query<TopProductsQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let ranked = state
        .services
        .reports
        .top_products(
            user.tenant_id,
            range,
            query.limit.unwrap_or(DEFAULT_TOP_PRODUCTS),
        )
        .await?;
    Ok(success_response(ranked))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/daily-sales", get(daily_sales))
        .route("/top-products", get(top_products))
        .with_permission(permissions::REPORTS_READ)
}
