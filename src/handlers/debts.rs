use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use uuid::Uuid;

use super::common::{created_response, page_response, success_response};
use crate::{
    auth::{permissions, AuthRouterExt, AuthUser},
    entities::{debt_payment, transaction},
    errors::ServiceError,
    handlers::AppState,
    services::debts::{DebtFilter, PaymentReceipt, RecordPaymentRequest},
    ListQuery,
};

/// Sales with money still owed, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/debts",
    params(ListQuery, DebtFilter),
    responses(
        (status = 200, description = "Open debts", body = crate::ApiResponse<crate::PaginatedResponse<transaction::Model>>)
    ),
    security(("Bearer" = [])),
    tag = "Debts"
)]
pub async fn list_debts(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
    Query(filter): Query<DebtFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = state.page(&query);
    let rows = state
        .services
        .debts
        .list_debts(user.tenant_id, filter, page, limit)
        .await?;
    Ok(page_response(rows, page, limit))
}

/// Payments made against one sale
#[utoipa::path(
    get,
    path = "/api/v1/transactions/:id/payments",
    params(("id" = Uuid, Path, description = "Transaction ID")),
    responses(
        (status = 200, description = "Payment history", body = crate::ApiResponse<Vec<debt_payment::Model>>),
        (status = 404, description = "Transaction not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Debts"
)]
pub async fn payment_history(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let payments = state
        .services
        .debts
        .payment_history(user.tenant_id, id)
        .await?;
    Ok(success_response(payments))
}

/// Record a payment against a sale's outstanding balance
#[utoipa::path(
    post,
    path = "/api/v1/transactions/:id/payments",
    params(("id" = Uuid, Path, description = "Transaction ID")),
    request_body = RecordPaymentRequest,
    responses(
        (status = 201, description = "Payment recorded", body = crate::ApiResponse<PaymentReceipt>),
        (status = 400, description = "Invalid or excessive payment", body = crate::errors::ErrorResponse),
        (status = 404, description = "Transaction not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Debts"
)]
pub async fn record_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RecordPaymentRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let receipt = state
        .services
        .debts
        .record_payment(user.tenant_id, id, user.user_id, payload)
        .await?;
    Ok(created_response(receipt))
}

pub fn routes() -> Router<AppState> {
    let read = Router::new()
        .route("/debts", get(list_debts))
        .route("/transactions/:id/payments", get(payment_history))
        .with_permission(permissions::DEBTS_READ);

    let collect = Router::new()
        .route(
            "/transactions/:id/payments",
            axum::routing::post(record_payment),
        )
        .with_permission(permissions::DEBTS_COLLECT);

    read.merge(collect)
}
