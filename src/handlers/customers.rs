use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use uuid::Uuid;

use super::common::{created_response, no_content_response, page_response, success_response};
use crate::{
    auth::{permissions, AuthRouterExt, AuthUser},
    errors::ServiceError,
    handlers::AppState,
    services::customers::{
        CreateCustomerRequest, CustomerDebts, CustomerDetail, CustomerFilter, LedgerSummary,
        ReconcileReport, UpdateCustomerRequest,
    },
    ListQuery,
};

/// List customers
#[utoipa::path(
    get,
    path = "/api/v1/customers",
    params(ListQuery, CustomerFilter),
    responses(
        (status = 200, description = "Customers", body = crate::ApiResponse<crate::PaginatedResponse<CustomerDetail>>)
    ),
    security(("Bearer" = [])),
    tag = "Customers"
)]
pub async fn list_customers(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
    Query(filter): Query<CustomerFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = state.page(&query);
    let (customers, total) = state
        .services
        .customers
        .list_customers(user.tenant_id, filter, page, limit)
        .await?;
    let details: Vec<CustomerDetail> = customers.into_iter().map(CustomerDetail::from).collect();
    Ok(page_response((details, total), page, limit))
}

/// Get a customer with their available credit
#[utoipa::path(
    get,
    path = "/api/v1/customers/:id",
    params(("id" = Uuid, Path, description = "Customer ID")),
    responses(
        (status = 200, description = "Customer", body = crate::ApiResponse<CustomerDetail>),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Customers"
)]
pub async fn get_customer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let customer = state
        .services
        .customers
        .get_customer(user.tenant_id, id)
        .await?;
    Ok(success_response(CustomerDetail::from(customer)))
}

/// Open debts and payment history of a customer
#[utoipa::path(
    get,
    path = "/api/v1/customers/:id/debts",
    params(("id" = Uuid, Path, description = "Customer ID")),
    responses(
        (status = 200, description = "Customer debts", body = crate::ApiResponse<CustomerDebts>),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Customers"
)]
pub async fn customer_debts(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let debts = state
        .services
        .customers
        .customer_debts(user.tenant_id, id)
        .await?;
    Ok(success_response(debts))
}

/// Debt ledger totals of a customer
#[utoipa::path(
    get,
    path = "/api/v1/customers/:id/ledger",
    params(("id" = Uuid, Path, description = "Customer ID")),
    responses(
        (status = 200, description = "Ledger summary", body = crate::ApiResponse<LedgerSummary>),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Customers"
)]
pub async fn customer_ledger(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let summary = state
        .services
        .debts
        .ledger_summary(user.tenant_id, id)
        .await?;
    Ok(success_response(summary))
}

/// Create a customer
#[utoipa::path(
    post,
    path = "/api/v1/customers",
    request_body = CreateCustomerRequest,
    responses(
        (status = 201, description = "Customer created", body = crate::ApiResponse<CustomerDetail>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Customers"
)]
pub async fn create_customer(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateCustomerRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state
        .services
        .customers
        .create_customer(user.tenant_id, payload)
        .await?;
    Ok(created_response(CustomerDetail::from(created)))
}

/// Update a customer's contact details or credit limit
#[utoipa::path(
    put,
    path = "/api/v1/customers/:id",
    params(("id" = Uuid, Path, description = "Customer ID")),
    request_body = UpdateCustomerRequest,
    responses(
        (status = 200, description = "Customer updated", body = crate::ApiResponse<CustomerDetail>),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Customers"
)]
pub async fn update_customer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCustomerRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let updated = state
        .services
        .customers
        .update_customer(user.tenant_id, id, payload)
        .await?;
    Ok(success_response(CustomerDetail::from(updated)))
}

/// Delete a customer without sales or open debt
#[utoipa::path(
    delete,
    path = "/api/v1/customers/:id",
    params(("id" = Uuid, Path, description = "Customer ID")),
    responses(
        (status = 204, description = "Customer deleted"),
        (status = 400, description = "Customer has history or debt", body = crate::errors::ErrorResponse),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Customers"
)]
pub async fn delete_customer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .customers
        .delete_customer(user.tenant_id, id)
        .await?;
    Ok(no_content_response())
}

/// Recompute a customer's balance from the ledger and correct any drift
#[utoipa::path(
    post,
    path = "/api/v1/customers/:id/reconcile",
    params(("id" = Uuid, Path, description = "Customer ID")),
    responses(
        (status = 200, description = "Reconciliation result", body = crate::ApiResponse<ReconcileReport>),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Customers"
)]
pub async fn reconcile_customer(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let report = state
        .services
        .customers
        .reconcile(user.tenant_id, id)
        .await?;
    Ok(success_response(report))
}

pub fn routes() -> Router<AppState> {
    let read = Router::new()
        .route("/customers", get(list_customers))
        .route("/customers/:id", get(get_customer))
        .route("/customers/:id/debts", get(customer_debts))
        .with_permission(permissions::CUSTOMERS_READ);

    let ledger = Router::new()
        .route("/customers/:id/ledger", get(customer_ledger))
        .with_permission(permissions::DEBTS_READ);

    let write = Router::new()
        .route("/customers", post(create_customer))
        .route("/customers/:id", put(update_customer).delete(delete_customer))
        .with_permission(permissions::CUSTOMERS_WRITE);

    let reconcile = Router::new()
        .route("/customers/:id/reconcile", post(reconcile_customer))
        .with_permission(permissions::CUSTOMERS_RECONCILE);

    read.merge(ledger).merge(write).merge(reconcile)
}
