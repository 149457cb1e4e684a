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
    entities::expense,
    errors::ServiceError,
    handlers::AppState,
    services::{
        expenses::{CreateExpenseRequest, ExpenseFilter, ExpenseSummary, UpdateExpenseRequest},
        reports::ReportRange,
    },
    ListQuery,
};

/// List expenses, newest first
#[utoipa::path(
    get,
    path = "/api/v1/expenses",
    params(ListQuery, ExpenseFilter),
    responses(
        (status = 200, description = "Expenses", body = crate::ApiResponse<crate::PaginatedResponse<expense::Model>>)
    ),
    security(("Bearer" = [])),
    tag = "Expenses"
)]
pub async fn list_expenses(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
    Query(filter): Query<ExpenseFilter>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, limit) = state.page(&query);
    let rows = state
        .services
        .expenses
        .list_expenses(user.tenant_id, filter, page, limit)
        .await?;
    Ok(page_response(rows, page, limit))
}

/// Expense totals per category
#[utoipa::path(
    get,
    path = "/api/v1/expenses/summary",
    params(ReportRange),
    responses(
        (status = 200, description = "Expense summary", body = crate::ApiResponse<ExpenseSummary>)
    ),
    security(("Bearer" = [])),
    tag = "Expenses"
)]
pub async fn expense_summary(
    State(state): State<AppState>,
    user: AuthUser,
    Query(range): Query<ReportRange>,
) -> Result<impl IntoResponse, ServiceError> {
    let summary = state
        .services
        .expenses
        .expense_summary(user.tenant_id, range.from, range.to)
        .await?;
    Ok(success_response(summary))
}

/// Get an expense
#[utoipa::path(
    get,
    path = "/api/v1/expenses/:id",
    params(("id" = Uuid, Path, description = "Expense ID")),
    responses(
        (status = 200, description = "Expense", body = crate::ApiResponse<expense::Model>),
        (status = 404, description = "Expense not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Expenses"
)]
pub async fn get_expense(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let found = state.services.expenses.get_expense(user.tenant_id, id).await?;
    Ok(success_response(found))
}

/// Record an expense
#[utoipa::path(
    post,
    path = "/api/v1/expenses",
    request_body = CreateExpenseRequest,
    responses(
        (status = 201, description = "Expense recorded", body = crate::ApiResponse<expense::Model>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Expenses"
)]
pub async fn create_expense(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateExpenseRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let created = state
        .services
        .expenses
        .create_expense(user.tenant_id, user.user_id, payload)
        .await?;
    Ok(created_response(created))
}

/// Update an expense
#[utoipa::path(
    put,
    path = "/api/v1/expenses/:id",
    params(("id" = Uuid, Path, description = "Expense ID")),
    request_body = UpdateExpenseRequest,
    responses(
        (status = 200, description = "Expense updated", body = crate::ApiResponse<expense::Model>),
        (status = 404, description = "Expense not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Expenses"
)]
pub async fn update_expense(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateExpenseRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let updated = state
        .services
        .expenses
        .update_expense(user.tenant_id, id, payload)
        .await?;
    Ok(success_response(updated))
}

/// Delete an expense
#[utoipa::path(
    delete,
    path = "/api/v1/expenses/:id",
    params(("id" = Uuid, Path, description = "Expense ID")),
    responses(
        (status = 204, description = "Expense deleted"),
        (status = 404, description = "Expense not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Expenses"
)]
pub async fn delete_expense(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .expenses
        .delete_expense(user.tenant_id, id)
        .await?;
    Ok(no_content_response())
}

pub fn routes() -> Router<AppState> {
    let read = Router::new()
        .route("/expenses", get(list_expenses))
        .route("/expenses/summary", get(expense_summary))
        .route("/expenses/:id", get(get_expense))
        .with_permission(permissions::EXPENSES_READ);

    let write = Router::new()
        .route("/expenses", post(create_expense))
        .route("/expenses/:id", put(update_expense).delete(delete_expense))
        .with_permission(permissions::EXPENSES_WRITE);

    read.merge(write)
}
