use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{entities, handlers, services};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Retail POS API",
        version = "1.0.0",
        description = r#"
# Retail POS API

Backend for small shops: catalogue and stock, checkout, customer credit,
returns, supplier purchase orders, expenses and dashboard reporting.

## Authentication

Register a shop or log in to receive a token pair, then send the access token:

```
Authorization: Bearer <access-token>
```

## Idempotency

Mutating requests may carry an `Idempotency-Key` header. A repeated key
replays the first response instead of running the operation again.

## Pagination

List endpoints accept `page` (1-based) and `limit`.
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers((url = "http://localhost:8080", description = "Local development")),
    modifiers(&BearerAuth),
    tags(
        (name = "Auth", description = "Registration and sign-in"),
        (name = "Users", description = "Staff accounts"),
        (name = "Products", description = "Catalogue and stock"),
        (name = "Customers", description = "Customers and credit"),
        (name = "Sales", description = "Cart pricing, checkout and sales history"),
        (name = "Debts", description = "Customer debt collection"),
        (name = "Returns", description = "Return requests and review"),
        (name = "Purchase Orders", description = "Supplier purchasing"),
        (name = "Expenses", description = "Shop running costs"),
        (name = "Reports", description = "Dashboard figures")
    ),
    paths(
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::me,
        handlers::users::list_users,
        handlers::users::create_user,
        handlers::users::set_user_active,
        handlers::products::list_products,
        handlers::products::get_product,
        handlers::products::low_stock,
        handlers::products::stock_history,
        handlers::products::create_product,
        handlers::products::update_product,
        handlers::products::delete_product,
        handlers::products::adjust_stock,
        handlers::customers::list_customers,
        handlers::customers::get_customer,
        handlers::customers::customer_debts,
        handlers::customers::customer_ledger,
        handlers::customers::create_customer,
        handlers::customers::update_customer,
        handlers::customers::delete_customer,
        handlers::customers::reconcile_customer,
        handlers::sales::quote,
        handlers::sales::checkout,
        handlers::sales::list_transactions,
        handlers::sales::get_transaction,
        handlers::debts::list_debts,
        handlers::debts::payment_history,
        handlers::debts::record_payment,
        handlers::returns::create_return,
        handlers::returns::list_returns,
        handlers::returns::get_return,
        handlers::returns::approve_return,
        handlers::returns::reject_return,
        handlers::returns::revert_return,
        handlers::purchase_orders::list_purchase_orders,
        handlers::purchase_orders::get_purchase_order,
        handlers::purchase_orders::create_purchase_order,
        handlers::purchase_orders::cancel_purchase_order,
        handlers::purchase_orders::receive_purchase_order,
        handlers::expenses::list_expenses,
        handlers::expenses::expense_summary,
        handlers::expenses::get_expense,
        handlers::expenses::create_expense,
        handlers::expenses::update_expense,
        handlers::expenses::delete_expense,
        handlers::reports::dashboard,
        handlers::reports::daily_sales,
        handlers::reports::top_products,
    ),
    components(
        schemas(
            crate::ListQuery,
            crate::errors::ErrorResponse,
            crate::auth::TokenPair,
            entities::tenant::Model,
            entities::user::UserRole,
            entities::product::Model,
            entities::stock_history::Model,
            entities::stock_history::StockChangeType,
            entities::customer::Model,
            entities::transaction::Model,
            entities::transaction::PaymentMethod,
            entities::transaction::TransactionStatus,
            entities::transaction_item::Model,
            entities::debt_payment::Model,
            entities::return_request::Model,
            entities::return_request::ReturnStatus,
            entities::return_item::Model,
            entities::purchase_order::Model,
            entities::purchase_order::PurchaseOrderStatus,
            entities::purchase_order_item::Model,
            entities::expense::Model,
            services::cart::CartLine,
            services::cart::PricedLine,
            services::cart::CartTotals,
            services::tenancy::UserView,
            services::sales::SaleLine,
            services::returns::ReturnLine,
            services::purchase_orders::PurchaseOrderLine,
            services::expenses::CategoryTotal,
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDocV1::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_core_routes() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).unwrap();
        assert!(json.contains("Retail POS API"));
        assert!(json.contains("/api/v1/checkout"));
        assert!(json.contains("/api/v1/returns/:id/approve"));
        assert!(json.contains("\"Bearer\""));
    }
}
