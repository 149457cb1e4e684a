pub mod auth;
pub mod common;
pub mod customers;
pub mod debts;
pub mod expenses;
pub mod products;
pub mod purchase_orders;
pub mod reports;
pub mod returns;
pub mod sales;
pub mod users;

use std::sync::Arc;

use crate::{
    auth::AuthService,
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        customers::CustomerService, debts::DebtService, expenses::ExpenseService,
        products::ProductService, purchase_orders::PurchaseOrderService, reports::ReportService,
        returns::ReturnService, sales::SalesService, tenancy::TenancyService,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub tenancy: Arc<TenancyService>,
    pub products: Arc<ProductService>,
    pub customers: Arc<CustomerService>,
    pub sales: Arc<SalesService>,
    pub debts: Arc<DebtService>,
    pub returns: Arc<ReturnService>,
    pub purchase_orders: Arc<PurchaseOrderService>,
    pub expenses: Arc<ExpenseService>,
    pub reports: Arc<ReportService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        auth_service: Arc<AuthService>,
        config: &AppConfig,
    ) -> Self {
        Self {
            tenancy: Arc::new(TenancyService::new(
                db_pool.clone(),
                event_sender.clone(),
                auth_service,
                config.default_currency.clone(),
            )),
            products: Arc::new(ProductService::new(
                db_pool.clone(),
                event_sender.clone(),
                config.low_stock_threshold,
            )),
            customers: Arc::new(CustomerService::new(db_pool.clone(), event_sender.clone())),
            sales: Arc::new(SalesService::new(
                db_pool.clone(),
                event_sender.clone(),
                config.tax_rate(),
            )),
            debts: Arc::new(DebtService::new(db_pool.clone(), event_sender.clone())),
            returns: Arc::new(ReturnService::new(db_pool.clone(), event_sender.clone())),
            purchase_orders: Arc::new(PurchaseOrderService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            expenses: Arc::new(ExpenseService::new(db_pool.clone(), event_sender)),
            reports: Arc::new(ReportService::new(db_pool)),
        }
    }
}
