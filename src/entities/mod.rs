pub mod customer;
pub mod debt_payment;
pub mod expense;
pub mod product;
pub mod purchase_order;
pub mod purchase_order_item;
pub mod return_item;
pub mod return_request;
pub mod stock_history;
pub mod tenant;
pub mod transaction;
pub mod transaction_item;
pub mod user;

pub use customer::Entity as Customer;
pub use debt_payment::Entity as DebtPayment;
pub use expense::Entity as Expense;
pub use product::Entity as Product;
pub use purchase_order::Entity as PurchaseOrder;
pub use purchase_order_item::Entity as PurchaseOrderItem;
pub use return_item::Entity as ReturnItem;
pub use return_request::Entity as ReturnRequest;
pub use stock_history::Entity as StockHistory;
pub use tenant::Entity as Tenant;
pub use transaction::Entity as Transaction;
pub use transaction_item::Entity as TransactionItem;
pub use user::Entity as User;
