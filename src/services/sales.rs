use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    db::{begin_write, DbPool},
    entities::{
        customer,
        debt_payment::{self, Entity as DebtPayment},
        product::{self, Entity as Product},
        stock_history::StockChangeType,
        transaction::{self, Entity as Transaction, PaymentMethod, TransactionStatus},
        transaction_item::{self, Entity as TransactionItem},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        cart::{round_money, Cart, CartLine, CartTotals},
        customers::{adjust_customer_balance, find_customer, lock_customer},
        fetch_page,
        products::{apply_stock_change, publish_stock_events, StockChange, StockMovement},
        short_code,
    },
};

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct SaleLine {
    pub product_id: Uuid,
    pub quantity: i32,
    #[serde(default)]
    pub discount: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct QuoteRequest {
    pub items: Vec<SaleLine>,
    pub discount: Option<Decimal>,
    /// Overrides the shop's default tax rate
    pub tax_rate: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub items: Vec<SaleLine>,
    pub customer_id: Option<Uuid>,
    pub payment_method: PaymentMethod,
    /// Cash handed over; for debt sales, the part paid up front
    #[serde(default)]
    pub amount_paid: Decimal,
    pub discount: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct TransactionFilter {
    pub status: Option<TransactionStatus>,
    pub customer_id: Option<Uuid>,
    pub payment_method: Option<PaymentMethod>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionDetail {
    #[serde(flatten)]
    pub transaction: transaction::Model,
    pub items: Vec<transaction_item::Model>,
    pub customer: Option<customer::Model>,
    pub payments: Vec<debt_payment::Model>,
}

/// How a sale is settled given its total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub amount_paid: Decimal,
    pub change: Decimal,
    pub outstanding: Decimal,
}

/// Splits `tendered` against `total`. Debt sales keep the unpaid part
/// outstanding; every other method must cover the total.
pub fn settle(
    method: PaymentMethod,
    total: Decimal,
    tendered: Decimal,
    has_customer: bool,
) -> Result<Settlement, ServiceError> {
    let tendered = round_money(tendered);
    if tendered < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "amount paid cannot be negative".to_string(),
        ));
    }

    match method {
        PaymentMethod::Debt => {
            if !has_customer {
                return Err(ServiceError::ValidationError(
                    "a debt sale requires a customer".to_string(),
                ));
            }
            if tendered > total {
                return Err(ServiceError::ValidationError(format!(
                    "amount paid {} exceeds total {} for a debt sale",
                    tendered, total
                )));
            }
            Ok(Settlement {
                amount_paid: tendered,
                change: Decimal::ZERO,
                outstanding: total - tendered,
            })
        }
        _ => {
            if tendered < total {
                return Err(ServiceError::ValidationError(format!(
                    "amount paid {} does not cover total {}",
                    tendered, total
                )));
            }
            Ok(Settlement {
                amount_paid: total,
                change: tendered - total,
                outstanding: Decimal::ZERO,
            })
        }
    }
}

/// Enforces the customer's credit limit for new debt.
pub fn check_credit(customer: &customer::Model, new_debt: Decimal) -> Result<(), ServiceError> {
    if new_debt <= Decimal::ZERO {
        return Ok(());
    }
    if let Some(limit) = customer.credit_limit {
        let projected = customer.outstanding_balance + new_debt;
        if projected > limit {
            return Err(ServiceError::CreditLimitExceeded(format!(
                "{} would owe {} against a limit of {}",
                customer.name, projected, limit
            )));
        }
    }
    Ok(())
}

fn receipt_number(id: Uuid, at: DateTime<Utc>) -> String {
    format!("RCP-{}-{}", at.format("%Y%m%d"), short_code(id))
}

/// Service for quoting and recording sales
#[derive(Clone)]
pub struct SalesService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    default_tax_rate: Decimal,
}

impl SalesService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, default_tax_rate: Decimal) -> Self {
        Self {
            db_pool,
            event_sender,
            default_tax_rate,
        }
    }

    /// Builds a priced cart from current catalog prices. Only active products
    /// of the tenant qualify.
    async fn build_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        tenant_id: Uuid,
        items: &[SaleLine],
        discount: Option<Decimal>,
        tax_rate: Option<Decimal>,
    ) -> Result<(Cart, HashMap<Uuid, product::Model>), ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::ValidationError(
                "a sale needs at least one item".to_string(),
            ));
        }

        let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products: HashMap<Uuid, product::Model> = Product::find()
            .filter(product::Column::TenantId.eq(tenant_id))
            .filter(product::Column::Id.is_in(ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut cart = Cart::new(tax_rate.unwrap_or(self.default_tax_rate))
            .with_discount(discount.unwrap_or_default());
        for item in items {
            if item.quantity < 1 {
                return Err(ServiceError::ValidationError(format!(
                    "quantity for product {} must be at least 1",
                    item.product_id
                )));
            }
            let product = products
                .get(&item.product_id)
                .ok_or_else(|| ServiceError::not_found("Product", item.product_id))?;
            if !product.is_active {
                return Err(ServiceError::InvalidOperation(format!(
                    "{} is no longer sold",
                    product.name
                )));
            }
            cart.add_line(CartLine {
                product_id: product.id,
                name: product.name.clone(),
                quantity: item.quantity,
                unit_price: product.price,
                discount: item.discount.unwrap_or_default(),
            });
        }
        Ok((cart, products))
    }

    #[instrument(skip(self, request))]
    pub async fn quote(&self, tenant_id: Uuid, request: QuoteRequest) -> Result<CartTotals, ServiceError> {
        let (cart, _) = self
            .build_cart(
                &*self.db_pool,
                tenant_id,
                &request.items,
                request.discount,
                request.tax_rate,
            )
            .await?;
        cart.totals()
    }

    /// Records a sale. Stock, the sale rows and the customer balance are
    /// written in one database transaction.
    #[instrument(skip(self, request), fields(items = request.items.len(), method = ?request.payment_method))]
    pub async fn checkout(
        &self,
        tenant_id: Uuid,
        cashier_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<TransactionDetail, ServiceError> {
        let started = std::time::Instant::now();
        let txn = begin_write(&self.db_pool).await?;

        let (cart, products) = self
            .build_cart(
                &txn,
                tenant_id,
                &request.items,
                request.discount,
                request.tax_rate,
            )
            .await?;
        let totals = cart.totals()?;
        let settlement = settle(
            request.payment_method,
            totals.total,
            request.amount_paid,
            request.customer_id.is_some(),
        )?;

        let customer = match request.customer_id {
            Some(customer_id) => {
                let customer = lock_customer(&txn, tenant_id, customer_id).await?;
                check_credit(&customer, settlement.outstanding)?;
                Some(customer)
            }
            None => None,
        };

        let now = Utc::now();
        let transaction_id = Uuid::new_v4();
        let sale = transaction::ActiveModel {
            id: Set(transaction_id),
            tenant_id: Set(tenant_id),
            receipt_number: Set(receipt_number(transaction_id, now)),
            customer_id: Set(request.customer_id),
            cashier_id: Set(cashier_id),
            subtotal: Set(totals.subtotal),
            discount_amount: Set(totals.discount),
            tax_amount: Set(totals.tax),
            total_amount: Set(totals.total),
            amount_paid: Set(settlement.amount_paid),
            change_amount: Set(settlement.change),
            original_debt: Set(settlement.outstanding),
            outstanding_balance: Set(settlement.outstanding),
            refunded_amount: Set(Decimal::ZERO),
            payment_method: Set(request.payment_method),
            status: Set(TransactionStatus::for_outstanding(settlement.outstanding)),
            notes: Set(request.notes),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(totals.lines.len());
        let mut movements: Vec<StockMovement> = Vec::with_capacity(totals.lines.len());
        for line in &totals.lines {
            let cost_price = products
                .get(&line.product_id)
                .map(|p| p.cost_price)
                .unwrap_or_default();
            let item = transaction_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                transaction_id: Set(transaction_id),
                tenant_id: Set(tenant_id),
                product_id: Set(line.product_id),
                product_name: Set(line.name.clone()),
                quantity: Set(line.quantity),
                unit_price: Set(line.unit_price),
                cost_price: Set(cost_price),
                discount_amount: Set(round_money(line.discount)),
                line_total: Set(line.line_total),
                returned_quantity: Set(0),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            items.push(item);

            let movement = apply_stock_change(
                &txn,
                StockChange {
                    tenant_id,
                    product_id: line.product_id,
                    delta: -line.quantity,
                    kind: StockChangeType::Sale,
                    reference_id: Some(transaction_id),
                    reference_type: Some("transaction"),
                    note: None,
                    actor: Some(cashier_id),
                },
            )
            .await?;
            movements.push(movement);
        }

        let customer = match customer {
            Some(customer) => Some(
                adjust_customer_balance(&txn, customer, settlement.outstanding, totals.total)
                    .await?,
            ),
            None => None,
        };

        txn.commit().await?;

        counter!("retail_pos.sales.completed", 1, "method" => format!("{:?}", request.payment_method).to_lowercase());
        histogram!("retail_pos.sales.checkout_seconds", started.elapsed().as_secs_f64());
        info!(
            %transaction_id,
            total = %sale.total_amount,
            outstanding = %sale.outstanding_balance,
            "sale completed"
        );

        self.event_sender
            .send_or_log(Event::SaleCompleted {
                tenant_id,
                transaction_id,
                customer_id: sale.customer_id,
                total_amount: sale.total_amount,
                outstanding_balance: sale.outstanding_balance,
                occurred_at: now,
            })
            .await;
        publish_stock_events(&self.event_sender, tenant_id, StockChangeType::Sale, &movements).await;

        Ok(TransactionDetail {
            transaction: sale,
            items,
            customer,
            payments: Vec::new(),
        })
    }

    #[instrument(skip(self))]
    pub async fn get_transaction(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<TransactionDetail, ServiceError> {
        let db = &*self.db_pool;
        let sale = find_transaction(db, tenant_id, transaction_id).await?;

        let items = TransactionItem::find()
            .filter(transaction_item::Column::TransactionId.eq(transaction_id))
            .order_by_asc(transaction_item::Column::CreatedAt)
            .all(db)
            .await?;
        let payments = DebtPayment::find()
            .filter(debt_payment::Column::TransactionId.eq(transaction_id))
            .order_by_asc(debt_payment::Column::CreatedAt)
            .all(db)
            .await?;
        let customer = match sale.customer_id {
            Some(customer_id) => Some(find_customer(db, tenant_id, customer_id).await?),
            None => None,
        };

        Ok(TransactionDetail {
            transaction: sale,
            items,
            customer,
            payments,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_transactions(
        &self,
        tenant_id: Uuid,
        filter: TransactionFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<transaction::Model>, u64), ServiceError> {
        let mut query = Transaction::find().filter(transaction::Column::TenantId.eq(tenant_id));
        if let Some(status) = filter.status {
            query = query.filter(transaction::Column::Status.eq(status));
        }
        if let Some(customer_id) = filter.customer_id {
            query = query.filter(transaction::Column::CustomerId.eq(customer_id));
        }
        if let Some(method) = filter.payment_method {
            query = query.filter(transaction::Column::PaymentMethod.eq(method));
        }
        if let Some(from) = filter.from {
            query = query.filter(transaction::Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(transaction::Column::CreatedAt.lt(to));
        }

        fetch_page(
            &*self.db_pool,
            query.order_by_desc(transaction::Column::CreatedAt),
            page,
            limit,
        )
        .await
    }
}

pub(crate) async fn find_transaction<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    transaction_id: Uuid,
) -> Result<transaction::Model, ServiceError> {
    Transaction::find_by_id(transaction_id)
        .filter(transaction::Column::TenantId.eq(tenant_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Transaction", transaction_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn customer(limit: Option<Decimal>, owed: Decimal) -> customer::Model {
        let now = Utc::now();
        customer::Model {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            name: "Kofi".to_string(),
            phone: None,
            email: None,
            address: None,
            credit_limit: limit,
            outstanding_balance: owed,
            total_purchases: Decimal::ZERO,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn cash_sale_returns_change() {
        let s = settle(PaymentMethod::Cash, dec!(18.50), dec!(20), false).unwrap();
        assert_eq!(s.amount_paid, dec!(18.50));
        assert_eq!(s.change, dec!(1.50));
        assert_eq!(s.outstanding, Decimal::ZERO);
    }

    #[test]
    fn card_sale_must_cover_total() {
        assert_matches!(
            settle(PaymentMethod::Card, dec!(10), dec!(9.99), false),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn debt_sale_requires_customer() {
        assert_matches!(
            settle(PaymentMethod::Debt, dec!(10), Decimal::ZERO, false),
            Err(ServiceError::ValidationError(_))
        );
        let s = settle(PaymentMethod::Debt, dec!(10), dec!(4), true).unwrap();
        assert_eq!(s.outstanding, dec!(6));
        assert_eq!(s.change, Decimal::ZERO);
    }

    #[test]
    fn credit_limit_is_inclusive() {
        let c = customer(Some(dec!(100)), dec!(60));
        assert!(check_credit(&c, dec!(40)).is_ok());
        assert_matches!(
            check_credit(&c, dec!(40.01)),
            Err(ServiceError::CreditLimitExceeded(_))
        );
        assert!(check_credit(&customer(None, dec!(1000)), dec!(5000)).is_ok());
    }

    #[test]
    fn receipt_numbers_are_dated() {
        let at = DateTime::parse_from_rfc3339("2024-03-05T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let number = receipt_number(Uuid::new_v4(), at);
        assert!(number.starts_with("RCP-20240305-"));
        assert_eq!(number.len(), "RCP-20240305-".len() + 8);
    }
}
