use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
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
        transaction::{self, Entity as Transaction, PaymentMethod, TransactionStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        cart::round_money,
        customers::{
            adjust_customer_balance, customer_ledger, find_customer, ledger_summary, lock_customer,
            LedgerSummary,
        },
        fetch_page,
        sales::find_transaction,
    },
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct DebtFilter {
    pub customer_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaymentReceipt {
    pub payment: debt_payment::Model,
    pub transaction: transaction::Model,
    pub customer: customer::Model,
}

/// Result of applying a payment to a debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentEffect {
    pub outstanding: Decimal,
    pub amount_paid: Decimal,
    pub status: TransactionStatus,
}

/// Validates a payment against what is owed and computes the new balance.
pub fn apply_payment(
    outstanding: Decimal,
    amount_paid: Decimal,
    payment: Decimal,
) -> Result<PaymentEffect, ServiceError> {
    let payment = round_money(payment);
    if payment <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "payment amount must be positive".to_string(),
        ));
    }
    if outstanding <= Decimal::ZERO {
        return Err(ServiceError::InvalidOperation(
            "transaction has no outstanding balance".to_string(),
        ));
    }
    if payment > outstanding {
        return Err(ServiceError::InvalidOperation(format!(
            "payment {} exceeds outstanding balance {}",
            payment, outstanding
        )));
    }

    let remaining = round_money(outstanding - payment);
    Ok(PaymentEffect {
        outstanding: remaining,
        amount_paid: round_money(amount_paid + payment),
        status: TransactionStatus::for_outstanding(remaining),
    })
}

pub(crate) async fn lock_transaction<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    transaction_id: Uuid,
) -> Result<transaction::Model, ServiceError> {
    Transaction::find_by_id(transaction_id)
        .filter(transaction::Column::TenantId.eq(tenant_id))
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Transaction", transaction_id))
}

/// Service for collecting customer debt
#[derive(Clone)]
pub struct DebtService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl DebtService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    /// Sales that still have money owed on them, oldest first.
    #[instrument(skip(self))]
    pub async fn list_debts(
        &self,
        tenant_id: Uuid,
        filter: DebtFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<transaction::Model>, u64), ServiceError> {
        let mut query = Transaction::find()
            .filter(transaction::Column::TenantId.eq(tenant_id))
            .filter(transaction::Column::OutstandingBalance.gt(Decimal::ZERO));
        if let Some(customer_id) = filter.customer_id {
            query = query.filter(transaction::Column::CustomerId.eq(customer_id));
        }

        fetch_page(
            &*self.db_pool,
            query.order_by_asc(transaction::Column::CreatedAt),
            page,
            limit,
        )
        .await
    }

    /// Applies a payment to one sale and to its customer's running balance.
    #[instrument(skip(self, request), fields(amount = %request.amount))]
    pub async fn record_payment(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
        received_by: Uuid,
        request: RecordPaymentRequest,
    ) -> Result<PaymentReceipt, ServiceError> {
        if request.payment_method == PaymentMethod::Debt {
            return Err(ServiceError::ValidationError(
                "debt cannot be paid with debt".to_string(),
            ));
        }

        let txn = begin_write(&self.db_pool).await?;
        let sale = lock_transaction(&txn, tenant_id, transaction_id).await?;
        let customer_id = sale.customer_id.ok_or_else(|| {
            ServiceError::InvalidOperation("transaction has no customer".to_string())
        })?;
        let customer = lock_customer(&txn, tenant_id, customer_id).await?;

        let effect = apply_payment(sale.outstanding_balance, sale.amount_paid, request.amount)?;
        let amount = round_money(request.amount);
        let now = Utc::now();

        let payment = debt_payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            transaction_id: Set(transaction_id),
            customer_id: Set(customer_id),
            amount: Set(amount),
            payment_method: Set(request.payment_method),
            note: Set(request.note),
            received_by: Set(received_by),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut active: transaction::ActiveModel = sale.into();
        active.outstanding_balance = Set(effect.outstanding);
        active.amount_paid = Set(effect.amount_paid);
        active.status = Set(effect.status);
        active.updated_at = Set(now);
        let sale = active.update(&txn).await?;

        let customer = adjust_customer_balance(&txn, customer, -amount, Decimal::ZERO).await?;
        txn.commit().await?;

        counter!("retail_pos.debts.payments", 1);
        info!(%transaction_id, %amount, remaining = %effect.outstanding, "debt payment recorded");

        self.event_sender
            .send_or_log(Event::DebtPaymentRecorded {
                tenant_id,
                transaction_id,
                customer_id,
                amount,
                remaining: effect.outstanding,
            })
            .await;
        if effect.status == TransactionStatus::Completed {
            self.event_sender
                .send_or_log(Event::DebtSettled {
                    tenant_id,
                    transaction_id,
                    customer_id,
                })
                .await;
        }

        Ok(PaymentReceipt {
            payment,
            transaction: sale,
            customer,
        })
    }

    #[instrument(skip(self))]
    pub async fn payment_history(
        &self,
        tenant_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<Vec<debt_payment::Model>, ServiceError> {
        let db = &*self.db_pool;
        find_transaction(db, tenant_id, transaction_id).await?;

        Ok(DebtPayment::find()
            .filter(debt_payment::Column::TenantId.eq(tenant_id))
            .filter(debt_payment::Column::TransactionId.eq(transaction_id))
            .order_by_asc(debt_payment::Column::CreatedAt)
            .all(db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn ledger_summary(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
    ) -> Result<LedgerSummary, ServiceError> {
        let db = &*self.db_pool;
        find_customer(db, tenant_id, customer_id).await?;

        let (transactions, payments, returns) = customer_ledger(db, tenant_id, customer_id).await?;
        Ok(ledger_summary(&transactions, &payments, &returns))
    }
}
