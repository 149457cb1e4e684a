use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{begin_write, DbPool},
    entities::{
        customer::{self, Entity as Customer},
        debt_payment::{self, Entity as DebtPayment},
        return_request::{self, Entity as ReturnRequest, ReturnStatus},
        transaction::{self, Entity as Transaction},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{cart::round_money, fetch_page},
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub address: Option<String>,
    /// Omit for unlimited credit
    pub credit_limit: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateCustomerRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub address: Option<String>,
    pub credit_limit: Option<Decimal>,
    /// Set to remove the credit limit entirely
    #[serde(default)]
    pub clear_credit_limit: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct CustomerFilter {
    pub search: Option<String>,
    /// Only customers that currently owe money
    pub with_debt: Option<bool>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CustomerDetail {
    #[serde(flatten)]
    pub customer: customer::Model,
    pub available_credit: Option<Decimal>,
}

impl From<customer::Model> for CustomerDetail {
    fn from(customer: customer::Model) -> Self {
        Self {
            available_credit: customer.available_credit(),
            customer,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CustomerDebts {
    pub customer: CustomerDetail,
    pub open_transactions: Vec<transaction::Model>,
    pub payments: Vec<debt_payment::Model>,
    pub summary: LedgerSummary,
}

/// Debt totals for one customer.
///
/// The books balance when `total_debt = total_paid + outstanding +
/// returned_credit`; `drift` is whatever is left over and is zero for a
/// consistent ledger.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LedgerSummary {
    pub total_debt: Decimal,
    pub total_paid: Decimal,
    /// Debt written off by approved returns
    pub returned_credit: Decimal,
    pub outstanding: Decimal,
    pub drift: Decimal,
    pub balanced: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReconcileReport {
    pub customer_id: Uuid,
    pub stored_balance: Decimal,
    pub computed_balance: Decimal,
    pub drift: Decimal,
    pub corrected: bool,
}

pub(crate) async fn find_customer<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    customer_id: Uuid,
) -> Result<customer::Model, ServiceError> {
    Customer::find_by_id(customer_id)
        .filter(customer::Column::TenantId.eq(tenant_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Customer", customer_id))
}

/// Loads the customer row under an exclusive lock for a balance update.
pub(crate) async fn lock_customer<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    customer_id: Uuid,
) -> Result<customer::Model, ServiceError> {
    Customer::find_by_id(customer_id)
        .filter(customer::Column::TenantId.eq(tenant_id))
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Customer", customer_id))
}

/// Shifts a customer's running totals by signed amounts.
pub(crate) async fn adjust_customer_balance<C: ConnectionTrait>(
    conn: &C,
    customer: customer::Model,
    outstanding_delta: Decimal,
    purchases_delta: Decimal,
) -> Result<customer::Model, ServiceError> {
    let outstanding = round_money(customer.outstanding_balance + outstanding_delta);
    if outstanding < Decimal::ZERO {
        return Err(ServiceError::InvalidOperation(format!(
            "customer {} balance would become negative",
            customer.id
        )));
    }
    let purchases = round_money(customer.total_purchases + purchases_delta);
    if purchases < Decimal::ZERO {
        return Err(ServiceError::InvalidOperation(format!(
            "customer {} purchases total would become negative",
            customer.id
        )));
    }

    let mut active: customer::ActiveModel = customer.into();
    active.outstanding_balance = Set(outstanding);
    active.total_purchases = Set(purchases);
    active.updated_at = Set(Utc::now());
    Ok(active.update(conn).await?)
}

/// Ledger identity over a customer's transactions, payments and returns.
/// Returns that are not approved carry no credit and are skipped.
pub fn ledger_summary(
    transactions: &[transaction::Model],
    payments: &[debt_payment::Model],
    returns: &[return_request::Model],
) -> LedgerSummary {
    let total_debt = round_money(transactions.iter().map(|t| t.original_debt).sum());
    let outstanding = round_money(transactions.iter().map(|t| t.outstanding_balance).sum());
    let total_paid = round_money(payments.iter().map(|p| p.amount).sum());
    let returned_credit = round_money(
        returns
            .iter()
            .filter(|r| r.status == ReturnStatus::Approved)
            .map(|r| r.debt_credit)
            .sum(),
    );
    let drift = total_debt - total_paid - outstanding - returned_credit;

    LedgerSummary {
        total_debt,
        total_paid,
        returned_credit,
        outstanding,
        drift,
        balanced: drift.is_zero(),
    }
}

/// Everything `ledger_summary` needs for one customer.
pub(crate) async fn customer_ledger<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    customer_id: Uuid,
) -> Result<(Vec<transaction::Model>, Vec<debt_payment::Model>, Vec<return_request::Model>), ServiceError> {
    let transactions = Transaction::find()
        .filter(transaction::Column::TenantId.eq(tenant_id))
        .filter(transaction::Column::CustomerId.eq(customer_id))
        .filter(transaction::Column::OriginalDebt.gt(Decimal::ZERO))
        .order_by_desc(transaction::Column::CreatedAt)
        .all(conn)
        .await?;
    let payments = DebtPayment::find()
        .filter(debt_payment::Column::TenantId.eq(tenant_id))
        .filter(debt_payment::Column::CustomerId.eq(customer_id))
        .order_by_desc(debt_payment::Column::CreatedAt)
        .all(conn)
        .await?;
    let returns = ReturnRequest::find()
        .filter(return_request::Column::TenantId.eq(tenant_id))
        .filter(return_request::Column::CustomerId.eq(customer_id))
        .filter(return_request::Column::Status.eq(ReturnStatus::Approved))
        .all(conn)
        .await?;
    Ok((transactions, payments, returns))
}

fn validate_credit_limit(limit: Option<Decimal>) -> Result<Option<Decimal>, ServiceError> {
    match limit {
        Some(l) if l < Decimal::ZERO => Err(ServiceError::ValidationError(
            "credit limit cannot be negative".to_string(),
        )),
        other => Ok(other.map(round_money)),
    }
}

/// Service for customer accounts and their running debt balance
#[derive(Clone)]
pub struct CustomerService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CustomerService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self, request))]
    pub async fn create_customer(
        &self,
        tenant_id: Uuid,
        request: CreateCustomerRequest,
    ) -> Result<customer::Model, ServiceError> {
        request.validate()?;
        let credit_limit = validate_credit_limit(request.credit_limit)?;

        let now = Utc::now();
        let created = customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            name: Set(request.name.trim().to_string()),
            phone: Set(request.phone),
            email: Set(request.email),
            address: Set(request.address),
            credit_limit: Set(credit_limit),
            outstanding_balance: Set(Decimal::ZERO),
            total_purchases: Set(Decimal::ZERO),
            notes: Set(request.notes),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db_pool)
        .await?;

        self.event_sender
            .send_or_log(Event::CustomerCreated {
                tenant_id,
                customer_id: created.id,
            })
            .await;
        info!(customer_id = %created.id, "customer created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_customer(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
    ) -> Result<customer::Model, ServiceError> {
        find_customer(&*self.db_pool, tenant_id, customer_id).await
    }

    #[instrument(skip(self))]
    pub async fn list_customers(
        &self,
        tenant_id: Uuid,
        filter: CustomerFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<customer::Model>, u64), ServiceError> {
        let mut query = Customer::find().filter(customer::Column::TenantId.eq(tenant_id));

        if let Some(search) = filter.search.filter(|s| !s.trim().is_empty()) {
            let search = search.trim().to_string();
            query = query.filter(
                Condition::any()
                    .add(customer::Column::Name.contains(&search))
                    .add(customer::Column::Phone.contains(&search))
                    .add(customer::Column::Email.contains(&search)),
            );
        }
        if filter.with_debt == Some(true) {
            query = query.filter(customer::Column::OutstandingBalance.gt(Decimal::ZERO));
        }

        fetch_page(
            &*self.db_pool,
            query.order_by_asc(customer::Column::Name),
            page,
            limit,
        )
        .await
    }

    #[instrument(skip(self, request))]
    pub async fn update_customer(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
        request: UpdateCustomerRequest,
    ) -> Result<customer::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let existing = find_customer(db, tenant_id, customer_id).await?;

        let mut active: customer::ActiveModel = existing.into();
        if let Some(name) = request.name {
            active.name = Set(name);
        }
        if let Some(phone) = request.phone {
            active.phone = Set(Some(phone));
        }
        if let Some(email) = request.email {
            active.email = Set(Some(email));
        }
        if let Some(address) = request.address {
            active.address = Set(Some(address));
        }
        if request.clear_credit_limit {
            active.credit_limit = Set(None);
        } else if request.credit_limit.is_some() {
            active.credit_limit = Set(validate_credit_limit(request.credit_limit)?);
        }
        if let Some(notes) = request.notes {
            active.notes = Set(Some(notes));
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(db).await?)
    }

    /// Refused while the customer still owes money or has sales on record.
    #[instrument(skip(self))]
    pub async fn delete_customer(&self, tenant_id: Uuid, customer_id: Uuid) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let existing = find_customer(db, tenant_id, customer_id).await?;
        if existing.outstanding_balance > Decimal::ZERO {
            return Err(ServiceError::InvalidOperation(format!(
                "customer still owes {}",
                existing.outstanding_balance
            )));
        }

        let sales = Transaction::find()
            .filter(transaction::Column::CustomerId.eq(customer_id))
            .count(db)
            .await?;
        if sales > 0 {
            return Err(ServiceError::Conflict(
                "customer has recorded sales and cannot be deleted".to_string(),
            ));
        }

        Customer::delete_by_id(customer_id).exec(db).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn customer_debts(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
    ) -> Result<CustomerDebts, ServiceError> {
        let db = &*self.db_pool;
        let customer = find_customer(db, tenant_id, customer_id).await?;

        let (transactions, payments, returns) = customer_ledger(db, tenant_id, customer_id).await?;
        let summary = ledger_summary(&transactions, &payments, &returns);
        if !summary.balanced {
            warn!(%customer_id, drift = %summary.drift, "customer debt ledger does not balance");
        }
        let open_transactions = transactions
            .into_iter()
            .filter(|t| t.outstanding_balance > Decimal::ZERO)
            .collect();

        Ok(CustomerDebts {
            customer: customer.into(),
            open_transactions,
            payments,
            summary,
        })
    }

    /// Recomputes the stored balance from the customer's open transactions
    /// and corrects it when the two disagree.
    #[instrument(skip(self))]
    pub async fn reconcile(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
    ) -> Result<ReconcileReport, ServiceError> {
        let txn = begin_write(&self.db_pool).await?;
        let customer = lock_customer(&txn, tenant_id, customer_id).await?;

        let open = Transaction::find()
            .filter(transaction::Column::TenantId.eq(tenant_id))
            .filter(transaction::Column::CustomerId.eq(customer_id))
            .filter(transaction::Column::OutstandingBalance.gt(Decimal::ZERO))
            .all(&txn)
            .await?;
        let computed = round_money(open.iter().map(|t| t.outstanding_balance).sum());
        let stored = round_money(customer.outstanding_balance);
        let drift = computed - stored;

        let corrected = !drift.is_zero();
        if corrected {
            adjust_customer_balance(&txn, customer, drift, Decimal::ZERO).await?;
        }
        txn.commit().await?;

        if corrected {
            warn!(%customer_id, %stored, %computed, "customer balance drift corrected");
            self.event_sender
                .send_or_log(Event::CustomerBalanceCorrected {
                    tenant_id,
                    customer_id,
                    previous: stored,
                    corrected: computed,
                })
                .await;
        }

        Ok(ReconcileReport {
            customer_id,
            stored_balance: stored,
            computed_balance: computed,
            drift,
            corrected,
        })
    }
}
