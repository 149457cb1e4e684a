use std::collections::{HashMap, HashSet};
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
use validator::Validate;

use crate::{
    db::{begin_write, DbPool},
    entities::{
        return_item::{self, Entity as ReturnItem},
        return_request::{self, Entity as ReturnRequest, ReturnStatus},
        stock_history::StockChangeType,
        transaction::{self, TransactionStatus},
        transaction_item::{self, Entity as TransactionItem},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        cart::round_money,
        customers::{adjust_customer_balance, lock_customer},
        debts::lock_transaction,
        fetch_page,
        products::{apply_stock_change, publish_stock_events, StockChange, StockMovement},
        sales::find_transaction,
    },
};

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ReturnLine {
    pub transaction_item_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateReturnRequest {
    pub transaction_id: Uuid,
    #[validate(length(min = 1))]
    pub items: Vec<ReturnLine>,
    #[validate(length(min = 1, max = 1000))]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ReviewReturnRequest {
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct ReturnFilter {
    pub status: Option<ReturnStatus>,
    pub transaction_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReturnDetail {
    #[serde(flatten)]
    pub return_request: return_request::Model,
    pub items: Vec<return_item::Model>,
}

/// Splits what the customer actually paid for a sale, after the order
/// discount and tax, across its lines in proportion to their line totals.
/// The last line takes the rounding remainder so the shares add up to the
/// sale's `total_amount`.
pub fn net_line_totals(
    sale: &transaction::Model,
    items: &[transaction_item::Model],
) -> HashMap<Uuid, Decimal> {
    let mut ordered: Vec<&transaction_item::Model> = items.iter().collect();
    ordered.sort_by_key(|item| item.id);
    let subtotal: Decimal = ordered.iter().map(|item| item.line_total).sum();

    let mut shares = HashMap::with_capacity(ordered.len());
    if subtotal <= Decimal::ZERO {
        for item in ordered {
            shares.insert(item.id, Decimal::ZERO);
        }
        return shares;
    }

    let total = round_money(sale.total_amount);
    let last = ordered.len() - 1;
    let mut allocated = Decimal::ZERO;
    for (index, item) in ordered.into_iter().enumerate() {
        let share = if index == last {
            (total - allocated).max(Decimal::ZERO)
        } else {
            round_money(total * item.line_total / subtotal)
        };
        allocated += share;
        shares.insert(item.id, share);
    }
    shares
}

/// Refund for `quantity` more units of a line whose first `already` units
/// are returned or claimed. Priced as the difference of cumulative shares,
/// so returning every unit refunds exactly `net_total`.
pub fn line_refund(
    net_total: Decimal,
    item: &transaction_item::Model,
    already: i32,
    quantity: i32,
) -> Decimal {
    if item.quantity <= 0 {
        return Decimal::ZERO;
    }
    let sold = Decimal::from(item.quantity);
    let share = |units: i32| round_money(net_total * Decimal::from(units) / sold);
    (share(already + quantity) - share(already)).max(Decimal::ZERO)
}

/// What is left of the sale's total to refund.
pub fn refundable_balance(sale: &transaction::Model) -> Decimal {
    round_money(sale.total_amount - sale.refunded_amount).max(Decimal::ZERO)
}

/// Part of a refund written off against the sale's remaining debt.
pub fn debt_credit(refund: Decimal, outstanding: Decimal) -> Decimal {
    refund.min(outstanding).max(Decimal::ZERO)
}

async fn lock_return<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    return_id: Uuid,
) -> Result<return_request::Model, ServiceError> {
    ReturnRequest::find_by_id(return_id)
        .filter(return_request::Column::TenantId.eq(tenant_id))
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Return", return_id))
}

async fn return_items<C: ConnectionTrait>(
    conn: &C,
    return_id: Uuid,
) -> Result<Vec<return_item::Model>, ServiceError> {
    Ok(ReturnItem::find()
        .filter(return_item::Column::ReturnId.eq(return_id))
        .order_by_asc(return_item::Column::CreatedAt)
        .all(conn)
        .await?)
}

/// Quantities already claimed by pending returns, keyed by sale line.
async fn pending_quantities<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    transaction_id: Uuid,
) -> Result<HashMap<Uuid, i32>, ServiceError> {
    let pending_ids: Vec<Uuid> = ReturnRequest::find()
        .filter(return_request::Column::TenantId.eq(tenant_id))
        .filter(return_request::Column::TransactionId.eq(transaction_id))
        .filter(return_request::Column::Status.eq(ReturnStatus::Pending))
        .all(conn)
        .await?
        .into_iter()
        .map(|r| r.id)
        .collect();
    if pending_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut claimed = HashMap::new();
    for item in ReturnItem::find()
        .filter(return_item::Column::ReturnId.is_in(pending_ids))
        .all(conn)
        .await?
    {
        *claimed.entry(item.transaction_item_id).or_insert(0) += item.quantity;
    }
    Ok(claimed)
}

/// Service for return requests and their review
#[derive(Clone)]
pub struct ReturnService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl ReturnService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self, request), fields(transaction_id = %request.transaction_id))]
    pub async fn create_return(
        &self,
        tenant_id: Uuid,
        requested_by: Uuid,
        request: CreateReturnRequest,
    ) -> Result<ReturnDetail, ServiceError> {
        request.validate()?;
        let mut seen = HashSet::new();
        for line in &request.items {
            if !seen.insert(line.transaction_item_id) {
                return Err(ServiceError::ValidationError(
                    "each sale line may appear only once".to_string(),
                ));
            }
            if line.quantity < 1 {
                return Err(ServiceError::ValidationError(
                    "return quantity must be at least 1".to_string(),
                ));
            }
        }

        let txn = begin_write(&self.db_pool).await?;
        let sale = lock_transaction(&txn, tenant_id, request.transaction_id).await?;
        let lines = TransactionItem::find()
            .filter(transaction_item::Column::TransactionId.eq(sale.id))
            .all(&txn)
            .await?;
        let net_totals = net_line_totals(&sale, &lines);
        let sold: HashMap<Uuid, transaction_item::Model> =
            lines.into_iter().map(|item| (item.id, item)).collect();
        let claimed = pending_quantities(&txn, tenant_id, sale.id).await?;

        let now = Utc::now();
        let return_id = Uuid::new_v4();
        let mut rows = Vec::with_capacity(request.items.len());
        let mut refund_total = Decimal::ZERO;
        for line in &request.items {
            let item = sold.get(&line.transaction_item_id).ok_or_else(|| {
                ServiceError::not_found("Transaction item", line.transaction_item_id)
            })?;
            let pending = claimed.get(&item.id).copied().unwrap_or(0);
            let available = item.returnable_quantity() - pending;
            if line.quantity > available {
                return Err(ServiceError::InvalidOperation(format!(
                    "only {} of {} can still be returned",
                    available.max(0),
                    item.product_name
                )));
            }

            let net_total = net_totals.get(&item.id).copied().unwrap_or_default();
            let refund = line_refund(
                net_total,
                item,
                item.returned_quantity + pending,
                line.quantity,
            );
            refund_total += refund;
            rows.push(return_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                return_id: Set(return_id),
                tenant_id: Set(tenant_id),
                transaction_item_id: Set(item.id),
                product_id: Set(item.product_id),
                quantity: Set(line.quantity),
                refund_amount: Set(refund),
                created_at: Set(now),
            });
        }

        let created = return_request::ActiveModel {
            id: Set(return_id),
            tenant_id: Set(tenant_id),
            transaction_id: Set(sale.id),
            customer_id: Set(sale.customer_id),
            reason: Set(request.reason),
            status: Set(ReturnStatus::Pending),
            refund_amount: Set(round_money(refund_total).min(refundable_balance(&sale))),
            debt_credit: Set(Decimal::ZERO),
            requested_by: Set(requested_by),
            reviewed_by: Set(None),
            reviewed_at: Set(None),
            review_note: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(row.insert(&txn).await?);
        }
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ReturnRequested {
                tenant_id,
                return_id,
                transaction_id: sale.id,
            })
            .await;
        info!(%return_id, refund = %created.refund_amount, "return requested");

        Ok(ReturnDetail {
            return_request: created,
            items,
        })
    }

    /// Restocks the goods, credits the sale's debt first and leaves the rest
    /// as a cash refund.
    #[instrument(skip(self, request))]
    pub async fn approve_return(
        &self,
        tenant_id: Uuid,
        return_id: Uuid,
        reviewer: Uuid,
        request: ReviewReturnRequest,
    ) -> Result<ReturnDetail, ServiceError> {
        let txn = begin_write(&self.db_pool).await?;
        let pending = lock_return(&txn, tenant_id, return_id).await?;
        if pending.status != ReturnStatus::Pending {
            return Err(ServiceError::InvalidOperation(format!(
                "return is {:?}, only pending returns can be approved",
                pending.status
            )));
        }

        let sale = lock_transaction(&txn, tenant_id, pending.transaction_id).await?;
        let items = return_items(&txn, return_id).await?;

        let mut movements: Vec<StockMovement> = Vec::with_capacity(items.len());
        for item in &items {
            let line = TransactionItem::find_by_id(item.transaction_item_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::not_found("Transaction item", item.transaction_item_id))?;
            if item.quantity > line.returnable_quantity() {
                return Err(ServiceError::InvalidOperation(format!(
                    "{} has only {} unreturned",
                    line.product_name,
                    line.returnable_quantity()
                )));
            }

            let returned = line.returned_quantity + item.quantity;
            let mut active: transaction_item::ActiveModel = line.into();
            active.returned_quantity = Set(returned);
            active.update(&txn).await?;

            movements.push(
                apply_stock_change(
                    &txn,
                    StockChange {
                        tenant_id,
                        product_id: item.product_id,
                        delta: item.quantity,
                        kind: StockChangeType::Return,
                        reference_id: Some(return_id),
                        reference_type: Some("return"),
                        note: None,
                        actor: Some(reviewer),
                    },
                )
                .await?,
            );
        }

        let refund_amount = pending.refund_amount.min(refundable_balance(&sale));
        let credit = debt_credit(refund_amount, sale.outstanding_balance);
        let customer_id = sale.customer_id;
        let now = Utc::now();

        let outstanding = round_money(sale.outstanding_balance - credit);
        let refunded = round_money(sale.refunded_amount + refund_amount);
        let mut active: transaction::ActiveModel = sale.into();
        active.outstanding_balance = Set(outstanding);
        active.refunded_amount = Set(refunded);
        active.status = Set(TransactionStatus::for_outstanding(outstanding));
        active.updated_at = Set(now);
        active.update(&txn).await?;

        if let Some(customer_id) = customer_id {
            let customer = lock_customer(&txn, tenant_id, customer_id).await?;
            adjust_customer_balance(&txn, customer, -credit, -refund_amount).await?;
        }

        let mut active: return_request::ActiveModel = pending.into();
        active.status = Set(ReturnStatus::Approved);
        active.refund_amount = Set(refund_amount);
        active.debt_credit = Set(credit);
        active.reviewed_by = Set(Some(reviewer));
        active.reviewed_at = Set(Some(now));
        active.review_note = Set(request.note);
        active.updated_at = Set(now);
        let approved = active.update(&txn).await?;
        txn.commit().await?;

        counter!("retail_pos.returns.approved", 1);
        info!(%return_id, refund = %refund_amount, debt_credit = %credit, "return approved");

        self.event_sender
            .send_or_log(Event::ReturnApproved {
                tenant_id,
                return_id,
                refund_amount,
                debt_credit: credit,
            })
            .await;
        publish_stock_events(&self.event_sender, tenant_id, StockChangeType::Return, &movements).await;

        Ok(ReturnDetail {
            return_request: approved,
            items,
        })
    }

    #[instrument(skip(self, request))]
    pub async fn reject_return(
        &self,
        tenant_id: Uuid,
        return_id: Uuid,
        reviewer: Uuid,
        request: ReviewReturnRequest,
    ) -> Result<ReturnDetail, ServiceError> {
        let txn = begin_write(&self.db_pool).await?;
        let pending = lock_return(&txn, tenant_id, return_id).await?;
        if pending.status != ReturnStatus::Pending {
            return Err(ServiceError::InvalidOperation(format!(
                "return is {:?}, only pending returns can be rejected",
                pending.status
            )));
        }

        let now = Utc::now();
        let mut active: return_request::ActiveModel = pending.into();
        active.status = Set(ReturnStatus::Rejected);
        active.reviewed_by = Set(Some(reviewer));
        active.reviewed_at = Set(Some(now));
        active.review_note = Set(request.note);
        active.updated_at = Set(now);
        let rejected = active.update(&txn).await?;
        let items = return_items(&txn, return_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ReturnRejected {
                tenant_id,
                return_id,
            })
            .await;

        Ok(ReturnDetail {
            return_request: rejected,
            items,
        })
    }

    /// Undoes an approval: takes the goods back out of stock, restores the
    /// debt credit and puts the return back to pending.
    #[instrument(skip(self))]
    pub async fn revert_return(
        &self,
        tenant_id: Uuid,
        return_id: Uuid,
        actor: Uuid,
    ) -> Result<ReturnDetail, ServiceError> {
        let txn = begin_write(&self.db_pool).await?;
        let approved = lock_return(&txn, tenant_id, return_id).await?;
        if approved.status != ReturnStatus::Approved {
            return Err(ServiceError::InvalidOperation(format!(
                "return is {:?}, only approved returns can be reverted",
                approved.status
            )));
        }

        let sale = lock_transaction(&txn, tenant_id, approved.transaction_id).await?;
        let items = return_items(&txn, return_id).await?;

        let mut movements: Vec<StockMovement> = Vec::with_capacity(items.len());
        for item in &items {
            movements.push(
                apply_stock_change(
                    &txn,
                    StockChange {
                        tenant_id,
                        product_id: item.product_id,
                        delta: -item.quantity,
                        kind: StockChangeType::Adjustment,
                        reference_id: Some(return_id),
                        reference_type: Some("return"),
                        note: Some("return approval reverted".to_string()),
                        actor: Some(actor),
                    },
                )
                .await?,
            );

            let line = TransactionItem::find_by_id(item.transaction_item_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::not_found("Transaction item", item.transaction_item_id))?;
            let returned = (line.returned_quantity - item.quantity).max(0);
            let mut active: transaction_item::ActiveModel = line.into();
            active.returned_quantity = Set(returned);
            active.update(&txn).await?;
        }

        let credit = approved.debt_credit;
        let refund = approved.refund_amount;
        let customer_id = sale.customer_id;
        let now = Utc::now();

        let outstanding = round_money(sale.outstanding_balance + credit).min(sale.total_amount);
        let refunded = round_money(sale.refunded_amount - refund).max(Decimal::ZERO);
        let mut active: transaction::ActiveModel = sale.into();
        active.outstanding_balance = Set(outstanding);
        active.refunded_amount = Set(refunded);
        active.status = Set(TransactionStatus::for_outstanding(outstanding));
        active.updated_at = Set(now);
        active.update(&txn).await?;

        if let Some(customer_id) = customer_id {
            let customer = lock_customer(&txn, tenant_id, customer_id).await?;
            adjust_customer_balance(&txn, customer, credit, refund).await?;
        }

        let mut active: return_request::ActiveModel = approved.into();
        active.status = Set(ReturnStatus::Pending);
        active.debt_credit = Set(Decimal::ZERO);
        active.reviewed_by = Set(None);
        active.reviewed_at = Set(None);
        active.review_note = Set(None);
        active.updated_at = Set(now);
        let reverted = active.update(&txn).await?;
        txn.commit().await?;

        info!(%return_id, restored_debt = %credit, "return approval reverted");
        self.event_sender
            .send_or_log(Event::ReturnReverted {
                tenant_id,
                return_id,
            })
            .await;
        publish_stock_events(
            &self.event_sender,
            tenant_id,
            StockChangeType::Adjustment,
            &movements,
        )
        .await;

        Ok(ReturnDetail {
            return_request: reverted,
            items,
        })
    }

    #[instrument(skip(self))]
    pub async fn get_return(&self, tenant_id: Uuid, return_id: Uuid) -> Result<ReturnDetail, ServiceError> {
        let db = &*self.db_pool;
        let found = ReturnRequest::find_by_id(return_id)
            .filter(return_request::Column::TenantId.eq(tenant_id))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Return", return_id))?;
        let items = return_items(db, return_id).await?;
        Ok(ReturnDetail {
            return_request: found,
            items,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_returns(
        &self,
        tenant_id: Uuid,
        filter: ReturnFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<return_request::Model>, u64), ServiceError> {
        let db = &*self.db_pool;
        let mut query = ReturnRequest::find().filter(return_request::Column::TenantId.eq(tenant_id));
        if let Some(status) = filter.status {
            query = query.filter(return_request::Column::Status.eq(status));
        }
        if let Some(transaction_id) = filter.transaction_id {
            find_transaction(db, tenant_id, transaction_id).await?;
            query = query.filter(return_request::Column::TransactionId.eq(transaction_id));
        }

        fetch_page(
            db,
            query.order_by_desc(return_request::Column::CreatedAt),
            page,
            limit,
        )
        .await
    }
}
