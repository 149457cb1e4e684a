use std::sync::Arc;

use chrono::{NaiveDate, Utc};
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
        product,
        purchase_order::{self, Entity as PurchaseOrder, PurchaseOrderStatus},
        purchase_order_item::{self, Entity as PurchaseOrderItem},
        stock_history::StockChangeType,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        cart::round_money,
        fetch_page,
        products::{apply_stock_change, find_product, publish_stock_events, StockChange, StockMovement},
        short_code,
    },
};

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct PurchaseOrderLine {
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_cost: Decimal,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreatePurchaseOrderRequest {
    #[validate(length(min = 1, max = 255))]
    pub supplier_name: String,
    pub supplier_contact: Option<String>,
    #[validate(length(min = 1))]
    pub items: Vec<PurchaseOrderLine>,
    pub expected_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ReceivePurchaseOrderRequest {
    /// Copy each received unit cost onto the product's cost price
    #[serde(default)]
    pub update_cost_price: bool,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct PurchaseOrderFilter {
    pub status: Option<PurchaseOrderStatus>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PurchaseOrderDetail {
    #[serde(flatten)]
    pub purchase_order: purchase_order::Model,
    pub items: Vec<purchase_order_item::Model>,
}

async fn lock_purchase_order<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<purchase_order::Model, ServiceError> {
    PurchaseOrder::find_by_id(id)
        .filter(purchase_order::Column::TenantId.eq(tenant_id))
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Purchase order", id))
}

async fn order_items<C: ConnectionTrait>(
    conn: &C,
    purchase_order_id: Uuid,
) -> Result<Vec<purchase_order_item::Model>, ServiceError> {
    Ok(PurchaseOrderItem::find()
        .filter(purchase_order_item::Column::PurchaseOrderId.eq(purchase_order_id))
        .order_by_asc(purchase_order_item::Column::CreatedAt)
        .all(conn)
        .await?)
}

fn ensure_pending(order: &purchase_order::Model, action: &str) -> Result<(), ServiceError> {
    if order.status != PurchaseOrderStatus::Pending {
        return Err(ServiceError::InvalidOperation(format!(
            "purchase order {} is {:?} and cannot be {}",
            order.po_number, order.status, action
        )));
    }
    Ok(())
}

/// Service for supplier purchase orders
#[derive(Clone)]
pub struct PurchaseOrderService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl PurchaseOrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    #[instrument(skip(self, request), fields(supplier = %request.supplier_name))]
    pub async fn create_purchase_order(
        &self,
        tenant_id: Uuid,
        created_by: Uuid,
        request: CreatePurchaseOrderRequest,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        request.validate()?;
        for line in &request.items {
            if line.quantity < 1 {
                return Err(ServiceError::ValidationError(
                    "ordered quantity must be at least 1".to_string(),
                ));
            }
            if line.unit_cost < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "unit cost cannot be negative".to_string(),
                ));
            }
        }

        let txn = begin_write(&self.db_pool).await?;
        let now = Utc::now();
        let id = Uuid::new_v4();

        let mut rows = Vec::with_capacity(request.items.len());
        let mut total_cost = Decimal::ZERO;
        for line in &request.items {
            find_product(&txn, tenant_id, line.product_id).await?;
            let unit_cost = round_money(line.unit_cost);
            let line_total = round_money(unit_cost * Decimal::from(line.quantity));
            total_cost += line_total;
            rows.push(purchase_order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                purchase_order_id: Set(id),
                tenant_id: Set(tenant_id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                unit_cost: Set(unit_cost),
                line_total: Set(line_total),
                created_at: Set(now),
            });
        }

        let order = purchase_order::ActiveModel {
            id: Set(id),
            tenant_id: Set(tenant_id),
            po_number: Set(format!("PO-{}", short_code(id))),
            supplier_name: Set(request.supplier_name.trim().to_string()),
            supplier_contact: Set(request.supplier_contact),
            status: Set(PurchaseOrderStatus::Pending),
            total_cost: Set(total_cost),
            expected_date: Set(request.expected_date),
            received_at: Set(None),
            notes: Set(request.notes),
            created_by: Set(created_by),
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
            .send_or_log(Event::PurchaseOrderCreated {
                tenant_id,
                purchase_order_id: id,
            })
            .await;
        info!(purchase_order_id = %id, po_number = %order.po_number, "purchase order created");

        Ok(PurchaseOrderDetail {
            purchase_order: order,
            items,
        })
    }

    /// Books the delivered goods into stock.
    #[instrument(skip(self, request))]
    pub async fn receive_purchase_order(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        received_by: Uuid,
        request: ReceivePurchaseOrderRequest,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        let txn = begin_write(&self.db_pool).await?;
        let order = lock_purchase_order(&txn, tenant_id, id).await?;
        ensure_pending(&order, "received")?;
        let items = order_items(&txn, id).await?;

        let mut movements: Vec<StockMovement> = Vec::with_capacity(items.len());
        for item in &items {
            let movement = apply_stock_change(
                &txn,
                StockChange {
                    tenant_id,
                    product_id: item.product_id,
                    delta: item.quantity,
                    kind: StockChangeType::Restock,
                    reference_id: Some(id),
                    reference_type: Some("purchase_order"),
                    note: Some(order.po_number.clone()),
                    actor: Some(received_by),
                },
            )
            .await?;

            if request.update_cost_price && movement.product.cost_price != item.unit_cost {
                let mut active: product::ActiveModel = movement.product.clone().into();
                active.cost_price = Set(item.unit_cost);
                active.updated_at = Set(Utc::now());
                active.update(&txn).await?;
            }
            movements.push(movement);
        }

        let now = Utc::now();
        let total_cost = order.total_cost;
        let mut active: purchase_order::ActiveModel = order.into();
        active.status = Set(PurchaseOrderStatus::Received);
        active.received_at = Set(Some(now));
        active.updated_at = Set(now);
        let received = active.update(&txn).await?;
        txn.commit().await?;

        info!(purchase_order_id = %id, "purchase order received");
        self.event_sender
            .send_or_log(Event::PurchaseOrderReceived {
                tenant_id,
                purchase_order_id: id,
                total_cost,
            })
            .await;
        publish_stock_events(&self.event_sender, tenant_id, StockChangeType::Restock, &movements).await;

        Ok(PurchaseOrderDetail {
            purchase_order: received,
            items,
        })
    }

    #[instrument(skip(self))]
    pub async fn cancel_purchase_order(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<purchase_order::Model, ServiceError> {
        let txn = begin_write(&self.db_pool).await?;
        let order = lock_purchase_order(&txn, tenant_id, id).await?;
        ensure_pending(&order, "cancelled")?;

        let mut active: purchase_order::ActiveModel = order.into();
        active.status = Set(PurchaseOrderStatus::Cancelled);
        active.updated_at = Set(Utc::now());
        let cancelled = active.update(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::PurchaseOrderCancelled {
                tenant_id,
                purchase_order_id: id,
            })
            .await;
        Ok(cancelled)
    }

    #[instrument(skip(self))]
    pub async fn get_purchase_order(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        let db = &*self.db_pool;
        let order = PurchaseOrder::find_by_id(id)
            .filter(purchase_order::Column::TenantId.eq(tenant_id))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Purchase order", id))?;
        let items = order_items(db, id).await?;
        Ok(PurchaseOrderDetail {
            purchase_order: order,
            items,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_purchase_orders(
        &self,
        tenant_id: Uuid,
        filter: PurchaseOrderFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<purchase_order::Model>, u64), ServiceError> {
        let mut query = PurchaseOrder::find().filter(purchase_order::Column::TenantId.eq(tenant_id));
        if let Some(status) = filter.status {
            query = query.filter(purchase_order::Column::Status.eq(status));
        }
        fetch_page(
            &*self.db_pool,
            query.order_by_desc(purchase_order::Column::CreatedAt),
            page,
            limit,
        )
        .await
    }
}
