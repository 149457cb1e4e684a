use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::{begin_write, DbPool},
    entities::{
        product::{self, Entity as Product},
        purchase_order_item::{self, Entity as PurchaseOrderItem},
        stock_history::{self, Entity as StockHistory, StockChangeType},
        transaction_item::{self, Entity as TransactionItem},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{cart::round_money, fetch_page},
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub sku: String,
    pub barcode: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub price: Decimal,
    pub cost_price: Option<Decimal>,
    #[validate(range(min = 0))]
    pub initial_stock: Option<i32>,
    #[validate(range(min = 0))]
    pub min_stock_level: Option<i32>,
}

/// Partial update; stock is only changed through stock movements.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub price: Option<Decimal>,
    pub cost_price: Option<Decimal>,
    #[validate(range(min = 0))]
    pub min_stock_level: Option<i32>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AdjustStockRequest {
    /// Signed change; negative removes stock
    pub quantity_change: i32,
    #[validate(length(min = 1, max = 500))]
    pub note: String,
}

/// A stock movement to apply inside the caller's database transaction.
#[derive(Debug, Clone)]
pub struct StockChange {
    pub tenant_id: Uuid,
    pub product_id: Uuid,
    pub delta: i32,
    pub kind: StockChangeType,
    pub reference_id: Option<Uuid>,
    pub reference_type: Option<&'static str>,
    pub note: Option<String>,
    pub actor: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StockMovement {
    pub product: product::Model,
    pub previous_quantity: i32,
    pub new_quantity: i32,
}

impl StockMovement {
    /// True when this movement took the product from above its minimum to at or below it.
    pub fn crossed_minimum(&self) -> bool {
        self.previous_quantity > self.product.min_stock_level && self.product.is_low_stock()
    }
}

pub(crate) async fn find_product<C: ConnectionTrait>(
    conn: &C,
    tenant_id: Uuid,
    product_id: Uuid,
) -> Result<product::Model, ServiceError> {
    Product::find_by_id(product_id)
        .filter(product::Column::TenantId.eq(tenant_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::not_found("Product", product_id))
}

/// Applies a signed stock change and appends its history row.
///
/// The decrement is a conditional update, so stock never goes below zero even
/// when several sales race for the last units.
pub(crate) async fn apply_stock_change<C: ConnectionTrait>(
    conn: &C,
    change: StockChange,
) -> Result<StockMovement, ServiceError> {
    if change.delta == 0 {
        return Err(ServiceError::InvalidInput(
            "stock change cannot be zero".to_string(),
        ));
    }

    let mut update = Product::update_many()
        .col_expr(
            product::Column::StockQuantity,
            Expr::col(product::Column::StockQuantity).add(change.delta),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(change.product_id))
        .filter(product::Column::TenantId.eq(change.tenant_id));
    if change.delta < 0 {
        update = update.filter(product::Column::StockQuantity.gte(-change.delta));
    }

    let result = update.exec(conn).await?;
    if result.rows_affected == 0 {
        let product = find_product(conn, change.tenant_id, change.product_id).await?;
        return Err(ServiceError::InsufficientStock(format!(
            "{} has {} in stock, {} requested",
            product.name, product.stock_quantity, -change.delta
        )));
    }

    let product = find_product(conn, change.tenant_id, change.product_id).await?;
    let new_quantity = product.stock_quantity;
    let previous_quantity = new_quantity - change.delta;

    stock_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(change.tenant_id),
        product_id: Set(change.product_id),
        change_type: Set(change.kind),
        quantity_change: Set(change.delta),
        previous_quantity: Set(previous_quantity),
        new_quantity: Set(new_quantity),
        reference_id: Set(change.reference_id),
        reference_type: Set(change.reference_type.map(str::to_string)),
        note: Set(change.note),
        created_by: Set(change.actor),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;

    Ok(StockMovement {
        product,
        previous_quantity,
        new_quantity,
    })
}

/// Publishes stock events for movements that have committed.
pub(crate) async fn publish_stock_events(
    event_sender: &EventSender,
    tenant_id: Uuid,
    kind: StockChangeType,
    movements: &[StockMovement],
) {
    for movement in movements {
        event_sender
            .send_or_log(Event::StockChanged {
                tenant_id,
                product_id: movement.product.id,
                change_type: kind.as_str().to_string(),
                quantity_change: movement.new_quantity - movement.previous_quantity,
                new_quantity: movement.new_quantity,
            })
            .await;
        if movement.crossed_minimum() {
            event_sender
                .send_or_log(Event::LowStock {
                    tenant_id,
                    product_id: movement.product.id,
                    stock_quantity: movement.new_quantity,
                    min_stock_level: movement.product.min_stock_level,
                })
                .await;
        }
    }
}

fn validate_money(field: &str, amount: Decimal) -> Result<Decimal, ServiceError> {
    if amount < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "{} cannot be negative",
            field
        )));
    }
    Ok(round_money(amount))
}

/// Trimmed text for a field that must not be blank.
fn required_text(field: &str, value: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::ValidationError(format!("{} cannot be blank", field)));
    }
    Ok(trimmed.to_string())
}

/// Service for the product catalog and stock levels
#[derive(Clone)]
pub struct ProductService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    default_min_stock: i32,
}

impl ProductService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, default_min_stock: i32) -> Self {
        Self {
            db_pool,
            event_sender,
            default_min_stock,
        }
    }

    async fn ensure_sku_free<C: ConnectionTrait>(
        conn: &C,
        tenant_id: Uuid,
        sku: &str,
        except: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut query = Product::find()
            .filter(product::Column::TenantId.eq(tenant_id))
            .filter(product::Column::Sku.eq(sku));
        if let Some(id) = except {
            query = query.filter(product::Column::Id.ne(id));
        }
        if query.one(conn).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "a product with SKU '{}' already exists",
                sku
            )));
        }
        Ok(())
    }

    #[instrument(skip(self, request), fields(sku = %request.sku))]
    pub async fn create_product(
        &self,
        tenant_id: Uuid,
        actor: Uuid,
        request: CreateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        request.validate()?;
        let price = validate_money("price", request.price)?;
        let cost_price = validate_money("cost_price", request.cost_price.unwrap_or_default())?;
        let sku = required_text("sku", &request.sku)?;
        let name = required_text("name", &request.name)?;

        let txn = begin_write(&self.db_pool).await?;
        Self::ensure_sku_free(&txn, tenant_id, &sku, None).await?;

        let now = Utc::now();
        let mut created = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            name: Set(name),
            sku: Set(sku),
            barcode: Set(request.barcode),
            category: Set(request.category),
            description: Set(request.description),
            unit: Set(request.unit.unwrap_or_else(|| "pcs".to_string())),
            price: Set(price),
            cost_price: Set(cost_price),
            stock_quantity: Set(0),
            min_stock_level: Set(request.min_stock_level.unwrap_or(self.default_min_stock)),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let initial_stock = request.initial_stock.unwrap_or(0);
        if initial_stock > 0 {
            let movement = apply_stock_change(
                &txn,
                StockChange {
                    tenant_id,
                    product_id: created.id,
                    delta: initial_stock,
                    kind: StockChangeType::Restock,
                    reference_id: None,
                    reference_type: None,
                    note: Some("initial stock".to_string()),
                    actor: Some(actor),
                },
            )
            .await?;
            created = movement.product;
        }
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ProductCreated {
                tenant_id,
                product_id: created.id,
            })
            .await;
        info!(product_id = %created.id, "product created");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_product(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
    ) -> Result<product::Model, ServiceError> {
        find_product(&*self.db_pool, tenant_id, product_id).await
    }

    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        tenant_id: Uuid,
        filter: ProductFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let mut query = Product::find().filter(product::Column::TenantId.eq(tenant_id));

        if let Some(search) = filter.search.filter(|s| !s.trim().is_empty()) {
            let search = search.trim().to_string();
            query = query.filter(
                Condition::any()
                    .add(product::Column::Name.contains(&search))
                    .add(product::Column::Sku.contains(&search))
                    .add(product::Column::Barcode.eq(search.clone())),
            );
        }
        if let Some(category) = filter.category {
            query = query.filter(product::Column::Category.eq(category));
        }
        if let Some(is_active) = filter.is_active {
            query = query.filter(product::Column::IsActive.eq(is_active));
        }

        fetch_page(
            &*self.db_pool,
            query.order_by_asc(product::Column::Name),
            page,
            limit,
        )
        .await
    }

    #[instrument(skip(self, request))]
    pub async fn update_product(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
        request: UpdateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;
        let existing = find_product(db, tenant_id, product_id).await?;

        let sku = request.sku.as_deref().map(|sku| required_text("sku", sku)).transpose()?;
        let name = request.name.as_deref().map(|name| required_text("name", name)).transpose()?;
        if let Some(sku) = sku.as_deref() {
            if sku != existing.sku {
                Self::ensure_sku_free(db, tenant_id, sku, Some(product_id)).await?;
            }
        }

        let mut active: product::ActiveModel = existing.into();
        if let Some(name) = name {
            active.name = Set(name);
        }
        if let Some(sku) = sku {
            active.sku = Set(sku);
        }
        if let Some(barcode) = request.barcode {
            active.barcode = Set(Some(barcode));
        }
        if let Some(category) = request.category {
            active.category = Set(Some(category));
        }
        if let Some(description) = request.description {
            active.description = Set(Some(description));
        }
        if let Some(unit) = request.unit {
            active.unit = Set(unit);
        }
        if let Some(price) = request.price {
            active.price = Set(validate_money("price", price)?);
        }
        if let Some(cost_price) = request.cost_price {
            active.cost_price = Set(validate_money("cost_price", cost_price)?);
        }
        if let Some(min_stock_level) = request.min_stock_level {
            active.min_stock_level = Set(min_stock_level);
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        Ok(active.update(db).await?)
    }

    /// Deactivates products that sales or purchase orders still reference;
    /// deletes the rest outright. Returns `true` for a hard delete.
    #[instrument(skip(self))]
    pub async fn delete_product(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let txn = begin_write(&self.db_pool).await?;
        let existing = find_product(&txn, tenant_id, product_id).await?;

        let sold = TransactionItem::find()
            .filter(transaction_item::Column::ProductId.eq(product_id))
            .count(&txn)
            .await?;
        let ordered = PurchaseOrderItem::find()
            .filter(purchase_order_item::Column::ProductId.eq(product_id))
            .count(&txn)
            .await?;

        let hard = sold == 0 && ordered == 0;
        if hard {
            Product::delete_by_id(product_id).exec(&txn).await?;
        } else {
            let mut active: product::ActiveModel = existing.into();
            active.is_active = Set(false);
            active.updated_at = Set(Utc::now());
            active.update(&txn).await?;
        }
        txn.commit().await?;

        info!(%product_id, hard, "product removed");
        Ok(hard)
    }

    /// Active products at or below their minimum stock level.
    #[instrument(skip(self))]
    pub async fn low_stock(&self, tenant_id: Uuid) -> Result<Vec<product::Model>, ServiceError> {
        Ok(Product::find()
            .filter(product::Column::TenantId.eq(tenant_id))
            .filter(product::Column::IsActive.eq(true))
            .filter(Expr::col(product::Column::StockQuantity).lte(Expr::col(product::Column::MinStockLevel)))
            .order_by_asc(product::Column::StockQuantity)
            .all(&*self.db_pool)
            .await?)
    }

    #[instrument(skip(self, request))]
    pub async fn adjust_stock(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
        actor: Uuid,
        request: AdjustStockRequest,
    ) -> Result<StockMovement, ServiceError> {
        request.validate()?;
        let txn = begin_write(&self.db_pool).await?;
        let movement = apply_stock_change(
            &txn,
            StockChange {
                tenant_id,
                product_id,
                delta: request.quantity_change,
                kind: StockChangeType::Adjustment,
                reference_id: None,
                reference_type: None,
                note: Some(request.note),
                actor: Some(actor),
            },
        )
        .await?;
        txn.commit().await?;

        publish_stock_events(
            &self.event_sender,
            tenant_id,
            StockChangeType::Adjustment,
            std::slice::from_ref(&movement),
        )
        .await;
        Ok(movement)
    }

    /// Stock movements for one product, newest first.
    #[instrument(skip(self))]
    pub async fn stock_history(
        &self,
        tenant_id: Uuid,
        product_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<stock_history::Model>, u64), ServiceError> {
        let db = &*self.db_pool;
        find_product(db, tenant_id, product_id).await?;

        let query = StockHistory::find()
            .filter(stock_history::Column::TenantId.eq(tenant_id))
            .filter(stock_history::Column::ProductId.eq(product_id))
            .order_by_desc(stock_history::Column::CreatedAt);
        fetch_page(db, query, page, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn movement(previous: i32, new: i32, min: i32) -> StockMovement {
        let now = Utc::now();
        StockMovement {
            product: product::Model {
                id: Uuid::new_v4(),
                tenant_id: Uuid::new_v4(),
                name: "Soap".to_string(),
                sku: "SOAP-1".to_string(),
                barcode: None,
                category: None,
                description: None,
                unit: "pcs".to_string(),
                price: dec!(1.50),
                cost_price: dec!(0.90),
                stock_quantity: new,
                min_stock_level: min,
                is_active: true,
                created_at: now,
                updated_at: now,
            },
            previous_quantity: previous,
            new_quantity: new,
        }
    }

    #[test]
    fn low_stock_is_reported_once_when_crossing() {
        assert!(movement(6, 5, 5).crossed_minimum());
        assert!(!movement(5, 4, 5).crossed_minimum());
        assert!(!movement(10, 8, 5).crossed_minimum());
    }

    #[test]
    fn negative_prices_are_rejected() {
        assert!(validate_money("price", dec!(-0.01)).is_err());
        assert_eq!(validate_money("price", dec!(2.005)).unwrap(), dec!(2.01));
    }

    #[test]
    fn required_text_trims_and_rejects_blanks() {
        assert_eq!(required_text("sku", "  RICE-5 ").unwrap(), "RICE-5");
        assert!(matches!(
            required_text("sku", "   "),
            Err(ServiceError::ValidationError(_))
        ));
    }
}
