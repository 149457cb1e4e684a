//! Dashboard figures. Rows are loaded per range and aggregated in Rust so the
//! same code runs on SQLite and PostgreSQL.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{sea_query::Expr, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::{
        debt_payment::{self, Entity as DebtPayment},
        expense::{self, Entity as Expense},
        product::{self, Entity as Product},
        transaction::{self, Entity as Transaction},
        transaction_item::{self, Entity as TransactionItem},
    },
    errors::ServiceError,
    services::cart::round_money,
};

const DEFAULT_RANGE_DAYS: i64 = 30;
const MAX_RANGE_DAYS: i64 = 366;

/// Inclusive date range; defaults to the last 30 days.
#[derive(Debug, Clone, Copy, Default, Deserialize, IntoParams, ToSchema)]
pub struct ReportRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl ReportRange {
    pub fn resolve(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), ServiceError> {
        let to = self.to.unwrap_or(today);
        let from = self
            .from
            .unwrap_or_else(|| to - Duration::days(DEFAULT_RANGE_DAYS - 1));
        if from > to {
            return Err(ServiceError::ValidationError(
                "report range starts after it ends".to_string(),
            ));
        }
        if (to - from).num_days() >= MAX_RANGE_DAYS {
            return Err(ServiceError::ValidationError(format!(
                "report range cannot exceed {} days",
                MAX_RANGE_DAYS
            )));
        }
        Ok((from, to))
    }
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Dashboard {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub revenue: Decimal,
    pub transaction_count: u64,
    pub average_ticket: Decimal,
    pub cash_collected: Decimal,
    pub outstanding_debt: Decimal,
    pub expenses_total: Decimal,
    pub cost_of_goods_sold: Decimal,
    pub gross_profit: Decimal,
    pub net_profit: Decimal,
    pub low_stock_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DailySales {
    pub date: NaiveDate,
    pub revenue: Decimal,
    pub transactions: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TopProduct {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity_sold: i64,
    pub revenue: Decimal,
}

/// Net revenue of a sale after approved refunds, which never exceed its total.
fn net_revenue(sale: &transaction::Model) -> Decimal {
    sale.total_amount - sale.refunded_amount
}

/// Per-day revenue with a zero row for every day without sales.
pub fn bucket_daily(sales: &[transaction::Model], from: NaiveDate, to: NaiveDate) -> Vec<DailySales> {
    let mut days: BTreeMap<NaiveDate, (Decimal, u64)> = BTreeMap::new();
    let mut day = from;
    while day <= to {
        days.insert(day, (Decimal::ZERO, 0));
        day += Duration::days(1);
    }
    for sale in sales {
        if let Some(entry) = days.get_mut(&sale.created_at.date_naive()) {
            entry.0 += net_revenue(sale);
            entry.1 += 1;
        }
    }
    days.into_iter()
        .map(|(date, (revenue, transactions))| DailySales {
            date,
            revenue: round_money(revenue),
            transactions,
        })
        .collect()
}

/// Products ranked by units sold net of returns.
pub fn rank_products(items: &[transaction_item::Model], limit: usize) -> Vec<TopProduct> {
    let mut by_product: HashMap<Uuid, TopProduct> = HashMap::new();
    for item in items {
        let kept = item.quantity - item.returned_quantity;
        if kept <= 0 {
            continue;
        }
        let revenue = if item.quantity > 0 {
            item.line_total / Decimal::from(item.quantity) * Decimal::from(kept)
        } else {
            Decimal::ZERO
        };
        let entry = by_product.entry(item.product_id).or_insert_with(|| TopProduct {
            product_id: item.product_id,
            product_name: item.product_name.clone(),
            quantity_sold: 0,
            revenue: Decimal::ZERO,
        });
        entry.quantity_sold += i64::from(kept);
        entry.revenue += revenue;
    }

    let mut ranked: Vec<TopProduct> = by_product
        .into_values()
        .map(|mut p| {
            p.revenue = round_money(p.revenue);
            p
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.quantity_sold
            .cmp(&a.quantity_sold)
            .then_with(|| b.revenue.cmp(&a.revenue))
            .then_with(|| a.product_name.cmp(&b.product_name))
    });
    ranked.truncate(limit);
    ranked
}

/// Service for dashboard reporting
#[derive(Clone)]
pub struct ReportService {
    db_pool: Arc<DbPool>,
}

impl ReportService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    async fn sales_between(
        &self,
        tenant_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<transaction::Model>, ServiceError> {
        Ok(Transaction::find()
            .filter(transaction::Column::TenantId.eq(tenant_id))
            .filter(transaction::Column::CreatedAt.gte(day_start(from)))
            .filter(transaction::Column::CreatedAt.lt(day_start(to + Duration::days(1))))
            .all(&*self.db_pool)
            .await?)
    }

    async fn items_between(
        &self,
        tenant_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<transaction_item::Model>, ServiceError> {
        Ok(TransactionItem::find()
            .filter(transaction_item::Column::TenantId.eq(tenant_id))
            .filter(transaction_item::Column::CreatedAt.gte(day_start(from)))
            .filter(transaction_item::Column::CreatedAt.lt(day_start(to + Duration::days(1))))
            .all(&*self.db_pool)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn dashboard(&self, tenant_id: Uuid, range: ReportRange) -> Result<Dashboard, ServiceError> {
        let db = &*self.db_pool;
        let (from, to) = range.resolve(Utc::now().date_naive())?;
        let start = day_start(from);
        let end = day_start(to + Duration::days(1));

        let sales = self.sales_between(tenant_id, from, to).await?;
        let items = self.items_between(tenant_id, from, to).await?;

        let revenue = round_money(sales.iter().map(net_revenue).sum());
        let transaction_count = sales.len() as u64;
        let average_ticket = if transaction_count > 0 {
            round_money(revenue / Decimal::from(transaction_count))
        } else {
            Decimal::ZERO
        };

        let paid_at_sale: Decimal = sales.iter().map(|s| s.total_amount - s.original_debt).sum();
        let debt_collected: Decimal = DebtPayment::find()
            .filter(debt_payment::Column::TenantId.eq(tenant_id))
            .filter(debt_payment::Column::CreatedAt.gte(start))
            .filter(debt_payment::Column::CreatedAt.lt(end))
            .all(db)
            .await?
            .iter()
            .map(|p| p.amount)
            .sum();

        let outstanding_debt: Decimal = Transaction::find()
            .filter(transaction::Column::TenantId.eq(tenant_id))
            .filter(transaction::Column::OutstandingBalance.gt(Decimal::ZERO))
            .all(db)
            .await?
            .iter()
            .map(|t| t.outstanding_balance)
            .sum();

        let expenses_total: Decimal = Expense::find()
            .filter(expense::Column::TenantId.eq(tenant_id))
            .filter(expense::Column::ExpenseDate.gte(from))
            .filter(expense::Column::ExpenseDate.lte(to))
            .all(db)
            .await?
            .iter()
            .map(|e| e.amount)
            .sum();

        let products: HashMap<Uuid, product::Model> = Product::find()
            .filter(product::Column::TenantId.eq(tenant_id))
            .all(db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        let cost_of_goods_sold: Decimal = items
            .iter()
            .map(|item| {
                let unit_cost = products
                    .get(&item.product_id)
                    .map(|p| p.cost_price)
                    .unwrap_or(item.cost_price);
                unit_cost * Decimal::from(item.quantity - item.returned_quantity)
            })
            .sum();

        let low_stock_count = Product::find()
            .filter(product::Column::TenantId.eq(tenant_id))
            .filter(product::Column::IsActive.eq(true))
            .filter(Expr::col(product::Column::StockQuantity).lte(Expr::col(product::Column::MinStockLevel)))
            .count(db)
            .await?;

        let cost_of_goods_sold = round_money(cost_of_goods_sold);
        let expenses_total = round_money(expenses_total);
        let gross_profit = revenue - cost_of_goods_sold;

        Ok(Dashboard {
            from,
            to,
            revenue,
            transaction_count,
            average_ticket,
            cash_collected: round_money(paid_at_sale + debt_collected),
            outstanding_debt: round_money(outstanding_debt),
            expenses_total,
            cost_of_goods_sold,
            gross_profit,
            net_profit: gross_profit - expenses_total,
            low_stock_count,
        })
    }

    #[instrument(skip(self))]
    pub async fn daily_sales(
        &self,
        tenant_id: Uuid,
        range: ReportRange,
    ) -> Result<Vec<DailySales>, ServiceError> {
        let (from, to) = range.resolve(Utc::now().date_naive())?;
        let sales = self.sales_between(tenant_id, from, to).await?;
        Ok(bucket_daily(&sales, from, to))
    }

    #[instrument(skip(self))]
    pub async fn top_products(
        &self,
        tenant_id: Uuid,
        range: ReportRange,
        limit: usize,
    ) -> Result<Vec<TopProduct>, ServiceError> {
        let (from, to) = range.resolve(Utc::now().date_naive())?;
        let items = self.items_between(tenant_id, from, to).await?;
        Ok(rank_products(&items, limit.clamp(1, 100)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::transaction::{PaymentMethod, TransactionStatus};
    use rust_decimal_macros::dec;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn sale_on(day: &str, total: Decimal, refunded: Decimal) -> transaction::Model {
        let at = day_start(date(day)) + Duration::hours(10);
        transaction::Model {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            receipt_number: "RCP".to_string(),
            customer_id: None,
            cashier_id: Uuid::nil(),
            subtotal: total,
            discount_amount: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            total_amount: total,
            amount_paid: total,
            change_amount: Decimal::ZERO,
            original_debt: Decimal::ZERO,
            outstanding_balance: Decimal::ZERO,
            refunded_amount: refunded,
            payment_method: PaymentMethod::Cash,
            status: TransactionStatus::Completed,
            notes: None,
            created_at: at,
            updated_at: at,
        }
    }

    fn item(product_id: Uuid, name: &str, quantity: i32, line_total: Decimal, returned: i32) -> transaction_item::Model {
        transaction_item::Model {
            id: Uuid::new_v4(),
            transaction_id: Uuid::nil(),
            tenant_id: Uuid::nil(),
            product_id,
            product_name: name.to_string(),
            quantity,
            unit_price: line_total / Decimal::from(quantity),
            cost_price: Decimal::ZERO,
            discount_amount: Decimal::ZERO,
            line_total,
            returned_quantity: returned,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn range_defaults_to_thirty_days() {
        let (from, to) = ReportRange::default().resolve(date("2024-03-31")).unwrap();
        assert_eq!(to, date("2024-03-31"));
        assert_eq!(from, date("2024-03-02"));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let range = ReportRange {
            from: Some(date("2024-03-10")),
            to: Some(date("2024-03-01")),
        };
        assert!(range.resolve(date("2024-03-31")).is_err());
    }

    #[test]
    fn daily_series_fills_gaps() {
        let sales = vec![
            sale_on("2024-03-01", dec!(10.00), Decimal::ZERO),
            sale_on("2024-03-01", dec!(5.00), dec!(2.00)),
            sale_on("2024-03-03", dec!(7.50), Decimal::ZERO),
        ];
        let series = bucket_daily(&sales, date("2024-03-01"), date("2024-03-03"));

        assert_eq!(series.len(), 3);
        assert_eq!(series[0].revenue, dec!(13.00));
        assert_eq!(series[0].transactions, 2);
        assert_eq!(series[1].revenue, Decimal::ZERO);
        assert_eq!(series[2].transactions, 1);
    }

    #[test]
    fn ranking_nets_out_returns() {
        let rice = Uuid::new_v4();
        let oil = Uuid::new_v4();
        let items = vec![
            item(rice, "Rice", 4, dec!(20.00), 3),
            item(oil, "Oil", 2, dec!(8.00), 0),
            item(rice, "Rice", 1, dec!(5.00), 0),
        ];
        let ranked = rank_products(&items, 10);

        assert_eq!(ranked[0].product_id, rice);
        assert_eq!(ranked[0].quantity_sold, 2);
        assert_eq!(ranked[0].revenue, dec!(10.00));
        assert_eq!(ranked[1].quantity_sold, 2);
        assert_eq!(ranked[1].revenue, dec!(8.00));
    }
}
