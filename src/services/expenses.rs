use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::expense::{self, Entity as Expense},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{cart::round_money, fetch_page},
};

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateExpenseRequest {
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    pub amount: Decimal,
    pub description: Option<String>,
    /// Defaults to today
    pub expense_date: Option<NaiveDate>,
    #[validate(length(max = 20))]
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateExpenseRequest {
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    pub amount: Option<Decimal>,
    pub description: Option<String>,
    pub expense_date: Option<NaiveDate>,
    #[validate(length(max = 20))]
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct ExpenseFilter {
    pub category: Option<String>,
    /// Inclusive
    pub from: Option<NaiveDate>,
    /// Inclusive
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CategoryTotal {
    pub category: String,
    pub total: Decimal,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ExpenseSummary {
    pub categories: Vec<CategoryTotal>,
    pub total: Decimal,
}

fn positive_amount(amount: Decimal) -> Result<Decimal, ServiceError> {
    let amount = round_money(amount);
    if amount <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "expense amount must be positive".to_string(),
        ));
    }
    Ok(amount)
}

/// Per-category totals, sorted by category name.
pub fn summarize(expenses: &[expense::Model]) -> ExpenseSummary {
    let mut by_category: BTreeMap<&str, (Decimal, u64)> = BTreeMap::new();
    for e in expenses {
        let entry = by_category.entry(e.category.as_str()).or_default();
        entry.0 += e.amount;
        entry.1 += 1;
    }

    let categories: Vec<CategoryTotal> = by_category
        .into_iter()
        .map(|(category, (total, count))| CategoryTotal {
            category: category.to_string(),
            total: round_money(total),
            count,
        })
        .collect();
    let total = categories.iter().map(|c| c.total).sum();
    ExpenseSummary { categories, total }
}

fn filtered(tenant_id: Uuid, filter: &ExpenseFilter) -> sea_orm::Select<Expense> {
    let mut query = Expense::find().filter(expense::Column::TenantId.eq(tenant_id));
    if let Some(category) = &filter.category {
        query = query.filter(expense::Column::Category.eq(category.clone()));
    }
    if let Some(from) = filter.from {
        query = query.filter(expense::Column::ExpenseDate.gte(from));
    }
    if let Some(to) = filter.to {
        query = query.filter(expense::Column::ExpenseDate.lte(to));
    }
    query
}

/// Service for shop running costs
#[derive(Clone)]
pub struct ExpenseService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl ExpenseService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    async fn find(&self, tenant_id: Uuid, id: Uuid) -> Result<expense::Model, ServiceError> {
        Expense::find_by_id(id)
            .filter(expense::Column::TenantId.eq(tenant_id))
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::not_found("Expense", id))
    }

    #[instrument(skip(self, request), fields(category = %request.category))]
    pub async fn create_expense(
        &self,
        tenant_id: Uuid,
        recorded_by: Uuid,
        request: CreateExpenseRequest,
    ) -> Result<expense::Model, ServiceError> {
        request.validate()?;
        let amount = positive_amount(request.amount)?;

        let now = Utc::now();
        let created = expense::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            category: Set(request.category.trim().to_string()),
            amount: Set(amount),
            description: Set(request.description),
            expense_date: Set(request.expense_date.unwrap_or_else(|| now.date_naive())),
            payment_method: Set(request.payment_method),
            recorded_by: Set(recorded_by),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db_pool)
        .await?;

        self.event_sender
            .send_or_log(Event::ExpenseRecorded {
                tenant_id,
                expense_id: created.id,
                amount,
            })
            .await;
        info!(expense_id = %created.id, %amount, "expense recorded");
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn get_expense(&self, tenant_id: Uuid, id: Uuid) -> Result<expense::Model, ServiceError> {
        self.find(tenant_id, id).await
    }

    #[instrument(skip(self, request))]
    pub async fn update_expense(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        request: UpdateExpenseRequest,
    ) -> Result<expense::Model, ServiceError> {
        request.validate()?;
        let existing = self.find(tenant_id, id).await?;

        let mut active: expense::ActiveModel = existing.into();
        if let Some(category) = request.category {
            active.category = Set(category.trim().to_string());
        }
        if let Some(amount) = request.amount {
            active.amount = Set(positive_amount(amount)?);
        }
        if let Some(description) = request.description {
            active.description = Set(Some(description));
        }
        if let Some(expense_date) = request.expense_date {
            active.expense_date = Set(expense_date);
        }
        if let Some(payment_method) = request.payment_method {
            active.payment_method = Set(Some(payment_method));
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db_pool).await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_expense(&self, tenant_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        self.find(tenant_id, id).await?;
        Expense::delete_by_id(id).exec(&*self.db_pool).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn list_expenses(
        &self,
        tenant_id: Uuid,
        filter: ExpenseFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<expense::Model>, u64), ServiceError> {
        let query = filtered(tenant_id, &filter)
            .order_by_desc(expense::Column::ExpenseDate)
            .order_by_desc(expense::Column::CreatedAt);
        fetch_page(&*self.db_pool, query, page, limit).await
    }

    #[instrument(skip(self))]
    pub async fn expense_summary(
        &self,
        tenant_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<ExpenseSummary, ServiceError> {
        let filter = ExpenseFilter {
            category: None,
            from,
            to,
        };
        let expenses = filtered(tenant_id, &filter).all(&*self.db_pool).await?;
        Ok(summarize(&expenses))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn expense(category: &str, amount: Decimal) -> expense::Model {
        let now = Utc::now();
        expense::Model {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            category: category.to_string(),
            amount,
            description: None,
            expense_date: now.date_naive(),
            payment_method: None,
            recorded_by: Uuid::nil(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn summary_groups_by_category() {
        let summary = summarize(&[
            expense("rent", dec!(300.00)),
            expense("power", dec!(42.50)),
            expense("power", dec!(17.50)),
        ]);

        assert_eq!(summary.total, dec!(360.00));
        assert_eq!(summary.categories.len(), 2);
        assert_eq!(summary.categories[0].category, "power");
        assert_eq!(summary.categories[0].total, dec!(60.00));
        assert_eq!(summary.categories[0].count, 2);
    }

    #[test]
    fn amounts_must_be_positive() {
        assert!(positive_amount(Decimal::ZERO).is_err());
        assert!(positive_amount(dec!(-1)).is_err());
        assert_eq!(positive_amount(dec!(0.499)).unwrap(), dec!(0.50));
    }
}
