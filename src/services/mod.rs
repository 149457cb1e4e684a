pub mod cart;
pub mod customers;
pub mod debts;
pub mod expenses;
pub mod products;
pub mod purchase_orders;
pub mod reports;
pub mod returns;
pub mod sales;
pub mod tenancy;

use sea_orm::{ConnectionTrait, PaginatorTrait, SelectorTrait};

use crate::errors::ServiceError;

/// Total row count plus one 1-based page of rows.
pub(crate) async fn fetch_page<'db, C, S>(
    db: &'db C,
    select: S,
    page: u64,
    limit: u64,
) -> Result<(Vec<<S::Selector as SelectorTrait>::Item>, u64), ServiceError>
where
    C: ConnectionTrait,
    S: PaginatorTrait<'db, C>,
{
    let paginator = select.paginate(db, limit.max(1));
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(page.max(1) - 1).await?;
    Ok((items, total))
}

/// Short uppercase suffix for human-facing document numbers.
pub(crate) fn short_code(id: uuid::Uuid) -> String {
    id.simple().to_string()[..8].to_uppercase()
}
