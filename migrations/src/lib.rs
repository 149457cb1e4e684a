pub use sea_orm_migration::prelude::*;

mod columns;
mod m20250101_000001_create_tenancy_tables;
mod m20250101_000002_create_catalog_tables;
mod m20250101_000003_create_customers_table;
mod m20250101_000004_create_sales_tables;
mod m20250101_000005_create_returns_tables;
mod m20250101_000006_create_purchasing_tables;
mod m20250101_000007_create_expenses_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_tenancy_tables::Migration),
            Box::new(m20250101_000002_create_catalog_tables::Migration),
            Box::new(m20250101_000003_create_customers_table::Migration),
            Box::new(m20250101_000004_create_sales_tables::Migration),
            Box::new(m20250101_000005_create_returns_tables::Migration),
            Box::new(m20250101_000006_create_purchasing_tables::Migration),
            Box::new(m20250101_000007_create_expenses_table::Migration),
        ]
    }
}
