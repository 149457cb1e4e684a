use sea_orm_migration::prelude::*;

use super::columns::money;
use super::m20250101_000001_create_tenancy_tables::Tenants;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Expenses::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Expenses::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Expenses::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Expenses::Category).string().not_null())
                    .col(money(manager, Expenses::Amount))
                    .col(ColumnDef::new(Expenses::Description).text().null())
                    .col(ColumnDef::new(Expenses::ExpenseDate).date().not_null())
                    .col(ColumnDef::new(Expenses::PaymentMethod).string_len(20).null())
                    .col(ColumnDef::new(Expenses::RecordedBy).uuid().not_null())
                    .col(
                        ColumnDef::new(Expenses::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Expenses::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_expenses_tenant_id")
                            .from(Expenses::Table, Expenses::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_expenses_tenant_date")
                    .table(Expenses::Table)
                    .col(Expenses::TenantId)
                    .col(Expenses::ExpenseDate)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Expenses::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Expenses {
    Table,
    Id,
    TenantId,
    Category,
    Amount,
    Description,
    ExpenseDate,
    PaymentMethod,
    RecordedBy,
    CreatedAt,
    UpdatedAt,
}
