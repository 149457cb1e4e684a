use sea_orm_migration::prelude::*;

use super::columns::money;
use super::m20250101_000001_create_tenancy_tables::Tenants;
use super::m20250101_000004_create_sales_tables::{TransactionItems, Transactions};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Returns::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Returns::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Returns::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Returns::TransactionId).uuid().not_null())
                    .col(ColumnDef::new(Returns::CustomerId).uuid().null())
                    .col(ColumnDef::new(Returns::Reason).text().not_null())
                    .col(
                        ColumnDef::new(Returns::Status)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(money(manager, Returns::RefundAmount))
                    .col(money(manager, Returns::DebtCredit))
                    .col(ColumnDef::new(Returns::RequestedBy).uuid().not_null())
                    .col(ColumnDef::new(Returns::ReviewedBy).uuid().null())
                    .col(
                        ColumnDef::new(Returns::ReviewedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Returns::ReviewNote).text().null())
                    .col(
                        ColumnDef::new(Returns::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Returns::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_returns_tenant_id")
                            .from(Returns::Table, Returns::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_returns_transaction_id")
                            .from(Returns::Table, Returns::TransactionId)
                            .to(Transactions::Table, Transactions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_returns_tenant_status")
                    .table(Returns::Table)
                    .col(Returns::TenantId)
                    .col(Returns::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_returns_transaction_id")
                    .table(Returns::Table)
                    .col(Returns::TransactionId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ReturnItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ReturnItems::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ReturnItems::ReturnId).uuid().not_null())
                    .col(ColumnDef::new(ReturnItems::TenantId).uuid().not_null())
                    .col(
                        ColumnDef::new(ReturnItems::TransactionItemId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ReturnItems::ProductId).uuid().not_null())
                    .col(ColumnDef::new(ReturnItems::Quantity).integer().not_null())
                    .col(money(manager, ReturnItems::RefundAmount))
                    .col(
                        ColumnDef::new(ReturnItems::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_return_items_return_id")
                            .from(ReturnItems::Table, ReturnItems::ReturnId)
                            .to(Returns::Table, Returns::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_return_items_transaction_item_id")
                            .from(ReturnItems::Table, ReturnItems::TransactionItemId)
                            .to(TransactionItems::Table, TransactionItems::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_return_items_return_id")
                    .table(ReturnItems::Table)
                    .col(ReturnItems::ReturnId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ReturnItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Returns::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Returns {
    Table,
    Id,
    TenantId,
    TransactionId,
    CustomerId,
    Reason,
    Status,
    RefundAmount,
    DebtCredit,
    RequestedBy,
    ReviewedBy,
    ReviewedAt,
    ReviewNote,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ReturnItems {
    Table,
    Id,
    ReturnId,
    TenantId,
    TransactionItemId,
    ProductId,
    Quantity,
    RefundAmount,
    CreatedAt,
}
