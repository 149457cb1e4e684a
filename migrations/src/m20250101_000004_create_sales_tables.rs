use sea_orm_migration::prelude::*;

use super::columns::money;
use super::m20250101_000001_create_tenancy_tables::Tenants;
use super::m20250101_000002_create_catalog_tables::Products;
use super::m20250101_000003_create_customers_table::Customers;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::TenantId).uuid().not_null())
                    .col(
                        ColumnDef::new(Transactions::ReceiptNumber)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::CustomerId).uuid().null())
                    .col(ColumnDef::new(Transactions::CashierId).uuid().not_null())
                    .col(money(manager, Transactions::Subtotal))
                    .col(money(manager, Transactions::DiscountAmount))
                    .col(money(manager, Transactions::TaxAmount))
                    .col(money(manager, Transactions::TotalAmount))
                    .col(money(manager, Transactions::AmountPaid))
                    .col(money(manager, Transactions::ChangeAmount))
                    .col(money(manager, Transactions::OriginalDebt))
                    .col(money(manager, Transactions::OutstandingBalance))
                    .col(money(manager, Transactions::RefundedAmount))
                    .col(
                        ColumnDef::new(Transactions::PaymentMethod)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::Status)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Transactions::Notes).text().null())
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transactions_tenant_id")
                            .from(Transactions::Table, Transactions::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transactions_customer_id")
                            .from(Transactions::Table, Transactions::CustomerId)
                            .to(Customers::Table, Customers::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_tenant_created")
                    .table(Transactions::Table)
                    .col(Transactions::TenantId)
                    .col((Transactions::CreatedAt, IndexOrder::Desc))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_customer_status")
                    .table(Transactions::Table)
                    .col(Transactions::CustomerId)
                    .col(Transactions::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_receipt_number")
                    .table(Transactions::Table)
                    .col(Transactions::TenantId)
                    .col(Transactions::ReceiptNumber)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TransactionItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TransactionItems::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TransactionItems::TransactionId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TransactionItems::TenantId).uuid().not_null())
                    .col(ColumnDef::new(TransactionItems::ProductId).uuid().not_null())
                    .col(
                        ColumnDef::new(TransactionItems::ProductName)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TransactionItems::Quantity)
                            .integer()
                            .not_null(),
                    )
                    .col(money(manager, TransactionItems::UnitPrice))
                    .col(money(manager, TransactionItems::CostPrice))
                    .col(money(manager, TransactionItems::DiscountAmount))
                    .col(money(manager, TransactionItems::LineTotal))
                    .col(
                        ColumnDef::new(TransactionItems::ReturnedQuantity)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(TransactionItems::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transaction_items_transaction_id")
                            .from(TransactionItems::Table, TransactionItems::TransactionId)
                            .to(Transactions::Table, Transactions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transaction_items_product_id")
                            .from(TransactionItems::Table, TransactionItems::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transaction_items_transaction_id")
                    .table(TransactionItems::Table)
                    .col(TransactionItems::TransactionId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(DebtPayments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DebtPayments::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DebtPayments::TenantId).uuid().not_null())
                    .col(
                        ColumnDef::new(DebtPayments::TransactionId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(DebtPayments::CustomerId).uuid().not_null())
                    .col(money(manager, DebtPayments::Amount))
                    .col(
                        ColumnDef::new(DebtPayments::PaymentMethod)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(ColumnDef::new(DebtPayments::Note).text().null())
                    .col(ColumnDef::new(DebtPayments::ReceivedBy).uuid().not_null())
                    .col(
                        ColumnDef::new(DebtPayments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_debt_payments_transaction_id")
                            .from(DebtPayments::Table, DebtPayments::TransactionId)
                            .to(Transactions::Table, Transactions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_debt_payments_transaction_id")
                    .table(DebtPayments::Table)
                    .col(DebtPayments::TransactionId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_debt_payments_customer_id")
                    .table(DebtPayments::Table)
                    .col(DebtPayments::CustomerId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DebtPayments::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TransactionItems::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Transactions {
    Table,
    Id,
    TenantId,
    ReceiptNumber,
    CustomerId,
    CashierId,
    Subtotal,
    DiscountAmount,
    TaxAmount,
    TotalAmount,
    AmountPaid,
    ChangeAmount,
    OriginalDebt,
    OutstandingBalance,
    RefundedAmount,
    PaymentMethod,
    Status,
    Notes,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum TransactionItems {
    Table,
    Id,
    TransactionId,
    TenantId,
    ProductId,
    ProductName,
    Quantity,
    UnitPrice,
    CostPrice,
    DiscountAmount,
    LineTotal,
    ReturnedQuantity,
    CreatedAt,
}

#[derive(DeriveIden)]
enum DebtPayments {
    Table,
    Id,
    TenantId,
    TransactionId,
    CustomerId,
    Amount,
    PaymentMethod,
    Note,
    ReceivedBy,
    CreatedAt,
}
