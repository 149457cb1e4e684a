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
                    .table(Products::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Products::TenantId).uuid().not_null())
                    .col(ColumnDef::new(Products::Name).string().not_null())
                    .col(ColumnDef::new(Products::Sku).string().not_null())
                    .col(ColumnDef::new(Products::Barcode).string().null())
                    .col(ColumnDef::new(Products::Category).string().null())
                    .col(ColumnDef::new(Products::Description).text().null())
                    .col(
                        ColumnDef::new(Products::Unit)
                            .string_len(20)
                            .not_null()
                            .default("pcs"),
                    )
                    .col(money(manager, Products::Price))
                    .col(money(manager, Products::CostPrice))
                    .col(
                        ColumnDef::new(Products::StockQuantity)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Products::MinStockLevel)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Products::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Products::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Products::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_products_tenant_id")
                            .from(Products::Table, Products::TenantId)
                            .to(Tenants::Table, Tenants::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // SKUs are unique per tenant, not globally
        manager
            .create_index(
                Index::create()
                    .name("idx_products_tenant_sku")
                    .table(Products::Table)
                    .col(Products::TenantId)
                    .col(Products::Sku)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(StockHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StockHistory::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(StockHistory::TenantId).uuid().not_null())
                    .col(ColumnDef::new(StockHistory::ProductId).uuid().not_null())
                    .col(
                        ColumnDef::new(StockHistory::ChangeType)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockHistory::QuantityChange)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockHistory::PreviousQuantity)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StockHistory::NewQuantity)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(StockHistory::ReferenceId).uuid().null())
                    .col(ColumnDef::new(StockHistory::ReferenceType).string().null())
                    .col(ColumnDef::new(StockHistory::Note).text().null())
                    .col(ColumnDef::new(StockHistory::CreatedBy).uuid().null())
                    .col(
                        ColumnDef::new(StockHistory::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_stock_history_product_id")
                            .from(StockHistory::Table, StockHistory::ProductId)
                            .to(Products::Table, Products::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_stock_history_product_created")
                    .table(StockHistory::Table)
                    .col(StockHistory::ProductId)
                    .col((StockHistory::CreatedAt, IndexOrder::Desc))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StockHistory::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Products::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Products {
    Table,
    Id,
    TenantId,
    Name,
    Sku,
    Barcode,
    Category,
    Description,
    Unit,
    Price,
    CostPrice,
    StockQuantity,
    MinStockLevel,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum StockHistory {
    Table,
    Id,
    TenantId,
    ProductId,
    ChangeType,
    QuantityChange,
    PreviousQuantity,
    NewQuantity,
    ReferenceId,
    ReferenceType,
    Note,
    CreatedBy,
    CreatedAt,
}
