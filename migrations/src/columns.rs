use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DbBackend;

fn money_type(manager: &SchemaManager, def: &mut ColumnDef) {
    match manager.get_database_backend() {
        // NUMERIC affinity would store whole amounts as INTEGER, which the
        // SQLite driver refuses to decode as a decimal.
        DbBackend::Sqlite => def.double(),
        _ => def.decimal_len(19, 4),
    };
}

/// Non-null money column defaulting to zero.
pub(crate) fn money<T: IntoIden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut def = ColumnDef::new(col);
    money_type(manager, &mut def);
    def.not_null().default(0.0).to_owned()
}

/// Nullable money column.
pub(crate) fn money_null<T: IntoIden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut def = ColumnDef::new(col);
    money_type(manager, &mut def);
    def.null().to_owned()
}
