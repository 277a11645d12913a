use crate::error::CoreResult;
use crate::manager::MigrationManager;
use sql_migration_connector::Dialect;

/// The forward SQL of every pending migration, for dry runs. Generation
/// errors surface without touching the database.
pub fn migrations_sql(manager: &MigrationManager, dialect: Dialect) -> CoreResult<String> {
    manager.pending_migrations_sql(dialect)
}
