//! The public entry points of the engine, one module per command.

mod apply_migrations;
mod create_migration;
mod list_migrations;
mod migrations_sql;
mod revert_migration;

pub use apply_migrations::{apply_migrations, ApplyMigrationsInput, ApplyMigrationsOutput};
pub use create_migration::{create_migration, CreateMigrationInput, CreateMigrationOutput};
pub use list_migrations::{list_migrations, ListMigrationsOutput};
pub use migrations_sql::migrations_sql;
pub use revert_migration::{revert_migration, RevertMigrationInput, RevertMigrationOutput};
