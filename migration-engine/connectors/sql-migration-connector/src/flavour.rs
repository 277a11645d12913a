//! Per-dialect behaviour that is not plain statement rendering: the
//! migrations-ledger DDL and queries, and parameter placeholder styles.

use crate::sql_renderer::SqlRenderer;
use indoc::indoc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    pub fn name(self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
        }
    }

    pub fn flavour(self) -> &'static (dyn SqlFlavour + Send + Sync) {
        match self {
            Dialect::Sqlite => &SqliteFlavour,
            Dialect::Postgres => &PostgresFlavour,
        }
    }

    pub fn renderer(self) -> &'static (dyn SqlRenderer + Send + Sync) {
        match self {
            Dialect::Sqlite => &SqliteFlavour,
            Dialect::Postgres => &PostgresFlavour,
        }
    }
}

/// The full per-dialect surface: statement rendering plus ledger concerns.
pub trait SqlFlavour: SqlRenderer + Send + Sync {
    /// DDL bootstrapping the `tortoise_migrations` ledger table.
    fn ledger_create_table(&self) -> &'static str;

    /// Parameterized `INSERT` of one `(app, name, applied_at)` ledger row.
    fn ledger_insert(&self) -> &'static str;

    /// Parameterized `DELETE` of one `(app, name)` ledger row.
    fn ledger_delete(&self) -> &'static str;

    fn ledger_select_applied(&self) -> &'static str {
        "SELECT app, name FROM tortoise_migrations ORDER BY id ASC"
    }

    /// Parameterized query for the most recently applied migration of one
    /// app.
    fn ledger_select_latest_for_app(&self) -> &'static str;
}

#[derive(Debug)]
pub struct SqliteFlavour;

#[derive(Debug)]
pub struct PostgresFlavour;

impl SqlFlavour for SqliteFlavour {
    fn ledger_create_table(&self) -> &'static str {
        indoc! {r#"
            CREATE TABLE IF NOT EXISTS tortoise_migrations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app VARCHAR(100) NOT NULL,
                name VARCHAR(255) NOT NULL,
                applied_at TIMESTAMP NOT NULL
            )"#}
    }

    fn ledger_insert(&self) -> &'static str {
        "INSERT INTO tortoise_migrations (app, name, applied_at) VALUES (?, ?, ?)"
    }

    fn ledger_delete(&self) -> &'static str {
        "DELETE FROM tortoise_migrations WHERE app = ? AND name = ?"
    }

    fn ledger_select_latest_for_app(&self) -> &'static str {
        "SELECT name FROM tortoise_migrations WHERE app = ? ORDER BY id DESC LIMIT 1"
    }
}

impl SqlFlavour for PostgresFlavour {
    fn ledger_create_table(&self) -> &'static str {
        indoc! {r#"
            CREATE TABLE IF NOT EXISTS tortoise_migrations (
                id SERIAL PRIMARY KEY,
                app VARCHAR(100) NOT NULL,
                name VARCHAR(255) NOT NULL,
                applied_at TIMESTAMP NOT NULL
            )"#}
    }

    fn ledger_insert(&self) -> &'static str {
        "INSERT INTO tortoise_migrations (app, name, applied_at) VALUES ($1, $2, $3)"
    }

    fn ledger_delete(&self) -> &'static str {
        "DELETE FROM tortoise_migrations WHERE app = $1 AND name = $2"
    }

    fn ledger_select_latest_for_app(&self) -> &'static str {
        "SELECT name FROM tortoise_migrations WHERE app = $1 ORDER BY id DESC LIMIT 1"
    }
}
