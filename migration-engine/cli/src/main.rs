//! The `pathway` command line interface.

use colored::Colorize;
use migration_core::commands::{
    apply_migrations, create_migration, list_migrations, migrations_sql, revert_migration,
    ApplyMigrationsInput, CreateMigrationInput, RevertMigrationInput,
};
use migration_core::{Config, MigrationManager};
use sql_migration_connector::{Connection, SqliteConnection};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "pathway", about = "Schema migrations for declarative data models.")]
enum Command {
    /// Create new migration(s); auto-diffs the declared models unless
    /// --empty is passed.
    Make {
        #[structopt(flatten)]
        common: CommonArgs,
        /// Migration name (default: derived from the changes).
        #[structopt(long)]
        name: Option<String>,
        /// Create an empty migration template.
        #[structopt(long)]
        empty: bool,
    },
    /// Apply all pending migrations.
    Migrate {
        #[structopt(flatten)]
        common: CommonArgs,
        /// Print the SQL without touching the database.
        #[structopt(long)]
        dry_run: bool,
    },
    /// Revert the latest applied migration, or a named one.
    Rollback {
        #[structopt(flatten)]
        common: CommonArgs,
        /// A specific migration to revert.
        #[structopt(long)]
        migration: Option<String>,
    },
    /// List applied and pending migrations.
    Showmigrations {
        #[structopt(flatten)]
        common: CommonArgs,
    },
}

#[derive(Debug, StructOpt)]
struct CommonArgs {
    /// Path to the configuration file, optionally with a `#dotted.key`
    /// suffix selecting a nested value.
    #[structopt(long)]
    config: String,

    /// App name (optional when the configuration has only one app).
    #[structopt(long)]
    app: Option<String>,

    /// Base migrations directory.
    #[structopt(long, default_value = "migrations")]
    directory: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(Command::from_args()).await {
        eprintln!("{} {}", "Error:".red().bold(), err);
        std::process::exit(1);
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Make {
            common,
            name,
            empty,
        } => make(common, name, empty).await,
        Command::Migrate { common, dry_run } => migrate(common, dry_run).await,
        Command::Rollback { common, migration } => rollback(common, migration).await,
        Command::Showmigrations { common } => showmigrations(common).await,
    }
}

async fn make(common: CommonArgs, name: Option<String>, empty: bool) -> anyhow::Result<()> {
    let config = Config::load(&common.config)?;
    let app = config.select_app(common.app.as_deref())?;
    let connection = connect(&config)?;

    let mut manager = MigrationManager::new(&common.directory);
    manager.initialize(connection.as_ref()).await?;

    let registry = config.registry();
    if !empty && registry.is_empty() {
        anyhow::bail!("no app in the configuration declares a models file, nothing to diff");
    }

    let output = create_migration(
        &mut manager,
        &registry,
        CreateMigrationInput { app, name, empty },
    )?;

    if output.created.is_empty() {
        println!("No changes detected.");
        return Ok(());
    }

    for created in &output.created {
        println!(
            "{} {} at {}",
            "Created migration".green().bold(),
            created.id.to_string().yellow(),
            created.path.display()
        );
    }

    Ok(())
}

async fn migrate(common: CommonArgs, dry_run: bool) -> anyhow::Result<()> {
    let config = Config::load(&common.config)?;
    config.select_app(common.app.as_deref())?;
    let connection = connect(&config)?;

    let mut manager = MigrationManager::new(&common.directory);
    manager.initialize(connection.as_ref()).await?;

    if dry_run {
        print!("{}", migrations_sql(&manager, connection.dialect())?);
        return Ok(());
    }

    let pending = manager.pending_migrations();

    if pending.is_empty() {
        println!("No pending migrations.");
        return Ok(());
    }

    println!("Applying {} migration(s):", pending.len());
    for id in &pending {
        println!("  - {}", id);
    }

    let output = apply_migrations(
        &mut manager,
        connection.as_ref(),
        ApplyMigrationsInput::default(),
    )
    .await?;

    println!(
        "{}",
        format!(
            "Successfully applied {} migration(s).",
            output.applied_migration_names.len()
        )
        .green()
        .bold()
    );

    Ok(())
}

async fn rollback(common: CommonArgs, migration: Option<String>) -> anyhow::Result<()> {
    let config = Config::load(&common.config)?;
    let app = config.select_app(common.app.as_deref())?;
    let connection = connect(&config)?;

    let mut manager = MigrationManager::new(&common.directory);
    manager.initialize(connection.as_ref()).await?;

    let output = revert_migration(
        &mut manager,
        connection.as_ref(),
        RevertMigrationInput {
            app,
            migration_name: migration,
        },
    )
    .await?;

    match output.reverted {
        Some(id) => println!(
            "{} {}",
            "Successfully reverted migration:".green().bold(),
            id.to_string().yellow()
        ),
        None => println!("No migrations to revert."),
    }

    Ok(())
}

async fn showmigrations(common: CommonArgs) -> anyhow::Result<()> {
    let config = Config::load(&common.config)?;
    let app = config.select_app(common.app.as_deref())?;
    let connection = connect(&config)?;

    let mut manager = MigrationManager::new(&common.directory);
    manager.initialize(connection.as_ref()).await?;

    let mut output = list_migrations(&manager);
    output.applied.retain(|id| id.app == app);
    output.pending.retain(|id| id.app == app);

    println!("Migrations for {}:", app);

    println!("\nApplied migrations:");
    if output.applied.is_empty() {
        println!("  (none)");
    }
    for id in &output.applied {
        println!("  [X] {}", id);
    }

    println!("\nPending migrations:");
    if output.pending.is_empty() {
        println!("  (none)");
    }
    for id in &output.pending {
        println!("  [ ] {}", id);
    }

    Ok(())
}

/// Opens the configured default connection. SQLite is built in; other
/// databases require embedding the engine with a custom [`Connection`].
fn connect(config: &Config) -> anyhow::Result<Box<dyn Connection>> {
    let url = config.connection_url("default")?;

    if let Some(path) = url.strip_prefix("sqlite://") {
        return Ok(Box::new(SqliteConnection::connect(path)?));
    }

    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        anyhow::bail!(
            "no built-in postgres driver; embed the engine and provide a Connection implementation"
        );
    }

    anyhow::bail!("unsupported connection url `{}`", url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn parse(args: &[&str]) -> Command {
        Command::from_iter_safe(args.iter().copied()).unwrap()
    }

    #[test]
    fn make_parses_its_flags() {
        let command = parse(&[
            "pathway", "make", "--config", "pathway.toml", "--app", "blog", "--name", "initial",
            "--empty",
        ]);

        match command {
            Command::Make {
                common,
                name,
                empty,
            } => {
                assert_eq!(common.config, "pathway.toml");
                assert_eq!(common.app.as_deref(), Some("blog"));
                assert_eq!(common.directory, "migrations");
                assert_eq!(name.as_deref(), Some("initial"));
                assert!(empty);
            }
            other => panic!("expected make, got {:?}", other),
        }
    }

    #[test]
    fn migrate_parses_dry_run_and_directory() {
        let command = parse(&[
            "pathway",
            "migrate",
            "--config",
            "pathway.toml",
            "--directory",
            "db/migrations",
            "--dry-run",
        ]);

        match command {
            Command::Migrate { common, dry_run } => {
                assert_eq!(common.directory, "db/migrations");
                assert!(common.app.is_none());
                assert!(dry_run);
            }
            other => panic!("expected migrate, got {:?}", other),
        }
    }

    #[test]
    fn rollback_parses_a_named_migration() {
        let command = parse(&[
            "pathway",
            "rollback",
            "--config",
            "pathway.toml",
            "--migration",
            "20240401000000_initial",
        ]);

        match command {
            Command::Rollback { migration, .. } => {
                assert_eq!(migration.as_deref(), Some("20240401000000_initial"));
            }
            other => panic!("expected rollback, got {:?}", other),
        }
    }

    #[test]
    fn the_config_flag_is_required() {
        assert!(Command::from_iter_safe(["pathway", "showmigrations"]).is_err());
        assert!(Command::from_iter_safe(["pathway", "frobnicate", "--config", "x.toml"]).is_err());
    }

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[tokio::test]
    async fn several_apps_without_a_selection_fail() {
        let config = write_config(
            r#"
[connections]
default = "sqlite://./unused.sqlite3"

[apps.blog]
[apps.auth]
"#,
        );

        let command = parse(&[
            "pathway",
            "rollback",
            "--config",
            config.path().to_str().unwrap(),
        ]);

        let err = run(command).await.unwrap_err();
        assert!(err.to_string().contains("--app"));
    }

    #[tokio::test]
    async fn an_unknown_app_selection_fails() {
        let config = write_config(
            r#"
[connections]
default = "sqlite://./unused.sqlite3"

[apps.blog]
"#,
        );

        let command = parse(&[
            "pathway",
            "rollback",
            "--config",
            config.path().to_str().unwrap(),
            "--app",
            "shop",
        ]);

        let err = run(command).await.unwrap_err();
        assert!(err.to_string().contains("shop"));
    }

    #[tokio::test]
    async fn a_single_app_is_selected_implicitly() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = write_config(&format!(
            r#"
[connections]
default = "sqlite://{}"

[apps.blog]
"#,
            dir.path().join("db.sqlite3").display()
        ));

        let command = parse(&[
            "pathway",
            "rollback",
            "--config",
            config.path().to_str().unwrap(),
            "--directory",
            dir.path().join("migrations").to_str().unwrap(),
        ]);

        // No --app: the only configured app is implied, and with nothing
        // applied the rollback is a no-op.
        run(command).await.unwrap();
    }
}
