use indexmap::indexmap;
use migration_core::{MigrationManager, StaticRegistry};
use pretty_assertions::assert_eq;
use serde_json::Value;
use sql_migration_connector::{Connection, Dialect, Field, ModelDecl, SqliteConnection};
use tempfile::TempDir;

struct TestApi {
    dir: TempDir,
}

impl TestApi {
    fn new() -> Self {
        TestApi {
            dir: TempDir::new().unwrap(),
        }
    }

    fn migrations_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("migrations")
    }

    fn connect(&self) -> SqliteConnection {
        SqliteConnection::connect(self.dir.path().join("test.sqlite3")).unwrap()
    }

    async fn manager(&self, connection: &dyn Connection) -> MigrationManager {
        let mut manager = MigrationManager::new(self.migrations_dir());
        manager.initialize(connection).await.unwrap();
        manager
    }

    async fn column_names(&self, connection: &dyn Connection, table: &str) -> Vec<String> {
        let result = connection
            .execute_query(&format!("PRAGMA table_info({})", table), &[])
            .await
            .unwrap();

        result
            .rows
            .iter()
            .filter_map(|row| row.get("name").and_then(Value::as_str))
            .map(str::to_owned)
            .collect()
    }

    async fn ledger_names(&self, connection: &dyn Connection) -> Vec<String> {
        let result = connection
            .execute_query("SELECT app, name FROM tortoise_migrations ORDER BY id", &[])
            .await
            .unwrap();

        result
            .rows
            .iter()
            .filter_map(|row| row.get("name").and_then(Value::as_str))
            .map(str::to_owned)
            .collect()
    }
}

fn blog_v1() -> StaticRegistry {
    StaticRegistry::new(indexmap! {
        "blog".to_owned() => indexmap! {
            "User".to_owned() => ModelDecl {
                table: Some("users".to_owned()),
                fields: indexmap! {
                    "id".to_owned() => Field::int().primary_key(),
                    "name".to_owned() => Field::char(255),
                },
                ..ModelDecl::default()
            },
        },
    })
}

fn blog_v2() -> StaticRegistry {
    let mut registry = blog_v1();
    registry.decls["blog"]["User"]
        .fields
        .insert("email".to_owned(), Field::char(255).nullable());
    registry
}

#[tokio::test]
async fn create_and_apply_an_initial_migration() {
    let api = TestApi::new();
    let connection = api.connect();

    let mut manager = api.manager(&connection).await;
    let created = manager.create_migrations(&blog_v1(), None).unwrap();

    assert_eq!(created.len(), 1);
    assert_eq!(created[0].id.app, "blog");
    assert!(created[0].id.name.ends_with("_user"));
    assert!(created[0].path.exists());

    let applied = manager.apply_migrations(&connection, None).await.unwrap();
    assert_eq!(applied, vec![created[0].id.clone()]);

    let columns = api.column_names(&connection, "users").await;
    assert_eq!(columns, vec!["id", "name"]);

    assert_eq!(api.ledger_names(&connection).await, vec![created[0].id.name.clone()]);
    assert!(manager.pending_migrations().is_empty());
}

#[tokio::test]
async fn creating_migrations_twice_without_changes_is_a_no_op() {
    let api = TestApi::new();
    let connection = api.connect();

    let mut manager = api.manager(&connection).await;
    manager.create_migrations(&blog_v1(), None).unwrap();
    manager.apply_migrations(&connection, None).await.unwrap();

    let created = manager.create_migrations(&blog_v1(), None).unwrap();
    assert!(created.is_empty());
}

#[tokio::test]
async fn a_restarted_manager_recovers_the_applied_set_from_the_ledger() {
    let api = TestApi::new();

    let first_name;
    let second_name;

    {
        let connection = api.connect();
        let mut manager = api.manager(&connection).await;

        let created = manager.create_migrations(&blog_v1(), None).unwrap();
        first_name = created[0].id.name.clone();
        manager.apply_migrations(&connection, None).await.unwrap();

        let created = manager
            .create_migrations(&blog_v2(), Some("add_email"))
            .unwrap();
        second_name = created[0].id.name.clone();
        // Not applied: simulates a crash before the second migration ran.
    }

    let connection = api.connect();
    let mut manager = api.manager(&connection).await;

    let applied: Vec<String> = manager
        .applied_migrations()
        .iter()
        .map(|id| id.name.clone())
        .collect();
    let pending: Vec<String> = manager
        .pending_migrations()
        .iter()
        .map(|id| id.name.clone())
        .collect();

    assert_eq!(applied, vec![first_name]);
    assert_eq!(pending, vec![second_name.clone()]);

    let newly_applied = manager.apply_migrations(&connection, None).await.unwrap();
    assert_eq!(
        newly_applied.iter().map(|id| id.name.clone()).collect::<Vec<_>>(),
        vec![second_name]
    );

    let columns = api.column_names(&connection, "users").await;
    assert!(columns.contains(&"email".to_owned()));
}

#[tokio::test]
async fn reverting_the_latest_migration_unwinds_schema_and_ledger() {
    let api = TestApi::new();
    let connection = api.connect();

    let mut manager = api.manager(&connection).await;

    let first = manager.create_migrations(&blog_v1(), None).unwrap();
    manager.apply_migrations(&connection, None).await.unwrap();

    let second = manager
        .create_migrations(&blog_v2(), Some("add_email"))
        .unwrap();
    assert!(second[0].id.name.ends_with("_add_email"));
    manager.apply_migrations(&connection, None).await.unwrap();

    assert!(api
        .column_names(&connection, "users")
        .await
        .contains(&"email".to_owned()));

    let reverted = manager
        .revert_migration(&connection, "blog", None)
        .await
        .unwrap();
    assert_eq!(reverted, Some(second[0].id.clone()));

    let columns = api.column_names(&connection, "users").await;
    assert_eq!(columns, vec!["id", "name"]);

    assert_eq!(
        api.ledger_names(&connection).await,
        vec![first[0].id.name.clone()]
    );

    let pending: Vec<String> = manager
        .pending_migrations()
        .iter()
        .map(|id| id.name.clone())
        .collect();
    assert_eq!(pending, vec![second[0].id.name.clone()]);
}

#[tokio::test]
async fn reverting_with_nothing_applied_returns_none() {
    let api = TestApi::new();
    let connection = api.connect();

    let mut manager = api.manager(&connection).await;

    let reverted = manager
        .revert_migration(&connection, "blog", None)
        .await
        .unwrap();
    assert_eq!(reverted, None);
}

#[tokio::test]
async fn the_pending_sql_dump_does_not_touch_the_database() {
    let api = TestApi::new();
    let connection = api.connect();

    let mut manager = api.manager(&connection).await;
    manager.create_migrations(&blog_v1(), None).unwrap();

    let script = manager.pending_migrations_sql(Dialect::Sqlite).unwrap();

    assert!(script.starts_with("-- Migration: blog -> "));
    assert!(script.contains("CREATE TABLE \"users\""));

    // Nothing was applied.
    let columns = api.column_names(&connection, "users").await;
    assert!(columns.is_empty());
}

#[tokio::test]
async fn a_cancelled_run_applies_nothing() {
    let api = TestApi::new();
    let connection = api.connect();

    let mut manager = api.manager(&connection).await;
    manager.create_migrations(&blog_v1(), None).unwrap();

    let token = tokio_util::sync::CancellationToken::new();
    token.cancel();

    let err = manager
        .apply_migrations(&connection, Some(&token))
        .await
        .unwrap_err();
    assert!(matches!(err, migration_core::CoreError::Cancelled));

    assert!(api.ledger_names(&connection).await.is_empty());
}

#[tokio::test]
async fn empty_migrations_are_templates_with_a_dependency_on_the_latest() {
    let api = TestApi::new();
    let connection = api.connect();

    let mut manager = api.manager(&connection).await;

    let first = manager.create_migrations(&blog_v1(), None).unwrap();
    let empty = manager
        .create_empty_migration("blog", Some("backfill"))
        .unwrap();

    assert!(empty.id.name.ends_with("_backfill"));

    let content = std::fs::read_to_string(&empty.path).unwrap();
    let parsed =
        migration_core::Migration::from_toml_str(&empty.id.name, &content).unwrap();

    assert!(parsed.operations.is_empty());
    assert_eq!(parsed.class, "BackfillMigration");
    assert_eq!(
        parsed.dependencies,
        vec![("blog".to_owned(), first[0].id.name.clone())]
    );
}

#[tokio::test]
async fn two_roots_in_one_app_fail_discovery() {
    let api = TestApi::new();
    let connection = api.connect();

    let app_dir = api.migrations_dir().join("blog");
    std::fs::create_dir_all(&app_dir).unwrap();

    for name in ["20240101000000_first", "20240102000000_other"] {
        std::fs::write(
            app_dir.join(format!("{}.toml", name)),
            "class = \"FirstMigration\"\napp = \"blog\"\n",
        )
        .unwrap();
    }

    let mut manager = MigrationManager::new(api.migrations_dir());
    let err = manager.initialize(&connection).await.unwrap_err();

    assert!(err.to_string().contains("multiple root migrations"));
}

#[tokio::test]
async fn underscore_prefixed_files_are_ignored_by_discovery() {
    let api = TestApi::new();
    let connection = api.connect();

    let mut manager = api.manager(&connection).await;
    manager.create_migrations(&blog_v1(), None).unwrap();

    // The app marker file must not be picked up as an artifact.
    assert!(api.migrations_dir().join("blog/_app.toml").exists());
    assert_eq!(manager.migrations().len(), 1);

    let connection = api.connect();
    let manager = api.manager(&connection).await;
    assert_eq!(manager.migrations().len(), 1);
}

#[tokio::test]
async fn cross_app_artifacts_depend_on_each_other() {
    let api = TestApi::new();
    let connection = api.connect();

    let registry = StaticRegistry::new(indexmap! {
        "auth".to_owned() => indexmap! {
            "User".to_owned() => ModelDecl {
                fields: indexmap! {
                    "id".to_owned() => Field::int().primary_key(),
                },
                ..ModelDecl::default()
            },
        },
        "blog".to_owned() => indexmap! {
            "Comment".to_owned() => ModelDecl {
                fields: indexmap! {
                    "id".to_owned() => Field::int().primary_key(),
                    "author".to_owned() =>
                        Field::foreign_key(sql_migration_connector::ModelRef::new("auth", "User")),
                },
                ..ModelDecl::default()
            },
        },
    });

    let mut manager = api.manager(&connection).await;
    let created = manager.create_migrations(&registry, None).unwrap();

    assert_eq!(created.len(), 2);

    let blog_artifact = created
        .iter()
        .find(|created| created.id.app == "blog")
        .unwrap();
    let auth_artifact = created
        .iter()
        .find(|created| created.id.app == "auth")
        .unwrap();

    let content = std::fs::read_to_string(&blog_artifact.path).unwrap();
    let parsed =
        migration_core::Migration::from_toml_str(&blog_artifact.id.name, &content).unwrap();

    assert_eq!(
        parsed.dependencies,
        vec![("auth".to_owned(), auth_artifact.id.name.clone())]
    );

    // The union graph orders auth before blog.
    let applied = manager.apply_migrations(&connection, None).await.unwrap();
    assert_eq!(applied[0].app, "auth");
    assert_eq!(applied[1].app, "blog");
}
