use indexmap::indexmap;
use indoc::indoc;
use pretty_assertions::assert_eq;
use sql_migration_connector::flavour::{PostgresFlavour, SqliteFlavour};
use sql_migration_connector::{Field, IndexDef, ModelRef, Operation, State};

fn user() -> ModelRef {
    ModelRef::new("blog", "User")
}

fn blog() -> ModelRef {
    ModelRef::new("blog", "Blog")
}

fn create_users() -> Operation {
    Operation::CreateModel {
        model: user(),
        table: Some("users".to_owned()),
        fields: indexmap! {
            "id".to_owned() => Field::int().primary_key(),
            "name".to_owned() => Field::char(255),
            "email".to_owned() => Field::char(255).unique(),
            "created_at".to_owned() => Field::datetime().auto_now_add(),
        },
    }
}

#[test]
fn create_model_renders_the_full_table_on_sqlite() {
    let operation = create_users();
    let state = State::new();

    let sql = operation.forward_sql(&state, &SqliteFlavour).unwrap();

    let expected = indoc! {r#"
        CREATE TABLE "users" (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name VARCHAR(255) NOT NULL,
            email VARCHAR(255) NOT NULL UNIQUE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        );"#};

    assert_eq!(sql, expected);
}

#[test]
fn create_model_renders_serial_primary_keys_on_postgres() {
    let operation = create_users();
    let state = State::new();

    let sql = operation.forward_sql(&state, &PostgresFlavour).unwrap();

    let expected = indoc! {r#"
        CREATE TABLE "users" (
            id SERIAL PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            email VARCHAR(255) NOT NULL UNIQUE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        );"#};

    assert_eq!(sql, expected);
}

#[test]
fn create_model_backward_drops_the_table() {
    let operation = create_users();
    let mut state = State::new();
    state.apply(&operation).unwrap();
    state.snapshot("create");

    let sql = operation.backward_sql(&state, &SqliteFlavour).unwrap();

    assert_eq!(sql, "DROP TABLE users;");
}

fn state_with_blog() -> State {
    let mut state = State::new();
    state
        .apply(&Operation::CreateModel {
            model: blog(),
            table: Some("blogs".to_owned()),
            fields: indexmap! {
                "id".to_owned() => Field::int().primary_key(),
                "title".to_owned() => Field::char(255),
            },
        })
        .unwrap();
    state.snapshot("blogs");
    state
}

#[test]
fn foreign_keys_are_inline_on_sqlite_and_constraints_on_postgres() {
    let state = state_with_blog();

    let operation = Operation::CreateModel {
        model: ModelRef::new("blog", "Comment"),
        table: Some("comments".to_owned()),
        fields: indexmap! {
            "id".to_owned() => Field::int().primary_key(),
            "blog".to_owned() => Field::foreign_key(blog()),
        },
    };

    let sqlite = operation.forward_sql(&state, &SqliteFlavour).unwrap();
    let expected_sqlite = indoc! {r#"
        CREATE TABLE "comments" (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            blog_id INT NOT NULL REFERENCES blogs(id) ON DELETE CASCADE
        );"#};
    assert_eq!(sqlite, expected_sqlite);

    let postgres = operation.forward_sql(&state, &PostgresFlavour).unwrap();
    let expected_postgres = indoc! {r#"
        CREATE TABLE "comments" (
            id SERIAL PRIMARY KEY,
            blog_id INT NOT NULL,
            FOREIGN KEY (blog_id) REFERENCES blogs(id) ON DELETE CASCADE
        );"#};
    assert_eq!(postgres, expected_postgres);
}

#[test]
fn add_field_renders_an_add_column() {
    let state = state_with_blog();

    let operation = Operation::AddField {
        model: blog(),
        field_name: "summary".to_owned(),
        field: Field::char(255).nullable(),
    };

    let sql = operation.forward_sql(&state, &SqliteFlavour).unwrap();

    assert_eq!(sql, "ALTER TABLE blogs ADD COLUMN summary VARCHAR(255);");
}

#[test]
fn add_foreign_key_field_appends_a_constraint_on_postgres() {
    let mut state = state_with_blog();
    state
        .apply(&Operation::CreateModel {
            model: user(),
            table: Some("users".to_owned()),
            fields: indexmap! { "id".to_owned() => Field::int().primary_key() },
        })
        .unwrap();
    state.snapshot("users");

    let operation = Operation::AddField {
        model: blog(),
        field_name: "author".to_owned(),
        field: Field::foreign_key(user()).nullable(),
    };

    let sql = operation.forward_sql(&state, &PostgresFlavour).unwrap();

    let expected = indoc! {r#"
        ALTER TABLE blogs ADD COLUMN author_id INT;
        ALTER TABLE blogs ADD CONSTRAINT fk_blogs_author_id FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE;"#};
    assert_eq!(sql, expected);
}

#[test]
fn drop_field_rewrites_the_table_on_sqlite() {
    let mut state = state_with_blog();
    state
        .apply(&Operation::AddField {
            model: blog(),
            field_name: "summary".to_owned(),
            field: Field::char(255).nullable(),
        })
        .unwrap();
    state.snapshot("summary");

    let operation = Operation::DropField {
        model: blog(),
        field_name: "summary".to_owned(),
    };

    let sql = operation.forward_sql(&state, &SqliteFlavour).unwrap();

    let expected = indoc! {r#"
        BEGIN TRANSACTION;
        CREATE TABLE "__new__blogs" (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title VARCHAR(255) NOT NULL
        );
        INSERT INTO __new__blogs (id, title) SELECT id, title FROM blogs;
        DROP TABLE blogs;
        ALTER TABLE __new__blogs RENAME TO blogs;
        COMMIT;"#};
    assert_eq!(sql, expected);
}

#[test]
fn drop_field_forward_is_a_plain_drop_column_on_postgres() {
    let state = state_with_blog();

    let operation = Operation::DropField {
        model: blog(),
        field_name: "title".to_owned(),
    };

    let sql = operation.forward_sql(&state, &PostgresFlavour).unwrap();

    assert_eq!(sql, "ALTER TABLE blogs DROP COLUMN title;");
}

#[test]
fn drop_field_backward_recovers_the_field_from_the_previous_snapshot() {
    let mut state = state_with_blog();
    let operation = Operation::DropField {
        model: blog(),
        field_name: "title".to_owned(),
    };
    state.apply(&operation).unwrap();
    state.snapshot("drop");

    let sql = operation.backward_sql(&state, &PostgresFlavour).unwrap();

    assert_eq!(sql, "ALTER TABLE blogs ADD COLUMN title VARCHAR(255) NOT NULL;");
}

#[test]
fn alter_field_expands_to_the_needed_clauses_on_postgres() {
    let state = state_with_blog();

    let operation = Operation::AlterField {
        model: blog(),
        field_name: "title".to_owned(),
        field: Field::char(512).unique().nullable(),
    };

    let sql = operation.forward_sql(&state, &PostgresFlavour).unwrap();

    let expected = indoc! {r#"
        ALTER TABLE blogs ALTER COLUMN title TYPE VARCHAR(512);
        ALTER TABLE blogs ALTER COLUMN title DROP NOT NULL;
        ALTER TABLE blogs ADD CONSTRAINT title_unique UNIQUE (title);"#};
    assert_eq!(sql, expected);
}

#[test]
fn alter_field_rewrites_the_table_on_sqlite() {
    let state = state_with_blog();

    let operation = Operation::AlterField {
        model: blog(),
        field_name: "title".to_owned(),
        field: Field::char(255).unique(),
    };

    let sql = operation.forward_sql(&state, &SqliteFlavour).unwrap();

    let expected = indoc! {r#"
        BEGIN TRANSACTION;
        CREATE TABLE "__new__blogs" (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title VARCHAR(255) NOT NULL UNIQUE
        );
        INSERT INTO __new__blogs (id, title) SELECT id, title FROM blogs;
        DROP TABLE blogs;
        ALTER TABLE __new__blogs RENAME TO blogs;
        COMMIT;"#};
    assert_eq!(sql, expected);
}

#[test]
fn alter_field_backward_restores_the_previous_descriptor() {
    let mut state = state_with_blog();
    let operation = Operation::AlterField {
        model: blog(),
        field_name: "title".to_owned(),
        field: Field::char(255).nullable(),
    };
    state.apply(&operation).unwrap();
    state.snapshot("alter");

    let sql = operation.backward_sql(&state, &PostgresFlavour).unwrap();

    assert_eq!(sql, "ALTER TABLE blogs ALTER COLUMN title SET NOT NULL;");
}

#[test]
fn rename_field_without_column_change_produces_no_sql() {
    let state = state_with_blog();

    let operation = Operation::RenameField {
        model: blog(),
        field_name: "title".to_owned(),
        new_field_name: Some("headline".to_owned()),
        new_column_name: None,
    };

    assert_eq!(operation.forward_sql(&state, &SqliteFlavour).unwrap(), "");
    assert_eq!(operation.forward_sql(&state, &PostgresFlavour).unwrap(), "");
}

#[test]
fn rename_field_with_column_change_renames_the_column() {
    let mut state = state_with_blog();

    let operation = Operation::RenameField {
        model: blog(),
        field_name: "title".to_owned(),
        new_field_name: None,
        new_column_name: Some("headline".to_owned()),
    };

    let sql = operation.forward_sql(&state, &SqliteFlavour).unwrap();
    assert_eq!(sql, "ALTER TABLE blogs RENAME COLUMN title TO headline;");

    state.apply(&operation).unwrap();
    state.snapshot("rename");

    let backward = operation.backward_sql(&state, &SqliteFlavour).unwrap();
    assert_eq!(backward, "ALTER TABLE blogs RENAME COLUMN headline TO title;");
}

#[test]
fn rename_model_renames_the_table_both_ways() {
    let mut state = state_with_blog();

    let operation = Operation::RenameModel {
        model: blog(),
        new_table: Some("journals".to_owned()),
        new_model_name: None,
    };

    let forward = operation.forward_sql(&state, &PostgresFlavour).unwrap();
    assert_eq!(forward, "ALTER TABLE blogs RENAME TO journals;");

    state.apply(&operation).unwrap();
    state.snapshot("rename");

    let backward = operation.backward_sql(&state, &PostgresFlavour).unwrap();
    assert_eq!(backward, "ALTER TABLE journals RENAME TO blogs;");
}

#[test]
fn add_and_drop_index_round_trip() {
    let mut state = state_with_blog();

    let add = Operation::AddIndex {
        model: blog(),
        index: IndexDef::new("idx_blogs_title", vec!["title".to_owned()], false),
    };

    let sql = add.forward_sql(&state, &SqliteFlavour).unwrap();
    assert_eq!(sql, "CREATE INDEX idx_blogs_title ON blogs (title);");

    state.apply(&add).unwrap();
    state.snapshot("add index");

    assert_eq!(
        add.backward_sql(&state, &SqliteFlavour).unwrap(),
        "DROP INDEX idx_blogs_title;"
    );

    let drop = Operation::DropIndex {
        model: blog(),
        index_name: "idx_blogs_title".to_owned(),
    };

    assert_eq!(
        drop.forward_sql(&state, &SqliteFlavour).unwrap(),
        "DROP INDEX idx_blogs_title;"
    );

    state.apply(&drop).unwrap();
    state.snapshot("drop index");

    assert_eq!(
        drop.backward_sql(&state, &SqliteFlavour).unwrap(),
        "CREATE INDEX idx_blogs_title ON blogs (title);"
    );
}

#[test]
fn unique_indexes_render_with_the_unique_keyword() {
    let state = state_with_blog();

    let operation = Operation::AddIndex {
        model: blog(),
        index: IndexDef::new("uniq_blogs_title", vec!["title".to_owned()], true),
    };

    assert_eq!(
        operation.forward_sql(&state, &PostgresFlavour).unwrap(),
        "CREATE UNIQUE INDEX uniq_blogs_title ON blogs (title);"
    );
}

#[test]
fn many_to_many_fields_materialize_as_a_through_table() {
    let mut state = state_with_blog();
    state
        .apply(&Operation::CreateModel {
            model: ModelRef::new("blog", "Tag"),
            table: Some("tags".to_owned()),
            fields: indexmap! { "id".to_owned() => Field::int().primary_key() },
        })
        .unwrap();
    state.snapshot("tags");

    let operation = Operation::AddField {
        model: blog(),
        field_name: "tags".to_owned(),
        field: Field::many_to_many(ModelRef::new("blog", "Tag")),
    };

    let sql = operation.forward_sql(&state, &SqliteFlavour).unwrap();

    let expected = indoc! {r#"
        CREATE TABLE "blogs_tags" (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            blog_id INT NOT NULL REFERENCES blogs(id) ON DELETE CASCADE,
            tag_id INT NOT NULL REFERENCES tags(id) ON DELETE CASCADE
        );"#};
    assert_eq!(sql, expected);

    state.apply(&operation).unwrap();
    state.snapshot("m2m");

    assert_eq!(
        operation.backward_sql(&state, &SqliteFlavour).unwrap(),
        "DROP TABLE blogs_tags;"
    );
}

#[test]
fn run_sql_round_trips_and_defaults_backward_to_empty() {
    let state = State::new();

    let with_backward = Operation::RunSql {
        forward: "UPDATE blogs SET title = 'x';".to_owned(),
        backward: Some("UPDATE blogs SET title = 'y';".to_owned()),
    };

    assert_eq!(
        with_backward.forward_sql(&state, &SqliteFlavour).unwrap(),
        "UPDATE blogs SET title = 'x';"
    );
    assert_eq!(
        with_backward.backward_sql(&state, &SqliteFlavour).unwrap(),
        "UPDATE blogs SET title = 'y';"
    );

    let without_backward = Operation::RunSql {
        forward: "UPDATE blogs SET title = 'x';".to_owned(),
        backward: None,
    };

    assert_eq!(
        without_backward.backward_sql(&state, &SqliteFlavour).unwrap(),
        ""
    );
}

#[test]
fn defaults_render_with_dialect_literals() {
    let state = State::new();

    let operation = Operation::CreateModel {
        model: ModelRef::new("blog", "Settings"),
        table: Some("settings".to_owned()),
        fields: indexmap! {
            "enabled".to_owned() => Field::bool().with_default(serde_json::json!(true)),
            "label".to_owned() => Field::char(64).with_default(serde_json::json!("it's on")),
        },
    };

    let sqlite = operation.forward_sql(&state, &SqliteFlavour).unwrap();
    assert!(sqlite.contains("enabled BOOLEAN NOT NULL DEFAULT 1"));
    assert!(sqlite.contains("label VARCHAR(64) NOT NULL DEFAULT 'it''s on'"));

    let postgres = operation.forward_sql(&state, &PostgresFlavour).unwrap();
    assert!(postgres.contains("enabled BOOLEAN NOT NULL DEFAULT TRUE"));
    assert!(postgres.contains("label VARCHAR(64) NOT NULL DEFAULT 'it''s on'"));
}

#[test]
fn drop_field_on_a_missing_field_is_an_error() {
    let state = state_with_blog();

    let operation = Operation::DropField {
        model: blog(),
        field_name: "nope".to_owned(),
    };

    assert!(operation.forward_sql(&state, &SqliteFlavour).is_err());
}
