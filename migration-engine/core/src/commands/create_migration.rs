use crate::error::CoreResult;
use crate::manager::{CreatedMigration, MigrationManager};
use crate::registry::ModelRegistry;

#[derive(Debug, Default)]
pub struct CreateMigrationInput {
    /// The app an empty migration is created in. Auto-diffed migrations
    /// are created in every app with changes.
    pub app: String,
    /// Explicit migration slug; derived from the operations when absent.
    pub name: Option<String>,
    /// Skip the differ and write an empty template.
    pub empty: bool,
}

#[derive(Debug)]
pub struct CreateMigrationOutput {
    /// The created artifacts. Empty when the schemas were already in sync.
    pub created: Vec<CreatedMigration>,
}

/// Creates migration artifacts, either auto-diffed from the registry or an
/// empty template.
pub fn create_migration(
    manager: &mut MigrationManager,
    registry: &dyn ModelRegistry,
    input: CreateMigrationInput,
) -> CoreResult<CreateMigrationOutput> {
    let created = if input.empty {
        vec![manager.create_empty_migration(&input.app, input.name.as_deref())?]
    } else {
        manager.create_migrations(registry, input.name.as_deref())?
    };

    Ok(CreateMigrationOutput { created })
}
