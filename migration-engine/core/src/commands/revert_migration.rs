use crate::error::CoreResult;
use crate::manager::MigrationManager;
use crate::migration::MigrationId;
use sql_migration_connector::Connection;

#[derive(Debug, Default)]
pub struct RevertMigrationInput {
    pub app: String,
    /// Revert this artifact instead of the latest applied one.
    pub migration_name: Option<String>,
}

#[derive(Debug)]
pub struct RevertMigrationOutput {
    /// The reverted artifact, if any was applied.
    pub reverted: Option<MigrationId>,
}

/// Reverts the latest applied migration of an app, or a named one.
pub async fn revert_migration(
    manager: &mut MigrationManager,
    connection: &dyn Connection,
    input: RevertMigrationInput,
) -> CoreResult<RevertMigrationOutput> {
    let reverted = manager
        .revert_migration(connection, &input.app, input.migration_name.as_deref())
        .await?;

    Ok(RevertMigrationOutput { reverted })
}
