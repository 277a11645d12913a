use crate::error::CoreResult;
use crate::manager::MigrationManager;
use sql_migration_connector::Connection;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct ApplyMigrationsInput {
    pub cancellation: Option<CancellationToken>,
}

#[derive(Debug)]
pub struct ApplyMigrationsOutput {
    /// The names of the newly applied migrations, in apply order.
    pub applied_migration_names: Vec<String>,
}

/// Applies every pending migration in dependency order.
pub async fn apply_migrations(
    manager: &mut MigrationManager,
    connection: &dyn Connection,
    input: ApplyMigrationsInput,
) -> CoreResult<ApplyMigrationsOutput> {
    let applied = manager
        .apply_migrations(connection, input.cancellation.as_ref())
        .await?;

    Ok(ApplyMigrationsOutput {
        applied_migration_names: applied.into_iter().map(|id| id.to_string()).collect(),
    })
}
