use crate::manager::MigrationManager;
use crate::migration::MigrationId;

#[derive(Debug)]
pub struct ListMigrationsOutput {
    pub applied: Vec<MigrationId>,
    pub pending: Vec<MigrationId>,
}

/// The applied/pending partition of the discovered artifacts, in apply
/// order.
pub fn list_migrations(manager: &MigrationManager) -> ListMigrationsOutput {
    ListMigrationsOutput {
        applied: manager.applied_migrations().into_iter().cloned().collect(),
        pending: manager.pending_migrations().into_iter().cloned().collect(),
    }
}
