//! Dependency ordering of discovered migration artifacts.

use crate::error::{CoreError, CoreResult};
use crate::migration::{Migration, MigrationId};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet};

/// Orders artifacts topologically over the union graph of all apps,
/// breaking ties alphabetically by `(app, name)`. The timestamp prefix of
/// artifact names makes that chronological.
///
/// Fails on unknown dependencies, on an app with several root artifacts,
/// on an app with none, and on cycles.
pub fn sort_migrations(migrations: &BTreeMap<MigrationId, Migration>) -> CoreResult<Vec<MigrationId>> {
    validate_roots(migrations)?;

    let mut in_degree: BTreeMap<&MigrationId, usize> =
        migrations.keys().map(|id| (id, 0)).collect();
    let mut dependents: HashMap<&MigrationId, Vec<&MigrationId>> = HashMap::new();

    for (id, migration) in migrations {
        for dependency in migration.dependency_ids() {
            let (dependency, _) = migrations.get_key_value(&dependency).ok_or_else(|| {
                CoreError::dependency(format!(
                    "migration {} depends on unknown migration {}",
                    id, dependency
                ))
            })?;

            *in_degree.get_mut(id).unwrap_or_else(|| unreachable!()) += 1;
            dependents.entry(dependency).or_default().push(id);
        }
    }

    let mut ready: BinaryHeap<Reverse<&MigrationId>> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| Reverse(*id))
        .collect();

    let mut sorted = Vec::with_capacity(migrations.len());

    while let Some(Reverse(id)) = ready.pop() {
        sorted.push(id.clone());

        for dependent in dependents.remove(id).unwrap_or_default() {
            let degree = in_degree
                .get_mut(dependent)
                .unwrap_or_else(|| unreachable!());
            *degree -= 1;
            if *degree == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if sorted.len() != migrations.len() {
        let sorted_set: HashSet<&MigrationId> = sorted.iter().collect();
        let cycle: Vec<String> = migrations
            .keys()
            .filter(|id| !sorted_set.contains(id))
            .map(|id| id.to_string())
            .collect();

        return Err(CoreError::dependency(format!(
            "circular dependency between migrations: {}",
            cycle.join(", ")
        )));
    }

    Ok(sorted)
}

/// A root is an artifact with no dependency inside its own app. Each
/// non-empty app must have exactly one.
fn validate_roots(migrations: &BTreeMap<MigrationId, Migration>) -> CoreResult<()> {
    let mut roots_per_app: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut apps: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();

    for (id, migration) in migrations {
        apps.insert(id.app.as_str());

        let has_same_app_dependency = migration
            .dependencies
            .iter()
            .any(|(dep_app, _)| *dep_app == id.app);

        if !has_same_app_dependency {
            roots_per_app
                .entry(id.app.as_str())
                .or_default()
                .push(id.name.as_str());
        }
    }

    for app in apps {
        match roots_per_app.get(app).map(Vec::as_slice) {
            None | Some([]) => {
                return Err(CoreError::dependency(format!(
                    "no root migration in app `{}`: every migration depends on another one",
                    app
                )))
            }
            Some([_]) => (),
            Some(roots) => {
                return Err(CoreError::dependency(format!(
                    "multiple root migrations in app `{}`: {}",
                    app,
                    roots.join(", ")
                )))
            }
        }
    }

    Ok(())
}
