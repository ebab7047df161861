//! Dependency resolution.
//!
//! Every engine's migrations form a single linear chain through their
//! `depends_on` pointers. The resolver validates that shape and returns the
//! chain root-first. Checks run in a fixed order: duplicate names, missing
//! parents, cycles, then multiple heads.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use crate::error::{MigrateResult, MigrationError};
use crate::migration::Migration;

/// Build the linear chain of `engine`'s migrations, root first.
///
/// Migrations of other engines are ignored.
pub fn resolve(engine: &str, migrations: &[Migration]) -> MigrateResult<Vec<Migration>> {
    let mut by_name: HashMap<&str, &Migration> = HashMap::new();
    for migration in migrations.iter().filter(|m| m.database == engine) {
        if by_name.insert(migration.name.as_str(), migration).is_some() {
            return Err(MigrationError::migration_file(format!(
                "duplicate migration name '{}' in engine '{}'",
                migration.name, engine
            )));
        }
    }

    if by_name.is_empty() {
        return Ok(Vec::new());
    }

    // Sorted so every error is reported deterministically.
    let mut names: Vec<&str> = by_name.keys().copied().collect();
    names.sort_unstable();

    for name in &names {
        if let Some(parent) = by_name[name].depends_on.as_deref() {
            if !by_name.contains_key(parent) {
                return Err(MigrationError::MissingDependency {
                    engine: engine.to_string(),
                    migration: name.to_string(),
                    dependency: parent.to_string(),
                });
            }
        }
    }

    if let Some(path) = find_cycle(&names, &by_name) {
        return Err(MigrationError::Cycle {
            engine: engine.to_string(),
            path,
        });
    }

    let parents: HashSet<&str> = by_name
        .values()
        .filter_map(|m| m.depends_on.as_deref())
        .collect();
    let heads: BTreeSet<&str> = names
        .iter()
        .copied()
        .filter(|name| !parents.contains(name))
        .collect();

    let head = match heads.len() {
        1 => heads.into_iter().next(),
        _ => {
            return Err(MigrationError::MultipleHeads {
                engine: engine.to_string(),
                heads: heads.into_iter().map(str::to_string).collect(),
            });
        }
    };

    let mut chain = Vec::with_capacity(by_name.len());
    let mut current = head;
    while let Some(name) = current {
        let migration = by_name[name];
        chain.push(migration.clone());
        current = migration.depends_on.as_deref();
    }
    chain.reverse();

    debug!(engine, migrations = chain.len(), "Resolved migration chain");
    Ok(chain)
}

/// Follow parent pointers from every migration and report the first loop.
///
/// The returned path starts and ends with the same migration.
fn find_cycle(names: &[&str], by_name: &HashMap<&str, &Migration>) -> Option<Vec<String>> {
    let mut finished: HashSet<&str> = HashSet::new();

    for start in names {
        let mut path: Vec<&str> = Vec::new();
        let mut on_path: HashMap<&str, usize> = HashMap::new();
        let mut current = Some(*start);

        while let Some(name) = current {
            if finished.contains(name) {
                break;
            }
            if let Some(&position) = on_path.get(name) {
                let mut cycle: Vec<String> =
                    path[position..].iter().map(|n| n.to_string()).collect();
                cycle.push(name.to_string());
                return Some(cycle);
            }
            on_path.insert(name, path.len());
            path.push(name);
            current = by_name.get(name).and_then(|m| m.depends_on.as_deref());
        }

        finished.extend(path);
    }

    None
}

/// The suffix of `chain` strictly after `last_applied`.
///
/// `None` means nothing is applied and the whole chain is pending. A recorded
/// name that is not part of the chain is a [`MigrationError::LedgerMismatch`].
pub fn pending<'a>(
    engine: &str,
    chain: &'a [Migration],
    last_applied: Option<&str>,
) -> MigrateResult<&'a [Migration]> {
    match last_applied {
        None => Ok(chain),
        Some(name) => chain
            .iter()
            .position(|m| m.name == name)
            .map(|index| &chain[index + 1..])
            .ok_or_else(|| MigrationError::LedgerMismatch {
                engine: engine.to_string(),
                migration: name.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migration(name: &str, parent: Option<&str>) -> Migration {
        Migration::new(name, "default").with_parent(parent.map(str::to_string))
    }

    fn names(chain: &[Migration]) -> Vec<&str> {
        chain.iter().map(|m| m.name.as_str()).collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(resolve("default", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_linear_chain_in_any_input_order() {
        let migrations = vec![
            migration("c", Some("b")),
            migration("a", None),
            migration("b", Some("a")),
        ];
        let chain = resolve("default", &migrations).unwrap();
        assert_eq!(names(&chain), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_other_engines_ignored() {
        let migrations = vec![
            migration("a", None),
            Migration::new("x", "analytics"),
            Migration::new("y", "analytics"),
        ];
        let chain = resolve("default", &migrations).unwrap();
        assert_eq!(names(&chain), vec!["a"]);
    }

    #[test]
    fn test_duplicate_names() {
        let migrations = vec![migration("a", None), migration("a", None)];
        assert!(matches!(
            resolve("default", &migrations),
            Err(MigrationError::InvalidMigration(_))
        ));
    }

    #[test]
    fn test_missing_dependency() {
        let migrations = vec![migration("a", None), migration("b", Some("zzz"))];
        match resolve("default", &migrations) {
            Err(MigrationError::MissingDependency {
                migration, dependency, ..
            }) => {
                assert_eq!(migration, "b");
                assert_eq!(dependency, "zzz");
            }
            other => panic!("expected missing dependency, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_is_reported_with_path() {
        let migrations = vec![
            migration("a", Some("c")),
            migration("b", Some("a")),
            migration("c", Some("b")),
        ];
        match resolve("default", &migrations) {
            Err(MigrationError::Cycle { path, .. }) => {
                assert_eq!(path.len(), 4);
                assert_eq!(path.first(), path.last());
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let err = resolve("default", &[migration("a", Some("a"))]).unwrap_err();
        match err {
            MigrationError::Cycle { path, .. } => assert_eq!(path, vec!["a", "a"]),
            other => panic!("expected cycle, got {:?}", other),
        }
        assert_eq!(
            resolve("default", &[migration("a", Some("a"))])
                .unwrap_err()
                .exit_code(),
            10
        );
    }

    #[test]
    fn test_cycle_detected_before_heads() {
        // `d` is a second chain, but the loop must win.
        let migrations = vec![
            migration("a", Some("b")),
            migration("b", Some("a")),
            migration("d", None),
        ];
        assert!(matches!(
            resolve("default", &migrations),
            Err(MigrationError::Cycle { .. })
        ));
    }

    #[test]
    fn test_two_roots_are_multiple_heads() {
        let migrations = vec![migration("b", None), migration("a", None)];
        match resolve("default", &migrations) {
            Err(MigrationError::MultipleHeads { heads, .. }) => {
                assert_eq!(heads, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected multiple heads, got {:?}", other),
        }
    }

    #[test]
    fn test_fork_is_multiple_heads() {
        let migrations = vec![
            migration("root", None),
            migration("left", Some("root")),
            migration("right", Some("root")),
        ];
        match resolve("default", &migrations) {
            Err(MigrationError::MultipleHeads { heads, .. }) => {
                assert_eq!(heads, vec!["left".to_string(), "right".to_string()]);
            }
            other => panic!("expected multiple heads, got {:?}", other),
        }
    }

    #[test]
    fn test_pending() {
        let chain = resolve(
            "default",
            &[migration("a", None), migration("b", Some("a")), migration("c", Some("b"))],
        )
        .unwrap();

        assert_eq!(names(pending("default", &chain, None).unwrap()), vec!["a", "b", "c"]);
        assert_eq!(names(pending("default", &chain, Some("b")).unwrap()), vec!["c"]);
        assert!(pending("default", &chain, Some("c")).unwrap().is_empty());
        assert!(matches!(
            pending("default", &chain, Some("gone")),
            Err(MigrationError::LedgerMismatch { .. })
        ));
    }
}
