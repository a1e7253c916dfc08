//! Manifest resolution: authority manifests merged with local overrides.
//!
//! ## Rules
//!
//! 1. Authority manifests are taken in order and keyed by name. One whose
//!    `path` is already claimed by another authority manifest is dropped,
//!    whatever its name.
//! 2. A local manifest removes every authority manifest sharing its `name`
//!    or its `path`, even when the local manifest itself is then dropped.
//! 3. Local manifests are then keyed by name. One whose `path` was already
//!    claimed by an earlier local manifest is dropped. A local path stays
//!    claimed for the whole resolution.
//!
//! Resolution never fails; every dropped manifest is logged.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use cfgagent_core::{Manifest, ManifestSet};

/// Merge `authority` and `local` into one set with unique names and paths.
pub fn resolve(authority: Vec<Manifest>, local: &[Manifest]) -> ManifestSet {
    let mut set = ManifestSet::new();

    for manifest in authority {
        if let Some(owner) = set.name_for_path(&manifest.path) {
            tracing::warn!(
                name = %manifest.name,
                owner = %owner,
                path = %manifest.path.display(),
                "duplicate path in authority manifests, ignoring",
            );
            continue;
        }
        if let Some(previous) = set.insert(manifest) {
            tracing::debug!(name = %previous.name, "authority manifest replaced by a later one of the same name");
        }
    }

    let mut local_names: BTreeSet<String> = BTreeSet::new();
    let mut local_paths: BTreeMap<PathBuf, String> = BTreeMap::new();
    for manifest in local {
        if !local_names.contains(&manifest.name) && set.remove(&manifest.name).is_some() {
            tracing::info!(name = %manifest.name, "local manifest overrides authority manifest");
        }
        if let Some(owner) = set.name_for_path(&manifest.path).map(str::to_string) {
            if !local_names.contains(&owner) {
                set.remove(&owner);
                tracing::warn!(
                    name = %manifest.name,
                    displaced = %owner,
                    path = %manifest.path.display(),
                    "local manifest overrides authority manifest with the same path",
                );
            }
        }

        if let Some(owner) = local_paths.get(&manifest.path) {
            tracing::warn!(
                name = %manifest.name,
                owner = %owner,
                path = %manifest.path.display(),
                "duplicate path in local manifests, ignoring",
            );
            continue;
        }

        local_paths.insert(manifest.path.clone(), manifest.name.clone());
        local_names.insert(manifest.name.clone());
        set.insert(manifest.clone());
    }

    set
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn m(name: &str, path: &str) -> Manifest {
        Manifest::new(name, path, format!("template of {name}"))
    }

    #[test]
    fn disjoint_sets_are_unioned() {
        let set = resolve(vec![m("a", "/etc/a"), m("b", "/etc/b")], &[m("c", "/etc/c")]);
        let names: Vec<_> = set.names().collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn local_name_match_removes_authority_path() {
        let set = resolve(vec![m("a", "/etc/a.conf")], &[m("a", "/opt/a.conf")]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("a").map(|x| x.path.as_path()), Some(Path::new("/opt/a.conf")));
        assert_eq!(set.name_for_path(Path::new("/etc/a.conf")), None);
    }

    #[test]
    fn local_path_match_removes_authority_name() {
        let set = resolve(vec![m("a", "/etc/a.conf")], &[m("z", "/etc/a.conf")]);
        let names: Vec<_> = set.names().collect();
        assert_eq!(names, vec!["z"]);
    }

    #[test]
    fn local_matching_two_authority_entries_removes_both() {
        let set = resolve(
            vec![m("a", "/etc/a"), m("b", "/etc/b")],
            &[m("a", "/etc/b")],
        );
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("a").map(|x| x.path.as_path()), Some(Path::new("/etc/b")));
    }

    #[test]
    fn authority_path_collision_keeps_first() {
        let set = resolve(vec![m("a", "/etc/same"), m("b", "/etc/same")], &[]);
        let names: Vec<_> = set.names().collect();
        assert_eq!(names, vec!["a"]);
    }

    #[test]
    fn local_path_collision_keeps_first() {
        let set = resolve(vec![], &[m("x", "/etc/same"), m("y", "/etc/same")]);
        let names: Vec<_> = set.names().collect();
        assert_eq!(names, vec!["x"]);
    }

    #[test]
    fn later_local_with_same_name_keeps_earlier_path_claimed() {
        let set = resolve(vec![], &[m("x", "/etc/one"), m("x", "/etc/two"), m("y", "/etc/one")]);
        let names: Vec<_> = set.names().collect();
        assert_eq!(names, vec!["x"]);
        assert_eq!(set.name_for_path(Path::new("/etc/two")), Some("x"));
        assert_eq!(set.name_for_path(Path::new("/etc/one")), None);
    }

    #[test]
    fn authority_repeat_with_same_name_and_path_keeps_first() {
        let set = resolve(
            vec![
                Manifest::new("a", "/etc/a", "FIRST"),
                Manifest::new("a", "/etc/a", "SECOND"),
            ],
            &[],
        );
        assert_eq!(set.get("a").map(|x| x.template.as_str()), Some("FIRST"));
    }

    #[test]
    fn local_repeat_with_same_name_and_path_keeps_first() {
        let set = resolve(
            vec![],
            &[
                Manifest::new("x", "/etc/x", "FIRST"),
                Manifest::new("x", "/etc/x", "SECOND"),
            ],
        );
        assert_eq!(set.get("x").map(|x| x.template.as_str()), Some("FIRST"));
    }

    #[test]
    fn dropped_local_still_displaces_authority_by_name() {
        let set = resolve(vec![m("b", "/p2")], &[m("x", "/p1"), m("b", "/p1")]);
        let names: Vec<_> = set.names().collect();
        assert_eq!(names, vec!["x"]);
        assert_eq!(set.name_for_path(Path::new("/p2")), None);
    }

    #[test]
    fn paths_are_unique_in_result() {
        let set = resolve(
            vec![m("a", "/p1"), m("b", "/p2"), m("c", "/p1"), m("d", "/p3")],
            &[m("b", "/p3"), m("e", "/p2"), m("f", "/p2")],
        );
        let mut paths: Vec<_> = set.iter().map(|x| x.path.clone()).collect();
        let before = paths.len();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), before);
    }
}
