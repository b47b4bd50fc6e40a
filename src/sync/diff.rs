use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::sync::ABSENT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDelta {
    Identical,
    Differs,
    LocalOnly,
    RemoteOnly,
}

impl FileDelta {
    pub fn is_change(&self) -> bool {
        !matches!(self, FileDelta::Identical)
    }
}

/// Classify every path known to either side.
///
/// A hash equal to the absent marker counts as a missing file.
pub fn compute_delta(
    local: &HashMap<String, String>,
    remote: &HashMap<String, String>,
) -> BTreeMap<String, FileDelta> {
    let present = |hashes: &HashMap<String, String>, path: &str| {
        hashes
            .get(path)
            .filter(|hash| hash.as_str() != ABSENT)
            .cloned()
    };

    let paths: BTreeSet<&String> = local.keys().chain(remote.keys()).collect();
    let mut delta = BTreeMap::new();

    for path in paths {
        let state = match (present(local, path.as_str()), present(remote, path.as_str())) {
            (Some(local_hash), Some(remote_hash)) if local_hash == remote_hash => {
                FileDelta::Identical
            }
            (Some(_), Some(_)) => FileDelta::Differs,
            (Some(_), None) => FileDelta::LocalOnly,
            (None, Some(_)) => FileDelta::RemoteOnly,
            // Listed but gone on both sides
            (None, None) => continue,
        };
        delta.insert(path.clone(), state);
    }

    delta
}

/// Paths of the delta in a given state
pub fn paths_in(delta: &BTreeMap<String, FileDelta>, wanted: &[FileDelta]) -> Vec<String> {
    delta
        .iter()
        .filter(|(_, state)| wanted.contains(state))
        .map(|(path, _)| path.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashes(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(path, hash)| (path.to_string(), hash.to_string()))
            .collect()
    }

    #[test]
    fn one_sided_files_are_deltas_and_equal_ones_are_not() {
        let local = hashes(&[("a", "h1"), ("b", "h2")]);
        let remote = hashes(&[("a", "h1"), ("c", "h3")]);

        let delta = compute_delta(&local, &remote);

        assert_eq!(delta["a"], FileDelta::Identical);
        assert_eq!(delta["b"], FileDelta::LocalOnly);
        assert_eq!(delta["c"], FileDelta::RemoteOnly);

        let changes: Vec<_> = delta.iter().filter(|(_, s)| s.is_change()).collect();
        assert_eq!(changes.len(), 2);
    }

    #[test]
    fn different_hashes_differ() {
        let local = hashes(&[("a", "h1")]);
        let remote = hashes(&[("a", "h9")]);
        assert_eq!(compute_delta(&local, &remote)["a"], FileDelta::Differs);
    }

    #[test]
    fn absent_marker_counts_as_missing() {
        let local = hashes(&[("a", "h1"), ("gone", ABSENT)]);
        let remote = hashes(&[("a", ABSENT), ("gone", ABSENT)]);

        let delta = compute_delta(&local, &remote);
        assert_eq!(delta["a"], FileDelta::LocalOnly);
        assert!(!delta.contains_key("gone"));
    }

    #[test]
    fn paths_in_filters_by_state() {
        let local = hashes(&[("a", "h1"), ("b", "h2"), ("d", "x")]);
        let remote = hashes(&[("a", "h1"), ("c", "h3"), ("d", "y")]);
        let delta = compute_delta(&local, &remote);

        assert_eq!(
            paths_in(&delta, &[FileDelta::Differs, FileDelta::RemoteOnly]),
            vec!["c".to_string(), "d".to_string()]
        );
        assert_eq!(paths_in(&delta, &[FileDelta::LocalOnly]), vec!["b".to_string()]);
    }
}
