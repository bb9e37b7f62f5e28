//! Merge/aggregation: rebuild the call tree from raw trace files.
//!
//! Accepts one file (single process) or several (one per process rank) and
//! produces the display-path-keyed node map plus cross-cutting per-function
//! totals, with all derived percentage statistics filled in.

use std::collections::BTreeMap;
use std::path::Path;

use log::debug;
use thiserror::Error;

use callprof_protocol::ProfNode;
use callprof_protocol::path::{self, PARENT, TOTAL};

use crate::raw::{self, RawFileError};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Raw(#[from] RawFileError),
    #[error("tree path `{path}` has no totals entry for `{func}`")]
    MissingTotals { path: String, func: String },
    #[error("no `$total` record found in the input files")]
    MissingRoot,
}

/// Cross-cutting totals for one function: aggregated across every call
/// path sharing the trailing segment, independent of tree structure.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FuncTotals {
    pub tot_time: f64,
    pub tot_count: u64,
}

/// Totals keyed by (decorated) trailing path segment.
pub type Totals = BTreeMap<String, FuncTotals>;

/// Merge output: the call tree and the per-function totals.
#[derive(Debug, Clone, Default)]
pub struct MergedProfile {
    /// Call tree nodes keyed by full path, in sorted order so repeated
    /// merges of the same inputs serialize identically.
    pub nodes: BTreeMap<String, ProfNode>,
    pub totals: Totals,
}

impl MergedProfile {
    /// Inclusive time of the `$total` root.
    pub fn root_time(&self) -> f64 {
        self.nodes.get(TOTAL).map(|n| n.time).unwrap_or(0.0)
    }
}

/// Merge one or more raw trace files into a call tree with derived
/// statistics.
///
/// With multiple input files, a file whose extension parses as an integer
/// rank has that extension appended to every path segment it contributes,
/// keeping per-process subtrees disjoint in the merged tree. The reserved
/// `$total` and `$parent` segments are never decorated: all processes share
/// one root (whose time and count accumulate across files) and the
/// exclusive-self marker stays recognizable. A single input file is read
/// without decoration, so single-process output is path-identity-preserving.
pub fn process_profiles<P: AsRef<Path>>(files: &[P]) -> Result<MergedProfile, MergeError> {
    let mut nodes: BTreeMap<String, ProfNode> = BTreeMap::new();
    let mut totals: Totals = BTreeMap::new();
    let multi = files.len() > 1;

    for file in files {
        let file = file.as_ref();
        let rank = file
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse::<u32>().ok());
        let decoration = match (multi, rank) {
            (true, Some(rank)) => Some(format!(".{rank}")),
            _ => None,
        };

        for record in raw::read_raw_file(file)? {
            let record = record?;
            let key = decorate(&record.path, decoration.as_deref());

            let node = nodes
                .entry(key)
                .or_insert_with_key(|k| ProfNode::new(k.as_str()));
            node.time += record.time;
            node.count += record.count;

            // Synthetic self leaves carry their parent's exclusive time;
            // counting them as a "function" would double-book it.
            if node.short_name != PARENT {
                let entry = totals.entry(node.short_name.clone()).or_default();
                entry.tot_time += record.time;
                entry.tot_count += record.count;
            }
        }
    }

    // Inclusive-time snapshot: the stats pass below reads parent and root
    // times while mutating the nodes themselves.
    let times: BTreeMap<String, f64> = nodes
        .iter()
        .map(|(key, node)| (key.clone(), node.time))
        .collect();
    let root_time = *times.get(TOTAL).ok_or(MergeError::MissingRoot)?;

    for (key, node) in &mut nodes {
        if node.short_name == PARENT {
            continue;
        }
        let func_totals =
            totals
                .get(&node.short_name)
                .copied()
                .ok_or_else(|| MergeError::MissingTotals {
                    path: key.clone(),
                    func: node.short_name.clone(),
                })?;
        node.tot_time = func_totals.tot_time;
        node.tot_count = func_totals.tot_count;

        // A single-segment path is its own parent, so the root's
        // pct_parent is 1.0 (or undefined for a zero-duration run).
        let parent_key = path::parent_of(key).unwrap_or(key);
        node.pct_parent = times
            .get(parent_key)
            .copied()
            .and_then(|parent_time| ratio(node.time, parent_time));
        node.pct_total = ratio(node.time, root_time);
        node.tot_pct_total = ratio(node.tot_time, root_time);
    }

    // A function has no "other call sites" concept at the root.
    if let Some(root) = nodes.get_mut(TOTAL) {
        root.tot_time = root_time;
    }

    // Partition-style layouts sum children to get the parent's value, so a
    // node with a synthetic self leaf must not also carry its own time.
    let self_parents: Vec<String> = nodes
        .keys()
        .filter(|key| path::is_self_node(key))
        .filter_map(|key| path::parent_of(key).map(String::from))
        .collect();
    for parent in self_parents {
        if let Some(node) = nodes.get_mut(&parent) {
            node.time = 0.0;
        }
    }

    debug!("merged {} file(s) into {} nodes", files.len(), nodes.len());
    Ok(MergedProfile { nodes, totals })
}

/// Undefined percentages (zero denominator) are `None`, never a crash and
/// never a silently wrong number.
fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    (denominator != 0.0).then(|| numerator / denominator)
}

fn decorate(raw_path: &str, decoration: Option<&str>) -> String {
    let Some(dec) = decoration else {
        return raw_path.to_string();
    };
    path::join(path::split(raw_path).map(|segment| {
        if segment == TOTAL || segment == PARENT {
            segment.to_string()
        } else {
            format!("{segment}{dec}")
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use callprof_protocol::RawRecord;

    use super::*;
    use crate::raw::write_raw_file;

    fn write_trace(dir: &Path, name: &str, records: &[RawRecord]) -> PathBuf {
        let file = dir.join(name);
        write_raw_file(&file, records).unwrap();
        file
    }

    #[test]
    fn single_file_merge_preserves_paths_and_values() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_trace(
            dir.path(),
            "iprof.0",
            &[
                RawRecord::new("$total", 1, 4.0),
                RawRecord::new("$total@a", 2, 3.0),
                RawRecord::new("$total@a@b", 4, 1.0),
            ],
        );

        let merged = process_profiles(&[file]).unwrap();
        // One file: the integer extension must not decorate paths.
        assert_eq!(
            merged.nodes.keys().collect::<Vec<_>>(),
            vec!["$total", "$total@a", "$total@a@b"]
        );

        let a = &merged.nodes["$total@a"];
        assert_eq!(a.count, 2);
        assert_eq!(a.time, 3.0);
        assert_eq!(a.pct_total, Some(0.75));
        assert_eq!(a.pct_parent, Some(0.75));

        let b = &merged.nodes["$total@a@b"];
        assert_eq!(b.pct_parent, Some(1.0 / 3.0));
        assert_eq!(b.pct_total, Some(0.25));
    }

    #[test]
    fn root_statistics() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_trace(
            dir.path(),
            "iprof.0",
            &[
                RawRecord::new("$total", 1, 4.0),
                RawRecord::new("$total@a", 1, 1.0),
            ],
        );

        let merged = process_profiles(&[file]).unwrap();
        let root = &merged.nodes["$total"];
        assert_eq!(root.tot_time, 4.0);
        assert_eq!(root.pct_parent, Some(1.0));
        assert_eq!(root.pct_total, Some(1.0));
        assert_eq!(merged.root_time(), 4.0);
    }

    #[test]
    fn totals_aggregate_across_call_sites() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_trace(
            dir.path(),
            "iprof.0",
            &[
                RawRecord::new("$total", 1, 10.0),
                RawRecord::new("$total@f", 2, 3.0),
                RawRecord::new("$total@g", 1, 5.0),
                RawRecord::new("$total@g@f", 3, 2.0),
            ],
        );

        let merged = process_profiles(&[file]).unwrap();
        let f = &merged.totals["f"];
        assert_eq!(f.tot_time, 5.0);
        assert_eq!(f.tot_count, 5);

        // Every tree node ending in `f` reports the same totals.
        assert_eq!(merged.nodes["$total@f"].tot_time, 5.0);
        assert_eq!(merged.nodes["$total@g@f"].tot_time, 5.0);
        assert_eq!(merged.nodes["$total@g@f"].tot_pct_total, Some(0.5));
    }

    #[test]
    fn self_leaves_are_excluded_from_totals_and_zero_their_parent() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_trace(
            dir.path(),
            "iprof.0",
            &[
                RawRecord::new("$total", 1, 4.0),
                RawRecord::new("$total@a", 1, 3.0),
                RawRecord::new("$total@a@$parent", 1, 3.0),
                RawRecord::new("$total@$parent", 1, 1.0),
            ],
        );

        let merged = process_profiles(&[file]).unwrap();
        assert!(!merged.totals.contains_key(PARENT));

        // Percentages were computed before zeroing.
        let a = &merged.nodes["$total@a"];
        assert_eq!(a.time, 0.0);
        assert_eq!(a.pct_total, Some(0.75));

        let root = &merged.nodes["$total"];
        assert_eq!(root.time, 0.0);
        assert_eq!(root.tot_time, 4.0);

        // The self leaves themselves are untouched and carry no stats.
        let a_self = &merged.nodes["$total@a@$parent"];
        assert_eq!(a_self.time, 3.0);
        assert_eq!(a_self.pct_total, None);
    }

    #[test]
    fn two_ranked_files_stay_disjoint_under_a_shared_root() {
        let dir = tempfile::tempdir().unwrap();
        let file0 = write_trace(
            dir.path(),
            "iprof.0",
            &[
                RawRecord::new("$total", 1, 2.0),
                RawRecord::new("$total@a", 1, 1.0),
            ],
        );
        let file1 = write_trace(
            dir.path(),
            "iprof.1",
            &[
                RawRecord::new("$total", 1, 3.0),
                RawRecord::new("$total@a", 2, 0.5),
            ],
        );

        let merged = process_profiles(&[file0, file1]).unwrap();
        assert_eq!(
            merged.nodes.keys().collect::<Vec<_>>(),
            vec!["$total", "$total@a.0", "$total@a.1"]
        );

        // Shared root accumulates both processes.
        let root = &merged.nodes["$total"];
        assert_eq!(root.time, 5.0);
        assert_eq!(root.count, 2);

        // Same display name, different processes: separate nodes, separate
        // totals buckets.
        assert_eq!(merged.nodes["$total@a.0"].time, 1.0);
        assert_eq!(merged.nodes["$total@a.1"].time, 0.5);
        assert_eq!(merged.totals["a.0"].tot_count, 1);
        assert_eq!(merged.totals["a.1"].tot_count, 2);
        assert_eq!(merged.nodes["$total@a.1"].pct_total, Some(0.1));
    }

    #[test]
    fn non_integer_extension_is_not_decorated() {
        let dir = tempfile::tempdir().unwrap();
        let file0 = write_trace(
            dir.path(),
            "iprof.0",
            &[
                RawRecord::new("$total", 1, 2.0),
                RawRecord::new("$total@a", 1, 1.0),
            ],
        );
        let plain = write_trace(
            dir.path(),
            "trace.raw",
            &[
                RawRecord::new("$total", 1, 2.0),
                RawRecord::new("$total@b", 1, 1.0),
            ],
        );

        let merged = process_profiles(&[file0, plain]).unwrap();
        assert!(merged.nodes.contains_key("$total@a.0"));
        assert!(merged.nodes.contains_key("$total@b"));
    }

    #[test]
    fn merge_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file0 = write_trace(
            dir.path(),
            "iprof.0",
            &[
                RawRecord::new("$total", 1, 2.0),
                RawRecord::new("$total@a", 3, 1.5),
            ],
        );
        let file1 = write_trace(
            dir.path(),
            "iprof.1",
            &[
                RawRecord::new("$total", 1, 1.0),
                RawRecord::new("$total@a", 1, 0.25),
            ],
        );

        let files = [file0, file1];
        let first = process_profiles(&files).unwrap();
        let second = process_profiles(&files).unwrap();
        assert_eq!(first.nodes, second.nodes);
        assert_eq!(first.totals, second.totals);
    }

    #[test]
    fn zero_duration_run_yields_undefined_percentages() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_trace(dir.path(), "iprof.0", &[RawRecord::new("$total", 1, 0.0)]);

        let merged = process_profiles(&[file]).unwrap();
        let root = &merged.nodes["$total"];
        assert_eq!(root.pct_total, None);
        assert_eq!(root.pct_parent, None);
        assert_eq!(root.tot_pct_total, None);
    }

    #[test]
    fn missing_root_is_a_consistency_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_trace(dir.path(), "iprof.0", &[RawRecord::new("a", 1, 1.0)]);
        assert!(matches!(
            process_profiles(&[file]),
            Err(MergeError::MissingRoot)
        ));
    }

    #[test]
    fn malformed_file_fails_naming_the_line() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("iprof.0");
        std::fs::write(&file, "$total 1 nope\n").unwrap();

        let err = process_profiles(&[file]).unwrap_err();
        assert!(err.to_string().contains("iprof.0:1"));
    }
}
