//! Structural diff of resource snapshots.
//!
//! Two values of the same type are captured through their `Serialize`
//! impls and walked side by side, producing one [`Change`] per differing
//! leaf. Rules:
//!
//! - structs compare field by field in declaration order;
//! - `None` against `Some(_)` is a single change, `Some` against `Some`
//!   recurses;
//! - sequences of different length are a single change, otherwise they
//!   compare element-wise;
//! - string-keyed maps compare over the sorted union of their keys;
//! - anything else (enum variants with data, non-string keys, bytes) is
//!   compared for deep equality.
//!
//! A struct with a `force_send_fields: Vec<String>` member is sparse: its
//! zero-valued fields count as unset unless listed in that member. A listed
//! field must not be skipped by `skip_serializing_if`, or capture fails.

mod capture;
mod path;

use serde::Serialize;
use serde_json::Value;

use crate::error::DiffError;

use capture::{Node, capture};

pub use capture::FORCE_SEND_FIELDS;
pub use path::{Path, PathSegment};

/// One differing leaf between two snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    /// Location of the change.
    pub path: Path,
    /// Old value, `None` if unset.
    pub old: Option<Value>,
    /// New value, `None` if unset.
    pub new: Option<Value>,
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let render = |v: &Option<Value>| v.as_ref().map_or_else(|| "(unset)".to_string(), Value::to_string);
        write!(f, "{}: {} -> {}", self.path, render(&self.old), render(&self.new))
    }
}

/// Diffs two snapshots of the same type.
///
/// # Errors
///
/// Returns [`DiffError`] if either value fails to serialize.
pub fn diff<T: Serialize + ?Sized>(old: &T, new: &T) -> Result<Vec<Change>, DiffError> {
    diff_any(old, new)
}

/// Diffs two snapshots that are expected to share a shape.
///
/// # Errors
///
/// Returns [`DiffError::TypeMismatch`] when the top-level values are of
/// different kinds or are structs with different names.
pub fn diff_any<A, B>(old: &A, new: &B) -> Result<Vec<Change>, DiffError>
where
    A: Serialize + ?Sized,
    B: Serialize + ?Sized,
{
    let old = capture(old)?;
    let new = capture(new)?;
    check_same_shape(&old, &new)?;

    let mut changes = Vec::new();
    compare(&Path::root(), present(&old), present(&new), &mut changes);
    Ok(changes)
}

fn check_same_shape(old: &Node, new: &Node) -> Result<(), DiffError> {
    let same = match (old, new) {
        (Node::Struct(a), Node::Struct(b)) => a.name == b.name,
        (Node::Null, _) | (_, Node::Null) => true,
        (Node::Some(_), Node::Some(_))
        | (Node::Seq(_), Node::Seq(_))
        | (Node::Map(_), Node::Map(_))
        | (Node::Scalar(_), Node::Scalar(_))
        | (Node::Opaque(_), Node::Opaque(_)) => true,
        _ => false,
    };
    if same {
        Ok(())
    } else {
        Err(DiffError::TypeMismatch {
            old: old.kind(),
            new: new.kind(),
        })
    }
}

/// `Null` is treated exactly like an absent value.
const fn present(node: &Node) -> Option<&Node> {
    match node {
        Node::Null => None,
        other => Some(other),
    }
}

fn push(path: &Path, old: Option<&Node>, new: Option<&Node>, out: &mut Vec<Change>) {
    out.push(Change {
        path: path.clone(),
        old: old.map(Node::to_value),
        new: new.map(Node::to_value),
    });
}

fn lookup<'a>(entries: &'a [(String, Node)], key: &str) -> Option<&'a Node> {
    entries
        .iter()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| present(v))
}

fn compare(path: &Path, old: Option<&Node>, new: Option<&Node>, out: &mut Vec<Change>) {
    let (old, new) = match (old, new) {
        (None, None) => return,
        (Some(a), Some(b)) => (a, b),
        _ => return push(path, old, new, out),
    };

    match (old, new) {
        (Node::Some(a), Node::Some(b)) => compare(path, present(a), present(b), out),
        (Node::Struct(a), Node::Struct(b)) if a.name == b.name => {
            let mut names: Vec<&str> = a.fields.iter().map(|(name, _)| *name).collect();
            for (name, _) in &b.fields {
                if !names.contains(name) {
                    names.push(*name);
                }
            }
            for name in names {
                let child = path.child(PathSegment::Field(name.to_string()));
                compare(&child, a.effective(name), b.effective(name), out);
            }
        }
        (Node::Map(a), Node::Map(b)) => {
            let mut keys: Vec<&String> = a.iter().chain(b.iter()).map(|(k, _)| k).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                let child = path.child(PathSegment::Key(key.clone()));
                compare(&child, lookup(a, key), lookup(b, key), out);
            }
        }
        (Node::Seq(a), Node::Seq(b)) => {
            if a.len() != b.len() {
                return push(path, Some(old), Some(new), out);
            }
            for (idx, (x, y)) in a.iter().zip(b).enumerate() {
                let child = path.child(PathSegment::Index(idx));
                compare(&child, present(x), present(y), out);
            }
        }
        _ => {
            if old.to_value() != new.to_value() {
                push(path, Some(old), Some(new), out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, Default, Serialize)]
    struct Task {
        key: String,
        retries: u32,
    }

    #[derive(Debug, Clone, Default, Serialize)]
    struct Job {
        name: String,
        max_runs: i64,
        tasks: Vec<Task>,
        tags: BTreeMap<String, String>,
        timeout: Option<u32>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        force_send_fields: Vec<String>,
    }

    #[derive(Debug, Clone, Default, Serialize)]
    struct Plain {
        count: i64,
    }

    #[derive(Debug, Clone, Default, Serialize)]
    struct Other {
        count: i64,
    }

    fn job() -> Job {
        Job {
            name: "nightly".into(),
            max_runs: 1,
            tasks: vec![
                Task { key: "extract".into(), retries: 1 },
                Task { key: "load".into(), retries: 2 },
            ],
            tags: BTreeMap::from([("team".to_string(), "data".to_string())]),
            timeout: None,
            force_send_fields: Vec::new(),
        }
    }

    fn paths(changes: &[Change]) -> Vec<String> {
        changes.iter().map(|c| c.path.to_string()).collect()
    }

    #[test]
    fn test_identical_snapshots_have_no_changes() {
        assert!(diff(&job(), &job()).expect("diff").is_empty());
    }

    #[test]
    fn test_single_field_change() {
        let mut new = job();
        new.name = "hourly".into();
        let changes = diff(&job(), &new).expect("diff");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path.to_string(), "name");
        assert_eq!(changes[0].old, Some(Value::from("nightly")));
        assert_eq!(changes[0].new, Some(Value::from("hourly")));
    }

    #[test]
    fn test_nested_paths() {
        let mut new = job();
        new.tasks[1].retries = 5;
        new.tags.insert("team".into(), "ml".into());
        new.tags.insert("env".into(), "prod".into());
        let changes = diff(&job(), &new).expect("diff");
        assert_eq!(
            paths(&changes),
            vec!["tasks[1].retries", r#"tags["env"]"#, r#"tags["team"]"#]
        );
        assert_eq!(changes[1].old, None);
    }

    #[test]
    fn test_sequence_length_change_is_one_change() {
        let mut new = job();
        new.tasks.pop();
        let changes = diff(&job(), &new).expect("diff");
        assert_eq!(paths(&changes), vec!["tasks"]);
    }

    #[test]
    fn test_option_none_to_some() {
        let mut new = job();
        new.timeout = Some(0);
        let changes = diff(&job(), &new).expect("diff");
        assert_eq!(paths(&changes), vec!["timeout"]);
        assert_eq!(changes[0].old, None);
        assert_eq!(changes[0].new, Some(Value::from(0)));
    }

    #[test]
    fn test_sparse_zero_without_marker_is_unset() {
        let mut old = job();
        old.max_runs = 0;
        old.tags.clear();
        let mut new = old.clone();
        new.name = String::new();
        let changes = diff(&old, &new).expect("diff");
        assert_eq!(paths(&changes), vec!["name"]);
        assert_eq!(changes[0].new, None);

        let mut set = job();
        set.max_runs = 5;
        let changes = diff(&set, &old).expect("diff");
        assert!(paths(&changes).contains(&"max_runs".to_string()));
        let max_runs = changes.iter().find(|c| c.path.to_string() == "max_runs").expect("change");
        assert_eq!(max_runs.old, Some(Value::from(5)));
        assert_eq!(max_runs.new, None);
    }

    #[test]
    fn test_sparse_zero_with_marker_is_a_change() {
        let mut old = job();
        old.max_runs = 0;
        let mut new = job();
        new.max_runs = 0;
        new.force_send_fields = vec!["max_runs".into()];

        let changes = diff(&old, &new).expect("diff");
        assert_eq!(paths(&changes), vec!["max_runs"]);
        assert_eq!(changes[0].old, None);
        assert_eq!(changes[0].new, Some(Value::from(0)));
    }

    #[derive(Debug, Clone, Default, Serialize)]
    struct Omitting {
        #[serde(skip_serializing_if = "is_zero")]
        max_runs: u32,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        force_send_fields: Vec<String>,
    }

    #[allow(clippy::trivially_copy_pass_by_ref)]
    fn is_zero(n: &u32) -> bool {
        *n == 0
    }

    #[test]
    fn test_force_sent_field_skipped_by_serde_is_rejected() {
        let old = Omitting::default();
        let new = Omitting {
            max_runs: 0,
            force_send_fields: vec!["max_runs".into()],
        };
        let err = diff(&old, &new).expect_err("skipped force-sent field");
        assert!(matches!(err, DiffError::Capture(_)));
    }

    #[test]
    fn test_non_sparse_zero_is_compared() {
        let changes = diff(&Plain { count: 3 }, &Plain { count: 0 }).expect("diff");
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].new, Some(Value::from(0)));
    }

    #[test]
    fn test_type_mismatch() {
        let err = diff_any(&Plain { count: 1 }, &Other { count: 1 }).expect_err("mismatch");
        assert!(matches!(err, DiffError::TypeMismatch { .. }));

        let err = diff_any(&Plain { count: 1 }, &vec![1]).expect_err("mismatch");
        assert!(matches!(err, DiffError::TypeMismatch { .. }));
    }

    #[test]
    fn test_change_display() {
        let mut new = job();
        new.timeout = Some(30);
        let changes = diff(&job(), &new).expect("diff");
        assert_eq!(changes[0].to_string(), "timeout: (unset) -> 30");
    }
}
