//! Structural diff between two versions of a container.
//!
//! Objects and arrays are walked recursively; every differing leaf is
//! reported at its dotted path (`specs.voltage`, `tags.1`). A key present on
//! one side only is `added` or `removed` with its whole value. When the two
//! sides differ in shape (object vs scalar) the path is `modified`.

use gitchain_core::ContainerId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of change at one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// Present only in the newer version.
    Added,
    /// Present only in the older version.
    Removed,
    /// Present in both with different values.
    Modified,
}

/// One changed path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffChange {
    /// Dotted path; empty for the document root.
    pub path: String,
    /// What happened at the path.
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    /// Value before, for removed and modified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    /// Value after, for added and modified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
}

/// Changes between two commits of one container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    /// Container compared.
    pub container_id: ContainerId,
    /// Version at the older commit (0 if the container did not exist yet).
    pub from_version: u64,
    /// Version at the newer commit.
    pub to_version: u64,
    /// Changed paths, in key order.
    pub changes: Vec<DiffChange>,
}

/// Compute the changes turning `from` into `to`.
///
/// `None` means the container did not exist on that side.
pub fn compute_changes(from: Option<&Value>, to: Option<&Value>) -> Vec<DiffChange> {
    let mut changes = Vec::new();
    walk(from, to, "", &mut changes);
    changes
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn walk(from: Option<&Value>, to: Option<&Value>, prefix: &str, out: &mut Vec<DiffChange>) {
    match (from, to) {
        (None, None) => {}
        (None, Some(new)) => {
            // A brand-new container lists its top-level keys.
            if let (true, Value::Object(map)) = (prefix.is_empty(), new) {
                for (k, v) in map {
                    out.push(added(join(prefix, k), v));
                }
            } else {
                out.push(added(prefix.to_string(), new));
            }
        }
        (Some(old), None) => {
            if let (true, Value::Object(map)) = (prefix.is_empty(), old) {
                for (k, v) in map {
                    out.push(removed(join(prefix, k), v));
                }
            } else {
                out.push(removed(prefix.to_string(), old));
            }
        }
        (Some(old), Some(new)) if old == new => {}
        (Some(Value::Object(a)), Some(Value::Object(b))) => {
            let keys: std::collections::BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            for key in keys {
                let path = join(prefix, key);
                match (a.get(key), b.get(key)) {
                    (None, Some(v)) => out.push(added(path, v)),
                    (Some(v), None) => out.push(removed(path, v)),
                    (old, new) => walk(old, new, &path, out),
                }
            }
        }
        (Some(Value::Array(a)), Some(Value::Array(b))) => {
            for i in 0..a.len().max(b.len()) {
                let path = join(prefix, &i.to_string());
                match (a.get(i), b.get(i)) {
                    (None, Some(v)) => out.push(added(path, v)),
                    (Some(v), None) => out.push(removed(path, v)),
                    (old, new) => walk(old, new, &path, out),
                }
            }
        }
        (Some(old), Some(new)) => out.push(DiffChange {
            path: prefix.to_string(),
            kind: ChangeKind::Modified,
            old_value: Some(old.clone()),
            new_value: Some(new.clone()),
        }),
    }
}

fn added(path: String, value: &Value) -> DiffChange {
    DiffChange {
        path,
        kind: ChangeKind::Added,
        old_value: None,
        new_value: Some(value.clone()),
    }
}

fn removed(path: String, value: &Value) -> DiffChange {
    DiffChange {
        path,
        kind: ChangeKind::Removed,
        old_value: Some(value.clone()),
        new_value: None,
    }
}
