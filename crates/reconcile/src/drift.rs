//! Field-level drift between observed and desired state

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tag updates sent to the remote API. A `""` value removes the key.
pub type TagPatch = BTreeMap<String, String>;

/// How a changed field can be reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Can be sent in an update call
    MutableUpdate,
    /// Cannot be changed in place; the resource must be replaced
    ForcesReplace,
    /// Managed by the remote side; informational only
    RemoteComputed,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::MutableUpdate => "update",
            Self::ForcesReplace => "forces replacement",
            Self::RemoteComputed => "computed",
        };
        f.write_str(label)
    }
}

/// A single changed field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Attribute path, e.g. `spec.pod.replicas`
    pub field: String,
    pub kind: ChangeKind,
    /// Observed value, `None` when unset
    pub from: Option<String>,
    /// Desired value, `None` when unset
    pub to: Option<String>,
}

/// The set of changes needed to move from observed to desired state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftPlan {
    pub changes: Vec<FieldChange>,
    /// Minimal tag update, present only when tags differ
    pub tags: Option<TagPatch>,
}

impl DriftPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change for `field` if the two values differ.
    pub fn compare<V>(&mut self, field: &str, kind: ChangeKind, from: Option<&V>, to: Option<&V>)
    where
        V: PartialEq + fmt::Display + ?Sized,
    {
        if from == to {
            return;
        }
        self.changes.push(FieldChange {
            field: field.to_string(),
            kind,
            from: from.map(ToString::to_string),
            to: to.map(ToString::to_string),
        });
    }

    /// Record a change with preformatted values, e.g. for nested structures.
    pub fn record(&mut self, field: &str, kind: ChangeKind, from: Option<String>, to: Option<String>) {
        self.changes.push(FieldChange {
            field: field.to_string(),
            kind,
            from,
            to,
        });
    }

    /// Diff two tag maps and record the merge patch if they differ.
    pub fn set_tags(
        &mut self,
        prior: Option<&BTreeMap<String, String>>,
        desired: Option<&BTreeMap<String, String>>,
    ) {
        let empty = BTreeMap::new();
        let patch = merge_tags(prior.unwrap_or(&empty), desired.unwrap_or(&empty));
        if patch.is_empty() {
            return;
        }
        self.changes.push(FieldChange {
            field: "tags".to_string(),
            kind: ChangeKind::MutableUpdate,
            from: Some(format_tags(prior.unwrap_or(&empty))),
            to: Some(format_tags(desired.unwrap_or(&empty))),
        });
        self.tags = Some(patch);
    }

    /// Check if any change forces replacement
    pub fn forces_replace(&self) -> bool {
        self.changes
            .iter()
            .any(|c| c.kind == ChangeKind::ForcesReplace)
    }

    /// Fields that force replacement
    pub fn replace_fields(&self) -> Vec<String> {
        self.changes
            .iter()
            .filter(|c| c.kind == ChangeKind::ForcesReplace)
            .map(|c| c.field.clone())
            .collect()
    }

    /// Whether there is nothing to send. Remote-computed changes don't count.
    pub fn is_empty(&self) -> bool {
        self.changes
            .iter()
            .all(|c| c.kind == ChangeKind::RemoteComputed)
    }

    /// Check if a field (or anything nested under it) changed
    pub fn changed(&self, field: &str) -> bool {
        self.changes.iter().any(|c| {
            c.kind != ChangeKind::RemoteComputed
                && (c.field == field
                    || c.field
                        .strip_prefix(field)
                        .is_some_and(|rest| rest.starts_with('.')))
        })
    }
}

/// Compute the minimal tag update from `prior` to `desired`.
///
/// New or changed keys carry the desired value; keys only in `prior` map to
/// `""`, which the remote API treats as removal. Unchanged keys are omitted.
pub fn merge_tags(
    prior: &BTreeMap<String, String>,
    desired: &BTreeMap<String, String>,
) -> TagPatch {
    let mut patch = TagPatch::new();
    for (key, value) in desired {
        if prior.get(key) != Some(value) {
            patch.insert(key.clone(), value.clone());
        }
    }
    for key in prior.keys() {
        if !desired.contains_key(key) {
            patch.insert(key.clone(), String::new());
        }
    }
    patch
}

/// Apply a tag patch the way the remote API does.
pub fn apply_tag_patch(tags: &mut BTreeMap<String, String>, patch: &TagPatch) {
    for (key, value) in patch {
        if value.is_empty() {
            tags.remove(key);
        } else {
            tags.insert(key.clone(), value.clone());
        }
    }
}

fn format_tags(tags: &BTreeMap<String, String>) -> String {
    let pairs: Vec<String> = tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{{{}}}", pairs.join(", "))
}
