//! Core types for lifecycle reconciliation

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One of the four lifecycle operations exposed to a configuration host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-operation deadlines for the polling phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Timeouts {
    /// Same deadline for create, update and delete.
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            create: timeout,
            read: timeout,
            update: timeout,
            delete: timeout,
        }
    }

    pub fn for_operation(&self, op: Operation) -> Duration {
        match op {
            Operation::Create => self.create,
            Operation::Read => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }

    /// Resolve the deadline for `op`, preferring a caller override.
    ///
    /// An absent or zero override falls back to the default.
    pub fn resolve(&self, op: Operation, caller: Option<Duration>) -> Duration {
        match caller {
            Some(timeout) if !timeout.is_zero() => timeout,
            _ => self.for_operation(op),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::uniform(Duration::from_secs(10 * 60))
    }
}

/// Successful result of an orchestrated operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Remote resource was created and reached readiness
    Created,
    /// Changed fields were applied and the resource settled
    Updated,
    /// No drift; observed state was refreshed
    Unchanged,
    /// Observed state was refreshed by a Read
    Refreshed,
    /// Observed state was hydrated from an existing remote resource
    Imported,
    /// Remote resource was deleted
    Deleted,
    /// Remote resource no longer exists; tracking was removed
    Gone,
}

impl Outcome {
    /// Check if the outcome represents a remote change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Updated | Self::Deleted)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::Refreshed => "refreshed",
            Self::Imported => "imported",
            Self::Deleted => "deleted",
            Self::Gone => "gone",
        };
        f.write_str(label)
    }
}

/// Identity supplied when adopting an existing remote resource.
///
/// Resources scoped under a parent use the composite form
/// `"<parent-id>:<resource-id>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportId {
    pub parent: Option<String>,
    pub id: String,
}

impl ImportId {
    /// Parse a plain id. A `:` is rejected since it would be ambiguous.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConfigError::field("id", "import id must not be empty"));
        }
        if raw.contains(':') {
            return Err(ConfigError::field(
                "id",
                format!("unexpected composite import id '{raw}'"),
            ));
        }
        Ok(Self {
            parent: None,
            id: raw.to_string(),
        })
    }

    /// Parse `"<parent-id>:<resource-id>"`.
    pub fn parse_scoped(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().split_once(':') {
            Some((parent, id)) if !parent.is_empty() && !id.is_empty() && !id.contains(':') => {
                Ok(Self {
                    parent: Some(parent.to_string()),
                    id: id.to_string(),
                })
            }
            _ => Err(ConfigError::field(
                "id",
                format!("expected '<parent-id>:<resource-id>', got '{raw}'"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_prefers_override() {
        let timeouts = Timeouts::uniform(Duration::from_secs(600));
        assert_eq!(
            timeouts.resolve(Operation::Create, Some(Duration::from_secs(30))),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_resolve_zero_or_absent_falls_back() {
        let timeouts = Timeouts {
            create: Duration::from_secs(1),
            read: Duration::from_secs(2),
            update: Duration::from_secs(3),
            delete: Duration::from_secs(4),
        };
        assert_eq!(
            timeouts.resolve(Operation::Update, Some(Duration::ZERO)),
            Duration::from_secs(3)
        );
        assert_eq!(
            timeouts.resolve(Operation::Delete, None),
            Duration::from_secs(4)
        );
    }

    #[test]
    fn test_outcome_is_change() {
        assert!(Outcome::Created.is_change());
        assert!(Outcome::Deleted.is_change());
        assert!(!Outcome::Unchanged.is_change());
        assert!(!Outcome::Gone.is_change());
    }

    #[test]
    fn test_import_id_plain() {
        let id = ImportId::parse(" my-index ").unwrap();
        assert_eq!(id.parent, None);
        assert_eq!(id.id, "my-index");

        assert!(ImportId::parse("").is_err());
        assert!(ImportId::parse("a:b").is_err());
    }

    #[test]
    fn test_import_id_scoped() {
        let id = ImportId::parse_scoped("proj-1:key-9").unwrap();
        assert_eq!(id.parent.as_deref(), Some("proj-1"));
        assert_eq!(id.id, "key-9");

        assert!(ImportId::parse_scoped("key-9").is_err());
        assert!(ImportId::parse_scoped(":key-9").is_err());
        assert!(ImportId::parse_scoped("proj-1:").is_err());
        assert!(ImportId::parse_scoped("a:b:c").is_err());
    }
}
