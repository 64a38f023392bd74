//! The `pinestate.toml` manifest
//!
//! ```toml
//! [[index]]
//! address = "docs"
//! name = "docs"
//! dimension = 1536
//! timeouts = { create = "20m" }
//! spec.serverless = { cloud = "aws", region = "us-east-1" }
//! ```

use anyhow::{Context, Result, bail};
use reconcile::Operation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::config::parse_duration;
use crate::model::{ApiKeyDeclaration, CollectionDeclaration, IndexDeclaration, ProjectDeclaration};
use crate::resource::Kind;

/// Default manifest file name
pub const MANIFEST_FILE: &str = "pinestate.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub index: Vec<Entry<IndexDeclaration>>,
    #[serde(default)]
    pub collection: Vec<Entry<CollectionDeclaration>>,
    #[serde(default)]
    pub project: Vec<Entry<ProjectDeclaration>>,
    #[serde(default)]
    pub api_key: Vec<Entry<ApiKeyDeclaration>>,
}

/// One declared instance: its address, deadlines and attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry<T> {
    /// Unique within a kind; the full address is `<kind>.<address>`
    pub address: String,
    #[serde(default)]
    pub timeouts: TimeoutsDeclaration,
    #[serde(flatten)]
    pub declaration: T,
}

/// Per-operation deadlines as written in the manifest ("90s", "10m", "1h")
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutsDeclaration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<String>,
}

impl TimeoutsDeclaration {
    pub fn resolve(&self) -> Result<TimeoutOverrides> {
        let parse = |op: &str, value: &Option<String>| -> Result<Option<Duration>> {
            value
                .as_deref()
                .map(|raw| {
                    parse_duration(raw).with_context(|| format!("Invalid timeouts.{op} '{raw}'"))
                })
                .transpose()
        };
        Ok(TimeoutOverrides {
            create: parse("create", &self.create)?,
            read: parse("read", &self.read)?,
            update: parse("update", &self.update)?,
            delete: parse("delete", &self.delete)?,
        })
    }
}

/// Parsed deadlines handed to the configuration host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeoutOverrides {
    pub create: Option<Duration>,
    pub read: Option<Duration>,
    pub update: Option<Duration>,
    pub delete: Option<Duration>,
}

impl TimeoutOverrides {
    pub fn get(&self, op: Operation) -> Option<Duration> {
        match op {
            Operation::Create => self.create,
            Operation::Read => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }
}

/// Full address of an instance, e.g. `index.docs`
pub fn full_address(kind: Kind, address: &str) -> String {
    format!("{}.{address}", kind.as_str())
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read manifest {}", path.display()))?;
        let manifest = Self::parse(&content)
            .with_context(|| format!("Invalid manifest {}", path.display()))?;
        log::debug!(
            "Loaded {} declarations from {}",
            manifest.addresses().len(),
            path.display()
        );
        Ok(manifest)
    }

    /// Parse and check addresses. Attribute validation happens per kind later.
    pub fn parse(content: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(content)?;

        let mut seen = BTreeSet::new();
        for (kind, address, timeouts) in manifest.entries() {
            if address.is_empty()
                || !address
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                bail!(
                    "{kind} address '{address}' must be non-empty and use only letters, digits, '-' or '_'"
                );
            }
            let full = full_address(kind, address);
            if !seen.insert(full.clone()) {
                bail!("Duplicate address '{full}'");
            }
            timeouts
                .resolve()
                .with_context(|| format!("In {full}"))?;
        }
        Ok(manifest)
    }

    fn entries(&self) -> Vec<(Kind, &str, &TimeoutsDeclaration)> {
        let mut entries = Vec::new();
        entries.extend(self.index.iter().map(|e| (Kind::Index, e.address.as_str(), &e.timeouts)));
        entries.extend(
            self.collection
                .iter()
                .map(|e| (Kind::Collection, e.address.as_str(), &e.timeouts)),
        );
        entries.extend(
            self.project
                .iter()
                .map(|e| (Kind::Project, e.address.as_str(), &e.timeouts)),
        );
        entries.extend(
            self.api_key
                .iter()
                .map(|e| (Kind::ApiKey, e.address.as_str(), &e.timeouts)),
        );
        entries
    }

    /// Full addresses of every declaration
    pub fn addresses(&self) -> BTreeSet<String> {
        self.entries()
            .into_iter()
            .map(|(kind, address, _)| full_address(kind, address))
            .collect()
    }
}
