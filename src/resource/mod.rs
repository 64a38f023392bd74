//! Resource kinds and the managed-instance seam
//!
//! Every Pinecone object pinestate manages is modeled as a resource kind
//! implementing [`Reconcilable`], sharing one [`ControlPlane`] client.
//! [`Instance`] pairs a kind with its state record so the engine can drive
//! indexes, collections, projects and API keys through one object-safe
//! trait, [`Managed`].

use pinecone::{ControlPlane, ErrorCategory};
use reconcile::{
    DriftPlan, Error, Operation, Orchestrator, Outcome, Reconcilable, ReconcileContext,
    RemoteError, StateHost,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::state::RecordHost;

pub mod api_key;
pub mod collection;
pub mod index;
pub mod project;

pub use api_key::ApiKeyKind;
pub use collection::CollectionKind;
pub use index::IndexKind;
pub use project::ProjectKind;

/// Shared remote client
pub type Client = Arc<dyn ControlPlane>;

/// Resource type of a managed instance
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Project,
    Index,
    #[value(name = "api_key")]
    ApiKey,
    Collection,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Index => "index",
            Self::ApiKey => "api_key",
            Self::Collection => "collection",
        }
    }

    /// Creation order: a collection is created after its source index.
    /// Deletion runs tiers in reverse, so keys go before their project.
    /// Keys name their project by remote id, which must already exist.
    pub fn tier(&self) -> u8 {
        match self {
            Self::Project | Self::Index => 0,
            Self::ApiKey | Self::Collection => 1,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a client error for the poller.
pub fn remote(err: pinecone::Error) -> RemoteError {
    match err.category() {
        ErrorCategory::NotFound => RemoteError::not_found(err.to_string()),
        ErrorCategory::Network => RemoteError::transient(err.to_string()),
        category @ (ErrorCategory::Auth | ErrorCategory::Rejected | ErrorCategory::Format) => {
            RemoteError::fatal(format!("{err} ({})", category.advice()))
        }
    }
}

// ============================================================================
// Managed instances
// ============================================================================

/// One declared or tracked instance, whatever its kind
pub trait Managed: Send + Sync {
    /// Full address, e.g. `index.docs`
    fn address(&self) -> &str;

    fn kind(&self) -> Kind;

    /// Still present in the manifest
    fn is_declared(&self) -> bool;

    /// Has a record in the state file
    fn is_tracked(&self) -> bool;

    fn remote_id(&self) -> Option<String>;

    /// Check the declaration translates into a request, without any remote call
    fn validate(&self) -> reconcile::Result<()>;

    /// Changes between the last observed state and the declaration.
    ///
    /// `None` unless the instance is both declared and tracked.
    fn drift(&self) -> reconcile::Result<Option<DriftPlan>>;

    /// Run one lifecycle operation
    fn run(&self, op: Operation, ctx: &mut ReconcileContext<'_>) -> reconcile::Result<Outcome>;

    /// Adopt an existing remote object
    fn import(&self, id: &str, ctx: &mut ReconcileContext<'_>) -> reconcile::Result<Outcome>;
}

/// A resource kind bound to the state record of one instance
pub struct Instance<R: Reconcilable> {
    address: String,
    kind: Kind,
    orchestrator: Orchestrator<R>,
    host: Mutex<RecordHost<R::Desired, R::Observed>>,
}

impl<R: Reconcilable> Instance<R> {
    pub fn new(kind: Kind, resource: R, host: RecordHost<R::Desired, R::Observed>) -> Self {
        Self {
            address: host.address().to_string(),
            kind,
            orchestrator: Orchestrator::new(resource),
            host: Mutex::new(host),
        }
    }

    fn host(&self) -> MutexGuard<'_, RecordHost<R::Desired, R::Observed>> {
        match self.host.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<R> Managed for Instance<R>
where
    R: Reconcilable,
    R::Desired: Serialize + Send,
    R::Observed: Serialize + DeserializeOwned + Send,
{
    fn address(&self) -> &str {
        &self.address
    }

    fn kind(&self) -> Kind {
        self.kind
    }

    fn is_declared(&self) -> bool {
        self.host().is_declared()
    }

    fn is_tracked(&self) -> bool {
        self.host().is_tracked()
    }

    fn remote_id(&self) -> Option<String> {
        self.host().remote_id()
    }

    fn validate(&self) -> reconcile::Result<()> {
        let resource = self.orchestrator.resource();
        match self.host().desired() {
            Some(desired) => resource
                .to_request(&desired)
                .map(|_| ())
                .map_err(|e| Error::invalid(resource.kind(), e)),
            None => Ok(()),
        }
    }

    fn drift(&self) -> reconcile::Result<Option<DriftPlan>> {
        let host = self.host();
        let resource = self.orchestrator.resource();
        let prior = host.prior().map_err(|e| Error::UnreadableState {
            kind: resource.kind(),
            id: host.tracked_id(),
            message: format!("{e:#}"),
        })?;
        let (Some(desired), Some(prior)) = (host.desired(), prior) else {
            return Ok(None);
        };
        resource
            .drift(&prior, &desired)
            .map(Some)
            .map_err(|e| Error::invalid(resource.kind(), e))
    }

    fn run(&self, op: Operation, ctx: &mut ReconcileContext<'_>) -> reconcile::Result<Outcome> {
        let mut host = self.host();
        match op {
            Operation::Create => self.orchestrator.create(&mut *host, ctx),
            Operation::Read => self.orchestrator.read(&mut *host, ctx),
            Operation::Update => self.orchestrator.update(&mut *host, ctx),
            Operation::Delete => self.orchestrator.delete(&mut *host, ctx),
        }
    }

    fn import(&self, id: &str, ctx: &mut ReconcileContext<'_>) -> reconcile::Result<Outcome> {
        self.orchestrator.import(id, &mut *self.host(), ctx)
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_classification() {
        assert!(remote(pinecone::Error::not_found("index 'x'")).is_not_found());
        assert_eq!(
            remote(pinecone::Error::http("HTTP 503", Some(503))).class,
            reconcile::ErrorClass::Transient
        );
        let fatal = remote(pinecone::Error::MissingCredentials("PINECONE_API_KEY"));
        assert_eq!(fatal.class, reconcile::ErrorClass::Fatal);
        assert!(fatal.message.contains("PINECONE_API_KEY"));
    }

    #[test]
    fn test_kind_tiers() {
        assert!(Kind::Project.tier() < Kind::ApiKey.tier());
        assert!(Kind::Index.tier() < Kind::Collection.tier());
        assert_eq!(Kind::ApiKey.to_string(), "api_key");
    }
}
