//! Resource kind contract for lifecycle reconciliation
//!
//! A resource kind knows how to translate a desired specification into a
//! remote request, talk to the remote API, compute drift, and decide when an
//! observed object has settled. The [`Orchestrator`](crate::Orchestrator)
//! sequences those pieces; kinds never poll or persist on their own.

use crate::drift::DriftPlan;
use crate::error::{ConfigError, RemoteError};
use crate::poll::PollVerdict;
use crate::types::{ImportId, Timeouts};

/// Core trait for reconcilable resource kinds
///
/// # Example
///
/// ```ignore
/// impl Reconcilable for CollectionKind {
///     type Desired = CollectionDesired;
///     type Observed = CollectionObserved;
///     type Request = CreateCollectionRequest;
///     type Patch = ();
///
///     fn kind(&self) -> &'static str { "collection" }
///
///     fn readiness(&self, observed: &CollectionObserved) -> PollVerdict {
///         if observed.status == "Ready" {
///             PollVerdict::Done
///         } else {
///             PollVerdict::retry(format!("status {}", observed.status))
///         }
///     }
///     // ...
/// }
/// ```
pub trait Reconcilable: Send + Sync {
    /// Validated desired specification
    type Desired: Clone;
    /// Last-known remote state, as persisted by the host
    type Observed: Clone;
    /// Wire request for creation
    type Request;
    /// Wire request for an in-place update
    type Patch;

    /// Resource type name, e.g. "index"
    fn kind(&self) -> &'static str;

    /// Per-operation deadlines used when the host has no override
    fn default_timeouts(&self) -> Timeouts {
        Timeouts::default()
    }

    /// Translate the desired specification into a create request.
    ///
    /// Must be pure and must reject every invalid combination.
    fn to_request(&self, desired: &Self::Desired) -> Result<Self::Request, ConfigError>;

    /// Issue the create call.
    fn create(&self, request: &Self::Request) -> Result<Self::Observed, RemoteError>;

    /// Fetch the current remote state.
    fn describe(&self, id: &str) -> Result<Self::Observed, RemoteError>;

    /// Compute the changes between the last observed and the desired state.
    fn drift(
        &self,
        prior: &Self::Observed,
        desired: &Self::Desired,
    ) -> Result<DriftPlan, ConfigError>;

    /// Build an update request carrying only the changed fields.
    fn to_patch(
        &self,
        desired: &Self::Desired,
        plan: &DriftPlan,
    ) -> Result<Self::Patch, ConfigError>;

    /// Issue the update call.
    fn update(&self, id: &str, patch: &Self::Patch) -> Result<Self::Observed, RemoteError>;

    /// Issue the delete call.
    fn delete(&self, id: &str) -> Result<(), RemoteError>;

    /// Remote identifier of an observed object
    fn id(&self, observed: &Self::Observed) -> String;

    /// Whether an observed object has settled.
    fn readiness(&self, observed: &Self::Observed) -> PollVerdict;

    /// Whether deletion must be refused.
    ///
    /// `desired` is the current declaration when the host still has one;
    /// otherwise only the last observed state is available.
    fn deletion_protected(&self, desired: Option<&Self::Desired>, prior: &Self::Observed) -> bool {
        let _ = (desired, prior);
        false
    }

    /// Merge a freshly described object with what was previously observed.
    ///
    /// Lets a kind keep values the remote API only returns once.
    fn carry_forward(&self, prior: Option<&Self::Observed>, fresh: Self::Observed) -> Self::Observed {
        let _ = prior;
        fresh
    }

    /// Parse the identity given to an import.
    fn parse_import_id(&self, raw: &str) -> Result<ImportId, ConfigError> {
        ImportId::parse(raw)
    }

    /// Fetch an existing remote object for adoption.
    fn import(&self, id: &ImportId) -> Result<Self::Observed, RemoteError> {
        self.describe(&id.id)
    }
}
