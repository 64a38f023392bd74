//! # Reconcile
//!
//! Declarative lifecycle management for eventually-consistent remote
//! resources.
//!
//! A remote API accepts a create or delete request long before the resource
//! is actually usable or gone. This crate sequences the lifecycle of such
//! resources: translate a desired specification into a request, issue each
//! mutating call once, poll until the remote side settles, and compute drift
//! so updates carry only the fields that changed.
//!
//! ## Core Concepts
//!
//! - **Reconcilable**: A resource kind (translation, remote calls, drift, readiness)
//! - **StateHost**: Where desired and last observed state live
//! - **Orchestrator**: Drives Create/Read/Update/Delete/Import for one kind
//! - **Poller**: Bounded retry-until-condition loop with per-call-site error policy
//! - **DriftPlan**: Field-level changes, classified as mutable, replacing or computed
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{MemoryHost, NoProgress, Orchestrator, ReconcileContext};
//!
//! let orchestrator = Orchestrator::new(IndexKind::new(client));
//! let mut host = MemoryHost::new(Some(desired), None);
//! let mut progress = NoProgress;
//! let mut ctx = ReconcileContext::new(&mut progress);
//!
//! let outcome = orchestrator.create(&mut host, &mut ctx)?;
//! ```
//!
//! ## Failure Reporting
//!
//! Every [`Error`] names the remote resource that exists after the failure
//! ([`Error::remote_id`]) and whether the remote side may have changed
//! ([`Error::remote_changed`]). A timed-out create leaves the last observed
//! state persisted in the host.

pub mod context;
pub mod drift;
pub mod error;
pub mod lifecycle;
pub mod poll;
pub mod resource;
pub mod types;

// Re-export main types at crate root
pub use context::{MemoryHost, NoProgress, ProgressCallback, ReconcileContext, StateHost};
pub use drift::{ChangeKind, DriftPlan, FieldChange, TagPatch, apply_tag_patch, merge_tags};
pub use error::{ConfigError, Error, ErrorClass, RemoteError, Result};
pub use lifecycle::{LifecycleState, Orchestrator};
pub use poll::{
    CancelToken, ErrorPolicy, NoCallback, OnError, PollCallback, PollConfig, PollError,
    PollVerdict, Polled, Poller,
};
pub use resource::Reconcilable;
pub use types::{ImportId, Operation, Outcome, Timeouts};
