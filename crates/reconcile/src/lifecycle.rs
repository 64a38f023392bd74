//! Lifecycle orchestration for a single resource instance
//!
//! The [`Orchestrator`] sequences Create, Read, Update, Delete and Import
//! for one [`Reconcilable`] kind: validate locally, issue each mutating call
//! once, then wait for the remote side to settle using the generic poller.
//! Observed state is persisted through the [`StateHost`] as soon as a remote
//! id exists and on every poll tick of a create, so an interrupted operation
//! never loses track of what it created.

use crate::context::{ProgressCallback, ReconcileContext, StateHost};
use crate::error::{ConfigError, Error, RemoteError, Result};
use crate::poll::{ErrorPolicy, PollCallback, PollError, PollVerdict, Polled, Poller};
use crate::resource::Reconcilable;
use crate::types::{Operation, Outcome};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Where an instance is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    Planned,
    Creating,
    AwaitingReady,
    Ready,
    Updating,
    AwaitingApplied,
    Deleting,
    AwaitingGone,
    Deleted,
    Errored,
}

impl LifecycleState {
    /// Check whether moving to `next` is a legal transition.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        if next == Errored {
            return !matches!(self, Deleted | Errored);
        }
        matches!(
            (self, next),
            (Planned, Creating | Ready)
                | (Creating, AwaitingReady)
                | (AwaitingReady, Ready)
                | (Ready, Updating | Deleting | Deleted)
                | (Updating, AwaitingApplied)
                | (AwaitingApplied, Ready)
                | (Deleting, AwaitingGone | Deleted)
                | (AwaitingGone, Deleted)
        )
    }

    /// Check if this is a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Deleted | Self::Errored)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Planned => "planned",
            Self::Creating => "creating",
            Self::AwaitingReady => "awaiting readiness",
            Self::Ready => "ready",
            Self::Updating => "updating",
            Self::AwaitingApplied => "awaiting update",
            Self::Deleting => "deleting",
            Self::AwaitingGone => "awaiting deletion",
            Self::Deleted => "deleted",
            Self::Errored => "errored",
        };
        f.write_str(label)
    }
}

/// Reports validated transitions and poll ticks for one operation.
struct Tracker<'p> {
    kind: &'static str,
    id: Option<String>,
    state: LifecycleState,
    progress: &'p mut dyn ProgressCallback,
}

impl<'p> Tracker<'p> {
    fn new(
        kind: &'static str,
        id: Option<String>,
        state: LifecycleState,
        progress: &'p mut dyn ProgressCallback,
    ) -> Self {
        Self {
            kind,
            id,
            state,
            progress,
        }
    }

    fn advance(&mut self, next: LifecycleState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid lifecycle transition {} -> {}",
            self.state,
            next
        );
        log::debug!(
            "{} {}: {} -> {}",
            self.kind,
            self.id.as_deref().unwrap_or("(new)"),
            self.state,
            next
        );
        self.progress
            .on_transition(self.kind, self.id.as_deref(), self.state, next);
        self.state = next;
    }

    fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.advance(LifecycleState::Errored);
        }
    }
}

impl PollCallback for Tracker<'_> {
    fn on_retry(&mut self, attempt: u32, reason: &str, _delay: Duration) {
        if let Some(id) = &self.id {
            self.progress.on_poll(self.kind, id, attempt, reason);
        }
    }
}

/// Drives one resource kind through its lifecycle
pub struct Orchestrator<R> {
    resource: R,
}

impl<R: Reconcilable> Orchestrator<R> {
    pub fn new(resource: R) -> Self {
        Self { resource }
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    fn kind(&self) -> &'static str {
        self.resource.kind()
    }

    fn deadline<H>(&self, host: &H, op: Operation) -> Duration
    where
        H: StateHost<R::Desired, R::Observed>,
    {
        self.resource
            .default_timeouts()
            .resolve(op, host.timeout_override(op))
    }

    fn require_desired<H>(&self, host: &H) -> Result<R::Desired>
    where
        H: StateHost<R::Desired, R::Observed>,
    {
        host.desired().ok_or_else(|| {
            Error::invalid(self.kind(), ConfigError::new("no desired specification"))
        })
    }

    /// Last persisted state; a record the host cannot decode is an error
    fn load_prior<H>(&self, host: &H) -> Result<Option<R::Observed>>
    where
        H: StateHost<R::Desired, R::Observed>,
    {
        host.prior().map_err(|e| Error::UnreadableState {
            kind: self.kind(),
            id: host.tracked_id(),
            message: format!("{e:#}"),
        })
    }

    fn persist<H>(&self, host: &mut H, observed: &R::Observed, applied: bool) -> Result<()>
    where
        H: StateHost<R::Desired, R::Observed>,
    {
        host.set_observed(observed).map_err(|e| Error::Persist {
            kind: self.kind(),
            id: Some(self.resource.id(observed)),
            applied,
            message: format!("{e:#}"),
        })
    }

    fn untrack<H>(&self, host: &mut H, id: &str) -> Result<()>
    where
        H: StateHost<R::Desired, R::Observed>,
    {
        host.remove_tracking().map_err(|e| Error::Persist {
            kind: self.kind(),
            id: Some(id.to_string()),
            applied: true,
            message: format!("{e:#}"),
        })
    }

    /// Map a failed poll to an orchestration error. The resource exists.
    fn poll_failure<T>(&self, id: &str, waiting_for: &'static str, err: PollError<T>) -> Error {
        let kind = self.kind();
        match err {
            PollError::Timeout { waited, reason, .. } => Error::Timeout {
                kind,
                id: id.to_string(),
                waiting_for,
                waited,
                reason,
            },
            PollError::Fatal { error, .. } => Error::remote(kind, Some(id.to_string()), true, error),
            PollError::Cancelled { .. } => Error::Cancelled {
                kind,
                id: Some(id.to_string()),
                applied: true,
            },
        }
    }

    /// Poll until the resource settles, persisting every observation.
    fn await_ready<H>(
        &self,
        host: &mut H,
        poller: &Poller<'_>,
        tracker: &mut Tracker<'_>,
        id: &str,
        start: R::Observed,
        op: Operation,
    ) -> Result<R::Observed>
    where
        H: StateHost<R::Desired, R::Observed>,
    {
        let waiting_for = match op {
            Operation::Update => "update to apply",
            _ => "readiness",
        };
        let deadline = self.deadline(host, op);
        let resource = &self.resource;
        let mut last = start;
        let mut persist_error: Option<anyhow::Error> = None;

        let result = poller.poll_until(
            deadline,
            ErrorPolicy::provisioning(),
            tracker,
            || {
                let fresh = resource.describe(id)?;
                let merged = resource.carry_forward(Some(&last), fresh);
                if let Err(e) = host.set_observed(&merged) {
                    persist_error = Some(e);
                    return Err(RemoteError::fatal("failed to persist state"));
                }
                last = merged.clone();
                Ok(merged)
            },
            |observed| resource.readiness(observed),
        );

        if let Some(e) = persist_error {
            return Err(Error::Persist {
                kind: self.kind(),
                id: Some(id.to_string()),
                applied: true,
                message: format!("{e:#}"),
            });
        }

        match result {
            Ok(Polled::Reached(observed)) => Ok(observed),
            Ok(Polled::Gone) => Err(Error::Fatal {
                kind: self.kind(),
                id: Some(id.to_string()),
                applied: true,
                message: format!("resource disappeared while waiting for {waiting_for}"),
            }),
            Err(err) => Err(self.poll_failure(id, waiting_for, err)),
        }
    }

    /// Create the remote resource and wait until it is ready.
    pub fn create<H>(&self, host: &mut H, ctx: &mut ReconcileContext<'_>) -> Result<Outcome>
    where
        H: StateHost<R::Desired, R::Observed>,
    {
        let mut tracker = Tracker::new(
            self.kind(),
            None,
            LifecycleState::Planned,
            &mut *ctx.progress,
        );
        let poller = Poller::new(&ctx.poll, &ctx.cancel);

        let result = self.create_inner(host, &poller, &mut tracker);
        if result.is_err() {
            tracker.fail();
        }
        result
    }

    fn create_inner<H>(
        &self,
        host: &mut H,
        poller: &Poller<'_>,
        tracker: &mut Tracker<'_>,
    ) -> Result<Outcome>
    where
        H: StateHost<R::Desired, R::Observed>,
    {
        let kind = self.kind();
        let desired = self.require_desired(host)?;
        let request = self
            .resource
            .to_request(&desired)
            .map_err(|e| Error::invalid(kind, e))?;

        tracker.advance(LifecycleState::Creating);
        let created = self
            .resource
            .create(&request)
            .map_err(|e| Error::remote(kind, None, false, e))?;
        let prior = self.load_prior(host)?;
        let created = self.resource.carry_forward(prior.as_ref(), created);
        let id = self.resource.id(&created);
        log::info!("Created {kind} {id}");
        tracker.id = Some(id.clone());

        self.persist(host, &created, true)?;

        tracker.advance(LifecycleState::AwaitingReady);
        self.await_ready(host, poller, tracker, &id, created, Operation::Create)?;

        tracker.advance(LifecycleState::Ready);
        Ok(Outcome::Created)
    }

    /// Describe and persist; `None` if the resource is gone and untracked.
    fn refresh<H>(
        &self,
        host: &mut H,
        id: &str,
        prior: Option<&R::Observed>,
    ) -> Result<Option<R::Observed>>
    where
        H: StateHost<R::Desired, R::Observed>,
    {
        let kind = self.kind();
        match self.resource.describe(id) {
            Ok(fresh) => {
                let merged = self.resource.carry_forward(prior, fresh);
                self.persist(host, &merged, false)?;
                Ok(Some(merged))
            }
            Err(err) if err.is_not_found() => {
                log::info!("{kind} {id} no longer exists, removing from state");
                self.untrack(host, id)?;
                Ok(None)
            }
            Err(err) => Err(Error::remote(kind, Some(id.to_string()), false, err)),
        }
    }

    /// Refresh the observed state from the remote side.
    ///
    /// A resource that no longer exists is untracked and reported as
    /// [`Outcome::Gone`]; that is not an error. Stored state the host cannot
    /// decode is replaced by a fresh describe of the stored remote id.
    pub fn read<H>(&self, host: &mut H, ctx: &mut ReconcileContext<'_>) -> Result<Outcome>
    where
        H: StateHost<R::Desired, R::Observed>,
    {
        let kind = self.kind();
        let (id, prior) = match self.load_prior(host) {
            Ok(Some(prior)) => (self.resource.id(&prior), Some(prior)),
            Ok(None) => return Err(Error::Untracked { kind }),
            Err(err) => match host.tracked_id() {
                Some(id) => {
                    log::warn!("{err}; re-reading {kind} {id}");
                    (id, None)
                }
                None => return Err(err),
            },
        };

        match self.refresh(host, &id, prior.as_ref())? {
            Some(_) => Ok(Outcome::Refreshed),
            None => {
                ctx.progress.on_transition(
                    self.kind(),
                    Some(&id),
                    LifecycleState::Ready,
                    LifecycleState::Deleted,
                );
                Ok(Outcome::Gone)
            }
        }
    }

    /// Apply mutable changes in place.
    ///
    /// Fails with [`Error::ReplaceRequired`] before any remote call when an
    /// immutable field changed. With no drift this is a plain Read.
    pub fn update<H>(&self, host: &mut H, ctx: &mut ReconcileContext<'_>) -> Result<Outcome>
    where
        H: StateHost<R::Desired, R::Observed>,
    {
        let kind = self.kind();
        let prior = self.load_prior(host)?.ok_or(Error::Untracked { kind })?;
        let desired = self.require_desired(host)?;
        let id = self.resource.id(&prior);

        let plan = self
            .resource
            .drift(&prior, &desired)
            .map_err(|e| Error::invalid(kind, e))?;
        if plan.forces_replace() {
            return Err(Error::ReplaceRequired {
                kind,
                id,
                fields: plan.replace_fields(),
            });
        }
        if plan.is_empty() {
            log::debug!("{kind} {id}: no drift");
            return Ok(match self.refresh(host, &id, Some(&prior))? {
                Some(_) => Outcome::Unchanged,
                None => Outcome::Gone,
            });
        }
        let patch = self
            .resource
            .to_patch(&desired, &plan)
            .map_err(|e| Error::invalid(kind, e))?;

        let mut tracker = Tracker::new(
            kind,
            Some(id.clone()),
            LifecycleState::Ready,
            &mut *ctx.progress,
        );
        let poller = Poller::new(&ctx.poll, &ctx.cancel);

        let result = self.update_inner(host, &poller, &mut tracker, &id, &prior, &patch);
        if result.is_err() {
            tracker.fail();
        }
        result
    }

    fn update_inner<H>(
        &self,
        host: &mut H,
        poller: &Poller<'_>,
        tracker: &mut Tracker<'_>,
        id: &str,
        prior: &R::Observed,
        patch: &R::Patch,
    ) -> Result<Outcome>
    where
        H: StateHost<R::Desired, R::Observed>,
    {
        let kind = self.kind();

        tracker.advance(LifecycleState::Updating);
        let updated = self
            .resource
            .update(id, patch)
            .map_err(|e| Error::remote(kind, Some(id.to_string()), false, e))?;
        log::info!("Updated {kind} {id}");
        let updated = self.resource.carry_forward(Some(prior), updated);
        self.persist(host, &updated, true)?;

        tracker.advance(LifecycleState::AwaitingApplied);
        let settled = self.await_ready(host, poller, tracker, id, updated, Operation::Update)?;
        tracker.advance(LifecycleState::Ready);

        match self.refresh(host, id, Some(&settled))? {
            Some(_) => Ok(Outcome::Updated),
            None => {
                tracker.advance(LifecycleState::Deleted);
                Ok(Outcome::Gone)
            }
        }
    }

    /// Delete the remote resource and wait until it is gone.
    ///
    /// Refused with [`Error::PolicyViolation`] while deletion protection is
    /// enabled; no remote call is made in that case. Stored state the host
    /// cannot decode is an error: the guard needs it.
    pub fn delete<H>(&self, host: &mut H, ctx: &mut ReconcileContext<'_>) -> Result<Outcome>
    where
        H: StateHost<R::Desired, R::Observed>,
    {
        let kind = self.kind();
        let Some(prior) = self.load_prior(host)? else {
            return Err(Error::Untracked { kind });
        };
        let id = self.resource.id(&prior);

        let desired = host.desired();
        if self.resource.deletion_protected(desired.as_ref(), &prior) {
            return Err(Error::PolicyViolation {
                kind,
                id,
                message: "deletion protection is enabled; disable it before deleting".to_string(),
            });
        }

        let mut tracker = Tracker::new(
            kind,
            Some(id.clone()),
            LifecycleState::Ready,
            &mut *ctx.progress,
        );
        let poller = Poller::new(&ctx.poll, &ctx.cancel);

        let result = self.delete_inner(host, &poller, &mut tracker, &id);
        if result.is_err() {
            tracker.fail();
        }
        result
    }

    fn delete_inner<H>(
        &self,
        host: &mut H,
        poller: &Poller<'_>,
        tracker: &mut Tracker<'_>,
        id: &str,
    ) -> Result<Outcome>
    where
        H: StateHost<R::Desired, R::Observed>,
    {
        let kind = self.kind();

        tracker.advance(LifecycleState::Deleting);
        match self.resource.delete(id) {
            Ok(()) => log::info!("Deleted {kind} {id}"),
            Err(err) if err.is_not_found() => {
                log::info!("{kind} {id} was already deleted");
                self.untrack(host, id)?;
                tracker.advance(LifecycleState::Deleted);
                return Ok(Outcome::Gone);
            }
            Err(err) => return Err(Error::remote(kind, Some(id.to_string()), false, err)),
        }

        tracker.advance(LifecycleState::AwaitingGone);
        let deadline = self.deadline(host, Operation::Delete);
        let resource = &self.resource;
        let result = poller.poll_until(
            deadline,
            ErrorPolicy::removal(),
            tracker,
            || resource.describe(id),
            |_| PollVerdict::retry("still present"),
        );

        match result {
            // Only absence ends the wait; the condition never completes
            Ok(_) => {
                self.untrack(host, id)?;
                tracker.advance(LifecycleState::Deleted);
                Ok(Outcome::Deleted)
            }
            Err(err) => Err(self.poll_failure(id, "deletion", err)),
        }
    }

    /// Adopt an existing remote resource by id.
    pub fn import<H>(
        &self,
        raw: &str,
        host: &mut H,
        ctx: &mut ReconcileContext<'_>,
    ) -> Result<Outcome>
    where
        H: StateHost<R::Desired, R::Observed>,
    {
        let kind = self.kind();
        let import_id = self
            .resource
            .parse_import_id(raw)
            .map_err(|e| Error::invalid(kind, e))?;

        let observed = self
            .resource
            .import(&import_id)
            .map_err(|e| Error::remote(kind, Some(import_id.id.clone()), false, e))?;
        // Unreadable stored state is overwritten by the import
        let prior = host.prior().unwrap_or_default();
        let observed = self.resource.carry_forward(prior.as_ref(), observed);
        self.persist(host, &observed, false)?;

        let id = self.resource.id(&observed);
        log::info!("Imported {kind} {id}");
        ctx.progress.on_transition(
            kind,
            Some(&id),
            LifecycleState::Planned,
            LifecycleState::Ready,
        );
        Ok(Outcome::Imported)
    }
}
