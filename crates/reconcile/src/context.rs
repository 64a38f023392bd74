//! Host contract and reconcile context
//!
//! These traits let the orchestrator run against any configuration host
//! (a state file, a test double) and report progress to any frontend.

use crate::lifecycle::LifecycleState;
use crate::poll::{CancelToken, PollConfig};
use crate::types::Operation;
use anyhow::Result;
use std::time::Duration;

/// The configuration host for a single resource instance
///
/// Supplies the desired specification and the last persisted observation,
/// and accepts new observations. `set_observed` is called on every poll
/// tick during creation, so a crash mid-operation never loses the remote id.
pub trait StateHost<D, O> {
    /// Desired specification, if the instance is still declared
    fn desired(&self) -> Option<D>;

    /// Last persisted observed state, if the instance is tracked.
    ///
    /// Fails when a record exists but cannot be decoded.
    fn prior(&self) -> Result<Option<O>>;

    /// Remote id stored for the instance, readable even when the observed
    /// state is not
    fn tracked_id(&self) -> Option<String> {
        None
    }

    /// Persist a new observed state
    fn set_observed(&mut self, observed: &O) -> Result<()>;

    /// Caller-configured deadline for an operation
    fn timeout_override(&self, op: Operation) -> Option<Duration> {
        let _ = op;
        None
    }

    /// Stop tracking the instance
    fn remove_tracking(&mut self) -> Result<()>;
}

/// In-memory host that records every persisted observation
#[derive(Debug, Clone)]
pub struct MemoryHost<D, O> {
    pub desired: Option<D>,
    pub observed: Option<O>,
    /// Every observation passed to `set_observed`, in order
    pub history: Vec<O>,
    pub removed: bool,
    pub timeouts: Vec<(Operation, Duration)>,
}

impl<D, O> MemoryHost<D, O> {
    pub fn new(desired: Option<D>, observed: Option<O>) -> Self {
        Self {
            desired,
            observed,
            history: Vec::new(),
            removed: false,
            timeouts: Vec::new(),
        }
    }

    /// Set a deadline override for an operation
    pub fn with_timeout(mut self, op: Operation, timeout: Duration) -> Self {
        self.timeouts.push((op, timeout));
        self
    }
}

impl<D: Clone, O: Clone> StateHost<D, O> for MemoryHost<D, O> {
    fn desired(&self) -> Option<D> {
        self.desired.clone()
    }

    fn prior(&self) -> Result<Option<O>> {
        Ok(self.observed.clone())
    }

    fn set_observed(&mut self, observed: &O) -> Result<()> {
        self.observed = Some(observed.clone());
        self.history.push(observed.clone());
        self.removed = false;
        Ok(())
    }

    fn timeout_override(&self, op: Operation) -> Option<Duration> {
        self.timeouts
            .iter()
            .find(|(candidate, _)| *candidate == op)
            .map(|(_, timeout)| *timeout)
    }

    fn remove_tracking(&mut self) -> Result<()> {
        self.observed = None;
        self.removed = true;
        Ok(())
    }
}

/// Progress callback for lifecycle operations
///
/// Implement this trait to receive progress updates during reconciliation.
pub trait ProgressCallback {
    /// Called on every lifecycle state transition
    fn on_transition(
        &mut self,
        kind: &str,
        id: Option<&str>,
        from: LifecycleState,
        to: LifecycleState,
    );

    /// Called when a poll attempt did not finish the wait
    fn on_poll(&mut self, kind: &str, id: &str, attempt: u32, reason: &str);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_transition(&mut self, _: &str, _: Option<&str>, _: LifecycleState, _: LifecycleState) {}
    fn on_poll(&mut self, _: &str, _: &str, _: u32, _: &str) {}
}

/// Context passed to orchestrated operations
pub struct ReconcileContext<'a> {
    /// Cancellation signal checked between poll attempts
    pub cancel: CancelToken,
    /// Backoff between poll attempts
    pub poll: PollConfig,
    pub progress: &'a mut dyn ProgressCallback,
}

impl<'a> ReconcileContext<'a> {
    pub fn new(progress: &'a mut dyn ProgressCallback) -> Self {
        Self {
            cancel: CancelToken::new(),
            poll: PollConfig::default(),
            progress,
        }
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}
