//! Progress indicators for pinestate CLI.
//!
//! Wraps indicatif so lifecycle transitions and poll ticks coming from the
//! orchestrator show up as spinner and bar messages.

use indicatif::{ProgressBar, ProgressStyle};
use reconcile::{LifecycleState, ProgressCallback};
use std::time::Duration;

/// Spinner for a single long-running operation
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("  {spinner:.green} {msg} {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Bar counting finished steps of a parallel run
pub fn bar(total: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner:.green} {prefix} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.set_prefix(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Reports one instance's lifecycle onto a progress bar
pub struct StepProgress {
    bar: ProgressBar,
    address: String,
    /// Only the step that owns the bar may rewrite its message
    owns_message: bool,
}

impl StepProgress {
    /// Progress for a step drawing on its own spinner
    pub fn owned(bar: ProgressBar, address: &str) -> Self {
        Self {
            bar,
            address: address.to_string(),
            owns_message: true,
        }
    }

    /// Progress for a step sharing a bar with other workers; poll ticks go
    /// to the debug log only
    pub fn shared(bar: ProgressBar, address: &str) -> Self {
        Self {
            bar,
            address: address.to_string(),
            owns_message: false,
        }
    }
}

impl ProgressCallback for StepProgress {
    fn on_transition(
        &mut self,
        kind: &str,
        id: Option<&str>,
        from: LifecycleState,
        to: LifecycleState,
    ) {
        log::debug!(
            "{} ({kind} {}): {from} -> {to}",
            self.address,
            id.unwrap_or("-")
        );
        if self.owns_message {
            self.bar.set_message(format!("{}: {to}", self.address));
        }
    }

    fn on_poll(&mut self, kind: &str, id: &str, attempt: u32, reason: &str) {
        log::debug!("{} ({kind} {id}): attempt {attempt}: {reason}", self.address);
        if self.owns_message {
            self.bar
                .set_message(format!("{}: {reason} (check {attempt})", self.address));
        } else {
            self.bar.tick();
        }
    }
}
