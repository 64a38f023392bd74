//! Bounded retry-until-condition polling for eventually-consistent resources.
//!
//! The poller knows nothing about resource kinds: callers hand it a fetch
//! closure, a condition over the fetched value, and an [`ErrorPolicy`]
//! describing what each remote error class means at that call site.

use crate::error::{ErrorClass, RemoteError};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Backoff between poll attempts.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay after the first unsuccessful attempt
    pub initial_delay: Duration,
    /// Multiplier applied per attempt
    pub backoff_factor: f64,
    /// Upper bound for a single wait
    pub max_delay: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            backoff_factor: 1.5,
            max_delay: Duration::from_secs(15),
        }
    }
}

impl PollConfig {
    pub fn new(initial_delay: Duration, backoff_factor: f64, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            backoff_factor,
            max_delay,
        }
    }

    /// Calculate the delay after a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

/// Result of evaluating the poll condition against a fetched value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollVerdict {
    Done,
    Retry(String),
}

impl PollVerdict {
    pub fn retry(reason: impl Into<String>) -> Self {
        Self::Retry(reason.into())
    }
}

/// What a fetch error means at a particular call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnError {
    /// Keep polling until the deadline
    Retry,
    /// Stop; the error is the success condition
    Finish,
    /// Stop immediately and surface the error
    Abort,
}

/// Per-class handling of fetch errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorPolicy {
    pub not_found: OnError,
    pub transient: OnError,
    pub fatal: OnError,
}

impl ErrorPolicy {
    /// Waiting for a resource to materialize or settle.
    ///
    /// Absence means "still materializing"; outright rejections abort.
    pub fn provisioning() -> Self {
        Self {
            not_found: OnError::Retry,
            transient: OnError::Retry,
            fatal: OnError::Abort,
        }
    }

    /// Waiting for a resource to disappear.
    ///
    /// Absence is success; every other error is retried until the deadline.
    pub fn removal() -> Self {
        Self {
            not_found: OnError::Finish,
            transient: OnError::Retry,
            fatal: OnError::Retry,
        }
    }

    pub fn action(&self, class: ErrorClass) -> OnError {
        match class {
            ErrorClass::NotFound => self.not_found,
            ErrorClass::Transient => self.transient,
            ErrorClass::Fatal => self.fatal,
        }
    }
}

/// Successful end of a poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Polled<T> {
    /// The condition returned [`PollVerdict::Done`] for this value
    Reached(T),
    /// A fetch error the policy maps to [`OnError::Finish`]
    Gone,
}

/// Unsuccessful end of a poll loop.
///
/// Every variant carries the last successfully fetched value so partial
/// progress can still be reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollError<T> {
    Timeout {
        waited: Duration,
        attempts: u32,
        reason: String,
        last: Option<T>,
    },
    Fatal {
        error: RemoteError,
        last: Option<T>,
    },
    Cancelled {
        last: Option<T>,
    },
}

impl<T> PollError<T> {
    pub fn last(&self) -> Option<&T> {
        match self {
            Self::Timeout { last, .. } | Self::Fatal { last, .. } | Self::Cancelled { last } => {
                last.as_ref()
            }
        }
    }
}

/// Cancellation signal shared between a caller and a running operation.
///
/// Cancelling wakes a poller that is waiting between attempts.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, signal) = &*self.inner;
        match flag.lock() {
            Ok(mut cancelled) => *cancelled = true,
            Err(poisoned) => *poisoned.into_inner() = true,
        }
        signal.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        match self.inner.0.lock() {
            Ok(cancelled) => *cancelled,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Block for up to `timeout`; returns `true` if cancelled meanwhile.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (flag, signal) = &*self.inner;
        let guard = match flag.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let result = signal.wait_timeout_while(guard, timeout, |cancelled| !*cancelled);
        match result {
            Ok((cancelled, _)) => *cancelled,
            Err(poisoned) => *poisoned.into_inner().0,
        }
    }
}

/// Callback trait for poll progress notifications.
pub trait PollCallback {
    /// Called after an attempt that did not end the loop.
    ///
    /// # Arguments
    /// * `attempt` - Attempt number that just finished (1-indexed)
    /// * `reason` - Why the loop is still waiting
    /// * `delay` - Time until the next attempt
    fn on_retry(&mut self, attempt: u32, reason: &str, delay: Duration);
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl PollCallback for NoCallback {
    fn on_retry(&mut self, _attempt: u32, _reason: &str, _delay: Duration) {}
}

/// Blocking poll loop bounded by a deadline.
pub struct Poller<'a> {
    config: &'a PollConfig,
    cancel: &'a CancelToken,
}

impl<'a> Poller<'a> {
    pub fn new(config: &'a PollConfig, cancel: &'a CancelToken) -> Self {
        Self { config, cancel }
    }

    /// Fetch until `condition` is satisfied, the policy finishes the loop,
    /// the deadline passes, or the caller cancels.
    ///
    /// At least one fetch is always made. The wait between attempts is the
    /// only point where this blocks, and it is cut short by cancellation.
    pub fn poll_until<T, F, C>(
        &self,
        deadline: Duration,
        policy: ErrorPolicy,
        callback: &mut dyn PollCallback,
        mut fetch: F,
        mut condition: C,
    ) -> Result<Polled<T>, PollError<T>>
    where
        F: FnMut() -> Result<T, RemoteError>,
        C: FnMut(&T) -> PollVerdict,
    {
        let started = Instant::now();
        let mut last: Option<T> = None;
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(PollError::Cancelled { last });
            }
            attempt += 1;

            let reason = match fetch() {
                Ok(value) => match condition(&value) {
                    PollVerdict::Done => return Ok(Polled::Reached(value)),
                    PollVerdict::Retry(reason) => {
                        last = Some(value);
                        reason
                    }
                },
                Err(err) => match policy.action(err.class) {
                    OnError::Finish => return Ok(Polled::Gone),
                    OnError::Abort => return Err(PollError::Fatal { error: err, last }),
                    OnError::Retry => err.to_string(),
                },
            };

            let elapsed = started.elapsed();
            if elapsed >= deadline {
                log::warn!("Gave up after {attempt} attempts ({elapsed:?}): {reason}");
                return Err(PollError::Timeout {
                    waited: elapsed,
                    attempts: attempt,
                    reason,
                    last,
                });
            }

            let delay = self
                .config
                .delay_for_attempt(attempt - 1)
                .min(deadline - elapsed);
            log::debug!("Attempt {attempt} not done ({reason}); next in {delay:?}");
            callback.on_retry(attempt, &reason, delay);

            if self.cancel.wait(delay) {
                return Err(PollError::Cancelled { last });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn fast() -> PollConfig {
        PollConfig::new(Duration::from_millis(1), 1.0, Duration::from_millis(5))
    }

    #[test]
    fn test_delay_for_attempt_backs_off_and_caps() {
        let config = PollConfig::new(Duration::from_secs(2), 2.0, Duration::from_secs(10));
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(8));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(10));
    }

    #[test]
    fn test_done_on_first_fetch() {
        let config = fast();
        let cancel = CancelToken::new();
        let result = Poller::new(&config, &cancel).poll_until(
            Duration::from_secs(1),
            ErrorPolicy::provisioning(),
            &mut NoCallback,
            || Ok::<_, RemoteError>(7),
            |_| PollVerdict::Done,
        );
        assert_eq!(result, Ok(Polled::Reached(7)));
    }

    #[test]
    fn test_retries_until_condition_holds() {
        let config = fast();
        let cancel = CancelToken::new();
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();

        let result = Poller::new(&config, &cancel).poll_until(
            Duration::from_secs(5),
            ErrorPolicy::provisioning(),
            &mut NoCallback,
            || {
                attempts_clone.set(attempts_clone.get() + 1);
                Ok::<_, RemoteError>(attempts_clone.get())
            },
            |n| {
                if *n >= 3 {
                    PollVerdict::Done
                } else {
                    PollVerdict::retry("not ready")
                }
            },
        );

        assert_eq!(result, Ok(Polled::Reached(3)));
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_not_found_retried_while_provisioning() {
        let config = fast();
        let cancel = CancelToken::new();
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();

        let result = Poller::new(&config, &cancel).poll_until(
            Duration::from_secs(5),
            ErrorPolicy::provisioning(),
            &mut NoCallback,
            || {
                attempts_clone.set(attempts_clone.get() + 1);
                if attempts_clone.get() < 3 {
                    Err(RemoteError::not_found("HTTP 404"))
                } else {
                    Ok("ready")
                }
            },
            |_| PollVerdict::Done,
        );

        assert_eq!(result, Ok(Polled::Reached("ready")));
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_not_found_finishes_removal_without_retry() {
        let config = fast();
        let cancel = CancelToken::new();
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<Polled<()>, _> = Poller::new(&config, &cancel).poll_until(
            Duration::from_secs(5),
            ErrorPolicy::removal(),
            &mut NoCallback,
            || {
                attempts_clone.set(attempts_clone.get() + 1);
                Err(RemoteError::not_found("HTTP 404"))
            },
            |_| PollVerdict::retry("still present"),
        );

        assert_eq!(result, Ok(Polled::Gone));
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_fatal_aborts_without_retry() {
        let config = fast();
        let cancel = CancelToken::new();
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<Polled<u32>, _> = Poller::new(&config, &cancel).poll_until(
            Duration::from_secs(5),
            ErrorPolicy::provisioning(),
            &mut NoCallback,
            || {
                attempts_clone.set(attempts_clone.get() + 1);
                Err(RemoteError::fatal("HTTP 401"))
            },
            |_| PollVerdict::Done,
        );

        match result {
            Err(PollError::Fatal { error, last }) => {
                assert_eq!(error.class, ErrorClass::Fatal);
                assert_eq!(last, None);
            }
            other => panic!("expected fatal, got {other:?}"),
        }
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn test_fatal_retried_during_removal() {
        let config = fast();
        let cancel = CancelToken::new();
        let attempts = Rc::new(Cell::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<Polled<()>, _> = Poller::new(&config, &cancel).poll_until(
            Duration::from_secs(5),
            ErrorPolicy::removal(),
            &mut NoCallback,
            || {
                attempts_clone.set(attempts_clone.get() + 1);
                if attempts_clone.get() < 3 {
                    Err(RemoteError::fatal("quota lookup failed"))
                } else {
                    Err(RemoteError::not_found("HTTP 404"))
                }
            },
            |_| PollVerdict::retry("still present"),
        );

        assert_eq!(result, Ok(Polled::Gone));
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn test_timeout_keeps_last_value() {
        let config = fast();
        let cancel = CancelToken::new();
        let attempts = Rc::new(Cell::new(0u32));
        let attempts_clone = attempts.clone();

        let result = Poller::new(&config, &cancel).poll_until(
            Duration::from_millis(20),
            ErrorPolicy::provisioning(),
            &mut NoCallback,
            || {
                attempts_clone.set(attempts_clone.get() + 1);
                Ok::<_, RemoteError>(attempts_clone.get())
            },
            |_| PollVerdict::retry("ready=false"),
        );

        match result {
            Err(PollError::Timeout {
                attempts: made,
                reason,
                last,
                ..
            }) => {
                assert_eq!(reason, "ready=false");
                assert_eq!(last, Some(attempts.get()));
                assert_eq!(made, attempts.get());
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(attempts.get() >= 2);
    }

    #[test]
    fn test_cancel_before_first_attempt() {
        let config = fast();
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = Poller::new(&config, &cancel).poll_until(
            Duration::from_secs(5),
            ErrorPolicy::provisioning(),
            &mut NoCallback,
            || Ok::<_, RemoteError>(1),
            |_| PollVerdict::Done,
        );

        assert_eq!(result, Err(PollError::Cancelled { last: None }));
    }

    #[test]
    fn test_cancel_interrupts_wait() {
        let config = PollConfig::new(Duration::from_secs(30), 1.0, Duration::from_secs(30));
        let cancel = CancelToken::new();
        let remote = cancel.clone();

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            remote.cancel();
        });

        let started = Instant::now();
        let result = Poller::new(&config, &cancel).poll_until(
            Duration::from_secs(60),
            ErrorPolicy::provisioning(),
            &mut NoCallback,
            || Ok::<_, RemoteError>("initializing"),
            |_| PollVerdict::retry("not ready"),
        );
        handle.join().unwrap();

        assert_eq!(
            result,
            Err(PollError::Cancelled {
                last: Some("initializing")
            })
        );
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_callback_invoked_per_retry() {
        struct Counting(u32);
        impl PollCallback for Counting {
            fn on_retry(&mut self, _: u32, _: &str, _: Duration) {
                self.0 += 1;
            }
        }

        let config = fast();
        let cancel = CancelToken::new();
        let mut callback = Counting(0);
        let mut n = 0;

        let _ = Poller::new(&config, &cancel).poll_until(
            Duration::from_secs(5),
            ErrorPolicy::provisioning(),
            &mut callback,
            || {
                n += 1;
                Ok::<_, RemoteError>(n)
            },
            |n| {
                if *n == 4 {
                    PollVerdict::Done
                } else {
                    PollVerdict::retry("waiting")
                }
            },
        );

        // Not invoked for the attempt that ends the loop
        assert_eq!(callback.0, 3);
    }
}
