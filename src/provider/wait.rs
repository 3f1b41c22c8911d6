// src/provider/wait.rs

//! Bounded polling shared by every `Wait*` handler.
//!
//! A wait polls a describe call at a fixed interval until the resource reaches
//! the wanted state, the absolute timeout elapses, the provider reports a
//! failure state, or the stop signal fires. Describe errors are tolerated up
//! to a small consecutive budget.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::config::WaitPolicy;
use crate::errors::{PitrixError, Result};

/// Outcome of one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<T> {
    Ready(T),
    Pending,
    /// The provider reports a terminal failure; carries its status string.
    Failed(String),
}

/// Cancellation flag shared between a driver and its waits.
///
/// Cloning yields another handle on the same flag.
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `stop` has been called on any handle.
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        // The sender lives inside `self`, so the channel cannot close here.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct Waiter {
    policy: WaitPolicy,
    stop: StopSignal,
}

impl Waiter {
    pub fn new(policy: WaitPolicy, stop: StopSignal) -> Self {
        Self { policy, stop }
    }

    pub fn policy(&self) -> &WaitPolicy {
        &self.policy
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Poll `probe` until it is ready.
    ///
    /// `timeout` overrides the policy timeout when non-zero (seconds, as
    /// carried in task directives).
    pub async fn poll_until<T, F, Fut>(&self, what: &str, timeout: u64, mut probe: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PollStatus<T>>>,
    {
        let timeout = if timeout > 0 {
            Duration::from_secs(timeout)
        } else {
            self.policy.timeout
        };
        // A deadline past what `Instant` can represent means no deadline.
        let deadline = Instant::now().checked_add(timeout);
        let mut transient_errors = 0u32;

        loop {
            if self.stop.is_stopped() {
                return Err(PitrixError::Cancelled(what.to_string()));
            }

            match probe().await {
                Ok(PollStatus::Ready(value)) => {
                    debug!(what, "wait finished");
                    return Ok(value);
                }
                Ok(PollStatus::Pending) => {
                    transient_errors = 0;
                }
                Ok(PollStatus::Failed(status)) => {
                    return Err(PitrixError::ResourceFailed {
                        what: what.to_string(),
                        status,
                    });
                }
                Err(err) => {
                    transient_errors += 1;
                    if transient_errors > self.policy.max_transient_errors {
                        return Err(err);
                    }
                    warn!(what, error = %err, transient_errors, "describe failed; retrying");
                }
            }

            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(PitrixError::WaitTimeout {
                            what: what.to_string(),
                            timeout,
                        });
                    }
                    self.policy.interval.min(deadline - now)
                }
                None => self.policy.interval,
            };

            tokio::select! {
                _ = sleep(pause) => {}
                _ = self.stop.stopped() => {
                    return Err(PitrixError::Cancelled(what.to_string()));
                }
            }
        }
    }
}
