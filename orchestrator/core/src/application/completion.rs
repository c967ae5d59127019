// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Async Completion Waiter
//!
//! Backend operations complete asynchronously with no push notification.
//! [`CompletionWaiter::wait_for`] polls until a target state, an error state
//! or a deadline. Abandoning a wait does not cancel the backend operation.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::domain::error::ShareError;

#[derive(Debug, Clone, Copy)]
pub struct CompletionWaiter {
    poll_interval: Duration,
}

impl Default for CompletionWaiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl CompletionWaiter {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Poll `poll` until `is_done` holds for its result.
    ///
    /// # Returns
    /// * `Ok(T)` - The first result for which `is_done` holds
    /// * `Err(ShareError::OperationFailed)` - `is_error` held for a result
    /// * `Err(ShareError::OperationTimeout)` - Neither held within `timeout`
    /// * Any error returned by `poll` itself, unchanged
    pub async fn wait_for<T, P, Fut, D, E>(
        &self,
        operation: &str,
        timeout: Duration,
        mut poll: P,
        is_done: D,
        is_error: E,
    ) -> Result<T, ShareError>
    where
        P: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ShareError>>,
        D: Fn(&T) -> bool,
        E: Fn(&T) -> Option<String>,
    {
        let started = Instant::now();
        loop {
            let result = poll().await?;
            if is_done(&result) {
                debug!(operation, elapsed = ?started.elapsed(), "Operation completed");
                return Ok(result);
            }
            if let Some(reason) = is_error(&result) {
                return Err(ShareError::failed(operation, reason));
            }
            if started.elapsed() >= timeout {
                return Err(ShareError::OperationTimeout {
                    operation: operation.to_string(),
                    waited: timeout,
                });
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Poll until `poll` reports the resource gone (`Ok(None)`).
    pub async fn wait_for_absence<T, P, Fut>(
        &self,
        operation: &str,
        timeout: Duration,
        poll: P,
    ) -> Result<(), ShareError>
    where
        P: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, ShareError>>,
    {
        self.wait_for(operation, timeout, poll, Option::is_none, |_| None)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum State {
        Creating,
        Available,
        Error,
    }

    fn done(s: &State) -> bool {
        *s == State::Available
    }

    fn failed(s: &State) -> Option<String> {
        (*s == State::Error).then(|| "backend reported error".to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_when_target_reached() {
        let polls = Arc::new(AtomicUsize::new(0));
        let waiter = CompletionWaiter::default();

        let counter = Arc::clone(&polls);
        let result = waiter
            .wait_for(
                "volume creation",
                Duration::from_secs(180),
                || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    async move { Ok(if n < 3 { State::Creating } else { State::Available }) }
                },
                done,
                failed,
            )
            .await
            .unwrap();

        assert_eq!(result, State::Available);
        assert_eq!(polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_state_is_failure_not_timeout() {
        let waiter = CompletionWaiter::default();
        let started = Instant::now();

        let err = waiter
            .wait_for(
                "volume attach",
                Duration::from_secs(120),
                || async { Ok(State::Error) },
                done,
                failed,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ShareError::OperationFailed { .. }));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_within_one_poll_interval() {
        let waiter = CompletionWaiter::default();
        let started = Instant::now();
        let budget = Duration::from_secs(30);

        let err = waiter
            .wait_for("volume creation", budget, || async { Ok(State::Creating) }, done, failed)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        let elapsed = started.elapsed();
        assert!(elapsed >= budget);
        assert!(elapsed <= budget + waiter.poll_interval());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_errors_propagate() {
        let waiter = CompletionWaiter::default();
        let err = waiter
            .wait_for(
                "volume creation",
                Duration::from_secs(30),
                || async { Err::<State, _>(ShareError::BackendUnavailable("down".to_string())) },
                done,
                failed,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ShareError::BackendUnavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_absence() {
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&polls);

        CompletionWaiter::default()
            .wait_for_absence("volume deletion", Duration::from_secs(180), || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move { Ok((n < 2).then_some("vol-1")) }
            })
            .await
            .unwrap();

        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }
}
