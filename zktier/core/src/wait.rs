use std::{fmt::Display, future::Future, time::Duration};

use log::{debug, trace};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

/// When a wait gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Relative to the moment the wait starts.
    After(Duration),
    /// A fixed point in time, e.g. measured from a transaction's own submission.
    At(Instant),
}

/// Stand-in for timeouts too large for the clock. Roughly 30 years.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

impl Deadline {
    /// `timeout` after `start`, for deadlines anchored before the wait begins.
    pub fn elapsed_from(start: Instant, timeout: Duration) -> Self {
        Self::At(saturating_add(start, timeout))
    }

    fn resolve(self, start: Instant) -> Instant {
        match self {
            Self::After(timeout) => saturating_add(start, timeout),
            Self::At(instant) => instant,
        }
    }
}

fn saturating_add(start: Instant, timeout: Duration) -> Instant {
    start
        .checked_add(timeout)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// How often to poll and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub deadline: Deadline,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            deadline: Deadline::After(timeout),
        }
    }

    pub fn until(interval: Duration, deadline: Instant) -> Self {
        Self {
            interval,
            deadline: Deadline::At(deadline),
        }
    }
}

/// Failure reported by a single poll attempt.
#[derive(Debug)]
pub enum PollError<E> {
    /// Worth retrying on the next tick, e.g. a dropped connection.
    Transient(E),
    /// Ends the wait immediately.
    Fatal(E),
}

#[derive(Debug, thiserror::Error)]
pub enum WaitError<E> {
    #[error("timed out after {elapsed:?} ({attempts} attempts)")]
    TimedOut { elapsed: Duration, attempts: u32 },
    #[error("wait cancelled")]
    Cancelled,
    #[error("poll failed: {0}")]
    Failed(E),
}

/// Polls `predicate` until it yields a value, the policy deadline passes, or `cancellation` fires.
///
/// The first attempt runs immediately. After every unsatisfied attempt the deadline is checked
/// before sleeping for `policy.interval`, so a predicate that never succeeds times out no earlier
/// than the deadline and at most one interval (plus the last attempt's latency) after it.
///
/// Transient poll errors are logged and count as "not yet"; fatal ones end the wait with
/// [`WaitError::Failed`].
pub async fn wait_until<F, Fut, T, E>(
    policy: PollPolicy,
    cancellation: &CancellationToken,
    mut predicate: F,
) -> Result<T, WaitError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, PollError<E>>>,
    E: Display,
{
    let start = Instant::now();
    let deadline = policy.deadline.resolve(start);
    let mut attempts: u32 = 0;

    loop {
        if cancellation.is_cancelled() {
            return Err(WaitError::Cancelled);
        }

        attempts += 1;
        let outcome = tokio::select! {
            biased;
            _ = cancellation.cancelled() => return Err(WaitError::Cancelled),
            outcome = predicate() => outcome,
        };

        match outcome {
            Ok(Some(value)) => {
                trace!("Poll satisfied after {} attempts", attempts);
                return Ok(value);
            }
            Ok(None) => {}
            Err(PollError::Transient(err)) => {
                debug!("Poll attempt {} failed, retrying: {}", attempts, err);
            }
            Err(PollError::Fatal(err)) => return Err(WaitError::Failed(err)),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(WaitError::TimedOut {
                elapsed: now.duration_since(start),
                attempts,
            });
        }

        tokio::select! {
            biased;
            _ = cancellation.cancelled() => return Err(WaitError::Cancelled),
            _ = sleep(policy.interval) => {}
        }
    }
}

/// [`wait_until`] for predicates that only answer yes or no.
pub async fn wait_for<F, Fut, E>(
    policy: PollPolicy,
    cancellation: &CancellationToken,
    mut predicate: F,
) -> Result<(), WaitError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, PollError<E>>>,
    E: Display,
{
    wait_until(policy, cancellation, || {
        let check = predicate();
        async move { check.await.map(|satisfied| satisfied.then_some(())) }
    })
    .await
}
