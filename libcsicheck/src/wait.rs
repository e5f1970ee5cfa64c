//! Bounded, cancellable polling.
//!
//! Remote objects become ready on their own schedule, so readiness is never a
//! one-shot check: [`poll_until`] re-runs a probe until it reports success, the
//! deadline passes, or the caller cancels.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::CheckError;

/// How long to wait for an object and how often to look at it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            interval: Duration::from_secs(2),
        }
    }
}

/// Why [`poll_until`] gave up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    /// The probe never succeeded before the deadline.
    TimedOut(Duration),
    /// The cancellation token fired.
    Cancelled,
    /// The probe itself failed.
    Failed(CheckError),
}

impl std::fmt::Display for PollError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TimedOut(after) => write!(f, "timed out after {after:?}"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Failed(e) => e.fmt(f),
        }
    }
}

/// Run `probe` until it returns `Ok(true)`.
///
/// The probe runs at least once, even with a zero timeout.
pub async fn poll_until<F, Fut>(
    policy: WaitPolicy,
    cancel: &CancellationToken,
    mut probe: F,
) -> Result<(), PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, CheckError>>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut attempt = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }

        attempt += 1;
        let ready = tokio::select! {
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            res = probe() => res.map_err(PollError::Failed)?,
        };
        if ready {
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(PollError::TimedOut(now - started));
        }
        debug!(attempt, elapsed = ?(now - started), "not ready yet");

        tokio::select! {
            _ = cancel.cancelled() => return Err(PollError::Cancelled),
            _ = tokio::time::sleep(policy.interval.min(deadline - now)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn policy(timeout_secs: u64) -> WaitPolicy {
        WaitPolicy {
            timeout: Duration::from_secs(timeout_secs),
            interval: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ready_after_a_few_polls() {
        let polls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&polls);
        let res = poll_until(policy(30), &CancellationToken::new(), || {
            let counter = Arc::clone(&counter);
            async move { Ok(counter.fetch_add(1, Ordering::SeqCst) >= 2) }
        })
        .await;
        assert_eq!(res, Ok(()));
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out() {
        let res = poll_until(policy(5), &CancellationToken::new(), || async { Ok(false) }).await;
        assert!(matches!(res, Err(PollError::TimedOut(d)) if d >= Duration::from_secs(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn probe_error_stops_polling() {
        let res = poll_until(policy(30), &CancellationToken::new(), || async {
            Err(CheckError::remote("get pod", "gone"))
        })
        .await;
        assert_eq!(
            res,
            Err(PollError::Failed(CheckError::remote("get pod", "gone")))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_wait() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });
        let res = poll_until(policy(600), &cancel, || async { Ok(false) }).await;
        assert_eq!(res, Err(PollError::Cancelled));
    }

    #[tokio::test]
    async fn zero_timeout_probes_once() {
        let res = poll_until(
            WaitPolicy {
                timeout: Duration::ZERO,
                interval: Duration::from_secs(1),
            },
            &CancellationToken::new(),
            || async { Ok(true) },
        )
        .await;
        assert_eq!(res, Ok(()));
    }
}
