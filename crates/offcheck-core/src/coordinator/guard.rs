//! Pending-validation bookkeeping.
//!
//! `PendingValidation` lives on the attempt while a job is outstanding and is
//! the single source of truth for "something is still in flight". The
//! reconcile task owns the matching [`SettleGuard`]; dropping it releases
//! every waiter, on every exit path of that task.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::watch;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Identifies one dispatch. Only the holder of the matching token may clear
/// the pending record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DispatchToken(u64);

impl DispatchToken {
    pub(crate) fn next() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

/// The outstanding job recorded on a build attempt.
///
/// The record is reserved before the job is assembled, so the digest is
/// unset while compiler options are still being resolved.
#[derive(Debug)]
pub struct PendingValidation {
    token: DispatchToken,
    job_digest: Option<String>,
    dispatched_at: DateTime<Utc>,
    settled: watch::Receiver<bool>,
}

/// Held by the dispatching side until the reconcile task takes it over;
/// marks the job settled when dropped.
#[derive(Debug)]
pub(crate) struct SettleGuard {
    token: DispatchToken,
    tx: watch::Sender<bool>,
}

/// Cloneable wait handle for the settle signal.
#[derive(Debug, Clone)]
pub struct SettleSignal {
    rx: watch::Receiver<bool>,
}

/// Create a pending record together with its settle guard.
pub(crate) fn pending_pair() -> (PendingValidation, SettleGuard) {
    let token = DispatchToken::next();
    let (tx, rx) = watch::channel(false);
    (
        PendingValidation {
            token,
            job_digest: None,
            dispatched_at: Utc::now(),
            settled: rx,
        },
        SettleGuard { token, tx },
    )
}

impl PendingValidation {
    /// Digest of the submitted job; `None` until the job is assembled.
    pub fn job_digest(&self) -> Option<&str> {
        self.job_digest.as_deref()
    }

    pub(crate) fn token(&self) -> DispatchToken {
        self.token
    }

    pub(crate) fn set_job_digest(&mut self, digest: String) {
        self.job_digest = Some(digest);
    }

    pub fn dispatched_at(&self) -> DateTime<Utc> {
        self.dispatched_at
    }

    pub fn signal(&self) -> SettleSignal {
        SettleSignal {
            rx: self.settled.clone(),
        }
    }
}

impl SettleSignal {
    pub fn is_settled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the job is settled.
    pub async fn settled(mut self) {
        // The guard publishes `true` before its sender is dropped, so an
        // error here can only follow a settled value.
        let _ = self.rx.wait_for(|settled| *settled).await;
    }
}

impl SettleGuard {
    pub(crate) fn token(&self) -> DispatchToken {
        self.token
    }
}

impl Drop for SettleGuard {
    fn drop(&mut self) {
        self.tx.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_drop_guard_settles_waiters() {
        let (pending, guard) = pending_pair();
        let signal = pending.signal();
        assert!(!signal.is_settled());

        let waiter = tokio::spawn(signal.clone().settled());
        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter released")
            .expect("waiter task");
        assert!(signal.is_settled());
    }

    #[tokio::test]
    async fn test_signal_taken_after_settle_returns_immediately() {
        let (mut pending, guard) = pending_pair();
        assert_eq!(pending.job_digest(), None);
        pending.set_job_digest("abc".to_string());
        drop(guard);
        pending.signal().settled().await;
        assert_eq!(pending.job_digest(), Some("abc"));
    }

    #[test]
    fn test_tokens_are_unique_per_pair() {
        let (a, guard_a) = pending_pair();
        let (b, guard_b) = pending_pair();
        assert_eq!(a.token(), guard_a.token());
        assert_eq!(b.token(), guard_b.token());
        assert_ne!(a.token(), b.token());
    }
}
