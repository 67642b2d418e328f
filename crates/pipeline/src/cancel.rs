//! Cooperative cancellation with explicit reasons.
//!
//! A [`CancelToken`] is an observable "this operation should stop" signal. It
//! fires at most once and carries a [`CancelReason`] telling the observer
//! *why* it fired, so a deliberate caller-side cancellation can be told apart
//! from a timeout budget running out by comparing enum variants instead of
//! string heuristics.
//!
//! Waiting is done by awaiting [`CancelToken::cancelled`]; dropping that
//! future is the unsubscribe path, so every exit (success, failure or
//! cancellation) releases its registration deterministically.

use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;

/// Why a [`CancelToken`] fired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    /// A linked parent signal fired.
    Parent,
    /// A timeout budget elapsed.
    Timeout,
    /// A caller-supplied reason.
    Other(&'static str),
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Parent => f.write_str("parent"),
            CancelReason::Timeout => f.write_str("timeout"),
            CancelReason::Other(reason) => f.write_str(reason),
        }
    }
}

/// A clonable cancellation signal.
///
/// Clones observe the same underlying signal. [`CancelToken::child`] derives
/// a *linked* token: cancelling the parent cancels the child (which then
/// reports [`CancelReason::Parent`]), while cancelling the child leaves the
/// parent untouched.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the signal. The first reason wins; later calls are no-ops.
    pub fn cancel(&self, reason: CancelReason) {
        // Publish the reason before waking observers so they never see a
        // fired token without one.
        let _ = self.reason.set(reason);
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// The reason this token fired, or `None` while it is still live.
    ///
    /// A token cancelled through a linked parent has no reason of its own and
    /// reports [`CancelReason::Parent`].
    pub fn reason(&self) -> Option<CancelReason> {
        if !self.inner.is_cancelled() {
            return None;
        }
        Some(self.reason.get().cloned().unwrap_or(CancelReason::Parent))
    }

    /// Resolves with the reason once the token fires. Dropping the future
    /// unregisters the wait.
    pub async fn cancelled(&self) -> CancelReason {
        self.inner.cancelled().await;
        self.reason.get().cloned().unwrap_or(CancelReason::Parent)
    }

    /// Derives a linked token that also fires when `self` fires.
    #[must_use]
    pub fn child(&self) -> CancelToken {
        CancelToken { inner: self.inner.child_token(), reason: Arc::new(OnceLock::new()) }
    }
}
