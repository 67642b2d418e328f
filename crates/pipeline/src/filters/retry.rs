//! Re-runs the onward call until a policy accepts the outcome.
//!
//! The policy sees every outcome, success or failure, together with the
//! attempt number (starting at 1), and returns whether to stop. Every attempt
//! runs on an independent deep clone of the original request, so metadata
//! recorded by inner filters during one attempt never leaks into the next.
//!
//! Once the request's own cancel token has fired, no further attempt is made
//! regardless of the policy. Cancellations scoped to a single attempt (an
//! inner timeout's derived token) are ordinary failures and can be retried.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::error::Error;
use crate::filter::{Filter, Next};
use crate::metadata::{Key, Metadata};
use crate::request::Request;
use crate::response::Response;

/// The attempt number (1-based) the accepted outcome was produced on.
pub static RETRY_ATTEMPT: Lazy<Key<u32>> = Lazy::new(|| Key::new("the accepted attempt number"));

/// One attempt's result, borrowed for policy inspection.
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    Success(&'a Response),
    Failure(&'a Error),
}

/// Decides whether an outcome is final.
#[async_trait]
pub trait RetryPolicy: Send + Sync {
    /// Returns `true` to accept the outcome as final, `false` to retry.
    async fn accept(&self, outcome: Outcome<'_>, attempt: u32) -> bool;
}

/// A [`RetryPolicy`] built from a plain closure.
pub struct FnRetryPolicy<F> {
    f: F,
}

impl<F> std::fmt::Debug for FnRetryPolicy<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnRetryPolicy")
    }
}

pub fn retry_fn<F>(f: F) -> FnRetryPolicy<F>
where
    F: Fn(Outcome<'_>, u32) -> bool + Send + Sync,
{
    FnRetryPolicy { f }
}

#[async_trait]
impl<F> RetryPolicy for FnRetryPolicy<F>
where
    F: Fn(Outcome<'_>, u32) -> bool + Send + Sync,
{
    async fn accept(&self, outcome: Outcome<'_>, attempt: u32) -> bool {
        (self.f)(outcome, attempt)
    }
}

pub struct RetryFilter {
    policy: Arc<dyn RetryPolicy>,
}

impl RetryFilter {
    pub fn new(policy: Arc<dyn RetryPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Filter for RetryFilter {
    async fn apply(&self, request: Request, next: Next) -> Result<Response, Error> {
        let mut attempt: u32 = 1;
        loop {
            let mut result = next.clone().run(request.clone_request(true)).await;

            match &mut result {
                Ok(response) => {
                    response.metadata_mut().put(&RETRY_ATTEMPT, attempt);
                }
                Err(_) => {
                    result = result.map_err(|error| {
                        let mut extra = Metadata::new();
                        extra.put(&RETRY_ATTEMPT, attempt);
                        error.with_metadata(extra)
                    });
                }
            }

            let outcome = match &result {
                Ok(response) => Outcome::Success(response),
                Err(error) => Outcome::Failure(error),
            };
            if self.policy.accept(outcome, attempt).await {
                return result;
            }
            if let Some(token) = request.cancel_token()
                && token.is_cancelled()
            {
                return result;
            }

            debug!(attempt, "retrying request");
            attempt += 1;
            tokio::task::yield_now().await;
        }
    }
}

impl std::fmt::Debug for RetryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RetryFilter")
    }
}
