//! Bounds the time an onward call may take.
//!
//! The filter derives a fresh cancellation token for the inner stages. If the
//! request already carries one, the derived token is linked to it, so a
//! caller-side abort still reaches the transport as [`CancelReason::Parent`],
//! distinguishable from the filter's own [`CancelReason::Timeout`]. When a
//! cancellation failure surfaces, the [`TIMED_OUT`] flag records whether it
//! was this filter's budget (compared by reason variant, never by message).

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;

use crate::cancel::{CancelReason, CancelToken};
use crate::error::Error;
use crate::filter::{Filter, Next};
use crate::metadata::{Key, Metadata};
use crate::request::Request;
use crate::response::Response;

/// The configured budget, recorded into the request bag on entry so
/// downstream stages can read what they are working against.
pub static TIMEOUT_BUDGET: Lazy<Key<Duration>> =
    Lazy::new(|| Key::new("the maximum request duration"));

/// Whether a cancellation failure was caused by this filter's timer.
pub static TIMED_OUT: Lazy<Key<bool>> =
    Lazy::new(|| Key::new("whether the request hit its timeout"));

#[derive(Debug, Clone)]
pub struct TimeoutFilter {
    budget: Duration,
}

impl TimeoutFilter {
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }
}

#[async_trait]
impl Filter for TimeoutFilter {
    async fn apply(&self, mut request: Request, next: Next) -> Result<Response, Error> {
        request.metadata_mut().put(&TIMEOUT_BUDGET, self.budget);

        let derived = match request.cancel_token() {
            Some(parent) => parent.child(),
            None => CancelToken::new(),
        };
        request.set_cancel_token(derived.clone());

        let inner = next.run(request);
        tokio::pin!(inner);

        let result = tokio::select! {
            result = &mut inner => result,
            () = tokio::time::sleep(self.budget) => {
                derived.cancel(CancelReason::Timeout);
                // The in-flight stage must observe the signal and unwind;
                // its error carries the metadata accumulated so far.
                inner.await
            }
        };

        result.map_err(|error| {
            if error.cancel_reason().is_some() {
                let mut flag = Metadata::new();
                flag.put(&TIMED_OUT, derived.reason() == Some(CancelReason::Timeout));
                error.with_metadata(flag)
            } else {
                error
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Pipeline, execute_fn};
    use crate::metadata::Metadata;
    use crate::response::ResponseBody;
    use http::{HeaderMap, Method, StatusCode, Uri};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn request() -> Request {
        Request::new(Method::GET, Uri::from_static("https://example.org/"))
    }

    fn ok_response(metadata: Metadata) -> Response {
        Response::new(StatusCode::OK, HeaderMap::new(), ResponseBody::empty(), metadata)
    }

    /// A terminal that resolves after `millis`, or fails with the token's
    /// reason if it fires first.
    fn slow_terminal(millis: u64) -> Arc<dyn crate::filter::Execute> {
        Arc::new(execute_fn(move |req: Request| async move {
            let metadata = req.metadata().clone();
            let token = req.cancel_token().cloned().expect("timeout filter injects a token");
            tokio::select! {
                () = tokio::time::sleep(Duration::from_millis(millis)) => Ok(ok_response(metadata.clone())),
                reason = token.cancelled() => Err(Error::cancelled(reason, metadata)),
            }
        }))
    }

    fn pipeline(budget_millis: u64, terminal_millis: u64) -> Pipeline {
        Pipeline::new(
            vec![Arc::new(TimeoutFilter::new(Duration::from_millis(budget_millis)))],
            slow_terminal(terminal_millis),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn fast_success_passes_through_without_a_flag() {
        let response = pipeline(50, 10).execute(request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        // The budget was recorded on the way in; the flag never appears on
        // the success path.
        assert_eq!(response.metadata().get(&TIMEOUT_BUDGET), Some(&Duration::from_millis(50)));
        assert!(!response.metadata().contains(&TIMED_OUT));
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_flags_the_error() {
        let start = Instant::now();
        let error = pipeline(50, 3_600_000).execute(request()).await.unwrap_err();

        assert!(start.elapsed() >= Duration::from_millis(50));
        assert!(start.elapsed() < Duration::from_millis(60));
        assert_eq!(error.cancel_reason(), Some(&CancelReason::Timeout));
        assert_eq!(error.metadata().get(&TIMED_OUT), Some(&true));
        assert_eq!(error.metadata().get(&TIMEOUT_BUDGET), Some(&Duration::from_millis(50)));
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancellation_is_not_a_timeout() {
        let parent = CancelToken::new();
        let mut req = request();
        req.set_cancel_token(parent.clone());

        let canceller = parent.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel(CancelReason::Other("caller gave up"));
        });

        let start = Instant::now();
        let error = pipeline(50, 3_600_000).execute(req).await.unwrap_err();

        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(error.cancel_reason(), Some(&CancelReason::Parent));
        assert_eq!(error.metadata().get(&TIMED_OUT), Some(&false));
    }

    #[tokio::test(start_paused = true)]
    async fn a_pre_aborted_parent_short_circuits() {
        let parent = CancelToken::new();
        parent.cancel(CancelReason::Other("already done"));

        let mut req = request();
        req.set_cancel_token(parent);

        let error = pipeline(50, 10).execute(req).await.unwrap_err();
        assert_eq!(error.cancel_reason(), Some(&CancelReason::Parent));
        assert_eq!(error.metadata().get(&TIMED_OUT), Some(&false));
    }
}
