//! Holds each request for a fixed duration before calling onward.
//!
//! Mostly useful in tests and fault-injection setups. The wait is
//! cancellation-aware: an abort during the delay fails the request
//! immediately instead of waiting the delay out.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Error;
use crate::filter::{Filter, Next};
use crate::request::Request;
use crate::response::Response;

#[derive(Debug, Clone)]
pub struct DelayFilter {
    delay: Duration,
}

impl DelayFilter {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Filter for DelayFilter {
    async fn apply(&self, request: Request, next: Next) -> Result<Response, Error> {
        match request.cancel_token().cloned() {
            Some(token) => {
                if let Some(reason) = token.reason() {
                    return Err(Error::cancelled(reason, request.metadata().clone()));
                }
                tokio::select! {
                    () = tokio::time::sleep(self.delay) => {}
                    reason = token.cancelled() => {
                        return Err(Error::cancelled(reason, request.metadata().clone()));
                    }
                }
            }
            None => tokio::time::sleep(self.delay).await,
        }
        next.run(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::{CancelReason, CancelToken};
    use crate::filter::{Pipeline, execute_fn};
    use crate::metadata::Metadata;
    use crate::response::ResponseBody;
    use http::{HeaderMap, Method, StatusCode, Uri};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn request() -> Request {
        Request::new(Method::GET, Uri::from_static("https://example.org/"))
    }

    fn counting_terminal(calls: &Arc<AtomicUsize>) -> Arc<dyn crate::filter::Execute> {
        let calls = Arc::clone(calls);
        Arc::new(execute_fn(move |_request| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Response::new(
                    StatusCode::OK,
                    HeaderMap::new(),
                    ResponseBody::empty(),
                    Metadata::new(),
                ))
            }
        }))
    }

    fn pipeline(delay_millis: u64, calls: &Arc<AtomicUsize>) -> Pipeline {
        Pipeline::new(
            vec![Arc::new(DelayFilter::new(Duration::from_millis(delay_millis)))],
            counting_terminal(calls),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn waits_the_full_delay_before_calling_onward() {
        let calls = Arc::new(AtomicUsize::new(0));
        let start = Instant::now();

        pipeline(250, &calls).execute(request()).await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(250));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn an_abort_during_the_delay_fails_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let token = CancelToken::new();
        let mut req = request();
        req.set_cancel_token(token.clone());

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel(CancelReason::Other("caller gave up"));
        });

        let start = Instant::now();
        let error = pipeline(250, &calls).execute(req).await.unwrap_err();

        assert!(start.elapsed() < Duration::from_millis(250));
        assert_eq!(error.cancel_reason(), Some(&CancelReason::Other("caller gave up")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn a_pre_aborted_token_never_sleeps() {
        let calls = Arc::new(AtomicUsize::new(0));
        let token = CancelToken::new();
        token.cancel(CancelReason::Other("already done"));

        let mut req = request();
        req.set_cancel_token(token);

        let error = pipeline(250, &calls).execute(req).await.unwrap_err();
        assert_eq!(error.cancel_reason(), Some(&CancelReason::Other("already done")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
