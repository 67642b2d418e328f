//! The terminal stage: hands the request to a [`Transport`] and converts the
//! raw outcome back into the pipeline's model.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::error::{BoxError, Cancelled, Error};
use crate::filter::Execute;
use crate::request::Request;
use crate::response::{RawBody, Response};

/// The externally supplied network primitive.
///
/// Implementations perform the actual transmission (and own every
/// protocol-level concern: pooling, TLS, redirects); the pipeline only asks
/// them to turn a plain `http` request into a plain `http` response or a raw
/// error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: http::Request<Bytes>) -> Result<http::Response<RawBody>, BoxError>;
}

/// The leaf [`Execute`] of a pipeline.
///
/// Observes the request's cancellation token around the transport call, and
/// attaches an independent clone of the request's metadata to whichever
/// outcome it produces.
#[derive(Debug)]
pub struct TransportExecutor<T> {
    transport: T,
}

impl<T> TransportExecutor<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl<T: Transport> Execute for TransportExecutor<T> {
    async fn execute(&self, request: Request) -> Result<Response, Error> {
        let metadata = request.metadata().clone();
        let cancel = request.cancel_token().cloned();
        debug!(method = %request.method(), uri = %request.uri(), "executing request");

        let raw = request.into_http_request();
        let outcome = match cancel {
            Some(token) => {
                if let Some(reason) = token.reason() {
                    return Err(Error::cancelled(reason, metadata));
                }
                tokio::select! {
                    result = self.transport.send(raw) => result,
                    reason = token.cancelled() => Err(Box::new(Cancelled { reason }) as BoxError),
                }
            }
            None => self.transport.send(raw).await,
        };

        match outcome {
            Ok(response) => {
                debug!(status = %response.status(), "request completed");
                Ok(Response::from_http(response, metadata))
            }
            Err(cause) => {
                debug!(cause = %cause, "request failed");
                Err(Error::new(cause, metadata))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::{CancelReason, CancelToken};
    use crate::metadata::Key;
    use http::{Method, StatusCode, Uri};
    use http_body_util::{BodyExt, Full};
    use once_cell::sync::Lazy;
    use std::sync::Mutex;
    use std::time::Duration;

    static MARKER: Lazy<Key<&'static str>> = Lazy::new(|| Key::new("marker"));

    struct FixedTransport {
        seen: Mutex<Vec<String>>,
    }

    impl FixedTransport {
        fn new() -> Self {
            Self { seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl Transport for FixedTransport {
        async fn send(
            &self,
            request: http::Request<Bytes>,
        ) -> Result<http::Response<RawBody>, BoxError> {
            self.seen.lock().unwrap().push(request.uri().to_string());
            let body = Full::new(Bytes::from_static(b"pong")).map_err(Into::into).boxed();
            Ok(http::Response::builder().status(StatusCode::OK).body(body)?)
        }
    }

    struct PendingTransport;

    #[async_trait]
    impl Transport for PendingTransport {
        async fn send(
            &self,
            _request: http::Request<Bytes>,
        ) -> Result<http::Response<RawBody>, BoxError> {
            futures::future::pending().await
        }
    }

    fn request() -> Request {
        let mut request = Request::new(Method::GET, Uri::from_static("https://example.org/ping"));
        request.metadata_mut().put(&MARKER, "request-scoped");
        request
    }

    #[tokio::test]
    async fn converts_the_raw_response_and_clones_metadata() {
        let executor = TransportExecutor::new(FixedTransport::new());
        let response = executor.execute(request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.bytes().await.unwrap(), Bytes::from_static(b"pong"));
        assert_eq!(response.metadata().get(&MARKER), Some(&"request-scoped"));
        assert_eq!(*executor.transport.seen.lock().unwrap(), vec!["https://example.org/ping"]);
    }

    #[tokio::test]
    async fn wraps_transport_failures_with_metadata() {
        let mut transport = MockTransport::new();
        transport.expect_send().times(1).returning(|_| Err("connection refused".into()));

        let executor = TransportExecutor::new(transport);
        let error = executor.execute(request()).await.unwrap_err();

        assert_eq!(error.to_string(), "connection refused");
        assert_eq!(error.metadata().get(&MARKER), Some(&"request-scoped"));
        assert_eq!(error.cancel_reason(), None);
    }

    #[tokio::test]
    async fn a_pre_aborted_token_skips_the_transport() {
        let token = CancelToken::new();
        token.cancel(CancelReason::Other("caller gave up"));

        let mut req = request();
        req.set_cancel_token(token);

        let executor = TransportExecutor::new(FixedTransport::new());
        let error = executor.execute(req).await.unwrap_err();

        assert_eq!(error.cancel_reason(), Some(&CancelReason::Other("caller gave up")));
        assert!(executor.transport.seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn a_firing_token_interrupts_the_transport() {
        let token = CancelToken::new();
        let mut req = request();
        req.set_cancel_token(token.clone());

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel(CancelReason::Timeout);
        });

        let executor = TransportExecutor::new(PendingTransport);
        let error = executor.execute(req).await.unwrap_err();

        assert_eq!(error.cancel_reason(), Some(&CancelReason::Timeout));
        assert_eq!(error.metadata().get(&MARKER), Some(&"request-scoped"));
    }
}
