//! Observes requests and their outcomes.
//!
//! The filter never alters the exchange; it hands the request and whatever
//! came back to a [`RequestLogger`]. The default [`TracingLogger`] emits
//! `tracing` events, but tests and bespoke setups can capture the calls
//! directly.

use std::sync::Arc;

use async_trait::async_trait;
use http::{Method, Uri};
use tracing::{info, warn};

use crate::error::Error;
use crate::filter::{Filter, Next};
use crate::request::Request;
use crate::response::Response;

/// The method and target of a request, kept after the request itself has
/// moved onward.
#[derive(Debug, Clone)]
pub struct RequestLine {
    pub method: Method,
    pub uri: Uri,
}

impl std::fmt::Display for RequestLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.uri)
    }
}

/// Receives one call per request and one per outcome.
pub trait RequestLogger: Send + Sync {
    fn on_request(&self, request: &Request);
    fn on_response(&self, line: &RequestLine, response: &Response);
    fn on_error(&self, line: &RequestLine, error: &Error);
}

/// Logs through the `tracing` facade. Successes at info, failures at warn.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl RequestLogger for TracingLogger {
    fn on_request(&self, request: &Request) {
        info!(method = %request.method(), uri = %request.uri(), "sending request");
    }

    fn on_response(&self, line: &RequestLine, response: &Response) {
        info!(request = %line, status = %response.status(), "request succeeded");
    }

    fn on_error(&self, line: &RequestLine, error: &Error) {
        warn!(request = %line, cause = %error, "request failed");
    }
}

pub struct LoggingFilter {
    logger: Arc<dyn RequestLogger>,
}

impl LoggingFilter {
    pub fn new(logger: Arc<dyn RequestLogger>) -> Self {
        Self { logger }
    }
}

impl Default for LoggingFilter {
    fn default() -> Self {
        Self::new(Arc::new(TracingLogger))
    }
}

#[async_trait]
impl Filter for LoggingFilter {
    async fn apply(&self, request: Request, next: Next) -> Result<Response, Error> {
        let line = RequestLine { method: request.method().clone(), uri: request.uri().clone() };
        self.logger.on_request(&request);

        match next.run(request).await {
            Ok(response) => {
                self.logger.on_response(&line, &response);
                Ok(response)
            }
            Err(error) => {
                self.logger.on_error(&line, &error);
                Err(error)
            }
        }
    }
}

impl std::fmt::Debug for LoggingFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LoggingFilter")
    }
}
