//! Measures how long the onward call took.
//!
//! The elapsed wall time ends up under [`REQUEST_DURATION`] on the response
//! or error, whichever comes back. Uses the runtime clock, so paused-time
//! tests see deterministic durations.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tokio::time::Instant;

use crate::error::Error;
use crate::filter::{Filter, Next};
use crate::metadata::{Key, Metadata};
use crate::request::Request;
use crate::response::Response;

/// The wall time the onward call took.
pub static REQUEST_DURATION: Lazy<Key<Duration>> =
    Lazy::new(|| Key::new("the duration of the request"));

#[derive(Debug, Clone, Copy, Default)]
pub struct TimingFilter;

#[async_trait]
impl Filter for TimingFilter {
    async fn apply(&self, request: Request, next: Next) -> Result<Response, Error> {
        let start = Instant::now();
        let result = next.run(request).await;
        let elapsed = start.elapsed();

        match result {
            Ok(mut response) => {
                response.metadata_mut().put(&REQUEST_DURATION, elapsed);
                Ok(response)
            }
            Err(error) => {
                let mut extra = Metadata::new();
                extra.put(&REQUEST_DURATION, elapsed);
                Err(error.with_metadata(extra))
            }
        }
    }
}
