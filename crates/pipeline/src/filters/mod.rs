//! The cross-cutting filters shipped with the pipeline.
//!
//! Each filter is an independent [`Filter`](crate::filter::Filter)
//! implementation; none of them know about each other, and any subset can be
//! composed in any order.

pub mod auth;
pub mod cache;
pub mod delay;
pub mod logging;
pub mod retry;
pub mod timeout;
pub mod timing;

pub use auth::{AUTHENTICATED, AuthFilter, AuthProvider, Authorization, auth_fn};
pub use cache::{Cache, CacheFilter, CacheLookup, CacheStore, FullLookup, MemoryCacheStore, NoLookup};
pub use delay::DelayFilter;
pub use logging::{LoggingFilter, RequestLine, RequestLogger, TracingLogger};
pub use retry::{Outcome, RETRY_ATTEMPT, RetryFilter, RetryPolicy, retry_fn};
pub use timeout::{TIMED_OUT, TIMEOUT_BUDGET, TimeoutFilter};
pub use timing::{REQUEST_DURATION, TimingFilter};
