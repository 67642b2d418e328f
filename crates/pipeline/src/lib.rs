//! A composable filter pipeline for asynchronous HTTP clients
//!
//! This crate provides the middleware layer of an HTTP client: requests flow
//! through an ordered list of filters down to a terminal executor, and
//! responses or errors flow back up through the same filters in reverse.
//! Filters are small, independent units; composition is pure, and any subset
//! of them can be stacked in any order.
//!
//! # Features
//!
//! - A uniform [`Filter`] contract with an explicit onward continuation
//! - Pure composition: building a pipeline executes nothing
//! - A typed, identity-keyed [`Metadata`] bag carried from request to outcome
//! - Cancellation tokens with tagged reasons, linked parent to child
//! - Runtime-mutable filter chains that recompose on every change
//! - Stock filters for timeouts, retries, delays, auth, caching, logging,
//!   and timing
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use bytes::Bytes;
//! use filament_pipeline::error::BoxError;
//! use filament_pipeline::executor::{Transport, TransportExecutor};
//! use filament_pipeline::filter::{Filter, Pipeline};
//! use filament_pipeline::filters::{LoggingFilter, TimeoutFilter, TimingFilter};
//! use filament_pipeline::request::Request;
//! use filament_pipeline::response::RawBody;
//! use http::{Method, Uri};
//!
//! struct MyTransport;
//!
//! #[async_trait::async_trait]
//! impl Transport for MyTransport {
//!     async fn send(
//!         &self,
//!         request: http::Request<Bytes>,
//!     ) -> Result<http::Response<RawBody>, BoxError> {
//!         todo!("hand the request to a connection pool")
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();
//!
//!     let filters: Vec<Arc<dyn Filter>> = vec![
//!         Arc::new(LoggingFilter::default()),
//!         Arc::new(TimingFilter),
//!         Arc::new(TimeoutFilter::new(Duration::from_secs(10))),
//!     ];
//!     let pipeline = Pipeline::new(filters, Arc::new(TransportExecutor::new(MyTransport)));
//!
//!     let request = Request::new(Method::GET, Uri::from_static("https://example.org/"));
//!     match pipeline.execute(request).await {
//!         Ok(response) => println!("got {}", response.status()),
//!         Err(error) => eprintln!("request failed: {error}"),
//!     }
//! }
//! ```

pub mod cancel;
pub mod chain;
pub mod error;
pub mod executor;
pub mod filter;
pub mod filters;
pub mod metadata;
pub mod request;
pub mod response;

pub use cancel::{CancelReason, CancelToken};
pub use chain::{FilterChain, RequestFilterChain, ResponseFilterChain};
pub use error::{BoxError, Error};
pub use executor::{Transport, TransportExecutor};
pub use filter::{Execute, Filter, Next, Pipeline, compose};
pub use metadata::{Key, Metadata};
pub use request::Request;
pub use response::{BodyDecoder, RawBody, Response, ResponseBody};
