//! An ergonomic HTTP client facade over the filament filter pipeline
//!
//! This crate layers request building, body codecs and verb helpers on top
//! of [`filament_pipeline`]. The pipeline stays in charge of the cross-cutting
//! behavior (timeouts, retries, auth, caching, logging); this crate is about
//! assembling requests and interpreting responses.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use filament_client::codec::{self, JsonDecoder};
//! use filament_client::Client;
//! use filament_pipeline::executor::TransportExecutor;
//! use filament_pipeline::filters::LoggingFilter;
//! use http::Uri;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Widget {
//!     name: String,
//! }
//!
//! # async fn run(transport: impl filament_pipeline::executor::Transport + 'static) {
//! let client = Client::new(
//!     Arc::new(TransportExecutor::new(transport)),
//!     vec![Arc::new(LoggingFilter::default())],
//! );
//!
//! let body = codec::json(&Widget { name: "bolt".into() }).unwrap();
//! let response = client
//!     .post(&Uri::from_static("https://api.internal/widgets"), body)
//!     .await
//!     .unwrap();
//! let created: Widget = response.body(&JsonDecoder::new()).await.unwrap();
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod codec;

pub use builder::{BuildError, RequestBuilder, UrlBuilder, build_request};
pub use client::Client;
pub use codec::{BytesDecoder, JsonDecoder, TextDecoder};
