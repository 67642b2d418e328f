//! The client facade over a filter pipeline.
//!
//! A client owns a terminal executor for its whole lifetime; the filter list
//! in front of it can be swapped atomically at any time without touching
//! in-flight requests, which keep running on the pipeline they started on.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, Uri};
use mime::Mime;

use filament_pipeline::error::Error;
use filament_pipeline::filter::{Execute, Filter, Pipeline};
use filament_pipeline::metadata::Metadata;
use filament_pipeline::request::Request;
use filament_pipeline::response::Response;

use crate::builder::{BuildError, RequestBuilder, build_request};

pub struct Client {
    terminal: Arc<dyn Execute>,
    composed: ArcSwap<Pipeline>,
}

impl Client {
    /// Wraps `terminal` with the given filters. An empty list yields a
    /// pass-through client.
    pub fn new(terminal: Arc<dyn Execute>, filters: Vec<Arc<dyn Filter>>) -> Self {
        let composed = ArcSwap::from_pointee(Pipeline::new(filters, Arc::clone(&terminal)));
        Self { terminal, composed }
    }

    /// Replaces the filter list. The new pipeline is rebuilt over the
    /// original terminal, so filters never stack across calls.
    pub fn set_filters(&self, filters: Vec<Arc<dyn Filter>>) {
        self.composed.store(Arc::new(Pipeline::new(filters, Arc::clone(&self.terminal))));
    }

    /// The currently composed pipeline, usable as a standalone [`Execute`].
    pub fn pipeline(&self) -> Arc<Pipeline> {
        self.composed.load_full()
    }

    /// Builds a request with a closure; a convenience mirror of
    /// [`build_request`].
    pub fn build_request(
        block: impl FnOnce(&mut RequestBuilder),
    ) -> Result<Request, BuildError> {
        build_request(block)
    }

    /// Runs one request through the current pipeline.
    pub async fn execute(&self, request: Request) -> Result<Response, Error> {
        self.composed.load().execute(request).await
    }

    async fn send_bodyless(
        &self,
        method: Method,
        target: &Uri,
        query: &[(&str, &str)],
    ) -> Result<Response, Error> {
        let request = build_request(|req| {
            req.url(|url| {
                url.from(target);
                for (name, value) in query {
                    url.add_query_param(*name, *value);
                }
            })
            .method(method);
        })
        .map_err(into_pipeline_error)?;
        self.execute(request).await
    }

    pub async fn get(&self, target: &Uri, query: &[(&str, &str)]) -> Result<Response, Error> {
        self.send_bodyless(Method::GET, target, query).await
    }

    pub async fn delete(&self, target: &Uri, query: &[(&str, &str)]) -> Result<Response, Error> {
        self.send_bodyless(Method::DELETE, target, query).await
    }

    pub async fn head(&self, target: &Uri, query: &[(&str, &str)]) -> Result<Response, Error> {
        self.send_bodyless(Method::HEAD, target, query).await
    }

    pub async fn options(&self, target: &Uri, query: &[(&str, &str)]) -> Result<Response, Error> {
        self.send_bodyless(Method::OPTIONS, target, query).await
    }

    async fn send_with_body(
        &self,
        method: Method,
        target: &Uri,
        body: (Mime, Bytes),
    ) -> Result<Response, Error> {
        let request = build_request(|req| {
            req.url(|url| {
                url.from(target);
            })
            .method(method)
            .encoded(body);
        })
        .map_err(into_pipeline_error)?;
        self.execute(request).await
    }

    /// Sends a POST with an encoded body, typically built by the
    /// [`codec`](crate::codec) encoders.
    pub async fn post(&self, target: &Uri, body: (Mime, Bytes)) -> Result<Response, Error> {
        self.send_with_body(Method::POST, target, body).await
    }

    pub async fn put(&self, target: &Uri, body: (Mime, Bytes)) -> Result<Response, Error> {
        self.send_with_body(Method::PUT, target, body).await
    }

    pub async fn patch(&self, target: &Uri, body: (Mime, Bytes)) -> Result<Response, Error> {
        self.send_with_body(Method::PATCH, target, body).await
    }
}

fn into_pipeline_error(cause: BuildError) -> Error {
    Error::new(cause, Metadata::new())
}

/// A client is itself an [`Execute`], so it can stand in as the terminal of
/// an outer pipeline.
#[async_trait]
impl Execute for Client {
    async fn execute(&self, request: Request) -> Result<Response, Error> {
        Client::execute(self, request).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Client")
    }
}
