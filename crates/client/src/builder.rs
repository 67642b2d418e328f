//! Builders for target URIs and whole requests.
//!
//! The URI builder starts from `https://example.org/` so partial builds
//! always produce something parseable; setting any part replaces the
//! placeholder. Everything fallible is deferred to `build`, which keeps the
//! closure-based building API free of intermediate `Result`s.

use std::fmt::Write as _;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, Method, Uri};
use mime::Mime;
use thiserror::Error;

use filament_pipeline::cancel::CancelToken;
use filament_pipeline::metadata::{Key, Metadata};
use filament_pipeline::request::Request;

/// A request that could not be assembled.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid target uri: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),
    #[error("invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),
    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    #[error("query encoding failed: {0}")]
    Query(#[from] serde_urlencoded::ser::Error),
    #[error("body encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

const PLACEHOLDER_HOST: &str = "example.org";

/// Assembles a target URI part by part.
#[derive(Debug, Clone)]
pub struct UrlBuilder {
    scheme: String,
    host: String,
    port: Option<u16>,
    path: String,
    raw_query: Option<String>,
    query_params: Vec<(String, String)>,
}

impl Default for UrlBuilder {
    fn default() -> Self {
        Self {
            scheme: "https".to_string(),
            host: PLACEHOLDER_HOST.to_string(),
            port: None,
            path: "/".to_string(),
            raw_query: None,
            query_params: Vec::new(),
        }
    }
}

impl UrlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every part with the corresponding part of `target`. Query
    /// parameters added afterwards are appended to the target's own query.
    pub fn from(&mut self, target: &Uri) -> &mut Self {
        if let Some(scheme) = target.scheme_str() {
            self.scheme = scheme.to_string();
        }
        if let Some(host) = target.host() {
            self.host = host.to_string();
        }
        self.port = target.port_u16();
        self.path = if target.path().is_empty() { "/" } else { target.path() }.to_string();
        self.raw_query = target.query().map(str::to_string);
        self.query_params.clear();
        self
    }

    pub fn scheme(&mut self, scheme: impl Into<String>) -> &mut Self {
        self.scheme = scheme.into();
        self
    }

    pub fn host(&mut self, host: impl Into<String>) -> &mut Self {
        self.host = host.into();
        self
    }

    pub fn port(&mut self, port: impl Into<Option<u16>>) -> &mut Self {
        self.port = port.into();
        self
    }

    pub fn path(&mut self, path: impl Into<String>) -> &mut Self {
        let path = path.into();
        self.path = if path.starts_with('/') { path } else { format!("/{path}") };
        self
    }

    pub fn add_query_param(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.query_params.push((name.into(), value.into()));
        self
    }

    pub fn build(&self) -> Result<Uri, BuildError> {
        let mut uri = format!("{}://{}", self.scheme, self.host);
        if let Some(port) = self.port {
            let _ = write!(uri, ":{port}");
        }
        uri.push_str(&self.path);

        let encoded = serde_urlencoded::to_string(&self.query_params)?;
        match (&self.raw_query, encoded.is_empty()) {
            (Some(raw), true) => {
                let _ = write!(uri, "?{raw}");
            }
            (Some(raw), false) => {
                let _ = write!(uri, "?{raw}&{encoded}");
            }
            (None, false) => {
                let _ = write!(uri, "?{encoded}");
            }
            (None, true) => {}
        }

        Ok(Uri::try_from(uri)?)
    }
}

/// Assembles a [`Request`], including its metadata and cancellation slot.
#[derive(Debug, Default)]
pub struct RequestBuilder {
    url: UrlBuilder,
    method: Option<Method>,
    headers: HeaderMap,
    metadata: Metadata,
    content_type: Option<Mime>,
    body: Option<Bytes>,
    cancel: Option<CancelToken>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(&mut self, build: impl FnOnce(&mut UrlBuilder)) -> &mut Self {
        build(&mut self.url);
        self
    }

    pub fn method(&mut self, method: Method) -> &mut Self {
        self.method = Some(method);
        self
    }

    pub fn header(&mut self, name: HeaderName, value: HeaderValue) -> &mut Self {
        self.headers.append(name, value);
        self
    }

    pub fn metadata<T: Clone + Send + Sync + 'static>(
        &mut self,
        key: &Key<T>,
        value: T,
    ) -> &mut Self {
        self.metadata.put(key, value);
        self
    }

    pub fn body(&mut self, body: impl Into<Bytes>) -> &mut Self {
        self.body = Some(body.into());
        self
    }

    /// Sets an encoded body together with its content type, as produced by
    /// the [`codec`](crate::codec) encoders.
    pub fn encoded(&mut self, (content_type, body): (Mime, Bytes)) -> &mut Self {
        self.content_type = Some(content_type);
        self.body = Some(body);
        self
    }

    pub fn cancel_token(&mut self, token: CancelToken) -> &mut Self {
        self.cancel = Some(token);
        self
    }

    pub fn build(self) -> Result<Request, BuildError> {
        let uri = self.url.build()?;
        let mut request = Request::new(self.method.unwrap_or(Method::GET), uri);
        *request.headers_mut() = self.headers;
        if let Some(content_type) = self.content_type {
            let value = HeaderValue::from_str(content_type.as_ref())?;
            request.headers_mut().insert(CONTENT_TYPE, value);
        }
        if let Some(body) = self.body {
            request.set_body(body);
        }
        if let Some(token) = self.cancel {
            request.set_cancel_token(token);
        }
        *request.metadata_mut() = self.metadata;
        Ok(request)
    }
}

/// Builds a request with a closure, the usual entry point.
pub fn build_request(block: impl FnOnce(&mut RequestBuilder)) -> Result<Request, BuildError> {
    let mut builder = RequestBuilder::new();
    block(&mut builder);
    builder.build()
}
