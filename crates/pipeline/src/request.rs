//! The request value flowing into the pipeline.

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};

use crate::cancel::CancelToken;
use crate::metadata::Metadata;

/// An HTTP request plus its pipeline side-channel state.
///
/// A request is owned exclusively by the pipeline invocation that created it
/// until it reaches the terminal executor; filters receive it by value,
/// transform it, and pass it onward.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Option<Bytes>,
    cancel: Option<CancelToken>,
    metadata: Metadata,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: None,
            cancel: None,
            metadata: Metadata::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = Some(body.into());
    }

    pub fn cancel_token(&self) -> Option<&CancelToken> {
        self.cancel.as_ref()
    }

    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = Some(token);
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// An independent copy of this request.
    ///
    /// The copy owns its own headers, body handle and cancellation slot, so
    /// in-flight mutations made to one copy (say, a timeout filter injecting
    /// a derived cancel token) never leak into the other. With
    /// `copy_metadata = false` the copy starts from a fresh, empty bag; the
    /// retry filter uses this so attempt N+1 never inherits attempt N's
    /// accumulated metadata.
    #[must_use]
    pub fn clone_request(&self, copy_metadata: bool) -> Request {
        Request {
            method: self.method.clone(),
            uri: self.uri.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
            cancel: self.cancel.clone(),
            metadata: if copy_metadata { self.metadata.clone() } else { Metadata::new() },
        }
    }

    /// Lowers this request into the plain `http` shape handed to transports.
    pub fn into_http_request(self) -> http::Request<Bytes> {
        let mut request = http::Request::new(self.body.unwrap_or_default());
        *request.method_mut() = self.method;
        *request.uri_mut() = self.uri;
        *request.headers_mut() = self.headers;
        request
    }
}
