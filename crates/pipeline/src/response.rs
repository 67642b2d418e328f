//! The response value unwinding back out of the pipeline.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use http_body::Body as HttpBody;
use http_body_util::BodyExt;
use http_body_util::combinators::BoxBody;
use tokio::sync::Mutex;

use crate::error::{BoxError, Error};
use crate::metadata::Metadata;

/// The raw body shape transports hand back to the pipeline.
pub type RawBody = BoxBody<Bytes, BoxError>;

/// An HTTP response plus the metadata bag accumulated on the way in.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
    metadata: Metadata,
}

impl Response {
    pub fn new(status: StatusCode, headers: HeaderMap, body: ResponseBody, metadata: Metadata) -> Self {
        Self { status, headers, body, metadata }
    }

    /// Converts a raw transport response, attaching `metadata` (by contract a
    /// clone of the request's bag, so the response owns an independent copy).
    pub fn from_http(response: http::Response<RawBody>, metadata: Metadata) -> Self {
        let (parts, body) = response.into_parts();
        Self { status: parts.status, headers: parts.headers, body: ResponseBody::stream(body), metadata }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// `true` iff the status code is in `200..300`.
    pub fn successful(&self) -> bool {
        self.status.is_success()
    }

    pub fn client_error(&self) -> bool {
        self.status.is_client_error()
    }

    pub fn server_error(&self) -> bool {
        self.status.is_server_error()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Buffers the body and returns it. A streaming body is drained at most
    /// once; after that the buffered bytes are served repeatedly.
    pub async fn bytes(&self) -> Result<Bytes, Error> {
        self.body.bytes().await.map_err(|cause| Error::new(cause, self.metadata.clone()))
    }

    /// Decodes the body through a [`BodyDecoder`].
    pub async fn body<T, D>(&self, decoder: &D) -> Result<T, Error>
    where
        D: BodyDecoder<T> + ?Sized,
    {
        decoder.decode(self).await
    }
}

/// The body-decoding collaborator boundary: turns a buffered response into a
/// typed value. Concrete decoders (JSON, text, bytes) live with the client
/// layer.
#[async_trait]
pub trait BodyDecoder<T>: Send + Sync {
    async fn decode(&self, response: &Response) -> Result<T, Error>;
}

/// A response body that is either buffered bytes or a not-yet-consumed
/// stream.
///
/// Consumption is guarded the same way request bodies are: the stream is
/// taken out under a lock and collected at most once, then the buffered
/// bytes replace it.
#[derive(Clone)]
pub struct ResponseBody {
    inner: Arc<Mutex<BodyKind>>,
}

enum BodyKind {
    Buffered(Bytes),
    Stream(RawBody),
    Consumed,
}

impl ResponseBody {
    pub fn empty() -> Self {
        Self::once(Bytes::new())
    }

    pub fn once(bytes: Bytes) -> Self {
        Self { inner: Arc::new(Mutex::new(BodyKind::Buffered(bytes))) }
    }

    pub fn stream<B>(body: B) -> Self
    where
        B: HttpBody<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<BoxError>,
    {
        let boxed = BoxBody::new(body.map_err(Into::into));
        Self { inner: Arc::new(Mutex::new(BodyKind::Stream(boxed))) }
    }

    async fn bytes(&self) -> Result<Bytes, BoxError> {
        let mut guard = self.inner.lock().await;
        match std::mem::replace(&mut *guard, BodyKind::Consumed) {
            BodyKind::Buffered(bytes) => {
                *guard = BodyKind::Buffered(bytes.clone());
                Ok(bytes)
            }
            BodyKind::Stream(body) => {
                // A collect failure leaves the body consumed; the stream is
                // gone either way.
                let bytes = body.collect().await?.to_bytes();
                *guard = BodyKind::Buffered(bytes.clone());
                Ok(bytes)
            }
            BodyKind::Consumed => Err("response body already consumed".into()),
        }
    }
}

impl From<Bytes> for ResponseBody {
    fn from(bytes: Bytes) -> Self {
        Self::once(bytes)
    }
}

impl From<&'static str> for ResponseBody {
    fn from(value: &'static str) -> Self {
        Self::once(Bytes::from_static(value.as_bytes()))
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResponseBody")
    }
}
