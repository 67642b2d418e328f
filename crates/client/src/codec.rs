//! Body encoders and decoders.
//!
//! Encoders produce a content type together with the encoded bytes, ready
//! for [`RequestBuilder::encoded`](crate::builder::RequestBuilder::encoded).
//! Decoders implement the pipeline's [`BodyDecoder`] seam, so a decode
//! failure surfaces as a pipeline error carrying the response's metadata.

use std::marker::PhantomData;
use std::string::FromUtf8Error;

use async_trait::async_trait;
use bytes::Bytes;
use mime::Mime;
use serde::Serialize;
use serde::de::DeserializeOwned;

use filament_pipeline::error::Error;
use filament_pipeline::response::{BodyDecoder, Response};

use crate::builder::BuildError;

/// Encodes `value` as JSON.
pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<(Mime, Bytes), BuildError> {
    Ok((mime::APPLICATION_JSON, serde_json::to_vec(value)?.into()))
}

/// Encodes `value` as a `application/x-www-form-urlencoded` form.
pub fn form<T: Serialize + ?Sized>(value: &T) -> Result<(Mime, Bytes), BuildError> {
    Ok((mime::APPLICATION_WWW_FORM_URLENCODED, serde_urlencoded::to_string(value)?.into()))
}

/// Wraps plain text.
pub fn text(value: impl Into<String>) -> (Mime, Bytes) {
    (mime::TEXT_PLAIN_UTF_8, Bytes::from(value.into()))
}

/// Wraps raw bytes under `application/octet-stream`.
pub fn octet_stream(value: impl Into<Bytes>) -> (Mime, Bytes) {
    (mime::APPLICATION_OCTET_STREAM, value.into())
}

fn decode_error(cause: impl std::error::Error + Send + Sync + 'static, response: &Response) -> Error {
    Error::new(cause, response.metadata().clone())
}

/// Decodes the body as JSON into `T`.
pub struct JsonDecoder<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonDecoder<T> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Default for JsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for JsonDecoder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonDecoder")
    }
}

#[async_trait]
impl<T: DeserializeOwned> BodyDecoder<T> for JsonDecoder<T> {
    async fn decode(&self, response: &Response) -> Result<T, Error> {
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|cause| decode_error(cause, response))
    }
}

/// Decodes the body as UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDecoder;

#[async_trait]
impl BodyDecoder<String> for TextDecoder {
    async fn decode(&self, response: &Response) -> Result<String, Error> {
        let bytes = response.bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|cause: FromUtf8Error| decode_error(cause, response))
    }
}

/// Hands the raw body bytes back untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesDecoder;

#[async_trait]
impl BodyDecoder<Bytes> for BytesDecoder {
    async fn decode(&self, response: &Response) -> Result<Bytes, Error> {
        response.bytes().await
    }
}
