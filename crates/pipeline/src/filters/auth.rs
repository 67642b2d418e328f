//! Attaches credentials to outgoing requests.
//!
//! A provider is consulted per request and may decline, so one filter serves
//! both authenticated and anonymous traffic. Whether credentials were
//! attached is always recorded under [`AUTHENTICATED`], which outlives the
//! request and shows up on the response or error.

use std::sync::Arc;

use async_trait::async_trait;
use http::HeaderValue;
use http::header::AUTHORIZATION;
use once_cell::sync::Lazy;

use crate::error::Error;
use crate::filter::{Filter, Next};
use crate::metadata::Key;
use crate::request::Request;
use crate::response::Response;

/// Whether the request went out with an `Authorization` header.
pub static AUTHENTICATED: Lazy<Key<bool>> =
    Lazy::new(|| Key::new("whether the request was authenticated"));

/// An `Authorization` header value, split into its scheme and credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub scheme: String,
    pub credential: String,
}

impl Authorization {
    pub fn new(scheme: impl Into<String>, credential: impl Into<String>) -> Self {
        Self { scheme: scheme.into(), credential: credential.into() }
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::new("Bearer", token)
    }

    fn header_value(&self) -> Result<HeaderValue, http::header::InvalidHeaderValue> {
        HeaderValue::from_str(&format!("{} {}", self.scheme, self.credential))
    }
}

/// Supplies credentials for a request, or declines.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn authorize(&self, request: &Request) -> Result<Option<Authorization>, Error>;
}

/// An [`AuthProvider`] built from a plain closure.
pub struct FnAuthProvider<F> {
    f: F,
}

impl<F> std::fmt::Debug for FnAuthProvider<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnAuthProvider")
    }
}

pub fn auth_fn<F>(f: F) -> FnAuthProvider<F>
where
    F: Fn(&Request) -> Option<Authorization> + Send + Sync,
{
    FnAuthProvider { f }
}

#[async_trait]
impl<F> AuthProvider for FnAuthProvider<F>
where
    F: Fn(&Request) -> Option<Authorization> + Send + Sync,
{
    async fn authorize(&self, request: &Request) -> Result<Option<Authorization>, Error> {
        Ok((self.f)(request))
    }
}

pub struct AuthFilter {
    provider: Arc<dyn AuthProvider>,
}

impl AuthFilter {
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Filter for AuthFilter {
    async fn apply(&self, mut request: Request, next: Next) -> Result<Response, Error> {
        let authorization = self
            .provider
            .authorize(&request)
            .await
            .map_err(|error| error.with_metadata(request.metadata().clone()))?;

        let authenticated = match authorization {
            Some(authorization) => {
                let value = authorization
                    .header_value()
                    .map_err(|cause| Error::new(cause, request.metadata().clone()))?;
                request.headers_mut().insert(AUTHORIZATION, value);
                true
            }
            None => false,
        };
        request.metadata_mut().put(&AUTHENTICATED, authenticated);

        next.run(request).await
    }
}

impl std::fmt::Debug for AuthFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthFilter")
    }
}
