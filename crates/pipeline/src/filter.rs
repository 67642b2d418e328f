//! The filter contract and the composition machinery.
//!
//! A [`Filter`] wraps a single onward call: it may transform the request,
//! decide not to call onward at all, or post-process the outcome. Composing
//! an ordered list of filters over a terminal [`Execute`] yields a
//! [`Pipeline`]; the first filter in the list is outermost, seeing the raw
//! request first and the final outcome last.
//!
//! The onward continuation is the index-driven [`Next`]: each step dispatches
//! the filter at its index or, past the end, the terminal. Composition itself
//! is pure and executes nothing; every [`Pipeline::execute`] call is an
//! independent invocation with no shared mutable state.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

/// Anything that can turn a [`Request`] into a [`Response`] (or fail): a
/// composed pipeline, a terminal executor, or a continuation.
#[async_trait]
pub trait Execute: Send + Sync {
    async fn execute(&self, request: Request) -> Result<Response, Error>;
}

/// A unit of the pipeline. All filters share this one shape regardless of
/// behavior, which is what makes composition uniform.
#[async_trait]
pub trait Filter: Send + Sync {
    async fn apply(&self, request: Request, next: Next) -> Result<Response, Error>;
}

/// The onward continuation handed to a filter.
///
/// Cloning is cheap; filters that invoke the next stage more than once (the
/// retry filter) clone it per attempt.
#[derive(Clone)]
pub struct Next {
    filters: Arc<[Arc<dyn Filter>]>,
    index: usize,
    terminal: Arc<dyn Execute>,
}

impl Next {
    fn new(filters: Arc<[Arc<dyn Filter>]>, terminal: Arc<dyn Execute>) -> Self {
        Self { filters, index: 0, terminal }
    }

    /// Runs the rest of the pipeline: the filter at the current index, or the
    /// terminal once the list is exhausted.
    pub async fn run(self, request: Request) -> Result<Response, Error> {
        match self.filters.get(self.index) {
            Some(filter) => {
                let filter = Arc::clone(filter);
                let next = Next { filters: self.filters, index: self.index + 1, terminal: self.terminal };
                filter.apply(request, next).await
            }
            None => self.terminal.execute(request).await,
        }
    }
}

#[async_trait]
impl Execute for Next {
    async fn execute(&self, request: Request) -> Result<Response, Error> {
        self.clone().run(request).await
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").field("index", &self.index).field("filters", &self.filters.len()).finish()
    }
}

/// An ordered filter list folded over a terminal executor into one callable.
#[derive(Clone)]
pub struct Pipeline {
    filters: Arc<[Arc<dyn Filter>]>,
    terminal: Arc<dyn Execute>,
}

impl Pipeline {
    pub fn new(filters: Vec<Arc<dyn Filter>>, terminal: Arc<dyn Execute>) -> Self {
        Self { filters: filters.into(), terminal }
    }

    /// Runs the whole pipeline for one request.
    pub async fn execute(&self, request: Request) -> Result<Response, Error> {
        Next::new(Arc::clone(&self.filters), Arc::clone(&self.terminal)).run(request).await
    }

    /// Layers request-scoped filters on top of this pipeline without
    /// mutating it: the returned pipeline runs `filters` first, then this
    /// one in full.
    #[must_use]
    pub fn layer(&self, filters: Vec<Arc<dyn Filter>>) -> Pipeline {
        Pipeline::new(filters, Arc::new(self.clone()))
    }
}

#[async_trait]
impl Execute for Pipeline {
    async fn execute(&self, request: Request) -> Result<Response, Error> {
        Pipeline::execute(self, request).await
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline").field("filters", &self.filters.len()).finish()
    }
}

/// The identity filter: calls onward untouched. Composing an empty list
/// yields this, so call sites never special-case "no filters".
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFilter;

#[async_trait]
impl Filter for NoopFilter {
    async fn apply(&self, request: Request, next: Next) -> Result<Response, Error> {
        next.run(request).await
    }
}

/// Folds an ordered filter list into a single filter.
///
/// Zero filters compose to [`NoopFilter`]; a single filter is returned as-is
/// with no extra indirection.
pub fn compose(filters: Vec<Arc<dyn Filter>>) -> Arc<dyn Filter> {
    let mut filters = filters;
    match filters.len() {
        0 => Arc::new(NoopFilter),
        1 => filters.pop().unwrap_or_else(|| Arc::new(NoopFilter)),
        _ => Arc::new(ComposedFilter { filters: filters.into() }),
    }
}

/// A filter list acting as one filter: runs its own list, then hands off to
/// the outer continuation as its terminal.
struct ComposedFilter {
    filters: Arc<[Arc<dyn Filter>]>,
}

#[async_trait]
impl Filter for ComposedFilter {
    async fn apply(&self, request: Request, next: Next) -> Result<Response, Error> {
        Next::new(Arc::clone(&self.filters), Arc::new(next)).run(request).await
    }
}

/// A [`Filter`] built from an async closure.
pub struct FnFilter<F> {
    f: F,
}

pub fn filter_fn<F, Fut>(f: F) -> FnFilter<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, Error>> + Send,
{
    FnFilter { f }
}

#[async_trait]
impl<F, Fut> Filter for FnFilter<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, Error>> + Send,
{
    async fn apply(&self, request: Request, next: Next) -> Result<Response, Error> {
        (self.f)(request, next).await
    }
}

impl<F> fmt::Debug for FnFilter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnFilter")
    }
}

/// An [`Execute`] built from an async closure, usually a test terminal or a
/// bare transport call.
pub struct FnExecute<F> {
    f: F,
}

pub fn execute_fn<F, Fut>(f: F) -> FnExecute<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, Error>> + Send,
{
    FnExecute { f }
}

#[async_trait]
impl<F, Fut> Execute for FnExecute<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, Error>> + Send,
{
    async fn execute(&self, request: Request) -> Result<Response, Error> {
        (self.f)(request).await
    }
}

impl<F> fmt::Debug for FnExecute<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnExecute")
    }
}
