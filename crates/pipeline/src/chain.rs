//! Mutable filter registries.
//!
//! A [`Chain`] holds a live, ordered list of payloads and keeps a composed
//! [`Filter`] entry point current: every `prepend`/`append`/`remove`
//! synchronously recomposes, and readers pick up the fresh composition on
//! their next call without blocking behind writers (the composed unit sits
//! in an `ArcSwap`).
//!
//! Three payload shapes share the add/remove/recompose contract: full
//! filters, request-only transforms and response-only transforms. The
//! transform chains compose as plain sequential folds; they never intercept
//! the onward call itself.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use async_trait::async_trait;

use crate::error::Error;
use crate::filter::{Filter, Next, NoopFilter, compose};
use crate::request::Request;
use crate::response::Response;

/// Sequentially rewrites the request before the terminal hand-off.
#[async_trait]
pub trait RequestTransform: Send + Sync {
    async fn transform(&self, request: Request) -> Result<Request, Error>;
}

/// Sequentially rewrites the response after the onward call.
#[async_trait]
pub trait ResponseTransform: Send + Sync {
    async fn transform(&self, response: Response) -> Result<Response, Error>;
}

/// A mutable, ordered list of `P` payloads behind an always-current composed
/// filter.
pub struct Chain<P: ?Sized> {
    items: Mutex<Vec<Arc<P>>>,
    composed: ArcSwap<Composed>,
    compose: fn(Vec<Arc<P>>) -> Arc<dyn Filter>,
}

struct Composed {
    filter: Arc<dyn Filter>,
}

pub type FilterChain = Chain<dyn Filter>;
pub type RequestFilterChain = Chain<dyn RequestTransform>;
pub type ResponseFilterChain = Chain<dyn ResponseTransform>;

impl<P: ?Sized> Chain<P> {
    fn with_compose(compose: fn(Vec<Arc<P>>) -> Arc<dyn Filter>) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            composed: ArcSwap::from_pointee(Composed { filter: Arc::new(NoopFilter) }),
            compose,
        }
    }

    pub fn prepend(&self, item: Arc<P>) -> &Self {
        let mut items = self.items.lock().expect("chain list lock poisoned");
        items.insert(0, item);
        self.recompose(&items);
        self
    }

    pub fn append(&self, item: Arc<P>) -> &Self {
        let mut items = self.items.lock().expect("chain list lock poisoned");
        items.push(item);
        self.recompose(&items);
        self
    }

    /// Removes `item` by identity; a no-op when it is not in the list.
    pub fn remove(&self, item: &Arc<P>) -> &Self {
        let mut items = self.items.lock().expect("chain list lock poisoned");
        if let Some(index) = items.iter().position(|existing| Arc::ptr_eq(existing, item)) {
            items.remove(index);
            self.recompose(&items);
        }
        self
    }

    /// The currently composed entry point.
    pub fn current(&self) -> Arc<dyn Filter> {
        Arc::clone(&self.composed.load().filter)
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("chain list lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn recompose(&self, items: &[Arc<P>]) {
        let filter = (self.compose)(items.to_vec());
        self.composed.store(Arc::new(Composed { filter }));
    }
}

impl FilterChain {
    pub fn new() -> Self {
        Self::with_compose(compose)
    }
}

impl RequestFilterChain {
    pub fn new() -> Self {
        Self::with_compose(compose_request_transforms)
    }
}

impl ResponseFilterChain {
    pub fn new() -> Self {
        Self::with_compose(compose_response_transforms)
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for RequestFilterChain {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for ResponseFilterChain {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<P: ?Sized + Send + Sync> Filter for Chain<P> {
    async fn apply(&self, request: Request, next: Next) -> Result<Response, Error> {
        self.current().apply(request, next).await
    }
}

impl<P: ?Sized> fmt::Debug for Chain<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain").field("len", &self.len()).finish()
    }
}

/// Folds request transforms into one filter: rewrite in list order, then hand
/// off once.
fn compose_request_transforms(transforms: Vec<Arc<dyn RequestTransform>>) -> Arc<dyn Filter> {
    if transforms.is_empty() {
        return Arc::new(NoopFilter);
    }
    Arc::new(RequestTransformFilter { transforms })
}

struct RequestTransformFilter {
    transforms: Vec<Arc<dyn RequestTransform>>,
}

#[async_trait]
impl Filter for RequestTransformFilter {
    async fn apply(&self, request: Request, next: Next) -> Result<Response, Error> {
        let mut request = request;
        for transform in &self.transforms {
            request = transform.transform(request).await?;
        }
        next.run(request).await
    }
}

/// Folds response transforms into one filter: hand off once, then rewrite in
/// list order.
fn compose_response_transforms(transforms: Vec<Arc<dyn ResponseTransform>>) -> Arc<dyn Filter> {
    if transforms.is_empty() {
        return Arc::new(NoopFilter);
    }
    Arc::new(ResponseTransformFilter { transforms })
}

struct ResponseTransformFilter {
    transforms: Vec<Arc<dyn ResponseTransform>>,
}

#[async_trait]
impl Filter for ResponseTransformFilter {
    async fn apply(&self, request: Request, next: Next) -> Result<Response, Error> {
        let mut response = next.run(request).await?;
        for transform in &self.transforms {
            response = transform.transform(response).await?;
        }
        Ok(response)
    }
}

/// A [`RequestTransform`] built from an async closure.
pub fn request_transform_fn<F, Fut>(f: F) -> FnRequestTransform<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Request, Error>> + Send,
{
    FnRequestTransform { f }
}

pub struct FnRequestTransform<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> RequestTransform for FnRequestTransform<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Request, Error>> + Send,
{
    async fn transform(&self, request: Request) -> Result<Request, Error> {
        (self.f)(request).await
    }
}

impl<F> fmt::Debug for FnRequestTransform<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnRequestTransform")
    }
}

/// A [`ResponseTransform`] built from an async closure.
pub fn response_transform_fn<F, Fut>(f: F) -> FnResponseTransform<F>
where
    F: Fn(Response) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, Error>> + Send,
{
    FnResponseTransform { f }
}

pub struct FnResponseTransform<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ResponseTransform for FnResponseTransform<F>
where
    F: Fn(Response) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, Error>> + Send,
{
    async fn transform(&self, response: Response) -> Result<Response, Error> {
        (self.f)(response).await
    }
}

impl<F> fmt::Debug for FnResponseTransform<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnResponseTransform")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Execute, Pipeline, execute_fn, filter_fn};
    use crate::metadata::Metadata;
    use crate::response::ResponseBody;
    use http::{HeaderMap, Method, StatusCode, Uri};

    type Log = Arc<Mutex<Vec<String>>>;

    fn request() -> Request {
        Request::new(Method::GET, Uri::from_static("https://example.org/"))
    }

    fn ok_response() -> Response {
        Response::new(StatusCode::OK, HeaderMap::new(), ResponseBody::empty(), Metadata::new())
    }

    fn terminal(log: &Log) -> Arc<dyn Execute> {
        let log = Arc::clone(log);
        Arc::new(execute_fn(move |req: Request| {
            let log = Arc::clone(&log);
            async move {
                let tags: Vec<_> =
                    req.headers().get_all("x-tag").iter().map(|v| v.to_str().unwrap().to_string()).collect();
                log.lock().unwrap().push(format!("terminal[{}]", tags.join(",")));
                Ok(ok_response())
            }
        }))
    }

    fn named(log: &Log, name: &'static str) -> Arc<dyn Filter> {
        let log = Arc::clone(log);
        Arc::new(filter_fn(move |request, next| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(name.to_string());
                next.run(request).await
            }
        }))
    }

    fn tagging(name: &'static str) -> Arc<dyn RequestTransform> {
        Arc::new(request_transform_fn(move |mut request: Request| async move {
            request.headers_mut().append("x-tag", name.parse().unwrap());
            Ok(request)
        }))
    }

    async fn run(chain: &Arc<FilterChain>, log: &Log) {
        let pipeline =
            Pipeline::new(vec![Arc::clone(chain) as Arc<dyn Filter>], terminal(log));
        pipeline.execute(request()).await.unwrap();
    }

    #[tokio::test]
    async fn recomposes_on_every_mutation() {
        let log: Log = Arc::default();
        let chain = Arc::new(FilterChain::new());

        run(&chain, &log).await;

        let a = named(&log, "a");
        let b = named(&log, "b");
        chain.append(Arc::clone(&a));
        run(&chain, &log).await;

        chain.prepend(Arc::clone(&b));
        run(&chain, &log).await;

        chain.remove(&a);
        run(&chain, &log).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["terminal[]", "a", "terminal[]", "b", "a", "terminal[]", "b", "terminal[]"]
        );
    }

    #[tokio::test]
    async fn removing_an_absent_filter_is_a_noop() {
        let log: Log = Arc::default();
        let chain = Arc::new(FilterChain::new());
        let a = named(&log, "a");
        let stranger = named(&log, "stranger");

        chain.append(Arc::clone(&a));
        chain.remove(&stranger);
        assert_eq!(chain.len(), 1);

        run(&chain, &log).await;
        assert_eq!(*log.lock().unwrap(), vec!["a", "terminal[]"]);
    }

    #[tokio::test]
    async fn request_transforms_run_sequentially_in_list_order() {
        let log: Log = Arc::default();
        let chain = Arc::new(RequestFilterChain::new());
        chain.append(tagging("first")).append(tagging("second"));

        let pipeline =
            Pipeline::new(vec![Arc::clone(&chain) as Arc<dyn Filter>], terminal(&log));
        pipeline.execute(request()).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["terminal[first,second]"]);
    }

    #[tokio::test]
    async fn response_transforms_rewrite_after_the_single_call() {
        let log: Log = Arc::default();
        let chain = Arc::new(ResponseFilterChain::new());
        chain
            .append(Arc::new(response_transform_fn(|mut response: Response| async move {
                response.metadata_mut().compute(&STEPS, |old| {
                    let mut steps = old.unwrap_or_default();
                    steps.push("first");
                    steps
                });
                Ok(response)
            })))
            .append(Arc::new(response_transform_fn(|mut response: Response| async move {
                response.metadata_mut().compute(&STEPS, |old| {
                    let mut steps = old.unwrap_or_default();
                    steps.push("second");
                    steps
                });
                Ok(response)
            })));

        let pipeline =
            Pipeline::new(vec![Arc::clone(&chain) as Arc<dyn Filter>], terminal(&log));
        let response = pipeline.execute(request()).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["terminal[]"]);
        assert_eq!(response.metadata().get(&STEPS), Some(&vec!["first", "second"]));
    }

    use crate::metadata::Key;
    use once_cell::sync::Lazy;

    static STEPS: Lazy<Key<Vec<&'static str>>> = Lazy::new(|| Key::new("steps"));
}
