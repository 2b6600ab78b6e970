//! Mounting all five handlers on a router

use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::routing::get_service;
use axum::Router;
use futures::future::BoxFuture;
use tower_http::trace::TraceLayer;

use super::{OperationOptions, ResourceBinder};
use crate::store::Model;

/// Runs before a handler; `Err` answers the request immediately
///
/// Any `async` closure taking the request implements this:
///
/// ```rust
/// use acton_resource::binder::Middleware;
/// use axum::body::Body;
/// use axum::http::{Request, StatusCode};
/// use axum::response::{IntoResponse, Response};
///
/// let require_key = |req: Request<Body>| async move {
///     if req.headers().contains_key("x-api-key") {
///         Ok(req)
///     } else {
///         Err::<_, Response>(StatusCode::UNAUTHORIZED.into_response())
///     }
/// };
///
/// fn accepts(_: impl Middleware) {}
/// accepts(require_key);
/// ```
pub trait Middleware: Send + Sync + 'static {
    /// Pass the (possibly modified) request on, or answer it
    fn handle(&self, req: Request<Body>) -> BoxFuture<'static, Result<Request<Body>, Response>>;
}

impl<F, Fut> Middleware for F
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Request<Body>, Response>> + Send + 'static,
{
    fn handle(&self, req: Request<Body>) -> BoxFuture<'static, Result<Request<Body>, Response>> {
        Box::pin(self(req))
    }
}

/// Middleware shared by every route [`ResourceBinder::serve`] registers
#[derive(Clone, Default)]
pub struct ServeOptions {
    before: Vec<Arc<dyn Middleware>>,
    after: Vec<Arc<dyn Middleware>>,
}

impl std::fmt::Debug for ServeOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServeOptions")
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .finish()
    }
}

impl ServeOptions {
    /// No middleware
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `middleware` ahead of each handler, in registration order
    #[must_use]
    pub fn before(mut self, middleware: impl Middleware) -> Self {
        self.before.push(Arc::new(middleware));
        self
    }

    /// Accepted for compatibility but never run
    ///
    /// Resource handlers always produce the response, so nothing follows
    /// them. [`ResourceBinder::serve`] logs a warning when these are set.
    #[must_use]
    pub fn after(mut self, middleware: impl Middleware) -> Self {
        self.after.push(Arc::new(middleware));
        self
    }
}

impl<M: Model> ResourceBinder<M> {
    /// Register list, insert, detail, update and remove under `path`
    ///
    /// | Method   | Route          | Handler  |
    /// |----------|----------------|----------|
    /// | `GET`    | `{path}`       | query    |
    /// | `POST`   | `{path}`       | insert   |
    /// | `GET`    | `{path}/{id}`  | detail   |
    /// | `PATCH`  | `{path}/{id}`  | update   |
    /// | `DELETE` | `{path}/{id}`  | remove   |
    pub fn serve<S>(&self, path: &str, router: Router<S>, options: ServeOptions) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let collection = format!("/{}", path.trim_matches('/'));
        let item = format!("{}/{{id}}", collection.trim_end_matches('/'));

        if !options.after.is_empty() {
            tracing::warn!(
                path = %collection,
                count = options.after.len(),
                "After middleware never runs behind resource handlers; ignoring"
            );
        }

        let before = &options.before;
        let defaults = OperationOptions::default;

        let collection_routes = get_service(self.query(defaults()).with_before(before))
            .post_service(self.insert(defaults()).with_before(before))
            .layer(TraceLayer::new_for_http());
        let item_routes = get_service(self.detail(defaults()).with_before(before))
            .patch_service(self.update(defaults()).with_before(before))
            .delete_service(self.remove(defaults()).with_before(before))
            .layer(TraceLayer::new_for_http());

        tracing::info!(
            model = self.model().name(),
            collection = %collection,
            item = %item,
            "Resource routes registered"
        );

        router
            .route(&collection, collection_routes)
            .route(&item, item_routes)
    }
}

