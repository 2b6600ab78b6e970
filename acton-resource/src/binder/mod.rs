//! Bind a [`Model`] to REST handlers
//!
//! [`ResourceBinder`] owns a model and the resource configuration. Its five
//! factories ([`query`](ResourceBinder::query), [`detail`](ResourceBinder::detail),
//! [`insert`](ResourceBinder::insert), [`update`](ResourceBinder::update),
//! [`remove`](ResourceBinder::remove)) each assemble a typed
//! [`Pipeline`](crate::pipeline::Pipeline) and return it as a
//! [`ResourceHandler`], a `tower::Service` that can be mounted on any axum
//! route. [`serve`](ResourceBinder::serve) mounts all five at once.
//!
//! # Example
//!
//! ```rust
//! use acton_resource::binder::{ResourceBinder, ServeOptions};
//! use acton_resource::events::{EventKind, ResourceEvent};
//! use acton_resource::handlers::{ApiError, RequestInfo};
//! use acton_resource::store::{Document, InMemoryModel};
//! use axum::Router;
//! use serde_json::Value;
//!
//! let binder = ResourceBinder::builder()
//!     .model(InMemoryModel::new("Item").required(["name"]))
//!     .page_size(20)
//!     .base_url("https://api.example.com")
//!     .projection(|_req: &RequestInfo, mut doc: Document| -> Result<Value, ApiError> {
//!         doc.remove("internal_notes");
//!         Ok(doc.into_value())
//!     })
//!     .listener(EventKind::Insert, |event: &ResourceEvent| {
//!         tracing::info!(payload = %event.payload, "Item created");
//!     })
//!     .build()
//!     .unwrap();
//!
//! let app: Router = binder.serve("/items", Router::new(), ServeOptions::default());
//! ```

mod handler;
mod serve;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use crate::config::ResourceConfig;
use crate::error::{Error, Result};
use crate::events::{EventBus, EventKind, Listener};
use crate::hooks::{BeforeSave, IdentityProjection, Projection, RequestFilter};
use crate::store::{Model, Populate};

pub use handler::ResourceHandler;
pub use serve::{Middleware, ServeOptions};

/// Projection per operation; removal sends the stored document as is
#[derive(Clone)]
struct Projections {
    list: Arc<dyn Projection>,
    detail: Arc<dyn Projection>,
    insert: Arc<dyn Projection>,
    update: Arc<dyn Projection>,
}

impl Default for Projections {
    fn default() -> Self {
        let identity: Arc<dyn Projection> = Arc::new(IdentityProjection);
        Self {
            list: identity.clone(),
            detail: identity.clone(),
            insert: identity.clone(),
            update: identity,
        }
    }
}

/// Per-operation overrides of the binder configuration
///
/// Unset fields fall back to the binder's values. `before_save` hooks are
/// appended after the binder-level hooks.
///
/// ```rust
/// use acton_resource::binder::OperationOptions;
/// use acton_resource::handlers::RequestInfo;
/// use acton_resource::store::{FilterCondition, Predicate};
///
/// let options = OperationOptions::new()
///     .page_size(10)
///     .filter(|_req: &RequestInfo| Predicate::from(FilterCondition::eq("published", true)));
/// ```
#[derive(Clone, Default)]
pub struct OperationOptions {
    page_size: Option<u64>,
    base_url: Option<String>,
    projection: Option<Arc<dyn Projection>>,
    filter: Option<Arc<dyn RequestFilter>>,
    populates: Option<Vec<Populate>>,
    before_save: Vec<Arc<dyn BeforeSave>>,
}

impl OperationOptions {
    /// No overrides
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the page size (list only)
    #[must_use]
    pub fn page_size(mut self, page_size: u64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Override the `Link` base URL (list only)
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Override this operation's projection (remove has none)
    #[must_use]
    pub fn projection(mut self, projection: impl Projection) -> Self {
        self.projection = Some(Arc::new(projection));
        self
    }

    /// Override the request filter
    #[must_use]
    pub fn filter(mut self, filter: impl RequestFilter) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Replace the populate directives
    #[must_use]
    pub fn populates(mut self, populates: Vec<Populate>) -> Self {
        self.populates = Some(populates);
        self
    }

    /// Run `hook` after the binder-level hooks (insert and update)
    #[must_use]
    pub fn before_save(mut self, hook: impl BeforeSave) -> Self {
        self.before_save.push(Arc::new(hook));
        self
    }
}

/// Binder configuration with one operation's overrides applied
#[derive(Clone)]
pub(crate) struct Resolved {
    pub page_size: u64,
    pub base_url: String,
    pub projection: Arc<dyn Projection>,
    pub filter: Option<Arc<dyn RequestFilter>>,
    pub populates: Vec<Populate>,
    pub before_save: Vec<Arc<dyn BeforeSave>>,
    pub body_limit: usize,
}

struct Inner<M> {
    model: Arc<M>,
    page_size: u64,
    base_url: String,
    body_limit: usize,
    projections: Projections,
    filter: Option<Arc<dyn RequestFilter>>,
    populates: Vec<Populate>,
    before_save: Vec<Arc<dyn BeforeSave>>,
    events: Arc<EventBus>,
}

/// A model bound to REST handlers
///
/// Cheap to clone; configuration and listeners are fixed once built.
pub struct ResourceBinder<M: Model> {
    inner: Arc<Inner<M>>,
}

impl<M: Model> Clone for ResourceBinder<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Model> std::fmt::Debug for ResourceBinder<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceBinder")
            .field("model", &self.inner.model.name())
            .field("page_size", &self.inner.page_size)
            .field("base_url", &self.inner.base_url)
            .field("populates", &self.inner.populates)
            .field("before_save", &self.inner.before_save.len())
            .field("events", &self.inner.events)
            .finish()
    }
}

impl<M: Model> ResourceBinder<M> {
    /// Start configuring a binder
    pub fn builder() -> ResourceBinderBuilder<M> {
        ResourceBinderBuilder::new()
    }

    /// The bound model
    pub fn model(&self) -> &Arc<M> {
        &self.inner.model
    }

    /// Configured page size
    pub fn page_size(&self) -> u64 {
        self.inner.page_size
    }

    /// Configured `Link` base URL
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// Paginated list handler
    pub fn query(&self, options: OperationOptions) -> ResourceHandler {
        let resolved = self.resolve(&options, &self.inner.projections.list);
        handler::query(self.inner.model.clone(), self.inner.events.clone(), resolved)
    }

    /// Fetch-by-id handler
    pub fn detail(&self, options: OperationOptions) -> ResourceHandler {
        let resolved = self.resolve(&options, &self.inner.projections.detail);
        handler::detail(self.inner.model.clone(), self.inner.events.clone(), resolved)
    }

    /// Create handler
    pub fn insert(&self, options: OperationOptions) -> ResourceHandler {
        let resolved = self.resolve(&options, &self.inner.projections.insert);
        handler::insert(self.inner.model.clone(), self.inner.events.clone(), resolved)
    }

    /// Modify-by-id handler
    pub fn update(&self, options: OperationOptions) -> ResourceHandler {
        let resolved = self.resolve(&options, &self.inner.projections.update);
        handler::update(self.inner.model.clone(), self.inner.events.clone(), resolved)
    }

    /// Delete-by-id handler
    ///
    /// Responds with the deleted document as it was stored, then emits the
    /// `remove` event. No projection applies, so
    /// [`OperationOptions::projection`] is ignored here.
    pub fn remove(&self, options: OperationOptions) -> ResourceHandler {
        let unprojected: Arc<dyn Projection> = Arc::new(IdentityProjection);
        let resolved = self.resolve(&options, &unprojected);
        handler::remove(self.inner.model.clone(), self.inner.events.clone(), resolved)
    }

    fn resolve(&self, options: &OperationOptions, projection: &Arc<dyn Projection>) -> Resolved {
        let inner = &self.inner;
        let mut before_save = inner.before_save.clone();
        before_save.extend(options.before_save.iter().cloned());

        Resolved {
            page_size: options.page_size.unwrap_or(inner.page_size).max(1),
            base_url: options
                .base_url
                .clone()
                .unwrap_or_else(|| inner.base_url.clone()),
            projection: options
                .projection
                .clone()
                .unwrap_or_else(|| projection.clone()),
            filter: options.filter.clone().or_else(|| inner.filter.clone()),
            populates: options
                .populates
                .clone()
                .unwrap_or_else(|| inner.populates.clone()),
            before_save,
            body_limit: inner.body_limit,
        }
    }
}

/// Builder for [`ResourceBinder`]
pub struct ResourceBinderBuilder<M: Model> {
    model: Option<Arc<M>>,
    page_size: u64,
    base_url: String,
    body_limit: usize,
    projections: Projections,
    filter: Option<Arc<dyn RequestFilter>>,
    populates: Vec<Populate>,
    before_save: Vec<Arc<dyn BeforeSave>>,
    events: EventBus,
}

impl<M: Model> Default for ResourceBinderBuilder<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> ResourceBinderBuilder<M> {
    /// Builder with default configuration and no model
    pub fn new() -> Self {
        let defaults = ResourceConfig::default();
        Self {
            model: None,
            page_size: defaults.page_size,
            base_url: defaults.base_url,
            body_limit: defaults.body_limit_bytes,
            projections: Projections::default(),
            filter: None,
            populates: Vec::new(),
            before_save: Vec::new(),
            events: EventBus::new(),
        }
    }

    /// The model to bind (required)
    #[must_use]
    pub fn model(self, model: M) -> Self {
        self.shared_model(Arc::new(model))
    }

    /// Bind a model that is also used elsewhere
    #[must_use]
    pub fn shared_model(mut self, model: Arc<M>) -> Self {
        self.model = Some(model);
        self
    }

    /// Apply page size, base URL and body limit from configuration
    #[must_use]
    pub fn config(mut self, config: &ResourceConfig) -> Self {
        self.page_size = config.page_size;
        self.base_url = config.base_url.clone();
        self.body_limit = config.body_limit_bytes;
        self
    }

    /// Documents per list page
    #[must_use]
    pub fn page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Prefix for `Link` URLs
    #[must_use]
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Largest accepted request body, in bytes
    #[must_use]
    pub fn body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// Use `projection` for list, detail, insert and update
    #[must_use]
    pub fn projection(mut self, projection: impl Projection) -> Self {
        let projection: Arc<dyn Projection> = Arc::new(projection);
        self.projections = Projections {
            list: projection.clone(),
            detail: projection.clone(),
            insert: projection.clone(),
            update: projection,
        };
        self
    }

    /// Projection for list rows
    #[must_use]
    pub fn list_projection(mut self, projection: impl Projection) -> Self {
        self.projections.list = Arc::new(projection);
        self
    }

    /// Projection for detail responses
    #[must_use]
    pub fn detail_projection(mut self, projection: impl Projection) -> Self {
        self.projections.detail = Arc::new(projection);
        self
    }

    /// Projection for insert responses
    #[must_use]
    pub fn insert_projection(mut self, projection: impl Projection) -> Self {
        self.projections.insert = Arc::new(projection);
        self
    }

    /// Projection for update responses
    #[must_use]
    pub fn update_projection(mut self, projection: impl Projection) -> Self {
        self.projections.update = Arc::new(projection);
        self
    }

    /// Extra conditions derived from each request
    #[must_use]
    pub fn filter(mut self, filter: impl RequestFilter) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Expand a reference field; replaces an earlier directive for the same path
    #[must_use]
    pub fn populate(mut self, populate: Populate) -> Self {
        match self.populates.iter_mut().find(|p| p.path == populate.path) {
            Some(existing) => *existing = populate,
            None => self.populates.push(populate),
        }
        self
    }

    /// Hook run before every save, in registration order
    #[must_use]
    pub fn before_save(mut self, hook: impl BeforeSave) -> Self {
        self.before_save.push(Arc::new(hook));
        self
    }

    /// Listen to `kind` events
    #[must_use]
    pub fn listener(mut self, kind: EventKind, listener: impl Listener) -> Self {
        self.events.subscribe(kind, listener);
        self
    }

    /// Finish configuration
    ///
    /// Fails with [`Error::MissingModel`] when no model was given.
    pub fn build(self) -> Result<ResourceBinder<M>> {
        let model = self.model.ok_or(Error::MissingModel)?;
        if self.page_size == 0 {
            return Err(Error::InvalidConfig(
                "page_size must be at least 1".to_string(),
            ));
        }

        tracing::debug!(
            model = model.name(),
            page_size = self.page_size,
            base_url = %self.base_url,
            populates = self.populates.len(),
            before_save = self.before_save.len(),
            "Resource binder built"
        );

        Ok(ResourceBinder {
            inner: Arc::new(Inner {
                model,
                page_size: self.page_size,
                base_url: self.base_url,
                body_limit: self.body_limit,
                projections: self.projections,
                filter: self.filter,
                populates: self.populates,
                before_save: self.before_save,
                events: Arc::new(self.events),
            }),
        })
    }
}
