//! The steps resource handlers are built from

use std::sync::Arc;

use axum::http::{header, StatusCode};
use futures::future::{self, BoxFuture};
use futures::FutureExt;
use serde_json::{Map, Value};

use super::{Exchange, Step};
use crate::events::{EventBus, EventKind, ResourceEvent};
use crate::handlers::{ApiError, ApiOperation, PageLinks, ResourceResponse};
use crate::hooks::{BeforeSave, Projection};
use crate::store::{Document, Model, Query};

/// Runs a multi-document query
pub struct ExecuteQuery<M> {
    model: Arc<M>,
}

impl<M: Model> ExecuteQuery<M> {
    /// Query against `model`
    pub fn new(model: Arc<M>) -> Self {
        Self { model }
    }
}

impl<M: Model> Step<Query> for ExecuteQuery<M> {
    type Output = Vec<Document>;

    fn name(&self) -> &'static str {
        "execute_query"
    }

    fn run<'a>(
        &'a self,
        _exchange: &'a mut Exchange,
        query: Query,
    ) -> BoxFuture<'a, Result<Vec<Document>, ApiError>> {
        async move {
            self.model
                .find(&query)
                .await
                .map_err(|e| ApiError::from(e).with_operation(ApiOperation::List))
        }
        .boxed()
    }
}

/// Runs a single-document query
pub struct FindOne<M> {
    model: Arc<M>,
    operation: ApiOperation,
}

impl<M: Model> FindOne<M> {
    /// Lookup for `operation`
    pub fn new(model: Arc<M>, operation: ApiOperation) -> Self {
        Self { model, operation }
    }
}

impl<M: Model> Step<Query> for FindOne<M> {
    type Output = Option<Document>;

    fn name(&self) -> &'static str {
        "find_one"
    }

    fn run<'a>(
        &'a self,
        _exchange: &'a mut Exchange,
        query: Query,
    ) -> BoxFuture<'a, Result<Option<Document>, ApiError>> {
        async move {
            self.model
                .find_one(&query)
                .await
                .map_err(|e| ApiError::from(e).with_operation(self.operation))
        }
        .boxed()
    }
}

/// Turns a missing document into "resource not found" carrying the requested id
pub struct RequireFound {
    entity_type: String,
    operation: ApiOperation,
}

impl RequireFound {
    /// Not-found check for `entity_type`
    pub fn new(entity_type: impl Into<String>, operation: ApiOperation) -> Self {
        Self {
            entity_type: entity_type.into(),
            operation,
        }
    }
}

impl Step<Option<Document>> for RequireFound {
    type Output = Document;

    fn name(&self) -> &'static str {
        "require_found"
    }

    fn run<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        found: Option<Document>,
    ) -> BoxFuture<'a, Result<Document, ApiError>> {
        let result = found.ok_or_else(|| {
            ApiError::not_found(
                self.operation,
                self.entity_type.clone(),
                exchange.request.id.clone().unwrap_or_default(),
            )
        });
        future::ready(result).boxed()
    }
}

/// Drops the look-ahead row and sets the `Link` header
pub struct Paginate {
    page_size: u64,
    base_url: String,
}

impl Paginate {
    /// Pages of `page_size` documents, links rooted at `base_url`
    pub fn new(page_size: u64, base_url: impl Into<String>) -> Self {
        Self {
            page_size,
            base_url: base_url.into(),
        }
    }
}

impl Step<Vec<Document>> for Paginate {
    type Output = Vec<Document>;

    fn name(&self) -> &'static str {
        "paginate"
    }

    fn run<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        mut rows: Vec<Document>,
    ) -> BoxFuture<'a, Result<Vec<Document>, ApiError>> {
        let page_size = usize::try_from(self.page_size).unwrap_or(usize::MAX);
        let has_next = rows.len() > page_size;
        rows.truncate(page_size);

        let result = PageLinks::build(&self.base_url, &exchange.request, exchange.page, has_next)
            .and_then(|links| links.to_header_value())
            .map(|value| {
                exchange.headers.insert(header::LINK, value);
                rows
            });
        future::ready(result).boxed()
    }
}

/// Projects every row concurrently, keeping order
pub struct ProjectEach {
    projection: Arc<dyn Projection>,
}

impl ProjectEach {
    /// Apply `projection` to each row
    pub fn new(projection: Arc<dyn Projection>) -> Self {
        Self { projection }
    }
}

impl Step<Vec<Document>> for ProjectEach {
    type Output = Vec<Value>;

    fn name(&self) -> &'static str {
        "project_each"
    }

    fn run<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        rows: Vec<Document>,
    ) -> BoxFuture<'a, Result<Vec<Value>, ApiError>> {
        let request = &exchange.request;
        future::try_join_all(
            rows.into_iter()
                .map(|row| self.projection.project(request, row)),
        )
        .boxed()
    }
}

/// Projects a single document
pub struct Project {
    projection: Arc<dyn Projection>,
}

impl Project {
    /// Apply `projection`
    pub fn new(projection: Arc<dyn Projection>) -> Self {
        Self { projection }
    }
}

impl Step<Document> for Project {
    type Output = Value;

    fn name(&self) -> &'static str {
        "project"
    }

    fn run<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        document: Document,
    ) -> BoxFuture<'a, Result<Value, ApiError>> {
        self.projection.project(&exchange.request, document)
    }
}

/// Takes the request body as a JSON object
pub struct TakeBody {
    operation: ApiOperation,
}

impl TakeBody {
    /// Body reader for `operation`
    pub fn new(operation: ApiOperation) -> Self {
        Self { operation }
    }
}

impl Step<()> for TakeBody {
    type Output = Map<String, Value>;

    fn name(&self) -> &'static str {
        "take_body"
    }

    fn run<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        _input: (),
    ) -> BoxFuture<'a, Result<Map<String, Value>, ApiError>> {
        let result = match exchange.body.take() {
            Some(Value::Object(fields)) => Ok(fields),
            Some(_) => Err(ApiError::bad_request(
                self.operation,
                "Request body must be a JSON object",
            )),
            None => Err(ApiError::bad_request(self.operation, "Request body is required")),
        };
        future::ready(result).boxed()
    }
}

/// Builds a new unsaved document
pub struct Instantiate<M> {
    model: Arc<M>,
}

impl<M: Model> Instantiate<M> {
    /// Instantiate documents of `model`
    pub fn new(model: Arc<M>) -> Self {
        Self { model }
    }
}

impl<M: Model> Step<Map<String, Value>> for Instantiate<M> {
    type Output = Document;

    fn name(&self) -> &'static str {
        "instantiate"
    }

    fn run<'a>(
        &'a self,
        _exchange: &'a mut Exchange,
        fields: Map<String, Value>,
    ) -> BoxFuture<'a, Result<Document, ApiError>> {
        let result = self
            .model
            .instantiate(fields)
            .map_err(|e| ApiError::from(e).with_operation(ApiOperation::Insert));
        future::ready(result).boxed()
    }
}

/// Copies the request body onto a loaded document
pub struct ApplyBody;

impl Step<Document> for ApplyBody {
    type Output = Document;

    fn name(&self) -> &'static str {
        "apply_body"
    }

    fn run<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        mut document: Document,
    ) -> BoxFuture<'a, Result<Document, ApiError>> {
        let result = match exchange.body.take() {
            Some(Value::Object(fields)) => {
                document.set(&fields);
                Ok(document)
            }
            _ => Err(ApiError::invalid_content(ApiOperation::Update)),
        };
        future::ready(result).boxed()
    }
}

/// Runs before-save hooks in order
pub struct RunHooks {
    hooks: Vec<Arc<dyn BeforeSave>>,
}

impl RunHooks {
    /// Hooks run first to last
    pub fn new(hooks: Vec<Arc<dyn BeforeSave>>) -> Self {
        Self { hooks }
    }
}

impl Step<Document> for RunHooks {
    type Output = Document;

    fn name(&self) -> &'static str {
        "run_hooks"
    }

    fn run<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        mut document: Document,
    ) -> BoxFuture<'a, Result<Document, ApiError>> {
        async move {
            for hook in &self.hooks {
                hook.before_save(&exchange.request, &mut document).await?;
            }
            Ok(document)
        }
        .boxed()
    }
}

/// Saves a document; validation failures become structured client errors
pub struct Persist<M> {
    model: Arc<M>,
    operation: ApiOperation,
}

impl<M: Model> Persist<M> {
    /// Save through `model`
    pub fn new(model: Arc<M>, operation: ApiOperation) -> Self {
        Self { model, operation }
    }
}

impl<M: Model> Step<Document> for Persist<M> {
    type Output = Document;

    fn name(&self) -> &'static str {
        "persist"
    }

    fn run<'a>(
        &'a self,
        _exchange: &'a mut Exchange,
        document: Document,
    ) -> BoxFuture<'a, Result<Document, ApiError>> {
        async move {
            self.model
                .save(document)
                .await
                .map_err(|e| ApiError::from(e).with_operation(self.operation))
        }
        .boxed()
    }
}

/// Sets `Location` to the document's URL
///
/// The request path is reused when it already ends in the id (update);
/// otherwise the id is appended (insert).
pub struct SetLocation;

impl Step<Document> for SetLocation {
    type Output = Document;

    fn name(&self) -> &'static str {
        "set_location"
    }

    fn run<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        document: Document,
    ) -> BoxFuture<'a, Result<Document, ApiError>> {
        if let Some(id) = document.id() {
            let path = exchange.request.path();
            let location = if exchange.request.id.as_deref() == Some(id.as_str())
                && path.ends_with(&format!("/{}", id))
            {
                path.to_string()
            } else {
                format!("{}/{}", path.trim_end_matches('/'), id)
            };
            match location.parse() {
                Ok(value) => {
                    exchange.headers.insert(header::LOCATION, value);
                }
                Err(_) => tracing::warn!(location = %location, "Skipping invalid Location header"),
            }
        }
        future::ready(Ok(document)).boxed()
    }
}

/// Deletes a loaded document, passing its last known state on
pub struct Delete<M> {
    model: Arc<M>,
}

impl<M: Model> Delete<M> {
    /// Delete through `model`
    pub fn new(model: Arc<M>) -> Self {
        Self { model }
    }
}

impl<M: Model> Step<Document> for Delete<M> {
    type Output = Document;

    fn name(&self) -> &'static str {
        "delete"
    }

    fn run<'a>(
        &'a self,
        _exchange: &'a mut Exchange,
        document: Document,
    ) -> BoxFuture<'a, Result<Document, ApiError>> {
        async move {
            self.model
                .remove(&document)
                .await
                .map_err(|e| ApiError::from(e).with_operation(ApiOperation::Remove))?;
            Ok(document)
        }
        .boxed()
    }
}

/// Values that can be published as event payloads
pub trait EventPayload: Send + 'static {
    /// JSON handed to listeners
    fn payload(&self) -> Value;
}

impl EventPayload for Value {
    fn payload(&self) -> Value {
        self.clone()
    }
}

impl EventPayload for Vec<Value> {
    fn payload(&self) -> Value {
        Value::Array(self.clone())
    }
}

impl EventPayload for Responded {
    fn payload(&self) -> Value {
        self.response.body.clone()
    }
}

/// Notifies listeners and passes the value through untouched
pub struct Emit {
    bus: Arc<EventBus>,
    kind: EventKind,
}

impl Emit {
    /// Emit `kind` events on `bus`
    pub fn new(bus: Arc<EventBus>, kind: EventKind) -> Self {
        Self { bus, kind }
    }
}

impl<In: EventPayload> Step<In> for Emit {
    type Output = In;

    fn name(&self) -> &'static str {
        "emit"
    }

    fn run<'a>(
        &'a self,
        _exchange: &'a mut Exchange,
        input: In,
    ) -> BoxFuture<'a, Result<In, ApiError>> {
        self.bus.emit(&ResourceEvent::new(self.kind, input.payload()));
        future::ready(Ok(input)).boxed()
    }
}

/// Final pipeline output: the response to send
#[derive(Debug, Clone)]
pub struct Responded {
    /// Response with headers collected along the pipeline
    pub response: ResourceResponse,
}

/// Writes the body with the headers collected so far
pub struct Respond {
    status: StatusCode,
}

impl Respond {
    /// 200 OK
    pub fn ok() -> Self {
        Self {
            status: StatusCode::OK,
        }
    }

    /// 201 Created
    pub fn created() -> Self {
        Self {
            status: StatusCode::CREATED,
        }
    }
}

impl<In> Step<In> for Respond
where
    In: Into<Value> + Send + 'static,
{
    type Output = Responded;

    fn name(&self) -> &'static str {
        "respond"
    }

    fn run<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        input: In,
    ) -> BoxFuture<'a, Result<Responded, ApiError>> {
        let response = ResourceResponse::with_status(self.status, input.into())
            .with_headers(std::mem::take(&mut exchange.headers));
        future::ready(Ok(Responded { response })).boxed()
    }
}
