//! Per-operation request handlers
//!
//! Each factory parses the inbound request into the pipeline input, runs the
//! operation's pipeline and renders either the [`Responded`] value or the
//! [`ApiError`]. Parsing failures answer before the pipeline starts, so a
//! malformed query string never reaches the store.

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use serde_json::Value;
use tower::Service;

use super::serve::Middleware;
use super::Resolved;
use crate::events::{EventBus, EventKind};
use crate::handlers::{parse_select, ApiError, ApiOperation, ListParams, RequestInfo, SELECT_PARAM};
use crate::pipeline::{
    ApplyBody, Delete, Emit, ExecuteQuery, Exchange, FindOne, Instantiate, Paginate, Persist,
    Pipeline, Project, ProjectEach, RequireFound, Respond, Responded, RunHooks, SetLocation,
    StepExt, TakeBody,
};
use crate::store::{FilterCondition, Model, Query, ID_FIELD};

type HandlerFn = dyn Fn(Request<Body>) -> BoxFuture<'static, Response> + Send + Sync;

/// A bound operation, usable as a `tower::Service` on any axum route
///
/// ```rust
/// use acton_resource::binder::{OperationOptions, ResourceBinder};
/// use acton_resource::store::InMemoryModel;
/// use axum::routing::get_service;
/// use axum::Router;
///
/// let binder = ResourceBinder::builder()
///     .model(InMemoryModel::new("Item"))
///     .build()
///     .unwrap();
///
/// let app: Router = Router::new()
///     .route("/catalog", get_service(binder.query(OperationOptions::new().page_size(10))));
/// ```
#[derive(Clone)]
pub struct ResourceHandler {
    operation: ApiOperation,
    handler: Arc<HandlerFn>,
    before: Vec<Arc<dyn Middleware>>,
}

impl std::fmt::Debug for ResourceHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHandler")
            .field("operation", &self.operation)
            .field("before", &self.before.len())
            .finish()
    }
}

impl ResourceHandler {
    fn from_fn<F, Fut>(operation: ApiOperation, f: F) -> Self
    where
        F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self {
            operation,
            handler: Arc::new(move |req: Request<Body>| -> BoxFuture<'static, Response> {
                Box::pin(f(req))
            }),
            before: Vec::new(),
        }
    }

    /// The operation this handler performs
    pub fn operation(&self) -> ApiOperation {
        self.operation
    }

    /// Run `middleware` before the handler; it may answer early
    #[must_use]
    pub fn before(mut self, middleware: impl Middleware) -> Self {
        self.before.push(Arc::new(middleware));
        self
    }

    pub(crate) fn with_before(mut self, middleware: &[Arc<dyn Middleware>]) -> Self {
        self.before.extend(middleware.iter().cloned());
        self
    }

    /// Handle one request
    pub async fn handle(&self, mut req: Request<Body>) -> Response {
        for middleware in &self.before {
            match middleware.handle(req).await {
                Ok(next) => req = next,
                Err(response) => {
                    tracing::debug!(
                        operation = %self.operation,
                        status = %response.status(),
                        "Request answered by middleware"
                    );
                    return response;
                }
            }
        }
        (self.handler)(req).await
    }
}

impl Service<Request<Body>> for ResourceHandler {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let handler = self.clone();
        Box::pin(async move { Ok(handler.handle(req).await) })
    }
}

fn render(result: Result<Responded, ApiError>) -> Response {
    match result {
        Ok(responded) => responded.response.into_response(),
        Err(error) => error.into_response(),
    }
}

async fn path_id(parts: &mut Parts, operation: ApiOperation) -> Result<String, ApiError> {
    let Path(params) = Path::<HashMap<String, String>>::from_request_parts(parts, &())
        .await
        .map_err(|rejection| {
            tracing::debug!(error = %rejection, "Path parameters unavailable");
            ApiError::bad_request(operation, "Missing id path parameter")
        })?;

    params
        .get("id")
        .cloned()
        .ok_or_else(|| ApiError::bad_request(operation, "Missing id path parameter"))
}

async fn read_body(
    body: Body,
    limit: usize,
    operation: ApiOperation,
) -> Result<Option<Value>, ApiError> {
    let bytes = axum::body::to_bytes(body, limit).await.map_err(|e| {
        tracing::debug!(error = %e, limit, "Failed to read request body");
        ApiError::bad_request(operation, "Request body could not be read")
    })?;

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| {
            ApiError::bad_request(operation, format!("Request body is not valid JSON: {}", e))
        })
}

fn by_id(id: &str, resolved: &Resolved, req: &RequestInfo) -> Query {
    let query = Query::new().where_(FilterCondition::eq(ID_FIELD, id));
    match &resolved.filter {
        Some(filter) => query.filter(filter.filter(req)),
        None => query,
    }
}

fn log_request(operation: ApiOperation, req: &RequestInfo) {
    tracing::debug!(
        operation = %operation,
        method = %req.method,
        path = %req.path(),
        id = ?req.id,
        "Handling resource request"
    );
}

pub(crate) fn query<M: Model>(
    model: Arc<M>,
    events: Arc<EventBus>,
    resolved: Resolved,
) -> ResourceHandler {
    let pipeline: Pipeline<Query, Responded> = Pipeline::new(
        "query",
        ExecuteQuery::new(model)
            .then(Paginate::new(resolved.page_size, resolved.base_url.clone()))
            .then(ProjectEach::new(resolved.projection.clone()))
            .then(Emit::new(events, EventKind::Query))
            .then(Respond::ok()),
    );
    let resolved = Arc::new(resolved);

    ResourceHandler::from_fn(ApiOperation::List, move |req| {
        let pipeline = pipeline.clone();
        let resolved = resolved.clone();
        async move {
            let (parts, _body) = req.into_parts();
            let info = RequestInfo::from_parts(&parts, None);
            log_request(ApiOperation::List, &info);

            let params = match ListParams::from_pairs(info.query_pairs()) {
                Ok(params) => params,
                Err(e) => return e.into_api_error(ApiOperation::List).into_response(),
            };

            let page_size = resolved.page_size;
            let mut query = Query::new()
                .filter(params.predicate)
                .sort(params.sort)
                .select(params.selection)
                .skip(page_size.saturating_mul(params.page))
                .limit(page_size.saturating_add(1));
            if let Some(filter) = &resolved.filter {
                query = query.filter(filter.filter(&info));
            }
            for populate in &resolved.populates {
                query = query.populate(populate.clone());
            }

            let mut exchange = Exchange::new(info).with_page(params.page);
            render(pipeline.run(&mut exchange, query).await)
        }
    })
}

pub(crate) fn detail<M: Model>(
    model: Arc<M>,
    events: Arc<EventBus>,
    resolved: Resolved,
) -> ResourceHandler {
    let entity_type = model.name().to_string();
    let pipeline: Pipeline<Query, Responded> = Pipeline::new(
        "detail",
        FindOne::new(model, ApiOperation::Detail)
            .then(RequireFound::new(entity_type, ApiOperation::Detail))
            .then(Project::new(resolved.projection.clone()))
            .then(Emit::new(events, EventKind::Detail))
            .then(Respond::ok()),
    );
    let resolved = Arc::new(resolved);

    ResourceHandler::from_fn(ApiOperation::Detail, move |req| {
        let pipeline = pipeline.clone();
        let resolved = resolved.clone();
        async move {
            let (mut parts, _body) = req.into_parts();
            let id = match path_id(&mut parts, ApiOperation::Detail).await {
                Ok(id) => id,
                Err(e) => return e.into_response(),
            };
            let info = RequestInfo::from_parts(&parts, Some(id.clone()));
            log_request(ApiOperation::Detail, &info);

            let selection = match info.query_param(SELECT_PARAM).map(parse_select).transpose() {
                Ok(selection) => selection.unwrap_or_default(),
                Err(e) => return e.into_api_error(ApiOperation::Detail).into_response(),
            };

            let mut query = by_id(&id, &resolved, &info).select(selection);
            for populate in &resolved.populates {
                query = query.populate(populate.clone());
            }

            let mut exchange = Exchange::new(info);
            render(pipeline.run(&mut exchange, query).await)
        }
    })
}

pub(crate) fn insert<M: Model>(
    model: Arc<M>,
    events: Arc<EventBus>,
    resolved: Resolved,
) -> ResourceHandler {
    let pipeline: Pipeline<(), Responded> = Pipeline::new(
        "insert",
        TakeBody::new(ApiOperation::Insert)
            .then(Instantiate::new(model.clone()))
            .then(RunHooks::new(resolved.before_save.clone()))
            .then(Persist::new(model, ApiOperation::Insert))
            .then(SetLocation)
            .then(Project::new(resolved.projection.clone()))
            .then(Emit::new(events, EventKind::Insert))
            .then(Respond::created()),
    );
    let body_limit = resolved.body_limit;

    ResourceHandler::from_fn(ApiOperation::Insert, move |req| {
        let pipeline = pipeline.clone();
        async move {
            let (parts, body) = req.into_parts();
            let info = RequestInfo::from_parts(&parts, None);
            log_request(ApiOperation::Insert, &info);

            let body = match read_body(body, body_limit, ApiOperation::Insert).await {
                Ok(body) => body,
                Err(e) => return e.into_response(),
            };

            let mut exchange = Exchange::new(info).with_body(body);
            render(pipeline.run(&mut exchange, ()).await)
        }
    })
}

pub(crate) fn update<M: Model>(
    model: Arc<M>,
    events: Arc<EventBus>,
    resolved: Resolved,
) -> ResourceHandler {
    let entity_type = model.name().to_string();
    let pipeline: Pipeline<Query, Responded> = Pipeline::new(
        "update",
        FindOne::new(model.clone(), ApiOperation::Update)
            .then(RequireFound::new(entity_type, ApiOperation::Update))
            .then(ApplyBody)
            .then(RunHooks::new(resolved.before_save.clone()))
            .then(Persist::new(model, ApiOperation::Update))
            .then(SetLocation)
            .then(Project::new(resolved.projection.clone()))
            .then(Emit::new(events, EventKind::Update))
            .then(Respond::ok()),
    );
    let resolved = Arc::new(resolved);

    ResourceHandler::from_fn(ApiOperation::Update, move |req| {
        let pipeline = pipeline.clone();
        let resolved = resolved.clone();
        async move {
            let (mut parts, body) = req.into_parts();
            let id = match path_id(&mut parts, ApiOperation::Update).await {
                Ok(id) => id,
                Err(e) => return e.into_response(),
            };
            let info = RequestInfo::from_parts(&parts, Some(id.clone()));
            log_request(ApiOperation::Update, &info);

            // unreadable bodies surface as invalid content once the document is found
            let body = read_body(body, resolved.body_limit, ApiOperation::Update)
                .await
                .unwrap_or_else(|e| {
                    tracing::debug!(error = %e.message, "Discarding update body");
                    None
                });

            let query = by_id(&id, &resolved, &info);
            let mut exchange = Exchange::new(info).with_body(body);
            render(pipeline.run(&mut exchange, query).await)
        }
    })
}

pub(crate) fn remove<M: Model>(
    model: Arc<M>,
    events: Arc<EventBus>,
    resolved: Resolved,
) -> ResourceHandler {
    let entity_type = model.name().to_string();
    let pipeline: Pipeline<Query, Responded> = Pipeline::new(
        "remove",
        FindOne::new(model.clone(), ApiOperation::Remove)
            .then(RequireFound::new(entity_type, ApiOperation::Remove))
            .then(Delete::new(model))
            .then(Respond::ok())
            .then(Emit::new(events, EventKind::Remove)),
    );
    let resolved = Arc::new(resolved);

    ResourceHandler::from_fn(ApiOperation::Remove, move |req| {
        let pipeline = pipeline.clone();
        let resolved = resolved.clone();
        async move {
            let (mut parts, _body) = req.into_parts();
            let id = match path_id(&mut parts, ApiOperation::Remove).await {
                Ok(id) => id,
                Err(e) => return e.into_response(),
            };
            let info = RequestInfo::from_parts(&parts, Some(id.clone()));
            log_request(ApiOperation::Remove, &info);

            let query = by_id(&id, &resolved, &info);
            let mut exchange = Exchange::new(info);
            render(pipeline.run(&mut exchange, query).await)
        }
    })
}
