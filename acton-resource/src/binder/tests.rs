use std::sync::{Arc, Mutex};

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get_service, post_service};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::{OperationOptions, ResourceBinder, ServeOptions};
use crate::events::{EventKind, ResourceEvent};
use crate::handlers::{ApiError, ApiErrorResponse, ApiOperation, RequestInfo};
use crate::store::{
    Document, FieldError, InMemoryModel, Model, Query, Selection, StoreError, StoreErrorKind,
    StoreOperation, StoreResult,
};

fn numbered(n: usize) -> Arc<InMemoryModel> {
    Arc::new(
        InMemoryModel::new("Item")
            .required(["name"])
            .with_documents(
                (0..n)
                    .map(|i| json!({ "name": format!("item-{}", i), "n": i }))
                    .collect(),
            ),
    )
}

fn binder(model: Arc<InMemoryModel>) -> ResourceBinder<InMemoryModel> {
    ResourceBinder::builder()
        .shared_model(model)
        .build()
        .unwrap()
}

fn app<M: Model>(binder: &ResourceBinder<M>) -> Router {
    binder.serve("/items", Router::new(), ServeOptions::default())
}

fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, headers, body)
}

/// In-memory store whose writes can fail and whose reads can ignore `skip`
struct FaultyModel {
    inner: Arc<InMemoryModel>,
    save: Option<StoreErrorKind>,
    remove: Option<StoreErrorKind>,
    ignore_skip: bool,
}

impl FaultyModel {
    fn new(inner: Arc<InMemoryModel>) -> Self {
        Self {
            inner,
            save: None,
            remove: None,
            ignore_skip: false,
        }
    }

    fn failing_save(mut self, kind: StoreErrorKind) -> Self {
        self.save = Some(kind);
        self
    }

    fn failing_remove(mut self, kind: StoreErrorKind) -> Self {
        self.remove = Some(kind);
        self
    }

    fn ignoring_skip(mut self) -> Self {
        self.ignore_skip = true;
        self
    }
}

impl Model for FaultyModel {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn find(&self, query: &Query) -> StoreResult<Vec<Document>> {
        let mut query = query.clone();
        if self.ignore_skip {
            query.skip = 0;
        }
        self.inner.find(&query).await
    }

    async fn find_one(&self, query: &Query) -> StoreResult<Option<Document>> {
        self.inner.find_one(query).await
    }

    async fn save(&self, document: Document) -> StoreResult<Document> {
        match self.save {
            Some(kind) => Err(StoreError::new(StoreOperation::Save, kind, "duplicate key")),
            None => self.inner.save(document).await,
        }
    }

    async fn remove(&self, document: &Document) -> StoreResult<()> {
        match self.remove {
            Some(kind) => Err(StoreError::new(StoreOperation::Remove, kind, "socket closed")),
            None => self.inner.remove(document).await,
        }
    }
}

/// Router over `model` that counts every emitted event
fn counting_app(model: FaultyModel) -> (Router, Arc<Mutex<usize>>) {
    let emitted = Arc::new(Mutex::new(0usize));
    let mut builder = ResourceBinder::builder().model(model);
    for kind in [EventKind::Insert, EventKind::Update, EventKind::Remove] {
        let emitted = emitted.clone();
        builder = builder.listener(kind, move |_: &ResourceEvent| {
            *emitted.lock().unwrap() += 1;
        });
    }
    (app(&builder.build().unwrap()), emitted)
}

fn link(headers: &axum::http::HeaderMap) -> String {
    headers
        .get(header::LINK)
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default()
}

#[test]
fn test_build_requires_model() {
    let err = ResourceBinder::<InMemoryModel>::builder().build().unwrap_err();
    assert!(matches!(err, crate::error::Error::MissingModel));
}

#[test]
fn test_build_rejects_zero_page_size() {
    let err = ResourceBinder::builder()
        .model(InMemoryModel::new("Item"))
        .page_size(0)
        .build()
        .unwrap_err();
    assert!(matches!(err, crate::error::Error::InvalidConfig(_)));
}

#[test]
fn test_config_applies_resource_defaults() {
    let config = crate::config::ResourceConfig {
        page_size: 7,
        base_url: "https://api.example.com".to_string(),
        body_limit_bytes: 64,
    };
    let binder = ResourceBinder::builder()
        .model(InMemoryModel::new("Item"))
        .config(&config)
        .build()
        .unwrap();
    assert_eq!(binder.page_size(), 7);
    assert_eq!(binder.base_url(), "https://api.example.com");
}

#[tokio::test]
async fn test_second_page_of_101() {
    let binder = binder(numbered(101));

    let (status, headers, body) = send(app(&binder), request("GET", "/items?p=1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["n"], json!(100));

    let link = link(&headers);
    assert!(link.contains("</items?p=0>; rel=\"first\""));
    assert!(link.contains("</items?p=0>; rel=\"prev\""));
    assert!(!link.contains("rel=\"next\""));
}

#[tokio::test]
async fn test_first_page_trims_lookahead_row() {
    let binder = ResourceBinder::builder()
        .shared_model(numbered(101))
        .base_url("https://api.example.com")
        .build()
        .unwrap();

    let (status, headers, body) = send(app(&binder), request("GET", "/items", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 100);

    let link = link(&headers);
    assert!(link.contains("<https://api.example.com/items?p=0>; rel=\"first\""));
    assert!(!link.contains("rel=\"prev\""));
    assert!(link.contains("<https://api.example.com/items?p=1>; rel=\"next\""));
}

#[tokio::test]
async fn test_list_filter_sort_and_select() {
    let binder = binder(numbered(10));

    let (status, _, body) = send(
        app(&binder),
        request(
            "GET",
            "/items?q=%7B%22n%22%3A%7B%22%24gte%22%3A7%7D%7D&sort=-n&select=n",
            None,
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    let ns: Vec<_> = rows.iter().map(|row| row["n"].clone()).collect();
    assert_eq!(ns, vec![json!(9), json!(8), json!(7)]);
    assert!(rows[0].get("name").is_none());
    assert!(rows[0].get("id").is_some());
}

#[tokio::test]
async fn test_malformed_filter_never_reaches_store() {
    let model = numbered(3);
    let binder = binder(model.clone());

    let (status, _, body) = send(app(&binder), request("GET", "/items?q=%7Bnot-json", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ApiErrorResponse = serde_json::from_value(body).unwrap();
    assert_eq!(error.code, "BAD_REQUEST");
    assert_eq!(error.status, 400);
    assert_eq!(error.operation.as_deref(), Some("list"));
    assert_eq!(model.calls().total(), 0);
}

#[tokio::test]
async fn test_where_operator_rejected() {
    let model = numbered(3);
    let binder = binder(model.clone());

    let (status, _, _) = send(
        app(&binder),
        request("GET", "/items?q=%7B%22%24where%22%3A%22true%22%7D", None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(model.calls().total(), 0);
}

#[tokio::test]
async fn test_request_filter_narrows_every_query() {
    let model = Arc::new(InMemoryModel::new("Item").with_documents(vec![
        json!({"id": "a", "tenant": "acme"}),
        json!({"id": "b", "tenant": "globex"}),
    ]));
    let binder = ResourceBinder::builder()
        .shared_model(model)
        .filter(|req: &RequestInfo| {
            crate::store::Predicate::from(crate::store::FilterCondition::eq(
                "tenant",
                req.header("x-tenant").unwrap_or(""),
            ))
        })
        .build()
        .unwrap();

    let mut list = request("GET", "/items", None);
    list.headers_mut().insert("x-tenant", "acme".parse().unwrap());
    let (_, _, body) = send(app(&binder), list).await;
    assert_eq!(body, json!([{"id": "a", "tenant": "acme"}]));

    let mut other = request("GET", "/items/b", None);
    other.headers_mut().insert("x-tenant", "acme".parse().unwrap());
    let (status, _, _) = send(app(&binder), other).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_detail_projects_and_selects() {
    let model = Arc::new(
        InMemoryModel::new("Item")
            .with_documents(vec![json!({"id": "a", "name": "x", "secret": 1})]),
    );
    let binder = ResourceBinder::builder()
        .shared_model(model)
        .detail_projection(|_: &RequestInfo, mut doc: Document| -> Result<Value, ApiError> {
            doc.remove("secret");
            Ok(doc.into_value())
        })
        .build()
        .unwrap();

    let (status, _, body) = send(app(&binder), request("GET", "/items/a", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"id": "a", "name": "x"}));

    let (_, _, body) = send(app(&binder), request("GET", "/items/a?select=-name", None)).await;
    assert_eq!(body, json!({"id": "a"}));
}

#[tokio::test]
async fn test_detail_populates_references() {
    let owners = Arc::new(
        InMemoryModel::new("owner")
            .with_documents(vec![json!({"id": "o1", "name": "Ada", "age": 36})]),
    );
    let model = Arc::new(
        InMemoryModel::new("Item")
            .with_relation("owner", owners)
            .with_documents(vec![json!({"id": "a", "owner": "o1"})]),
    );
    let binder = ResourceBinder::builder()
        .shared_model(model)
        .populate(crate::store::Populate::new("owner").select(Selection::include(["name"])))
        .build()
        .unwrap();

    let (status, _, body) = send(app(&binder), request("GET", "/items/a", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"id": "a", "owner": {"id": "o1", "name": "Ada"}}));
}

#[tokio::test]
async fn test_insert_sets_location_and_created() {
    let model = numbered(0);
    let binder = binder(model.clone());

    let (status, headers, body) =
        send(app(&binder), request("POST", "/items", Some(json!({"name": "a"})))).await;

    assert_eq!(status, StatusCode::CREATED);
    let id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["name"], json!("a"));
    assert_eq!(headers.get(header::LOCATION).unwrap(), format!("/items/{}", id).as_str());
    assert_eq!(model.len(), 1);
}

#[tokio::test]
async fn test_insert_ignores_client_id() {
    let binder = binder(numbered(0));

    let (_, _, body) = send(
        app(&binder),
        request("POST", "/items", Some(json!({"id": "mine", "name": "a"}))),
    )
    .await;
    assert_ne!(body["id"], json!("mine"));
}

#[tokio::test]
async fn test_insert_validation_failure_groups_fields() {
    let model = Arc::new(InMemoryModel::new("Item").required(["name", "price"]));
    let binder = binder(model.clone());

    let (status, _, body) =
        send(app(&binder), request("POST", "/items", Some(json!({"name": ""})))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ApiErrorResponse = serde_json::from_value(body).unwrap();
    assert_eq!(error.error, "Validation failed");
    assert_eq!(error.code, "VALIDATION_FAILED");
    let errors = error.errors.unwrap();
    assert_eq!(errors["name"], vec![FieldError::required("name")]);
    assert_eq!(errors["price"], vec![FieldError::required("price")]);
    assert!(model.is_empty());
}

#[tokio::test]
async fn test_insert_rejects_bad_bodies() {
    let binder = binder(numbered(0));

    let (status, _, _) = send(app(&binder), request("POST", "/items", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = send(app(&binder), request("POST", "/items", Some(json!([1, 2])))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let garbage = Request::builder()
        .method("POST")
        .uri("/items")
        .body(Body::from("{oops"))
        .unwrap();
    let (status, _, _) = send(app(&binder), garbage).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_insert_body_limit() {
    let binder = ResourceBinder::builder()
        .model(InMemoryModel::new("Item"))
        .body_limit(8)
        .build()
        .unwrap();

    let (status, _, body) = send(
        app(&binder),
        request("POST", "/items", Some(json!({"name": "far too long"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Request body could not be read"));
}

#[tokio::test]
async fn test_hooks_run_in_order_binder_first() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let hook = |tag: &'static str| {
        let order = order.clone();
        move |_: &RequestInfo, doc: &mut Document| -> Result<(), ApiError> {
            order.lock().unwrap().push(tag);
            doc.insert(tag, json!(true));
            Ok(())
        }
    };

    let model = numbered(0);
    let binder = ResourceBinder::builder()
        .shared_model(model.clone())
        .before_save(hook("first"))
        .before_save(hook("second"))
        .build()
        .unwrap();
    let router = Router::new().route(
        "/items",
        post_service(binder.insert(OperationOptions::new().before_save(hook("third")))),
    );

    let (status, _, body) =
        send(router, request("POST", "/items", Some(json!({"name": "a"})))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    assert_eq!(body["third"], json!(true));
}

#[tokio::test]
async fn test_hook_error_prevents_save() {
    let model = numbered(0);
    let binder = ResourceBinder::builder()
        .shared_model(model.clone())
        .before_save(|_: &RequestInfo, _: &mut Document| -> Result<(), ApiError> {
            Err(ApiError::bad_request(ApiOperation::Insert, "Price missing"))
        })
        .build()
        .unwrap();

    let (status, _, body) =
        send(app(&binder), request("POST", "/items", Some(json!({"name": "a"})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Price missing"));
    assert!(model.is_empty());
    assert_eq!(model.calls().save, 0);
}

#[tokio::test]
async fn test_update_applies_body() {
    let model = Arc::new(
        InMemoryModel::new("Item").with_documents(vec![json!({"id": "a", "name": "x", "n": 1})]),
    );
    let binder = binder(model.clone());

    let (status, headers, body) = send(
        app(&binder),
        request("PATCH", "/items/a", Some(json!({"n": 2, "id": "b"}))),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"id": "a", "name": "x", "n": 2}));
    assert_eq!(headers.get(header::LOCATION).unwrap(), "/items/a");
    assert_eq!(model.snapshot()[0].get("n"), Some(&json!(2)));
}

#[tokio::test]
async fn test_update_without_body_is_invalid_content() {
    let model = Arc::new(InMemoryModel::new("Item").with_documents(vec![json!({"id": "a"})]));
    let binder = binder(model.clone());

    let (status, _, body) = send(app(&binder), request("PATCH", "/items/a", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], json!("INVALID_CONTENT"));
    assert_eq!(model.calls().save, 0);
}

#[tokio::test]
async fn test_update_unknown_id_is_not_found_before_body_check() {
    let binder = binder(numbered(0));

    let (status, _, body) = send(app(&binder), request("PATCH", "/items/nope", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["entity_id"], json!("nope"));
}

#[tokio::test]
async fn test_update_validation_failure() {
    let model = Arc::new(
        InMemoryModel::new("Item")
            .required(["name"])
            .with_documents(vec![json!({"id": "a", "name": "x"})]),
    );
    let binder = binder(model.clone());

    let (status, _, body) = send(
        app(&binder),
        request("PATCH", "/items/a", Some(json!({"name": null}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"]["name"][0]["code"], json!("REQUIRED"));
    assert_eq!(model.snapshot()[0].get("name"), Some(&json!("x")));
}

#[tokio::test]
async fn test_remove_unknown_id() {
    let model = numbered(2);
    let binder = binder(model.clone());

    let (status, _, body) = send(
        app(&binder),
        request("DELETE", "/items/507f1f77bcf86cd799439011", None),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: ApiErrorResponse = serde_json::from_value(body).unwrap();
    assert_eq!(error.error, "Resource not found");
    assert_eq!(error.entity_type.as_deref(), Some("Item"));
    assert_eq!(error.entity_id.as_deref(), Some("507f1f77bcf86cd799439011"));
    assert_eq!(model.calls().remove, 0);
    assert_eq!(model.len(), 2);
}

#[tokio::test]
async fn test_remove_responds_with_deleted_document_then_emits() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let model =
        Arc::new(InMemoryModel::new("Item").with_documents(vec![json!({"id": "a", "n": 1})]));
    let binder = ResourceBinder::builder()
        .shared_model(model.clone())
        .listener(EventKind::Remove, move |event: &ResourceEvent| {
            sink.lock().unwrap().push(event.payload.clone());
        })
        .build()
        .unwrap();

    let (status, _, body) = send(app(&binder), request("DELETE", "/items/a", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"id": "a", "n": 1}));
    assert!(model.is_empty());
    assert_eq!(*seen.lock().unwrap(), vec![json!({"id": "a", "n": 1})]);
}

#[tokio::test]
async fn test_events_carry_projected_payloads() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = |kind: EventKind| {
        let seen = seen.clone();
        move |event: &ResourceEvent| seen.lock().unwrap().push((kind, event.payload.clone()))
    };

    let model = Arc::new(InMemoryModel::new("Item").with_documents(vec![json!({"id": "a"})]));
    let binder = ResourceBinder::builder()
        .shared_model(model)
        .listener(EventKind::Query, record(EventKind::Query))
        .listener(EventKind::Detail, record(EventKind::Detail))
        .listener(EventKind::Update, record(EventKind::Update))
        .build()
        .unwrap();

    send(app(&binder), request("GET", "/items", None)).await;
    send(app(&binder), request("GET", "/items/a", None)).await;
    send(app(&binder), request("PATCH", "/items/a", Some(json!({"n": 1})))).await;

    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            (EventKind::Query, json!([{"id": "a"}])),
            (EventKind::Detail, json!({"id": "a"})),
            (EventKind::Update, json!({"id": "a", "n": 1})),
        ]
    );
}

#[tokio::test]
async fn test_failed_request_emits_nothing() {
    let seen = Arc::new(Mutex::new(0usize));
    let sink = seen.clone();
    let binder = ResourceBinder::builder()
        .model(InMemoryModel::new("Item"))
        .listener(EventKind::Detail, move |_: &ResourceEvent| {
            *sink.lock().unwrap() += 1;
        })
        .build()
        .unwrap();

    let (status, _, _) = send(app(&binder), request("GET", "/items/missing", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(*seen.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_operation_options_override_page_size() {
    let binder = binder(numbered(5));
    let router = Router::new().route(
        "/catalog",
        get_service(binder.query(OperationOptions::new().page_size(2).base_url("http://x"))),
    );

    let (_, headers, body) = send(router, request("GET", "/catalog?p=1&sort=n", None)).await;
    let ns: Vec<_> = body.as_array().unwrap().iter().map(|r| r["n"].clone()).collect();
    assert_eq!(ns, vec![json!(2), json!(3)]);
    assert!(link(&headers).contains("<http://x/catalog?p=2&sort=n>; rel=\"next\""));
}

#[tokio::test]
async fn test_before_middleware_can_answer() {
    let model = numbered(1);
    let binder = binder(model.clone());
    let options = ServeOptions::new().before(|req: Request<Body>| async move {
        if req.headers().contains_key("x-api-key") {
            Ok(req)
        } else {
            Err::<_, Response>(StatusCode::UNAUTHORIZED.into_response())
        }
    });
    let router = binder.serve("/items", Router::new(), options);

    let (status, _, _) = send(router.clone(), request("GET", "/items", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(model.calls().total(), 0);

    let mut allowed = request("GET", "/items", None);
    allowed.headers_mut().insert("x-api-key", "k".parse().unwrap());
    let (status, _, _) = send(router, allowed).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_after_middleware_is_accepted_but_inert() {
    let binder = binder(numbered(1));
    let options = ServeOptions::new().after(|_req: Request<Body>| async move {
        Err::<Request<Body>, _>(StatusCode::IM_A_TEAPOT.into_response())
    });
    let router = binder.serve("/items", Router::new(), options);

    let (status, _, _) = send(router, request("GET", "/items", None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_store_failure_hides_details() {
    let model = Arc::new(
        InMemoryModel::new("Item").with_documents(vec![json!({"id": "a", "owner": "o1"})]),
    );
    let binder = ResourceBinder::builder()
        .shared_model(model)
        .populate(crate::store::Populate::new("owner"))
        .build()
        .unwrap();

    let (status, _, body) = send(app(&binder), request("GET", "/items", None)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], json!("An internal error occurred"));
}

#[tokio::test]
async fn test_remove_returns_unprojected_document() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let model = Arc::new(
        InMemoryModel::new("Item").with_documents(vec![json!({"id": "a", "secret": 1})]),
    );
    let binder = ResourceBinder::builder()
        .shared_model(model.clone())
        .detail_projection(|_: &RequestInfo, mut doc: Document| -> Result<Value, ApiError> {
            doc.remove("secret");
            Ok(doc.into_value())
        })
        .listener(EventKind::Remove, move |event: &ResourceEvent| {
            sink.lock().unwrap().push(event.payload.clone());
        })
        .build()
        .unwrap();
    let router = Router::new().route(
        "/items/{id}",
        axum::routing::delete_service(binder.remove(OperationOptions::new().projection(
            |_: &RequestInfo, _: Document| -> Result<Value, ApiError> { Ok(json!({})) },
        ))),
    );

    let (_, _, body) = send(app(&binder), request("GET", "/items/a", None)).await;
    assert_eq!(body, json!({"id": "a"}));

    let (status, _, body) = send(router, request("DELETE", "/items/a", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"id": "a", "secret": 1}));
    assert_eq!(*seen.lock().unwrap(), vec![json!({"id": "a", "secret": 1})]);
    assert!(model.is_empty());
}

#[tokio::test]
async fn test_last_representable_page_does_not_overflow() {
    let model = FaultyModel::new(numbered(3)).ignoring_skip();
    let binder = ResourceBinder::builder()
        .model(model)
        .page_size(2)
        .build()
        .unwrap();

    let (status, headers, body) = send(
        app(&binder),
        request("GET", "/items?p=18446744073709551615", None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
    let link = link(&headers);
    assert!(link.contains("</items?p=18446744073709551614>; rel=\"prev\""));
    assert!(link.contains("</items?p=18446744073709551615>; rel=\"next\""));
}

#[tokio::test]
async fn test_remove_store_outage_keeps_document() {
    let model = numbered(1);
    let id = model.snapshot()[0].id().unwrap();
    let (router, emitted) = counting_app(
        FaultyModel::new(model.clone()).failing_remove(StoreErrorKind::ConnectionFailed),
    );

    let (status, _, body) =
        send(router, request("DELETE", &format!("/items/{}", id), None)).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], json!("Service temporarily unavailable"));
    assert_eq!(model.len(), 1);
    assert_eq!(*emitted.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_insert_constraint_violation_is_conflict() {
    let model = numbered(0);
    let (router, emitted) = counting_app(
        FaultyModel::new(model.clone()).failing_save(StoreErrorKind::ConstraintViolation),
    );

    let (status, headers, _) =
        send(router, request("POST", "/items", Some(json!({"name": "a"})))).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(headers.get(header::LOCATION).is_none());
    assert_eq!(*emitted.lock().unwrap(), 0);
    assert!(model.is_empty());
}

#[tokio::test]
async fn test_update_constraint_violation_is_conflict() {
    let model =
        Arc::new(InMemoryModel::new("Item").with_documents(vec![json!({"id": "a", "n": 1})]));
    let (router, emitted) = counting_app(
        FaultyModel::new(model.clone()).failing_save(StoreErrorKind::ConstraintViolation),
    );

    let (status, headers, _) =
        send(router, request("PATCH", "/items/a", Some(json!({"n": 2})))).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(headers.get(header::LOCATION).is_none());
    assert_eq!(*emitted.lock().unwrap(), 0);
    assert_eq!(model.snapshot()[0].get("n"), Some(&json!(1)));
}

#[tokio::test]
async fn test_update_runs_before_save_hooks() {
    let model =
        Arc::new(InMemoryModel::new("Item").with_documents(vec![json!({"id": "a", "n": 1})]));
    let binder = ResourceBinder::builder()
        .shared_model(model.clone())
        .before_save(|req: &RequestInfo, doc: &mut Document| -> Result<(), ApiError> {
            doc.insert("touched_by", json!(req.method.as_str()));
            Ok(())
        })
        .build()
        .unwrap();

    let (status, _, body) =
        send(app(&binder), request("PATCH", "/items/a", Some(json!({"n": 2})))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"id": "a", "n": 2, "touched_by": "PATCH"}));
    assert_eq!(model.snapshot()[0].get("touched_by"), Some(&json!("PATCH")));
}
