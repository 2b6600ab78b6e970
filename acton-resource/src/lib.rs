//! # acton-resource
//!
//! Expose a document store as a REST resource with five handlers: paginated
//! list, detail, insert, update and remove.
//!
//! ## Features
//!
//! - **Typed pipelines**: every handler is a chain of [`pipeline::Step`]s; a mis-ordered
//!   chain does not compile
//! - **Query strings**: `q` (JSON filter), `p` (page), `sort` and `select`, parsed into a
//!   narrow predicate grammar
//! - **Pagination**: `Link` header with `first`, `prev` and `next`
//! - **Extension points**: per-operation projections, request filters, before-save hooks
//! - **Events**: in-process listeners for `query`, `detail`, `insert`, `update` and `remove`
//! - **Structured errors**: JSON error bodies with field-level validation errors
//! - **Configuration**: layered TOML and environment variables via figment
//!
//! ## Example
//!
//! ```rust,no_run
//! use acton_resource::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let items = ResourceBinder::builder()
//!         .model(InMemoryModel::new("Item").required(["name"]))
//!         .config(&config.resource)
//!         .listener(EventKind::Insert, |event: &ResourceEvent| {
//!             info!(payload = %event.payload, "Item created");
//!         })
//!         .build()?;
//!
//!     let app = items.serve("/items", Router::new(), ServeOptions::default());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod binder;
pub mod config;
pub mod error;
pub mod events;
pub mod handlers;
pub mod hooks;
pub mod observability;
pub mod pipeline;
pub mod store;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::binder::{
        Middleware, OperationOptions, ResourceBinder, ResourceBinderBuilder, ResourceHandler,
        ServeOptions,
    };
    pub use crate::config::{Config, ResourceConfig, ServiceConfig};
    pub use crate::error::{Error, Result};
    pub use crate::events::{EventBus, EventKind, Listener, ResourceEvent};
    pub use crate::handlers::{
        ApiError, ApiErrorKind, ApiOperation, ListParams, PageLinks, RequestInfo,
        ResourceResponse,
    };
    pub use crate::hooks::{BeforeSave, IdentityProjection, Projection, RequestFilter};
    pub use crate::observability::init_tracing;
    pub use crate::store::{
        Document, FieldError, FilterCondition, FilterOperator, FilterValue, InMemoryModel, Model,
        OrderDirection, Populate, Predicate, Query, Selection, SortKey, StoreError,
        StoreErrorKind, StoreOperation, StoreResult, ID_FIELD,
    };

    // Re-export commonly used types
    pub use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::{IntoResponse, Response},
        Router,
    };

    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{json, Value};

    pub use tracing::{debug, error, info, instrument, trace, warn};

    pub use tokio;
}
