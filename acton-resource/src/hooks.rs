//! Extension points: projections, request filters and before-save hooks
//!
//! Plain closures implement each trait. Implement the trait by hand when the
//! hook has to await something.
//!
//! # Example
//!
//! ```rust
//! use acton_resource::handlers::{ApiError, RequestInfo};
//! use acton_resource::hooks::{BeforeSave, Projection, RequestFilter};
//! use acton_resource::store::{Document, FilterCondition, Predicate};
//! use serde_json::{json, Value};
//!
//! // hide internal fields
//! let public = |_req: &RequestInfo, mut doc: Document| -> Result<Value, ApiError> {
//!     doc.remove("secret");
//!     Ok(doc.into_value())
//! };
//!
//! // tenant isolation
//! let tenant = |req: &RequestInfo| {
//!     Predicate::from(FilterCondition::eq("tenant", req.header("x-tenant").unwrap_or("")))
//! };
//!
//! // stamp documents before they are saved
//! let stamp = |_req: &RequestInfo, doc: &mut Document| -> Result<(), ApiError> {
//!     doc.insert("touched", json!(true));
//!     Ok(())
//! };
//!
//! fn accepts(_: impl Projection, _: impl RequestFilter, _: impl BeforeSave) {}
//! accepts(public, tenant, stamp);
//! ```

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

use crate::handlers::{ApiError, RequestInfo};
use crate::store::{Document, Predicate};

/// Turns a stored document into the JSON sent to the client
pub trait Projection: Send + Sync + 'static {
    /// Project one document
    fn project<'a>(
        &'a self,
        req: &'a RequestInfo,
        document: Document,
    ) -> BoxFuture<'a, Result<Value, ApiError>>;
}

impl<F> Projection for F
where
    F: Fn(&RequestInfo, Document) -> Result<Value, ApiError> + Send + Sync + 'static,
{
    fn project<'a>(
        &'a self,
        req: &'a RequestInfo,
        document: Document,
    ) -> BoxFuture<'a, Result<Value, ApiError>> {
        futures::future::ready(self(req, document)).boxed()
    }
}

/// Sends documents unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityProjection;

impl Projection for IdentityProjection {
    fn project<'a>(
        &'a self,
        _req: &'a RequestInfo,
        document: Document,
    ) -> BoxFuture<'a, Result<Value, ApiError>> {
        futures::future::ready(Ok(document.into_value())).boxed()
    }
}

/// Extra conditions derived from the request, AND-merged into every query
pub trait RequestFilter: Send + Sync + 'static {
    /// Conditions for this request
    fn filter(&self, req: &RequestInfo) -> Predicate;
}

impl<F> RequestFilter for F
where
    F: Fn(&RequestInfo) -> Predicate + Send + Sync + 'static,
{
    fn filter(&self, req: &RequestInfo) -> Predicate {
        self(req)
    }
}

/// Transformation applied to a document before it is saved
///
/// Hooks run in series; the first error aborts the request and nothing is
/// saved.
pub trait BeforeSave: Send + Sync + 'static {
    /// Modify `document` in place
    fn before_save<'a>(
        &'a self,
        req: &'a RequestInfo,
        document: &'a mut Document,
    ) -> BoxFuture<'a, Result<(), ApiError>>;
}

impl<F> BeforeSave for F
where
    F: Fn(&RequestInfo, &mut Document) -> Result<(), ApiError> + Send + Sync + 'static,
{
    fn before_save<'a>(
        &'a self,
        req: &'a RequestInfo,
        document: &'a mut Document,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        futures::future::ready(self(req, document)).boxed()
    }
}
