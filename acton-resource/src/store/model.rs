//! The model trait a store implements to be bound as a REST resource
//!
//! Uses RPITIT (Return Position Impl Trait In Traits) so implementations can
//! be written with plain `async fn`.
//!
//! # Example
//!
//! ```rust,ignore
//! use acton_resource::store::{Document, Model, Query, StoreResult};
//!
//! struct ItemModel { collection: mongodb::Collection<Document> }
//!
//! impl Model for ItemModel {
//!     fn name(&self) -> &str { "Item" }
//!
//!     async fn find(&self, query: &Query) -> StoreResult<Vec<Document>> {
//!         // translate `query` into the driver's filter/options
//!         todo!()
//!     }
//!
//!     // ... other methods
//! }
//! ```

use std::future::Future;

use serde_json::{Map, Value};

use super::document::Document;
use super::error::StoreError;
use super::query::Query;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Store handle for one kind of document
///
/// The binder calls at most one primary operation per request (`find`, or
/// `find_one` followed by `save`/`remove`).
pub trait Model: Send + Sync + 'static {
    /// Model name, used as entity type in errors (e.g. "Item")
    fn name(&self) -> &str;

    /// Execute a multi-document query
    ///
    /// Must honor the query's predicate, sort, selection, skip, limit and
    /// populate directives.
    fn find(&self, query: &Query) -> impl Future<Output = StoreResult<Vec<Document>>> + Send;

    /// Execute a query expected to match at most one document
    fn find_one(&self, query: &Query)
        -> impl Future<Output = StoreResult<Option<Document>>> + Send;

    /// Build a new, unsaved document from client-supplied fields
    ///
    /// Defaults and id assignment may happen here or in [`Model::save`].
    fn instantiate(&self, fields: Map<String, Value>) -> StoreResult<Document> {
        Ok(Document::from(fields))
    }

    /// Persist a new or modified document, returning the stored state
    ///
    /// Validation failures must be reported with
    /// [`StoreErrorKind::ValidationFailed`](super::StoreErrorKind::ValidationFailed).
    fn save(&self, document: Document) -> impl Future<Output = StoreResult<Document>> + Send;

    /// Delete a previously loaded document
    fn remove(&self, document: &Document) -> impl Future<Output = StoreResult<()>> + Send;
}
