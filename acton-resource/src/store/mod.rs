//! Store abstraction behind a bound resource
//!
//! The binder never talks to a database directly. It hands a [`Query`] to a
//! [`Model`] and receives [`Document`]s back.
//!
//! # Features
//!
//! - **Model trait**: [`Model`] with find, find-one, instantiate, save and remove
//! - **Structured queries**: [`Predicate`], [`SortKey`], [`Selection`] and [`Populate`]
//! - **Validation errors**: [`StoreError`] carrying per-field [`FieldError`]s
//! - **In-memory store**: [`InMemoryModel`] for fixtures and tests
//!
//! # Example
//!
//! ```rust
//! use acton_resource::store::{FilterCondition, InMemoryModel, Model, Query};
//! use serde_json::json;
//!
//! # futures::executor::block_on(async {
//! let items = InMemoryModel::new("Item")
//!     .with_documents(vec![json!({"name": "lamp"}), json!({"name": "desk"})]);
//!
//! let found = items
//!     .find(&Query::new().where_(FilterCondition::eq("name", "desk")))
//!     .await
//!     .unwrap();
//! assert_eq!(found.len(), 1);
//! # });
//! ```

mod document;
mod error;
mod memory;
mod model;
mod query;

pub use document::{Document, ID_FIELD};
pub use error::{FieldError, StoreError, StoreErrorKind, StoreOperation};
pub use memory::{InMemoryModel, StoreCalls};
pub use model::{Model, StoreResult};
pub use query::{
    FilterCondition, FilterOperator, FilterValue, OrderDirection, Populate, Predicate, Query,
    Selection, SortKey,
};
