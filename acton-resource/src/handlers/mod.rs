//! HTTP-facing types shared by every resource handler
//!
//! # Features
//!
//! - **Error Handling**: [`ApiError`] with automatic HTTP status code mapping
//! - **Query Parameters**: [`ListParams`] for `q`, `p`, `sort` and `select`
//! - **Pagination Links**: [`PageLinks`] rendered into the `Link` header
//! - **Request View**: [`RequestInfo`] handed to projections, filters and hooks
//! - **Responses**: [`ResourceResponse`] carrying status, headers and JSON body
//!
//! # Example
//!
//! ```rust
//! use acton_resource::handlers::{ApiOperation, ListParams, RequestInfo};
//! use axum::http::{Method, Uri};
//!
//! let req = RequestInfo::new(Method::GET, Uri::from_static("/items?p=x&sort=name"));
//! let params = ListParams::from_pairs(req.query_pairs())
//!     .map_err(|e| e.into_api_error(ApiOperation::List))
//!     .unwrap();
//!
//! assert_eq!(params.page, 0);
//! assert_eq!(params.sort.len(), 1);
//! ```

mod error;
mod links;
mod params;
mod request;
mod response;

pub use error::{ApiError, ApiErrorKind, ApiOperation};
pub use links::PageLinks;
pub use params::{
    parse_filter, parse_page, parse_select, parse_sort, ListParams, ParamError, FILTER_PARAM,
    PAGE_PARAM, SELECT_PARAM, SORT_PARAM,
};
pub use request::RequestInfo;
pub use response::ResourceResponse;

#[cfg(test)]
pub(crate) use error::ApiErrorResponse;
