//! Request metadata visible to projections, filters and hooks

use axum::http::{request::Parts, HeaderMap, Method, Uri};

/// Read-only view of the inbound request
///
/// Built once per request; the body is handled separately by the pipeline.
///
/// # Example
///
/// ```rust
/// use acton_resource::handlers::RequestInfo;
/// use axum::http::{Method, Uri};
///
/// let req = RequestInfo::new(Method::GET, Uri::from_static("/items?p=2&sort=-name"));
/// assert_eq!(req.path(), "/items");
/// assert_eq!(req.query_param("sort"), Some("-name"));
/// ```
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// HTTP method
    pub method: Method,
    /// Full request URI
    pub uri: Uri,
    /// Request headers
    pub headers: HeaderMap,
    /// The `{id}` path parameter, for single-document routes
    pub id: Option<String>,
    query: Vec<(String, String)>,
}

impl RequestInfo {
    /// Request without headers or id
    pub fn new(method: Method, uri: Uri) -> Self {
        let query = decode_query(uri.query());
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            id: None,
            query,
        }
    }

    /// Capture the parts of an axum request
    pub fn from_parts(parts: &Parts, id: Option<String>) -> Self {
        Self {
            headers: parts.headers.clone(),
            id,
            ..Self::new(parts.method.clone(), parts.uri.clone())
        }
    }

    /// Attach the id path parameter
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach headers
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Request path without query string
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Decoded query pairs in request order
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    /// Last value of a query parameter
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Header value as text, if present and visible ASCII
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

fn decode_query(query: Option<&str>) -> Vec<(String, String)> {
    query
        .and_then(|raw| serde_urlencoded::from_str::<Vec<(String, String)>>(raw).ok())
        .unwrap_or_default()
}
