//! JSON response written at the end of every pipeline

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

/// Status, headers and projected JSON body
///
/// # Example
///
/// ```rust
/// use acton_resource::handlers::ResourceResponse;
/// use axum::http::StatusCode;
/// use serde_json::json;
///
/// let response = ResourceResponse::created(json!({"id": "a1"})).with_location("/items/a1");
/// assert_eq!(response.status, StatusCode::CREATED);
/// ```
#[derive(Debug, Clone)]
pub struct ResourceResponse {
    /// HTTP status
    pub status: StatusCode,
    /// Headers accumulated by the pipeline
    pub headers: HeaderMap,
    /// Body
    pub body: Value,
}

impl ResourceResponse {
    /// 200 OK
    pub fn ok(body: Value) -> Self {
        Self::with_status(StatusCode::OK, body)
    }

    /// 201 Created
    pub fn created(body: Value) -> Self {
        Self::with_status(StatusCode::CREATED, body)
    }

    /// Any status
    pub fn with_status(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// Merge headers set by earlier steps
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Add a `Location` header; values that are not valid header text are skipped
    #[must_use]
    pub fn with_location(mut self, location: impl AsRef<str>) -> Self {
        if let Ok(value) = HeaderValue::from_str(location.as_ref()) {
            self.headers.insert(header::LOCATION, value);
        }
        self
    }
}

impl IntoResponse for ResourceResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        response.headers_mut().extend(self.headers);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_into_response_keeps_headers_and_body() {
        let mut headers = HeaderMap::new();
        headers.insert(header::LINK, HeaderValue::from_static("</items?p=0>; rel=\"first\""));

        let response = ResourceResponse::ok(json!([1, 2]))
            .with_headers(headers)
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::LINK).unwrap(),
            "</items?p=0>; rel=\"first\""
        );
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(bytes.as_ref(), b"[1,2]");
    }

    #[test]
    fn test_invalid_location_is_skipped() {
        let response = ResourceResponse::created(json!({})).with_location("/items/\n");
        assert!(response.headers.get(header::LOCATION).is_none());
    }
}
