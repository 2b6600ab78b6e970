//! `Link` header for paginated lists
//!
//! Each link repeats the request's own query string with `p` replaced, so
//! filters, sorting and selection carry across pages.

use axum::http::HeaderValue;

use super::error::{ApiError, ApiOperation};
use super::params::PAGE_PARAM;
use super::request::RequestInfo;

/// Pagination links for one page of results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLinks {
    /// Always page 0
    pub first: String,
    /// Present when the page is past the first
    pub prev: Option<String>,
    /// Present when more documents exist
    pub next: Option<String>,
}

impl PageLinks {
    /// Build the links for `page`
    ///
    /// ```rust
    /// use acton_resource::handlers::{PageLinks, RequestInfo};
    /// use axum::http::{Method, Uri};
    ///
    /// let req = RequestInfo::new(Method::GET, Uri::from_static("/items?sort=name&p=1"));
    /// let links = PageLinks::build("https://api.example.com", &req, 1, false).unwrap();
    ///
    /// assert_eq!(links.first, "https://api.example.com/items?sort=name&p=0");
    /// assert_eq!(links.prev.as_deref(), Some("https://api.example.com/items?sort=name&p=0"));
    /// assert!(links.next.is_none());
    /// ```
    pub fn build(
        base_url: &str,
        req: &RequestInfo,
        page: u64,
        has_next: bool,
    ) -> Result<Self, ApiError> {
        let url = |p: u64| page_url(base_url, req, p);
        Ok(Self {
            first: url(0)?,
            prev: if page > 0 { Some(url(page - 1)?) } else { None },
            next: if has_next {
                Some(url(page.saturating_add(1))?)
            } else {
                None
            },
        })
    }

    /// Render as a `Link` header value
    pub fn to_header_value(&self) -> Result<HeaderValue, ApiError> {
        let mut parts = vec![format!("<{}>; rel=\"first\"", self.first)];
        if let Some(prev) = &self.prev {
            parts.push(format!("<{}>; rel=\"prev\"", prev));
        }
        if let Some(next) = &self.next {
            parts.push(format!("<{}>; rel=\"next\"", next));
        }

        HeaderValue::from_str(&parts.join(", ")).map_err(|e| {
            ApiError::internal(format!("Invalid Link header: {}", e))
                .with_operation(ApiOperation::List)
        })
    }
}

fn page_url(base_url: &str, req: &RequestInfo, page: u64) -> Result<String, ApiError> {
    let page = page.to_string();
    let mut replaced = false;
    let mut pairs: Vec<(&str, &str)> = req
        .query_pairs()
        .iter()
        .filter_map(|(key, value)| {
            if key != PAGE_PARAM {
                Some((key.as_str(), value.as_str()))
            } else if !replaced {
                replaced = true;
                Some((PAGE_PARAM, page.as_str()))
            } else {
                None
            }
        })
        .collect();
    if !replaced {
        pairs.push((PAGE_PARAM, page.as_str()));
    }

    let query = serde_urlencoded::to_string(&pairs).map_err(|e| {
        ApiError::internal(format!("Failed to encode query string: {}", e))
            .with_operation(ApiOperation::List)
    })?;
    Ok(format!("{}{}?{}", base_url, req.path(), query))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, Uri};

    fn request(uri: &'static str) -> RequestInfo {
        RequestInfo::new(Method::GET, Uri::from_static(uri))
    }

    #[test]
    fn test_first_page_has_no_prev() {
        let links = PageLinks::build("", &request("/items"), 0, true).unwrap();
        assert_eq!(links.first, "/items?p=0");
        assert!(links.prev.is_none());
        assert_eq!(links.next.as_deref(), Some("/items?p=1"));
    }

    #[test]
    fn test_page_param_replaced_in_place() {
        let links = PageLinks::build("", &request("/items?p=3&sort=-name&p=9"), 3, true).unwrap();
        assert_eq!(links.prev.as_deref(), Some("/items?p=2&sort=-name"));
        assert_eq!(links.next.as_deref(), Some("/items?p=4&sort=-name"));
    }

    #[test]
    fn test_last_representable_page_saturates() {
        let req = request("/items?p=18446744073709551615");
        let links = PageLinks::build("", &req, u64::MAX, true).unwrap();
        assert_eq!(links.prev.as_deref(), Some("/items?p=18446744073709551614"));
        assert_eq!(links.next.as_deref(), Some("/items?p=18446744073709551615"));
    }

    #[test]
    fn test_filter_is_reencoded() {
        let links = PageLinks::build(
            "http://h",
            &request("/items?q=%7B%22a%22%3A1%7D"),
            0,
            false,
        )
        .unwrap();
        assert_eq!(links.first, "http://h/items?q=%7B%22a%22%3A1%7D&p=0");
    }

    #[test]
    fn test_header_value_format() {
        let links = PageLinks::build("", &request("/items?p=1"), 1, true).unwrap();
        assert_eq!(
            links.to_header_value().unwrap().to_str().unwrap(),
            "</items?p=0>; rel=\"first\", </items?p=0>; rel=\"prev\", </items?p=2>; rel=\"next\""
        );
    }
}
