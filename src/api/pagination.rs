//! Limit/offset pagination
//!
//! Page bodies are `{"count", "next", "previous", "results"}` and carry a
//! weak ETag over `results`. A query without matching rows is answered
//! with 404 and no ETag.

use super::error::ApiError;
use crate::config::PaginationConfig;
use crate::store::{PageRequest, QueryParams};
use async_trait::async_trait;
use axum::extract::{FromRequestParts, OriginalUri};
use axum::http::request::Parts;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use ethers::utils::hex;
use md5::{Digest, Md5};
use serde::Serialize;
use serde_json::{Map, Value};
use std::convert::Infallible;

const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Parts of the request used to build links and report `secure`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    pub path: String,
    pub query: Option<String>,
    pub host: Option<String>,
    pub secure: bool,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let uri = parts
            .extensions
            .get::<OriginalUri>()
            .map(|original| original.0.clone())
            .unwrap_or_else(|| parts.uri.clone());
        let header_value = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        let secure = header_value(FORWARDED_PROTO)
            .and_then(|proto| proto.split(',').next().map(|p| p.trim().eq_ignore_ascii_case("https")))
            .unwrap_or(false);

        Ok(Self {
            path: uri.path().to_string(),
            query: uri.query().map(str::to_string),
            host: header_value(header::HOST.as_str()),
            secure,
        })
    }
}

impl RequestContext {
    /// Current URL with `limit` and `offset` replaced, other parameters kept
    fn page_url(&self, limit: u32, offset: Option<u32>) -> String {
        let mut params: Vec<String> = self
            .query
            .as_deref()
            .unwrap_or_default()
            .split('&')
            .filter(|pair| !pair.is_empty())
            .filter(|pair| {
                let key = pair.split('=').next().unwrap_or_default();
                key != "limit" && key != "offset"
            })
            .map(str::to_string)
            .collect();
        params.push(format!("limit={}", limit));
        if let Some(offset) = offset {
            params.push(format!("offset={}", offset));
        }

        let base = match &self.host {
            Some(host) => {
                let scheme = if self.secure { "https" } else { "http" };
                format!("{}://{}{}", scheme, host, self.path)
            }
            None => self.path.clone(),
        };
        format!("{}?{}", base, params.join("&"))
    }
}

/// Reads `limit` and `offset`
///
/// A missing, non-numeric or non-positive `limit` falls back to the
/// configured default; larger values are clamped to `max_limit`. An invalid
/// `offset` is 0.
pub fn page_request(params: &QueryParams, config: &PaginationConfig) -> PageRequest {
    let limit = params
        .get("limit")
        .and_then(|raw| raw.trim().parse::<i64>().ok())
        .filter(|limit| *limit > 0)
        .map(|limit| limit.min(config.max_limit as i64) as u32)
        .unwrap_or(config.default_limit);
    let offset = params
        .get("offset")
        .and_then(|raw| raw.trim().parse::<u32>().ok())
        .unwrap_or(0);
    PageRequest { limit, offset }
}

/// Weak ETag over the compact JSON of `results`
pub fn etag(results: &Value) -> Result<String, ApiError> {
    let serialized = serde_json::to_string(results).map_err(anyhow::Error::from)?;
    Ok(format!("W/\"{}\"", hex::encode(Md5::digest(serialized.as_bytes()))))
}

/// Page of results ready to be answered
pub struct Page<T> {
    pub count: u64,
    pub results: Vec<T>,
    pub request: PageRequest,
    /// Extra top level fields, e.g. `count_unique_nonce`
    pub extra: Map<String, Value>,
}

impl<T: Serialize> Page<T> {
    pub fn new(count: u64, results: Vec<T>, request: PageRequest) -> Self {
        Self {
            count,
            results,
            request,
            extra: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    pub fn into_response(self, context: &RequestContext) -> Result<Response, ApiError> {
        let PageRequest { limit, offset } = self.request;
        let next = (u64::from(offset) + u64::from(limit) < self.count)
            .then(|| context.page_url(limit, Some(offset + limit)));
        let previous = (offset > 0).then(|| {
            if offset <= limit {
                context.page_url(limit, None)
            } else {
                context.page_url(limit, Some(offset - limit))
            }
        });

        let results = serde_json::to_value(&self.results).map_err(anyhow::Error::from)?;
        // only pages with matching rows are tagged
        let etag = if self.count > 0 { Some(etag(&results)?) } else { None };

        let mut body = self.extra;
        body.insert("count".to_string(), self.count.into());
        body.insert("next".to_string(), next.into());
        body.insert("previous".to_string(), previous.into());
        body.insert("results".to_string(), results);
        let body = Json(Value::Object(body));

        // a window past the end is still a 200 when rows match
        Ok(match etag {
            Some(etag) => (StatusCode::OK, [(header::ETAG, etag)], body).into_response(),
            None => (StatusCode::NOT_FOUND, body).into_response(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn context(query: Option<&str>, host: Option<&str>) -> RequestContext {
        RequestContext {
            path: "/api/v1/safes/0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed/transactions/".to_string(),
            query: query.map(str::to_string),
            host: host.map(str::to_string),
            secure: false,
        }
    }

    #[test]
    fn test_page_request_defaults_and_clamping() {
        let config = PaginationConfig::default();

        assert_eq!(page_request(&params(&[]), &config), PageRequest { limit: 100, offset: 0 });
        assert_eq!(
            page_request(&params(&[("limit", "500"), ("offset", "20")]), &config),
            PageRequest { limit: 200, offset: 20 }
        );
        assert_eq!(
            page_request(&params(&[("limit", "-3"), ("offset", "abc")]), &config),
            PageRequest { limit: 100, offset: 0 }
        );
        assert_eq!(page_request(&params(&[("limit", "0")]), &config).limit, 100);
    }

    #[test]
    fn test_page_url_replaces_window_and_keeps_filters() {
        let ctx = context(Some("nonce__gte=2&limit=10&offset=30"), None);
        assert_eq!(
            ctx.page_url(10, Some(40)),
            "/api/v1/safes/0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed/transactions/?nonce__gte=2&limit=10&offset=40"
        );

        let absolute = context(None, Some("localhost:8888"));
        assert_eq!(
            absolute.page_url(5, None),
            "http://localhost:8888/api/v1/safes/0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed/transactions/?limit=5"
        );
    }

    #[test]
    fn test_etag_is_weak_and_content_addressed() {
        let a = etag(&json!([{"nonce": 1}])).unwrap();
        let b = etag(&json!([{"nonce": 1}])).unwrap();
        let c = etag(&json!([{"nonce": 2}])).unwrap();

        assert!(a.starts_with("W/\"") && a.ends_with('"'));
        assert_eq!(a.len(), 4 + 32 + 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_etag_of_empty_results() {
        // md5("[]")
        assert_eq!(etag(&json!([])).unwrap(), "W/\"d751713988987e9331980363e24189ce\"");
    }

    #[test]
    fn test_window_past_the_end_is_ok() {
        let page: Page<Value> = Page::new(1, vec![], PageRequest { limit: 100, offset: 5 });
        let response = page.into_response(&context(Some("offset=5"), None)).unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(header::ETAG));
    }

    #[test]
    fn test_no_matching_rows_is_not_found_without_etag() {
        let page: Page<Value> = Page::new(0, vec![], PageRequest { limit: 100, offset: 0 });
        let response = page.into_response(&context(None, None)).unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!response.headers().contains_key(header::ETAG));
    }
}
