//! Response paginator.
//!
//! The collection router signals the total match count of a list query via
//! the `X-Total-Count` response header. This middleware wraps the collection
//! routes and reshapes their successful responses:
//!
//! - GET with a total-count signal: `{totalItems, totalPages, pageItems}`,
//!   where `totalPages` divides by the request's `pageSize` (default 100)
//!   and rounds up only when the division is inexact
//! - everything else: the configured plain envelope (`{data: ...}` or the
//!   raw payload)
//!
//! Error responses pass through unmodified. When JSONP is enabled, a
//! `callback` query parameter turns the JSON body into a script invocation.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use url::form_urlencoded;

use crate::config::EnvelopeMode;
use crate::state::AppState;

/// Header the collection router uses to signal the pre-slice match count.
pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// Envelope middleware over the collection routes.
pub async fn envelope_responses(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let query = request.uri().query().map(ToOwned::to_owned);

    let response = next.run(request).await;

    // Router errors pass through unmodified
    if !response.status().is_success() {
        return response;
    }

    let total = response
        .headers()
        .get(TOTAL_COUNT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return crate::error::ServerError::Internal(format!("failed to buffer response: {err}"))
                .into_response()
        }
    };
    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(payload) => payload,
        // Non-JSON payloads are left alone
        Err(_) => return Response::from_parts(parts, Body::from(bytes)),
    };

    let envelope = match total {
        Some(total) if method == Method::GET => {
            let page_size = page_size_from_query(query.as_deref(), state.config.default_page_size);
            json!({
                "totalItems": total,
                "totalPages": total_pages(total, page_size),
                "pageItems": payload,
            })
        }
        _ => match state.config.envelope {
            EnvelopeMode::Wrapped => json!({ "data": payload }),
            EnvelopeMode::Raw => payload,
        },
    };

    let callback = if state.config.jsonp {
        callback_from_query(query.as_deref())
    } else {
        None
    };

    let mut response = render_body(parts.status, callback, envelope);
    if let Some(total) = parts.headers.get(TOTAL_COUNT_HEADER) {
        if let Ok(name) = header::HeaderName::from_bytes(TOTAL_COUNT_HEADER.as_bytes()) {
            response.headers_mut().insert(name, total.clone());
        }
    }
    response
}

/// `ceil(total / page_size)` by the floor-then-bump rule; zero items means
/// zero pages, and a zero page size never divides.
pub fn total_pages(total: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        return 0;
    }
    let quotient = total / page_size;
    if total % page_size == 0 {
        quotient
    } else {
        quotient + 1
    }
}

/// Parse `pageSize` from a query string, falling back to the default when
/// the parameter is absent or non-numeric.
pub fn page_size_from_query(query: Option<&str>, default: u64) -> u64 {
    let query = match query {
        Some(query) => query,
        None => return default,
    };
    form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "pageSize")
        .and_then(|(_, value)| value.parse::<u64>().ok())
        .unwrap_or(default)
}

/// Extract and sanitize a JSONP `callback` parameter.
pub fn callback_from_query(query: Option<&str>) -> Option<String> {
    let query = query?;
    let raw = form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "callback")
        .map(|(_, value)| value.into_owned())?;
    let sanitized: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.' | '[' | ']'))
        .collect();
    if sanitized.is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

/// Render a JSON value, as JSONP when a callback name is present.
pub fn render_body(status: StatusCode, callback: Option<String>, value: Value) -> Response {
    match callback {
        Some(callback) => {
            let body = format!("{callback}({value});");
            (
                status,
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/javascript; charset=utf-8"),
                )],
                body,
            )
                .into_response()
        }
        None => (status, Json(value)).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages_rounds_up_on_inexact_division() {
        assert_eq!(total_pages(101, 25), 5);
        assert_eq!(total_pages(100, 25), 4);
        assert_eq!(total_pages(0, 25), 0);
        assert_eq!(total_pages(1, 100), 1);
        assert_eq!(total_pages(5, 0), 0);
    }

    #[test]
    fn test_page_size_defaults_when_absent_or_non_numeric() {
        assert_eq!(page_size_from_query(None, 100), 100);
        assert_eq!(page_size_from_query(Some("a=1"), 100), 100);
        assert_eq!(page_size_from_query(Some("pageSize=abc"), 100), 100);
        assert_eq!(page_size_from_query(Some("pageSize=25"), 100), 25);
    }

    #[test]
    fn test_callback_is_sanitized() {
        assert_eq!(
            callback_from_query(Some("callback=loadData")),
            Some("loadData".to_string())
        );
        assert_eq!(
            callback_from_query(Some("callback=cb%3Balert(1)")),
            Some("cbalert1".to_string())
        );
        assert_eq!(callback_from_query(Some("a=1")), None);
        assert_eq!(callback_from_query(None), None);
    }

    #[test]
    fn test_render_body_jsonp_wraps_invocation() {
        let response = render_body(
            StatusCode::OK,
            Some("cb".to_string()),
            serde_json::json!({ "a": 1 }),
        );
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/javascript; charset=utf-8"
        );
    }
}
