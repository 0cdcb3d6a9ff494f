//! Request middleware: request ids, logging, and the request normalizer.
//!
//! The normalizer runs before routing and brings every request into the
//! collection router's native shape: it applies the URL rewrite rules,
//! copies the friendly pagination parameters (`pageNumber`/`pageSize`) to
//! the native `_page`/`_limit` names, and forces server-side
//! `createdAt`/`updatedAt` timestamps onto JSON mutation bodies.

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, Uri};
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use serde_json::Value;
use url::form_urlencoded;

use crate::error::ServerError;
use crate::rewrite::Rewriter;
use crate::state::AppState;

/// Request ID injection middleware
pub async fn request_id(mut request: Request, next: Next) -> Response {
    // Generate or extract request ID
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    // Add to request extensions for handlers to access
    request.extensions_mut().insert(request_id.clone());

    // Process request
    let mut response = next.run(request).await;

    // Add request ID to response headers
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }

    response
}

/// Logging middleware
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    // Get request ID if available
    let request_id = request
        .extensions()
        .get::<String>()
        .cloned()
        .unwrap_or_default();

    tracing::info!(
        method = %method,
        uri = %uri,
        request_id = %request_id,
        "Request started"
    );

    let response = next.run(request).await;
    let duration = start.elapsed();
    let status = response.status();

    metrics::counter!(
        "jsonmock_requests_total",
        "method" => method.to_string(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);
    metrics::histogram!("jsonmock_request_duration_seconds").record(duration.as_secs_f64());

    tracing::info!(
        method = %method,
        uri = %uri,
        status = %status,
        duration_ms = %duration.as_millis(),
        request_id = %request_id,
        "Request completed"
    );

    response
}

/// Request normalizer: rewrite, pagination translation, timestamping.
pub async fn normalize_request(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ServerError> {
    let request = apply_rewrites(&state.rewriter, request);
    let request = translate_pagination(request);
    let request = inject_timestamps(state.config.max_body_size(), request).await?;
    Ok(next.run(request).await)
}

/// Rewrite the request path through the configured rules, keeping the query.
fn apply_rewrites(rewriter: &Rewriter, mut request: Request) -> Request {
    let rewritten = rewriter.rewrite(request.uri().path());
    if let Some(path) = rewritten {
        let target = match request.uri().query() {
            Some(query) => format!("{path}?{query}"),
            None => path,
        };
        if let Ok(uri) = Uri::try_from(target) {
            tracing::debug!(from = %request.uri().path(), to = %uri.path(), "rewrote request path");
            *request.uri_mut() = uri;
        }
    }
    request
}

/// Copy `pageNumber`/`pageSize` into the router's native `_page`/`_limit`.
/// Both the friendly and the native names end up present.
fn translate_pagination(mut request: Request) -> Request {
    if request.method() != Method::GET {
        return request;
    }
    let query = match request.uri().query() {
        Some(query) => query.to_string(),
        None => return request,
    };

    let pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    let page = pairs
        .iter()
        .find(|(key, _)| key == "pageNumber")
        .map(|(_, value)| value.clone());
    let size = pairs
        .iter()
        .find(|(key, _)| key == "pageSize")
        .map(|(_, value)| value.clone());
    if page.is_none() && size.is_none() {
        return request;
    }

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in &pairs {
        serializer.append_pair(key, value);
    }
    if let Some(value) = page {
        if !pairs.iter().any(|(key, _)| key == "_page") {
            serializer.append_pair("_page", &value);
        }
    }
    if let Some(value) = size {
        if !pairs.iter().any(|(key, _)| key == "_limit") {
            serializer.append_pair("_limit", &value);
        }
    }

    let target = format!("{}?{}", request.uri().path(), serializer.finish());
    if let Ok(uri) = Uri::try_from(target) {
        *request.uri_mut() = uri;
    }
    request
}

/// Force server-side timestamps onto JSON mutation bodies. POST gets
/// `createdAt` and `updatedAt`, PUT/PATCH only `updatedAt`; client-supplied
/// values are overwritten. Multipart bodies are handled by the create
/// handler instead.
async fn inject_timestamps(max_body: usize, request: Request) -> Result<Request, ServerError> {
    let method = request.method();
    let stamp_created = if method == Method::POST {
        true
    } else if method == Method::PUT || method == Method::PATCH {
        false
    } else {
        return Ok(request);
    };

    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/json"))
        .unwrap_or(false);
    if !is_json {
        return Ok(request);
    }

    let (mut parts, body) = request.into_parts();
    let bytes = to_bytes(body, max_body)
        .await
        .map_err(|err| ServerError::BadRequest(format!("failed to read request body: {err}")))?;
    if bytes.is_empty() {
        return Ok(Request::from_parts(parts, Body::empty()));
    }

    let mut value: Value = serde_json::from_slice(&bytes)
        .map_err(|err| ServerError::BadRequest(format!("malformed JSON body: {err}")))?;
    if let Value::Object(record) = &mut value {
        let now = Value::from(Utc::now().timestamp_millis());
        if stamp_created {
            record.insert("createdAt".to_string(), now.clone());
        }
        record.insert("updatedAt".to_string(), now);
    }

    let body = serde_json::to_vec(&value).map_err(|err| ServerError::Internal(err.to_string()))?;
    parts
        .headers
        .insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
    Ok(Request::from_parts(parts, Body::from(body)))
}
