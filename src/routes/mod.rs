//! API route handlers
//!
//! Routes are organized by functionality:
//!
//! - `collections`: generic CRUD over the document's collections
//! - `uploads`: multipart file ingestion
//! - `health`: health check and metrics exposition

pub mod collections;
pub mod health;
pub mod uploads;

use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::Response;
use serde_json::{Map, Value};
use url::form_urlencoded;

use crate::error::ServerError;
use crate::paginate;
use crate::state::AppState;

/// Echo the parsed query string back as a JSON object.
///
/// Bypasses the collection router entirely; used for protocol debugging.
/// `GET /echo?a=1&b=2` responds `{"a":"1","b":"2"}`.
pub async fn echo(State(state): State<AppState>, RawQuery(query): RawQuery) -> Response {
    let mut params = Map::new();
    if let Some(query) = query.as_deref() {
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            params.insert(key.into_owned(), Value::String(value.into_owned()));
        }
    }

    let callback = if state.config.jsonp {
        paginate::callback_from_query(query.as_deref())
    } else {
        None
    };
    paginate::render_body(StatusCode::OK, callback, Value::Object(params))
}

/// 404 Not Found handler
///
/// Returns a standardized error response for undefined routes.
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
