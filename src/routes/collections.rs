//! Generic CRUD over the document's collections.
//!
//! The list endpoint honors the router-native `_page`/`_limit` parameters
//! (the normalizer maps the friendly names onto them) and signals the
//! pre-slice match count through `X-Total-Count`, which the response
//! paginator turns into the page envelope. Creation accepts three input
//! shapes - a raw JSON body, a multipart body with a JSON `data` field, or
//! plain multipart form fields - normalized into one record-construction
//! path before the id and timestamps are assigned.

use axum::body::to_bytes;
use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::{header, HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::{ServerError, ServerResult};
use crate::paginate::TOTAL_COUNT_HEADER;
use crate::routes::uploads;
use crate::state::AppState;

/// Router-native pagination parameters. Values are parsed leniently; a
/// non-numeric value falls back to the default instead of failing the
/// request.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "_page")]
    pub page: Option<String>,

    #[serde(rename = "_limit")]
    pub limit: Option<String>,
}

/// List a collection: `GET /{collection}`.
///
/// With `_page` or `_limit` present the result is sliced and the pre-slice
/// length is exposed as `X-Total-Count`; otherwise the whole collection is
/// returned without a count signal.
pub async fn list_records(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Query(query): Query<ListQuery>,
) -> ServerResult<Response> {
    let records = state
        .store
        .list(&collection)
        .await
        .ok_or(ServerError::NotFound)?;

    let page = query.page.as_deref().and_then(|v| v.parse::<usize>().ok());
    let limit = query.limit.as_deref().and_then(|v| v.parse::<usize>().ok());
    if page.is_none() && limit.is_none() {
        return Ok(Json(records).into_response());
    }

    let total = records.len();
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(10);
    let start = (page - 1).saturating_mul(limit).min(total);
    let end = start.saturating_add(limit).min(total);

    let mut response = Json(records[start..end].to_vec()).into_response();
    response.headers_mut().insert(
        HeaderName::from_static(TOTAL_COUNT_HEADER),
        HeaderValue::from(total),
    );
    Ok(response)
}

/// Fetch one record: `GET /{collection}/{id}`.
pub async fn get_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> ServerResult<impl IntoResponse> {
    let record = state
        .store
        .find(&collection, &id)
        .await
        .ok_or(ServerError::NotFound)?;
    Ok(Json(record))
}

/// Create a record: `POST /{collection}`.
///
/// The base record comes from whichever input shape the request carries;
/// accompanying multipart `files` parts are written through the upload
/// ingestor's storage path. The store assigns `id`, and timestamps are
/// ensured for the multipart shapes the normalizer cannot see into.
pub async fn create_record(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    request: Request,
) -> ServerResult<impl IntoResponse> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let mut record = if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|err| ServerError::Multipart(err.to_string()))?;
        record_from_multipart(&state, multipart).await?
    } else if content_type.starts_with("application/json") {
        let bytes = to_bytes(request.into_body(), state.config.max_body_size())
            .await
            .map_err(|err| ServerError::BadRequest(format!("failed to read request body: {err}")))?;
        require_object(serde_json::from_slice(&bytes)?)?
    } else {
        return Err(ServerError::BadRequest(
            "expected an application/json or multipart/form-data body".to_string(),
        ));
    };

    let now = Value::from(Utc::now().timestamp_millis());
    record.entry("createdAt").or_insert_with(|| now.clone());
    record.entry("updatedAt").or_insert(now);

    let stored = state
        .store
        .insert(&collection, record)
        .await?
        .ok_or(ServerError::NotFound)?;
    Ok(Json(stored))
}

/// Replace a record: `PUT /{collection}/{id}`.
pub async fn replace_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> ServerResult<impl IntoResponse> {
    let record = require_object(body)?;
    let updated = state
        .store
        .replace(&collection, &id, record)
        .await?
        .ok_or(ServerError::NotFound)?;
    Ok(Json(updated))
}

/// Merge fields into a record: `PATCH /{collection}/{id}`.
pub async fn merge_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> ServerResult<impl IntoResponse> {
    let patch = require_object(body)?;
    let updated = state
        .store
        .merge(&collection, &id, patch)
        .await?
        .ok_or(ServerError::NotFound)?;
    Ok(Json(updated))
}

/// Delete a record: `DELETE /{collection}/{id}`.
pub async fn delete_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> ServerResult<impl IntoResponse> {
    state
        .store
        .remove(&collection, &id)
        .await?
        .ok_or(ServerError::NotFound)?;
    Ok(Json(json!({})))
}

/// The full document: `GET /db`.
pub async fn get_db(State(state): State<AppState>) -> Json<Value> {
    Json(Value::Object(state.store.document().await))
}

/// Build the base record from a multipart body. A JSON `data` field wins
/// over loose form fields; `files` parts go to the content root.
async fn record_from_multipart(
    state: &AppState,
    mut multipart: Multipart,
) -> ServerResult<Map<String, Value>> {
    let mut form_fields = Map::new();
    let mut data: Option<Map<String, Value>> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("files") => {
                let original = field.file_name().unwrap_or("upload").to_string();
                let bytes = field.bytes().await?;
                uploads::store_file(&state.config, &original, &bytes).await?;
            }
            Some("data") => {
                let text = field.text().await?;
                data = Some(require_object(serde_json::from_str(&text)?)?);
            }
            Some(name) => {
                let key = name.to_string();
                let text = field.text().await?;
                form_fields.insert(key, Value::String(text));
            }
            None => {}
        }
    }

    Ok(data.unwrap_or(form_fields))
}

fn require_object(value: Value) -> ServerResult<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ServerError::BadRequest(
            "record must be a JSON object".to_string(),
        )),
    }
}
