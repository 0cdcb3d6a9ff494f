//! Multipart file upload ingestion.
//!
//! Files arrive as multipart parts named `files`. Each one is written under
//! the content root as `<epochMillis>-<originalFilename>` and handed back as
//! a descriptor whose `cdnUrl` the static content server resolves.

use axum::extract::{Multipart, Path, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

/// Descriptor for one stored file, positioned within its upload batch.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    /// 1-based position in the batch
    pub id: usize,

    /// Public path the file is served under
    pub cdn_url: String,

    /// 0-based position in the batch
    pub display_order: usize,
}

/// Response for a successful upload batch
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub files: Vec<UploadedFile>,
}

/// Ingest an upload batch: `POST /{collection}/uploads`.
///
/// All-or-nothing per request: a failed write fails the whole batch, and
/// files already written are not cleaned up.
pub async fn upload_files(
    State(state): State<AppState>,
    Path(_collection): Path<String>,
    mut multipart: Multipart,
) -> ServerResult<impl IntoResponse> {
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("files") {
            continue;
        }
        let original = field.file_name().unwrap_or("upload").to_string();
        let bytes = field.bytes().await?;
        let storage_name = store_file(&state.config, &original, &bytes).await?;

        let index = files.len();
        files.push(UploadedFile {
            id: index + 1,
            cdn_url: format!("{}/{}", state.config.cdn_public_path, storage_name),
            display_order: index,
        });
    }

    if files.is_empty() {
        return Err(ServerError::NoFilesUploaded);
    }
    Ok(Json(UploadResponse { files }))
}

/// Write one file under the content root, creating the directory (including
/// parents) on first use. Returns the generated storage name.
pub(crate) async fn store_file(
    config: &ServerConfig,
    original_name: &str,
    bytes: &[u8],
) -> ServerResult<String> {
    let root = std::path::Path::new(&config.content_root);
    // Idempotent: "already exists" is success, also under concurrent first use
    tokio::fs::create_dir_all(root).await?;

    // Only the basename is used, so uploads stay inside the content root
    let base_name = original_name
        .rsplit(['/', '\\'])
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("upload");
    let storage_name = format!("{}-{}", Utc::now().timestamp_millis(), base_name);

    tokio::fs::write(root.join(&storage_name), bytes).await?;
    Ok(storage_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_file_strips_path_components() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            content_root: dir.path().join("uploads").display().to_string(),
            ..ServerConfig::default()
        };

        let name = store_file(&config, "../../etc/passwd", b"data").await.unwrap();
        assert!(name.ends_with("-passwd"));
        assert!(dir.path().join("uploads").join(&name).exists());
    }

    #[tokio::test]
    async fn test_store_file_creates_content_root() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            content_root: dir.path().join("deep/nested/uploads").display().to_string(),
            ..ServerConfig::default()
        };

        let name = store_file(&config, "a.txt", b"hello").await.unwrap();
        let written = tokio::fs::read(dir.path().join("deep/nested/uploads").join(name))
            .await
            .unwrap();
        assert_eq!(written, b"hello");
    }
}
