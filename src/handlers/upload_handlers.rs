//! HTTP handlers for the upload, delete, and fetch operations.
//! Validates request shape and upload policy here; storage concerns are
//! delegated to `StorageService`.

use crate::{errors::ApiError, services::storage_service::StorageService};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State, multipart::Field},
    http::{HeaderValue, header},
    response::Response,
};
use bytes::Bytes;
use chrono::Utc;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::io;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

/// Hard cap on uploaded file size: 50 MiB. Enforced while streaming into
/// storage, so the upload route runs without a transport-level body limit
/// and every oversized input gets the size-limit error, not a framework
/// rejection. The stream is cut off as soon as the cap is passed.
pub const MAX_UPLOAD_BYTES: i64 = 52_428_800;

/// Declared MIME types accepted for upload.
const ALLOWED_CONTENT_TYPES: [&str; 8] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
    "video/mp4",
    "video/webm",
    "video/mov",
];

/// Cache directive stored with every object. Keys are never reused, so
/// objects are immutable and may be cached for a year.
const CACHE_CONTROL_POLICY: &str = "public, max-age=31536000";

/// Extension used when the original filename has none.
const DEFAULT_EXTENSION: &str = "bin";

/// Body returned by a successful upload.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub key: String,
    pub url: String,
    #[serde(rename = "fileName")]
    pub file_name: String,
    pub size: i64,
    #[serde(rename = "type")]
    pub content_type: String,
}

/// Body accepted by `DELETE /delete`.
#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub key: Option<String>,
}

/// Body returned by a successful delete.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// `POST /upload` — accept one multipart file part under the field `file`,
/// enforce the type allow-list and size cap, and stream it into storage
/// under a freshly generated key.
pub async fn upload_file(
    State(service): State<StorageService>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::invalid_input(format!("Cuerpo multipart no válido: {err}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let Some(file_name) = field.file_name().map(str::to_owned) else {
            return Err(ApiError::invalid_input(
                "El campo 'file' debe contener un archivo",
            ));
        };
        let content_type = field
            .content_type()
            .map(str::to_owned)
            .unwrap_or_else(|| "application/octet-stream".to_string());
        if !ALLOWED_CONTENT_TYPES.contains(&content_type.as_str()) {
            return Err(ApiError::UnsupportedType(content_type));
        }

        let key = generate_key(&file_name);
        let object = service
            .put_stream(
                &key,
                &file_name,
                &content_type,
                CACHE_CONTROL_POLICY,
                field_stream(field),
                MAX_UPLOAD_BYTES,
            )
            .await?;

        let url = service.public_url(&object.key);
        tracing::info!(key = %object.key, size = object.size_bytes, "stored upload");
        return Ok(Json(UploadResponse {
            success: true,
            key: object.key,
            url,
            file_name,
            size: object.size_bytes,
            content_type: object.content_type,
        }));
    }

    Err(ApiError::invalid_input(
        "No se encontró ningún archivo en el campo 'file'",
    ))
}

/// `DELETE /delete` — remove the object named by the JSON body's `key`.
///
/// Deliberately idempotent and unauthenticated: deleting a key that does not
/// exist succeeds, and any caller who knows a key may delete it. The body is
/// parsed manually because a malformed body counts as a backend failure
/// (HTTP 500), not a validation one.
pub async fn delete_file(
    State(service): State<StorageService>,
    body: Bytes,
) -> Result<Json<DeleteResponse>, ApiError> {
    let request: DeleteRequest = serde_json::from_slice(&body)
        .map_err(|err| ApiError::Backend(anyhow::anyhow!("invalid JSON body: {err}")))?;

    let key = request.key.as_deref().map(str::trim).unwrap_or_default();
    if key.is_empty() {
        return Err(ApiError::invalid_input("Falta la clave 'key' del archivo"));
    }

    let existed = service.delete(key).await?;
    tracing::info!(key, existed, "processed delete");
    Ok(Json(DeleteResponse {
        success: true,
        message: "Archivo eliminado correctamente".to_string(),
    }))
}

/// `GET /{key}` — stream a stored object back with the content type and
/// cache policy it was uploaded with.
pub async fn get_file(
    State(service): State<StorageService>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let (object, file) = service.open_reader(&key).await.map_err(|err| match err {
        // A bad key in the path reads the same as an unknown one.
        crate::services::storage_service::StorageError::InvalidKey => ApiError::NotFound,
        other => other.into(),
    })?;

    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&object.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&object.size_bytes.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_str(&object.cache_control)
            .unwrap_or_else(|_| HeaderValue::from_static("no-cache")),
    );
    Ok(response)
}

/// Adapt a multipart field into the `io::Result<Bytes>` stream the storage
/// service consumes.
fn field_stream(field: Field<'_>) -> impl Stream<Item = io::Result<Bytes>> + Send {
    futures::stream::unfold(field, |mut field| async move {
        match field.chunk().await {
            Ok(Some(chunk)) => Some((Ok(chunk), field)),
            Ok(None) => None,
            Err(err) => Some((Err(io::Error::other(err)), field)),
        }
    })
}

/// Build an object key: `{uuid}-{epoch millis}.{extension}`. UUID randomness
/// plus the timestamp makes collisions between concurrent uploads
/// probabilistically impossible.
fn generate_key(file_name: &str) -> String {
    format!(
        "{}-{}.{}",
        Uuid::new_v4(),
        Utc::now().timestamp_millis(),
        file_extension(file_name)
    )
}

/// Trailing extension of the original filename, `bin` when absent.
/// Intentionally naive (no cross-check against the declared MIME type); the
/// storage layer rejects anything that would escape the storage root.
fn file_extension(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => ext,
        _ => DEFAULT_EXTENSION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_trailing_suffix() {
        assert_eq!(file_extension("photo.png"), "png");
        assert_eq!(file_extension("archive.tar.gz"), "gz");
        assert_eq!(file_extension(".webm"), "webm");
    }

    #[test]
    fn extension_defaults_to_bin() {
        assert_eq!(file_extension("README"), "bin");
        assert_eq!(file_extension("trailing."), "bin");
        assert_eq!(file_extension(""), "bin");
    }

    #[test]
    fn generated_keys_carry_extension_and_never_collide() {
        let a = generate_key("clip.mp4");
        let b = generate_key("clip.mp4");
        assert!(a.ends_with(".mp4"));
        assert!(b.ends_with(".mp4"));
        assert_ne!(a, b);

        // uuid, millis, extension are all present: uuid has 4 inner dashes,
        // one more joins the timestamp.
        assert_eq!(a.matches('-').count(), 5);
    }

    #[test]
    fn allow_list_covers_supported_media_types() {
        for mime in [
            "image/jpeg",
            "image/jpg",
            "image/png",
            "image/gif",
            "image/webp",
            "video/mp4",
            "video/webm",
            "video/mov",
        ] {
            assert!(ALLOWED_CONTENT_TYPES.contains(&mime));
        }
        assert!(!ALLOWED_CONTENT_TYPES.contains(&"application/pdf"));
        assert!(!ALLOWED_CONTENT_TYPES.contains(&"text/plain"));
    }
}
