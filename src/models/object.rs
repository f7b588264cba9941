//! Represents one stored object and its metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Metadata record for a single stored object.
///
/// The key is generated by the proxy at upload time
/// (`{uuid}-{epoch-millis}.{ext}`) and doubles as the on-disk file name and
/// the public URL path segment. The struct carries metadata only, never the
/// content bytes.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct StoredObject {
    /// Generated object key, unique across the store.
    pub key: String,

    /// Original filename as supplied by the uploader.
    pub filename: String,

    /// Declared MIME type the object was uploaded with.
    pub content_type: String,

    /// Size in bytes, counted while streaming the upload.
    pub size_bytes: i64,

    /// MD5 of the content, recorded for diagnostics.
    pub etag: String,

    /// Cache directive served alongside the object.
    pub cache_control: String,

    /// When the upload completed.
    pub uploaded_at: DateTime<Utc>,
}
