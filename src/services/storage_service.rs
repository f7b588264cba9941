//! StorageService — durable object storage backing the upload proxy.
//!
//! Payload bytes are written to local disk beneath
//! `base_path/{shard}/{shard}/{key}` and the accompanying metadata row
//! (filename, content type, size, etag, cache policy) is kept in SQLite.
//! Uploads stream to a temporary file and are renamed into place only once
//! fully written, so a failed upload never leaves a partial object behind.

use crate::models::object::StoredObject;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object `{key}` not found")]
    NotFound { key: String },
    #[error("invalid object key")]
    InvalidKey,
    #[error("object exceeds the {limit_bytes} byte limit")]
    TooLarge { limit_bytes: i64 },
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

const MAX_KEY_LEN: usize = 512;

/// StorageService provides the operations the proxy needs:
/// - Put an object (streams bytes to disk, inserts metadata into SQLite)
/// - Open an object for reading (metadata + file handle)
/// - Delete an object (removes metadata row and payload, idempotent)
///
/// The service is cheap to clone and holds no per-request state, so every
/// request gets its own independent copy via axum's `State`.
#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    /// Host prefix public object URLs are built from.
    pub public_base_url: String,
}

impl StorageService {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            public_base_url: public_base_url.into(),
        }
    }

    /// Public URL under which a stored object can be fetched.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), key)
    }

    /// Key validation to keep lookups inside the storage root.
    ///
    /// The namespace is flat, so any path separator is rejected along with
    /// `..`, control bytes, and over-long keys. Generated keys always pass;
    /// this mainly guards caller-supplied keys on delete and fetch.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() || key.len() > MAX_KEY_LEN {
            return Err(StorageError::InvalidKey);
        }
        if key.contains('/') || key.contains("..") {
            return Err(StorageError::InvalidKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StorageError::InvalidKey);
        }
        Ok(())
    }

    /// Generate two-level shard identifiers for an object key.
    ///
    /// Uses MD5(key) and returns the first two bytes as lowercase hex
    /// (00–ff). Keeps the file count per directory manageable.
    fn object_shards(key: &str) -> (String, String) {
        let digest = md5::compute(key);
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Full payload path for a key. Parent directories may not exist yet.
    fn object_path(&self, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(key);
        let mut path = self.base_path.clone();
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Fetch an object's metadata row. Returns NotFound if absent.
    async fn fetch_object(&self, key: &str) -> StorageResult<StoredObject> {
        sqlx::query_as::<_, StoredObject>(
            "SELECT key, filename, content_type, size_bytes, etag, cache_control, uploaded_at
             FROM objects WHERE key = ?",
        )
        .bind(key)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::NotFound {
                key: key.to_string(),
            },
            other => StorageError::Sqlx(other),
        })
    }

    /// Stream an object to disk and record its metadata.
    ///
    /// - Writes bytes incrementally to a temporary file.
    /// - Counts size and computes the MD5 etag while streaming; aborts as
    ///   soon as the running size passes `max_bytes`.
    /// - Fsyncs and atomically renames into the final location.
    /// - Inserts the metadata row, removing the payload if the insert fails.
    ///
    /// Keys are freshly generated per upload, so no existing object is ever
    /// overwritten in place.
    pub async fn put_stream<S>(
        &self,
        key: &str,
        filename: &str,
        content_type: &str,
        cache_control: &str,
        stream: S,
        max_bytes: i64,
    ) -> StorageResult<StoredObject>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        self.ensure_key_safe(key)?;

        let file_path = self.object_path(key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| StorageError::Io(io::Error::other("object path missing parent")))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StorageError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            if size_bytes > max_bytes {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::TooLarge {
                    limit_bytes: max_bytes,
                });
            }
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        let uploaded_at = Utc::now();
        let etag = format!("{:x}", digest.compute());

        let insert_result = sqlx::query_as::<_, StoredObject>(
            r#"
            INSERT INTO objects (
                key, filename, content_type, size_bytes, etag, cache_control, uploaded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING key, filename, content_type, size_bytes, etag, cache_control, uploaded_at
            "#,
        )
        .bind(key)
        .bind(filename)
        .bind(content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(cache_control)
        .bind(uploaded_at)
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(obj) => Ok(obj),
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StorageError::Sqlx(err))
            }
        }
    }

    /// Fetch an object for reading.
    ///
    /// Returns metadata and an opened File handle ready for streaming out.
    /// Returns NotFound if the metadata row exists but the payload is gone.
    pub async fn open_reader(&self, key: &str) -> StorageResult<(StoredObject, File)> {
        self.ensure_key_safe(key)?;
        let object = self.fetch_object(key).await?;

        let file_path = self.object_path(key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::NotFound {
                    key: key.to_string(),
                }
            } else {
                StorageError::Io(err)
            }
        })?;

        Ok((object, file))
    }

    /// Delete an object's metadata row and payload.
    ///
    /// Idempotent by construction: a key that was never stored (or was
    /// already deleted) is not an error. Returns whether anything was
    /// actually removed. Empty shard directories are pruned afterwards.
    pub async fn delete(&self, key: &str) -> StorageResult<bool> {
        self.ensure_key_safe(key)?;

        let result = sqlx::query("DELETE FROM objects WHERE key = ?")
            .bind(key)
            .execute(&*self.db)
            .await?;
        let existed = result.rows_affected() > 0;

        let file_path = self.object_path(key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed payload {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("payload {} already missing", file_path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }

        Ok(existed)
    }

    /// Remove now-empty shard directories up to the storage root.
    ///
    /// Stops at the first non-empty or missing directory, or on any
    /// unexpected I/O error.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.base_path) && current != self.base_path {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    async fn test_service() -> (StorageService, TempDir) {
        let temp = TempDir::new().expect("tempdir");
        let db = Arc::new(
            SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await
                .expect("sqlite pool"),
        );
        crate::run_migrations(&db).await.expect("migrations");
        let service = StorageService::new(db, temp.path(), "https://media.example.com");
        (service, temp)
    }

    fn byte_stream(chunks: Vec<&'static [u8]>) -> impl Stream<Item = io::Result<Bytes>> + Send {
        stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(Bytes::from_static(c)))
                .collect::<Vec<io::Result<Bytes>>>(),
        )
    }

    #[tokio::test]
    async fn put_then_read_back() {
        let (service, _tmp) = test_service().await;

        let object = service
            .put_stream(
                "a1b2.png",
                "photo.png",
                "image/png",
                "public, max-age=31536000",
                byte_stream(vec![b"hello ", b"world"]),
                1024,
            )
            .await
            .expect("put");

        assert_eq!(object.key, "a1b2.png");
        assert_eq!(object.filename, "photo.png");
        assert_eq!(object.size_bytes, 11);

        let (meta, mut file) = service.open_reader("a1b2.png").await.expect("reader");
        assert_eq!(meta.content_type, "image/png");
        let mut contents = Vec::new();
        file.read_to_end(&mut contents).await.expect("read");
        assert_eq!(contents, b"hello world");
    }

    #[tokio::test]
    async fn put_enforces_size_cap() {
        let (service, tmp) = test_service().await;

        let err = service
            .put_stream(
                "big.bin",
                "big.bin",
                "video/mp4",
                "public, max-age=31536000",
                byte_stream(vec![&[0u8; 16]]),
                8,
            )
            .await
            .expect_err("should exceed cap");
        assert!(matches!(err, StorageError::TooLarge { limit_bytes: 8 }));

        // No payload or temp file may survive a rejected upload.
        let leftovers: Vec<_> = walkdir(tmp.path());
        assert!(leftovers.is_empty(), "leftover files: {:?}", leftovers);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (service, _tmp) = test_service().await;

        assert!(!service.delete("never-stored.png").await.expect("first"));
        assert!(!service.delete("never-stored.png").await.expect("second"));

        service
            .put_stream(
                "gone.gif",
                "gone.gif",
                "image/gif",
                "public, max-age=31536000",
                byte_stream(vec![b"gif"]),
                64,
            )
            .await
            .expect("put");
        assert!(service.delete("gone.gif").await.expect("delete"));
        assert!(!service.delete("gone.gif").await.expect("redelete"));
        assert!(matches!(
            service.open_reader("gone.gif").await,
            Err(StorageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn unsafe_keys_are_rejected() {
        let (service, _tmp) = test_service().await;

        for key in ["", "../etc/passwd", "/abs.png", "a/b.png", "x\\y", "a\0b"] {
            assert!(
                matches!(service.delete(key).await, Err(StorageError::InvalidKey)),
                "key {:?} should be invalid",
                key
            );
        }
    }

    fn walkdir(root: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            for entry in std::fs::read_dir(&dir).expect("read_dir") {
                let path = entry.expect("entry").path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        files
    }
}
