//! Persisted data models for the upload proxy.
//!
//! Payload bytes live on disk; these types describe the metadata rows kept
//! alongside them in SQLite, mapped via `sqlx::FromRow` and serialized as
//! JSON via `serde`.

pub mod object;
