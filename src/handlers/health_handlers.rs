//! Health & readiness handlers.
//!
//! - GET /healthz -> liveness, no I/O
//! - GET /readyz  -> readiness, checks metadata DB and storage-dir I/O

use crate::services::storage_service::StorageService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;
use tokio::fs;
use uuid::Uuid;

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(reason.into()),
        }
    }
}

/// `GET /healthz` — always 200, never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Runs `SELECT 1` against the metadata database and a write/read/delete
/// round trip under the storage root. 200 when both pass, 503 otherwise;
/// the body reports each check individually.
pub async fn readyz(State(service): State<StorageService>) -> impl IntoResponse {
    let mut checks = HashMap::new();
    checks.insert("database", check_database(&service).await);
    checks.insert("storage", check_storage_dir(&service).await);

    let all_ok = checks.values().all(|check| check.ok);
    let status = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            status: if all_ok { "ok".into() } else { "error".into() },
            checks,
        }),
    )
}

async fn check_database(service: &StorageService) -> CheckStatus {
    match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*service.db)
        .await
    {
        Ok(1) => CheckStatus::ok(),
        Ok(other) => CheckStatus::failed(format!("unexpected result: {other}")),
        Err(err) => CheckStatus::failed(format!("query failed: {err}")),
    }
}

async fn check_storage_dir(service: &StorageService) -> CheckStatus {
    let probe = service.base_path.join(format!(".readyz-{}", Uuid::new_v4()));

    if let Err(err) = fs::write(&probe, b"readyz").await {
        return CheckStatus::failed(format!("could not write probe file: {err}"));
    }
    let outcome = match fs::read(&probe).await {
        Ok(bytes) if bytes == b"readyz" => CheckStatus::ok(),
        Ok(_) => CheckStatus::failed("probe file content mismatch"),
        Err(err) => CheckStatus::failed(format!("could not read probe file: {err}")),
    };
    let _ = fs::remove_file(&probe).await;
    outcome
}
