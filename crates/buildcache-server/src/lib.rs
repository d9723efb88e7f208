//! The remote transport service (spec.md §4.5's remote `BlobStore`
//! counterpart), grounded on `courier/src/api/v1/cas/*.rs` and
//! `courier/src/storage.rs` but trimmed to only what the cache engine's
//! remote store needs: blob CAS, build records, and project reports. No
//! accounts, auth, OAuth, organizations, or Postgres — that surface has no
//! counterpart in the caching engine (see DESIGN.md).

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, put};
use tower_http::trace::TraceLayer;
use tracing::{error, instrument};

use buildcache_core::error::CacheError;
use buildcache_core::hash::{Algorithm, Fingerprint};
use buildcache_core::model::{BuildRecord, ProjectIndex};
use buildcache_store::LocalBlobStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<LocalBlobStore>,
}

impl AppState {
    pub fn new(store: LocalBlobStore) -> Self {
        Self { store: Arc::new(store) }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/blob/{algorithm}/{fingerprint}", get(get_blob).put(put_blob))
        .route("/api/v1/build/{group}/{artifact}/{fingerprint}", get(get_build).put(put_build))
        .route("/api/v1/report/{build_id}", put(put_report))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

fn parse_fingerprint(algorithm: &str, hex: &str) -> Result<Fingerprint, (StatusCode, String)> {
    let algorithm = Algorithm::parse(algorithm).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    Fingerprint::from_hex(algorithm, hex).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))
}

#[instrument(skip(state))]
async fn get_blob(State(state): State<AppState>, Path((algorithm, hex)): Path<(String, String)>) -> impl IntoResponse {
    let fingerprint = match parse_fingerprint(&algorithm, &hex) {
        Ok(fp) => fp,
        Err(err) => return err.into_response(),
    };

    match state.store.get(&fingerprint).await {
        Ok(Some(bytes)) => (StatusCode::OK, bytes).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => store_error_response(err),
    }
}

#[instrument(skip(state, body))]
async fn put_blob(
    State(state): State<AppState>,
    Path((algorithm, hex)): Path<(String, String)>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let fingerprint = match parse_fingerprint(&algorithm, &hex) {
        Ok(fp) => fp,
        Err(err) => return err.into_response(),
    };

    match state.store.put(&fingerprint, &body).await {
        Ok(true) => StatusCode::CREATED.into_response(),
        Ok(false) => StatusCode::OK.into_response(),
        Err(err) => store_error_response(err),
    }
}

#[instrument(skip(state))]
async fn get_build(
    State(state): State<AppState>,
    Path((group, artifact, fingerprint)): Path<(String, String, String)>,
) -> impl IntoResponse {
    let path = state.store.record_dir(&group, &artifact, &fingerprint).join("build.xml");
    match tokio::fs::read_to_string(&path).await {
        Ok(xml) => (StatusCode::OK, xml).into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!(path = %path.display(), error = %e, "read build record");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Saves a build record behind the same at-most-one-writer lock the local
/// store uses, so concurrent remote saves of the same fingerprint never race
/// each other (spec.md §4.6).
#[instrument(skip(state, body))]
async fn put_build(
    State(state): State<AppState>,
    Path((group, artifact, fingerprint)): Path<(String, String, String)>,
    body: String,
) -> impl IntoResponse {
    let record: BuildRecord = match BuildRecord::from_xml(&body) {
        Ok(r) => r,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let record_dir = state.store.record_dir(&group, &artifact, &fingerprint);
    if tokio::fs::metadata(record_dir.join("build.xml")).await.is_ok() {
        return StatusCode::CONFLICT.into_response();
    }

    let (lock, outcome) = match buildcache_store::WriteLock::acquire(&record_dir).await {
        Ok(pair) => pair,
        Err(e) => return store_error_response(e),
    };

    if outcome == buildcache_store::LockOutcome::AlreadyHeld {
        return StatusCode::CONFLICT.into_response();
    }

    let result = tokio::fs::write(record_dir.join("build.xml"), record.to_xml().unwrap_or_default()).await;
    drop(lock);

    match result {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(e) => {
            error!(path = %record_dir.display(), error = %e, "write build record");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[instrument(skip(state, body))]
async fn put_report(State(state): State<AppState>, Path(build_id): Path<String>, body: String) -> impl IntoResponse {
    let index: ProjectIndex = match ProjectIndex::from_xml(&body) {
        Ok(i) => i,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };

    let reports_dir = state.store.root().join("reports");
    if let Err(e) = tokio::fs::create_dir_all(&reports_dir).await {
        error!(path = %reports_dir.display(), error = %e, "create reports dir");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let path = reports_dir.join(format!("{build_id}.xml"));
    match tokio::fs::write(&path, index.to_xml().unwrap_or_default()).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => {
            error!(path = %path.display(), error = %e, "write report");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn store_error_response(err: CacheError) -> axum::response::Response {
    error!(error = %err, "blob store error");
    (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;
    use buildcache_core::hash::HashEngine;
    use buildcache_core::model::ModuleId;

    fn server() -> (TestServer, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let app = router(AppState::new(store));
        (TestServer::new(app).unwrap(), dir)
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let (server, _dir) = server();
        server.get("/api/v1/health").await.assert_status_ok();
    }

    #[tokio::test]
    async fn blob_round_trips_through_put_and_get() {
        let (server, _dir) = server();
        let fp = HashEngine::new(Algorithm::Blake3).hash(b"payload");

        server
            .put(&format!("/api/v1/blob/{}/{}", fp.algorithm(), fp.to_hex()))
            .bytes(b"payload".to_vec().into())
            .await
            .assert_status(StatusCode::CREATED);

        let response = server.get(&format!("/api/v1/blob/{}/{}", fp.algorithm(), fp.to_hex())).await;
        response.assert_status_ok();
        assert_eq!(response.as_bytes(), b"payload".as_slice());
    }

    #[tokio::test]
    async fn missing_blob_is_404() {
        let (server, _dir) = server();
        let fp = HashEngine::new(Algorithm::Blake3).hash(b"never stored");
        server
            .get(&format!("/api/v1/blob/{}/{}", fp.algorithm(), fp.to_hex()))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn build_record_save_then_fetch_round_trips() {
        let (server, _dir) = server();
        let record = BuildRecord {
            schema_version: "1".into(),
            cache_implementation_version: "1".into(),
            hash_algorithm: "blake3".into(),
            module_id: ModuleId::new("org.example", "app", "1.0.0"),
            fingerprint: "abcd".into(),
            timestamp: "2026-07-31T00:00:00Z".into(),
            source: buildcache_core::model::SourceTag::Remote,
            steps: vec![],
            artifacts: vec![],
            upstream: vec![],
        };

        server
            .put("/api/v1/build/org.example/app/abcd")
            .text(record.to_xml().unwrap())
            .await
            .assert_status(StatusCode::CREATED);

        let response = server.get("/api/v1/build/org.example/app/abcd").await;
        response.assert_status_ok();
        let fetched = BuildRecord::from_xml(&response.text()).unwrap();
        assert_eq!(fetched.module_id, record.module_id);
    }

    #[tokio::test]
    async fn build_record_second_save_is_conflict() {
        let (server, _dir) = server();
        let record = BuildRecord {
            schema_version: "1".into(),
            cache_implementation_version: "1".into(),
            hash_algorithm: "blake3".into(),
            module_id: ModuleId::new("org.example", "app", "1.0.0"),
            fingerprint: "abcd".into(),
            timestamp: "2026-07-31T00:00:00Z".into(),
            source: buildcache_core::model::SourceTag::Remote,
            steps: vec![],
            artifacts: vec![],
            upstream: vec![],
        };

        server
            .put("/api/v1/build/org.example/app/abcd")
            .text(record.to_xml().unwrap())
            .await
            .assert_status(StatusCode::CREATED);

        server
            .put("/api/v1/build/org.example/app/abcd")
            .text(record.to_xml().unwrap())
            .await
            .assert_status(StatusCode::CONFLICT);
    }
}
