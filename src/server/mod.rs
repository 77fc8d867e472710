//! HTTP daemon mode for `svindex`.
//!
//! One thin JSON route per editor request:
//!
//! - `POST /v1/definition` – go-to-definition at a position.
//! - `POST /v1/references` – find-references at a position.
//! - `POST /v1/prepare-rename` / `POST /v1/rename` – rename flow.
//! - `POST /v1/completion` – dot-triggered child completion.
//! - `POST /v1/did-save` – save notification (may trigger reindex).
//! - `POST /v1/reindex` – full rebuild.
//! - `POST /v1/dump` – serialize the live store to a file.
//! - `GET /v1/health` – health check.
//!
//! The axum event loop is the dispatcher; compute-heavy handlers move
//! onto the blocking worker pool so the dispatcher stays responsive
//! while the store is busy.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;

use crate::error::IndexingError;
use crate::models::{
    DidSaveParams, DidSaveResponse, DumpParams, IngestSummary, PositionParams, ReferenceParams,
    RenameParams, RenamePlan, SrcLocation, TextRange,
};
use crate::session::IndexSession;

/// Simple health-check response payload.
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// JSON error body returned by the API.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Error type used by HTTP handlers to map internal failures into JSON
/// error responses.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<IndexingError> for ApiError {
    fn from(err: IndexingError) -> Self {
        let status = match &err {
            IndexingError::FileList { .. } | IndexingError::SchemaVersion { .. } => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Build the Axum router over a shared session.
pub fn router(session: Arc<IndexSession>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/definition", post(definition))
        .route("/v1/references", post(references))
        .route("/v1/prepare-rename", post(prepare_rename))
        .route("/v1/rename", post(rename))
        .route("/v1/completion", post(completion))
        .route("/v1/did-save", post(did_save))
        .route("/v1/reindex", post(reindex))
        .route("/v1/dump", post(dump))
        .with_state(session)
}

/// Run the HTTP server bound to the provided socket address.
pub async fn run(addr: SocketAddr, session: Arc<IndexSession>) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_with_listener(listener, session).await
}

/// Run the HTTP server using an existing `TcpListener`. Primarily used
/// in tests to bind to an ephemeral port.
pub async fn serve_with_listener(listener: TcpListener, session: Arc<IndexSession>) -> Result<()> {
    let app = router(session);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Run `task` on the blocking worker pool and flatten the result.
async fn on_worker<T, F>(task: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, IndexingError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| ApiError::internal(err.to_string()))?
        .map_err(ApiError::from)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn definition(
    State(session): State<Arc<IndexSession>>,
    Json(params): Json<PositionParams>,
) -> Result<Json<Option<SrcLocation>>, ApiError> {
    let result = on_worker(move || session.definition(&params.path, params.position)).await?;
    Ok(Json(result))
}

async fn references(
    State(session): State<Arc<IndexSession>>,
    Json(params): Json<ReferenceParams>,
) -> Result<Json<Vec<SrcLocation>>, ApiError> {
    let result = on_worker(move || {
        session.references(&params.path, params.position, params.include_declaration)
    })
    .await?;
    Ok(Json(result))
}

async fn prepare_rename(
    State(session): State<Arc<IndexSession>>,
    Json(params): Json<PositionParams>,
) -> Result<Json<Option<TextRange>>, ApiError> {
    let result = on_worker(move || session.prepare_rename(&params.path, params.position)).await?;
    Ok(Json(result))
}

async fn rename(
    State(session): State<Arc<IndexSession>>,
    Json(params): Json<RenameParams>,
) -> Result<Json<Option<RenamePlan>>, ApiError> {
    let result =
        on_worker(move || session.rename(&params.path, params.position, &params.new_name)).await?;
    Ok(Json(result))
}

async fn completion(
    State(session): State<Arc<IndexSession>>,
    Json(params): Json<PositionParams>,
) -> Result<Json<Vec<String>>, ApiError> {
    let result = on_worker(move || session.completion(&params.path, params.position)).await?;
    Ok(Json(result))
}

async fn did_save(
    State(session): State<Arc<IndexSession>>,
    Json(params): Json<DidSaveParams>,
) -> Result<Json<DidSaveResponse>, ApiError> {
    let reindexed =
        on_worker(move || session.did_save(&params.path, params.content.as_deref())).await?;
    Ok(Json(DidSaveResponse { reindexed }))
}

async fn reindex(
    State(session): State<Arc<IndexSession>>,
) -> Result<Json<IngestSummary>, ApiError> {
    let summary = on_worker(move || session.reindex()).await?;
    Ok(Json(summary))
}

async fn dump(
    State(session): State<Arc<IndexSession>>,
    Json(params): Json<DumpParams>,
) -> Result<Json<DumpParams>, ApiError> {
    let path = params.path.clone();
    on_worker(move || session.dump(&params.path)).await?;
    Ok(Json(DumpParams { path }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TextPosition, WorkspaceConfig};
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use std::path::Path;
    use tempfile::tempdir;

    fn fact(signature: &str, name: &str, value: &str) -> String {
        serde_json::json!({
            "source": { "signature": signature, "path": "m.sv", "language": "verilog", "root": "", "corpus": "" },
            "fact_name": name,
            "fact_value": BASE64.encode(value)
        })
        .to_string()
    }

    fn edge(source: &str, target: &str, kind: &str) -> String {
        serde_json::json!({
            "source": { "signature": source, "path": "m.sv", "language": "verilog", "root": "", "corpus": "" },
            "target": { "signature": target, "path": "m.sv", "language": "verilog", "root": "", "corpus": "" },
            "edge_kind": format!("/kythe/edge{kind}"),
            "fact_name": "/"
        })
        .to_string()
    }

    fn test_session(dir: &Path) -> Arc<IndexSession> {
        let mut lines = vec![
            fact("", "/kythe/node/kind", "file"),
            fact("", "/kythe/text", "module m; wire a; assign a = a; endmodule\n"),
            fact("anchor_a", "/kythe/node/kind", "anchor"),
            fact("anchor_a", "/kythe/loc/start", "15"),
            fact("anchor_a", "/kythe/loc/end", "16"),
            fact("sym_a", "/kythe/node/kind", "variable"),
            fact("sym_a", "/kythe/subkind", "wire"),
            edge("anchor_a", "sym_a", "/defines/binding"),
        ];
        for (sig, start, end) in [("use_lhs", 25, 26), ("use_rhs", 29, 30)] {
            lines.push(fact(sig, "/kythe/node/kind", "anchor"));
            lines.push(fact(sig, "/kythe/loc/start", &start.to_string()));
            lines.push(fact(sig, "/kythe/loc/end", &end.to_string()));
            lines.push(edge(sig, "sym_a", "/ref"));
        }

        let stream_path = dir.join("index.json");
        std::fs::write(&stream_path, lines.join("\n")).expect("write stream");

        let config = WorkspaceConfig {
            index_file_path: stream_path,
            use_prebuilt_index: true,
            ..WorkspaceConfig::default()
        };
        Arc::new(IndexSession::new(config, dir.to_path_buf()).expect("session"))
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok_status() {
        let response = health().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn definition_endpoint_resolves_a_use_site() {
        let dir = tempdir().expect("tempdir");
        let session = test_session(dir.path());

        let params = PositionParams {
            path: "m.sv".into(),
            position: TextPosition::new(0, 29),
        };
        let Json(location) = definition(State(session), Json(params))
            .await
            .expect("response");

        let location = location.expect("location");
        assert_eq!(location.range.start, TextPosition::new(0, 15));
        assert_eq!(location.range.end, TextPosition::new(0, 16));
    }

    #[tokio::test]
    async fn references_endpoint_includes_the_declaration_on_request() {
        let dir = tempdir().expect("tempdir");
        let session = test_session(dir.path());

        let params = ReferenceParams {
            path: "m.sv".into(),
            position: TextPosition::new(0, 15),
            include_declaration: true,
        };
        let Json(locations) = references(State(session), Json(params))
            .await
            .expect("response");
        assert_eq!(locations.len(), 3);
    }

    #[tokio::test]
    async fn rename_endpoint_returns_an_edit_plan() {
        let dir = tempdir().expect("tempdir");
        let session = test_session(dir.path());

        let params = RenameParams {
            path: "m.sv".into(),
            position: TextPosition::new(0, 15),
            new_name: "foo".to_string(),
        };
        let Json(plan) = rename(State(session), Json(params)).await.expect("response");
        assert_eq!(plan.expect("plan").edit_count(), 3);
    }

    #[tokio::test]
    async fn reindex_endpoint_reports_a_summary() {
        let dir = tempdir().expect("tempdir");
        let session = test_session(dir.path());

        let Json(summary) = reindex(State(session)).await.expect("response");
        assert_eq!(summary.files, 1);
        assert_eq!(summary.refs, 2);
        assert!(summary.updated_at.is_some());
    }

    #[tokio::test]
    async fn errors_are_returned_as_json() {
        let dir = tempdir().expect("tempdir");
        let config = WorkspaceConfig {
            index_file_path: dir.path().join("missing.json"),
            use_prebuilt_index: true,
            ..WorkspaceConfig::default()
        };
        let session =
            Arc::new(IndexSession::new(config, dir.path().to_path_buf()).expect("session"));

        let err = reindex(State(session)).await.expect_err("expected error");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
