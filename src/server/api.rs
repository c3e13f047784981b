use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;

use crate::controller::RunController;
use crate::errors::ControllerError;
use crate::models::{ProjectCategory, ProjectRequest, RunId};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub controller: RunController,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateRunRequest {
    pub title: String,
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub requirements: Vec<String>,
}

impl CreateRunRequest {
    fn into_project_request(self) -> Result<ProjectRequest, ApiError> {
        let category = ProjectCategory::from_str(&self.category).map_err(ApiError::BadRequest)?;
        let request = ProjectRequest::new(self.title, self.description, category)
            .with_requirements(self.requirements);
        request.validate().map_err(ApiError::BadRequest)?;
        Ok(request)
    }
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<ControllerError> for ApiError {
    fn from(err: ControllerError) -> Self {
        match err {
            ControllerError::RunNotFound { .. } | ControllerError::ArchiveNotFound { .. } => {
                ApiError::NotFound(err.to_string())
            }
            ControllerError::Store(_) => ApiError::Internal(err.to_string()),
        }
    }
}

fn parse_run_id(id: &str) -> Result<RunId, ApiError> {
    RunId::from_str(id).map_err(ApiError::BadRequest)
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/runs", get(list_runs).post(create_run))
        .route("/api/runs/{id}", get(get_run))
        .route("/api/runs/{id}/artifacts", get(list_artifacts))
        .route("/api/runs/{id}/download", get(download_archive))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_runs(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.controller.list().await)
}

async fn create_run(
    State(state): State<SharedState>,
    Json(req): Json<CreateRunRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let request = req.into_project_request()?;
    let id = state.controller.submit(request).await;
    let run = state.controller.status(&id).await?;
    Ok((StatusCode::ACCEPTED, Json(run)))
}

async fn get_run(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_run_id(&id)?;
    Ok(Json(state.controller.status(&id).await?))
}

async fn list_artifacts(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_run_id(&id)?;
    Ok(Json(state.controller.artifacts(&id).await?))
}

async fn download_archive(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_run_id(&id)?;
    let archive = state.controller.archive_location(&id).await?;
    let bytes = tokio::fs::read(&archive.path)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to read archive: {}", e)))?;

    let disposition = format!("attachment; filename=\"project_{}.tar.gz\"", id);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/gzip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactStore, MemoryArtifactStore, TarballPackager};
    use crate::llm::OfflineGenerator;
    use crate::models::Run;
    use crate::pipeline::{PipelineConfig, PipelineOrchestrator};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_state(dir: &TempDir) -> SharedState {
        let store: Arc<dyn ArtifactStore> = Arc::new(MemoryArtifactStore::new());
        let packager = Arc::new(TarballPackager::new(store.clone(), dir.path()));
        let orchestrator = PipelineOrchestrator::new(
            PipelineConfig::default(),
            Arc::new(OfflineGenerator),
            |role| role.to_string(),
            store,
            packager,
        );
        Arc::new(AppState {
            controller: RunController::new(orchestrator),
        })
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn post_run(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/runs")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let dir = TempDir::new().unwrap();
        let app = api_router().with_state(test_state(&dir));

        let response = app.oneshot(get("/health")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_create_run_then_download() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let app = api_router().with_state(state.clone());

        let response = app
            .clone()
            .oneshot(post_run(serde_json::json!({
                "title": "T",
                "description": "D",
                "category": "web_app",
                "requirements": []
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let run: Run = body_json(response.into_body()).await;

        state.controller.wait(&run.id).await.unwrap();

        let response = app
            .clone()
            .oneshot(get(&format!("/api/runs/{}", run.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let fetched: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(fetched["status"], "succeeded");
        assert_eq!(fetched["current_phase"], 7);

        let response = app
            .clone()
            .oneshot(get(&format!("/api/runs/{}/artifacts", run.id)))
            .await
            .unwrap();
        let paths: Vec<String> = body_json(response.into_body()).await;
        assert!(paths.contains(&"main.py".to_string()));

        let response = app
            .oneshot(get(&format!("/api/runs/{}/download", run.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/gzip"
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
    }

    #[tokio::test]
    async fn test_create_run_rejects_bad_input() {
        let dir = TempDir::new().unwrap();
        let app = api_router().with_state(test_state(&dir));

        let response = app
            .clone()
            .oneshot(post_run(serde_json::json!({
                "title": "T", "description": "D", "category": "spaceship"
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(post_run(serde_json::json!({
                "title": "  ", "description": "D", "category": "ai_ml"
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = body_json(response.into_body()).await;
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_run_is_404() {
        let dir = TempDir::new().unwrap();
        let app = api_router().with_state(test_state(&dir));
        let id = RunId::new();

        for uri in [
            format!("/api/runs/{}", id),
            format!("/api/runs/{}/artifacts", id),
            format!("/api/runs/{}/download", id),
        ] {
            let response = app.clone().oneshot(get(&uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
        }

        let response = app.oneshot(get("/api/runs/not-a-uuid")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_runs() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir);
        let app = api_router().with_state(state.clone());

        let response = app.clone().oneshot(get("/api/runs")).await.unwrap();
        let runs: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert!(runs.is_empty());

        let run = state
            .controller
            .execute(ProjectRequest::new("T", "D", ProjectCategory::DataAnalysis))
            .await
            .unwrap();

        let response = app.oneshot(get("/api/runs")).await.unwrap();
        let runs: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0]["id"], run.id.to_string());
        assert_eq!(runs[0]["status"], "succeeded");
    }
}
