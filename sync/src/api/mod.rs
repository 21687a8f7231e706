use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
};
use tower_http::normalize_path::NormalizePath;
use tower_http::trace::TraceLayer;

use crate::service::{Operation, OperationReport, SyncService};

pub mod runs;

pub use runs::{RunError, RunGuard, RunRegistry};

// ---------- shared state ----------

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<SyncService>,
    pub runs: Arc<RunRegistry>,
}

// ---------- error type ----------

/// A JSON error response: `{"error": "..."}` with an HTTP status.
pub struct ApiErr(StatusCode, String);

impl ApiErr {
    pub fn internal(e: impl std::fmt::Display) -> Self {
        Self(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self(StatusCode::CONFLICT, msg.into())
    }
}

impl From<RunError> for ApiErr {
    fn from(e: RunError) -> Self {
        match e {
            RunError::AlreadyRunning(_) => Self::conflict(e.to_string()),
            RunError::Failed(inner) => Self::internal(inner),
            RunError::Aborted { .. } => Self::internal(e),
        }
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.1 });
        (self.0, Json(body)).into_response()
    }
}

// ---------- router ----------

/// The API routes, with trailing slashes trimmed before routing.
pub fn api_router(state: ApiState) -> NormalizePath<Router> {
    let router = Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route("/api/datasets/refresh", patch(refresh))
        .route("/api/datasets/description", get(describe))
        .route("/api/datasets/sync", post(sync))
        .route("/api/changelog", post(changelog))
        .layer(TraceLayer::new_for_http())
        .with_state(state);
    NormalizePath::trim_trailing_slash(router)
}

// ---------- handlers ----------

async fn trigger(state: &ApiState, operation: Operation) -> Result<Json<OperationReport>, ApiErr> {
    let report = state
        .runs
        .run_exclusive(&state.service, operation)
        .await?;
    Ok(Json(report))
}

async fn refresh(State(state): State<ApiState>) -> Result<Json<OperationReport>, ApiErr> {
    trigger(&state, Operation::Refresh).await
}

async fn describe(State(state): State<ApiState>) -> Result<Json<OperationReport>, ApiErr> {
    trigger(&state, Operation::Enrich).await
}

async fn sync(State(state): State<ApiState>) -> Result<Json<OperationReport>, ApiErr> {
    trigger(&state, Operation::Sync).await
}

async fn changelog(State(state): State<ApiState>) -> Result<Json<OperationReport>, ApiErr> {
    trigger(&state, Operation::Changelog).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeCatalog, FakeGlossary, FakeInventory};
    use crate::registrar::DatasetTemplate;
    use crate::service::ServiceSettings;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use std::time::Duration;
    use tower::ServiceExt;

    fn make_state(catalog: FakeCatalog) -> ApiState {
        state_with(Arc::new(catalog))
    }

    fn state_with(catalog: Arc<FakeCatalog>) -> ApiState {
        let settings = ServiceSettings {
            reporting_schema: "dbo".into(),
            excluded_tables: Default::default(),
            template: DatasetTemplate {
                database_id: 2,
                schema: "dbo".into(),
                owner_id: 1,
            },
            dictionary: "Dict".into(),
        };
        let service = SyncService::new(
            catalog,
            Arc::new(FakeGlossary::new()),
            Arc::new(FakeInventory::new().with_table("A", &["id"])),
            settings,
            None,
        );
        ApiState {
            service: Arc::new(service),
            runs: Arc::new(RunRegistry::new()),
        }
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn json(res: Response) -> serde_json::Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_ok() {
        let res = api_router(make_state(FakeCatalog::new()))
            .oneshot(request(Method::GET, "/health"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn refresh_returns_report() {
        let catalog = FakeCatalog::new().with_dataset(1, "A", &["id"]);
        let res = api_router(make_state(catalog))
            .oneshot(request(Method::PATCH, "/api/datasets/refresh"))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let body = json(res).await;
        assert_eq!(body["operation"], "refresh");
        assert_eq!(body["processed"], 1);
        assert!(body["run_id"].is_string());
    }

    #[tokio::test]
    async fn sync_registers_new_table() {
        let res = api_router(make_state(FakeCatalog::new()))
            .oneshot(request(Method::POST, "/api/datasets/sync"))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json(res).await["processed"], 1);
    }

    #[tokio::test]
    async fn describe_uses_get() {
        let res = api_router(make_state(FakeCatalog::new()))
            .oneshot(request(Method::POST, "/api/datasets/description"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn running_operation_conflicts() {
        let state = make_state(FakeCatalog::new());
        let _held = state.runs.try_start(Operation::Changelog).unwrap();

        let res = api_router(state.clone())
            .oneshot(request(Method::POST, "/api/changelog"))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert_eq!(json(res).await["error"], "changelog is already running");
    }

    #[tokio::test]
    async fn fatal_error_is_500() {
        let res = api_router(make_state(FakeCatalog::new().login_fails()))
            .oneshot(request(Method::GET, "/api/datasets/description"))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json(res).await;
        assert!(body["error"].as_str().unwrap().to_lowercase().contains("login failed"));
    }

    #[tokio::test]
    async fn guard_released_after_run() {
        let state = make_state(FakeCatalog::new());
        let router = api_router(state.clone());

        let res = router
            .oneshot(request(Method::PATCH, "/api/datasets/refresh"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(state.runs.running_since(Operation::Refresh).is_none());
    }

    #[tokio::test]
    async fn trailing_slash_is_routed() {
        let catalog = FakeCatalog::new().with_dataset(1, "A", &["id"]);
        let res = api_router(make_state(catalog))
            .oneshot(request(Method::PATCH, "/api/datasets/refresh/"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn run_completes_after_client_disconnects() {
        let mut catalog = FakeCatalog::new().slow_refresh(Duration::from_millis(20));
        for id in 1..=5 {
            catalog = catalog.with_dataset(id, &format!("T{id}"), &["id"]);
        }
        let catalog = Arc::new(catalog);
        let state = state_with(catalog.clone());

        let call = api_router(state.clone()).oneshot(request(Method::PATCH, "/api/datasets/refresh"));
        // client gives up long before the five refreshes are done
        assert!(tokio::time::timeout(Duration::from_millis(30), call).await.is_err());

        tokio::time::timeout(Duration::from_secs(5), async {
            while state.runs.running_since(Operation::Refresh).is_some() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(catalog.refreshed().len(), 5);
    }
}
