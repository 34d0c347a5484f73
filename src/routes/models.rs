//! Models API Routes
//!
//! Operator surface over the reload coordinator: status, forced rebuilds,
//! change notifications and model lookups.

use crate::error::{AppError, ApiResult};
use crate::registry::{PropertyBag, PublishedElement};
use crate::reload::{Generation, ModelsStatus};
use crate::schema::RuntimeType;
use crate::state::SharedState;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

// ==================== Request/Response Types ====================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    pub status: ModelsStatus,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildResponse {
    pub success: bool,
    pub message: String,
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub models: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfoResponse {
    pub success: bool,
    pub alias: String,
    pub registered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    pub runtime_type: String,
    pub version: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindRequest {
    pub content_type_alias: String,
    #[serde(default)]
    pub values: HashMap<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindResponse {
    pub success: bool,
    pub key: Uuid,
    pub content_type_alias: String,
    /// `None` when no typed model exists for the alias
    pub model_type: Option<String>,
}

/// `ensure_ready` may compile; keep it off the async workers
async fn ready_generation(state: &SharedState) -> ApiResult<Arc<Generation>> {
    let coordinator = Arc::clone(&state.coordinator);
    tokio::task::spawn_blocking(move || coordinator.ensure_ready())
        .await
        .map_err(|e| AppError::Internal(format!("Models build task failed: {}", e)))
}

// ==================== Handlers ====================

/// Current build state, without triggering a build
pub async fn models_status(State(state): State<SharedState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        success: true,
        status: state.coordinator.status(),
    })
}

/// Invalidate and rebuild now
pub async fn rebuild_models(State(state): State<SharedState>) -> ApiResult<Json<RebuildResponse>> {
    info!("Models rebuild requested");
    state.coordinator.invalidate();
    let generation = ready_generation(&state).await?;
    let error = state.coordinator.get_last_error();

    Ok(Json(RebuildResponse {
        success: error.is_none(),
        message: match &error {
            None => format!("Models version {} is ready", generation.version),
            Some(_) => format!("Rebuild failed, serving models version {}", generation.version),
        },
        version: generation.version,
        fingerprint: generation.fingerprint.clone(),
        models: generation.registry.len(),
        error,
    }))
}

/// The schema store reports changed content types
pub async fn notify_schema_changed(State(state): State<SharedState>) -> Json<MessageResponse> {
    state.watcher.on_schema_changed();
    Json(MessageResponse {
        success: true,
        message: "Models invalidated".to_string(),
    })
}

/// The schema store reports changed data types
pub async fn notify_data_type_changed(State(state): State<SharedState>) -> Json<MessageResponse> {
    state.watcher.on_data_type_changed();
    Json(MessageResponse {
        success: true,
        message: "Models invalidated".to_string(),
    })
}

/// Registration and runtime type of one content type alias
pub async fn get_model(
    State(state): State<SharedState>,
    Path(alias): Path<String>,
) -> ApiResult<Json<ModelInfoResponse>> {
    debug!("Looking up model for {}", alias);
    let generation = ready_generation(&state).await?;
    let entry = generation.registry.get(&alias);
    let runtime_type = generation
        .registry
        .map_runtime_type(&RuntimeType::model(alias.clone()));

    Ok(Json(ModelInfoResponse {
        success: true,
        registered: entry.is_some(),
        type_name: entry.map(|e| e.type_name().to_string()),
        runtime_type: runtime_type.to_string(),
        version: generation.version,
        alias,
    }))
}

/// Bind a property bag to its typed model
pub async fn bind_model(
    State(state): State<SharedState>,
    Json(req): Json<BindRequest>,
) -> ApiResult<Json<BindResponse>> {
    if req.content_type_alias.trim().is_empty() {
        return Err(AppError::BadRequest("contentTypeAlias is required".to_string()));
    }

    let generation = ready_generation(&state).await?;
    let element: Arc<dyn PublishedElement> =
        Arc::new(PropertyBag::new(req.content_type_alias.clone()).with_values(req.values));
    let model = generation.registry.create_model(element);

    Ok(Json(BindResponse {
        success: true,
        key: model.key(),
        content_type_alias: req.content_type_alias,
        model_type: model.model_type().map(str::to_string),
    }))
}

#[cfg(test)]
mod tests {
    use crate::backend::{ManifestCompiler, ManifestEmitter};
    use crate::config::Settings;
    use crate::generation::GenerationCache;
    use crate::reload::{CoordinatorOptions, ReloadCoordinator};
    use crate::routes::create_router;
    use crate::schema::{ContentTypeRecord, MemorySchemaStore, SchemaDocument};
    use crate::snapshot::{BindingNamePolicy, SchemaSnapshotBuilder};
    use crate::state::AppState;
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app(dir: &TempDir) -> Router {
        let document = SchemaDocument {
            content_types: vec![ContentTypeRecord {
                id: 1,
                alias: "blogPost".to_string(),
                name: "Blog Post".to_string(),
                description: None,
                parent_id: -1,
                is_element: false,
                composition_ids: vec![],
                properties: vec![],
            }],
            ..SchemaDocument::default()
        };
        let coordinator = ReloadCoordinator::new(
            SchemaSnapshotBuilder::new(Arc::new(MemorySchemaStore::new(document)), BindingNamePolicy::PascalAlias),
            Arc::new(ManifestEmitter::new()),
            Arc::new(ManifestCompiler::new()),
            GenerationCache::new(dir.path()),
            CoordinatorOptions::default(),
        );
        let settings = Settings::default();
        create_router(Arc::new(AppState::new(coordinator, settings.clone())), &settings)
    }

    async fn call(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(body) => Body::from(body.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_check() {
        let dir = TempDir::new().unwrap();
        let (status, body) = call(app(&dir), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn test_bind_known_and_unknown_aliases() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir);

        let (status, body) = call(
            app.clone(),
            Method::POST,
            "/api/models/bind",
            Some(json!({ "contentTypeAlias": "blogPost", "values": { "title": "Hello" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["modelType"], "BlogPost");

        let (_, body) = call(
            app.clone(),
            Method::POST,
            "/api/models/bind",
            Some(json!({ "contentTypeAlias": "newsItem" })),
        )
        .await;
        assert_eq!(body["modelType"], Value::Null);

        let (status, _) = call(app, Method::POST, "/api/models/bind", Some(json!({ "contentTypeAlias": " " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_rebuild_and_lookup() {
        let dir = TempDir::new().unwrap();
        let app = app(&dir);

        let (_, body) = call(app.clone(), Method::GET, "/api/models/status", None).await;
        assert_eq!(body["status"]["state"], "stale");

        let (status, body) = call(app.clone(), Method::POST, "/api/models/rebuild", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["models"], 1);

        let (_, body) = call(app.clone(), Method::GET, "/api/models/blogPost", None).await;
        assert_eq!(body["registered"], true);
        assert_eq!(body["runtimeType"], "BlogPost");

        let (_, body) = call(app.clone(), Method::GET, "/api/models/missing", None).await;
        assert_eq!(body["registered"], false);
        assert_eq!(body["runtimeType"], "Element");

        let (_, body) = call(app.clone(), Method::POST, "/api/models/notify/schema", None).await;
        assert_eq!(body["success"], true);
        let (_, body) = call(app, Method::GET, "/api/models/status", None).await;
        assert_eq!(body["status"]["state"], "stale");
        assert_eq!(body["status"]["outOfDate"], true);
    }
}
