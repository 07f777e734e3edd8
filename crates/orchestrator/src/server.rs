//! HTTP surface of the orchestrator.
//!
//! Thin axum layer over [`Orchestrator`]: request validation, error-to-status
//! mapping, and verbatim forwarding of instance responses.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use crate::error::Error;
use crate::service::{Orchestrator, ToolResponse};

#[derive(Clone)]
pub struct AppState {
    /// `None` when the provider failed to initialize at startup; every
    /// orchestrator endpoint then answers 503 instead of partially operating.
    pub orchestrator: Option<Arc<Orchestrator>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/execute", post(execute))
        .route(
            "/instance/{user_id}",
            get(get_instance).delete(despawn_instance),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let mode = state
        .orchestrator
        .as_deref()
        .map_or("uninitialized", Orchestrator::provider_name);
    Json(json!({ "status": "healthy", "mode": mode }))
}

async fn get_instance(State(state): State<AppState>, Path(user_id): Path<String>) -> Response {
    let Some(orchestrator) = state.orchestrator else {
        return not_initialized();
    };
    match orchestrator.instance_info(&user_id).await {
        Ok(info) => Json(info).into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    tool_name: Option<String>,
    #[serde(default)]
    arguments: Option<Value>,
}

async fn execute(State(state): State<AppState>, Json(request): Json<ExecuteRequest>) -> Response {
    // Validate before touching the provider.
    let (Some(user_id), Some(tool_name)) = (
        request.user_id.filter(|id| !id.is_empty()),
        request.tool_name.filter(|name| !name.is_empty()),
    ) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing user_id or tool_name" })),
        )
            .into_response();
    };

    let Some(orchestrator) = state.orchestrator else {
        return not_initialized();
    };

    let arguments = request.arguments.unwrap_or_else(|| json!({}));
    match orchestrator.execute(&user_id, &tool_name, arguments).await {
        Ok(upstream) => forward_response(upstream),
        Err(e) => error_response(&e),
    }
}

async fn despawn_instance(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Response {
    let Some(orchestrator) = state.orchestrator else {
        return not_initialized();
    };
    match orchestrator.despawn_instance(&user_id).await {
        Ok(true) => (
            StatusCode::OK,
            Json(json!({ "message": format!("Instance for user {user_id} despawned successfully") })),
        )
            .into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": format!("Instance for user {user_id} not found") })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// Rebuild the instance's response without reinterpreting it.
fn forward_response(upstream: ToolResponse) -> Response {
    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = Response::new(Body::from(upstream.body));
    *response.status_mut() = status;
    if let Some(content_type) = upstream
        .content_type
        .and_then(|value| HeaderValue::from_str(&value).ok())
    {
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
    }
    response
}

fn error_response(err: &Error) -> Response {
    let status = match err {
        Error::NotInitialized(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::CreationTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        Error::InvalidTenant { .. } => StatusCode::BAD_REQUEST,
        Error::Proxy(_) => StatusCode::BAD_GATEWAY,
        Error::Platform(_) | Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error!("Orchestration error: {}", err);
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

fn not_initialized() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "Orchestrator not initialized" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_map_to_distinct_statuses() {
        let timeout = Error::CreationTimeout {
            user_id: "alice".to_string(),
            reason: "entry point never became resolvable".to_string(),
        };
        assert_eq!(error_response(&timeout).status(), StatusCode::GATEWAY_TIMEOUT);

        let uninitialized = Error::NotInitialized("no cluster".to_string());
        assert_eq!(
            error_response(&uninitialized).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );

        let invalid = Error::InvalidTenant {
            user_id: "Alice".to_string(),
            reason: "must contain only lowercase alphanumerics and '-'".to_string(),
        };
        assert_eq!(error_response(&invalid).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn forwarded_response_preserves_status_and_content_type() {
        let upstream = ToolResponse {
            status: 201,
            content_type: Some("application/json".to_string()),
            body: axum::body::Bytes::from_static(b"{\"ok\":true}"),
        };
        let response = forward_response(upstream);
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn forwarded_response_tolerates_missing_content_type() {
        let upstream = ToolResponse {
            status: 204,
            content_type: None,
            body: axum::body::Bytes::new(),
        };
        let response = forward_response(upstream);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
    }
}
