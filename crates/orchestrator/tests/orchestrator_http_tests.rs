//! End-to-end tests for the orchestrator's HTTP surface.
//!
//! A stub provider stands in for the cluster platform and a mock instance
//! server stands in for the tool-executing backend, so the full
//! request → spawn → proxy → response path runs over real sockets.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::Json as AxumJson;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use orchestrator::server::{router, AppState};
use orchestrator::{
    Error, InstanceInfo, InstanceProvider, InstanceStatus, Orchestrator, Result,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;

const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

// =============================================================================
// Stub Provider
// =============================================================================

/// In-memory provider: one flag per "cluster", no real resources.
struct StubProvider {
    url: String,
    exists: AtomicBool,
    spawn_calls: AtomicUsize,
    fail_with_timeout: bool,
}

impl StubProvider {
    fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            exists: AtomicBool::new(false),
            spawn_calls: AtomicUsize::new(0),
            fail_with_timeout: false,
        }
    }

    fn failing(url: impl Into<String>) -> Self {
        Self {
            fail_with_timeout: true,
            ..Self::new(url)
        }
    }
}

#[async_trait]
impl InstanceProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn instance_info(&self, user_id: &str) -> Result<InstanceInfo> {
        let exists = self.exists.load(Ordering::SeqCst);
        Ok(InstanceInfo {
            instance_id: format!("blender-{user_id}"),
            status: if exists {
                InstanceStatus::Running
            } else {
                InstanceStatus::NotFound
            },
            url: exists.then(|| self.url.clone()),
            provider: "stub".to_string(),
        })
    }

    async fn spawn_instance(&self, user_id: &str) -> Result<String> {
        self.spawn_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_with_timeout {
            return Err(Error::CreationTimeout {
                user_id: user_id.to_string(),
                reason: "entry point never became resolvable".to_string(),
            });
        }
        self.exists.store(true, Ordering::SeqCst);
        Ok(self.url.clone())
    }

    async fn despawn_instance(&self, _user_id: &str) -> Result<bool> {
        Ok(self.exists.swap(false, Ordering::SeqCst))
    }
}

// =============================================================================
// Mock Instance Server
// =============================================================================

#[derive(Debug, serde::Deserialize)]
struct ToolCall {
    name: String,
    #[allow(dead_code)]
    arguments: Value,
}

async fn mock_tools_call(AxumJson(call): AxumJson<ToolCall>) -> impl IntoResponse {
    match call.name.as_str() {
        "render_scene" => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "image/png")],
            PNG_MAGIC.to_vec(),
        )
            .into_response(),
        "broken_tool" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "application/json")],
            r#"{"error":"tool crashed"}"#.to_string(),
        )
            .into_response(),
        _ => (
            StatusCode::CREATED,
            [(header::CONTENT_TYPE, "application/json")],
            r#"{"ok":true}"#.to_string(),
        )
            .into_response(),
    }
}

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn start_mock_instance() -> SocketAddr {
    let app = Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .route("/tools/call", post(mock_tools_call));
    serve(app).await
}

/// Start the orchestrator's HTTP server over a stub provider. Returns the
/// server address and the provider for assertions.
async fn start_orchestrator(provider: StubProvider) -> (SocketAddr, Arc<StubProvider>) {
    let provider = Arc::new(provider);
    let orchestrator = Arc::new(Orchestrator::new(provider.clone(), Duration::from_secs(5)));
    let addr = serve(router(AppState {
        orchestrator: Some(orchestrator),
    }))
    .await;
    (addr, provider)
}

fn execute_body(user_id: &str, tool_name: &str) -> Value {
    json!({ "user_id": user_id, "tool_name": tool_name, "arguments": {} })
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn execute_forwards_instance_response_verbatim() {
    let instance = start_mock_instance().await;
    let (addr, _provider) = start_orchestrator(StubProvider::new(format!("http://{instance}"))).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/execute"))
        .json(&execute_body("alice", "add_cube"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 201);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/json"
    );
    assert_eq!(response.text().await.unwrap(), r#"{"ok":true}"#);
}

#[tokio::test]
async fn execute_forwards_binary_payloads_untouched() {
    let instance = start_mock_instance().await;
    let (addr, _provider) = start_orchestrator(StubProvider::new(format!("http://{instance}"))).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/execute"))
        .json(&execute_body("alice", "render_scene"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/png"
    );
    assert_eq!(response.bytes().await.unwrap().as_ref(), PNG_MAGIC);
}

#[tokio::test]
async fn execute_forwards_instance_failures_without_retrying() {
    let instance = start_mock_instance().await;
    let (addr, provider) = start_orchestrator(StubProvider::new(format!("http://{instance}"))).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/execute"))
        .json(&execute_body("alice", "broken_tool"))
        .send()
        .await
        .unwrap();

    // The orchestrator is transparent: a 500 from the instance comes back as
    // a 500, after a single spawn and a single proxy attempt.
    assert_eq!(response.status().as_u16(), 500);
    assert_eq!(response.text().await.unwrap(), r#"{"error":"tool crashed"}"#);
    assert_eq!(provider.spawn_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn execute_without_user_id_is_rejected_before_the_provider() {
    let (addr, provider) = start_orchestrator(StubProvider::new("http://127.0.0.1:9")).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/execute"))
        .json(&json!({ "tool_name": "add_cube", "arguments": {} }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("user_id"));
    assert_eq!(provider.spawn_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn execute_with_empty_tool_name_is_rejected() {
    let (addr, provider) = start_orchestrator(StubProvider::new("http://127.0.0.1:9")).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/execute"))
        .json(&json!({ "user_id": "alice", "tool_name": "", "arguments": {} }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(provider.spawn_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn spawn_timeout_surfaces_as_gateway_timeout() {
    let (addr, _provider) = start_orchestrator(StubProvider::failing("http://127.0.0.1:9")).await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/execute"))
        .json(&execute_body("alice", "add_cube"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 504);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("did not become ready"));
}

#[tokio::test]
async fn get_instance_reports_the_provider_record() {
    let instance = start_mock_instance().await;
    let (addr, _provider) = start_orchestrator(StubProvider::new(format!("http://{instance}"))).await;
    let client = reqwest::Client::new();

    let body: Value = client
        .get(format!("http://{addr}/instance/alice"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "not_found");
    assert_eq!(body["instance_id"], "blender-alice");
    assert_eq!(body["url"], Value::Null);
    assert_eq!(body["provider"], "stub");

    client
        .post(format!("http://{addr}/execute"))
        .json(&execute_body("alice", "add_cube"))
        .send()
        .await
        .unwrap();

    let body: Value = client
        .get(format!("http://{addr}/instance/alice"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "running");
    assert!(body["url"].as_str().is_some());
}

#[tokio::test]
async fn despawn_reports_distinguishable_outcomes() {
    let instance = start_mock_instance().await;
    let (addr, _provider) = start_orchestrator(StubProvider::new(format!("http://{instance}"))).await;
    let client = reqwest::Client::new();

    client
        .post(format!("http://{addr}/execute"))
        .json(&execute_body("alice", "add_cube"))
        .send()
        .await
        .unwrap();

    let response = client
        .delete(format!("http://{addr}/instance/alice"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("despawned"));

    let response = client
        .delete(format!("http://{addr}/instance/alice"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
    let body: Value = response.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn endpoints_answer_503_when_the_provider_never_initialized() {
    let addr = serve(router(AppState { orchestrator: None })).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["mode"], "uninitialized");

    for request in [
        client.get(format!("http://{addr}/instance/alice")),
        client.delete(format!("http://{addr}/instance/alice")),
        client
            .post(format!("http://{addr}/execute"))
            .json(&execute_body("alice", "add_cube")),
    ] {
        let response = request.send().await.unwrap();
        assert_eq!(response.status().as_u16(), 503);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("not initialized"));
    }
}

#[tokio::test]
async fn health_reports_the_provider_mode() {
    let (addr, _provider) = start_orchestrator(StubProvider::new("http://127.0.0.1:9")).await;

    let body: Value = reqwest::Client::new()
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "healthy");
    assert_eq!(body["mode"], "stub");
}
