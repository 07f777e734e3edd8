//! Tenant-scoped execution facade over an instance provider.
//!
//! The orchestrator knows nothing about tool semantics: it ensures a ready
//! instance exists for the tenant, forwards the invocation, and hands the
//! instance's response back byte-for-byte.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::Result;
use crate::provider::{InstanceInfo, InstanceProvider};

/// Raw response from an instance's tool endpoint, forwarded verbatim.
#[derive(Debug, Clone)]
pub struct ToolResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

pub struct Orchestrator {
    provider: Arc<dyn InstanceProvider>,
    http: reqwest::Client,
    proxy_timeout: Duration,
    /// One spawn lock per tenant; check-and-spawn must be atomic so
    /// concurrent first calls cannot race on the platform's create primitive.
    spawn_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(provider: Arc<dyn InstanceProvider>, proxy_timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            provider,
            http,
            proxy_timeout,
            spawn_locks: DashMap::new(),
        }
    }

    /// Tag of the backing provider, surfaced on the health endpoint.
    #[must_use]
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn instance_info(&self, user_id: &str) -> Result<InstanceInfo> {
        self.provider.instance_info(user_id).await
    }

    /// Ensure a ready instance exists for the tenant, then forward the tool
    /// invocation to it.
    ///
    /// The response is returned unmodified: status code, content type and
    /// body bytes pass through, and instance-side failures (4xx/5xx) are not
    /// retried.
    pub async fn execute(
        &self,
        user_id: &str,
        tool_name: &str,
        arguments: Value,
    ) -> Result<ToolResponse> {
        let url = self.ensure_instance(user_id).await?;

        info!("Routing tool {} for tenant {} to {}", tool_name, user_id, url);

        let response = self
            .http
            .post(format!("{url}/tools/call"))
            .json(&serde_json::json!({ "name": tool_name, "arguments": arguments }))
            .timeout(self.proxy_timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await?;

        Ok(ToolResponse {
            status,
            content_type,
            body,
        })
    }

    pub async fn despawn_instance(&self, user_id: &str) -> Result<bool> {
        self.provider.despawn_instance(user_id).await
    }

    /// Run the provider's get-or-spawn under the tenant's lock.
    async fn ensure_instance(&self, user_id: &str) -> Result<String> {
        let lock = {
            let entry = self
                .spawn_locks
                .entry(user_id.to_string())
                .or_default();
            Arc::clone(&entry)
        };
        let _guard = lock.lock().await;
        self.provider.spawn_instance(user_id).await
    }
}
