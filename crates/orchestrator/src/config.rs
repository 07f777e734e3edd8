//! Environment-derived configuration for the orchestrator and its provider.

use std::time::Duration;

/// Runtime configuration, read once at process start.
///
/// Every field has a default suitable for a local minikube cluster; the
/// environment variables named below override them.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Namespace instance pods and services are created in (`K8S_NAMESPACE`).
    pub namespace: String,
    /// Node address used to reach NodePort services (`NODE_ADDRESS`).
    pub node_address: String,
    /// Container image for tenant instances (`INSTANCE_IMAGE`).
    pub instance_image: String,
    /// Port the instance container listens on (`INSTANCE_PORT`).
    pub instance_port: i32,
    /// Address the orchestrator HTTP server binds to (`BIND_ADDRESS`).
    pub bind_address: String,
    /// How long to wait for a freshly created instance's entry point to
    /// resolve (`ENTRY_POINT_TIMEOUT_SECS`).
    pub entry_point_timeout: Duration,
    /// How long to wait for a freshly created instance to pass its readiness
    /// probe (`HEALTH_TIMEOUT_SECS`).
    pub health_timeout: Duration,
    /// Short probe window when reusing an already-addressable instance.
    pub reuse_probe_timeout: Duration,
    /// Timeout for a single forwarded tool invocation (`PROXY_TIMEOUT_SECS`).
    pub proxy_timeout: Duration,
    /// Fixed interval between poll attempts.
    pub poll_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            node_address: "192.168.49.2".to_string(), // minikube node
            instance_image: "blender-mcp:latest".to_string(),
            instance_port: 8080,
            bind_address: "0.0.0.0:5001".to_string(),
            entry_point_timeout: Duration::from_secs(30),
            health_timeout: Duration::from_secs(60),
            reuse_probe_timeout: Duration::from_secs(5),
            proxy_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl OrchestratorConfig {
    /// Build a configuration from the process environment, falling back to
    /// defaults for anything unset or unparseable.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(namespace) = std::env::var("K8S_NAMESPACE") {
            config.namespace = namespace;
        }
        if let Ok(address) = std::env::var("NODE_ADDRESS") {
            config.node_address = address;
        }
        if let Ok(image) = std::env::var("INSTANCE_IMAGE") {
            config.instance_image = image;
        }
        if let Some(port) = env_parse("INSTANCE_PORT") {
            config.instance_port = port;
        }
        if let Ok(bind) = std::env::var("BIND_ADDRESS") {
            config.bind_address = bind;
        }
        if let Some(secs) = env_parse("ENTRY_POINT_TIMEOUT_SECS") {
            config.entry_point_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("HEALTH_TIMEOUT_SECS") {
            config.health_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("PROXY_TIMEOUT_SECS") {
            config.proxy_timeout = Duration::from_secs(secs);
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}
