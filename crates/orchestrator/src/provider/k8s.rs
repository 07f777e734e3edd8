//! Kubernetes-backed instance provider.
//!
//! One tenant maps to one Pod plus one NodePort Service in the configured
//! namespace. The provider never caches platform state: every lookup
//! re-queries the API server so reads stay consistent with the cluster.

use std::time::Instant;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
use serde_json::json;
use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::error::{Error, Result};
use crate::health::wait_for_health;
use crate::provider::naming::InstanceNaming;
use crate::provider::{InstanceInfo, InstanceProvider, InstanceStatus};

const PROVIDER_NAME: &str = "k8s";

pub struct K8sProvider {
    client: Client,
    config: OrchestratorConfig,
    http: reqwest::Client,
}

impl K8sProvider {
    /// Connect to the cluster using in-cluster config or the local
    /// kubeconfig, whichever resolves.
    pub async fn new(config: OrchestratorConfig) -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| Error::NotInitialized(e.to_string()))?;
        info!("K8s provider initialized (namespace: {})", config.namespace);
        Ok(Self::with_client(client, config))
    }

    /// Build a provider around an existing client.
    #[must_use]
    pub fn with_client(client: Client, config: OrchestratorConfig) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            config,
            http,
        }
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }

    fn services(&self) -> Api<Service> {
        Api::namespaced(self.client.clone(), &self.config.namespace)
    }

    /// Resolve the NodePort entry point for a tenant, if its pod is running.
    async fn instance_url(&self, user_id: &str) -> Result<Option<String>> {
        let pod = match self.pods().get(&InstanceNaming::pod_name(user_id)).await {
            Ok(pod) => pod,
            Err(kube::Error::Api(ae)) if ae.code == 404 => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if pod_phase(&pod) != Some("Running") {
            return Ok(None);
        }

        let service = match self
            .services()
            .get(&InstanceNaming::service_name(user_id))
            .await
        {
            Ok(service) => service,
            Err(kube::Error::Api(ae)) if ae.code == 404 => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let node_port = service
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.as_ref())
            .and_then(|ports| ports.first())
            .and_then(|port| port.node_port);

        Ok(node_port.map(|port| format!("http://{}:{}", self.config.node_address, port)))
    }

    /// Poll until the entry point resolves or the bound expires.
    async fn await_entry_point(&self, user_id: &str) -> Result<String> {
        let deadline = Instant::now() + self.config.entry_point_timeout;
        loop {
            if let Some(url) = self.instance_url(user_id).await? {
                return Ok(url);
            }
            if Instant::now() + self.config.poll_interval > deadline {
                return Err(Error::CreationTimeout {
                    user_id: user_id.to_string(),
                    reason: "entry point never became resolvable".to_string(),
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[async_trait]
impl InstanceProvider for K8sProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn instance_info(&self, user_id: &str) -> Result<InstanceInfo> {
        InstanceNaming::validate_user_id(user_id)?;
        let pod_name = InstanceNaming::pod_name(user_id);

        let (status, url) = match self.pods().get(&pod_name).await {
            Ok(pod) => {
                let status = pod_phase(&pod).map_or(InstanceStatus::Pending, phase_to_status);
                let url = if status == InstanceStatus::Running {
                    self.instance_url(user_id).await?
                } else {
                    None
                };
                (status, url)
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => (InstanceStatus::NotFound, None),
            Err(e) => return Err(e.into()),
        };

        Ok(InstanceInfo {
            instance_id: pod_name,
            status,
            url,
            provider: PROVIDER_NAME.to_string(),
        })
    }

    async fn spawn_instance(&self, user_id: &str) -> Result<String> {
        InstanceNaming::validate_user_id(user_id)?;

        if let Some(url) = self.instance_url(user_id).await? {
            // Existing instance: short liveness probe, but the address is
            // trusted either way. A later proxy failure is the caller's to
            // retry.
            if !wait_for_health(
                &self.http,
                &url,
                self.config.reuse_probe_timeout,
                self.config.poll_interval,
            )
            .await
            {
                warn!(
                    "Instance for tenant {} at {} is addressable but failing health checks",
                    user_id, url
                );
            }
            return Ok(url);
        }

        let pod_name = InstanceNaming::pod_name(user_id);
        let service_name = InstanceNaming::service_name(user_id);
        info!("Spawning instance pod {}", pod_name);

        let pod: Pod = serde_json::from_value(build_pod_manifest(&self.config, user_id))?;
        match self.pods().create(&PostParams::default(), &pod).await {
            Ok(_) => info!("✅ Created pod {}", pod_name),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                // Another orchestrator process won the create race; fall
                // through to the readiness polls on the shared resources.
                info!("Pod {} was created concurrently", pod_name);
            }
            Err(e) => return Err(e.into()),
        }

        let service: Service =
            serde_json::from_value(build_service_manifest(&self.config, user_id))?;
        match self
            .services()
            .create(&PostParams::default(), &service)
            .await
        {
            Ok(_) => info!("✅ Created service {}", service_name),
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                info!("Service {} was created concurrently", service_name);
            }
            Err(e) => return Err(e.into()),
        }

        let url = self.await_entry_point(user_id).await?;

        if !wait_for_health(
            &self.http,
            &url,
            self.config.health_timeout,
            self.config.poll_interval,
        )
        .await
        {
            return Err(Error::CreationTimeout {
                user_id: user_id.to_string(),
                reason: "instance never passed its readiness probe".to_string(),
            });
        }

        info!("✅ Instance for tenant {} ready at {}", user_id, url);
        Ok(url)
    }

    async fn despawn_instance(&self, user_id: &str) -> Result<bool> {
        InstanceNaming::validate_user_id(user_id)?;
        let pod_name = InstanceNaming::pod_name(user_id);
        let service_name = InstanceNaming::service_name(user_id);
        info!("Despawning instance pod {}", pod_name);

        match self.pods().delete(&pod_name, &DeleteParams::default()).await {
            Ok(_) => {}
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                warn!("Pod {} not found, already deleted", pod_name);
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }

        // Entry-point deletion is best-effort; the pod is the unit of record.
        if let Err(e) = self
            .services()
            .delete(&service_name, &DeleteParams::default())
            .await
        {
            warn!("Failed to delete service {}: {}", service_name, e);
        }

        info!("✅ Deleted pod {}", pod_name);
        Ok(true)
    }
}

fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|status| status.phase.as_deref())
}

fn phase_to_status(phase: &str) -> InstanceStatus {
    match phase {
        "Pending" => InstanceStatus::Pending,
        "Running" => InstanceStatus::Running,
        "Succeeded" => InstanceStatus::Stopped,
        _ => InstanceStatus::Error,
    }
}

fn build_pod_manifest(config: &OrchestratorConfig, user_id: &str) -> serde_json::Value {
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": InstanceNaming::pod_name(user_id),
            "labels": { "app": "blender-mcp", "user": user_id }
        },
        "spec": {
            "containers": [{
                "name": "blender-mcp",
                "image": config.instance_image,
                "imagePullPolicy": "IfNotPresent",
                "ports": [{ "containerPort": config.instance_port }],
                "env": [{ "name": "PORT", "value": config.instance_port.to_string() }]
            }],
            "restartPolicy": "Never"
        }
    })
}

fn build_service_manifest(config: &OrchestratorConfig, user_id: &str) -> serde_json::Value {
    json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {
            "name": InstanceNaming::service_name(user_id)
        },
        "spec": {
            "type": "NodePort",
            "selector": { "app": "blender-mcp", "user": user_id },
            "ports": [{
                "protocol": "TCP",
                "port": config.instance_port,
                "targetPort": config.instance_port
            }]
        }
    })
}
