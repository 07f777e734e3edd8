//! Instance provider abstraction.
//!
//! A provider owns the mapping from tenant identity to a live,
//! network-addressable backend instance. The orchestrator only ever talks to
//! the [`InstanceProvider`] trait, so alternative cluster platforms (or a
//! local dev backend) can be substituted without touching the routing logic.

mod k8s;
pub mod naming;

pub use k8s::K8sProvider;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

/// Where a tenant's instance is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    NotFound,
    Pending,
    Running,
    Stopped,
    Error,
}

/// Snapshot of one tenant's backend instance.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceInfo {
    /// Platform-level identifier (the pod name).
    pub instance_id: String,
    pub status: InstanceStatus,
    /// Reachable base URL; only populated while the instance is running.
    pub url: Option<String>,
    /// Tag identifying which provider produced this record.
    pub provider: String,
}

/// Capability interface over a cluster platform that can create, inspect and
/// delete per-tenant compute units.
#[async_trait]
pub trait InstanceProvider: Send + Sync {
    /// Short tag identifying the backing platform (e.g. `"k8s"`).
    fn name(&self) -> &str;

    /// Read-only lookup of the tenant's instance. Never mutates platform
    /// state; platform communication failures surface as errors.
    async fn instance_info(&self, user_id: &str) -> Result<InstanceInfo>;

    /// Idempotent get-or-create. Returns the instance's base URL once its
    /// entry point resolves and its readiness probe passes.
    ///
    /// Not safe to call concurrently for the same tenant without external
    /// serialization; the orchestrator holds a per-tenant lock around it.
    async fn spawn_instance(&self, user_id: &str) -> Result<String>;

    /// Delete the tenant's compute unit and entry point. Returns `Ok(true)`
    /// if something was deleted, `Ok(false)` if it was already gone.
    async fn despawn_instance(&self, user_id: &str) -> Result<bool>;
}
