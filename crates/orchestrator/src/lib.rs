#![allow(clippy::missing_errors_doc, clippy::doc_markdown)]

//! Orchestrator core library
//!
//! This crate provides the core functionality for the multi-tenant instance
//! orchestration service: a provider abstraction over the cluster platform,
//! per-tenant spawn/despawn lifecycle management, and transparent routing of
//! tool invocations to the tenant's backend instance.

pub mod config;
pub mod error;
pub mod health;
pub mod provider;
pub mod server;
pub mod service;

// Re-export commonly used types
pub use config::OrchestratorConfig;
pub use error::{Error, Result};
pub use provider::{InstanceInfo, InstanceProvider, InstanceStatus, K8sProvider};
pub use service::{Orchestrator, ToolResponse};
