//! Naming conventions for per-tenant instance resources.
//!
//! Instance pods follow the pattern `blender-{user_id}`; their NodePort
//! services follow `service-{user_id}`. Derivation must stay pure so repeated
//! calls for the same tenant always land on the same resources.

use crate::error::Error;

const MAX_K8S_NAME_LENGTH: usize = 63;
const POD_PREFIX: &str = "blender-";
const SERVICE_PREFIX: &str = "service-";

/// Longest tenant id whose derived names stay within the Kubernetes limit.
pub const MAX_USER_ID_LENGTH: usize = MAX_K8S_NAME_LENGTH - SERVICE_PREFIX.len();

/// Naming utilities for instance resources.
pub struct InstanceNaming;

impl InstanceNaming {
    /// Pod name for a tenant's instance.
    #[must_use]
    pub fn pod_name(user_id: &str) -> String {
        format!("{POD_PREFIX}{user_id}")
    }

    /// Service name for a tenant's instance entry point.
    #[must_use]
    pub fn service_name(user_id: &str) -> String {
        format!("{SERVICE_PREFIX}{user_id}")
    }

    /// Check that a tenant id can be embedded in RFC 1123 resource names.
    ///
    /// Ids are rejected rather than sanitized: collapsing invalid characters
    /// would let two distinct tenants derive the same resource names.
    pub fn validate_user_id(user_id: &str) -> Result<(), Error> {
        let reason = if user_id.is_empty() {
            Some("must not be empty".to_string())
        } else if user_id.len() > MAX_USER_ID_LENGTH {
            Some(format!("must be at most {MAX_USER_ID_LENGTH} characters"))
        } else if !user_id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            Some("must contain only lowercase alphanumerics and '-'".to_string())
        } else if user_id.starts_with('-') || user_id.ends_with('-') {
            Some("must start and end with an alphanumeric".to_string())
        } else {
            None
        };

        match reason {
            Some(reason) => Err(Error::InvalidTenant {
                user_id: user_id.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }
}
