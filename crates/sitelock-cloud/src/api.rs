//! Resource API trait definition

use crate::error::Result;
use crate::model::{ResourceRef, ResourceSpec, ResourceState, ResourceStatus};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Control-plane abstraction the provisioner drives
///
/// Every backend (the AWS CLI, the Cloudflare DNS API, the in-memory
/// simulator) implements this trait. Wire formats stay behind it: callers only
/// exchange [`ResourceSpec`] and [`ResourceState`].
#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// Returns the backend name (e.g., "aws", "cloudflare")
    fn name(&self) -> &str;

    /// Check that the backend is configured and its credentials are valid
    async fn check_auth(&self) -> Result<AuthStatus>;

    /// Read a resource. `Ok(None)` means it does not exist.
    async fn get(&self, resource: &ResourceRef) -> Result<Option<ResourceState>>;

    /// Create a resource from its spec.
    ///
    /// Returns `CloudError::AlreadyExists` when another writer created the
    /// same key first.
    async fn create(&self, spec: &ResourceSpec) -> Result<ResourceState>;

    /// Apply the declared attributes of `spec` to an existing resource.
    ///
    /// Undeclared attributes keep their remote value. `version` is the token
    /// read before the update; a stale token yields `CloudError::Conflict`.
    async fn update(&self, spec: &ResourceSpec, version: Option<&str>) -> Result<ResourceState>;

    /// Delete a resource. Returns `false` when it did not exist.
    async fn delete(&self, resource: &ResourceRef) -> Result<bool>;

    /// Current status, used by the convergence poller
    async fn get_status(&self, resource: &ResourceRef) -> Result<ResourceStatus> {
        Ok(self
            .get(resource)
            .await?
            .map(|state| state.status)
            .unwrap_or(ResourceStatus::Absent))
    }
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// Credential selector for one account boundary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Named credential profile; `None` uses the backend default chain
    #[serde(default)]
    pub profile: Option<String>,

    /// Region override for this identity
    #[serde(default)]
    pub region: Option<String>,
}

impl Identity {
    pub fn profile(profile: impl Into<String>) -> Self {
        Self {
            profile: Some(profile.into()),
            region: None,
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Region for this identity, falling back to the site region
    pub fn region_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.region.as_deref().unwrap_or(default)
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let profile = self.profile.as_deref().unwrap_or("default");
        match &self.region {
            Some(region) => write!(f, "{} ({})", profile, region),
            None => write!(f, "{}", profile),
        }
    }
}

/// One identity per account boundary a site touches.
///
/// Storage+CDN and DNS commonly live in different accounts, so each is
/// selected independently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identities {
    #[serde(default)]
    pub storage: Identity,
    #[serde(default)]
    pub cdn: Identity,
    #[serde(default)]
    pub dns: Identity,
    #[serde(default)]
    pub certificate: Identity,
}

impl Identities {
    /// Use the same identity for every boundary
    pub fn uniform(identity: Identity) -> Self {
        Self {
            storage: identity.clone(),
            cdn: identity.clone(),
            dns: identity.clone(),
            certificate: identity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_region_fallback() {
        let identity = Identity::profile("dns-admin");
        assert_eq!(identity.region_or("ap-northeast-1"), "ap-northeast-1");

        let identity = identity.with_region("us-east-1");
        assert_eq!(identity.region_or("ap-northeast-1"), "us-east-1");
        assert_eq!(identity.to_string(), "dns-admin (us-east-1)");
    }

    #[test]
    fn test_identities_deserialize_partial() {
        let identities: Identities =
            serde_json::from_str(r#"{"dns": {"profile": "dns-account"}}"#).unwrap();
        assert_eq!(identities.dns.profile.as_deref(), Some("dns-account"));
        assert_eq!(identities.storage, Identity::default());
    }
}
