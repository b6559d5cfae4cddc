//! Desired and observed resource models

use crate::error::{CloudError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of a managed cloud resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Bucket,
    BucketPolicy,
    OriginAccessControl,
    Distribution,
    DnsRecord,
    Certificate,
    IpSet,
    WebAcl,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Bucket => "bucket",
            ResourceKind::BucketPolicy => "bucket-policy",
            ResourceKind::OriginAccessControl => "origin-access-control",
            ResourceKind::Distribution => "distribution",
            ResourceKind::DnsRecord => "dns-record",
            ResourceKind::Certificate => "certificate",
            ResourceKind::IpSet => "ip-set",
            ResourceKind::WebAcl => "web-acl",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identity of a resource: its kind plus identifying key
/// (bucket name, domain name, record name...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub key: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
        }
    }
}

impl std::fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.key)
    }
}

/// Whether the provisioner may mutate a resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    /// Created and updated by the provisioner
    #[default]
    Managed,
    /// Pre-existing input, read only
    Shared,
}

/// Desired configuration of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub kind: ResourceKind,
    pub key: String,

    /// Declared attributes. Only these take part in drift detection;
    /// anything left undeclared keeps its remote value.
    #[serde(default)]
    pub attributes: Map<String, Value>,

    #[serde(default)]
    pub ownership: Ownership,
}

impl ResourceSpec {
    pub fn new(kind: ResourceKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            attributes: Map::new(),
            ownership: Ownership::Managed,
        }
    }

    /// Build a spec from a typed attribute struct
    pub fn from_attributes<T: Serialize>(
        kind: ResourceKind,
        key: impl Into<String>,
        attributes: &T,
    ) -> Result<Self> {
        let key = key.into();
        match serde_json::to_value(attributes)? {
            Value::Object(map) => Ok(Self {
                kind,
                key,
                attributes: map,
                ownership: Ownership::Managed,
            }),
            other => Err(CloudError::InvalidConfig(format!(
                "attributes for {}:{} must serialize to an object, got {}",
                kind, key, other
            ))),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Mark as a read-only input
    pub fn shared(mut self) -> Self {
        self.ownership = Ownership::Shared;
        self
    }

    pub fn is_shared(&self) -> bool {
        self.ownership == Ownership::Shared
    }

    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef::new(self.kind, self.key.clone())
    }

    /// Decode the declared attributes back into their typed form
    pub fn attributes_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.attributes.clone()))?)
    }

    pub fn get_attribute<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.attributes
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Declared attributes whose observed value differs
    pub fn diff(&self, state: &ResourceState) -> Vec<AttributeDrift> {
        self.attributes
            .iter()
            .filter_map(|(name, desired)| {
                let observed = state.attributes.get(name);
                if observed == Some(desired) {
                    None
                } else {
                    Some(AttributeDrift {
                        name: name.clone(),
                        desired: desired.clone(),
                        observed: observed.cloned(),
                    })
                }
            })
            .collect()
    }

    pub fn matches(&self, state: &ResourceState) -> bool {
        self.diff(state).is_empty()
    }
}

/// One attribute that differs between desired and observed state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDrift {
    pub name: String,
    pub desired: Value,
    pub observed: Option<Value>,
}

impl std::fmt::Display for AttributeDrift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.observed {
            Some(observed) => write!(f, "{}: {} -> {}", self.name, observed, self.desired),
            None => write!(f, "{}: (unset) -> {}", self.name, self.desired),
        }
    }
}

/// Coarse status of a remote resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Absent,
    /// Accepted by the control plane but not yet converged
    Pending,
    Deployed,
    /// Terminal failure reported by the control plane
    Error,
}

impl ResourceStatus {
    pub fn is_terminal_error(&self) -> bool {
        matches!(self, ResourceStatus::Error)
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Absent => write!(f, "absent"),
            ResourceStatus::Pending => write!(f, "pending"),
            ResourceStatus::Deployed => write!(f, "deployed"),
            ResourceStatus::Error => write!(f, "error"),
        }
    }
}

/// Observed state of a resource as reported by the Resource API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub kind: ResourceKind,
    pub key: String,
    pub exists: bool,
    pub status: ResourceStatus,

    /// Provider-native status string (e.g. `InProgress`, `PENDING_VALIDATION`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_status: Option<String>,

    /// Version/etag/lock token for optimistic updates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Provider-generated identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub attributes: Map<String, Value>,

    pub observed_at: DateTime<Utc>,
}

impl ResourceState {
    /// An existing resource, deployed unless told otherwise
    pub fn present(kind: ResourceKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
            exists: true,
            status: ResourceStatus::Deployed,
            remote_status: None,
            version: None,
            id: None,
            attributes: Map::new(),
            observed_at: Utc::now(),
        }
    }

    pub fn absent(resource: &ResourceRef) -> Self {
        Self {
            exists: false,
            status: ResourceStatus::Absent,
            ..Self::present(resource.kind, resource.key.clone())
        }
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_remote_status(mut self, remote_status: impl Into<String>) -> Self {
        self.remote_status = Some(remote_status.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) {
        self.attributes.insert(name.into(), value);
    }

    pub fn get_attribute<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.attributes
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(|v| v.as_str())
    }

    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef::new(self.kind, self.key.clone())
    }

    /// Identifier, failing with `MissingOutput` when the provider did not
    /// report one
    pub fn require_id(&self) -> Result<&str> {
        self.id
            .as_deref()
            .ok_or_else(|| CloudError::MissingOutput(format!("id of {}", self.resource_ref())))
    }

    /// Attribute string, failing with `MissingOutput` when absent
    pub fn require_str(&self, name: &str) -> Result<&str> {
        self.get_str(name).ok_or_else(|| {
            CloudError::MissingOutput(format!("{} of {}", name, self.resource_ref()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_undeclared_attributes_are_ignored() {
        let spec = ResourceSpec::new(ResourceKind::DnsRecord, "ALIAS:docs.example.com")
            .with_attribute("values", json!(["d111.cloudfront.net"]));
        let state = ResourceState::present(ResourceKind::DnsRecord, "ALIAS:docs.example.com")
            .with_attribute("values", json!(["d111.cloudfront.net"]))
            .with_attribute("ttl", json!(60));

        assert!(spec.matches(&state));
    }

    #[test]
    fn test_declared_attribute_drift() {
        let spec = ResourceSpec::new(ResourceKind::DnsRecord, "CNAME:_x.example.com")
            .with_attribute("ttl", json!(300));
        let state = ResourceState::present(ResourceKind::DnsRecord, "CNAME:_x.example.com")
            .with_attribute("ttl", json!(60));

        let drift = spec.diff(&state);
        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].name, "ttl");
        assert_eq!(drift[0].to_string(), "ttl: 60 -> 300");
    }

    #[test]
    fn test_missing_observed_attribute_is_drift() {
        let spec =
            ResourceSpec::new(ResourceKind::Bucket, "site-assets").with_attribute("region", json!("us-west-2"));
        let state = ResourceState::present(ResourceKind::Bucket, "site-assets");

        let drift = spec.diff(&state);
        assert_eq!(drift[0].observed, None);
        assert_eq!(drift[0].to_string(), "region: (unset) -> \"us-west-2\"");
    }

    #[test]
    fn test_from_attributes_rejects_non_object() {
        let result = ResourceSpec::from_attributes(ResourceKind::Bucket, "b", &vec![1, 2]);
        assert!(matches!(result, Err(CloudError::InvalidConfig(_))));
    }

    #[test]
    fn test_resource_ref_display() {
        let r = ResourceRef::new(ResourceKind::OriginAccessControl, "site-oac");
        assert_eq!(r.to_string(), "origin-access-control:site-oac");
    }
}
