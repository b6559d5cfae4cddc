//! Typed desired attributes per resource kind
//!
//! Each struct serializes into the attribute map of a [`ResourceSpec`].
//! `None` fields are left out of the map and therefore out of drift
//! detection, so several steps can each declare the subset they own on the
//! same resource (the distribution in particular).

use crate::error::Result;
use crate::model::{ResourceKind, ResourceSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Provider-reported ARN of a resource
pub const ARN: &str = "arn";
/// Public hostname of a distribution
pub const DOMAIN_NAME: &str = "domain_name";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_public_access: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OacAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_behavior: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_protocol: Option<String>,
}

impl OacAttributes {
    /// Always-sign SigV4 for an S3 origin
    pub fn s3() -> Self {
        Self {
            origin_type: Some("s3".to_string()),
            signing_behavior: Some("always".to_string()),
            signing_protocol: Some("sigv4".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistributionAttributes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_access_control_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_root_object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_ttl: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_ttl: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ttl: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Attached web ACL; an empty string means detached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_acl_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_arn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpSetAttributes {
    /// `IPV4` or `IPV6`
    pub ip_version: String,
    pub addresses: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebAclAttributes {
    pub ip_set_arns: BTreeSet<String>,
    /// Action for requests that match no rule: `block` or `allow`
    pub default_action: String,
}

/// Bucket policy: distribution read grant plus optional direct-access
/// source conditions. Source sets are always declared so that emptying them
/// counts as drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketPolicyAttributes {
    pub bucket: String,
    pub distribution_arn: String,
    #[serde(default)]
    pub source_ips: BTreeSet<String>,
    #[serde(default)]
    pub source_vpces: BTreeSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsRecordType {
    /// Provider-neutral alias to a distribution hostname (A/AAAA alias on
    /// Route 53, flattened CNAME elsewhere)
    Alias,
    Cname,
    Txt,
}

impl DnsRecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DnsRecordType::Alias => "ALIAS",
            DnsRecordType::Cname => "CNAME",
            DnsRecordType::Txt => "TXT",
        }
    }
}

impl std::str::FromStr for DnsRecordType {
    type Err = crate::error::CloudError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ALIAS" => Ok(DnsRecordType::Alias),
            "CNAME" => Ok(DnsRecordType::Cname),
            "TXT" => Ok(DnsRecordType::Txt),
            other => Err(crate::error::CloudError::InvalidConfig(format!(
                "unsupported DNS record type: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsRecordAttributes {
    pub name: String,
    pub record_type: DnsRecordType,
    pub values: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
}

impl DnsRecordAttributes {
    /// Resource key of a record: `TYPE:name`
    pub fn key_for(record_type: DnsRecordType, name: &str) -> String {
        format!("{}:{}", record_type.as_str(), name.trim_end_matches('.'))
    }

    /// Split a record key back into type and name
    pub fn parse_key(key: &str) -> Result<(DnsRecordType, String)> {
        let (record_type, name) = key.split_once(':').ok_or_else(|| {
            crate::error::CloudError::InvalidConfig(format!("malformed DNS record key: {}", key))
        })?;
        Ok((record_type.parse()?, name.to_string()))
    }

    pub fn key(&self) -> String {
        Self::key_for(self.record_type, &self.name)
    }

    pub fn into_spec(self) -> Result<ResourceSpec> {
        ResourceSpec::from_attributes(ResourceKind::DnsRecord, self.key(), &self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificateAttributes {
    pub domain: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub subject_alternative_names: BTreeSet<String>,
    pub validation_method: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_distribution_attributes() {
        let attrs = DistributionAttributes {
            web_acl_id: Some(String::new()),
            ..Default::default()
        };
        let spec =
            ResourceSpec::from_attributes(ResourceKind::Distribution, "site", &attrs).unwrap();
        assert_eq!(spec.attributes.len(), 1);
        assert_eq!(spec.attributes["web_acl_id"], json!(""));
    }

    #[test]
    fn test_bucket_policy_declares_empty_sources() {
        let attrs = BucketPolicyAttributes {
            bucket: "site-assets".into(),
            distribution_arn: "arn:aws:cloudfront::1:distribution/E1".into(),
            source_ips: BTreeSet::new(),
            source_vpces: BTreeSet::new(),
        };
        let spec =
            ResourceSpec::from_attributes(ResourceKind::BucketPolicy, "site-assets", &attrs)
                .unwrap();
        assert_eq!(spec.attributes["source_ips"], json!([]));
    }

    #[test]
    fn test_dns_record_key() {
        let record = DnsRecordAttributes {
            name: "docs.example.com.".into(),
            record_type: DnsRecordType::Alias,
            values: BTreeSet::from(["d111.cloudfront.net".to_string()]),
            ttl: None,
        };
        assert_eq!(record.key(), "ALIAS:docs.example.com");

        let spec = record.into_spec().unwrap();
        assert_eq!(spec.attributes["record_type"], json!("ALIAS"));
        assert!(!spec.attributes.contains_key("ttl"));

        let (record_type, name) = DnsRecordAttributes::parse_key("CNAME:_x.example.com").unwrap();
        assert_eq!(record_type, DnsRecordType::Cname);
        assert_eq!(name, "_x.example.com");
        assert!(DnsRecordAttributes::parse_key("nope").is_err());
    }
}
