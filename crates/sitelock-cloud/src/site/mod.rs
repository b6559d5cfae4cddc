//! Private static site pipeline
//!
//! Resources of one site and the identities that own them:
//!
//! | resource | identity |
//! |---|---|
//! | bucket, bucket policy | storage |
//! | origin access control, distribution, IP sets, web ACL | cdn |
//! | DNS records | dns |
//! | certificate | certificate |

pub mod attributes;
mod ops;
mod steps;

pub use ops::{
    ObservedResource, TeardownOptions, certificate_run, dns_alias_run, lock_run, observe_site,
    provision_run, teardown_run, unlock_run,
};
pub use steps::{
    AccessRestrictionStep, BucketStep, CertificateStep, DistributionStep, DnsAliasStep,
    LookupDistributionStep, OriginAccessStep, RemoveCertificateStep, RemoveDistributionStep,
    RemoveFirewallStep, RemoveStep,
};

use crate::access::{AccessPolicy, AllowList};
use crate::api::{Identities, ResourceApi};
use crate::error::{CloudError, Result};
use crate::model::{ResourceKind, ResourceRef};
use crate::waiter::WaitPolicy;
use attributes::{DnsRecordAttributes, DnsRecordType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Well-known pipeline output keys
pub mod output {
    pub const BUCKET_NAME: &str = "bucket_name";
    pub const OAC_ID: &str = "origin_access_control_id";
    pub const DISTRIBUTION_ID: &str = "distribution_id";
    pub const DISTRIBUTION_DOMAIN: &str = "distribution_domain";
    pub const DISTRIBUTION_ARN: &str = "distribution_arn";
    pub const WEB_ACL_ARN: &str = "web_acl_arn";
    pub const CERTIFICATE_ARN: &str = "certificate_arn";
    pub const DNS_RECORD: &str = "dns_record";
}

/// Edge cache TTL bounds in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheTtl {
    pub min: u64,
    pub default: u64,
    pub max: u64,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            min: 0,
            default: 86_400,
            max: 31_536_000,
        }
    }
}

/// Everything needed to build the pipelines of one site
#[derive(Debug, Clone, PartialEq)]
pub struct SiteSettings {
    /// Logical site name, used to key the distribution and firewall
    pub name: String,
    pub bucket: String,
    pub domain: Option<String>,
    pub region: String,
    pub identities: Identities,
    pub cache: CacheTtl,
    pub default_root_object: String,
    pub price_class: String,
    pub access: AccessPolicy,
    /// Sources allowed in by `provision` and `lock`
    pub allow: AllowList,
    pub distribution_wait: WaitPolicy,
    pub certificate_wait: WaitPolicy,
    /// Use an existing certificate read-only instead of requesting one
    pub reuse_certificate: bool,
}

impl SiteSettings {
    pub fn new(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        let bucket = bucket.into();
        Self {
            name: bucket.clone(),
            bucket,
            domain: None,
            region: region.into(),
            identities: Identities::default(),
            cache: CacheTtl::default(),
            default_root_object: "index.html".to_string(),
            price_class: "PriceClass_200".to_string(),
            access: AccessPolicy::default(),
            allow: AllowList::new(),
            distribution_wait: WaitPolicy::default(),
            certificate_wait: WaitPolicy::default(),
            reuse_certificate: false,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_bucket_name(&self.bucket)?;
        if self.name.is_empty() {
            return Err(CloudError::InvalidConfig("site name is empty".to_string()));
        }
        if let Some(domain) = &self.domain {
            if domain.is_empty() || domain.contains('/') || !domain.contains('.') {
                return Err(CloudError::InvalidConfig(format!(
                    "invalid domain name: {}",
                    domain
                )));
            }
        }
        if !(self.cache.min <= self.cache.default && self.cache.default <= self.cache.max) {
            return Err(CloudError::InvalidConfig(format!(
                "cache TTLs must satisfy min <= default <= max (got {} / {} / {})",
                self.cache.min, self.cache.default, self.cache.max
            )));
        }
        self.distribution_wait.validate()?;
        self.certificate_wait.validate()?;
        Ok(())
    }

    pub fn require_domain(&self) -> Result<&str> {
        self.domain
            .as_deref()
            .ok_or_else(|| CloudError::InvalidConfig("no domain configured for this site".into()))
    }

    /// Regional REST endpoint of the bucket, used as the distribution origin
    pub fn origin_domain(&self) -> String {
        self.origin_domain_for(&self.bucket)
    }

    pub fn origin_domain_for(&self, bucket: &str) -> String {
        format!(
            "{}.s3.{}.amazonaws.com",
            bucket,
            self.identities.storage.region_or(&self.region)
        )
    }

    pub fn bucket_ref(&self) -> ResourceRef {
        ResourceRef::new(ResourceKind::Bucket, self.bucket.clone())
    }

    pub fn bucket_policy_ref(&self) -> ResourceRef {
        ResourceRef::new(ResourceKind::BucketPolicy, self.bucket.clone())
    }

    pub fn oac_ref(&self) -> ResourceRef {
        ResourceRef::new(ResourceKind::OriginAccessControl, format!("{}-oac", self.name))
    }

    pub fn distribution_ref(&self) -> ResourceRef {
        ResourceRef::new(ResourceKind::Distribution, self.name.clone())
    }

    pub fn ip_set_ref(&self, ipv6: bool) -> ResourceRef {
        let suffix = if ipv6 { "v6" } else { "v4" };
        ResourceRef::new(
            ResourceKind::IpSet,
            format!("{}-allow-{}", self.name, suffix),
        )
    }

    pub fn web_acl_ref(&self) -> ResourceRef {
        ResourceRef::new(ResourceKind::WebAcl, format!("{}-acl", self.name))
    }

    pub fn alias_ref(&self) -> Option<ResourceRef> {
        self.domain.as_deref().map(|domain| {
            ResourceRef::new(
                ResourceKind::DnsRecord,
                DnsRecordAttributes::key_for(DnsRecordType::Alias, domain),
            )
        })
    }

    pub fn certificate_ref(&self) -> Option<ResourceRef> {
        self.domain
            .as_deref()
            .map(|domain| ResourceRef::new(ResourceKind::Certificate, domain))
    }

    /// Every resource the site may own, in provisioning order
    pub fn resources(&self) -> Vec<ResourceRef> {
        let mut refs = vec![
            self.bucket_ref(),
            self.oac_ref(),
            self.distribution_ref(),
            self.bucket_policy_ref(),
            self.ip_set_ref(false),
            self.ip_set_ref(true),
            self.web_acl_ref(),
        ];
        refs.extend(self.alias_ref());
        refs.extend(self.certificate_ref());
        refs
    }
}

/// Bucket naming rules shared by the major object stores
fn validate_bucket_name(name: &str) -> Result<()> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.');
    let valid_edges = name
        .chars()
        .next()
        .zip(name.chars().last())
        .is_some_and(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric());

    if !(3..=63).contains(&name.len()) || !valid_chars || !valid_edges || name.contains("..") {
        return Err(CloudError::InvalidConfig(format!(
            "invalid bucket name '{}': use 3-63 lowercase letters, digits, dots or hyphens",
            name
        )));
    }
    Ok(())
}

/// Resource API per identity boundary
#[derive(Clone)]
pub struct Backends {
    pub storage: Arc<dyn ResourceApi>,
    pub cdn: Arc<dyn ResourceApi>,
    pub dns: Arc<dyn ResourceApi>,
    pub certificate: Arc<dyn ResourceApi>,
}

impl Backends {
    /// One API for every boundary
    pub fn single(api: Arc<dyn ResourceApi>) -> Self {
        Self {
            storage: api.clone(),
            cdn: api.clone(),
            dns: api.clone(),
            certificate: api,
        }
    }

    pub fn for_kind(&self, kind: ResourceKind) -> &Arc<dyn ResourceApi> {
        match kind {
            ResourceKind::Bucket | ResourceKind::BucketPolicy => &self.storage,
            ResourceKind::OriginAccessControl
            | ResourceKind::Distribution
            | ResourceKind::IpSet
            | ResourceKind::WebAcl => &self.cdn,
            ResourceKind::DnsRecord => &self.dns,
            ResourceKind::Certificate => &self.certificate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Identity;

    #[test]
    fn test_defaults_and_refs() {
        let settings = SiteSettings::new("site-assets", "ap-northeast-1").with_domain("docs.example.com");
        settings.validate().unwrap();

        assert_eq!(settings.name, "site-assets");
        assert_eq!(
            settings.origin_domain(),
            "site-assets.s3.ap-northeast-1.amazonaws.com"
        );
        assert_eq!(settings.oac_ref().key, "site-assets-oac");
        assert_eq!(
            settings.alias_ref().unwrap().key,
            "ALIAS:docs.example.com"
        );
        assert_eq!(settings.resources().len(), 9);
    }

    #[test]
    fn test_origin_uses_storage_region() {
        let mut settings = SiteSettings::new("site-assets", "ap-northeast-1");
        settings.identities.storage = Identity::profile("storage").with_region("us-west-2");
        assert_eq!(
            settings.origin_domain(),
            "site-assets.s3.us-west-2.amazonaws.com"
        );
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        assert!(SiteSettings::new("Site_Assets", "us-east-1").validate().is_err());
        assert!(SiteSettings::new("ab", "us-east-1").validate().is_err());
        assert!(SiteSettings::new("-site", "us-east-1").validate().is_err());

        let mut settings = SiteSettings::new("site-assets", "us-east-1");
        settings.cache = CacheTtl {
            min: 100,
            default: 10,
            max: 1000,
        };
        assert!(settings.validate().is_err());

        let settings = SiteSettings::new("site-assets", "us-east-1").with_domain("localhost");
        assert!(settings.validate().is_err());
    }
}
