//! `sitelock.yaml` model
//!
//! ```yaml
//! site:
//!   name: docs
//!   bucket: site-assets
//!   domain: docs.example.com
//!   region: ap-northeast-1
//! identities:
//!   storage: { profile: site-admin }
//!   cdn: { profile: site-admin }
//!   certificate: { profile: site-admin }
//!   dns: { provider: route53, profile: dns-admin, zone_id: Z0123456789 }
//! cache: { min: 0, default: 3600, max: 86400 }
//! access:
//!   strategy: firewall
//!   operator: [203.0.113.0/24]
//!   allow: [198.51.100.7]
//! polling:
//!   distribution: { max_attempts: 60, initial_delay_ms: 30000 }
//! ```

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use sitelock_cloud::{
    AccessPolicy, AccessStrategy, AllowList, CacheTtl, Identities, Identity, SiteSettings,
    WaitPolicy,
};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteFile {
    #[serde(default)]
    pub site: SiteSection,
    #[serde(default)]
    pub identities: IdentitySection,
    #[serde(default)]
    pub cache: CacheTtl,
    #[serde(default)]
    pub access: AccessSection,
    #[serde(default)]
    pub polling: PollingSection,
    #[serde(default)]
    pub certificate: CertificateSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteSection {
    pub name: Option<String>,
    pub bucket: Option<String>,
    pub domain: Option<String>,
    pub region: Option<String>,
    pub default_root_object: Option<String>,
    pub price_class: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentitySection {
    #[serde(default)]
    pub storage: Identity,
    #[serde(default)]
    pub cdn: Identity,
    #[serde(default)]
    pub certificate: Identity,
    #[serde(default)]
    pub dns: DnsIdentity,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DnsProvider {
    #[default]
    Route53,
    Cloudflare,
}

/// DNS boundary: Route 53 under some AWS profile, or a Cloudflare zone
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DnsIdentity {
    #[serde(default)]
    pub provider: DnsProvider,
    pub profile: Option<String>,
    pub region: Option<String>,
    /// Route 53 hosted zone id (looked up by name when omitted) or
    /// Cloudflare zone id (required)
    pub zone_id: Option<String>,
    /// Variable holding the Cloudflare API token
    pub api_token_env: Option<String>,
}

impl DnsIdentity {
    pub fn identity(&self) -> Identity {
        Identity {
            profile: self.profile.clone(),
            region: self.region.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessSection {
    #[serde(default)]
    pub strategy: AccessStrategy,
    /// Networks that are always allowed
    #[serde(default)]
    pub operator: AllowList,
    /// Sources applied by `provision` and `lock`
    #[serde(default)]
    pub allow: AllowList,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollingSection {
    #[serde(default)]
    pub distribution: WaitPolicy,
    #[serde(default)]
    pub certificate: WaitPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CertificateSection {
    /// Use an existing issued certificate read-only
    #[serde(default)]
    pub reuse: bool,
}

impl SiteFile {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn identities(&self) -> Identities {
        Identities {
            storage: self.identities.storage.clone(),
            cdn: self.identities.cdn.clone(),
            dns: self.identities.dns.identity(),
            certificate: self.identities.certificate.clone(),
        }
    }

    /// Resolve into validated site settings. Bucket and region must be set
    /// by now (from the file or command-line overrides).
    pub fn to_settings(&self) -> Result<SiteSettings> {
        let bucket = self
            .site
            .bucket
            .clone()
            .ok_or(ConfigError::MissingField("site.bucket"))?;
        let region = self
            .site
            .region
            .clone()
            .ok_or(ConfigError::MissingField("site.region"))?;

        let mut settings = SiteSettings::new(bucket, region);
        if let Some(name) = &self.site.name {
            settings.name = name.clone();
        }
        settings.domain = self.site.domain.clone();
        if let Some(root) = &self.site.default_root_object {
            settings.default_root_object = root.clone();
        }
        if let Some(price_class) = &self.site.price_class {
            settings.price_class = price_class.clone();
        }
        settings.identities = self.identities();
        settings.cache = self.cache;
        settings.access = AccessPolicy::new(self.access.strategy, self.access.operator.clone());
        settings.allow = self.access.allow.clone();
        settings.distribution_wait = self.polling.distribution.clone();
        settings.certificate_wait = self.polling.certificate.clone();
        settings.reuse_certificate = self.certificate.reuse;

        settings.validate()?;
        Ok(settings)
    }
}
