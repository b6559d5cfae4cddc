//! Access restriction policy
//!
//! A site is restricted either by an edge firewall (IP-set + web ACL on the
//! distribution) or by source conditions in the bucket policy. Whatever the
//! strategy, the operator's own networks stay in the allow-list, and
//! widening ("unlock") only ever adds sources.

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;
use std::str::FromStr;

/// One allowed traffic source
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SourceRule {
    /// Network in CIDR notation, normalized (`10.0.0.0/8`, `2001:db8::/32`)
    Cidr(String),
    /// VPC endpoint id (`vpce-...`); only meaningful in bucket policies
    VpcEndpoint(String),
}

impl SourceRule {
    pub fn is_ipv6(&self) -> bool {
        matches!(self, SourceRule::Cidr(c) if c.contains(':'))
    }
}

impl FromStr for SourceRule {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with("vpce-") {
            let valid = s.len() > 5 && s[5..].chars().all(|c| c.is_ascii_alphanumeric());
            if !valid {
                return Err(CloudError::InvalidConfig(format!(
                    "invalid VPC endpoint id: {}",
                    s
                )));
            }
            return Ok(SourceRule::VpcEndpoint(s.to_string()));
        }

        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s, None),
        };
        let ip: IpAddr = addr
            .parse()
            .map_err(|_| CloudError::InvalidConfig(format!("invalid IP address: {}", s)))?;
        let max_prefix = if ip.is_ipv4() { 32 } else { 128 };
        let prefix: u8 = match prefix {
            Some(p) => p
                .parse()
                .ok()
                .filter(|p| *p <= max_prefix)
                .ok_or_else(|| CloudError::InvalidConfig(format!("invalid prefix length: {}", s)))?,
            None => max_prefix,
        };
        Ok(SourceRule::Cidr(format!("{}/{}", ip, prefix)))
    }
}

impl TryFrom<String> for SourceRule {
    type Error = CloudError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SourceRule> for String {
    fn from(rule: SourceRule) -> Self {
        rule.to_string()
    }
}

impl std::fmt::Display for SourceRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceRule::Cidr(c) => f.write_str(c),
            SourceRule::VpcEndpoint(v) => f.write_str(v),
        }
    }
}

/// Ordered, de-duplicated set of allowed sources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowList(BTreeSet<SourceRule>);

impl AllowList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a list of CIDRs / VPC endpoint ids
    pub fn parse<S: AsRef<str>>(items: &[S]) -> Result<Self> {
        items
            .iter()
            .map(|s| s.as_ref().parse::<SourceRule>())
            .collect::<Result<BTreeSet<_>>>()
            .map(Self)
    }

    pub fn from_rules(rules: impl IntoIterator<Item = SourceRule>) -> Self {
        Self(rules.into_iter().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, rule: &SourceRule) -> bool {
        self.0.contains(rule)
    }

    pub fn is_superset(&self, other: &AllowList) -> bool {
        self.0.is_superset(&other.0)
    }

    pub fn union(&self, other: &AllowList) -> AllowList {
        Self(self.0.union(&other.0).cloned().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceRule> {
        self.0.iter()
    }

    pub fn ipv4_cidrs(&self) -> BTreeSet<String> {
        self.cidrs(false)
    }

    pub fn ipv6_cidrs(&self) -> BTreeSet<String> {
        self.cidrs(true)
    }

    fn cidrs(&self, v6: bool) -> BTreeSet<String> {
        self.0
            .iter()
            .filter(|r| matches!(r, SourceRule::Cidr(_)) && r.is_ipv6() == v6)
            .map(|r| r.to_string())
            .collect()
    }

    pub fn vpc_endpoints(&self) -> BTreeSet<String> {
        self.0
            .iter()
            .filter_map(|r| match r {
                SourceRule::VpcEndpoint(v) => Some(v.clone()),
                SourceRule::Cidr(_) => None,
            })
            .collect()
    }
}

impl std::fmt::Display for AllowList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let items: Vec<String> = self.0.iter().map(|r| r.to_string()).collect();
        write!(f, "[{}]", items.join(", "))
    }
}

/// Which mechanism restricts access
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessStrategy {
    /// Edge firewall IP allow-list attached to the distribution
    #[default]
    Firewall,
    /// Source conditions in the bucket policy
    BucketPolicy,
}

impl FromStr for AccessStrategy {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "firewall" | "waf" => Ok(AccessStrategy::Firewall),
            "bucket-policy" | "policy" => Ok(AccessStrategy::BucketPolicy),
            other => Err(CloudError::InvalidConfig(format!(
                "unknown access strategy '{}' (expected firewall or bucket-policy)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for AccessStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessStrategy::Firewall => write!(f, "firewall"),
            AccessStrategy::BucketPolicy => write!(f, "bucket-policy"),
        }
    }
}

/// Requested change to the allow-list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessChange {
    /// Restrict to exactly these sources (plus the operator's)
    Lock(AllowList),
    /// Add these sources to whatever is currently allowed
    Widen(AllowList),
}

/// Strategy plus the operator networks that must never be locked out
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPolicy {
    #[serde(default)]
    pub strategy: AccessStrategy,
    #[serde(default)]
    pub operator: AllowList,
}

impl AccessPolicy {
    pub fn new(strategy: AccessStrategy, operator: AllowList) -> Self {
        Self { strategy, operator }
    }

    /// Allow-list that results from applying `change` to `current`
    pub fn resolve(&self, change: &AccessChange, current: &AllowList) -> Result<AllowList> {
        let next = match change {
            AccessChange::Lock(allow) => allow.union(&self.operator),
            AccessChange::Widen(extra) => current.union(extra).union(&self.operator),
        };

        if next.is_empty() {
            return Err(CloudError::InvalidConfig(
                "allow-list would be empty; declare at least one allowed or operator network"
                    .to_string(),
            ));
        }
        if self.strategy == AccessStrategy::Firewall && !next.vpc_endpoints().is_empty() {
            return Err(CloudError::InvalidConfig(format!(
                "VPC endpoint sources are only supported by the bucket-policy strategy: {}",
                next
            )));
        }
        Ok(next)
    }
}
