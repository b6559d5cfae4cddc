//! Cloudflare DNS Resource API implementation
//!
//! Only DNS records are served here; every other kind belongs to the
//! storage/CDN account. Cloudflare has no conditional write for records;
//! the version token is built from each record's id and `modified_on`, and
//! an update re-reads the records and refuses to write when it moved.

use crate::dns::{AUTO_TTL, ApiDnsRecord, CloudflareDns, DnsConfig, DnsRecordRequest, wire_type};
use crate::error::CloudflareError;
use async_trait::async_trait;
use sitelock_cloud::site::attributes::{DnsRecordAttributes, DnsRecordType};
use sitelock_cloud::{
    AuthStatus, CloudError, ResourceApi, ResourceKind, ResourceRef, ResourceSpec, ResourceState,
};
use std::collections::BTreeSet;

pub struct CloudflareDnsApi {
    dns: CloudflareDns,
}

/// Writes needed to turn the current records of one name/type into the
/// desired set
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RecordChanges {
    pub create: Vec<DnsRecordRequest>,
    pub update: Vec<(String, DnsRecordRequest)>,
    pub delete: Vec<String>,
}

impl RecordChanges {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

impl CloudflareDnsApi {
    pub fn new(config: DnsConfig) -> Self {
        Self {
            dns: CloudflareDns::new(config),
        }
    }

    fn dns_only(resource: &ResourceRef) -> sitelock_cloud::Result<()> {
        if resource.kind != ResourceKind::DnsRecord {
            return Err(CloudError::InvalidConfig(format!(
                "Cloudflare backend only manages DNS records, not {}",
                resource.kind
            )));
        }
        Ok(())
    }

    async fn records(
        &self,
        resource: &ResourceRef,
    ) -> sitelock_cloud::Result<(DnsRecordType, String, Vec<ApiDnsRecord>)> {
        Self::dns_only(resource)?;
        let (record_type, name) = DnsRecordAttributes::parse_key(&resource.key)?;
        let records = self
            .dns
            .find_records(&name, wire_type(record_type))
            .await?;
        Ok((record_type, name, records))
    }

    async fn apply(&self, changes: RecordChanges) -> Result<(), CloudflareError> {
        for request in &changes.create {
            self.dns.create_record(request).await?;
        }
        for (id, request) in &changes.update {
            self.dns.update_record(id, request).await?;
        }
        for id in &changes.delete {
            self.dns.delete_record(id).await?;
        }
        Ok(())
    }

    async fn read_back(&self, spec: &ResourceSpec) -> sitelock_cloud::Result<ResourceState> {
        self.get(&spec.resource_ref()).await?.ok_or_else(|| {
            CloudError::Api(format!(
                "{} was written but cannot be read back",
                spec.resource_ref()
            ))
        })
    }
}

fn normalize_content(record_type: DnsRecordType, content: &str) -> String {
    match record_type {
        DnsRecordType::Txt => content.trim_matches('"').to_string(),
        _ => content.trim_end_matches('.').to_ascii_lowercase(),
    }
}

/// Logical attributes of the records stored under one name/type
pub fn observed_attributes(
    record_type: DnsRecordType,
    name: &str,
    records: &[ApiDnsRecord],
) -> DnsRecordAttributes {
    DnsRecordAttributes {
        name: name.to_string(),
        record_type,
        values: records
            .iter()
            .map(|r| normalize_content(record_type, &r.content))
            .collect(),
        ttl: records
            .first()
            .map(|r| r.ttl)
            .filter(|ttl| *ttl != AUTO_TTL),
    }
}

/// Diff current records against the desired attributes. Records whose
/// content is still wanted are kept (and re-TTL'd if needed); the rest are
/// deleted and missing values created.
pub fn plan_changes(existing: &[ApiDnsRecord], desired: &DnsRecordAttributes) -> RecordChanges {
    let ttl = desired.ttl.unwrap_or(AUTO_TTL);
    let request = |content: &str| DnsRecordRequest {
        r#type: wire_type(desired.record_type).to_string(),
        name: desired.name.clone(),
        content: content.to_string(),
        ttl,
        proxied: false,
    };

    let mut changes = RecordChanges::default();
    let mut kept = BTreeSet::new();
    for record in existing {
        let content = normalize_content(desired.record_type, &record.content);
        if desired.values.contains(&content) && !kept.contains(&content) {
            if record.ttl != ttl || record.proxied {
                changes.update.push((record.id.clone(), request(&content)));
            }
            kept.insert(content);
        } else {
            changes.delete.push(record.id.clone());
        }
    }
    for value in &desired.values {
        if !kept.contains(value) {
            changes.create.push(request(value));
        }
    }
    changes
}

/// Version token of the records stored under one name/type
pub fn record_set_version(records: &[ApiDnsRecord]) -> String {
    let mut entries: Vec<String> = records
        .iter()
        .map(|r| {
            let stamp = r.modified_on.as_deref().unwrap_or(r.content.as_str());
            format!("{}@{}", r.id, stamp)
        })
        .collect();
    entries.sort();
    entries.join(",")
}

/// `Conflict` when the records no longer carry the version the caller read
pub fn check_version(
    resource: &ResourceRef,
    expected: Option<&str>,
    records: &[ApiDnsRecord],
) -> sitelock_cloud::Result<()> {
    match expected {
        Some(expected) if expected != record_set_version(records) => Err(CloudError::Conflict(
            format!("{} changed since it was read", resource),
        )),
        _ => Ok(()),
    }
}

#[async_trait]
impl ResourceApi for CloudflareDnsApi {
    fn name(&self) -> &str {
        "cloudflare"
    }

    async fn check_auth(&self) -> sitelock_cloud::Result<AuthStatus> {
        match self.dns.verify_token().await {
            Ok(status) if status == "active" => {
                Ok(AuthStatus::ok(format!("zone {}", self.dns.zone_id())))
            }
            Ok(status) => Ok(AuthStatus::failed(format!(
                "API トークンが無効です (status: {})",
                status
            ))),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn get(&self, resource: &ResourceRef) -> sitelock_cloud::Result<Option<ResourceState>> {
        let (record_type, name, records) = self.records(resource).await?;
        if records.is_empty() {
            return Ok(None);
        }
        let attrs = observed_attributes(record_type, &name, &records);
        let mut state = ResourceState::present(ResourceKind::DnsRecord, resource.key.as_str());
        if let serde_json::Value::Object(map) = serde_json::to_value(&attrs)? {
            state.attributes.extend(map);
        }
        if let Some(first) = records.first() {
            state = state.with_id(first.id.as_str());
        }
        Ok(Some(state.with_version(record_set_version(&records))))
    }

    async fn create(&self, spec: &ResourceSpec) -> sitelock_cloud::Result<ResourceState> {
        let resource = spec.resource_ref();
        let (_, _, existing) = self.records(&resource).await?;
        if !existing.is_empty() {
            return Err(CloudError::AlreadyExists(resource.to_string()));
        }
        let desired: DnsRecordAttributes = spec.attributes_as()?;
        self.apply(plan_changes(&[], &desired)).await?;
        self.read_back(spec).await
    }

    async fn update(
        &self,
        spec: &ResourceSpec,
        version: Option<&str>,
    ) -> sitelock_cloud::Result<ResourceState> {
        let resource = spec.resource_ref();
        let (_, _, existing) = self.records(&resource).await?;
        if existing.is_empty() {
            return Err(CloudError::NotFound(resource.to_string()));
        }
        check_version(&resource, version, &existing)?;
        let desired: DnsRecordAttributes = spec.attributes_as()?;
        let changes = plan_changes(&existing, &desired);
        tracing::debug!(
            "cloudflare: {} (+{} ~{} -{})",
            resource,
            changes.create.len(),
            changes.update.len(),
            changes.delete.len()
        );
        self.apply(changes).await?;
        self.read_back(spec).await
    }

    async fn delete(&self, resource: &ResourceRef) -> sitelock_cloud::Result<bool> {
        let (_, _, existing) = self.records(resource).await?;
        if existing.is_empty() {
            return Ok(false);
        }
        for record in &existing {
            self.dns.delete_record(&record.id).await?;
        }
        tracing::info!("Deleted DNS record: {}", resource.key);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, content: &str, ttl: u32) -> ApiDnsRecord {
        ApiDnsRecord {
            id: id.into(),
            name: "docs.example.com".into(),
            r#type: "CNAME".into(),
            content: content.into(),
            ttl,
            proxied: false,
            modified_on: Some("2026-01-01T00:00:00Z".into()),
        }
    }

    fn alias(target: &str) -> DnsRecordAttributes {
        DnsRecordAttributes {
            name: "docs.example.com".into(),
            record_type: DnsRecordType::Alias,
            values: BTreeSet::from([target.to_string()]),
            ttl: None,
        }
    }

    #[test]
    fn test_create_from_nothing() {
        let changes = plan_changes(&[], &alias("d111.cloudfront.net"));
        assert_eq!(changes.create.len(), 1);
        assert_eq!(changes.create[0].r#type, "CNAME");
        assert_eq!(changes.create[0].ttl, AUTO_TTL);
        assert!(changes.update.is_empty() && changes.delete.is_empty());
    }

    #[test]
    fn test_matching_record_is_untouched() {
        let existing = vec![record("r1", "d111.cloudfront.net", AUTO_TTL)];
        assert!(plan_changes(&existing, &alias("d111.cloudfront.net")).is_empty());
    }

    #[test]
    fn test_retarget_replaces_record() {
        let existing = vec![record("r1", "d999.cloudfront.net", AUTO_TTL)];
        let changes = plan_changes(&existing, &alias("d111.cloudfront.net"));
        assert_eq!(changes.delete, vec!["r1".to_string()]);
        assert_eq!(changes.create[0].content, "d111.cloudfront.net");
    }

    #[test]
    fn test_ttl_change_updates_in_place() {
        let mut desired = alias("_b2.acm-validations.aws");
        desired.record_type = DnsRecordType::Cname;
        desired.ttl = Some(300);
        let existing = vec![record("r1", "_b2.acm-validations.aws", AUTO_TTL)];
        let changes = plan_changes(&existing, &desired);
        assert_eq!(changes.update.len(), 1);
        assert_eq!(changes.update[0].0, "r1");
        assert_eq!(changes.update[0].1.ttl, 300);
    }

    #[test]
    fn test_observed_attributes() {
        let records = vec![record("r1", "D111.cloudfront.net.", AUTO_TTL)];
        let observed = observed_attributes(DnsRecordType::Alias, "docs.example.com", &records);
        assert_eq!(observed, alias("d111.cloudfront.net"));

        let records = vec![record("r1", "x", 300)];
        let observed = observed_attributes(DnsRecordType::Cname, "docs.example.com", &records);
        assert_eq!(observed.ttl, Some(300));
    }

    #[test]
    fn test_version_follows_modification() {
        let resource = ResourceRef::new(ResourceKind::DnsRecord, "ALIAS:docs.example.com");
        let read = vec![record("r1", "d111.cloudfront.net", AUTO_TTL)];
        let version = record_set_version(&read);
        assert!(check_version(&resource, Some(version.as_str()), &read).is_ok());
        assert!(check_version(&resource, None, &read).is_ok());

        let mut touched = read.clone();
        touched[0].modified_on = Some("2026-01-02T00:00:00Z".into());
        assert!(matches!(
            check_version(&resource, Some(version.as_str()), &touched),
            Err(CloudError::Conflict(_))
        ));

        let mut replaced = read.clone();
        replaced[0].id = "r2".into();
        assert!(matches!(
            check_version(&resource, Some(version.as_str()), &replaced),
            Err(CloudError::Conflict(_))
        ));
    }

    #[test]
    fn test_version_ignores_listing_order() {
        let a = record("r1", "d111.cloudfront.net", AUTO_TTL);
        let b = record("r2", "d222.cloudfront.net", AUTO_TTL);
        assert_eq!(
            record_set_version(&[a.clone(), b.clone()]),
            record_set_version(&[b, a])
        );
    }

    #[test]
    fn test_non_dns_kind_rejected() {
        let bucket = ResourceRef::new(ResourceKind::Bucket, "site-assets");
        assert!(matches!(
            CloudflareDnsApi::dns_only(&bucket),
            Err(CloudError::InvalidConfig(_))
        ));
    }
}
