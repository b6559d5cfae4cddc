//! Route 53 record sets
//!
//! Record keys follow `TYPE:name`. A provider-neutral `ALIAS` record becomes
//! an A + AAAA alias pair pointing at the CloudFront hosted zone.

use crate::cli::AwsCli;
use crate::error::{AwsError, Result};
use crate::merge_attributes;
use serde_json::{Value, json};
use sitelock_cloud::site::attributes::{DnsRecordAttributes, DnsRecordType};
use sitelock_cloud::{CloudError, ResourceKind, ResourceState};
use std::collections::BTreeSet;

/// Hosted zone id shared by every CloudFront distribution alias target
pub const CLOUDFRONT_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

const DEFAULT_TTL: u32 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedZone {
    pub id: String,
    /// Zone apex without the trailing dot
    pub name: String,
    pub private: bool,
}

pub struct Route53<'a> {
    cli: &'a AwsCli,
    zone_id: Option<&'a str>,
}

impl<'a> Route53<'a> {
    /// `zone_id` pins the hosted zone; otherwise it is looked up per record
    pub fn new(cli: &'a AwsCli, zone_id: Option<&'a str>) -> Self {
        Self { cli, zone_id }
    }

    pub async fn list_zones(&self) -> Result<Vec<HostedZone>> {
        let response: Value = self.cli.run_json(&["route53", "list-hosted-zones"]).await?;
        Ok(response["HostedZones"]
            .as_array()
            .map(|zones| zones.iter().filter_map(parse_zone).collect())
            .unwrap_or_default())
    }

    async fn zone_for(&self, record_name: &str) -> Result<String> {
        if let Some(zone_id) = self.zone_id {
            return Ok(zone_id.to_string());
        }
        let zones = self.list_zones().await?;
        best_zone(&zones, record_name)
            .map(|zone| zone.id.clone())
            .ok_or_else(|| {
                CloudError::NotFound(format!("no hosted zone covers {}", record_name)).into()
            })
    }

    /// Raw record set of exactly `name`/`rtype`, if present
    async fn find_record_set(&self, zone: &str, name: &str, rtype: &str) -> Result<Option<Value>> {
        let fqdn = fqdn(name);
        let response: Value = self
            .cli
            .run_json(&[
                "route53",
                "list-resource-record-sets",
                "--hosted-zone-id",
                zone,
                "--start-record-name",
                fqdn.as_str(),
                "--start-record-type",
                rtype,
                "--max-items",
                "1",
            ])
            .await?;
        Ok(response["ResourceRecordSets"]
            .as_array()
            .and_then(|sets| sets.first())
            .filter(|set| {
                set["Name"].as_str().map(normalize) == Some(normalize(&fqdn))
                    && set["Type"].as_str() == Some(rtype)
            })
            .cloned())
    }

    /// Raw record sets behind one logical record: both halves of an alias
    /// pair when present
    async fn find_record_sets(
        &self,
        zone: &str,
        name: &str,
        record_type: DnsRecordType,
    ) -> Result<Vec<Value>> {
        let rtypes = match record_type {
            DnsRecordType::Alias => vec!["A", "AAAA"],
            other => vec![wire_type(other)],
        };
        let mut sets = Vec::new();
        for rtype in rtypes {
            if let Some(set) = self.find_record_set(zone, name, rtype).await? {
                sets.push(set);
            }
        }
        Ok(sets)
    }

    pub async fn get_record(&self, key: &str) -> Result<Option<ResourceState>> {
        let (record_type, name) = DnsRecordAttributes::parse_key(key)?;
        let zone = self.zone_for(&name).await?;
        let sets = self.find_record_sets(&zone, &name, record_type).await?;
        let Some(set) = sets.first() else {
            return Ok(None);
        };
        let attrs = record_attributes(record_type, &name, set);
        let mut state = ResourceState::present(ResourceKind::DnsRecord, key)
            .with_version(record_set_version(&sets)?);
        merge_attributes(&mut state, &attrs)?;
        Ok(Some(state))
    }

    /// `CREATE` fails when the record exists, which surfaces as
    /// `AlreadyExists` so a concurrent writer is detected
    pub async fn create_record(&self, attrs: &DnsRecordAttributes) -> Result<()> {
        let zone = self.zone_for(&attrs.name).await?;
        let batch = change_batch("CREATE", attrs)?;
        self.submit(&zone, &batch).await.map_err(|e| match e {
            AwsError::Service { code, message }
                if code == "InvalidChangeBatch" && message.contains("already exists") =>
            {
                CloudError::AlreadyExists(format!("{}: {}", attrs.key(), message)).into()
            }
            other => other,
        })?;
        tracing::info!("CREATE {} in zone {}", attrs.key(), zone);
        Ok(())
    }

    /// Replaces the record sets as read in one batch. Route 53 applies a
    /// batch atomically and rejects a `DELETE` whose values no longer match,
    /// so a record changed by someone else surfaces as `Conflict`. The same
    /// holds when `expected_version` is stale before anything is sent.
    pub async fn update_record(
        &self,
        attrs: &DnsRecordAttributes,
        expected_version: Option<&str>,
    ) -> Result<()> {
        let key = attrs.key();
        let zone = self.zone_for(&attrs.name).await?;
        let observed = self
            .find_record_sets(&zone, &attrs.name, attrs.record_type)
            .await?;
        if observed.is_empty() {
            return Err(CloudError::Conflict(format!("{} disappeared before update", key)).into());
        }
        let version = record_set_version(&observed)?;
        if expected_version.is_some_and(|expected| expected != version) {
            return Err(CloudError::Conflict(format!("{} changed since it was read", key)).into());
        }

        let batch = replace_batch(&observed, attrs)?;
        self.submit(&zone, &batch)
            .await
            .map_err(|e| conditional_change_error(&key, e))?;
        tracing::info!("Replaced {} in zone {}", key, zone);
        Ok(())
    }

    /// Deletes exactly what is there: both halves of an alias pair when
    /// present, using the record sets as read
    pub async fn delete_record(&self, key: &str) -> Result<bool> {
        let (record_type, name) = DnsRecordAttributes::parse_key(key)?;
        let zone = self.zone_for(&name).await?;
        let changes: Vec<Value> = self
            .find_record_sets(&zone, &name, record_type)
            .await?
            .into_iter()
            .map(|set| json!({ "Action": "DELETE", "ResourceRecordSet": set }))
            .collect();
        if changes.is_empty() {
            return Ok(false);
        }
        self.submit(&zone, &json!({ "Changes": changes })).await?;
        tracing::info!("Deleted {} from zone {}", key, zone);
        Ok(true)
    }

    async fn submit(&self, zone: &str, batch: &Value) -> Result<()> {
        let document = serde_json::to_string(batch)?;
        self.cli
            .run(&[
                "route53",
                "change-resource-record-sets",
                "--hosted-zone-id",
                zone,
                "--change-batch",
                document.as_str(),
            ])
            .await?;
        Ok(())
    }
}

fn parse_zone(zone: &Value) -> Option<HostedZone> {
    Some(HostedZone {
        id: zone["Id"].as_str()?.trim_start_matches("/hostedzone/").to_string(),
        name: normalize(zone["Name"].as_str()?),
        private: zone["Config"]["PrivateZone"].as_bool().unwrap_or(false),
    })
}

/// Deepest public zone whose apex is a suffix of `record_name`
pub fn best_zone<'z>(zones: &'z [HostedZone], record_name: &str) -> Option<&'z HostedZone> {
    let record = normalize(record_name);
    zones
        .iter()
        .filter(|zone| !zone.private)
        .filter(|zone| record == zone.name || record.ends_with(&format!(".{}", zone.name)))
        .max_by_key(|zone| zone.name.len())
}

fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

fn fqdn(name: &str) -> String {
    format!("{}.", name.trim_end_matches('.'))
}

fn wire_type(record_type: DnsRecordType) -> &'static str {
    match record_type {
        DnsRecordType::Alias => "A",
        DnsRecordType::Cname => "CNAME",
        DnsRecordType::Txt => "TXT",
    }
}

/// Version token of the raw record sets as read
pub fn record_set_version(sets: &[Value]) -> Result<String> {
    Ok(serde_json::to_string(sets)?)
}

/// Batch deleting the observed record sets and creating the desired ones
pub fn replace_batch(observed: &[Value], attrs: &DnsRecordAttributes) -> Result<Value> {
    let mut changes: Vec<Value> = observed
        .iter()
        .map(|set| json!({ "Action": "DELETE", "ResourceRecordSet": set }))
        .collect();
    let mut create = change_batch("CREATE", attrs)?;
    if let Value::Array(creates) = create["Changes"].take() {
        changes.extend(creates);
    }
    Ok(json!({ "Changes": changes }))
}

/// A rejected replace means the record moved under us
fn conditional_change_error(key: &str, error: AwsError) -> AwsError {
    match error {
        AwsError::Service { code, message }
            if code == "InvalidChangeBatch"
                && ["not found", "do not match", "already exists"]
                    .iter()
                    .any(|needle| message.contains(needle)) =>
        {
            CloudError::Conflict(format!("{}: {}", key, message)).into()
        }
        other => other,
    }
}

/// Change batch creating one logical record
pub fn change_batch(action: &str, attrs: &DnsRecordAttributes) -> Result<Value> {
    let name = fqdn(&attrs.name);
    let changes = match attrs.record_type {
        DnsRecordType::Alias => {
            let target = single_value(attrs)?;
            ["A", "AAAA"]
                .iter()
                .map(|rtype| {
                    json!({
                        "Action": action,
                        "ResourceRecordSet": {
                            "Name": name,
                            "Type": rtype,
                            "AliasTarget": {
                                "HostedZoneId": CLOUDFRONT_HOSTED_ZONE_ID,
                                "DNSName": target,
                                "EvaluateTargetHealth": false
                            }
                        }
                    })
                })
                .collect::<Vec<_>>()
        }
        record_type => {
            let values: Vec<Value> = attrs
                .values
                .iter()
                .map(|value| match record_type {
                    DnsRecordType::Txt => json!({ "Value": format!("\"{}\"", value) }),
                    _ => json!({ "Value": value }),
                })
                .collect();
            vec![json!({
                "Action": action,
                "ResourceRecordSet": {
                    "Name": name,
                    "Type": wire_type(record_type),
                    "TTL": attrs.ttl.unwrap_or(DEFAULT_TTL),
                    "ResourceRecords": values
                }
            })]
        }
    };
    Ok(json!({ "Changes": changes }))
}

fn single_value(attrs: &DnsRecordAttributes) -> Result<&str> {
    match attrs.values.iter().collect::<Vec<_>>().as_slice() {
        [value] => Ok(value.as_str()),
        _ => Err(CloudError::InvalidConfig(format!(
            "{} needs exactly one target, got {}",
            attrs.key(),
            attrs.values.len()
        ))
        .into()),
    }
}

/// Logical record attributes from a raw record set
pub fn record_attributes(
    record_type: DnsRecordType,
    name: &str,
    set: &Value,
) -> DnsRecordAttributes {
    let values: BTreeSet<String> = if let Some(target) = set["AliasTarget"]["DNSName"].as_str() {
        BTreeSet::from([normalize(target)])
    } else {
        set["ResourceRecords"]
            .as_array()
            .map(|records| {
                records
                    .iter()
                    .filter_map(|record| record["Value"].as_str())
                    .map(|value| value.trim_matches('"').trim_end_matches('.').to_string())
                    .collect()
            })
            .unwrap_or_default()
    };
    DnsRecordAttributes {
        name: name.trim_end_matches('.').to_string(),
        record_type,
        values,
        ttl: set["TTL"].as_u64().and_then(|ttl| u32::try_from(ttl).ok()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(id: &str, name: &str, private: bool) -> HostedZone {
        HostedZone {
            id: id.into(),
            name: name.into(),
            private,
        }
    }

    #[test]
    fn test_best_zone_prefers_deepest_public() {
        let zones = vec![
            zone("Z1", "example.com", false),
            zone("Z2", "docs.example.com", false),
            zone("Z3", "internal.docs.example.com", true),
        ];
        assert_eq!(best_zone(&zones, "a.docs.example.com.").unwrap().id, "Z2");
        assert_eq!(best_zone(&zones, "example.com").unwrap().id, "Z1");
        assert_eq!(
            best_zone(&zones, "x.internal.docs.example.com").unwrap().id,
            "Z2"
        );
        assert!(best_zone(&zones, "badexample.com").is_none());
    }

    #[test]
    fn test_parse_zone_strips_prefix() {
        let parsed = parse_zone(&json!({
            "Id": "/hostedzone/Z0123456789",
            "Name": "Example.com.",
            "Config": {"PrivateZone": false}
        }))
        .unwrap();
        assert_eq!(parsed, zone("Z0123456789", "example.com", false));
    }

    fn alias() -> DnsRecordAttributes {
        DnsRecordAttributes {
            name: "docs.example.com".into(),
            record_type: DnsRecordType::Alias,
            values: BTreeSet::from(["d111111abcdef8.cloudfront.net".to_string()]),
            ttl: None,
        }
    }

    #[test]
    fn test_alias_batch_has_a_and_aaaa() {
        let batch = change_batch("CREATE", &alias()).unwrap();
        let changes = batch["Changes"].as_array().unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0]["ResourceRecordSet"]["Type"], "A");
        assert_eq!(changes[1]["ResourceRecordSet"]["Type"], "AAAA");
        assert_eq!(
            changes[0]["ResourceRecordSet"]["AliasTarget"]["HostedZoneId"],
            CLOUDFRONT_HOSTED_ZONE_ID
        );
        assert_eq!(changes[0]["ResourceRecordSet"]["Name"], "docs.example.com.");
    }

    fn alias_set(rtype: &str, target: &str) -> Value {
        json!({
            "Name": "docs.example.com.",
            "Type": rtype,
            "AliasTarget": {
                "HostedZoneId": CLOUDFRONT_HOSTED_ZONE_ID,
                "DNSName": target,
                "EvaluateTargetHealth": false
            }
        })
    }

    #[test]
    fn test_replace_batch_deletes_what_was_read() {
        let observed = vec![
            alias_set("A", "dold.cloudfront.net."),
            alias_set("AAAA", "dold.cloudfront.net."),
        ];
        let batch = replace_batch(&observed, &alias()).unwrap();
        let changes = batch["Changes"].as_array().unwrap();
        assert_eq!(changes.len(), 4);
        assert_eq!(changes[0]["Action"], "DELETE");
        assert_eq!(changes[0]["ResourceRecordSet"], observed[0]);
        assert_eq!(changes[1]["ResourceRecordSet"], observed[1]);
        assert!(changes[2..].iter().all(|c| c["Action"] == "CREATE"));
        assert_eq!(
            changes[2]["ResourceRecordSet"]["AliasTarget"]["DNSName"],
            "d111111abcdef8.cloudfront.net"
        );
        assert!(!batch.to_string().contains("UPSERT"));
    }

    #[test]
    fn test_record_set_version_tracks_values() {
        let before = record_set_version(&[alias_set("A", "dold.cloudfront.net.")]).unwrap();
        let same = record_set_version(&[alias_set("A", "dold.cloudfront.net.")]).unwrap();
        let after = record_set_version(&[alias_set("A", "dnew.cloudfront.net.")]).unwrap();
        assert_eq!(before, same);
        assert_ne!(before, after);
    }

    #[test]
    fn test_rejected_replace_is_conflict() {
        let mismatch = AwsError::Service {
            code: "InvalidChangeBatch".into(),
            message: "Tried to delete resource record set [name='docs.example.com.', type='A'] \
                      but the values provided do not match the current values"
                .into(),
        };
        let error: CloudError = conditional_change_error("ALIAS:docs.example.com", mismatch).into();
        assert!(matches!(error, CloudError::Conflict(_)));

        let gone = AwsError::Service {
            code: "InvalidChangeBatch".into(),
            message: "Tried to delete resource record set but it was not found".into(),
        };
        let error: CloudError = conditional_change_error("ALIAS:docs.example.com", gone).into();
        assert!(matches!(error, CloudError::Conflict(_)));

        let throttled = AwsError::Service {
            code: "Throttling".into(),
            message: "Rate exceeded".into(),
        };
        let error: CloudError = conditional_change_error("ALIAS:docs.example.com", throttled).into();
        assert!(matches!(error, CloudError::Api(_)));
    }

    #[test]
    fn test_alias_requires_one_target() {
        let mut attrs = alias();
        attrs.values.insert("d222.cloudfront.net".into());
        assert!(change_batch("CREATE", &attrs).is_err());
    }

    #[test]
    fn test_cname_batch_uses_ttl() {
        let attrs = DnsRecordAttributes {
            name: "_abc.docs.example.com.".into(),
            record_type: DnsRecordType::Cname,
            values: BTreeSet::from(["_xyz.acm-validations.aws.".to_string()]),
            ttl: Some(300),
        };
        let batch = change_batch("CREATE", &attrs).unwrap();
        let set = &batch["Changes"][0]["ResourceRecordSet"];
        assert_eq!(set["Name"], "_abc.docs.example.com.");
        assert_eq!(set["TTL"], 300);
        assert_eq!(set["ResourceRecords"][0]["Value"], "_xyz.acm-validations.aws.");

        let observed = record_attributes(DnsRecordType::Cname, "_abc.docs.example.com", set);
        assert_eq!(
            observed.values,
            BTreeSet::from(["_xyz.acm-validations.aws".to_string()])
        );
    }

    #[test]
    fn test_record_attributes_from_alias_set() {
        let set = json!({
            "Name": "docs.example.com.",
            "Type": "A",
            "AliasTarget": {
                "HostedZoneId": CLOUDFRONT_HOSTED_ZONE_ID,
                "DNSName": "d111111abcdef8.cloudfront.net.",
                "EvaluateTargetHealth": false
            }
        });
        assert_eq!(
            record_attributes(DnsRecordType::Alias, "docs.example.com", &set),
            alias()
        );
    }

    #[test]
    fn test_record_attributes_unquote_txt() {
        let set = json!({
            "Name": "example.com.",
            "Type": "TXT",
            "TTL": 60,
            "ResourceRecords": [{"Value": "\"v=spf1 -all\""}]
        });
        let attrs = record_attributes(DnsRecordType::Txt, "example.com", &set);
        assert_eq!(attrs.values, BTreeSet::from(["v=spf1 -all".to_string()]));
        assert_eq!(attrs.ttl, Some(60));
    }
}
