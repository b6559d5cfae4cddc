//! CloudFront distributions and origin access controls
//!
//! Distributions carry no user-chosen name, so the resource key is stored in
//! the `Comment` field and lookups scan `list-distributions` for it. Every
//! mutation goes through the ETag returned by the matching read.

use crate::cli::AwsCli;
use crate::error::{AwsError, Result};
use crate::merge_attributes;
use serde_json::{Value, json};
use sitelock_cloud::site::attributes::{ARN, DOMAIN_NAME, DistributionAttributes, OacAttributes};
use sitelock_cloud::{ResourceKind, ResourceState, ResourceStatus};
use std::collections::BTreeSet;

/// Origin id used for the single S3 origin of a site distribution
pub const ORIGIN_ID: &str = "s3-origin";

pub struct CloudFront<'a> {
    cli: &'a AwsCli,
}

impl<'a> CloudFront<'a> {
    pub fn new(cli: &'a AwsCli) -> Self {
        Self { cli }
    }

    // ---- origin access control ----

    async fn find_oac_id(&self, name: &str) -> Result<Option<String>> {
        let response: Value = self
            .cli
            .run_json(&["cloudfront", "list-origin-access-controls"])
            .await?;
        Ok(items(&response["OriginAccessControlList"])
            .iter()
            .find(|item| item["Name"].as_str() == Some(name))
            .and_then(|item| item["Id"].as_str())
            .map(str::to_string))
    }

    pub async fn get_oac(&self, name: &str) -> Result<Option<ResourceState>> {
        let Some(id) = self.find_oac_id(name).await? else {
            return Ok(None);
        };
        let response: Value = match self
            .cli
            .run_json(&["cloudfront", "get-origin-access-control", "--id", id.as_str()])
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        let config = &response["OriginAccessControl"]["OriginAccessControlConfig"];
        let attrs = OacAttributes {
            origin_type: config["OriginAccessControlOriginType"]
                .as_str()
                .map(str::to_string),
            signing_behavior: config["SigningBehavior"].as_str().map(str::to_string),
            signing_protocol: config["SigningProtocol"].as_str().map(str::to_string),
        };
        let mut state = ResourceState::present(ResourceKind::OriginAccessControl, name).with_id(id);
        if let Some(etag) = response["ETag"].as_str() {
            state = state.with_version(etag);
        }
        merge_attributes(&mut state, &attrs)?;
        Ok(Some(state))
    }

    pub async fn create_oac(&self, name: &str, attrs: &OacAttributes) -> Result<()> {
        let config = serde_json::to_string(&oac_config(name, attrs))?;
        self.cli
            .run(&[
                "cloudfront",
                "create-origin-access-control",
                "--origin-access-control-config",
                config.as_str(),
            ])
            .await?;
        tracing::info!("Created origin access control {}", name);
        Ok(())
    }

    pub async fn update_oac(
        &self,
        id: &str,
        name: &str,
        attrs: &OacAttributes,
        etag: &str,
    ) -> Result<()> {
        let config = serde_json::to_string(&oac_config(name, attrs))?;
        self.cli
            .run(&[
                "cloudfront",
                "update-origin-access-control",
                "--id",
                id,
                "--if-match",
                etag,
                "--origin-access-control-config",
                config.as_str(),
            ])
            .await?;
        Ok(())
    }

    pub async fn delete_oac(&self, name: &str) -> Result<bool> {
        let Some(state) = self.get_oac(name).await? else {
            return Ok(false);
        };
        let id = state.id.clone().unwrap_or_default();
        let etag = state.version.clone().unwrap_or_default();
        self.cli
            .run(&[
                "cloudfront",
                "delete-origin-access-control",
                "--id",
                id.as_str(),
                "--if-match",
                etag.as_str(),
            ])
            .await?;
        Ok(true)
    }

    // ---- distribution ----

    async fn find_distribution_id(&self, key: &str) -> Result<Option<String>> {
        let response: Value = self
            .cli
            .run_json(&["cloudfront", "list-distributions"])
            .await?;
        Ok(items(&response["DistributionList"])
            .iter()
            .find(|item| item["Comment"].as_str() == Some(key))
            .and_then(|item| item["Id"].as_str())
            .map(str::to_string))
    }

    pub async fn get_distribution(&self, key: &str) -> Result<Option<ResourceState>> {
        let Some(id) = self.find_distribution_id(key).await? else {
            return Ok(None);
        };
        let response: Value = match self
            .cli
            .run_json(&["cloudfront", "get-distribution", "--id", id.as_str()])
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        distribution_state(key, &response).map(Some)
    }

    pub async fn create_distribution(&self, key: &str, attrs: &DistributionAttributes) -> Result<()> {
        let config = new_distribution_config(key, attrs);
        let document = serde_json::to_string(&config)?;
        self.cli
            .run(&[
                "cloudfront",
                "create-distribution",
                "--distribution-config",
                document.as_str(),
            ])
            .await?;
        tracing::info!("Created distribution {}", key);
        Ok(())
    }

    /// Read-modify-write of the distribution config. `version` pins the
    /// write to the ETag the caller observed.
    pub async fn update_distribution(
        &self,
        key: &str,
        attrs: &DistributionAttributes,
        version: Option<&str>,
    ) -> Result<()> {
        let id = self.require_distribution_id(key).await?;
        let response: Value = self
            .cli
            .run_json(&["cloudfront", "get-distribution-config", "--id", id.as_str()])
            .await?;
        let etag = match version {
            Some(version) => version.to_string(),
            None => etag_of(&response)?,
        };

        let mut config = response["DistributionConfig"].clone();
        merge_distribution_config(&mut config, attrs);
        let document = serde_json::to_string(&config)?;
        self.cli
            .run(&[
                "cloudfront",
                "update-distribution",
                "--id",
                id.as_str(),
                "--if-match",
                etag.as_str(),
                "--distribution-config",
                document.as_str(),
            ])
            .await?;
        tracing::info!("Updated distribution {} ({})", key, id);
        Ok(())
    }

    /// Only disabled, deployed distributions can be deleted
    pub async fn delete_distribution(&self, key: &str) -> Result<bool> {
        let Some(id) = self.find_distribution_id(key).await? else {
            return Ok(false);
        };
        let response: Value = self
            .cli
            .run_json(&["cloudfront", "get-distribution-config", "--id", id.as_str()])
            .await?;
        let etag = etag_of(&response)?;
        self.cli
            .run(&[
                "cloudfront",
                "delete-distribution",
                "--id",
                id.as_str(),
                "--if-match",
                etag.as_str(),
            ])
            .await?;
        Ok(true)
    }

    async fn require_distribution_id(&self, key: &str) -> Result<String> {
        self.find_distribution_id(key).await?.ok_or_else(|| {
            sitelock_cloud::CloudError::NotFound(format!("distribution:{}", key)).into()
        })
    }
}

/// `Items` of a CloudFront list, which is omitted when the list is empty
fn items(list: &Value) -> Vec<Value> {
    list["Items"].as_array().cloned().unwrap_or_default()
}

fn etag_of(response: &Value) -> Result<String> {
    response["ETag"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| AwsError::UnexpectedResponse("CloudFront response without ETag".into()))
}

fn oac_config(name: &str, attrs: &OacAttributes) -> Value {
    json!({
        "Name": name,
        "Description": "",
        "SigningProtocol": attrs.signing_protocol.as_deref().unwrap_or("sigv4"),
        "SigningBehavior": attrs.signing_behavior.as_deref().unwrap_or("always"),
        "OriginAccessControlOriginType": attrs.origin_type.as_deref().unwrap_or("s3"),
    })
}

pub fn status_of(remote: &str) -> ResourceStatus {
    match remote {
        "Deployed" => ResourceStatus::Deployed,
        _ => ResourceStatus::Pending,
    }
}

fn distribution_state(key: &str, response: &Value) -> Result<ResourceState> {
    let distribution = &response["Distribution"];
    let id = distribution["Id"]
        .as_str()
        .ok_or_else(|| AwsError::UnexpectedResponse("get-distribution: no Id".into()))?;
    let remote = distribution["Status"].as_str().unwrap_or("InProgress");

    let mut state = ResourceState::present(ResourceKind::Distribution, key)
        .with_id(id)
        .with_status(status_of(remote))
        .with_remote_status(remote);
    if let Some(etag) = response["ETag"].as_str() {
        state = state.with_version(etag);
    }
    if let Some(arn) = distribution["ARN"].as_str() {
        state.set_attribute(ARN, json!(arn));
    }
    if let Some(domain) = distribution["DomainName"].as_str() {
        state.set_attribute(DOMAIN_NAME, json!(domain));
    }
    merge_attributes(
        &mut state,
        &distribution_attributes(&distribution["DistributionConfig"]),
    )?;
    Ok(state)
}

/// Full config for a new distribution: fixed defaults, then the declared
/// attributes on top. The caller reference is derived from the key so a
/// retried create is recognised by CloudFront.
pub fn new_distribution_config(key: &str, attrs: &DistributionAttributes) -> Value {
    let mut config = json!({
        "CallerReference": format!("sitelock-{}", key),
        "Comment": key,
        "Enabled": true,
        "DefaultRootObject": "index.html",
        "PriceClass": "PriceClass_All",
        "HttpVersion": "http2and3",
        "IsIPV6Enabled": true,
        "WebACLId": "",
        "Aliases": { "Quantity": 0 },
        "Origins": {
            "Quantity": 1,
            "Items": [{
                "Id": ORIGIN_ID,
                "DomainName": "",
                "OriginPath": "",
                "CustomHeaders": { "Quantity": 0 },
                "S3OriginConfig": { "OriginAccessIdentity": "" },
                "OriginAccessControlId": ""
            }]
        },
        "DefaultCacheBehavior": {
            "TargetOriginId": ORIGIN_ID,
            "ViewerProtocolPolicy": "redirect-to-https",
            "AllowedMethods": {
                "Quantity": 2,
                "Items": ["GET", "HEAD"],
                "CachedMethods": { "Quantity": 2, "Items": ["GET", "HEAD"] }
            },
            "Compress": true,
            "ForwardedValues": {
                "QueryString": false,
                "Cookies": { "Forward": "none" }
            },
            "MinTTL": 0,
            "DefaultTTL": 86400,
            "MaxTTL": 31536000
        },
        "ViewerCertificate": { "CloudFrontDefaultCertificate": true },
        "Restrictions": {
            "GeoRestriction": { "RestrictionType": "none", "Quantity": 0 }
        }
    });
    merge_distribution_config(&mut config, attrs);
    config
}

/// Apply the declared attributes to a distribution config in place
pub fn merge_distribution_config(config: &mut Value, attrs: &DistributionAttributes) {
    if let Some(origin) = config["Origins"]["Items"].get_mut(0) {
        if let Some(domain) = &attrs.origin_domain {
            origin["DomainName"] = json!(domain);
        }
        if let Some(oac) = &attrs.origin_access_control_id {
            origin["OriginAccessControlId"] = json!(oac);
        }
    }
    if let Some(root) = &attrs.default_root_object {
        config["DefaultRootObject"] = json!(root);
    }
    let behavior = &mut config["DefaultCacheBehavior"];
    if let Some(ttl) = attrs.min_ttl {
        behavior["MinTTL"] = json!(ttl);
    }
    if let Some(ttl) = attrs.default_ttl {
        behavior["DefaultTTL"] = json!(ttl);
    }
    if let Some(ttl) = attrs.max_ttl {
        behavior["MaxTTL"] = json!(ttl);
    }
    if let Some(price_class) = &attrs.price_class {
        config["PriceClass"] = json!(price_class);
    }
    if let Some(enabled) = attrs.enabled {
        config["Enabled"] = json!(enabled);
    }
    if let Some(comment) = &attrs.comment {
        config["Comment"] = json!(comment);
    }
    if let Some(web_acl_id) = &attrs.web_acl_id {
        config["WebACLId"] = json!(web_acl_id);
    }
    if let Some(aliases) = &attrs.aliases {
        config["Aliases"] = if aliases.is_empty() {
            json!({ "Quantity": 0 })
        } else {
            json!({ "Quantity": aliases.len(), "Items": aliases })
        };
    }
    if let Some(arn) = &attrs.certificate_arn {
        config["ViewerCertificate"] = if arn.is_empty() {
            json!({ "CloudFrontDefaultCertificate": true })
        } else {
            json!({
                "ACMCertificateArn": arn,
                "SSLSupportMethod": "sni-only",
                "MinimumProtocolVersion": "TLSv1.2_2021"
            })
        };
    }
}

/// Observed attributes of a distribution config. Every field is reported so
/// any declared subset can be compared against it.
pub fn distribution_attributes(config: &Value) -> DistributionAttributes {
    let origin = &config["Origins"]["Items"][0];
    let behavior = &config["DefaultCacheBehavior"];
    let text = |value: &Value| value.as_str().map(str::to_string);

    DistributionAttributes {
        origin_domain: text(&origin["DomainName"]),
        origin_access_control_id: text(&origin["OriginAccessControlId"]),
        default_root_object: text(&config["DefaultRootObject"]),
        min_ttl: behavior["MinTTL"].as_u64(),
        default_ttl: behavior["DefaultTTL"].as_u64(),
        max_ttl: behavior["MaxTTL"].as_u64(),
        price_class: text(&config["PriceClass"]),
        enabled: config["Enabled"].as_bool(),
        comment: text(&config["Comment"]),
        web_acl_id: Some(config["WebACLId"].as_str().unwrap_or_default().to_string()),
        aliases: Some(
            config["Aliases"]["Items"]
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_else(BTreeSet::new),
        ),
        certificate_arn: Some(
            config["ViewerCertificate"]["ACMCertificateArn"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_attrs() -> DistributionAttributes {
        DistributionAttributes {
            origin_domain: Some("site-assets.s3.ap-northeast-1.amazonaws.com".into()),
            origin_access_control_id: Some("E1OAC".into()),
            default_root_object: Some("index.html".into()),
            min_ttl: Some(0),
            default_ttl: Some(3600),
            max_ttl: Some(86400),
            price_class: Some("PriceClass_200".into()),
            enabled: Some(true),
            comment: Some("site-assets".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_config_applies_declared_attributes() {
        let config = new_distribution_config("site-assets", &base_attrs());
        assert_eq!(config["CallerReference"], "sitelock-site-assets");
        assert_eq!(config["Comment"], "site-assets");
        assert_eq!(
            config["Origins"]["Items"][0]["DomainName"],
            "site-assets.s3.ap-northeast-1.amazonaws.com"
        );
        assert_eq!(config["Origins"]["Items"][0]["OriginAccessControlId"], "E1OAC");
        assert_eq!(config["DefaultCacheBehavior"]["DefaultTTL"], 3600);
        assert_eq!(config["PriceClass"], "PriceClass_200");
        assert_eq!(config["ViewerCertificate"]["CloudFrontDefaultCertificate"], true);
    }

    #[test]
    fn test_merge_leaves_undeclared_fields() {
        let mut config = new_distribution_config("site-assets", &base_attrs());
        merge_distribution_config(
            &mut config,
            &DistributionAttributes {
                web_acl_id: Some("arn:aws:wafv2:us-east-1:1:global/webacl/site-acl/abc".into()),
                ..Default::default()
            },
        );
        assert_eq!(
            config["WebACLId"],
            "arn:aws:wafv2:us-east-1:1:global/webacl/site-acl/abc"
        );
        assert_eq!(config["DefaultCacheBehavior"]["DefaultTTL"], 3600);
        assert_eq!(config["Origins"]["Items"][0]["OriginAccessControlId"], "E1OAC");
    }

    #[test]
    fn test_aliases_and_certificate() {
        let mut config = new_distribution_config("site-assets", &base_attrs());
        merge_distribution_config(
            &mut config,
            &DistributionAttributes {
                aliases: Some(BTreeSet::from(["docs.example.com".to_string()])),
                certificate_arn: Some("arn:aws:acm:us-east-1:1:certificate/abc".into()),
                ..Default::default()
            },
        );
        assert_eq!(config["Aliases"]["Quantity"], 1);
        assert_eq!(config["Aliases"]["Items"][0], "docs.example.com");
        assert_eq!(config["ViewerCertificate"]["SSLSupportMethod"], "sni-only");

        let observed = distribution_attributes(&config);
        assert_eq!(
            observed.aliases,
            Some(BTreeSet::from(["docs.example.com".to_string()]))
        );
        assert_eq!(
            observed.certificate_arn.as_deref(),
            Some("arn:aws:acm:us-east-1:1:certificate/abc")
        );
    }

    #[test]
    fn test_observed_attributes_cover_declared_base() {
        let config = new_distribution_config("site-assets", &base_attrs());
        let observed = distribution_attributes(&config);
        assert_eq!(observed.origin_domain, base_attrs().origin_domain);
        assert_eq!(observed.default_ttl, Some(3600));
        assert_eq!(observed.web_acl_id.as_deref(), Some(""));
        assert_eq!(observed.aliases, Some(BTreeSet::new()));
        assert_eq!(observed.certificate_arn.as_deref(), Some(""));
    }

    #[test]
    fn test_distribution_state() {
        let response = json!({
            "ETag": "E2ETAG",
            "Distribution": {
                "Id": "E2QWRUHEXAMPLE",
                "ARN": "arn:aws:cloudfront::123456789012:distribution/E2QWRUHEXAMPLE",
                "Status": "InProgress",
                "DomainName": "d111111abcdef8.cloudfront.net",
                "DistributionConfig": new_distribution_config("site-assets", &base_attrs())
            }
        });
        let state = distribution_state("site-assets", &response).unwrap();
        assert_eq!(state.id.as_deref(), Some("E2QWRUHEXAMPLE"));
        assert_eq!(state.version.as_deref(), Some("E2ETAG"));
        assert_eq!(state.status, ResourceStatus::Pending);
        assert_eq!(state.get_str(DOMAIN_NAME), Some("d111111abcdef8.cloudfront.net"));
        assert_eq!(state.get_str("price_class"), Some("PriceClass_200"));
    }

    #[test]
    fn test_status_of() {
        assert_eq!(status_of("Deployed"), ResourceStatus::Deployed);
        assert_eq!(status_of("InProgress"), ResourceStatus::Pending);
    }

    #[test]
    fn test_items_of_empty_list() {
        assert!(items(&json!({"Quantity": 0})).is_empty());
    }
}
