//! WAFv2 IP sets and web ACLs (CLOUDFRONT scope)
//!
//! CloudFront-scoped WAF lives in us-east-1, so the cli handed in here must
//! already be pinned to [`crate::cli::GLOBAL_REGION`]. Lock tokens play the
//! role of resource versions.

use crate::cli::AwsCli;
use crate::error::{AwsError, Result};
use crate::merge_attributes;
use serde_json::{Value, json};
use sitelock_cloud::site::attributes::{ARN, IpSetAttributes, WebAclAttributes};
use sitelock_cloud::{ResourceKind, ResourceState};
use std::collections::BTreeSet;

const SCOPE: &str = "CLOUDFRONT";
const ALLOW_RULE: &str = "allow-listed-sources";

/// Summary entry of `list-ip-sets` / `list-web-acls`
#[derive(Debug, Clone)]
struct Summary {
    id: String,
    lock_token: String,
}

pub struct Waf<'a> {
    cli: &'a AwsCli,
}

impl<'a> Waf<'a> {
    pub fn new(cli: &'a AwsCli) -> Self {
        Self { cli }
    }

    async fn find(&self, command: &str, list_field: &str, name: &str) -> Result<Option<Summary>> {
        let response: Value = self
            .cli
            .run_json(&["wafv2", command, "--scope", SCOPE])
            .await?;
        Ok(response[list_field]
            .as_array()
            .and_then(|items| items.iter().find(|item| item["Name"].as_str() == Some(name)))
            .and_then(|item| {
                Some(Summary {
                    id: item["Id"].as_str()?.to_string(),
                    lock_token: item["LockToken"].as_str().unwrap_or_default().to_string(),
                })
            }))
    }

    // ---- IP sets ----

    pub async fn get_ip_set(&self, name: &str) -> Result<Option<ResourceState>> {
        let Some(summary) = self.find("list-ip-sets", "IPSets", name).await? else {
            return Ok(None);
        };
        let response: Value = match self
            .cli
            .run_json(&[
                "wafv2",
                "get-ip-set",
                "--name",
                name,
                "--scope",
                SCOPE,
                "--id",
                summary.id.as_str(),
            ])
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        let ip_set = &response["IPSet"];
        let attrs = IpSetAttributes {
            ip_version: ip_set["IPAddressVersion"]
                .as_str()
                .unwrap_or("IPV4")
                .to_string(),
            addresses: string_set(&ip_set["Addresses"]),
        };
        let mut state = ResourceState::present(ResourceKind::IpSet, name)
            .with_id(summary.id)
            .with_version(response["LockToken"].as_str().unwrap_or(&summary.lock_token));
        if let Some(arn) = ip_set["ARN"].as_str() {
            state.set_attribute(ARN, json!(arn));
        }
        merge_attributes(&mut state, &attrs)?;
        Ok(Some(state))
    }

    pub async fn create_ip_set(&self, name: &str, attrs: &IpSetAttributes) -> Result<()> {
        let addresses = serde_json::to_string(&attrs.addresses)?;
        self.cli
            .run(&[
                "wafv2",
                "create-ip-set",
                "--name",
                name,
                "--scope",
                SCOPE,
                "--ip-address-version",
                attrs.ip_version.as_str(),
                "--addresses",
                addresses.as_str(),
            ])
            .await?;
        tracing::info!("Created IP set {} ({} addresses)", name, attrs.addresses.len());
        Ok(())
    }

    /// Replace the address list. The IP version of an existing set is fixed.
    pub async fn update_ip_set(
        &self,
        name: &str,
        attrs: &IpSetAttributes,
        version: Option<&str>,
    ) -> Result<()> {
        let summary = self.require("list-ip-sets", "IPSets", name).await?;
        let lock_token = version.unwrap_or(&summary.lock_token);
        let addresses = serde_json::to_string(&attrs.addresses)?;
        self.cli
            .run(&[
                "wafv2",
                "update-ip-set",
                "--name",
                name,
                "--scope",
                SCOPE,
                "--id",
                summary.id.as_str(),
                "--lock-token",
                lock_token,
                "--addresses",
                addresses.as_str(),
            ])
            .await?;
        tracing::info!("Updated IP set {} ({} addresses)", name, attrs.addresses.len());
        Ok(())
    }

    pub async fn delete_ip_set(&self, name: &str) -> Result<bool> {
        let Some(summary) = self.find("list-ip-sets", "IPSets", name).await? else {
            return Ok(false);
        };
        self.cli
            .run(&[
                "wafv2",
                "delete-ip-set",
                "--name",
                name,
                "--scope",
                SCOPE,
                "--id",
                summary.id.as_str(),
                "--lock-token",
                summary.lock_token.as_str(),
            ])
            .await?;
        Ok(true)
    }

    // ---- web ACLs ----

    pub async fn get_web_acl(&self, name: &str) -> Result<Option<ResourceState>> {
        let Some(summary) = self.find("list-web-acls", "WebACLs", name).await? else {
            return Ok(None);
        };
        let response: Value = match self
            .cli
            .run_json(&[
                "wafv2",
                "get-web-acl",
                "--name",
                name,
                "--scope",
                SCOPE,
                "--id",
                summary.id.as_str(),
            ])
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };

        let acl = &response["WebACL"];
        let mut state = ResourceState::present(ResourceKind::WebAcl, name)
            .with_id(summary.id)
            .with_version(response["LockToken"].as_str().unwrap_or(&summary.lock_token));
        if let Some(arn) = acl["ARN"].as_str() {
            state.set_attribute(ARN, json!(arn));
        }
        merge_attributes(&mut state, &web_acl_attributes(acl))?;
        Ok(Some(state))
    }

    pub async fn create_web_acl(&self, name: &str, attrs: &WebAclAttributes) -> Result<()> {
        let (default_action, rules, visibility) = web_acl_arguments(name, attrs)?;
        self.cli
            .run(&[
                "wafv2",
                "create-web-acl",
                "--name",
                name,
                "--scope",
                SCOPE,
                "--default-action",
                default_action.as_str(),
                "--rules",
                rules.as_str(),
                "--visibility-config",
                visibility.as_str(),
            ])
            .await?;
        tracing::info!("Created web ACL {}", name);
        Ok(())
    }

    pub async fn update_web_acl(
        &self,
        name: &str,
        attrs: &WebAclAttributes,
        version: Option<&str>,
    ) -> Result<()> {
        let summary = self.require("list-web-acls", "WebACLs", name).await?;
        let lock_token = version.unwrap_or(&summary.lock_token);
        let (default_action, rules, visibility) = web_acl_arguments(name, attrs)?;
        self.cli
            .run(&[
                "wafv2",
                "update-web-acl",
                "--name",
                name,
                "--scope",
                SCOPE,
                "--id",
                summary.id.as_str(),
                "--lock-token",
                lock_token,
                "--default-action",
                default_action.as_str(),
                "--rules",
                rules.as_str(),
                "--visibility-config",
                visibility.as_str(),
            ])
            .await?;
        tracing::info!("Updated web ACL {}", name);
        Ok(())
    }

    /// Fails with `WAFAssociatedItemException` while a distribution still
    /// references the ACL
    pub async fn delete_web_acl(&self, name: &str) -> Result<bool> {
        let Some(summary) = self.find("list-web-acls", "WebACLs", name).await? else {
            return Ok(false);
        };
        self.cli
            .run(&[
                "wafv2",
                "delete-web-acl",
                "--name",
                name,
                "--scope",
                SCOPE,
                "--id",
                summary.id.as_str(),
                "--lock-token",
                summary.lock_token.as_str(),
            ])
            .await?;
        Ok(true)
    }

    async fn require(&self, command: &str, list_field: &str, name: &str) -> Result<Summary> {
        self.find(command, list_field, name).await?.ok_or_else(|| {
            sitelock_cloud::CloudError::NotFound(format!("{}: {}", list_field, name)).into()
        })
    }
}

fn string_set(value: &Value) -> BTreeSet<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn visibility_config(metric: &str) -> Value {
    json!({
        "SampledRequestsEnabled": true,
        "CloudWatchMetricsEnabled": true,
        "MetricName": metric
    })
}

/// `--default-action`, `--rules` and `--visibility-config` arguments
fn web_acl_arguments(name: &str, attrs: &WebAclAttributes) -> Result<(String, String, String)> {
    let default_action = match attrs.default_action.as_str() {
        "block" => json!({ "Block": {} }),
        "allow" => json!({ "Allow": {} }),
        other => {
            return Err(AwsError::CloudError(
                sitelock_cloud::CloudError::InvalidConfig(format!(
                    "unknown web ACL default action: {}",
                    other
                )),
            ));
        }
    };
    Ok((
        serde_json::to_string(&default_action)?,
        serde_json::to_string(&allow_rules(name, &attrs.ip_set_arns))?,
        serde_json::to_string(&visibility_config(name))?,
    ))
}

/// A single allow rule matching any of the referenced IP sets
pub fn allow_rules(name: &str, ip_set_arns: &BTreeSet<String>) -> Value {
    let mut statements: Vec<Value> = ip_set_arns
        .iter()
        .map(|arn| json!({ "IPSetReferenceStatement": { "ARN": arn } }))
        .collect();
    let statement = match statements.len() {
        0 => return json!([]),
        1 => statements.remove(0),
        _ => json!({ "OrStatement": { "Statements": statements } }),
    };
    json!([{
        "Name": ALLOW_RULE,
        "Priority": 0,
        "Action": { "Allow": {} },
        "Statement": statement,
        "VisibilityConfig": visibility_config(&format!("{}-allow", name))
    }])
}

/// Managed attributes of a web ACL as returned by `get-web-acl`
pub fn web_acl_attributes(acl: &Value) -> WebAclAttributes {
    let mut ip_set_arns = BTreeSet::new();
    if let Some(rules) = acl["Rules"].as_array() {
        for rule in rules {
            collect_ip_set_arns(&rule["Statement"], &mut ip_set_arns);
        }
    }
    let default_action = if acl["DefaultAction"].get("Block").is_some() {
        "block"
    } else {
        "allow"
    };
    WebAclAttributes {
        ip_set_arns,
        default_action: default_action.to_string(),
    }
}

fn collect_ip_set_arns(statement: &Value, arns: &mut BTreeSet<String>) {
    if let Some(arn) = statement["IPSetReferenceStatement"]["ARN"].as_str() {
        arns.insert(arn.to_string());
    }
    for nested in ["OrStatement", "AndStatement"] {
        if let Some(statements) = statement[nested]["Statements"].as_array() {
            for inner in statements {
                collect_ip_set_arns(inner, arns);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V4: &str = "arn:aws:wafv2:us-east-1:1:global/ipset/site-allow-v4/aaa";
    const V6: &str = "arn:aws:wafv2:us-east-1:1:global/ipset/site-allow-v6/bbb";

    #[test]
    fn test_single_ip_set_rule() {
        let rules = allow_rules("site-acl", &BTreeSet::from([V4.to_string()]));
        assert_eq!(rules[0]["Statement"]["IPSetReferenceStatement"]["ARN"], V4);
        assert_eq!(rules[0]["Action"], json!({"Allow": {}}));
        assert_eq!(rules[0]["VisibilityConfig"]["MetricName"], "site-acl-allow");
    }

    #[test]
    fn test_two_ip_sets_use_or_statement() {
        let arns = BTreeSet::from([V4.to_string(), V6.to_string()]);
        let rules = allow_rules("site-acl", &arns);
        let statements = rules[0]["Statement"]["OrStatement"]["Statements"]
            .as_array()
            .unwrap();
        assert_eq!(statements.len(), 2);
    }

    #[test]
    fn test_no_ip_sets_no_rules() {
        assert_eq!(allow_rules("site-acl", &BTreeSet::new()), json!([]));
    }

    #[test]
    fn test_web_acl_attributes_from_rules() {
        let arns = BTreeSet::from([V4.to_string(), V6.to_string()]);
        let acl = json!({
            "Name": "site-acl",
            "DefaultAction": {"Block": {}},
            "Rules": allow_rules("site-acl", &arns)
        });
        let attrs = web_acl_attributes(&acl);
        assert_eq!(attrs.ip_set_arns, arns);
        assert_eq!(attrs.default_action, "block");
    }

    #[test]
    fn test_default_allow_action() {
        let acl = json!({"DefaultAction": {"Allow": {}}, "Rules": []});
        let attrs = web_acl_attributes(&acl);
        assert!(attrs.ip_set_arns.is_empty());
        assert_eq!(attrs.default_action, "allow");
    }

    #[test]
    fn test_unknown_default_action_rejected() {
        let attrs = WebAclAttributes {
            ip_set_arns: BTreeSet::new(),
            default_action: "count".into(),
        };
        assert!(web_acl_arguments("site-acl", &attrs).is_err());
    }
}
