//! S3 buckets and bucket policies

use crate::cli::AwsCli;
use crate::error::{AwsError, Result};
use crate::merge_attributes;
use serde_json::{Value, json};
use sitelock_cloud::site::attributes::{BucketAttributes, BucketPolicyAttributes};
use sitelock_cloud::{CloudError, ResourceKind, ResourceState};
use std::collections::BTreeSet;

const DISTRIBUTION_READ_SID: &str = "AllowDistributionRead";
const SOURCE_IP_SID: &str = "AllowSourceIpRead";
const SOURCE_VPCE_SID: &str = "AllowSourceVpceRead";

pub struct S3<'a> {
    cli: &'a AwsCli,
}

impl<'a> S3<'a> {
    pub fn new(cli: &'a AwsCli) -> Self {
        Self { cli }
    }

    pub async fn get_bucket(&self, bucket: &str) -> Result<Option<ResourceState>> {
        match self.cli.run(&["s3api", "head-bucket", "--bucket", bucket]).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) if e.has_code(&["403", "Forbidden"]) => {
                return Err(CloudError::Ownership(format!(
                    "bucket {} exists but is not accessible to profile {}",
                    bucket,
                    self.cli.profile()
                ))
                .into());
            }
            Err(e) => return Err(e),
        }

        let location: Value = self
            .cli
            .run_json(&["s3api", "get-bucket-location", "--bucket", bucket])
            .await?;
        let region = location
            .get("LocationConstraint")
            .and_then(Value::as_str)
            .filter(|r| !r.is_empty())
            .unwrap_or("us-east-1")
            .to_string();

        let blocked = match self
            .cli
            .run_json::<Value>(&["s3api", "get-public-access-block", "--bucket", bucket])
            .await
        {
            Ok(response) => public_access_blocked(&response),
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e),
        };

        let attrs = BucketAttributes {
            region: Some(region),
            block_public_access: Some(blocked),
        };
        let mut state = ResourceState::present(ResourceKind::Bucket, bucket)
            .with_id(bucket)
            .with_attribute("arn", json!(format!("arn:aws:s3:::{}", bucket)));
        merge_attributes(&mut state, &attrs)?;
        Ok(Some(state))
    }

    pub async fn create_bucket(&self, bucket: &str, attrs: &BucketAttributes) -> Result<()> {
        let region = attrs.region.as_deref().unwrap_or(self.cli.region());
        let location = format!("LocationConstraint={}", region);
        let mut args = vec!["s3api", "create-bucket", "--bucket", bucket];
        // us-east-1 rejects an explicit location constraint
        if region != "us-east-1" {
            args.push("--create-bucket-configuration");
            args.push(location.as_str());
        }
        self.cli.run(&args).await?;
        tracing::info!("Created bucket {} in {}", bucket, region);

        if attrs.block_public_access == Some(true) {
            self.block_public_access(bucket).await?;
        }
        Ok(())
    }

    pub async fn update_bucket(
        &self,
        bucket: &str,
        attrs: &BucketAttributes,
        current: &ResourceState,
    ) -> Result<()> {
        if let Some(region) = &attrs.region {
            if current.get_str("region") != Some(region.as_str()) {
                return Err(CloudError::Ownership(format!(
                    "bucket {} already exists in {} (wanted {}); buckets cannot move regions",
                    bucket,
                    current.get_str("region").unwrap_or("unknown"),
                    region
                ))
                .into());
            }
        }
        match attrs.block_public_access {
            Some(true) => self.block_public_access(bucket).await,
            Some(false) => {
                self.cli
                    .run(&["s3api", "delete-public-access-block", "--bucket", bucket])
                    .await?;
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn block_public_access(&self, bucket: &str) -> Result<()> {
        self.cli
            .run(&[
                "s3api",
                "put-public-access-block",
                "--bucket",
                bucket,
                "--public-access-block-configuration",
                "BlockPublicAcls=true,IgnorePublicAcls=true,BlockPublicPolicy=true,RestrictPublicBuckets=true",
            ])
            .await?;
        Ok(())
    }

    /// Returns false when the bucket does not exist
    pub async fn delete_bucket(&self, bucket: &str) -> Result<bool> {
        match self.cli.run(&["s3api", "delete-bucket", "--bucket", bucket]).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn get_policy(&self, bucket: &str) -> Result<Option<ResourceState>> {
        let response: Value = match self
            .cli
            .run_json(&["s3api", "get-bucket-policy", "--bucket", bucket])
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let document = response
            .get("Policy")
            .and_then(Value::as_str)
            .ok_or_else(|| AwsError::UnexpectedResponse("get-bucket-policy: no Policy".into()))?;
        let policy: Value = serde_json::from_str(document)?;

        let attrs = parse_policy(bucket, &policy);
        let mut state = ResourceState::present(ResourceKind::BucketPolicy, bucket);
        merge_attributes(&mut state, &attrs)?;
        Ok(Some(state))
    }

    pub async fn put_policy(&self, attrs: &BucketPolicyAttributes) -> Result<()> {
        let document = serde_json::to_string(&render_policy(attrs))?;
        self.cli
            .run(&[
                "s3api",
                "put-bucket-policy",
                "--bucket",
                attrs.bucket.as_str(),
                "--policy",
                document.as_str(),
            ])
            .await?;
        Ok(())
    }

    pub async fn delete_policy(&self, bucket: &str) -> Result<bool> {
        if self.get_policy(bucket).await?.is_none() {
            return Ok(false);
        }
        self.cli
            .run(&["s3api", "delete-bucket-policy", "--bucket", bucket])
            .await?;
        Ok(true)
    }
}

fn public_access_blocked(response: &Value) -> bool {
    let config = &response["PublicAccessBlockConfiguration"];
    [
        "BlockPublicAcls",
        "IgnorePublicAcls",
        "BlockPublicPolicy",
        "RestrictPublicBuckets",
    ]
    .iter()
    .all(|flag| config[*flag].as_bool() == Some(true))
}

/// Bucket policy document: read for the distribution (via origin access
/// control) plus optional direct read from allowed sources
pub fn render_policy(attrs: &BucketPolicyAttributes) -> Value {
    let objects = format!("arn:aws:s3:::{}/*", attrs.bucket);
    let mut statements = vec![json!({
        "Sid": DISTRIBUTION_READ_SID,
        "Effect": "Allow",
        "Principal": { "Service": "cloudfront.amazonaws.com" },
        "Action": "s3:GetObject",
        "Resource": objects,
        "Condition": { "StringEquals": { "AWS:SourceArn": attrs.distribution_arn } }
    })];

    if !attrs.source_ips.is_empty() {
        statements.push(json!({
            "Sid": SOURCE_IP_SID,
            "Effect": "Allow",
            "Principal": "*",
            "Action": "s3:GetObject",
            "Resource": objects,
            "Condition": { "IpAddress": { "aws:SourceIp": attrs.source_ips } }
        }));
    }
    if !attrs.source_vpces.is_empty() {
        statements.push(json!({
            "Sid": SOURCE_VPCE_SID,
            "Effect": "Allow",
            "Principal": "*",
            "Action": "s3:GetObject",
            "Resource": objects,
            "Condition": { "StringEquals": { "aws:SourceVpce": attrs.source_vpces } }
        }));
    }

    json!({ "Version": "2012-10-17", "Statement": statements })
}

/// Recover the managed attributes from a policy document. Statements
/// written by someone else are ignored.
pub fn parse_policy(bucket: &str, policy: &Value) -> BucketPolicyAttributes {
    let mut attrs = BucketPolicyAttributes {
        bucket: bucket.to_string(),
        distribution_arn: String::new(),
        source_ips: BTreeSet::new(),
        source_vpces: BTreeSet::new(),
    };

    let statements = match &policy["Statement"] {
        Value::Array(items) => items.clone(),
        single @ Value::Object(_) => vec![single.clone()],
        _ => Vec::new(),
    };
    for statement in &statements {
        match statement["Sid"].as_str() {
            Some(DISTRIBUTION_READ_SID) => {
                if let Some(arn) =
                    statement["Condition"]["StringEquals"]["AWS:SourceArn"].as_str()
                {
                    attrs.distribution_arn = arn.to_string();
                }
            }
            Some(SOURCE_IP_SID) => {
                attrs.source_ips = string_set(&statement["Condition"]["IpAddress"]["aws:SourceIp"]);
            }
            Some(SOURCE_VPCE_SID) => {
                attrs.source_vpces =
                    string_set(&statement["Condition"]["StringEquals"]["aws:SourceVpce"]);
            }
            _ => {}
        }
    }
    attrs
}

/// IAM condition values may be a single string or a list
fn string_set(value: &Value) -> BTreeSet<String> {
    match value {
        Value::String(s) => BTreeSet::from([s.clone()]),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => BTreeSet::new(),
    }
}
