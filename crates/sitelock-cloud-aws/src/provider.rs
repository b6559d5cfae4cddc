//! AWS Resource API implementation

use crate::acm::Acm;
use crate::cli::{AwsCli, GLOBAL_REGION};
use crate::cloudfront::CloudFront;
use crate::error::AwsError;
use crate::route53::Route53;
use crate::s3::S3;
use crate::waf::Waf;
use async_trait::async_trait;
use sitelock_cloud::site::attributes::{
    BucketAttributes, BucketPolicyAttributes, CertificateAttributes, DistributionAttributes,
    DnsRecordAttributes, IpSetAttributes, OacAttributes, WebAclAttributes,
};
use sitelock_cloud::{
    AuthStatus, CloudError, Identity, ResourceApi, ResourceKind, ResourceRef, ResourceSpec,
    ResourceState,
};

/// One AWS identity, exposed as a [`ResourceApi`]
///
/// Regional services (S3) use the identity's region. CloudFront-scoped WAF
/// and ACM always go to us-east-1.
pub struct AwsResourceApi {
    name: String,
    cli: AwsCli,
    global: AwsCli,
    hosted_zone_id: Option<String>,
}

impl AwsResourceApi {
    pub fn new(identity: &Identity, default_region: &str) -> Self {
        let cli = AwsCli::from_identity(identity, default_region);
        Self {
            name: format!("aws:{}", cli.profile()),
            global: cli.in_region(GLOBAL_REGION),
            cli,
            hosted_zone_id: None,
        }
    }

    /// Pin Route 53 records to one hosted zone instead of looking it up
    pub fn with_hosted_zone(mut self, zone_id: Option<String>) -> Self {
        self.hosted_zone_id = zone_id;
        self
    }

    fn route53(&self) -> Route53<'_> {
        Route53::new(&self.global, self.hosted_zone_id.as_deref())
    }

    async fn write(&self, spec: &ResourceSpec, current: Option<&ResourceState>) -> Result<(), AwsError> {
        let key = spec.key.as_str();
        match spec.kind {
            ResourceKind::Bucket => {
                let attrs: BucketAttributes = spec.attributes_as()?;
                let s3 = S3::new(&self.cli);
                match current {
                    Some(current) => s3.update_bucket(key, &attrs, current).await,
                    None => s3.create_bucket(key, &attrs).await,
                }
            }
            ResourceKind::BucketPolicy => {
                let attrs: BucketPolicyAttributes = spec.attributes_as()?;
                S3::new(&self.cli).put_policy(&attrs).await
            }
            ResourceKind::OriginAccessControl => {
                let attrs: OacAttributes = spec.attributes_as()?;
                let cloudfront = CloudFront::new(&self.global);
                match current {
                    Some(current) => {
                        cloudfront
                            .update_oac(
                                current.require_id()?,
                                key,
                                &attrs,
                                current.version.as_deref().unwrap_or_default(),
                            )
                            .await
                    }
                    None => cloudfront.create_oac(key, &attrs).await,
                }
            }
            ResourceKind::Distribution => {
                let attrs: DistributionAttributes = spec.attributes_as()?;
                let cloudfront = CloudFront::new(&self.global);
                match current {
                    Some(current) => {
                        cloudfront
                            .update_distribution(key, &attrs, current.version.as_deref())
                            .await
                    }
                    None => cloudfront.create_distribution(key, &attrs).await,
                }
            }
            ResourceKind::IpSet => {
                let attrs: IpSetAttributes = spec.attributes_as()?;
                let waf = Waf::new(&self.global);
                match current {
                    Some(current) => {
                        waf.update_ip_set(key, &attrs, current.version.as_deref())
                            .await
                    }
                    None => waf.create_ip_set(key, &attrs).await,
                }
            }
            ResourceKind::WebAcl => {
                let attrs: WebAclAttributes = spec.attributes_as()?;
                let waf = Waf::new(&self.global);
                match current {
                    Some(current) => {
                        waf.update_web_acl(key, &attrs, current.version.as_deref())
                            .await
                    }
                    None => waf.create_web_acl(key, &attrs).await,
                }
            }
            ResourceKind::DnsRecord => {
                let attrs: DnsRecordAttributes = spec.attributes_as()?;
                match current {
                    Some(current) => {
                        self.route53()
                            .update_record(&attrs, current.version.as_deref())
                            .await
                    }
                    None => self.route53().create_record(&attrs).await,
                }
            }
            ResourceKind::Certificate => {
                if current.is_some() {
                    return Err(CloudError::InvalidConfig(format!(
                        "certificate {} cannot be modified in place; remove it to request a new one",
                        key
                    ))
                    .into());
                }
                let attrs: CertificateAttributes = spec.attributes_as()?;
                Acm::new(&self.global).request_certificate(&attrs).await?;
                Ok(())
            }
        }
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

#[async_trait]
impl ResourceApi for AwsResourceApi {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_auth(&self) -> sitelock_cloud::Result<AuthStatus> {
        match self.cli.check_auth().await {
            Ok(identity) => Ok(AuthStatus::ok(format!(
                "{} ({})",
                identity.account, identity.arn
            ))),
            Err(AwsError::CliNotFound) => {
                Ok(AuthStatus::failed("aws CLI がインストールされていません"))
            }
            Err(AwsError::AuthenticationFailed(message)) => Ok(AuthStatus::failed(format!(
                "プロファイル {} の認証に失敗しました: {}",
                self.cli.profile(),
                message
            ))),
            Err(e) => Ok(AuthStatus::failed(e.to_string())),
        }
    }

    async fn get(&self, resource: &ResourceRef) -> sitelock_cloud::Result<Option<ResourceState>> {
        let key = resource.key.as_str();
        let state = match resource.kind {
            ResourceKind::Bucket => S3::new(&self.cli).get_bucket(key).await?,
            ResourceKind::BucketPolicy => S3::new(&self.cli).get_policy(key).await?,
            ResourceKind::OriginAccessControl => CloudFront::new(&self.global).get_oac(key).await?,
            ResourceKind::Distribution => {
                CloudFront::new(&self.global).get_distribution(key).await?
            }
            ResourceKind::IpSet => Waf::new(&self.global).get_ip_set(key).await?,
            ResourceKind::WebAcl => Waf::new(&self.global).get_web_acl(key).await?,
            ResourceKind::DnsRecord => self.route53().get_record(key).await?,
            ResourceKind::Certificate => Acm::new(&self.global).get_certificate(key).await?,
        };
        Ok(state)
    }

    async fn create(&self, spec: &ResourceSpec) -> sitelock_cloud::Result<ResourceState> {
        tracing::debug!("{}: create {}", self.name, spec.resource_ref());
        self.write(spec, None).await?;
        self.read_back(spec).await
    }

    async fn update(
        &self,
        spec: &ResourceSpec,
        version: Option<&str>,
    ) -> sitelock_cloud::Result<ResourceState> {
        tracing::debug!("{}: update {}", self.name, spec.resource_ref());
        let mut current = self
            .get(&spec.resource_ref())
            .await?
            .ok_or_else(|| CloudError::NotFound(spec.resource_ref().to_string()))?;
        // The caller's token wins so a concurrent write is detected
        if version.is_some() {
            current.version = version.map(str::to_string);
        }
        self.write(spec, Some(&current)).await?;
        self.read_back(spec).await
    }

    async fn delete(&self, resource: &ResourceRef) -> sitelock_cloud::Result<bool> {
        tracing::debug!("{}: delete {}", self.name, resource);
        let key = resource.key.as_str();
        let deleted = match resource.kind {
            ResourceKind::Bucket => S3::new(&self.cli).delete_bucket(key).await?,
            ResourceKind::BucketPolicy => S3::new(&self.cli).delete_policy(key).await?,
            ResourceKind::OriginAccessControl => {
                CloudFront::new(&self.global).delete_oac(key).await?
            }
            ResourceKind::Distribution => {
                CloudFront::new(&self.global).delete_distribution(key).await?
            }
            ResourceKind::IpSet => Waf::new(&self.global).delete_ip_set(key).await?,
            ResourceKind::WebAcl => Waf::new(&self.global).delete_web_acl(key).await?,
            ResourceKind::DnsRecord => self.route53().delete_record(key).await?,
            ResourceKind::Certificate => Acm::new(&self.global).delete_certificate(key).await?,
        };
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_and_regions() {
        let identity = Identity::profile("cdn-admin").with_region("ap-northeast-1");
        let api = AwsResourceApi::new(&identity, "eu-west-1");
        assert_eq!(api.name(), "aws:cdn-admin");
        assert_eq!(api.cli.region(), "ap-northeast-1");
        assert_eq!(api.global.region(), GLOBAL_REGION);
    }

    #[test]
    fn test_default_identity() {
        let api = AwsResourceApi::new(&Identity::default(), "eu-west-1")
            .with_hosted_zone(Some("Z0123456789".into()));
        assert_eq!(api.name(), "aws:default");
        assert_eq!(api.cli.region(), "eu-west-1");
        assert_eq!(api.hosted_zone_id.as_deref(), Some("Z0123456789"));
    }
}
