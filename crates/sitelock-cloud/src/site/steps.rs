//! Site pipeline steps

use super::attributes::{
    ARN, BucketAttributes, BucketPolicyAttributes, CertificateAttributes, DOMAIN_NAME,
    DistributionAttributes, DnsRecordAttributes, DnsRecordType, IpSetAttributes, OacAttributes,
    WebAclAttributes,
};
use super::{Backends, SiteSettings, output};
use crate::access::{AccessChange, AccessStrategy, AllowList};
use crate::api::ResourceApi;
use crate::certificate::{
    CertificateLifecycle, CertificateStatus, VALIDATION_RECORDS, ValidationRecord,
};
use crate::error::{CloudError, Result};
use crate::model::{ResourceKind, ResourceRef, ResourceSpec, ResourceState, ResourceStatus};
use crate::outcome::{ActionType, ResourceAction};
use crate::pipeline::{PipelineStep, StepContext};
use crate::reconcile::{Reconciled, Reconciler};
use crate::waiter::{WaitPolicy, await_attribute, await_status};
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

const VALIDATION_RECORD_TTL: u32 = 300;

async fn apply(
    ctx: &mut StepContext,
    api: &dyn ResourceApi,
    spec: &ResourceSpec,
) -> Result<Reconciled> {
    ctx.focus(spec.resource_ref());
    let reconciled = Reconciler::new(api)
        .with_log(ctx.log())
        .reconcile(spec)
        .await?;
    ctx.record(&reconciled);
    Ok(reconciled)
}

/// Reconcile a partial spec against a resource that must already exist
async fn patch(
    ctx: &mut StepContext,
    api: &dyn ResourceApi,
    spec: &ResourceSpec,
) -> Result<Reconciled> {
    ctx.focus(spec.resource_ref());
    Reconciler::new(api).require(&spec.resource_ref()).await?;
    apply(ctx, api, spec).await
}

/// Delete a resource if it exists. Absent resources cost no write call.
async fn remove(
    ctx: &mut StepContext,
    api: &dyn ResourceApi,
    resource: &ResourceRef,
) -> Result<ActionType> {
    ctx.focus(resource.clone());
    let reconciler = Reconciler::new(api).with_log(ctx.log());
    let action = match reconciler.observe(resource).await? {
        Some(_) => reconciler.remove(resource).await?,
        None => ActionType::NoOp,
    };
    ctx.record_action(ResourceAction::new(resource.clone(), action));
    Ok(action)
}

async fn settle(
    ctx: &mut StepContext,
    api: &dyn ResourceApi,
    resource: &ResourceRef,
    policy: &WaitPolicy,
) -> Result<ResourceState> {
    ctx.focus(resource.clone());
    tracing::info!("Waiting for {} to deploy", resource);
    let state = await_status(api, resource, ResourceStatus::Deployed, policy).await?;
    ctx.unfocus();
    Ok(state)
}

fn provide_distribution(ctx: &mut StepContext, state: &ResourceState) -> Result<()> {
    ctx.provide(output::DISTRIBUTION_ID, state.require_id()?);
    ctx.provide(output::DISTRIBUTION_DOMAIN, state.require_str(DOMAIN_NAME)?);
    ctx.provide(output::DISTRIBUTION_ARN, state.require_str(ARN)?);
    Ok(())
}

/// Attach (or with an empty id, detach) the web ACL of the distribution
async fn set_web_acl(
    ctx: &mut StepContext,
    settings: &SiteSettings,
    cdn: &dyn ResourceApi,
    web_acl_id: String,
) -> Result<()> {
    let attrs = DistributionAttributes {
        web_acl_id: Some(web_acl_id),
        ..Default::default()
    };
    let distribution = settings.distribution_ref();
    let spec = ResourceSpec::from_attributes(distribution.kind, distribution.key.clone(), &attrs)?;
    let reconciled = patch(ctx, cdn, &spec).await?;
    if reconciled.action.is_write() {
        settle(ctx, cdn, &distribution, &settings.distribution_wait).await?;
    }
    Ok(())
}

/// Storage bucket with public access blocked
pub struct BucketStep {
    settings: Arc<SiteSettings>,
    storage: Arc<dyn ResourceApi>,
}

impl BucketStep {
    pub fn new(settings: Arc<SiteSettings>, storage: Arc<dyn ResourceApi>) -> Self {
        Self { settings, storage }
    }
}

#[async_trait]
impl PipelineStep for BucketStep {
    fn name(&self) -> &str {
        "bucket"
    }

    fn provides(&self) -> &[&'static str] {
        &[output::BUCKET_NAME]
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let attrs = BucketAttributes {
            region: Some(
                self.settings
                    .identities
                    .storage
                    .region_or(&self.settings.region)
                    .to_string(),
            ),
            block_public_access: Some(true),
        };
        let spec =
            ResourceSpec::from_attributes(ResourceKind::Bucket, self.settings.bucket.clone(), &attrs)?;
        let reconciled = apply(ctx, self.storage.as_ref(), &spec).await?;
        ctx.provide(output::BUCKET_NAME, reconciled.state.key.clone());
        Ok(())
    }
}

/// Origin access control the distribution signs bucket requests with
pub struct OriginAccessStep {
    settings: Arc<SiteSettings>,
    cdn: Arc<dyn ResourceApi>,
}

impl OriginAccessStep {
    pub fn new(settings: Arc<SiteSettings>, cdn: Arc<dyn ResourceApi>) -> Self {
        Self { settings, cdn }
    }
}

#[async_trait]
impl PipelineStep for OriginAccessStep {
    fn name(&self) -> &str {
        "origin-access"
    }

    fn provides(&self) -> &[&'static str] {
        &[output::OAC_ID]
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let spec = ResourceSpec::from_attributes(
            ResourceKind::OriginAccessControl,
            self.settings.oac_ref().key,
            &OacAttributes::s3(),
        )?;
        let reconciled = apply(ctx, self.cdn.as_ref(), &spec).await?;
        ctx.provide(output::OAC_ID, reconciled.state.require_id()?);
        Ok(())
    }
}

/// Distribution in front of the bucket, awaited until deployed
pub struct DistributionStep {
    settings: Arc<SiteSettings>,
    cdn: Arc<dyn ResourceApi>,
}

impl DistributionStep {
    pub fn new(settings: Arc<SiteSettings>, cdn: Arc<dyn ResourceApi>) -> Self {
        Self { settings, cdn }
    }
}

#[async_trait]
impl PipelineStep for DistributionStep {
    fn name(&self) -> &str {
        "distribution"
    }

    fn requires(&self) -> &[&'static str] {
        &[output::BUCKET_NAME, output::OAC_ID]
    }

    fn provides(&self) -> &[&'static str] {
        &[
            output::DISTRIBUTION_ID,
            output::DISTRIBUTION_DOMAIN,
            output::DISTRIBUTION_ARN,
        ]
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let settings = &self.settings;
        let attrs = DistributionAttributes {
            origin_domain: Some(settings.origin_domain_for(ctx.require(output::BUCKET_NAME)?)),
            origin_access_control_id: Some(ctx.require(output::OAC_ID)?.to_string()),
            default_root_object: Some(settings.default_root_object.clone()),
            min_ttl: Some(settings.cache.min),
            default_ttl: Some(settings.cache.default),
            max_ttl: Some(settings.cache.max),
            price_class: Some(settings.price_class.clone()),
            enabled: Some(true),
            comment: Some(settings.name.clone()),
            ..Default::default()
        };
        let distribution = settings.distribution_ref();
        let spec =
            ResourceSpec::from_attributes(distribution.kind, distribution.key.clone(), &attrs)?;

        let reconciled = apply(ctx, self.cdn.as_ref(), &spec).await?;
        let state = if reconciled.action.is_write()
            || reconciled.state.status != ResourceStatus::Deployed
        {
            settle(ctx, self.cdn.as_ref(), &distribution, &settings.distribution_wait).await?
        } else {
            reconciled.state
        };
        provide_distribution(ctx, &state)
    }
}

/// Read an existing distribution so later steps can reference it
pub struct LookupDistributionStep {
    settings: Arc<SiteSettings>,
    cdn: Arc<dyn ResourceApi>,
}

impl LookupDistributionStep {
    pub fn new(settings: Arc<SiteSettings>, cdn: Arc<dyn ResourceApi>) -> Self {
        Self { settings, cdn }
    }
}

#[async_trait]
impl PipelineStep for LookupDistributionStep {
    fn name(&self) -> &str {
        "lookup-distribution"
    }

    fn provides(&self) -> &[&'static str] {
        &[
            output::DISTRIBUTION_ID,
            output::DISTRIBUTION_DOMAIN,
            output::DISTRIBUTION_ARN,
        ]
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let distribution = self.settings.distribution_ref();
        ctx.focus(distribution.clone());
        let state = Reconciler::new(self.cdn.as_ref())
            .require(&distribution)
            .await
            .map_err(|e| match e {
                CloudError::NotFound(_) => CloudError::NotFound(format!(
                    "{} (run `provision` first)",
                    distribution
                )),
                other => other,
            })?;
        ctx.unfocus();
        provide_distribution(ctx, &state)
    }
}

/// Apply the access policy: firewall rules or bucket-policy conditions
pub struct AccessRestrictionStep {
    settings: Arc<SiteSettings>,
    backends: Backends,
    change: AccessChange,
}

impl AccessRestrictionStep {
    pub fn new(settings: Arc<SiteSettings>, backends: Backends, change: AccessChange) -> Self {
        Self {
            settings,
            backends,
            change,
        }
    }

    /// Sources currently allowed by either mechanism
    async fn current_allow_list(&self) -> Result<AllowList> {
        let mut sources: Vec<String> = Vec::new();
        for ipv6 in [false, true] {
            if let Some(state) = self.backends.cdn.get(&self.settings.ip_set_ref(ipv6)).await? {
                let addresses: BTreeSet<String> =
                    state.get_attribute("addresses").unwrap_or_default();
                sources.extend(addresses);
            }
        }
        if let Some(state) = self
            .backends
            .storage
            .get(&self.settings.bucket_policy_ref())
            .await?
        {
            for name in ["source_ips", "source_vpces"] {
                let values: BTreeSet<String> = state.get_attribute(name).unwrap_or_default();
                sources.extend(values);
            }
        }
        AllowList::parse(&sources)
    }

    async fn bucket_policy(
        &self,
        ctx: &mut StepContext,
        source_ips: BTreeSet<String>,
        source_vpces: BTreeSet<String>,
    ) -> Result<Reconciled> {
        let attrs = BucketPolicyAttributes {
            bucket: self.settings.bucket.clone(),
            distribution_arn: ctx.require(output::DISTRIBUTION_ARN)?.to_string(),
            source_ips,
            source_vpces,
        };
        let spec = ResourceSpec::from_attributes(
            ResourceKind::BucketPolicy,
            self.settings.bucket_policy_ref().key,
            &attrs,
        )?;
        apply(ctx, self.backends.storage.as_ref(), &spec).await
    }

    async fn restrict_with_firewall(&self, ctx: &mut StepContext, allow: &AllowList) -> Result<()> {
        let cdn = self.backends.cdn.as_ref();

        let mut ip_set_arns = BTreeSet::new();
        for (ipv6, ip_version, addresses) in [
            (false, "IPV4", allow.ipv4_cidrs()),
            (true, "IPV6", allow.ipv6_cidrs()),
        ] {
            let attrs = IpSetAttributes {
                ip_version: ip_version.to_string(),
                addresses,
            };
            let spec = ResourceSpec::from_attributes(
                ResourceKind::IpSet,
                self.settings.ip_set_ref(ipv6).key,
                &attrs,
            )?;
            let ip_set = apply(ctx, cdn, &spec).await?;
            ip_set_arns.insert(ip_set.state.require_str(ARN)?.to_string());
        }

        let attrs = WebAclAttributes {
            ip_set_arns,
            default_action: "block".to_string(),
        };
        let spec = ResourceSpec::from_attributes(
            ResourceKind::WebAcl,
            self.settings.web_acl_ref().key,
            &attrs,
        )?;
        let web_acl = apply(ctx, cdn, &spec).await?;
        let web_acl_arn = web_acl.state.require_str(ARN)?.to_string();

        // The firewall must be attached before source conditions are lifted
        // from the bucket policy.
        set_web_acl(ctx, &self.settings, cdn, web_acl_arn.clone()).await?;
        ctx.provide(output::WEB_ACL_ARN, web_acl_arn);
        self.bucket_policy(ctx, BTreeSet::new(), BTreeSet::new()).await?;
        Ok(())
    }

    async fn restrict_with_bucket_policy(
        &self,
        ctx: &mut StepContext,
        allow: &AllowList,
    ) -> Result<()> {
        let cdn = self.backends.cdn.as_ref();
        let source_ips = allow
            .ipv4_cidrs()
            .into_iter()
            .chain(allow.ipv6_cidrs())
            .collect();
        self.bucket_policy(ctx, source_ips, allow.vpc_endpoints())
            .await?;

        // The web ACL cannot be deleted while still attached.
        set_web_acl(ctx, &self.settings, cdn, String::new()).await?;
        remove(ctx, cdn, &self.settings.web_acl_ref()).await?;
        for ipv6 in [false, true] {
            remove(ctx, cdn, &self.settings.ip_set_ref(ipv6)).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PipelineStep for AccessRestrictionStep {
    fn name(&self) -> &str {
        "access-restriction"
    }

    fn requires(&self) -> &[&'static str] {
        &[output::DISTRIBUTION_ID, output::DISTRIBUTION_ARN]
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let current = match &self.change {
            AccessChange::Widen(_) => self.current_allow_list().await?,
            AccessChange::Lock(_) => AllowList::new(),
        };
        let allow = self.settings.access.resolve(&self.change, &current)?;
        tracing::info!(
            "Restricting {} to {} via {}",
            self.settings.name,
            allow,
            self.settings.access.strategy
        );

        match self.settings.access.strategy {
            AccessStrategy::Firewall => self.restrict_with_firewall(ctx, &allow).await,
            AccessStrategy::BucketPolicy => self.restrict_with_bucket_policy(ctx, &allow).await,
        }
    }
}

/// Alias record for the site domain, in the DNS identity
pub struct DnsAliasStep {
    settings: Arc<SiteSettings>,
    dns: Arc<dyn ResourceApi>,
}

impl DnsAliasStep {
    pub fn new(settings: Arc<SiteSettings>, dns: Arc<dyn ResourceApi>) -> Self {
        Self { settings, dns }
    }
}

#[async_trait]
impl PipelineStep for DnsAliasStep {
    fn name(&self) -> &str {
        "dns-alias"
    }

    fn requires(&self) -> &[&'static str] {
        &[output::DISTRIBUTION_DOMAIN]
    }

    fn provides(&self) -> &[&'static str] {
        &[output::DNS_RECORD]
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let record = DnsRecordAttributes {
            name: self.settings.require_domain()?.to_string(),
            record_type: DnsRecordType::Alias,
            values: BTreeSet::from([ctx.require(output::DISTRIBUTION_DOMAIN)?.to_string()]),
            ttl: None,
        };
        let reconciled = apply(ctx, self.dns.as_ref(), &record.into_spec()?).await?;
        ctx.provide(output::DNS_RECORD, reconciled.state.key.clone());
        Ok(())
    }
}

/// Request, validate and attach the TLS certificate.
///
/// Validation records go through the DNS identity, which may be a different
/// account than the one holding the certificate.
pub struct CertificateStep {
    settings: Arc<SiteSettings>,
    backends: Backends,
}

impl CertificateStep {
    pub fn new(settings: Arc<SiteSettings>, backends: Backends) -> Self {
        Self { settings, backends }
    }

    async fn validate(
        &self,
        ctx: &mut StepContext,
        lifecycle: &mut CertificateLifecycle,
        certificate: &ResourceRef,
    ) -> Result<ResourceState> {
        let api = self.backends.certificate.as_ref();
        let policy = &self.settings.certificate_wait;

        ctx.focus(certificate.clone());
        let with_records = await_attribute(api, certificate, VALIDATION_RECORDS, policy).await?;
        lifecycle.observe(Some(&with_records))?;

        for record in ValidationRecord::from_state(&with_records) {
            let spec = DnsRecordAttributes {
                name: record.name.trim_end_matches('.').to_string(),
                record_type: record.record_type.parse()?,
                values: BTreeSet::from([record.value.trim_end_matches('.').to_string()]),
                ttl: Some(VALIDATION_RECORD_TTL),
            }
            .into_spec()?;
            apply(ctx, self.backends.dns.as_ref(), &spec).await?;
        }

        if lifecycle.status() == CertificateStatus::Issued {
            return Ok(with_records);
        }

        ctx.focus(certificate.clone());
        tracing::info!("Waiting for {} to be issued", certificate);
        match await_status(api, certificate, ResourceStatus::Deployed, policy).await {
            Ok(state) => {
                lifecycle.observe(Some(&state))?;
                ctx.unfocus();
                Ok(state)
            }
            Err(e) => {
                if e.is_timeout() {
                    tracing::warn!(
                        "{} still {} after the polling budget",
                        certificate,
                        lifecycle.status()
                    );
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl PipelineStep for CertificateStep {
    fn name(&self) -> &str {
        "certificate"
    }

    fn requires(&self) -> &[&'static str] {
        &[output::DISTRIBUTION_ID]
    }

    fn provides(&self) -> &[&'static str] {
        &[output::CERTIFICATE_ARN]
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let domain = self.settings.require_domain()?.to_string();
        let api = self.backends.certificate.as_ref();
        let certificate = ResourceRef::new(ResourceKind::Certificate, domain.clone());

        ctx.focus(certificate.clone());
        let existing = api.get(&certificate).await?;
        let mut lifecycle = CertificateLifecycle::resume(&domain, existing.as_ref());

        let spec = if self.settings.reuse_certificate
            || lifecycle.status() == CertificateStatus::Issued
        {
            ResourceSpec::new(ResourceKind::Certificate, domain.clone())
                .with_attribute("domain", json!(domain))
                .shared()
        } else {
            let attrs = CertificateAttributes {
                domain: domain.clone(),
                subject_alternative_names: BTreeSet::new(),
                validation_method: "DNS".to_string(),
            };
            ResourceSpec::from_attributes(ResourceKind::Certificate, domain.clone(), &attrs)?
        };

        let reconciled = apply(ctx, api, &spec).await?;
        if reconciled.action == ActionType::Create {
            lifecycle.advance(CertificateStatus::Requested)?;
        }
        lifecycle.observe(Some(&reconciled.state))?;

        let state = match lifecycle.status() {
            CertificateStatus::Issued => reconciled.state,
            CertificateStatus::Failed | CertificateStatus::TimedOut => {
                return Err(CloudError::TerminalRemote {
                    resource: certificate.to_string(),
                    detail: format!(
                        "certificate is {}; delete it and re-run to request a new one",
                        lifecycle.status()
                    ),
                });
            }
            _ => self.validate(ctx, &mut lifecycle, &certificate).await?,
        };

        let certificate_arn = state
            .get_str(ARN)
            .map(str::to_string)
            .or_else(|| state.id.clone())
            .ok_or_else(|| CloudError::MissingOutput(format!("arn of {}", certificate)))?;

        tracing::info!(
            "Attaching {} to distribution {}",
            certificate_arn,
            ctx.require(output::DISTRIBUTION_ID)?
        );
        let distribution = self.settings.distribution_ref();
        let attrs = DistributionAttributes {
            aliases: Some(BTreeSet::from([domain])),
            certificate_arn: Some(certificate_arn.clone()),
            ..Default::default()
        };
        let spec =
            ResourceSpec::from_attributes(distribution.kind, distribution.key.clone(), &attrs)?;
        let cdn = self.backends.cdn.as_ref();
        let reconciled = patch(ctx, cdn, &spec).await?;
        if reconciled.action.is_write() || reconciled.state.status != ResourceStatus::Deployed {
            settle(ctx, cdn, &distribution, &self.settings.distribution_wait).await?;
        }

        ctx.provide(output::CERTIFICATE_ARN, certificate_arn);
        Ok(())
    }
}

/// Delete one resource if present
pub struct RemoveStep {
    name: &'static str,
    api: Arc<dyn ResourceApi>,
    resource: ResourceRef,
}

impl RemoveStep {
    pub fn new(name: &'static str, api: Arc<dyn ResourceApi>, resource: ResourceRef) -> Self {
        Self {
            name,
            api,
            resource,
        }
    }
}

#[async_trait]
impl PipelineStep for RemoveStep {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<()> {
        remove(ctx, self.api.as_ref(), &self.resource).await?;
        Ok(())
    }
}

/// Detach and delete the web ACL and its IP sets
pub struct RemoveFirewallStep {
    settings: Arc<SiteSettings>,
    cdn: Arc<dyn ResourceApi>,
}

impl RemoveFirewallStep {
    pub fn new(settings: Arc<SiteSettings>, cdn: Arc<dyn ResourceApi>) -> Self {
        Self { settings, cdn }
    }
}

#[async_trait]
impl PipelineStep for RemoveFirewallStep {
    fn name(&self) -> &str {
        "remove-firewall"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let cdn = self.cdn.as_ref();
        let attached = cdn
            .get(&self.settings.distribution_ref())
            .await?
            .and_then(|state| state.get_str("web_acl_id").map(str::to_string))
            .is_some_and(|id| !id.is_empty());
        if attached {
            set_web_acl(ctx, &self.settings, cdn, String::new()).await?;
        }

        remove(ctx, cdn, &self.settings.web_acl_ref()).await?;
        for ipv6 in [false, true] {
            remove(ctx, cdn, &self.settings.ip_set_ref(ipv6)).await?;
        }
        Ok(())
    }
}

/// Disable, await and delete the distribution
pub struct RemoveDistributionStep {
    settings: Arc<SiteSettings>,
    cdn: Arc<dyn ResourceApi>,
}

impl RemoveDistributionStep {
    pub fn new(settings: Arc<SiteSettings>, cdn: Arc<dyn ResourceApi>) -> Self {
        Self { settings, cdn }
    }
}

#[async_trait]
impl PipelineStep for RemoveDistributionStep {
    fn name(&self) -> &str {
        "remove-distribution"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let cdn = self.cdn.as_ref();
        let distribution = self.settings.distribution_ref();
        if cdn.get(&distribution).await?.is_none() {
            ctx.record_action(ResourceAction::new(distribution, ActionType::NoOp));
            return Ok(());
        }

        // Only a disabled, deployed distribution can be deleted.
        let attrs = DistributionAttributes {
            enabled: Some(false),
            ..Default::default()
        };
        let spec =
            ResourceSpec::from_attributes(distribution.kind, distribution.key.clone(), &attrs)?;
        let reconciled = patch(ctx, cdn, &spec).await?;
        if reconciled.action.is_write() || reconciled.state.status != ResourceStatus::Deployed {
            settle(ctx, cdn, &distribution, &self.settings.distribution_wait).await?;
        }
        remove(ctx, cdn, &distribution).await?;
        Ok(())
    }
}

/// Delete the certificate and its validation records
pub struct RemoveCertificateStep {
    settings: Arc<SiteSettings>,
    backends: Backends,
}

impl RemoveCertificateStep {
    pub fn new(settings: Arc<SiteSettings>, backends: Backends) -> Self {
        Self { settings, backends }
    }
}

#[async_trait]
impl PipelineStep for RemoveCertificateStep {
    fn name(&self) -> &str {
        "remove-certificate"
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<()> {
        let Some(certificate) = self.settings.certificate_ref() else {
            return Ok(());
        };
        let api = self.backends.certificate.as_ref();
        ctx.focus(certificate.clone());
        let Some(state) = api.get(&certificate).await? else {
            ctx.record_action(ResourceAction::new(certificate, ActionType::NoOp));
            return Ok(());
        };

        for record in ValidationRecord::from_state(&state) {
            let record_type: DnsRecordType = record.record_type.parse()?;
            let resource = ResourceRef::new(
                ResourceKind::DnsRecord,
                DnsRecordAttributes::key_for(record_type, &record.name),
            );
            remove(ctx, self.backends.dns.as_ref(), &resource).await?;
        }
        remove(ctx, api, &certificate).await?;
        Ok(())
    }
}
