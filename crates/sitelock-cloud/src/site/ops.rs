//! Site operations assembled from the pipeline steps

use super::steps::{
    AccessRestrictionStep, BucketStep, CertificateStep, DistributionStep, DnsAliasStep,
    LookupDistributionStep, OriginAccessStep, RemoveCertificateStep, RemoveDistributionStep,
    RemoveFirewallStep, RemoveStep,
};
use super::{Backends, SiteSettings};
use crate::access::{AccessChange, AllowList};
use crate::error::Result;
use crate::model::{ResourceRef, ResourceState};
use crate::pipeline::ProvisioningRun;
use serde::Serialize;
use std::sync::Arc;

/// Full provisioning: bucket, origin access, distribution, access
/// restriction, and with a domain the DNS alias and certificate
pub fn provision_run(settings: &SiteSettings, backends: &Backends) -> Result<ProvisioningRun> {
    settings.validate()?;
    let site = Arc::new(settings.clone());

    let mut run = ProvisioningRun::new("provision")
        .step(BucketStep::new(site.clone(), backends.storage.clone()))
        .step(OriginAccessStep::new(site.clone(), backends.cdn.clone()))
        .step(DistributionStep::new(site.clone(), backends.cdn.clone()))
        .step(AccessRestrictionStep::new(
            site.clone(),
            backends.clone(),
            AccessChange::Lock(settings.allow.clone()),
        ));

    if settings.domain.is_some() {
        run = run
            .step(DnsAliasStep::new(site.clone(), backends.dns.clone()))
            .step(CertificateStep::new(site, backends.clone()));
    }
    Ok(run)
}

/// Point the domain at an existing distribution
pub fn dns_alias_run(settings: &SiteSettings, backends: &Backends) -> Result<ProvisioningRun> {
    settings.validate()?;
    settings.require_domain()?;
    let site = Arc::new(settings.clone());

    Ok(ProvisioningRun::new("dns-alias")
        .step(LookupDistributionStep::new(site.clone(), backends.cdn.clone()))
        .step(DnsAliasStep::new(site, backends.dns.clone())))
}

/// Issue a certificate for the domain and attach it to the distribution
pub fn certificate_run(settings: &SiteSettings, backends: &Backends) -> Result<ProvisioningRun> {
    settings.validate()?;
    settings.require_domain()?;
    let site = Arc::new(settings.clone());

    Ok(ProvisioningRun::new("certificate")
        .step(LookupDistributionStep::new(site.clone(), backends.cdn.clone()))
        .step(CertificateStep::new(site, backends.clone())))
}

/// Restrict access to exactly `allow` plus the operator networks
pub fn lock_run(
    settings: &SiteSettings,
    backends: &Backends,
    allow: AllowList,
) -> Result<ProvisioningRun> {
    access_run("lock", settings, backends, AccessChange::Lock(allow))
}

/// Add `extra` to the sources currently allowed
pub fn unlock_run(
    settings: &SiteSettings,
    backends: &Backends,
    extra: AllowList,
) -> Result<ProvisioningRun> {
    access_run("unlock", settings, backends, AccessChange::Widen(extra))
}

fn access_run(
    operation: &str,
    settings: &SiteSettings,
    backends: &Backends,
    change: AccessChange,
) -> Result<ProvisioningRun> {
    settings.validate()?;
    let site = Arc::new(settings.clone());

    Ok(ProvisioningRun::new(operation)
        .step(LookupDistributionStep::new(site.clone(), backends.cdn.clone()))
        .step(AccessRestrictionStep::new(site, backends.clone(), change)))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TeardownOptions {
    /// Leave the bucket (and its content) in place
    pub keep_bucket: bool,
    /// Also delete the certificate and its validation records
    pub remove_certificate: bool,
}

/// Remove the site in reverse dependency order
pub fn teardown_run(
    settings: &SiteSettings,
    backends: &Backends,
    options: TeardownOptions,
) -> Result<ProvisioningRun> {
    settings.validate()?;
    let site = Arc::new(settings.clone());

    let mut run = ProvisioningRun::new("teardown");
    if let Some(alias) = settings.alias_ref() {
        run = run.step(RemoveStep::new("remove-dns-alias", backends.dns.clone(), alias));
    }
    run = run
        .step(RemoveFirewallStep::new(site.clone(), backends.cdn.clone()))
        .step(RemoveDistributionStep::new(site.clone(), backends.cdn.clone()))
        .step(RemoveStep::new(
            "remove-origin-access",
            backends.cdn.clone(),
            settings.oac_ref(),
        ))
        .step(RemoveStep::new(
            "remove-bucket-policy",
            backends.storage.clone(),
            settings.bucket_policy_ref(),
        ));
    if !options.keep_bucket {
        run = run.step(RemoveStep::new(
            "remove-bucket",
            backends.storage.clone(),
            settings.bucket_ref(),
        ));
    }
    if options.remove_certificate && !settings.reuse_certificate {
        run = run.step(RemoveCertificateStep::new(site, backends.clone()));
    }
    Ok(run)
}

/// Observed state of one site resource
#[derive(Debug, Clone, Serialize)]
pub struct ObservedResource {
    pub resource: ResourceRef,
    pub state: Option<ResourceState>,
}

/// Read every resource of the site without changing anything
pub async fn observe_site(
    settings: &SiteSettings,
    backends: &Backends,
) -> Result<Vec<ObservedResource>> {
    let mut observed = Vec::new();
    for resource in settings.resources() {
        let state = backends.for_kind(resource.kind).get(&resource).await?;
        observed.push(ObservedResource { resource, state });
    }
    Ok(observed)
}
