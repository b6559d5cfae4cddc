//! Resource API per identity boundary

use crate::settings::ResolvedSite;
use sitelock_cloud::{Backends, MemoryApi, ResourceApi};
use sitelock_cloud_aws::AwsResourceApi;
use sitelock_cloud_cloudflare::{CloudflareDnsApi, DnsConfig};
use sitelock_config::DnsProvider;
use std::sync::Arc;

/// Build the backends for a site: one AWS CLI wrapper per identity, with
/// DNS optionally served by Cloudflare. `simulate` swaps everything for an
/// empty in-memory control plane.
pub fn build(site: &ResolvedSite, simulate: bool) -> anyhow::Result<Backends> {
    if simulate {
        tracing::info!("Simulating against an in-memory control plane");
        return Ok(Backends::single(Arc::new(MemoryApi::new("simulate"))));
    }

    let settings = &site.settings;
    let identities = &settings.identities;
    let region = settings.region.as_str();
    let dns_section = &site.file.identities.dns;

    let dns: Arc<dyn ResourceApi> = match dns_section.provider {
        DnsProvider::Route53 => Arc::new(
            AwsResourceApi::new(&identities.dns, region)
                .with_hosted_zone(dns_section.zone_id.clone()),
        ),
        DnsProvider::Cloudflare => {
            let zone_id = dns_section.zone_id.clone().ok_or_else(|| {
                anyhow::anyhow!("Cloudflare を使う場合は identities.dns.zone_id を指定してください")
            })?;
            let config = DnsConfig::from_env(zone_id, dns_section.api_token_env.as_deref())?;
            Arc::new(CloudflareDnsApi::new(config))
        }
    };

    Ok(Backends {
        storage: Arc::new(AwsResourceApi::new(&identities.storage, region)),
        cdn: Arc::new(AwsResourceApi::new(&identities.cdn, region)),
        dns,
        certificate: Arc::new(AwsResourceApi::new(&identities.certificate, region)),
    })
}

/// Distinct backends with the boundaries they serve, for auth checks
pub fn boundaries(backends: &Backends) -> Vec<(&'static str, Arc<dyn ResourceApi>)> {
    vec![
        ("storage", backends.storage.clone()),
        ("cdn", backends.cdn.clone()),
        ("dns", backends.dns.clone()),
        ("certificate", backends.certificate.clone()),
    ]
}
