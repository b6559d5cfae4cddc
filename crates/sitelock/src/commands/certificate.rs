use crate::settings::SiteArgs;
use sitelock_cloud::site;

pub async fn handle(args: &SiteArgs) -> anyhow::Result<()> {
    let (resolved, backends) = super::prepare(args)?;
    if resolved.settings.reuse_certificate {
        tracing::info!("Reusing an existing certificate read-only");
    }
    let run = site::certificate_run(&resolved.settings, &backends)?;
    super::execute(run, &resolved, args).await
}
