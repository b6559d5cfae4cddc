use crate::settings::SiteArgs;
use sitelock_cloud::site;

pub async fn handle(args: &SiteArgs) -> anyhow::Result<()> {
    let (resolved, backends) = super::prepare(args)?;
    let run = site::dns_alias_run(&resolved.settings, &backends)?;
    super::execute(run, &resolved, args).await
}
