use crate::settings::SiteArgs;
use sitelock_cloud::site;

/// バケット、配信、アクセス制限 (ドメイン指定時は DNS と証明書も) を構築
pub async fn handle(args: &SiteArgs) -> anyhow::Result<()> {
    let (resolved, backends) = super::prepare(args)?;
    let run = site::provision_run(&resolved.settings, &backends)?;
    super::execute(run, &resolved, args).await
}
