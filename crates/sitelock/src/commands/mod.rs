pub mod access;
pub mod certificate;
pub mod dns_alias;
pub mod provision;
pub mod status;
pub mod teardown;

use crate::backends;
use crate::report;
use crate::settings::{ResolvedSite, SiteArgs};
use colored::Colorize;
use sitelock_cloud::{Backends, ProvisioningRun, RunLog};
use std::sync::Arc;

/// Resolve the site and build its backends
pub fn prepare(args: &SiteArgs) -> anyhow::Result<(ResolvedSite, Backends)> {
    let site = args.resolve()?;
    crate::settings::print_site(&site);
    if args.simulate {
        println!("{}", "シミュレーションモード (実際のリソースは変更しません)".yellow());
    }
    let backends = backends::build(&site, args.simulate)?;
    Ok((site, backends))
}

/// Run a pipeline with the run log attached and print the result.
/// A failed run comes back as a [`sitelock_cloud::RunFailure`] inside the error.
pub async fn execute(
    run: ProvisioningRun,
    site: &ResolvedSite,
    args: &SiteArgs,
) -> anyhow::Result<()> {
    let log = if args.no_log {
        None
    } else {
        let log = RunLog::in_dir(site.log_root()?);
        tracing::debug!("Run log: {}", log.path().display());
        Some(Arc::new(log))
    };

    println!();
    println!(
        "{}",
        format!("{} を実行中...", run.operation()).blue().bold()
    );
    let report = run.with_log(log).execute().await?;
    report::print_report(&report);
    Ok(())
}
