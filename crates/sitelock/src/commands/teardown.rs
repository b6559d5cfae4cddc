use crate::settings::SiteArgs;
use colored::Colorize;
use sitelock_cloud::{TeardownOptions, site};

pub async fn handle(args: &SiteArgs, options: TeardownOptions, yes: bool) -> anyhow::Result<()> {
    let (resolved, backends) = super::prepare(args)?;
    let settings = &resolved.settings;

    println!();
    println!("{}", "削除対象:".bold());
    if let Some(alias) = settings.alias_ref() {
        println!("  • {}", alias);
    }
    println!("  • {}", settings.web_acl_ref());
    println!("  • {}", settings.distribution_ref());
    println!("  • {}", settings.oac_ref());
    println!("  • {}", settings.bucket_policy_ref());
    if options.keep_bucket {
        println!("  • {} {}", settings.bucket_ref(), "(残す)".dimmed());
    } else {
        println!("  • {}", settings.bucket_ref());
    }
    if let Some(certificate) = settings.certificate_ref() {
        if options.remove_certificate && !settings.reuse_certificate {
            println!("  • {}", certificate);
        } else {
            println!("  • {} {}", certificate, "(残す)".dimmed());
        }
    }

    if !yes {
        println!();
        println!("{}", "警告: 上記のリソースを削除します。".yellow());
        if !options.keep_bucket {
            println!("{}", "バケットの中身も失われます (--keep-bucket で残せます)。".yellow());
        }
        println!("実行するには --yes オプションを指定してください");
        return Ok(());
    }

    let run = site::teardown_run(settings, &backends, options)?;
    super::execute(run, &resolved, args).await
}
