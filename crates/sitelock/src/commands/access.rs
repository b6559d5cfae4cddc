use crate::settings::SiteArgs;
use colored::Colorize;
use sitelock_cloud::{AllowList, site};

/// 許可リストを指定した送信元 (とオペレーター) だけに絞る。
/// `--allow` を省略すると設定ファイルの access.allow を使う。
pub async fn lock(args: &SiteArgs, allow: &[String]) -> anyhow::Result<()> {
    let (resolved, backends) = super::prepare(args)?;
    let allow = if allow.is_empty() {
        resolved.settings.allow.clone()
    } else {
        AllowList::parse(allow)?
    };
    print_sources("許可する送信元", &allow);

    let run = site::lock_run(&resolved.settings, &backends, allow)?;
    super::execute(run, &resolved, args).await
}

/// 現在の許可リストに送信元を追加する (既存の許可は外さない)
pub async fn unlock(args: &SiteArgs, allow: &[String]) -> anyhow::Result<()> {
    let extra = AllowList::parse(allow)?;
    if extra.is_empty() {
        anyhow::bail!("追加する送信元を --allow で指定してください");
    }
    let (resolved, backends) = super::prepare(args)?;
    print_sources("追加する送信元", &extra);

    let run = site::unlock_run(&resolved.settings, &backends, extra)?;
    super::execute(run, &resolved, args).await
}

fn print_sources(label: &str, sources: &AllowList) {
    if sources.is_empty() {
        println!("{}: {}", label, "(なし)".dimmed());
        return;
    }
    println!("{}:", label);
    for source in sources.iter() {
        println!("  • {}", source.to_string().cyan());
    }
}
