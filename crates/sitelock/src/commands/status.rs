use crate::backends;
use crate::report;
use crate::settings::{SiteArgs, print_site};
use colored::Colorize;
use serde::Serialize;
use sitelock_cloud::site::{self, ObservedResource};

#[derive(Serialize)]
struct AuthView {
    boundary: &'static str,
    backend: String,
    authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

#[derive(Serialize)]
struct StatusView<'a> {
    site: &'a str,
    bucket: &'a str,
    region: &'a str,
    domain: Option<&'a str>,
    auth: Vec<AuthView>,
    resources: &'a [ObservedResource],
}

/// 認証状態と各リソースの現在の状態を表示 (変更は行わない)
pub async fn handle(args: &SiteArgs, json: bool) -> anyhow::Result<()> {
    let resolved = args.resolve()?;
    let backends = backends::build(&resolved, args.simulate)?;
    let settings = &resolved.settings;

    let mut auth = Vec::new();
    for (boundary, api) in backends::boundaries(&backends) {
        let status = api.check_auth().await?;
        auth.push(AuthView {
            boundary,
            backend: api.name().to_string(),
            authenticated: status.authenticated,
            detail: status.error.or(status.account_info),
        });
    }

    // without credentials the reads would only repeat the auth failure
    let resources = if auth.iter().all(|a| a.authenticated) {
        site::observe_site(settings, &backends).await?
    } else {
        Vec::new()
    };

    if json {
        let view = StatusView {
            site: &settings.name,
            bucket: &settings.bucket,
            region: &settings.region,
            domain: settings.domain.as_deref(),
            auth,
            resources: &resources,
        };
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    print_site(&resolved);
    println!();
    println!("{}", "認証:".bold());
    for entry in &auth {
        let mark = if entry.authenticated {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "  {} {} ({}) {}",
            mark,
            entry.boundary,
            entry.backend,
            entry.detail.as_deref().unwrap_or("").dimmed()
        );
    }

    println!();
    if auth.iter().any(|a| !a.authenticated) {
        anyhow::bail!("認証に失敗した境界があるため、リソースの状態は取得していません");
    }
    println!("{}", "リソース:".bold());
    report::print_observed(&resources);
    Ok(())
}
