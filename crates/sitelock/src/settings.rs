//! Site settings from the site file plus command-line overrides

use clap::Args;
use colored::Colorize;
use sitelock_cloud::{AccessStrategy, AllowList, SiteSettings, WaitPolicy};
use sitelock_config::SiteFile;
use std::path::{Path, PathBuf};

/// サイト指定（設定ファイルの値を上書き）
#[derive(Args, Debug, Clone, Default)]
pub struct SiteArgs {
    /// サイト設定ファイル (省略時は SITELOCK_CONFIG またはカレントディレクトリから検索)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// サイト名 (省略時はバケット名)
    #[arg(long, global = true, env = "SITELOCK_NAME")]
    pub name: Option<String>,

    /// コンテンツを置くバケット名
    #[arg(short, long, global = true, env = "SITELOCK_BUCKET")]
    pub bucket: Option<String>,

    /// 公開ドメイン (指定時は DNS エイリアスと証明書も管理)
    #[arg(short, long, global = true, env = "SITELOCK_DOMAIN")]
    pub domain: Option<String>,

    /// バケットのリージョン
    #[arg(short, long, global = true, env = "SITELOCK_REGION")]
    pub region: Option<String>,

    /// ストレージ (S3) 用プロファイル
    #[arg(long, global = true, env = "SITELOCK_STORAGE_PROFILE")]
    pub storage_profile: Option<String>,

    /// CDN (CloudFront / WAF) 用プロファイル
    #[arg(long, global = true, env = "SITELOCK_CDN_PROFILE")]
    pub cdn_profile: Option<String>,

    /// DNS 用プロファイル
    #[arg(long, global = true, env = "SITELOCK_DNS_PROFILE")]
    pub dns_profile: Option<String>,

    /// 証明書 (ACM) 用プロファイル
    #[arg(long, global = true, env = "SITELOCK_CERT_PROFILE")]
    pub cert_profile: Option<String>,

    /// 状態待ちの最大ポーリング回数
    #[arg(long, global = true, env = "SITELOCK_MAX_ATTEMPTS")]
    pub max_attempts: Option<u32>,

    /// ポーリング間隔 (秒)
    #[arg(long, global = true, env = "SITELOCK_INTERVAL")]
    pub interval: Option<u64>,

    /// キャッシュ最小 TTL (秒)
    #[arg(long, global = true)]
    pub min_ttl: Option<u64>,

    /// キャッシュ既定 TTL (秒)
    #[arg(long, global = true)]
    pub default_ttl: Option<u64>,

    /// キャッシュ最大 TTL (秒)
    #[arg(long, global = true)]
    pub max_ttl: Option<u64>,

    /// アクセス制限の方式 (firewall, bucket-policy)
    #[arg(long, global = true, env = "SITELOCK_STRATEGY")]
    pub strategy: Option<AccessStrategy>,

    /// 常に許可するオペレーターのネットワーク (複数指定可)
    #[arg(long = "operator", global = true, value_name = "CIDR")]
    pub operators: Vec<String>,

    /// 実際のアカウントに触れず、メモリ上でパイプラインを実行
    #[arg(long, global = true, env = "SITELOCK_SIMULATE")]
    pub simulate: bool,

    /// 実行ログ (.sitelock/runs.log) を書かない
    #[arg(long, global = true, env = "SITELOCK_NO_LOG")]
    pub no_log: bool,
}

/// Settings plus where they came from
pub struct ResolvedSite {
    pub settings: SiteSettings,
    pub file: SiteFile,
    /// Site file that was loaded, if any
    pub path: Option<PathBuf>,
}

impl ResolvedSite {
    /// Directory the run log is written under: the project holding the
    /// site file, or the working directory
    pub fn log_root(&self) -> anyhow::Result<PathBuf> {
        match self.path.as_deref().and_then(project_root_of) {
            Some(root) => Ok(root),
            None => Ok(std::env::current_dir()?),
        }
    }
}

fn project_root_of(site_file: &Path) -> Option<PathBuf> {
    let dir = site_file.parent()?;
    if dir.file_name().is_some_and(|name| name == ".sitelock") {
        return dir.parent().map(Path::to_path_buf);
    }
    Some(dir.to_path_buf())
}

impl SiteArgs {
    /// Load the site file and resolve it with the overrides applied
    pub fn resolve(&self) -> anyhow::Result<ResolvedSite> {
        let (path, mut file) = sitelock_config::load_site_file(self.config.as_deref())?;
        if let Some(path) = &path {
            tracing::debug!("Loaded site file: {}", path.display());
        }
        self.apply(&mut file)?;
        let mut settings = file.to_settings()?;
        self.apply_waits(&mut settings);
        settings.validate()?;
        Ok(ResolvedSite {
            settings,
            file,
            path,
        })
    }

    /// Write the overrides into the file model
    pub fn apply(&self, file: &mut SiteFile) -> anyhow::Result<()> {
        let site = &mut file.site;
        override_with(&mut site.name, &self.name);
        override_with(&mut site.bucket, &self.bucket);
        override_with(&mut site.domain, &self.domain);
        override_with(&mut site.region, &self.region);

        let identities = &mut file.identities;
        override_with(&mut identities.storage.profile, &self.storage_profile);
        override_with(&mut identities.cdn.profile, &self.cdn_profile);
        override_with(&mut identities.dns.profile, &self.dns_profile);
        override_with(&mut identities.certificate.profile, &self.cert_profile);

        if let Some(min) = self.min_ttl {
            file.cache.min = min;
        }
        if let Some(default) = self.default_ttl {
            file.cache.default = default;
        }
        if let Some(max) = self.max_ttl {
            file.cache.max = max;
        }

        if let Some(strategy) = self.strategy {
            file.access.strategy = strategy;
        }
        if !self.operators.is_empty() {
            let extra = AllowList::parse(&self.operators)?;
            file.access.operator = file.access.operator.union(&extra);
        }
        Ok(())
    }

    fn apply_waits(&self, settings: &mut SiteSettings) {
        for policy in [
            &mut settings.distribution_wait,
            &mut settings.certificate_wait,
        ] {
            self.apply_wait(policy);
        }
    }

    fn apply_wait(&self, policy: &mut WaitPolicy) {
        if let Some(max_attempts) = self.max_attempts {
            policy.max_attempts = max_attempts;
        }
        if let Some(interval) = self.interval {
            // an explicit interval means fixed-interval polling
            let delay_ms = interval.saturating_mul(1000);
            policy.initial_delay_ms = delay_ms;
            policy.max_delay_ms = delay_ms;
            policy.multiplier = 1.0;
        }
    }
}

fn override_with(target: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = value {
        *target = Some(value.clone());
    }
}

/// Print where the settings came from
pub fn print_site(site: &ResolvedSite) {
    match &site.path {
        Some(path) => println!("設定ファイル: {}", path.display().to_string().cyan()),
        None => println!("設定ファイル: {}", "(なし、コマンドライン指定のみ)".dimmed()),
    }
    let settings = &site.settings;
    println!("サイト: {}", settings.name.cyan());
    println!("  バケット: {} ({})", settings.bucket, settings.region);
    if let Some(domain) = &settings.domain {
        println!("  ドメイン: {}", domain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitelock_config::DnsProvider;

    fn file(yaml: &str) -> SiteFile {
        SiteFile::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_flags_override_file() {
        let mut site = file(
            "site: { bucket: from-file, region: us-west-2 }\n\
             identities: { dns: { provider: cloudflare, profile: old } }",
        );
        let args = SiteArgs {
            bucket: Some("from-flag".into()),
            dns_profile: Some("dns-admin".into()),
            default_ttl: Some(60),
            strategy: Some(AccessStrategy::BucketPolicy),
            operators: vec!["203.0.113.0/24".into()],
            ..Default::default()
        };
        args.apply(&mut site).unwrap();

        assert_eq!(site.site.bucket.as_deref(), Some("from-flag"));
        assert_eq!(site.site.region.as_deref(), Some("us-west-2"));
        assert_eq!(site.identities.dns.profile.as_deref(), Some("dns-admin"));
        assert_eq!(site.identities.dns.provider, DnsProvider::Cloudflare);
        assert_eq!(site.cache.default, 60);
        assert_eq!(site.access.strategy, AccessStrategy::BucketPolicy);
        assert_eq!(site.access.operator.len(), 1);
    }

    #[test]
    fn test_flags_alone_are_enough() {
        let mut site = SiteFile::default();
        let args = SiteArgs {
            bucket: Some("site-assets".into()),
            region: Some("ap-northeast-1".into()),
            ..Default::default()
        };
        args.apply(&mut site).unwrap();
        let settings = site.to_settings().unwrap();
        assert_eq!(settings.name, "site-assets");
        assert!(settings.domain.is_none());
    }

    #[test]
    fn test_invalid_operator_rejected() {
        let args = SiteArgs {
            operators: vec!["not-a-network".into()],
            ..Default::default()
        };
        assert!(args.apply(&mut SiteFile::default()).is_err());
    }

    #[test]
    fn test_interval_makes_fixed_polling() {
        let args = SiteArgs {
            max_attempts: Some(3),
            interval: Some(5),
            ..Default::default()
        };
        let mut settings = SiteSettings::new("site-assets", "us-west-2");
        args.apply_waits(&mut settings);

        assert_eq!(settings.distribution_wait.max_attempts, 3);
        assert_eq!(settings.distribution_wait.initial_delay_ms, 5000);
        assert_eq!(settings.certificate_wait.max_delay_ms, 5000);
        assert_eq!(settings.certificate_wait.multiplier, 1.0);
    }

    #[test]
    fn test_log_root() {
        assert_eq!(
            project_root_of(Path::new("/srv/docs/.sitelock/sitelock.yaml")),
            Some(PathBuf::from("/srv/docs"))
        );
        assert_eq!(
            project_root_of(Path::new("/srv/docs/sitelock.yaml")),
            Some(PathBuf::from("/srv/docs"))
        );
    }
}
