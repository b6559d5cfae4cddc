mod backends;
mod commands;
mod report;
mod settings;

use clap::{Parser, Subcommand};
use colored::Colorize;
use settings::SiteArgs;
use sitelock_cloud::{RunFailure, TeardownOptions};

/// Exit status of a run that failed on anything but a timeout
const EXIT_FAILURE: i32 = 1;
/// Exit status when a remote resource never converged. 2 stays with clap
/// for usage errors.
const EXIT_TIMEOUT: i32 = 3;

#[derive(Parser)]
#[command(name = "sitelock")]
#[command(about = "静的サイトを、閉じたまま公開する。", long_about = None)]
struct Cli {
    #[command(flatten)]
    site: SiteArgs,

    /// 詳細なログを出力 (RUST_LOG が優先)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// バケット・配信・アクセス制限を構築 (ドメイン指定時は DNS と証明書も)
    Provision,
    /// サイトのリソースを依存関係の逆順に削除
    Teardown {
        /// バケット (と中身) を残す
        #[arg(long)]
        keep_bucket: bool,
        /// 証明書とその検証レコードも削除
        #[arg(long)]
        remove_certificate: bool,
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
    },
    /// 既存の配信にドメインのエイリアスを向ける
    #[command(name = "dns-alias")]
    DnsAlias,
    /// 証明書を発行・検証して配信に設定
    Certificate,
    /// アクセスを指定した送信元とオペレーターだけに制限
    Lock {
        /// 許可する送信元 (IP、CIDR、VPC エンドポイント)。省略時は設定ファイルの access.allow
        #[arg(short, long = "allow", value_name = "SOURCE")]
        allow: Vec<String>,
    },
    /// 現在の許可に送信元を追加
    Unlock {
        /// 追加する送信元 (IP、CIDR、VPC エンドポイント)
        #[arg(short, long = "allow", value_name = "SOURCE", required = true)]
        allow: Vec<String>,
    },
    /// 認証とリソースの状態を表示
    Status {
        /// JSON で出力
        #[arg(long)]
        json: bool,
    },
    /// バージョン情報を表示
    Version,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // stdout carries reports and `status --json`
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn exit_code(failure: &RunFailure) -> i32 {
    if failure.is_timeout() {
        EXIT_TIMEOUT
    } else {
        EXIT_FAILURE
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let site = &cli.site;
    match cli.command {
        Commands::Provision => commands::provision::handle(site).await,
        Commands::Teardown {
            keep_bucket,
            remove_certificate,
            yes,
        } => {
            let options = TeardownOptions {
                keep_bucket,
                remove_certificate,
            };
            commands::teardown::handle(site, options, yes).await
        }
        Commands::DnsAlias => commands::dns_alias::handle(site).await,
        Commands::Certificate => commands::certificate::handle(site).await,
        Commands::Lock { allow } => commands::access::lock(site, &allow).await,
        Commands::Unlock { allow } => commands::access::unlock(site, &allow).await,
        Commands::Status { json } => commands::status::handle(site, json).await,
        Commands::Version => {
            println!("sitelock {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        match e.downcast_ref::<RunFailure>() {
            Some(failure) => {
                report::print_failure(failure);
                std::process::exit(exit_code(failure));
            }
            None => {
                eprintln!();
                eprintln!("{} {:#}", "✗ エラー:".red().bold(), e);
                std::process::exit(EXIT_FAILURE);
            }
        }
    }
}
