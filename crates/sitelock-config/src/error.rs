use sitelock_cloud::CloudError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("設定ディレクトリが見つかりません")]
    ConfigDirNotFound,

    #[error(
        "サイト設定ファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: sitelock.local.yaml, .sitelock.local.yaml, sitelock.yaml, .sitelock.yaml\n\
        - ./.sitelock/ ディレクトリ\n\
        - ~/.config/sitelock/sitelock.yaml\n\
        または SITELOCK_CONFIG 環境変数で直接指定できます"
    )]
    SiteFileNotFound,

    #[error("SITELOCK_CONFIG が指すファイルが存在しません: {0}")]
    ConfiguredFileMissing(PathBuf),

    #[error("{path} の解析に失敗しました: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("YAML エラー: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("必須項目がありません: {0} (設定ファイルかコマンドラインで指定してください)")]
    MissingField(&'static str),

    #[error("設定が不正です: {0}")]
    Invalid(#[from] CloudError),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
