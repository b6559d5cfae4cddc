pub mod error;
pub mod site;

pub use error::*;
pub use site::{DnsIdentity, DnsProvider, SiteFile};

use std::path::{Path, PathBuf};

/// Environment variable naming the site file directly
pub const CONFIG_ENV: &str = "SITELOCK_CONFIG";

const CANDIDATES: [&str; 4] = [
    "sitelock.local.yaml",
    ".sitelock.local.yaml",
    "sitelock.yaml",
    ".sitelock.yaml",
];

/// SiteLockの設定ディレクトリを取得
pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("sitelock");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

/// サイト設定ファイルを探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 SITELOCK_CONFIG (直接パス指定、存在しなければエラー)
/// 2. カレントディレクトリ: sitelock.local.yaml, .sitelock.local.yaml, sitelock.yaml, .sitelock.yaml
/// 3. ./.sitelock/ ディレクトリ内: 同様の順序
/// 4. ~/.config/sitelock/sitelock.yaml (グローバル設定)
pub fn find_site_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if !path.exists() {
            return Err(ConfigError::ConfiguredFileMissing(path));
        }
        return Ok(path);
    }

    let current_dir = std::env::current_dir()?;
    if let Some(path) = find_site_file_in(&current_dir) {
        return Ok(path);
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("sitelock").join("sitelock.yaml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::SiteFileNotFound)
}

/// Search `dir` and then `dir/.sitelock/`
pub fn find_site_file_in(dir: &Path) -> Option<PathBuf> {
    let site_dir = dir.join(".sitelock");
    [dir.to_path_buf(), site_dir]
        .iter()
        .filter(|d| d.is_dir())
        .flat_map(|d| CANDIDATES.iter().map(move |name| d.join(name)))
        .find(|path| path.exists())
}

/// Load the site file from `explicit`, or discover it.
///
/// Without an explicit path a missing file is not an error: everything can
/// come from command-line flags, so an empty [`SiteFile`] is returned.
pub fn load_site_file(explicit: Option<&Path>) -> Result<(Option<PathBuf>, SiteFile)> {
    if let Some(path) = explicit {
        return Ok((Some(path.to_path_buf()), SiteFile::load(path)?));
    }
    match find_site_file() {
        Ok(path) => {
            let file = SiteFile::load(&path)?;
            Ok((Some(path), file))
        }
        Err(ConfigError::SiteFileNotFound) => Ok((None, SiteFile::default())),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_get_config_dir() {
        let config_dir = get_config_dir().unwrap();
        assert!(config_dir.ends_with("sitelock"));
        assert!(config_dir.exists());
    }

    #[test]
    fn test_find_in_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("sitelock.yaml"), "site: {}").unwrap();

        let found = find_site_file_in(temp_dir.path()).unwrap();
        assert!(found.ends_with("sitelock.yaml"));
    }

    #[test]
    fn test_local_file_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("sitelock.yaml"), "").unwrap();
        fs::write(temp_dir.path().join(".sitelock.local.yaml"), "").unwrap();

        let found = find_site_file_in(temp_dir.path()).unwrap();
        assert!(found.ends_with(".sitelock.local.yaml"));
    }

    #[test]
    fn test_find_in_site_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let site_dir = temp_dir.path().join(".sitelock");
        fs::create_dir(&site_dir).unwrap();
        fs::write(site_dir.join("sitelock.yaml"), "").unwrap();

        let found = find_site_file_in(temp_dir.path()).unwrap();
        assert!(found.ends_with(".sitelock/sitelock.yaml"));
    }

    #[test]
    fn test_nothing_in_empty_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(find_site_file_in(temp_dir.path()).is_none());
    }

    #[test]
    #[serial]
    fn test_env_var_wins() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "site: { bucket: site-assets }").unwrap();

        temp_env::with_var(CONFIG_ENV, Some(config_path.as_os_str()), || {
            assert_eq!(find_site_file().unwrap(), config_path);

            let (path, file) = load_site_file(None).unwrap();
            assert_eq!(path.as_deref(), Some(config_path.as_path()));
            assert_eq!(file.site.bucket.as_deref(), Some("site-assets"));
        });
    }

    #[test]
    #[serial]
    fn test_env_var_pointing_nowhere() {
        temp_env::with_var(CONFIG_ENV, Some("/nonexistent/sitelock.yaml"), || {
            assert!(matches!(
                find_site_file(),
                Err(ConfigError::ConfiguredFileMissing(_))
            ));
        });
    }

    #[test]
    #[serial]
    fn test_cwd_discovery_and_fallback() {
        let temp_dir = tempfile::tempdir().unwrap();
        let empty_home = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        temp_env::with_vars(
            [
                (CONFIG_ENV, None),
                ("XDG_CONFIG_HOME", Some(empty_home.path().as_os_str())),
            ],
            || {
                // nothing anywhere: an empty file, not an error
                let (path, file) = load_site_file(None).unwrap();
                assert!(path.is_none());
                assert_eq!(file, SiteFile::default());

                fs::write(
                    temp_dir.path().join("sitelock.yaml"),
                    "site: { bucket: from-cwd }",
                )
                .unwrap();
                let (_, file) = load_site_file(None).unwrap();
                assert_eq!(file.site.bucket.as_deref(), Some("from-cwd"));
            },
        );

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    fn test_explicit_path_parse_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("broken.yaml");
        fs::write(&path, "site: [not, a, map]").unwrap();

        let err = load_site_file(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
