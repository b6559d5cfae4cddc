//! aws CLI wrapper
//!
//! Every call runs `aws --output json [--profile P] --region R <service> ...`
//! so each instance is pinned to one identity.

use crate::error::{AwsError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sitelock_cloud::Identity;
use std::process::Stdio;
use tokio::process::Command;

/// Region that hosts CloudFront-scoped WAF resources and ACM certificates
/// usable by CloudFront
pub const GLOBAL_REGION: &str = "us-east-1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsCli {
    profile: Option<String>,
    region: String,
}

impl AwsCli {
    pub fn new(profile: Option<String>, region: impl Into<String>) -> Self {
        Self {
            profile,
            region: region.into(),
        }
    }

    pub fn from_identity(identity: &Identity, default_region: &str) -> Self {
        Self::new(
            identity.profile.clone(),
            identity.region_or(default_region),
        )
    }

    /// Same identity, different region
    pub fn in_region(&self, region: impl Into<String>) -> Self {
        Self {
            profile: self.profile.clone(),
            region: region.into(),
        }
    }

    pub fn profile(&self) -> &str {
        self.profile.as_deref().unwrap_or("default")
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    fn command_line(&self, args: &[&str]) -> Vec<String> {
        let mut line = vec!["--output".to_string(), "json".to_string()];
        if let Some(profile) = &self.profile {
            line.push("--profile".to_string());
            line.push(profile.clone());
        }
        line.push("--region".to_string());
        line.push(self.region.clone());
        line.extend(args.iter().map(|a| a.to_string()));
        line
    }

    /// Run an aws command and return stdout
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        let line = self.command_line(args);
        let mut cmd = Command::new("aws");
        cmd.args(&line);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: aws {}", line.join(" "));

        let output = cmd.output().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AwsError::CliNotFound
            } else {
                AwsError::IoError(e)
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AwsError::from_stderr(&stderr));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run an aws command and parse its JSON output
    pub async fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T> {
        let output = self.run(args).await?;
        if output.trim().is_empty() {
            return Err(AwsError::UnexpectedResponse(format!(
                "empty output from aws {}",
                args.join(" ")
            )));
        }
        Ok(serde_json::from_str(&output)?)
    }

    /// Check that the CLI is installed and the credentials resolve
    pub async fn check_auth(&self) -> Result<CallerIdentity> {
        let which = Command::new("which").arg("aws").output().await?;
        if !which.status.success() {
            return Err(AwsError::CliNotFound);
        }

        self.run_json(&["sts", "get-caller-identity"])
            .await
            .map_err(|e| match e {
                AwsError::Service { code, message } => {
                    AwsError::AuthenticationFailed(format!("{}: {}", code, message))
                }
                other => other,
            })
    }
}

/// `sts get-caller-identity` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerIdentity {
    #[serde(rename = "Account")]
    pub account: String,

    #[serde(rename = "Arn")]
    pub arn: String,

    #[serde(rename = "UserId", default)]
    pub user_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_with_profile() {
        let cli = AwsCli::new(Some("dns-admin".into()), "ap-northeast-1");
        assert_eq!(
            cli.command_line(&["route53", "list-hosted-zones"]),
            vec![
                "--output",
                "json",
                "--profile",
                "dns-admin",
                "--region",
                "ap-northeast-1",
                "route53",
                "list-hosted-zones"
            ]
        );
    }

    #[test]
    fn test_default_profile_and_region_override() {
        let identity = Identity::default();
        let cli = AwsCli::from_identity(&identity, "eu-west-1");
        assert_eq!(cli.profile(), "default");
        assert!(!cli.command_line(&[]).contains(&"--profile".to_string()));

        let global = cli.in_region(GLOBAL_REGION);
        assert_eq!(global.region(), "us-east-1");
    }

    #[test]
    fn test_parse_caller_identity() {
        let json = r#"{"UserId": "AIDAEXAMPLE", "Account": "123456789012", "Arn": "arn:aws:iam::123456789012:user/ops"}"#;
        let identity: CallerIdentity = serde_json::from_str(json).unwrap();
        assert_eq!(identity.account, "123456789012");
    }
}
