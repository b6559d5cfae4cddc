//! Cloudflare backend error types

use sitelock_cloud::CloudError;
use thiserror::Error;

/// Record already exists / identical record already exists
const DUPLICATE_RECORD_CODES: [i64; 2] = [81053, 81057];
/// Authentication error / invalid token
const AUTH_CODES: [i64; 3] = [9103, 9109, 10000];

#[derive(Error, Debug)]
pub enum CloudflareError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Cloudflare API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Cloud error: {0}")]
    CloudError(#[from] CloudError),
}

impl From<CloudflareError> for CloudError {
    fn from(error: CloudflareError) -> Self {
        match error {
            CloudflareError::CloudError(inner) => inner,
            CloudflareError::MissingEnvVar(_) | CloudflareError::InvalidConfig(_) => {
                CloudError::InvalidConfig(error.to_string())
            }
            CloudflareError::Api { code, .. } if DUPLICATE_RECORD_CODES.contains(&code) => {
                CloudError::AlreadyExists(error.to_string())
            }
            CloudflareError::Api { code, .. } if AUTH_CODES.contains(&code) => {
                CloudError::PermissionDenied(error.to_string())
            }
            CloudflareError::JsonError(e) => CloudError::Json(e),
            other => CloudError::Api(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudflareError>;
