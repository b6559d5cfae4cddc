//! AWS backend error types

use sitelock_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("aws CLI not found. Please install: https://aws.amazon.com/cli/")]
    CliNotFound,

    #[error("aws authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Error reported by an AWS service (`An error occurred (Code) ...`)
    #[error("{code}: {message}")]
    Service { code: String, message: String },

    #[error("aws command failed: {0}")]
    CommandFailed(String),

    #[error("Unexpected aws response: {0}")]
    UnexpectedResponse(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cloud error: {0}")]
    CloudError(#[from] CloudError),
}

impl AwsError {
    /// Parse the stderr of a failed aws CLI invocation
    pub fn from_stderr(stderr: &str) -> Self {
        let stderr = stderr.trim();
        if let Some(rest) = stderr.split("An error occurred (").nth(1) {
            if let Some((code, tail)) = rest.split_once(')') {
                let message = tail
                    .split_once(": ")
                    .map(|(_, message)| message)
                    .unwrap_or(tail)
                    .trim();
                return AwsError::Service {
                    code: code.to_string(),
                    message: message.to_string(),
                };
            }
        }
        if stderr.contains("Unable to locate credentials")
            || (stderr.contains("profile") && stderr.contains("could not be found"))
            || stderr.contains("Token has expired")
        {
            return AwsError::AuthenticationFailed(stderr.to_string());
        }
        AwsError::CommandFailed(stderr.to_string())
    }

    /// Service error code, if any
    pub fn code(&self) -> Option<&str> {
        match self {
            AwsError::Service { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn has_code(&self, codes: &[&str]) -> bool {
        self.code().is_some_and(|code| codes.contains(&code))
    }

    pub fn is_not_found(&self) -> bool {
        self.code().is_some_and(|code| {
            code == "404"
                || code.starts_with("NoSuch")
                || code.ends_with("NotFoundException")
                || code == "WAFNonexistentItemException"
        })
    }
}

impl From<AwsError> for CloudError {
    fn from(error: AwsError) -> Self {
        match error {
            AwsError::CloudError(inner) => inner,
            AwsError::AuthenticationFailed(message) => CloudError::PermissionDenied(message),
            AwsError::CliNotFound => CloudError::CommandFailed(error.to_string()),
            AwsError::CommandFailed(message) => CloudError::CommandFailed(message),
            AwsError::IoError(e) => CloudError::Io(e),
            AwsError::JsonError(e) => CloudError::Json(e),
            AwsError::UnexpectedResponse(message) => CloudError::Api(message),
            AwsError::Service { ref code, .. } => {
                let message = error.to_string();
                let code = code.as_str();
                if error.is_not_found() {
                    CloudError::NotFound(message)
                } else if code.starts_with("AccessDenied")
                    || matches!(
                        code,
                        "UnauthorizedOperation"
                            | "InvalidClientTokenId"
                            | "ExpiredToken"
                            | "SignatureDoesNotMatch"
                            | "WAFInvalidPermissionPolicyException"
                    )
                {
                    CloudError::PermissionDenied(message)
                } else if matches!(
                    code,
                    "PreconditionFailed" | "InvalidIfMatchVersion" | "WAFOptimisticLockException"
                ) {
                    CloudError::Conflict(message)
                } else if matches!(code, "BucketAlreadyExists" | "CNAMEAlreadyExists") {
                    CloudError::Ownership(message)
                } else if code == "BucketAlreadyOwnedByYou"
                    || code.ends_with("AlreadyExists")
                    || code == "WAFDuplicateItemException"
                {
                    CloudError::AlreadyExists(message)
                } else {
                    CloudError::Api(message)
                }
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;
