//! Cloudflare DNS API client
//!
//! Direct Cloudflare API implementation for DNS record management.
//! Uses Bearer token authentication.

use crate::error::{CloudflareError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sitelock_cloud::site::attributes::DnsRecordType;

const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// Environment variable holding the API token unless configured otherwise
pub const DEFAULT_TOKEN_ENV: &str = "CLOUDFLARE_API_TOKEN";

/// `ttl: 1` means "automatic" on Cloudflare
pub const AUTO_TTL: u32 = 1;

/// Configuration for DNS manager
#[derive(Debug, Clone)]
pub struct DnsConfig {
    pub api_token: String,
    pub zone_id: String,
}

impl DnsConfig {
    /// Read the token from `token_env` (default `CLOUDFLARE_API_TOKEN`)
    pub fn from_env(zone_id: impl Into<String>, token_env: Option<&str>) -> Result<Self> {
        let var = token_env.unwrap_or(DEFAULT_TOKEN_ENV);
        let api_token =
            std::env::var(var).map_err(|_| CloudflareError::MissingEnvVar(var.to_string()))?;
        Ok(Self {
            api_token,
            zone_id: zone_id.into(),
        })
    }
}

/// Cloudflare record type for a logical record type. Aliases are CNAMEs,
/// flattened by Cloudflare at the zone apex.
pub fn wire_type(record_type: DnsRecordType) -> &'static str {
    match record_type {
        DnsRecordType::Alias | DnsRecordType::Cname => "CNAME",
        DnsRecordType::Txt => "TXT",
    }
}

/// Cloudflare DNS manager
pub struct CloudflareDns {
    client: reqwest::Client,
    api_token: String,
    zone_id: String,
}

impl CloudflareDns {
    /// Create a new DNS manager
    pub fn new(config: DnsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_token: config.api_token,
            zone_id: config.zone_id,
        }
    }

    pub fn zone_id(&self) -> &str {
        &self.zone_id
    }

    fn records_url(&self) -> String {
        format!("{}/zones/{}/dns_records", CLOUDFLARE_API_BASE, self.zone_id)
    }

    async fn unwrap_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let api_response: ApiResponse<T> = response.json().await?;
        if !api_response.success {
            let (code, message) = api_response
                .errors
                .first()
                .map(|e| (e.code, e.message.clone()))
                .unwrap_or_else(|| (0, "Unknown error".to_string()));
            return Err(CloudflareError::Api { code, message });
        }
        api_response
            .result
            .ok_or_else(|| CloudflareError::Api {
                code: 0,
                message: "response without result".to_string(),
            })
    }

    /// Verify the API token
    pub async fn verify_token(&self) -> Result<String> {
        let response = self
            .client
            .get(format!("{}/user/tokens/verify", CLOUDFLARE_API_BASE))
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        let verified: TokenStatus = Self::unwrap_response(response).await?;
        Ok(verified.status)
    }

    /// All records of `record_type` named exactly `name`
    pub async fn find_records(&self, name: &str, record_type: &str) -> Result<Vec<ApiDnsRecord>> {
        let response = self
            .client
            .get(self.records_url())
            .query(&[("type", record_type), ("name", name)])
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        Self::unwrap_response(response).await
    }

    pub async fn create_record(&self, record: &DnsRecordRequest) -> Result<ApiDnsRecord> {
        let response = self
            .client
            .post(self.records_url())
            .bearer_auth(&self.api_token)
            .json(record)
            .send()
            .await?;
        let created: ApiDnsRecord = Self::unwrap_response(response).await?;
        tracing::info!(
            "Created DNS record: {} {} -> {}",
            created.r#type,
            created.name,
            created.content
        );
        Ok(created)
    }

    /// Overwrite an existing record
    pub async fn update_record(
        &self,
        record_id: &str,
        record: &DnsRecordRequest,
    ) -> Result<ApiDnsRecord> {
        let response = self
            .client
            .put(format!("{}/{}", self.records_url(), record_id))
            .bearer_auth(&self.api_token)
            .json(record)
            .send()
            .await?;
        Self::unwrap_response(response).await
    }

    pub async fn delete_record(&self, record_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/{}", self.records_url(), record_id))
            .bearer_auth(&self.api_token)
            .send()
            .await?;
        let _: DeleteResult = Self::unwrap_response(response).await?;
        Ok(())
    }
}

// ============ API Types ============

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    result: Option<T>,
    #[serde(default)]
    errors: Vec<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct TokenStatus {
    status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiDnsRecord {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub r#type: String,
    pub content: String,
    pub ttl: u32,
    #[serde(default)]
    pub proxied: bool,
    /// Last modification time, bumped by every write
    #[serde(default)]
    pub modified_on: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsRecordRequest {
    #[serde(rename = "type")]
    pub r#type: String,
    pub name: String,
    pub content: String,
    pub ttl: u32,
    pub proxied: bool,
}

#[derive(Debug, Deserialize)]
struct DeleteResult {
    #[allow(dead_code)]
    id: String,
}
