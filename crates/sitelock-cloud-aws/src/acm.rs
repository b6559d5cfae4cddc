//! ACM certificates (us-east-1, as required by CloudFront)

use crate::cli::AwsCli;
use crate::error::{AwsError, Result};
use crate::merge_attributes;
use serde_json::{Value, json};
use sitelock_cloud::certificate::VALIDATION_RECORDS;
use sitelock_cloud::site::attributes::{ARN, CertificateAttributes};
use sitelock_cloud::{CertificateStatus, ResourceKind, ResourceState, ValidationRecord};
use std::collections::BTreeSet;

const LISTED_STATUSES: [&str; 7] = [
    "PENDING_VALIDATION",
    "ISSUED",
    "INACTIVE",
    "EXPIRED",
    "VALIDATION_TIMED_OUT",
    "REVOKED",
    "FAILED",
];

/// Entry of `list-certificates`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateSummary {
    pub arn: String,
    pub domain: String,
    pub status: String,
}

pub struct Acm<'a> {
    cli: &'a AwsCli,
}

impl<'a> Acm<'a> {
    pub fn new(cli: &'a AwsCli) -> Self {
        Self { cli }
    }

    async fn list(&self) -> Result<Vec<CertificateSummary>> {
        let mut args = vec!["acm", "list-certificates", "--certificate-statuses"];
        args.extend(LISTED_STATUSES);
        let response: Value = self.cli.run_json(&args).await?;
        Ok(response["CertificateSummaryList"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        Some(CertificateSummary {
                            arn: item["CertificateArn"].as_str()?.to_string(),
                            domain: item["DomainName"].as_str()?.to_string(),
                            status: item["Status"].as_str().unwrap_or_default().to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn find(&self, domain: &str) -> Result<Option<CertificateSummary>> {
        let certificates = self.list().await?;
        Ok(pick_certificate(&certificates, domain).cloned())
    }

    pub async fn get_certificate(&self, domain: &str) -> Result<Option<ResourceState>> {
        let Some(summary) = self.find(domain).await? else {
            return Ok(None);
        };
        let response: Value = match self
            .cli
            .run_json(&[
                "acm",
                "describe-certificate",
                "--certificate-arn",
                summary.arn.as_str(),
            ])
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        certificate_state(domain, &response["Certificate"]).map(Some)
    }

    /// Request a DNS-validated certificate. The idempotency token makes a
    /// repeated request within an hour return the same certificate.
    pub async fn request_certificate(&self, attrs: &CertificateAttributes) -> Result<String> {
        let token = idempotency_token(&attrs.domain);
        let mut args = vec![
            "acm",
            "request-certificate",
            "--domain-name",
            attrs.domain.as_str(),
            "--validation-method",
            attrs.validation_method.as_str(),
            "--idempotency-token",
            token.as_str(),
        ];
        if !attrs.subject_alternative_names.is_empty() {
            args.push("--subject-alternative-names");
            args.extend(attrs.subject_alternative_names.iter().map(String::as_str));
        }
        let response: Value = self.cli.run_json(&args).await?;
        let arn = response["CertificateArn"]
            .as_str()
            .ok_or_else(|| AwsError::UnexpectedResponse("request-certificate: no ARN".into()))?;
        tracing::info!("Requested certificate {} ({})", attrs.domain, arn);
        Ok(arn.to_string())
    }

    /// Fails with `ResourceInUseException` while a distribution uses it
    pub async fn delete_certificate(&self, domain: &str) -> Result<bool> {
        let Some(summary) = self.find(domain).await? else {
            return Ok(false);
        };
        self.cli
            .run(&[
                "acm",
                "delete-certificate",
                "--certificate-arn",
                summary.arn.as_str(),
            ])
            .await?;
        Ok(true)
    }
}

fn status_rank(status: &str) -> u8 {
    match status {
        "ISSUED" => 0,
        "PENDING_VALIDATION" => 1,
        _ => 2,
    }
}

/// Best certificate for `domain`: issued beats pending beats anything else
pub fn pick_certificate<'c>(
    certificates: &'c [CertificateSummary],
    domain: &str,
) -> Option<&'c CertificateSummary> {
    certificates
        .iter()
        .filter(|c| c.domain.eq_ignore_ascii_case(domain))
        .min_by_key(|c| status_rank(&c.status))
}

/// ACM idempotency tokens are limited to 32 word characters
pub fn idempotency_token(domain: &str) -> String {
    domain
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(32)
        .collect()
}

fn certificate_state(domain: &str, certificate: &Value) -> Result<ResourceState> {
    let arn = certificate["CertificateArn"]
        .as_str()
        .ok_or_else(|| AwsError::UnexpectedResponse("describe-certificate: no ARN".into()))?;
    let remote = certificate["Status"].as_str().unwrap_or("PENDING_VALIDATION");
    let status = CertificateStatus::from_remote(remote);

    let subject_alternative_names: BTreeSet<String> = certificate["SubjectAlternativeNames"]
        .as_array()
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .filter(|name| !name.eq_ignore_ascii_case(domain))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let mut validation_method = "DNS".to_string();
    let mut records = Vec::new();
    if let Some(options) = certificate["DomainValidationOptions"].as_array() {
        for option in options {
            if let Some(method) = option["ValidationMethod"].as_str() {
                validation_method = method.to_string();
            }
            let record = &option["ResourceRecord"];
            if let (Some(name), Some(value)) = (record["Name"].as_str(), record["Value"].as_str()) {
                records.push(ValidationRecord {
                    name: name.to_string(),
                    record_type: record["Type"].as_str().unwrap_or("CNAME").to_string(),
                    value: value.to_string(),
                });
            }
        }
    }

    let attrs = CertificateAttributes {
        domain: domain.to_string(),
        subject_alternative_names,
        validation_method,
    };
    let mut state = ResourceState::present(ResourceKind::Certificate, domain)
        .with_id(arn)
        .with_status(status.resource_status())
        .with_remote_status(remote)
        .with_attribute(ARN, json!(arn));
    merge_attributes(&mut state, &attrs)?;
    // Records appear a few seconds after the request; absent until then
    if !records.is_empty() {
        state.set_attribute(VALIDATION_RECORDS, serde_json::to_value(&records)?);
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(arn: &str, domain: &str, status: &str) -> CertificateSummary {
        CertificateSummary {
            arn: arn.into(),
            domain: domain.into(),
            status: status.into(),
        }
    }

    #[test]
    fn test_pick_prefers_issued() {
        let certificates = vec![
            summary("arn:1", "docs.example.com", "EXPIRED"),
            summary("arn:2", "docs.example.com", "PENDING_VALIDATION"),
            summary("arn:3", "docs.example.com", "ISSUED"),
            summary("arn:4", "other.example.com", "ISSUED"),
        ];
        assert_eq!(
            pick_certificate(&certificates, "docs.example.com").unwrap().arn,
            "arn:3"
        );
        assert!(pick_certificate(&certificates, "missing.example.com").is_none());
    }

    #[test]
    fn test_idempotency_token() {
        assert_eq!(idempotency_token("docs.example.com"), "docsexamplecom");
        let long = "a-very-long-subdomain-name-for-testing.example.com";
        assert_eq!(idempotency_token(long).len(), 32);
    }

    #[test]
    fn test_certificate_state_pending_with_records() {
        let certificate = json!({
            "CertificateArn": "arn:aws:acm:us-east-1:1:certificate/abc",
            "DomainName": "docs.example.com",
            "SubjectAlternativeNames": ["docs.example.com", "www.docs.example.com"],
            "Status": "PENDING_VALIDATION",
            "DomainValidationOptions": [{
                "DomainName": "docs.example.com",
                "ValidationMethod": "DNS",
                "ResourceRecord": {
                    "Name": "_a1.docs.example.com.",
                    "Type": "CNAME",
                    "Value": "_b2.acm-validations.aws."
                }
            }]
        });
        let state = certificate_state("docs.example.com", &certificate).unwrap();
        assert_eq!(state.status, sitelock_cloud::ResourceStatus::Pending);
        assert_eq!(state.remote_status.as_deref(), Some("PENDING_VALIDATION"));
        assert_eq!(
            CertificateStatus::of(Some(&state)),
            CertificateStatus::PendingValidation
        );
        let records = ValidationRecord::from_state(&state);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value, "_b2.acm-validations.aws.");

        let sans: BTreeSet<String> = state.get_attribute("subject_alternative_names").unwrap();
        assert_eq!(sans, BTreeSet::from(["www.docs.example.com".to_string()]));
    }

    #[test]
    fn test_certificate_state_without_records_yet() {
        let certificate = json!({
            "CertificateArn": "arn:aws:acm:us-east-1:1:certificate/abc",
            "Status": "PENDING_VALIDATION",
            "DomainValidationOptions": [{"DomainName": "docs.example.com"}]
        });
        let state = certificate_state("docs.example.com", &certificate).unwrap();
        assert!(state.get_attribute::<Value>(VALIDATION_RECORDS).is_none());
        assert_eq!(state.get_str("validation_method"), Some("DNS"));
    }
}
