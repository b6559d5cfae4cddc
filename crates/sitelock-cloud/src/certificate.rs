//! Certificate issuance lifecycle
//!
//! ```text
//! absent -> requested -> pending-validation -> issued
//!                                          \-> failed | timed-out
//! ```

use crate::error::{CloudError, Result};
use crate::model::{ResourceState, ResourceStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CertificateStatus {
    Absent,
    Requested,
    PendingValidation,
    Issued,
    Failed,
    TimedOut,
}

impl CertificateStatus {
    /// Map a provider-native status string
    pub fn from_remote(remote: &str) -> Self {
        match remote {
            "PENDING_VALIDATION" => CertificateStatus::PendingValidation,
            "ISSUED" => CertificateStatus::Issued,
            "FAILED" | "REVOKED" | "EXPIRED" | "INACTIVE" => CertificateStatus::Failed,
            "VALIDATION_TIMED_OUT" => CertificateStatus::TimedOut,
            _ => CertificateStatus::Requested,
        }
    }

    /// Lifecycle position of an observed certificate
    pub fn of(state: Option<&ResourceState>) -> Self {
        match state {
            None => CertificateStatus::Absent,
            Some(s) if !s.exists => CertificateStatus::Absent,
            Some(s) => s
                .remote_status
                .as_deref()
                .map(Self::from_remote)
                .unwrap_or(match s.status {
                    ResourceStatus::Deployed => CertificateStatus::Issued,
                    ResourceStatus::Error => CertificateStatus::Failed,
                    ResourceStatus::Absent => CertificateStatus::Absent,
                    ResourceStatus::Pending => CertificateStatus::Requested,
                }),
        }
    }

    /// Coarse status used by the convergence poller
    pub fn resource_status(&self) -> ResourceStatus {
        match self {
            CertificateStatus::Absent => ResourceStatus::Absent,
            CertificateStatus::Requested | CertificateStatus::PendingValidation => {
                ResourceStatus::Pending
            }
            CertificateStatus::Issued => ResourceStatus::Deployed,
            CertificateStatus::Failed | CertificateStatus::TimedOut => ResourceStatus::Error,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CertificateStatus::Issued | CertificateStatus::Failed | CertificateStatus::TimedOut
        )
    }

    fn can_advance_to(&self, next: CertificateStatus) -> bool {
        use CertificateStatus::*;
        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (Absent, Requested)
                | (Absent, PendingValidation)
                | (Requested, PendingValidation)
                | (Requested, Issued)
                | (Requested, Failed)
                | (PendingValidation, Issued)
                | (PendingValidation, Failed)
                | (PendingValidation, TimedOut)
        )
    }
}

impl std::fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CertificateStatus::Absent => "absent",
            CertificateStatus::Requested => "requested",
            CertificateStatus::PendingValidation => "pending-validation",
            CertificateStatus::Issued => "issued",
            CertificateStatus::Failed => "failed",
            CertificateStatus::TimedOut => "timed-out",
        };
        f.write_str(s)
    }
}

/// Tracks one certificate through issuance, rejecting backwards moves
#[derive(Debug, Clone)]
pub struct CertificateLifecycle {
    domain: String,
    status: CertificateStatus,
}

impl CertificateLifecycle {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            status: CertificateStatus::Absent,
        }
    }

    /// Pick up a certificate observed in an earlier run
    pub fn resume(domain: impl Into<String>, state: Option<&ResourceState>) -> Self {
        Self {
            domain: domain.into(),
            status: CertificateStatus::of(state),
        }
    }

    pub fn status(&self) -> CertificateStatus {
        self.status
    }

    pub fn advance(&mut self, next: CertificateStatus) -> Result<CertificateStatus> {
        if !self.status.can_advance_to(next) {
            return Err(CloudError::InvalidTransition {
                resource: format!("certificate:{}", self.domain),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        if self.status != next {
            tracing::debug!("certificate {} {} -> {}", self.domain, self.status, next);
        }
        self.status = next;
        Ok(next)
    }

    /// Advance to whatever the observed state reports
    pub fn observe(&mut self, state: Option<&ResourceState>) -> Result<CertificateStatus> {
        self.advance(CertificateStatus::of(state))
    }
}

/// DNS record that proves control of a domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub name: String,
    #[serde(default = "default_record_type")]
    pub record_type: String,
    pub value: String,
}

fn default_record_type() -> String {
    "CNAME".to_string()
}

/// Attribute carrying the validation records of a certificate
pub const VALIDATION_RECORDS: &str = "validation_records";

impl ValidationRecord {
    /// Validation records reported on a certificate, de-duplicated
    /// (the apex and `www` often share one record)
    pub fn from_state(state: &ResourceState) -> Vec<ValidationRecord> {
        let mut records: Vec<ValidationRecord> =
            state.get_attribute(VALIDATION_RECORDS).unwrap_or_default();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records.dedup();
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceKind;
    use serde_json::json;

    #[test]
    fn test_from_remote() {
        assert_eq!(
            CertificateStatus::from_remote("PENDING_VALIDATION"),
            CertificateStatus::PendingValidation
        );
        assert_eq!(CertificateStatus::from_remote("ISSUED"), CertificateStatus::Issued);
        assert_eq!(CertificateStatus::from_remote("REVOKED"), CertificateStatus::Failed);
        assert_eq!(
            CertificateStatus::from_remote("VALIDATION_TIMED_OUT"),
            CertificateStatus::TimedOut
        );
        assert_eq!(
            CertificateStatus::from_remote("SOMETHING_NEW"),
            CertificateStatus::Requested
        );
    }

    #[test]
    fn test_happy_path() {
        let mut lc = CertificateLifecycle::new("docs.example.com");
        lc.advance(CertificateStatus::Requested).unwrap();
        lc.advance(CertificateStatus::PendingValidation).unwrap();
        lc.advance(CertificateStatus::PendingValidation).unwrap();
        lc.advance(CertificateStatus::Issued).unwrap();
        assert!(lc.status().is_terminal());
    }

    #[test]
    fn test_no_backwards_transition() {
        let mut lc = CertificateLifecycle::new("docs.example.com");
        lc.advance(CertificateStatus::Requested).unwrap();
        lc.advance(CertificateStatus::Issued).unwrap();

        let err = lc.advance(CertificateStatus::PendingValidation).unwrap_err();
        assert!(matches!(err, CloudError::InvalidTransition { .. }));
        assert!(err.to_string().contains("issued -> pending-validation"));
    }

    #[test]
    fn test_timed_out_only_from_pending_validation() {
        let mut lc = CertificateLifecycle::new("docs.example.com");
        assert!(lc.advance(CertificateStatus::TimedOut).is_err());
        lc.advance(CertificateStatus::PendingValidation).unwrap();
        lc.advance(CertificateStatus::TimedOut).unwrap();
        assert_eq!(lc.status().resource_status(), ResourceStatus::Error);
    }

    #[test]
    fn test_validation_records_from_state() {
        let state = ResourceState::present(ResourceKind::Certificate, "example.com")
            .with_remote_status("PENDING_VALIDATION")
            .with_attribute(
                VALIDATION_RECORDS,
                json!([
                    {"name": "_b.example.com.", "record_type": "CNAME", "value": "_x.acm-validations.aws."},
                    {"name": "_a.example.com.", "value": "_y.acm-validations.aws."},
                    {"name": "_b.example.com.", "record_type": "CNAME", "value": "_x.acm-validations.aws."}
                ]),
            );

        let records = ValidationRecord::from_state(&state);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "_a.example.com.");
        assert_eq!(records[0].record_type, "CNAME");
        assert_eq!(
            CertificateStatus::of(Some(&state)),
            CertificateStatus::PendingValidation
        );
    }
}
