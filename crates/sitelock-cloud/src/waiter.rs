//! Convergence polling
//!
//! Distribution deployment, certificate issuance and firewall propagation
//! complete asynchronously. These helpers poll a resource on a timer until it
//! reaches the wanted status, fail fast on a terminal error, and report a
//! timeout (distinct from failure) once the attempt budget is spent.

use crate::api::ResourceApi;
use crate::error::{CloudError, Result};
use crate::model::{ResourceRef, ResourceState, ResourceStatus};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;

/// Polling bounds with optional exponential backoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// 1.0 polls at a fixed interval
    pub multiplier: f64,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 40,
            initial_delay_ms: 15_000,
            max_delay_ms: 60_000,
            multiplier: 1.0,
        }
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl WaitPolicy {
    /// Fixed-interval polling
    pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
        let ms = saturating_millis(interval);
        Self {
            max_attempts,
            initial_delay_ms: ms,
            max_delay_ms: ms,
            multiplier: 1.0,
        }
    }

    pub fn with_backoff(mut self, multiplier: f64, max_delay: Duration) -> Self {
        self.multiplier = multiplier;
        self.max_delay_ms = saturating_millis(max_delay);
        self
    }

    /// Delay after the given (zero-based) attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        let cap = self.max_delay_ms.max(self.initial_delay_ms);
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = self.initial_delay_ms as f64 * self.multiplier.powi(exponent);
        // NaN and infinity fall through to the cap
        if delay < cap as f64 {
            delay as u64
        } else {
            cap
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(CloudError::InvalidConfig(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.multiplier < 1.0 || !self.multiplier.is_finite() {
            return Err(CloudError::InvalidConfig(format!(
                "backoff multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }
}

/// Poll until `resource` reports `target`.
///
/// Returns the authoritative state once converged. A terminal error status
/// aborts immediately; after `max_attempts` polls without resolution the
/// result is `CloudError::Timeout` carrying the last observed status.
pub async fn await_status(
    api: &dyn ResourceApi,
    resource: &ResourceRef,
    target: ResourceStatus,
    policy: &WaitPolicy,
) -> Result<ResourceState> {
    policy.validate()?;

    let mut last_status = ResourceStatus::Absent;
    for attempt in 0..policy.max_attempts {
        let status = api.get_status(resource).await?;
        tracing::debug!(
            "{} status {} (attempt {}/{}, want {})",
            resource,
            status,
            attempt + 1,
            policy.max_attempts,
            target
        );

        if status == target {
            if target == ResourceStatus::Absent {
                return Ok(ResourceState::absent(resource));
            }
            return api
                .get(resource)
                .await?
                .ok_or_else(|| CloudError::NotFound(resource.to_string()));
        }

        if status.is_terminal_error() {
            let detail = match api.get(resource).await {
                Ok(Some(state)) => state.remote_status.unwrap_or_else(|| status.to_string()),
                Ok(None) => status.to_string(),
                Err(e) => {
                    tracing::debug!("Could not read {} after terminal status: {}", resource, e);
                    status.to_string()
                }
            };
            return Err(CloudError::TerminalRemote {
                resource: resource.to_string(),
                detail,
            });
        }

        last_status = status;

        if attempt + 1 < policy.max_attempts {
            sleep(Duration::from_millis(policy.delay_for_attempt(attempt))).await;
        }
    }

    Err(CloudError::Timeout {
        resource: resource.to_string(),
        target,
        last_status,
        attempts: policy.max_attempts,
    })
}

/// Poll until `resource` carries a non-null `attribute`.
///
/// Used where the control plane fills in data after creation, such as the
/// DNS validation records of a freshly requested certificate.
pub async fn await_attribute(
    api: &dyn ResourceApi,
    resource: &ResourceRef,
    attribute: &str,
    policy: &WaitPolicy,
) -> Result<ResourceState> {
    policy.validate()?;

    let mut last_status = ResourceStatus::Absent;
    for attempt in 0..policy.max_attempts {
        if let Some(state) = api.get(resource).await? {
            if state.status.is_terminal_error() {
                return Err(CloudError::TerminalRemote {
                    resource: resource.to_string(),
                    detail: state
                        .remote_status
                        .clone()
                        .unwrap_or_else(|| state.status.to_string()),
                });
            }
            let populated = match state.attributes.get(attribute) {
                Some(serde_json::Value::Null) | None => false,
                Some(serde_json::Value::Array(items)) => !items.is_empty(),
                Some(_) => true,
            };
            if populated {
                return Ok(state);
            }
            last_status = state.status;
        }

        tracing::debug!(
            "{} has no {} yet (attempt {}/{})",
            resource,
            attribute,
            attempt + 1,
            policy.max_attempts
        );
        if attempt + 1 < policy.max_attempts {
            sleep(Duration::from_millis(policy.delay_for_attempt(attempt))).await;
        }
    }

    Err(CloudError::Timeout {
        resource: format!("{} ({})", resource, attribute),
        target: ResourceStatus::Deployed,
        last_status,
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryApi, Operation};
    use crate::model::ResourceKind;
    use serde_json::json;

    fn distribution() -> ResourceRef {
        ResourceRef::new(ResourceKind::Distribution, "site")
    }

    fn seeded() -> MemoryApi {
        let api = MemoryApi::new("test");
        api.insert(
            ResourceState::present(ResourceKind::Distribution, "site")
                .with_status(ResourceStatus::Pending)
                .with_remote_status("InProgress"),
        );
        api
    }

    #[test]
    fn test_delay_calculation() {
        let policy = WaitPolicy {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 10000,
            multiplier: 2.0,
        };

        assert_eq!(policy.delay_for_attempt(0), 1000);
        assert_eq!(policy.delay_for_attempt(1), 2000);
        assert_eq!(policy.delay_for_attempt(2), 4000);
        assert_eq!(policy.delay_for_attempt(3), 8000);
        assert_eq!(policy.delay_for_attempt(4), 10000); // capped at max
    }

    #[test]
    fn test_fixed_policy() {
        let policy = WaitPolicy::fixed(3, Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(0), 2000);
        assert_eq!(policy.delay_for_attempt(7), 2000);
    }

    #[test]
    fn test_late_attempts_stay_capped() {
        let policy = WaitPolicy::fixed(5, Duration::from_secs(1))
            .with_backoff(2.0, Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(200), 30_000);
        assert_eq!(policy.delay_for_attempt(u32::MAX), 30_000);

        let fixed = WaitPolicy::fixed(5, Duration::from_secs(1));
        assert_eq!(fixed.delay_for_attempt(u32::MAX), 1000);
    }

    #[test]
    fn test_oversized_durations_saturate() {
        let policy = WaitPolicy::fixed(3, Duration::MAX);
        assert_eq!(policy.initial_delay_ms, u64::MAX);
        assert_eq!(policy.delay_for_attempt(0), u64::MAX);

        let policy = WaitPolicy::fixed(3, Duration::from_secs(1)).with_backoff(2.0, Duration::MAX);
        assert_eq!(policy.max_delay_ms, u64::MAX);
        assert_eq!(policy.delay_for_attempt(u32::MAX), u64::MAX);
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let policy = WaitPolicy::fixed(0, Duration::from_secs(1));
        tokio_test::assert_err!(policy.validate());
        tokio_test::assert_ok!(WaitPolicy::default().validate());
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_when_status_flips_on_third_attempt() {
        let api = seeded();
        api.script_status(
            &distribution(),
            [
                ResourceStatus::Pending,
                ResourceStatus::Pending,
                ResourceStatus::Deployed,
            ],
        );

        let policy = WaitPolicy::fixed(5, Duration::from_secs(1));
        let started = tokio::time::Instant::now();
        let state = await_status(&api, &distribution(), ResourceStatus::Deployed, &policy)
            .await
            .unwrap();

        assert_eq!(state.status, ResourceStatus::Deployed);
        assert_eq!(api.count(Operation::Status), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_max_attempts() {
        let api = seeded();
        let policy = WaitPolicy::fixed(3, Duration::from_secs(1));

        let err = await_status(&api, &distribution(), ResourceStatus::Deployed, &policy)
            .await
            .unwrap_err();

        match err {
            CloudError::Timeout {
                last_status,
                attempts,
                ..
            } => {
                assert_eq!(last_status, ResourceStatus::Pending);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(api.count(Operation::Status), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_error_fails_fast() {
        let api = seeded();
        api.script_status(&distribution(), [ResourceStatus::Error]);
        let policy = WaitPolicy::fixed(10, Duration::from_secs(30));

        let started = tokio::time::Instant::now();
        let err = await_status(&api, &distribution(), ResourceStatus::Deployed, &policy)
            .await
            .unwrap_err();

        assert!(matches!(err, CloudError::TerminalRemote { .. }));
        assert!(err.to_string().contains("InProgress"));
        assert_eq!(api.count(Operation::Status), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_await_absent() {
        let api = MemoryApi::new("test");
        let policy = WaitPolicy::fixed(2, Duration::ZERO);

        let state = await_status(&api, &distribution(), ResourceStatus::Absent, &policy)
            .await
            .unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn test_await_attribute_ignores_empty_list() {
        let api = MemoryApi::new("test");
        let cert = ResourceRef::new(ResourceKind::Certificate, "docs.example.com");
        api.insert(
            ResourceState::present(ResourceKind::Certificate, "docs.example.com")
                .with_status(ResourceStatus::Pending)
                .with_attribute("validation_records", json!([])),
        );
        let policy = WaitPolicy::fixed(2, Duration::ZERO);

        let err = await_attribute(&api, &cert, "validation_records", &policy)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(api.count(Operation::Get), 2);
    }
}
