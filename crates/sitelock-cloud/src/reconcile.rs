//! Reconciliation primitive
//!
//! `reconcile(spec)` probes a resource, creates it when absent, leaves it
//! alone when it already matches, and otherwise updates it with the version
//! token it just read. Running it twice with the same spec performs no second
//! write.

use crate::api::ResourceApi;
use crate::error::{CloudError, Result};
use crate::model::{ResourceRef, ResourceSpec, ResourceState};
use crate::outcome::ActionType;
use crate::runlog::RunLog;

/// Outcome of one reconciliation
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub state: ResourceState,
    pub action: ActionType,
}

impl Reconciled {
    fn new(state: ResourceState, action: ActionType) -> Self {
        Self { state, action }
    }
}

/// Drives a single Resource API towards desired specs
pub struct Reconciler<'a> {
    api: &'a dyn ResourceApi,
    log: Option<&'a RunLog>,
}

impl<'a> Reconciler<'a> {
    pub fn new(api: &'a dyn ResourceApi) -> Self {
        Self { api, log: None }
    }

    pub fn with_log(mut self, log: Option<&'a RunLog>) -> Self {
        self.log = log;
        self
    }

    /// Bring the remote resource in line with `spec`
    pub async fn reconcile(&self, spec: &ResourceSpec) -> Result<Reconciled> {
        let target = spec.resource_ref();
        tracing::debug!("Reconciling {} via {}", target, self.api.name());

        let result = match self.api.get(&target).await? {
            None => self.create_or_adopt(spec).await,
            Some(existing) => self.converge(spec, existing).await,
        };

        match &result {
            Ok(reconciled) => {
                if let Some(log) = self.log {
                    log.record_action(&target, reconciled.action).await;
                }
            }
            Err(e) => {
                if let Some(log) = self.log {
                    log.record_failure(&target, e).await;
                }
            }
        }
        result
    }

    async fn create_or_adopt(&self, spec: &ResourceSpec) -> Result<Reconciled> {
        let target = spec.resource_ref();
        if spec.is_shared() {
            return Err(CloudError::NotFound(format!(
                "{} is a shared input and must already exist",
                target
            )));
        }

        tracing::info!("Creating {}", target);
        match self.api.create(spec).await {
            Ok(state) => Ok(Reconciled::new(state, ActionType::Create)),
            Err(CloudError::AlreadyExists(_)) => {
                // Another writer won the race; converge on what it created.
                tracing::warn!("{} appeared concurrently, re-reading", target);
                let existing = self
                    .api
                    .get(&target)
                    .await?
                    .ok_or_else(|| CloudError::NotFound(target.to_string()))?;
                self.converge(spec, existing).await
            }
            Err(e) => Err(e),
        }
    }

    async fn converge(&self, spec: &ResourceSpec, existing: ResourceState) -> Result<Reconciled> {
        let target = spec.resource_ref();
        let drift = spec.diff(&existing);
        if drift.is_empty() {
            tracing::debug!("{} is up to date", target);
            return Ok(Reconciled::new(existing, ActionType::NoOp));
        }

        for d in &drift {
            tracing::debug!("{} drift {}", target, d);
        }

        if spec.is_shared() {
            return Err(CloudError::Ownership(format!(
                "{} is shared and differs from the desired configuration ({})",
                target,
                drift
                    .iter()
                    .map(|d| d.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        tracing::info!("Updating {} ({} attribute(s))", target, drift.len());
        match self.api.update(spec, existing.version.as_deref()).await {
            Ok(state) => Ok(Reconciled::new(state, ActionType::Update)),
            Err(CloudError::Conflict(_)) => {
                tracing::warn!("{} changed concurrently, retrying with a fresh token", target);
                let fresh = self
                    .api
                    .get(&target)
                    .await?
                    .ok_or_else(|| CloudError::NotFound(target.to_string()))?;
                if spec.matches(&fresh) {
                    return Ok(Reconciled::new(fresh, ActionType::NoOp));
                }
                // A second conflict propagates.
                let state = self.api.update(spec, fresh.version.as_deref()).await?;
                Ok(Reconciled::new(state, ActionType::Update))
            }
            Err(e) => Err(e),
        }
    }

    /// Read a resource without changing it
    pub async fn observe(&self, resource: &ResourceRef) -> Result<Option<ResourceState>> {
        self.api.get(resource).await
    }

    /// Read a resource that must already exist
    pub async fn require(&self, resource: &ResourceRef) -> Result<ResourceState> {
        self.api
            .get(resource)
            .await?
            .ok_or_else(|| CloudError::NotFound(resource.to_string()))
    }

    /// Delete a resource; an already-missing resource is a no-op
    pub async fn remove(&self, resource: &ResourceRef) -> Result<ActionType> {
        let action = match self.api.delete(resource).await {
            Ok(true) => {
                tracing::info!("Deleted {}", resource);
                ActionType::Delete
            }
            Ok(false) | Err(CloudError::NotFound(_)) => {
                tracing::debug!("{} not found, nothing to delete", resource);
                ActionType::NoOp
            }
            Err(e) => {
                if let Some(log) = self.log {
                    log.record_failure(resource, &e).await;
                }
                return Err(e);
            }
        };
        if let Some(log) = self.log {
            log.record_action(resource, action).await;
        }
        Ok(action)
    }
}
