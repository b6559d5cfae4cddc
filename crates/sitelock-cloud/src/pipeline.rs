//! Pipeline sequencer
//!
//! A [`ProvisioningRun`] executes steps strictly in order. Each step reads
//! the outputs of earlier steps (bucket name, distribution id...) and adds
//! its own. The first failure stops the run without rollback; the returned
//! [`RunFailure`] names the step, the resource it was working on, and the
//! outputs gathered so far, so a re-run with the same parameters resumes.

use crate::error::{CloudError, Result};
use crate::model::ResourceRef;
use crate::outcome::{Outputs, ResourceAction, RunReport, StepRecord};
use crate::reconcile::Reconciled;
use crate::runlog::{RunEvent, RunLog};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

/// One ordered unit of work
#[async_trait]
pub trait PipelineStep: Send + Sync {
    fn name(&self) -> &str;

    /// Output keys this step reads
    fn requires(&self) -> &[&'static str] {
        &[]
    }

    /// Output keys this step produces
    fn provides(&self) -> &[&'static str] {
        &[]
    }

    async fn run(&self, ctx: &mut StepContext) -> Result<()>;
}

/// Mutable state handed to each step
pub struct StepContext {
    pub outputs: Outputs,
    log: Option<Arc<RunLog>>,
    current: Option<ResourceRef>,
    actions: Vec<ResourceAction>,
}

impl StepContext {
    fn new(outputs: Outputs, log: Option<Arc<RunLog>>) -> Self {
        Self {
            outputs,
            log,
            current: None,
            actions: Vec::new(),
        }
    }

    pub fn log(&self) -> Option<&RunLog> {
        self.log.as_deref()
    }

    /// Mark the resource the step is about to work on. Reported on failure.
    pub fn focus(&mut self, resource: ResourceRef) {
        self.current = Some(resource);
    }

    pub fn unfocus(&mut self) {
        self.current = None;
    }

    /// Record the outcome of a reconciliation and clear the focus
    pub fn record(&mut self, reconciled: &Reconciled) {
        self.record_action(ResourceAction::new(
            reconciled.state.resource_ref(),
            reconciled.action,
        ));
    }

    pub fn record_action(&mut self, action: ResourceAction) {
        self.actions.push(action);
        self.current = None;
    }

    pub fn require(&self, key: &str) -> Result<&str> {
        self.outputs.require(key)
    }

    pub fn provide(&mut self, key: &str, value: impl Into<String>) {
        self.outputs.insert(key, value);
    }
}

/// A run stopped at a failing step
#[derive(Error, Debug)]
#[error("step `{step}` failed on {}: {error}", .resource.as_deref().unwrap_or("(no resource)"))]
pub struct RunFailure {
    pub run_id: Uuid,
    pub step: String,
    /// Resource the step was working on, if any
    pub resource: Option<String>,
    #[source]
    pub error: CloudError,
    /// Steps that completed before the failure
    pub completed: Vec<String>,
    /// Outputs produced so far
    pub outputs: Outputs,
}

impl RunFailure {
    pub fn is_timeout(&self) -> bool {
        self.error.is_timeout()
    }
}

/// Ordered sequence of steps for one invocation
pub struct ProvisioningRun {
    operation: String,
    steps: Vec<Box<dyn PipelineStep>>,
    initial: Outputs,
    log: Option<Arc<RunLog>>,
}

impl ProvisioningRun {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            steps: Vec::new(),
            initial: Outputs::new(),
            log: None,
        }
    }

    pub fn with_outputs(mut self, outputs: Outputs) -> Self {
        self.initial = outputs;
        self
    }

    pub fn with_log(mut self, log: Option<Arc<RunLog>>) -> Self {
        self.log = log;
        self
    }

    pub fn step(mut self, step: impl PipelineStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn push(&mut self, step: Box<dyn PipelineStep>) {
        self.steps.push(step);
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    fn run_id(&self) -> Uuid {
        self.log
            .as_ref()
            .map(|log| log.run_id())
            .unwrap_or_else(Uuid::new_v4)
    }

    /// Check that every required output is produced by an earlier step or
    /// supplied up front
    pub fn validate(&self) -> std::result::Result<(), RunFailure> {
        let mut available: BTreeSet<&str> =
            self.initial.iter().map(|(k, _)| k.as_str()).collect();

        for step in &self.steps {
            if let Some(missing) = step.requires().iter().find(|k| !available.contains(*k)) {
                return Err(RunFailure {
                    run_id: self.run_id(),
                    step: step.name().to_string(),
                    resource: None,
                    error: CloudError::MissingOutput(format!(
                        "`{}` is not produced by any earlier step",
                        missing
                    )),
                    completed: Vec::new(),
                    outputs: self.initial.clone(),
                });
            }
            available.extend(step.provides().iter().copied());
        }
        Ok(())
    }

    /// Execute all steps in order, stopping at the first failure
    pub async fn execute(self) -> std::result::Result<RunReport, RunFailure> {
        self.validate()?;

        let run_id = self.run_id();
        let started = Instant::now();
        let mut ctx = StepContext::new(self.initial.clone(), self.log.clone());
        let mut records: Vec<StepRecord> = Vec::new();

        if let Some(log) = &self.log {
            log.record(RunEvent::RunStarted {
                operation: self.operation.clone(),
            })
            .await;
        }

        for step in &self.steps {
            let name = step.name().to_string();
            tracing::info!("Step {} started", name);
            if let Some(log) = &self.log {
                log.record(RunEvent::StepStarted { step: name.clone() }).await;
            }

            ctx.current = None;
            let step_started = Instant::now();
            let result = match step.requires().iter().find(|k| !ctx.outputs.contains(k)) {
                Some(missing) => Err(CloudError::MissingOutput(missing.to_string())),
                None => step.run(&mut ctx).await,
            };

            match result {
                Ok(()) => {
                    let duration_ms =
                        u64::try_from(step_started.elapsed().as_millis()).unwrap_or(u64::MAX);
                    tracing::info!("Step {} completed in {}ms", name, duration_ms);
                    if let Some(log) = &self.log {
                        log.record(RunEvent::StepCompleted {
                            step: name.clone(),
                            duration_ms,
                        })
                        .await;
                    }
                    records.push(StepRecord {
                        step: name,
                        actions: std::mem::take(&mut ctx.actions),
                        duration_ms,
                    });
                }
                Err(error) => {
                    tracing::error!("Step {} failed: {}", name, error);
                    if let Some(log) = &self.log {
                        log.record(RunEvent::StepFailed {
                            step: name.clone(),
                            error: error.to_string(),
                        })
                        .await;
                    }
                    return Err(RunFailure {
                        run_id,
                        step: name,
                        resource: ctx.current.as_ref().map(|r| r.to_string()),
                        error,
                        completed: records.into_iter().map(|r| r.step).collect(),
                        outputs: ctx.outputs,
                    });
                }
            }
        }

        let report = RunReport {
            run_id,
            steps: records,
            outputs: ctx.outputs,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        if let Some(log) = &self.log {
            log.record(RunEvent::RunCompleted {
                summary: report.summary().to_string(),
            })
            .await;
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Fault, MemoryApi, Operation};
    use crate::model::{ResourceKind, ResourceSpec};
    use crate::outcome::ActionType;
    use crate::reconcile::Reconciler;
    use serde_json::json;

    /// Reconciles one resource, optionally keyed on an earlier output
    struct ResourceStep {
        name: &'static str,
        api: Arc<MemoryApi>,
        kind: ResourceKind,
        key: &'static str,
        requires: &'static [&'static str],
        provides: &'static [&'static str],
    }

    #[async_trait]
    impl PipelineStep for ResourceStep {
        fn name(&self) -> &str {
            self.name
        }

        fn requires(&self) -> &[&'static str] {
            self.requires
        }

        fn provides(&self) -> &[&'static str] {
            self.provides
        }

        async fn run(&self, ctx: &mut StepContext) -> Result<()> {
            let mut spec = ResourceSpec::new(self.kind, self.key);
            for key in self.requires {
                spec = spec.with_attribute(*key, json!(ctx.require(key)?));
            }
            ctx.focus(spec.resource_ref());
            let reconciled = Reconciler::new(self.api.as_ref())
                .with_log(ctx.log())
                .reconcile(&spec)
                .await?;
            ctx.record(&reconciled);
            for key in self.provides {
                ctx.provide(key, reconciled.state.require_id()?);
            }
            Ok(())
        }
    }

    fn three_steps(api: &Arc<MemoryApi>) -> ProvisioningRun {
        ProvisioningRun::new("test")
            .step(ResourceStep {
                name: "bucket",
                api: api.clone(),
                kind: ResourceKind::Bucket,
                key: "site-assets",
                requires: &[],
                provides: &["bucket"],
            })
            .step(ResourceStep {
                name: "distribution",
                api: api.clone(),
                kind: ResourceKind::Distribution,
                key: "site",
                requires: &["bucket"],
                provides: &["distribution"],
            })
            .step(ResourceStep {
                name: "dns",
                api: api.clone(),
                kind: ResourceKind::DnsRecord,
                key: "ALIAS:docs.example.com",
                requires: &["distribution"],
                provides: &[],
            })
    }

    #[tokio::test]
    async fn test_outputs_flow_between_steps() {
        let api = Arc::new(MemoryApi::new("test"));
        let report = three_steps(&api).execute().await.unwrap();

        assert_eq!(report.steps.len(), 3);
        assert_eq!(report.summary().create, 3);

        let dist = api
            .state(&ResourceRef::new(ResourceKind::Distribution, "site"))
            .unwrap();
        assert_eq!(
            dist.get_str("bucket"),
            report.outputs.get("bucket")
        );
    }

    #[tokio::test]
    async fn test_validate_rejects_missing_dependency() {
        let api = Arc::new(MemoryApi::new("test"));
        let run = ProvisioningRun::new("test").step(ResourceStep {
            name: "dns",
            api: api.clone(),
            kind: ResourceKind::DnsRecord,
            key: "ALIAS:docs.example.com",
            requires: &["distribution"],
            provides: &[],
        });

        let failure = run.execute().await.unwrap_err();
        assert_eq!(failure.step, "dns");
        assert!(matches!(failure.error, CloudError::MissingOutput(_)));
        assert_eq!(api.count(Operation::Get), 0);
    }

    #[tokio::test]
    async fn test_initial_outputs_satisfy_requirements() {
        let api = Arc::new(MemoryApi::new("test"));
        let run = ProvisioningRun::new("test")
            .with_outputs(Outputs::new().with("distribution", "E123"))
            .step(ResourceStep {
                name: "dns",
                api: api.clone(),
                kind: ResourceKind::DnsRecord,
                key: "ALIAS:docs.example.com",
                requires: &["distribution"],
                provides: &[],
            });

        assert!(run.validate().is_ok());
        run.execute().await.unwrap();
    }

    #[tokio::test]
    async fn test_fail_fast_then_resume() {
        let api = Arc::new(MemoryApi::new("test"));
        let dist = ResourceRef::new(ResourceKind::Distribution, "site");
        api.fail_next(Operation::Create, &dist, Fault::PermissionDenied);

        let failure = three_steps(&api).execute().await.unwrap_err();
        assert_eq!(failure.step, "distribution");
        assert_eq!(failure.resource.as_deref(), Some("distribution:site"));
        assert_eq!(failure.completed, vec!["bucket".to_string()]);
        assert!(failure.outputs.contains("bucket"));
        // the dns step never ran
        assert_eq!(
            api.count_for(
                Operation::Get,
                &ResourceRef::new(ResourceKind::DnsRecord, "ALIAS:docs.example.com")
            ),
            0
        );

        api.reset_calls();
        let report = three_steps(&api).execute().await.unwrap();
        let actions: Vec<ActionType> = report.actions().map(|a| a.action).collect();
        assert_eq!(
            actions,
            vec![ActionType::NoOp, ActionType::Create, ActionType::Create]
        );
        assert_eq!(
            api.count_for(
                Operation::Create,
                &ResourceRef::new(ResourceKind::Bucket, "site-assets")
            ),
            0
        );
    }

    #[tokio::test]
    async fn test_failure_display_names_step_and_resource() {
        let api = Arc::new(MemoryApi::new("test"));
        api.fail_next(
            Operation::Create,
            &ResourceRef::new(ResourceKind::Bucket, "site-assets"),
            Fault::Ownership,
        );

        let failure = three_steps(&api).execute().await.unwrap_err();
        let message = failure.to_string();
        assert!(message.contains("step `bucket`"));
        assert!(message.contains("bucket:site-assets"));
        assert!(failure.completed.is_empty());
    }
}
