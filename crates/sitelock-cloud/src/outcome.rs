//! Action and run outcome types

use crate::model::ResourceRef;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// What a reconciliation did to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Created a new resource
    Create,
    /// Updated an existing resource
    Update,
    /// Deleted a resource
    Delete,
    /// No changes needed
    NoOp,
}

impl ActionType {
    pub fn is_write(&self) -> bool {
        !matches!(self, ActionType::NoOp)
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Action applied to one resource during a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAction {
    pub resource: ResourceRef,
    pub action: ActionType,
}

impl ResourceAction {
    pub fn new(resource: ResourceRef, action: ActionType) -> Self {
        Self { resource, action }
    }
}

/// Resource identifiers produced by earlier steps, keyed by output name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outputs(BTreeMap<String, String>);

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    /// Output value, failing with `MissingOutput` when no step produced it
    pub fn require(&self, key: &str) -> crate::Result<&str> {
        self.get(key)
            .ok_or_else(|| crate::CloudError::MissingOutput(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Record of one completed pipeline step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: String,
    pub actions: Vec<ResourceAction>,
    pub duration_ms: u64,
}

/// Result of a successful provisioning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,

    /// Completed steps in execution order
    pub steps: Vec<StepRecord>,

    /// Accumulated outputs
    pub outputs: Outputs,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl RunReport {
    pub fn actions(&self) -> impl Iterator<Item = &ResourceAction> {
        self.steps.iter().flat_map(|s| s.actions.iter())
    }

    /// Whether any remote resource was written
    pub fn has_changes(&self) -> bool {
        self.actions().any(|a| a.action.is_write())
    }

    fn count(&self, action_type: ActionType) -> usize {
        self.actions().filter(|a| a.action == action_type).count()
    }

    /// Summary of the run
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            create: self.count(ActionType::Create),
            update: self.count(ActionType::Update),
            delete: self.count(ActionType::Delete),
            no_change: self.count(ActionType::NoOp),
        }
    }
}

/// Summary of applied actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} deleted, {} unchanged",
            self.create, self.update, self.delete, self.no_change
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceKind;

    #[test]
    fn test_summary_counts() {
        let report = RunReport {
            run_id: Uuid::new_v4(),
            steps: vec![
                StepRecord {
                    step: "bucket".into(),
                    actions: vec![ResourceAction::new(
                        ResourceRef::new(ResourceKind::Bucket, "site-assets"),
                        ActionType::Create,
                    )],
                    duration_ms: 10,
                },
                StepRecord {
                    step: "origin-access".into(),
                    actions: vec![ResourceAction::new(
                        ResourceRef::new(ResourceKind::OriginAccessControl, "site-assets-oac"),
                        ActionType::NoOp,
                    )],
                    duration_ms: 3,
                },
            ],
            outputs: Outputs::new(),
            duration_ms: 13,
        };

        let summary = report.summary();
        assert_eq!(summary.create, 1);
        assert_eq!(summary.no_change, 1);
        assert!(report.has_changes());
        assert_eq!(
            summary.to_string(),
            "1 created, 0 updated, 0 deleted, 1 unchanged"
        );
    }

    #[test]
    fn test_outputs_require() {
        let outputs = Outputs::new().with("bucket.name", "site-assets");
        assert_eq!(outputs.require("bucket.name").unwrap(), "site-assets");
        assert!(matches!(
            outputs.require("distribution.id"),
            Err(crate::CloudError::MissingOutput(_))
        ));
    }
}
