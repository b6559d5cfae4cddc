//! In-memory Resource API
//!
//! Simulates a control plane: generated identifiers, version tokens,
//! asynchronous status transitions and injected faults. Used by the test
//! suites and by `sitelock --simulate` to rehearse a pipeline without
//! touching a real account.

use crate::api::{AuthStatus, ResourceApi};
use crate::error::{CloudError, Result};
use crate::model::{ResourceKind, ResourceRef, ResourceSpec, ResourceState, ResourceStatus};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

/// Resource API operation, for call accounting and fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Create,
    Update,
    Delete,
    Status,
}

/// Injectable failure
#[derive(Debug, Clone)]
pub enum Fault {
    PermissionDenied,
    Ownership,
    Api(String),
}

impl Fault {
    fn to_error(&self, resource: &ResourceRef) -> CloudError {
        match self {
            Fault::PermissionDenied => CloudError::PermissionDenied(resource.to_string()),
            Fault::Ownership => CloudError::Ownership(resource.to_string()),
            Fault::Api(message) => CloudError::Api(format!("{}: {}", resource, message)),
        }
    }
}

#[derive(Default)]
struct Inner {
    resources: BTreeMap<ResourceRef, ResourceState>,
    calls: Vec<(Operation, ResourceRef)>,
    next_id: u64,
    next_version: u64,
    /// Successive statuses reported by `get_status`
    status_scripts: HashMap<ResourceRef, VecDeque<ResourceStatus>>,
    /// Status a kind lands in after create/update
    settle_status: HashMap<ResourceKind, ResourceStatus>,
    /// Remaining updates that will see a concurrent writer
    stale_updates: HashMap<ResourceRef, u32>,
    /// State another writer inserts right before our create
    racing_creates: HashMap<ResourceRef, ResourceState>,
    faults: HashMap<(Operation, ResourceRef), Fault>,
}

impl Inner {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        format!("v{}", self.next_version)
    }

    fn generate_id(&mut self, kind: ResourceKind) -> String {
        self.next_id += 1;
        format!("{}-{:04}", kind.as_str().replace('-', ""), self.next_id)
    }

    fn take_fault(&mut self, op: Operation, resource: &ResourceRef) -> Result<()> {
        match self.faults.remove(&(op, resource.clone())) {
            Some(fault) => Err(fault.to_error(resource)),
            None => Ok(()),
        }
    }
}

/// In-memory control plane
pub struct MemoryApi {
    name: String,
    inner: Mutex<Inner>,
}

impl MemoryApi {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means a test panicked mid-call; the data is
        // still usable for the remaining assertions.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed an existing resource
    pub fn insert(&self, state: ResourceState) {
        let mut inner = self.lock();
        inner.resources.insert(state.resource_ref(), state);
    }

    /// Current stored state, without recording a call
    pub fn state(&self, resource: &ResourceRef) -> Option<ResourceState> {
        self.lock().resources.get(resource).cloned()
    }

    /// Script the statuses `get_status` reports for a resource, one per poll.
    /// Once exhausted the stored status is reported.
    pub fn script_status(
        &self,
        resource: &ResourceRef,
        statuses: impl IntoIterator<Item = ResourceStatus>,
    ) {
        self.lock()
            .status_scripts
            .insert(resource.clone(), statuses.into_iter().collect());
    }

    /// Status resources of `kind` land in after a create or update
    pub fn settle_as(&self, kind: ResourceKind, status: ResourceStatus) {
        self.lock().settle_status.insert(kind, status);
    }

    /// The next `count` updates of `resource` race a concurrent writer and
    /// present a stale token
    pub fn stale_updates(&self, resource: &ResourceRef, count: u32) {
        self.lock().stale_updates.insert(resource.clone(), count);
    }

    /// Another writer creates `state` right before our next create call
    pub fn race_create(&self, state: ResourceState) {
        let mut inner = self.lock();
        inner.racing_creates.insert(state.resource_ref(), state);
    }

    /// Fail the next `op` on `resource`
    pub fn fail_next(&self, op: Operation, resource: &ResourceRef, fault: Fault) {
        self.lock().faults.insert((op, resource.clone()), fault);
    }

    /// Number of calls of `op` across all resources
    pub fn count(&self, op: Operation) -> usize {
        self.lock().calls.iter().filter(|(o, _)| *o == op).count()
    }

    /// Number of calls of `op` on one resource
    pub fn count_for(&self, op: Operation, resource: &ResourceRef) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|(o, r)| *o == op && r == resource)
            .count()
    }

    /// Number of create, update and delete calls
    pub fn write_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|(o, _)| matches!(o, Operation::Create | Operation::Update | Operation::Delete))
            .count()
    }

    pub fn reset_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn resources(&self) -> Vec<ResourceState> {
        self.lock().resources.values().cloned().collect()
    }
}

/// Identifiers the real control plane would generate for a new resource
fn generated_attributes(state: &mut ResourceState, id: &str) {
    state.set_attribute(
        "arn",
        json!(format!("arn:memory:{}:{}", state.kind, state.key)),
    );
    match state.kind {
        ResourceKind::Distribution => {
            state.set_attribute("domain_name", json!(format!("{}.cloudfront.test", id)));
        }
        ResourceKind::Certificate => {
            let record = json!({
                "name": format!("_{}.{}.", id, state.key),
                "record_type": "CNAME",
                "value": format!("_{}.validations.test.", id),
            });
            state.set_attribute("validation_records", json!([record]));
        }
        _ => {}
    }
}

#[async_trait]
impl ResourceApi for MemoryApi {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check_auth(&self) -> Result<AuthStatus> {
        Ok(AuthStatus::ok(format!("memory ({})", self.name)))
    }

    async fn get(&self, resource: &ResourceRef) -> Result<Option<ResourceState>> {
        let mut inner = self.lock();
        inner.calls.push((Operation::Get, resource.clone()));
        inner.take_fault(Operation::Get, resource)?;
        Ok(inner.resources.get(resource).cloned())
    }

    async fn create(&self, spec: &ResourceSpec) -> Result<ResourceState> {
        let resource = spec.resource_ref();
        let mut inner = self.lock();
        inner.calls.push((Operation::Create, resource.clone()));
        inner.take_fault(Operation::Create, &resource)?;

        if let Some(racing) = inner.racing_creates.remove(&resource) {
            inner.resources.insert(resource.clone(), racing);
        }
        if inner.resources.contains_key(&resource) {
            return Err(CloudError::AlreadyExists(resource.to_string()));
        }

        let id = inner.generate_id(spec.kind);
        let version = inner.bump_version();
        let status = inner
            .settle_status
            .get(&spec.kind)
            .copied()
            .unwrap_or(ResourceStatus::Deployed);

        let mut state = ResourceState::present(spec.kind, spec.key.clone())
            .with_status(status)
            .with_id(id.clone())
            .with_version(version);
        state.attributes = spec.attributes.clone();
        generated_attributes(&mut state, &id);

        inner.resources.insert(resource, state.clone());
        Ok(state)
    }

    async fn update(&self, spec: &ResourceSpec, version: Option<&str>) -> Result<ResourceState> {
        let resource = spec.resource_ref();
        let mut inner = self.lock();
        inner.calls.push((Operation::Update, resource.clone()));
        inner.take_fault(Operation::Update, &resource)?;

        let racing = match inner.stale_updates.get_mut(&resource) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        if racing {
            let concurrent = inner.bump_version();
            if let Some(current) = inner.resources.get_mut(&resource) {
                current.version = Some(concurrent);
            }
        }

        let settle = inner.settle_status.get(&spec.kind).copied();
        let next_version = inner.bump_version();
        let current = inner
            .resources
            .get_mut(&resource)
            .ok_or_else(|| CloudError::NotFound(resource.to_string()))?;

        if current.version.as_deref() != version {
            return Err(CloudError::Conflict(resource.to_string()));
        }

        for (name, value) in &spec.attributes {
            current.attributes.insert(name.clone(), value.clone());
        }
        current.version = Some(next_version);
        if let Some(status) = settle {
            current.status = status;
        }
        Ok(current.clone())
    }

    async fn delete(&self, resource: &ResourceRef) -> Result<bool> {
        let mut inner = self.lock();
        inner.calls.push((Operation::Delete, resource.clone()));
        inner.take_fault(Operation::Delete, resource)?;
        Ok(inner.resources.remove(resource).is_some())
    }

    async fn get_status(&self, resource: &ResourceRef) -> Result<ResourceStatus> {
        let mut inner = self.lock();
        inner.calls.push((Operation::Status, resource.clone()));
        inner.take_fault(Operation::Status, resource)?;

        let scripted = inner
            .status_scripts
            .get_mut(resource)
            .and_then(|queue| queue.pop_front());

        match (scripted, inner.resources.get_mut(resource)) {
            (Some(status), Some(state)) => {
                state.status = status;
                Ok(status)
            }
            (Some(status), None) => Ok(status),
            (None, Some(state)) => Ok(state.status),
            (None, None) => Ok(ResourceStatus::Absent),
        }
    }
}
