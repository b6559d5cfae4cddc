//! SiteLock provisioning core
//!
//! Idempotent, multi-resource provisioning of a private static website:
//! storage bucket, content-delivery distribution, DNS alias, TLS certificate
//! and access restriction.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  sitelock CLI                    │
//! │     (provision / teardown / lock / unlock ...)   │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                sitelock-cloud                    │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  site steps  ->  ProvisioningRun          │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │  Reconciler  │  │   Waiter     │            │
//! │  └──────────────┘  └──────────────┘            │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │       trait ResourceApi { ... }          │   │
//! │  └──────────────────────────────────────────┘   │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │  aws backend  │ │  cloudflare   │
//! │  (aws CLI)    │ │  DNS backend  │
//! └───────────────┘ └───────────────┘
//! ```

pub mod access;
pub mod api;
pub mod certificate;
pub mod error;
pub mod memory;
pub mod model;
pub mod outcome;
pub mod pipeline;
pub mod reconcile;
pub mod runlog;
pub mod site;
pub mod waiter;

// Re-exports
pub use access::{AccessChange, AccessPolicy, AccessStrategy, AllowList, SourceRule};
pub use api::{AuthStatus, Identities, Identity, ResourceApi};
pub use certificate::{CertificateLifecycle, CertificateStatus, ValidationRecord};
pub use error::{CloudError, Result};
pub use memory::MemoryApi;
pub use model::{
    AttributeDrift, Ownership, ResourceKind, ResourceRef, ResourceSpec, ResourceState,
    ResourceStatus,
};
pub use outcome::{ActionType, Outputs, ResourceAction, RunReport, RunSummary, StepRecord};
pub use pipeline::{PipelineStep, ProvisioningRun, RunFailure, StepContext};
pub use reconcile::{Reconciled, Reconciler};
pub use runlog::{RunEvent, RunLog};
pub use site::{Backends, CacheTtl, SiteSettings, TeardownOptions};
pub use waiter::{WaitPolicy, await_attribute, await_status};
