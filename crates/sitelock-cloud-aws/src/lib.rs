//! AWS backend for SiteLock
//!
//! Implements [`sitelock_cloud::ResourceApi`] on top of the `aws` CLI:
//!
//! - S3 buckets and bucket policies
//! - CloudFront distributions and origin access controls
//! - WAFv2 IP sets and web ACLs (CLOUDFRONT scope)
//! - Route 53 record sets
//! - ACM certificates
//!
//! # Requirements
//!
//! - `aws` CLI v2 installed and on `PATH`
//! - A named profile per account boundary (or the default credential chain)
//!
//! # Example
//!
//! ```ignore
//! use sitelock_cloud::{Identity, ResourceApi};
//! use sitelock_cloud_aws::AwsResourceApi;
//!
//! let api = AwsResourceApi::new(&Identity::profile("site-admin"), "ap-northeast-1");
//! let auth = api.check_auth().await?;
//! ```

pub mod acm;
pub mod cli;
pub mod cloudfront;
pub mod error;
pub mod provider;
pub mod route53;
pub mod s3;
pub mod waf;

pub use cli::{AwsCli, CallerIdentity, GLOBAL_REGION};
pub use error::{AwsError, Result};
pub use provider::AwsResourceApi;

use sitelock_cloud::ResourceState;

/// Merge a typed attribute struct into an observed state
pub(crate) fn merge_attributes<T: serde::Serialize>(
    state: &mut ResourceState,
    attrs: &T,
) -> Result<()> {
    if let serde_json::Value::Object(map) = serde_json::to_value(attrs)? {
        state.attributes.extend(map);
    }
    Ok(())
}
