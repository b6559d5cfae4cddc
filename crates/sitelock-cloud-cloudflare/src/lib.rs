//! Cloudflare DNS backend for SiteLock
//!
//! Serves the DNS boundary of a site when its zone lives on Cloudflare
//! while storage and CDN stay on AWS. Only `dns-record` resources are
//! accepted; aliases are written as (apex-flattened) CNAME records.
//!
//! # Requirements
//!
//! - A zone id
//! - An API token with `Zone.DNS:Edit`, read from `CLOUDFLARE_API_TOKEN`
//!   or another configured variable
//!
//! # Example
//!
//! ```ignore
//! use sitelock_cloud_cloudflare::{CloudflareDnsApi, DnsConfig};
//!
//! let config = DnsConfig::from_env("023e105f4ecef8ad9ca31a8372d0c353", None)?;
//! let api = CloudflareDnsApi::new(config);
//! ```

pub mod dns;
pub mod error;
pub mod provider;

pub use dns::{CloudflareDns, DnsConfig};
pub use error::{CloudflareError, Result};
pub use provider::CloudflareDnsApi;
