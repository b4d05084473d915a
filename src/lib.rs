//! Cloudian HyperStore provider
//!
//! A Kubernetes controller that manages Cloudian HyperStore groups, users,
//! S3 access keys and quality of service limits as cluster scoped custom
//! resources.
//!
//! # Modules
//!
//! - [`cloudian`]: Typed client for the HyperStore admin API
//! - [`crd`]: Custom Resource Definitions
//! - [`controlplane`]: External clients and the generic reconciler
//! - [`domain`]: Traits shared by every managed kind
//! - [`error`]: Error types and handling

pub mod cloudian;
pub mod controlplane;
pub mod crd;
pub mod domain;
pub mod error;

pub use controlplane::{Context, ControllerConfig, Metrics};
pub use domain::ports::{ExternalClient, ManagedResource};
pub use error::{Error, ErrorAction, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
