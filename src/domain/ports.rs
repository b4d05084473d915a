//! Domain Ports - Core trait definitions for the provider
//!
//! These traits define the boundary between the generic reconciler and the
//! per-kind logic that talks to Cloudian. Each managed kind implements
//! [`ManagedResource`] and provides an [`ExternalClient`].

use crate::cloudian::{self, Secret};
use crate::crd::{Condition, ResourceSpec};
use crate::error::Result;
use async_trait::async_trait;
use kube::core::ClusterResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Connection details published to `writeConnectionSecretToRef`.
pub type ConnectionDetails = BTreeMap<String, Secret>;

// =============================================================================
// External Client
// =============================================================================

/// Result of observing the external resource.
#[derive(Debug, Clone, Default)]
pub struct ExternalObservation {
    /// Whether the external resource exists
    pub resource_exists: bool,
    /// Whether it matches the desired state; meaningless when absent
    pub resource_up_to_date: bool,
    /// Human readable difference, one `field: -desired +observed` per line
    pub diff: String,
    /// Value for `status.atProvider`, if the kind records an observation
    pub at_provider: Option<serde_json::Value>,
    /// Connection details of the existing resource, published on every observe
    pub connection_details: ConnectionDetails,
}

impl ExternalObservation {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn up_to_date() -> Self {
        Self {
            resource_exists: true,
            resource_up_to_date: true,
            ..Default::default()
        }
    }

    /// An existing resource with the outcome of an `is_up_to_date` check
    pub fn compared((up_to_date, diff): (bool, String)) -> Self {
        Self {
            resource_exists: true,
            resource_up_to_date: up_to_date,
            diff,
            ..Default::default()
        }
    }

    pub fn with_at_provider(mut self, at_provider: serde_json::Value) -> Self {
        self.at_provider = Some(at_provider);
        self
    }

    pub fn with_connection_details(mut self, connection_details: ConnectionDetails) -> Self {
        self.connection_details = connection_details;
        self
    }
}

/// Result of creating the external resource.
#[derive(Debug, Clone, Default)]
pub struct ExternalCreation {
    /// External name to record on the managed resource
    pub external_name: Option<String>,
    pub connection_details: ConnectionDetails,
}

/// Observe, create, update and delete the external counterpart of `K`.
#[async_trait]
pub trait ExternalClient<K>: Send + Sync {
    async fn observe(&self, resource: &K) -> Result<ExternalObservation>;

    async fn create(&self, resource: &K) -> Result<ExternalCreation>;

    async fn update(&self, resource: &K) -> Result<()>;

    async fn delete(&self, resource: &K) -> Result<()>;
}

// =============================================================================
// Managed Resource
// =============================================================================

/// A cluster scoped custom resource reconciled against Cloudian.
pub trait ManagedResource:
    Resource<DynamicType = (), Scope = ClusterResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    fn resource_spec(&self) -> &ResourceSpec;

    /// Current status conditions, empty when there is no status yet.
    fn conditions(&self) -> &[Condition];

    /// Build the external client for this kind.
    fn external(client: cloudian::Client) -> Box<dyn ExternalClient<Self>>;
}
