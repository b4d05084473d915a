//! Custom Resource Definitions for the Cloudian provider
//!
//! This module contains all CRD types:
//! - ProviderConfig: where the Cloudian admin API lives and how to authenticate
//! - Group, User, AccessKey: S3 tenants, their users and access keys
//! - GroupQualityOfServiceLimits, UserQualityOfServiceLimits: QoS limits
//!
//! Managed resources share the crossplane resource model: a [`ResourceSpec`]
//! flattened into every spec and a list of [`Condition`]s in every status.

pub mod access_key;
pub mod group;
pub mod provider_config;
pub mod quality_of_service;
pub mod user;

pub use access_key::*;
pub use group::*;
pub use provider_config::*;
pub use quality_of_service::*;
pub use user::*;

use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::ObjectMeta;
use kube::CustomResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Annotation holding the identity of the external resource.
pub const EXTERNAL_NAME_ANNOTATION: &str = "crossplane.io/external-name";

/// Set right before the external resource is created.
pub const EXTERNAL_CREATE_PENDING_ANNOTATION: &str = "crossplane.io/external-create-pending";

/// Set together with the external name once creation succeeded.
pub const EXTERNAL_CREATE_SUCCEEDED_ANNOTATION: &str = "crossplane.io/external-create-succeeded";

/// Set when Cloudian rejected the creation.
pub const EXTERNAL_CREATE_FAILED_ANNOTATION: &str = "crossplane.io/external-create-failed";

/// Finalizer guarding deletion of the external resource.
pub const FINALIZER: &str = "cloudian.crossplane.io/finalizer";

/// API group of the managed resources
pub const MANAGED_GROUP: &str = "user.cloudian.crossplane.io";

// =============================================================================
// Resource Spec
// =============================================================================

/// Fields shared by every managed resource spec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    /// ProviderConfig used to reach Cloudian
    #[serde(default)]
    pub provider_config_ref: ProviderConfigReference,

    /// What happens to the external resource when this object is deleted
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,

    /// Secret that receives connection details, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_connection_secret_to_ref: Option<SecretReference>,
}

/// Reference to a cluster scoped ProviderConfig
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProviderConfigReference {
    #[serde(default = "default_provider_config")]
    pub name: String,
}

impl Default for ProviderConfigReference {
    fn default() -> Self {
        Self {
            name: default_provider_config(),
        }
    }
}

fn default_provider_config() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum DeletionPolicy {
    /// Delete the external resource together with this object
    #[default]
    Delete,
    /// Leave the external resource in place
    Orphan,
}

/// Reference to a namespaced Secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SecretReference {
    pub name: String,
    pub namespace: String,
}

// =============================================================================
// Resource Status
// =============================================================================

/// Fields shared by every managed resource status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Condition type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionType {
    /// The external resource is usable
    Ready,
    /// The last reconcile reached Cloudian successfully
    Synced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ConditionReason {
    Available,
    Creating,
    Deleting,
    ReconcileSuccess,
    ReconcileError,
}

impl std::fmt::Display for ConditionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionReason::Available => write!(f, "Available"),
            ConditionReason::Creating => write!(f, "Creating"),
            ConditionReason::Deleting => write!(f, "Deleting"),
            ConditionReason::ReconcileSuccess => write!(f, "ReconcileSuccess"),
            ConditionReason::ReconcileError => write!(f, "ReconcileError"),
        }
    }
}

/// A crossplane style status condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    pub reason: ConditionReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[schemars(with = "String")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    fn new(type_: ConditionType, status: ConditionStatus, reason: ConditionReason) -> Self {
        Self {
            type_,
            status,
            reason,
            message: None,
            last_transition_time: Utc::now(),
        }
    }

    pub fn available() -> Self {
        Self::new(ConditionType::Ready, ConditionStatus::True, ConditionReason::Available)
    }

    pub fn creating() -> Self {
        Self::new(ConditionType::Ready, ConditionStatus::False, ConditionReason::Creating)
    }

    pub fn deleting() -> Self {
        Self::new(ConditionType::Ready, ConditionStatus::False, ConditionReason::Deleting)
    }

    pub fn reconcile_success() -> Self {
        Self::new(
            ConditionType::Synced,
            ConditionStatus::True,
            ConditionReason::ReconcileSuccess,
        )
    }

    pub fn reconcile_error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(
                ConditionType::Synced,
                ConditionStatus::False,
                ConditionReason::ReconcileError,
            )
        }
    }

    /// Same type, status, reason and message, ignoring the timestamp.
    pub fn equivalent(&self, other: &Condition) -> bool {
        self.type_ == other.type_
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Set `condition` in `conditions`, replacing any condition of the same type.
/// An equivalent condition keeps its original transition time.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) if existing.equivalent(&condition) => {}
        Some(existing) => *existing = condition,
        None => conditions.push(condition),
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// The external name annotation of an object, if set and not empty.
pub fn external_name(meta: &ObjectMeta) -> Option<&str> {
    meta.annotations
        .as_ref()
        .and_then(|a| a.get(EXTERNAL_NAME_ANNOTATION))
        .map(String::as_str)
        .filter(|name| !name.is_empty())
}

/// Render a time for the external create annotations.
pub fn annotation_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn annotation_time(meta: &ObjectMeta, key: &str) -> Option<DateTime<Utc>> {
    let value = meta.annotations.as_ref()?.get(key)?;
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|time| time.with_timezone(&Utc))
}

/// Whether a creation was started but its outcome never recorded.
///
/// True when the pending annotation is newer than both the succeeded and the
/// failed annotation. The external resource may then exist without anything
/// pointing at it, so it must not be created again.
pub fn create_incomplete(meta: &ObjectMeta) -> bool {
    let Some(pending) = annotation_time(meta, EXTERNAL_CREATE_PENDING_ANNOTATION) else {
        return false;
    };
    let settled = |key| annotation_time(meta, key).is_some_and(|time| time >= pending);

    !settled(EXTERNAL_CREATE_SUCCEEDED_ANNOTATION) && !settled(EXTERNAL_CREATE_FAILED_ANNOTATION)
}

/// Every CRD served by the provider
pub fn crds() -> Vec<CustomResourceDefinition> {
    vec![
        ProviderConfig::crd(),
        Group::crd(),
        User::crd(),
        AccessKey::crd(),
        GroupQualityOfServiceLimits::crd(),
        UserQualityOfServiceLimits::crd(),
    ]
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_resource_spec_defaults() {
        let spec: ResourceSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(spec.provider_config_ref.name, "default");
        assert_eq!(spec.deletion_policy, DeletionPolicy::Delete);
        assert!(spec.write_connection_secret_to_ref.is_none());

        let spec: ResourceSpec = serde_json::from_value(serde_json::json!({
            "providerConfigRef": {"name": "lab"},
            "deletionPolicy": "Orphan",
            "writeConnectionSecretToRef": {"name": "creds", "namespace": "team-a"}
        }))
        .unwrap();
        assert_eq!(spec.provider_config_ref.name, "lab");
        assert_eq!(spec.deletion_policy, DeletionPolicy::Orphan);
        assert_eq!(spec.write_connection_secret_to_ref.unwrap().namespace, "team-a");
    }

    #[test]
    fn test_set_condition_replaces_by_type() {
        let mut conditions = vec![Condition::creating(), Condition::reconcile_success()];

        set_condition(&mut conditions, Condition::available());
        set_condition(&mut conditions, Condition::reconcile_error("boom"));

        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].reason, ConditionReason::Available);
        assert_eq!(conditions[1].reason, ConditionReason::ReconcileError);
        assert_eq!(conditions[1].message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_set_condition_keeps_transition_time() {
        let mut first = Condition::available();
        first.last_transition_time = DateTime::<Utc>::MIN_UTC;
        let mut conditions = vec![first];

        set_condition(&mut conditions, Condition::available());

        assert_eq!(conditions[0].last_transition_time, DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn test_external_name() {
        let mut meta = ObjectMeta::default();
        assert_eq!(external_name(&meta), None);

        meta.annotations = Some(BTreeMap::from([(
            EXTERNAL_NAME_ANNOTATION.to_string(),
            String::new(),
        )]));
        assert_eq!(external_name(&meta), None);

        meta.annotations = Some(BTreeMap::from([(
            EXTERNAL_NAME_ANNOTATION.to_string(),
            "alice".to_string(),
        )]));
        assert_eq!(external_name(&meta), Some("alice"));
    }

    fn annotated(annotations: &[(&str, DateTime<Utc>)]) -> ObjectMeta {
        ObjectMeta {
            annotations: Some(
                annotations
                    .iter()
                    .map(|(key, time)| (key.to_string(), annotation_timestamp(*time)))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_incomplete() {
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::milliseconds(1);

        assert!(!create_incomplete(&ObjectMeta::default()));
        assert!(create_incomplete(&annotated(&[(EXTERNAL_CREATE_PENDING_ANNOTATION, later)])));

        // Outcome recorded after the pending mark
        assert!(!create_incomplete(&annotated(&[
            (EXTERNAL_CREATE_PENDING_ANNOTATION, earlier),
            (EXTERNAL_CREATE_SUCCEEDED_ANNOTATION, later),
        ])));
        assert!(!create_incomplete(&annotated(&[
            (EXTERNAL_CREATE_PENDING_ANNOTATION, earlier),
            (EXTERNAL_CREATE_FAILED_ANNOTATION, earlier),
        ])));

        // A newer attempt whose outcome is unknown
        assert!(create_incomplete(&annotated(&[
            (EXTERNAL_CREATE_SUCCEEDED_ANNOTATION, earlier),
            (EXTERNAL_CREATE_PENDING_ANNOTATION, later),
        ])));
    }

    #[test]
    fn test_unparsable_pending_annotation_is_ignored() {
        let meta = ObjectMeta {
            annotations: Some(BTreeMap::from([(
                EXTERNAL_CREATE_PENDING_ANNOTATION.to_string(),
                "yesterday".to_string(),
            )])),
            ..Default::default()
        };
        assert!(!create_incomplete(&meta));
    }

    #[test]
    fn test_managed_crds_show_external_name() {
        for crd in &crds()[1..] {
            let columns = crd.spec.versions[0]
                .additional_printer_columns
                .clone()
                .unwrap_or_default();
            assert!(
                columns
                    .iter()
                    .any(|c| c.json_path == ".metadata.annotations.crossplane\\.io/external-name"),
                "{}",
                crd.spec.names.kind
            );
        }
    }

    #[test]
    fn test_crds_are_cluster_scoped() {
        for crd in crds() {
            assert_eq!(crd.spec.scope, "Cluster", "{}", crd.spec.names.kind);
        }
        let groups: Vec<String> = crds().into_iter().map(|c| c.spec.group).collect();
        assert_eq!(groups[0], "cloudian.crossplane.io");
        assert!(groups[1..].iter().all(|g| g == MANAGED_GROUP));
    }
}
