//! User CRD
//!
//! The user id is the external name of the object, defaulting to its
//! `metadata.name`.

use crate::cloudian::UserType;
use crate::crd::{ResourceSpec, ResourceStatus};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A Cloudian user within a group.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "user.cloudian.crossplane.io",
    version = "v1alpha1",
    kind = "User",
    plural = "users",
    status = "UserStatus",
    category = "crossplane",
    category = "managed",
    category = "cloudian",
    printcolumn = r#"{"name": "Group ID", "type": "string", "jsonPath": ".spec.forProvider.groupId"}"#,
    printcolumn = r#"{"name": "External Name", "type": "string", "jsonPath": ".metadata.annotations.crossplane\\.io/external-name"}"#,
    printcolumn = r#"{"name": "Ready", "type": "string", "jsonPath": ".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name": "Synced", "type": "string", "jsonPath": ".status.conditions[?(@.type=='Synced')].status"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct UserSpec {
    #[serde(flatten)]
    pub resource: ResourceSpec,

    pub for_provider: UserParameters,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserParameters {
    /// Group the user belongs to, immutable after creation
    pub group_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_type: Option<UserType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_addr: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserObservation {
    /// Canonical id assigned by Cloudian
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_user_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    #[serde(flatten)]
    pub resource: ResourceStatus,

    #[serde(default)]
    pub at_provider: UserObservation,
}
