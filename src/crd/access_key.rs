//! AccessKey CRD
//!
//! The access key id is assigned by Cloudian on creation and recorded as the
//! external name. The key pair is published through
//! `writeConnectionSecretToRef`.

use crate::crd::{ResourceSpec, ResourceStatus};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// An S3 access key of a Cloudian user.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "user.cloudian.crossplane.io",
    version = "v1alpha1",
    kind = "AccessKey",
    plural = "accesskeys",
    status = "AccessKeyStatus",
    category = "crossplane",
    category = "managed",
    category = "cloudian",
    printcolumn = r#"{"name": "User ID", "type": "string", "jsonPath": ".spec.forProvider.userId"}"#,
    printcolumn = r#"{"name": "External Name", "type": "string", "jsonPath": ".metadata.annotations.crossplane\\.io/external-name"}"#,
    printcolumn = r#"{"name": "Ready", "type": "string", "jsonPath": ".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name": "Synced", "type": "string", "jsonPath": ".status.conditions[?(@.type=='Synced')].status"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeySpec {
    #[serde(flatten)]
    pub resource: ResourceSpec,

    pub for_provider: AccessKeyParameters,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyParameters {
    pub group_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AccessKeyObservation {
    /// Access key id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessKeyStatus {
    #[serde(flatten)]
    pub resource: ResourceStatus,

    #[serde(default)]
    pub at_provider: AccessKeyObservation,
}
