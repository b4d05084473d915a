//! Group CRD

use crate::crd::{default_true, ResourceSpec, ResourceStatus};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A Cloudian group. Optional fields left unset are not managed.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "user.cloudian.crossplane.io",
    version = "v1alpha1",
    kind = "Group",
    plural = "groups",
    status = "GroupStatus",
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
pub struct GroupSpec {
    #[serde(flatten)]
    pub resource: ResourceSpec,

    pub for_provider: GroupParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupParameters {
    /// Whether the group is active
    #[serde(default = "default_true")]
    pub active: bool,

    /// Group id, immutable after creation
    pub group_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldap_enabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldap_group: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldap_match_attribute: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldap_search: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ldap_search_user_base: Option<String>,

    #[serde(default, rename = "ldapServerURL", skip_serializing_if = "Option::is_none")]
    pub ldap_server_url: Option<String>,

    #[serde(default, rename = "ldapUserDNTemplate", skip_serializing_if = "Option::is_none")]
    pub ldap_user_dn_template: Option<String>,
}

impl GroupParameters {
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            active: true,
            group_id: group_id.into(),
            group_name: None,
            ldap_enabled: None,
            ldap_group: None,
            ldap_match_attribute: None,
            ldap_search: None,
            ldap_search_user_base: None,
            ldap_server_url: None,
            ldap_user_dn_template: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupStatus {
    #[serde(flatten)]
    pub resource: ResourceStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_group_spec() {
        let spec: GroupSpec = serde_json::from_value(serde_json::json!({
            "forProvider": {"groupId": "QA"}
        }))
        .unwrap();

        assert_eq!(spec.for_provider, GroupParameters::new("QA"));
        assert_eq!(spec.resource.provider_config_ref.name, "default");
    }

    #[test]
    fn test_ldap_fields_use_api_casing() {
        let spec: GroupSpec = serde_json::from_value(serde_json::json!({
            "forProvider": {
                "groupId": "QA",
                "active": false,
                "ldapServerURL": "ldaps://ldap",
                "ldapUserDNTemplate": "uid={user},ou=people"
            }
        }))
        .unwrap();

        assert!(!spec.for_provider.active);
        assert_eq!(spec.for_provider.ldap_server_url.as_deref(), Some("ldaps://ldap"));
        assert_eq!(
            spec.for_provider.ldap_user_dn_template.as_deref(),
            Some("uid={user},ou=people")
        );
    }
}
