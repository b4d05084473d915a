//! ProviderConfig CRD
//!
//! Points managed resources at a Cloudian admin API and the Secret holding
//! the `Authorization` header used against it.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Connection settings for a Cloudian HyperStore admin API.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "cloudian.crossplane.io",
    version = "v1alpha1",
    kind = "ProviderConfig",
    plural = "providerconfigs",
    printcolumn = r#"{"name": "Endpoint", "type": "string", "jsonPath": ".spec.endpoint"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigSpec {
    /// Base URL of the admin API, e.g. `https://cloudian-admin:19443`
    pub endpoint: String,

    /// Secret key holding the full `Authorization` header value
    pub auth_header_secret_ref: SecretKeySelector,

    /// Skip verification of the admin API certificate
    #[serde(default, rename = "insecureSkipTLSVerify")]
    pub insecure_skip_tls_verify: bool,
}

/// A key within a namespaced Secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SecretKeySelector {
    pub name: String,
    pub namespace: String,
    pub key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_spec() {
        let spec: ProviderConfigSpec = serde_json::from_value(serde_json::json!({
            "endpoint": "https://cloudian:19443",
            "authHeaderSecretRef": {"name": "cloudian", "namespace": "crossplane-system", "key": "auth"},
            "insecureSkipTLSVerify": true
        }))
        .unwrap();

        assert_eq!(spec.endpoint, "https://cloudian:19443");
        assert_eq!(spec.auth_header_secret_ref.key, "auth");
        assert!(spec.insecure_skip_tls_verify);
    }
}
