//! ProviderConfig connector
//!
//! Resolves the ProviderConfig a managed resource points at, reads the
//! `Authorization` header from the referenced Secret and builds a Cloudian
//! client from both.

use crate::cloudian::{self, ClientConfig, Secret};
use crate::crd::{ProviderConfig, ResourceSpec, SecretKeySelector};
use crate::error::{Error, Result};
use k8s_openapi::api::core::v1::Secret as KubeSecret;
use kube::Api;
use std::time::Duration;
use tracing::{debug, instrument};

/// Builds Cloudian clients for managed resources.
#[derive(Clone)]
pub struct Connector {
    kube: kube::Client,
    request_timeout: Duration,
}

impl Connector {
    pub fn new(kube: kube::Client, request_timeout: Duration) -> Self {
        Self {
            kube,
            request_timeout,
        }
    }

    /// Build a client for the ProviderConfig referenced by `spec`.
    #[instrument(skip_all, fields(provider_config = %spec.provider_config_ref.name))]
    pub async fn connect(&self, spec: &ResourceSpec) -> Result<cloudian::Client> {
        let name = &spec.provider_config_ref.name;
        let configs: Api<ProviderConfig> = Api::all(self.kube.clone());
        let config = configs
            .get_opt(name)
            .await?
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "ProviderConfig".to_string(),
                name: name.clone(),
            })?;

        let selector = &config.spec.auth_header_secret_ref;
        let secrets: Api<KubeSecret> = Api::namespaced(self.kube.clone(), &selector.namespace);
        let secret = secrets
            .get_opt(&selector.name)
            .await?
            .ok_or_else(|| Error::ResourceNotFound {
                kind: "Secret".to_string(),
                name: format!("{}/{}", selector.namespace, selector.name),
            })?;

        let auth_header = auth_header(&secret, selector)?;
        debug!(endpoint = %config.spec.endpoint, "Connecting to Cloudian");

        cloudian::Client::new(ClientConfig {
            base_url: config.spec.endpoint.clone(),
            auth_header,
            timeout: self.request_timeout,
            insecure_skip_tls_verify: config.spec.insecure_skip_tls_verify,
        })
    }
}

/// Read the `Authorization` header value from `secret`.
pub fn auth_header(secret: &KubeSecret, selector: &SecretKeySelector) -> Result<Secret> {
    let value = secret
        .data
        .as_ref()
        .and_then(|data| data.get(&selector.key))
        .ok_or_else(|| {
            Error::Configuration(format!(
                "secret {}/{} has no key {:?}",
                selector.namespace, selector.name, selector.key
            ))
        })?;

    let value = std::str::from_utf8(&value.0).map_err(|_| {
        Error::Configuration(format!(
            "key {:?} of secret {}/{} is not UTF-8",
            selector.key, selector.namespace, selector.name
        ))
    })?;

    Ok(Secret::new(value.trim_end_matches(['\r', '\n'])))
}
