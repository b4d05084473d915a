//! AccessKey external client

use crate::cloudian::{self, GroupUserId, Secret, SecurityInfo};
use crate::crd::{external_name, AccessKey, AccessKeyObservation, Condition, ResourceSpec};
use crate::domain::ports::{
    ConnectionDetails, ExternalClient, ExternalCreation, ExternalObservation, ManagedResource,
};
use crate::error::{Error, Result, ResultExt};
use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use tracing::instrument;

/// Connection secret key holding the access key id
pub const ACCESS_KEY_ID: &str = "access_key_id";

/// Connection secret key holding the secret access key
pub const SECRET_ACCESS_KEY: &str = "secret_access_key";

impl ManagedResource for AccessKey {
    fn resource_spec(&self) -> &ResourceSpec {
        &self.spec.resource
    }

    fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.resource.conditions.as_slice())
            .unwrap_or_default()
    }

    fn external(client: cloudian::Client) -> Box<dyn ExternalClient<Self>> {
        Box::new(AccessKeyExternal::new(client))
    }
}

fn connection_details(key: SecurityInfo) -> ConnectionDetails {
    ConnectionDetails::from([
        (ACCESS_KEY_ID.to_string(), key.access_key),
        (SECRET_ACCESS_KEY.to_string(), key.secret_key),
    ])
}

/// Manages an S3 access key. Nothing about a key can be changed, so an
/// existing key is always up to date.
pub struct AccessKeyExternal {
    client: cloudian::Client,
}

impl AccessKeyExternal {
    pub fn new(client: cloudian::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExternalClient<AccessKey> for AccessKeyExternal {
    #[instrument(skip_all, fields(access_key = %key.name_any()))]
    async fn observe(&self, key: &AccessKey) -> Result<ExternalObservation> {
        // The id is only known once Cloudian has created the key
        let Some(id) = external_name(key.meta()) else {
            return Ok(ExternalObservation::absent());
        };

        match self.client.get_user_credentials(&Secret::new(id)).await {
            Ok(info) => {
                let at_provider = AccessKeyObservation {
                    id: Some(id.to_string()),
                };
                let at_provider =
                    serde_json::to_value(at_provider).map_err(|source| Error::Encode {
                        operation: "status.atProvider".to_string(),
                        source,
                    })?;
                Ok(ExternalObservation::up_to_date()
                    .with_at_provider(at_provider)
                    .with_connection_details(connection_details(info)))
            }
            Err(e) if e.is_not_found() => Ok(ExternalObservation::absent()),
            Err(e) => Err(e.context("cannot get access key")),
        }
    }

    #[instrument(skip_all, fields(access_key = %key.name_any()))]
    async fn create(&self, key: &AccessKey) -> Result<ExternalCreation> {
        let params = &key.spec.for_provider;
        if params.group_id.is_empty() || params.user_id.is_empty() {
            return Err(Error::Configuration(
                "spec.forProvider.groupId and spec.forProvider.userId must not be empty"
                    .to_string(),
            ));
        }

        let created = self
            .client
            .create_user_credentials(&GroupUserId::new(&params.group_id, &params.user_id))
            .await
            .context("cannot create access key")?;

        Ok(ExternalCreation {
            external_name: Some(created.access_key.reveal().to_string()),
            connection_details: connection_details(created),
        })
    }

    async fn update(&self, _key: &AccessKey) -> Result<()> {
        Ok(())
    }

    #[instrument(skip_all, fields(access_key = %key.name_any()))]
    async fn delete(&self, key: &AccessKey) -> Result<()> {
        let Some(id) = external_name(key.meta()) else {
            return Ok(());
        };

        self.client
            .delete_user_credentials(&Secret::new(id))
            .await
            .context("cannot delete access key")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudian::ClientConfig;
    use crate::crd::{AccessKeyParameters, AccessKeySpec, EXTERNAL_NAME_ANNOTATION};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn access_key(external_name: Option<&str>) -> AccessKey {
        let mut key = AccessKey::new(
            "alice-key",
            AccessKeySpec {
                resource: ResourceSpec::default(),
                for_provider: AccessKeyParameters {
                    group_id: "QA".into(),
                    user_id: "alice".into(),
                },
            },
        );
        if let Some(name) = external_name {
            key.annotations_mut()
                .insert(EXTERNAL_NAME_ANNOTATION.to_string(), name.to_string());
        }
        key
    }

    fn external_for(server: &MockServer) -> AccessKeyExternal {
        AccessKeyExternal::new(cloudian::Client::new(ClientConfig::new(server.uri(), "")).unwrap())
    }

    #[tokio::test]
    async fn test_observe_without_external_name_is_absent() {
        let server = MockServer::start().await;

        let observation = external_for(&server).observe(&access_key(None)).await.unwrap();

        assert!(!observation.resource_exists);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_observe_existing_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/credentials"))
            .and(query_param("accessKey", "AK1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(
                {"accessKey": "AK1", "secretKey": "SK1", "active": true}
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/credentials"))
            .and(query_param("accessKey", "GONE"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let external = external_for(&server);

        let observation = external.observe(&access_key(Some("AK1"))).await.unwrap();
        assert!(observation.resource_exists);
        assert!(observation.resource_up_to_date);
        assert_eq!(observation.at_provider, Some(serde_json::json!({"id": "AK1"})));
        assert_eq!(observation.connection_details.len(), 2);
        assert_eq!(observation.connection_details[ACCESS_KEY_ID].reveal(), "AK1");
        assert_eq!(observation.connection_details[SECRET_ACCESS_KEY].reveal(), "SK1");

        let observation = external.observe(&access_key(Some("GONE"))).await.unwrap();
        assert!(!observation.resource_exists);
        assert!(observation.connection_details.is_empty());
    }

    #[tokio::test]
    async fn test_create_publishes_key_pair() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/user/credentials"))
            .and(query_param("groupId", "QA"))
            .and(query_param("userId", "alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(
                {"accessKey": "AK2", "secretKey": "SK2", "active": true}
            )))
            .expect(1)
            .mount(&server)
            .await;

        let creation = external_for(&server).create(&access_key(None)).await.unwrap();

        assert_eq!(creation.external_name.as_deref(), Some("AK2"));
        assert_eq!(creation.connection_details[ACCESS_KEY_ID].reveal(), "AK2");
        assert_eq!(creation.connection_details[SECRET_ACCESS_KEY].reveal(), "SK2");
    }

    #[tokio::test]
    async fn test_delete_by_external_name() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/user/credentials"))
            .and(query_param("accessKey", "AK1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let external = external_for(&server);
        external.delete(&access_key(Some("AK1"))).await.unwrap();
        external.delete(&access_key(None)).await.unwrap();
    }
}
