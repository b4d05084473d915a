//! S3 access keys ("security info" in Cloudian terms).

use crate::cloudian::client::Client;
use crate::cloudian::secret::Secret;
use crate::cloudian::user::GroupUserId;
use crate::error::Result;
use reqwest::Method;
use serde::Deserialize;
use tracing::instrument;

/// An S3 credential pair bound to a user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityInfo {
    pub access_key: Secret,
    pub secret_key: Secret,
    /// Milliseconds since the epoch
    #[serde(default)]
    pub create_date: Option<i64>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Client {
    /// List the access keys of a user. Cloudian answers 204, reported as
    /// [`crate::Error::NotFound`], when the user has none.
    #[instrument(skip(self), fields(user = %id))]
    pub async fn list_user_credentials(&self, id: &GroupUserId) -> Result<Vec<SecurityInfo>> {
        let request = self
            .request(Method::GET, "/user/credentials/list")
            .query(&[("groupId", &id.group_id), ("userId", &id.user_id)]);

        self.fetch(request, "GET /user/credentials/list").await
    }

    /// Get a single access key by its id.
    #[instrument(skip(self, access_key))]
    pub async fn get_user_credentials(&self, access_key: &Secret) -> Result<SecurityInfo> {
        let request = self
            .request(Method::GET, "/user/credentials")
            .query(&[("accessKey", access_key.reveal())]);

        self.fetch(request, "GET /user/credentials").await
    }

    /// Create a new access key for a user.
    #[instrument(skip(self), fields(user = %id))]
    pub async fn create_user_credentials(&self, id: &GroupUserId) -> Result<SecurityInfo> {
        let request = self
            .request(Method::PUT, "/user/credentials")
            .query(&[("groupId", &id.group_id), ("userId", &id.user_id)]);

        self.fetch(request, "PUT /user/credentials").await
    }

    /// Delete an access key.
    #[instrument(skip(self, access_key))]
    pub async fn delete_user_credentials(&self, access_key: &Secret) -> Result<()> {
        let request = self
            .request(Method::DELETE, "/user/credentials")
            .query(&[("accessKey", access_key.reveal())]);

        self.execute(request, "DELETE /user/credentials").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudian::client::ClientConfig;
    use crate::cloudian::secret::REDACTED;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> Client {
        Client::new(ClientConfig::new(server.uri(), "")).unwrap()
    }

    #[test]
    fn test_secret_unmarshal() {
        let json = r#"[{"accessKey":"124","secretKey":"x+2","createDate":1735894172440,"active":true}]"#;

        let secrets: Vec<SecurityInfo> = serde_json::from_str(json).unwrap();

        assert_eq!(secrets[0].secret_key.to_string(), REDACTED);
        assert_eq!(secrets[0].secret_key.reveal(), "x+2");
        assert_eq!(secrets[0].access_key.reveal(), "124");
        assert_eq!(secrets[0].create_date, Some(1735894172440));
        assert!(!format!("{:?}", secrets[0]).contains("x+2"));
    }

    #[tokio::test]
    async fn test_list_user_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user/credentials/list"))
            .and(query_param("groupId", "QA"))
            .and(query_param("userId", "alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"accessKey": "AK1", "secretKey": "SK1", "active": true},
                {"accessKey": "AK2", "secretKey": "SK2", "active": false}
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/credentials/list"))
            .and(query_param("userId", "bob"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = client_for(&server);

        let keys = client
            .list_user_credentials(&GroupUserId::new("QA", "alice"))
            .await
            .unwrap();
        let ids: Vec<&str> = keys.iter().map(|k| k.access_key.reveal()).collect();
        assert_eq!(ids, vec!["AK1", "AK2"]);
        assert!(!keys[1].active);

        let err = client
            .list_user_credentials(&GroupUserId::new("QA", "bob"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_get_delete_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/user/credentials"))
            .and(query_param("userId", "alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(
                {"accessKey": "AK3", "secretKey": "SK3", "createDate": 1735894172440i64}
            )))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/credentials"))
            .and(query_param("accessKey", "AK3"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/user/credentials"))
            .and(query_param("accessKey", "AK3"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);

        let created = client
            .create_user_credentials(&GroupUserId::new("QA", "alice"))
            .await
            .unwrap();
        assert_eq!(created.secret_key.reveal(), "SK3");
        assert!(created.active);

        client.delete_user_credentials(&created.access_key).await.unwrap();

        let err = client
            .get_user_credentials(&created.access_key)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
