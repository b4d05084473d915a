//! Cloudian groups
//!
//! The admin API encodes a group differently from [`Group`]: `active` is the
//! string `"true"`/`"false"` and each group carries three S3 endpoint lists.
//! [`to_internal`] and [`from_internal`] translate between the two shapes.

use crate::cloudian::client::{encode, Client};
use crate::error::{Result, ResultExt};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Endpoint list value meaning "every configured endpoint". The provider does
/// not manage per-endpoint access.
pub const ALL_ENDPOINTS: &str = "ALL";

/// A Cloudian group, the tenant namespace that users live in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Group {
    pub active: bool,
    pub group_id: String,
    pub group_name: String,
    pub ldap_enabled: bool,
    pub ldap_group: String,
    pub ldap_match_attribute: String,
    pub ldap_search: String,
    pub ldap_search_user_base: String,
    pub ldap_server_url: String,
    pub ldap_user_dn_template: String,
}

impl Group {
    /// An empty group with the given id.
    pub fn new(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            ..Default::default()
        }
    }
}

/// Wire representation of a group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct GroupInternal {
    pub active: String,
    pub group_id: String,
    pub group_name: String,
    pub ldap_enabled: bool,
    pub ldap_group: String,
    pub ldap_match_attribute: String,
    pub ldap_search: String,
    pub ldap_search_user_base: String,
    #[serde(rename = "ldapServerURL")]
    pub ldap_server_url: String,
    #[serde(rename = "ldapUserDNTemplate")]
    pub ldap_user_dn_template: String,
    #[serde(rename = "s3endpointshttp")]
    pub s3_endpoints_http: Vec<String>,
    #[serde(rename = "s3endpointshttps")]
    pub s3_endpoints_https: Vec<String>,
    #[serde(rename = "s3websiteendpoints")]
    pub s3_website_endpoints: Vec<String>,
}

pub(crate) fn to_internal(group: &Group) -> GroupInternal {
    GroupInternal {
        active: group.active.to_string(),
        group_id: group.group_id.clone(),
        group_name: group.group_name.clone(),
        ldap_enabled: group.ldap_enabled,
        ldap_group: group.ldap_group.clone(),
        ldap_match_attribute: group.ldap_match_attribute.clone(),
        ldap_search: group.ldap_search.clone(),
        ldap_search_user_base: group.ldap_search_user_base.clone(),
        ldap_server_url: group.ldap_server_url.clone(),
        ldap_user_dn_template: group.ldap_user_dn_template.clone(),
        s3_endpoints_http: vec![ALL_ENDPOINTS.to_string()],
        s3_endpoints_https: vec![ALL_ENDPOINTS.to_string()],
        s3_website_endpoints: vec![ALL_ENDPOINTS.to_string()],
    }
}

pub(crate) fn from_internal(group: GroupInternal) -> Group {
    Group {
        active: group.active == "true",
        group_id: group.group_id,
        group_name: group.group_name,
        ldap_enabled: group.ldap_enabled,
        ldap_group: group.ldap_group,
        ldap_match_attribute: group.ldap_match_attribute,
        ldap_search: group.ldap_search,
        ldap_search_user_base: group.ldap_search_user_base,
        ldap_server_url: group.ldap_server_url,
        ldap_user_dn_template: group.ldap_user_dn_template,
    }
}

impl Client {
    /// Get a group. A missing group is reported as [`crate::Error::NotFound`].
    #[instrument(skip(self))]
    pub async fn get_group(&self, group_id: &str) -> Result<Group> {
        let request = self
            .request(Method::GET, "/group")
            .query(&[("groupId", group_id)]);

        let group: GroupInternal = self.fetch(request, "GET /group").await?;
        Ok(from_internal(group))
    }

    /// Create a group.
    #[instrument(skip(self, group), fields(group_id = %group.group_id))]
    pub async fn create_group(&self, group: &Group) -> Result<()> {
        let body = encode(&to_internal(group), "PUT /group")?;
        let request = self.request(Method::PUT, "/group").body(body);

        self.execute(request, "PUT /group").await
    }

    /// Update an existing group.
    #[instrument(skip(self, group), fields(group_id = %group.group_id))]
    pub async fn update_group(&self, group: &Group) -> Result<()> {
        let body = encode(&to_internal(group), "POST /group")?;
        let request = self.request(Method::POST, "/group").body(body);

        self.execute(request, "POST /group").await
    }

    /// Delete a group. Cloudian refuses to delete a group that still has members.
    #[instrument(skip(self))]
    pub async fn delete_group(&self, group_id: &str) -> Result<()> {
        let request = self
            .request(Method::DELETE, "/group")
            .query(&[("groupId", group_id)]);

        self.execute(request, "DELETE /group").await
    }

    /// Delete every user of a group, then the group itself.
    ///
    /// Users are deleted in listing order; the first failure aborts before the
    /// group is touched.
    #[instrument(skip(self))]
    pub async fn delete_group_recursive(&self, group_id: &str) -> Result<()> {
        let users = self
            .list_users(group_id)
            .await
            .context(format!("cannot list users of group {}", group_id))?;

        for user in &users {
            self.delete_user(&user.id())
                .await
                .context(format!("cannot delete user {} of group {}", user.user_id, group_id))?;
        }

        info!(users = users.len(), "Deleted group members");

        self.delete_group(group_id).await
    }
}
