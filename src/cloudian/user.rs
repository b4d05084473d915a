//! Cloudian users
//!
//! A user belongs to exactly one group and is identified by the pair
//! `(group_id, user_id)`.

use crate::cloudian::client::{encode, Client};
use crate::error::{Error, Result, ResultExt};
use reqwest::Method;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument};

/// Page size of `GET /user/list`. A page one entry longer than this carries a
/// sentinel whose user id is the (inclusive) offset of the next page.
pub const USER_LIST_PAGE_LIMIT: usize = 100;

// =============================================================================
// Types
// =============================================================================

/// Identity of a user within its group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GroupUserId {
    pub group_id: String,
    pub user_id: String,
}

impl GroupUserId {
    pub fn new(group_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for GroupUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group_id, self.user_id)
    }
}

/// Kind of Cloudian user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum UserType {
    #[default]
    User,
    GroupAdmin,
    SystemAdmin,
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserType::User => write!(f, "User"),
            UserType::GroupAdmin => write!(f, "GroupAdmin"),
            UserType::SystemAdmin => write!(f, "SystemAdmin"),
        }
    }
}

/// A Cloudian user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub group_id: String,
    pub user_id: String,
    pub user_type: UserType,
    /// Assigned by Cloudian on creation
    pub canonical_user_id: String,
    pub full_name: String,
    pub email_addr: String,
    pub active: bool,
}

impl User {
    /// A new, active user of type [`UserType::User`].
    pub fn new(id: GroupUserId) -> Self {
        Self {
            group_id: id.group_id,
            user_id: id.user_id,
            active: true,
            ..Default::default()
        }
    }

    pub fn id(&self) -> GroupUserId {
        GroupUserId::new(&self.group_id, &self.user_id)
    }
}

/// Wire representation of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct UserInternal {
    pub user_id: String,
    pub group_id: String,
    pub user_type: UserType,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub canonical_user_id: String,
    pub full_name: String,
    pub email_addr: String,
    pub active: String,
}

pub(crate) fn to_internal_user(user: &User) -> UserInternal {
    UserInternal {
        user_id: user.user_id.clone(),
        group_id: user.group_id.clone(),
        user_type: user.user_type,
        canonical_user_id: user.canonical_user_id.clone(),
        full_name: user.full_name.clone(),
        email_addr: user.email_addr.clone(),
        active: user.active.to_string(),
    }
}

pub(crate) fn from_internal_user(user: UserInternal) -> User {
    User {
        group_id: user.group_id,
        user_id: user.user_id,
        user_type: user.user_type,
        canonical_user_id: user.canonical_user_id,
        full_name: user.full_name,
        email_addr: user.email_addr,
        active: user.active == "true",
    }
}

// =============================================================================
// Operations
// =============================================================================

impl Client {
    /// List all users of a group, following the offset-based pagination of
    /// `GET /user/list` until a short page is returned.
    #[instrument(skip(self))]
    pub async fn list_users(&self, group_id: &str) -> Result<Vec<User>> {
        let mut users = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut page = self.list_users_page(group_id, offset.as_deref()).await?;

            if page.len() <= USER_LIST_PAGE_LIMIT {
                users.extend(page.into_iter().map(from_internal_user));
                return Ok(users);
            }

            // The entry past the limit only marks where the next page starts
            page.truncate(USER_LIST_PAGE_LIMIT + 1);
            let sentinel = page.pop().map(|u| u.user_id).unwrap_or_default();
            if offset.as_deref() == Some(sentinel.as_str()) {
                return Err(Error::PaginationStalled { offset: sentinel });
            }

            debug!(fetched = users.len() + page.len(), next_offset = %sentinel, "Fetching next user page");
            users.extend(page.into_iter().map(from_internal_user));
            offset = Some(sentinel);
        }
    }

    async fn list_users_page(&self, group_id: &str, offset: Option<&str>) -> Result<Vec<UserInternal>> {
        let limit = USER_LIST_PAGE_LIMIT.to_string();
        let mut request = self.request(Method::GET, "/user/list").query(&[
            ("groupId", group_id),
            ("userType", "all"),
            ("userStatus", "all"),
            ("limit", limit.as_str()),
        ]);
        if let Some(offset) = offset {
            request = request.query(&[("offset", offset)]);
        }

        match self.fetch(request, "GET /user/list").await {
            Ok(page) => Ok(page),
            // An empty group answers with no content
            Err(Error::NotFound) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Get a user. A missing user is reported as [`Error::NotFound`].
    #[instrument(skip(self), fields(user = %id))]
    pub async fn get_user(&self, id: &GroupUserId) -> Result<User> {
        let request = self
            .request(Method::GET, "/user")
            .query(&[("groupId", &id.group_id), ("userId", &id.user_id)]);

        let user: UserInternal = self.fetch(request, "GET /user").await?;
        Ok(from_internal_user(user))
    }

    /// Create a user. Cloudian creates one access key along with it.
    #[instrument(skip(self, user), fields(user = %user.id()))]
    pub async fn create_user(&self, user: &User) -> Result<()> {
        let body = encode(&to_internal_user(user), "PUT /user")?;
        let request = self.request(Method::PUT, "/user").body(body);

        self.execute(request, "PUT /user").await
    }

    /// Update the profile of an existing user.
    #[instrument(skip(self, user), fields(user = %user.id()))]
    pub async fn update_user(&self, user: &User) -> Result<()> {
        let body = encode(&to_internal_user(user), "POST /user")?;
        let request = self.request(Method::POST, "/user").body(body);

        self.execute(request, "POST /user").await
    }

    /// Delete a single user. Errors if the user does not exist.
    #[instrument(skip(self), fields(user = %id))]
    pub async fn delete_user(&self, id: &GroupUserId) -> Result<()> {
        let request = self
            .request(Method::DELETE, "/user")
            .query(&[("groupId", &id.group_id), ("userId", &id.user_id)]);

        self.execute(request, "DELETE /user")
            .await
            .context(format!("cannot delete user {}", id))
    }
}
