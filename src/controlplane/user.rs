//! User external client
//!
//! Cloudian gives every new user an access key. Keys are managed through
//! AccessKey resources only, so the implicit key is removed right after the
//! user is created, and a user that still owns keys is never deleted.

use crate::cloudian::{self, GroupUserId, SecurityInfo};
use crate::controlplane::diff::Diff;
use crate::crd::{external_name, Condition, ResourceSpec, User, UserObservation, UserParameters};
use crate::domain::ports::{ExternalClient, ExternalCreation, ExternalObservation, ManagedResource};
use crate::error::{Error, Result, ResultExt};
use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use tracing::{info, instrument};

impl ManagedResource for User {
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
        Box::new(UserExternal::new(client))
    }
}

/// Compare the desired user with the one Cloudian reports. Only fields set in
/// `desired` are compared.
pub fn is_up_to_date(desired: &UserParameters, observed: &cloudian::User) -> (bool, String) {
    Diff::new()
        .optional("userType", desired.user_type.as_ref(), &observed.user_type)
        .optional("fullName", desired.full_name.as_ref(), &observed.full_name)
        .optional("emailAddr", desired.email_addr.as_ref(), &observed.email_addr)
        .optional("active", desired.active.as_ref(), &observed.active)
        .finish()
}

fn merge(desired: &UserParameters, mut base: cloudian::User) -> cloudian::User {
    if let Some(user_type) = desired.user_type {
        base.user_type = user_type;
    }
    if let Some(full_name) = &desired.full_name {
        base.full_name = full_name.clone();
    }
    if let Some(email_addr) = &desired.email_addr {
        base.email_addr = email_addr.clone();
    }
    if let Some(active) = desired.active {
        base.active = active;
    }
    base
}

/// Identity of the Cloudian user behind `user`: the group from the spec and the
/// external name, falling back to the object name.
pub fn user_id(user: &User) -> Result<GroupUserId> {
    let group_id = &user.spec.for_provider.group_id;
    if group_id.is_empty() {
        return Err(Error::Configuration(
            "spec.forProvider.groupId must not be empty".to_string(),
        ));
    }

    let name = user.name_any();
    let user_id = external_name(user.meta()).unwrap_or(name.as_str());
    Ok(GroupUserId::new(group_id, user_id))
}

/// Manages a Cloudian user.
pub struct UserExternal {
    client: cloudian::Client,
}

impl UserExternal {
    pub fn new(client: cloudian::Client) -> Self {
        Self { client }
    }

    /// Access keys of a user; Cloudian answers "not found" for none.
    async fn credentials(&self, id: &GroupUserId) -> Result<Vec<SecurityInfo>> {
        match self.client.list_user_credentials(id).await {
            Ok(keys) => Ok(keys),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e.context("cannot list access keys of user")),
        }
    }
}

#[async_trait]
impl ExternalClient<User> for UserExternal {
    #[instrument(skip_all, fields(user = %user.name_any()))]
    async fn observe(&self, user: &User) -> Result<ExternalObservation> {
        let id = user_id(user)?;

        match self.client.get_user(&id).await {
            Ok(observed) => {
                let at_provider = UserObservation {
                    canonical_user_id: Some(observed.canonical_user_id.clone())
                        .filter(|c| !c.is_empty()),
                };
                let observation = ExternalObservation::compared(is_up_to_date(
                    &user.spec.for_provider,
                    &observed,
                ));
                Ok(observation.with_at_provider(serde_json::to_value(at_provider).map_err(
                    |source| Error::Encode {
                        operation: "status.atProvider".to_string(),
                        source,
                    },
                )?))
            }
            Err(e) if e.is_not_found() => Ok(ExternalObservation::absent()),
            Err(e) => Err(e.context("cannot get user")),
        }
    }

    #[instrument(skip_all, fields(user = %user.name_any()))]
    async fn create(&self, user: &User) -> Result<ExternalCreation> {
        let id = user_id(user)?;
        let desired = merge(&user.spec.for_provider, cloudian::User::new(id.clone()));

        self.client
            .create_user(&desired)
            .await
            .context("cannot create user")?;

        for key in self.credentials(&id).await? {
            self.client
                .delete_user_credentials(&key.access_key)
                .await
                .context("cannot delete initial access key of user")?;
            info!(user = %id, "Deleted initial access key");
        }

        Ok(ExternalCreation {
            external_name: Some(id.user_id),
            ..Default::default()
        })
    }

    #[instrument(skip_all, fields(user = %user.name_any()))]
    async fn update(&self, user: &User) -> Result<()> {
        let id = user_id(user)?;
        let observed = self.client.get_user(&id).await.context("cannot get user")?;

        self.client
            .update_user(&merge(&user.spec.for_provider, observed))
            .await
            .context("cannot update user")
    }

    #[instrument(skip_all, fields(user = %user.name_any()))]
    async fn delete(&self, user: &User) -> Result<()> {
        let id = user_id(user)?;

        let keys = self.credentials(&id).await?;
        if !keys.is_empty() {
            return Err(Error::PolicyViolation(format!(
                "user {} has {} access keys and cannot be deleted",
                id,
                keys.len()
            )));
        }

        self.client.delete_user(&id).await
    }
}
