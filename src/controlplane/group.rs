//! Group external client

use crate::cloudian;
use crate::controlplane::diff::Diff;
use crate::crd::{Condition, Group, GroupParameters, ResourceSpec};
use crate::domain::ports::{ExternalClient, ExternalCreation, ExternalObservation, ManagedResource};
use crate::error::{Error, Result, ResultExt};
use async_trait::async_trait;
use tracing::instrument;

impl ManagedResource for Group {
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
        Box::new(GroupExternal::new(client))
    }
}

/// Compare the desired group with the one Cloudian reports.
///
/// `active` and the group id are always compared; every other field only
/// when it is set in `desired`.
pub fn is_up_to_date(desired: &GroupParameters, observed: &cloudian::Group) -> (bool, String) {
    Diff::new()
        .exact("active", &desired.active, &observed.active)
        .exact("groupId", &desired.group_id, &observed.group_id)
        .optional("groupName", desired.group_name.as_ref(), &observed.group_name)
        .optional("ldapEnabled", desired.ldap_enabled.as_ref(), &observed.ldap_enabled)
        .optional("ldapGroup", desired.ldap_group.as_ref(), &observed.ldap_group)
        .optional(
            "ldapMatchAttribute",
            desired.ldap_match_attribute.as_ref(),
            &observed.ldap_match_attribute,
        )
        .optional("ldapSearch", desired.ldap_search.as_ref(), &observed.ldap_search)
        .optional(
            "ldapSearchUserBase",
            desired.ldap_search_user_base.as_ref(),
            &observed.ldap_search_user_base,
        )
        .optional(
            "ldapServerURL",
            desired.ldap_server_url.as_ref(),
            &observed.ldap_server_url,
        )
        .optional(
            "ldapUserDNTemplate",
            desired.ldap_user_dn_template.as_ref(),
            &observed.ldap_user_dn_template,
        )
        .finish()
}

/// Overlay the fields `desired` has an opinion on onto `base`.
fn merge(desired: &GroupParameters, mut base: cloudian::Group) -> cloudian::Group {
    fn set<T: Clone>(target: &mut T, value: &Option<T>) {
        if let Some(value) = value {
            *target = value.clone();
        }
    }

    base.active = desired.active;
    base.group_id = desired.group_id.clone();
    set(&mut base.group_name, &desired.group_name);
    set(&mut base.ldap_enabled, &desired.ldap_enabled);
    set(&mut base.ldap_group, &desired.ldap_group);
    set(&mut base.ldap_match_attribute, &desired.ldap_match_attribute);
    set(&mut base.ldap_search, &desired.ldap_search);
    set(&mut base.ldap_search_user_base, &desired.ldap_search_user_base);
    set(&mut base.ldap_server_url, &desired.ldap_server_url);
    set(&mut base.ldap_user_dn_template, &desired.ldap_user_dn_template);
    base
}

fn parameters(group: &Group) -> Result<&GroupParameters> {
    let params = &group.spec.for_provider;
    if params.group_id.is_empty() {
        return Err(Error::Configuration(
            "spec.forProvider.groupId must not be empty".to_string(),
        ));
    }
    Ok(params)
}

/// Manages a Cloudian group. Deleting the group deletes its users first.
pub struct GroupExternal {
    client: cloudian::Client,
}

impl GroupExternal {
    pub fn new(client: cloudian::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExternalClient<Group> for GroupExternal {
    #[instrument(skip_all, fields(group_id = %group.spec.for_provider.group_id))]
    async fn observe(&self, group: &Group) -> Result<ExternalObservation> {
        let params = parameters(group)?;

        match self.client.get_group(&params.group_id).await {
            Ok(observed) => Ok(ExternalObservation::compared(is_up_to_date(params, &observed))),
            Err(e) if e.is_not_found() => Ok(ExternalObservation::absent()),
            Err(e) => Err(e.context("cannot get group")),
        }
    }

    #[instrument(skip_all, fields(group_id = %group.spec.for_provider.group_id))]
    async fn create(&self, group: &Group) -> Result<ExternalCreation> {
        let params = parameters(group)?;
        let desired = merge(params, cloudian::Group::new(&params.group_id));

        self.client
            .create_group(&desired)
            .await
            .context("cannot create group")?;

        Ok(ExternalCreation {
            external_name: Some(params.group_id.clone()),
            ..Default::default()
        })
    }

    #[instrument(skip_all, fields(group_id = %group.spec.for_provider.group_id))]
    async fn update(&self, group: &Group) -> Result<()> {
        let params = parameters(group)?;
        let observed = self
            .client
            .get_group(&params.group_id)
            .await
            .context("cannot get group")?;

        self.client
            .update_group(&merge(params, observed))
            .await
            .context("cannot update group")
    }

    #[instrument(skip_all, fields(group_id = %group.spec.for_provider.group_id))]
    async fn delete(&self, group: &Group) -> Result<()> {
        let params = parameters(group)?;
        self.client
            .delete_group_recursive(&params.group_id)
            .await
            .context("cannot delete group")
    }
}
