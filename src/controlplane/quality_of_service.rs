//! Quality of service external client
//!
//! Cloudian always has limits for a group or user, unlimited by default.
//! Creating a limits resource sets them, deleting it resets them.

use crate::cloudian::{self, ByteSize, GroupUserId, QosLimits, QosTarget, QualityOfService};
use crate::controlplane::diff::{Diff, Limit};
use crate::crd::{
    external_name, Condition, GroupQualityOfServiceLimits, Quantity, QualityOfServiceLimits,
    ResourceSpec, UserQualityOfServiceLimits,
};
use crate::domain::ports::{ExternalClient, ExternalCreation, ExternalObservation, ManagedResource};
use crate::error::{Error, Result, ResultExt};
use async_trait::async_trait;
use kube::ResourceExt;
use tracing::instrument;

// =============================================================================
// Desired State
// =============================================================================

/// One level of desired limits. `None` leaves the remote value alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DesiredLimits {
    pub storage_quota: Option<ByteSize>,
    pub storage_quota_count: Option<u64>,
    pub requests_per_min: Option<u64>,
    pub inbound_per_min: Option<ByteSize>,
    pub outbound_per_min: Option<ByteSize>,
}

impl TryFrom<&QualityOfServiceLimits> for DesiredLimits {
    type Error = Error;

    fn try_from(limits: &QualityOfServiceLimits) -> Result<Self> {
        Ok(Self {
            storage_quota: Quantity::optional_kib(limits.storage_quota_bytes.as_ref())?,
            storage_quota_count: limits.storage_quota_count.map(u64::from),
            requests_per_min: limits.requests_per_min.map(u64::from),
            inbound_per_min: Quantity::optional_kib(limits.inbound_bytes_per_min.as_ref())?,
            outbound_per_min: Quantity::optional_kib(limits.outbound_bytes_per_min.as_ref())?,
        })
    }
}

impl DesiredLimits {
    fn diff(&self, diff: &mut Diff, level: &str, observed: &QosLimits) {
        let field = |name: &str| format!("{}.{}", level, name);
        let kib = |size: Option<ByteSize>| Limit(size.map(ByteSize::kb));

        diff.optional(
            &field("storageQuotaKiB"),
            self.storage_quota.map(|s| kib(Some(s))).as_ref(),
            &kib(observed.storage_quota),
        )
        .optional(
            &field("storageQuotaCount"),
            self.storage_quota_count.map(|c| Limit(Some(c))).as_ref(),
            &Limit(observed.storage_quota_count),
        )
        .optional(
            &field("requestsPerMin"),
            self.requests_per_min.map(|r| Limit(Some(r))).as_ref(),
            &Limit(observed.requests_per_min),
        )
        .optional(
            &field("inboundKiBPerMin"),
            self.inbound_per_min.map(|s| kib(Some(s))).as_ref(),
            &kib(observed.inbound_per_min),
        )
        .optional(
            &field("outboundKiBPerMin"),
            self.outbound_per_min.map(|s| kib(Some(s))).as_ref(),
            &kib(observed.outbound_per_min),
        );
    }

    fn merge(&self, mut base: QosLimits) -> QosLimits {
        if self.storage_quota.is_some() {
            base.storage_quota = self.storage_quota;
        }
        if self.storage_quota_count.is_some() {
            base.storage_quota_count = self.storage_quota_count;
        }
        if self.requests_per_min.is_some() {
            base.requests_per_min = self.requests_per_min;
        }
        if self.inbound_per_min.is_some() {
            base.inbound_per_min = self.inbound_per_min;
        }
        if self.outbound_per_min.is_some() {
            base.outbound_per_min = self.outbound_per_min;
        }
        base
    }
}

/// Desired warning and hard limits. A level of `None` has no opinion at all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DesiredQualityOfService {
    pub warning: Option<DesiredLimits>,
    pub hard: Option<DesiredLimits>,
}

impl DesiredQualityOfService {
    pub fn new(
        warning: Option<&QualityOfServiceLimits>,
        hard: Option<&QualityOfServiceLimits>,
    ) -> Result<Self> {
        Ok(Self {
            warning: warning.map(DesiredLimits::try_from).transpose()?,
            hard: hard.map(DesiredLimits::try_from).transpose()?,
        })
    }

    /// Overlay the desired limits onto `base`.
    pub fn merge(&self, base: QualityOfService) -> QualityOfService {
        QualityOfService {
            warning: match &self.warning {
                Some(desired) => desired.merge(base.warning),
                None => base.warning,
            },
            hard: match &self.hard {
                Some(desired) => desired.merge(base.hard),
                None => base.hard,
            },
        }
    }
}

/// Compare desired limits with the ones Cloudian reports.
pub fn is_up_to_date(desired: &DesiredQualityOfService, observed: &QualityOfService) -> (bool, String) {
    let mut diff = Diff::new();
    if let Some(warning) = &desired.warning {
        warning.diff(&mut diff, "warning", &observed.warning);
    }
    if let Some(hard) = &desired.hard {
        hard.diff(&mut diff, "hard", &observed.hard);
    }
    diff.finish()
}

// =============================================================================
// Managed Kinds
// =============================================================================

/// A managed resource holding QoS limits.
pub trait QualityOfServiceResource: ManagedResource {
    fn target(&self) -> Result<QosTarget>;

    fn region(&self) -> Option<&str>;

    fn desired(&self) -> Result<DesiredQualityOfService>;
}

fn non_empty(region: &str) -> Option<&str> {
    Some(region).filter(|r| !r.is_empty())
}

fn required(value: &str, field: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Configuration(format!(
            "spec.forProvider.{} must not be empty",
            field
        )));
    }
    Ok(())
}

impl ManagedResource for GroupQualityOfServiceLimits {
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
        Box::new(QualityOfServiceExternal::new(client))
    }
}

impl QualityOfServiceResource for GroupQualityOfServiceLimits {
    fn target(&self) -> Result<QosTarget> {
        let params = &self.spec.for_provider;
        required(&params.group_id, "groupId")?;
        Ok(QosTarget::Group(params.group_id.clone()))
    }

    fn region(&self) -> Option<&str> {
        non_empty(&self.spec.for_provider.region)
    }

    fn desired(&self) -> Result<DesiredQualityOfService> {
        let params = &self.spec.for_provider;
        DesiredQualityOfService::new(params.warning.as_ref(), params.hard.as_ref())
    }
}

impl ManagedResource for UserQualityOfServiceLimits {
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
        Box::new(QualityOfServiceExternal::new(client))
    }
}

impl QualityOfServiceResource for UserQualityOfServiceLimits {
    fn target(&self) -> Result<QosTarget> {
        let params = &self.spec.for_provider;
        required(&params.group_id, "groupId")?;
        required(&params.user_id, "userId")?;
        Ok(QosTarget::User(GroupUserId::new(
            &params.group_id,
            &params.user_id,
        )))
    }

    fn region(&self) -> Option<&str> {
        non_empty(&self.spec.for_provider.region)
    }

    fn desired(&self) -> Result<DesiredQualityOfService> {
        let params = &self.spec.for_provider;
        DesiredQualityOfService::new(params.warning.as_ref(), params.hard.as_ref())
    }
}

// =============================================================================
// External Client
// =============================================================================

/// Manages the QoS limits of a group or a user.
pub struct QualityOfServiceExternal {
    client: cloudian::Client,
}

impl QualityOfServiceExternal {
    pub fn new(client: cloudian::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<K: QualityOfServiceResource> ExternalClient<K> for QualityOfServiceExternal {
    #[instrument(skip_all, fields(resource = %resource.name_any()))]
    async fn observe(&self, resource: &K) -> Result<ExternalObservation> {
        // Limits always exist remotely; they are ours once the external name is set
        if external_name(resource.meta()).is_none() {
            return Ok(ExternalObservation::absent());
        }

        let target = resource.target()?;
        let desired = resource.desired()?;
        match self
            .client
            .get_quality_of_service(&target, resource.region())
            .await
        {
            Ok(observed) => Ok(ExternalObservation::compared(is_up_to_date(
                &desired, &observed,
            ))),
            Err(e) if e.is_not_found() => Ok(ExternalObservation::absent()),
            Err(e) => Err(e.context(format!("cannot get limits of {}", target))),
        }
    }

    #[instrument(skip_all, fields(resource = %resource.name_any()))]
    async fn create(&self, resource: &K) -> Result<ExternalCreation> {
        let target = resource.target()?;
        let limits = resource.desired()?.merge(QualityOfService::default());

        self.client
            .set_quality_of_service(&target, resource.region(), &limits)
            .await
            .context(format!("cannot set limits of {}", target))?;

        let external_name = match &target {
            QosTarget::Group(group_id) => group_id.clone(),
            QosTarget::User(id) => id.to_string(),
        };
        Ok(ExternalCreation {
            external_name: Some(external_name),
            ..Default::default()
        })
    }

    #[instrument(skip_all, fields(resource = %resource.name_any()))]
    async fn update(&self, resource: &K) -> Result<()> {
        let target = resource.target()?;
        let desired = resource.desired()?;
        let observed = self
            .client
            .get_quality_of_service(&target, resource.region())
            .await
            .context(format!("cannot get limits of {}", target))?;

        self.client
            .set_quality_of_service(&target, resource.region(), &desired.merge(observed))
            .await
            .context(format!("cannot set limits of {}", target))
    }

    #[instrument(skip_all, fields(resource = %resource.name_any()))]
    async fn delete(&self, resource: &K) -> Result<()> {
        let target = resource.target()?;
        self.client
            .delete_quality_of_service(&target, resource.region())
            .await
            .context(format!("cannot reset limits of {}", target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudian::{ClientConfig, GB, MB, TB};
    use crate::crd::{
        GroupQualityOfServiceLimitsParameters, GroupQualityOfServiceLimitsSpec,
        UserQualityOfServiceLimitsParameters, UserQualityOfServiceLimitsSpec,
        EXTERNAL_NAME_ANNOTATION,
    };
    use std::collections::HashMap;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn limits(storage: Option<&str>, requests: Option<u32>) -> QualityOfServiceLimits {
        QualityOfServiceLimits {
            storage_quota_bytes: storage.map(Quantity::new),
            requests_per_min: requests,
            ..Default::default()
        }
    }

    fn group_limits(
        warning: Option<QualityOfServiceLimits>,
        hard: Option<QualityOfServiceLimits>,
    ) -> GroupQualityOfServiceLimits {
        GroupQualityOfServiceLimits::new(
            "qa-limits",
            GroupQualityOfServiceLimitsSpec {
                resource: ResourceSpec::default(),
                for_provider: GroupQualityOfServiceLimitsParameters {
                    group_id: "QA".into(),
                    region: String::new(),
                    warning,
                    hard,
                },
            },
        )
    }

    fn observed() -> QualityOfService {
        QualityOfService {
            warning: QosLimits {
                storage_quota: Some(2 * TB),
                ..Default::default()
            },
            hard: QosLimits {
                storage_quota: Some(3 * TB),
                requests_per_min: Some(1000),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_no_opinion_is_up_to_date() {
        let desired = DesiredQualityOfService::default();
        assert_eq!(is_up_to_date(&desired, &observed()), (true, String::new()));

        let desired = DesiredQualityOfService::new(Some(&limits(None, None)), None).unwrap();
        assert_eq!(is_up_to_date(&desired, &observed()), (true, String::new()));
    }

    #[test]
    fn test_matching_limits_are_up_to_date() {
        let desired = DesiredQualityOfService::new(
            Some(&limits(Some("2Ti"), None)),
            Some(&limits(Some("3Ti"), Some(1000))),
        )
        .unwrap();

        assert!(is_up_to_date(&desired, &observed()).0);
    }

    #[test]
    fn test_differing_limits() {
        let desired = DesiredQualityOfService::new(
            None,
            Some(&QualityOfServiceLimits {
                storage_quota_bytes: Some(Quantity::new("1Ti")),
                outbound_bytes_per_min: Some(Quantity::new("512Mi")),
                ..Default::default()
            }),
        )
        .unwrap();

        let (up_to_date, diff) = is_up_to_date(&desired, &observed());

        assert!(!up_to_date);
        assert_eq!(
            diff,
            format!(
                "hard.storageQuotaKiB: -{} +{}\nhard.outboundKiBPerMin: -{} +unlimited\n",
                TB.kb(),
                (3 * TB).kb(),
                (512 * MB).kb()
            )
        );
    }

    #[test]
    fn test_invalid_quantity_is_an_error() {
        let result = DesiredQualityOfService::new(Some(&limits(Some("lots"), None)), None);
        assert!(matches!(result, Err(Error::InvalidQuantity { .. })));
    }

    #[test]
    fn test_merge_over_unlimited_and_observed() {
        let desired =
            DesiredQualityOfService::new(None, Some(&limits(Some("1Gi"), None))).unwrap();

        let created = desired.merge(QualityOfService::default());
        assert_eq!(created.hard.storage_quota, Some(GB));
        assert_eq!(created.hard.requests_per_min, None);
        assert_eq!(created.warning, QosLimits::default());

        let updated = desired.merge(observed());
        assert_eq!(updated.hard.storage_quota, Some(GB));
        assert_eq!(updated.hard.requests_per_min, Some(1000));
        assert_eq!(updated.warning.storage_quota, Some(2 * TB));
    }

    #[test]
    fn test_user_target() {
        let limits = UserQualityOfServiceLimits::new(
            "alice-limits",
            UserQualityOfServiceLimitsSpec {
                resource: ResourceSpec::default(),
                for_provider: UserQualityOfServiceLimitsParameters {
                    group_id: "QA".into(),
                    user_id: "alice".into(),
                    region: "eu-north".into(),
                    ..Default::default()
                },
            },
        );

        assert_eq!(
            limits.target().unwrap(),
            QosTarget::User(GroupUserId::new("QA", "alice"))
        );
        assert_eq!(limits.region(), Some("eu-north"));
    }

    #[tokio::test]
    async fn test_create_then_observe_group_limits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/qos/limits"))
            .and(query_param("groupId", "QA"))
            .and(query_param("userId", "ALL"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/qos/limits"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "qosLimitList": [
                    {"type": "STORAGE_QUOTA_KBYTES_LH", "value": (3 * TB).kb()},
                    {"type": "STORAGE_QUOTA_KBYTES_LL", "value": -1}
                ]
            })))
            .mount(&server)
            .await;

        let external =
            QualityOfServiceExternal::new(cloudian::Client::new(ClientConfig::new(server.uri(), "")).unwrap());
        let mut resource = group_limits(None, Some(limits(Some("3Ti"), None)));

        let observation = external.observe(&resource).await.unwrap();
        assert!(!observation.resource_exists);

        let creation = external.create(&resource).await.unwrap();
        assert_eq!(creation.external_name.as_deref(), Some("QA"));

        let requests = server.received_requests().await.unwrap();
        let params: HashMap<String, String> = requests[0].url.query_pairs().into_owned().collect();
        assert_eq!(params["hlStorageQuotaKBytes"], (3 * TB).kb_string());
        assert_eq!(params["hlRequestRate"], "-1");

        resource
            .annotations_mut()
            .insert(EXTERNAL_NAME_ANNOTATION.to_string(), "QA".to_string());
        let observation = external.observe(&resource).await.unwrap();
        assert!(observation.resource_exists);
        assert!(observation.resource_up_to_date, "{}", observation.diff);
    }
}
