//! Quality of service limits
//!
//! Cloudian keeps a warning (soft) and a hard limit for storage, object
//! count, request rate and bandwidth, per group or per user and optionally per
//! region. On the wire -1 means unlimited; here an unlimited value is `None`.

use crate::cloudian::client::Client;
use crate::cloudian::datasize::ByteSize;
use crate::cloudian::user::GroupUserId;
use crate::error::Result;
use reqwest::Method;
use serde::Deserialize;
use std::fmt;
use tracing::{instrument, warn};

/// Wire value of an unlimited QoS setting.
pub const UNLIMITED: i64 = -1;

/// `userId` addressing the limits of a whole group.
pub const GROUP_SCOPE_USER_ID: &str = "ALL";

// =============================================================================
// Types
// =============================================================================

/// Entity a set of limits applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QosTarget {
    Group(String),
    User(GroupUserId),
}

impl QosTarget {
    fn group_id(&self) -> &str {
        match self {
            QosTarget::Group(group_id) => group_id,
            QosTarget::User(id) => &id.group_id,
        }
    }

    fn user_id(&self) -> &str {
        match self {
            QosTarget::Group(_) => GROUP_SCOPE_USER_ID,
            QosTarget::User(id) => &id.user_id,
        }
    }

    fn query<'a>(&'a self, region: Option<&'a str>) -> Vec<(&'static str, &'a str)> {
        let mut query = vec![("groupId", self.group_id()), ("userId", self.user_id())];
        if let Some(region) = region {
            query.push(("region", region));
        }
        query
    }
}

impl fmt::Display for QosTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QosTarget::Group(group_id) => write!(f, "group {}", group_id),
            QosTarget::User(id) => write!(f, "user {}", id),
        }
    }
}

/// One level of limits. `None` is unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QosLimits {
    pub storage_quota: Option<ByteSize>,
    pub storage_quota_count: Option<u64>,
    pub requests_per_min: Option<u64>,
    pub inbound_per_min: Option<ByteSize>,
    pub outbound_per_min: Option<ByteSize>,
}

/// Warning and hard limits of a group or user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QualityOfService {
    pub warning: QosLimits,
    pub hard: QosLimits,
}

/// Limit kinds as named by `GET /qos/limits` and `POST /qos/limits`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Metric {
    StorageQuota,
    StorageQuotaCount,
    RequestRate,
    DataIn,
    DataOut,
}

const METRICS: [Metric; 5] = [
    Metric::StorageQuota,
    Metric::StorageQuotaCount,
    Metric::RequestRate,
    Metric::DataIn,
    Metric::DataOut,
];

impl Metric {
    fn wire_type(self) -> &'static str {
        match self {
            Metric::StorageQuota => "STORAGE_QUOTA_KBYTES",
            Metric::StorageQuotaCount => "STORAGE_QUOTA_COUNT",
            Metric::RequestRate => "REQUEST_RATE",
            Metric::DataIn => "DATAKBYTES_IN",
            Metric::DataOut => "DATAKBYTES_OUT",
        }
    }

    fn hard_param(self) -> &'static str {
        match self {
            Metric::StorageQuota => "hlStorageQuotaKBytes",
            Metric::StorageQuotaCount => "hlStorageQuotaCount",
            Metric::RequestRate => "hlRequestRate",
            Metric::DataIn => "hlDataKBytesIn",
            Metric::DataOut => "hlDataKBytesOut",
        }
    }

    fn warning_param(self) -> &'static str {
        match self {
            Metric::StorageQuota => "wlStorageQuotaKBytes",
            Metric::StorageQuotaCount => "wlStorageQuotaCount",
            Metric::RequestRate => "wlRequestRate",
            Metric::DataIn => "wlDataKBytesIn",
            Metric::DataOut => "wlDataKBytesOut",
        }
    }
}

impl QosLimits {
    fn get(&self, metric: Metric) -> i64 {
        let value = match metric {
            Metric::StorageQuota => self.storage_quota.map(ByteSize::kb),
            Metric::StorageQuotaCount => self.storage_quota_count,
            Metric::RequestRate => self.requests_per_min,
            Metric::DataIn => self.inbound_per_min.map(ByteSize::kb),
            Metric::DataOut => self.outbound_per_min.map(ByteSize::kb),
        };
        value
            .and_then(|v| i64::try_from(v).ok())
            .unwrap_or(UNLIMITED)
    }

    fn set(&mut self, metric: Metric, value: i64) {
        let value = u64::try_from(value).ok();
        match metric {
            Metric::StorageQuota => self.storage_quota = value.map(ByteSize::from_kib),
            Metric::StorageQuotaCount => self.storage_quota_count = value,
            Metric::RequestRate => self.requests_per_min = value,
            Metric::DataIn => self.inbound_per_min = value.map(ByteSize::from_kib),
            Metric::DataOut => self.outbound_per_min = value.map(ByteSize::from_kib),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QosResponse {
    #[serde(default)]
    qos_limit_list: Vec<QosLimitEntry>,
}

#[derive(Debug, Deserialize)]
struct QosLimitEntry {
    #[serde(rename = "type")]
    kind: String,
    value: i64,
}

impl From<QosResponse> for QualityOfService {
    fn from(response: QosResponse) -> Self {
        let mut qos = QualityOfService::default();
        for entry in response.qos_limit_list {
            // `_LH` is the high (hard) limit, `_LL` the low (warning) limit
            let (limits, wire_type) = if let Some(t) = entry.kind.strip_suffix("_LH") {
                (&mut qos.hard, t)
            } else if let Some(t) = entry.kind.strip_suffix("_LL") {
                (&mut qos.warning, t)
            } else {
                warn!(kind = %entry.kind, "Ignoring unknown QoS limit type");
                continue;
            };

            match METRICS.iter().find(|m| m.wire_type() == wire_type) {
                Some(metric) => limits.set(*metric, entry.value),
                None => warn!(kind = %entry.kind, "Ignoring unknown QoS limit type"),
            }
        }
        qos
    }
}

// =============================================================================
// Operations
// =============================================================================

impl Client {
    /// Get the limits of a group or user.
    #[instrument(skip(self), fields(target = %target))]
    pub async fn get_quality_of_service(
        &self,
        target: &QosTarget,
        region: Option<&str>,
    ) -> Result<QualityOfService> {
        let request = self
            .request(Method::GET, "/qos/limits")
            .query(&target.query(region));

        let response: QosResponse = self.fetch(request, "GET /qos/limits").await?;
        Ok(response.into())
    }

    /// Replace every limit of a group or user.
    #[instrument(skip(self, qos), fields(target = %target))]
    pub async fn set_quality_of_service(
        &self,
        target: &QosTarget,
        region: Option<&str>,
        qos: &QualityOfService,
    ) -> Result<()> {
        let limits: Vec<(&'static str, String)> = METRICS
            .iter()
            .flat_map(|&metric| {
                [
                    (metric.hard_param(), qos.hard.get(metric).to_string()),
                    (metric.warning_param(), qos.warning.get(metric).to_string()),
                ]
            })
            .collect();

        let request = self
            .request(Method::POST, "/qos/limits")
            .query(&target.query(region))
            .query(&limits);

        self.execute(request, "POST /qos/limits").await
    }

    /// Reset the limits of a group or user to unlimited.
    #[instrument(skip(self), fields(target = %target))]
    pub async fn delete_quality_of_service(
        &self,
        target: &QosTarget,
        region: Option<&str>,
    ) -> Result<()> {
        let request = self
            .request(Method::DELETE, "/qos/limits")
            .query(&target.query(region));

        self.execute(request, "DELETE /qos/limits").await
    }
}
