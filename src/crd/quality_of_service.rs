//! Quality of service CRDs
//!
//! GroupQualityOfServiceLimits and UserQualityOfServiceLimits share the
//! [`QualityOfServiceLimits`] block. Sizes are Kubernetes style quantities
//! (`10Gi`, `500M`) and are sent to Cloudian in KiB.

use crate::cloudian::ByteSize;
use crate::crd::{ResourceSpec, ResourceStatus};
use crate::error::{Error, Result};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// =============================================================================
// Quantity
// =============================================================================

/// Largest quantity accepted, in bytes. Cloudian stores limits as signed 64 bit.
const MAX_BYTES: u128 = i64::MAX as u128;

/// Admission pattern of a quantity, the grammar `parse_bytes` accepts.
pub const QUANTITY_PATTERN: &str = r"^[0-9]+(\.[0-9]+)?(Ki|Mi|Gi|Ti|Pi|Ei|k|M|G|T|P|E)?$";

/// A size such as `1.5Gi` or `300M`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Quantity(
    // Same text as QUANTITY_PATTERN, the attribute needs a literal
    #[schemars(regex(pattern = r"^[0-9]+(\.[0-9]+)?(Ki|Mi|Gi|Ti|Pi|Ei|k|M|G|T|P|E)?$"))]
    pub String,
);

impl Quantity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The quantity in KiB, truncated. Fractional bytes round up first.
    pub fn to_kib(&self) -> Result<ByteSize> {
        let bytes = parse_bytes(&self.0)?;
        Ok(ByteSize::from_kib((bytes / 1024) as u64))
    }

    /// [`Quantity::to_kib`] lifted over an optional quantity.
    pub fn optional_kib(quantity: Option<&Quantity>) -> Result<Option<ByteSize>> {
        quantity.map(Quantity::to_kib).transpose()
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn invalid(value: &str, reason: impl Into<String>) -> Error {
    Error::InvalidQuantity {
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn multiplier(suffix: &str) -> Option<u128> {
    let (base, exp): (u128, u32) = match suffix {
        "" => (1, 0),
        "Ki" => (1024, 1),
        "Mi" => (1024, 2),
        "Gi" => (1024, 3),
        "Ti" => (1024, 4),
        "Pi" => (1024, 5),
        "Ei" => (1024, 6),
        "k" => (1000, 1),
        "M" => (1000, 2),
        "G" => (1000, 3),
        "T" => (1000, 4),
        "P" => (1000, 5),
        "E" => (1000, 6),
        _ => return None,
    };
    Some(base.pow(exp))
}

/// Parse `<digits>[.<digits>]<suffix>` into a byte count.
fn parse_bytes(value: &str) -> Result<u128> {
    let number_end = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(number_end);

    let multiplier = multiplier(suffix)
        .ok_or_else(|| invalid(value, format!("unknown suffix {:?}", suffix)))?;

    let (whole, fraction) = match number.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (number, ""),
    };
    if whole.is_empty() || fraction.contains('.') || (number.contains('.') && fraction.is_empty()) {
        return Err(invalid(value, "expected <digits>[.<digits>]<suffix>"));
    }

    // Digits beyond 10^-18 cannot change the rounded result of a 2^60 multiplier
    let fraction = fraction.trim_end_matches('0');
    if fraction.len() > 18 {
        return Err(invalid(value, "too many fractional digits"));
    }

    let whole: u128 = whole
        .parse()
        .map_err(|_| invalid(value, "integer part out of range"))?;
    let mut bytes = whole
        .checked_mul(multiplier)
        .filter(|b| *b <= MAX_BYTES)
        .ok_or_else(|| invalid(value, "out of range"))?;

    if !fraction.is_empty() {
        let numerator: u128 = fraction
            .parse()
            .map_err(|_| invalid(value, "fraction out of range"))?;
        let denominator = 10u128.pow(fraction.len() as u32);
        // Round partial bytes up
        bytes += (numerator * multiplier).div_ceil(denominator);
    }

    if bytes > MAX_BYTES {
        return Err(invalid(value, "out of range"));
    }
    Ok(bytes)
}

// =============================================================================
// Limits
// =============================================================================

/// One level of limits. Fields left unset are not managed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QualityOfServiceLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_quota_bytes: Option<Quantity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_quota_count: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_per_min: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inbound_bytes_per_min: Option<Quantity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound_bytes_per_min: Option<Quantity>,
}

// =============================================================================
// GroupQualityOfServiceLimits
// =============================================================================

/// QoS limits of a whole Cloudian group.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "user.cloudian.crossplane.io",
    version = "v1alpha1",
    kind = "GroupQualityOfServiceLimits",
    plural = "groupqualityofservicelimits",
    status = "QualityOfServiceStatus",
    category = "crossplane",
    category = "managed",
    category = "cloudian",
    printcolumn = r#"{"name": "Group ID", "type": "string", "jsonPath": ".spec.forProvider.groupId"}"#,
    printcolumn = r#"{"name": "External Name", "type": "string", "jsonPath": ".metadata.annotations.crossplane\\.io/external-name"}"#,
    printcolumn = r#"{"name": "Ready", "type": "string", "jsonPath": ".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name": "Synced", "type": "string", "jsonPath": ".status.conditions[?(@.type=='Synced')].status"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct GroupQualityOfServiceLimitsSpec {
    #[serde(flatten)]
    pub resource: ResourceSpec,

    pub for_provider: GroupQualityOfServiceLimitsParameters,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupQualityOfServiceLimitsParameters {
    pub group_id: String,

    /// Region the limits apply to; all regions when empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<QualityOfServiceLimits>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard: Option<QualityOfServiceLimits>,
}

// =============================================================================
// UserQualityOfServiceLimits
// =============================================================================

/// QoS limits of a single Cloudian user.
#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "user.cloudian.crossplane.io",
    version = "v1alpha1",
    kind = "UserQualityOfServiceLimits",
    plural = "userqualityofservicelimits",
    status = "QualityOfServiceStatus",
    category = "crossplane",
    category = "managed",
    category = "cloudian",
    printcolumn = r#"{"name": "Group ID", "type": "string", "jsonPath": ".spec.forProvider.groupId"}"#,
    printcolumn = r#"{"name": "User ID", "type": "string", "jsonPath": ".spec.forProvider.userId"}"#,
    printcolumn = r#"{"name": "External Name", "type": "string", "jsonPath": ".metadata.annotations.crossplane\\.io/external-name"}"#,
    printcolumn = r#"{"name": "Ready", "type": "string", "jsonPath": ".status.conditions[?(@.type=='Ready')].status"}"#,
    printcolumn = r#"{"name": "Synced", "type": "string", "jsonPath": ".status.conditions[?(@.type=='Synced')].status"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#,
    namespaced = false
)]
#[serde(rename_all = "camelCase")]
pub struct UserQualityOfServiceLimitsSpec {
    #[serde(flatten)]
    pub resource: ResourceSpec,

    pub for_provider: UserQualityOfServiceLimitsParameters,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserQualityOfServiceLimitsParameters {
    pub group_id: String,

    pub user_id: String,

    /// Region the limits apply to; all regions when empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<QualityOfServiceLimits>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hard: Option<QualityOfServiceLimits>,
}

/// Status shared by both QoS kinds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QualityOfServiceStatus {
    #[serde(flatten)]
    pub resource: ResourceStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudian::{GB, KB, MB, TB};
    use assert_matches::assert_matches;

    fn kib(value: &str) -> u64 {
        Quantity::new(value).to_kib().unwrap().kb()
    }

    #[test]
    fn test_binary_suffixes() {
        assert_eq!(kib("1Ki"), KB.kb());
        assert_eq!(kib("512Mi"), (512 * MB).kb());
        assert_eq!(kib("10Gi"), (10 * GB).kb());
        assert_eq!(kib("3Ti"), (3 * TB).kb());
        assert_eq!(kib("1Pi"), 1 << 40);
        assert_eq!(kib("1Ei"), 1 << 50);
    }

    #[test]
    fn test_decimal_suffixes() {
        assert_eq!(kib("1k"), 0);
        assert_eq!(kib("2048"), 2);
        assert_eq!(kib("1M"), 976);
        assert_eq!(kib("1G"), 976_562);
        assert_eq!(kib("5T"), 5_000_000_000_000 / 1024);
        assert_eq!(kib("2E"), 2_000_000_000_000_000_000 / 1024);
    }

    #[test]
    fn test_fractions_round_bytes_up() {
        assert_eq!(kib("1.5Gi"), (3 * GB).kb() / 2);
        assert_eq!(kib("0.5Ki"), 0);
        // 1.0000001Ki = 1024.0001024 bytes, rounded to 1025
        assert_eq!(Quantity::new("1.0000001Ki").to_kib().unwrap().kb(), 1);
        assert_eq!(parse_bytes("1.0000001Ki").unwrap(), 1025);
        assert_eq!(parse_bytes("1.50").unwrap(), 2);
    }

    #[test]
    fn test_invalid_quantities() {
        for value in ["", "Gi", "1.2.3Gi", "1.Gi", ".5Gi", "10GB", "-1Gi", "1 Gi", "10E", "8Ei"] {
            assert_matches!(
                Quantity::new(value).to_kib(),
                Err(Error::InvalidQuantity { .. }),
                "{:?}",
                value
            );
        }
    }

    #[test]
    fn test_optional_kib() {
        assert_eq!(Quantity::optional_kib(None).unwrap(), None);
        assert_eq!(
            Quantity::optional_kib(Some(&Quantity::new("1Mi"))).unwrap(),
            Some(MB)
        );
        assert!(Quantity::optional_kib(Some(&Quantity::new("1x"))).is_err());
    }

    #[test]
    fn test_quantity_schema_carries_pattern() {
        let schema = serde_json::to_value(schemars::schema_for!(Quantity)).unwrap();
        assert_eq!(schema["type"], "string");
        assert_eq!(schema["pattern"], QUANTITY_PATTERN);
    }

    #[test]
    fn test_group_crd_validates_quantities() {
        use kube::CustomResourceExt;

        let crd = serde_json::to_value(GroupQualityOfServiceLimits::crd()).unwrap();
        let hard = &crd["spec"]["versions"][0]["schema"]["openAPIV3Schema"]["properties"]["spec"]
            ["properties"]["forProvider"]["properties"]["hard"]["properties"];
        assert_eq!(hard["storageQuotaBytes"]["pattern"], QUANTITY_PATTERN);
        assert_eq!(hard["inboundBytesPerMin"]["pattern"], QUANTITY_PATTERN);
    }

    #[test]
    fn test_group_limits_spec() {
        let spec: GroupQualityOfServiceLimitsSpec = serde_json::from_value(serde_json::json!({
            "forProvider": {
                "groupId": "QA",
                "hard": {"storageQuotaBytes": "3Ti", "requestsPerMin": 1000}
            }
        }))
        .unwrap();

        assert_eq!(spec.for_provider.region, "");
        assert_eq!(spec.for_provider.warning, None);
        let hard = spec.for_provider.hard.unwrap();
        assert_eq!(hard.storage_quota_bytes, Some(Quantity::new("3Ti")));
        assert_eq!(hard.requests_per_min, Some(1000));
        assert_eq!(hard.outbound_bytes_per_min, None);
    }
}
