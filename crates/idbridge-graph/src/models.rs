//! Wire types for directory user records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One sign-in method binding on a user record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Sign-in type: `emailAddress`, `userName`, `userPrincipalName`, `federated`.
    pub sign_in_type: String,
    /// Issuer domain the identity is scoped to.
    pub issuer: String,
    /// The value the user signs in with.
    pub issuer_assigned_id: String,
}

impl Identity {
    /// Creates a new identity binding.
    pub fn new(
        sign_in_type: impl Into<String>,
        issuer: impl Into<String>,
        issuer_assigned_id: impl Into<String>,
    ) -> Self {
        Self {
            sign_in_type: sign_in_type.into(),
            issuer: issuer.into(),
            issuer_assigned_id: issuer_assigned_id.into(),
        }
    }
}

/// One-time password profile attached to a user create or password set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordProfile {
    /// The password to set.
    pub password: String,
    /// Whether the user must change the password on next sign-in.
    pub force_change_password_next_sign_in: bool,
}

/// Scalar value of a tenant-scoped extension attribute.
///
/// The directory API stores extension attributes as loosely typed scalars;
/// this closes the set to the kinds the migration actually moves. Numbers
/// keep their wire representation so integer-typed extensions round-trip
/// without widening to floats; anything non-scalar in a response collapses
/// to `Null` instead of failing the whole record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExtensionValue {
    String(String),
    Bool(bool),
    Number(serde_json::Number),
    Null,
}

impl<'de> Deserialize<'de> for ExtensionValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => ExtensionValue::String(s),
            serde_json::Value::Bool(b) => ExtensionValue::Bool(b),
            serde_json::Value::Number(n) => ExtensionValue::Number(n),
            _ => ExtensionValue::Null,
        })
    }
}

impl From<&str> for ExtensionValue {
    fn from(v: &str) -> Self {
        ExtensionValue::String(v.to_string())
    }
}

impl From<String> for ExtensionValue {
    fn from(v: String) -> Self {
        ExtensionValue::String(v)
    }
}

impl From<bool> for ExtensionValue {
    fn from(v: bool) -> Self {
        ExtensionValue::Bool(v)
    }
}

impl From<i64> for ExtensionValue {
    fn from(v: i64) -> Self {
        ExtensionValue::Number(v.into())
    }
}

/// Canonical identity record moved between tenants.
///
/// `id` is assigned by the source tenant and is never reused to derive the
/// target object id; the target tenant assigns its own on create.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Source-tenant object id. Absent on records built for creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Sign-in identifier, `local@domain`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_principal_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,

    /// Primary email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mail: Option<String>,

    /// Alternate email addresses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other_mails: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_phone: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub street_address: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(default = "default_account_enabled")]
    pub account_enabled: bool,

    /// Sign-in method bindings. At least one identity of the configured
    /// target sign-in type must exist on every record written to the target.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identities: Vec<Identity>,

    /// Tenant-scoped extension attributes, flattened into the wire object.
    #[serde(flatten)]
    pub extension_attributes: BTreeMap<String, ExtensionValue>,

    /// One-time password profile, set by the import transform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_profile: Option<PasswordProfile>,
}

fn default_account_enabled() -> bool {
    true
}

impl UserProfile {
    /// Returns the first identity of the given sign-in type, if any.
    #[must_use]
    pub fn identity_of_type(&self, sign_in_type: &str) -> Option<&Identity> {
        self.identities
            .iter()
            .find(|i| i.sign_in_type == sign_in_type)
    }

    /// The best display string for logs: UPN, falling back to id.
    #[must_use]
    pub fn log_name(&self) -> &str {
        self.user_principal_name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("<unknown>")
    }
}

/// One failed item from a bounded batch write.
#[derive(Debug, Clone)]
pub struct BatchItemFailure {
    /// Index of the item within the caller's slice.
    pub index: usize,
    /// Item id or UPN, when known.
    pub item_id: String,
    /// HTTP status of the sub-response.
    pub status: u16,
    /// Error message from the API.
    pub message: String,
}

/// Outcome of one bounded batch write operation.
///
/// Invariant: `success + failure + skipped <= total`.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub total: usize,
    pub success: usize,
    pub failure: usize,
    pub skipped: usize,
    /// Per-item failures, excluding duplicates.
    pub failures: Vec<BatchItemFailure>,
    /// Ids (UPNs) skipped because the user already exists.
    pub skipped_ids: Vec<String>,
    /// Source profiles of skipped duplicates, retained for optional
    /// attribute reconciliation.
    pub duplicate_users: Vec<UserProfile>,
    /// Whether any sub-response was throttled.
    pub throttled: bool,
    /// Server-provided retry hint in seconds, when throttled.
    pub retry_after: Option<u64>,
}

impl BatchResult {
    /// Merges another batch result into this one (chunked batch aggregation).
    pub fn merge(&mut self, other: BatchResult) {
        self.total += other.total;
        self.success += other.success;
        self.failure += other.failure;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
        self.skipped_ids.extend(other.skipped_ids);
        self.duplicate_users.extend(other.duplicate_users);
        self.throttled |= other.throttled;
        self.retry_after = match (self.retry_after, other.retry_after) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_profile_wire_shape() {
        let mut profile = UserProfile {
            user_principal_name: Some("alice@target.onmicrosoft.com".into()),
            display_name: Some("Alice".into()),
            identities: vec![Identity::new(
                "emailAddress",
                "target.onmicrosoft.com",
                "alice@example.com",
            )],
            ..Default::default()
        };
        profile
            .extension_attributes
            .insert("extension_abc123_RequiresMigration".into(), true.into());

        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["userPrincipalName"], "alice@target.onmicrosoft.com");
        assert_eq!(json["identities"][0]["signInType"], "emailAddress");
        assert_eq!(json["extension_abc123_RequiresMigration"], true);
        // Unset optionals stay off the wire.
        assert!(json.get("mail").is_none());
        assert!(json.get("passwordProfile").is_none());
    }

    #[test]
    fn test_user_profile_deserializes_extension_attributes() {
        let json = serde_json::json!({
            "id": "src-1",
            "userPrincipalName": "bob@source.onmicrosoft.com",
            "accountEnabled": false,
            "extension_abc123_B2CObjectId": "src-1",
            "extension_abc123_LoyaltyTier": 3
        });

        let profile: UserProfile = serde_json::from_value(json).unwrap();
        assert_eq!(profile.id.as_deref(), Some("src-1"));
        assert!(!profile.account_enabled);
        assert_eq!(
            profile.extension_attributes.get("extension_abc123_B2CObjectId"),
            Some(&ExtensionValue::String("src-1".into()))
        );
        assert_eq!(
            profile.extension_attributes.get("extension_abc123_LoyaltyTier"),
            Some(&ExtensionValue::Number(3.into()))
        );
    }

    #[test]
    fn test_integer_extension_value_keeps_wire_representation() {
        let json = serde_json::json!({ "extension_abc123_LoyaltyTier": 3 });
        let profile: UserProfile = serde_json::from_value(json).unwrap();

        let out = serde_json::to_value(&profile).unwrap();
        assert!(out["extension_abc123_LoyaltyTier"].is_u64());
        assert_eq!(out["extension_abc123_LoyaltyTier"], serde_json::json!(3));
    }

    #[test]
    fn test_nonscalar_extension_fields_do_not_abort_the_record() {
        let json = serde_json::json!({
            "id": "src-1",
            "extension_abc123_Cleared": null,
            "extension_abc123_Tags": ["gold", "beta"]
        });

        let profile: UserProfile = serde_json::from_value(json).unwrap();
        assert_eq!(profile.id.as_deref(), Some("src-1"));
        assert_eq!(
            profile.extension_attributes.get("extension_abc123_Cleared"),
            Some(&ExtensionValue::Null)
        );
        assert_eq!(
            profile.extension_attributes.get("extension_abc123_Tags"),
            Some(&ExtensionValue::Null)
        );
    }

    #[test]
    fn test_account_enabled_defaults_true() {
        let profile: UserProfile =
            serde_json::from_value(serde_json::json!({ "id": "x" })).unwrap();
        assert!(profile.account_enabled);
    }

    #[test]
    fn test_batch_result_merge() {
        let mut a = BatchResult {
            total: 20,
            success: 18,
            skipped: 2,
            skipped_ids: vec!["u1".into(), "u2".into()],
            ..Default::default()
        };
        let b = BatchResult {
            total: 5,
            success: 4,
            failure: 1,
            throttled: true,
            retry_after: Some(30),
            failures: vec![BatchItemFailure {
                index: 3,
                item_id: "u7".into(),
                status: 400,
                message: "bad".into(),
            }],
            ..Default::default()
        };

        a.merge(b);
        assert_eq!(a.total, 25);
        assert_eq!(a.success, 22);
        assert_eq!(a.failure, 1);
        assert_eq!(a.skipped, 2);
        assert!(a.throttled);
        assert_eq!(a.retry_after, Some(30));
        assert!(a.success + a.failure + a.skipped <= a.total);
    }

    #[test]
    fn test_identity_of_type() {
        let profile = UserProfile {
            identities: vec![
                Identity::new("userName", "source.onmicrosoft.com", "bob"),
                Identity::new("emailAddress", "source.onmicrosoft.com", "bob@example.com"),
            ],
            ..Default::default()
        };
        assert_eq!(
            profile.identity_of_type("emailAddress").unwrap().issuer_assigned_id,
            "bob@example.com"
        );
        assert!(profile.identity_of_type("federated").is_none());
    }
}
