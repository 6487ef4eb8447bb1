//! Pipeline configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::{PipelineError, PipelineResult};

/// Default `$select` projection for exported user records.
pub const DEFAULT_SELECT_FIELDS: &[&str] = &[
    "id",
    "userPrincipalName",
    "displayName",
    "givenName",
    "surname",
    "mail",
    "otherMails",
    "mobilePhone",
    "streetAddress",
    "city",
    "state",
    "postalCode",
    "country",
    "accountEnabled",
    "identities",
];

/// Configuration for one export run.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Object storage container receiving exported pages.
    pub container: String,
    /// Directory page size (`$top`).
    pub page_size: usize,
    /// `$select` projection; defaults to [`DEFAULT_SELECT_FIELDS`].
    pub select_fields: Vec<String>,
    /// Case-insensitive substring filter on display name or UPN, applied
    /// client-side because the API filter grammar cannot express it.
    pub name_filter: Option<String>,
    /// Stop after exporting this many users.
    pub max_users: Option<usize>,
    /// Delay between page fetches to smooth throughput.
    pub inter_page_delay: Option<Duration>,
}

impl ExportConfig {
    /// Creates a config with defaults for the given container.
    #[must_use]
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            page_size: 100,
            select_fields: DEFAULT_SELECT_FIELDS.iter().map(ToString::to_string).collect(),
            name_filter: None,
            max_users: None,
            inter_page_delay: None,
        }
    }

    /// Validates the configuration. Violations are fatal at startup.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.container.is_empty() {
            return Err(PipelineError::Config("container must not be empty".into()));
        }
        if self.page_size == 0 {
            return Err(PipelineError::Config("page_size must be > 0".into()));
        }
        Ok(())
    }
}

/// Sign-in type the import guarantees on every written record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSignInType {
    /// Local accounts signing in with an email address (password mode).
    EmailAddress,
    /// Federated email identities (one-time-passcode mode).
    Federated,
}

impl TargetSignInType {
    /// The wire value of the sign-in type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TargetSignInType::EmailAddress => "emailAddress",
            TargetSignInType::Federated => "federated",
        }
    }

    /// The issuer a synthesized identity of this type carries.
    /// Federated email identities are issued by `mail`.
    #[must_use]
    pub fn synthesized_issuer<'a>(self, target_domain: &'a str) -> &'a str {
        match self {
            TargetSignInType::EmailAddress => target_domain,
            TargetSignInType::Federated => "mail",
        }
    }
}

/// Configuration for one import run.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Object storage container holding exported pages.
    pub container: String,
    /// Target tenant domain appended by the UPN transform.
    pub target_domain: String,
    /// Caller-facing batch size; the wire layer re-chunks at its own ceiling.
    pub batch_size: usize,
    /// Application id namespacing extension attributes in the target tenant.
    pub extension_app_id: String,
    /// Source attribute key → target attribute key renames.
    pub attribute_map: BTreeMap<String, String>,
    /// Attribute keys dropped on import. A key that is also mapped is
    /// renamed, not dropped: mapping wins.
    pub attribute_exclude: Vec<String>,
    /// Store the source object id on the imported record.
    pub store_object_id: bool,
    /// Name of the store-original-id attribute (namespaced at use).
    pub object_id_attribute_name: String,
    /// Set the require-migration flag on the imported record.
    pub set_requires_migration: bool,
    /// Name of the require-migration attribute (namespaced at use).
    pub requires_migration_attribute_name: String,
    /// Sign-in type guaranteed on every imported record.
    pub target_sign_in_type: TargetSignInType,
    /// Reconcile tracking attributes onto already-existing duplicates.
    pub overwrite_duplicate_attributes: bool,
    /// Delay between batch writes to smooth throughput.
    pub inter_batch_delay: Option<Duration>,
}

impl ImportConfig {
    /// Creates a config with defaults for the given container, target
    /// domain and extension app id.
    #[must_use]
    pub fn new(
        container: impl Into<String>,
        target_domain: impl Into<String>,
        extension_app_id: impl Into<String>,
    ) -> Self {
        Self {
            container: container.into(),
            target_domain: target_domain.into(),
            batch_size: 20,
            extension_app_id: extension_app_id.into(),
            attribute_map: BTreeMap::new(),
            attribute_exclude: Vec::new(),
            store_object_id: true,
            object_id_attribute_name: "B2CObjectId".to_string(),
            set_requires_migration: true,
            requires_migration_attribute_name: "RequiresMigration".to_string(),
            target_sign_in_type: TargetSignInType::EmailAddress,
            overwrite_duplicate_attributes: false,
            inter_batch_delay: None,
        }
    }

    /// Validates the configuration. Violations are fatal at startup, never
    /// per-record errors.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.container.is_empty() {
            return Err(PipelineError::Config("container must not be empty".into()));
        }
        if self.target_domain.is_empty() || self.target_domain.contains('@') {
            return Err(PipelineError::Config(format!(
                "target_domain '{}' must be a bare domain",
                self.target_domain
            )));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::Config("batch_size must be > 0".into()));
        }
        if self.extension_app_id.is_empty() {
            return Err(PipelineError::Config(
                "extension_app_id must be configured".into(),
            ));
        }
        // The directory derives attribute names as extension_{appId}_{name};
        // separator characters in the app id break that derivation.
        if self.extension_app_id.contains('-') || self.extension_app_id.contains('_') {
            return Err(PipelineError::Config(format!(
                "extension_app_id '{}' must not contain separator characters",
                self.extension_app_id
            )));
        }
        Ok(())
    }

    /// Fully namespaced name of an extension attribute.
    #[must_use]
    pub fn extension_attribute(&self, name: &str) -> String {
        format!("extension_{}_{}", self.extension_app_id, name)
    }

    /// Namespaced store-original-id attribute name.
    #[must_use]
    pub fn object_id_attribute(&self) -> String {
        self.extension_attribute(&self.object_id_attribute_name)
    }

    /// Namespaced require-migration attribute name.
    #[must_use]
    pub fn requires_migration_attribute(&self) -> String {
        self.extension_attribute(&self.requires_migration_attribute_name)
    }
}
