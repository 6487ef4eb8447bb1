//! Environment-driven configuration for the idbridge binary.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use idbridge_graph::{CredentialConfig, TenantEndpoints};
use idbridge_pipeline::{ExportConfig, ImportConfig, TargetSignInType};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Root directory of the filesystem object store.
    pub store_root: String,
    /// Container name for exported pages and audit records.
    pub container: String,

    /// Source tenant id or default domain.
    pub source_tenant: String,
    /// Source tenant domain restored by the JIT reverse transform.
    pub source_domain: String,
    /// Source-side app credentials, `client_id:secret_name` pairs.
    pub source_credentials: Vec<CredentialConfig>,

    /// Target tenant id or default domain.
    pub target_tenant: String,
    /// Target tenant domain appended by the import UPN transform.
    pub target_domain: String,
    /// Target-side app credentials.
    pub target_credentials: Vec<CredentialConfig>,

    pub export: ExportSettings,
    pub import: ImportSettings,
    pub jit: JitSettings,
}

#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub page_size: usize,
    pub name_filter: Option<String>,
    pub max_users: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub batch_size: usize,
    pub extension_app_id: String,
    pub store_object_id: bool,
    pub set_requires_migration: bool,
    pub overwrite_duplicate_attributes: bool,
    pub target_sign_in_type: TargetSignInType,
}

#[derive(Debug, Clone)]
pub struct JitSettings {
    pub listen_addr: SocketAddr,
    /// Secret-store name of the envelope private key PEM.
    pub key_secret_name: String,
    /// App registration for the source-tenant password grant.
    pub client_id: String,
    pub test_mode: bool,
    pub production: bool,
    pub validation_timeout: Duration,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// This allows tests to supply variables without mutating process-global
    /// environment state.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let store_root = reader("IDBRIDGE_STORE_ROOT").unwrap_or_else(|_| "./data".to_string());
        let container = reader("IDBRIDGE_CONTAINER").unwrap_or_else(|_| "exports".to_string());

        let source_tenant = require(&reader, "SOURCE_TENANT")?;
        let source_domain =
            reader("SOURCE_DOMAIN").unwrap_or_else(|_| source_tenant.clone());
        let source_credentials = parse_credentials(&require(&reader, "SOURCE_CREDENTIALS")?)
            .map_err(|e| ConfigError::InvalidValue("SOURCE_CREDENTIALS".into(), e))?;

        let target_tenant = require(&reader, "TARGET_TENANT")?;
        let target_domain =
            reader("TARGET_DOMAIN").unwrap_or_else(|_| target_tenant.clone());
        let target_credentials = parse_credentials(&require(&reader, "TARGET_CREDENTIALS")?)
            .map_err(|e| ConfigError::InvalidValue("TARGET_CREDENTIALS".into(), e))?;

        let export = ExportSettings {
            page_size: parse_or(&reader, "EXPORT_PAGE_SIZE", 100)?,
            name_filter: reader("EXPORT_NAME_FILTER").ok().filter(|v| !v.is_empty()),
            max_users: match reader("EXPORT_MAX_USERS") {
                Ok(v) => Some(v.parse::<usize>().map_err(|e| {
                    ConfigError::InvalidValue("EXPORT_MAX_USERS".into(), e.to_string())
                })?),
                Err(_) => None,
            },
        };

        let target_sign_in_type = match reader("TARGET_SIGN_IN_TYPE")
            .unwrap_or_else(|_| "emailAddress".to_string())
            .as_str()
        {
            "emailAddress" => TargetSignInType::EmailAddress,
            "federated" => TargetSignInType::Federated,
            other => {
                return Err(ConfigError::InvalidValue(
                    "TARGET_SIGN_IN_TYPE".into(),
                    format!("unknown sign-in type '{other}'"),
                ))
            }
        };
        let import = ImportSettings {
            batch_size: parse_or(&reader, "IMPORT_BATCH_SIZE", 20)?,
            extension_app_id: require(&reader, "EXTENSION_APP_ID")?,
            store_object_id: parse_bool(&reader, "STORE_OBJECT_ID", true),
            set_requires_migration: parse_bool(&reader, "SET_REQUIRES_MIGRATION", true),
            overwrite_duplicate_attributes: parse_bool(
                &reader,
                "OVERWRITE_DUPLICATE_ATTRIBUTES",
                false,
            ),
            target_sign_in_type,
        };

        let listen_addr = reader("JIT_LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("JIT_LISTEN_ADDR".into(), e.to_string()))?;
        let jit = JitSettings {
            listen_addr,
            key_secret_name: reader("JIT_KEY_SECRET_NAME")
                .unwrap_or_else(|_| "jit-envelope-key".to_string()),
            client_id: reader("JIT_CLIENT_ID").unwrap_or_default(),
            test_mode: parse_bool(&reader, "JIT_TEST_MODE", false),
            production: parse_bool(&reader, "PRODUCTION", true),
            validation_timeout: Duration::from_millis(parse_or(
                &reader,
                "JIT_VALIDATION_TIMEOUT_MS",
                1500,
            )? as u64),
        };

        Ok(Self {
            store_root,
            container,
            source_tenant,
            source_domain,
            source_credentials,
            target_tenant,
            target_domain,
            target_credentials,
            export,
            import,
            jit,
        })
    }

    pub fn source_endpoints(&self) -> TenantEndpoints {
        TenantEndpoints::public_cloud(self.source_tenant.clone())
    }

    pub fn target_endpoints(&self) -> TenantEndpoints {
        TenantEndpoints::public_cloud(self.target_tenant.clone())
    }

    pub fn export_config(&self) -> ExportConfig {
        let mut config = ExportConfig::new(self.container.clone());
        config.page_size = self.export.page_size;
        config.name_filter = self.export.name_filter.clone();
        config.max_users = self.export.max_users;
        config
    }

    pub fn import_config(&self) -> ImportConfig {
        let mut config = ImportConfig::new(
            self.container.clone(),
            self.target_domain.clone(),
            self.import.extension_app_id.clone(),
        );
        config.batch_size = self.import.batch_size;
        config.store_object_id = self.import.store_object_id;
        config.set_requires_migration = self.import.set_requires_migration;
        config.overwrite_duplicate_attributes = self.import.overwrite_duplicate_attributes;
        config.target_sign_in_type = self.import.target_sign_in_type;
        config
    }
}

fn require<F>(reader: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    reader(key).map_err(|_| ConfigError::MissingVar(key.to_string()))
}

fn parse_or<F>(reader: &F, key: &str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    match reader(key) {
        Ok(v) => v
            .parse::<usize>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_bool<F>(reader: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    reader(key)
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(default)
}

/// Parses `client_id:secret_name` pairs, comma-separated.
fn parse_credentials(value: &str) -> Result<Vec<CredentialConfig>, String> {
    let mut configs = Vec::new();
    for pair in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (client_id, secret_name) = pair
            .split_once(':')
            .ok_or_else(|| format!("expected client_id:secret_name, got '{pair}'"))?;
        if client_id.is_empty() || secret_name.is_empty() {
            return Err(format!("empty client id or secret name in '{pair}'"));
        }
        configs.push(CredentialConfig {
            client_id: client_id.to_string(),
            secret_name: secret_name.to_string(),
        });
    }
    if configs.is_empty() {
        return Err("at least one credential must be configured".to_string());
    }
    Ok(configs)
}
