//! Per-record transformation applied by the import pipeline.
//!
//! The UPN domain transform is the identity bridge between tenants: the
//! local part is kept verbatim and the domain swapped, so the JIT handler
//! can invert it exactly. All other steps (attribute mapping, tracking
//! attributes, identity normalization, the email-identity guarantee and
//! password injection) prepare the record for creation in the target
//! tenant.

use std::collections::BTreeMap;

use rand::RngCore;
use tracing::debug;

use idbridge_graph::{ExtensionValue, Identity, PasswordProfile, UserProfile};

use crate::config::ImportConfig;
use crate::password::generate_password;

/// Rewrites a UPN onto the target domain, preserving the local part
/// verbatim (including any `#EXT#`-style markers).
///
/// An empty or missing local part is replaced by a random 8-hex-character
/// fallback so the result is always a well-formed UPN.
#[must_use]
pub fn transform_upn(upn: &str, target_domain: &str) -> String {
    let local = match upn.split_once('@') {
        Some((local, _domain)) => local,
        None => upn,
    };
    if local.is_empty() {
        let fallback = random_hex_local();
        debug!(fallback = %fallback, "Empty UPN local part, generated fallback");
        return format!("{fallback}@{target_domain}");
    }
    format!("{local}@{target_domain}")
}

/// Inverts [`transform_upn`]: rewrites a target-tenant UPN back onto the
/// source domain. Fails closed (`None`) when the identifier cannot be
/// split into a non-empty local part and a domain.
#[must_use]
pub fn reverse_upn(upn: &str, source_domain: &str) -> Option<String> {
    match upn.split_once('@') {
        Some((local, _domain)) if !local.is_empty() => {
            Some(format!("{local}@{source_domain}"))
        }
        _ => None,
    }
}

/// Random 8-hex-character local part for records with no usable UPN.
fn random_hex_local() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Applies the configured import transform to source records.
#[derive(Debug)]
pub struct UserTransformer {
    config: ImportConfig,
}

impl UserTransformer {
    /// Creates a transformer over a validated import configuration.
    #[must_use]
    pub fn new(config: ImportConfig) -> Self {
        Self { config }
    }

    /// Transforms one source record into a create-ready target record.
    ///
    /// Steps run in a fixed order: attribute mapping, tracking-attribute
    /// injection, UPN transform, identity normalization, email-identity
    /// guarantee, password injection. The source object id is captured into
    /// the tracking attribute and cleared from the record — the target
    /// tenant assigns its own.
    #[must_use]
    pub fn transform(&self, mut profile: UserProfile) -> UserProfile {
        let source_id = profile.id.take();

        profile.extension_attributes = self.map_attributes(profile.extension_attributes);
        self.inject_tracking_attributes(&mut profile, source_id.as_deref());

        let upn = transform_upn(
            profile.user_principal_name.as_deref().unwrap_or_default(),
            &self.config.target_domain,
        );
        profile.user_principal_name = Some(upn.clone());

        self.normalize_identities(&mut profile, &upn);
        self.ensure_target_identity(&mut profile, &upn);

        profile.password_profile = Some(PasswordProfile {
            password: generate_password(),
            // JIT migration relies on a password mismatch at first login;
            // a forced reset would bypass it.
            force_change_password_next_sign_in: false,
        });

        profile
    }

    /// Renames mapped keys, drops excluded ones, passes the rest through.
    /// Mapping wins when a key appears in both lists.
    fn map_attributes(
        &self,
        attributes: BTreeMap<String, ExtensionValue>,
    ) -> BTreeMap<String, ExtensionValue> {
        let mut mapped = BTreeMap::new();
        for (key, value) in attributes {
            if let Some(target_key) = self.config.attribute_map.get(&key) {
                mapped.insert(target_key.clone(), value);
            } else if self.config.attribute_exclude.contains(&key) {
                continue;
            } else {
                mapped.insert(key, value);
            }
        }
        mapped
    }

    fn inject_tracking_attributes(&self, profile: &mut UserProfile, source_id: Option<&str>) {
        if self.config.store_object_id {
            if let Some(id) = source_id {
                profile
                    .extension_attributes
                    .insert(self.config.object_id_attribute(), id.into());
            }
        }
        if self.config.set_requires_migration {
            profile
                .extension_attributes
                .insert(self.config.requires_migration_attribute(), true.into());
        }
    }

    /// Points every identity's issuer at the target domain and re-derives
    /// `userPrincipalName`-typed identity values with the UPN transform so
    /// they match the profile's UPN. `userName` identities keep their value.
    fn normalize_identities(&self, profile: &mut UserProfile, transformed_upn: &str) {
        for identity in &mut profile.identities {
            identity.issuer = self.config.target_domain.clone();
            if identity.sign_in_type == "userPrincipalName" {
                identity.issuer_assigned_id = transformed_upn.to_string();
            }
        }
    }

    /// Guarantees one identity of the configured target sign-in type,
    /// preferring the mail field and falling back to the transformed UPN
    /// for username-only source accounts. Never duplicates an existing one.
    fn ensure_target_identity(&self, profile: &mut UserProfile, transformed_upn: &str) {
        let sign_in_type = self.config.target_sign_in_type.as_str();
        if profile.identity_of_type(sign_in_type).is_some() {
            return;
        }

        let value = profile
            .mail
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| transformed_upn.to_string());
        let issuer = self
            .config
            .target_sign_in_type
            .synthesized_issuer(&self.config.target_domain)
            .to_string();

        profile
            .identities
            .push(Identity::new(sign_in_type, issuer, value));
    }
}
