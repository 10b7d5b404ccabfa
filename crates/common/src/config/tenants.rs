//! Tenant configuration resolver
//!
//! Tenants are declared with plain environment variables, read once at
//! startup:
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `TENANT_IDS` | comma separated tenant identifiers |
//! | `AI_MODEL_<id>` | model name used for the tenant |
//! | `OPENAI_API_KEY_<id>` | tenant API key, falls back to `OPENAI_API_KEY_<model>` |
//! | `TELEGRAM_BOT_TOKEN_<id>` / `TELEGRAM_CHAT_ID_<id>` | relay target |
//! | `TELEGRAM_BOT_USERNAME_<id>` | mention the webhook answers to |
//! | `STORAGE_DIR_<id>` | storage override, default `<data_dir>/<id>` |
//! | `TENANT_FEATURES_<id>` | any of `retrieval,history,notify` |

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Resolution failures, kept apart so operators can tell a typo from a missing secret
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Unknown tenant: {tenant_id}")]
    UnknownTenant { tenant_id: String },

    #[error("Tenant {tenant_id} is missing configuration: {}", .missing.join(", "))]
    IncompleteConfiguration {
        tenant_id: String,
        missing: Vec<String>,
    },
}

/// Optional pipeline stages enabled for a tenant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub uses_retrieval: bool,
    pub uses_history: bool,
    pub notify: bool,
}

impl Capabilities {
    /// Parse a `retrieval,history,notify` style list; unknown entries are reported back
    pub fn parse(raw: &str) -> (Self, Vec<String>) {
        let mut caps = Self::default();
        let mut unknown = Vec::new();

        for feature in raw.split(',').map(str::trim).filter(|f| !f.is_empty()) {
            match feature.to_ascii_lowercase().as_str() {
                "retrieval" | "rag" => caps.uses_retrieval = true,
                "history" => caps.uses_history = true,
                "notify" | "telegram" => caps.notify = true,
                _ => unknown.push(feature.to_string()),
            }
        }

        (caps, unknown)
    }
}

/// Fully resolved configuration of one tenant
#[derive(Clone)]
pub struct TenantConfig {
    pub tenant_id: String,
    pub model_name: String,
    pub model_api_key: String,
    pub notification_bot_token: Option<String>,
    pub notification_channel_id: Option<String>,
    pub telegram_bot_username: Option<String>,
    pub storage_location: PathBuf,
    pub capabilities: Capabilities,
}

impl TenantConfig {
    /// SQLite file holding chat and inquiry records
    pub fn database_path(&self) -> PathBuf {
        self.storage_location.join("chat.db")
    }

    /// Folder the index builder reads from
    pub fn documents_dir(&self) -> PathBuf {
        self.storage_location.join("documents")
    }

    /// Folder holding the index artifact
    pub fn index_dir(&self) -> PathBuf {
        self.storage_location.join("index")
    }

    /// Bot token and channel, when both are configured
    pub fn notification_target(&self) -> Option<(&str, &str)> {
        match (&self.notification_bot_token, &self.notification_channel_id) {
            (Some(token), Some(channel)) => Some((token.as_str(), channel.as_str())),
            _ => None,
        }
    }
}

impl fmt::Debug for TenantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantConfig")
            .field("tenant_id", &self.tenant_id)
            .field("model_name", &self.model_name)
            .field("model_api_key", &mask(&self.model_api_key))
            .field(
                "notification_bot_token",
                &self.notification_bot_token.as_deref().map(mask),
            )
            .field("notification_channel_id", &self.notification_channel_id)
            .field("telegram_bot_username", &self.telegram_bot_username)
            .field("storage_location", &self.storage_location)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

fn mask(secret: &str) -> String {
    let prefix: String = secret.chars().take(5).collect();
    format!("{}*****", prefix)
}

#[derive(Debug, Clone)]
enum TenantEntry {
    Ready(Arc<TenantConfig>),
    Incomplete(Vec<String>),
}

/// Immutable set of tenants known to the process
#[derive(Debug, Clone, Default)]
pub struct TenantRegistry {
    entries: HashMap<String, TenantEntry>,
}

impl TenantRegistry {
    /// Build the registry from the process environment
    pub fn from_process_env(data_dir: &Path) -> Self {
        Self::from_env(std::env::vars(), data_dir)
    }

    /// Build the registry from an explicit set of variables
    pub fn from_env<I, K, V>(vars: I, data_dir: &Path) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(_, v)| !v.trim().is_empty())
            .collect();

        let mut entries = HashMap::new();

        let ids = vars.get("TENANT_IDS").map(String::as_str).unwrap_or("");
        for tenant_id in ids.split(',').map(str::trim).filter(|id| !id.is_empty()) {
            if !is_valid_tenant_id(tenant_id) {
                warn!(tenant_id, "Skipping tenant with invalid identifier");
                continue;
            }

            let entry = Self::load_tenant(tenant_id, &vars, data_dir);
            match &entry {
                TenantEntry::Ready(config) => info!(
                    tenant_id,
                    model = %config.model_name,
                    retrieval = config.capabilities.uses_retrieval,
                    history = config.capabilities.uses_history,
                    notify = config.capabilities.notify,
                    "Tenant configuration loaded"
                ),
                TenantEntry::Incomplete(missing) => warn!(
                    tenant_id,
                    missing = %missing.join(","),
                    "Tenant configuration incomplete"
                ),
            }
            entries.insert(tenant_id.to_string(), entry);
        }

        if entries.is_empty() {
            warn!("No tenants configured, set TENANT_IDS");
        }

        Self { entries }
    }

    fn load_tenant(
        tenant_id: &str,
        vars: &HashMap<String, String>,
        data_dir: &Path,
    ) -> TenantEntry {
        let get = |prefix: &str, key: &str| vars.get(&format!("{}_{}", prefix, key)).cloned();
        let mut missing = Vec::new();

        let model_name = get("AI_MODEL", tenant_id);
        let model_api_key = get("OPENAI_API_KEY", tenant_id).or_else(|| {
            model_name
                .as_deref()
                .and_then(|model| get("OPENAI_API_KEY", model))
        });

        if model_name.is_none() {
            missing.push(format!("AI_MODEL_{}", tenant_id));
        }
        if model_api_key.is_none() {
            missing.push(format!("OPENAI_API_KEY_{}", tenant_id));
        }

        let (capabilities, unknown) = get("TENANT_FEATURES", tenant_id)
            .map(|raw| Capabilities::parse(&raw))
            .unwrap_or_default();
        if !unknown.is_empty() {
            warn!(tenant_id, unknown = %unknown.join(","), "Ignoring unknown tenant features");
        }

        let notification_bot_token = get("TELEGRAM_BOT_TOKEN", tenant_id);
        let notification_channel_id = get("TELEGRAM_CHAT_ID", tenant_id);
        if capabilities.notify {
            if notification_bot_token.is_none() {
                missing.push(format!("TELEGRAM_BOT_TOKEN_{}", tenant_id));
            }
            if notification_channel_id.is_none() {
                missing.push(format!("TELEGRAM_CHAT_ID_{}", tenant_id));
            }
        }

        let (Some(model_name), Some(model_api_key)) = (model_name, model_api_key) else {
            return TenantEntry::Incomplete(missing);
        };
        if !missing.is_empty() {
            return TenantEntry::Incomplete(missing);
        }

        let storage_location = get("STORAGE_DIR", tenant_id)
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(tenant_id));

        TenantEntry::Ready(Arc::new(TenantConfig {
            tenant_id: tenant_id.to_string(),
            model_name,
            model_api_key,
            notification_bot_token,
            notification_channel_id,
            telegram_bot_username: get("TELEGRAM_BOT_USERNAME", tenant_id)
                .map(|name| name.trim_start_matches('@').to_string()),
            storage_location,
            capabilities,
        }))
    }

    /// Build a registry from already resolved tenants
    pub fn from_tenants(tenants: impl IntoIterator<Item = TenantConfig>) -> Self {
        let entries = tenants
            .into_iter()
            .map(|t| (t.tenant_id.clone(), TenantEntry::Ready(Arc::new(t))))
            .collect();
        Self { entries }
    }

    /// Resolve a tenant identifier to its configuration
    pub fn resolve(&self, tenant_id: &str) -> Result<Arc<TenantConfig>, ConfigurationError> {
        match self.entries.get(tenant_id) {
            Some(TenantEntry::Ready(config)) => Ok(config.clone()),
            Some(TenantEntry::Incomplete(missing)) => {
                Err(ConfigurationError::IncompleteConfiguration {
                    tenant_id: tenant_id.to_string(),
                    missing: missing.clone(),
                })
            }
            None => Err(ConfigurationError::UnknownTenant {
                tenant_id: tenant_id.to_string(),
            }),
        }
    }

    /// Fully configured tenants, sorted by identifier
    pub fn ready_tenants(&self) -> Vec<Arc<TenantConfig>> {
        let mut tenants: Vec<_> = self
            .entries
            .values()
            .filter_map(|entry| match entry {
                TenantEntry::Ready(config) => Some(config.clone()),
                TenantEntry::Incomplete(_) => None,
            })
            .collect();
        tenants.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        tenants
    }

    /// All declared tenant identifiers, sorted
    pub fn tenant_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn is_valid_tenant_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(vars: &[(&str, &str)]) -> TenantRegistry {
        TenantRegistry::from_env(vars.iter().copied(), Path::new("/srv/chatforge"))
    }

    #[test]
    fn test_resolves_model_key_by_model_name() {
        let registry = registry(&[
            ("TENANT_IDS", "acme, globex"),
            ("AI_MODEL_acme", "gpt-4-turbo"),
            ("OPENAI_API_KEY_gpt-4-turbo", "sk-model-key"),
            ("AI_MODEL_globex", "gpt-3.5-turbo"),
            ("OPENAI_API_KEY_globex", "sk-tenant-key"),
        ]);

        let acme = registry.resolve("acme").unwrap();
        assert_eq!(acme.model_name, "gpt-4-turbo");
        assert_eq!(acme.model_api_key, "sk-model-key");
        assert_eq!(acme.storage_location, PathBuf::from("/srv/chatforge/acme"));
        assert_eq!(acme.capabilities, Capabilities::default());

        let globex = registry.resolve("globex").unwrap();
        assert_eq!(globex.model_api_key, "sk-tenant-key");
    }

    #[test]
    fn test_unknown_and_incomplete_are_distinct() {
        let registry = registry(&[
            ("TENANT_IDS", "acme"),
            ("AI_MODEL_acme", "gpt-4-turbo"),
        ]);

        assert_eq!(
            registry.resolve("acne").unwrap_err(),
            ConfigurationError::UnknownTenant { tenant_id: "acne".into() }
        );

        match registry.resolve("acme").unwrap_err() {
            ConfigurationError::IncompleteConfiguration { tenant_id, missing } => {
                assert_eq!(tenant_id, "acme");
                assert_eq!(missing, vec!["OPENAI_API_KEY_acme".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_notify_requires_telegram_target() {
        let registry = registry(&[
            ("TENANT_IDS", "acme"),
            ("AI_MODEL_acme", "m1"),
            ("OPENAI_API_KEY_acme", "sk"),
            ("TENANT_FEATURES_acme", "history,notify"),
            ("TELEGRAM_BOT_TOKEN_acme", "123:abc"),
        ]);

        let err = registry.resolve("acme").unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::IncompleteConfiguration { ref missing, .. }
                if missing == &vec!["TELEGRAM_CHAT_ID_acme".to_string()]
        ));
    }

    #[test]
    fn test_capabilities_and_overrides() {
        let registry = registry(&[
            ("TENANT_IDS", "acme,../etc"),
            ("AI_MODEL_acme", "m1"),
            ("OPENAI_API_KEY_acme", "sk"),
            ("TENANT_FEATURES_acme", "retrieval, HISTORY, notify, sparkles"),
            ("TELEGRAM_BOT_TOKEN_acme", "123:abc"),
            ("TELEGRAM_CHAT_ID_acme", "-100200"),
            ("TELEGRAM_BOT_USERNAME_acme", "@acme_bot"),
            ("STORAGE_DIR_acme", "/var/lib/acme"),
        ]);

        assert_eq!(registry.len(), 1);
        let acme = registry.resolve("acme").unwrap();
        assert!(acme.capabilities.uses_retrieval);
        assert!(acme.capabilities.uses_history);
        assert!(acme.capabilities.notify);
        assert_eq!(acme.notification_target(), Some(("123:abc", "-100200")));
        assert_eq!(acme.telegram_bot_username.as_deref(), Some("acme_bot"));
        assert_eq!(acme.database_path(), PathBuf::from("/var/lib/acme/chat.db"));
    }

    #[test]
    fn test_debug_masks_secrets() {
        let registry = registry(&[
            ("TENANT_IDS", "acme"),
            ("AI_MODEL_acme", "m1"),
            ("OPENAI_API_KEY_acme", "sk-very-secret-value"),
        ]);

        let rendered = format!("{:?}", registry.resolve("acme").unwrap());
        assert!(rendered.contains("sk-ve*****"));
        assert!(!rendered.contains("secret-value"));
    }
}
