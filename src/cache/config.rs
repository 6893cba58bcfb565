//! Cache configuration.
//!
//! Built from the `[cache]` section of the layered settings.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_TTL_SECONDS: u64 = 3600;
const DEFAULT_INSTANCE_PARAMS_TTL_SECONDS: u64 = 86_400;
const DEFAULT_API_ROOT: &str = "/api/v2";
const DEFAULT_LEGACY_API_ROOT: &str = "/api/v1";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Master switch. When off every lookup misses and nothing is stored.
    pub enabled: bool,
    /// Expiry for serialized data, responses and meta-keys. Staleness ceiling only.
    pub default_ttl_seconds: u64,
    /// Expiry for instance parameter entries.
    pub instance_params_ttl_seconds: u64,
    /// Mount point of the current API generation.
    pub api_root: String,
    /// Mount point of the legacy generation; `None` disables version aliases.
    pub legacy_api_root: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_seconds: DEFAULT_TTL_SECONDS,
            instance_params_ttl_seconds: DEFAULT_INSTANCE_PARAMS_TTL_SECONDS,
            api_root: DEFAULT_API_ROOT.to_string(),
            legacy_api_root: Some(DEFAULT_LEGACY_API_ROOT.to_string()),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            default_ttl_seconds: settings.default_ttl_seconds.get(),
            instance_params_ttl_seconds: settings.instance_params_ttl_seconds.get(),
            api_root: settings.api_root.clone(),
            legacy_api_root: settings.legacy_api_root.clone(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds.max(1))
    }

    pub fn instance_params_ttl(&self) -> Duration {
        Duration::from_secs(self.instance_params_ttl_seconds.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.default_ttl(), Duration::from_secs(3600));
        assert_eq!(config.instance_params_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.api_root, "/api/v2");
        assert_eq!(config.legacy_api_root.as_deref(), Some("/api/v1"));
    }

    #[test]
    fn zero_ttl_clamps_to_one_second() {
        let config = CacheConfig {
            default_ttl_seconds: 0,
            ..Default::default()
        };
        assert_eq!(config.default_ttl(), Duration::from_secs(1));
    }
}
