//! Configuration management for Leasehold
//!
//! Values come from an optional YAML/TOML file and from `LEASEHOLD__*`
//! environment variables (`LEASEHOLD__LOCK__DEFAULT_TTL_MS=5000` overrides
//! `lock.default_ttl_ms`). Every getter falls back to a default.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};

use crate::error::LeaseError;
use crate::{
    DEFAULT_DEADLOCK_LOW_WATER_MS, DEFAULT_MAX_RETRY_INTERVAL_MS, DEFAULT_NAMESPACE,
    DEFAULT_RENEWAL_RATIO, DEFAULT_RETRY_INTERVAL_MS, DEFAULT_TTL_MS,
};

pub const ENV_PREFIX: &str = "LEASEHOLD";

pub const NAMESPACE_PROPERTY: &str = "lock.namespace";
pub const DEFAULT_TTL_PROPERTY: &str = "lock.default_ttl_ms";
pub const RETRY_INTERVAL_PROPERTY: &str = "lock.retry_interval_ms";
pub const MAX_RETRY_INTERVAL_PROPERTY: &str = "lock.max_retry_interval_ms";
pub const RENEWAL_RATIO_PROPERTY: &str = "lock.renewal_ratio";
pub const AUTO_RENEWAL_PROPERTY: &str = "lock.auto_renewal";
pub const DEADLOCK_LOW_WATER_PROPERTY: &str = "lock.deadlock_low_water_ms";
pub const STORE_URL_PROPERTY: &str = "store.url";

/// Application configuration loaded from a config file and the environment
#[derive(Clone, Debug, Default)]
pub struct LeaseConfiguration {
    pub config: Config,
}

impl LeaseConfiguration {
    /// Load from an optional file plus the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, LeaseError> {
        Self::build(path, None)
    }

    /// Wrap an already built `Config`
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Build with an explicit environment map instead of the process environment
    pub fn build(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, LeaseError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config = builder.build()?;
        Ok(Self { config })
    }

    pub fn namespace(&self) -> String {
        self.config
            .get_string(NAMESPACE_PROPERTY)
            .unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.get_u64(DEFAULT_TTL_PROPERTY, DEFAULT_TTL_MS))
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.get_u64(RETRY_INTERVAL_PROPERTY, DEFAULT_RETRY_INTERVAL_MS))
    }

    pub fn max_retry_interval(&self) -> Duration {
        Duration::from_millis(self.get_u64(
            MAX_RETRY_INTERVAL_PROPERTY,
            DEFAULT_MAX_RETRY_INTERVAL_MS,
        ))
    }

    /// Divisor applied to the TTL to get the renewal interval (never below 2)
    pub fn renewal_ratio(&self) -> u32 {
        (self.get_u64(RENEWAL_RATIO_PROPERTY, DEFAULT_RENEWAL_RATIO as u64) as u32).max(2)
    }

    pub fn auto_renewal(&self) -> bool {
        self.config.get_bool(AUTO_RENEWAL_PROPERTY).unwrap_or(true)
    }

    pub fn deadlock_low_water(&self) -> Duration {
        Duration::from_millis(self.get_u64(
            DEADLOCK_LOW_WATER_PROPERTY,
            DEFAULT_DEADLOCK_LOW_WATER_MS,
        ))
    }

    /// Connection URL of an external store, if one is configured
    pub fn store_url(&self) -> Option<String> {
        self.config.get_string(STORE_URL_PROPERTY).ok()
    }

    fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.config
            .get_int(key)
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = LeaseConfiguration::build(None, Some(HashMap::new())).unwrap();
        assert_eq!(cfg.namespace(), "default");
        assert_eq!(cfg.default_ttl(), Duration::from_secs(30));
        assert_eq!(cfg.retry_interval(), Duration::from_millis(100));
        assert_eq!(cfg.max_retry_interval(), Duration::from_secs(1));
        assert_eq!(cfg.renewal_ratio(), 3);
        assert!(cfg.auto_renewal());
        assert_eq!(cfg.deadlock_low_water(), Duration::from_secs(1));
        assert!(cfg.store_url().is_none());
    }

    #[test]
    fn test_file_source() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "lock:\n  namespace: billing\n  default_ttl_ms: 5000\n  auto_renewal: false\nstore:\n  url: redis://127.0.0.1/"
        )
        .unwrap();

        let cfg = LeaseConfiguration::build(Some(file.path()), Some(HashMap::new())).unwrap();
        assert_eq!(cfg.namespace(), "billing");
        assert_eq!(cfg.default_ttl(), Duration::from_secs(5));
        assert!(!cfg.auto_renewal());
        assert_eq!(cfg.store_url().as_deref(), Some("redis://127.0.0.1/"));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(file, "lock:\n  namespace: billing\n  renewal_ratio: 4").unwrap();

        let env = HashMap::from([
            (
                "LEASEHOLD__LOCK__NAMESPACE".to_string(),
                "tenancy".to_string(),
            ),
            ("LEASEHOLD__LOCK__RENEWAL_RATIO".to_string(), "1".to_string()),
        ]);
        let cfg = LeaseConfiguration::build(Some(file.path()), Some(env)).unwrap();
        assert_eq!(cfg.namespace(), "tenancy");
        // clamped so renewal always fires before expiry
        assert_eq!(cfg.renewal_ratio(), 2);
    }

    #[test]
    fn test_missing_file_is_error() {
        let result = LeaseConfiguration::build(
            Some(Path::new("/nonexistent/leasehold.yaml")),
            Some(HashMap::new()),
        );
        assert!(matches!(result, Err(LeaseError::Config(_))));
    }
}
