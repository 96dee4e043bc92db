//! Configuration management for Sendlimit.
//!
//! Settings come from an optional YAML file, overridden by environment
//! variables such as `SENDLIMIT_LIMITS__DEFAULT_LIMIT=200`.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, SendlimitError};
use crate::ratelimit::{
    LockStrategy, MemoryMap, TokenRegistry, WindowController, DEFAULT_DEFER_MESSAGE,
    DEFAULT_INTERVAL, DEFAULT_LIMIT,
};

/// Prefix of environment variables overriding file settings.
pub const ENV_PREFIX: &str = "SENDLIMIT";

/// Main configuration for the Sendlimit service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendlimitConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Idle token eviction
    #[serde(default)]
    pub eviction: EvictionConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Policy server address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 10033))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Messages per window for senders without a domain override
    #[serde(default = "default_limit")]
    pub default_limit: u64,

    /// Window length in seconds
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Text appended to deferral replies
    #[serde(default = "default_defer_message")]
    pub defer_message: String,

    /// Map file of senders and domains that are never limited
    #[serde(default)]
    pub whitelist_path: Option<PathBuf>,

    /// Map file of `domain limit` pairs
    #[serde(default)]
    pub domain_limits_path: Option<PathBuf>,

    #[serde(default)]
    pub lock_strategy: LockStrategy,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            interval_secs: default_interval_secs(),
            defer_message: default_defer_message(),
            whitelist_path: None,
            domain_limits_path: None,
            lock_strategy: LockStrategy::default(),
        }
    }
}

fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

fn default_interval_secs() -> u64 {
    DEFAULT_INTERVAL.as_secs()
}

fn default_defer_message() -> String {
    DEFAULT_DEFER_MESSAGE.to_string()
}

impl LimitsConfig {
    /// Load the override maps and build a window controller over `tokens`.
    pub fn build_controller(&self, tokens: Arc<TokenRegistry>) -> Result<WindowController> {
        let whitelist = load_map(self.whitelist_path.as_deref())?;
        let domain_limits = load_map(self.domain_limits_path.as_deref())?;

        let controller = WindowController::new(Arc::new(whitelist), Arc::new(domain_limits), tokens)
            .with_lock_strategy(self.lock_strategy);
        controller.set_default_limit(self.default_limit);
        controller.set_interval(Duration::from_secs(self.interval_secs));
        controller.set_defer_message(self.defer_message.clone());

        Ok(controller)
    }
}

fn load_map(path: Option<&Path>) -> Result<MemoryMap> {
    match path {
        Some(path) => MemoryMap::from_file(path).map_err(|e| {
            SendlimitError::Config(format!("cannot load map {}: {}", path.display(), e))
        }),
        None => Ok(MemoryMap::new()),
    }
}

/// Idle token eviction configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvictionConfig {
    /// Seconds between sweeps; 0 disables eviction
    #[serde(default)]
    pub sweep_interval_secs: u64,
}

impl EvictionConfig {
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl SendlimitConfig {
    /// Load configuration from an optional file plus the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(true),
            );
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Parse configuration from a YAML string.
    #[cfg(test)]
    pub(crate) fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| SendlimitError::Config(format!("Failed to parse config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SendlimitConfig::default();

        assert_eq!(config.server.listen_addr.to_string(), "127.0.0.1:10033");
        assert_eq!(config.limits.default_limit, 120);
        assert_eq!(config.limits.interval_secs, 3600);
        assert_eq!(config.limits.defer_message, "rate limit exceeded");
        assert_eq!(config.limits.lock_strategy, LockStrategy::Serialized);
        assert_eq!(config.eviction.sweep_interval(), None);
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
server:
  listen_addr: 0.0.0.0:9998
limits:
  default_limit: 40
  interval_secs: 600
  defer_message: "too much mail, try later"
  whitelist_path: /etc/postfix/ratelimit_whitelist
  domain_limits_path: /etc/postfix/ratelimit_domains
  lock_strategy: per_sender
eviction:
  sweep_interval_secs: 300
logging:
  format: json
"#;
        let config = SendlimitConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.server.listen_addr.port(), 9998);
        assert_eq!(config.limits.default_limit, 40);
        assert_eq!(config.limits.interval_secs, 600);
        assert_eq!(config.limits.defer_message, "too much mail, try later");
        assert_eq!(
            config.limits.whitelist_path,
            Some(PathBuf::from("/etc/postfix/ratelimit_whitelist"))
        );
        assert_eq!(config.limits.lock_strategy, LockStrategy::PerSender);
        assert_eq!(config.eviction.sweep_interval(), Some(Duration::from_secs(300)));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = SendlimitConfig::from_yaml("limits:\n  default_limit: 10\n").unwrap();

        assert_eq!(config.limits.default_limit, 10);
        assert_eq!(config.limits.interval_secs, 3600);
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let result = SendlimitConfig::from_yaml("limits:\n  default_limit: lots\n");
        assert!(matches!(result, Err(SendlimitError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "limits:").unwrap();
        writeln!(file, "  interval_secs: 120").unwrap();

        let config = SendlimitConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.limits.interval_secs, 120);
        assert_eq!(config.limits.default_limit, 120);
    }

    #[test]
    fn test_environment_overrides_file() {
        // Only this test sets eviction variables, so other tests reading the
        // environment are unaffected.
        const VAR: &str = "SENDLIMIT_EVICTION__SWEEP_INTERVAL_SECS";

        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "eviction:").unwrap();
        writeln!(file, "  sweep_interval_secs: 10").unwrap();

        std::env::set_var(VAR, "45");
        let result = SendlimitConfig::load(Some(file.path()));
        std::env::remove_var(VAR);

        let config = result.unwrap();
        assert_eq!(config.eviction.sweep_interval(), Some(Duration::from_secs(45)));
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let result = SendlimitConfig::load(Some(Path::new("/nonexistent/sendlimit.yaml")));
        assert!(matches!(result, Err(SendlimitError::Config(_))));
    }

    #[test]
    fn test_build_controller() {
        let dir = tempfile::TempDir::new().unwrap();
        let whitelist = dir.path().join("whitelist");
        let domains = dir.path().join("domains");
        std::fs::write(&whitelist, "vip@x.com OK\n").unwrap();
        std::fs::write(&domains, "biz.com 5\n").unwrap();

        let limits = LimitsConfig {
            default_limit: 7,
            interval_secs: 60,
            whitelist_path: Some(whitelist),
            domain_limits_path: Some(domains),
            ..LimitsConfig::default()
        };
        let controller = limits.build_controller(Arc::new(TokenRegistry::new())).unwrap();

        assert_eq!(controller.default_limit(), 7);
        assert_eq!(controller.interval(), Duration::from_secs(60));
        assert!(controller.rate_limit("vip@x.com", 1000).is_permit());
        assert!(!controller.rate_limit("u@biz.com", 6).is_permit());
        assert!(controller.rate_limit("u@other.com", 7).is_permit());
    }

    #[test]
    fn test_build_controller_with_missing_map() {
        let limits = LimitsConfig {
            whitelist_path: Some(PathBuf::from("/nonexistent/whitelist")),
            ..LimitsConfig::default()
        };

        let result = limits.build_controller(Arc::new(TokenRegistry::new()));
        assert!(matches!(result, Err(SendlimitError::Config(_))));
    }
}
