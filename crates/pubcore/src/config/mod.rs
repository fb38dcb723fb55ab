//! Configuration for the publishing orchestration core.
//!
//! Three-layer loading, same shape as the rest of this stack:
//! 1. Built-in defaults
//! 2. TOML config file (`~/.pubcore/config.toml`)
//! 3. Environment variable overrides (`PUBCORE_` prefix, double underscore
//!    between nested keys, e.g. `PUBCORE_RETRY__MAX_RETRIES`)
//!
//! CLI flag overrides are applied by the binary crate after loading.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

fn default_max_retries() -> u32 {
    3
}
fn default_base_retry_delay_seconds() -> u64 {
    2
}
fn default_element_timeout_seconds() -> u64 {
    10
}
fn default_navigation_timeout_seconds() -> u64 {
    30
}
fn default_whole_run_timeout_seconds() -> u64 {
    600
}
fn default_selector_cache_ttl_seconds() -> u64 {
    crate::perf::DEFAULT_TTL_SECONDS
}
fn default_vision_max_steps() -> u32 {
    12
}
fn default_default_provider() -> String {
    "dom".to_string()
}
fn default_true() -> bool {
    true
}
fn default_screenshot_dir() -> String {
    "~/.pubcore/screenshots".to_string()
}

/// Retry/backoff tuning (§4.7).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Maximum in-provider retries per phase before failover or abort.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base linear backoff delay; attempt `n` sleeps `base * n`.
    #[serde(default = "default_base_retry_delay_seconds")]
    pub base_retry_delay_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_retry_delay_seconds: default_base_retry_delay_seconds(),
        }
    }
}

/// Per-operation timeout tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutConfig {
    /// Bound on a single selector resolution/element wait.
    #[serde(default = "default_element_timeout_seconds")]
    pub element_timeout_seconds: u64,
    /// Bound on a single page navigation.
    #[serde(default = "default_navigation_timeout_seconds")]
    pub navigation_timeout_seconds: u64,
    /// Bound on an entire publishing run, across retries and failover.
    #[serde(default = "default_whole_run_timeout_seconds")]
    pub whole_run_timeout_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            element_timeout_seconds: default_element_timeout_seconds(),
            navigation_timeout_seconds: default_navigation_timeout_seconds(),
            whole_run_timeout_seconds: default_whole_run_timeout_seconds(),
        }
    }
}

/// Provider selection and failover tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvidersConfig {
    /// Which provider ("dom" or "vision") to try first.
    #[serde(default = "default_default_provider")]
    pub default_provider: String,
    /// Whether failover to a second provider is permitted on exhaustion.
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
    /// Upper bound on vision-provider action-loop steps per composite call.
    #[serde(default = "default_vision_max_steps")]
    pub vision_max_steps: u32,
    /// Headless mode for the underlying browser.
    #[serde(default = "default_true")]
    pub headless: bool,
    /// Upper bound on concurrent media-library uploads within a single
    /// `ProcessImages` phase (DOM provider only; other providers ignore it).
    #[serde(default = "default_media_upload_concurrency")]
    pub media_upload_concurrency: usize,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            default_provider: default_default_provider(),
            fallback_enabled: true,
            vision_max_steps: default_vision_max_steps(),
            headless: true,
            media_upload_concurrency: default_media_upload_concurrency(),
        }
    }
}

fn default_media_upload_concurrency() -> usize {
    4
}

/// Selector cache tuning (C2).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// How long a resolved selector stays valid before re-probing.
    #[serde(default = "default_selector_cache_ttl_seconds")]
    pub selector_cache_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            selector_cache_ttl_seconds: default_selector_cache_ttl_seconds(),
        }
    }
}

/// Feature flags gating optional phases/checks.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeaturesConfig {
    /// Whether the preflight safety validator runs before the terminal phase.
    #[serde(default = "default_true")]
    pub safety_checks_enabled: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            safety_checks_enabled: true,
        }
    }
}

/// Top-level settings for the publishing orchestration core.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Settings {
    /// Retry/backoff tuning.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Per-operation timeouts.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Provider selection and failover tuning.
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Selector cache tuning.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Feature flags.
    #[serde(default)]
    pub features: FeaturesConfig,
    /// Directory screenshots are written to by default when a caller
    /// doesn't capture them itself.
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: String,
}

impl Settings {
    /// Load settings from a TOML file with environment variable overrides.
    pub fn load(config_path: Option<&str>) -> Result<Settings, ConfigError> {
        let (path, explicit) = Self::resolve_config_path(config_path);

        let mut settings = match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str::<Settings>(&contents)
                .map_err(|e| ConfigError::ParseError { source: e })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if explicit {
                    return Err(ConfigError::FileNotFound {
                        path: path.display().to_string(),
                    });
                }
                Settings::default()
            }
            Err(_) => {
                return Err(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
        };

        settings.apply_env_overrides()?;
        Ok(settings)
    }

    /// Validate that settings are internally consistent. Invoked by the
    /// orchestrator at construction time, per §4 ("startup validation of
    /// config/selector/instruction bundles").
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.providers.default_provider.as_str() {
            "dom" | "vision" => {}
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "providers.default_provider".to_string(),
                    message: format!("'{other}' is not 'dom' or 'vision'"),
                })
            }
        }
        if self.providers.vision_max_steps == 0 {
            return Err(ConfigError::InvalidValue {
                field: "providers.vision_max_steps".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.timeouts.element_timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "timeouts.element_timeout_seconds".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.providers.media_upload_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "providers.media_upload_concurrency".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    fn resolve_config_path(config_path: Option<&str>) -> (PathBuf, bool) {
        if let Some(path) = config_path {
            return (expand_tilde(path), true);
        }
        if let Ok(env_path) = env::var("PUBCORE_CONFIG") {
            return (expand_tilde(&env_path), true);
        }
        (expand_tilde("~/.pubcore/config.toml"), false)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = env::var("PUBCORE_RETRY__MAX_RETRIES") {
            self.retry.max_retries = parse_env_u32("PUBCORE_RETRY__MAX_RETRIES", &val)?;
        }
        if let Ok(val) = env::var("PUBCORE_RETRY__BASE_RETRY_DELAY_SECONDS") {
            self.retry.base_retry_delay_seconds =
                parse_env_u64("PUBCORE_RETRY__BASE_RETRY_DELAY_SECONDS", &val)?;
        }
        if let Ok(val) = env::var("PUBCORE_TIMEOUTS__ELEMENT_TIMEOUT_SECONDS") {
            self.timeouts.element_timeout_seconds =
                parse_env_u64("PUBCORE_TIMEOUTS__ELEMENT_TIMEOUT_SECONDS", &val)?;
        }
        if let Ok(val) = env::var("PUBCORE_TIMEOUTS__NAVIGATION_TIMEOUT_SECONDS") {
            self.timeouts.navigation_timeout_seconds =
                parse_env_u64("PUBCORE_TIMEOUTS__NAVIGATION_TIMEOUT_SECONDS", &val)?;
        }
        if let Ok(val) = env::var("PUBCORE_TIMEOUTS__WHOLE_RUN_TIMEOUT_SECONDS") {
            self.timeouts.whole_run_timeout_seconds =
                parse_env_u64("PUBCORE_TIMEOUTS__WHOLE_RUN_TIMEOUT_SECONDS", &val)?;
        }
        if let Ok(val) = env::var("PUBCORE_PROVIDERS__DEFAULT_PROVIDER") {
            self.providers.default_provider = val;
        }
        if let Ok(val) = env::var("PUBCORE_PROVIDERS__FALLBACK_ENABLED") {
            self.providers.fallback_enabled =
                parse_env_bool("PUBCORE_PROVIDERS__FALLBACK_ENABLED", &val)?;
        }
        if let Ok(val) = env::var("PUBCORE_PROVIDERS__VISION_MAX_STEPS") {
            self.providers.vision_max_steps =
                parse_env_u32("PUBCORE_PROVIDERS__VISION_MAX_STEPS", &val)?;
        }
        if let Ok(val) = env::var("PUBCORE_PROVIDERS__HEADLESS") {
            self.providers.headless = parse_env_bool("PUBCORE_PROVIDERS__HEADLESS", &val)?;
        }
        if let Ok(val) = env::var("PUBCORE_CACHE__SELECTOR_CACHE_TTL_SECONDS") {
            self.cache.selector_cache_ttl_seconds =
                parse_env_u64("PUBCORE_CACHE__SELECTOR_CACHE_TTL_SECONDS", &val)?;
        }
        if let Ok(val) = env::var("PUBCORE_FEATURES__SAFETY_CHECKS_ENABLED") {
            self.features.safety_checks_enabled =
                parse_env_bool("PUBCORE_FEATURES__SAFETY_CHECKS_ENABLED", &val)?;
        }
        if let Ok(val) = env::var("PUBCORE_SCREENSHOT_DIR") {
            self.screenshot_dir = val;
        }
        Ok(())
    }

    /// Bound on a single selector resolution/element wait.
    pub fn element_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.element_timeout_seconds)
    }

    /// Bound on a single page navigation.
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.navigation_timeout_seconds)
    }

    /// Bound on an entire publishing run.
    pub fn whole_run_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.whole_run_timeout_seconds)
    }

    /// Base linear-backoff delay between phase retries.
    pub fn base_retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry.base_retry_delay_seconds)
    }

    /// Delay before the `attempt`-th retry of a phase: the base delay
    /// scaled linearly by the retry number.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.base_retry_delay() * attempt
    }

    /// Maximum in-provider retries per phase.
    pub fn max_retries(&self) -> u32 {
        self.retry.max_retries
    }

    /// Whether failover to a fallback provider is permitted.
    pub fn fallback_enabled(&self) -> bool {
        self.providers.fallback_enabled
    }

    /// Whether the preflight safety validator runs.
    pub fn safety_checks_enabled(&self) -> bool {
        self.features.safety_checks_enabled
    }

    /// The provider to try first.
    pub fn default_provider(&self) -> &str {
        &self.providers.default_provider
    }

    /// Upper bound on vision-provider action-loop steps per call.
    pub fn vision_max_steps(&self) -> u32 {
        self.providers.vision_max_steps
    }

    /// TTL for a cached selector resolution.
    pub fn selector_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.selector_cache_ttl_seconds)
    }

    /// Whether the underlying browser should run headless.
    pub fn headless(&self) -> bool {
        self.providers.headless
    }
}

/// Expand `~` at the start of a path to the user's home directory.
pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

fn parse_env_u32(var_name: &str, val: &str) -> Result<u32, ConfigError> {
    val.parse::<u32>().map_err(|_| ConfigError::InvalidValue {
        field: var_name.to_string(),
        message: format!("'{val}' is not a valid u32"),
    })
}

fn parse_env_u64(var_name: &str, val: &str) -> Result<u64, ConfigError> {
    val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
        field: var_name.to_string(),
        message: format!("'{val}' is not a valid u64"),
    })
}

fn parse_env_bool(var_name: &str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: var_name.to_string(),
            message: format!("'{val}' is not a valid boolean (use true/false/1/0/yes/no)"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_validate_cleanly() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn invalid_default_provider_fails_validation() {
        let mut settings = Settings::default();
        settings.providers.default_provider = "wordpress_xmlrpc".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn toml_parses_partial_sections_with_defaults() {
        let toml_str = r#"
[providers]
default_provider = "vision"
"#;
        let settings: Settings = toml::from_str(toml_str).expect("valid TOML");
        assert_eq!(settings.providers.default_provider, "vision");
        assert_eq!(settings.retry.max_retries, 3);
        assert_eq!(settings.timeouts.element_timeout_seconds, 10);
    }

    #[test]
    fn env_override_max_retries() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("PUBCORE_RETRY__MAX_RETRIES", "5");
        let mut settings = Settings::default();
        settings.apply_env_overrides().unwrap();
        assert_eq!(settings.retry.max_retries, 5);
        env::remove_var("PUBCORE_RETRY__MAX_RETRIES");
    }

    #[test]
    fn env_override_bool_accepts_yes_no() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("PUBCORE_PROVIDERS__FALLBACK_ENABLED", "no");
        let mut settings = Settings::default();
        settings.apply_env_overrides().unwrap();
        assert!(!settings.providers.fallback_enabled);
        env::remove_var("PUBCORE_PROVIDERS__FALLBACK_ENABLED");
    }

    #[test]
    fn config_file_not_found_explicit_path_errors() {
        let result = Settings::load(Some("/nonexistent/path/pubcore.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn expand_tilde_strips_leading_tilde() {
        let expanded = expand_tilde("~/.pubcore/config.toml");
        assert!(!expanded.to_string_lossy().starts_with('~'));
    }
}
