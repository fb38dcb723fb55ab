//! Error types for the publishing orchestration core.
//!
//! Each module has its own error enum to provide clear error boundaries.
//! The library uses `thiserror` for structured, typed errors.

/// Errors related to configuration loading, parsing, and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required configuration field is absent.
    #[error("missing required config field: {field}")]
    MissingField {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration field has an unacceptable value.
    #[error("invalid value for config field '{field}': {message}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// A description of why the value is invalid.
        message: String,
    },

    /// The configuration file does not exist at the specified path.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// The path that was searched.
        path: String,
    },

    /// TOML deserialization failed.
    #[error("failed to parse config file: {source}")]
    ParseError {
        /// The underlying TOML parse error.
        #[source]
        source: toml::de::Error,
    },

    /// A selector bundle or instruction bundle is missing a required named entry.
    #[error("{bundle} is missing required entry '{name}' for cms kind '{cms_kind}'")]
    MissingBundleEntry {
        /// Which bundle ("selector" or "instruction").
        bundle: &'static str,
        /// The missing named element or action.
        name: String,
        /// The CMS kind the entry was required for.
        cms_kind: String,
    },
}

/// The closed taxonomy of error kinds a publishing run can produce.
///
/// Every phase primitive classifies its failure into one of these at the
/// point of failure; the orchestrator never has to guess whether an error
/// is retriable from a message string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Login failed with a valid form submission; fatal, no retry.
    AuthRejected,
    /// No candidate selector resolved within timeout; transient, retriable.
    ElementNotFound,
    /// Page did not reach ready state; transient.
    NavigationTimeout,
    /// Media-library upload did not complete; transient.
    UploadFailed,
    /// No SEO plugin detected; warning only, does not fail the phase.
    SeoPluginMissing,
    /// The safety validator returned a critical failure; fatal, no retry, no failover.
    SafetyBlocked,
    /// Terminal call failed but the post shows signs of publication.
    AmbiguousPublish,
    /// Retries exhausted on a provider; triggers failover if possible, else fatal.
    ProviderExhausted,
    /// The recovery strategy could not save a draft; logged, does not alter outcome.
    RecoveryFailed,
    /// The whole-run deadline expired.
    Timeout,
    /// Startup validation of config/selector/instruction bundles failed.
    ConfigInvalid,
}

impl ErrorKind {
    /// Whether the retry loop should retry in-provider on this error kind.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::ElementNotFound | ErrorKind::NavigationTimeout | ErrorKind::UploadFailed
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::AuthRejected => "AUTH_REJECTED",
            ErrorKind::ElementNotFound => "ELEMENT_NOT_FOUND",
            ErrorKind::NavigationTimeout => "NAVIGATION_TIMEOUT",
            ErrorKind::UploadFailed => "UPLOAD_FAILED",
            ErrorKind::SeoPluginMissing => "SEO_PLUGIN_MISSING",
            ErrorKind::SafetyBlocked => "SAFETY_BLOCKED",
            ErrorKind::AmbiguousPublish => "AMBIGUOUS_PUBLISH",
            ErrorKind::ProviderExhausted => "PROVIDER_EXHAUSTED",
            ErrorKind::RecoveryFailed => "RECOVERY_FAILED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::ConfigInvalid => "CONFIG_INVALID",
        };
        write!(f, "{s}")
    }
}

/// A classified error raised by a provider primitive or phase function.
///
/// Carries enough structure for the orchestrator to decide retry vs.
/// failover vs. abort without inspecting message strings.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    /// The classified error kind.
    pub kind: ErrorKind,
    /// Human-readable detail, safe to surface in a result's error message.
    pub message: String,
}

impl ProviderError {
    /// Construct a new classified provider error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether the orchestrator's retry loop should retry this in-provider.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Errors surfaced by the orchestrator only for truly unrecoverable setup
/// failures. Normal phase failures never propagate as a Rust error — they
/// are captured into the returned publish result instead.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Settings, selector bundle, or instruction bundle failed validation.
    #[error("configuration invalid: {0}")]
    ConfigInvalid(#[from] ConfigError),
}

/// Errors from the metrics registry/exporter.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Rendering the Prometheus text exposition format failed.
    #[error("failed to render metrics: {0}")]
    ExportFailed(String),
}

/// Errors from interacting with LLM providers (Anthropic vision / text).
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// HTTP request to the LLM endpoint failed.
    #[error("LLM HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// LLM API returned an error response.
    #[error("LLM API error (status {status}): {message}")]
    Api {
        /// The HTTP status code.
        status: u16,
        /// The error message from the API.
        message: String,
    },

    /// LLM provider rate limit hit.
    #[error("LLM rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// LLM response could not be parsed.
    #[error("failed to parse LLM response: {0}")]
    Parse(String),

    /// No LLM provider configured.
    #[error("no LLM provider configured")]
    NotConfigured,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display_matches_taxonomy_names() {
        assert_eq!(ErrorKind::AuthRejected.to_string(), "AUTH_REJECTED");
        assert_eq!(ErrorKind::SafetyBlocked.to_string(), "SAFETY_BLOCKED");
        assert_eq!(ErrorKind::AmbiguousPublish.to_string(), "AMBIGUOUS_PUBLISH");
    }

    #[test]
    fn transient_classification() {
        assert!(ErrorKind::ElementNotFound.is_transient());
        assert!(ErrorKind::NavigationTimeout.is_transient());
        assert!(ErrorKind::UploadFailed.is_transient());
        assert!(!ErrorKind::AuthRejected.is_transient());
        assert!(!ErrorKind::SafetyBlocked.is_transient());
        assert!(!ErrorKind::ProviderExhausted.is_transient());
    }

    #[test]
    fn provider_error_message_format() {
        let err = ProviderError::new(ErrorKind::ElementNotFound, "new_post_title not found");
        assert_eq!(
            err.to_string(),
            "ELEMENT_NOT_FOUND: new_post_title not found"
        );
        assert!(err.is_transient());
    }

    #[test]
    fn config_error_missing_field_message() {
        let err = ConfigError::MissingField {
            field: "providers.default_provider".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "missing required config field: providers.default_provider"
        );
    }

    #[test]
    fn config_error_missing_bundle_entry_message() {
        let err = ConfigError::MissingBundleEntry {
            bundle: "selector",
            name: "new_post_title".to_string(),
            cms_kind: "wordpress".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "selector is missing required entry 'new_post_title' for cms kind 'wordpress'"
        );
    }

    #[test]
    fn llm_error_not_configured_message() {
        let err = LlmError::NotConfigured;
        assert_eq!(err.to_string(), "no LLM provider configured");
    }

    #[test]
    fn llm_error_rate_limited_message() {
        let err = LlmError::RateLimited {
            retry_after_secs: 30,
        };
        assert_eq!(err.to_string(), "LLM rate limited, retry after 30 seconds");
    }
}
