use std::str::FromStr;

pub const DEFAULT_BACKEND_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 120_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownFieldPolicy {
    Reject,
    Ignore,
    Preserve,
}

impl Default for UnknownFieldPolicy {
    fn default() -> Self {
        UnknownFieldPolicy::Ignore
    }
}

impl FromStr for UnknownFieldPolicy {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(UnknownFieldPolicy::Reject),
            "ignore" => Ok(UnknownFieldPolicy::Ignore),
            "preserve" => Ok(UnknownFieldPolicy::Preserve),
            other => Err(ConfigError::InvalidValue {
                key: "unknown_fields",
                value: other.to_string(),
            }),
        }
    }
}

/// Toggles that change how responses are shaped. Fixed for the lifetime of
/// the gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Surface the backend's `reasoning_content` inside `<think>` markers.
    pub show_reasoning: bool,
    /// Ask the backend to think by attaching `chat_template_kwargs`.
    pub enable_thinking: bool,
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub base_url: String,
    pub auth: BackendAuthConfig,
}

#[derive(Debug, Clone)]
pub struct BackendAuthConfig {
    pub auth_type: BackendAuthType,
    pub value: String,
    pub header_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendAuthType {
    Bearer,
    Header,
}

impl BackendConfig {
    pub fn bearer(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth: BackendAuthConfig {
                auth_type: BackendAuthType::Bearer,
                value: api_key.into(),
                header_name: None,
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Reads an environment variable, treating blank values as unset.
pub fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

pub fn env_bool(key: &str, default: bool) -> bool {
    let Some(raw) = env_non_empty(key) else {
        return default;
    };
    parse_bool(&raw).unwrap_or_else(|| {
        tracing::warn!(key, value = %raw, default, "ignoring invalid boolean");
        default
    })
}

pub fn env_u64(key: &str, default: u64) -> u64 {
    let Some(raw) = env_non_empty(key) else {
        return default;
    };
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => v,
        _ => {
            tracing::warn!(key, value = %raw, default, "ignoring invalid integer");
            default
        }
    }
}
