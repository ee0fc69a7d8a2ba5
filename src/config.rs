//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. explicit path (`--config <path>`)
//! 2. `~/.huginn/config.toml` (user)
//! 3. `/etc/huginn/config.toml` (system)
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.huginn/secrets.toml` (user, must be 0600)
//! 2. `/etc/huginn/secrets.toml` (system, must be 0600)
//!
//! A provider without a key in the secrets file falls back to its kind's
//! environment variable.
//!
//! ```toml
//! call_timeout_secs = 120
//!
//! [rate_limit]
//! max_requests = 30
//! window_secs = 60
//!
//! [routing]
//! video = "kie"
//!
//! [[providers]]
//! name = "kie"
//! kind = "kie"
//! priority = 10
//! max_duration_secs = 10
//! cost = { type = "per_second", usd = 0.05 }
//!
//! [[providers]]
//! name = "replicate"
//! kind = "replicate"
//! capabilities = ["image", "video"]
//! priority = 20
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::CacheConfig;
use crate::jobs::JobConfig;
use crate::providers::{RetryConfig, RoutingConfig, retry};
use crate::ratelimit::RateLimitConfig;
use crate::types::{Capability, CostModel, ProviderDescriptor};
use crate::{HuginnError, Result};

/// Engine configuration, read once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Budget for one adapter call in seconds (default: 120).
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub jobs: JobsSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout(),
            rate_limit: RateLimitSection::default(),
            cache: CacheSection::default(),
            jobs: JobsSection::default(),
            retry: RetrySection::default(),
            routing: RoutingConfig::default(),
            providers: Vec::new(),
        }
    }
}

fn default_call_timeout() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

/// `[rate_limit]`
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Requests per caller per window (default: 30).
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,
    /// Window length in seconds (default: 60).
    #[serde(default = "default_window")]
    pub window_secs: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: default_max_requests(),
            window_secs: default_window(),
        }
    }
}

fn default_max_requests() -> u64 {
    30
}

fn default_window() -> u64 {
    60
}

impl From<&RateLimitSection> for RateLimitConfig {
    fn from(section: &RateLimitSection) -> Self {
        RateLimitConfig {
            enabled: section.enabled,
            max_requests: section.max_requests,
            window: Duration::from_secs(section.window_secs),
        }
    }
}

/// `[cache]`
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Capacity of the in-memory store (default: 10000).
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    /// Entry lifetime in seconds (default: 3600).
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: default_max_entries(),
            ttl_secs: default_ttl(),
        }
    }
}

fn default_max_entries() -> u64 {
    10_000
}

fn default_ttl() -> u64 {
    3600
}

impl From<&CacheSection> for CacheConfig {
    fn from(section: &CacheSection) -> Self {
        CacheConfig {
            enabled: section.enabled,
            max_entries: section.max_entries,
            ttl: Duration::from_secs(section.ttl_secs),
        }
    }
}

/// `[jobs]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsSection {
    pub poll_interval_secs: u64,
    pub max_attempts: u32,
    pub status_timeout_secs: u64,
    pub retention_secs: u64,
}

impl Default for JobsSection {
    fn default() -> Self {
        let defaults = JobConfig::default();
        Self {
            poll_interval_secs: defaults.poll_interval.as_secs(),
            max_attempts: defaults.max_attempts,
            status_timeout_secs: defaults.status_timeout.as_secs(),
            retention_secs: defaults.retention.as_secs(),
        }
    }
}

impl From<&JobsSection> for JobConfig {
    fn from(section: &JobsSection) -> Self {
        JobConfig {
            poll_interval: Duration::from_secs(section.poll_interval_secs),
            max_attempts: section.max_attempts,
            status_timeout: Duration::from_secs(section.status_timeout_secs),
            retention: Duration::from_secs(section.retention_secs),
        }
    }
}

/// `[retry]`: per-provider retry of transient failures.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub enabled: bool,
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: retry::DEFAULT_MAX_ATTEMPTS,
            initial_delay_ms: retry::DEFAULT_INITIAL_DELAY.as_millis() as u64,
            max_delay_ms: retry::DEFAULT_MAX_DELAY.as_millis() as u64,
            jitter: true,
        }
    }
}

impl RetrySection {
    /// The retry policy, or `None` when retry is disabled.
    pub fn retry_config(&self) -> Option<RetryConfig> {
        self.enabled.then(|| {
            RetryConfig::new()
                .max_attempts(self.max_attempts)
                .initial_delay(Duration::from_millis(self.initial_delay_ms))
                .max_delay(Duration::from_millis(self.max_delay_ms))
                .jitter(self.jitter)
        })
    }
}

/// The external API behind a configured provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
    Kie,
    Replicate,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Kie => "kie",
            ProviderKind::Replicate => "replicate",
        }
    }

    /// Capabilities assumed when a provider entry lists none.
    pub fn default_capabilities(&self) -> &'static [Capability] {
        match self {
            ProviderKind::OpenAi | ProviderKind::Anthropic | ProviderKind::Gemini => {
                &[Capability::Text]
            }
            ProviderKind::Kie => &[Capability::Video],
            ProviderKind::Replicate => &[Capability::Image, Capability::Video],
        }
    }

    /// Environment variables consulted, in order, when the secrets file has
    /// no key for a provider of this kind.
    pub fn env_vars(&self) -> &'static [&'static str] {
        match self {
            ProviderKind::OpenAi => &["OPENAI_API_KEY"],
            ProviderKind::Anthropic => &["ANTHROPIC_API_KEY", "CLAUDE_API_KEY"],
            ProviderKind::Gemini => &["GEMINI_API_KEY"],
            ProviderKind::Kie => &["KIE_AI_API_KEY"],
            ProviderKind::Replicate => &["REPLICATE_API_TOKEN"],
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `[[providers]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Identity used for routing, secrets, jobs and metrics.
    pub name: String,
    pub kind: ProviderKind,
    /// Defaults to the kind's capabilities when empty.
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    /// Lower is tried first (default: 100).
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Model override (for replicate: the image model).
    #[serde(default)]
    pub model: Option<String>,
    /// Replicate only: video model override.
    #[serde(default)]
    pub video_model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// HTTP client timeout in seconds (default: 60).
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Longest media duration accepted, in seconds.
    #[serde(default)]
    pub max_duration_secs: Option<f64>,
    #[serde(default)]
    pub cost: CostModel,
}

fn default_priority() -> u32 {
    100
}

impl ProviderConfig {
    pub fn capabilities(&self) -> Vec<Capability> {
        if self.capabilities.is_empty() {
            self.kind.default_capabilities().to_vec()
        } else {
            self.capabilities.clone()
        }
    }

    pub fn descriptor(&self) -> ProviderDescriptor {
        let mut descriptor = ProviderDescriptor::new(self.name.clone(), self.capabilities())
            .priority(self.priority)
            .enabled(self.enabled)
            .cost(self.cost);
        if let Some(secs) = self.max_duration_secs {
            descriptor = descriptor.max_duration(Duration::from_secs_f64(secs));
        }
        descriptor
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.huginn/config.toml`
    /// 3. `/etc/huginn/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            HuginnError::Configuration(format!("failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| HuginnError::Configuration(format!("{path:?}: {e}")))
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| HuginnError::Configuration(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(HuginnError::Configuration(message));
        if self.rate_limit.enabled && self.rate_limit.window_secs == 0 {
            return invalid("rate_limit.window_secs must be positive".into());
        }
        if self.jobs.poll_interval_secs == 0 {
            return invalid("jobs.poll_interval_secs must be positive".into());
        }
        if self.call_timeout_secs == 0 {
            return invalid("call_timeout_secs must be positive".into());
        }
        let mut seen = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return invalid("provider name must not be empty".into());
            }
            if !seen.insert(provider.name.as_str()) {
                return invalid(format!("duplicate provider name {:?}", provider.name));
            }
            if let Some(secs) = provider.max_duration_secs
                && !(secs.is_finite() && secs > 0.0)
            {
                return invalid(format!(
                    "provider {:?}: max_duration_secs must be positive",
                    provider.name
                ));
            }
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(HuginnError::Configuration(format!(
                "config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".huginn").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/huginn/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(HuginnError::Configuration(
            "no config file found. Create ~/.huginn/config.toml or /etc/huginn/config.toml"
                .to_string(),
        ))
    }
}

/// API keys keyed by provider name.
///
/// ```toml
/// [kie]
/// api_key = "..."
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(flatten)]
    pub providers: HashMap<String, ApiKeySecret>,
}

/// A single API key secret.
#[derive(Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

impl fmt::Debug for ApiKeySecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeySecret").field("api_key", &"<redacted>").finish()
    }
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Returns empty secrets if no file exists (providers may use env vars).
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".huginn").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/huginn/secrets.toml");
        if system_secrets.exists() {
            return Self::load_from(&system_secrets);
        }

        Ok(Secrets::default())
    }

    /// Load one secrets file, enforcing its permissions.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            HuginnError::Configuration(format!("failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            HuginnError::Configuration(format!("failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            HuginnError::Configuration(format!("failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        // Reject if group or other bits are set
        if mode & 0o077 != 0 {
            return Err(HuginnError::Configuration(format!(
                "secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// API key for a provider: the secrets file by name first, then the
    /// kind's environment variables. Empty values count as missing.
    pub fn api_key(&self, name: &str, kind: ProviderKind) -> Option<String> {
        self.providers
            .get(name)
            .map(|s| s.api_key.clone())
            .filter(|key| !key.is_empty())
            .or_else(|| {
                kind.env_vars()
                    .iter()
                    .find_map(|var| std::env::var(var).ok().filter(|key| !key.is_empty()))
            })
    }
}
