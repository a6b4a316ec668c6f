use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
#[cfg(unix)]
use tokio::fs::File;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::providers::RetryPolicy;
use crate::sessions::TruncationPolicy;
use crate::tools::{ToolLoopConfig, DEFAULT_MAX_RECURSIONS};

const CONFIG_FILE_NAME: &str = "config.toml";

// ── Top-level config ──────────────────────────────────────────────

/// Top-level Switchyard configuration, loaded from `config.toml`.
///
/// Resolution order: `--config-dir` → `SWITCHYARD_CONFIG_DIR` env → `~/.switchyard`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// API key for the model provider. Overridden by `SWITCHYARD_API_KEY` or `API_KEY`.
    pub api_key: Option<String>,
    /// Base URL override for the provider API.
    pub api_url: Option<String>,
    /// Provider ID (`"openai"` or `"custom:<url>"`). Default: `"openai"`.
    pub default_provider: Option<String>,
    /// Model used by every model-backed agent and the classifier.
    pub default_model: Option<String>,
    /// Default model temperature (0.0–2.0). Default: `0.2`.
    #[serde(default = "default_temperature")]
    pub default_temperature: f64,

    /// Agent selection settings (`[classifier]`).
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Tool invocation loop bounds (`[tool_loop]`).
    #[serde(default)]
    pub tool_loop: ToolLoopSettings,

    /// History window handed to agents (`[history]`).
    #[serde(default)]
    pub history: HistoryConfig,

    /// Model call retries and timeouts (`[reliability]`).
    #[serde(default)]
    pub reliability: ReliabilityConfig,

    /// Human escalation settings (`[escalation]`).
    #[serde(default)]
    pub escalation: EscalationConfig,

    /// HTTP gateway settings (`[gateway]`).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Optional data files backing tools and retrieval (`[data]`).
    #[serde(default)]
    pub data: DataConfig,
}

fn default_temperature() -> f64 {
    0.2
}

/// Agent selection configuration (`[classifier]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Minimum confidence to trust the classifier's pick. Default: `0.5`.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Agent used when no agent can be confidently selected. Default: `"Human Agent"`.
    #[serde(default = "default_fallback_agent")]
    pub fallback_agent: String,
    /// Recent messages shown to the classifier. Default: `10`.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_confidence_threshold() -> f64 {
    0.5
}

fn default_fallback_agent() -> String {
    "Human Agent".into()
}

fn default_history_window() -> usize {
    10
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            fallback_agent: default_fallback_agent(),
            history_window: default_history_window(),
        }
    }
}

/// Tool loop configuration (`[tool_loop]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolLoopSettings {
    /// Re-generations allowed after tool execution. Default: `5`.
    /// Setting to `0` falls back to the default of `5`.
    #[serde(default = "default_max_recursions")]
    pub max_recursions: usize,
    /// Per-tool execution timeout. Default: `30`.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

fn default_max_recursions() -> usize {
    DEFAULT_MAX_RECURSIONS
}

fn default_tool_timeout_secs() -> u64 {
    30
}

impl Default for ToolLoopSettings {
    fn default() -> Self {
        Self {
            max_recursions: default_max_recursions(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

impl ToolLoopSettings {
    pub fn to_loop_config(&self) -> ToolLoopConfig {
        ToolLoopConfig {
            max_recursions: if self.max_recursions == 0 {
                DEFAULT_MAX_RECURSIONS
            } else {
                self.max_recursions
            },
            tool_timeout: Duration::from_secs(self.tool_timeout_secs.max(1)),
        }
    }
}

/// History window configuration (`[history]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum messages handed to an agent. Default: `50`.
    #[serde(default = "default_history_max_messages")]
    pub max_messages: usize,
    /// Optional estimated-token cap applied on top of `max_messages`.
    #[serde(default)]
    pub max_tokens: Option<usize>,
}

fn default_history_max_messages() -> usize {
    50
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_messages: default_history_max_messages(),
            max_tokens: None,
        }
    }
}

impl HistoryConfig {
    pub fn to_policy(&self) -> TruncationPolicy {
        TruncationPolicy {
            max_messages: Some(self.max_messages),
            max_tokens: self.max_tokens,
        }
    }
}

/// Model call reliability configuration (`[reliability]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    /// Retries after the first attempt. Default: `2`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Default: `250`.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Default: `4000`.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Per-attempt timeout. Default: `60`.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_max_backoff_ms() -> u64 {
    4000
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ReliabilityConfig {
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
        }
    }
}

/// Human escalation configuration (`[escalation]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Fixed reply sent when a request is handed to a person.
    #[serde(default = "default_acknowledgement")]
    pub acknowledgement: String,
    /// Register the "AI with Human Verification Agent" chain, whose answers
    /// are queued for a human verifier before delivery.
    #[serde(default)]
    pub verified_chain: bool,
}

fn default_acknowledgement() -> String {
    crate::agent::DEFAULT_ACKNOWLEDGEMENT.into()
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            acknowledgement: default_acknowledgement(),
            verified_chain: false,
        }
    }
}

/// Gateway server configuration (`[gateway]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Default: `"127.0.0.1"`.
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Default: `42618`.
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Maximum request body size. Default: `65536`.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Whole-request timeout, including routing. Default: `120`.
    #[serde(default = "default_gateway_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_gateway_port() -> u16 {
    42618
}

fn default_max_body_bytes() -> usize {
    65_536
}

fn default_gateway_timeout_secs() -> u64 {
    120
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            max_body_bytes: default_max_body_bytes(),
            request_timeout_secs: default_gateway_timeout_secs(),
        }
    }
}

/// Data file configuration (`[data]` section). Built-in sample tables are
/// used for any path left unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataConfig {
    /// JSON object of order records keyed by order ID.
    #[serde(default)]
    pub orders_path: Option<String>,
    /// JSON object of shipment records keyed by order ID.
    #[serde(default)]
    pub shipments_path: Option<String>,
    /// JSON object of product records keyed by product name.
    #[serde(default)]
    pub products_path: Option<String>,
    /// JSON object mapping collection IDs to document lists.
    #[serde(default)]
    pub knowledge_path: Option<String>,
}

/// Expand `~` and `$VARS` in a configured path.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::full(raw).map_or_else(|_| raw.to_string(), |p| p.into_owned()))
}

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());

        Self {
            config_path: home.join(".switchyard").join(CONFIG_FILE_NAME),
            api_key: None,
            api_url: None,
            default_provider: Some("openai".to_string()),
            default_model: Some("gpt-4o-mini".to_string()),
            default_temperature: default_temperature(),
            classifier: ClassifierConfig::default(),
            tool_loop: ToolLoopSettings::default(),
            history: HistoryConfig::default(),
            reliability: ReliabilityConfig::default(),
            escalation: EscalationConfig::default(),
            gateway: GatewayConfig::default(),
            data: DataConfig::default(),
        }
    }
}

fn default_config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".switchyard"))
}

fn resolve_config_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }
    if let Ok(dir) = std::env::var("SWITCHYARD_CONFIG_DIR") {
        if !dir.trim().is_empty() {
            return Ok(expand_path(&dir));
        }
    }
    default_config_dir()
}

impl Config {
    /// Load `config.toml`, creating it with defaults when absent, then apply
    /// environment overrides and validate.
    pub async fn load_or_init(config_dir: Option<&Path>) -> Result<Self> {
        let dir = resolve_config_dir(config_dir)?;
        let mut config = Self::load_from_dir(&dir).await?;
        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(path = %config.config_path.display(), "Config loaded");
        Ok(config)
    }

    /// Read or initialize the file in `dir` without env overrides.
    pub async fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        if config_path.exists() {
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(meta) = fs::metadata(&config_path).await {
                    if meta.permissions().mode() & 0o004 != 0 {
                        tracing::warn!(
                            "Config file {:?} is world-readable (mode {:o}). \
                             Consider restricting with: chmod 600 {:?}",
                            config_path,
                            meta.permissions().mode() & 0o777,
                            config_path,
                        );
                    }
                }
            }

            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path;
            Ok(config)
        } else {
            let config = Config {
                config_path: config_path.clone(),
                ..Config::default()
            };
            config.save().await?;

            #[cfg(unix)]
            {
                use std::{fs::Permissions, os::unix::fs::PermissionsExt};
                let _ = fs::set_permissions(&config_path, Permissions::from_mode(0o600)).await;
            }
            tracing::info!(path = %config_path.display(), "Initialized default config");
            Ok(config)
        }
    }

    /// Validate configuration values that would cause runtime failures.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.host.trim().is_empty() {
            anyhow::bail!("gateway.host must not be empty");
        }
        let threshold = self.classifier.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            anyhow::bail!("classifier.confidence_threshold must be within 0..=1 (got {threshold})");
        }
        if self.classifier.fallback_agent.trim().is_empty() {
            anyhow::bail!("classifier.fallback_agent must not be empty");
        }
        if self.reliability.max_backoff_ms < self.reliability.initial_backoff_ms {
            anyhow::bail!("reliability.max_backoff_ms must be >= reliability.initial_backoff_ms");
        }
        if !(0.0..=2.0).contains(&self.default_temperature) {
            anyhow::bail!("default_temperature must be within 0..=2");
        }
        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from any variable source. Empty values are ignored.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        // API Key: SWITCHYARD_API_KEY or API_KEY (generic)
        if let Some(key) = get("SWITCHYARD_API_KEY").or_else(|| get("API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(provider) = get("SWITCHYARD_PROVIDER") {
            self.default_provider = Some(provider);
        }
        if let Some(model) = get("SWITCHYARD_MODEL") {
            self.default_model = Some(model);
        }
        if let Some(url) = get("SWITCHYARD_API_URL") {
            self.api_url = Some(url);
        }
        if let Some(host) = get("SWITCHYARD_GATEWAY_HOST") {
            self.gateway.host = host;
        }
        if let Some(port) = get("SWITCHYARD_GATEWAY_PORT") {
            match port.parse::<u16>() {
                Ok(port) => self.gateway.port = port,
                Err(_) => tracing::warn!(value = %port, "Ignoring invalid SWITCHYARD_GATEWAY_PORT"),
            }
        }
        if let Some(threshold) = get("SWITCHYARD_CONFIDENCE_THRESHOLD") {
            match threshold.parse::<f64>() {
                Ok(value) => self.classifier.confidence_threshold = value,
                Err(_) => tracing::warn!(
                    value = %threshold,
                    "Ignoring invalid SWITCHYARD_CONFIDENCE_THRESHOLD"
                ),
            }
        }
    }

    pub fn provider_name(&self) -> &str {
        self.default_provider.as_deref().unwrap_or("openai")
    }

    pub fn model(&self) -> &str {
        self.default_model.as_deref().unwrap_or("gpt-4o-mini")
    }

    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;

        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or(CONFIG_FILE_NAME);
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));
        let backup_path = parent_dir.join(format!("{file_name}.bak"));

        let mut temp_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create temporary config file: {}",
                    temp_path.display()
                )
            })?;
        temp_file
            .write_all(toml_str.as_bytes())
            .await
            .context("Failed to write temporary config contents")?;
        temp_file
            .sync_all()
            .await
            .context("Failed to fsync temporary config file")?;
        drop(temp_file);

        let had_existing_config = self.config_path.exists();
        if had_existing_config {
            fs::copy(&self.config_path, &backup_path)
                .await
                .with_context(|| {
                    format!(
                        "Failed to create config backup before atomic replace: {}",
                        backup_path.display()
                    )
                })?;
        }

        if let Err(e) = fs::rename(&temp_path, &self.config_path).await {
            let _ = fs::remove_file(&temp_path).await;
            if had_existing_config && backup_path.exists() {
                fs::copy(&backup_path, &self.config_path)
                    .await
                    .context("Failed to restore config backup")?;
            }
            anyhow::bail!("Failed to atomically replace config file: {e}");
        }

        sync_directory(parent_dir).await?;

        if had_existing_config {
            let _ = fs::remove_file(&backup_path).await;
        }

        Ok(())
    }
}

async fn sync_directory(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let dir = File::open(path)
            .await
            .with_context(|| format!("Failed to open directory for fsync: {}", path.display()))?;
        dir.sync_all()
            .await
            .with_context(|| format!("Failed to fsync directory metadata: {}", path.display()))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── Defaults ─────────────────────────────────────────────

    #[test]
    fn config_default_has_sane_values() {
        let c = Config::default();
        assert_eq!(c.provider_name(), "openai");
        assert_eq!(c.model(), "gpt-4o-mini");
        assert!((c.default_temperature - 0.2).abs() < f64::EPSILON);
        assert!(c.api_key.is_none());
        assert!(c.config_path.to_string_lossy().contains(".switchyard"));
        assert_eq!(c.classifier.fallback_agent, "Human Agent");
        assert_eq!(c.tool_loop.max_recursions, 5);
        assert_eq!(c.gateway.port, 42618);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn config_minimal_toml_uses_defaults() {
        let parsed: Config = toml::from_str("default_temperature = 0.0\n").unwrap();
        assert!(parsed.default_provider.is_none());
        assert_eq!(parsed.provider_name(), "openai");
        assert!((parsed.classifier.confidence_threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(parsed.history.max_messages, 50);
        assert_eq!(parsed.reliability.max_retries, 2);
        assert_eq!(parsed.gateway.max_body_bytes, 65_536);
        assert!(parsed.data.orders_path.is_none());
        assert!(!parsed.escalation.verified_chain);
    }

    #[test]
    fn escalation_section_enables_verified_chain() {
        let parsed: Config = toml::from_str("[escalation]\nverified_chain = true\n").unwrap();
        assert!(parsed.escalation.verified_chain);
        assert_eq!(
            parsed.escalation.acknowledgement,
            crate::agent::DEFAULT_ACKNOWLEDGEMENT
        );
        assert!((parsed.default_temperature - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn config_toml_roundtrip() {
        let mut config = Config::default();
        config.classifier.confidence_threshold = 0.75;
        config.tool_loop.max_recursions = 3;
        config.history.max_tokens = Some(2000);
        config.data.orders_path = Some("~/orders.json".into());

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert!((parsed.classifier.confidence_threshold - 0.75).abs() < f64::EPSILON);
        assert_eq!(parsed.tool_loop.max_recursions, 3);
        assert_eq!(parsed.history.max_tokens, Some(2000));
        assert_eq!(parsed.data.orders_path.as_deref(), Some("~/orders.json"));
    }

    #[test]
    fn zero_recursions_coerced_to_default() {
        let settings = ToolLoopSettings {
            max_recursions: 0,
            tool_timeout_secs: 0,
        };
        let loop_config = settings.to_loop_config();
        assert_eq!(loop_config.max_recursions, DEFAULT_MAX_RECURSIONS);
        assert_eq!(loop_config.tool_timeout, Duration::from_secs(1));
    }

    #[test]
    fn derived_policies_follow_sections() {
        let config = Config::default();
        let retry = config.reliability.to_retry_policy();
        assert_eq!(retry.max_retries, 2);
        assert_eq!(retry.initial_backoff, Duration::from_millis(250));
        assert_eq!(retry.max_backoff, Duration::from_millis(4000));
        let policy = config.history.to_policy();
        assert_eq!(policy.max_messages, Some(50));
        assert_eq!(policy.max_tokens, None);
    }

    // ── Validation ───────────────────────────────────────────

    #[test]
    fn validate_rejects_bad_values() {
        let mut c = Config::default();
        c.gateway.host = "  ".into();
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.classifier.confidence_threshold = 1.5;
        assert!(c
            .validate()
            .unwrap_err()
            .to_string()
            .contains("confidence_threshold"));

        let mut c = Config::default();
        c.classifier.fallback_agent = String::new();
        assert!(c.validate().is_err());

        let mut c = Config::default();
        c.reliability.initial_backoff_ms = 5000;
        assert!(c.validate().is_err());
    }

    // ── Env overrides ────────────────────────────────────────

    #[test]
    fn overrides_apply_and_ignore_empty_or_invalid() {
        let mut c = Config::default();
        c.apply_overrides_from(lookup(&[
            ("API_KEY", "generic"),
            ("SWITCHYARD_MODEL", "gpt-4o"),
            ("SWITCHYARD_PROVIDER", ""),
            ("SWITCHYARD_GATEWAY_PORT", "not-a-port"),
            ("SWITCHYARD_GATEWAY_HOST", "0.0.0.0"),
            ("SWITCHYARD_CONFIDENCE_THRESHOLD", "0.8"),
        ]));
        assert_eq!(c.api_key.as_deref(), Some("generic"));
        assert_eq!(c.model(), "gpt-4o");
        assert_eq!(c.provider_name(), "openai");
        assert_eq!(c.gateway.port, 42618);
        assert_eq!(c.gateway.host, "0.0.0.0");
        assert!((c.classifier.confidence_threshold - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn switchyard_key_wins_over_generic() {
        let mut c = Config::default();
        c.apply_overrides_from(lookup(&[
            ("SWITCHYARD_API_KEY", "specific"),
            ("API_KEY", "generic"),
            ("SWITCHYARD_GATEWAY_PORT", "8080"),
        ]));
        assert_eq!(c.api_key.as_deref(), Some("specific"));
        assert_eq!(c.gateway.port, 8080);
    }

    #[test]
    fn expand_path_handles_tilde() {
        let expanded = expand_path("~/data/orders.json");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.ends_with("data/orders.json"));
        assert_eq!(expand_path("/abs/path"), PathBuf::from("/abs/path"));
    }

    // ── Persistence ──────────────────────────────────────────

    #[tokio::test]
    async fn load_from_dir_initializes_then_reads() {
        let dir = tempfile::tempdir().unwrap();
        let created = Config::load_from_dir(dir.path()).await.unwrap();
        assert!(created.config_path.exists());
        assert_eq!(created.config_path, dir.path().join("config.toml"));

        let mut edited = created.clone();
        edited.classifier.fallback_agent = "Escalation Desk".into();
        edited.save().await.unwrap();

        let loaded = Config::load_from_dir(dir.path()).await.unwrap();
        assert_eq!(loaded.classifier.fallback_agent, "Escalation Desk");
    }

    #[tokio::test]
    async fn load_from_dir_accepts_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(
            dir.path().join("config.toml"),
            "default_model = \"gpt-4o\"\n\n[gateway]\nport = 9000\n",
        )
        .await
        .unwrap();

        let loaded = Config::load_from_dir(dir.path()).await.unwrap();
        assert_eq!(loaded.model(), "gpt-4o");
        assert_eq!(loaded.gateway.port, 9000);
        assert!((loaded.default_temperature - 0.2).abs() < f64::EPSILON);
        assert!(loaded.validate().is_ok());
    }

    #[tokio::test]
    async fn load_from_dir_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("config.toml"), "default_temperature = [")
            .await
            .unwrap();
        let err = Config::load_from_dir(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[tokio::test]
    async fn config_save_atomic_replaces_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        let mut config = Config {
            config_path: config_path.clone(),
            ..Config::default()
        };
        config.default_model = Some("model-a".into());
        config.save().await.unwrap();

        config.default_model = Some("model-b".into());
        config.save().await.unwrap();

        let contents = tokio::fs::read_to_string(&config_path).await.unwrap();
        assert!(contents.contains("model-b"));

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert!(!names.iter().any(|name| name.contains(".tmp-")));
        assert!(!names.iter().any(|name| name.ends_with(".bak")));
    }
}
