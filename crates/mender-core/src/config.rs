//! Configuration management for Mender
//!
//! Settings are read once at startup from `mender.toml` (if present), then
//! overridden by environment variables (after loading `.env`). The result is
//! validated and shared as an immutable value for the life of the process.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{BackendId, MenderError, Result};

/// Default configuration file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "mender.toml";

/// Hard upper bound on auxiliary search results per advisory prompt
pub const MAX_SEARCH_RESULTS: usize = 3;

/// Process-wide Mender configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MenderConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub docker: DockerConfig,

    #[serde(default)]
    pub backends: BackendsConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub services: ServicesConfig,

    #[serde(default)]
    pub patch: PatchConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub finance: FinanceConfig,

    #[serde(default)]
    pub debate: DebateConfig,
}

/// Poll loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between health polls
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Apply patches suggested by advisories without operator involvement
    #[serde(default)]
    pub autonomous_refactor: bool,
}

/// Container runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Docker CLI binary
    #[serde(default = "default_docker_binary")]
    pub binary: String,

    /// Compose file used for the startup build/up
    #[serde(default = "default_compose_file")]
    pub compose_file: PathBuf,

    /// Run `compose build` and `compose up -d` before polling starts
    #[serde(default)]
    pub compose_on_start: bool,
}

/// Text-generation backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsConfig {
    /// Query order for advisories; also the order of the combined text
    #[serde(default = "default_backend_order")]
    pub order: Vec<BackendId>,

    /// Backend that writes diffs
    #[serde(default = "default_code_backend")]
    pub code_backend: BackendId,

    /// Per-call timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub openai: OpenAiConfig,

    #[serde(default)]
    pub gemini: GeminiConfig,
}

/// OpenAI-style chat completion backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    #[serde(default = "default_openai_model")]
    pub model: String,

    #[serde(default = "default_advisory_temperature")]
    pub temperature: f32,

    /// Resolved at startup; never written back to disk
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

/// Gemini-style content generation backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,

    #[serde(default = "default_gemini_model")]
    pub model: String,

    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

/// Auxiliary web search included in advisory prompts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_search_base_url")]
    pub base_url: String,

    #[serde(default = "default_max_search_results")]
    pub max_results: usize,

    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

/// Service source tree settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Directory containing one sub-directory per service
    #[serde(default = "default_services_root")]
    pub root: PathBuf,

    /// Source file extensions gathered into code bundles
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Services that may be refactored; empty means any existing service directory
    #[serde(default)]
    pub allow_list: Vec<String>,
}

/// Patch utility settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchConfig {
    #[serde(default = "default_patch_binary")]
    pub binary: String,
}

/// Webhook and event channel settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Tried when `port` is already bound
    #[serde(default = "default_fallback_port")]
    pub fallback_port: u16,
}

/// Wallet balance check settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinanceConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Hex wallet address (`0x` + 40 hex digits)
    #[serde(default)]
    pub wallet: String,

    /// Balances below this many ETH trigger an advisory
    #[serde(default = "default_threshold_eth")]
    pub threshold_eth: f64,

    #[serde(default = "default_true")]
    pub trigger_advisory: bool,
}

/// Two-round generation/critic advisory mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_debate_agents")]
    pub agents: Vec<DebateAgentConfig>,
}

/// Role played by a debate agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebateRole {
    Generation,
    Critic,
}

/// One participant in debate mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateAgentConfig {
    pub id: String,
    pub role: DebateRole,
    pub backend: BackendId,
}

// Default value providers
fn default_interval_secs() -> u64 {
    60
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

fn default_compose_file() -> PathBuf {
    PathBuf::from("docker-compose.yml")
}

fn default_backend_order() -> Vec<BackendId> {
    vec![BackendId::Gpt, BackendId::Gemini]
}

fn default_code_backend() -> BackendId {
    BackendId::Gpt
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4".to_string()
}

fn default_advisory_temperature() -> f32 {
    0.4
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_gemini_model() -> String {
    "gemini-pro".to_string()
}

fn default_search_base_url() -> String {
    "https://api.tavily.com".to_string()
}

fn default_max_search_results() -> usize {
    2
}

fn default_services_root() -> PathBuf {
    PathBuf::from("services")
}

fn default_extensions() -> Vec<String> {
    ["py", "rs", "go", "c", "cpp", "js", "ts", "tsx"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_patch_binary() -> String {
    "patch".to_string()
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_fallback_port() -> u16 {
    5050
}

fn default_rpc_url() -> String {
    "https://eth-mainnet.alchemyapi.io/v2/YOURKEY".to_string()
}

fn default_threshold_eth() -> f64 {
    1.0
}

fn default_debate_agents() -> Vec<DebateAgentConfig> {
    vec![
        DebateAgentConfig {
            id: "GenAgent1".to_string(),
            role: DebateRole::Generation,
            backend: BackendId::Gpt,
        },
        DebateAgentConfig {
            id: "GenAgent2".to_string(),
            role: DebateRole::Generation,
            backend: BackendId::Gemini,
        },
        DebateAgentConfig {
            id: "CritAgent1".to_string(),
            role: DebateRole::Critic,
            backend: BackendId::Gemini,
        },
    ]
}

impl MenderConfig {
    /// Load configuration for the process
    ///
    /// Reads `.env`, then `path` (or `mender.toml` in the working directory if
    /// `path` is `None`), then applies environment overrides and validates.
    /// An explicit `path` that does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Err(e) = dotenv::dotenv() {
            tracing::debug!("No .env loaded: {}", e);
        }

        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            MenderError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse TOML configuration text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| MenderError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Write the default configuration to `path`
    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| MenderError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply environment overrides using `lookup` to read variables
    ///
    /// Unparsable values are configuration errors, not silently ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.backends.openai.api_key = Some(key);
        }
        if let Some(key) = non_empty("GEMINI_API_KEY").or_else(|| non_empty("GOOGLE_API_KEY")) {
            self.backends.gemini.api_key = Some(key);
        }
        if let Some(key) = non_empty("TAVILY_API_KEY") {
            self.search.api_key = Some(key);
        }
        if let Some(file) = non_empty("DOCKER_COMPOSE_FILE") {
            self.docker.compose_file = PathBuf::from(file);
        }
        if let Some(interval) = non_empty("MONITORING_INTERVAL") {
            self.monitor.interval_secs = interval.parse().map_err(|_| {
                MenderError::Config(format!("MONITORING_INTERVAL is not a number: {}", interval))
            })?;
        }
        if let Some(flag) = non_empty("AUTONOMOUS_REFACTOR") {
            self.monitor.autonomous_refactor = parse_flag("AUTONOMOUS_REFACTOR", &flag)?;
        }
        if let Some(flag) = non_empty("FINANCE_ENABLED") {
            self.finance.enabled = parse_flag("FINANCE_ENABLED", &flag)?;
        }
        if let Some(flag) = non_empty("AUTONOMOUS_FINANCE_ANALYSIS_TRIGGER") {
            self.finance.trigger_advisory =
                parse_flag("AUTONOMOUS_FINANCE_ANALYSIS_TRIGGER", &flag)?;
        }
        if let Some(url) = non_empty("ETH_RPC") {
            self.finance.rpc_url = url;
        }
        if let Some(wallet) = non_empty("ORGANIXX_ETH_WALLET") {
            self.finance.wallet = wallet;
        }
        if let Some(threshold) = non_empty("ETH_BALANCE_THRESHOLD_FOR_AI") {
            self.finance.threshold_eth = threshold.parse().map_err(|_| {
                MenderError::Config(format!(
                    "ETH_BALANCE_THRESHOLD_FOR_AI is not a number: {}",
                    threshold
                ))
            })?;
        }

        Ok(())
    }

    /// Reject settings that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.monitor.interval_secs == 0 {
            return Err(MenderError::Config(
                "monitor.interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.backends.timeout_secs == 0 {
            return Err(MenderError::Config(
                "backends.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.backends.order.is_empty() {
            return Err(MenderError::Config(
                "backends.order must name at least one backend".to_string(),
            ));
        }
        if self.search.max_results > MAX_SEARCH_RESULTS {
            return Err(MenderError::Config(format!(
                "search.max_results must be at most {}",
                MAX_SEARCH_RESULTS
            )));
        }
        if self.services.extensions.is_empty() {
            return Err(MenderError::Config(
                "services.extensions must not be empty".to_string(),
            ));
        }
        if self.debate.enabled
            && !self
                .debate
                .agents
                .iter()
                .any(|a| a.role == DebateRole::Generation)
        {
            return Err(MenderError::Config(
                "debate mode needs at least one generation agent".to_string(),
            ));
        }
        Ok(())
    }

    /// Per-call backend timeout
    pub fn backend_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.backends.timeout_secs)
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(MenderError::Config(format!(
            "{} must be true or false, got: {}",
            key, value
        ))),
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            autonomous_refactor: false,
        }
    }
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            binary: default_docker_binary(),
            compose_file: default_compose_file(),
            compose_on_start: false,
        }
    }
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            order: default_backend_order(),
            code_backend: default_code_backend(),
            timeout_secs: default_timeout_secs(),
            openai: OpenAiConfig::default(),
            gemini: GeminiConfig::default(),
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            temperature: default_advisory_temperature(),
            api_key: None,
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: default_gemini_base_url(),
            model: default_gemini_model(),
            api_key: None,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_search_base_url(),
            max_results: default_max_search_results(),
            api_key: None,
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            root: default_services_root(),
            extensions: default_extensions(),
            allow_list: Vec::new(),
        }
    }
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            binary: default_patch_binary(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
            fallback_port: default_fallback_port(),
        }
    }
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            agents: default_debate_agents(),
        }
    }
}

impl Default for FinanceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rpc_url: default_rpc_url(),
            wallet: String::new(),
            threshold_eth: default_threshold_eth(),
            trigger_advisory: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = MenderConfig::default();
        assert_eq!(config.monitor.interval_secs, 60);
        assert!(!config.monitor.autonomous_refactor);
        assert_eq!(config.backends.order, vec![BackendId::Gpt, BackendId::Gemini]);
        assert_eq!(config.backends.timeout_secs, 30);
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.fallback_port, 5050);
        assert_eq!(config.search.max_results, 2);
        assert!(config.services.extensions.contains(&"tsx".to_string()));
        assert_eq!(config.services.root, PathBuf::from("services"));
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = MenderConfig::from_toml(
            r#"
            [monitor]
            interval_secs = 5
            autonomous_refactor = true

            [services]
            allow_list = ["web", "payments-api"]
            "#,
        )
        .unwrap();
        assert_eq!(config.monitor.interval_secs, 5);
        assert!(config.monitor.autonomous_refactor);
        assert_eq!(config.services.allow_list.len(), 2);
        assert_eq!(config.patch.binary, "patch");
        assert_eq!(config.backends.openai.model, "gpt-4");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = MenderConfig::from_toml("[monitor\ninterval_secs = ").unwrap_err();
        assert!(matches!(err, MenderError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = MenderConfig::default();
        config
            .apply_env(env(&[
                ("OPENAI_API_KEY", " sk-test "),
                ("GOOGLE_API_KEY", "g-key"),
                ("MONITORING_INTERVAL", "15"),
                ("AUTONOMOUS_REFACTOR", "TRUE"),
                ("FINANCE_ENABLED", "false"),
                ("ETH_BALANCE_THRESHOLD_FOR_AI", "0.5"),
            ]))
            .unwrap();
        assert_eq!(config.backends.openai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.backends.gemini.api_key.as_deref(), Some("g-key"));
        assert_eq!(config.monitor.interval_secs, 15);
        assert!(config.monitor.autonomous_refactor);
        assert!(!config.finance.enabled);
        assert_eq!(config.finance.threshold_eth, 0.5);
    }

    #[test]
    fn test_gemini_key_prefers_gemini_var() {
        let mut config = MenderConfig::default();
        config
            .apply_env(env(&[("GEMINI_API_KEY", "a"), ("GOOGLE_API_KEY", "b")]))
            .unwrap();
        assert_eq!(config.backends.gemini.api_key.as_deref(), Some("a"));
    }

    #[test]
    fn test_bad_env_values_are_fatal() {
        let mut config = MenderConfig::default();
        assert!(config
            .apply_env(env(&[("MONITORING_INTERVAL", "soon")]))
            .is_err());
        assert!(config
            .apply_env(env(&[("AUTONOMOUS_REFACTOR", "maybe")]))
            .is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = MenderConfig::default();
        config.monitor.interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = MenderConfig::default();
        config.search.max_results = 5;
        assert!(config.validate().is_err());

        let mut config = MenderConfig::default();
        config.backends.order.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_write_default_round_trips_without_secrets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf/mender.toml");
        MenderConfig::write_default(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("api_key"));

        let loaded = MenderConfig::from_file(&path).unwrap();
        assert_eq!(loaded.monitor.interval_secs, 60);
        assert_eq!(loaded.debate.agents.len(), 3);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = MenderConfig::from_file(Path::new("/nonexistent/mender.toml")).unwrap_err();
        assert!(matches!(err, MenderError::Config(_)));
    }
}
