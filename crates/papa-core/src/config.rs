use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PapaError;

/// Top-level configuration loaded from `.papa.toml` and the environment.
///
/// Resolution order: defaults < config file < environment variables.
/// Built once at process start and passed by reference; nothing in the
/// pipeline reads the environment on its own.
///
/// # Examples
///
/// ```
/// use papa_core::PapaConfig;
///
/// let config = PapaConfig::default();
/// assert_eq!(config.review.max_diff_bytes, 100_000);
/// assert_eq!(config.github.api_url, "https://api.github.com");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PapaConfig {
    /// Source-control credentials and endpoint.
    #[serde(default)]
    pub github: GitHubConfig,
    /// Analysis provider settings.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Review behavior settings.
    #[serde(default)]
    pub review: ReviewConfig,
    /// Webhook server settings.
    #[serde(default)]
    pub server: ServerConfig,
}

impl PapaConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PapaError::Io`] if the file cannot be read, or
    /// [`PapaError::Toml`] if the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use papa_core::PapaConfig;
    /// use std::path::Path;
    ///
    /// let config = PapaConfig::from_file(Path::new(".papa.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, PapaError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`PapaError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use papa_core::PapaConfig;
    ///
    /// let toml = r#"
    /// [llm]
    /// model = "deepseek-chat"
    /// "#;
    /// let config = PapaConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.llm.model, "deepseek-chat");
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, PapaError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Overlay values from the process environment.
    ///
    /// # Errors
    ///
    /// See [`PapaConfig::apply_env_with`].
    pub fn apply_env(&mut self) -> Result<(), PapaError> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset. When the inline private key has
    /// no real newlines, literal `\n` sequences are expanded; when there is
    /// no inline key, `private_key_path` is read.
    ///
    /// # Errors
    ///
    /// Returns [`PapaError::Config`] if an integer variable does not parse
    /// or the private key file cannot be read.
    ///
    /// # Examples
    ///
    /// ```
    /// use papa_core::PapaConfig;
    ///
    /// let mut config = PapaConfig::default();
    /// config
    ///     .apply_env_with(|key| match key {
    ///         "GITHUB_TOKEN" => Some("ghp_test".into()),
    ///         "GITHUB_APP_ID" => Some("1234".into()),
    ///         _ => None,
    ///     })
    ///     .unwrap();
    /// assert_eq!(config.github.token.as_deref(), Some("ghp_test"));
    /// assert_eq!(config.github.app_id, Some(1234));
    /// ```
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), PapaError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_u64 = |key: &str| -> Result<Option<u64>, PapaError> {
            get(key)
                .map(|v| {
                    v.trim().parse::<u64>().map_err(|_| {
                        PapaError::Config(format!("{key} must be a positive integer, got '{v}'"))
                    })
                })
                .transpose()
        };

        if let Some(token) = get("GITHUB_TOKEN").or_else(|| get("GH_TOKEN")) {
            self.github.token = Some(token);
        }
        if let Some(app_id) = get_u64("GITHUB_APP_ID")? {
            self.github.app_id = Some(app_id);
        }
        if let Some(key) = get("GITHUB_APP_PRIVATE_KEY") {
            self.github.private_key = Some(key);
        }
        if let Some(path) = get("GITHUB_APP_PRIVATE_KEY_PATH") {
            self.github.private_key_path = Some(PathBuf::from(path));
        }
        if let Some(installation_id) = get_u64("GITHUB_APP_INSTALLATION_ID")? {
            self.github.installation_id = Some(installation_id);
        }
        if let Some(url) = get("GITHUB_API_URL") {
            self.github.api_url = url;
        }
        if let Some(secret) = get("GITHUB_WEBHOOK_SECRET") {
            self.github.webhook_secret = Some(secret);
        }
        if let Some(key) = get("DEEPSEEK_KEY").or_else(|| get("LLM_API_KEY")) {
            self.llm.api_key = Some(key);
        }
        if let Some(url) = get("LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = get("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(bind) = get("PAPA_BIND") {
            self.server.bind = bind;
        }

        self.github.resolve_private_key()
    }

    /// Check that enough settings are present to process events.
    ///
    /// An analysis API key is required, plus either a static token or
    /// GitHub App credentials (app id and private key).
    ///
    /// # Errors
    ///
    /// Returns [`PapaError::Config`] naming what is missing.
    ///
    /// # Examples
    ///
    /// ```
    /// use papa_core::PapaConfig;
    ///
    /// let mut config = PapaConfig::default();
    /// assert!(config.validate().is_err());
    ///
    /// config.github.token = Some("ghp_test".into());
    /// config.llm.api_key = Some("sk-test".into());
    /// assert!(config.validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<(), PapaError> {
        let has_token_auth = self.github.token.is_some();
        let has_app_auth = self.github.app_id.is_some() && self.github.private_key.is_some();

        if !has_token_auth && !has_app_auth {
            return Err(PapaError::Config(
                "no GitHub credentials: set GITHUB_TOKEN, or GITHUB_APP_ID with GITHUB_APP_PRIVATE_KEY"
                    .into(),
            ));
        }
        if self.github.private_key.is_some() && self.github.app_id.is_none() {
            return Err(PapaError::Config(
                "GITHUB_APP_PRIVATE_KEY is set but GITHUB_APP_ID is missing".into(),
            ));
        }
        if self.llm.api_key.is_none() {
            return Err(PapaError::Config(
                "no analysis API key: set DEEPSEEK_KEY or llm.api_key".into(),
            ));
        }
        Ok(())
    }
}

/// GitHub credentials and endpoint.
///
/// `Debug` redacts every secret.
#[derive(Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Static personal/bot token.
    pub token: Option<String>,
    /// GitHub App identifier.
    pub app_id: Option<u64>,
    /// PEM-encoded GitHub App private key.
    pub private_key: Option<String>,
    /// File holding the PEM key, read when `private_key` is unset.
    pub private_key_path: Option<PathBuf>,
    /// Installation to use when the event does not name one.
    pub installation_id: Option<u64>,
    /// REST API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Shared secret for `X-Hub-Signature-256` verification.
    pub webhook_secret: Option<String>,
}

fn default_api_url() -> String {
    "https://api.github.com".into()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            app_id: None,
            private_key: None,
            private_key_path: None,
            installation_id: None,
            api_url: default_api_url(),
            webhook_secret: None,
        }
    }
}

impl GitHubConfig {
    fn resolve_private_key(&mut self) -> Result<(), PapaError> {
        if let Some(key) = &self.private_key {
            if !key.contains('\n') && key.contains("\\n") {
                self.private_key = Some(key.replace("\\n", "\n"));
            }
            return Ok(());
        }
        if let Some(path) = &self.private_key_path {
            let pem = std::fs::read_to_string(path).map_err(|e| {
                PapaError::Config(format!(
                    "failed to read GitHub App private key from {}: {e}",
                    path.display()
                ))
            })?;
            self.private_key = Some(pem);
        }
        Ok(())
    }
}

impl fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token", &redact(&self.token))
            .field("app_id", &self.app_id)
            .field("private_key", &redact(&self.private_key))
            .field("private_key_path", &self.private_key_path)
            .field("installation_id", &self.installation_id)
            .field("api_url", &self.api_url)
            .field("webhook_secret", &redact(&self.webhook_secret))
            .finish()
    }
}

/// Analysis provider configuration (any OpenAI-compatible endpoint).
///
/// # Examples
///
/// ```
/// use papa_core::LlmConfig;
///
/// let config = LlmConfig::default();
/// assert_eq!(config.model, "deepseek-coder");
/// assert_eq!(config.max_tokens, 1000);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for the provider.
    pub api_key: Option<String>,
    /// Base URL; `/v1/chat/completions` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Completion length cap.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    "deepseek-coder".into()
}

fn default_base_url() -> String {
    "https://api.deepseek.com".into()
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_temperature() -> f64 {
    0.7
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            base_url: default_base_url(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Review behavior configuration.
///
/// # Examples
///
/// ```
/// use papa_core::ReviewConfig;
///
/// assert_eq!(ReviewConfig::default().max_diff_bytes, 100_000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Diffs longer than this many bytes get the advisory instead of a review.
    #[serde(default = "default_max_diff_bytes")]
    pub max_diff_bytes: usize,
}

fn default_max_diff_bytes() -> usize {
    100_000
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            max_diff_bytes: default_max_diff_bytes(),
        }
    }
}

/// Webhook server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Deadline for processing one event, in seconds.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

fn default_bind() -> String {
    "0.0.0.0:8080".into()
}

fn default_deadline_secs() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            deadline_secs: default_deadline_secs(),
        }
    }
}

fn redact(value: &Option<String>) -> &'static str {
    if value.is_some() {
        "<redacted>"
    } else {
        "<unset>"
    }
}
