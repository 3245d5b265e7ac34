//! Configuration loading, validation, and management for MathTutor.
//!
//! Loads configuration from `~/.mathtutor/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.mathtutor/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Language model settings
    #[serde(default)]
    pub model: ModelConfig,

    /// Answer pipeline settings
    #[serde(default)]
    pub tutor: TutorConfig,

    /// Plot sampling and terminal chart size
    #[serde(default)]
    pub plot: PlotConfig,

    /// Speech synthesis / recognition commands
    #[serde(default)]
    pub speech: SpeechConfig,

    /// OCR command
    #[serde(default)]
    pub ocr: OcrConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// "remote" (OpenAI-compatible server) or "local" (in-process Candle)
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Model identifier or local preset alias
    #[serde(default = "default_model_name")]
    pub name: String,

    /// Base URL of the OpenAI-compatible server
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Generation-length cap per answer
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Load the model as soon as a shell starts
    #[serde(default)]
    pub autoload: bool,
}

fn default_backend() -> String {
    "remote".into()
}
fn default_model_name() -> String {
    "phi3:mini".into()
}
fn default_api_url() -> String {
    "http://localhost:11434/v1".into()
}
fn default_temperature() -> f32 {
    0.5
}
fn default_max_tokens() -> u32 {
    512
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            name: default_model_name(),
            api_url: default_api_url(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            autoload: false,
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("backend", &self.backend)
            .field("name", &self.name)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("autoload", &self.autoload)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorConfig {
    /// Prefix placed before an algebra engine answer
    #[serde(default = "default_answer_label")]
    pub answer_label: String,

    /// "calculation_first" or "first_of_each"
    #[serde(default = "default_directive_policy")]
    pub directive_policy: String,

    /// Replaces the built-in tutor persona
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_answer_label() -> String {
    "Algebraic Solution: ".into()
}
fn default_directive_policy() -> String {
    "calculation_first".into()
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            answer_label: default_answer_label(),
            directive_policy: default_directive_policy(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotConfig {
    #[serde(default = "default_x_min")]
    pub x_min: f64,

    #[serde(default = "default_x_max")]
    pub x_max: f64,

    #[serde(default = "default_step")]
    pub step: f64,

    /// Terminal chart width in columns
    #[serde(default = "default_plot_width")]
    pub width: usize,

    /// Terminal chart height in rows
    #[serde(default = "default_plot_height")]
    pub height: usize,
}

fn default_x_min() -> f64 {
    -10.0
}
fn default_x_max() -> f64 {
    10.0
}
fn default_step() -> f64 {
    0.2
}
fn default_plot_width() -> usize {
    72
}
fn default_plot_height() -> usize {
    20
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            x_min: default_x_min(),
            x_max: default_x_max(),
            step: default_step(),
            width: default_plot_width(),
            height: default_plot_height(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Speak answers aloud
    #[serde(default)]
    pub enabled: bool,

    /// Program + args; the text is appended as the last argument
    #[serde(default = "default_speak_command")]
    pub speak_command: Vec<String>,

    /// Program + args printing one transcript line. Empty = unsupported.
    #[serde(default)]
    pub listen_command: Vec<String>,
}

fn default_speak_command() -> Vec<String> {
    vec!["espeak-ng".into()]
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            speak_command: default_speak_command(),
            listen_command: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_ocr_command")]
    pub command: String,

    #[serde(default = "default_ocr_language")]
    pub language: String,
}

fn default_ocr_command() -> String {
    "tesseract".into()
}
fn default_ocr_language() -> String {
    "eng".into()
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            command: default_ocr_command(),
            language: default_ocr_language(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8765
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

const KNOWN_BACKENDS: &[&str] = &["remote", "local"];
const KNOWN_POLICIES: &[&str] = &["calculation_first", "first_of_each"];

impl AppConfig {
    /// Load configuration from the default path (~/.mathtutor/config.toml).
    ///
    /// Environment variables override the file:
    /// - `MATHTUTOR_BACKEND`
    /// - `MATHTUTOR_MODEL`
    /// - `MATHTUTOR_API_URL`
    /// - `MATHTUTOR_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(backend) = lookup("MATHTUTOR_BACKEND") {
            self.model.backend = backend;
        }
        if let Some(model) = lookup("MATHTUTOR_MODEL") {
            self.model.name = model;
        }
        if let Some(url) = lookup("MATHTUTOR_API_URL") {
            self.model.api_url = url;
        }
        if let Some(key) = lookup("MATHTUTOR_API_KEY") {
            self.model.api_key = Some(key);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("MATHTUTOR_HOME") {
            return PathBuf::from(dir);
        }
        dirs_home().join(".mathtutor")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.temperature < 0.0 || self.model.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.model.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "model.max_tokens must be > 0".into(),
            ));
        }

        if !KNOWN_BACKENDS.contains(&self.model.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "model.backend must be one of {KNOWN_BACKENDS:?}, got '{}'",
                self.model.backend
            )));
        }

        if !KNOWN_POLICIES.contains(&self.tutor.directive_policy.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "tutor.directive_policy must be one of {KNOWN_POLICIES:?}, got '{}'",
                self.tutor.directive_policy
            )));
        }

        if self.plot.x_min >= self.plot.x_max {
            return Err(ConfigError::ValidationError(
                "plot.x_min must be less than plot.x_max".into(),
            ));
        }

        if self.plot.step <= 0.0 {
            return Err(ConfigError::ValidationError("plot.step must be > 0".into()));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
