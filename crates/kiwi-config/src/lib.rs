use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

#[cfg(test)]
mod tests;

/// Prefix for environment variable overrides (`KIWI_MODEL`, ...).
pub const ENV_PREFIX: &str = "KIWI_";

const DEFAULT_PATHS: [&str; 3] = ["./kiwi.toml", "~/.config/kiwi/config.toml", "~/.kiwi/config.toml"];

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub ui: UiConfig,
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: Option<String>,
    /// Ask before running tools that change the machine (shell commands).
    pub safe_mode: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: None,
            safe_mode: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Print response metrics after each turn
    pub debug: bool,
    pub streaming: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            debug: false,
            streaming: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Model calls per turn when streaming
    pub max_tool_calls: usize,
    /// Model calls per turn in single-shot (non-streaming) mode
    pub max_tool_calls_single_shot: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Minimum time the terminal stays in one state before the next transition
    pub min_dwell_ms: u64,
    pub stream_flush_threshold: usize,
    pub shell: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_calls: 10,
            max_tool_calls_single_shot: 5,
            max_retries: 3,
            retry_backoff_ms: 500,
            min_dwell_ms: 300,
            stream_flush_threshold: 100,
            shell: "bash".to_string(),
        }
    }
}

impl Config {
    /// Load from `config_path`, or the first existing default location,
    /// then apply `KIWI_*` environment overrides.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = match Self::resolve_path(config_path)? {
            Some(path) => Self::from_file(&path)?,
            None => {
                debug!("No configuration file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_path(config_path: Option<&str>) -> Result<Option<PathBuf>> {
        if let Some(path) = config_path {
            let expanded = PathBuf::from(shellexpand::tilde(path).as_ref());
            if !expanded.exists() {
                anyhow::bail!("Configuration file not found: {}", expanded.display());
            }
            return Ok(Some(expanded));
        }

        Ok(DEFAULT_PATHS.iter().find_map(|path| {
            let expanded = PathBuf::from(shellexpand::tilde(path).as_ref());
            expanded.exists().then_some(expanded)
        }))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Apply `KIWI_PROVIDER`, `KIWI_MODEL`, `KIWI_SAFE_MODE`, `KIWI_STREAMING`
    /// and `KIWI_DEBUG` from `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(provider) = var("PROVIDER") {
            self.llm.provider = provider;
        }
        if let Some(model) = var("MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(value) = var("SAFE_MODE") {
            self.llm.safe_mode = parse_bool("SAFE_MODE", &value)?;
        }
        if let Some(value) = var("STREAMING") {
            self.ui.streaming = parse_bool("STREAMING", &value)?;
        }
        if let Some(value) = var("DEBUG") {
            self.ui.debug = parse_bool("DEBUG", &value)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.agent.max_tool_calls == 0 || self.agent.max_tool_calls_single_shot == 0 {
            anyhow::bail!("agent.max_tool_calls and agent.max_tool_calls_single_shot must be at least 1");
        }
        if self.agent.max_retries == 0 {
            anyhow::bail!("agent.max_retries must be at least 1");
        }
        if self.agent.shell.trim().is_empty() {
            anyhow::bail!("agent.shell must not be empty");
        }
        Ok(())
    }

    /// Model calls allowed per turn for the current streaming mode.
    pub fn max_model_calls(&self) -> usize {
        if self.ui.streaming {
            self.agent.max_tool_calls
        } else {
            self.agent.max_tool_calls_single_shot
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("Invalid boolean for {}{}: '{}'", ENV_PREFIX, name, other),
    }
}
