//! Utility functions for the kiwi CLI.

use anyhow::Result;
use kiwi_config::Config;
use kiwi_providers::mock::MockProvider;
use kiwi_providers::{LLMProvider, ProviderRegistry};
use std::sync::Arc;

use crate::cli_args::Cli;

/// Load configuration with CLI argument overrides applied.
///
/// Precedence, lowest first: defaults, config file, `KIWI_*` environment,
/// command-line flags.
pub fn load_config_with_cli_overrides(cli: &Cli) -> Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    apply_cli_overrides(&mut config, cli);
    config.validate()?;
    Ok(config)
}

pub fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if let Some(provider) = &cli.provider {
        config.llm.provider = provider.clone();
    }
    if let Some(model) = &cli.model {
        config.llm.model = Some(model.clone());
    }
    if cli.no_streaming {
        config.ui.streaming = false;
    }
    if cli.unsafe_mode {
        config.llm.safe_mode = false;
    }
    if cli.debug {
        config.ui.debug = true;
    }
}

/// Providers this binary knows about, with the configured one as default.
pub fn build_provider_registry(config: &Config) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();

    let mut mock = MockProvider::new();
    if let Some(model) = &config.llm.model {
        mock = mock.with_model(model);
    }
    registry.register(mock);

    registry.set_default(&config.llm.provider).map_err(|_| {
        anyhow::anyhow!(
            "Unknown provider '{}'. Available providers: {:?}",
            config.llm.provider,
            registry.list_providers()
        )
    })?;
    Ok(registry)
}

pub fn resolve_provider(config: &Config) -> Result<Arc<dyn LLMProvider>> {
    build_provider_registry(config)?.get(None)
}

/// Initialize logging based on CLI verbosity settings.
pub fn initialize_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    for target in ["kiwi", "kiwi_cli", "kiwi_core", "kiwi_providers", "kiwi_config"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_flags_override_config() {
        let mut config = Config::default();
        let cli = Cli::parse_from(["kiwi", "--model", "m2", "--no-streaming", "--unsafe", "--debug"]);
        apply_cli_overrides(&mut config, &cli);

        assert_eq!(config.llm.model.as_deref(), Some("m2"));
        assert!(!config.ui.streaming);
        assert!(!config.llm.safe_mode);
        assert!(config.ui.debug);
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let mut config = Config::default();
        config.llm.model = Some("configured".to_string());
        apply_cli_overrides(&mut config, &Cli::parse_from(["kiwi"]));

        assert_eq!(config.llm.model.as_deref(), Some("configured"));
        assert!(config.ui.streaming);
        assert!(config.llm.safe_mode);
    }

    #[test]
    fn test_mock_provider_is_resolved() {
        let mut config = Config::default();
        config.llm.model = Some("offline".to_string());
        let provider = resolve_provider(&config).unwrap();
        assert_eq!(provider.name(), "mock");
        assert_eq!(provider.model(), "offline");
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let mut config = Config::default();
        config.llm.provider = "nonexistent".to_string();
        let err = build_provider_registry(&config).err().unwrap();
        assert!(err.to_string().contains("Unknown provider 'nonexistent'"));
    }
}
