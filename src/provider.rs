use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::cli::Provider;
use crate::completion::{
    CompletionService, DEFAULT_OLLAMA_HOST, OllamaCompletion, OpenAiCompletion,
};
use crate::config::RuntimeConfig;

pub fn validate_model_for_provider(provider: Provider, model_name: &str) -> Result<()> {
    let is_valid = match provider {
        Provider::Openai => {
            model_name.starts_with("gpt-")
                || model_name.starts_with("o1")
                || model_name.starts_with("o3")
                || model_name.starts_with("o4")
        }
        Provider::Ollama => !model_name.trim().is_empty(),
        Provider::Auto => true,
    };

    if is_valid {
        return Ok(());
    }

    Err(anyhow::anyhow!(
        "model '{}' is not compatible with provider '{:?}'",
        model_name,
        provider
    ))
}

pub fn default_model(provider: Provider) -> &'static str {
    match provider {
        Provider::Openai | Provider::Auto => "gpt-4o-mini",
        Provider::Ollama => "llama3.1",
    }
}

/// Builds the completion client for the configured provider. Credentials are
/// read here, once, and never by the workflow itself.
pub fn resolve_completion_service(
    cfg: &RuntimeConfig,
) -> Result<(Arc<dyn CompletionService>, Provider, String)> {
    let provider = match cfg.provider {
        Provider::Auto => detect_provider().context(
            "no provider could be auto-detected. Set OPENAI_API_KEY or OLLAMA_HOST, \
             or use --provider ollama",
        )?,
        p => p,
    };
    let model_name = cfg
        .model
        .clone()
        .unwrap_or_else(|| default_model(provider).to_string());
    validate_model_for_provider(provider, &model_name)?;
    let http_timeout = Duration::from_secs(cfg.turn_timeout_secs);

    match provider {
        Provider::Openai => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY is required for OpenAI provider")?;
            let mut client = OpenAiCompletion::new(api_key, http_timeout)
                .context("failed to build OpenAI provider client")?;
            if let Some(base_url) = cfg.base_url.as_deref() {
                client = client.base_url(base_url);
            }
            Ok((Arc::new(client), provider, model_name))
        }
        Provider::Ollama => {
            let host = cfg
                .base_url
                .clone()
                .or_else(|| std::env::var("OLLAMA_HOST").ok())
                .filter(|host| !host.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string());
            let client = OllamaCompletion::new(host, http_timeout)
                .context("failed to build Ollama provider client")?;
            Ok((Arc::new(client), provider, model_name))
        }
        Provider::Auto => Err(anyhow::anyhow!(
            "auto provider must be resolved before building a client"
        )),
    }
}

pub fn detect_provider() -> Option<Provider> {
    if env_present("OPENAI_API_KEY") {
        return Some(Provider::Openai);
    }
    if env_present("OLLAMA_HOST") {
        return Some(Provider::Ollama);
    }
    None
}

pub fn env_present(key: &str) -> bool {
    std::env::var(key)
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false)
}
