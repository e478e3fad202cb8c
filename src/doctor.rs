use anyhow::Result;

use crate::config::{RuntimeConfig, display_base_url};
use crate::provider::{default_model, detect_provider, env_present, validate_model_for_provider};

pub fn run_doctor(cfg: &RuntimeConfig) -> Result<()> {
    println!(
        "Active profile: '{}' (config: {})",
        cfg.profile, cfg.config_path
    );

    let checks = [
        ("OPENAI_API_KEY", env_present("OPENAI_API_KEY")),
        ("OLLAMA_HOST", env_present("OLLAMA_HOST")),
    ];

    println!("Provider environment check:");
    for (key, ok) in checks {
        let status = if ok { "set" } else { "missing" };
        println!("- {key}: {status}");
    }

    let resolved = match cfg.provider {
        crate::cli::Provider::Auto => detect_provider(),
        provider => Some(provider),
    };
    match resolved {
        Some(provider) => {
            let model = cfg
                .model
                .clone()
                .unwrap_or_else(|| default_model(provider).to_string());
            let compatibility = match validate_model_for_provider(provider, &model) {
                Ok(()) => "ok".to_string(),
                Err(err) => err.to_string(),
            };
            println!("Provider resolution: {:?}", provider);
            println!("Model: {} ({})", model, compatibility);
        }
        None => {
            println!("Provider resolution: none");
            println!("Tip: export OPENAI_API_KEY or run with --provider ollama");
        }
    }

    println!("Base URL: {}", display_base_url(cfg));
    println!(
        "Workflow: max_rounds={} termination_marker={:?} temperature={} turn_timeout_secs={} verbose={}",
        cfg.max_rounds,
        cfg.termination_marker,
        cfg.temperature,
        cfg.turn_timeout_secs,
        cfg.verbose
    );
    println!(
        "Telemetry: enabled={} path={}",
        cfg.telemetry_enabled, cfg.telemetry_path
    );

    Ok(())
}
