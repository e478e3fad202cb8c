use anyhow::Result;
use clap::Parser;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use codeloop::agents::{AgentRoster, run_roles_list, run_roles_show};
use codeloop::cli::{Cli, Commands, ProfileCommands, RoleCommands, TelemetryCommands, command_label};
use codeloop::config::{load_profiles, resolve_runtime_config};
use codeloop::doctor::run_doctor;
use codeloop::error::{categorize_error, format_cli_error, render_error_message};
use codeloop::profiles::{run_profiles_list, run_profiles_show};
use codeloop::runner::{print_result, read_task, run_task, spawn_interrupt_listener, write_output};
use codeloop::telemetry::{TelemetrySink, run_telemetry_report};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let show_sensitive_config = cli.show_sensitive_config;
    if let Err(err) = run_cli(cli).await {
        eprintln!("{}", format_cli_error(&err, show_sensitive_config));
        tracing::error!(
            category = %categorize_error(&err).code(),
            error = %render_error_message(&err, show_sensitive_config),
            "command failed"
        );
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(log_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_filter).unwrap_or_else(|_| EnvFilter::new("error"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}

async fn run_cli(cli: Cli) -> Result<()> {
    init_tracing(&cli.log_filter)?;
    let profiles = load_profiles(&cli.config_path)?;
    let cfg = resolve_runtime_config(&cli, &profiles)?;
    let label = command_label(&cli.command);
    let telemetry = TelemetrySink::new(&cfg, label.clone());
    telemetry.emit("command.started", json!({ "profile": cfg.profile }));

    let outcome = dispatch(cli.command, &cfg, &profiles, &telemetry).await;
    match &outcome {
        Ok(()) => telemetry.emit("command.completed", json!({})),
        Err(err) => telemetry.emit(
            "command.failed",
            json!({
                "category": categorize_error(err).code(),
                "error": render_error_message(err, cfg.show_sensitive_config),
            }),
        ),
    }
    outcome
}

async fn dispatch(
    command: Commands,
    cfg: &codeloop::config::RuntimeConfig,
    profiles: &codeloop::config::ProfilesFile,
    telemetry: &TelemetrySink,
) -> Result<()> {
    match command {
        Commands::Run {
            prompt,
            task_file,
            output,
        } => {
            let task = read_task(&prompt, task_file.as_deref())?;
            let cancel = CancellationToken::new();
            spawn_interrupt_listener(cancel.clone());
            let result = run_task(cfg, &task, telemetry, &cancel).await?;
            print_result(&result, cfg.verbose);
            if let Some(path) = output.as_deref() {
                write_output(path, &result)?;
                eprintln!("Final code written to {path}");
            }
        }
        Commands::Roles { command } => {
            let roster = AgentRoster::new(&cfg.termination_marker);
            match command {
                RoleCommands::List => run_roles_list(&roster)?,
                RoleCommands::Show { name } => run_roles_show(&roster, &name)?,
            }
        }
        Commands::Profiles { command } => match command {
            ProfileCommands::List => run_profiles_list(profiles, cfg)?,
            ProfileCommands::Show => run_profiles_show(cfg)?,
        },
        Commands::Doctor => run_doctor(cfg)?,
        Commands::Telemetry { command } => match command {
            TelemetryCommands::Report { path, limit } => run_telemetry_report(cfg, path, limit)?,
        },
    }

    Ok(())
}
