use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::config::{RuntimeConfig, workflow_options};
use crate::provider::resolve_completion_service;
use crate::telemetry::TelemetrySink;
use crate::message_log::Message;
use crate::workflow::{CodeWorkflow, WorkflowResult};

pub fn read_task(prompt: &[String], task_file: Option<&str>) -> Result<String> {
    let task = match task_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read task file '{}'", path))?,
        None => prompt.join(" "),
    };
    if task.trim().is_empty() {
        return Err(anyhow::anyhow!(
            "invalid value: provide a task as arguments or with --task-file"
        ));
    }
    Ok(task)
}

/// Cancels the token on Ctrl-C so an in-flight turn stops without appending.
pub fn spawn_interrupt_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling workflow");
            cancel.cancel();
        }
    });
}

pub async fn run_task(
    cfg: &RuntimeConfig,
    task: &str,
    telemetry: &TelemetrySink,
    cancel: &CancellationToken,
) -> Result<WorkflowResult> {
    let (service, provider, model_name) = resolve_completion_service(cfg)?;
    tracing::info!(provider = ?provider, model = %model_name, "Using model");
    telemetry.emit(
        "workflow.started",
        json!({
            "provider": format!("{:?}", provider).to_ascii_lowercase(),
            "model": model_name,
            "max_rounds": cfg.max_rounds,
        }),
    );

    let workflow = CodeWorkflow::new(service, workflow_options(cfg, &model_name))
        .with_telemetry(telemetry.clone());
    let result = workflow.run_once(task, cancel).await?;
    Ok(result)
}

pub fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        out.push_str(&format!(
            "---------- [{}] {} ----------\n{}\n",
            message.ordinal,
            message.role.display_name(),
            message.content.trim_end()
        ));
    }
    out
}

/// Stdout text for a finished run: transcript and stats around the final code
/// when verbose, the final code alone otherwise.
pub fn render_result(result: &WorkflowResult, verbose: bool) -> String {
    let mut out = String::new();
    if verbose {
        let rule = "=".repeat(60);
        out.push_str(&format!("{rule}\nConversation transcript:\n"));
        out.push_str(&render_transcript(&result.messages));
        out.push_str(&format!("{rule}\n"));
    }
    out.push_str(&format!("{}\n", result.final_code));
    if verbose {
        out.push_str(&format!(
            "\nRounds: {} | Messages: {} | Stopped by: {} | Elapsed: {:.2}s\n",
            result.rounds,
            result.messages.len(),
            result.termination_reason.label(),
            result.elapsed.as_secs_f64()
        ));
    }
    out
}

pub fn print_result(result: &WorkflowResult, verbose: bool) {
    print!("{}", render_result(result, verbose));
}

pub fn write_output(path: &str, result: &WorkflowResult) -> Result<()> {
    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create output directory '{}'", parent.display())
            })?;
        }
    }
    let content = result.code_blocks().join("\n\n");
    std::fs::write(path, format!("{}\n", content.trim_end()))
        .with_context(|| format!("failed to write output file '{}'", path.display()))
}
