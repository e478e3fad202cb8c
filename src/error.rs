use std::time::Duration;

use thiserror::Error;

use crate::completion::CompletionError;
use crate::message_log::{Message, Role};
use crate::workflow::select_final_code;

/// History captured when a run aborts, kept for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct PartialRun {
    pub messages: Vec<Message>,
    pub rounds_completed: u32,
}

impl PartialRun {
    /// Best code artifact produced before the failure, using the same fallback
    /// rule as a successful run.
    pub fn final_code(&self) -> Option<&str> {
        select_final_code(&self.messages)
    }
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("completion service failed on {role} turn (round {round}): {source}")]
    CompletionService {
        role: Role,
        round: u32,
        #[source]
        source: CompletionError,
        partial: PartialRun,
    },

    #[error("{role} turn (round {round}) timed out after {limit:?}")]
    Timeout {
        role: Role,
        round: u32,
        limit: Duration,
        partial: PartialRun,
    },

    #[error("workflow cancelled before {role} turn (round {round}) completed")]
    Cancelled {
        role: Role,
        round: u32,
        partial: PartialRun,
    },

    #[error("invalid workflow state: {0}")]
    InvalidState(String),
}

impl WorkflowError {
    pub fn partial(&self) -> Option<&PartialRun> {
        match self {
            WorkflowError::CompletionService { partial, .. }
            | WorkflowError::Timeout { partial, .. }
            | WorkflowError::Cancelled { partial, .. } => Some(partial),
            WorkflowError::InvalidTask(_) | WorkflowError::InvalidState(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Provider,
    Workflow,
    Input,
    Internal,
}

impl ErrorCategory {
    pub fn code(self) -> &'static str {
        match self {
            ErrorCategory::Provider => "PROVIDER",
            ErrorCategory::Workflow => "WORKFLOW",
            ErrorCategory::Input => "INPUT",
            ErrorCategory::Internal => "INTERNAL",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            ErrorCategory::Provider => {
                "Set provider credentials (for example OPENAI_API_KEY) or run with --provider ollama."
            }
            ErrorCategory::Workflow => {
                "Retry with --verbose or RUST_LOG=info to see each turn. Raise --turn-timeout-secs for slow models."
            }
            ErrorCategory::Input => "Run codeloop --help and correct command arguments.",
            ErrorCategory::Internal => {
                "Retry with RUST_LOG=debug. If it persists, capture logs and open an issue."
            }
        }
    }
}

pub fn categorize_error(err: &anyhow::Error) -> ErrorCategory {
    if let Some(workflow_err) = err.downcast_ref::<WorkflowError>() {
        return match workflow_err {
            WorkflowError::InvalidTask(_) => ErrorCategory::Input,
            WorkflowError::CompletionService { .. } => ErrorCategory::Provider,
            WorkflowError::Timeout { .. }
            | WorkflowError::Cancelled { .. }
            | WorkflowError::InvalidState(_) => ErrorCategory::Workflow,
        };
    }

    let msg = format!("{err:#}").to_ascii_lowercase();

    if msg.contains("api_key")
        || msg.contains("no provider could be auto-detected")
        || msg.contains("provider")
    {
        return ErrorCategory::Provider;
    }

    if msg.contains("invalid value")
        || msg.contains("unknown argument")
        || msg.contains("failed to read")
        || msg.contains("profile")
        || msg.contains("temperature")
        || msg.contains("max_rounds")
        || msg.contains("termination marker")
    {
        return ErrorCategory::Input;
    }

    if msg.contains("turn") || msg.contains("round") || msg.contains("workflow") {
        return ErrorCategory::Workflow;
    }

    ErrorCategory::Internal
}

pub fn format_cli_error(err: &anyhow::Error, show_sensitive_config: bool) -> String {
    let category = categorize_error(err);
    let rendered_error = render_error_message(err, show_sensitive_config);
    format!(
        "[{}] {}\nHint: {}",
        category.code(),
        rendered_error,
        category.hint()
    )
}

pub fn render_error_message(err: &anyhow::Error, show_sensitive_config: bool) -> String {
    let text = format!("{err:#}");
    if show_sensitive_config {
        text
    } else {
        redact_sensitive_text(&text)
    }
}

pub fn redact_sensitive_text(text: &str) -> String {
    redact_api_keys(text)
}

/// Replaces `sk-...` style secret tokens, which some providers echo back in
/// authentication errors.
pub fn redact_api_keys(text: &str) -> String {
    const KEY_PREFIX: &str = "sk-";
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;

    while let Some(offset) = text[cursor..].find(KEY_PREFIX) {
        let start = cursor + offset;
        let at_boundary = text[..start]
            .chars()
            .next_back()
            .map(|ch| !ch.is_ascii_alphanumeric())
            .unwrap_or(true);
        out.push_str(&text[cursor..start]);

        let remainder = &text[start..];
        let end = remainder
            .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'))
            .unwrap_or(remainder.len());
        let token = &remainder[..end];
        if at_boundary && token.len() > KEY_PREFIX.len() {
            out.push_str("sk-[REDACTED]");
        } else {
            out.push_str(token);
        }
        cursor = start + end;
    }

    out.push_str(&text[cursor..]);
    out
}
