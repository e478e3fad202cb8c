use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::agents::{AgentRoster, TurnSettings};
use crate::completion::{CompletionError, CompletionService};
use crate::error::{PartialRun, WorkflowError};
use crate::message_log::{Message, MessageLog, Role};
use crate::scheduler::{
    DEFAULT_MAX_ROUNDS, DEFAULT_TERMINATION_MARKER, TerminationReason, TurnScheduler, TurnState,
};
use crate::telemetry::TelemetrySink;

pub const DEFAULT_TEMPERATURE: f64 = 0.1;
pub const DEFAULT_TURN_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowOptions {
    pub model: String,
    pub temperature: f64,
    pub max_rounds: u32,
    pub termination_marker: String,
    pub turn_timeout: Duration,
    pub verbose: bool,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_rounds: DEFAULT_MAX_ROUNDS,
            termination_marker: DEFAULT_TERMINATION_MARKER.to_string(),
            turn_timeout: Duration::from_secs(DEFAULT_TURN_TIMEOUT_SECS),
            verbose: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowResult {
    pub original_task: String,
    /// First code artifact produced by the writer.
    pub initial_code: String,
    /// Every reviewer critique, oldest first.
    pub review_feedback: String,
    pub final_code: String,
    pub messages: Vec<Message>,
    pub rounds: u32,
    pub elapsed: Duration,
    pub termination_reason: TerminationReason,
    pub state_trace: Vec<TurnState>,
}

impl WorkflowResult {
    /// Fenced code blocks from the final artifact, or the whole text when it has none.
    pub fn code_blocks(&self) -> Vec<String> {
        let blocks = extract_code_blocks(&self.final_code);
        if blocks.is_empty() {
            vec![self.final_code.clone()]
        } else {
            blocks
        }
    }
}

/// Latest non-empty optimizer message, falling back to the latest non-empty
/// writer message when the run never reached an optimizer turn.
pub fn select_final_code(messages: &[Message]) -> Option<&str> {
    [Role::Optimizer, Role::Writer].into_iter().find_map(|role| {
        messages
            .iter()
            .rev()
            .find(|message| message.role == role && !message.content.trim().is_empty())
            .map(|message| message.content.as_str())
    })
}

/// Fenced code blocks in order. A fence still open at the end of the text
/// yields a block too.
pub fn extract_code_blocks(content: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in content.lines() {
        let is_fence = line.trim_start().starts_with("```");
        match current.take() {
            None if is_fence => current = Some(Vec::new()),
            None => {}
            Some(lines) if is_fence => blocks.push(lines.join("\n")),
            Some(mut lines) => {
                lines.push(line);
                current = Some(lines);
            }
        }
    }

    if let Some(lines) = current {
        tracing::warn!(lines = lines.len(), "code block is missing its closing fence");
        if !lines.is_empty() {
            blocks.push(lines.join("\n"));
        }
    }

    blocks
}

enum TurnOutcome {
    Completed(String),
    Failed(CompletionError),
    TimedOut,
    Cancelled,
}

/// Writer → reviewer → optimizer workflow bound to one completion client.
pub struct CodeWorkflow {
    service: Arc<dyn CompletionService>,
    options: WorkflowOptions,
    roster: AgentRoster,
    telemetry: Option<TelemetrySink>,
    closed: bool,
}

impl CodeWorkflow {
    pub fn new(service: Arc<dyn CompletionService>, options: WorkflowOptions) -> Self {
        let roster = AgentRoster::new(&options.termination_marker);
        Self {
            service,
            options,
            roster,
            telemetry: None,
            closed: false,
        }
    }

    pub fn with_telemetry(mut self, telemetry: TelemetrySink) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Runs the workflow and releases the completion client on every exit path.
    pub async fn run_once(
        mut self,
        task: &str,
        cancel: &CancellationToken,
    ) -> Result<WorkflowResult, WorkflowError> {
        let outcome = self.run(task, cancel).await;
        self.close().await;
        outcome
    }

    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.service.close().await;
        self.closed = true;
        tracing::debug!(service = self.service.name(), "completion client released");
    }

    pub async fn run(
        &self,
        task: &str,
        cancel: &CancellationToken,
    ) -> Result<WorkflowResult, WorkflowError> {
        if self.closed {
            return Err(WorkflowError::InvalidState(
                "workflow has been closed".to_string(),
            ));
        }
        let task = task.trim();
        if task.is_empty() {
            return Err(WorkflowError::InvalidTask(
                "task must not be empty".to_string(),
            ));
        }

        let started = Instant::now();
        let settings = TurnSettings {
            model: self.options.model.clone(),
            temperature: self.options.temperature,
        };
        let mut log = MessageLog::seeded(task)?;
        let mut scheduler =
            TurnScheduler::new(self.options.max_rounds, self.options.termination_marker.clone());

        tracing::info!(
            service = self.service.name(),
            model = %self.options.model,
            max_rounds = scheduler.max_rounds(),
            "starting code workflow"
        );

        while let Some(role) = scheduler.current_role() {
            let round = scheduler.round();
            let agent = self.roster.agent(role).ok_or_else(|| {
                WorkflowError::InvalidState(format!("no agent registered for {role}"))
            })?;

            if cancel.is_cancelled() {
                return Err(self.abort(
                    TurnOutcome::Cancelled,
                    role,
                    round,
                    log,
                    &scheduler,
                ));
            }

            let turn_started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => TurnOutcome::Cancelled,
                result = tokio::time::timeout(
                    self.options.turn_timeout,
                    agent.respond(task, log.history(), self.service.as_ref(), &settings),
                ) => match result {
                    Ok(Ok(text)) => TurnOutcome::Completed(text),
                    Ok(Err(err)) => TurnOutcome::Failed(err),
                    Err(_) => TurnOutcome::TimedOut,
                },
            };

            let text = match outcome {
                TurnOutcome::Completed(text) => text,
                other => return Err(self.abort(other, role, round, log, &scheduler)),
            };

            let message = log.append(role, text)?.clone();
            let next = scheduler.record_turn(&message)?;

            tracing::info!(
                role = %role,
                round,
                ordinal = message.ordinal,
                chars = message.content.len(),
                next = ?next,
                "turn completed"
            );
            self.emit(
                "turn.completed",
                json!({
                    "role": role.label(),
                    "round": round,
                    "ordinal": message.ordinal,
                    "chars": message.content.len(),
                    "elapsed_ms": turn_started.elapsed().as_millis() as u64,
                }),
            );
            if self.options.verbose {
                tracing::info!(
                    role = %role,
                    ordinal = message.ordinal,
                    content = %message.content,
                    "turn message"
                );
            }
        }

        log.close();
        let reason = scheduler.reason().ok_or_else(|| {
            WorkflowError::InvalidState("scheduler stopped without a termination reason".to_string())
        })?;
        let elapsed = started.elapsed();
        let messages = log.into_messages();

        let final_code = select_final_code(&messages)
            .map(str::to_string)
            .ok_or_else(|| {
                WorkflowError::InvalidState("run finished without a code artifact".to_string())
            })?;
        let initial_code = messages
            .iter()
            .find(|message| message.role == Role::Writer)
            .map(|message| message.content.clone())
            .unwrap_or_default();
        let review_feedback = messages
            .iter()
            .filter(|message| message.role == Role::Reviewer)
            .map(|message| message.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        tracing::info!(
            rounds = scheduler.rounds_completed(),
            messages = messages.len(),
            reason = reason.label(),
            elapsed_ms = elapsed.as_millis() as u64,
            "code workflow terminated"
        );
        self.emit(
            "workflow.terminated",
            json!({
                "reason": reason.label(),
                "rounds": scheduler.rounds_completed(),
                "message_count": messages.len(),
                "elapsed_ms": elapsed.as_millis() as u64,
            }),
        );

        Ok(WorkflowResult {
            original_task: task.to_string(),
            initial_code,
            review_feedback,
            final_code,
            messages,
            rounds: scheduler.rounds_completed(),
            elapsed,
            termination_reason: reason,
            state_trace: scheduler.trace().to_vec(),
        })
    }

    fn abort(
        &self,
        outcome: TurnOutcome,
        role: Role,
        round: u32,
        log: MessageLog,
        scheduler: &TurnScheduler,
    ) -> WorkflowError {
        let partial = PartialRun {
            messages: log.into_messages(),
            rounds_completed: scheduler.rounds_completed(),
        };
        let err = match outcome {
            TurnOutcome::Failed(source) => WorkflowError::CompletionService {
                role,
                round,
                source,
                partial,
            },
            TurnOutcome::TimedOut => WorkflowError::Timeout {
                role,
                round,
                limit: self.options.turn_timeout,
                partial,
            },
            TurnOutcome::Cancelled => WorkflowError::Cancelled {
                role,
                round,
                partial,
            },
            TurnOutcome::Completed(_) => WorkflowError::InvalidState(format!(
                "{role} turn completed but was treated as an abort"
            )),
        };

        tracing::warn!(role = %role, round, error = %err, "turn aborted");
        self.emit(
            "turn.failed",
            json!({
                "role": role.label(),
                "round": round,
                "error": err.to_string(),
            }),
        );
        err
    }

    fn emit(&self, event: &str, payload: serde_json::Value) {
        if let Some(telemetry) = self.telemetry.as_ref() {
            telemetry.emit(event, payload);
        }
    }
}
