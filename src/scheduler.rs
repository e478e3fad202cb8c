//! Round-robin turn scheduler.
//!
//! One round is a full writer → reviewer → optimizer rotation. Termination is
//! only evaluated after the optimizer turn: the run stops when the round
//! budget is spent or the optimizer's message carries the completion marker.
//! `Terminated` is absorbing.

use serde::Serialize;

use crate::error::WorkflowError;
use crate::message_log::{Message, Role};

pub const DEFAULT_MAX_ROUNDS: u32 = 10;
pub const DEFAULT_TERMINATION_MARKER: &str = "COMPLETE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    WriterTurn,
    ReviewerTurn,
    OptimizerTurn,
    Terminated,
}

impl TurnState {
    pub fn role(self) -> Option<Role> {
        match self {
            TurnState::WriterTurn => Some(Role::Writer),
            TurnState::ReviewerTurn => Some(Role::Reviewer),
            TurnState::OptimizerTurn => Some(Role::Optimizer),
            TurnState::Terminated => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    MaxRounds,
    CompletionMarker,
}

impl TerminationReason {
    pub fn label(self) -> &'static str {
        match self {
            TerminationReason::MaxRounds => "max_rounds",
            TerminationReason::CompletionMarker => "completion_marker",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminationState {
    /// Agent messages recorded so far; the seeded task is not counted.
    pub message_count: usize,
    /// Ordinal of the most recent agent message containing the marker.
    pub last_marker_ordinal: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct TurnScheduler {
    state: TurnState,
    rounds_completed: u32,
    max_rounds: u32,
    termination_marker: String,
    termination: TerminationState,
    reason: Option<TerminationReason>,
    trace: Vec<TurnState>,
}

impl TurnScheduler {
    pub fn new(max_rounds: u32, termination_marker: impl Into<String>) -> Self {
        Self {
            state: TurnState::WriterTurn,
            rounds_completed: 0,
            max_rounds: max_rounds.max(1),
            termination_marker: termination_marker.into(),
            termination: TerminationState::default(),
            reason: None,
            trace: vec![TurnState::WriterTurn],
        }
    }

    pub fn current(&self) -> TurnState {
        self.state
    }

    pub fn current_role(&self) -> Option<Role> {
        self.state.role()
    }

    pub fn is_terminated(&self) -> bool {
        self.state == TurnState::Terminated
    }

    /// 1-based round of the turn about to run (or of the last turn once terminated).
    pub fn round(&self) -> u32 {
        if self.is_terminated() {
            self.rounds_completed
        } else {
            self.rounds_completed + 1
        }
    }

    pub fn rounds_completed(&self) -> u32 {
        self.rounds_completed
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    pub fn termination(&self) -> &TerminationState {
        &self.termination
    }

    pub fn reason(&self) -> Option<TerminationReason> {
        self.reason
    }

    /// Every state entered so far, starting with the initial writer turn.
    pub fn trace(&self) -> &[TurnState] {
        &self.trace
    }

    /// Records the message produced by the current turn and advances.
    pub fn record_turn(&mut self, message: &Message) -> Result<TurnState, WorkflowError> {
        let expected = self.current_role().ok_or_else(|| {
            WorkflowError::InvalidState("scheduler already terminated".to_string())
        })?;
        if message.role != expected {
            return Err(WorkflowError::InvalidState(format!(
                "expected a {} message, got {}",
                expected, message.role
            )));
        }

        self.termination.message_count += 1;
        let has_marker = message.content.contains(&self.termination_marker);
        if has_marker {
            self.termination.last_marker_ordinal = Some(message.ordinal);
        }

        let next = match self.state {
            TurnState::WriterTurn => TurnState::ReviewerTurn,
            TurnState::ReviewerTurn => TurnState::OptimizerTurn,
            TurnState::OptimizerTurn => {
                self.rounds_completed += 1;
                match self.evaluate_termination(has_marker) {
                    Some(reason) => {
                        self.reason = Some(reason);
                        TurnState::Terminated
                    }
                    None => TurnState::WriterTurn,
                }
            }
            TurnState::Terminated => TurnState::Terminated,
        };

        self.state = next;
        self.trace.push(next);
        Ok(next)
    }

    // Either condition alone stops the run; the marker is reported when both hold.
    fn evaluate_termination(&self, latest_has_marker: bool) -> Option<TerminationReason> {
        if latest_has_marker {
            Some(TerminationReason::CompletionMarker)
        } else if self.rounds_completed >= self.max_rounds {
            Some(TerminationReason::MaxRounds)
        } else {
            None
        }
    }
}
