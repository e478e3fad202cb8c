//! Append-only conversation log shared by every turn of a workflow run.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Task,
    Writer,
    Reviewer,
    Optimizer,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Task => "task",
            Role::Writer => "writer",
            Role::Reviewer => "reviewer",
            Role::Optimizer => "optimizer",
        }
    }

    /// Display name used in transcripts and prompts.
    pub fn display_name(self) -> &'static str {
        match self {
            Role::Task => "Task",
            Role::Writer => "CodeWriter",
            Role::Reviewer => "CodeReviewer",
            Role::Optimizer => "CodeOptimizer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub ordinal: usize,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    next_ordinal: usize,
    closed: bool,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log whose first message (ordinal 0) is the task.
    pub fn seeded(task: &str) -> Result<Self, WorkflowError> {
        let mut log = Self::new();
        log.append(Role::Task, task)?;
        Ok(log)
    }

    pub fn append(
        &mut self,
        role: Role,
        content: impl Into<String>,
    ) -> Result<&Message, WorkflowError> {
        if self.closed {
            return Err(WorkflowError::InvalidState(format!(
                "cannot append {} message to a closed log",
                role
            )));
        }

        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        self.messages.push(Message {
            role,
            ordinal,
            content: content.into(),
            timestamp: Utc::now(),
        });
        let index = self.messages.len() - 1;
        Ok(&self.messages[index])
    }

    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    pub fn count(&self) -> usize {
        self.messages.len()
    }

    pub fn latest(&self, role: Role) -> Option<&Message> {
        self.messages.iter().rev().find(|message| message.role == role)
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}
