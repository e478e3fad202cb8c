//! Role agents for the writer → reviewer → optimizer rotation.

use anyhow::Result;

use crate::completion::{CompletionError, CompletionRequest, CompletionService};
use crate::message_log::{Message, Role};

const WRITER_INSTRUCTION: &str = "You are a software developer who writes clean, efficient, \
production-ready code.\n\
\n\
Responsibilities:\n\
- Read the requirements carefully and implement exactly what is asked.\n\
- Structure the code so it is correct, readable and easy to maintain.\n\
- Handle errors and edge cases explicitly.\n\
- Use meaningful names, type annotations where the language has them, and concise doc comments.\n\
\n\
Return the complete implementation in a fenced code block, followed by a short explanation of \
the approach.";

const REVIEWER_INSTRUCTION: &str = "You are an expert code reviewer focused on software quality.\n\
\n\
Review the latest code for correctness, performance, security, error handling, edge cases, \
style, maintainability and documentation. Do not rewrite the code yourself.\n\
\n\
Structure the review with these sections:\n\
- Overall Assessment\n\
- Strengths\n\
- Areas for Improvement\n\
- Specific Recommendations\n\
- Security Considerations (if any)";

const OPTIMIZER_INSTRUCTION: &str = "You are a code optimization specialist.\n\
\n\
Take the writer's code and the reviewer's feedback and produce an improved version:\n\
- Apply every valid recommendation from the review.\n\
- Improve performance without sacrificing readability.\n\
- Strengthen error handling and edge case coverage.\n\
- Keep the public behavior the task asks for.\n\
\n\
Return the complete optimized code in a fenced code block, then a short summary of the changes. \
When the code is production-ready and needs no further review, end your message with \
{marker}.";

#[derive(Debug, Clone, PartialEq)]
pub struct TurnSettings {
    pub model: String,
    pub temperature: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDefinition {
    pub name: &'static str,
    pub role: Role,
    pub description: &'static str,
    pub instruction: String,
}

fn latest_content(history: &[Message], role: Role) -> Option<&str> {
    history
        .iter()
        .rev()
        .find(|message| message.role == role && !message.content.trim().is_empty())
        .map(|message| message.content.as_str())
}

fn task_section(task: &str) -> String {
    format!("Task:\n{}", task.trim())
}

#[derive(Debug, Clone)]
pub struct WriterAgent {
    definition: AgentDefinition,
}

impl WriterAgent {
    pub fn new() -> Self {
        Self {
            definition: AgentDefinition {
                name: Role::Writer.display_name(),
                role: Role::Writer,
                description: "Generates the code artifact for the task.",
                instruction: WRITER_INSTRUCTION.to_string(),
            },
        }
    }

    /// First round sees only the task; later rounds build on the latest
    /// optimized revision.
    fn prompt(&self, task: &str, history: &[Message]) -> String {
        match latest_content(history, Role::Optimizer) {
            Some(revision) => format!(
                "{}\n\nLatest optimized revision to build on:\n{}\n\nWrite the next version of the code.",
                task_section(task),
                revision
            ),
            None => format!("{}\n\nWrite the initial implementation.", task_section(task)),
        }
    }
}

impl Default for WriterAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct ReviewerAgent {
    definition: AgentDefinition,
}

impl ReviewerAgent {
    pub fn new() -> Self {
        Self {
            definition: AgentDefinition {
                name: Role::Reviewer.display_name(),
                role: Role::Reviewer,
                description: "Critiques the writer's latest code.",
                instruction: REVIEWER_INSTRUCTION.to_string(),
            },
        }
    }

    fn prompt(&self, task: &str, history: &[Message]) -> String {
        let code = latest_content(history, Role::Writer).unwrap_or("<no code written yet>");
        format!(
            "{}\n\nCode from {}:\n{}\n\nReview this code.",
            task_section(task),
            Role::Writer.display_name(),
            code
        )
    }
}

impl Default for ReviewerAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct OptimizerAgent {
    definition: AgentDefinition,
}

impl OptimizerAgent {
    pub fn new(termination_marker: &str) -> Self {
        Self {
            definition: AgentDefinition {
                name: Role::Optimizer.display_name(),
                role: Role::Optimizer,
                description: "Revises the code using the reviewer's critique.",
                instruction: OPTIMIZER_INSTRUCTION.replace("{marker}", termination_marker),
            },
        }
    }

    fn prompt(&self, task: &str, history: &[Message]) -> String {
        let code = latest_content(history, Role::Writer).unwrap_or("<no code written yet>");
        let review = latest_content(history, Role::Reviewer).unwrap_or("<no review available>");
        format!(
            "{}\n\nCode from {}:\n{}\n\nReview from {}:\n{}\n\nProduce the optimized code.",
            task_section(task),
            Role::Writer.display_name(),
            code,
            Role::Reviewer.display_name(),
            review
        )
    }
}

#[derive(Debug, Clone)]
pub enum RoleAgent {
    Writer(WriterAgent),
    Reviewer(ReviewerAgent),
    Optimizer(OptimizerAgent),
}

impl RoleAgent {
    pub fn role(&self) -> Role {
        self.definition().role
    }

    pub fn definition(&self) -> &AgentDefinition {
        match self {
            RoleAgent::Writer(agent) => &agent.definition,
            RoleAgent::Reviewer(agent) => &agent.definition,
            RoleAgent::Optimizer(agent) => &agent.definition,
        }
    }

    pub fn build_request(
        &self,
        task: &str,
        history: &[Message],
        settings: &TurnSettings,
    ) -> CompletionRequest {
        let prompt = match self {
            RoleAgent::Writer(agent) => agent.prompt(task, history),
            RoleAgent::Reviewer(agent) => agent.prompt(task, history),
            RoleAgent::Optimizer(agent) => agent.prompt(task, history),
        };
        CompletionRequest {
            role: self.role(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            system: self.definition().instruction.clone(),
            prompt,
        }
    }

    pub async fn respond(
        &self,
        task: &str,
        history: &[Message],
        service: &dyn CompletionService,
        settings: &TurnSettings,
    ) -> Result<String, CompletionError> {
        let request = self.build_request(task, history, settings);
        let text = service.complete(&request).await?;
        if text.trim().is_empty() {
            return Err(CompletionError::EmptyResponse);
        }
        Ok(text)
    }
}

/// Fixed set of participants, one per rotation slot.
#[derive(Debug, Clone)]
pub struct AgentRoster {
    agents: [RoleAgent; 3],
}

impl AgentRoster {
    pub fn new(termination_marker: &str) -> Self {
        Self {
            agents: [
                RoleAgent::Writer(WriterAgent::new()),
                RoleAgent::Reviewer(ReviewerAgent::new()),
                RoleAgent::Optimizer(OptimizerAgent::new(termination_marker)),
            ],
        }
    }

    pub fn agent(&self, role: Role) -> Option<&RoleAgent> {
        self.agents.iter().find(|agent| agent.role() == role)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoleAgent> {
        self.agents.iter()
    }
}

pub fn run_roles_list(roster: &AgentRoster) -> Result<()> {
    println!("Workflow roles (rotation order):");
    for (index, agent) in roster.iter().enumerate() {
        let definition = agent.definition();
        println!(
            "{}. {} ({}) - {}",
            index + 1,
            definition.role,
            definition.name,
            definition.description
        );
    }
    Ok(())
}

pub fn run_roles_show(roster: &AgentRoster, name: &str) -> Result<()> {
    let requested = name.trim().to_ascii_lowercase();
    let agent = roster
        .iter()
        .find(|agent| {
            agent.role().label() == requested
                || agent.definition().name.to_ascii_lowercase() == requested
        })
        .ok_or_else(|| {
            anyhow::anyhow!(
                "role '{}' not found. Available roles: writer, reviewer, optimizer",
                name.trim()
            )
        })?;

    let definition = agent.definition();
    println!("Role: {} ({})", definition.role, definition.name);
    println!("Description: {}", definition.description);
    println!("Instruction:\n{}", definition.instruction);
    Ok(())
}
