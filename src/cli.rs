use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Auto,
    Openai,
    Ollama,
}

#[derive(Debug, Subcommand)]
pub enum ProfileCommands {
    #[command(about = "List configured profiles and highlight the active profile")]
    List,
    #[command(about = "Show the active profile's resolved runtime settings")]
    Show,
}

#[derive(Debug, Subcommand)]
pub enum RoleCommands {
    #[command(about = "List workflow roles in rotation order")]
    List,
    #[command(about = "Show a role's instruction template")]
    Show {
        #[arg(long)]
        name: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum TelemetryCommands {
    #[command(about = "Summarize telemetry events from a JSONL stream")]
    Report {
        #[arg(long)]
        path: Option<String>,
        #[arg(long, default_value_t = 5000)]
        limit: usize,
    },
}

const CLI_EXAMPLES: &str = "Examples:\n\
  codeloop run \"Create a function that checks if a string is a palindrome\"\n\
  codeloop --provider openai --model gpt-4o-mini --max-rounds 3 run --task-file task.md\n\
  codeloop --verbose run \"Implement a binary search tree\" --output bst.py\n\
  codeloop --provider ollama --model llama3.1 run \"Parse a CSV line\"\n\
  codeloop roles list\n\
  codeloop roles show --name reviewer\n\
  codeloop profiles show\n\
  codeloop telemetry report --limit 2000\n\
\n\
Termination:\n\
  - A run stops after --max-rounds writer/reviewer/optimizer rotations,\n\
    or earlier when the optimizer's message contains --termination-marker.";

#[derive(Debug, Parser)]
#[command(name = "codeloop")]
#[command(about = "Writer/reviewer/optimizer round-robin code generation")]
#[command(after_long_help = CLI_EXAMPLES)]
pub struct Cli {
    #[arg(long, env = "CODELOOP_PROVIDER", value_enum, default_value_t = Provider::Auto)]
    pub provider: Provider,

    #[arg(long, env = "CODELOOP_MODEL")]
    pub model: Option<String>,

    #[arg(long, env = "CODELOOP_BASE_URL")]
    pub base_url: Option<String>,

    #[arg(long, env = "CODELOOP_PROFILE", default_value = "default")]
    pub profile: String,

    #[arg(long, env = "CODELOOP_CONFIG", default_value = ".codeloop/config.toml")]
    pub config_path: String,

    #[arg(long, env = "CODELOOP_TEMPERATURE")]
    pub temperature: Option<f64>,

    #[arg(long, env = "CODELOOP_MAX_ROUNDS")]
    pub max_rounds: Option<u32>,

    #[arg(long, env = "CODELOOP_TERMINATION_MARKER")]
    pub termination_marker: Option<String>,

    #[arg(long, env = "CODELOOP_TURN_TIMEOUT_SECS")]
    pub turn_timeout_secs: Option<u64>,

    #[arg(long, env = "CODELOOP_VERBOSE", default_value_t = false)]
    pub verbose: bool,

    #[arg(long, env = "CODELOOP_TELEMETRY_ENABLED", action = clap::ArgAction::Set)]
    pub telemetry_enabled: Option<bool>,

    #[arg(long, env = "CODELOOP_TELEMETRY_PATH")]
    pub telemetry_path: Option<String>,

    #[arg(long, env = "CODELOOP_SHOW_SENSITIVE_CONFIG", default_value_t = false)]
    pub show_sensitive_config: bool,

    #[arg(long, env = "RUST_LOG", default_value = "error")]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Run the writer/reviewer/optimizer workflow for a task")]
    Run {
        prompt: Vec<String>,
        #[arg(long)]
        task_file: Option<String>,
        #[arg(long)]
        output: Option<String>,
    },
    #[command(about = "Inspect the workflow's agent roster")]
    Roles {
        #[command(subcommand)]
        command: RoleCommands,
    },
    #[command(about = "Inspect profile configuration and active resolved profile state")]
    Profiles {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    #[command(about = "Validate provider environment and resolved configuration")]
    Doctor,
    #[command(about = "Telemetry utilities and reporting")]
    Telemetry {
        #[command(subcommand)]
        command: TelemetryCommands,
    },
}

pub fn command_label(command: &Commands) -> String {
    match command {
        Commands::Run { .. } => "run".to_string(),
        Commands::Roles { command } => match command {
            RoleCommands::List => "roles.list".to_string(),
            RoleCommands::Show { .. } => "roles.show".to_string(),
        },
        Commands::Profiles { command } => match command {
            ProfileCommands::List => "profiles.list".to_string(),
            ProfileCommands::Show => "profiles.show".to_string(),
        },
        Commands::Doctor => "doctor".to_string(),
        Commands::Telemetry { command } => match command {
            TelemetryCommands::Report { .. } => "telemetry.report".to_string(),
        },
    }
}
