use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use crate::cli::*;
use crate::completion::*;
use crate::config::*;
use crate::error::*;
use crate::message_log::*;
use crate::runner::*;
use crate::scheduler::*;
use crate::telemetry::*;
use crate::workflow::*;

const WRITER_TEXT: &str = "```python\ndef add(a, b):\n    return a + b\n```";
const REVIEWER_TEXT: &str = "Overall Assessment: fine. Add type hints.";
const OPTIMIZER_TEXT: &str = "```python\ndef add(a: int, b: int) -> int:\n    return a + b\n```";

/// Deterministic in-memory completion service keyed by role.
struct ScriptedCompletion {
    responses: HashMap<Role, Vec<String>>,
    fail_on: Option<Role>,
    hang_on: Option<Role>,
    cancel_on: Option<(Role, CancellationToken)>,
    calls: Mutex<Vec<CompletionRequest>>,
    closed: AtomicBool,
}

impl ScriptedCompletion {
    fn fixed() -> Self {
        let mut responses = HashMap::new();
        responses.insert(Role::Writer, vec![WRITER_TEXT.to_string()]);
        responses.insert(Role::Reviewer, vec![REVIEWER_TEXT.to_string()]);
        responses.insert(Role::Optimizer, vec![OPTIMIZER_TEXT.to_string()]);
        Self {
            responses,
            fail_on: None,
            hang_on: None,
            cancel_on: None,
            calls: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    fn with_optimizer_texts(mut self, texts: &[&str]) -> Self {
        self.responses.insert(
            Role::Optimizer,
            texts.iter().map(|text| text.to_string()).collect(),
        );
        self
    }

    fn with_writer_texts(mut self, texts: &[&str]) -> Self {
        self.responses.insert(
            Role::Writer,
            texts.iter().map(|text| text.to_string()).collect(),
        );
        self
    }

    fn failing_on(mut self, role: Role) -> Self {
        self.fail_on = Some(role);
        self
    }

    fn hanging_on(mut self, role: Role) -> Self {
        self.hang_on = Some(role);
        self
    }

    fn cancelling_on(mut self, role: Role, token: CancellationToken) -> Self {
        self.cancel_on = Some((role, token));
        self
    }

    fn called_roles(&self) -> Vec<Role> {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .map(|request| request.role)
            .collect()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        if self.is_closed() {
            return Err(CompletionError::Closed);
        }
        let call_index = {
            let mut calls = self.calls.lock().expect("calls lock");
            calls.push(request.clone());
            calls.iter().filter(|call| call.role == request.role).count() - 1
        };

        if self.fail_on == Some(request.role) {
            return Err(CompletionError::Status {
                status: 500,
                body: "upstream exploded".to_string(),
            });
        }
        if let Some((role, token)) = self.cancel_on.as_ref() {
            if *role == request.role {
                token.cancel();
                std::future::pending::<()>().await;
            }
        }
        if self.hang_on == Some(request.role) {
            std::future::pending::<()>().await;
        }

        let texts = self
            .responses
            .get(&request.role)
            .ok_or_else(|| CompletionError::InvalidResponse("no script for role".to_string()))?;
        let index = call_index.min(texts.len() - 1);
        Ok(texts[index].clone())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn options(max_rounds: u32) -> WorkflowOptions {
    WorkflowOptions {
        model: "stub-model".to_string(),
        max_rounds,
        ..WorkflowOptions::default()
    }
}

fn workflow(stub: &Arc<ScriptedCompletion>, max_rounds: u32) -> CodeWorkflow {
    CodeWorkflow::new(stub.clone(), options(max_rounds))
}

fn roles_of(messages: &[Message]) -> Vec<Role> {
    messages.iter().map(|message| message.role).collect()
}

fn test_cli(config_path: &str, profile: &str) -> Cli {
    Cli {
        provider: Provider::Auto,
        model: None,
        base_url: None,
        profile: profile.to_string(),
        config_path: config_path.to_string(),
        temperature: None,
        max_rounds: None,
        termination_marker: None,
        turn_timeout_secs: None,
        verbose: false,
        telemetry_enabled: None,
        telemetry_path: None,
        show_sensitive_config: false,
        log_filter: "error".to_string(),
        command: Commands::Doctor,
    }
}

fn base_cfg() -> RuntimeConfig {
    RuntimeConfig {
        profile: "default".to_string(),
        config_path: ".codeloop/config.toml".to_string(),
        provider: Provider::Auto,
        model: None,
        base_url: None,
        temperature: 0.1,
        max_rounds: 10,
        termination_marker: "COMPLETE".to_string(),
        turn_timeout_secs: 120,
        verbose: false,
        telemetry_enabled: false,
        telemetry_path: ".codeloop/test-telemetry.jsonl".to_string(),
        show_sensitive_config: false,
    }
}

#[tokio::test]
async fn single_round_stub_run_produces_three_turns_after_the_task() {
    let stub = Arc::new(ScriptedCompletion::fixed());
    let result = workflow(&stub, 1)
        .run(
            "write a function that adds two numbers",
            &CancellationToken::new(),
        )
        .await
        .expect("workflow should succeed");

    assert_eq!(result.messages.len(), 4);
    assert_eq!(
        roles_of(&result.messages),
        vec![Role::Task, Role::Writer, Role::Reviewer, Role::Optimizer]
    );
    assert_eq!(result.messages[0].content, "write a function that adds two numbers");
    assert_eq!(result.final_code, OPTIMIZER_TEXT);
    assert_eq!(result.initial_code, WRITER_TEXT);
    assert_eq!(result.review_feedback, REVIEWER_TEXT);
    assert_eq!(result.rounds, 1);
    assert_eq!(result.termination_reason, TerminationReason::MaxRounds);
    assert_eq!(
        stub.called_roles(),
        vec![Role::Writer, Role::Reviewer, Role::Optimizer]
    );
}

#[tokio::test]
async fn two_round_run_follows_the_exact_state_sequence() {
    let stub = Arc::new(ScriptedCompletion::fixed());
    let result = workflow(&stub, 2)
        .run("sort a list", &CancellationToken::new())
        .await
        .expect("workflow should succeed");

    assert_eq!(
        result.state_trace,
        vec![
            TurnState::WriterTurn,
            TurnState::ReviewerTurn,
            TurnState::OptimizerTurn,
            TurnState::WriterTurn,
            TurnState::ReviewerTurn,
            TurnState::OptimizerTurn,
            TurnState::Terminated,
        ]
    );
    assert_eq!(result.messages.len(), 7);
    assert_eq!(result.rounds, 2);
}

#[tokio::test]
async fn initial_code_is_the_first_writer_draft() {
    let stub = Arc::new(
        ScriptedCompletion::fixed().with_writer_texts(&["first draft", "second draft"]),
    );
    let result = workflow(&stub, 2)
        .run("sort a list", &CancellationToken::new())
        .await
        .expect("workflow should succeed");

    assert_eq!(result.initial_code, "first draft");
    assert_eq!(result.review_feedback, format!("{REVIEWER_TEXT}\n\n{REVIEWER_TEXT}"));
}

#[tokio::test]
async fn verbose_output_lists_each_message_once() {
    let stub = Arc::new(ScriptedCompletion::fixed());
    let mut opts = options(1);
    opts.verbose = true;
    let result = CodeWorkflow::new(stub.clone(), opts)
        .run("add two numbers", &CancellationToken::new())
        .await
        .expect("workflow should succeed");

    let verbose = render_result(&result, true);
    assert_eq!(verbose.matches("] CodeWriter").count(), 1);
    assert_eq!(verbose.matches("] CodeReviewer").count(), 1);
    assert_eq!(verbose.matches("] CodeOptimizer").count(), 1);
    assert!(verbose.contains("Stopped by: max_rounds"));

    assert_eq!(
        render_result(&result, false),
        format!("{OPTIMIZER_TEXT}\n")
    );
}

#[tokio::test]
async fn runs_never_exceed_max_rounds() {
    for max_rounds in 1..=4 {
        let stub = Arc::new(ScriptedCompletion::fixed());
        let result = workflow(&stub, max_rounds)
            .run("reverse a string", &CancellationToken::new())
            .await
            .expect("workflow should succeed");

        let optimizer_turns = result
            .messages
            .iter()
            .filter(|message| message.role == Role::Optimizer)
            .count();
        assert_eq!(optimizer_turns as u32, max_rounds);
        assert_eq!(result.rounds, max_rounds);
        assert_eq!(result.messages.len() as u32, 1 + 3 * max_rounds);
    }
}

#[tokio::test]
async fn completion_marker_in_first_round_stops_the_run() {
    let stub = Arc::new(
        ScriptedCompletion::fixed()
            .with_optimizer_texts(&["final code\nCOMPLETE", "should never be requested"]),
    );
    let result = workflow(&stub, 5)
        .run("parse a date", &CancellationToken::new())
        .await
        .expect("workflow should succeed");

    assert_eq!(result.rounds, 1);
    assert_eq!(result.termination_reason, TerminationReason::CompletionMarker);
    assert_eq!(result.final_code, "final code\nCOMPLETE");
    assert_eq!(stub.called_roles().len(), 3);
}

#[tokio::test]
async fn marker_in_a_later_round_stops_at_that_round() {
    let stub = Arc::new(
        ScriptedCompletion::fixed().with_optimizer_texts(&["draft one", "draft two COMPLETE"]),
    );
    let result = workflow(&stub, 10)
        .run("parse a date", &CancellationToken::new())
        .await
        .expect("workflow should succeed");

    assert_eq!(result.rounds, 2);
    assert_eq!(result.final_code, "draft two COMPLETE");
}

#[tokio::test]
async fn reviewer_failure_keeps_writer_code_as_fallback() {
    let stub = Arc::new(ScriptedCompletion::fixed().failing_on(Role::Reviewer));
    let err = workflow(&stub, 3)
        .run("add two numbers", &CancellationToken::new())
        .await
        .expect_err("reviewer failure must abort the run");

    match &err {
        WorkflowError::CompletionService {
            role,
            round,
            partial,
            ..
        } => {
            assert_eq!(*role, Role::Reviewer);
            assert_eq!(*round, 1);
            assert_eq!(roles_of(&partial.messages), vec![Role::Task, Role::Writer]);
            assert_eq!(partial.final_code(), Some(WRITER_TEXT));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!stub.called_roles().contains(&Role::Optimizer));
}

#[tokio::test]
async fn empty_task_is_rejected_before_any_turn() {
    let stub = Arc::new(ScriptedCompletion::fixed());
    for task in ["", "   \n\t"] {
        let err = workflow(&stub, 1)
            .run(task, &CancellationToken::new())
            .await
            .expect_err("empty task must fail");
        assert!(matches!(err, WorkflowError::InvalidTask(_)));
    }
    assert!(stub.called_roles().is_empty());
}

#[tokio::test]
async fn turn_timeout_surfaces_error_with_partial_history() {
    let stub = Arc::new(ScriptedCompletion::fixed().hanging_on(Role::Reviewer));
    let mut opts = options(2);
    opts.turn_timeout = Duration::from_millis(50);
    let err = CodeWorkflow::new(stub.clone(), opts)
        .run("add two numbers", &CancellationToken::new())
        .await
        .expect_err("hanging reviewer must time out");

    match &err {
        WorkflowError::Timeout {
            role,
            limit,
            partial,
            ..
        } => {
            assert_eq!(*role, Role::Reviewer);
            assert_eq!(*limit, Duration::from_millis(50));
            assert_eq!(partial.messages.len(), 2);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn cancellation_before_start_appends_nothing() {
    let stub = Arc::new(ScriptedCompletion::fixed());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = workflow(&stub, 2)
        .run("add two numbers", &cancel)
        .await
        .expect_err("cancelled run must fail");

    match &err {
        WorkflowError::Cancelled { role, partial, .. } => {
            assert_eq!(*role, Role::Writer);
            assert_eq!(roles_of(&partial.messages), vec![Role::Task]);
            assert_eq!(partial.final_code(), None);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(stub.called_roles().is_empty());
}

#[tokio::test]
async fn cancellation_mid_turn_never_appends_partial_message() {
    let cancel = CancellationToken::new();
    let stub = Arc::new(ScriptedCompletion::fixed().cancelling_on(Role::Optimizer, cancel.clone()));

    let err = workflow(&stub, 2)
        .run("add two numbers", &cancel)
        .await
        .expect_err("cancelled run must fail");

    let partial = err.partial().expect("cancelled run keeps history");
    assert!(matches!(err, WorkflowError::Cancelled { role: Role::Optimizer, .. }));
    assert_eq!(
        roles_of(&partial.messages),
        vec![Role::Task, Role::Writer, Role::Reviewer]
    );
    assert!(
        partial
            .messages
            .iter()
            .all(|message| !message.content.trim().is_empty())
    );
}

#[tokio::test]
async fn run_once_releases_client_on_success_and_failure() {
    let stub = Arc::new(ScriptedCompletion::fixed());
    workflow(&stub, 1)
        .run_once("add two numbers", &CancellationToken::new())
        .await
        .expect("workflow should succeed");
    assert!(stub.is_closed());

    let stub = Arc::new(ScriptedCompletion::fixed());
    let err = workflow(&stub, 1)
        .run_once("   ", &CancellationToken::new())
        .await
        .expect_err("empty task must fail");
    assert!(matches!(err, WorkflowError::InvalidTask(_)));
    assert!(stub.is_closed());

    let stub = Arc::new(ScriptedCompletion::fixed().failing_on(Role::Writer));
    workflow(&stub, 1)
        .run_once("add two numbers", &CancellationToken::new())
        .await
        .expect_err("writer failure must fail");
    assert!(stub.is_closed());
}

#[tokio::test]
async fn closed_workflow_rejects_new_runs() {
    let stub = Arc::new(ScriptedCompletion::fixed());
    let mut flow = workflow(&stub, 1);
    flow.run("first", &CancellationToken::new())
        .await
        .expect("first run should succeed");
    flow.close().await;

    assert!(flow.is_closed());
    let err = flow
        .run("second", &CancellationToken::new())
        .await
        .expect_err("closed workflow must reject runs");
    assert!(matches!(err, WorkflowError::InvalidState(_)));
}

#[tokio::test]
async fn independent_workflows_run_concurrently() {
    let first_stub = Arc::new(ScriptedCompletion::fixed());
    let second_stub = Arc::new(
        ScriptedCompletion::fixed().with_optimizer_texts(&["second done COMPLETE"]),
    );
    let first = workflow(&first_stub, 2);
    let second = workflow(&second_stub, 3);
    let cancel = CancellationToken::new();

    let (first_result, second_result) = tokio::join!(
        first.run("task one", &cancel),
        second.run("task two", &cancel)
    );
    let first_result = first_result.expect("first run should succeed");
    let second_result = second_result.expect("second run should succeed");

    assert_eq!(first_result.rounds, 2);
    assert_eq!(first_result.original_task, "task one");
    assert_eq!(second_result.rounds, 1);
    assert_eq!(second_result.final_code, "second done COMPLETE");
}

#[tokio::test]
async fn workflow_emits_turn_telemetry() {
    let dir = tempdir().expect("temp directory should create");
    let path = dir.path().join("telemetry/events.jsonl");
    let sink = TelemetrySink::with_path(true, path.clone(), "run".to_string());
    let stub = Arc::new(ScriptedCompletion::fixed());

    workflow(&stub, 1)
        .with_telemetry(sink)
        .run("add two numbers", &CancellationToken::new())
        .await
        .expect("workflow should succeed");

    let lines = std::fs::read_to_string(&path)
        .expect("telemetry file should exist")
        .lines()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let summary = summarize_telemetry_lines(lines, 100);
    assert_eq!(summary.turn_completed, 3);
    assert_eq!(summary.workflows_terminated, 1);
    assert_eq!(summary.turns_by_role.get("reviewer"), Some(&1));
    assert_eq!(summary.unique_runs.len(), 1);
}

#[test]
fn telemetry_summary_counts_outcomes_and_skips_bad_lines() {
    let lines = vec![
        r#"{"event":"command.started","run_id":"r1","command":"run","ts_unix_ms":10}"#.to_string(),
        r#"{"event":"turn.completed","run_id":"r1","command":"run","role":"writer","ts_unix_ms":11}"#
            .to_string(),
        r#"{"event":"turn.failed","run_id":"r1","command":"run","role":"reviewer","ts_unix_ms":12}"#
            .to_string(),
        "not json".to_string(),
        r#"{"event":"command.failed","run_id":"r1","command":"run","ts_unix_ms":13}"#.to_string(),
    ];
    let summary = summarize_telemetry_lines(lines, 100);

    assert_eq!(summary.parsed_events, 4);
    assert_eq!(summary.parse_errors, 1);
    assert_eq!(summary.turn_completed, 1);
    assert_eq!(summary.turn_failed, 1);
    assert_eq!(summary.command_failed, 1);
    assert_eq!(summary.command_counts.get("run"), Some(&4));
    assert_eq!(summary.last_event_ts_unix_ms, Some(13));
}

#[test]
fn final_code_falls_back_to_latest_non_empty_writer_message() {
    let mut log = MessageLog::seeded("task").expect("seed");
    log.append(Role::Writer, "first draft").expect("append");
    log.append(Role::Writer, "second draft").expect("append");
    log.append(Role::Optimizer, "   ").expect("append");

    assert_eq!(select_final_code(log.history()), Some("second draft"));

    log.append(Role::Optimizer, "optimized").expect("append");
    assert_eq!(select_final_code(log.history()), Some("optimized"));
}

#[test]
fn code_blocks_are_extracted_from_fenced_markdown() {
    let content = "Here you go:\n```rust\nfn a() {}\n```\nand\n```\nfn b() {}\nfn c() {}\n```\ntrailing";
    assert_eq!(
        extract_code_blocks(content),
        vec!["fn a() {}".to_string(), "fn b() {}\nfn c() {}".to_string()]
    );
    assert!(extract_code_blocks("no fences here").is_empty());
    assert_eq!(
        extract_code_blocks("```python\nprint(1)\n```\n```rust\nfn cut_off() {"),
        vec!["print(1)".to_string(), "fn cut_off() {".to_string()]
    );
    assert!(extract_code_blocks("trailing fence\n```").is_empty());
}

#[test]
fn transcript_lists_each_message_with_role_and_ordinal() {
    let mut log = MessageLog::seeded("task text").expect("seed");
    log.append(Role::Writer, "code").expect("append");
    let transcript = render_transcript(log.history());

    assert!(transcript.contains("[0] Task"));
    assert!(transcript.contains("[1] CodeWriter"));
    assert!(transcript.contains("code"));
}

#[tokio::test]
async fn write_output_stores_extracted_code() {
    let stub = Arc::new(ScriptedCompletion::fixed());
    let result = workflow(&stub, 1)
        .run("add two numbers", &CancellationToken::new())
        .await
        .expect("workflow should succeed");
    let dir = tempdir().expect("temp directory should create");
    let path = dir.path().join("out/add.py");

    write_output(path.to_str().expect("utf-8 path"), &result).expect("output should write");
    let written = std::fs::read_to_string(&path).expect("output file should exist");
    assert_eq!(
        written,
        "def add(a: int, b: int) -> int:\n    return a + b\n"
    );
}

#[test]
fn read_task_joins_arguments_and_rejects_empty_input() {
    let task = read_task(&["add".to_string(), "numbers".to_string()], None).expect("task");
    assert_eq!(task, "add numbers");

    let err = read_task(&[], None).expect_err("empty task must fail");
    assert_eq!(categorize_error(&err), ErrorCategory::Input);

    let dir = tempdir().expect("temp directory should create");
    let path = dir.path().join("task.md");
    std::fs::write(&path, "build a cache\n").expect("write task file");
    let task = read_task(&[], Some(path.to_str().expect("utf-8 path"))).expect("task file");
    assert_eq!(task, "build a cache\n");
}

#[test]
fn runtime_config_uses_selected_profile_values() {
    let dir = tempdir().expect("temp directory should create");
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[profiles.fast]
provider = "ollama"
model = "llama3.1"
max_rounds = 3
temperature = 0.4
termination_marker = "SHIP_IT"
turn_timeout_secs = 30
verbose = true
"#,
    )
    .expect("config should write");
    let config_path = path.to_string_lossy().to_string();

    let profiles = load_profiles(&config_path).expect("profiles should load");
    let cfg = resolve_runtime_config(&test_cli(&config_path, "fast"), &profiles)
        .expect("config should resolve");

    assert_eq!(cfg.provider, Provider::Ollama);
    assert_eq!(cfg.model.as_deref(), Some("llama3.1"));
    assert_eq!(cfg.max_rounds, 3);
    assert_eq!(cfg.temperature, 0.4);
    assert_eq!(cfg.termination_marker, "SHIP_IT");
    assert_eq!(cfg.turn_timeout_secs, 30);
    assert!(cfg.verbose);

    let opts = workflow_options(&cfg, "llama3.1");
    assert_eq!(opts.turn_timeout, Duration::from_secs(30));
    assert_eq!(opts.termination_marker, "SHIP_IT");
}

#[test]
fn runtime_config_cli_flags_override_profile_values() {
    let dir = tempdir().expect("temp directory should create");
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[profiles.default]\nmax_rounds = 7\ntelemetry_enabled = true\n",
    )
    .expect("config should write");
    let config_path = path.to_string_lossy().to_string();
    let profiles = load_profiles(&config_path).expect("profiles should load");

    let mut cli = test_cli(&config_path, "default");
    cli.max_rounds = Some(2);
    cli.telemetry_enabled = Some(false);
    cli.provider = Provider::Openai;
    let cfg = resolve_runtime_config(&cli, &profiles).expect("config should resolve");

    assert_eq!(cfg.max_rounds, 2);
    assert!(!cfg.telemetry_enabled);
    assert_eq!(cfg.provider, Provider::Openai);
    assert_eq!(cfg.termination_marker, DEFAULT_TERMINATION_MARKER);
}

#[test]
fn runtime_config_defaults_without_config_file() {
    let dir = tempdir().expect("temp directory should create");
    let config_path = dir.path().join("missing.toml").to_string_lossy().to_string();
    let profiles = load_profiles(&config_path).expect("missing file is an empty config");
    let cfg = resolve_runtime_config(&test_cli(&config_path, "default"), &profiles)
        .expect("config should resolve");

    assert_eq!(cfg.max_rounds, DEFAULT_MAX_ROUNDS);
    assert_eq!(cfg.termination_marker, "COMPLETE");
    assert_eq!(cfg.temperature, DEFAULT_TEMPERATURE);
    assert!(!cfg.verbose);
}

#[test]
fn runtime_config_rejects_out_of_range_values() {
    let dir = tempdir().expect("temp directory should create");
    let config_path = dir.path().join("missing.toml").to_string_lossy().to_string();
    let profiles = ProfilesFile::default();

    let mut cli = test_cli(&config_path, "default");
    cli.temperature = Some(1.5);
    let err = resolve_runtime_config(&cli, &profiles).expect_err("temperature out of range");
    assert!(err.to_string().contains("temperature"));
    assert_eq!(categorize_error(&err), ErrorCategory::Input);

    let mut cli = test_cli(&config_path, "default");
    cli.max_rounds = Some(0);
    let err = resolve_runtime_config(&cli, &profiles).expect_err("zero rounds");
    assert!(err.to_string().contains("max_rounds"));

    let mut cli = test_cli(&config_path, "default");
    cli.termination_marker = Some("  ".to_string());
    let err = resolve_runtime_config(&cli, &profiles).expect_err("empty marker");
    assert!(err.to_string().contains("termination marker"));
}

#[test]
fn runtime_config_reports_unknown_profile_and_fields() {
    let dir = tempdir().expect("temp directory should create");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[profiles.work]\nmax_rounds = 2\n").expect("config should write");
    let config_path = path.to_string_lossy().to_string();
    let profiles = load_profiles(&config_path).expect("profiles should load");

    let err = resolve_runtime_config(&test_cli(&config_path, "missing"), &profiles)
        .expect_err("unknown profile must fail");
    assert!(err.to_string().contains("Available profiles: work"));

    std::fs::write(&path, "[profiles.work]\nmax_round = 2\n").expect("config should write");
    assert!(load_profiles(&config_path).is_err());
}

#[test]
fn error_taxonomy_maps_workflow_errors() {
    let invalid: anyhow::Error = WorkflowError::InvalidTask("empty".to_string()).into();
    assert_eq!(categorize_error(&invalid), ErrorCategory::Input);

    let service: anyhow::Error = WorkflowError::CompletionService {
        role: Role::Writer,
        round: 1,
        source: CompletionError::EmptyResponse,
        partial: PartialRun::default(),
    }
    .into();
    assert_eq!(categorize_error(&service), ErrorCategory::Provider);

    let timeout: anyhow::Error = WorkflowError::Timeout {
        role: Role::Optimizer,
        round: 2,
        limit: Duration::from_secs(1),
        partial: PartialRun::default(),
    }
    .into();
    assert_eq!(categorize_error(&timeout), ErrorCategory::Workflow);

    let provider = anyhow::anyhow!("OPENAI_API_KEY is required for OpenAI provider");
    assert_eq!(categorize_error(&provider), ErrorCategory::Provider);
    assert!(format_cli_error(&provider, false).starts_with("[PROVIDER]"));
}

#[test]
fn api_keys_are_redacted_unless_sensitive_output_requested() {
    let err = anyhow::anyhow!("HTTP 401: Incorrect API key provided: sk-proj-abc123XYZ.");
    let redacted = render_error_message(&err, false);
    assert!(redacted.contains("sk-[REDACTED]."));
    assert!(!redacted.contains("abc123XYZ"));
    assert!(render_error_message(&err, true).contains("sk-proj-abc123XYZ"));

    assert_eq!(redact_api_keys("task-list and disk-usage"), "task-list and disk-usage");
}

#[test]
fn base_url_credentials_are_hidden() {
    let mut cfg = base_cfg();
    assert_eq!(display_base_url(&cfg), "<provider-default>");

    cfg.base_url = Some("https://user:pw@gateway.local/openai".to_string());
    assert_eq!(
        display_base_url(&cfg),
        "https://[REDACTED]@gateway.local/openai"
    );

    cfg.show_sensitive_config = true;
    assert_eq!(
        display_base_url(&cfg),
        "https://user:pw@gateway.local/openai"
    );
}

#[test]
fn model_validation_matches_provider_families() {
    use crate::provider::validate_model_for_provider;

    assert!(validate_model_for_provider(Provider::Openai, "gpt-4o-mini").is_ok());
    assert!(validate_model_for_provider(Provider::Openai, "llama3.1").is_err());
    assert!(validate_model_for_provider(Provider::Ollama, "llama3.1").is_ok());
    assert!(validate_model_for_provider(Provider::Ollama, " ").is_err());
}

#[test]
fn command_labels_are_stable() {
    assert_eq!(command_label(&Commands::Doctor), "doctor");
    assert_eq!(
        command_label(&Commands::Roles {
            command: RoleCommands::Show {
                name: "reviewer".to_string()
            }
        }),
        "roles.show"
    );
    assert_eq!(
        command_label(&Commands::Run {
            prompt: vec!["x".to_string()],
            task_file: None,
            output: None,
        }),
        "run"
    );
}
