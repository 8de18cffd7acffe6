//! Agentic CLI — drives one task through the ReAct executor from argv and
//! prints the streamed events to stdout. The gateway (`agentic-gateway`) is
//! the long-running WebSocket front end; this binary is the one-shot
//! equivalent for scripting and local testing.

use agentic_agent::runtime::{AgentConfig, AgentRuntime, SessionKey};
use agentic_agent::AgentEvent;
use agentic_core::AgentFileConfig;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "agentic", about = "Agentic AI Agent — one-shot task runner")]
struct Cli {
    /// The task to run
    task: String,

    /// Path to agentic.toml (defaults to ./agentic.toml, then ~/.agentic/agentic.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Working directory tools operate in
    #[arg(short, long)]
    workspace: Option<PathBuf>,

    /// Session id to persist the transcript under (defaults to a fresh one)
    #[arg(short, long)]
    session: Option<String>,

    /// Print raw JSON events instead of a human-readable stream
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "agentic=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let file_config = match &cli.config {
        Some(path) => AgentFileConfig::load(path),
        None => AgentFileConfig::discover(),
    };

    let workspace_root = cli
        .workspace
        .unwrap_or_else(|| file_config.workspace());

    let api_key = std::env::var("ANTHROPIC_API_KEY")
        .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY is not set"))?;

    let config = AgentConfig {
        default_model: file_config.agent.model.clone(),
        max_tokens: file_config.agent.max_tokens,
        max_tool_iterations: file_config.agent.max_iterations,
        temperature: file_config.agent.temperature,
        system_prompt: None,
        workspace_root,
        context: file_config.context.clone(),
        subagent: file_config.subagent.clone(),
    };

    let tools = agentic_tools::create_default_registry(&config.workspace_root);
    let runtime = AgentRuntime::new(&api_key, tools, config);

    let session_key = match &cli.session {
        Some(id) => SessionKey::new(id),
        None => SessionKey::new(agentic_core::ids::new_session_id()),
    };

    let (tx, mut rx) = agentic_agent::events::event_channel(256);
    let printer = tokio::spawn({
        let as_json = cli.json;
        async move {
            while let Some(event) = rx.recv().await {
                print_event(&event, as_json);
            }
        }
    });

    let result = runtime.run_turn(&session_key, &cli.task, tx).await;
    printer.await.ok();

    match result {
        Ok(()) => Ok(()),
        Err(message) => {
            eprintln!("task failed: {message}");
            std::process::exit(1);
        }
    }
}

fn print_event(event: &AgentEvent, as_json: bool) {
    if as_json {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
        return;
    }

    match event {
        AgentEvent::Status { message, .. } => eprintln!("[status] {message}"),
        AgentEvent::Analysis { text, .. } => eprintln!("[analysis] {text}"),
        AgentEvent::Iteration { n, .. } => eprintln!("--- iteration {n} ---"),
        AgentEvent::ThinkingResult { text, .. } => println!("{text}"),
        AgentEvent::TokenDelta { .. } => {}
        AgentEvent::ToolStart { name, call_id, .. } => eprintln!("  -> {name} ({call_id})"),
        AgentEvent::ToolArgsDelta { .. } => {}
        AgentEvent::ToolResult { name, is_error: false, .. } => eprintln!("  <- {name} ok"),
        AgentEvent::ToolResult { name, is_error: true, .. } => eprintln!("  <- {name} failed"),
        AgentEvent::ToolError { name, error, .. } => eprintln!("  <- {name} error: {error}"),
        AgentEvent::TokenUsage { prompt_tokens, completion_tokens, .. } => {
            eprintln!("  [tokens] prompt={prompt_tokens} completion={completion_tokens}")
        }
        AgentEvent::MessageIntegration { summary, .. } => eprintln!("[queue] {summary}"),
        AgentEvent::SubagentCompression { before_messages, after_messages, .. } => {
            eprintln!("[compress] {before_messages} -> {after_messages} messages")
        }
        AgentEvent::EmergencyCompression { before_tokens, after_tokens, .. } => {
            eprintln!("[compress!] {before_tokens} -> {after_tokens} tokens")
        }
        AgentEvent::SubAgentStart { child_task_id, purpose, .. } => {
            eprintln!("[subagent {child_task_id}] {purpose}")
        }
        AgentEvent::SubAgentComplete { child_task_id, success, .. } => {
            eprintln!("[subagent {child_task_id}] complete (success={success})")
        }
        AgentEvent::SubAgentError { child_task_id, error, .. } => {
            eprintln!("[subagent {child_task_id}] error: {error}")
        }
        AgentEvent::SubAgentPanicRecovery { child_task_id, .. } => {
            eprintln!("[subagent {child_task_id}] recovered from panic")
        }
        AgentEvent::FinalAnswer { text, .. } => println!("{text}"),
        AgentEvent::MaxIterations { iterations, .. } => {
            eprintln!("[stop] max iterations reached ({iterations})")
        }
        AgentEvent::Error { message, .. } => eprintln!("[error] {message}"),
        AgentEvent::Complete { .. } => {}
    }
}
