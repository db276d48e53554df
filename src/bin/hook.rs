//! `memoria-hook`: stdio-JSON-per-invocation surface for host-agent hooks
//! (§6 "Hook surface"). Both subcommands wrap their call in a 30-second
//! deadline and, on *any* failure, print the zero-value output and exit 0
//! — a hook must never block or fail the host agent's turn.

use std::io::Read;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memoria::app::AppContext;
use memoria::config::{Config, HOOK_DEADLINE_SECS};
use memoria::dto::{project_from_cwd, HookPostRequest, HookPreRequest, PostTurnResponse, RecallResponse};
use memoria::pipeline::PostTurnInput;
use memoria::store::Deadline;

#[derive(Parser)]
#[command(name = "memoria-hook")]
#[command(about = "Host-agent hook surface for the Memoria memory service")]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: HookCommand,
}

#[derive(Subcommand)]
enum HookCommand {
    /// Reads a `HookPreRequest` JSON document from stdin, writes a `{context,
    /// memory_count, tokens_used}` JSON document to stdout.
    Pre,
    /// Reads a `HookPostRequest` JSON document from stdin, writes a
    /// `{stored}` JSON document to stdout.
    Post,
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        HookCommand::Pre => run_pre(cli.config),
        HookCommand::Post => run_post(cli.config),
    }
}

fn run_pre(config: Config) {
    let output = run_pre_fallible(config).unwrap_or_else(|err| {
        tracing::error!(error = %err, "hook pre failed, returning zero-value output");
        RecallResponse {
            context: String::new(),
            memory_count: 0,
            tokens_used: 0,
        }
    });
    print_json(&output);
}

fn run_pre_fallible(config: Config) -> memoria::error::Result<RecallResponse> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    let req: HookPreRequest = serde_json::from_str(&input)?;

    let ctx = AppContext::build(config)?;
    let deadline = Deadline::after(Duration::from_secs(HOOK_DEADLINE_SECS));

    let project = req.project.unwrap_or_else(|| project_from_cwd(&req.cwd));
    let out = ctx.recall(
        memoria::dto::RecallRequest {
            message: req.prompt,
            project,
            budget: req.token_budget,
        },
        deadline,
    )?;

    Ok(RecallResponse::from(out))
}

fn run_post(config: Config) {
    let output = run_post_fallible(config).unwrap_or_else(|err| {
        tracing::error!(error = %err, "hook post failed, returning zero-value output");
        PostTurnResponse { stored: false }
    });
    print_json(&output);
}

fn run_post_fallible(config: Config) -> memoria::error::Result<PostTurnResponse> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    let req: HookPostRequest = serde_json::from_str(&input)?;

    let ctx = AppContext::build(config)?;
    let deadline = Deadline::after(Duration::from_secs(HOOK_DEADLINE_SECS));

    let project = req.project.unwrap_or_default();
    let out = ctx.post_turn(
        PostTurnInput {
            session_id: &req.session_id,
            user_message: &req.user_message,
            assistant_message: &req.assistant_message,
            project: &project,
        },
        deadline,
    )?;

    Ok(PostTurnResponse::from(out))
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string(value) {
        Ok(text) => println!("{text}"),
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize hook output");
            println!("{{}}");
        }
    }
}
