//! `memoria-mcp`: the stdio JSON-RPC surface (§6 "Agent-tool surface").
//! Standard-out carries nothing but protocol frames, so logging is routed
//! to stderr only, the way the teacher's MCP server does it.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memoria::app::AppContext;
use memoria::config::Config;
use memoria::error::Result;
use memoria::mcp::{McpServer, MemoriaHandler};

#[derive(Parser, Debug)]
#[command(name = "memoria-mcp")]
#[command(about = "MCP stdio server for the Memoria memory service")]
struct Args {
    #[command(flatten)]
    config: Config,

    /// Optional TOML config file merged underneath CLI/env values.
    #[arg(long, env = "MEMORIA_CONFIG_FILE")]
    config_file: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = args.config;
    if let Some(path) = args.config_file.as_deref() {
        config = config.merge_toml_file(std::path::Path::new(path))?;
    }

    let ctx = AppContext::build(config)?;
    let handler = MemoriaHandler::new(ctx);
    let server = McpServer::new(handler);
    server.run()
}
