//! `memoria-cli`: operator command-line interface. Talks to the same
//! `AppContext` the HTTP and MCP surfaces use, against whatever `Store`
//! backend the shared [`Config`] resolves to (sqlite by default, so this
//! binary operates on the same database a running `memoria-server` uses).

use clap::{Parser, Subcommand};

use memoria::app::AppContext;
use memoria::config::Config;
use memoria::dto::{MemoryPatch, RecallRequest, RememberRequest, SearchRequest};
use memoria::error::Result;
use memoria::store::Deadline;
use memoria::types::SearchFilters;

#[derive(Parser)]
#[command(name = "memoria")]
#[command(about = "Memoria memory service operator CLI")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a new memory
    Remember {
        /// Content to remember
        content: String,
        /// Memory type (rule, procedure, preference, episode, fact); inferred if omitted
        #[arg(short = 'T', long = "type")]
        memory_type: Option<String>,
        /// Scope (session, permanent)
        #[arg(long)]
        scope: Option<String>,
        /// Tags, comma-separated
        #[arg(short, long)]
        tags: Option<String>,
        /// Project this memory belongs to
        #[arg(short, long, default_value = "")]
        project: String,
        /// Confidence (0-1)
        #[arg(short, long)]
        confidence: Option<f32>,
    },
    /// Recall memories relevant to a message, ranked and budget-packed
    Recall {
        /// Message to recall context for
        message: String,
        /// Project to scope recall to
        #[arg(short, long, default_value = "")]
        project: String,
        /// Token budget
        #[arg(short, long)]
        budget: Option<i64>,
    },
    /// Raw similarity search, unranked
    Search {
        /// Query text
        message: String,
        /// Maximum results
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        /// Project filter
        #[arg(short, long, default_value = "")]
        project: String,
    },
    /// Get a memory by id
    Get {
        /// Memory id
        id: String,
    },
    /// List memories
    List {
        /// Maximum number to return
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
        /// Filter by type
        #[arg(short = 'T', long = "type")]
        memory_type: Option<String>,
        /// Filter by project
        #[arg(short, long)]
        project: Option<String>,
        /// Pagination cursor
        #[arg(short, long, default_value = "")]
        cursor: String,
    },
    /// Update a memory's content, metadata, or scalar fields
    Update {
        /// Memory id
        id: String,
        /// New content
        #[arg(short, long)]
        content: Option<String>,
        /// New type
        #[arg(short = 'T', long = "type")]
        memory_type: Option<String>,
        /// New confidence
        #[arg(short = 'C', long)]
        confidence: Option<f32>,
    },
    /// Delete a memory by id
    Delete {
        /// Memory id
        id: String,
    },
    /// Show aggregate collection statistics
    Stats,
    /// Run the lifecycle maintenance pass (expiry, decay, consolidation)
    Lifecycle {
        /// Report what would change without mutating the store
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let ctx = AppContext::build(cli.config)?;

    match cli.command {
        Commands::Remember {
            content,
            memory_type,
            scope,
            tags,
            project,
            confidence,
        } => {
            let tags = tags
                .map(|t| t.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default();
            let (id, stored) = ctx.remember(
                RememberRequest {
                    content,
                    memory_type,
                    scope,
                    tags,
                    project,
                    confidence,
                },
                Deadline::none(),
            )?;
            if stored {
                println!("Stored memory {id}");
            } else {
                println!("Duplicate of existing memory {id}, not stored");
            }
        }

        Commands::Recall { message, project, budget } => {
            let out = ctx.recall(RecallRequest { message, project, budget }, Deadline::none())?;
            println!("{}", out.context);
            eprintln!("({} memories, {} tokens)", out.memory_count, out.tokens_used);
        }

        Commands::Search { message, limit, project } => {
            let results = ctx.search(
                SearchRequest {
                    message,
                    limit: Some(limit),
                    project,
                    memory_type: None,
                    scope: None,
                    tags: vec![],
                },
                Deadline::none(),
            )?;
            for result in results {
                println!(
                    "{} (score: {:.3}) [{}] {}",
                    result.memory.id,
                    result.similarity_score,
                    result.memory.memory_type,
                    truncate(&result.memory.content, 80)
                );
            }
        }

        Commands::Get { id } => {
            let memory = ctx.get(&id, Deadline::none())?;
            println!("{}", serde_json::to_string_pretty(&memory)?);
        }

        Commands::List {
            limit,
            memory_type,
            project,
            cursor,
        } => {
            let mut filters = SearchFilters::default();
            filters.memory_type = memory_type.map(|t| t.parse()).transpose().map_err(memoria::error::MemoriaError::InvalidInput)?;
            filters.project = project;

            let (memories, next_cursor) = ctx.list(&filters, limit, &cursor, Deadline::none())?;
            for memory in &memories {
                println!(
                    "{} [{}] {} - {}",
                    memory.id,
                    memory.memory_type,
                    memory.tags.join(","),
                    truncate(&memory.content, 80)
                );
            }
            if !next_cursor.is_empty() {
                eprintln!("next cursor: {next_cursor}");
            }
        }

        Commands::Update {
            id,
            content,
            memory_type,
            confidence,
        } => {
            let patch = MemoryPatch {
                content,
                memory_type,
                confidence: confidence.map(Some),
                ..Default::default()
            };
            let memory = ctx.update(&id, patch, Deadline::none())?;
            println!("{}", serde_json::to_string_pretty(&memory)?);
        }

        Commands::Delete { id } => {
            let deleted = ctx.forget(&id, Deadline::none())?;
            if deleted {
                println!("Deleted memory {id}");
            } else {
                println!("No memory with id {id}");
            }
        }

        Commands::Stats => {
            let stats = ctx.stats(Deadline::none())?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Commands::Lifecycle { dry_run } => {
            let report = ctx.run_lifecycle(dry_run)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len).collect();
        format!("{truncated}...")
    }
}
