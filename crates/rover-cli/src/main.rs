//! Rover CLI - autonomous code generation with bounded repair
//!
//! Usage:
//!   rover serve                     Run the HTTP service
//!   rover run <description>         One-shot generate/execute/repair loop
//!   rover patches list              List stored patches
//!   rover patches show <id>         Dump one patch with its history
//!   rover patches delete <id>       Delete a patch
//!   rover patches clear             Delete every patch
//!   rover tasks list                List task records

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rover_agent::{Analyzer, CodeGenerator, CompletionClient, Model};
use rover_loop::{RepairConfig, RepairLoop};
use rover_sandbox::Sandbox;
use rover_server::{ServerConfig, TaskRecords};
use rover_store::ArtifactStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "rover")]
#[command(version, about = "Autonomous code generation with bounded repair")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Data directory (patch store, task table, git repo)
    #[arg(long, default_value = "rover-data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Bind address
        #[arg(long, default_value = "127.0.0.1:8001")]
        addr: String,

        /// Model to use (opus, sonnet, haiku)
        #[arg(short, long, default_value = "sonnet")]
        model: String,
    },

    /// Run one repair loop for a task description and print the report
    Run {
        /// Task description
        description: String,

        /// Target language tag
        #[arg(short, long, default_value = "python")]
        language: String,

        /// Functional requirement (repeatable)
        #[arg(short, long = "requirement")]
        requirements: Vec<String>,

        /// Declared package dependency (repeatable)
        #[arg(short, long = "dependency")]
        dependencies: Vec<String>,

        /// Additional free-text context
        #[arg(long)]
        context: Option<String>,

        /// Maximum generate/execute/analyze cycles
        #[arg(long, default_value = "3")]
        max_attempts: u32,

        /// Execution timeout in seconds
        #[arg(long, default_value = "60")]
        timeout: u64,

        /// Model to use (opus, sonnet, haiku)
        #[arg(short, long, default_value = "sonnet")]
        model: String,
    },

    /// Patch store management
    Patches {
        #[command(subcommand)]
        action: PatchCommands,
    },

    /// Task record management
    Tasks {
        #[command(subcommand)]
        action: TaskCommands,
    },
}

#[derive(Subcommand)]
enum PatchCommands {
    /// List stored patches
    List,
    /// Show one patch with its attempt history
    Show { id: String },
    /// Delete a patch
    Delete { id: String },
    /// Delete every stored patch
    Clear,
}

#[derive(Subcommand)]
enum TaskCommands {
    /// List task records
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;

    match cli.command {
        Commands::Serve { addr, model } => {
            let model: Model = model.parse().map_err(anyhow::Error::msg)?;
            rover_server::serve(ServerConfig {
                addr,
                data_dir: cli.data_dir,
                model,
                repair: RepairConfig::default(),
            })
            .await?;
        }

        Commands::Run {
            description,
            language,
            requirements,
            dependencies,
            context,
            max_attempts,
            timeout,
            model,
        } => {
            let model: Model = model.parse().map_err(anyhow::Error::msg)?;
            let language = language
                .parse::<rover_core::Language>()
                .map_err(anyhow::Error::msg)?;

            let mut spec = rover_core::TaskSpec::new(description, language)
                .with_requirements(requirements)
                .with_dependencies(dependencies);
            if let Some(context) = context {
                spec = spec.with_context(context);
            }

            let store = ArtifactStore::new(cli.data_dir.join("patches"));
            let backend: Arc<dyn rover_agent::CompletionBackend> =
                Arc::new(CompletionClient::new(model));
            let repair_loop = RepairLoop::new(
                CodeGenerator::new(Arc::clone(&backend), store.clone()),
                Sandbox::new(),
                Analyzer::new(backend),
                store,
            )
            .with_config(RepairConfig {
                max_attempts,
                timeout_secs: timeout,
            });

            let report = repair_loop.run(&spec).await?;
            println!("State: {}", report.state);
            if let Some(patch) = &report.patch {
                println!("Patch: {}", patch.id);
                for record in &patch.attempts {
                    let classification = record
                        .diagnosis
                        .as_ref()
                        .map(|d| d.classification.to_string())
                        .unwrap_or_default();
                    println!(
                        "  attempt {}: {} (exit {}) {}",
                        record.attempt, record.verdict, record.exit_code, classification
                    );
                }
                if let Some(last) = patch.last_attempt() {
                    if !last.stdout.is_empty() {
                        println!("--- stdout ---\n{}", last.stdout);
                    }
                    if !last.stderr.is_empty() {
                        println!("--- stderr ---\n{}", last.stderr);
                    }
                }
            } else if let Some(raw) = &report.last_completion {
                println!("--- last completion ---\n{}", raw);
            }
            if !report.succeeded() {
                std::process::exit(1);
            }
        }

        Commands::Patches { action } => {
            let store = ArtifactStore::new(cli.data_dir.join("patches"));
            match action {
                PatchCommands::List => {
                    for summary in store.list().await? {
                        println!(
                            "{}  [{}] {} attempt(s)  {}",
                            summary.id, summary.language, summary.attempts, summary.description
                        );
                    }
                }
                PatchCommands::Show { id } => {
                    let patch = store.load(&id).await?;
                    println!("{}", serde_json::to_string_pretty(&patch)?);
                }
                PatchCommands::Delete { id } => {
                    store.delete(&id).await?;
                    println!("Deleted {}", id);
                }
                PatchCommands::Clear => {
                    let removed = store.clear().await?;
                    println!("Removed {} patch(es)", removed);
                }
            }
        }

        Commands::Tasks { action } => match action {
            TaskCommands::List => {
                let records = TaskRecords::open(cli.data_dir.join("tasks.json")).await?;
                for record in records.list().await {
                    println!(
                        "#{}  [{}]{} {}",
                        record.id,
                        record.language,
                        if record.completed { " done" } else { "" },
                        record.title
                    );
                }
            }
        },
    }

    Ok(())
}
