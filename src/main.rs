//! # Plotline CLI (`plotline`)
//!
//! ## Usage
//!
//! ```bash
//! plotline --config ./config/plotline.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `plotline init` | Create the SQLite database and run schema migrations |
//! | `plotline projects` | List configured manuscripts |
//! | `plotline analyze <project>` | Tension and pacing curves, detected structure |
//! | `plotline graph <project>` | Character graph |
//! | `plotline detect <project>` | Plot holes |
//! | `plotline suggest <project>` | Plot suggestions |
//! | `plotline generate ...` | Generate a plot structure from a premise |
//! | `plotline dismiss <project> <fingerprint>` | Dismiss a plot hole |
//! | `plotline cache get\|invalidate\|stats\|purge` | Inspect the analysis cache |
//! | `plotline export <project>` / `import <project> <file>` | Move cached analyses between machines |
//! | `plotline serve` | Start the HTTP server |
//!
//! Every command accepts `--json` for machine-readable output on stdout and
//! `--verbose` for debug logging on stderr.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use plotline::app::App;
use plotline::commands::{self, DetectFlags};
use plotline::{config, export, logging, migrate, server, stats};
use plotline_core::models::{AnalysisKind, StructureType};

/// Plotline: story structure analysis for long-form manuscripts.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/plotline.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "plotline",
    about = "Plotline: story-arc, character-graph and plot-hole analysis for manuscripts",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/plotline.toml")]
    config: PathBuf,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging on stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// List configured projects with chapter and character counts.
    Projects,

    /// Compute the story arc: per-chapter tension, pacing and the
    /// best-matching narrative structure.
    Analyze { project: String },

    /// Build the character relationship graph.
    Graph { project: String },

    /// Detect plot holes.
    ///
    /// Runs the timeline, character-consistency, unresolved-setup and POV
    /// passes. `--assist` asks the configured provider to review what the
    /// heuristics found.
    Detect {
        project: String,
        #[arg(long)]
        no_timeline: bool,
        #[arg(long)]
        no_characters: bool,
        #[arg(long)]
        no_setups: bool,
        #[arg(long)]
        no_pov: bool,
        /// Review candidates with the text-generation provider.
        #[arg(long)]
        assist: bool,
    },

    /// Suggest twists, subplots and arcs for a project.
    Suggest { project: String },

    /// Generate a plot structure act by act.
    Generate {
        #[arg(long)]
        premise: String,
        #[arg(long)]
        genre: String,
        /// Target length in chapters.
        #[arg(long, default_value_t = 24)]
        length: u32,
        /// Structure template (e.g. `three-act`, `save-the-cat`). Defaults
        /// to the genre's usual structure.
        #[arg(long)]
        structure: Option<StructureType>,
        #[arg(long = "theme")]
        themes: Vec<String>,
        /// Cache the result under this project.
        #[arg(long)]
        project: Option<String>,
    },

    /// Dismiss a plot hole by fingerprint. It stays dismissed across
    /// re-analysis until the underlying text changes.
    Dismiss { project: String, fingerprint: String },

    /// Inspect and manage the analysis cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Export a project's cached analyses and dismissals as JSON.
    Export {
        project: String,
        /// Write to a file instead of stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Import a bundle written by `export` into a project.
    Import { project: String, input: PathBuf },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Print a cached artifact if it is fresh for the current manuscript.
    Get { project: String, kind: AnalysisKind },
    /// Drop cached entries for a project, optionally one kind only.
    Invalidate {
        project: String,
        #[arg(long)]
        kind: Option<AnalysisKind>,
    },
    /// Entry counts and sizes.
    Stats {
        #[arg(long)]
        project: Option<String>,
    },
    /// Delete expired entries.
    Purge,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;
    let json = cli.json;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
            return Ok(());
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
            return Ok(());
        }
        _ => {}
    }

    let app = App::open(&cfg).await?;
    let result = match cli.command {
        Commands::Projects => commands::run_projects(&app, json).await,
        Commands::Analyze { project } => commands::run_analyze(&app, &project, json).await,
        Commands::Graph { project } => commands::run_graph(&app, &project, json).await,
        Commands::Detect {
            project,
            no_timeline,
            no_characters,
            no_setups,
            no_pov,
            assist,
        } => {
            let flags = DetectFlags {
                no_timeline,
                no_characters,
                no_setups,
                no_pov,
                assist,
            };
            commands::run_detect(&app, &project, flags, json).await
        }
        Commands::Suggest { project } => commands::run_suggest(&app, &project, json).await,
        Commands::Generate {
            premise,
            genre,
            length,
            structure,
            themes,
            project,
        } => {
            commands::run_generate(&app, premise, genre, length, structure, themes, project, json)
                .await
        }
        Commands::Dismiss {
            project,
            fingerprint,
        } => commands::run_dismiss(&app, &project, &fingerprint).await,
        Commands::Cache { action } => match action {
            CacheAction::Get { project, kind } => {
                stats::run_cache_get(&app, &project, kind, json).await
            }
            CacheAction::Invalidate { project, kind } => {
                stats::run_cache_invalidate(&app, &project, kind).await
            }
            CacheAction::Stats { project } => {
                stats::run_cache_stats(&app, project.as_deref(), json).await
            }
            CacheAction::Purge => stats::run_cache_purge(&app).await,
        },
        Commands::Export { project, output } => {
            export::run_export(&app, &project, output.as_deref()).await
        }
        Commands::Import { project, input } => export::run_import(&app, &project, &input).await,
        Commands::Init | Commands::Serve => Ok(()),
    };
    app.close().await;
    result
}
