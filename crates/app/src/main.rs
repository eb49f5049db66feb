use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use roadmap_core::model::{RoadmapDraft, RoadmapId, UserId};
use serde_json::json;
use services::{AppServices, Clock, ProgressSnapshot, RoadmapDocument, RoadmapSummary};
use storage::sqlite::SqliteOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod db_url;

use db_url::{normalize_sqlite_url, prepare_sqlite_file};

/// Track progress through month-by-month learning roadmaps.
#[derive(Debug, Parser)]
#[command(name = "roadmap", version, about)]
struct Cli {
    /// `SQLite` database URL or path.
    #[arg(
        long,
        global = true,
        env = "ROADMAP_DB_URL",
        default_value = "sqlite://roadmap.sqlite3"
    )]
    db: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store a new roadmap from a JSON draft and print its id.
    Define { file: PathBuf },
    /// Replace an existing roadmap with a new JSON draft.
    Revise { id: RoadmapId, file: PathBuf },
    /// List stored roadmaps.
    List {
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Print one roadmap with its full structure.
    Show { id: RoadmapId },
    /// Create an empty progress record.
    Start {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        roadmap: RoadmapId,
    },
    /// Mark a step done (or not done with `--undo`).
    Toggle {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        roadmap: RoadmapId,
        /// Step key in `month-step` form, for example `0-3`.
        #[arg(long)]
        step: String,
        #[arg(long)]
        undo: bool,
    },
    /// Print a progress snapshot.
    Progress {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        roadmap: RoadmapId,
    },
}

fn read_draft(path: &Path) -> Result<RoadmapDraft, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| format!("cannot read {}: {err}", path.display()))?;
    let draft = serde_json::from_str(&raw)
        .map_err(|err| format!("invalid roadmap draft in {}: {err}", path.display()))?;
    Ok(draft)
}

fn print_json(value: &impl serde::Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    // Open + migrate SQLite here so core/services stay free of filesystem concerns.
    let db_url = normalize_sqlite_url(&cli.db)?;
    prepare_sqlite_file(&db_url)?;
    tracing::debug!(%db_url, "opening database");
    let app = AppServices::new_sqlite(&db_url, SqliteOptions::default(), Clock::system()).await?;

    match cli.command {
        Command::Define { file } => {
            let id = app.catalog().define(read_draft(&file)?).await?;
            print_json(&json!({ "id": id }))
        }
        Command::Revise { id, file } => {
            app.catalog().revise(id, read_draft(&file)?).await?;
            let step_count = app.catalog().step_count(id).await?;
            print_json(&json!({ "id": id, "stepCount": step_count }))
        }
        Command::List { limit } => {
            let roadmaps = app.catalog().list(limit).await?;
            let summaries: Vec<RoadmapSummary> = roadmaps.iter().map(RoadmapSummary::from).collect();
            print_json(&summaries)
        }
        Command::Show { id } => {
            let roadmap = app.catalog().get(id).await?;
            print_json(&RoadmapDocument::from(&roadmap))
        }
        Command::Start { user, roadmap } => {
            let outcome = app.progress().start_progress(&user, roadmap).await?;
            if !outcome.was_created() {
                tracing::info!(user_id = %user, roadmap_id = %roadmap, "progress already started");
            }
            print_json(&ProgressSnapshot::from(outcome.record()))
        }
        Command::Toggle {
            user,
            roadmap,
            step,
            undo,
        } => {
            let record = app
                .progress()
                .set_completion(&user, roadmap, &step, !undo)
                .await?;
            print_json(&ProgressSnapshot::from(&record))
        }
        Command::Progress { user, roadmap } => {
            let record = app.progress().get_progress(&user, roadmap).await?;
            print_json(&ProgressSnapshot::from(&record))
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        // Binary glue: print once, no re-logging.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
