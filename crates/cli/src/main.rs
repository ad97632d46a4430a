mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};

use jobline_core::{
    load_config, request_from_template, validate_config, ArtifactPaths, Config, CreateJobRequest,
    FsArtifactStore, HttpJobClient, JobClient, JobOrchestrator, JobStore, SanitizedConfig,
    SessionReport, SqliteJobStore,
};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "jobline")]
#[command(author, version, about = "Drive remote report jobs into the local database")]
struct Cli {
    /// Configuration file
    #[arg(long, env = "JOBLINE_CONFIG", default_value = "jobline.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one session: batch passes until no job can progress further
    Run {
        /// Keep running a session every `orchestrator.watch_interval_secs`
        #[arg(long)]
        watch: bool,
    },
    /// Create a queued job from its `[templates.<name>]` entry
    Enqueue {
        /// Job type, e.g. Holdings
        name: String,
        /// Date the data is valid for (YYYY-MM-DD)
        as_of: NaiveDate,
        /// Read the JSON request parameters from this file instead
        #[arg(long)]
        params_file: Option<PathBuf>,
    },
    /// Print open jobs
    List {
        /// Include completed and failed jobs
        #[arg(long)]
        all: bool,
    },
    /// Print the transition history of a job
    History {
        id: i64,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    validate_config(&config).context("Configuration validation failed")?;

    let _log_guard = logging::init(&config.logging)?;
    info!("jobline {} using configuration {:?}", VERSION, cli.config);

    match cli.command {
        Command::Run { watch } => run_sessions(&config, watch).await,
        Command::Enqueue {
            name,
            as_of,
            params_file,
        } => enqueue(
            &config,
            &open_store(&config)?,
            name,
            as_of,
            params_file.as_deref(),
        ),
        Command::List { all } => list(&open_store(&config)?, all),
        Command::History { id } => history(&open_store(&config)?, id),
    }
}

fn open_store(config: &Config) -> Result<SqliteJobStore> {
    tracing::debug!("Opening database {:?}", config.database.path);
    SqliteJobStore::new(&config.database.path)
        .context("Failed to open job database")?
        .with_busy_timeout(std::time::Duration::from_millis(
            config.database.busy_timeout_ms,
        ))
        .context("Failed to configure job database")
}

/// Run sessions, each over its own database connection that is closed when
/// the session ends.
async fn run_sessions(config: &Config, watch: bool) -> Result<()> {
    let sanitized = SanitizedConfig::from(config);
    tracing::debug!(
        config = %serde_json::to_string(&sanitized).unwrap_or_default(),
        "effective configuration"
    );

    let client: Arc<dyn JobClient> = Arc::new(
        HttpJobClient::new(config.api.clone()).context("Failed to create job client")?,
    );
    info!("Using job client: {}", client.name());

    if !watch {
        let session = run_session(config, client).await?;
        if session.hit_pass_limit {
            info!("Some jobs can still progress; run again to continue");
        }
        return Ok(());
    }

    let interval = config.orchestrator.watch_interval();
    info!("Watching for jobs every {:?}", interval);
    loop {
        if let Err(e) = run_session(config, client.clone()).await {
            error!("Session failed: {:#}", e);
        }

        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }

    Ok(())
}

async fn run_session(config: &Config, client: Arc<dyn JobClient>) -> Result<SessionReport> {
    let store = Arc::new(open_store(config)?);
    let orchestrator = JobOrchestrator::new(
        config.orchestrator.clone(),
        store,
        client,
        Arc::new(FsArtifactStore::new()),
        ArtifactPaths::from(&config.artifacts),
    )
    .with_submit_responses(config.artifacts.save_submit_responses);

    Ok(orchestrator.run_session().await?)
}

fn enqueue(
    config: &Config,
    store: &SqliteJobStore,
    name: String,
    as_of: NaiveDate,
    params_file: Option<&Path>,
) -> Result<()> {
    let request = match params_file {
        Some(path) => CreateJobRequest {
            name,
            as_of,
            params: std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read parameters from {:?}", path))?,
        },
        None => request_from_template(&config.templates, &name, as_of)?,
    };

    let job = store
        .enqueue(request)
        .context("Failed to enqueue job")?;
    info!("Enqueued job {} ({} as of {})", job.id, job.name, job.as_of);

    println!("{}", serde_json::to_string_pretty(&job)?);
    Ok(())
}

fn list(store: &dyn JobStore, all: bool) -> Result<()> {
    let jobs = if all {
        store.list_all()?
    } else {
        store.list_open_jobs()?
    };

    for job in jobs {
        println!(
            "{:>6}  {:<20} {}  {:<10} {}",
            job.id, job.name, job.as_of, job.status_name, job.detail
        );
    }
    Ok(())
}

fn history(store: &dyn JobStore, id: i64) -> Result<()> {
    if store.get(id)?.is_none() {
        bail!("Job {} not found", id);
    }

    for entry in store.history(id)? {
        println!(
            "{}  {:<10} -> {:<10} {}",
            entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            entry.from_status.as_deref().unwrap_or("-"),
            entry.to_status.as_str(),
            entry.detail
        );
    }
    Ok(())
}
