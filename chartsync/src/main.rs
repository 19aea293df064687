//! chartsync - command-line chart data synchronization client
//!
//! Pulls the score structure from a chart server, runs the element filter
//! chain over every gameplay period, and manages the recent projects list.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chartsync::filters::{ElementCensusFilter, ElementFilter, JudgementLineFilter};
use chartsync::{ChartDataService, ChartRepository, FilterManager, RpcChartRepository, RpcClient};
use chartsync_common::config::{self, ConfigOverrides, ResolvedConfig, SERVER_URL_ENV};
use chartsync_common::projects::{JsonProjectRepository, ProjectService};

/// Command-line arguments for chartsync
#[derive(Parser, Debug)]
#[command(name = "chartsync")]
#[command(about = "Chart data synchronization client")]
#[command(version)]
struct Args {
    /// JSON-RPC endpoint of the chart server
    #[arg(long, global = true, env = SERVER_URL_ENV)]
    server_url: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    /// Path to the TOML config file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Synchronize once and run the filter chain
    Sync,

    /// Synchronize periodically until Ctrl+C
    Watch {
        #[arg(long, default_value = "30")]
        interval_secs: u64,
    },

    /// Manage the recent projects list
    Projects {
        #[command(subcommand)]
        action: ProjectsAction,
    },
}

#[derive(Subcommand, Debug)]
enum ProjectsAction {
    List,
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        bpm: String,
        #[arg(long)]
        path: String,
    },
    Remove {
        #[arg(long)]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = ConfigOverrides {
        config_path: args.config.clone(),
        server_url: args.server_url.clone(),
        request_timeout_secs: args.timeout_secs,
    };
    let config = config::resolve(&overrides).context("Failed to resolve configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting chartsync v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match args.command {
        Command::Sync => run_sync(&config).await,
        Command::Watch { interval_secs } => run_watch(&config, interval_secs).await,
        Command::Projects { action } => run_projects(&config, action).await,
    }
}

fn build_repository(config: &ResolvedConfig) -> Result<Arc<dyn ChartRepository>> {
    info!(
        "Chart server: {} (timeout {}s)",
        config.server_url,
        config.request_timeout.as_secs()
    );
    let client = RpcClient::new(config.server_url.clone(), config.request_timeout)
        .context("Failed to create JSON-RPC client")?;
    Ok(Arc::new(RpcChartRepository::new(client)))
}

fn default_filters() -> (Arc<JudgementLineFilter>, Arc<ElementCensusFilter>) {
    (
        Arc::new(JudgementLineFilter::new()),
        Arc::new(ElementCensusFilter::new()),
    )
}

async fn run_sync(config: &ResolvedConfig) -> Result<()> {
    let repository = build_repository(config)?;
    let service = ChartDataService::new(Arc::clone(&repository));

    service.refresh().await;
    let status = service.status();
    let Some(score) = status.staves else {
        bail!("Synchronization failed: {}", status.error_message);
    };
    println!(
        "Synchronized {} staves ({} periods)",
        score.staves.len(),
        score.period_count()
    );

    // Created after the refresh so its listener does not start a second pass
    let (judgement_lines, census) = default_filters();
    let filters: Vec<Arc<dyn ElementFilter>> = vec![judgement_lines.clone(), census.clone()];
    let manager =
        FilterManager::with_filters(repository, service, config.gameplay_form.clone(), filters);

    let summary = manager.execute_filters().await;
    println!(
        "Filter pass: {} staves, {} periods processed, {} skipped, {} filter failures",
        summary.staves_visited,
        summary.periods_processed,
        summary.periods_failed,
        summary.filter_failures
    );
    println!(
        "Judgement lines in last batch: {}",
        judgement_lines.judgement_lines().await.len()
    );
    for (class_name, count) in census.counts().await {
        println!("  {:<40} {}", class_name, count);
    }

    Ok(())
}

async fn run_watch(config: &ResolvedConfig, interval_secs: u64) -> Result<()> {
    if interval_secs == 0 {
        bail!("--interval-secs must be at least 1");
    }

    let repository = build_repository(config)?;
    let service = ChartDataService::new(Arc::clone(&repository));
    let (judgement_lines, census) = default_filters();
    let filters: Vec<Arc<dyn ElementFilter>> = vec![judgement_lines, census];
    let _manager = FilterManager::with_filters(
        repository,
        service.clone(),
        config.gameplay_form.clone(),
        filters,
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    info!("Watching chart server every {}s, press Ctrl+C to stop", interval_secs);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                service.refresh().await;
                let status = service.status();
                if status.error_message.is_empty() {
                    info!(attempt = status.committed_attempt, "Chart data up to date");
                } else {
                    warn!("Synchronization failed: {}", status.error_message);
                }
            }
            result = signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}

async fn run_projects(config: &ResolvedConfig, action: ProjectsAction) -> Result<()> {
    info!("Projects file: {}", config.projects_file.display());
    let service = ProjectService::new(Arc::new(JsonProjectRepository::new(
        config.projects_file.clone(),
    )));

    match action {
        ProjectsAction::List => {
            let projects = service
                .get_all_projects()
                .await
                .context("Failed to load projects")?;
            if projects.is_empty() {
                println!("No projects");
            }
            for project in projects {
                println!("{:<30} {:>5} bpm  {}", project.name, project.bpm, project.path);
            }
        }
        ProjectsAction::Add { name, bpm, path } => {
            let project = service
                .create_project(&name, &bpm, &path)
                .await
                .context("Failed to add project")?;
            println!("Added {}", project.path);
        }
        ProjectsAction::Remove { path } => {
            service
                .delete_project(&path)
                .await
                .context("Failed to remove project")?;
            println!("Removed {}", path);
        }
    }

    Ok(())
}
