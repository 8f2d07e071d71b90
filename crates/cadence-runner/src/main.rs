use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cadence_core::config::CadenceConfig;
use cadence_core::AesGcmEncryptor;
use cadence_executor::{Decorator, DefaultExecutorFactory, LapinBroker, RetryPolicy};
use cadence_runner::{Runner, RunnerConfig, RunnerMetrics};
use cadence_service::JobService;
use cadence_store::SqliteJobStore;
use clap::{Parser, Subcommand};
use tokio::signal::unix::{signal, SignalKind};
use tracing::info;

#[derive(Parser)]
#[command(name = "cadence-runner", version, about = "Distributed lease-based job runner")]
struct Cli {
    /// Config file (falls back to CADENCE_CONFIG, then ~/.cadence/cadence.toml).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Poll for due jobs and execute them until SIGINT/SIGTERM.
    Run,
    /// Create or upgrade the database schema, then exit.
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence_runner=info,cadence_store=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.or_else(|| std::env::var("CADENCE_CONFIG").ok());
    let config = CadenceConfig::load(config_path.as_deref()).context("loading config")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Migrate => migrate(&config),
        Command::Run => run(config).await,
    }
}

fn migrate(config: &CadenceConfig) -> anyhow::Result<()> {
    let path = &config.database.path;
    ensure_parent_dir(path)?;
    let conn = cadence_store::db::open(path, Duration::from_millis(config.database.busy_timeout_ms))
        .with_context(|| format!("opening database {path}"))?;
    cadence_store::db::init_db(&conn).context("applying schema")?;
    info!(path = %path, "database schema up to date");
    Ok(())
}

async fn run(config: CadenceConfig) -> anyhow::Result<()> {
    let key = config
        .encryption
        .key
        .as_deref()
        .context("encryption.key is not set (CADENCE_ENCRYPTION__KEY)")?;
    let encryptor = Arc::new(AesGcmEncryptor::new(key.as_bytes()).context("building encryptor")?);

    let path = &config.database.path;
    info!(path = %path, "opening job store");
    let store = SqliteJobStore::open(
        path,
        Duration::from_millis(config.database.busy_timeout_ms),
        encryptor,
    )
    .with_context(|| format!("opening job store {path}"))?;
    let service = Arc::new(JobService::new(Arc::new(store)));

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http.timeout_secs))
        .build()
        .context("building http client")?;
    let factory = Arc::new(DefaultExecutorFactory::new(
        Arc::new(http_client),
        Arc::new(LapinBroker),
    ));
    let retry: Arc<dyn Decorator> = Arc::new(RetryPolicy {
        max_attempts: config.retry.max_attempts,
        base_delay: Duration::from_millis(config.retry.base_delay_ms),
        max_delay: Duration::from_millis(config.retry.max_delay_ms),
    });
    let metrics = Arc::new(RunnerMetrics::new(
        config.runner.instance_id.clone(),
        config.metrics.enabled,
    ));

    let runner = Runner::new(
        RunnerConfig::from(&config.runner),
        service,
        factory,
        vec![retry],
        metrics,
    )?;
    runner.start();

    wait_for_signal().await?;

    let grace = config.runner.shutdown_grace();
    if runner.stop(grace).await {
        info!("shutdown complete");
    } else {
        info!(grace_secs = grace.as_secs(), "shutdown forced after grace period");
    }
    Ok(())
}

async fn wait_for_signal() -> anyhow::Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }
    Ok(())
}

fn ensure_parent_dir(path: &str) -> anyhow::Result<()> {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    Ok(())
}
