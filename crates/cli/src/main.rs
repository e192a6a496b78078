use std::{path::PathBuf, process::ExitCode, time::Duration};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use corral_engine::{
    ConsoleSink, HttpConnector, OrchestrateOptions, ProvisionError, TracingSink, WatchOptions,
    load_environment_from_file, orchestrate,
};
use corral_types::Credentials;
use corral_util::{ServiceConfig, default_config_path, expand_tilde, load_config, load_config_from_path};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "corral", version, about = "Provision environments through remote orchestrator workflows")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit workflow executions for every component of an environment
    Provision(ProvisionArgs),
}

#[derive(Debug, Args)]
struct ProvisionArgs {
    /// Environment document (YAML or JSON)
    env_file: PathBuf,
    /// Submit one request per component instead of one per named node
    #[arg(long)]
    batch: bool,
    #[arg(long, env = "CORRAL_USERNAME")]
    username: Option<String>,
    #[arg(long, env = "CORRAL_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Override TLS certificate verification for every component
    #[arg(long, value_name = "true|false")]
    verify_ssl: Option<bool>,
    /// Wait for submitted executions to finish
    #[arg(long)]
    watch: bool,
    /// Seconds between status checks while watching
    #[arg(long, value_name = "SECS", default_value_t = 15)]
    watch_interval: u64,
    /// Give up watching after this many checks
    #[arg(long, value_name = "N")]
    max_ticks: Option<u32>,
    /// Give up watching after this many seconds
    #[arg(long, value_name = "N")]
    max_watch_seconds: Option<u64>,
    #[arg(long, short)]
    verbose: bool,
    /// Show what would be submitted without contacting the orchestrator
    #[arg(long)]
    dry_run: bool,
    /// Configuration file (defaults to $CORRAL_CONFIG_PATH or the user config dir)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Exit status for configuration or environment problems caught before any remote call.
const EXIT_INVALID_INPUT: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Provision(args) => {
            init_tracing(args.verbose);
            run_provision(args).await
        }
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("Error: {error:#}");
            ExitCode::from(exit_status(&error))
        }
    }
}

fn exit_status(error: &anyhow::Error) -> u8 {
    let invalid_input = error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<ProvisionError>())
        .any(ProvisionError::is_validation);
    if invalid_input { EXIT_INVALID_INPUT } else { 1 }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_provision(args: ProvisionArgs) -> Result<()> {
    let config = match args.config.as_deref() {
        Some(path) => {
            let path = expand_tilde(&path.to_string_lossy());
            let config = load_config_from_path(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            debug!(path = %path.display(), "configuration loaded");
            config.apply_env_overrides()
        }
        None => load_config()
            .with_context(|| format!("Failed to load configuration from {}", default_config_path().display()))?,
    };

    let environment = load_environment_from_file(&args.env_file)?;
    let options = build_options(&args, config);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping");
            ctrl_c.cancel();
        }
    });

    let outcome = orchestrate(&environment, &options, &HttpConnector, &(ConsoleSink, TracingSink), cancel)
        .await
        .with_context(|| format!("Provisioning {}/{} failed", environment.product, environment.environment))?;
    info!(
        submitted = outcome.submitted.len(),
        outstanding = outcome.registry.outstanding(),
        "provisioning run finished"
    );
    Ok(())
}

/// Merge flags with configuration. Flags win over `CORRAL_*` variables, which
/// win over the config file.
fn build_options(args: &ProvisionArgs, config: ServiceConfig) -> OrchestrateOptions {
    let mut watch_options = WatchOptions {
        interval: Duration::from_secs(args.watch_interval),
        max_ticks: args.max_ticks,
        max_duration: args.max_watch_seconds.map(Duration::from_secs),
    };
    if watch_options.interval.is_zero() {
        watch_options.interval = Duration::from_secs(1);
    }

    OrchestrateOptions {
        named_nodes: !args.batch,
        credentials: Credentials::new(
            args.username.clone().or(config.username),
            args.password.clone().or(config.password),
        ),
        verify_ssl: args.verify_ssl.or(config.verify_ssl),
        default_url: config.url,
        watch: args.watch,
        watch_options,
        verbose: args.verbose,
        dry_run: args.dry_run,
    }
}
