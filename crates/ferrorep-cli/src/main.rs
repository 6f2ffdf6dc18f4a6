//! FerroRep - privileged directory tree replication
//!
//! Mirrors an application's data subtree into a destination that needs elevated
//! access, using a root shell, a privileged broker or plain file copies,
//! whichever is fastest and available.

mod display;
mod json_output;
mod logging;
mod progress;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use dialoguer::Confirm;
use ferrorep_channel::ShellChannel;
use ferrorep_config::{Config, ConfigLoader};
use ferrorep_engine::{ChannelSet, JsonFileStatusStore, ReplicationEngine, RunControl};
use ferrorep_types::{JobStatusStore, ReplicationRequest, ReplicationStatus, RunId};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

/// FerroRep - privileged directory tree replication
#[derive(Parser)]
#[command(
    name = "ferrorep",
    version = env!("CARGO_PKG_VERSION"),
    about = "Replicate an application data tree into a privileged destination",
    long_about = "FerroRep copies one application's data subtree into a destination that\n\
                  needs elevated access. It prefers a root shell, then a privileged broker,\n\
                  and falls back to concurrent unprivileged copying, with live progress,\n\
                  pause/cancel and post-copy verification."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Quiet mode - minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose mode - detailed output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replicate a source tree into the destination for an identity
    Replicate {
        /// Source root containing the identity's subtree
        source: PathBuf,
        /// Destination identity, substituted into the layout templates
        identity: String,
        /// Only copy files that are newer than the destination
        #[arg(long)]
        incremental: bool,
        /// Use this run identifier instead of a random one
        #[arg(long)]
        run_id: Option<RunId>,
        /// Directory for durable job status files
        #[arg(long)]
        status_dir: Option<PathBuf>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
        /// Do not ask before overwriting an existing destination
        #[arg(short, long)]
        yes: bool,
    },
    /// Probe privileged channels and show the mode a run would use
    Probe {
        /// Print the probe result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the stored status of a run
    Status {
        /// Run identifier
        run_id: RunId,
        /// Directory holding job status files
        #[arg(long)]
        status_dir: PathBuf,
        /// Print the stored status as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ConfigLoader::load_default().context("failed to load configuration")?,
    };

    let verbosity = logging::Verbosity {
        debug: cli.debug,
        verbose: cli.verbose,
        quiet: cli.quiet,
    };
    let _log_guard = logging::init_logging(verbosity, &config.logging)?;

    info!("FerroRep v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Replicate {
            source,
            identity,
            incremental,
            run_id,
            status_dir,
            json,
            yes,
        } => {
            let request = ReplicationRequest::new(source, identity).incremental(incremental);
            let options = ReplicateOptions {
                run_id: run_id.unwrap_or_default(),
                status_dir,
                json,
                yes,
                quiet: cli.quiet,
            };
            replicate_command(config, request, options).await
        }
        Commands::Probe { json } => {
            probe_command(config, json).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status {
            run_id,
            status_dir,
            json,
        } => status_command(run_id, &status_dir, json).await,
        Commands::Config { default } => {
            config_command(&config, default)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Root shell and optional broker from the `channels` section
fn channel_set(config: &Config) -> Result<ChannelSet> {
    let root = ShellChannel::new("root", config.channels.root_launcher.clone())?;
    let mut channels = ChannelSet::default().with_root(Arc::new(root));
    if let Some(launcher) = &config.channels.broker_launcher {
        let broker = ShellChannel::new("broker", launcher.clone())?;
        channels = channels.with_brokered(Arc::new(broker));
    }
    Ok(channels)
}

struct ReplicateOptions {
    run_id: RunId,
    status_dir: Option<PathBuf>,
    json: bool,
    yes: bool,
    quiet: bool,
}

fn exit_code(status: ReplicationStatus) -> ExitCode {
    match status {
        ReplicationStatus::Success | ReplicationStatus::PartialSuccess => ExitCode::SUCCESS,
        ReplicationStatus::Cancelled => ExitCode::from(2),
        ReplicationStatus::Failed => ExitCode::from(1),
    }
}

async fn replicate_command(
    config: Config,
    request: ReplicationRequest,
    options: ReplicateOptions,
) -> Result<ExitCode> {
    let destination_root = config
        .layout
        .destination_root(&request.destination_identity);
    let show_progress = !options.json && !options.quiet;

    if !options.yes
        && !options.json
        && console::user_attended()
        && Path::new(&destination_root).exists()
    {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "{} already exists and will be overwritten in place. Continue?",
                destination_root
            ))
            .default(false)
            .interact()
            .context("confirmation prompt failed")?;
        if !confirmed {
            display::display_warning("Replication aborted");
            return Ok(ExitCode::from(2));
        }
    }

    let progress = Arc::new(progress::ConsoleProgress::new(!show_progress));
    let mut builder = ReplicationEngine::builder()
        .config(config.clone())
        .channels(channel_set(&config)?)
        .sink(progress.clone());
    if let Some(dir) = &options.status_dir {
        builder = builder.status_store(Arc::new(JsonFileStatusStore::new(dir)));
    }
    let engine = builder.build();

    if show_progress {
        display::display_run_banner(&request, options.run_id, &destination_root);
    }

    let control = RunControl::new();
    let handle = engine
        .start_with_control(options.run_id, request.clone(), control.clone())
        .await?;
    let wait = handle.wait();
    tokio::pin!(wait);

    let outcome = tokio::select! {
        outcome = &mut wait => outcome,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    warn!("interrupt received, cancelling run");
                    control.cancel();
                }
                Err(e) => warn!("failed to listen for Ctrl-C: {}", e),
            }
            wait.await
        }
    };
    progress.clear();
    let result = outcome?;

    let code = exit_code(result.status);
    if options.json {
        let output = json_output::ReplicationResultJson::new(&request, &destination_root, result);
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if !options.quiet {
        display::display_result(&result);
    }
    Ok(code)
}

async fn probe_command(config: Config, json: bool) -> Result<()> {
    let engine = ReplicationEngine::new(config.clone(), channel_set(&config)?);
    let signals = engine.probe().await;
    let mode = engine.selected_mode().await.map_err(|e| e.to_string());

    if json {
        let output = json_output::ProbeJson::new(signals, mode);
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        display::display_probe(signals, mode);
    }
    Ok(())
}

async fn status_command(run_id: RunId, status_dir: &Path, json: bool) -> Result<ExitCode> {
    let store = JsonFileStatusStore::new(status_dir);
    let Some(status) = store.load(run_id).await? else {
        display::display_error(&format!(
            "No status stored for run {} in {}",
            run_id,
            status_dir.display()
        ));
        return Ok(ExitCode::from(1));
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        display::display_status(run_id, &status);
    }
    Ok(ExitCode::SUCCESS)
}

fn config_command(config: &Config, default: bool) -> Result<()> {
    let (label, shown) = if default {
        ("Default configuration:", Config::default())
    } else {
        ("Current configuration:", config.clone())
    };
    println!("{} {}", style("⚙").blue().bold(), style(label).bold());
    print!("{}", serde_yaml::to_string(&shown)?);
    Ok(())
}
