//! Mender CLI - health-triggered autonomous patching
//!
//! Usage:
//!   mender run                      Poll containers and serve the control surface
//!   mender poll                     Run one health cycle
//!   mender advise <context>         Ask the configured backends for advice
//!   mender refactor <service>       Generate and apply a patch for a service
//!   mender apply <service> <diff>   Apply an existing diff to a service
//!   mender init                     Write a default mender.toml

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use mender_core::config::DEFAULT_CONFIG_FILE;
use mender_core::MenderConfig;
use mender_orchestrator::{patched_results, Pipeline, PollLoop};
use mender_patch::{PatchApplier, PatchCommand, ServiceCatalog};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "mender")]
#[command(author, version, about = "Health-triggered autonomous patch pipeline")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (defaults to ./mender.toml when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll containers on an interval and serve the webhook until ctrl-c
    Run {
        /// Do not start the webhook / WebSocket server
        #[arg(long)]
        no_server: bool,
    },

    /// Run a single health cycle and exit
    Poll {
        /// Print outcomes as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask the configured backends about a context
    Advise {
        /// Free-text description of the problem
        context: String,

        /// Run the generation/critic debate instead of a plain advisory
        #[arg(long, conflicts_with = "refactor")]
        debate: bool,

        /// Follow a refactor directive in the advice (needs autonomous refactor on)
        #[arg(long)]
        refactor: bool,
    },

    /// Generate and apply a patch for a service
    Refactor {
        /// Service directory name under the services root
        service: String,

        /// Extra instructions for the code backend
        #[arg(short, long)]
        instructions: Option<String>,
    },

    /// Apply a diff file to a service (dry run first, -p1 then -p2)
    Apply {
        /// Service directory name under the services root
        service: String,

        /// Unified diff to apply
        diff: PathBuf,
    },

    /// Write a default configuration file
    Init {
        /// Where to write the file
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = if cli.verbose {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Commands::Init { path, force } = &cli.command {
        return cmd_init(path, *force);
    }

    let config = Arc::new(
        MenderConfig::load(cli.config.as_deref()).context("Failed to load configuration")?,
    );

    match cli.command {
        Commands::Run { no_server } => cmd_run(config, no_server).await,
        Commands::Poll { json } => cmd_poll(config, json).await,
        Commands::Advise {
            context,
            debate,
            refactor,
        } => cmd_advise(config, &context, debate, refactor).await,
        Commands::Refactor {
            service,
            instructions,
        } => cmd_refactor(config, &service, instructions.as_deref()).await,
        Commands::Apply { service, diff } => cmd_apply(config, &service, diff).await,
        Commands::Init { .. } => Ok(()),
    }
}

fn build_pipeline(config: Arc<MenderConfig>) -> Result<Arc<Pipeline>> {
    Ok(Arc::new(
        Pipeline::from_config(config).context("Failed to build pipeline")?,
    ))
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    MenderConfig::write_default(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Wrote default configuration to {}", path.display());
    println!("API keys are read from the environment (or .env):");
    println!("  OPENAI_API_KEY, GEMINI_API_KEY, TAVILY_API_KEY");
    Ok(())
}

async fn cmd_run(config: Arc<MenderConfig>, no_server: bool) -> Result<()> {
    let pipeline = build_pipeline(config.clone())?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poll = tokio::spawn(PollLoop::new(pipeline.clone()).run(shutdown_rx.clone()));

    let mut server = if config.server.enabled && !no_server {
        let mut rx = shutdown_rx.clone();
        let server_config = config.server.clone();
        let pipeline = pipeline.clone();
        Some(tokio::spawn(async move {
            let shutdown = async move {
                while !*rx.borrow() {
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
            };
            mender_server::serve(pipeline, &server_config, shutdown).await
        }))
    } else {
        None
    };

    let server_result = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl-c")?;
            info!("Shutting down...");
            Ok(())
        }
        result = join_server(&mut server) => {
            if let Err(e) = &result {
                error!("Control surface stopped: {:#}", e);
            }
            result
        }
    };

    // Receivers may already be gone if both tasks stopped on their own
    let _ = shutdown_tx.send(true);

    let cycles = poll.await.context("Poll loop panicked")?;
    if let Some(handle) = server {
        handle.await.context("Server task panicked")??;
    }
    server_result?;

    println!("Stopped after {} health cycles", cycles);
    Ok(())
}

/// Wait for the server task; never resolves when there is none
async fn join_server(server: &mut Option<JoinHandle<Result<()>>>) -> Result<()> {
    match server.as_mut() {
        Some(handle) => {
            let result = handle.await;
            *server = None;
            result.context("Server task panicked")?
        }
        None => std::future::pending().await,
    }
}

async fn cmd_poll(config: Arc<MenderConfig>, json: bool) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let outcomes = pipeline.run_health_cycle().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
        return Ok(());
    }

    for outcome in &outcomes {
        println!("{}", outcome);
    }
    println!("{} patched", patched_results(&outcomes).len());
    Ok(())
}

async fn cmd_advise(
    config: Arc<MenderConfig>,
    context: &str,
    debate: bool,
    refactor: bool,
) -> Result<()> {
    let pipeline = build_pipeline(config)?;

    if debate {
        let outcome = pipeline.debate(context).await;
        for (id, answer) in outcome.generation.iter().chain(outcome.critiques.iter()) {
            info!("[{}] {}", id, answer);
        }
        if outcome.final_answer.is_empty() {
            bail!("No backend produced an answer");
        }
        println!("{}", outcome.final_answer);
        return Ok(());
    }

    if refactor {
        let report = pipeline.advise_and_refactor(context).await;
        print!("{}", report.answer());
        println!("=> {}", report.outcome);
        return Ok(());
    }

    let advisory = pipeline.advise(context).await;
    if advisory.is_empty() {
        bail!("No backend produced an answer (check API keys)");
    }
    print!("{}", advisory.combined());
    Ok(())
}

async fn cmd_refactor(
    config: Arc<MenderConfig>,
    service: &str,
    instructions: Option<&str>,
) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let outcome = pipeline.refactor_service(service, instructions).await;
    println!("{}", outcome);
    if !outcome.is_patched() {
        bail!("Refactor of {} did not apply a patch", service);
    }
    Ok(())
}

async fn cmd_apply(config: Arc<MenderConfig>, service: &str, diff: PathBuf) -> Result<()> {
    let service_dir = ServiceCatalog::new(&config.services)
        .resolve(service)
        .with_context(|| format!("Cannot patch service {}", service))?;
    let diff_text = tokio::fs::read_to_string(&diff)
        .await
        .with_context(|| format!("Failed to read {}", diff.display()))?;

    let applier = PatchApplier::new(Arc::new(PatchCommand::new(config.patch.binary.clone())));
    let result = applier
        .apply(&service_dir, &diff_text)
        .await
        .context("Patch tool failed")?;

    if !result.applied {
        if let Some(stderr) = &result.stderr {
            eprintln!("{}", stderr.trim_end());
        }
        bail!("Patch rejected for {} => manual review needed", service);
    }

    println!(
        "Patch applied to {} with -p{}",
        service_dir.display(),
        result.strip_level_used.unwrap_or_default()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli =
            Cli::try_parse_from(["mender", "-v", "advise", "web-1 dead", "--debate"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Advise { debate: true, refactor: false, .. }));

        let cli = Cli::try_parse_from([
            "mender",
            "refactor",
            "web",
            "-i",
            "add retries",
            "--config",
            "x.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(cli.command, Commands::Refactor { ref service, .. } if service == "web"));

        assert!(Cli::try_parse_from(["mender", "advise", "x", "--debate", "--refactor"]).is_err());
    }

    #[test]
    fn test_init_default_path() {
        let cli = Cli::try_parse_from(["mender", "init"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Init { ref path, force: false } if path == &PathBuf::from("mender.toml")
        ));
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mender.toml");

        cmd_init(&path, false).unwrap();
        let written = MenderConfig::from_file(&path).unwrap();
        assert_eq!(written.server.port, 5000);

        assert!(cmd_init(&path, false).is_err());
        assert!(cmd_init(&path, true).is_ok());
    }
}
