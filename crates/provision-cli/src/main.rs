use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};

use provision_core::ProvisionError;
use provision_core::app::{OrchestratorBuilder, ResolvedGraph, resolve};
use provision_core::builtin;
use provision_core::config::{Endpoint, ProvisionConfig, load_manifest};
use provision_core::impls::{InMemoryLedger, TracingEventSink};

/// Idempotent, dependency-ordered ledger provisioning
#[derive(Parser, Debug)]
#[command(name = "provision")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    RUST_LOG    Log filter (overrides --log-level)")]
struct Cli {
    /// Configuration file (TOML); defaults apply when omitted
    #[arg(short, long, global = true, env = "PROVISION_CONFIG")]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct Selection {
    /// Task manifest (TOML); the built-in remilias manifest when omitted
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// Only tasks with these tags, plus their dependencies
    #[arg(short, long, value_delimiter = ',')]
    tags: Vec<String>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Bring the ledger to the declared state
    Run {
        #[command(flatten)]
        selection: Selection,

        /// Tasks allowed in flight at once (overrides run.parallelism)
        #[arg(short, long)]
        parallelism: Option<usize>,
    },

    /// Evaluate guards and show what a run would submit
    Plan {
        #[command(flatten)]
        selection: Selection,
    },

    /// Print the resolved execution order
    Order {
        #[command(flatten)]
        selection: Selection,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match execute(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "provisioning aborted");
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing(log_level: &str) {
    let fallback = match log_level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn execute(cli: Cli) -> Result<ExitCode, ProvisionError> {
    let config = match &cli.config {
        Some(path) => ProvisionConfig::load(path)?,
        None => ProvisionConfig::default(),
    };

    match cli.command {
        Command::Order { selection } => {
            let graph = load_graph(&selection)?;
            if selection.json {
                print_json(serde_json::to_string_pretty(&graph.ids()));
            } else {
                for (i, task) in graph.tasks().iter().enumerate() {
                    println!("{:>3}. {}  {}", i + 1, task.id, task.description);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Plan { selection } => {
            let graph = load_graph(&selection)?;
            let (ledger, _) = open_ledger(&config)?;
            let orchestrator = OrchestratorBuilder::new(ledger)
                .accounts(config.accounts()?)
                .read_retry(config.read_retry_policy())
                .read_timeout(config.read_timeout())
                .expect_manifest(&graph)
                .build()?;

            let plan = orchestrator.plan(&graph).await;
            if selection.json {
                print_json(serde_json::to_string_pretty(&plan));
            } else {
                print!("{plan}");
            }
            Ok(if plan.has_errors() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Command::Run {
            selection,
            parallelism,
        } => {
            let graph = load_graph(&selection)?;
            let (ledger, snapshot) = open_ledger(&config)?;
            let orchestrator = OrchestratorBuilder::new(ledger.clone())
                .accounts(config.accounts()?)
                .submitter_config(config.submitter_config())
                .read_retry(config.read_retry_policy())
                .read_timeout(config.read_timeout())
                .event_sink(Arc::new(TracingEventSink))
                .parallelism(parallelism.unwrap_or(config.run.parallelism))
                .expect_manifest(&graph)
                .build()?;

            let cancel = orchestrator.cancel_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received; finishing in-flight tasks");
                    cancel.cancel();
                }
            });

            info!(network = %config.network.name, tasks = graph.len(), "provisioning");
            let report = orchestrator.run(&graph).await;
            if let Some(path) = snapshot {
                ledger.save(&path)?;
                info!(path = %path.display(), "ledger snapshot saved");
            }

            if selection.json {
                print_json(serde_json::to_string_pretty(&report));
            } else {
                print!("{report}");
            }
            Ok(if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn load_graph(selection: &Selection) -> Result<ResolvedGraph, ProvisionError> {
    let manifest = match &selection.manifest {
        Some(path) => load_manifest(path)?,
        None => builtin::remilias(),
    };
    Ok(resolve(manifest.tasks)?.select_tags(&selection.tags)?)
}

/// The in-memory ledger, plus the snapshot path to save to after a run.
fn open_ledger(
    config: &ProvisionConfig,
) -> Result<(Arc<InMemoryLedger>, Option<PathBuf>), ProvisionError> {
    match config.endpoint()? {
        Endpoint::Memory => Ok((Arc::new(InMemoryLedger::new()), None)),
        Endpoint::File(path) => {
            let ledger = if path.exists() {
                InMemoryLedger::open(&path)?
            } else {
                InMemoryLedger::new()
            };
            Ok((Arc::new(ledger), Some(path)))
        }
    }
}

fn print_json(rendered: Result<String, serde_json::Error>) {
    match rendered {
        Ok(json) => println!("{json}"),
        Err(err) => error!(error = %err, "failed to render JSON"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_tags() {
        let cli = Cli::try_parse_from([
            "provision",
            "--config",
            "provision.toml",
            "run",
            "--tags",
            "registry,resolver",
            "--parallelism",
            "2",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("provision.toml")));
        match cli.command {
            Command::Run {
                selection,
                parallelism,
            } => {
                assert_eq!(selection.tags, vec!["registry", "resolver"]);
                assert_eq!(parallelism, Some(2));
                assert!(!selection.json);
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn builtin_manifest_resolves() {
        let selection = Selection {
            manifest: None,
            tags: vec![],
            json: false,
        };
        let graph = load_graph(&selection).unwrap();
        assert_eq!(graph.len(), builtin::remilias().len());
    }

    #[test]
    fn file_endpoints_start_empty_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let mut config = ProvisionConfig::default();
        config.network.endpoint = format!("file:{}", path.display());

        let (_, snapshot) = open_ledger(&config).unwrap();
        assert_eq!(snapshot, Some(path));
    }
}
