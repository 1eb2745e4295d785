//! Keel poll trigger - registers image watches for poll-triggered deployments

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use keel_common::telemetry::{init_logging, LogFormat};
use keel_common::{LabelKeys, POLICY_LABEL_KEY, POLL_SCHEDULE_LABEL_KEY, TRIGGER_LABEL_KEY};
use keel_poll::{KubeClusterAccessor, PollConfig, PollManager, SubscriptionRegistry};

/// Keel poll trigger - keeps poll-triggered deployments registered for image checks
#[derive(Parser, Debug)]
#[command(name = "keel-operator", version, about, long_about = None)]
struct Cli {
    /// Log output format (text or json)
    #[arg(long, env = "KEEL_LOG_FORMAT", default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(flatten)]
    poll: PollArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan on an interval until interrupted (default mode)
    Run,
    /// Run a single scan and print the report as JSON
    ///
    /// Exits non-zero when namespaces cannot be enumerated.
    Scan,
}

#[derive(Args, Debug)]
struct PollArgs {
    /// Interval between deployment scans
    #[arg(
        long,
        env = "KEEL_SCAN_INTERVAL",
        default_value = "55s",
        value_parser = humantime::parse_duration
    )]
    scan_interval: Duration,

    /// Upper bound on a single scan
    #[arg(
        long,
        env = "KEEL_SCAN_TIMEOUT",
        default_value = "50s",
        value_parser = humantime::parse_duration
    )]
    scan_timeout: Duration,

    /// Poll schedule for deployments without a schedule label
    #[arg(long, env = "KEEL_DEFAULT_SCHEDULE", default_value = keel_common::DEFAULT_POLL_SCHEDULE)]
    default_schedule: String,

    /// Label key holding the update policy
    #[arg(long, env = "KEEL_POLICY_LABEL", default_value = POLICY_LABEL_KEY)]
    policy_label: String,

    /// Label key holding the trigger type
    #[arg(long, env = "KEEL_TRIGGER_LABEL", default_value = TRIGGER_LABEL_KEY)]
    trigger_label: String,

    /// Label key holding the poll schedule override
    #[arg(long, env = "KEEL_SCHEDULE_LABEL", default_value = POLL_SCHEDULE_LABEL_KEY)]
    schedule_label: String,

    /// Exit when the first scan cannot enumerate namespaces
    #[arg(long, env = "KEEL_FAIL_ON_INITIAL_SCAN_ERROR")]
    fail_on_initial_scan_error: bool,
}

impl From<PollArgs> for PollConfig {
    fn from(args: PollArgs) -> Self {
        PollConfig {
            scan_interval: args.scan_interval,
            scan_timeout: args.scan_timeout,
            default_schedule: args.default_schedule,
            labels: LabelKeys {
                policy: args.policy_label,
                trigger: args.trigger_label,
                poll_schedule: args.schedule_label,
            },
            fail_on_initial_scan_error: args.fail_on_initial_scan_error,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_format)?;

    let config = PollConfig::from(cli.poll);
    config.validate()?;

    let accessor = KubeClusterAccessor::infer()
        .await
        .map_err(|e| anyhow::anyhow!("failed to create kubernetes client: {}", e))?;
    let registry = Arc::new(SubscriptionRegistry::new());
    let manager = PollManager::new(Arc::new(accessor), registry.clone(), config);
    debug!(config = ?manager.config(), "poll manager configured");

    match cli.command {
        Some(Commands::Run) | None => run(manager, registry).await,
        Some(Commands::Scan) => scan_once(manager, registry).await,
    }
}

async fn run(manager: PollManager, registry: Arc<SubscriptionRegistry>) -> anyhow::Result<()> {
    let token = CancellationToken::new();
    tokio::spawn(shutdown_signal(token.clone()));

    manager.start(token).await?;

    info!(subscriptions = registry.len(), "shutdown complete");
    Ok(())
}

async fn scan_once(
    manager: PollManager,
    registry: Arc<SubscriptionRegistry>,
) -> anyhow::Result<()> {
    let report = manager.scan(&CancellationToken::new()).await?;

    let output = serde_json::json!({
        "report": report,
        "subscriptions": registry.subscriptions(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Cancel `token` on ctrl-c or SIGTERM
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
    token.cancel();
}
