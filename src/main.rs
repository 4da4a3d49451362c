// ABOUTME: CLI entry point for oplog-replicator
// ABOUTME: Parses flags into a ReplayConfig, sets up tracing and runs the replay daemon

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use oplog_replicator::config::{
    ConnectionConfig, Credentials, OplogNamespace, PipelineConfig, ReplayConfig, DEFAULT_OPLOG_NS,
};
use oplog_replicator::utils::host_to_uri;
use oplog_replicator::ReplayDaemon;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Command-line interface definition for oplog-replicator.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "oplog-replicator",
    version,
    about = "Replays a MongoDB oplog from one server onto another.",
    long_about = None
)]
struct Cli {
    /// Source server: host, host:port, setName/host1,host2 or a mongodb:// URI.
    #[arg(long = "from", value_name = "HOST", env = "OPLOG_REPLICATOR_FROM")]
    from: String,

    /// Destination server, same forms as --from.
    #[arg(long, value_name = "HOST", default_value = "localhost")]
    host: String,

    /// Destination port, for a --host without one.
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,

    /// Username for authentication on both servers.
    #[arg(short = 'u', long)]
    username: Option<String>,

    #[arg(short = 'p', long, env = "OPLOG_REPLICATOR_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Database holding the user's credentials.
    #[arg(long = "authentication-database", value_name = "DB")]
    authentication_database: Option<String>,

    /// Namespace of the source oplog.
    #[arg(long = "oplogns", value_name = "NS", default_value = DEFAULT_OPLOG_NS)]
    oplog_ns: String,

    /// Replay entries from the last N seconds.
    #[arg(short = 's', long, value_name = "N", default_value_t = 86_400)]
    seconds: u64,

    /// Maximum number of entries applied in one batch.
    #[arg(
        long = "batch-size",
        default_value_t = 10_000,
        value_parser = clap::value_parser!(u64).range(1..=100_000)
    )]
    batch_size: u64,

    /// Interval in milliseconds between timed flushes.
    #[arg(
        long = "flush-interval-ms",
        default_value_t = 5_000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    flush_interval_ms: u64,

    /// Seconds to wait for a new oplog entry before stopping.
    #[arg(
        long = "idle-wait-secs",
        default_value_t = 600,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    idle_wait_secs: u64,

    /// Tracing filter, e.g. `info` or `oplog_replicator=trace`.
    #[arg(long, value_name = "FILTER")]
    log: Option<String>,

    /// More detail: -v for debug, -vv for trace.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(long)]
    quiet: bool,
}

impl Cli {
    /// Filter used when `RUST_LOG` is not set.
    fn log_filter(&self) -> String {
        if let Some(filter) = &self.log {
            return filter.clone();
        }
        if self.quiet {
            return "warn".to_string();
        }
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
        .to_string()
    }

    fn credentials(&self) -> Result<Option<Credentials>> {
        match (&self.username, &self.password) {
            (Some(username), password) => Ok(Some(Credentials {
                username: username.clone(),
                password: password.clone(),
                source: self.authentication_database.clone(),
            })),
            (None, Some(_)) => Err(anyhow!("--password requires --username")),
            (None, None) => Ok(None),
        }
    }
}

impl TryFrom<Cli> for ReplayConfig {
    type Error = anyhow::Error;

    fn try_from(args: Cli) -> Result<Self> {
        let credentials = args.credentials()?;
        let oplog_ns = OplogNamespace::parse(&args.oplog_ns)?;

        let source_uri = host_to_uri(&args.from, None).context("invalid --from")?;
        let destination_uri = host_to_uri(&args.host, args.port).context("invalid --host")?;

        let config = ReplayConfig {
            source: ConnectionConfig::new(source_uri).with_credentials(credentials.clone()),
            destination: ConnectionConfig::new(destination_uri).with_credentials(credentials),
            oplog_ns,
            lookback: Duration::from_secs(args.seconds),
            pipeline: PipelineConfig {
                max_batch_size: args.batch_size as usize,
                flush_interval: Duration::from_millis(args.flush_interval_ms),
                idle_wait: Duration::from_secs(args.idle_wait_secs),
            },
        };
        config.validate()?;
        Ok(config)
    }
}

/// Initialize logging.
///
/// `RUST_LOG` wins when set; otherwise `--log`, then `-v`/`--quiet`.
fn init_tracing(fallback: &str) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("failed to init tracing subscriber: {err}"))
}

fn spawn_shutdown_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received shutdown signal");
                shutdown.cancel();
            }
            Err(e) => tracing::warn!("Failed to listen for Ctrl+C: {}", e),
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_filter())?;

    let config = ReplayConfig::try_from(cli)?;
    let shutdown = CancellationToken::new();
    spawn_shutdown_listener(shutdown.clone());

    let stats = ReplayDaemon::new(config)
        .run(shutdown)
        .await
        .context("oplog replay failed")?;

    match stats.last_applied {
        Some(ts) => tracing::info!(
            "Done: {} entries applied, last timestamp {}",
            stats.entries_applied,
            ts.time
        ),
        None => tracing::info!("Done: no oplog entries were applied"),
    }
    Ok(())
}
