use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mapreduce_ft::mr::config::{CoordinatorConfig, DEFAULT_TASK_TIMEOUT};
use mapreduce_ft::mr::coordinator::MRCoordinator;
use mapreduce_ft::util::net::Endpoint;

#[derive(Parser, Debug)]
#[command(version, about = "Hands out map and reduce tasks to mrworker processes")]
struct Args {
    /// Input files, one map task each.
    #[arg(required = true)]
    files: Vec<String>,

    /// Number of reduce buckets.
    #[arg(short = 'r', long, default_value_t = 10)]
    reducers: u32,

    /// `unix:<path>` or `host:port`. Defaults to a per-user socket in /var/tmp.
    #[arg(short, long)]
    endpoint: Option<Endpoint>,

    /// Milliseconds before an unreported task is handed to another worker.
    #[arg(long, default_value_t = DEFAULT_TASK_TIMEOUT.as_millis() as u64)]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config = CoordinatorConfig {
        endpoint: args.endpoint.unwrap_or_default(),
        task_timeout: Duration::from_millis(args.timeout_ms),
        ..Default::default()
    };

    let coordinator = MRCoordinator::new(args.files, args.reducers, &config)?;
    coordinator.run(config).await
}
