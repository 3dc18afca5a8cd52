use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mapreduce_ft::mr::config::WorkerConfig;
use mapreduce_ft::mr::worker;
use mapreduce_ft::mrapps;
use mapreduce_ft::util::net::Endpoint;

#[derive(Parser, Debug)]
#[command(version, about = "Runs map and reduce tasks until the coordinator says the job is done")]
struct Args {
    /// Application to run (`wc` or `indexer`).
    #[arg(short, long, default_value = "wc")]
    app: String,

    /// `unix:<path>` or `host:port`. Defaults to a per-user socket in /var/tmp.
    #[arg(short, long)]
    endpoint: Option<Endpoint>,

    /// Directory for intermediate and output files.
    #[arg(short, long, default_value = ".")]
    work_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let app = mrapps::by_name(&args.app).ok_or_else(|| anyhow!("unknown app `{}`", args.app))?;
    let config = WorkerConfig {
        endpoint: args.endpoint.unwrap_or_default(),
        work_dir: args.work_dir,
        ..Default::default()
    };

    worker::start_worker(&config, app).await?;
    Ok(())
}
