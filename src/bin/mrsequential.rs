use std::path::Path;

use anyhow::{anyhow, Context, Result};
use clap::Parser;

use mapreduce_ft::mr::{codec, worker};
use mapreduce_ft::mrapps;

/// Runs an application over its inputs in a single process and writes
/// mr-out-0, the reference result for a distributed run.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Application to run (`wc` or `indexer`).
    #[arg(short, long, default_value = "wc")]
    app: String,

    #[arg(required = true)]
    files: Vec<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let app = mrapps::by_name(&args.app).ok_or_else(|| anyhow!("unknown app `{}`", args.app))?;

    let mut intermediate = vec![];
    for file in &args.files {
        let contents =
            std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file))?;
        intermediate.extend((app.map)(file, &contents));
    }
    intermediate.sort_by(|a, b| a.key.cmp(&b.key));

    let results = worker::collapse(&intermediate, app.reduce);
    codec::write_output(
        Path::new("."),
        0,
        results.iter().map(|(k, v)| (k.as_str(), v.as_str())),
    )?;
    Ok(())
}
