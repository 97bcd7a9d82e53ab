use std::{fs, path::PathBuf, time::Duration};

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use serde_json::json;

use gas_bench::{
    bench::Options,
    chain::{spawn_anvil, RpcChain},
    deployable::compile,
    execute,
    report::render,
    Suite,
};

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to a JSON suite file, the built-in suite is used when absent
    #[arg(short, long)]
    suite: Option<PathBuf>,

    /// Path to the project root containing the `contracts` directory
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// JSON-RPC endpoint of the node to benchmark against
    #[arg(long, default_value = "http://127.0.0.1:8545")]
    rpc_url: String,

    /// Launch a local Anvil node and benchmark against it instead of `--rpc-url`
    #[arg(long)]
    spawn_anvil: bool,

    /// Path to write the Markdown report to
    #[arg(short, long, default_value = "benchmarks.md")]
    output: PathBuf,

    /// Path to a directory to also dump raw JSON results in
    #[arg(long)]
    json: Option<PathBuf>,

    /// Interval between polls for receipts and logs, in milliseconds
    #[arg(long, default_value_t = 50)]
    poll_interval_ms: u64,

    /// Seconds to wait for mint notifications before giving up, 0 waits forever
    #[arg(long, default_value_t = 120)]
    discovery_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    human_panic::setup_panic!();
    env_logger::init();

    let args = Args::parse();

    let start_time = Utc::now();

    let suite = match &args.suite {
        Some(path) => Suite::from_path(path)?,
        None => {
            log::info!("no suite given, using the built-in suite");
            Suite::default()
        }
    };
    let names: Vec<_> = suite.variants.iter().map(|v| v.name.clone()).collect();
    let artifacts = compile(&args.root, &names, &suite.compiler)?;

    let anvil = args.spawn_anvil.then(spawn_anvil).transpose()?;
    let rpc_url = anvil
        .as_ref()
        .map_or_else(|| args.rpc_url.clone(), |anvil| anvil.endpoint());
    let chain = RpcChain::connect(&rpc_url, Duration::from_millis(args.poll_interval_ms))?;

    let options = Options {
        discovery_timeout: (args.discovery_timeout_secs > 0)
            .then(|| Duration::from_secs(args.discovery_timeout_secs)),
    };
    let results = execute(&chain, &artifacts, &suite, &options)
        .await
        .map_err(|err| {
            log::error!("{err:#}");
            err
        })?;

    log::info!("completed benchmarks, writing to file...");
    let report = render(&suite, &results);
    fs::write(&args.output, &report).context(format!(
        "could not write to output file {}",
        args.output.to_string_lossy()
    ))?;
    println!("{report}");

    if let Some(json_dir) = &args.json {
        let output_file_path = json_dir.join(format!(
            "results.{}.json",
            start_time.format("%Y-%m-%dT%H-%M-%S%z")
        ));
        log::info!(
            "writing raw results to {}...",
            output_file_path.to_string_lossy()
        );
        let output = serde_json::to_string_pretty(&json!({
            "suite": suite,
            "results": results,
        }))?;
        fs::create_dir_all(json_dir).context("could not create output directory structure")?;
        fs::write(&output_file_path, output).context(format!(
            "could not write to output file {}",
            output_file_path.to_string_lossy()
        ))?;
    }

    Ok(())
}
