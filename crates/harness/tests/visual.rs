//! Visual regression harness entry point
//!
//! This binary builds the site map once (setup phase), then runs one
//! case per (URL x viewport) against stored baselines.
//! Run with: cargo test --package sitelens-harness --test visual

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sitelens_core::SuiteConfig;
use sitelens_harness::playwright::Browser;
use sitelens_harness::{HarnessResult, SuiteRunner};

#[derive(Parser, Debug)]
#[command(name = "sitelens")]
#[command(about = "Visual regression suite for marketing sites")]
struct Args {
    /// Path to the suite configuration file
    #[arg(short, long, default_value = "visual.yaml")]
    config: PathBuf,

    /// Override the target origin (BASE_URL is honored too)
    #[arg(long)]
    base_url: Option<String>,

    /// Store captures as new baselines instead of comparing
    #[arg(long)]
    update_baselines: bool,

    /// Skip the site map setup phase
    #[arg(long)]
    skip_setup: bool,

    /// Browser to use (chromium, firefox, webkit)
    #[arg(long, default_value = "chromium")]
    browser: String,

    /// Run headed instead of headless
    #[arg(long)]
    headed: bool,

    /// Override the worker count
    #[arg(long)]
    workers: Option<usize>,

    /// Override the results directory
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("info".parse().expect("valid directive")),
        )
        .init();

    let args = Args::parse();

    let rt = tokio::runtime::Runtime::new().expect("Failed to create tokio runtime");
    match rt.block_on(async_main(args)) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    }
}

async fn async_main(args: Args) -> HarnessResult<bool> {
    let mut config = SuiteConfig::load(&args.config)?;
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(output) = args.output {
        config.results_dir = output;
    }

    let runner = SuiteRunner::new(
        config,
        Browser::parse(&args.browser),
        !args.headed,
        args.update_baselines,
    );

    if !args.skip_setup {
        runner.setup().await?;
    }

    let results = runner.run().await?;
    runner.write_results(&results)?;

    Ok(results.failed == 0)
}
