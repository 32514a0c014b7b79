use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ferrite_llie::{train_loop, Cli, RunConfig};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ferrite_llie=info")),
        )
        .init();

    let run = RunConfig::try_from(Cli::parse()).context("invalid configuration")?;
    let history = train_loop(&run)
        .with_context(|| format!("training `{}` failed", run.train.model_name))?;

    tracing::info!(
        best_psnr = history.best_psnr,
        epochs = history.reports.len(),
        run_dir = %run.run_dir().display(),
        "done"
    );
    Ok(())
}
