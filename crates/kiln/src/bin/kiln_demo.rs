//! KILN demo binary
//!
//! Runs the render pool headless with the gradient renderer and prints a
//! checksum of the final frame.
//!
//! Run with: `kiln_demo [--config kiln.toml] [--frames N] [--threads N]`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kiln::demo::{ChecksumPresenter, GradientRenderer};
use kiln::{EngineConfig, RenderPool};

#[derive(Parser)]
#[command(name = "kiln_demo")]
#[command(about = "Render frames across a shared-buffer thread pool")]
#[command(version)]
struct Cli {
    /// Engine configuration (TOML); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Frames to render
    #[arg(short, long, default_value_t = 120)]
    frames: u64,

    /// Override `threads.count`
    #[arg(short, long)]
    threads: Option<u32>,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(threads) = cli.threads {
        config.threads.count = threads;
    }

    if cli.print_config {
        print!("{}", config.to_toml_string()?);
        return Ok(());
    }

    let mut pool = RenderPool::spawn(&config, |_| GradientRenderer::new())
        .context("starting render pool")?;
    let mut presenter = ChecksumPresenter::new();

    for _ in 0..cli.frames {
        pool.render_and_present(&mut presenter);
    }

    let stats = pool.stats().clone();
    let reports = pool.shutdown().context("stopping render pool")?;

    info!(%stats, "done");
    for report in &reports {
        info!(
            thread = report.index,
            frames = report.frames,
            heap_used = report.heap.used_bytes,
            heap_free = report.heap.free_bytes,
            "thread report"
        );
    }
    println!("{stats}");
    println!("checksum {:#018x}", presenter.last_checksum());
    Ok(())
}
