use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;
use colored::Colorize;

use rppg_ptt::config::{load_config, save_config, Config, ExtractionMethod, RenderMode};
use rppg_ptt::local::{run, RunOptions};
use rppg_ptt::CenterPoint;

#[derive(Parser, Debug)]
#[command(name = "rppg-ptt", version, about = "Heart rate and pulse transit time maps from skin video")]
struct Cli {
    /// Input video
    video_path: PathBuf,

    /// Segmentation mask (.npy or image); selected and saved here if missing
    mask_path: PathBuf,

    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    mode: Option<RenderMode>,

    /// Pulse extraction method
    #[arg(long, value_enum)]
    method: Option<ExtractionMethod>,

    /// Center point as ROW,COL
    #[arg(long, value_parser = parse_center)]
    center: Option<CenterPoint>,

    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Worker threads (0 = all cores)
    #[arg(long)]
    threads: Option<usize>,

    /// Write the effective configuration to this path before running
    #[arg(long)]
    write_config: Option<PathBuf>,

    /// Log at debug level (same as `processor.verbose`)
    #[arg(short, long)]
    verbose: bool,
}

fn parse_center(s: &str) -> Result<CenterPoint, String> {
    let (row, col) = s
        .split_once(',')
        .ok_or_else(|| format!("expected ROW,COL, got '{}'", s))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<usize>()
            .map_err(|e| format!("invalid coordinate '{}': {}", v, e))
    };
    Ok((parse(row)?, parse(col)?))
}

fn effective_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => load_config(path).with_context(|| format!("loading {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(mode) = cli.mode {
        config.render.mode = mode;
    }
    if let Some(method) = cli.method {
        config.extraction.method = method;
    }
    if let Some(dir) = &cli.out_dir {
        config.output.dir = dir.clone();
    }
    if let Some(threads) = cli.threads {
        config.processor.threads = threads;
    }
    config.processor.verbose |= cli.verbose;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = effective_config(&cli)?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.processor.log_filter())).init();
    if let Some(path) = &cli.write_config {
        save_config(&config, path).with_context(|| format!("writing {}", path.display()))?;
    }
    if !cli.video_path.exists() {
        bail!("video not found: {}", cli.video_path.display());
    }

    let summary = run(RunOptions {
        video_path: cli.video_path.clone(),
        mask_path: cli.mask_path.clone(),
        center: cli.center,
        config,
    })
    .with_context(|| format!("processing {}", cli.video_path.display()))?;

    println!("{}", "Run complete".green().bold());
    println!("{}", summary.report());
    Ok(())
}

fn main() -> ExitCode {
    match execute(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}
