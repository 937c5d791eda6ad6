use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use simplelog::{Config, LevelFilter, WriteLogger};

use inkgrade::panic_handler;
use inkgrade::score::{JsonFileSink, VerdictSink};
use inkgrade::script::{self, Script};
use inkgrade::settings;

#[derive(Parser, Debug)]
#[command(
    name = "inkgrade",
    version,
    about = "Replay a grading session on a scanned answer sheet"
)]
struct Cli {
    /// Session script (YAML)
    script: PathBuf,

    /// Settings file; defaults to the platform config directory
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the sheet service base URL
    #[arg(long)]
    server: Option<String>,

    /// Write the composited final page as PNG
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write the verdict handoff as JSON
    #[arg(long)]
    verdict_out: Option<PathBuf>,

    #[arg(long, default_value = "inkgrade.log")]
    log_file: PathBuf,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    WriteLogger::init(level, Config::default(), File::create(&cli.log_file)?)?;
    panic_handler::initialize_panic_handler();

    info!("Starting inkgrade {}", env!("CARGO_PKG_VERSION"));

    match &cli.config {
        Some(path) => settings::load_settings_from_path(path),
        None => settings::load_settings(),
    }
    if let Some(url) = &cli.server {
        settings::set_server_url(url);
    }

    let result = run(&cli);
    if let Err(e) = &result {
        error!("Session failed: {e:?}");
    }
    info!("Shutting down inkgrade");
    result
}

fn run(cli: &Cli) -> Result<()> {
    let script = Script::load(&cli.script)?;
    let base_dir = cli.script.parent().unwrap_or(Path::new("."));
    let report = script::run(&script, settings::current(), base_dir)?;

    println!(
        "page {}/{} (visited {})",
        report.page, report.total_pages, report.visited_count
    );
    println!("annotations: {}", report.annotation_count);
    if report.discarded_gestures > 0 {
        println!("discarded gestures: {}", report.discarded_gestures);
    }
    for (page, total) in &report.page_totals {
        println!("page {page} total: {total}");
    }
    println!("total: {}", report.total);
    for question in &report.over_awarded {
        println!("over-awarded: {question}");
    }
    for notice in &report.notices {
        println!("notice: {notice}");
    }

    if let Some(out) = &cli.out {
        match &report.png {
            Some(png) => {
                fs::write(out, png).with_context(|| format!("writing {}", out.display()))?;
                info!("Wrote composited page to {}", out.display());
            }
            None => println!("no composited page to write"),
        }
    }

    if let Some(handoff) = &report.handoff {
        println!("{}", serde_json::to_string_pretty(handoff)?);
        if let Some(path) = &cli.verdict_out {
            JsonFileSink::new(path).deliver(handoff)?;
        }
    }

    Ok(())
}
