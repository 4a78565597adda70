// ==============================================================================
// main.rs - Hopla Entry Point
// ==============================================================================
// Description: Command line front-end for the family variant prefilter
// Created: 2026-10-03
// Modified: 2026-10-13
// Version: 2.0.0
// ==============================================================================

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hopla::output::{OutputFormat, OutputGenerator};
use hopla::processor::{HoplaProcessor, DEFAULT_MAX_ERRORS};
use hopla::settings::Settings;
use hopla::validator::require_file;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings document (YAML)
    #[arg(short, long, env = "HOPLA_SETTINGS")]
    settings: PathBuf,

    /// UCSC cytoband table used to annotate retained variants
    #[arg(short, long)]
    cytoband: Option<PathBuf>,

    /// Report path; without it only a summary is logged
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Report format (json or vcf)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Malformed records tolerated before the run is aborted
    #[arg(long, default_value_t = DEFAULT_MAX_ERRORS)]
    max_errors: usize,

    /// Input VCF (plain, gzip or bgzip)
    vcf: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("hopla={}", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Hopla {} starting...", env!("CARGO_PKG_VERSION"));

    // Required inputs must exist before anything is streamed
    require_file(&args.settings, "Settings")?;
    require_file(&args.vcf, "VCF")?;
    if let Some(cytoband) = &args.cytoband {
        require_file(cytoband, "Cytoband")?;
    }

    let settings = Settings::load(&args.settings).context("Failed to load settings")?;

    let processor = HoplaProcessor::new(settings, args.vcf.clone(), args.cytoband.clone())
        .with_max_errors(args.max_errors);
    let result = processor.process()?;

    match &args.output {
        Some(path) => {
            let written = OutputGenerator::new(&result, processor.settings())
                .generate(path, args.format)?;
            info!("Report written to {:?}", written);
        }
        None => {
            info!(
                "{} variants retained from {} records ({} dropped)",
                result.variants.len(),
                result.stats.records_seen,
                result.stats.records_dropped()
            );
        }
    }

    Ok(())
}
