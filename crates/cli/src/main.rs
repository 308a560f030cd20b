//! clipocr CLI
//!
//! Reads an image from the clipboard or a file, OCRs it at the original size
//! and at several rescaled sizes, and prints every attempt's text so the
//! best one can be picked by eye.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use core_pipeline::{
    ClipboardSource, EnsembleConfig, EnsembleRunner, FileSource, FsArtifactStore, ImageSource,
    ReportFormat, Reporter, ScaleCatalog, ScaleSpec, TesseractCli, TesseractConfig,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::Level;

#[allow(dead_code)]
mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\nbuild host: ",
    env!("BUILT_HOST"),
    "\nbuild time: ",
    env!("BUILT_TIME_UTC")
);

#[derive(Parser)]
#[command(name = "clipocr", version, long_version = LONG_VERSION)]
#[command(about = "OCR an image at several scales and print every result", long_about = None)]
struct Cli {
    /// Log verbosity on stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// OCR the image currently on the system clipboard
    Clipboard {
        #[command(flatten)]
        run: RunArgs,
    },

    /// OCR an image file
    File {
        /// Image to read (PNG, BMP, JPEG, ...)
        input: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Print the labels of the scale catalog in report order
    Catalog {
        #[command(flatten)]
        catalog: CatalogArgs,
    },
}

#[derive(Args)]
struct CatalogArgs {
    /// Scale spec to try, e.g. 3x2:bicubic (repeatable; replaces the built-in catalog)
    #[arg(long = "variant", value_name = "SXxSY:FILTER")]
    variants: Vec<ScaleSpec>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    catalog: CatalogArgs,

    /// Tesseract language
    #[arg(short, long)]
    lang: Option<String>,

    /// Tesseract executable
    #[arg(long, value_name = "PROGRAM")]
    tesseract: Option<String>,

    /// Tesseract page segmentation mode
    #[arg(long)]
    psm: Option<u8>,

    /// Resolution hint passed to Tesseract
    #[arg(long)]
    dpi: Option<u32>,

    /// Per-image OCR timeout in seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Maximum OCR processes running at once
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    jobs: Option<u64>,

    /// Save every OCR'd image and its text into DIR
    #[arg(long, value_name = "DIR")]
    save_artifacts: Option<PathBuf>,

    /// Output format: text or json
    #[arg(short, long, default_value = "text")]
    format: ReportFormat,
}

impl CatalogArgs {
    fn catalog(&self) -> Result<Option<ScaleCatalog>> {
        if self.variants.is_empty() {
            return Ok(None);
        }
        let catalog = ScaleCatalog::new(self.variants.clone()).context("Invalid --variant list")?;
        Ok(Some(catalog))
    }
}

impl RunArgs {
    fn tesseract_config(&self) -> Result<TesseractConfig> {
        let mut config =
            TesseractConfig::from_env().context("Invalid Tesseract environment configuration")?;
        if let Some(program) = &self.tesseract {
            config.program = program.clone();
        }
        if let Some(lang) = &self.lang {
            config.language = lang.clone();
        }
        if self.psm.is_some() {
            config.psm = self.psm;
        }
        if self.dpi.is_some() {
            config.dpi = self.dpi;
        }
        if let Some(secs) = self.timeout {
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    fn ensemble_config(&self) -> Result<EnsembleConfig> {
        let mut config =
            EnsembleConfig::from_env().context("Invalid ensemble environment configuration")?;
        if let Some(catalog) = self.catalog.catalog()? {
            config.catalog = catalog;
        }
        if let Some(jobs) = self.jobs {
            config.max_concurrency = usize::try_from(jobs).unwrap_or(usize::MAX);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    tracing::debug!(
        target = built_info::TARGET,
        rustc = built_info::RUSTC_VERSION,
        profile = built_info::PROFILE,
        "clipocr starting"
    );

    match cli.command {
        Commands::Clipboard { run } => run_ensemble(&ClipboardSource::new(), &run).await,
        Commands::File { input, run } => run_ensemble(&FileSource::new(input), &run).await,
        Commands::Catalog { catalog } => {
            let catalog = catalog.catalog()?.unwrap_or_default();
            for label in catalog.labels() {
                println!("{}", label);
            }
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    // stdout carries the report
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
}

async fn run_ensemble(source: &dyn ImageSource, args: &RunArgs) -> Result<()> {
    let engine = TesseractCli::new(args.tesseract_config()?);
    let mut runner = EnsembleRunner::new(Arc::new(engine), args.ensemble_config()?);

    if let Some(dir) = &args.save_artifacts {
        let store = FsArtifactStore::new(dir)
            .with_context(|| format!("Cannot use {} for artifacts", dir.display()))?;
        runner = runner.with_sink(Arc::new(store));
    }

    let report = runner
        .run_from(source)
        .await
        .with_context(|| format!("Failed to read an image from {}", source.describe()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    Reporter::new(args.format)
        .report(&report, &mut out)
        .context("Failed to write report")?;

    Ok(())
}
