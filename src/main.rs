use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};
use rfcapture::server::{self, ChromeBackend};
use rfcapture::{CaptureConfig, CaptureMode, CaptureSource, Capturer, LoadStrategy, SourceKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "rfcapture", version, about = "Capture view-only PDFs from web viewers")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture one document and write it to disk
    Capture {
        /// URL of the document or of its viewer page
        url: String,
        /// Output file
        #[arg(short, long, default_value = "download.pdf")]
        output: PathBuf,
        #[arg(long, value_enum, default_value_t = ModeArg::Automatic)]
        mode: ModeArg,
        /// Override the page-image detection strategy of the mode
        #[arg(long, value_enum)]
        source: Option<SourceArg>,
        #[arg(long, value_enum, default_value_t = StrategyArg::Auto)]
        strategy: StrategyArg,
        /// Integer upsampling factor, 1-4
        #[arg(long)]
        scale: Option<u32>,
        /// JPEG quality, 1-100
        #[arg(long)]
        quality: Option<u8>,
        /// Milliseconds to wait for the page to load
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(long, default_value = "127.0.0.1:3000")]
        addr: String,
        /// Maximum concurrent captures (defaults to the CPU count)
        #[arg(long)]
        workers: Option<usize>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Automatic,
    Manual,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Structural,
    BlobScan,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    Auto,
    Scroll,
    Paginate,
}

impl From<ModeArg> for CaptureMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Automatic => CaptureMode::Automatic,
            ModeArg::Manual => CaptureMode::Manual,
        }
    }
}

impl From<SourceArg> for SourceKind {
    fn from(s: SourceArg) -> Self {
        match s {
            SourceArg::Structural => SourceKind::Structural,
            SourceArg::BlobScan => SourceKind::BlobScan,
        }
    }
}

impl From<StrategyArg> for LoadStrategy {
    fn from(s: StrategyArg) -> Self {
        match s {
            StrategyArg::Auto => LoadStrategy::Auto,
            StrategyArg::Scroll => LoadStrategy::Scroll,
            StrategyArg::Paginate => LoadStrategy::Paginate,
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Capture {
            url,
            output,
            mode,
            source,
            strategy,
            scale,
            quality,
            timeout_ms,
        } => {
            let base = CaptureConfig::for_mode(mode.into());
            let config = CaptureConfig {
                source: source.map(Into::into).unwrap_or(base.source),
                load_strategy: strategy.into(),
                scale: scale.unwrap_or(base.scale),
                jpeg_quality: quality.unwrap_or(base.jpeg_quality),
                navigation_timeout_ms: timeout_ms.unwrap_or(base.navigation_timeout_ms),
                ..base
            };
            run_capture(&url, &output, config).await
        }
        Command::Serve { addr, workers } => {
            let workers = workers.unwrap_or_else(server::default_workers);
            let backend = Arc::new(ChromeBackend::default());
            tokio::task::spawn_blocking(move || server::serve(&addr, backend, workers))
                .await
                .unwrap_or_else(|e| Err(rfcapture::Error::Other(format!("Server task failed: {}", e))))
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        if let Some(hint) = e.hint() {
            error!("{}", hint);
        }
        std::process::exit(1);
    }
}

async fn run_capture(url: &str, output: &Path, config: CaptureConfig) -> rfcapture::Result<()> {
    let capturer = Capturer::new(config)?;
    let outcome = capturer.capture(url).await?;
    std::fs::write(output, &outcome.bytes)
        .map_err(|e| rfcapture::Error::Other(format!("Failed to write {}: {}", output.display(), e)))?;

    match outcome.source {
        CaptureSource::Direct => info!("Downloaded {} directly to {}", url, output.display()),
        CaptureSource::Rendered { pages } => {
            info!("Captured {} pages from {} to {}", pages, url, output.display())
        }
    }
    Ok(())
}
