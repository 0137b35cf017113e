use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod codec;
mod config;
mod error;
mod pipeline;
mod processor;
mod server;
mod storage;

use codec::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "scanmaster-server")]
#[command(about = "Image enhancement server for the ScanMaster document scanner")]
#[command(version)]
pub struct Args {
    /// Host address to bind to
    #[arg(long, env = "SCAN_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "SCAN_PORT", default_value = "8080")]
    pub port: u16,

    /// Maximum upload size in bytes (default: 50MB)
    #[arg(long, env = "SCAN_MAX_FILE_SIZE", default_value = "52428800")]
    pub max_file_size: usize,

    /// Directory where raw uploads are staged
    #[arg(long, env = "SCAN_UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// Directory where processed stage outputs are written and served from
    #[arg(long, env = "SCAN_OUTPUT_DIR", default_value = "processed")]
    pub output_dir: PathBuf,

    /// Encoding used for processed outputs
    #[arg(long, env = "SCAN_OUTPUT_FORMAT", value_enum, default_value = "jpeg")]
    pub output_format: OutputFormat,

    /// JPEG quality (1-100), ignored for PNG output
    #[arg(long, env = "SCAN_JPEG_QUALITY", default_value = "95",
          value_parser = clap::value_parser!(u8).range(1..=100))]
    pub jpeg_quality: u8,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from(args);

    tracing::info!("Starting scanmaster-server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Binding to {}:{}", config.host, config.port);

    server::run(config).await
}
