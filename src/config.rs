use crate::codec::OutputFormat;
use crate::Args;
use std::path::PathBuf;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_file_size: usize,
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    pub output_format: OutputFormat,
    pub jpeg_quality: u8,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            max_file_size: args.max_file_size,
            upload_dir: args.upload_dir,
            output_dir: args.output_dir,
            output_format: args.output_format,
            jpeg_quality: args.jpeg_quality,
        }
    }
}
