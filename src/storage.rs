//! On-disk storage for staged uploads and processed outputs.
//!
//! Every file a request produces is prefixed with its request id, so
//! concurrent requests never overwrite each other. Files are written to a
//! temporary name and renamed into place, so a fetch never sees a partial file.

use crate::codec::{self, OutputFormat};
use crate::config::Config;
use crate::error::ScanError;
use crate::pipeline::{Stage, StageSink};
use image::DynamicImage;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Upload and output directories plus output encoding settings
#[derive(Debug, Clone)]
pub struct OutputStore {
    upload_dir: PathBuf,
    output_dir: PathBuf,
    format: OutputFormat,
    jpeg_quality: u8,
}

impl OutputStore {
    /// Create the store, making both directories if they are missing
    pub fn new(config: &Config) -> Result<Self, ScanError> {
        for dir in [&config.upload_dir, &config.output_dir] {
            std::fs::create_dir_all(dir).map_err(|e| {
                ScanError::Internal(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }

        Ok(Self {
            upload_dir: config.upload_dir.clone(),
            output_dir: config.output_dir.clone(),
            format: config.output_format,
            jpeg_quality: config.jpeg_quality,
        })
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// A fresh random id used to namespace one request's files
    pub fn new_request_id() -> String {
        format!("{:016x}", fastrand::u64(..))
    }

    /// Write the raw upload into the staging directory
    pub fn save_upload(
        &self,
        request_id: &str,
        original_name: &str,
        data: &[u8],
    ) -> Result<PathBuf, ScanError> {
        let path = self
            .upload_dir
            .join(format!("{}_{}", request_id, sanitize_filename(original_name)));

        write_atomic(&self.upload_dir, &path, data)
            .map_err(|e| ScanError::StorageWriteError(e.to_string()))?;
        Ok(path)
    }

    /// Sink that persists one request's stage outputs
    pub fn writer(&self, request_id: &str) -> RequestWriter<'_> {
        RequestWriter {
            store: self,
            request_id: request_id.to_string(),
            written: Vec::new(),
        }
    }

    /// Map a requested filename to its path in the output directory.
    ///
    /// Anything that could escape the directory or name a temporary file is
    /// treated as missing.
    pub fn resolve(&self, filename: &str) -> Result<PathBuf, ScanError> {
        if !is_servable_name(filename) {
            return Err(ScanError::NotFound);
        }
        Ok(self.output_dir.join(filename))
    }

    pub fn content_type_for(filename: &str) -> &'static str {
        match Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("jpg") | Some("jpeg") => OutputFormat::Jpeg.content_type(),
            Some("png") => OutputFormat::Png.content_type(),
            _ => "application/octet-stream",
        }
    }
}

/// Persists stage outputs for one request and remembers what it wrote
pub struct RequestWriter<'a> {
    store: &'a OutputStore,
    request_id: String,
    written: Vec<PathBuf>,
}

impl RequestWriter<'_> {
    /// Remove every output written so far
    pub fn discard(self) {
        for path in &self.written {
            if let Err(e) = std::fs::remove_file(path) {
                tracing::warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }
}

impl StageSink for RequestWriter<'_> {
    fn persist(&mut self, stage: Stage, image: &DynamicImage) -> Result<String, ScanError> {
        let encode_error = |message: String| ScanError::EncodeError {
            stage: stage.name(),
            message,
        };

        let bytes = codec::encode(image, self.store.format, self.store.jpeg_quality)
            .map_err(|e| encode_error(e.to_string()))?;

        let filename = format!(
            "{}_{}.{}",
            self.request_id,
            stage.name(),
            self.store.format.extension()
        );
        let path = self.store.output_dir.join(&filename);
        write_atomic(&self.store.output_dir, &path, &bytes)
            .map_err(|e| encode_error(e.to_string()))?;

        tracing::info!("Processed image saved: {}", path.display());
        self.written.push(path);
        Ok(filename)
    }
}

fn write_atomic(dir: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut temp_file = tempfile::Builder::new().prefix(".tmp-").tempfile_in(dir)?;
    temp_file.write_all(data)?;
    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn is_servable_name(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.starts_with('.')
        && filename
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Keep only the final path component and replace anything unusual
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
