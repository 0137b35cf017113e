//! Decoding of uploaded files and encoding of stage outputs.

use crate::error::ScanError;
use clap::ValueEnum;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, GenericImageView, ImageReader};
use serde::Serialize;
use std::path::Path;

/// Encoding used for processed outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// Decode an image file into a 3-channel 8-bit color raster.
///
/// The container format is sniffed from the file contents, so uploads with a
/// misleading extension still decode. Gray and alpha images are normalized to
/// RGB (alpha is dropped), the same way a color-mode load behaves.
pub fn decode_file(path: &Path) -> Result<DynamicImage, ScanError> {
    let reader = ImageReader::open(path)
        .map_err(|e| ScanError::DecodeError(format!("Failed to open upload: {}", e)))?
        .with_guessed_format()
        .map_err(|e| ScanError::DecodeError(format!("Failed to read upload: {}", e)))?;

    let image = reader
        .decode()
        .map_err(|e| ScanError::DecodeError(e.to_string()))?;

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(ScanError::DecodeError("image has no pixels".to_string()));
    }

    Ok(DynamicImage::ImageRgb8(image.into_rgb8()))
}

/// Encode a stage raster. Encoding is deterministic for a given raster and
/// settings, which keeps repeated outputs byte-identical.
pub fn encode(
    image: &DynamicImage,
    format: OutputFormat,
    jpeg_quality: u8,
) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            image.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, jpeg_quality))?
        }
        OutputFormat::Png => image.write_with_encoder(PngEncoder::new(&mut buf))?,
    }
    Ok(buf)
}
