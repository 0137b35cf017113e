use super::expect_luma8;
use crate::error::ScanError;
use crate::pipeline::Stage;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::stats::histogram;

/// Global histogram equalization for contrast
pub fn apply(image: &DynamicImage) -> Result<DynamicImage, ScanError> {
    let gray = expect_luma8(image, Stage::Equalized)?;
    Ok(DynamicImage::ImageLuma8(equalize_histogram(gray)))
}

/// Remap intensities through the normalized cumulative histogram.
///
/// The darkest occupied level maps to 0 and the brightest to 255. A uniform
/// image is returned unchanged.
pub fn equalize_histogram(img: &GrayImage) -> GrayImage {
    let total = img.width() as u64 * img.height() as u64;
    if total == 0 {
        return img.clone();
    }

    let hist = histogram(img).channels[0];
    let first = hist.iter().position(|&count| count > 0).unwrap_or(0);
    if hist[first] as u64 == total {
        return img.clone();
    }

    let scale = 255.0 / (total - hist[first] as u64) as f64;
    let mut lut = [0u8; 256];
    let mut sum = 0u64;
    for level in first + 1..256 {
        sum += hist[level] as u64;
        lut[level] = (sum as f64 * scale).round().clamp(0.0, 255.0) as u8;
    }

    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        Luma([lut[img.get_pixel(x, y).0[0] as usize]])
    })
}
