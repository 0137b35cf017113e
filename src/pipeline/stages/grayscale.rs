use crate::error::ScanError;
use image::{DynamicImage, GrayImage, Luma, RgbImage};

/// BT.601 luma weights in 14-bit fixed point (they sum to 1 << 14)
const R_WEIGHT: u32 = 4899;
const G_WEIGHT: u32 = 9617;
const B_WEIGHT: u32 = 1868;
const SHIFT: u32 = 14;

/// Convert a color image to single-channel luminance
pub fn apply(image: &DynamicImage) -> Result<DynamicImage, ScanError> {
    let rgb = image.as_rgb8().ok_or(ScanError::InvalidChannelLayout {
        expected: 3,
        found: image.color().channel_count(),
    })?;
    Ok(DynamicImage::ImageLuma8(luma(rgb)))
}

/// `image`'s own `to_luma8` uses Rec. 709 weights; scans are weighted with BT.601.
pub fn luma(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let weighted =
            r as u32 * R_WEIGHT + g as u32 * G_WEIGHT + b as u32 * B_WEIGHT + (1 << (SHIFT - 1));
        Luma([(weighted >> SHIFT) as u8])
    })
}
