use super::clahe::Clahe;
use super::lab;
use crate::error::ScanError;
use crate::pipeline::Stage;
use image::DynamicImage;

const CLIP_LIMIT: f32 = 3.0;
const TILE_GRID: (u32, u32) = (8, 8);

/// Boost local contrast on lightness only, leaving color untouched.
///
/// Converts to L*a*b*, runs CLAHE over L and converts back.
pub fn apply(image: &DynamicImage) -> Result<DynamicImage, ScanError> {
    let rgb = image.as_rgb8().ok_or(ScanError::InvalidChannelLayout {
        expected: 3,
        found: image.color().channel_count(),
    })?;

    let [lightness, a, b] = lab::split_lab(rgb);
    let lightness = Clahe::new(CLIP_LIMIT, TILE_GRID).apply(&lightness);

    let enhanced = lab::merge_lab(&lightness, &a, &b).ok_or_else(|| ScanError::StageError {
        stage: Stage::Enhanced.name(),
        message: "channel planes differ in size".to_string(),
    })?;
    Ok(DynamicImage::ImageRgb8(enhanced))
}
