//! Individual pipeline stages

pub mod blur;
pub mod clahe;
pub mod enhance;
pub mod equalize;
pub mod grayscale;
pub mod lab;
pub mod threshold;

use super::Stage;
use crate::error::ScanError;
use image::{DynamicImage, GrayImage};

/// Borrow a single-channel input or report which stage received the wrong layout
pub(crate) fn expect_luma8(image: &DynamicImage, stage: Stage) -> Result<&GrayImage, ScanError> {
    image.as_luma8().ok_or_else(|| ScanError::StageError {
        stage: stage.name(),
        message: format!("expected a single-channel image, got {:?}", image.color()),
    })
}
