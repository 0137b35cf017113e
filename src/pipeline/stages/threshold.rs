use super::blur::{convolve_separable, gaussian_kernel, Border};
use super::expect_luma8;
use crate::error::ScanError;
use crate::pipeline::Stage;
use image::{DynamicImage, GrayImage, Luma};

/// Side length of the neighborhood used for the local mean
const BLOCK_SIZE: usize = 11;
/// Subtracted from the local mean before comparing
const OFFSET: i32 = 2;
const MAX_VALUE: u8 = 255;

/// Binarize with a Gaussian-weighted local threshold
pub fn apply(image: &DynamicImage) -> Result<DynamicImage, ScanError> {
    let gray = expect_luma8(image, Stage::AdaptiveThreshold)?;
    Ok(DynamicImage::ImageLuma8(adaptive_gaussian_threshold(
        gray, BLOCK_SIZE, OFFSET,
    )))
}

/// A pixel turns white when it is brighter than its weighted
/// neighborhood mean minus `offset`, and black otherwise.
pub fn adaptive_gaussian_threshold(img: &GrayImage, block_size: usize, offset: i32) -> GrayImage {
    let kernel = gaussian_kernel(block_size, 0.0);
    let local_mean = convolve_separable(img, &kernel, Border::Replicate);

    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let pixel = img.get_pixel(x, y).0[0] as i32;
        let mean = local_mean.get_pixel(x, y).0[0] as i32;
        if pixel > mean - offset {
            Luma([MAX_VALUE])
        } else {
            Luma([0])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_binarizes_image() {
        let img = GrayImage::from_fn(50, 50, |x, y| Luma([((x * 5) ^ (y * 3)) as u8]));

        let result = apply(&DynamicImage::ImageLuma8(img)).unwrap();
        for pixel in result.as_luma8().unwrap().pixels() {
            assert!(
                pixel.0[0] == 0 || pixel.0[0] == 255,
                "Expected binary pixel, got {}",
                pixel.0[0]
            );
        }
    }

    #[test]
    fn test_threshold_handles_text_pattern() {
        // Dark text on light background
        let mut img = GrayImage::from_pixel(50, 20, Luma([240]));
        for x in 10..40 {
            img.put_pixel(x, 10, Luma([20]));
        }

        let result = apply(&DynamicImage::ImageLuma8(img)).unwrap();
        let result_gray = result.as_luma8().unwrap();

        // Text pixels should be black (0)
        assert_eq!(result_gray.get_pixel(25, 10).0[0], 0);
        // Background should be white (255)
        assert_eq!(result_gray.get_pixel(25, 5).0[0], 255);
        assert_eq!(result_gray.get_pixel(25, 9).0[0], 255);
    }

    #[test]
    fn test_flat_regions_turn_white() {
        let img = GrayImage::from_pixel(20, 20, Luma([90]));
        let result = adaptive_gaussian_threshold(&img, BLOCK_SIZE, OFFSET);
        assert!(result.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn test_offset_controls_sensitivity() {
        // A pixel 2 levels below its surroundings sits exactly on the threshold
        let mut img = GrayImage::from_pixel(21, 21, Luma([100]));
        img.put_pixel(10, 10, Luma([98]));

        let result = adaptive_gaussian_threshold(&img, BLOCK_SIZE, OFFSET);
        assert_eq!(result.get_pixel(10, 10).0[0], 0);

        let lenient = adaptive_gaussian_threshold(&img, BLOCK_SIZE, 3);
        assert_eq!(lenient.get_pixel(10, 10).0[0], 255);
    }
}
