//! Gaussian smoothing and the separable convolution it is built on.
//!
//! The adaptive threshold stage reuses [`gaussian_kernel`] and
//! [`convolve_separable`] to compute its weighted local mean.

use super::expect_luma8;
use crate::error::ScanError;
use crate::pipeline::Stage;
use image::{DynamicImage, GrayImage, Luma};

/// Side length of the square blur kernel
pub const KERNEL_SIZE: usize = 5;

/// Precomputed kernels used when sigma is derived from a small odd size
const SMALL_KERNELS: [&[f32]; 4] = [
    &[1.0],
    &[0.25, 0.5, 0.25],
    &[0.0625, 0.25, 0.375, 0.25, 0.0625],
    &[0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125],
];

/// How samples outside the image are synthesized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Border {
    /// Mirror without repeating the edge pixel: `gfedcb|abcdefgh|gfedcba`
    Reflect101,
    /// Repeat the edge pixel: `aaaaaa|abcdefgh|hhhhhhh`
    Replicate,
}

impl Border {
    /// Map a possibly out-of-range coordinate onto `0..len`
    pub fn index(self, i: i64, len: usize) -> usize {
        let len = len as i64;
        if len == 1 {
            return 0;
        }
        match self {
            Border::Replicate => i.clamp(0, len - 1) as usize,
            Border::Reflect101 => {
                let mut i = i;
                while i < 0 || i >= len {
                    i = if i < 0 { -i } else { 2 * len - 2 - i };
                }
                i as usize
            }
        }
    }
}

/// Apply a 5x5 Gaussian blur with a size-derived sigma
pub fn apply(image: &DynamicImage) -> Result<DynamicImage, ScanError> {
    let gray = expect_luma8(image, Stage::Blurred)?;
    let kernel = gaussian_kernel(KERNEL_SIZE, 0.0);
    Ok(DynamicImage::ImageLuma8(convolve_separable(
        gray,
        &kernel,
        Border::Reflect101,
    )))
}

/// Build a normalized 1-D Gaussian kernel of odd length `size`.
///
/// A non-positive `sigma` is derived from the size as
/// `0.3 * ((size - 1) / 2 - 1) + 0.8`, with fixed binomial kernels for sizes up to 7.
pub fn gaussian_kernel(size: usize, sigma: f32) -> Vec<f32> {
    if sigma <= 0.0 && size % 2 == 1 && size <= 7 {
        return SMALL_KERNELS[size / 2].to_vec();
    }

    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let center = (size as f32 - 1.0) / 2.0;
    let scale = -0.5 / (sigma * sigma);

    let mut kernel: Vec<f32> = (0..size)
        .map(|i| {
            let x = i as f32 - center;
            (scale * x * x).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|k| *k /= sum);
    kernel
}

/// Convolve with `kernel` horizontally, then vertically.
///
/// Accumulates in `f32` across both passes and rounds once at the end.
pub fn convolve_separable(img: &GrayImage, kernel: &[f32], border: Border) -> GrayImage {
    let (width, height) = (img.width() as usize, img.height() as usize);
    if width == 0 || height == 0 {
        return img.clone();
    }
    let radius = (kernel.len() / 2) as i64;
    let src = img.as_raw();

    let mut horizontal = vec![0.0f32; width * height];
    for y in 0..height {
        let row = &src[y * width..(y + 1) * width];
        for x in 0..width {
            horizontal[y * width + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, weight)| {
                    let sx = border.index(x as i64 + k as i64 - radius, width);
                    row[sx] as f32 * weight
                })
                .sum();
        }
    }

    GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let value: f32 = kernel
            .iter()
            .enumerate()
            .map(|(k, weight)| {
                let sy = border.index(y as i64 + k as i64 - radius, height);
                horizontal[sy * width + x as usize] * weight
            })
            .sum();
        Luma([value.round().clamp(0.0, 255.0) as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A test image with a sharp black-to-white boundary at x=5.
    fn sharp_edge_image() -> GrayImage {
        GrayImage::from_fn(10, 10, |x, _| if x < 5 { Luma([0]) } else { Luma([255]) })
    }

    #[test]
    fn test_small_kernel_is_binomial() {
        assert_eq!(
            gaussian_kernel(5, 0.0),
            vec![0.0625, 0.25, 0.375, 0.25, 0.0625]
        );
    }

    #[test]
    fn test_derived_sigma_kernel_is_normalized_and_symmetric() {
        let kernel = gaussian_kernel(11, 0.0);
        assert_eq!(kernel.len(), 11);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        for i in 0..5 {
            assert!((kernel[i] - kernel[10 - i]).abs() < 1e-7);
            assert!(kernel[i] < kernel[i + 1]);
        }
    }

    #[test]
    fn test_border_index() {
        assert_eq!(Border::Reflect101.index(-1, 5), 1);
        assert_eq!(Border::Reflect101.index(-2, 5), 2);
        assert_eq!(Border::Reflect101.index(5, 5), 3);
        assert_eq!(Border::Reflect101.index(7, 3), 1);
        assert_eq!(Border::Replicate.index(-4, 5), 0);
        assert_eq!(Border::Replicate.index(9, 5), 4);
        assert_eq!(Border::Reflect101.index(-3, 1), 0);
    }

    #[test]
    fn test_blur_keeps_uniform_image() {
        let img = GrayImage::from_pixel(12, 9, Luma([137]));
        let result = apply(&DynamicImage::ImageLuma8(img.clone())).unwrap();
        assert_eq!(result.as_luma8().unwrap(), &img);
    }

    #[test]
    fn test_blur_smooths_sharp_edge() {
        let result = apply(&DynamicImage::ImageLuma8(sharp_edge_image())).unwrap();
        let blurred = result.as_luma8().unwrap();

        let left_of_edge = blurred.get_pixel(4, 5).0[0];
        let right_of_edge = blurred.get_pixel(5, 5).0[0];
        assert!(left_of_edge > 0);
        assert!(right_of_edge < 255);
        // 0*(1+4+6)/16 + 255*(4+1)/16
        assert_eq!(left_of_edge, 80);
        // Far from the edge nothing changes
        assert_eq!(blurred.get_pixel(0, 5).0[0], 0);
        assert_eq!(blurred.get_pixel(9, 5).0[0], 255);
    }

    #[test]
    fn test_blur_preserves_dimensions() {
        let img = GrayImage::new(17, 31);
        let result = apply(&DynamicImage::ImageLuma8(img)).unwrap();
        assert_eq!((result.width(), result.height()), (17, 31));
    }

    #[test]
    fn test_blur_handles_single_pixel() {
        let img = GrayImage::from_pixel(1, 1, Luma([42]));
        let result = apply(&DynamicImage::ImageLuma8(img)).unwrap();
        assert_eq!(result.as_luma8().unwrap().get_pixel(0, 0).0[0], 42);
    }
}
