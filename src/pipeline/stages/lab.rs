//! 8-bit sRGB <-> CIE L*a*b* conversion (D65 white point).
//!
//! Channels are stored the usual 8-bit way: `L * 255 / 100`, and `a`/`b`
//! offset by 128.

use image::{GrayImage, Luma, Rgb, RgbImage};

const WHITE_X: f32 = 0.950456;
const WHITE_Z: f32 = 1.088754;

/// Below this, `f(t)` switches from a cube root to its linear segment
const T_THRESHOLD: f32 = 0.008856;
const KAPPA: f32 = 903.3;
const LINEAR_SLOPE: f32 = 7.787;
const LINEAR_OFFSET: f32 = 16.0 / 116.0;

const RGB_TO_XYZ: [[f32; 3]; 3] = [
    [0.412453, 0.357580, 0.180423],
    [0.212671, 0.715160, 0.072169],
    [0.019334, 0.119193, 0.950227],
];

const XYZ_TO_RGB: [[f32; 3]; 3] = [
    [3.240479, -1.53715, -0.498535],
    [-0.969256, 1.875991, 0.041556],
    [0.055648, -0.204043, 1.057311],
];

fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f32) -> f32 {
    if c <= 0.0031308 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn f(t: f32) -> f32 {
    if t > T_THRESHOLD {
        t.cbrt()
    } else {
        LINEAR_SLOPE * t + LINEAR_OFFSET
    }
}

fn f_inv(t: f32) -> f32 {
    if t > 6.0 / 29.0 {
        t * t * t
    } else {
        (t - LINEAR_OFFSET) / LINEAR_SLOPE
    }
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Convert one 8-bit RGB pixel to 8-bit Lab
pub fn rgb_to_lab_pixel(rgb: [u8; 3], linear: &[f32; 256]) -> [u8; 3] {
    let [r, g, b] = rgb.map(|c| linear[c as usize]);
    let x = (RGB_TO_XYZ[0][0] * r + RGB_TO_XYZ[0][1] * g + RGB_TO_XYZ[0][2] * b) / WHITE_X;
    let y = RGB_TO_XYZ[1][0] * r + RGB_TO_XYZ[1][1] * g + RGB_TO_XYZ[1][2] * b;
    let z = (RGB_TO_XYZ[2][0] * r + RGB_TO_XYZ[2][1] * g + RGB_TO_XYZ[2][2] * b) / WHITE_Z;

    let (fx, fy, fz) = (f(x), f(y), f(z));
    let l = if y > T_THRESHOLD {
        116.0 * fy - 16.0
    } else {
        KAPPA * y
    };
    let a = 500.0 * (fx - fy) + 128.0;
    let b = 200.0 * (fy - fz) + 128.0;

    [to_u8(l * 255.0 / 100.0), to_u8(a), to_u8(b)]
}

/// Convert one 8-bit Lab pixel back to 8-bit RGB
pub fn lab_to_rgb_pixel(lab: [u8; 3]) -> [u8; 3] {
    let l = lab[0] as f32 * 100.0 / 255.0;
    let a = lab[1] as f32 - 128.0;
    let b = lab[2] as f32 - 128.0;

    let (y, fy) = if l <= KAPPA * T_THRESHOLD {
        let y = l / KAPPA;
        (y, LINEAR_SLOPE * y + LINEAR_OFFSET)
    } else {
        let fy = (l + 16.0) / 116.0;
        (fy * fy * fy, fy)
    };
    let x = f_inv(a / 500.0 + fy) * WHITE_X;
    let z = f_inv(fy - b / 200.0) * WHITE_Z;

    let channel = |row: &[f32; 3]| {
        let linear = (row[0] * x + row[1] * y + row[2] * z).clamp(0.0, 1.0);
        to_u8(linear_to_srgb(linear) * 255.0)
    };
    [
        channel(&XYZ_TO_RGB[0]),
        channel(&XYZ_TO_RGB[1]),
        channel(&XYZ_TO_RGB[2]),
    ]
}

fn linear_table() -> [f32; 256] {
    std::array::from_fn(|i| srgb_to_linear(i as f32 / 255.0))
}

/// Convert an RGB image into separate L, a and b planes
pub fn split_lab(rgb: &RgbImage) -> [GrayImage; 3] {
    let linear = linear_table();
    let (width, height) = rgb.dimensions();
    let mut planes = [
        GrayImage::new(width, height),
        GrayImage::new(width, height),
        GrayImage::new(width, height),
    ];

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let lab = rgb_to_lab_pixel(pixel.0, &linear);
        for (plane, value) in planes.iter_mut().zip(lab) {
            plane.put_pixel(x, y, Luma([value]));
        }
    }
    planes
}

/// Recombine L, a and b planes into an RGB image.
///
/// Returns `None` when the planes disagree on dimensions.
pub fn merge_lab(l: &GrayImage, a: &GrayImage, b: &GrayImage) -> Option<RgbImage> {
    if l.dimensions() != a.dimensions() || l.dimensions() != b.dimensions() {
        return None;
    }

    Some(RgbImage::from_fn(l.width(), l.height(), |x, y| {
        Rgb(lab_to_rgb_pixel([
            l.get_pixel(x, y).0[0],
            a.get_pixel(x, y).0[0],
            b.get_pixel(x, y).0[0],
        ]))
    }))
}
