//! Contrast Limited Adaptive Histogram Equalization.
//!
//! The image is split into a grid of tiles and each tile gets its own
//! equalization LUT from a clipped histogram. Clipped counts are
//! redistributed over all bins so noise in flat regions is not amplified.
//! Output pixels blend the LUTs of the four nearest tile centers
//! bilinearly, which hides tile seams.

use super::blur::Border;
use image::{GrayImage, Luma};

const BINS: usize = 256;

/// CLAHE parameters
#[derive(Debug, Clone, Copy)]
pub struct Clahe {
    clip_limit: f32,
    tiles_x: u32,
    tiles_y: u32,
}

impl Clahe {
    /// `clip_limit` is relative to a flat histogram. A non-positive value
    /// disables clipping.
    pub fn new(clip_limit: f32, (tiles_x, tiles_y): (u32, u32)) -> Self {
        Self {
            clip_limit,
            tiles_x: tiles_x.max(1),
            tiles_y: tiles_y.max(1),
        }
    }

    pub fn apply(&self, img: &GrayImage) -> GrayImage {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            return img.clone();
        }

        // Dimensions that don't divide evenly are padded by mirroring
        let tile_w = width.div_ceil(self.tiles_x);
        let tile_h = height.div_ceil(self.tiles_y);
        let luts = self.tile_luts(img, tile_w, tile_h);

        let inv_tw = 1.0 / tile_w as f32;
        let inv_th = 1.0 / tile_h as f32;
        let columns: Vec<(usize, usize, f32)> = (0..width)
            .map(|x| neighbor_tiles(x, inv_tw, self.tiles_x))
            .collect();

        let mut out = GrayImage::new(width, height);
        for y in 0..height {
            let (ty1, ty2, ya) = neighbor_tiles(y, inv_th, self.tiles_y);
            let row1 = ty1 * self.tiles_x as usize;
            let row2 = ty2 * self.tiles_x as usize;

            for (x, &(tx1, tx2, xa)) in columns.iter().enumerate() {
                let v = img.get_pixel(x as u32, y).0[0] as usize;
                let top = luts[row1 + tx1][v] as f32 * (1.0 - xa) + luts[row1 + tx2][v] as f32 * xa;
                let bottom =
                    luts[row2 + tx1][v] as f32 * (1.0 - xa) + luts[row2 + tx2][v] as f32 * xa;
                let value = top * (1.0 - ya) + bottom * ya;
                out.put_pixel(x as u32, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
            }
        }
        out
    }

    /// One equalization LUT per tile, row-major
    fn tile_luts(&self, img: &GrayImage, tile_w: u32, tile_h: u32) -> Vec<[u8; BINS]> {
        let (width, height) = (img.width() as usize, img.height() as usize);
        let tile_area = tile_w * tile_h;
        let clip = if self.clip_limit > 0.0 {
            ((self.clip_limit * tile_area as f32 / BINS as f32) as u32).max(1)
        } else {
            0
        };
        let lut_scale = 255.0 / tile_area as f32;

        let mut luts = Vec::with_capacity((self.tiles_x * self.tiles_y) as usize);
        for ty in 0..self.tiles_y {
            for tx in 0..self.tiles_x {
                let mut hist = [0u32; BINS];
                for y in ty * tile_h..(ty + 1) * tile_h {
                    let sy = Border::Reflect101.index(y as i64, height) as u32;
                    for x in tx * tile_w..(tx + 1) * tile_w {
                        let sx = Border::Reflect101.index(x as i64, width) as u32;
                        hist[img.get_pixel(sx, sy).0[0] as usize] += 1;
                    }
                }

                if clip > 0 {
                    clip_histogram(&mut hist, clip);
                }

                let mut lut = [0u8; BINS];
                let mut sum = 0u32;
                for (entry, count) in lut.iter_mut().zip(hist) {
                    sum += count;
                    *entry = (sum as f32 * lut_scale).round().clamp(0.0, 255.0) as u8;
                }
                luts.push(lut);
            }
        }
        luts
    }
}

/// Cap every bin at `clip` and spread the excess evenly. Whatever doesn't
/// divide evenly is handed out one count at a time across the range.
fn clip_histogram(hist: &mut [u32; BINS], clip: u32) {
    let mut clipped = 0u32;
    for count in hist.iter_mut() {
        if *count > clip {
            clipped += *count - clip;
            *count = clip;
        }
    }

    let batch = clipped / BINS as u32;
    let mut residual = clipped as usize - batch as usize * BINS;
    for count in hist.iter_mut() {
        *count += batch;
    }

    if residual > 0 {
        let step = (BINS / residual).max(1);
        let mut i = 0;
        while i < BINS && residual > 0 {
            hist[i] += 1;
            residual -= 1;
            i += step;
        }
    }
}

/// The two tile indices whose centers bracket `pos`, and the blend weight of the second
fn neighbor_tiles(pos: u32, inv_tile: f32, tiles: u32) -> (usize, usize, f32) {
    let t = pos as f32 * inv_tile - 0.5;
    let t1 = t.floor() as i64;
    let weight = t - t1 as f32;
    let last = tiles as i64 - 1;
    let first = t1.max(0) as usize;
    let second = (t1 + 1).min(last) as usize;
    (first, second, weight)
}
