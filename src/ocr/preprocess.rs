use anyhow::Result;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

use crate::imaging::{convolve3x3, to_gray};

/// High-pass kernel: centre 9, all eight neighbours -1.
const SHARPEN: [[f64; 3]; 3] = [[-1.0, -1.0, -1.0], [-1.0, 9.0, -1.0], [-1.0, -1.0, -1.0]];

/// Image conditioning parameters applied before the definitive OCR call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Frames wider than this are scaled down
    pub max_width: u32,
    /// Frames taller than this are scaled down
    pub max_height: u32,
    /// Histogram clip limit for local contrast enhancement
    pub contrast_clip_limit: f64,
    /// Number of equalization tiles along x and y
    #[serde(alias = "contrast_tile_size")]
    pub contrast_tile_grid: [u32; 2],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_width: 1600,
            max_height: 1600,
            contrast_clip_limit: 3.0,
            contrast_tile_grid: [8, 8],
        }
    }
}

/// Encoded image handed to the OCR collaborator.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub bytes: Vec<u8>,
    /// False when preprocessing failed and `bytes` is the untouched input
    pub processed: bool,
}

/// Target size for a frame that must fit inside `max_width` x `max_height`.
///
/// Uses the smaller of the two scale factors so the aspect ratio is kept.
/// Frames that already fit are returned unchanged; nothing is upscaled.
pub fn fit_dimensions(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let scale = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    let new_width = ((width as f64 * scale) as u32).max(1);
    let new_height = ((height as f64 * scale) as u32).max(1);
    (new_width, new_height)
}

/// Scales a frame down to fit the configured bounds.
pub fn resize_to_fit(img: &DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    let (new_width, new_height) = fit_dimensions(width, height, max_width, max_height);
    if (new_width, new_height) == (width, height) {
        return img.clone();
    }
    log::info!(
        "Resizing frame: {}x{} -> {}x{}",
        width,
        height,
        new_width,
        new_height
    );
    img.resize_exact(new_width, new_height, FilterType::Triangle)
}

/// Builds one tile's lookup table from its clipped, redistributed histogram.
fn tile_lut(histogram: &[u32; 256], area: u32, clip_limit: f64) -> [u8; 256] {
    let mut hist = *histogram;

    if clip_limit > 0.0 {
        let limit = ((clip_limit * area as f64 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for bin in hist.iter_mut() {
            if *bin > limit {
                excess += *bin - limit;
                *bin = limit;
            }
        }

        let batch = excess / 256;
        let mut residual = excess - batch * 256;
        for bin in hist.iter_mut() {
            *bin += batch;
        }
        if residual > 0 {
            let step = (256 / residual as usize).max(1);
            let mut i = 0;
            while i < 256 && residual > 0 {
                hist[i] += 1;
                residual -= 1;
                i += step;
            }
        }
    }

    let scale = 255.0 / area as f64;
    let mut lut = [0u8; 256];
    let mut cumulative = 0u32;
    for (value, bin) in hist.iter().enumerate() {
        cumulative += bin;
        lut[value] = (cumulative as f64 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Contrast-limited histogram equalization over a grid of tiles.
///
/// Each tile gets its own clipped equalization curve; pixels blend the
/// curves of the four nearest tile centres so no seams appear.
pub fn equalize_tiles(gray: &GrayImage, clip_limit: f64, grid: [u32; 2]) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }

    let tiles_x = grid[0].clamp(1, width);
    let tiles_y = grid[1].clamp(1, height);
    let bound = |i: u32, tiles: u32, len: u32| (i as u64 * len as u64 / tiles as u64) as u32;

    let mut luts: Vec<[u8; 256]> = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        let (y0, y1) = (bound(ty, tiles_y, height), bound(ty + 1, tiles_y, height));
        for tx in 0..tiles_x {
            let (x0, x1) = (bound(tx, tiles_x, width), bound(tx + 1, tiles_x, width));
            let mut histogram = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    histogram[gray.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            luts.push(tile_lut(&histogram, (x1 - x0) * (y1 - y0), clip_limit));
        }
    }

    let tile_w = width as f64 / tiles_x as f64;
    let tile_h = height as f64 / tiles_y as f64;
    // Neighbouring tile indices and blend weight along one axis
    let neighbours = |pos: u32, tile: f64, tiles: u32| {
        let f = (pos as f64 + 0.5) / tile - 0.5;
        let lower = f.floor();
        let weight = f - lower;
        let max = tiles as i64 - 1;
        let a = (lower as i64).clamp(0, max) as usize;
        let b = (lower as i64 + 1).clamp(0, max) as usize;
        (a, b, weight)
    };

    let mut out = GrayImage::new(width, height);
    for y in 0..height {
        let (ty1, ty2, ya) = neighbours(y, tile_h, tiles_y);
        for x in 0..width {
            let (tx1, tx2, xa) = neighbours(x, tile_w, tiles_x);
            let v = gray.get_pixel(x, y)[0] as usize;
            let at = |ty: usize, tx: usize| luts[ty * tiles_x as usize + tx][v] as f64;

            let top = (1.0 - xa) * at(ty1, tx1) + xa * at(ty1, tx2);
            let bottom = (1.0 - xa) * at(ty2, tx1) + xa * at(ty2, tx2);
            let value = (1.0 - ya) * top + ya * bottom;
            out.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

/// 3x3 median filter with replicated borders.
pub fn median3x3(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    let mut out = GrayImage::new(width, height);
    let mut window = [0u8; 9];

    for y in 0..height {
        for x in 0..width {
            let mut i = 0;
            for dy in -1i64..=1 {
                let sy = (y as i64 + dy).clamp(0, height as i64 - 1) as u32;
                for dx in -1i64..=1 {
                    let sx = (x as i64 + dx).clamp(0, width as i64 - 1) as u32;
                    window[i] = gray.get_pixel(sx, sy)[0];
                    i += 1;
                }
            }
            window.sort_unstable();
            out.put_pixel(x, y, Luma([window[4]]));
        }
    }
    out
}

/// Applies the high-pass sharpening kernel, clamping to 0..=255.
pub fn sharpen(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    let response = convolve3x3(gray, &SHARPEN);
    GrayImage::from_fn(width, height, |x, y| {
        let v = response[(y as usize) * (width as usize) + x as usize];
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

/// The fixed conditioning chain: resize, grayscale, local contrast,
/// median denoise, sharpen. Returns a new image; `img` is not touched.
pub fn condition_frame(img: &DynamicImage, config: &PreprocessConfig) -> GrayImage {
    let resized = resize_to_fit(img, config.max_width, config.max_height);
    let gray = to_gray(&resized);
    let enhanced = equalize_tiles(&gray, config.contrast_clip_limit, config.contrast_tile_grid);
    let denoised = median3x3(&enhanced);
    sharpen(&denoised)
}

/// Decodes, conditions and re-encodes a frame as PNG.
pub fn condition_image(bytes: &[u8], config: &PreprocessConfig) -> Result<Vec<u8>> {
    let img = image::load_from_memory(bytes)?;
    log::info!("Original frame size: {}x{}", img.width(), img.height());

    let conditioned = condition_frame(&img, config);

    let mut out = Cursor::new(Vec::new());
    conditioned.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

/// Best-effort preprocessing of an encoded frame.
///
/// Any failure returns the original bytes with `processed == false`, so OCR
/// still runs on the raw capture.
pub fn preprocess(bytes: &[u8], config: &PreprocessConfig) -> PreparedImage {
    match condition_image(bytes, config) {
        Ok(processed) => {
            log::info!("Preprocessing complete ({} bytes PNG)", processed.len());
            PreparedImage {
                bytes: processed,
                processed: true,
            }
        }
        Err(e) => {
            log::warn!("Preprocessing failed, using original image: {}", e);
            PreparedImage {
                bytes: bytes.to_vec(),
                processed: false,
            }
        }
    }
}
