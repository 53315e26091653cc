//! Pixel-level helpers shared by the analyzers and the preprocessor.

use image::{DynamicImage, GrayImage, Luma};

/// Converts any decoded image to 8-bit grayscale.
///
/// Single-channel sources are only re-quantized. Colour sources use the
/// ITU-R BT.601 luma formula: Y = 0.299*R + 0.587*G + 0.114*B
pub fn to_gray(img: &DynamicImage) -> GrayImage {
    if img.color().channel_count() <= 2 {
        return img.to_luma8();
    }

    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut gray = GrayImage::new(width, height);

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let r = pixel[0] as f64;
        let g = pixel[1] as f64;
        let b = pixel[2] as f64;
        let luma = (0.299 * r + 0.587 * g + 0.114 * b).round();
        gray.put_pixel(x, y, Luma([luma.clamp(0.0, 255.0) as u8]));
    }

    gray
}

/// Mirrors an out-of-range index back into `0..len` without repeating the
/// edge pixel (`gfedcb|abcdefgh|gfedcba`).
pub fn reflect101(index: i64, len: u32) -> u32 {
    let len = len as i64;
    if len <= 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let mut i = index.rem_euclid(period);
    if i >= len {
        i = period - i;
    }
    i as u32
}

/// Applies a 3x3 kernel to every pixel, reflecting at the borders.
///
/// Returns the raw (unclamped) responses in row-major order.
pub fn convolve3x3(img: &GrayImage, kernel: &[[f64; 3]; 3]) -> Vec<f64> {
    let (width, height) = img.dimensions();
    let mut out = Vec::with_capacity((width as usize) * (height as usize));

    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for (ky, row) in kernel.iter().enumerate() {
                let sy = reflect101(y as i64 + ky as i64 - 1, height);
                for (kx, weight) in row.iter().enumerate() {
                    if *weight == 0.0 {
                        continue;
                    }
                    let sx = reflect101(x as i64 + kx as i64 - 1, width);
                    acc += weight * img.get_pixel(sx, sy)[0] as f64;
                }
            }
            out.push(acc);
        }
    }

    out
}

/// Population mean and standard deviation of a sample.
///
/// An empty sample yields `(0.0, 0.0)`.
pub fn mean_stddev<I>(values: I) -> (f64, f64)
where
    I: IntoIterator<Item = f64>,
{
    let mut count = 0u64;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;

    for v in values {
        count += 1;
        sum += v;
        sum_sq += v * v;
    }

    if count == 0 {
        return (0.0, 0.0);
    }

    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    #[test]
    fn test_to_gray_uses_bt601_weights() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_fn(3, 1, |x, _| match x {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 255, 0]),
            _ => Rgb([0, 0, 255]),
        }));
        let gray = to_gray(&img);

        assert_eq!(gray.get_pixel(0, 0)[0], 76);
        assert_eq!(gray.get_pixel(1, 0)[0], 150);
        assert_eq!(gray.get_pixel(2, 0)[0], 29);
    }

    #[test]
    fn test_to_gray_passes_single_channel_through() {
        let src: GrayImage = ImageBuffer::from_fn(4, 4, |x, y| Luma([(x * 10 + y) as u8]));
        let gray = to_gray(&DynamicImage::ImageLuma8(src.clone()));
        assert_eq!(gray, src);
    }

    #[test]
    fn test_reflect101() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(-2, 5), 2);
        assert_eq!(reflect101(0, 5), 0);
        assert_eq!(reflect101(4, 5), 4);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(6, 5), 2);
        assert_eq!(reflect101(-1, 1), 0);
    }

    #[test]
    fn test_convolve_identity_kernel() {
        let img: GrayImage = ImageBuffer::from_fn(5, 4, |x, y| Luma([(x * 7 + y * 3) as u8]));
        let identity = [[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]];
        let out = convolve3x3(&img, &identity);

        let expected: Vec<f64> = img.pixels().map(|p| p[0] as f64).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_mean_stddev() {
        let (mean, std) = mean_stddev([2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((mean - 5.0).abs() < 1e-9);
        assert!((std - 2.0).abs() < 1e-9);

        assert_eq!(mean_stddev(std::iter::empty()), (0.0, 0.0));
    }
}
