//! Decoded camera frames.

use image::{DynamicImage, GrayImage};
use thiserror::Error;

use crate::imaging::to_gray;

/// Reasons a byte buffer cannot be turned into a frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("image buffer is empty")]
    Empty,
    #[error("cannot decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// A raw capture: the uploaded bytes together with the decoded pixel grid.
///
/// Owned by one pipeline invocation and never written anywhere.
#[derive(Debug, Clone)]
pub struct Frame {
    bytes: Vec<u8>,
    image: DynamicImage,
}

impl Frame {
    /// Decodes `bytes` with format sniffing.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.is_empty() {
            return Err(FrameError::Empty);
        }
        let image = image::load_from_memory(bytes)?;
        log::debug!(
            "Decoded frame {}x{} ({} channels, {} bytes)",
            image.width(),
            image.height(),
            image.color().channel_count(),
            bytes.len()
        );
        Ok(Self {
            bytes: bytes.to_vec(),
            image,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn channels(&self) -> u8 {
        self.image.color().channel_count()
    }

    /// Grayscale copy of the pixel grid.
    pub fn gray(&self) -> GrayImage {
        to_gray(&self.image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    fn encode_png(img: &DynamicImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_keeps_bytes_and_dimensions() {
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_fn(40, 30, |x, _| {
            Rgb([x as u8, 0, 0])
        }));
        let bytes = encode_png(&img);

        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.width(), 40);
        assert_eq!(frame.height(), 30);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.bytes(), bytes.as_slice());
    }

    #[test]
    fn test_decode_empty_is_error() {
        assert!(matches!(Frame::decode(&[]), Err(FrameError::Empty)));
    }

    #[test]
    fn test_decode_garbage_is_error() {
        let result = Frame::decode(b"definitely not an image");
        assert!(matches!(result, Err(FrameError::Decode(_))));
    }
}
