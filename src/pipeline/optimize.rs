//! Image optimisation: shrink a rendered page before it goes over the wire.
//!
//! Receipts are read for a handful of fields, not transcribed, so a 1000 px
//! wide greyscale JPEG at quality 50 is plenty and keeps each request to a
//! few tens of kilobytes instead of megabytes.

use crate::error::FileError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use tracing::debug;

/// An encoded page ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizedImage {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
}

impl OptimizedImage {
    /// Wrap as a base64 attachment for the VLM request.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(STANDARD.encode(&self.bytes), self.mime_type)
    }
}

/// Downscale to `max_width`, convert to greyscale, JPEG-encode at `quality`.
///
/// Images already narrower than `max_width` are not upscaled.
pub fn optimize_page(
    img: &DynamicImage,
    max_width: u32,
    quality: u8,
) -> Result<OptimizedImage, FileError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(FileError::Optimize {
            detail: "image has zero size".into(),
        });
    }

    let resized = if img.width() > max_width {
        let ratio = max_width as f64 / img.width() as f64;
        let new_height = ((img.height() as f64 * ratio) as u32).max(1);
        img.resize_exact(max_width, new_height, FilterType::Lanczos3)
    } else {
        img.clone()
    };

    // JPEG has no alpha channel, so go straight to 8-bit luma.
    let grey = DynamicImage::ImageLuma8(resized.to_luma8());

    let mut buf = Vec::new();
    grey.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
        .map_err(|e| FileError::Optimize {
            detail: e.to_string(),
        })?;

    debug!(
        "Optimised page {}x{} → {}x{}, {:.2} KB",
        img.width(),
        img.height(),
        grey.width(),
        grey.height(),
        buf.len() as f64 / 1024.0
    );

    Ok(OptimizedImage {
        bytes: buf,
        mime_type: "image/jpeg",
        width: grey.width(),
        height: grey.height(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn solid(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([200, 30, 30, 255])))
    }

    #[test]
    fn wide_pages_are_downscaled_keeping_aspect() {
        let out = optimize_page(&solid(2000, 3000), 1000, 50).unwrap();
        assert_eq!(out.width, 1000);
        assert_eq!(out.height, 1500);
    }

    #[test]
    fn narrow_pages_are_not_upscaled() {
        let out = optimize_page(&solid(400, 300), 1000, 50).unwrap();
        assert_eq!((out.width, out.height), (400, 300));
    }

    #[test]
    fn output_is_greyscale_jpeg() {
        let out = optimize_page(&solid(64, 64), 1000, 50).unwrap();
        assert_eq!(out.mime_type, "image/jpeg");
        assert_eq!(&out.bytes[..2], &[0xFF, 0xD8]);

        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!(decoded.color(), image::ColorType::L8);
    }

    #[test]
    fn lower_quality_is_smaller() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(300, 300, |x, y| {
            Rgba([(x * 7 % 255) as u8, (y * 13 % 255) as u8, ((x + y) % 255) as u8, 255])
        }));
        let high = optimize_page(&img, 1000, 95).unwrap();
        let low = optimize_page(&img, 1000, 20).unwrap();
        assert!(low.bytes.len() < high.bytes.len());
    }

    #[test]
    fn image_data_is_base64_jpeg() {
        let out = optimize_page(&solid(10, 10), 1000, 50).unwrap();
        let data = out.to_image_data();
        assert_eq!(data.mime_type, "image/jpeg");
        assert_eq!(STANDARD.decode(&data.data).unwrap(), out.bytes);
    }
}
