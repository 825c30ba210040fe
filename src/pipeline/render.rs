//! PDF rasterisation: render the first pages of a receipt to `DynamicImage`.
//!
//! Rendering sits behind the [`PageRenderer`] trait. The default backend,
//! [`PdfiumRenderer`], wraps the pdfium C++ library, which uses thread-local
//! state and must not run on Tokio worker threads; [`render_pages`] moves
//! every call onto the blocking pool with `spawn_blocking`.
//!
//! pdfium is bound at call time from, in order: the configured library path
//! (a directory holding `libpdfium` or the library file itself), the working
//! directory, and finally the system library search path.

use crate::error::FileError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Turns the first `max_pages` pages of a PDF into raster images.
///
/// Implementations are called from a blocking thread and may block freely.
pub trait PageRenderer: Send + Sync {
    /// Render at most `max_pages` pages of `pdf_path`, in page order.
    fn render(&self, pdf_path: &Path, max_pages: usize) -> Result<Vec<DynamicImage>, FileError>;
}

/// pdfium-backed renderer.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    pub dpi: u32,
    pub max_pixels: u32,
    pub library_path: Option<PathBuf>,
}

impl PdfiumRenderer {
    pub fn new(dpi: u32, max_pixels: u32, library_path: Option<PathBuf>) -> Self {
        Self {
            dpi,
            max_pixels,
            library_path,
        }
    }

    fn bind(&self) -> Result<Pdfium, FileError> {
        let bindings = match self.library_path.as_deref() {
            Some(dir) if dir.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
            }
            Some(file) => Pdfium::bind_to_library(file),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| {
            FileError::render(format!(
                "Failed to bind to pdfium library: {:?}. Set PDFIUM_LIB_PATH to the directory containing libpdfium.",
                e
            ))
        })?;

        Ok(Pdfium::new(bindings))
    }
}

impl PageRenderer for PdfiumRenderer {
    fn render(&self, pdf_path: &Path, max_pages: usize) -> Result<Vec<DynamicImage>, FileError> {
        let pdfium = self.bind()?;

        let document = pdfium.load_pdf_from_file(pdf_path, None).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                FileError::render(format!(
                    "PDF '{}' is encrypted and requires a password",
                    pdf_path.display()
                ))
            } else {
                FileError::render(format!(
                    "PDF '{}' is corrupt: {}",
                    pdf_path.display(),
                    err_str
                ))
            }
        })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        let wanted = total_pages.min(max_pages);
        info!(
            "PDF loaded: {} pages, rendering {}",
            total_pages, wanted
        );

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / 72.0)
            .set_maximum_width(self.max_pixels as i32)
            .set_maximum_height(self.max_pixels as i32);

        let mut images = Vec::with_capacity(wanted);
        for idx in 0..wanted {
            let page = pages.get(idx as u16).map_err(|e| {
                FileError::render(format!("Rasterisation failed for page {}: {:?}", idx + 1, e))
            })?;

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                FileError::render(format!("Rasterisation failed for page {}: {:?}", idx + 1, e))
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            images.push(image);
        }

        Ok(images)
    }
}

/// Render pages on the blocking pool.
///
/// An empty result is an error: a receipt with nothing to look at cannot
/// produce a record.
pub async fn render_pages(
    renderer: Arc<dyn PageRenderer>,
    pdf_path: &Path,
    max_pages: usize,
) -> Result<Vec<DynamicImage>, FileError> {
    let path = pdf_path.to_path_buf();

    let images = tokio::task::spawn_blocking(move || renderer.render(&path, max_pages))
        .await
        .map_err(|e| FileError::render(format!("Render task panicked: {}", e)))??;

    if images.is_empty() {
        return Err(FileError::render("No images generated from PDF"));
    }
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    struct BlankRenderer(usize);

    impl PageRenderer for BlankRenderer {
        fn render(&self, _: &Path, max_pages: usize) -> Result<Vec<DynamicImage>, FileError> {
            Ok((0..self.0.min(max_pages))
                .map(|_| DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([255; 4]))))
                .collect())
        }
    }

    #[tokio::test]
    async fn page_limit_is_passed_through() {
        let imgs = render_pages(Arc::new(BlankRenderer(4)), Path::new("x.pdf"), 2)
            .await
            .unwrap();
        assert_eq!(imgs.len(), 2);
    }

    #[tokio::test]
    async fn zero_pages_is_an_error() {
        let err = render_pages(Arc::new(BlankRenderer(0)), Path::new("x.pdf"), 1)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No images"));
    }

    #[test]
    fn unbindable_library_is_a_render_error() {
        let renderer = PdfiumRenderer::new(150, 2000, Some(PathBuf::from("/no/such/libpdfium.so")));
        let err = renderer.render(Path::new("x.pdf"), 1).unwrap_err();
        assert!(err.to_string().contains("PDFIUM_LIB_PATH"));
    }
}
