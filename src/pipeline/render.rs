//! PDF rasterisation for the vision tier.
//!
//! Vision models read images, not PDFs. When the text tier comes back empty
//! for a PDF, the first few pages are rendered to bitmaps here and sent to
//! the vision model as PNGs.
//!
//! pdfium is bound at runtime (`PDFIUM_LIB_PATH`, then `./`, then the
//! system library). A missing library is an ordinary [`RenderError`]; the
//! caller falls back to sending the PDF bytes as-is.
//!
//! pdfium keeps thread-local state and is CPU-bound, so all work runs in
//! `spawn_blocking`.

use image::DynamicImage;
use pdfium_render::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

/// Why a PDF could not be rasterised.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("pdfium library unavailable: {0}")]
    Bind(String),

    #[error("PDF could not be opened: {0}")]
    Load(String),

    #[error("rasterisation failed for page {page}: {detail}")]
    Page { page: usize, detail: String },

    #[error("PDF contains no pages")]
    NoPages,

    #[error("render task panicked: {0}")]
    Task(String),
}

/// Rasterise up to `max_pages` leading pages of a PDF.
///
/// # Returns
/// A vector of `(page_index_0based, DynamicImage)` tuples.
pub async fn render_pages(
    pdf: Vec<u8>,
    max_pages: usize,
    max_pixels: u32,
) -> Result<Vec<(usize, DynamicImage)>, RenderError> {
    tokio::task::spawn_blocking(move || render_pages_blocking(&pdf, max_pages, max_pixels))
        .await
        .map_err(|e| RenderError::Task(e.to_string()))?
}

fn bind_pdfium() -> Result<Pdfium, RenderError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(path),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| RenderError::Bind(format!("{:?}", e)))?;
    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of page rendering.
fn render_pages_blocking(
    pdf: &[u8],
    max_pages: usize,
    max_pixels: u32,
) -> Result<Vec<(usize, DynamicImage)>, RenderError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium
        .load_pdf_from_byte_slice(pdf, None)
        .map_err(|e| RenderError::Load(format!("{:?}", e)))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    if total_pages == 0 {
        return Err(RenderError::NoPages);
    }
    let count = total_pages.min(max_pages);
    info!("Rasterising {}/{} pages for vision", count, total_pages);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut results = Vec::with_capacity(count);
    for idx in 0..count {
        let page = pages.get(idx as u16).map_err(|e| RenderError::Page {
            page: idx + 1,
            detail: format!("{:?}", e),
        })?;

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| RenderError::Page {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        results.push((idx, image));
    }

    Ok(results)
}
