//! Vision payload encoding: document bytes → base64 `ImageData`.
//!
//! Images are sent untouched with their declared media type. PDFs are
//! rasterised (see [`crate::pipeline::render`]) and each page is PNG-encoded;
//! if rasterisation is off or fails, the PDF itself goes out as an
//! `application/pdf` data URL. `detail: "high"` keeps small printed figures
//! and pen marks legible to the model.

use crate::config::ExtractionConfig;
use crate::document::{MediaKind, RawDocument};
use crate::pipeline::render;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::{debug, warn};

/// Build the images attached to the vision request.
pub async fn vision_images(document: &RawDocument, config: &ExtractionConfig) -> Vec<ImageData> {
    if document.kind() == Some(MediaKind::Pdf) && config.rasterize_pdf {
        match render::render_pages(
            document.bytes().to_vec(),
            config.max_vision_pages,
            config.max_rendered_pixels,
        )
        .await
        {
            Ok(pages) => {
                let images: Vec<ImageData> = pages
                    .iter()
                    .filter_map(|(idx, img)| match encode_page(img) {
                        Ok(data) => Some(data),
                        Err(e) => {
                            warn!("Failed to encode page {}: {}", idx + 1, e);
                            None
                        }
                    })
                    .collect();
                if !images.is_empty() {
                    return images;
                }
            }
            Err(e) => warn!("Rasterisation unavailable, sending PDF bytes: {}", e),
        }
    }
    vec![encode_document(document)]
}

/// Wrap the original bytes with their (normalised) media type.
pub fn encode_document(document: &RawDocument) -> ImageData {
    let mime = vision_mime(document);
    let b64 = STANDARD.encode(document.bytes());
    debug!("Encoded {} → {} bytes base64", mime, b64.len());
    ImageData::new(b64, mime).with_detail("high")
}

/// Encode a rasterised page as a base64 PNG.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Lower-cased declared type; PDF-like types collapse to `application/pdf`.
fn vision_mime(document: &RawDocument) -> String {
    match document.kind() {
        Some(MediaKind::Pdf) => "application/pdf".to_string(),
        _ => document.media_type().trim().to_ascii_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let data = encode_page(&img).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert!(decoded.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn document_bytes_pass_through() {
        let doc = RawDocument::new(vec![0xFF, 0xD8, 0xFF, 0xE0], "Image/JPEG");
        let data = encode_document(&doc);
        assert_eq!(data.mime_type, "image/jpeg");
        assert_eq!(STANDARD.decode(&data.data).unwrap(), vec![0xFF, 0xD8, 0xFF, 0xE0]);
    }

    #[test]
    fn pdf_like_types_normalise() {
        let doc = RawDocument::new(b"%PDF".to_vec(), "application/x-pdf");
        assert_eq!(encode_document(&doc).mime_type, "application/pdf");
    }

    #[tokio::test]
    async fn unrasterised_pdf_is_sent_whole() {
        let config = ExtractionConfig::builder().rasterize_pdf(false).build().unwrap();
        let doc = RawDocument::new(b"%PDF-1.7".to_vec(), "application/pdf");
        let images = vision_images(&doc, &config).await;
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].mime_type, "application/pdf");
    }

    #[tokio::test]
    async fn images_are_never_rasterised() {
        let config = ExtractionConfig::default();
        let doc = RawDocument::new(vec![1, 2, 3], "image/png");
        let images = vision_images(&doc, &config).await;
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].mime_type, "image/png");
    }
}
