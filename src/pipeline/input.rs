//! Input admission and resolution.
//!
//! [`admit`] is the pipeline's only hard gate: oversized payloads and media
//! types that are neither PDF-like nor images are rejected here, before any
//! extraction stage runs. Everything downstream degrades instead of failing.
//!
//! [`resolve_input`] turns a CLI-style path or URL into a [`RawDocument`],
//! sniffing the media type from magic bytes and falling back to the file
//! extension. It applies the same size ceiling while reading: file metadata
//! and `Content-Length` are checked up front, and a download stops as soon
//! as its body passes the limit.

use crate::document::{MediaKind, RawDocument};
use crate::error::ExtractError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Reject a document that is too large or of a disallowed media type.
///
/// Size is checked first so a huge upload is turned away without looking
/// at anything else.
pub fn admit(document: &RawDocument, max_bytes: usize) -> Result<MediaKind, ExtractError> {
    if document.size() > max_bytes {
        return Err(ExtractError::PayloadTooLarge {
            size: document.size(),
            limit: max_bytes,
        });
    }
    document
        .kind()
        .ok_or_else(|| ExtractError::UnsupportedMediaType {
            media_type: document.media_type().to_string(),
        })
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a local path or HTTP(S) URL to a [`RawDocument`].
///
/// `media_type` overrides detection when set. Inputs larger than
/// `max_bytes` fail with [`ExtractError::PayloadTooLarge`] without being
/// read into memory in full.
pub async fn resolve_input(
    input: &str,
    media_type: Option<&str>,
    max_bytes: usize,
    timeout_secs: u64,
) -> Result<RawDocument, ExtractError> {
    let (bytes, name_hint, header_type) = if is_url(input) {
        let (bytes, header_type) = download_url(input, max_bytes, timeout_secs).await?;
        (bytes, input.to_string(), header_type)
    } else if input.trim().is_empty() {
        return Err(ExtractError::InvalidInput {
            input: input.to_string(),
        });
    } else {
        (read_local(input, max_bytes).await?, input.to_string(), None)
    };

    let media_type = media_type
        .map(str::to_string)
        .or_else(|| sniff_media_type(&bytes).map(str::to_string))
        .or(header_type)
        .or_else(|| media_type_from_extension(Path::new(&name_hint)).map(str::to_string))
        .unwrap_or_else(|| "application/octet-stream".to_string());

    debug!("Resolved {} → {} ({} bytes)", input, media_type, bytes.len());
    Ok(RawDocument::new(bytes, media_type))
}

/// Detect the media type from leading magic bytes.
pub fn sniff_media_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"%PDF") {
        return Some("application/pdf");
    }
    match image::guess_format(bytes).ok()? {
        image::ImageFormat::Png => Some("image/png"),
        image::ImageFormat::Jpeg => Some("image/jpeg"),
        image::ImageFormat::Gif => Some("image/gif"),
        image::ImageFormat::WebP => Some("image/webp"),
        image::ImageFormat::Tiff => Some("image/tiff"),
        image::ImageFormat::Bmp => Some("image/bmp"),
        _ => None,
    }
}

/// Guess the media type from a file extension.
pub fn media_type_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some("application/pdf"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "tif" | "tiff" => Some("image/tiff"),
        "heic" => Some("image/heic"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

fn too_large(size: u64, max_bytes: usize) -> ExtractError {
    ExtractError::PayloadTooLarge {
        size: usize::try_from(size).unwrap_or(usize::MAX),
        limit: max_bytes,
    }
}

/// Read a local file, mapping I/O failures onto input errors.
async fn read_local(path_str: &str, max_bytes: usize) -> Result<Vec<u8>, ExtractError> {
    let path = PathBuf::from(path_str);
    let io_error = |e: std::io::Error, path: PathBuf| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            ExtractError::PermissionDenied { path }
        } else {
            ExtractError::FileNotFound { path }
        }
    };

    let len = tokio::fs::metadata(&path)
        .await
        .map_err(|e| io_error(e, path.clone()))?
        .len();
    if len > max_bytes as u64 {
        debug!("Refusing {}: {} bytes on disk", path.display(), len);
        return Err(too_large(len, max_bytes));
    }

    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| io_error(e, path.clone()))?;
    // The file may have grown since the metadata call.
    if bytes.len() > max_bytes {
        return Err(too_large(bytes.len() as u64, max_bytes));
    }
    debug!("Read local report: {}", path.display());
    Ok(bytes)
}

/// Download a URL into memory, returning its bytes and Content-Type.
async fn download_url(
    url: &str,
    max_bytes: usize,
    timeout_secs: u64,
) -> Result<(Vec<u8>, Option<String>), ExtractError> {
    info!("Downloading report from: {}", url);

    let failed = |e: reqwest::Error| {
        if e.is_timeout() {
            ExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            ExtractError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(failed)?;

    let mut response = client.get(url).send().await.map_err(failed)?;

    if !response.status().is_success() {
        return Err(ExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    if let Some(len) = response.content_length() {
        if len > max_bytes as u64 {
            debug!("Refusing download: Content-Length {}", len);
            return Err(too_large(len, max_bytes));
        }
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .filter(|v| !v.is_empty());

    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(failed)? {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(too_large((bytes.len() + chunk.len()) as u64, max_bytes));
        }
        bytes.extend_from_slice(&chunk);
    }

    info!("Downloaded {} bytes", bytes.len());
    Ok((bytes, content_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_rejects_oversized_before_type() {
        let doc = RawDocument::new(vec![0u8; 11], "text/plain");
        let err = admit(&doc, 10).unwrap_err();
        assert!(matches!(err, ExtractError::PayloadTooLarge { size: 11, limit: 10 }));
    }

    #[test]
    fn admit_accepts_exact_limit() {
        let doc = RawDocument::new(vec![0u8; 10], "application/pdf");
        assert_eq!(admit(&doc, 10).unwrap(), MediaKind::Pdf);
    }

    #[test]
    fn admit_rejects_unsupported_type() {
        let doc = RawDocument::new(b"hello".to_vec(), "text/csv");
        let err = admit(&doc, 1024).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedMediaType { .. }));
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/report.pdf"));
        assert!(is_url("http://example.com/report.jpg"));
        assert!(!is_url("/tmp/report.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn sniff_pdf_and_png() {
        assert_eq!(sniff_media_type(b"%PDF-1.7\n..."), Some("application/pdf"));
        let png_magic = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
        assert_eq!(sniff_media_type(&png_magic), Some("image/png"));
        assert_eq!(sniff_media_type(b"plain text"), None);
    }

    #[test]
    fn extension_lookup() {
        assert_eq!(
            media_type_from_extension(Path::new("scan.JPG")),
            Some("image/jpeg")
        );
        assert_eq!(
            media_type_from_extension(Path::new("report.pdf")),
            Some("application/pdf")
        );
        assert_eq!(media_type_from_extension(Path::new("notes.txt")), None);
        assert_eq!(media_type_from_extension(Path::new("noext")), None);
    }

    #[tokio::test]
    async fn resolve_local_file_sniffs_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.bin");
        std::fs::write(&path, b"%PDF-1.4\nrest").unwrap();

        let doc = resolve_input(path.to_str().unwrap(), None, 1024, 5).await.unwrap();
        assert_eq!(doc.media_type(), "application/pdf");
        assert_eq!(doc.size(), 13);
    }

    #[tokio::test]
    async fn resolve_local_file_uses_extension_when_unsniffable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.heic");
        std::fs::write(&path, b"not-really-heic").unwrap();

        let doc = resolve_input(path.to_str().unwrap(), None, 1024, 5).await.unwrap();
        assert_eq!(doc.media_type(), "image/heic");
    }

    #[tokio::test]
    async fn resolve_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        let doc = resolve_input(path.to_str().unwrap(), Some("image/jpeg"), 1024, 5)
            .await
            .unwrap();
        assert_eq!(doc.media_type(), "image/jpeg");
    }

    #[tokio::test]
    async fn resolve_missing_file() {
        let err = resolve_input("/definitely/not/here.pdf", None, 1024, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::FileNotFound { .. }));
    }

    #[tokio::test]
    async fn oversized_local_file_is_refused_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.pdf");
        std::fs::write(&path, vec![b'x'; 2048]).unwrap();

        let err = resolve_input(path.to_str().unwrap(), None, 1024, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::PayloadTooLarge { size: 2048, limit: 1024 }));
    }

    /// Serve one canned HTTP response on a local port and return its URL.
    async fn serve_once(response: Vec<u8>) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/report.pdf")
    }

    #[tokio::test]
    async fn download_with_large_content_length_is_refused() {
        let mut response =
            b"HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\nContent-Length: 4096\r\nConnection: close\r\n\r\n"
                .to_vec();
        response.extend_from_slice(&[b'x'; 4096]);
        let url = serve_once(response).await;

        let err = resolve_input(&url, None, 1024, 5).await.unwrap_err();
        assert!(matches!(err, ExtractError::PayloadTooLarge { size: 4096, limit: 1024 }));
    }

    #[tokio::test]
    async fn download_without_length_stops_at_the_limit() {
        let mut response =
            b"HTTP/1.1 200 OK\r\nContent-Type: application/pdf\r\nConnection: close\r\n\r\n".to_vec();
        response.extend_from_slice(&[b'x'; 4096]);
        let url = serve_once(response).await;

        let err = resolve_input(&url, None, 1024, 5).await.unwrap_err();
        assert!(matches!(err, ExtractError::PayloadTooLarge { limit: 1024, .. }));
    }

    #[tokio::test]
    async fn small_download_resolves_with_header_type() {
        let body = b"%PDF-1.4\nrest";
        let mut response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/pdf; charset=binary\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(body);
        let url = serve_once(response).await;

        let doc = resolve_input(&url, None, 1024, 5).await.unwrap();
        assert_eq!(doc.media_type(), "application/pdf");
        assert_eq!(doc.size(), body.len());
    }
}
