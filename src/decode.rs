//! Response decoding: multipart splitting and image format detection.

use crate::error::{FireflyError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Image formats the service can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// JPEG (the service default).
    Jpeg,
    /// PNG.
    Png,
    /// WebP.
    WebP,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::WebP => "webp",
        }
    }

    /// Returns the MIME type for this format.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
        }
    }

    /// Detects the format from a `Content-Type` value.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Detects the format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // WebP: RIFF....WEBP
        if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }

    /// Detects the format from magic bytes, falling back to the declared content type.
    pub fn detect(data: &[u8], content_type: Option<&str>) -> Option<Self> {
        if data.is_empty() {
            return None;
        }
        Self::from_magic_bytes(data).or_else(|| content_type.and_then(Self::from_mime))
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// A generated image. Ownership passes to the caller.
#[derive(Debug, Clone)]
#[must_use = "generated image should be saved or processed"]
pub struct GeneratedImage {
    /// Raw image bytes.
    pub data: Vec<u8>,
    /// Detected image format.
    pub format: ImageFormat,
    /// Seed the request was sent with.
    pub seed: u32,
    /// JSON metadata part returned alongside the image, if any.
    pub metadata: Option<Value>,
}

impl GeneratedImage {
    /// File extension matching the detected format.
    pub fn extension(&self) -> &'static str {
        self.format.extension()
    }

    /// MIME type matching the detected format.
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    /// Size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// `<stem>.<extension>`.
    pub fn file_name(&self, stem: &str) -> String {
        format!("{stem}.{}", self.extension())
    }
}

/// Image and metadata extracted from a prediction response.
#[derive(Debug)]
pub(crate) struct DecodedPayload {
    pub data: Vec<u8>,
    pub format: ImageFormat,
    pub metadata: Option<Value>,
}

/// One part of a multipart body.
#[derive(Debug)]
pub(crate) struct Part<'a> {
    headers: Vec<(String, String)>,
    pub body: &'a [u8],
}

impl Part<'_> {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

/// Decodes a prediction response body.
///
/// Multipart bodies are split and searched for a JSON metadata part and an
/// image part; any other body must itself be an image.
pub(crate) fn decode_payload(content_type: Option<&str>, body: &[u8]) -> Result<DecodedPayload> {
    if body.is_empty() {
        return Err(FireflyError::Decode("empty response body".to_string()));
    }

    let Some(boundary) = content_type.and_then(multipart_boundary) else {
        let format = ImageFormat::detect(body, content_type).ok_or_else(|| {
            FireflyError::Decode(format!(
                "unrecognized payload (content-type: {})",
                content_type.unwrap_or("none")
            ))
        })?;
        return Ok(DecodedPayload {
            data: body.to_vec(),
            format,
            metadata: None,
        });
    };

    let parts = split_multipart(body, &boundary)?;

    let metadata = parts
        .iter()
        .find(|p| {
            p.content_type()
                .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("application/json"))
        })
        .and_then(|p| match serde_json::from_slice::<Value>(p.body) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed JSON metadata part");
                None
            }
        });

    let (part, format) = parts
        .iter()
        .find_map(|p| ImageFormat::detect(p.body, p.content_type()).map(|f| (p, f)))
        .ok_or_else(|| {
            FireflyError::Decode(format!(
                "multipart response with {} part(s) contained no image",
                parts.len()
            ))
        })?;

    Ok(DecodedPayload {
        data: part.body.to_vec(),
        format,
        metadata,
    })
}

/// Extracts the boundary parameter from a `multipart/*` content type.
pub(crate) fn multipart_boundary(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let essence = params.next()?.trim().to_ascii_lowercase();
    if !essence.starts_with("multipart/") {
        return None;
    }

    params.find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("boundary") {
            let value = value.trim().trim_matches('"');
            (!value.is_empty()).then(|| value.to_string())
        } else {
            None
        }
    })
}

/// Splits a multipart body into its parts.
pub(crate) fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Result<Vec<Part<'a>>> {
    let delimiter = format!("--{boundary}");
    let delimiter = delimiter.as_bytes();

    // A delimiter only counts at the start of the body or of a line.
    let positions: Vec<usize> = body
        .windows(delimiter.len())
        .enumerate()
        .filter(|(i, w)| *w == delimiter && (*i == 0 || body[i - 1] == b'\n'))
        .map(|(i, _)| i)
        .collect();

    if positions.len() < 2 {
        return Err(FireflyError::Decode(format!(
            "multipart boundary '{boundary}' not found in response"
        )));
    }

    let mut parts = Vec::with_capacity(positions.len() - 1);
    for pair in positions.windows(2) {
        let segment = &body[pair[0] + delimiter.len()..pair[1]];
        let segment = strip_line_break_prefix(segment);
        let segment = strip_line_break_suffix(segment);
        parts.push(parse_part(segment)?);
    }

    Ok(parts)
}

fn parse_part(segment: &[u8]) -> Result<Part<'_>> {
    let (head, body) = if let Some(i) = find(segment, b"\r\n\r\n") {
        (&segment[..i], &segment[i + 4..])
    } else if let Some(i) = find(segment, b"\n\n") {
        (&segment[..i], &segment[i + 2..])
    } else if segment.is_empty() {
        (&segment[..0], segment)
    } else {
        return Err(FireflyError::Decode(
            "multipart part without header terminator".to_string(),
        ));
    };

    let head = String::from_utf8_lossy(head);
    let headers = head
        .lines()
        .filter_map(|line| {
            let (k, v) = line.split_once(':')?;
            Some((k.trim().to_string(), v.trim().to_string()))
        })
        .collect();

    Ok(Part { headers, body })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn strip_line_break_prefix(data: &[u8]) -> &[u8] {
    data.strip_prefix(b"\r\n")
        .or_else(|| data.strip_prefix(b"\n"))
        .unwrap_or(data)
}

fn strip_line_break_suffix(data: &[u8]) -> &[u8] {
    data.strip_suffix(b"\r\n")
        .or_else(|| data.strip_suffix(b"\n"))
        .unwrap_or(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
    const WEBP: &[u8] = b"RIFF\x24\x00\x00\x00WEBPVP8 ";

    fn multipart(boundary: &str, parts: &[(&str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (content_type, data) in parts {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
        body
    }

    #[test]
    fn test_format_from_magic_bytes() {
        assert_eq!(ImageFormat::from_magic_bytes(JPEG), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_magic_bytes(PNG), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::from_magic_bytes(WEBP), Some(ImageFormat::WebP));
        assert_eq!(ImageFormat::from_magic_bytes(b"{\"ok\":true}"), None);
        assert_eq!(ImageFormat::from_magic_bytes(b"RIFF"), None);
    }

    #[test]
    fn test_extensions() {
        assert_eq!(ImageFormat::Jpeg.extension(), "jpeg");
        assert_eq!(ImageFormat::Png.extension(), "png");
        assert_eq!(ImageFormat::WebP.extension(), "webp");
    }

    #[test]
    fn test_detect_falls_back_to_content_type() {
        assert_eq!(
            ImageFormat::detect(b"\x00\x01", Some("image/png; charset=binary")),
            Some(ImageFormat::Png)
        );
        assert_eq!(ImageFormat::detect(b"", Some("image/png")), None);
        assert_eq!(ImageFormat::detect(b"\x00\x01", Some("text/plain")), None);
    }

    #[test]
    fn test_multipart_boundary() {
        assert_eq!(
            multipart_boundary("multipart/form-data; boundary=abc123"),
            Some("abc123".to_string())
        );
        assert_eq!(
            multipart_boundary("Multipart/Mixed; charset=utf-8; Boundary=\"x y\""),
            Some("x y".to_string())
        );
        assert_eq!(multipart_boundary("multipart/form-data"), None);
        assert_eq!(multipart_boundary("image/jpeg"), None);
    }

    #[test]
    fn test_decode_multipart_with_metadata() {
        let body = multipart(
            "sep",
            &[
                ("application/json", &br#"{"status":"ok"}"#[..]),
                ("image/jpeg", JPEG),
            ],
        );
        let payload = decode_payload(Some("multipart/form-data; boundary=sep"), &body).unwrap();
        assert_eq!(payload.format, ImageFormat::Jpeg);
        assert_eq!(payload.data, JPEG);
        assert_eq!(payload.metadata.unwrap()["status"], "ok");
    }

    #[test]
    fn test_decode_multipart_without_image() {
        let body = multipart("sep", &[("application/json", &br#"{"status":"failed"}"#[..])]);
        let err = decode_payload(Some("multipart/form-data; boundary=sep"), &body).unwrap_err();
        assert!(matches!(err, FireflyError::Decode(_)));
    }

    #[test]
    fn test_decode_multipart_missing_boundary_in_body() {
        let err = decode_payload(Some("multipart/form-data; boundary=sep"), JPEG).unwrap_err();
        assert!(matches!(err, FireflyError::Decode(_)));
    }

    #[test]
    fn test_decode_raw_image() {
        let payload = decode_payload(Some("application/octet-stream"), PNG).unwrap();
        assert_eq!(payload.format, ImageFormat::Png);
        assert!(payload.metadata.is_none());
    }

    #[test]
    fn test_decode_rejects_non_image() {
        let err = decode_payload(Some("application/json"), br#"{"error":"nope"}"#).unwrap_err();
        assert!(matches!(err, FireflyError::Decode(_)));

        let err = decode_payload(None, b"").unwrap_err();
        assert!(matches!(err, FireflyError::Decode(_)));
    }

    #[test]
    fn test_generated_image_file_name() {
        let image = GeneratedImage {
            data: JPEG.to_vec(),
            format: ImageFormat::Jpeg,
            seed: 1,
            metadata: None,
        };
        assert_eq!(image.file_name("0"), "0.jpeg");
        assert_eq!(image.size(), JPEG.len());
    }
}
