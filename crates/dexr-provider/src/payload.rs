//! Document payloads handed to the hosted models.

use std::borrow::Cow;
use std::fmt;
use std::io::Cursor;

use base64::Engine;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Media kinds accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Png,
    Jpeg,
    Gif,
    Bmp,
    Webp,
    Pdf,
}

impl MediaKind {
    /// All supported kinds.
    pub const ALL: [MediaKind; 6] = [
        MediaKind::Png,
        MediaKind::Jpeg,
        MediaKind::Gif,
        MediaKind::Bmp,
        MediaKind::Webp,
        MediaKind::Pdf,
    ];

    /// MIME type used on the wire.
    pub fn mime_type(&self) -> &'static str {
        match self {
            MediaKind::Png => "image/png",
            MediaKind::Jpeg => "image/jpeg",
            MediaKind::Gif => "image/gif",
            MediaKind::Bmp => "image/bmp",
            MediaKind::Webp => "image/webp",
            MediaKind::Pdf => "application/pdf",
        }
    }

    /// File extensions associated with this kind.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            MediaKind::Png => &["png"],
            MediaKind::Jpeg => &["jpg", "jpeg"],
            MediaKind::Gif => &["gif"],
            MediaKind::Bmp => &["bmp"],
            MediaKind::Webp => &["webp"],
            MediaKind::Pdf => &["pdf"],
        }
    }

    /// Look up a kind by file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.extensions().contains(&ext.as_str()))
    }

    /// Detect the kind from the leading bytes of a file.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF-") {
            return Some(MediaKind::Pdf);
        }

        match image::guess_format(bytes).ok()? {
            ImageFormat::Png => Some(MediaKind::Png),
            ImageFormat::Jpeg => Some(MediaKind::Jpeg),
            ImageFormat::Gif => Some(MediaKind::Gif),
            ImageFormat::Bmp => Some(MediaKind::Bmp),
            ImageFormat::WebP => Some(MediaKind::Webp),
            _ => None,
        }
    }

    fn image_format(&self) -> Option<ImageFormat> {
        match self {
            MediaKind::Png => Some(ImageFormat::Png),
            MediaKind::Jpeg => Some(ImageFormat::Jpeg),
            MediaKind::Gif => Some(ImageFormat::Gif),
            MediaKind::Bmp => Some(ImageFormat::Bmp),
            MediaKind::Webp => Some(ImageFormat::WebP),
            MediaKind::Pdf => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extensions()[0])
    }
}

/// A document image (or PDF) ready for submission.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    bytes: Vec<u8>,
    kind: MediaKind,
    file_name: String,
}

impl ImagePayload {
    /// Create a payload with an explicitly declared kind.
    pub fn new(bytes: Vec<u8>, kind: MediaKind, file_name: impl Into<String>) -> Self {
        Self {
            bytes,
            kind,
            file_name: file_name.into(),
        }
    }

    /// Create a payload, detecting the kind from the content.
    ///
    /// Returns `None` when the bytes are not a supported image or PDF.
    pub fn from_bytes(bytes: Vec<u8>, file_name: impl Into<String>) -> Option<Self> {
        let kind = MediaKind::sniff(&bytes)?;
        Some(Self::new(bytes, kind, file_name))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Advisory original file name.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Return a copy of this payload carrying a different declared kind.
    pub fn with_kind(&self, kind: MediaKind) -> Self {
        Self {
            bytes: self.bytes.clone(),
            kind,
            file_name: self.file_name.clone(),
        }
    }

    /// Standard base64 encoding of the content.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// `data:` URL embedding the content.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.kind.mime_type(), self.to_base64())
    }

    /// Make sure the payload is in one of the `accepted` kinds.
    ///
    /// Raster images of any other kind are re-encoded as PNG. PDFs are never
    /// converted.
    pub fn normalized_for(&self, accepted: &[MediaKind]) -> Result<Cow<'_, ImagePayload>, image::ImageError> {
        if accepted.contains(&self.kind) || self.kind == MediaKind::Pdf {
            return Ok(Cow::Borrowed(self));
        }

        debug!("Transcoding {} payload to png", self.kind);

        let format = self.kind.image_format().unwrap_or(ImageFormat::Png);
        let decoded = image::load_from_memory_with_format(&self.bytes, format)?;

        let mut buf = Cursor::new(Vec::new());
        decoded.write_to(&mut buf, ImageFormat::Png)?;

        Ok(Cow::Owned(ImagePayload::new(
            buf.into_inner(),
            MediaKind::Png,
            self.file_name.clone(),
        )))
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("kind", &self.kind)
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}
