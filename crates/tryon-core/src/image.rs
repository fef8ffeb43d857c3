//! Opaque image payloads exchanged with the backend.
//!
//! Images are treated as bytes plus a media type. They travel over the wire
//! as bare base64 (no data-URL prefix); display layers add the prefix via
//! [`ImagePayload::to_data_url`].

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TryOnError};

/// Media types the composer knows how to label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// PNG image.
    Png,
    /// JPEG image.
    Jpeg,
    /// WebP image.
    Webp,
    /// GIF image.
    Gif,
    /// HEIC/HEIF image (phone photos).
    Heic,
    /// Anything else.
    Unknown,
}

impl MediaType {
    /// Detects the media type from a file extension.
    ///
    /// Returns `None` if the extension is not recognized.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::Webp),
            "gif" => Some(Self::Gif),
            "heic" | "heif" => Some(Self::Heic),
            _ => None,
        }
    }

    /// Detects the media type from a file path's extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Sniffs the media type from the leading bytes of an image.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Self {
        match bytes {
            [0x89, b'P', b'N', b'G', ..] => Self::Png,
            [0xFF, 0xD8, 0xFF, ..] => Self::Jpeg,
            [b'G', b'I', b'F', b'8', ..] => Self::Gif,
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Self::Webp,
            [_, _, _, _, b'f', b't', b'y', b'p', brand @ ..]
                if brand.starts_with(b"heic")
                    || brand.starts_with(b"heix")
                    || brand.starts_with(b"mif1") =>
            {
                Self::Heic
            }
            _ => Self::Unknown,
        }
    }

    /// Returns the MIME string for this media type.
    #[must_use]
    pub const fn mime(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
            Self::Heic => "image/heic",
            Self::Unknown => "application/octet-stream",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// An immutable image shared cheaply between session snapshots.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    bytes: Arc<[u8]>,
    media_type: MediaType,
}

impl ImagePayload {
    /// Wraps raw bytes, sniffing the media type.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        let media_type = MediaType::sniff(&bytes);
        Self {
            bytes: bytes.into(),
            media_type,
        }
    }

    /// Wraps raw bytes with an explicit media type.
    #[must_use]
    pub fn with_media_type(bytes: impl Into<Vec<u8>>, media_type: MediaType) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            bytes: bytes.into(),
            media_type,
        }
    }

    /// Reads an image from disk.
    ///
    /// The media type is sniffed from content and falls back to the extension.
    ///
    /// # Errors
    ///
    /// Returns `TryOnError::ImageNotFound` if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TryOnError::image_not_found(path)
            } else {
                TryOnError::Io(e)
            }
        })?;

        let mut media_type = MediaType::sniff(&bytes);
        if media_type == MediaType::Unknown {
            media_type = MediaType::from_path(path).unwrap_or(MediaType::Unknown);
        }
        Ok(Self::with_media_type(bytes, media_type))
    }

    /// Decodes a base64 payload as produced by the backend.
    ///
    /// Tolerates a `data:...;base64,` prefix, embedded whitespace, the
    /// URL-safe alphabet, and missing padding.
    pub fn from_base64(encoded: &str) -> std::result::Result<Self, base64::DecodeError> {
        let normalized = normalize_base64(encoded);
        let bytes = BASE64_STANDARD.decode(normalized)?;
        Ok(Self::from_bytes(bytes))
    }

    /// Encodes the image as bare standard base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.bytes)
    }

    /// Encodes the image as a `data:` URL for display.
    #[must_use]
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type.mime(), self.to_base64())
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the media type.
    #[must_use]
    pub const fn media_type(&self) -> MediaType {
        self.media_type
    }

    /// Returns the payload size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("media_type", &self.media_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Drops a leading `data:<mime>[;params];base64,` header, if any.
fn strip_data_url(encoded: &str) -> &str {
    encoded
        .trim_start()
        .strip_prefix("data:")
        .and_then(|rest| rest.find(',').map(|comma| &rest[comma + 1..]))
        .unwrap_or(encoded)
}

/// Strips prefixes and repairs alphabet/padding so the standard engine accepts it.
fn normalize_base64(encoded: &str) -> String {
    let mut cleaned: String = strip_data_url(encoded)
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();

    let unpadded_len = cleaned.trim_end_matches('=').len();
    cleaned.truncate(unpadded_len);
    let remainder = unpadded_len % 4;
    if remainder != 0 {
        cleaned.extend(std::iter::repeat('=').take(4 - remainder));
    }
    cleaned
}
