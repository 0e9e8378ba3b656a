use std::fmt;
use std::fs;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::{AdGenError, Result};

/// Upload formats the generation endpoint accepts for the product photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageMimeType {
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/webp")]
    Webp,
}

impl ImageMimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageMimeType::Png => "image/png",
            ImageMimeType::Jpeg => "image/jpeg",
            ImageMimeType::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageMimeType::Png => "png",
            ImageMimeType::Jpeg => "jpg",
            ImageMimeType::Webp => "webp",
        }
    }

    pub fn parse(mime_type: &str) -> Result<Self> {
        match mime_type.trim().to_ascii_lowercase().as_str() {
            "image/png" => Ok(ImageMimeType::Png),
            "image/jpeg" | "image/jpg" => Ok(ImageMimeType::Jpeg),
            "image/webp" => Ok(ImageMimeType::Webp),
            other => Err(AdGenError::InvalidInput(format!(
                "Unsupported image format '{}'. Use PNG, JPG, or WEBP.",
                other
            ))),
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(ImageMimeType::Png),
            "jpg" | "jpeg" => Some(ImageMimeType::Jpeg),
            "webp" => Some(ImageMimeType::Webp),
            _ => None,
        }
    }

    /// Detects the format from the file signature.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(ImageMimeType::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageMimeType::Jpeg)
        } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageMimeType::Webp)
        } else {
            None
        }
    }
}

impl fmt::Display for ImageMimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The product photo as raw bytes. Base64 only happens on the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: ImageMimeType,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ImagePayload {
    pub fn new(mime_type: &str, bytes: Vec<u8>) -> Result<Self> {
        let mime_type = ImageMimeType::parse(mime_type)?;
        Self::from_parts(mime_type, bytes)
    }

    pub fn from_parts(mime_type: ImageMimeType, bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(AdGenError::InvalidInput("The image file is empty.".into()));
        }
        Ok(Self { mime_type, bytes })
    }

    /// Reads an image from disk. The signature wins over the extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| {
            AdGenError::InvalidInput(format!(
                "Failed to read the image file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mime_type = ImageMimeType::sniff(&bytes)
            .or_else(|| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .and_then(ImageMimeType::from_extension)
            })
            .ok_or_else(|| {
                AdGenError::InvalidInput(format!(
                    "Unsupported image format for {}. Use PNG, JPG, or WEBP.",
                    path.display()
                ))
            })?;

        Self::from_parts(mime_type, bytes)
    }

    /// Parses `data:<mime>;base64,<data>`, the form browsers hand out for uploads.
    pub fn from_data_url(data_url: &str) -> Result<Self> {
        let rest = data_url
            .strip_prefix("data:")
            .ok_or_else(|| AdGenError::InvalidInput("Not a data URL.".into()))?;
        let (header, data) = rest
            .split_once(',')
            .ok_or_else(|| AdGenError::InvalidInput("Malformed data URL.".into()))?;
        let mime_type = header.strip_suffix(";base64").ok_or_else(|| {
            AdGenError::InvalidInput("Only base64 data URLs are supported.".into())
        })?;

        let bytes = STANDARD
            .decode(data.trim())
            .map_err(|e| AdGenError::InvalidInput(format!("Invalid base64 image data: {}", e)))?;
        Self::new(mime_type, bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}
