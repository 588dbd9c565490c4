// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Upload sanitization
//!
//! Every image entering the pipeline is decoded to pixels and redrawn onto a
//! fresh buffer before it is re-encoded as JPEG. Nothing from the original
//! file survives except pixel values: EXIF blocks, appended payloads and any
//! byte-level steganography are dropped along with the container.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{GenericImageView, ImageFormat, RgbImage};
use tracing::{debug, warn};

use crate::config::SanitizerConfig;
use crate::{data_uri, HarvesterError, Result};

/// A raw file as received from the file picker or an upload form
#[derive(Debug, Clone)]
pub struct ImageUpload {
    /// Declared media type, e.g. `image/png`
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into().trim().to_ascii_lowercase(),
            bytes,
        }
    }

    /// Guess the declared type from a file extension, as a browser would
    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let mime_type = ImageFormat::from_path(path)
            .map(|f| f.to_mime_type().to_string())
            .unwrap_or_else(|_| "application/octet-stream".to_string());
        Ok(Self::new(mime_type, bytes))
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Re-encoded image, safe to hand to the analysis client
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedImage {
    /// `data:image/jpeg;base64,...`
    pub data_uri: String,
    pub width: u32,
    pub height: u32,
}

/// Validates and re-encodes uploads
#[derive(Debug, Clone)]
pub struct Sanitizer {
    allowed_mime_types: Vec<String>,
    max_bytes: u64,
    max_dimension: u32,
    quality: u8,
}

impl Sanitizer {
    pub fn new(config: &SanitizerConfig) -> Self {
        Self {
            allowed_mime_types: config
                .allowed_mime_types
                .iter()
                .map(|m| m.to_ascii_lowercase())
                .collect(),
            max_bytes: config.max_bytes,
            max_dimension: config.max_dimension,
            quality: config.jpeg_quality,
        }
    }

    /// Check the declared type and size without touching the bytes
    pub fn validate(&self, upload: &ImageUpload) -> Result<ImageFormat> {
        if !self.allowed_mime_types.iter().any(|m| *m == upload.mime_type) {
            return Err(HarvesterError::SecurityViolation(format!(
                "File type {} is not allowed. Please upload JPG, PNG, or WebP.",
                if upload.mime_type.is_empty() { "(unknown)" } else { &upload.mime_type }
            )));
        }

        if upload.len() >= self.max_bytes {
            return Err(too_large(self.max_bytes));
        }

        ImageFormat::from_mime_type(&upload.mime_type).ok_or_else(|| {
            HarvesterError::SecurityViolation(format!(
                "File type {} is not allowed. Please upload JPG, PNG, or WebP.",
                upload.mime_type
            ))
        })
    }

    /// Validate, decode, downscale and re-encode an upload
    pub fn sanitize(&self, upload: &ImageUpload) -> Result<SanitizedImage> {
        let format = self.validate(upload)?;

        let decoded = image::load_from_memory_with_format(&upload.bytes, format).map_err(|e| {
            warn!("Rejected malformed {} upload: {}", upload.mime_type, e);
            HarvesterError::SecurityViolation("Malformed image file detected.".to_string())
        })?;

        let (src_width, src_height) = decoded.dimensions();
        let (width, height) = scaled_dimensions(src_width, src_height, self.max_dimension);
        debug!(
            "Sanitizing {} image {}x{} -> {}x{}",
            upload.mime_type, src_width, src_height, width, height
        );

        // Fresh RGB canvas: alpha is flattened and no source buffer is reused
        let pixels = decoded.to_rgb8();
        let canvas: RgbImage = if (width, height) == (src_width, src_height) {
            pixels
        } else {
            imageops::resize(&pixels, width, height, FilterType::Triangle)
        };

        let jpeg = encode_jpeg(&canvas, self.quality)?;
        Ok(SanitizedImage {
            data_uri: data_uri::encode("image/jpeg", &jpeg),
            width,
            height,
        })
    }
}

/// Rejection for an upload at or over `max_bytes`
pub fn too_large(max_bytes: u64) -> HarvesterError {
    HarvesterError::SecurityViolation(format!("File size exceeds {}MB limit.", max_bytes / (1024 * 1024)))
}

/// Encode an RGB buffer as baseline JPEG at the given quality (1-100)
pub fn encode_jpeg(canvas: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(canvas)?;
    Ok(buffer)
}

/// Fit `width x height` inside a `max x max` square, preserving aspect ratio.
///
/// Images already inside the square are returned unchanged; larger images
/// have their longer side set to `max`.
pub fn scaled_dimensions(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }

    let scale = |short: u32, long: u32| -> u32 {
        let scaled = (short as f64 * max as f64 / long as f64).round() as u32;
        scaled.max(1)
    };

    if width > height {
        (max, scale(height, width))
    } else {
        (scale(width, height), max)
    }
}
