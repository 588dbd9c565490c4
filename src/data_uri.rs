// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! `data:` URI helpers for base64 encoded images

use base64::{engine::general_purpose, Engine as _};

use crate::{HarvesterError, Result};

/// Build `data:<mime>;base64,<payload>`
pub fn encode(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type, general_purpose::STANDARD.encode(bytes))
}

/// Return the raw base64 payload, with or without a `data:image/...;base64,` prefix
pub fn strip_prefix(uri: &str) -> &str {
    match uri.strip_prefix("data:") {
        Some(rest) => match rest.split_once(";base64,") {
            Some((_, payload)) => payload,
            None => uri,
        },
        None => uri,
    }
}

/// Split a data URI into its declared MIME type and decoded bytes
pub fn parse(uri: &str) -> Result<(String, Vec<u8>)> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| HarvesterError::SecurityViolation("Malformed image file detected.".to_string()))?;
    let (mime_type, payload) = rest
        .split_once(";base64,")
        .ok_or_else(|| HarvesterError::SecurityViolation("Malformed image file detected.".to_string()))?;
    let bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|_| HarvesterError::SecurityViolation("Malformed image file detected.".to_string()))?;
    Ok((mime_type.to_ascii_lowercase(), bytes))
}
