// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use circuit_harvester::config::SanitizerConfig;
use circuit_harvester::data_uri;
use circuit_harvester::sanitizer::{ImageUpload, Sanitizer};

#[derive(Debug, Arbitrary)]
enum DeclaredType {
    Jpeg,
    Png,
    Webp,
    Other(String),
}

#[derive(Debug, Arbitrary)]
struct Input {
    declared: DeclaredType,
    bytes: Vec<u8>,
    as_data_uri: bool,
}

fuzz_target!(|input: Input| {
    let mime_type = match input.declared {
        DeclaredType::Jpeg => "image/jpeg".to_string(),
        DeclaredType::Png => "image/png".to_string(),
        DeclaredType::Webp => "image/webp".to_string(),
        DeclaredType::Other(s) => s,
    };

    let config = SanitizerConfig {
        max_dimension: 256,
        ..SanitizerConfig::default()
    };
    let sanitizer = Sanitizer::new(&config);

    let upload = if input.as_data_uri {
        let uri = data_uri::encode(&mime_type, &input.bytes);
        match data_uri::parse(&uri) {
            Ok((mime, bytes)) => ImageUpload::new(mime, bytes),
            Err(_) => return,
        }
    } else {
        ImageUpload::new(mime_type, input.bytes)
    };

    // Anything that passes must come out as a bounded JPEG
    if let Ok(image) = sanitizer.sanitize(&upload) {
        assert!(image.data_uri.starts_with("data:image/jpeg;base64,"));
        assert!(image.width <= 256 && image.height <= 256);
    }
});
