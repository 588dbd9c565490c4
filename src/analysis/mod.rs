// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Circuit board analysis through a hosted multimodal model

pub mod gemini;
pub mod schema;

use async_trait::async_trait;
use tracing::error;

use crate::model::AnalysisResult;
use crate::{HarvesterError, Result};

pub use gemini::GeminiClient;

/// The only analysis error message the UI ever sees
pub const ANALYSIS_FAILED_MESSAGE: &str = "Failed to analyze the image. Please try again.";

/// A service that turns a sanitized image into an [`AnalysisResult`]
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Name of the backing model, for logs
    fn name(&self) -> &str;

    /// Analyze a `data:image/jpeg;base64,...` URI (bare base64 is accepted too).
    ///
    /// Every failure is reported as [`HarvesterError::AnalysisFailed`] with
    /// [`ANALYSIS_FAILED_MESSAGE`]; the cause is logged, not returned.
    async fn analyze(&self, image_data_uri: &str) -> Result<AnalysisResult>;
}

/// Strictly parse the model's JSON text.
///
/// A response missing any required field fails as a whole; partially
/// populated results are never returned.
pub fn parse_analysis(text: &str) -> Result<AnalysisResult> {
    let trimmed = strip_code_fence(text.trim());
    if trimmed.is_empty() {
        return Err(analysis_failed("No response from model."));
    }
    serde_json::from_str(trimmed).map_err(|e| analysis_failed(format!("Invalid analysis JSON: {}", e)))
}

/// Log `cause` and produce the generic user-facing error
pub(crate) fn analysis_failed(cause: impl std::fmt::Display) -> HarvesterError {
    error!("Analysis Error: {}", cause);
    HarvesterError::AnalysisFailed(ANALYSIS_FAILED_MESSAGE.to_string())
}

// JSON mode normally returns bare JSON, but some models still wrap it
fn strip_code_fence(text: &str) -> &str {
    let Some(body) = text.strip_prefix("```") else {
        return text;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}
