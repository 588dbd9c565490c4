// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for Circuit Harvester

use thiserror::Error;

/// Result type alias for Circuit Harvester operations
pub type Result<T> = std::result::Result<T, HarvesterError>;

/// Circuit Harvester error types
#[derive(Error, Debug)]
pub enum HarvesterError {
    /// Rejected input image (type, size or malformed bytes)
    #[error("Security Violation: {0}")]
    SecurityViolation(String),

    #[error("{0}")]
    CameraUnavailable(String),

    /// Analysis failed; the message is safe to show to the user
    #[error("{0}")]
    AnalysisFailed(String),

    #[error("An analysis is already in progress. Please wait for it to finish.")]
    SubmissionInProgress,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("API error: {0}")]
    Api(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
}

impl HarvesterError {
    /// Whether this error carries a message meant for the user
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::SecurityViolation(_)
                | Self::CameraUnavailable(_)
                | Self::AnalysisFailed(_)
                | Self::SubmissionInProgress
        )
    }

    /// Message rendered in the UI. Internal errors collapse to a generic line.
    pub fn user_message(&self) -> String {
        if self.is_user_facing() {
            self.to_string()
        } else {
            "An unexpected error occurred.".to_string()
        }
    }
}
