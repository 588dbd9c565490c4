// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Training data upload
//!
//! Ships each analyzed image with its part annotations to a data-collection
//! endpoint. There is no live endpoint yet: transmission is simulated by a
//! fixed delay. Uploads run in the background and never affect the analysis.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::TrainingConfig;
use crate::model::{AnalysisResult, BoundingBox};
use crate::Result;

/// Coarse description of the submitting client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMetadata {
    pub user_agent: String,
    pub platform: String,
}

impl ClientMetadata {
    /// Metadata for a request with the given `User-Agent` header
    pub fn from_user_agent(user_agent: Option<&str>) -> Self {
        Self {
            user_agent: user_agent
                .map(str::to_string)
                .unwrap_or_else(|| format!("circuit-harvester/{}", env!("CARGO_PKG_VERSION"))),
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }
}

/// One labelled region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    /// Part name
    pub label: String,
    /// Part type
    pub category: String,
    /// `[ymin, xmin, ymax, xmax]`, 0-1000; all zeros when the model gave none
    pub bounding_box: BoundingBox,
    pub description: String,
}

/// Document sent to the data-collection endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingPayload {
    pub image_id: Uuid,
    /// ISO-8601
    pub timestamp: String,
    pub metadata: ClientMetadata,
    pub annotations: Vec<Annotation>,
    /// The sanitized image exactly as analyzed, `data:` prefix included
    pub raw_image_base64: String,
}

/// Build the payload for one analyzed image
pub fn build_payload(image: &str, result: &AnalysisResult, metadata: ClientMetadata) -> TrainingPayload {
    TrainingPayload {
        image_id: Uuid::new_v4(),
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        metadata,
        annotations: result
            .parts
            .iter()
            .map(|part| Annotation {
                label: part.name.clone(),
                category: part.kind.clone(),
                bounding_box: part.box_2d.unwrap_or(BoundingBox::ZERO),
                description: part.description.clone(),
            })
            .collect(),
        raw_image_base64: image.to_string(),
    }
}

/// Background uploader
#[derive(Debug, Clone)]
pub struct TrainingUploader {
    enabled: bool,
    delay: Duration,
}

impl TrainingUploader {
    pub fn new(config: &TrainingConfig) -> Self {
        Self {
            enabled: config.enabled,
            delay: Duration::from_millis(config.simulated_delay_ms),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Upload one image and its annotations; resolves with the image id
    pub async fn upload(
        &self,
        image: &str,
        result: &AnalysisResult,
        metadata: ClientMetadata,
    ) -> Result<Uuid> {
        let payload = build_payload(image, result, metadata);
        info!("[Training Agent] Preparing to upload data for training...");

        // Simulated transmission
        let size = serde_json::to_vec(&payload)?.len();
        tokio::time::sleep(self.delay).await;

        info!("[Training Agent] Data successfully uploaded. Image ID: {}", payload.image_id);
        info!("[Training Agent] Payload size: {} bytes", size);
        Ok(payload.image_id)
    }

    /// Fire-and-forget upload. Failures are logged only.
    pub fn spawn(
        &self,
        image: String,
        result: AnalysisResult,
        metadata: ClientMetadata,
    ) -> Option<JoinHandle<()>> {
        if !self.enabled {
            return None;
        }

        let uploader = self.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = uploader.upload(&image, &result, metadata).await {
                warn!("[Training Agent] Upload failed: {}", e);
            }
        }))
    }
}
