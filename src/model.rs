// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Domain model shared by the pipeline, the session store and the UI

use serde::{Deserialize, Serialize};
use std::fmt;

/// How easy and worthwhile a component is to remove and reuse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Harvestability {
    High,
    Medium,
    Low,
}

impl Harvestability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

impl fmt::Display for Harvestability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `[ymin, xmin, ymax, xmax]`, each normalized to a 0-1000 space.
///
/// Ordering of the corners is expected but not enforced; the model is
/// free to send degenerate boxes and the UI clamps them when drawing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoundingBox(pub [f64; 4]);

/// CSS placement of a box as percentages of the rendered image
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PercentRect {
    pub top: f64,
    pub left: f64,
    pub height: f64,
    pub width: f64,
}

impl BoundingBox {
    pub const ZERO: BoundingBox = BoundingBox([0.0; 4]);

    pub fn ymin(&self) -> f64 { self.0[0] }
    pub fn xmin(&self) -> f64 { self.0[1] }
    pub fn ymax(&self) -> f64 { self.0[2] }
    pub fn xmax(&self) -> f64 { self.0[3] }

    pub fn percent_rect(&self) -> PercentRect {
        let clamp = |v: f64| v.clamp(0.0, 1000.0) / 10.0;
        PercentRect {
            top: clamp(self.ymin()),
            left: clamp(self.xmin()),
            height: (clamp(self.ymax()) - clamp(self.ymin())).max(0.0),
            width: (clamp(self.xmax()) - clamp(self.xmin())).max(0.0),
        }
    }
}

/// One harvestable component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub harvestability: Harvestability,
    pub project_ideas: Vec<String>,
    #[serde(rename = "box_2d", default, skip_serializing_if = "Option::is_none")]
    pub box_2d: Option<BoundingBox>,
}

/// One completed analysis, produced from a single model response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub device_name: String,
    pub device_function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_age: Option<String>,
    pub safety_warnings: Vec<String>,
    pub parts: Vec<Part>,
}

/// UI-facing state owned by the application controller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisState {
    pub is_loading: bool,
    pub error: Option<String>,
    pub result: Option<AnalysisResult>,
    /// Sanitized source image as a data URI
    pub image: Option<String>,
}

/// Screen the presentation layer should show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Loading,
    Succeeded,
    Failed,
}

impl AnalysisState {
    pub fn phase(&self) -> Phase {
        if self.is_loading {
            Phase::Loading
        } else if self.result.is_some() {
            Phase::Succeeded
        } else if self.error.is_some() {
            Phase::Failed
        } else {
            Phase::Idle
        }
    }

    /// Whether there is anything worth persisting
    pub fn is_persistable(&self) -> bool {
        self.result.is_some() || self.image.is_some()
    }
}

/// Identifier of the single persisted session slot
pub const LATEST_SESSION_ID: &str = "latest";

/// Persisted record wrapping the last completed analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub id: String,
    /// Creation time, epoch milliseconds
    pub timestamp: i64,
    pub state: AnalysisState,
}

impl StoredSession {
    pub fn latest(state: AnalysisState, timestamp: i64) -> Self {
        Self {
            id: LATEST_SESSION_ID.to_string(),
            timestamp,
            state,
        }
    }
}
