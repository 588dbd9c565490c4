// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Configuration management for Circuit Harvester

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::capture::Facing;

/// Main application configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// AI engine configuration
    #[serde(default)]
    pub ai_engine: EngineConfig,

    /// Prompt templates
    #[serde(default)]
    pub prompts: PromptConfig,

    /// Upload sanitization limits
    #[serde(default)]
    pub sanitizer: SanitizerConfig,

    /// Camera capture settings
    #[serde(default)]
    pub camera: CameraConfig,

    /// Persisted session settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Training data upload settings
    #[serde(default)]
    pub training: TrainingConfig,

    /// Web UI settings
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    #[serde(default = "default_engine_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_analysis_prompt")]
    pub analysis: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SanitizerConfig {
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    #[serde(default = "default_sanitizer_quality")]
    pub jpeg_quality: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    #[serde(default = "default_camera_quality")]
    pub jpeg_quality: u8,
    #[serde(default)]
    pub facing: Facing,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_session_path")]
    pub path: String,
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TrainingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_training_delay")]
    pub simulated_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
}

// Default value functions
fn default_engine_url() -> String { "https://generativelanguage.googleapis.com/v1beta".to_string() }
fn default_model() -> String { "gemini-2.5-flash".to_string() }
fn default_api_key_env() -> String { "GOOGLE_API".to_string() }
fn default_timeout() -> u64 { 120 }
fn default_temperature() -> f32 { 0.4 }
fn default_allowed_mime_types() -> Vec<String> {
    vec!["image/jpeg", "image/png", "image/webp"]
        .into_iter().map(String::from).collect()
}
fn default_max_bytes() -> u64 { 10 * 1024 * 1024 }
fn default_max_dimension() -> u32 { 2048 }
fn default_sanitizer_quality() -> u8 { 85 }
fn default_camera_quality() -> u8 { 80 }
fn default_session_path() -> String { "circuit_harvester.db".to_string() }
fn default_session_ttl() -> u64 { 60 * 60 }
fn default_true() -> bool { true }
fn default_training_delay() -> u64 { 1500 }
fn default_web_host() -> String { "127.0.0.1".to_string() }
fn default_web_port() -> u16 { 8080 }

fn default_analysis_prompt() -> String {
    "Analyze this image of a circuit board or electronic device. \
     Identify the device by reading visible labels on the PCB or chips. \
     List the most useful components that a hobbyist could harvest for their own projects. \
     For each component, give its location as box_2d [ymin, xmin, ymax, xmax] normalized to 0-1000. \
     Provide specific project ideas for the harvested parts. \
     Be educational and inspire wonder about how it works. \
     Focus on identifying specific chips, motors, or sensors if visible.".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ai_engine: EngineConfig::default(),
            prompts: PromptConfig::default(),
            sanitizer: SanitizerConfig::default(),
            camera: CameraConfig::default(),
            session: SessionConfig::default(),
            training: TrainingConfig::default(),
            web: WebConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: default_engine_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout(),
            temperature: default_temperature(),
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            analysis: default_analysis_prompt(),
        }
    }
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            allowed_mime_types: default_allowed_mime_types(),
            max_bytes: default_max_bytes(),
            max_dimension: default_max_dimension(),
            jpeg_quality: default_sanitizer_quality(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_camera_quality(),
            facing: Facing::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: default_session_path(),
            ttl_secs: default_session_ttl(),
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            simulated_delay_ms: default_training_delay(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
        }
    }
}

impl EngineConfig {
    /// Read the API key from the configured environment variable.
    ///
    /// Falls back to `API_KEY`, which is what hosted deployments export.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .or_else(|| std::env::var("API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
    }
}

impl AppConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = serde_json::from_str(&content)
                .map_err(|e| crate::HarvesterError::Config(format!("Failed to parse config: {}", e)))?;
            config.validate()?;
            Ok(config)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> crate::Result<()> {
        if self.sanitizer.allowed_mime_types.is_empty() {
            return Err(crate::HarvesterError::Config(
                "sanitizer.allowed_mime_types must not be empty".to_string(),
            ));
        }
        if self.sanitizer.max_dimension == 0 {
            return Err(crate::HarvesterError::Config(
                "sanitizer.max_dimension must be positive".to_string(),
            ));
        }
        for (name, quality) in [
            ("sanitizer.jpeg_quality", self.sanitizer.jpeg_quality),
            ("camera.jpeg_quality", self.camera.jpeg_quality),
        ] {
            if !(1..=100).contains(&quality) {
                return Err(crate::HarvesterError::Config(format!(
                    "{} must be between 1 and 100, got {}",
                    name, quality
                )));
            }
        }
        Ok(())
    }
}
