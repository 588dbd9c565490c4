// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Gemini `generateContent` client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{analysis_failed, parse_analysis, schema, AnalysisService};
use crate::config::{AppConfig, EngineConfig};
use crate::model::AnalysisResult;
use crate::{data_uri, HarvesterError, Result};

/// Gemini API client
pub struct GeminiClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
    prompt: String,
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
    Text {
        text: &'a str,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'static str,
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: serde_json::Value,
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

impl GeminiClient {
    /// Create a client from engine settings and the analysis prompt.
    ///
    /// The API key is read from the environment now; a missing key only
    /// fails when an analysis is attempted.
    pub fn new(engine: &EngineConfig, prompt: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(engine.timeout_secs))
            .build()
            .map_err(|e| HarvesterError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: engine.url.trim_end_matches('/').to_string(),
            model: engine.model.clone(),
            api_key: engine.api_key(),
            api_key_env: engine.api_key_env.clone(),
            prompt: prompt.to_string(),
            temperature: engine.temperature,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(&config.ai_engine, &config.prompts.analysis)
    }

    /// Override the key picked up from the environment
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// One request/response exchange; returns the model's raw text
    async fn generate(&self, image_base64: &str) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            HarvesterError::Config(format!("API key not set (export {})", self.api_key_env))
        })?;

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    RequestPart::InlineData {
                        inline_data: InlineData {
                            mime_type: "image/jpeg",
                            data: image_base64,
                        },
                    },
                    RequestPart::Text { text: &self.prompt },
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: schema::response_schema(),
                temperature: self.temperature,
            },
        };

        debug!("Sending vision request to Gemini: model={}", self.model);

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HarvesterError::Service(format!(
                "Gemini returned status {}: {}",
                status,
                body.chars().take(500).collect::<String>()
            )));
        }

        let result: GenerateResponse = response.json().await?;
        result
            .text()
            .ok_or_else(|| HarvesterError::Service("No response from Gemini.".to_string()))
    }
}

#[async_trait]
impl AnalysisService for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn analyze(&self, image_data_uri: &str) -> Result<AnalysisResult> {
        let image_base64 = data_uri::strip_prefix(image_data_uri);
        let text = self.generate(image_base64).await.map_err(analysis_failed)?;
        let result = parse_analysis(&text)?;
        info!(
            "Identified '{}' with {} parts ({} safety warnings)",
            result.device_name,
            result.parts.len(),
            result.safety_warnings.len()
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ANALYSIS_FAILED_MESSAGE;
    use mockito::Matcher;

    const PATH: &str = "/models/gemini-2.5-flash:generateContent";
    const IMAGE: &str = "data:image/jpeg;base64,AAAA";

    fn client(url: &str) -> GeminiClient {
        let engine = EngineConfig {
            url: url.to_string(),
            ..EngineConfig::default()
        };
        GeminiClient::new(&engine, "Analyze this board.").unwrap().with_api_key("test-key")
    }

    fn wrap(text: &str) -> String {
        serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": text }] } }]
        })
        .to_string()
    }

    fn assert_generic_failure(result: Result<AnalysisResult>) {
        match result {
            Err(HarvesterError::AnalysisFailed(msg)) => assert_eq!(msg, ANALYSIS_FAILED_MESSAGE),
            other => panic!("expected AnalysisFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sends_image_prompt_and_schema() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", PATH)
            .match_header("x-goog-api-key", "test-key")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#""inlineData":\{"mimeType":"image/jpeg","data":"AAAA"\}"#.to_string()),
                Matcher::Regex(r#""text":"Analyze this board\.""#.to_string()),
                Matcher::Regex(r#""responseMimeType":"application/json""#.to_string()),
                Matcher::Regex(r#""responseSchema":\{"#.to_string()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(wrap(
                r#"{"deviceName":"Test Router","deviceFunction":"...","safetyWarnings":["Disconnect power"],
                    "parts":[{"name":"CPU","type":"Processor","description":"...","harvestability":"Medium","projectIdeas":["Home automation"]}]}"#,
            ))
            .create_async()
            .await;

        let result = client(&server.url()).analyze(IMAGE).await.unwrap();
        assert_eq!(result.device_name, "Test Router");
        assert_eq!(result.parts.len(), 1);
        assert_eq!(result.safety_warnings, vec!["Disconnect power".to_string()]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_required_field_is_analysis_failed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(200)
            .with_body(wrap(r#"{"deviceName":"Test Router","safetyWarnings":[],"parts":[]}"#))
            .create_async()
            .await;

        assert_generic_failure(client(&server.url()).analyze(IMAGE).await);
    }

    #[tokio::test]
    async fn empty_candidates_is_analysis_failed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(200)
            .with_body(r#"{"candidates":[]}"#)
            .create_async()
            .await;

        assert_generic_failure(client(&server.url()).analyze(IMAGE).await);
    }

    #[tokio::test]
    async fn server_error_does_not_leak_details() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", PATH)
            .with_status(500)
            .with_body("internal quota detail")
            .create_async()
            .await;

        let err = client(&server.url()).analyze(IMAGE).await.unwrap_err();
        assert!(!err.to_string().contains("quota"));
        assert_generic_failure(Err(err));
    }

    #[tokio::test]
    async fn unreachable_service_is_analysis_failed() {
        assert_generic_failure(client("http://127.0.0.1:1").analyze(IMAGE).await);
    }

    #[tokio::test]
    async fn missing_api_key_is_analysis_failed() {
        let engine = EngineConfig {
            url: "http://127.0.0.1:1".to_string(),
            api_key_env: "CIRCUIT_HARVESTER_TEST_UNSET_KEY".to_string(),
            ..EngineConfig::default()
        };
        let mut client = GeminiClient::new(&engine, "prompt").unwrap();
        client.api_key = None;
        assert_generic_failure(client.analyze(IMAGE).await);
    }

    #[test]
    fn response_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(response.text().as_deref(), Some("{\"a\":1}"));
    }
}
