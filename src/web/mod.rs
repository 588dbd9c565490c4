// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Web UI for Circuit Harvester

mod render;

use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Json, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::app::{AppController, Ticket};
use crate::config::AppConfig;
use crate::model::AnalysisState;
use crate::sanitizer::{too_large, ImageUpload};
use crate::shopping::{render_text, shopping_list, Selection};
use crate::training::ClientMetadata;
use crate::{HarvesterError, Result};

pub use render::Templates;

/// Shared application state
pub struct AppState {
    pub controller: Arc<AppController>,
    pub config: AppConfig,
    templates: Templates,
}

impl AppState {
    pub fn new(controller: Arc<AppController>, config: AppConfig) -> Result<Self> {
        Ok(Self {
            controller,
            config,
            templates: Templates::new()?,
        })
    }
}

/// Create the web application router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Camera frames arrive base64 encoded, a third larger than the file
    let body_limit = usize::try_from(state.config.sanitizer.max_bytes)
        .unwrap_or(usize::MAX)
        .saturating_mul(2);

    Router::new()
        // Pages
        .route("/", get(index_page))
        .route("/list", get(list_page))
        .route("/list.txt", get(list_text))
        // Actions
        .route("/scan", post(scan))
        .route("/reset", post(reset))
        // API endpoints
        .route("/api/state", get(api_state))
        .route("/api/capture", post(api_capture))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// === Page Handlers ===

async fn index_page(State(state): State<Arc<AppState>>) -> Response {
    page(state.templates.home(&state.controller.snapshot(), &state.config))
}

async fn list_page(State(state): State<Arc<AppState>>, RawQuery(query): RawQuery) -> Response {
    let snapshot = state.controller.snapshot();
    let Some(result) = snapshot.result.as_ref() else {
        return Redirect::to("/").into_response();
    };

    let selection = Selection::from_query(query.as_deref().unwrap_or_default());
    let entries = shopping_list(result, &selection);
    page(state.templates.list(result, &entries, &selection.to_query()))
}

async fn list_text(State(state): State<Arc<AppState>>, RawQuery(query): RawQuery) -> Response {
    let snapshot = state.controller.snapshot();
    let Some(result) = snapshot.result.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let selection = Selection::from_query(query.as_deref().unwrap_or_default());
    let text = render_text(result, &shopping_list(result, &selection));
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response()
}

fn page(rendered: Result<String>) -> Response {
    match rendered {
        Ok(body) => Html(body).into_response(),
        Err(e) => {
            error!("Failed to render page: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.user_message()).into_response()
        }
    }
}

// === Action Handlers ===

async fn scan(State(state): State<Arc<AppState>>, headers: HeaderMap, multipart: Multipart) -> Response {
    if state.controller.is_loading() {
        return busy();
    }

    let upload = match read_upload(multipart, state.config.sanitizer.max_bytes).await {
        Ok(upload) => upload,
        Err(e) => {
            state.controller.fail(&e);
            return Redirect::to("/").into_response();
        }
    };

    match state.controller.start_submission(upload).await {
        Ok((ticket, image)) => {
            spawn_analysis(&state, ticket, image, client_metadata(&headers));
            Redirect::to("/").into_response()
        }
        Err(HarvesterError::SubmissionInProgress) => busy(),
        // Already recorded in the state; the landing page shows it
        Err(_) => Redirect::to("/").into_response(),
    }
}

async fn reset(State(state): State<Arc<AppState>>) -> Redirect {
    state.controller.reset().await;
    Redirect::to("/")
}

fn busy() -> Response {
    (StatusCode::CONFLICT, HarvesterError::SubmissionInProgress.user_message()).into_response()
}

/// First `image` field of the upload form
async fn read_upload(mut multipart: Multipart, max_bytes: u64) -> Result<ImageUpload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let mime_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(|e| multipart_error(e, max_bytes))?;
        debug!("Received upload: {} ({} bytes)", mime_type, bytes.len());
        return Ok(ImageUpload::new(mime_type, bytes.to_vec()));
    }
    Err(malformed())
}

fn multipart_error(e: MultipartError, max_bytes: u64) -> HarvesterError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        too_large(max_bytes)
    } else {
        warn!("Unreadable upload: {}", e);
        malformed()
    }
}

fn malformed() -> HarvesterError {
    HarvesterError::SecurityViolation("Malformed image file detected.".to_string())
}

fn client_metadata(headers: &HeaderMap) -> ClientMetadata {
    ClientMetadata::from_user_agent(headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok()))
}

fn spawn_analysis(state: &Arc<AppState>, ticket: Ticket, image: String, metadata: ClientMetadata) {
    let controller = Arc::clone(&state.controller);
    tokio::spawn(async move {
        if let Err(e) = controller.run(ticket, image, metadata).await {
            debug!("Analysis finished with error: {}", e);
        }
    });
}

// === API Handlers ===

async fn api_state(State(state): State<Arc<AppState>>) -> Json<AnalysisState> {
    Json(state.controller.snapshot())
}

#[derive(Deserialize)]
struct CaptureRequest {
    /// `data:image/jpeg;base64,...` grabbed from the camera canvas
    image: String,
}

#[derive(Serialize)]
struct CaptureResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn api_error(status: StatusCode, err: &HarvesterError) -> Response {
    (status, Json(ErrorResponse { error: err.user_message() })).into_response()
}

async fn api_capture(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: std::result::Result<Json<CaptureRequest>, JsonRejection>,
) -> Response {
    if state.controller.is_loading() {
        return api_error(StatusCode::CONFLICT, &HarvesterError::SubmissionInProgress);
    }

    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let err = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                too_large(state.config.sanitizer.max_bytes)
            } else {
                malformed()
            };
            state.controller.fail(&err);
            return api_error(rejection.status(), &err);
        }
    };

    match state.controller.start_capture(&request.image).await {
        Ok((ticket, image)) => {
            spawn_analysis(&state, ticket, image, client_metadata(&headers));
            (StatusCode::ACCEPTED, Json(CaptureResponse { status: "loading" })).into_response()
        }
        Err(e @ HarvesterError::SubmissionInProgress) => api_error(StatusCode::CONFLICT, &e),
        Err(e) => api_error(StatusCode::UNPROCESSABLE_ENTITY, &e),
    }
}

/// Address the UI is served on
pub fn ui_url(config: &AppConfig) -> String {
    format!("http://{}:{}", config.web.host, config.web.port)
}

/// Open the UI in the desktop browser; failure is logged only
pub fn open_in_browser(config: &AppConfig) {
    let url = ui_url(config);
    if let Err(e) = launch_browser(&url) {
        warn!("Failed to open browser at {}: {}", url, e);
    }
}

fn launch_browser(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).spawn()?;
    }
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd").args(["/c", "start", url]).spawn()?;
    }
    Ok(())
}

/// Restore the last session, then serve until shut down
pub async fn start_server(config: AppConfig, controller: Arc<AppController>) -> Result<()> {
    controller.restore().await;

    let state = Arc::new(AppState::new(controller, config.clone())?);

    let addr = format!("{}:{}", config.web.host, config.web.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Web UI available at {}", ui_url(&config));

    let router = create_router(state);
    axum::serve(listener, router)
        .await
        .map_err(|e| HarvesterError::Service(format!("Server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisService;
    use crate::config::TrainingConfig;
    use crate::model::{AnalysisResult, BoundingBox, Harvestability, Part, Phase};
    use crate::sanitizer::Sanitizer;
    use crate::session::SessionStore;
    use crate::training::TrainingUploader;
    use crate::data_uri;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;
    use std::time::Duration;
    use tower::ServiceExt;

    struct RouterAnalyzer;

    #[async_trait]
    impl AnalysisService for RouterAnalyzer {
        fn name(&self) -> &str {
            "static"
        }

        async fn analyze(&self, _image: &str) -> Result<AnalysisResult> {
            Ok(AnalysisResult {
                device_name: "Test Router".into(),
                device_function: "Routes packets".into(),
                estimated_age: None,
                safety_warnings: vec!["Disconnect power".into()],
                parts: vec![
                    Part {
                        name: "CPU".into(),
                        kind: "Processor".into(),
                        description: "Main SoC".into(),
                        harvestability: Harvestability::Medium,
                        project_ideas: vec!["Home automation".into()],
                        box_2d: Some(BoundingBox([100.0, 100.0, 400.0, 400.0])),
                    },
                    Part {
                        name: "Ethernet Jack".into(),
                        kind: "Connector".into(),
                        description: "RJ45".into(),
                        harvestability: Harvestability::High,
                        project_ideas: vec!["Network tester".into()],
                        box_2d: None,
                    },
                ],
            })
        }
    }

    fn setup() -> (Arc<AppController>, Router) {
        let config = AppConfig {
            training: TrainingConfig {
                enabled: false,
                simulated_delay_ms: 0,
            },
            ..AppConfig::default()
        };
        let controller = Arc::new(AppController::new(
            Sanitizer::new(&config.sanitizer),
            Arc::new(RouterAnalyzer),
            SessionStore::in_memory(Duration::from_secs(3600)),
            TrainingUploader::new(&config.training),
        ));
        let state = Arc::new(AppState::new(Arc::clone(&controller), config).unwrap());
        (controller, create_router(state))
    }

    fn png_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(16, 16))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn scan_request(mime: &str, bytes: &[u8]) -> Request<Body> {
        let boundary = "harvester-test-boundary";
        let mut body = format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"board\"\r\nContent-Type: {mime}\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/scan")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
            .body(Body::from(body))
            .unwrap()
    }

    fn capture_request(image: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/capture")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::json!({ "image": image }).to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn settle(controller: &AppController) {
        for _ in 0..200 {
            if !controller.is_loading() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("analysis never finished");
    }

    #[tokio::test]
    async fn idle_home_shows_landing() {
        let (_, app) = setup();
        let response = app.oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Take Photo"));
    }

    #[tokio::test]
    async fn upload_runs_analysis_and_renders_results() {
        let (controller, app) = setup();

        let response = app.clone().oneshot(scan_request("image/png", &png_bytes())).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/");

        settle(&controller).await;
        assert_eq!(controller.phase(), Phase::Succeeded);

        let html = body_text(app.oneshot(get("/")).await.unwrap()).await;
        assert!(html.contains("Test Router"));
        assert!(html.contains("Disconnect power"));
        assert!(html.contains("View List"));
    }

    #[tokio::test]
    async fn disallowed_upload_shows_banner() {
        let (controller, app) = setup();

        let response = app.clone().oneshot(scan_request("image/gif", b"GIF89a")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(controller.phase(), Phase::Failed);

        let html = body_text(app.oneshot(get("/")).await.unwrap()).await;
        assert!(html.contains("Security Violation: File type image"));
    }

    #[tokio::test]
    async fn upload_while_loading_conflicts() {
        let (controller, app) = setup();
        controller.begin("data:image/jpeg;base64,AA==".into()).unwrap();

        let response = app.oneshot(scan_request("image/png", &png_bytes())).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(controller.is_loading());
    }

    #[tokio::test]
    async fn camera_capture_is_accepted() {
        let (controller, app) = setup();
        let uri = data_uri::encode("image/png", &png_bytes());

        let response = app.oneshot(capture_request(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        settle(&controller).await;
        assert_eq!(controller.phase(), Phase::Succeeded);
    }

    #[tokio::test]
    async fn malformed_capture_is_unprocessable() {
        let (controller, app) = setup();

        let response = app.oneshot(capture_request("data:image/jpeg;base64,!!!")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"], "Security Violation: Malformed image file detected.");
        assert_eq!(controller.phase(), Phase::Failed);
    }

    #[tokio::test]
    async fn list_shows_selected_parts_in_display_order() {
        let (controller, app) = setup();
        app.clone().oneshot(scan_request("image/png", &png_bytes())).await.unwrap();
        settle(&controller).await;

        let html = body_text(app.clone().oneshot(get("/list?part=1&part=0")).await.unwrap()).await;
        let cpu = html.find("1. CPU").unwrap();
        let jack = html.find("2. Ethernet Jack").unwrap();
        assert!(cpu < jack);

        let response = app.oneshot(get("/list.txt?part=1")).await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain; charset=utf-8");
        let text = body_text(response).await;
        assert!(text.contains("2. Ethernet Jack (Connector)"));
        assert!(!text.contains("CPU"));
    }

    #[tokio::test]
    async fn list_without_result_redirects_home() {
        let (_, app) = setup();
        let response = app.oneshot(get("/list?part=0")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn reset_returns_to_idle() {
        let (controller, app) = setup();
        app.clone().oneshot(scan_request("image/png", &png_bytes())).await.unwrap();
        settle(&controller).await;

        let response = app
            .oneshot(Request::builder().method("POST").uri("/reset").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(controller.phase(), Phase::Idle);
        assert_eq!(controller.sessions().load().await, None);
    }

    #[tokio::test]
    async fn api_state_reports_snapshot() {
        let (_, app) = setup();
        let response = app.oneshot(get("/api/state")).await.unwrap();
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["isLoading"], false);
        assert!(body["result"].is_null());
    }
}
