// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Application controller
//!
//! Owns the single [`AnalysisState`] and serializes every transition:
//!
//! ```text
//! idle ──submit──▶ loading ──ok──▶ succeeded ──reset──▶ idle
//!   ▲                 │                                  ▲
//!   └──── failed ◀────┴──err──            failed ──reset─┘
//! ```
//!
//! Only one analysis may be in flight. Each submission carries a ticket
//! stamped with the current generation; `reset` bumps the generation so a
//! response arriving afterwards is dropped instead of resurrecting old state.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::analysis::{AnalysisService, GeminiClient};
use crate::config::AppConfig;
use crate::model::{AnalysisResult, AnalysisState, Phase};
use crate::sanitizer::{ImageUpload, SanitizedImage, Sanitizer};
use crate::session::SessionStore;
use crate::training::{ClientMetadata, TrainingUploader};
use crate::{data_uri, HarvesterError, Result};

/// Proof that a submission was accepted, tied to the generation it started in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
}

#[derive(Default)]
struct Inner {
    state: AnalysisState,
    generation: u64,
}

/// Top-level state container and pipeline orchestrator
pub struct AppController {
    inner: Mutex<Inner>,
    sanitizer: Sanitizer,
    analyzer: Arc<dyn AnalysisService>,
    sessions: SessionStore,
    /// Held across a session write and across reset's clear, so a save
    /// that passed its generation check cannot land after the clear
    persist: tokio::sync::Mutex<()>,
    training: TrainingUploader,
    uploads: Mutex<Vec<JoinHandle<()>>>,
}

impl AppController {
    pub fn new(
        sanitizer: Sanitizer,
        analyzer: Arc<dyn AnalysisService>,
        sessions: SessionStore,
        training: TrainingUploader,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            sanitizer,
            analyzer,
            sessions,
            persist: tokio::sync::Mutex::new(()),
            training,
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(config: &AppConfig, analyzer: Arc<dyn AnalysisService>, sessions: SessionStore) -> Self {
        Self::new(
            Sanitizer::new(&config.sanitizer),
            analyzer,
            sessions,
            TrainingUploader::new(&config.training),
        )
    }

    /// Production wiring: the Gemini client and the configured session store.
    /// An unusable session database degrades to a process-local slot.
    pub fn open(config: &AppConfig) -> Result<Self> {
        let analyzer = GeminiClient::from_config(config)?;
        if !analyzer.has_api_key() {
            warn!(
                "No API key in ${}; analyses will fail until one is set",
                config.ai_engine.api_key_env
            );
        }

        let sessions = match SessionStore::open(&config.session) {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!("Session store unavailable ({}), sessions will not survive restarts", e);
                SessionStore::in_memory(config.session.ttl())
            }
        };

        Ok(Self::from_config(config, Arc::new(analyzer), sessions))
    }

    // State is always left consistent between statements, so a poisoned
    // lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> AnalysisState {
        self.lock().state.clone()
    }

    pub fn phase(&self) -> Phase {
        self.lock().state.phase()
    }

    pub fn is_loading(&self) -> bool {
        self.lock().state.is_loading
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    fn is_current(&self, ticket: Ticket) -> bool {
        self.lock().generation == ticket.generation
    }

    /// Adopt the persisted session, if any. Only applies while idle.
    pub async fn restore(&self) -> bool {
        let Some(restored) = self.sessions.load().await else {
            return false;
        };

        let mut inner = self.lock();
        if inner.state.phase() != Phase::Idle {
            return false;
        }
        info!("Restored previous session");
        inner.state = restored;
        true
    }

    /// Enter `loading` with a sanitized image
    pub fn begin(&self, image: String) -> Result<Ticket> {
        let mut inner = self.lock();
        if inner.state.is_loading {
            return Err(HarvesterError::SubmissionInProgress);
        }
        inner.state = AnalysisState {
            is_loading: true,
            error: None,
            result: None,
            image: Some(image),
        };
        debug!("Submission accepted (generation {})", inner.generation);
        Ok(Ticket {
            generation: inner.generation,
        })
    }

    /// Apply an analysis outcome. Returns `false` when the ticket is stale
    /// and the outcome was dropped.
    pub fn finish(&self, ticket: Ticket, outcome: &Result<AnalysisResult>) -> bool {
        let mut inner = self.lock();
        if inner.generation != ticket.generation || !inner.state.is_loading {
            info!("Discarding analysis response from a previous scan");
            return false;
        }

        inner.state.is_loading = false;
        match outcome {
            Ok(result) => {
                inner.state.result = Some(result.clone());
                inner.state.error = None;
            }
            Err(e) => {
                inner.state.result = None;
                inner.state.error = Some(e.user_message());
            }
        }
        true
    }

    /// Record a validation failure (rejected upload, camera error)
    pub fn fail(&self, error: &HarvesterError) {
        let mut inner = self.lock();
        if inner.state.is_loading {
            return;
        }
        inner.state = AnalysisState {
            error: Some(error.user_message()),
            ..AnalysisState::default()
        };
    }

    /// Back to idle; forget the persisted session.
    ///
    /// An analysis already in flight is not aborted, but its response will
    /// be discarded.
    pub async fn reset(&self) {
        {
            let mut inner = self.lock();
            inner.generation += 1;
            inner.state = AnalysisState::default();
        }
        let _persist = self.persist.lock().await;
        self.sessions.clear().await;
        info!("Reset to new scan");
    }

    /// Sanitize off the async runtime
    pub async fn sanitize(&self, upload: ImageUpload) -> Result<SanitizedImage> {
        let sanitizer = self.sanitizer.clone();
        tokio::task::spawn_blocking(move || sanitizer.sanitize(&upload))
            .await
            .map_err(|e| HarvesterError::Service(format!("Sanitizer task failed: {}", e)))?
    }

    /// Synchronous half of a submission: sanitize and enter `loading`.
    ///
    /// Validation errors are recorded in the state and returned; a second
    /// submission while one is in flight is rejected without touching state.
    pub async fn start_submission(&self, upload: ImageUpload) -> Result<(Ticket, String)> {
        if self.is_loading() {
            return Err(HarvesterError::SubmissionInProgress);
        }

        let image = match self.sanitize(upload).await {
            Ok(image) => image,
            Err(e) => {
                warn!("Upload rejected: {}", e);
                self.fail(&e);
                return Err(e);
            }
        };

        let ticket = self.begin(image.data_uri.clone())?;
        Ok((ticket, image.data_uri))
    }

    /// [`start_submission`](Self::start_submission) for a camera frame delivered as a data URI
    pub async fn start_capture(&self, uri: &str) -> Result<(Ticket, String)> {
        match data_uri::parse(uri) {
            Ok((mime_type, bytes)) => self.start_submission(ImageUpload::new(mime_type, bytes)).await,
            Err(e) => {
                if !self.is_loading() {
                    self.fail(&e);
                }
                Err(e)
            }
        }
    }

    /// Asynchronous half: call the model, apply the outcome, then persist
    /// and hand the result to the training uploader.
    pub async fn run(&self, ticket: Ticket, image: String, metadata: ClientMetadata) -> Result<AnalysisResult> {
        info!("Analyzing image with {}", self.analyzer.name());
        let outcome = self.analyzer.analyze(&image).await;

        if !self.finish(ticket, &outcome) {
            return outcome;
        }

        if let Ok(result) = &outcome {
            let completed = AnalysisState {
                is_loading: false,
                error: None,
                result: Some(result.clone()),
                image: Some(image.clone()),
            };
            {
                let _persist = self.persist.lock().await;
                if self.is_current(ticket) {
                    self.sessions.save(&completed).await;
                }
            }
            if let Some(upload) = self.training.spawn(image, result.clone(), metadata) {
                self.track_upload(upload);
            }
        }
        outcome
    }

    fn track_upload(&self, upload: JoinHandle<()>) {
        let mut uploads = self.uploads.lock().unwrap_or_else(|e| e.into_inner());
        uploads.retain(|task| !task.is_finished());
        uploads.push(upload);
    }

    /// Training uploads still running in the background
    pub fn pending_uploads(&self) -> usize {
        let uploads = self.uploads.lock().unwrap_or_else(|e| e.into_inner());
        uploads.iter().filter(|task| !task.is_finished()).count()
    }

    /// Wait for background training uploads. One-shot commands call this
    /// before the runtime shuts down; the server leaves them detached.
    pub async fn drain_uploads(&self) {
        let uploads = std::mem::take(&mut *self.uploads.lock().unwrap_or_else(|e| e.into_inner()));
        if !uploads.is_empty() {
            debug!("Waiting for {} training upload(s)", uploads.len());
        }
        for upload in uploads {
            if let Err(e) = upload.await {
                warn!("[Training Agent] Upload task failed: {}", e);
            }
        }
    }

    /// Whole pipeline for one upload
    pub async fn submit(&self, upload: ImageUpload, metadata: ClientMetadata) -> Result<AnalysisResult> {
        let (ticket, image) = self.start_submission(upload).await?;
        self.run(ticket, image, metadata).await
    }

    /// Whole pipeline for one camera frame
    pub async fn submit_data_uri(&self, uri: &str, metadata: ClientMetadata) -> Result<AnalysisResult> {
        let (ticket, image) = self.start_capture(uri).await?;
        self.run(ticket, image, metadata).await
    }
}
