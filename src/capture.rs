// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Camera capture path
//!
//! The camera hardware is a capability provider behind [`CameraDevice`].
//! A [`CameraSession`] owns the live stream and stops it when dropped, so the
//! device is released after a capture, a cancel or an error alike.

use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, error};

use crate::config::CameraConfig;
use crate::sanitizer::encode_jpeg;
use crate::{data_uri, HarvesterError, Result};

const CAMERA_UNAVAILABLE: &str = "Unable to access camera. Please ensure permissions are granted.";

/// Which physical camera to request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Back camera, pointed at the board
    #[default]
    Environment,
    User,
}

impl Facing {
    /// Value for the browser's `facingMode` constraint
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Environment => "environment",
            Self::User => "user",
        }
    }
}

/// A live video stream handed out by a [`CameraDevice`]
pub trait VideoStream: Send {
    /// Native resolution of the stream
    fn resolution(&self) -> (u32, u32);

    /// Copy of the most recent frame
    fn current_frame(&mut self) -> Result<RgbImage>;

    /// Release the underlying hardware
    fn stop(&mut self);
}

/// Access to camera hardware
pub trait CameraDevice: Send + Sync {
    /// Request a stream; fails when permission is denied or no device exists
    fn open(&self, facing: Facing) -> Result<Box<dyn VideoStream>>;
}

/// An open camera, stopped on drop
pub struct CameraSession {
    stream: Option<Box<dyn VideoStream>>,
    quality: u8,
}

impl CameraSession {
    /// Open the configured camera
    pub fn start(device: &dyn CameraDevice, config: &CameraConfig) -> Result<Self> {
        match device.open(config.facing) {
            Ok(stream) => {
                let (width, height) = stream.resolution();
                debug!("Camera stream started ({}, {}x{})", config.facing.as_str(), width, height);
                Ok(Self {
                    stream: Some(stream),
                    quality: config.jpeg_quality,
                })
            }
            Err(e) => {
                error!("Camera Error: {}", e);
                Err(HarvesterError::CameraUnavailable(CAMERA_UNAVAILABLE.to_string()))
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.stream.is_some()
    }

    /// Grab the current frame at native resolution as a JPEG data URI.
    ///
    /// Consumes the session: the stream is stopped whether or not the grab
    /// succeeds.
    pub fn capture(mut self) -> Result<String> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| HarvesterError::CameraUnavailable(CAMERA_UNAVAILABLE.to_string()))?;

        let (width, height) = stream.resolution();
        if width == 0 || height == 0 {
            return Err(HarvesterError::CameraUnavailable(
                "Camera is not ready yet. Please try again.".to_string(),
            ));
        }

        let frame = stream.current_frame().map_err(|e| {
            error!("Camera Error: {}", e);
            HarvesterError::CameraUnavailable(CAMERA_UNAVAILABLE.to_string())
        })?;
        let still = if frame.dimensions() == (width, height) {
            frame
        } else {
            imageops::resize(&frame, width, height, imageops::FilterType::Triangle)
        };

        let jpeg = encode_jpeg(&still, self.quality)?;
        Ok(data_uri::encode("image/jpeg", &jpeg))
    }

    /// Dismiss without capturing
    pub fn close(self) {}
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            debug!("Camera stream stopped");
        }
    }
}

/// Camera backed by a still frame on disk that an external grabber keeps
/// fresh (`fswebcam`, `libcamera-still --timelapse`, a v4l2 loopback dump)
#[derive(Debug, Clone)]
pub struct FrameFileCamera {
    path: PathBuf,
}

impl FrameFileCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CameraDevice for FrameFileCamera {
    fn open(&self, facing: Facing) -> Result<Box<dyn VideoStream>> {
        if facing != Facing::Environment {
            debug!("Frame file camera ignores facing mode {}", facing.as_str());
        }
        let frame = image::open(&self.path)?.to_rgb8();
        Ok(Box::new(FrameFileStream {
            path: self.path.clone(),
            resolution: frame.dimensions(),
        }))
    }
}

struct FrameFileStream {
    path: PathBuf,
    resolution: (u32, u32),
}

impl VideoStream for FrameFileStream {
    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    fn current_frame(&mut self) -> Result<RgbImage> {
        Ok(image::open(&self.path)?.to_rgb8())
    }

    fn stop(&mut self) {
        debug!("Released frame source {}", self.path.display());
    }
}
