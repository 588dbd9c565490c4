// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Circuit Harvester: salvage guide for old electronics
//!
//! Takes a photo of a circuit board, sanitizes it, asks a multimodal model to
//! identify the device and its harvestable components, and presents the
//! result as an annotated image with a printable shopping list. The last
//! completed analysis survives restarts for one hour.

pub mod analysis;
pub mod app;
pub mod capture;
pub mod config;
pub mod data_uri;
pub mod error;
pub mod model;
pub mod sanitizer;
pub mod session;
pub mod shopping;
pub mod training;
pub mod web;

pub use app::AppController;
pub use config::AppConfig;
pub use error::{HarvesterError, Result};
