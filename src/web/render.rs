// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Page rendering

use minijinja::{context, Environment};
use serde::Serialize;

use crate::config::AppConfig;
use crate::model::{AnalysisResult, AnalysisState, PercentRect, Phase};
use crate::shopping::ListEntry;
use crate::Result;

const LOADING_REFRESH_SECS: u32 = 2;

/// A part as shown on the results page
#[derive(Debug, Serialize)]
struct PartView<'a> {
    index: usize,
    number: usize,
    name: &'a str,
    kind: &'a str,
    description: &'a str,
    harvestability: &'static str,
    ideas: &'a [String],
    /// Inline CSS placing the numbered overlay, absent when the model gave no box
    style: Option<String>,
}

fn overlay_style(rect: &PercentRect) -> String {
    format!(
        "top: {:.2}%; left: {:.2}%; height: {:.2}%; width: {:.2}%;",
        rect.top, rect.left, rect.height, rect.width
    )
}

fn part_views(result: &AnalysisResult) -> Vec<PartView<'_>> {
    result
        .parts
        .iter()
        .enumerate()
        .map(|(index, part)| PartView {
            index,
            number: index + 1,
            name: &part.name,
            kind: &part.kind,
            description: &part.description,
            harvestability: part.harvestability.as_str(),
            ideas: &part.project_ideas,
            style: part.box_2d.map(|b| overlay_style(&b.percent_rect())),
        })
        .collect()
}

/// Compiled page templates, autoescaped as HTML
pub struct Templates {
    env: Environment<'static>,
}

impl Templates {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("base.html", include_str!("templates/base.html"))?;
        env.add_template("landing.html", include_str!("templates/landing.html"))?;
        env.add_template("loading.html", include_str!("templates/loading.html"))?;
        env.add_template("results.html", include_str!("templates/results.html"))?;
        env.add_template("list.html", include_str!("templates/list.html"))?;
        Ok(Self { env })
    }

    /// The main page for whatever phase the app is in
    pub fn home(&self, state: &AnalysisState, config: &AppConfig) -> Result<String> {
        match (state.phase(), &state.result) {
            (Phase::Loading, _) => self.loading(state),
            (Phase::Succeeded, Some(result)) => self.results(result, state.image.as_deref()),
            _ => self.landing(state.error.as_deref(), config),
        }
    }

    pub fn landing(&self, error: Option<&str>, config: &AppConfig) -> Result<String> {
        let tmpl = self.env.get_template("landing.html")?;
        Ok(tmpl.render(context! {
            error => error,
            accept => config.sanitizer.allowed_mime_types.join(","),
            max_mb => config.sanitizer.max_bytes / (1024 * 1024),
            facing => config.camera.facing.as_str(),
            camera_quality => f64::from(config.camera.jpeg_quality) / 100.0,
            camera_error => "Unable to access camera. Please ensure permissions are granted.",
        })?)
    }

    pub fn loading(&self, state: &AnalysisState) -> Result<String> {
        let tmpl = self.env.get_template("loading.html")?;
        Ok(tmpl.render(context! {
            image => state.image,
            refresh_secs => LOADING_REFRESH_SECS,
        })?)
    }

    pub fn results(&self, result: &AnalysisResult, image: Option<&str>) -> Result<String> {
        let tmpl = self.env.get_template("results.html")?;
        Ok(tmpl.render(context! {
            result => result,
            image => image,
            parts => part_views(result),
        })?)
    }

    /// Printable shopping list; `query` is echoed into the text download link
    pub fn list(&self, result: &AnalysisResult, entries: &[ListEntry<'_>], query: &str) -> Result<String> {
        let tmpl = self.env.get_template("list.html")?;
        Ok(tmpl.render(context! {
            result => result,
            entries => entries,
            query => query,
        })?)
    }
}
