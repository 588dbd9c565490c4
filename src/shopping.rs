// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Part selection and the derived shopping list

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::model::{AnalysisResult, Part};

/// Ephemeral set of selected part indices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    selected: BTreeSet<usize>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_indices<I: IntoIterator<Item = usize>>(indices: I) -> Self {
        Self {
            selected: indices.into_iter().collect(),
        }
    }

    /// Flip one part in or out; returns whether it is now selected
    pub fn toggle(&mut self, index: usize) -> bool {
        if self.selected.remove(&index) {
            false
        } else {
            self.selected.insert(index);
            true
        }
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.selected.iter().copied()
    }

    /// Read `part=<index>` pairs from a query string; anything else is ignored
    pub fn from_query(query: &str) -> Self {
        Self::from_indices(
            query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .filter(|(key, _)| *key == "part")
                .filter_map(|(_, value)| value.parse().ok()),
        )
    }

    /// Inverse of [`from_query`](Self::from_query), in index order
    pub fn to_query(&self) -> String {
        self.iter()
            .map(|index| format!("part={}", index))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// One line of the shopping list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListEntry<'a> {
    /// 1-based number shown on the image overlay
    pub number: usize,
    pub part: &'a Part,
}

/// Selected parts in display order, whatever order they were picked in.
/// Indices past the end of the part list are ignored.
pub fn shopping_list<'a>(result: &'a AnalysisResult, selection: &Selection) -> Vec<ListEntry<'a>> {
    result
        .parts
        .iter()
        .enumerate()
        .filter(|(index, _)| selection.is_selected(*index))
        .map(|(index, part)| ListEntry {
            number: index + 1,
            part,
        })
        .collect()
}

/// Plain-text export of a shopping list
pub fn render_text(result: &AnalysisResult, entries: &[ListEntry<'_>]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Harvest list: {}", result.device_name);
    if let Some(age) = &result.estimated_age {
        let _ = writeln!(out, "Era: {}", age);
    }
    out.push('\n');

    if entries.is_empty() {
        out.push_str("(no components selected)\n");
    }
    for entry in entries {
        let _ = writeln!(
            out,
            "[ ] {}. {} ({}) - {} value",
            entry.number, entry.part.name, entry.part.kind, entry.part.harvestability
        );
        for idea in &entry.part.project_ideas {
            let _ = writeln!(out, "      * {}", idea);
        }
    }

    if !result.safety_warnings.is_empty() {
        out.push_str("\nSafety first:\n");
        for warning in &result.safety_warnings {
            let _ = writeln!(out, "  ! {}", warning);
        }
    }
    out
}
