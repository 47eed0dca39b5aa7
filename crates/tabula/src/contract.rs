// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

//! The structured contract between the language-model boundary and the rest
//! of the system. The model is a semi-structured upstream producer, so the
//! containers here are permissive: unknown keys are preserved untouched and
//! an out-of-enumeration chart kind falls back to the default instead of
//! rejecting the whole object.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Closed enumeration of renderable chart forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VizKind {
    #[default]
    Histogram,
    Bar,
    Scatter,
    Line,
    Pie,
}

impl From<&str> for VizKind {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "bar" => VizKind::Bar,
            "scatter" => VizKind::Scatter,
            "line" => VizKind::Line,
            "pie" => VizKind::Pie,
            _ => VizKind::Histogram,
        }
    }
}

impl<'de> Deserialize<'de> for VizKind {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(VizKind::from(s.as_str()))
    }
}

impl std::fmt::Display for VizKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VizKind::Histogram => "histogram",
            VizKind::Bar => "bar",
            VizKind::Scatter => "scatter",
            VizKind::Line => "line",
            VizKind::Pie => "pie",
        };
        write!(f, "{name}")
    }
}

/// Parameters the model supplies when it requests a chart. Every field has a
/// default so a sparse mapping still constructs; `extra` keeps whatever else
/// the model decided to include.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VizParams {
    #[serde(rename = "visualization_type", default)]
    pub kind: VizKind,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub x_axis_label: Option<String>,
    #[serde(default)]
    pub y_axis_label: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// The model answers with either prose or a structured mapping; both are
/// valid and the presentation boundary coerces to text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Text(String),
    Structured(Value),
}

impl Answer {
    pub fn display_text(&self) -> String {
        match self {
            Answer::Text(s) => s.clone(),
            Answer::Structured(v) => {
                serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: Answer,
    #[serde(default)]
    pub create_visualization: bool,
    #[serde(default)]
    pub visualization_params: Option<VizParams>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl QueryResponse {
    /// Text-only fallback used when the model output could not be validated
    /// into the full contract.
    pub fn degraded(answer: impl Into<String>) -> Self {
        Self {
            answer: Answer::Text(answer.into()),
            create_visualization: false,
            visualization_params: None,
            extra: serde_json::Map::new(),
        }
    }
}
