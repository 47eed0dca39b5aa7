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

//! Deterministic chart dispatch. A [`Chart`] is a declarative description
//! (computed values, title and axis labels) for the presentation surface to
//! draw; rasterisation is not this crate's concern. `render` never fails
//! outward: internal errors become a placeholder chart carrying the message,
//! and an unmet minimum column count yields the empty default chart.

use crate::contract::{VizKind, VizParams};
use crate::error::VizError;
use crate::profiler::{numeric_cells, numeric_values, series_by_name, string_cells, value_counts};
use polars::prelude::{DataFrame, Series};
use serde::Serialize;
use tracing::warn;

pub const HISTOGRAM_BINS: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub kind: VizKind,
    pub title: String,
    pub x_axis_label: Option<String>,
    pub y_axis_label: Option<String>,
    pub body: ChartBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ChartBody {
    /// No dispatch branch matched the requested kind and column count.
    Empty,
    /// Rendering failed; the message is displayed as centred text.
    Placeholder { message: String },
    Histogram {
        bin_edges: Vec<f64>,
        counts: Vec<u32>,
    },
    Slices {
        labels: Vec<String>,
        counts: Vec<usize>,
        percentages: Vec<f64>,
    },
    Bars {
        labels: Vec<String>,
        values: Vec<f64>,
    },
    Points {
        x: Vec<f64>,
        y: Vec<f64>,
    },
    /// Connected sequence with markers, pre-sorted by x.
    Path {
        x: Vec<f64>,
        y: Vec<f64>,
    },
}

impl Chart {
    pub fn is_placeholder(&self) -> bool {
        matches!(self.body, ChartBody::Placeholder { .. })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.body, ChartBody::Empty)
    }
}

/// Public guarantee: always returns a chart, never panics, never propagates
/// an error.
pub fn render(df: &DataFrame, params: &VizParams) -> Chart {
    match render_inner(df, params) {
        Ok(chart) => chart,
        Err(e) => {
            warn!(kind = %params.kind, error = %e, "visualization failed, returning placeholder");
            Chart {
                kind: params.kind,
                title: effective_title(params, &params.columns),
                x_axis_label: params.x_axis_label.clone(),
                y_axis_label: params.y_axis_label.clone(),
                body: ChartBody::Placeholder {
                    message: format!("Error generating visualization: {e}"),
                },
            }
        }
    }
}

fn render_inner(df: &DataFrame, params: &VizParams) -> std::result::Result<Chart, VizError> {
    let cols = &params.columns;
    match (params.kind, cols.len()) {
        (VizKind::Histogram, n) if n >= 1 => histogram(df, params, &cols[0]),
        (VizKind::Pie, n) if n >= 1 => pie(df, params, &cols[0]),
        (VizKind::Bar, n) if n >= 2 => grouped_mean_bar(df, params, &cols[0], &cols[1]),
        (VizKind::Bar, 1) => count_bar(df, params, &cols[0]),
        (VizKind::Scatter, n) if n >= 2 => xy(df, params, &cols[0], &cols[1], false),
        (VizKind::Line, n) if n >= 2 => xy(df, params, &cols[0], &cols[1], true),
        _ => Ok(Chart {
            kind: params.kind,
            title: effective_title(params, cols),
            x_axis_label: params.x_axis_label.clone(),
            y_axis_label: params.y_axis_label.clone(),
            body: ChartBody::Empty,
        }),
    }
}

fn column<'a>(df: &'a DataFrame, name: &str) -> std::result::Result<&'a Series, VizError> {
    series_by_name(df, name).ok_or_else(|| VizError::MissingColumn {
        column: name.to_string(),
    })
}

fn effective_title(params: &VizParams, columns: &[String]) -> String {
    if let Some(title) = &params.title {
        if !title.trim().is_empty() {
            return title.clone();
        }
    }
    let c0 = columns.first().map(String::as_str).unwrap_or_default();
    let c1 = columns.get(1).map(String::as_str).unwrap_or_default();
    match (params.kind, columns.len()) {
        (VizKind::Histogram, _) => format!("Histogram of {c0}"),
        (VizKind::Pie, _) => format!("Distribution of {c0}"),
        (VizKind::Bar, n) if n >= 2 => format!("Average {c1} by {c0}"),
        (VizKind::Bar, _) => format!("Count of {c0}"),
        (VizKind::Scatter, _) => format!("{c1} vs {c0}"),
        (VizKind::Line, _) => format!("{c1} over {c0}"),
    }
}

fn histogram(
    df: &DataFrame,
    params: &VizParams,
    col: &str,
) -> std::result::Result<Chart, VizError> {
    let series = column(df, col)?;
    let values = numeric_values(series)?;
    if values.is_empty() {
        if series.is_empty() {
            return Err(VizError::EmptyColumn {
                column: col.to_string(),
            });
        }
        return Err(VizError::NonNumericColumn {
            column: col.to_string(),
        });
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = (max - min) / HISTOGRAM_BINS as f64;
    let mut counts = vec![0u32; HISTOGRAM_BINS];
    for v in &values {
        let bin = if width > 0.0 {
            (((v - min) / width) as usize).min(HISTOGRAM_BINS - 1)
        } else {
            0
        };
        counts[bin] += 1;
    }
    let bin_edges = (0..=HISTOGRAM_BINS)
        .map(|i| min + width * i as f64)
        .collect();
    Ok(Chart {
        kind: VizKind::Histogram,
        title: effective_title(params, &params.columns),
        x_axis_label: params.x_axis_label.clone().or_else(|| Some(col.to_string())),
        y_axis_label: params
            .y_axis_label
            .clone()
            .or_else(|| Some("Frequency".to_string())),
        body: ChartBody::Histogram { bin_edges, counts },
    })
}

fn pie(df: &DataFrame, params: &VizParams, col: &str) -> std::result::Result<Chart, VizError> {
    let series = column(df, col)?;
    let counts = value_counts(series)?;
    if counts.is_empty() {
        return Err(VizError::EmptyColumn {
            column: col.to_string(),
        });
    }
    let total: usize = counts.iter().map(|(_, c)| c).sum();
    let percentages = counts
        .iter()
        .map(|(_, c)| round1(*c as f64 / total as f64 * 100.0))
        .collect();
    let (labels, counts) = counts.into_iter().unzip();
    Ok(Chart {
        kind: VizKind::Pie,
        title: effective_title(params, &params.columns),
        x_axis_label: params.x_axis_label.clone(),
        y_axis_label: params.y_axis_label.clone(),
        body: ChartBody::Slices {
            labels,
            counts,
            percentages,
        },
    })
}

/// Two-column bar: mean of the value column per distinct group value,
/// groups in ascending label order.
fn grouped_mean_bar(
    df: &DataFrame,
    params: &VizParams,
    group_col: &str,
    value_col: &str,
) -> std::result::Result<Chart, VizError> {
    let groups = string_cells(column(df, group_col)?)?;
    let values = numeric_cells(column(df, value_col)?)?;
    let mut sums: std::collections::BTreeMap<String, (f64, usize)> =
        std::collections::BTreeMap::new();
    for (group, value) in groups.into_iter().zip(values) {
        if let (Some(g), Some(v)) = (group, value) {
            let entry = sums.entry(g).or_insert((0.0, 0));
            entry.0 += v;
            entry.1 += 1;
        }
    }
    if sums.is_empty() {
        return Err(VizError::NonNumericColumn {
            column: value_col.to_string(),
        });
    }
    let (labels, values): (Vec<String>, Vec<f64>) = sums
        .into_iter()
        .map(|(g, (sum, n))| (g, sum / n as f64))
        .unzip();
    Ok(Chart {
        kind: VizKind::Bar,
        title: effective_title(params, &params.columns),
        x_axis_label: params
            .x_axis_label
            .clone()
            .or_else(|| Some(group_col.to_string())),
        y_axis_label: params
            .y_axis_label
            .clone()
            .or_else(|| Some(format!("Average {value_col}"))),
        body: ChartBody::Bars { labels, values },
    })
}

/// One-column bar: count of each distinct value, most frequent first.
fn count_bar(
    df: &DataFrame,
    params: &VizParams,
    col: &str,
) -> std::result::Result<Chart, VizError> {
    let counts = value_counts(column(df, col)?)?;
    if counts.is_empty() {
        return Err(VizError::EmptyColumn {
            column: col.to_string(),
        });
    }
    let (labels, values): (Vec<String>, Vec<usize>) = counts.into_iter().unzip();
    Ok(Chart {
        kind: VizKind::Bar,
        title: effective_title(params, &params.columns),
        x_axis_label: params.x_axis_label.clone().or_else(|| Some(col.to_string())),
        y_axis_label: params
            .y_axis_label
            .clone()
            .or_else(|| Some("Count".to_string())),
        body: ChartBody::Bars {
            labels,
            values: values.into_iter().map(|v| v as f64).collect(),
        },
    })
}

/// Scatter and line share the pairing logic; line additionally sorts the
/// pairs ascending by x and connects them.
fn xy(
    df: &DataFrame,
    params: &VizParams,
    x_col: &str,
    y_col: &str,
    sorted_path: bool,
) -> std::result::Result<Chart, VizError> {
    let xs = numeric_cells(column(df, x_col)?)?;
    let ys = numeric_cells(column(df, y_col)?)?;
    let mut pairs: Vec<(f64, f64)> = xs
        .into_iter()
        .zip(ys)
        .filter_map(|(x, y)| Some((x?, y?)))
        .collect();
    if pairs.is_empty() {
        return Err(VizError::NonNumericColumn {
            column: x_col.to_string(),
        });
    }
    if sorted_path {
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    }
    let (x, y) = pairs.into_iter().unzip();
    let body = if sorted_path {
        ChartBody::Path { x, y }
    } else {
        ChartBody::Points { x, y }
    };
    Ok(Chart {
        kind: params.kind,
        title: effective_title(params, &params.columns),
        x_axis_label: params
            .x_axis_label
            .clone()
            .or_else(|| Some(x_col.to_string())),
        y_axis_label: params
            .y_axis_label
            .clone()
            .or_else(|| Some(y_col.to_string())),
        body,
    })
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}
