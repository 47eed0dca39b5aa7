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

//! Statistical profiling of the current table. The profile is what grounds
//! the language model: descriptive statistics for every column, a small row
//! sample rendered as text and full value distributions for low-cardinality
//! columns, so the model can only answer from data it was actually shown.

use crate::error::DataError;
use polars::prelude::QuantileMethod;
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

#[derive(Debug, Clone, Serialize)]
pub struct NumericSummary {
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub q25: Option<f64>,
    pub median: Option<f64>,
    pub q75: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoricalSummary {
    pub count: usize,
    pub unique: usize,
    pub top: Option<String>,
    pub freq: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub kind: ColumnKind,
    pub numeric: Option<NumericSummary>,
    pub categorical: Option<CategoricalSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DistributionEntry {
    pub value: String,
    pub count: usize,
    pub percentage: f64,
}

/// Full value distribution of one column: every distinct value with its
/// count and share of the total row count, no truncation.
#[derive(Debug, Clone, Serialize)]
pub struct Distribution {
    pub column: String,
    pub entries: Vec<DistributionEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableProfile {
    pub row_count: usize,
    pub column_names: Vec<String>,
    pub columns: Vec<ColumnProfile>,
    pub distributions: Vec<Distribution>,
    pub sample: String,
}

impl TableProfile {
    /// Profile every column of `df`. Distributions are computed for columns
    /// that are non-numeric or have fewer than `cardinality_cutoff` distinct
    /// values.
    pub fn build(
        df: &DataFrame,
        sample_rows: usize,
        cardinality_cutoff: usize,
    ) -> std::result::Result<Self, DataError> {
        let row_count = df.height();
        let mut columns = Vec::with_capacity(df.width());
        let mut distributions = Vec::new();
        let mut column_names = Vec::with_capacity(df.width());

        for column in df.get_columns() {
            let series = column
                .as_series()
                .ok_or_else(|| DataError::Statistics {
                    column: column.name().to_string(),
                    reason: "column is not backed by a series".to_string(),
                })?;
            let name = series.name().to_string();
            column_names.push(name.clone());

            let profile = if is_numeric(series) {
                ColumnProfile {
                    name: name.clone(),
                    kind: ColumnKind::Numeric,
                    numeric: Some(numeric_summary(series)?),
                    categorical: None,
                }
            } else {
                ColumnProfile {
                    name: name.clone(),
                    kind: ColumnKind::Categorical,
                    numeric: None,
                    categorical: Some(categorical_summary(series)?),
                }
            };

            let cardinality = series.n_unique()?;
            if profile.kind == ColumnKind::Categorical || cardinality < cardinality_cutoff {
                distributions.push(distribution(series, row_count)?);
            }
            columns.push(profile);
        }

        Ok(Self {
            row_count,
            column_names,
            columns,
            distributions,
            sample: render_sample(df, sample_rows)?,
        })
    }

    /// The describe-all block embedded in the grounding prompt. Two decimal
    /// places on every numeric statistic.
    pub fn describe_block(&self) -> String {
        let mut out = String::new();
        for col in &self.columns {
            match (&col.numeric, &col.categorical) {
                (Some(n), _) => {
                    out.push_str(&format!(
                        "{} (numeric): count={}, mean={}, std={}, min={}, 25%={}, 50%={}, 75%={}, max={}\n",
                        col.name,
                        n.count,
                        fmt2(n.mean),
                        fmt2(n.std),
                        fmt2(n.min),
                        fmt2(n.q25),
                        fmt2(n.median),
                        fmt2(n.q75),
                        fmt2(n.max),
                    ));
                }
                (_, Some(c)) => {
                    out.push_str(&format!(
                        "{} (categorical): count={}, unique={}, top={}, freq={}\n",
                        col.name,
                        c.count,
                        c.unique,
                        c.top.as_deref().unwrap_or("NaN"),
                        c.freq,
                    ));
                }
                _ => {}
            }
        }
        out
    }

    /// The categorical distribution block, one decimal place on percentages.
    pub fn distributions_block(&self) -> String {
        let mut out = String::new();
        for dist in &self.distributions {
            out.push_str(&format!("Distribution of {}:\n", dist.column));
            for entry in &dist.entries {
                out.push_str(&format!(
                    "  {}: {} ({:.1}%)\n",
                    entry.value, entry.count, entry.percentage
                ));
            }
        }
        out
    }
}

fn fmt2(v: Option<f64>) -> String {
    v.map_or_else(|| "NaN".to_string(), |v| format!("{v:.2}"))
}

pub(crate) fn is_numeric(series: &Series) -> bool {
    matches!(
        series.dtype(),
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::Int16
            | DataType::Int8
            | DataType::UInt64
            | DataType::UInt32
            | DataType::UInt16
            | DataType::UInt8
    )
}

pub(crate) fn series_by_name<'a>(df: &'a DataFrame, name: &str) -> Option<&'a Series> {
    df.get_columns()
        .iter()
        .find(|c| c.name().as_str() == name)
        .and_then(|c| c.as_series())
}

/// Non-null values of a column cast to f64, in row order.
pub(crate) fn numeric_values(series: &Series) -> std::result::Result<Vec<f64>, PolarsError> {
    let s_float = series.cast(&DataType::Float64)?;
    Ok(s_float.f64()?.into_iter().flatten().collect())
}

/// Per-row optional f64 values, preserving nulls for row pairing.
pub(crate) fn numeric_cells(
    series: &Series,
) -> std::result::Result<Vec<Option<f64>>, PolarsError> {
    let s_float = series.cast(&DataType::Float64)?;
    Ok(s_float.f64()?.into_iter().collect())
}

/// Per-row string rendering of a column, nulls preserved.
pub(crate) fn string_cells(
    series: &Series,
) -> std::result::Result<Vec<Option<String>>, PolarsError> {
    let s_str = series.cast(&DataType::String)?;
    Ok(s_str
        .str()?
        .into_iter()
        .map(|v| v.map(String::from))
        .collect())
}

/// Distinct non-null values with counts, ordered by descending count and
/// first appearance on ties.
pub(crate) fn value_counts(
    series: &Series,
) -> std::result::Result<Vec<(String, usize)>, PolarsError> {
    let mut order = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for value in string_cells(series)?.into_iter().flatten() {
        if !counts.contains_key(&value) {
            order.push(value.clone());
        }
        *counts.entry(value).or_insert(0) += 1;
    }
    let mut ranked: Vec<(usize, String, usize)> = order
        .into_iter()
        .enumerate()
        .map(|(seen, v)| {
            let count = counts[&v];
            (seen, v, count)
        })
        .collect();
    ranked.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(&b.0)));
    Ok(ranked.into_iter().map(|(_, v, c)| (v, c)).collect())
}

fn numeric_summary(series: &Series) -> std::result::Result<NumericSummary, DataError> {
    let s_float = series.cast(&DataType::Float64)?;
    let s_f64 = s_float.f64()?;
    Ok(NumericSummary {
        count: s_f64.len() - s_f64.null_count(),
        mean: s_f64.mean(),
        std: s_f64.std(1),
        min: s_f64.min(),
        q25: s_f64.quantile(0.25, QuantileMethod::Linear).ok().flatten(),
        median: s_f64.median(),
        q75: s_f64.quantile(0.75, QuantileMethod::Linear).ok().flatten(),
        max: s_f64.max(),
    })
}

fn categorical_summary(series: &Series) -> std::result::Result<CategoricalSummary, DataError> {
    let counts = value_counts(series)?;
    let (top, freq) = counts
        .first()
        .map_or((None, 0), |(v, c)| (Some(v.clone()), *c));
    Ok(CategoricalSummary {
        count: series.len() - series.null_count(),
        unique: counts.len(),
        top,
        freq,
    })
}

fn distribution(
    series: &Series,
    total_rows: usize,
) -> std::result::Result<Distribution, DataError> {
    let entries = value_counts(series)?
        .into_iter()
        .map(|(value, count)| DistributionEntry {
            value,
            count,
            percentage: if total_rows > 0 {
                count as f64 / total_rows as f64 * 100.0
            } else {
                0.0
            },
        })
        .collect();
    Ok(Distribution {
        column: series.name().to_string(),
        entries,
    })
}

/// First `limit` rows rendered as a right-aligned text table.
pub(crate) fn render_sample(
    df: &DataFrame,
    limit: usize,
) -> std::result::Result<String, DataError> {
    let rows = std::cmp::min(limit, df.height());
    let mut cells: Vec<Vec<String>> = Vec::with_capacity(df.width());
    let mut headers: Vec<String> = Vec::with_capacity(df.width());
    for column in df.get_columns() {
        let series = column.as_series().ok_or_else(|| DataError::Statistics {
            column: column.name().to_string(),
            reason: "column is not backed by a series".to_string(),
        })?;
        headers.push(series.name().to_string());
        cells.push(
            string_cells(series)?
                .into_iter()
                .take(rows)
                .map(|v| v.unwrap_or_else(|| "null".to_string()))
                .collect(),
        );
    }

    let widths: Vec<usize> = headers
        .iter()
        .zip(&cells)
        .map(|(h, col)| {
            col.iter()
                .map(String::len)
                .chain(std::iter::once(h.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    let header_line: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, &w)| format!("{h:>w$}"))
        .collect();
    out.push_str(&header_line.join("  "));
    out.push('\n');
    for row in 0..rows {
        let line: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(col, &w)| format!("{:>w$}", col[row]))
            .collect();
        out.push_str(&line.join("  "));
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> DataFrame {
        df!(
            "price" => &[10i64, 20, 30],
            "city" => &["A", "B", "A"],
        )
        .unwrap()
    }

    #[test]
    fn numeric_summary_matches_scenario() {
        let table = fixture();
        let profile = TableProfile::build(&table, 5, 10).unwrap();
        let price = &profile.columns[0];
        assert_eq!(price.kind, ColumnKind::Numeric);
        let stats = price.numeric.as_ref().unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.mean, Some(20.0));
        assert_eq!(stats.min, Some(10.0));
        assert_eq!(stats.max, Some(30.0));
        assert!(profile.describe_block().contains("mean=20.00"));
    }

    #[test]
    fn mean_lies_within_min_max() {
        let table = df!(
            "x" => &[3.5f64, -1.0, 7.25, 0.0, 2.5],
        )
        .unwrap();
        let profile = TableProfile::build(&table, 5, 10).unwrap();
        let stats = profile.columns[0].numeric.as_ref().unwrap();
        let (mean, min, max) = (
            stats.mean.unwrap(),
            stats.min.unwrap(),
            stats.max.unwrap(),
        );
        assert!(min <= mean && mean <= max);
    }

    #[test]
    fn categorical_summary_and_distribution() {
        let table = fixture();
        let profile = TableProfile::build(&table, 5, 10).unwrap();
        let city = &profile.columns[1];
        let stats = city.categorical.as_ref().unwrap();
        assert_eq!(stats.unique, 2);
        assert_eq!(stats.top.as_deref(), Some("A"));
        assert_eq!(stats.freq, 2);

        let block = profile.distributions_block();
        assert!(block.contains("Distribution of city:"));
        assert!(block.contains("A: 2 (66.7%)"));
        assert!(block.contains("B: 1 (33.3%)"));
    }

    #[test]
    fn low_cardinality_numeric_column_gets_a_distribution() {
        let table = fixture();
        let profile = TableProfile::build(&table, 5, 10).unwrap();
        // price has 3 distinct values, below the cutoff of 10
        assert!(profile
            .distributions
            .iter()
            .any(|d| d.column == "price"));
    }

    #[test]
    fn sample_renders_all_columns() {
        let table = fixture();
        let profile = TableProfile::build(&table, 2, 10).unwrap();
        let mut lines = profile.sample.lines();
        let header = lines.next().unwrap();
        assert!(header.contains("price"));
        assert!(header.contains("city"));
        assert_eq!(lines.count(), 2);
    }

    #[test]
    fn value_counts_order_is_count_desc_then_first_seen() {
        let table = df!(
            "c" => &["b", "a", "b", "a", "c"],
        )
        .unwrap();
        let series = series_by_name(&table, "c").unwrap();
        let counts = value_counts(series).unwrap();
        assert_eq!(
            counts,
            vec![
                ("b".to_string(), 2),
                ("a".to_string(), 2),
                ("c".to_string(), 1)
            ]
        );
    }
}
