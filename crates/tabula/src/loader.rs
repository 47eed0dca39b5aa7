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

use crate::error::LoadError;
use crate::profiler::{is_numeric, numeric_values, render_sample};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::info;

/// Parse a delimited file into a table and produce the human-readable
/// summary shown as the "dataset information" text: shape, a 5-row preview
/// and per-column headline statistics.
pub fn load_csv<P: AsRef<Path>>(path: P) -> std::result::Result<(DataFrame, String), LoadError> {
    let path_display = path.as_ref().display().to_string();
    let file = File::open(&path).map_err(|source| LoadError::Open {
        path: path_display.clone(),
        source,
    })?;
    let df = CsvReader::new(file)
        .finish()
        .map_err(|source| LoadError::Parse {
            path: path_display.clone(),
            source,
        })?;
    info!(
        rows = df.height(),
        columns = df.width(),
        path = %path_display,
        "loaded tabular file"
    );
    let summary = summarise(&df)?;
    Ok((df, summary))
}

fn summarise(df: &DataFrame) -> std::result::Result<String, LoadError> {
    let mut out = format!(
        "CSV loaded successfully. Shape: ({}, {})\n\nPreview:\n{}\n",
        df.height(),
        df.width(),
        render_sample(df, 5)?
    );
    out.push_str("Column Information:\n");
    for column in df.get_columns() {
        let Some(series) = column.as_series() else {
            continue;
        };
        if is_numeric(series) {
            let values = numeric_values(series).map_err(|e| {
                LoadError::Summary(crate::error::DataError::Statistics {
                    column: series.name().to_string(),
                    reason: e.to_string(),
                })
            })?;
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mean = if values.is_empty() {
                f64::NAN
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            };
            out.push_str(&format!(
                "- {} (numeric): min={}, max={}, mean={:.2}\n",
                series.name(),
                min,
                max,
                mean
            ));
        } else {
            let unique = series.n_unique().map_err(|e| {
                LoadError::Summary(crate::error::DataError::Statistics {
                    column: series.name().to_string(),
                    reason: e.to_string(),
                })
            })?;
            out.push_str(&format!(
                "- {} (non-numeric): {} unique values\n",
                series.name(),
                unique
            ));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_and_summarises_a_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "price,city").unwrap();
        writeln!(file, "10,A").unwrap();
        writeln!(file, "20,B").unwrap();
        writeln!(file, "30,A").unwrap();
        file.flush().unwrap();

        let (df, summary) = load_csv(file.path()).unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.width(), 2);
        assert!(summary.contains("Shape: (3, 2)"));
        assert!(summary.contains("- price (numeric): min=10, max=30, mean=20.00"));
        assert!(summary.contains("- city (non-numeric): 2 unique values"));
        assert!(summary.contains("Preview:"));
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let err = load_csv("/nonexistent/definitely-not-here.csv").unwrap_err();
        assert!(matches!(err, LoadError::Open { .. }));
    }

    #[test]
    fn unparseable_input_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        // ragged rows: second line has more fields than the header
        writeln!(file, "a,b").unwrap();
        writeln!(file, "1,2,3,4,5").unwrap();
        file.flush().unwrap();

        let result = load_csv(file.path());
        assert!(matches!(result, Err(LoadError::Parse { .. })));
    }
}
