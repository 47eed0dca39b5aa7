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

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExplorationError {
    #[error("Data loading error: {0}")]
    Load(#[from] LoadError),
    #[error("Query processing error: {0}")]
    Query(#[from] QueryError),
    #[error("Data error: {0}")]
    Data(#[from] DataError),
}

/// The upload failed; fatal to that upload attempt only.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to open data file '{path}': {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse '{path}' as delimited tabular data: {source}")]
    Parse {
        path: String,
        #[source]
        source: polars::error::PolarsError,
    },
    #[error("Failed to summarise loaded table: {0}")]
    Summary(#[from] DataError),
}

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),
    #[error("Column '{column}' not found in table")]
    ColumnNotFound { column: String },
    #[error("Failed to calculate statistics for column '{column}': {reason}")]
    Statistics { column: String, reason: String },
}

/// Raised only when the language-model service is unreachable or exhausts
/// its retry budget without producing any usable text. Malformed but
/// parseable output never surfaces here; it degrades to a text-only answer.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Failed to compute grounding profile: {0}")]
    Grounding(#[from] DataError),
    #[error("Language model unreachable after {attempts} attempts: {reason}")]
    ServiceUnavailable { attempts: u32, reason: String },
}

/// Internal to the visualization dispatcher. Never escapes `render`; every
/// variant is converted to a placeholder chart carrying the message.
#[derive(Error, Debug)]
pub enum VizError {
    #[error("Column '{column}' not found in table")]
    MissingColumn { column: String },
    #[error("Column '{column}' has no numeric values")]
    NonNumericColumn { column: String },
    #[error("Column '{column}' is empty")]
    EmptyColumn { column: String },
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}

pub type Result<T> = std::result::Result<T, ExplorationError>;
