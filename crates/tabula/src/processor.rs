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

//! Turns a natural-language question plus a table into a validated
//! [`QueryResponse`]. The language model is an unreliable collaborator, so
//! the processor's real job is the layered coercion pipeline around the
//! call: raw text, candidate JSON, validated contract, degraded text-only
//! fallback. The pipeline is driven as a small state machine so each
//! transition stays individually testable.

use crate::contract::QueryResponse;
use crate::error::QueryError;
use crate::llm::{extract_json, LlmAdapter};
use crate::profiler::TableProfile;
use polars::prelude::DataFrame;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Service-layer retry budget; transport failures and non-coercible
    /// shapes both consume attempts.
    pub max_attempts: u32,
    pub sample_rows: usize,
    /// Columns with fewer distinct values than this get a full value
    /// distribution in the prompt, numeric or not.
    pub distribution_cardinality_cutoff: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            sample_rows: 5,
            distribution_cardinality_cutoff: 10,
        }
    }
}

enum Phase {
    Calling { attempt: u32 },
    Decoding { attempt: u32, raw: String },
    Validating { attempt: u32, value: Value },
    Degraded { response: QueryResponse },
    Success { response: QueryResponse },
    Failed { attempts: u32, reason: String },
}

pub struct QueryProcessor {
    adapter: Arc<dyn LlmAdapter>,
    config: ProcessorConfig,
}

impl QueryProcessor {
    pub fn new(adapter: Arc<dyn LlmAdapter>) -> Self {
        Self::with_config(adapter, ProcessorConfig::default())
    }

    pub fn with_config(adapter: Arc<dyn LlmAdapter>, config: ProcessorConfig) -> Self {
        Self { adapter, config }
    }

    /// One question in, one structured response out. Errors only when the
    /// service never produced usable text; every malformed-but-present
    /// output degrades to a text-only answer instead.
    pub async fn process(
        &self,
        table: &DataFrame,
        question: &str,
        wants_visualization: bool,
    ) -> std::result::Result<QueryResponse, QueryError> {
        let profile = TableProfile::build(
            table,
            self.config.sample_rows,
            self.config.distribution_cardinality_cutoff,
        )?;
        let prompt = build_prompt(&profile, question, wants_visualization);
        self.drive(&prompt).await
    }

    async fn drive(&self, prompt: &str) -> std::result::Result<QueryResponse, QueryError> {
        let max = self.config.max_attempts;
        let mut last_failure = "no attempts made".to_string();
        let mut phase = Phase::Calling { attempt: 1 };
        loop {
            phase = match phase {
                Phase::Calling { attempt } => {
                    if attempt > max {
                        Phase::Failed {
                            attempts: max,
                            reason: last_failure.clone(),
                        }
                    } else {
                        match self.adapter.generate_response(prompt).await {
                            Ok(raw) => {
                                debug!(attempt, raw_len = raw.len(), "model replied");
                                Phase::Decoding { attempt, raw }
                            }
                            Err(e) => {
                                warn!(attempt, error = %e, "language model call failed");
                                last_failure = e.to_string();
                                Phase::Calling {
                                    attempt: attempt + 1,
                                }
                            }
                        }
                    }
                }
                Phase::Decoding { attempt, raw } => match extract_json(&raw)
                    .and_then(|s| serde_json::from_str::<Value>(&s).ok())
                {
                    Some(value) => Phase::Validating { attempt, value },
                    None => self.retry_or_degrade(
                        attempt,
                        "no JSON object in model output",
                        QueryResponse::degraded(raw),
                    ),
                },
                Phase::Validating { attempt, value } => {
                    match serde_json::from_value::<QueryResponse>(value.clone()) {
                        Ok(response) => Phase::Success { response },
                        Err(e) => {
                            debug!(error = %e, "model output failed contract validation");
                            self.retry_or_degrade(
                                attempt,
                                "model output failed contract validation",
                                QueryResponse::degraded(value.to_string()),
                            )
                        }
                    }
                }
                Phase::Degraded { response } => {
                    warn!("degraded to text-only answer");
                    return Ok(response);
                }
                Phase::Success { response } => return Ok(response),
                Phase::Failed { attempts, reason } => {
                    return Err(QueryError::ServiceUnavailable { attempts, reason })
                }
            };
        }
    }

    /// Non-coercible shapes are transient while budget remains; the final
    /// attempt keeps whatever text we have rather than failing the question.
    fn retry_or_degrade(&self, attempt: u32, reason: &str, fallback: QueryResponse) -> Phase {
        if attempt < self.config.max_attempts {
            warn!(attempt, reason, "retrying model call");
            Phase::Calling {
                attempt: attempt + 1,
            }
        } else {
            Phase::Degraded { response: fallback }
        }
    }
}

/// The grounding prompt: question, structural overview, describe-all block,
/// row sample, categorical distributions, then the response contract.
pub(crate) fn build_prompt(
    profile: &TableProfile,
    question: &str,
    wants_visualization: bool,
) -> String {
    let viz_request = if wants_visualization {
        "The user wants a visualization with the answer.\n\n"
    } else {
        ""
    };
    format!(
        "Analyze this tabular data and answer the question: \"{question}\"\n\
         \n\
         Data Overview:\n\
         - Columns: {columns}\n\
         - Total rows: {rows}\n\
         \n\
         Summary Statistics:\n\
         {describe}\
         \n\
         Sample Data:\n\
         {sample}\
         \n\
         {distributions}\
         \n\
         Instructions:\n\
         1. Answer the question using ONLY the data provided above\n\
         2. Be precise with numbers and statistics\n\
         3. If the information isn't in the data, say \"I cannot answer this question with the available data\"\n\
         4. Format your response as a valid JSON object\n\
         5. Use only these visualization types: histogram, bar, scatter, line, pie\n\
         6. Only set create_visualization to true if the user specifically asked for a visualization\n\
         \n\
         {viz_request}\
         Available visualization types:\n\
         - \"histogram\": distribution of a single numeric column\n\
         - \"pie\": distribution of a categorical column\n\
         - \"bar\": comparison across categories or time series\n\
         - \"scatter\": relationship between two numeric columns\n\
         - \"line\": trend over time or ordered data\n\
         \n\
         Respond with a JSON object in this exact format:\n\
         {{\n\
             \"answer\": \"Your answer here\",\n\
             \"create_visualization\": false,\n\
             \"visualization_params\": {{\n\
                 \"visualization_type\": \"line\",\n\
                 \"columns\": [\"column1\", \"column2\"],\n\
                 \"title\": \"Optional title for the visualization\",\n\
                 \"x_axis_label\": \"Optional x-axis label\",\n\
                 \"y_axis_label\": \"Optional y-axis label\"\n\
             }}\n\
         }}\n",
        columns = profile.column_names.join(", "),
        rows = profile.row_count,
        describe = profile.describe_block(),
        sample = profile.sample,
        distributions = profile.distributions_block(),
    )
}
