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

//! Conversational exploration of tabular data: load a table, ask a
//! natural-language question, get back a grounded textual answer and,
//! when requested, a declarative chart spec.

pub mod contract;
pub mod error;
pub mod llm;
pub mod loader;
pub mod processor;
pub mod profiler;
pub mod session;
pub mod viz;

pub use contract::{Answer, QueryResponse, VizKind, VizParams};
pub use error::{DataError, ExplorationError, LoadError, QueryError, Result};
pub use llm::{HttpLlmAdapter, LlmAdapter, LlmError};
pub use loader::load_csv;
pub use processor::{ProcessorConfig, QueryProcessor};
pub use profiler::{TableProfile, Distribution};
pub use session::Session;
pub use viz::{render, Chart, ChartBody};

use std::sync::Arc;
use tracing::debug;

/// Facade wiring the processor and dispatcher together with the session's
/// current table: one question in, display text and an optional chart out.
pub struct Explorer {
    processor: QueryProcessor,
}

impl Explorer {
    pub fn new(adapter: Arc<dyn LlmAdapter>) -> Self {
        Self {
            processor: QueryProcessor::new(adapter),
        }
    }

    pub fn with_config(adapter: Arc<dyn LlmAdapter>, config: ProcessorConfig) -> Self {
        Self {
            processor: QueryProcessor::with_config(adapter, config),
        }
    }

    /// Process one question against the session's current table. Processor
    /// failures are converted to a user-visible message, never propagated;
    /// a visualization request without parameters produces no chart.
    pub async fn ask(
        &self,
        session: &Session,
        question: &str,
        wants_visualization: bool,
    ) -> (String, Option<Chart>) {
        let Some(table) = session.table() else {
            return ("Please upload a CSV file first.".to_string(), None);
        };
        match self
            .processor
            .process(table, question, wants_visualization)
            .await
        {
            Ok(response) => {
                let chart = if response.create_visualization {
                    response
                        .visualization_params
                        .as_ref()
                        .map(|params| viz::render(table, params))
                } else {
                    None
                };
                debug!(chart = chart.is_some(), "question answered");
                (response.answer.display_text(), chart)
            }
            Err(e) => (format!("Error processing question: {e}"), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use async_trait::async_trait;
    use std::io::Write;

    struct FixedAdapter(String);

    #[async_trait]
    impl LlmAdapter for FixedAdapter {
        async fn generate_response(&self, _prompt: &str) -> std::result::Result<String, LlmError> {
            Ok(self.0.clone())
        }
    }

    struct DownAdapter;

    #[async_trait]
    impl LlmAdapter for DownAdapter {
        async fn generate_response(&self, _prompt: &str) -> std::result::Result<String, LlmError> {
            Err(LlmError::Network("connection refused".to_string()))
        }
    }

    fn loaded_session() -> Session {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "price,city\n10,A\n20,B\n30,A\n").unwrap();
        file.flush().unwrap();
        let mut session = Session::new();
        session.load(file.path()).unwrap();
        session
    }

    #[tokio::test]
    async fn asking_without_a_table_prompts_for_upload() {
        let explorer = Explorer::new(Arc::new(FixedAdapter("irrelevant".to_string())));
        let (answer, chart) = explorer.ask(&Session::new(), "anything", false).await;
        assert_eq!(answer, "Please upload a CSV file first.");
        assert!(chart.is_none());
    }

    #[tokio::test]
    async fn answer_and_chart_flow_end_to_end() {
        let reply = r#"{
            "answer": "Average price is 20.00",
            "create_visualization": true,
            "visualization_params": {
                "visualization_type": "bar",
                "columns": ["city", "price"]
            }
        }"#;
        let explorer = Explorer::new(Arc::new(FixedAdapter(reply.to_string())));
        let session = loaded_session();
        let (answer, chart) = explorer.ask(&session, "average price per city?", true).await;
        assert_eq!(answer, "Average price is 20.00");
        let chart = chart.unwrap();
        assert!(!chart.is_placeholder());
        assert_eq!(chart.title, "Average price by city");
    }

    #[tokio::test]
    async fn visualization_flag_without_params_yields_no_chart() {
        let reply = r#"{"answer": "done", "create_visualization": true}"#;
        let explorer = Explorer::new(Arc::new(FixedAdapter(reply.to_string())));
        let (answer, chart) = explorer.ask(&loaded_session(), "plot it", true).await;
        assert_eq!(answer, "done");
        assert!(chart.is_none());
    }

    #[tokio::test]
    async fn service_failure_surfaces_as_answer_text() {
        let explorer = Explorer::with_config(
            Arc::new(DownAdapter),
            ProcessorConfig {
                max_attempts: 2,
                ..ProcessorConfig::default()
            },
        );
        let (answer, chart) = explorer.ask(&loaded_session(), "anything", false).await;
        assert!(answer.starts_with("Error processing question:"));
        assert!(chart.is_none());
    }
}
