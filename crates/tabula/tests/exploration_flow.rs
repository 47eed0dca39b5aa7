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

use anyhow::Result;
use async_trait::async_trait;
use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tabula::{Chart, ChartBody, Explorer, LlmAdapter, LlmError, ProcessorConfig, Session};

/// Returns each scripted reply in turn, repeating the last one once the
/// script runs out.
struct ScriptedAdapter {
    replies: Vec<String>,
    calls: AtomicU32,
}

impl ScriptedAdapter {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: replies.iter().map(|s| s.to_string()).collect(),
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl LlmAdapter for ScriptedAdapter {
    async fn generate_response(&self, _prompt: &str) -> std::result::Result<String, LlmError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        let idx = n.min(self.replies.len() - 1);
        Ok(self.replies[idx].clone())
    }
}

fn session_with_sales() -> Result<(Session, tempfile::NamedTempFile)> {
    let mut file = tempfile::NamedTempFile::new()?;
    write!(
        file,
        "region,revenue,units\nNorth,100,5\nSouth,250,8\nNorth,150,6\nEast,300,9\n"
    )?;
    file.flush()?;
    let mut session = Session::new();
    let summary = session.load(file.path())?;
    assert!(summary.contains("CSV loaded successfully. Shape: (4, 3)"));
    Ok((session, file))
}

#[tokio::test]
async fn question_answer_and_chart_round_trip() -> Result<()> {
    let (session, _file) = session_with_sales()?;
    let reply = r#"{
        "answer": "North leads with average revenue 125.00",
        "create_visualization": true,
        "visualization_params": {
            "visualization_type": "bar",
            "columns": ["region", "revenue"]
        }
    }"#;
    let explorer = Explorer::new(Arc::new(ScriptedAdapter::new(&[reply])));

    let (answer, chart) = explorer
        .ask(&session, "which region earns the most on average?", true)
        .await;

    assert_eq!(answer, "North leads with average revenue 125.00");
    let chart: Chart = chart.expect("visualization was requested and parameterised");
    assert_eq!(chart.title, "Average revenue by region");
    match chart.body {
        ChartBody::Bars { labels, values } => {
            assert_eq!(labels, vec!["East", "North", "South"]);
            assert_eq!(values, vec![300.0, 125.0, 250.0]);
        }
        other => panic!("unexpected body: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn malformed_reply_recovers_on_a_later_attempt() -> Result<()> {
    let (session, _file) = session_with_sales()?;
    let adapter = Arc::new(ScriptedAdapter::new(&[
        "not json at all",
        r#"{"answer": "Total revenue is 800"}"#,
    ]));
    let explorer = Explorer::new(adapter.clone());

    let (answer, chart) = explorer.ask(&session, "total revenue?", false).await;

    assert_eq!(answer, "Total revenue is 800");
    assert!(chart.is_none());
    assert_eq!(adapter.calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn persistently_unstructured_reply_degrades_to_its_text() -> Result<()> {
    let (session, _file) = session_with_sales()?;
    let explorer = Explorer::with_config(
        Arc::new(ScriptedAdapter::new(&["the answer is forty-two"])),
        ProcessorConfig {
            max_attempts: 3,
            ..ProcessorConfig::default()
        },
    );

    let (answer, chart) = explorer.ask(&session, "meaning of it all?", true).await;

    assert_eq!(answer, "the answer is forty-two");
    assert!(chart.is_none());
    Ok(())
}

#[tokio::test]
async fn bogus_chart_request_still_returns_the_answer() -> Result<()> {
    let (session, _file) = session_with_sales()?;
    let reply = r#"{
        "answer": "Revenue spread shown below",
        "create_visualization": true,
        "visualization_params": {
            "visualization_type": "histogram",
            "columns": ["region"]
        }
    }"#;
    let explorer = Explorer::new(Arc::new(ScriptedAdapter::new(&[reply])));

    let (answer, chart) = explorer.ask(&session, "spread of revenue?", true).await;

    assert_eq!(answer, "Revenue spread shown below");
    let chart = chart.expect("a chart object is produced even when rendering fails");
    assert!(chart.is_placeholder());
    Ok(())
}

#[tokio::test]
async fn reloading_replaces_the_previous_table() -> Result<()> {
    let (mut session, _file) = session_with_sales()?;

    let mut other = tempfile::NamedTempFile::new()?;
    write!(other, "animal,legs\nspider,8\nant,6\n")?;
    other.flush()?;
    let summary = session.load(other.path())?;

    assert!(summary.contains("Shape: (2, 2)"));
    let table = session.table().expect("table is loaded");
    assert_eq!(
        table.get_column_names_str(),
        vec!["animal", "legs"]
    );
    Ok(())
}
