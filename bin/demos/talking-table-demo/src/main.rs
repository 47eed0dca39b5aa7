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

use std::io::{self, Write};
use std::sync::Arc;
use tabula::{Chart, ChartBody, Explorer, HttpLlmAdapter, LlmAdapter, Session};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    dotenvy::dotenv().ok();
    info!("Starting talking-table interactive demo");

    let adapter: Arc<dyn LlmAdapter> = if std::env::var("ANTHROPIC_API_KEY").is_ok() {
        info!("Using Anthropic adapter");
        Arc::new(HttpLlmAdapter::anthropic().map_err(|e| anyhow::anyhow!("{e}"))?)
    } else {
        let model =
            std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2:latest".to_string());
        info!(%model, "ANTHROPIC_API_KEY not set, using Ollama adapter");
        Arc::new(HttpLlmAdapter::ollama(model))
    };

    let explorer = Explorer::new(adapter);
    let mut session = Session::new();
    let mut wants_visualization = false;

    println!("talking-table demo");
    println!("  load <path>   load a CSV file");
    println!("  viz on|off    toggle visualization requests (currently off)");
    println!("  exit          quit");
    println!();

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if input == "exit" || input == "quit" {
            break;
        }
        if let Some(path) = input.strip_prefix("load ") {
            match session.load(path.trim()) {
                Ok(summary) => println!("{summary}"),
                Err(e) => println!("Error: {e}"),
            }
            continue;
        }
        if let Some(flag) = input.strip_prefix("viz ") {
            wants_visualization = flag.trim() == "on";
            println!(
                "visualization requests {}",
                if wants_visualization { "on" } else { "off" }
            );
            continue;
        }

        let (answer, chart) = explorer.ask(&session, input, wants_visualization).await;
        println!("{answer}");
        if let Some(chart) = chart {
            println!();
            print_chart(&chart);
        }
    }

    Ok(())
}

fn print_chart(chart: &Chart) {
    println!("[{} chart] {}", chart.kind, chart.title);
    if let (Some(x), Some(y)) = (&chart.x_axis_label, &chart.y_axis_label) {
        println!("  x: {x}  y: {y}");
    }
    match &chart.body {
        ChartBody::Empty => println!("  (empty chart)"),
        ChartBody::Placeholder { message } => println!("  {message}"),
        ChartBody::Histogram { bin_edges, counts } => {
            for (i, count) in counts.iter().enumerate() {
                if *count > 0 {
                    println!(
                        "  [{:.2}, {:.2}): {}",
                        bin_edges[i],
                        bin_edges[i + 1],
                        "#".repeat(*count as usize)
                    );
                }
            }
        }
        ChartBody::Slices {
            labels,
            counts,
            percentages,
        } => {
            for ((label, count), pct) in labels.iter().zip(counts).zip(percentages) {
                println!("  {label}: {count} ({pct}%)");
            }
        }
        ChartBody::Bars { labels, values } => {
            for (label, value) in labels.iter().zip(values) {
                println!("  {label}: {value:.2}");
            }
        }
        ChartBody::Points { x, y } | ChartBody::Path { x, y } => {
            for (px, py) in x.iter().zip(y) {
                println!("  ({px}, {py})");
            }
        }
    }
}
