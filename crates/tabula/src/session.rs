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

//! Explicit session state: the single current-table slot, owned by the
//! caller and passed by reference into the core components rather than
//! living in ambient global storage. Each upload replaces the table
//! wholesale; no history is retained.

use crate::error::LoadError;
use crate::loader::load_csv;
use polars::prelude::DataFrame;
use std::path::Path;
use tracing::info;

#[derive(Default)]
pub struct Session {
    table: Option<DataFrame>,
    summary: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a file into the session, replacing any previous table. Returns
    /// the dataset-information summary for display. On failure the previous
    /// table is left untouched.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> std::result::Result<String, LoadError> {
        let (table, summary) = load_csv(path)?;
        info!(
            rows = table.height(),
            columns = table.width(),
            "session table replaced"
        );
        self.table = Some(table);
        self.summary = Some(summary.clone());
        Ok(summary)
    }

    pub fn table(&self) -> Option<&DataFrame> {
        self.table.as_ref()
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn clear(&mut self) {
        self.table = None;
        self.summary = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{content}").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn load_replaces_the_table_wholesale() {
        let mut session = Session::new();
        assert!(session.table().is_none());

        let first = csv("a\n1\n2\n");
        session.load(first.path()).unwrap();
        assert_eq!(session.table().unwrap().height(), 2);

        let second = csv("b,c\n1,2\n");
        session.load(second.path()).unwrap();
        let table = session.table().unwrap();
        assert_eq!(table.height(), 1);
        assert_eq!(table.width(), 2);
    }

    #[test]
    fn failed_load_keeps_the_previous_table() {
        let mut session = Session::new();
        let good = csv("a\n1\n");
        session.load(good.path()).unwrap();

        let err = session.load("/nonexistent/missing.csv");
        assert!(err.is_err());
        assert!(session.table().is_some());
        assert!(session.summary().is_some());
    }
}
