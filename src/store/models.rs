//! Row types for the persisted symbol graph.
//!
//! These mirror the tables and the `fully_qualified_symbols` view in
//! `sql/create_index_db.sql`. Ids are SQLite rowids and only meaningful
//! within one store instance.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::models::{SrcLocation, SymbolInfo, TextPosition, TextRange};

/// One row of `files`. Owns the full text captured at ingest time.
#[derive(Debug, Clone)]
pub struct FileRow {
    pub id: i64,
    pub path: PathBuf,
    pub content: String,
}

/// One row of `anchors`: a half-open editor range inside one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorRow {
    pub id: i64,
    pub file: i64,
    pub range: TextRange,
}

impl AnchorRow {
    pub fn new(id: i64, file: i64, range: TextRange) -> Self {
        Self { id, file, range }
    }

    pub fn start(&self) -> TextPosition {
        self.range.start
    }

    pub fn end(&self) -> TextPosition {
        self.range.end
    }
}

/// A symbol joined with its declaration anchor and that anchor's file,
/// as produced by the `fully_qualified_symbols` view.
#[derive(Debug, Clone)]
pub struct SymbolRow {
    pub id: i64,
    pub name: String,
    pub kind: String,
    pub declaration: AnchorRow,
    /// Path of the declaring file.
    pub path: PathBuf,
}

impl SymbolRow {
    /// Public API projection of this row.
    pub fn info(&self) -> SymbolInfo {
        SymbolInfo {
            name: self.name.clone(),
            kind: self.kind.clone(),
            location: SrcLocation {
                path: self.path.clone(),
                range: self.declaration.range,
            },
        }
    }
}

/// Store metadata, kept in the `meta` key/value table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMeta {
    pub schema_version: String,
    pub tool_version: String,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
    pub updated_at: u64,
}

impl StoreMeta {
    /// RFC 3339 rendering of `updated_at` for summaries.
    pub fn updated_at_iso8601(&self) -> Option<String> {
        format_epoch_iso8601(self.updated_at)
    }

    pub fn created_at_iso8601(&self) -> Option<String> {
        format_epoch_iso8601(self.created_at)
    }
}

fn format_epoch_iso8601(secs: u64) -> Option<String> {
    use time::{format_description::well_known::Rfc3339, OffsetDateTime};

    let dt = OffsetDateTime::from_unix_timestamp(secs as i64).ok()?;
    dt.format(&Rfc3339).ok()
}

/// Aggregate row counts, used for summaries and the double-ingest law.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreCounts {
    pub files: u64,
    pub anchors: u64,
    pub symbols: u64,
    pub refs: u64,
    pub relationships: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_row_projects_to_public_info() {
        let row = SymbolRow {
            id: 3,
            name: "clk".to_string(),
            kind: "wire".to_string(),
            declaration: AnchorRow::new(
                7,
                1,
                TextRange::new(TextPosition::new(2, 7), TextPosition::new(2, 10)),
            ),
            path: PathBuf::from("/rtl/top.sv"),
        };

        let info = row.info();
        assert_eq!(info.name, "clk");
        assert_eq!(info.kind, "wire");
        assert_eq!(info.location.path, PathBuf::from("/rtl/top.sv"));
        assert_eq!(info.location.range.start.character, 7);
    }

    #[test]
    fn meta_timestamps_render_rfc3339() {
        let meta = StoreMeta {
            schema_version: "2".to_string(),
            tool_version: "0.1.0".to_string(),
            created_at: 1_700_000_000,
            updated_at: 1_700_000_500,
        };

        let rendered = meta.updated_at_iso8601().expect("timestamp");
        assert!(rendered.starts_with("2023-11-14T"));
    }
}
