//! Shared data models for positions, locations, diagnostics, and the
//! JSON API surface.
//!
//! These types form the stable JSON contract used by the CLI and the
//! daemon mode. Every coordinate in this crate is 0-based on both axes
//! and measured in bytes; there is no off-by-one adjustment at any
//! boundary.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Schema version for query result JSON payloads.
///
/// Follows semver semantics; clients consuming `--format=json` output
/// should check this version and handle newer minor versions
/// conservatively.
pub const QUERY_RESULT_VERSION: &str = "0.1.0";

/// A single point in a source file, 0-based line and 0-based byte
/// column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TextPosition {
    pub line: u32,
    pub character: u32,
}

impl TextPosition {
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A span in a source file between two positions.
///
/// `start` is inclusive. `end` points one past the last byte of the
/// span, matching the half-open byte offsets in the extractor stream;
/// position queries still accept a cursor sitting exactly on `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRange {
    pub start: TextPosition,
    pub end: TextPosition,
}

impl TextRange {
    pub fn new(start: TextPosition, end: TextPosition) -> Self {
        Self { start, end }
    }

    /// Ordering key for the "most specific anchor" rule: line span
    /// first, then column span.
    pub fn extent(&self) -> (u32, u32) {
        let lines = self.end.line.saturating_sub(self.start.line);
        let cols = if self.end.line == self.start.line {
            self.end.character.saturating_sub(self.start.character)
        } else {
            self.end.character
        };
        (lines, cols)
    }
}

/// A resolved location: file path plus range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrcLocation {
    pub path: PathBuf,
    pub range: TextRange,
}

/// Public view of a symbol, as returned by queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolInfo {
    /// Source-level name (the declaration lexeme).
    pub name: String,
    /// Short kind string from the extractor (e.g. "module", "wire").
    pub kind: String,
    /// Location of the declaration anchor.
    pub location: SrcLocation,
}

/// A single text replacement inside one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub range: TextRange,
    pub new_text: String,
}

/// Per-file edit plan produced by a rename.
///
/// The map is keyed by file path; edits within a file are sorted by
/// range start. Applying all edits (back to front within each file)
/// yields the renamed sources.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenamePlan {
    pub edits: BTreeMap<PathBuf, Vec<TextEdit>>,
}

impl RenamePlan {
    /// Total number of individual replacements across all files.
    pub fn edit_count(&self) -> usize {
        self.edits.values().map(Vec::len).sum()
    }
}

/// Diagnostic severity, lowercase in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Information,
    Hint,
}

/// One diagnostic produced by the external syntax checker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub range: TextRange,
    pub message: String,
    pub severity: DiagnosticSeverity,
    pub source: String,
    pub code: String,
}

/// Counters reported after an ingest run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestSummary {
    pub files: u64,
    pub anchors: u64,
    pub symbols: u64,
    pub refs: u64,
    pub relationships: u64,
    /// Records skipped because of decode or coordinate failures.
    pub dropped_records: u64,
    /// Edges skipped because an endpoint was not in the signature cache.
    pub dropped_edges: u64,
    /// RFC 3339 creation timestamp of the store, from its metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// RFC 3339 timestamp of this ingest, from the store metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Location of the external Verible binaries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Directory containing the extractor and syntax-checker binaries.
    /// Empty means "resolve through PATH".
    #[serde(rename = "veribleInstallPath", default)]
    pub verible_install_path: PathBuf,
}

/// Workspace configuration, with the key names the editor client uses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    /// Pre-built extractor output to ingest when `usePrebuiltIndex` is
    /// set.
    #[serde(rename = "indexFilePath", default)]
    pub index_file_path: PathBuf,
    /// File list consumed by the extractor.
    #[serde(rename = "fileListPath", default)]
    pub file_list_path: PathBuf,
    /// Skip extractor invocation and ingest `indexFilePath` directly.
    #[serde(rename = "usePrebuiltIndex", default)]
    pub use_prebuilt_index: bool,
}

/// Body of position-keyed queries (`definition`, `completion`,
/// `prepare-rename`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionParams {
    pub path: PathBuf,
    pub position: TextPosition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceParams {
    pub path: PathBuf,
    pub position: TextPosition,
    #[serde(default)]
    pub include_declaration: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameParams {
    pub path: PathBuf,
    pub position: TextPosition,
    pub new_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DidSaveParams {
    pub path: PathBuf,
    /// Full post-save text; omitted when the client did not include it.
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DidSaveResponse {
    /// Whether a reindex ran (false when suppressed or deferred).
    pub reindexed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpParams {
    pub path: PathBuf,
}
