//! Syntax-error collaborator.
//!
//! The core does not understand SystemVerilog syntax; it consumes the
//! report of the external `verible-verilog-syntax` binary and keeps the
//! minimum state the session needs: per-file diagnostic lists and the
//! count of error-severity items (a non-zero count suppresses the
//! automatic reindex after save).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::info;

use crate::error::{IndexingError, Result};
use crate::models::{Diagnostic, DiagnosticSeverity, TextPosition, TextRange};

const SYNTAX_BINARY: &str = "verible-verilog-syntax";

/// Per-file diagnostic bundle, replaceable wholesale.
#[derive(Debug, Default)]
pub struct DiagnosticStore {
    by_file: HashMap<PathBuf, Vec<Diagnostic>>,
}

impl DiagnosticStore {
    pub fn clear_file(&mut self, path: &Path) {
        self.by_file.remove(path);
    }

    /// Replace the diagnostics of every file present in `bundle`.
    pub fn replace(&mut self, bundle: HashMap<PathBuf, Vec<Diagnostic>>) {
        for (path, diagnostics) in bundle {
            self.by_file.insert(path, diagnostics);
        }
    }

    pub fn diagnostics_for(&self, path: &Path) -> &[Diagnostic] {
        self.by_file.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of error-severity items across all files.
    pub fn error_count(&self) -> usize {
        self.by_file
            .values()
            .flatten()
            .filter(|d| d.severity == DiagnosticSeverity::Error)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

/// One rejected-token record in the checker's `--export_json` report.
/// Coordinates in the report are already 0-based.
#[derive(Debug, Deserialize)]
struct SyntaxRecord {
    line: u32,
    column: u32,
}

/// Thin runner around `verible-verilog-syntax`.
pub struct SyntaxChecker {
    executable: PathBuf,
}

impl SyntaxChecker {
    /// `install_dir` empty resolves the binary through PATH.
    pub fn new(install_dir: &Path) -> Self {
        let executable = if install_dir.as_os_str().is_empty() {
            PathBuf::from(SYNTAX_BINARY)
        } else {
            install_dir.join(SYNTAX_BINARY)
        };
        Self { executable }
    }

    /// Check `files`, returning one (possibly empty) diagnostic list
    /// per checked file. Exit code 0 means clean, 1 means syntax
    /// errors were reported; anything else, or output on stderr, is a
    /// soft failure — the caller clears diagnostics and defers reindex.
    pub fn check(&self, files: &[PathBuf]) -> Result<HashMap<PathBuf, Vec<Diagnostic>>> {
        let mut command = Command::new(&self.executable);
        command.arg("--export_json").args(files);

        info!(command = ?command, "running syntax checker");
        let output = command
            .output()
            .map_err(|e| IndexingError::SyntaxCheck(e.to_string()))?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let status = output.status.code().unwrap_or(-1);
        if !matches!(status, 0 | 1) || !stderr.is_empty() {
            return Err(IndexingError::SyntaxCheck(format!(
                "exit code {status}: {stderr}"
            )));
        }

        // Checked files always appear in the result so stale
        // diagnostics get replaced by empty lists.
        let mut bundle: HashMap<PathBuf, Vec<Diagnostic>> =
            files.iter().map(|f| (f.clone(), Vec::new())).collect();

        if status == 1 {
            let report = String::from_utf8_lossy(&output.stdout);
            for (path, diagnostics) in parse_report(&report)? {
                bundle.insert(path, diagnostics);
            }
        }
        Ok(bundle)
    }
}

/// Parse the `--export_json` report: a map of file path → labelled
/// record lists. Every record becomes an error diagnostic at its
/// reported position.
fn parse_report(report: &str) -> Result<HashMap<PathBuf, Vec<Diagnostic>>> {
    let parsed: HashMap<String, HashMap<String, Vec<SyntaxRecord>>> =
        serde_json::from_str(report).map_err(|e| IndexingError::SyntaxCheck(e.to_string()))?;

    let mut bundle = HashMap::new();
    for (file, sections) in parsed {
        let diagnostics: Vec<Diagnostic> = sections
            .into_values()
            .flatten()
            .map(|record| {
                let position = TextPosition::new(record.line, record.column);
                Diagnostic {
                    range: TextRange::new(position, position),
                    message: "Parse error: rejected token.".to_string(),
                    severity: DiagnosticSeverity::Error,
                    source: "verible-syntax".to_string(),
                    code: "syntax-error".to_string(),
                }
            })
            .collect();
        bundle.insert(PathBuf::from(file), diagnostics);
    }
    Ok(bundle)
}
