//! Extractor runner: file-list handling and the external
//! `verible-verilog-kythe-extractor` invocation.
//!
//! The runner is deliberately thin. It materializes the file list into
//! a scratch directory, spawns the extractor with stdout redirected to
//! the requested output path, and polices the exit status. Everything
//! downstream consumes the JSON artifact through the orchestrator.

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Deserialize;
use tracing::info;

use crate::error::{IndexingError, Result};

const EXTRACTOR_BINARY: &str = "verible-verilog-kythe-extractor";

/// Extensions retained when the file list comes from a TOML project
/// description.
const SOURCE_EXTENSIONS: [&str; 3] = ["sv", "v", "svh"];

/// TOML file list shape: `[libraries.lib] files = [...]`.
#[derive(Debug, Deserialize)]
struct TomlFileList {
    libraries: TomlLibraries,
}

#[derive(Debug, Deserialize)]
struct TomlLibraries {
    lib: TomlLibrary,
}

#[derive(Debug, Deserialize)]
struct TomlLibrary {
    files: Vec<PathBuf>,
}

pub struct ExtractorRunner {
    /// Directory holding the Verible binaries; empty resolves via PATH.
    install_dir: PathBuf,
    /// Base for relative include-dir entries.
    workspace_root: PathBuf,
    file_list: Vec<PathBuf>,
}

impl ExtractorRunner {
    pub fn new(install_dir: PathBuf, workspace_root: PathBuf) -> Self {
        Self {
            install_dir,
            workspace_root,
            file_list: Vec::new(),
        }
    }

    pub fn clear(&mut self) {
        self.file_list.clear();
    }

    pub fn file_list(&self) -> &[PathBuf] {
        &self.file_list
    }

    /// Read a file list: either a plain newline-delimited path list or
    /// a TOML document with `[libraries.lib] files = [...]`. For TOML
    /// only `.sv`/`.v`/`.svh` entries (case-insensitive) are kept.
    pub fn read_file_list(&mut self, path: &Path) -> Result<()> {
        let raw = std::fs::read_to_string(path).map_err(|e| IndexingError::FileList {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml")) {
            info!(path = %path.display(), "reading TOML file list");
            let doc: TomlFileList =
                toml::from_str(&raw).map_err(|e| IndexingError::FileList {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
            self.file_list.extend(
                doc.libraries
                    .lib
                    .files
                    .into_iter()
                    .filter(|f| has_source_extension(f)),
            );
        } else {
            self.file_list.extend(
                raw.lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(PathBuf::from),
            );
        }
        Ok(())
    }

    /// Write the current file list, one path per line.
    pub fn dump_file_list(&self, path: &Path) -> Result<()> {
        let mut out = std::fs::File::create(path)?;
        for file in &self.file_list {
            writeln!(out, "{}", file.display())?;
        }
        Ok(())
    }

    /// Include directories for the extractor: the parent directory of
    /// every listed file, made absolute against the workspace root.
    pub fn include_dirs(&self) -> Vec<PathBuf> {
        let dirs: BTreeSet<PathBuf> = self
            .file_list
            .iter()
            .filter_map(|f| f.parent())
            .map(|dir| {
                if dir.is_absolute() {
                    dir.to_path_buf()
                } else {
                    self.workspace_root.join(dir)
                }
            })
            .collect();
        dirs.into_iter().collect()
    }

    fn executable(&self) -> PathBuf {
        if self.install_dir.as_os_str().is_empty() {
            PathBuf::from(EXTRACTOR_BINARY)
        } else {
            self.install_dir.join(EXTRACTOR_BINARY)
        }
    }

    /// Run the extractor, streaming its Kythe JSON output to `output`.
    ///
    /// A non-zero exit or anything on stderr aborts the ingest; the
    /// caller is expected to leave the store cleared.
    pub fn run(&self, output: &Path) -> Result<()> {
        if self.file_list.is_empty() {
            return Err(IndexingError::FileList {
                path: self.workspace_root.clone(),
                message: "no source files listed".to_string(),
            });
        }

        let scratch = tempfile::tempdir()?;
        let list_path = scratch.path().join("files.fls");
        self.dump_file_list(&list_path)?;

        let include_dirs = self
            .include_dirs()
            .iter()
            .map(|d| d.display().to_string())
            .collect::<Vec<_>>()
            .join(",");

        let output_file = std::fs::File::create(output)?;

        let mut command = Command::new(self.executable());
        command
            .arg("--file_list_root")
            .arg("/")
            .arg("--print_kythe_facts")
            .arg("json")
            .arg("--include_dir_paths")
            .arg(&include_dirs)
            .arg("--file_list_path")
            .arg(&list_path)
            .stdout(Stdio::from(output_file))
            .stderr(Stdio::piped());

        info!(command = ?command, "running extractor");
        let spawned = command.spawn()?;
        let result = spawned.wait_with_output()?;

        let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
        if !result.status.success() || !stderr.is_empty() {
            return Err(IndexingError::Extractor {
                status: result.status.code().unwrap_or(-1),
                stderr,
            });
        }
        Ok(())
    }
}

fn has_source_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SOURCE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn plain_file_list_keeps_every_non_empty_line() {
        let dir = tempdir().expect("tempdir");
        let list = dir.path().join("files.fls");
        std::fs::write(&list, "rtl/top.sv\n\nrtl/core.v\n  \nREADME.md\n").expect("write");

        let mut runner = ExtractorRunner::new(PathBuf::new(), dir.path().to_path_buf());
        runner.read_file_list(&list).expect("read");

        // Plain lists are taken verbatim; only TOML lists filter by
        // extension.
        assert_eq!(
            runner.file_list(),
            &[
                PathBuf::from("rtl/top.sv"),
                PathBuf::from("rtl/core.v"),
                PathBuf::from("README.md"),
            ]
        );
    }

    #[test]
    fn toml_file_list_filters_by_extension() {
        let dir = tempdir().expect("tempdir");
        let list = dir.path().join("project.toml");
        std::fs::write(
            &list,
            r#"
                [libraries.lib]
                files = ["rtl/top.SV", "rtl/pkg.svh", "rtl/core.v", "docs/readme.md", "sim/tb.cpp"]
            "#,
        )
        .expect("write");

        let mut runner = ExtractorRunner::new(PathBuf::new(), dir.path().to_path_buf());
        runner.read_file_list(&list).expect("read");

        assert_eq!(
            runner.file_list(),
            &[
                PathBuf::from("rtl/top.SV"),
                PathBuf::from("rtl/pkg.svh"),
                PathBuf::from("rtl/core.v"),
            ]
        );
    }

    #[test]
    fn malformed_toml_reports_a_file_list_error() {
        let dir = tempdir().expect("tempdir");
        let list = dir.path().join("project.toml");
        std::fs::write(&list, "not toml at all [").expect("write");

        let mut runner = ExtractorRunner::new(PathBuf::new(), dir.path().to_path_buf());
        match runner.read_file_list(&list) {
            Err(IndexingError::FileList { path, .. }) => assert_eq!(path, list),
            other => panic!("expected file-list error, got {other:?}"),
        }
    }

    #[test]
    fn include_dirs_are_absolute_and_deduped() {
        let root = PathBuf::from("/ws");
        let mut runner = ExtractorRunner::new(PathBuf::new(), root);
        runner.file_list = vec![
            PathBuf::from("rtl/top.sv"),
            PathBuf::from("rtl/core.sv"),
            PathBuf::from("/abs/ip/uart.sv"),
        ];

        assert_eq!(
            runner.include_dirs(),
            vec![PathBuf::from("/abs/ip"), PathBuf::from("/ws/rtl")]
        );
    }

    #[test]
    fn run_with_empty_file_list_fails_fast() {
        let runner = ExtractorRunner::new(PathBuf::new(), PathBuf::from("/ws"));
        let out = std::env::temp_dir().join("svindex-never-written.json");
        assert!(matches!(
            runner.run(&out),
            Err(IndexingError::FileList { .. })
        ));
    }

    #[test]
    fn executable_resolves_through_install_dir() {
        let runner = ExtractorRunner::new(PathBuf::from("/opt/verible/bin"), PathBuf::new());
        assert_eq!(
            runner.executable(),
            PathBuf::from("/opt/verible/bin/verible-verilog-kythe-extractor")
        );

        let bare = ExtractorRunner::new(PathBuf::new(), PathBuf::new());
        assert_eq!(bare.executable(), PathBuf::from(EXTRACTOR_BINARY));
    }
}
