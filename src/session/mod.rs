//! Index session: one store, one staleness flag, one workspace
//! configuration.
//!
//! The session is the piece the request dispatcher talks to. Compute
//! runs on whatever worker thread calls in; the store handle is behind
//! a mutex, which both serializes reindex against readers and stands in
//! for the single shared connection of the persistence layer. Queries
//! that find the `indexed` flag cleared run the reindex themselves
//! under the lock and then answer — a stale request blocks, it is never
//! dropped.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::diagnostics::{DiagnosticStore, SyntaxChecker};
use crate::error::{IndexingError, Result};
use crate::indexer;
use crate::indexer::extractor::ExtractorRunner;
use crate::models::{
    IngestSummary, RenamePlan, SrcLocation, TextPosition, TextRange, WorkspaceConfig,
};
use crate::query::QueryEngine;
use crate::store::{IndexStore, StoreCounts};

pub struct IndexSession {
    store: Mutex<IndexStore>,
    diagnostics: Mutex<DiagnosticStore>,
    config: WorkspaceConfig,
    /// Base for relative paths in the configuration.
    workspace_root: PathBuf,
    /// Cleared at reindex start and on save, set at completion.
    indexed: AtomicBool,
    cancel: CancellationToken,
}

impl IndexSession {
    /// Open a session over a fresh in-memory store.
    pub fn new(config: WorkspaceConfig, workspace_root: PathBuf) -> Result<Self> {
        Ok(Self {
            store: Mutex::new(IndexStore::open_in_memory()?),
            diagnostics: Mutex::new(DiagnosticStore::default()),
            config,
            workspace_root,
            indexed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    /// Token observed by long operations between phases.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn lock_store(&self) -> MutexGuard<'_, IndexStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn file_list_path(&self) -> PathBuf {
        resolve(&self.workspace_root, &self.config.file_list_path)
    }

    fn index_file_path(&self) -> PathBuf {
        resolve(&self.workspace_root, &self.config.index_file_path)
    }

    /// Clear and rebuild the whole index.
    pub fn reindex(&self) -> Result<IngestSummary> {
        let store = self.lock_store();
        self.reindex_store(&store)
    }

    fn reindex_store(&self, store: &IndexStore) -> Result<IngestSummary> {
        self.indexed.store(false, Ordering::SeqCst);
        store.clear()?;

        let result = if self.config.use_prebuilt_index {
            let index_path = self.index_file_path();
            info!(path = %index_path.display(), "reindex from prebuilt stream");
            indexer::ingest_file(store, &index_path, &self.cancel)
        } else {
            self.run_extractor_and_ingest(store)
        };

        match result {
            Ok(mut summary) => {
                let meta = store.meta()?;
                summary.created_at = meta.created_at_iso8601();
                summary.updated_at = meta.updated_at_iso8601();
                self.indexed.store(true, Ordering::SeqCst);
                info!(?summary, "indexing done");
                Ok(summary)
            }
            Err(IndexingError::Cancelled) => Err(IndexingError::Cancelled),
            Err(err) => {
                // Abort policy: a failed ingest leaves a cleared store,
                // not a half-written graph.
                warn!(%err, "reindex failed, clearing store");
                let _ = store.clear();
                Err(err)
            }
        }
    }

    fn run_extractor_and_ingest(&self, store: &IndexStore) -> Result<IngestSummary> {
        let file_list = self.file_list_path();
        let extractor_root = file_list
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.workspace_root.clone());

        let mut runner = ExtractorRunner::new(
            self.config.backend.verible_install_path.clone(),
            extractor_root,
        );
        runner.read_file_list(&file_list)?;

        let scratch = tempfile::tempdir()?;
        let output = scratch.path().join("index.json");
        runner.run(&output)?;

        indexer::ingest_file(store, &output, &self.cancel)
    }

    fn ensure_indexed(&self, store: &IndexStore) -> Result<()> {
        if self.indexed.load(Ordering::SeqCst) {
            return Ok(());
        }
        info!("index is stale, reindexing before answering");
        self.reindex_store(store).map(|_| ())
    }

    // ---- queries --------------------------------------------------

    pub fn definition(&self, path: &Path, position: TextPosition) -> Result<Option<SrcLocation>> {
        let store = self.lock_store();
        self.ensure_indexed(&store)?;
        QueryEngine::new(&store).definition_at(path, position)
    }

    pub fn references(
        &self,
        path: &Path,
        position: TextPosition,
        include_declaration: bool,
    ) -> Result<Vec<SrcLocation>> {
        let store = self.lock_store();
        self.ensure_indexed(&store)?;
        QueryEngine::new(&store).references_at(path, position, include_declaration)
    }

    pub fn prepare_rename(&self, path: &Path, position: TextPosition) -> Result<Option<TextRange>> {
        let store = self.lock_store();
        self.ensure_indexed(&store)?;
        QueryEngine::new(&store).prepare_rename(path, position)
    }

    pub fn rename(
        &self,
        path: &Path,
        position: TextPosition,
        new_name: &str,
    ) -> Result<Option<RenamePlan>> {
        let store = self.lock_store();
        self.ensure_indexed(&store)?;
        QueryEngine::new(&store)
            .with_cancel(self.cancel.clone())
            .rename(path, position, new_name)
    }

    pub fn completion(&self, path: &Path, position: TextPosition) -> Result<Vec<String>> {
        let store = self.lock_store();
        self.ensure_indexed(&store)?;
        QueryEngine::new(&store).completion_at(path, position)
    }

    // ---- editor notifications -------------------------------------

    /// Text-document-did-save: refresh the stored content, mark the
    /// index stale, and reindex unless the syntax checker reports an
    /// error. Returns whether a reindex actually ran.
    pub fn did_save(&self, path: &Path, content: Option<&str>) -> Result<bool> {
        {
            let store = self.lock_store();
            if let Some(content) = content {
                store.update_file_content(path, content)?;
            }
        }
        self.indexed.store(false, Ordering::SeqCst);

        let checker = SyntaxChecker::new(&self.config.backend.verible_install_path);
        match checker.check(&[path.to_path_buf()]) {
            Ok(bundle) => {
                let mut diagnostics = self
                    .diagnostics
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                diagnostics.replace(bundle);
                if diagnostics.has_errors() {
                    info!(errors = diagnostics.error_count(), "reindex suppressed by syntax errors");
                    return Ok(false);
                }
            }
            Err(err) => {
                // Soft failure: drop stale diagnostics, defer reindex.
                warn!(%err, "syntax check failed, deferring reindex");
                self.diagnostics
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clear_file(path);
                return Ok(false);
            }
        }

        self.reindex()?;
        Ok(true)
    }

    /// Error-severity diagnostic count across the workspace.
    pub fn syntax_error_count(&self) -> usize {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .error_count()
    }

    // ---- maintenance ----------------------------------------------

    /// Serialize the live store to `destination` for debugging.
    pub fn dump(&self, destination: &Path) -> Result<()> {
        let store = self.lock_store();
        store.dump(destination)
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        let store = self.lock_store();
        store.counts()
    }
}

fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}
