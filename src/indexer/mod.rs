//! Indexer orchestrator: drives the Kythe decoder into the store.
//!
//! Ingest is a single forward pass. The decoder guarantees that a
//! node's facts arrive before any edge naming it under the same
//! signature, so a forward-only signature→id cache is enough; edges
//! whose endpoints are unknown are dropped (they typically point at
//! file nodes, which are not symbols).
//!
//! Decode and coordinate failures cost one record each, never the run.

pub mod extractor;

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{IndexingError, Result};
use crate::kythe::{KytheRecord, RecordReader, EDGE_CHILD_OF, EDGE_DEFINES_BINDING, EDGE_REF};
use crate::models::{IngestSummary, TextRange};
use crate::store::{FileRow, IndexStore};
use crate::text;

/// How often the cancellation token is re-checked, in records.
const CANCEL_CHECK_INTERVAL: u64 = 512;

/// Ingest the extractor stream at `path` into `store`.
pub fn ingest_file(
    store: &IndexStore,
    path: &Path,
    cancel: &CancellationToken,
) -> Result<IngestSummary> {
    let file = std::fs::File::open(path)?;
    ingest_reader(store, BufReader::new(file), cancel)
}

/// Ingest an already-open stream. Exposed separately for tests and for
/// prebuilt-index bytes arriving from elsewhere than the filesystem.
pub fn ingest_reader<R: BufRead>(
    store: &IndexStore,
    reader: R,
    cancel: &CancellationToken,
) -> Result<IngestSummary> {
    let mut ingest = Ingest::new(store);
    let mut records = RecordReader::new(reader);

    let mut seen: u64 = 0;
    loop {
        if seen % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(IndexingError::Cancelled);
        }
        let record = match records.next() {
            Some(result) => result?,
            None => break,
        };
        ingest.process(record)?;
        seen += 1;
        if seen % 10_000 == 0 {
            debug!(records = seen, "ingest progress");
        }
    }

    ingest.summary.dropped_records += records.skipped_lines;
    store.touch_updated_at()?;
    Ok(ingest.summary)
}

/// One ingest run's working state.
struct Ingest<'a> {
    store: &'a IndexStore,
    /// Extractor signature → store id (anchor or symbol). Not persisted.
    signature_cache: HashMap<String, i64>,
    /// Extractor path → file id, filled as file nodes arrive.
    file_ids: HashMap<String, i64>,
    /// Most recently used file, so runs of anchors in the same file do
    /// not refetch content from the store.
    cached_file: Option<FileRow>,
    summary: IngestSummary,
}

impl<'a> Ingest<'a> {
    fn new(store: &'a IndexStore) -> Self {
        Self {
            store,
            signature_cache: HashMap::new(),
            file_ids: HashMap::new(),
            cached_file: None,
            summary: IngestSummary::default(),
        }
    }

    /// A record can be a node, an edge, or both (an anchor's facts
    /// merged with the edge that immediately follows them); the node
    /// part is processed first so the edge can resolve it.
    fn process(&mut self, record: KytheRecord) -> Result<()> {
        if record.is_file() {
            self.process_file(&record)?;
        } else if record.is_anchor() {
            self.process_anchor(&record)?;
        } else if record.is_symbol() {
            self.process_symbol(&record)?;
        }

        if record.is_edge() {
            self.process_edge(&record)?;
        }
        Ok(())
    }

    fn process_file(&mut self, record: &KytheRecord) -> Result<()> {
        let Some(content) = record.text() else {
            warn!(path = %record.source.path, "file node without text fact, dropped");
            self.summary.dropped_records += 1;
            return Ok(());
        };

        let path = record.source.path.clone();
        let id = self.store.add_file(Path::new(&path), content)?;
        self.file_ids.insert(path, id);
        self.summary.files += 1;
        Ok(())
    }

    fn process_anchor(&mut self, record: &KytheRecord) -> Result<()> {
        let (Some(start), Some(end)) = (record.loc_start(), record.loc_end()) else {
            warn!(
                signature = %record.source.signature,
                "anchor without loc facts, dropped"
            );
            self.summary.dropped_records += 1;
            return Ok(());
        };

        let Some(&file_id) = self.file_ids.get(&record.source.path) else {
            warn!(path = %record.source.path, "anchor for unknown file, dropped");
            self.summary.dropped_records += 1;
            return Ok(());
        };

        let range = {
            let Some(content) = self.file_content(file_id)? else {
                warn!(file = file_id, "anchor file missing from store, dropped");
                self.summary.dropped_records += 1;
                return Ok(());
            };
            if end > content.len() || start > end {
                warn!(
                    signature = %record.source.signature,
                    start, end,
                    "anchor offsets outside file content, dropped"
                );
                self.summary.dropped_records += 1;
                return Ok(());
            }
            TextRange::new(text::position_of(content, start), text::position_of(content, end))
        };

        let id = self.store.add_anchor(file_id, range)?;
        self.signature_cache
            .insert(record.source.signature.clone(), id);
        self.summary.anchors += 1;
        Ok(())
    }

    fn process_symbol(&mut self, record: &KytheRecord) -> Result<()> {
        let kind = record.symbol_kind().unwrap_or("unknown");
        // The opaque signature stands in as the name until a binding
        // edge reveals the source lexeme.
        let id = self
            .store
            .add_symbol(&record.source.signature, kind, None)?;
        self.signature_cache
            .insert(record.source.signature.clone(), id);
        self.summary.symbols += 1;
        Ok(())
    }

    fn process_edge(&mut self, record: &KytheRecord) -> Result<()> {
        let Some(target) = record.target.as_ref() else {
            return Ok(());
        };

        let source_id = self.signature_cache.get(&record.source.signature).copied();
        let target_id = self.signature_cache.get(&target.signature).copied();

        match record.edge_kind.as_deref() {
            Some(EDGE_DEFINES_BINDING) => {
                let (Some(anchor_id), Some(symbol_id)) = (source_id, target_id) else {
                    self.drop_edge(record);
                    return Ok(());
                };
                self.resolve_binding(anchor_id, symbol_id)?;
            }
            Some(EDGE_REF) => {
                let (Some(anchor_id), Some(symbol_id)) = (source_id, target_id) else {
                    self.drop_edge(record);
                    return Ok(());
                };
                self.store.add_ref(anchor_id, symbol_id)?;
                self.summary.refs += 1;
            }
            Some(EDGE_CHILD_OF) => {
                // Child symbol → parent symbol.
                let (Some(child_id), Some(parent_id)) = (source_id, target_id) else {
                    self.drop_edge(record);
                    return Ok(());
                };
                self.store.add_symbol_relationship(parent_id, child_id)?;
                self.summary.relationships += 1;
            }
            _ => {}
        }
        Ok(())
    }

    /// A binding edge fixes the symbol's declaration anchor and rewrites
    /// its name with the source lexeme under that anchor.
    fn resolve_binding(&mut self, anchor_id: i64, symbol_id: i64) -> Result<()> {
        let Some(anchor) = self.store.get_anchor_by_id(anchor_id)? else {
            warn!(anchor_id, "binding edge to missing anchor, dropped");
            self.summary.dropped_edges += 1;
            return Ok(());
        };

        self.store.update_symbol_anchor(symbol_id, anchor_id)?;

        let lexeme = {
            let Some(content) = self.file_content(anchor.file)? else {
                warn!(file = anchor.file, "binding anchor file missing, name kept opaque");
                return Ok(());
            };
            text::slice_range(content, anchor.range).map(str::to_string)
        };

        match lexeme {
            Some(name) => self.store.update_symbol_name(symbol_id, &name)?,
            None => warn!(anchor_id, "binding anchor range unresolvable, name kept opaque"),
        }
        Ok(())
    }

    fn drop_edge(&mut self, record: &KytheRecord) {
        debug!(
            source = %record.source.signature,
            edge_kind = record.edge_kind.as_deref().unwrap_or(""),
            "edge endpoint not in signature cache, dropped"
        );
        self.summary.dropped_edges += 1;
    }

    /// MRU file-content cache; invalidated whenever the requested file
    /// id differs from the cached one.
    fn file_content(&mut self, file_id: i64) -> Result<Option<&str>> {
        if self.cached_file.as_ref().map(|f| f.id) != Some(file_id) {
            self.cached_file = self.store.get_file_by_id(file_id)?;
        }
        Ok(self.cached_file.as_ref().map(|f| f.content.as_str()))
    }
}
