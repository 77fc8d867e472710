//! Kythe stream decoder.
//!
//! The external extractor emits newline-delimited JSON where every line
//! is one fact or edge entry. Entries for the same node arrive on
//! contiguous lines sharing a `source.signature`; this module groups
//! them back into logical records and decodes fact values (base64 →
//! UTF-8) on the way.
//!
//! Malformed lines are logged and skipped, never fatal: a broken entry
//! costs one record, not the ingest.

use std::collections::HashMap;
use std::io::BufRead;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;
use tracing::warn;

const EDGE_PREFIX: &str = "/kythe/edge";

pub const FACT_NODE_KIND: &str = "/kythe/node/kind";
pub const FACT_SUBKIND: &str = "/kythe/subkind";
pub const FACT_LOC_START: &str = "/kythe/loc/start";
pub const FACT_LOC_END: &str = "/kythe/loc/end";
pub const FACT_TEXT: &str = "/kythe/text";

pub const EDGE_DEFINES_BINDING: &str = "/defines/binding";
pub const EDGE_REF: &str = "/ref";
pub const EDGE_CHILD_OF: &str = "/childof";

/// Kythe vname. Signatures are opaque; `path` is relative to the
/// file-list root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VName {
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub root: String,
    #[serde(default)]
    pub corpus: String,
}

/// One raw line of the stream. `fact_name` is `"/"` for edge entries.
#[derive(Debug, Deserialize)]
struct EntryLine {
    source: VName,
    #[serde(default)]
    target: Option<VName>,
    #[serde(default)]
    edge_kind: Option<String>,
    fact_name: String,
    #[serde(default)]
    fact_value: Option<String>,
}

/// A logical record: all contiguous entries of one node, possibly
/// closed by an edge from the same signature.
#[derive(Debug, Clone)]
pub struct KytheRecord {
    pub source: VName,
    pub target: Option<VName>,
    /// Edge kind with the `/kythe/edge` prefix stripped, e.g.
    /// `/defines/binding`.
    pub edge_kind: Option<String>,
    /// Decoded facts, keyed by full fact name (`/kythe/...`).
    pub facts: HashMap<String, String>,
}

impl KytheRecord {
    fn new(entry: EntryLine) -> Result<Self, String> {
        let mut record = Self {
            source: entry.source.clone(),
            target: None,
            edge_kind: None,
            facts: HashMap::new(),
        };
        record.absorb(entry)?;
        Ok(record)
    }

    /// Whether `entry` continues this record: the record is not yet an
    /// edge, the signature matches, and the fact (when it carries a
    /// value) has not been seen on this record.
    fn can_append(&self, entry: &EntryLine) -> bool {
        if self.is_edge() {
            return false;
        }
        if entry.source.signature != self.source.signature {
            return false;
        }
        !(entry.fact_value.is_some() && self.facts.contains_key(&entry.fact_name))
    }

    fn absorb(&mut self, entry: EntryLine) -> Result<(), String> {
        if let Some(target) = entry.target {
            self.target = Some(target);
        }
        if let Some(kind) = entry.edge_kind {
            let stripped = kind.strip_prefix(EDGE_PREFIX).unwrap_or(&kind);
            self.edge_kind = Some(stripped.to_string());
        }
        if let Some(value) = entry.fact_value {
            let bytes = BASE64
                .decode(value.as_bytes())
                .map_err(|e| format!("bad base64 in {}: {e}", entry.fact_name))?;
            let decoded = String::from_utf8(bytes)
                .map_err(|e| format!("non-UTF-8 value in {}: {e}", entry.fact_name))?;
            self.facts.insert(entry.fact_name, decoded);
        }
        Ok(())
    }

    pub fn kind(&self) -> Option<&str> {
        self.facts.get(FACT_NODE_KIND).map(String::as_str)
    }

    /// A node is any record carrying a node-kind fact and a non-empty
    /// signature (file nodes use the empty signature).
    pub fn is_node(&self) -> bool {
        self.kind().is_some() && !self.source.signature.is_empty()
    }

    pub fn is_file(&self) -> bool {
        self.kind() == Some("file")
    }

    pub fn is_anchor(&self) -> bool {
        self.is_node() && self.kind() == Some("anchor")
    }

    pub fn is_symbol(&self) -> bool {
        self.is_node() && !self.is_anchor() && !self.is_file()
    }

    pub fn is_edge(&self) -> bool {
        self.target.is_some()
    }

    /// Kind string for a symbol node: `subkind` when present, else the
    /// node kind.
    pub fn symbol_kind(&self) -> Option<&str> {
        if !self.is_symbol() {
            return None;
        }
        self.facts
            .get(FACT_SUBKIND)
            .or_else(|| self.facts.get(FACT_NODE_KIND))
            .map(String::as_str)
    }

    pub fn loc_start(&self) -> Option<usize> {
        self.facts.get(FACT_LOC_START)?.parse().ok()
    }

    pub fn loc_end(&self) -> Option<usize> {
        self.facts.get(FACT_LOC_END)?.parse().ok()
    }

    /// File content carried by a file node.
    pub fn text(&self) -> Option<&str> {
        self.facts.get(FACT_TEXT).map(String::as_str)
    }
}

/// Lazy grouping iterator over a Kythe stream.
///
/// Yields one `KytheRecord` per logical node/edge; I/O errors surface
/// through the item type, decode errors are logged and counted in
/// `skipped_lines`.
pub struct RecordReader<R: BufRead> {
    lines: std::io::Lines<R>,
    current: Option<KytheRecord>,
    pub skipped_lines: u64,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            current: None,
            skipped_lines: 0,
        }
    }

    fn start_record(&mut self, entry: EntryLine) {
        match KytheRecord::new(entry) {
            Ok(record) => self.current = Some(record),
            Err(message) => {
                warn!("skipping undecodable entry: {message}");
                self.skipped_lines += 1;
            }
        }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = std::io::Result<KytheRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(err)) => return Some(Err(err)),
                None => return self.current.take().map(Ok),
            };

            if line.trim().is_empty() {
                continue;
            }

            let entry: EntryLine = match serde_json::from_str(&line) {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("skipping malformed stream line: {err}");
                    self.skipped_lines += 1;
                    continue;
                }
            };

            match self.current.as_mut() {
                Some(record) if record.can_append(&entry) => {
                    if let Err(message) = record.absorb(entry) {
                        warn!("skipping undecodable entry: {message}");
                        self.skipped_lines += 1;
                    }
                }
                Some(_) => {
                    let finished = self.current.take();
                    self.start_record(entry);
                    return finished.map(Ok);
                }
                None => self.start_record(entry),
            }
        }
    }
}
