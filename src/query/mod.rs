//! Read-only query layer over the store, plus the rename write path.
//!
//! Editor positions arrive 0-based on both axes and stay that way; the
//! store uses the same convention, so nothing is adjusted here. The one
//! piece of policy this layer owns is anchor selection: when several
//! anchors cover a position, the narrowest one wins (the "most specific
//! token" rule).

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{IndexingError, Result};
use crate::models::{RenamePlan, SrcLocation, TextEdit, TextPosition, TextRange};
use crate::store::{AnchorRow, IndexStore, SymbolRow};
use crate::text;

pub struct QueryEngine<'a> {
    store: &'a IndexStore,
    cancel: CancellationToken,
}

impl<'a> QueryEngine<'a> {
    pub fn new(store: &'a IndexStore) -> Self {
        Self {
            store,
            cancel: CancellationToken::new(),
        }
    }

    /// Observe an external cancellation token during multi-file writes.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Resolve the symbol under a position: narrowest covering anchor,
    /// then declaration-or-reference lookup through the store.
    pub fn symbol_at(&self, path: &Path, position: TextPosition) -> Result<Option<SymbolRow>> {
        let Some(file) = self.store.get_file_by_path(path)? else {
            debug!(path = %path.display(), "query on unknown file");
            return Ok(None);
        };

        let anchors = self.store.get_anchor_by_position(file.id, position)?;
        let Some(anchor) = anchors.iter().min_by_key(|a| a.range.extent()) else {
            return Ok(None);
        };

        self.store.get_definition_by_anchor(anchor.id)
    }

    /// Go-to-definition: the declaration anchor of the symbol under the
    /// position.
    pub fn definition_at(
        &self,
        path: &Path,
        position: TextPosition,
    ) -> Result<Option<SrcLocation>> {
        let Some(symbol) = self.symbol_at(path, position)? else {
            return Ok(None);
        };
        Ok(Some(symbol.info().location))
    }

    /// Find-references: all use sites of the symbol under the position.
    /// With `include_declaration` the declaration anchor leads the list.
    pub fn references_at(
        &self,
        path: &Path,
        position: TextPosition,
        include_declaration: bool,
    ) -> Result<Vec<SrcLocation>> {
        let Some(symbol) = self.symbol_at(path, position)? else {
            return Ok(Vec::new());
        };

        let mut anchors = Vec::new();
        if include_declaration {
            anchors.push(symbol.declaration);
        }
        anchors.extend(self.store.get_symbol_references(symbol.id)?);

        let mut paths: HashMap<i64, PathBuf> = HashMap::new();
        let mut locations = Vec::with_capacity(anchors.len());
        for anchor in anchors {
            let file_path = match paths.get(&anchor.file) {
                Some(p) => p.clone(),
                None => {
                    let Some(file) = self.store.get_file_by_id(anchor.file)? else {
                        continue;
                    };
                    paths.insert(anchor.file, file.path.clone());
                    file.path
                }
            };
            locations.push(SrcLocation {
                path: file_path,
                range: anchor.range,
            });
        }
        Ok(locations)
    }

    /// Prepare-rename: the declaration anchor range of the symbol under
    /// the position, or `None` to reject the rename.
    pub fn prepare_rename(&self, path: &Path, position: TextPosition) -> Result<Option<TextRange>> {
        let Some(symbol) = self.symbol_at(path, position)? else {
            return Ok(None);
        };
        Ok(Some(symbol.declaration.range))
    }

    /// Rename the symbol under the position to `new_name`.
    ///
    /// Returns the per-file edit plan, and updates the store so that it
    /// matches the post-edit world: file contents are rewritten, the
    /// symbol row is renamed, and every touched anchor is shifted by
    /// its ordinal on its line (`i*Δ` for the start, `(i+1)*Δ` for the
    /// end, `Δ` the length difference).
    pub fn rename(
        &self,
        path: &Path,
        position: TextPosition,
        new_name: &str,
    ) -> Result<Option<RenamePlan>> {
        if !text::is_valid_identifier(new_name) {
            debug!(new_name, "rename rejected: not a valid identifier");
            return Ok(None);
        }

        let Some(symbol) = self.symbol_at(path, position)? else {
            return Ok(None);
        };

        let delta = new_name.len() as i64 - symbol.name.len() as i64;

        // Declaration plus every use site, deduplicated (the extractor
        // may emit a ref edge on the declaration anchor as well).
        let mut anchors = vec![symbol.declaration];
        for anchor in self.store.get_symbol_references(symbol.id)? {
            if anchors.iter().all(|a| a.id != anchor.id) {
                anchors.push(anchor);
            }
        }

        let mut by_file: BTreeMap<i64, Vec<AnchorRow>> = BTreeMap::new();
        for anchor in anchors {
            by_file.entry(anchor.file).or_default().push(anchor);
        }

        let mut plan = RenamePlan::default();
        let mut relocated: Vec<AnchorRow> = Vec::new();

        for (file_id, mut file_anchors) in by_file {
            // Cooperative cancellation between per-file phases. Nothing
            // is rolled back; the next reindex repairs a partial rename.
            if self.cancel.is_cancelled() {
                return Err(IndexingError::Cancelled);
            }
            let Some(file) = self.store.get_file_by_id(file_id)? else {
                continue;
            };

            file_anchors.sort_by_key(|a| (a.range.start.line, a.range.start.character));
            let edits: Vec<TextEdit> = file_anchors
                .iter()
                .map(|anchor| TextEdit {
                    range: anchor.range,
                    new_text: new_name.to_string(),
                })
                .collect();

            let new_content = text::apply_edits(&file.content, &edits);
            self.store.update_file_content(&file.path, &new_content)?;

            relocated.extend(shift_anchors(&file_anchors, delta));
            plan.edits.insert(file.path, edits);
        }

        self.store.update_symbol_name(symbol.id, new_name)?;
        self.store.bulk_update_anchors(&relocated)?;

        Ok(Some(plan))
    }

    /// Dot-triggered completion: children of the symbol(s) named by the
    /// identifier before the dot, filtered by the typed prefix.
    pub fn completion_at(&self, path: &Path, position: TextPosition) -> Result<Vec<String>> {
        let Some(file) = self.store.get_file_by_path(path)? else {
            return Ok(Vec::new());
        };

        let Some(offset) = text::offset_of(&file.content, position) else {
            return Ok(Vec::new());
        };

        let content = file.content.as_str();
        let word_start = text::word_start(content, offset);
        let prefix = &content[word_start..offset];

        // Completion only fires on member access: the character before
        // the current word must be a dot.
        if word_start == 0 || content.as_bytes()[word_start - 1] != b'.' {
            return Ok(Vec::new());
        }

        let parent_end = word_start - 1;
        let parent_start = text::word_start(content, parent_end);
        let parent = &content[parent_start..parent_end];
        if parent.is_empty() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for parent_symbol in self.store.get_symbols_by_name(parent)? {
            for child in self.store.get_symbol_children(parent_symbol.id)? {
                if child.name.starts_with(prefix) {
                    names.push(child.name);
                }
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }
}

/// Relocate renamed anchors: on each line, the anchor at ordinal `i`
/// (by start column) starts `i*Δ` later and ends `(i+1)*Δ` later, which
/// is exactly where the tokens land after the edits are applied.
fn shift_anchors(file_anchors: &[AnchorRow], delta: i64) -> Vec<AnchorRow> {
    let mut by_line: BTreeMap<u32, Vec<AnchorRow>> = BTreeMap::new();
    for anchor in file_anchors {
        by_line.entry(anchor.range.start.line).or_default().push(*anchor);
    }

    let mut shifted = Vec::with_capacity(file_anchors.len());
    for (_line, mut line_anchors) in by_line {
        line_anchors.sort_by_key(|a| a.range.start.character);
        for (i, mut anchor) in line_anchors.into_iter().enumerate() {
            let start_shift = i as i64 * delta;
            let end_shift = (i as i64 + 1) * delta;
            anchor.range.start.character = shift_column(anchor.range.start.character, start_shift);
            if anchor.range.end.line == anchor.range.start.line {
                anchor.range.end.character = shift_column(anchor.range.end.character, end_shift);
            }
            shifted.push(anchor);
        }
    }
    shifted
}

fn shift_column(column: u32, delta: i64) -> u32 {
    (column as i64 + delta).max(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::IndexStore;

    const MODULE_SV: &str = "module m; wire a; assign a = a; endmodule\n";

    fn range(start: (u32, u32), end: (u32, u32)) -> TextRange {
        TextRange::new(
            TextPosition::new(start.0, start.1),
            TextPosition::new(end.0, end.1),
        )
    }

    /// Store seeded with `module m; wire a; assign a = a; endmodule`:
    /// declaration of `a` at 15..16, uses at 25..26 and 29..30.
    fn seeded_store() -> IndexStore {
        let store = IndexStore::open_in_memory().expect("store");
        let file = store.add_file(Path::new("/rtl/m.sv"), MODULE_SV).expect("file");

        let module_anchor = store.add_anchor(file, range((0, 7), (0, 8))).expect("anchor");
        store
            .add_symbol("m", "module", Some(module_anchor))
            .expect("symbol");

        let decl = store.add_anchor(file, range((0, 15), (0, 16))).expect("anchor");
        let symbol = store.add_symbol("a", "wire", Some(decl)).expect("symbol");

        for (start, end) in [((0, 25), (0, 26)), ((0, 29), (0, 30))] {
            let anchor = store.add_anchor(file, range(start, end)).expect("anchor");
            store.add_ref(anchor, symbol).expect("ref");
        }
        store
    }

    #[test]
    fn definition_at_a_use_site_resolves_to_the_declaration() {
        let store = seeded_store();
        let query = QueryEngine::new(&store);

        let location = query
            .definition_at(Path::new("/rtl/m.sv"), TextPosition::new(0, 29))
            .expect("query")
            .expect("location");

        assert_eq!(location.path, PathBuf::from("/rtl/m.sv"));
        assert_eq!(location.range, range((0, 15), (0, 16)));
    }

    #[test]
    fn definition_at_the_declaration_resolves_to_itself() {
        let store = seeded_store();
        let query = QueryEngine::new(&store);

        let location = query
            .definition_at(Path::new("/rtl/m.sv"), TextPosition::new(0, 15))
            .expect("query")
            .expect("location");
        assert_eq!(location.range, range((0, 15), (0, 16)));
    }

    #[test]
    fn definition_between_tokens_is_none() {
        let store = seeded_store();
        let query = QueryEngine::new(&store);

        assert!(query
            .definition_at(Path::new("/rtl/m.sv"), TextPosition::new(0, 20))
            .expect("query")
            .is_none());
    }

    #[test]
    fn references_count_declaration_and_both_uses() {
        let store = seeded_store();
        let query = QueryEngine::new(&store);

        let locations = query
            .references_at(Path::new("/rtl/m.sv"), TextPosition::new(0, 15), true)
            .expect("query");
        assert_eq!(locations.len(), 3);
        assert_eq!(locations[0].range, range((0, 15), (0, 16)));
        assert_eq!(locations[1].range, range((0, 25), (0, 26)));
        assert_eq!(locations[2].range, range((0, 29), (0, 30)));

        let without_decl = query
            .references_at(Path::new("/rtl/m.sv"), TextPosition::new(0, 15), false)
            .expect("query");
        assert_eq!(without_decl.len(), 2);
    }

    #[test]
    fn narrowest_anchor_wins_when_ranges_nest() {
        let store = seeded_store();
        let file = store
            .get_file_by_path(Path::new("/rtl/m.sv"))
            .expect("query")
            .expect("file");

        // A wide anchor covering the whole assign statement, bound to
        // the module symbol; the narrow `a` anchors must still win.
        let wide = store.add_anchor(file.id, range((0, 18), (0, 31))).expect("anchor");
        let module = &store.get_symbols_by_name("m").expect("query")[0];
        store.add_ref(wide, module.id).expect("ref");

        let query = QueryEngine::new(&store);
        let location = query
            .definition_at(Path::new("/rtl/m.sv"), TextPosition::new(0, 25))
            .expect("query")
            .expect("location");
        assert_eq!(location.range, range((0, 15), (0, 16)));
    }

    #[test]
    fn prepare_rename_returns_the_declaration_range() {
        let store = seeded_store();
        let query = QueryEngine::new(&store);

        let range_at_decl = query
            .prepare_rename(Path::new("/rtl/m.sv"), TextPosition::new(0, 15))
            .expect("query")
            .expect("range");
        assert_eq!(range_at_decl, range((0, 15), (0, 16)));

        assert!(query
            .prepare_rename(Path::new("/rtl/m.sv"), TextPosition::new(0, 20))
            .expect("query")
            .is_none());
    }

    #[test]
    fn rename_rejects_invalid_identifiers() {
        let store = seeded_store();
        let query = QueryEngine::new(&store);

        for bad in ["2foo", "", "foo bar", "$display"] {
            assert!(query
                .rename(Path::new("/rtl/m.sv"), TextPosition::new(0, 15), bad)
                .expect("query")
                .is_none());
        }

        // No state change happened.
        let symbols = store.get_symbols_by_name("a").expect("query");
        assert_eq!(symbols.len(), 1);
    }

    #[test]
    fn rename_produces_a_plan_and_relocates_anchors() {
        let store = seeded_store();
        let query = QueryEngine::new(&store);

        let plan = query
            .rename(Path::new("/rtl/m.sv"), TextPosition::new(0, 15), "foo")
            .expect("query")
            .expect("plan");
        assert_eq!(plan.edit_count(), 3);

        // Stored content matches the applied plan.
        let file = store
            .get_file_by_path(Path::new("/rtl/m.sv"))
            .expect("query")
            .expect("file");
        assert_eq!(file.content, "module m; wire foo; assign foo = foo; endmodule\n");

        // The symbol is renamed and every anchor covers the new token:
        // ordinal 0 keeps its start, ordinal 1 shifts by Δ, ordinal 2
        // by 2Δ, with Δ = 2.
        let symbols = store.get_symbols_by_name("foo").expect("query");
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].declaration.range, range((0, 15), (0, 18)));

        let refs = store.get_symbol_references(symbols[0].id).expect("refs");
        assert_eq!(refs[0].range, range((0, 27), (0, 30)));
        assert_eq!(refs[1].range, range((0, 33), (0, 36)));

        // Law: each relocated anchor's text equals the new name.
        for anchor_range in [
            symbols[0].declaration.range,
            refs[0].range,
            refs[1].range,
        ] {
            assert_eq!(text::slice_range(&file.content, anchor_range), Some("foo"));
        }
    }

    #[test]
    fn rename_at_a_use_site_renames_the_whole_symbol() {
        let store = seeded_store();
        let query = QueryEngine::new(&store);

        let plan = query
            .rename(Path::new("/rtl/m.sv"), TextPosition::new(0, 29), "q")
            .expect("query")
            .expect("plan");
        assert_eq!(plan.edit_count(), 3);

        let file = store
            .get_file_by_path(Path::new("/rtl/m.sv"))
            .expect("query")
            .expect("file");
        assert_eq!(file.content, "module m; wire q; assign q = q; endmodule\n");
    }

    #[test]
    fn completion_lists_children_after_a_dot() {
        let store = IndexStore::open_in_memory().expect("store");
        let content = "s_t v;\nassign q = v.x;\n";
        let file = store.add_file(Path::new("/rtl/s.sv"), content).expect("file");

        let mk = |name: &str, start: (u32, u32), end: (u32, u32)| {
            let anchor = store.add_anchor(file, range(start, end)).expect("anchor");
            store.add_symbol(name, "variable", Some(anchor)).expect("symbol")
        };
        let v = mk("v", (0, 4), (0, 5));
        let x = mk("x", (1, 13), (1, 14));
        let y = mk("y", (0, 0), (0, 3));
        store.add_symbol_relationship(v, x).expect("rel");
        store.add_symbol_relationship(v, y).expect("rel");

        let query = QueryEngine::new(&store);

        // Cursor right after "v." — both children, sorted.
        let names = query
            .completion_at(Path::new("/rtl/s.sv"), TextPosition::new(1, 13))
            .expect("query");
        assert_eq!(names, vec!["x".to_string(), "y".to_string()]);

        // Cursor after "v.x" — prefix filter keeps only x.
        let names = query
            .completion_at(Path::new("/rtl/s.sv"), TextPosition::new(1, 14))
            .expect("query");
        assert_eq!(names, vec!["x".to_string()]);
    }

    #[test]
    fn completion_without_a_dot_is_empty() {
        let store = seeded_store();
        let query = QueryEngine::new(&store);

        let names = query
            .completion_at(Path::new("/rtl/m.sv"), TextPosition::new(0, 16))
            .expect("query");
        assert!(names.is_empty());
    }
}
