//! SQLite-backed index store.
//!
//! The store persists the symbol graph in five tables plus one view:
//!
//! - `files(id, path, content)`
//! - `anchors(id, file, start_line, start_char, stop_line, stop_char)`
//! - `symbols(id, name, kind, declaration_anchor)`
//! - `refs(id, anchor, symbol)`
//! - `relationships(parent, child)`
//! - `fully_qualified_symbols` — symbols joined with their declaration
//!   anchor and its file; the exclusive surface for queries that return
//!   a symbol together with a position.
//!
//! The schema is owned by the two scripts in `sql/`; `clear` runs the
//! delete script followed by the create script. Every write is a single
//! transaction. File-backed stores are opened with:
//!
//! - `journal_mode = WAL` for concurrent readers and a single writer.
//! - `synchronous = NORMAL` as a balance between safety and speed.
//! - `busy_timeout` to avoid transient `database is locked` errors.

mod models;

pub use models::{AnchorRow, FileRow, StoreCounts, StoreMeta, SymbolRow};

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};

use crate::error::{IndexingError, Result};
use crate::models::{TextPosition, TextRange};

const CREATE_SCRIPT: &str = include_str!("sql/create_index_db.sql");
const DELETE_SCRIPT: &str = include_str!("sql/delete_index_db.sql");

/// Logical schema version written to the `meta` table. Version "1" was
/// the 1-based-column era; such dumps are rejected and rebuilt.
pub const SCHEMA_VERSION: &str = "2";

#[derive(Debug)]
pub struct IndexStore {
    conn: Connection,
}

impl IndexStore {
    /// Open a transient in-memory store. This is the default for a
    /// language-server session; `dump` persists it on demand.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Self::from_connection(conn)
    }

    /// Open (or create) a file-backed store.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        let conn = Connection::open_with_flags(path, flags)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(Duration::from_millis(5000))?;

        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(CREATE_SCRIPT)?;
        let store = Self { conn };
        store.check_schema()?;
        Ok(store)
    }

    /// Reject stores written by the 1-based-column tooling: they carry
    /// data but either no `schema_version` or an older one. The
    /// migration path is a reindex.
    fn check_schema(&self) -> Result<()> {
        let version: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        match version {
            Some(v) if v == SCHEMA_VERSION => Ok(()),
            Some(found) => Err(IndexingError::SchemaVersion {
                found,
                expected: SCHEMA_VERSION.to_string(),
            }),
            None => {
                let file_count: i64 =
                    self.conn
                        .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
                if file_count > 0 {
                    return Err(IndexingError::SchemaVersion {
                        found: "1".to_string(),
                        expected: SCHEMA_VERSION.to_string(),
                    });
                }
                self.init_meta()
            }
        }
    }

    fn init_meta(&self) -> Result<()> {
        let now = current_epoch_seconds().to_string();
        let mut stmt = self
            .conn
            .prepare("INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)")?;
        for (key, value) in [
            ("schema_version", SCHEMA_VERSION),
            ("tool_version", env!("CARGO_PKG_VERSION")),
            ("created_at", now.as_str()),
            ("updated_at", now.as_str()),
        ] {
            stmt.execute(params![key, value])?;
        }
        Ok(())
    }

    pub fn meta(&self) -> Result<StoreMeta> {
        let mut stmt = self.conn.prepare("SELECT key, value FROM meta")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut meta = StoreMeta {
            schema_version: SCHEMA_VERSION.to_string(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: 0,
            updated_at: 0,
        };
        for row in rows {
            let (key, value) = row?;
            match key.as_str() {
                "schema_version" => meta.schema_version = value,
                "tool_version" => meta.tool_version = value,
                "created_at" => meta.created_at = value.parse().unwrap_or(0),
                "updated_at" => meta.updated_at = value.parse().unwrap_or(0),
                _ => {}
            }
        }
        Ok(meta)
    }

    /// Stamp `updated_at`; called once per completed ingest.
    pub fn touch_updated_at(&self) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('updated_at', ?1)",
            params![current_epoch_seconds().to_string()],
        )?;
        Ok(())
    }

    /// Drop and recreate all tables.
    pub fn clear(&self) -> Result<()> {
        self.conn.execute_batch(DELETE_SCRIPT)?;
        self.conn.execute_batch(CREATE_SCRIPT)?;
        self.init_meta()
    }

    /// Serialize the live store to `destination`, byte-exact, via the
    /// SQLite online backup API.
    pub fn dump(&self, destination: &Path) -> Result<()> {
        let mut target = Connection::open(destination)?;
        let backup = rusqlite::backup::Backup::new(&self.conn, &mut target)?;
        backup.run_to_completion(64, Duration::from_millis(100), None)?;
        Ok(())
    }

    // ---- files ----------------------------------------------------

    pub fn add_file(&self, path: &Path, content: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO files (path, content) VALUES (?1, ?2)",
            params![path_str(path), content],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_file_by_path(&self, path: &Path) -> Result<Option<FileRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, path, content FROM files WHERE path = ?1",
                params![path_str(path)],
                file_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn get_file_by_id(&self, id: i64) -> Result<Option<FileRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, path, content FROM files WHERE id = ?1",
                params![id],
                file_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn update_file_content(&self, path: &Path, content: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE files SET content = ?1 WHERE path = ?2",
            params![content, path_str(path)],
        )?;
        Ok(())
    }

    // ---- anchors --------------------------------------------------

    pub fn add_anchor(&self, file: i64, range: TextRange) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO anchors (file, start_line, start_char, stop_line, stop_char)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                file,
                range.start.line,
                range.start.character,
                range.end.line,
                range.end.character
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_anchor_by_id(&self, id: i64) -> Result<Option<AnchorRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, file, start_line, start_char, stop_line, stop_char
                 FROM anchors WHERE id = ?1",
                params![id],
                anchor_from_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Overwrite file and coordinate fields by id; used during rename.
    pub fn bulk_update_anchors(&self, anchors: &[AnchorRow]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE anchors
                 SET file = ?1, start_line = ?2, start_char = ?3, stop_line = ?4, stop_char = ?5
                 WHERE id = ?6",
            )?;
            for anchor in anchors {
                stmt.execute(params![
                    anchor.file,
                    anchor.range.start.line,
                    anchor.range.start.character,
                    anchor.range.end.line,
                    anchor.range.end.character,
                    anchor.id
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// All anchors in `file` whose range contains `position`
    /// (lexicographic containment, end-inclusive). Callers pick the
    /// narrowest result.
    pub fn get_anchor_by_position(&self, file: i64, position: TextPosition) -> Result<Vec<AnchorRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, file, start_line, start_char, stop_line, stop_char
             FROM anchors
             WHERE file = ?1
               AND (start_line < ?2 OR (start_line = ?2 AND start_char <= ?3))
               AND (stop_line > ?2 OR (stop_line = ?2 AND stop_char >= ?3))",
        )?;
        let rows = stmt.query_map(
            params![file, position.line, position.character],
            anchor_from_row,
        )?;
        collect_rows(rows)
    }

    // ---- symbols --------------------------------------------------

    pub fn add_symbol(
        &self,
        name: &str,
        kind: &str,
        declaration_anchor: Option<i64>,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO symbols (name, kind, declaration_anchor) VALUES (?1, ?2, ?3)",
            params![name, kind, declaration_anchor],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn update_symbol_name(&self, id: i64, new_name: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE symbols SET name = ?1 WHERE id = ?2",
            params![new_name, id],
        )?;
        Ok(())
    }

    pub fn update_symbol_anchor(&self, id: i64, anchor_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE symbols SET declaration_anchor = ?1 WHERE id = ?2",
            params![anchor_id, id],
        )?;
        Ok(())
    }

    pub fn get_symbol_by_id(&self, id: i64) -> Result<Option<SymbolRow>> {
        let row = self
            .conn
            .query_row(
                &format!("{VIEW_SELECT} WHERE sid = ?1"),
                params![id],
                symbol_from_view_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Exact-name lookup through the joined view.
    pub fn get_symbols_by_name(&self, name: &str) -> Result<Vec<SymbolRow>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{VIEW_SELECT} WHERE name = ?1"))?;
        let rows = stmt.query_map(params![name], symbol_from_view_row)?;
        collect_rows(rows)
    }

    /// Direct children only; containment is not transitive here.
    pub fn get_symbol_children(&self, parent: i64) -> Result<Vec<SymbolRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "{VIEW_SELECT}
             INNER JOIN relationships ON relationships.child = sid
             WHERE relationships.parent = ?1"
        ))?;
        let rows = stmt.query_map(params![parent], symbol_from_view_row)?;
        collect_rows(rows)
    }

    /// Use-site anchors of a symbol. The declaration anchor is not a
    /// ref row and is therefore excluded.
    pub fn get_symbol_references(&self, symbol: i64) -> Result<Vec<AnchorRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT anchors.id, anchors.file, anchors.start_line, anchors.start_char,
                    anchors.stop_line, anchors.stop_char
             FROM refs
             INNER JOIN anchors ON anchors.id = refs.anchor
             WHERE refs.symbol = ?1
             ORDER BY anchors.file, anchors.start_line, anchors.start_char",
        )?;
        let rows = stmt.query_map(params![symbol], anchor_from_row)?;
        collect_rows(rows)
    }

    /// Resolve the symbol an anchor stands for: first as a declaration
    /// anchor, else through the refs table.
    pub fn get_definition_by_anchor(&self, anchor: i64) -> Result<Option<SymbolRow>> {
        let declared = self
            .conn
            .query_row(
                &format!("{VIEW_SELECT} WHERE aid = ?1"),
                params![anchor],
                symbol_from_view_row,
            )
            .optional()?;
        if declared.is_some() {
            return Ok(declared);
        }

        let referenced = self
            .conn
            .query_row(
                &format!(
                    "{VIEW_SELECT}
                     INNER JOIN refs ON refs.symbol = sid
                     WHERE refs.anchor = ?1"
                ),
                params![anchor],
                symbol_from_view_row,
            )
            .optional()?;
        Ok(referenced)
    }

    // ---- links ----------------------------------------------------

    pub fn add_ref(&self, anchor: i64, symbol: i64) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO refs (anchor, symbol) VALUES (?1, ?2)",
            params![anchor, symbol],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn add_symbol_relationship(&self, parent: i64, child: i64) -> Result<()> {
        self.conn.execute(
            "INSERT INTO relationships (parent, child) VALUES (?1, ?2)",
            params![parent, child],
        )?;
        Ok(())
    }

    // ---- aggregates -----------------------------------------------

    pub fn counts(&self) -> Result<StoreCounts> {
        let count = |table: &str| -> Result<u64> {
            let n: i64 =
                self.conn
                    .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                        row.get(0)
                    })?;
            Ok(n as u64)
        };

        Ok(StoreCounts {
            files: count("files")?,
            anchors: count("anchors")?,
            symbols: count("symbols")?,
            refs: count("refs")?,
            relationships: count("relationships")?,
        })
    }
}

const VIEW_SELECT: &str = "SELECT sid, name, kind, aid, file, start_line, start_char, \
                           stop_line, stop_char, path FROM fully_qualified_symbols";

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileRow> {
    Ok(FileRow {
        id: row.get(0)?,
        path: PathBuf::from(row.get::<_, String>(1)?),
        content: row.get(2)?,
    })
}

fn anchor_from_row(row: &Row<'_>) -> rusqlite::Result<AnchorRow> {
    Ok(AnchorRow::new(
        row.get(0)?,
        row.get(1)?,
        TextRange::new(
            TextPosition::new(row.get(2)?, row.get(3)?),
            TextPosition::new(row.get(4)?, row.get(5)?),
        ),
    ))
}

fn symbol_from_view_row(row: &Row<'_>) -> rusqlite::Result<SymbolRow> {
    Ok(SymbolRow {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: row.get(2)?,
        declaration: AnchorRow::new(
            row.get(3)?,
            row.get(4)?,
            TextRange::new(
                TextPosition::new(row.get(5)?, row.get(6)?),
                TextPosition::new(row.get(7)?, row.get(8)?),
            ),
        ),
        path: PathBuf::from(row.get::<_, String>(9)?),
    })
}

fn collect_rows<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn current_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
