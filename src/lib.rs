//! Core indexing engine for a SystemVerilog/Verilog language-server
//! backend.
//!
//! The crate ingests the Kythe-format cross-reference stream produced
//! by `verible-verilog-kythe-extractor`, normalizes it into a SQLite
//! symbol graph, and answers the queries editors ask: go-to-definition,
//! find-references, rename, and dot-triggered completion. The editor
//! protocol itself is out of scope; the daemon in [`server`] exposes
//! one thin JSON route per editor request instead.

pub mod cli;
pub mod diagnostics;
pub mod error;
pub mod indexer;
pub mod kythe;
pub mod models;
pub mod query;
pub mod server;
pub mod session;
pub mod store;
pub mod text;

pub use error::IndexingError;
pub use session::IndexSession;
pub use store::IndexStore;
