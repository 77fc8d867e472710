use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::models::{BackendConfig, WorkspaceConfig};

/// Top-level CLI entrypoint for `svindex`.
#[derive(Parser, Debug)]
#[command(
    name = "svindex",
    about = "SystemVerilog cross-reference indexer and query tool",
    subcommand_required = false,
    arg_required_else_help = false
)]
pub struct Cli {
    /// Print the JSON schema version used for `--format=json` output
    /// and exit.
    #[arg(long = "schema-version")]
    pub schema_version: bool,

    /// Verbosity level. Add a v to increase, up to -vvv.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the index from a file list or a prebuilt extractor stream.
    Index(IndexArgs),
    /// Resolve the definition of the symbol at a position.
    Definition(PositionArgs),
    /// List references of the symbol at a position.
    References(ReferencesArgs),
    /// List dot-completion candidates at a position.
    Completion(PositionArgs),
    /// Rename the symbol at a position across files.
    Rename(RenameArgs),
    /// Run a long-lived HTTP+JSON daemon.
    Serve(ServeArgs),
}

/// Output formats supported by query commands.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Where the index content comes from.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// File list consumed by the extractor (plain newline-delimited or
    /// TOML with [libraries.lib] files).
    #[arg(long = "file-list")]
    pub file_list: Option<PathBuf>,

    /// Directory containing the Verible binaries; omitted resolves
    /// through PATH.
    #[arg(long = "install-path")]
    pub install_path: Option<PathBuf>,

    /// Pre-built extractor stream (Kythe JSON) to ingest.
    #[arg(long = "index-file")]
    pub index_file: Option<PathBuf>,

    /// Ingest --index-file directly, skipping the extractor.
    #[arg(long = "use-prebuilt-index")]
    pub use_prebuilt_index: bool,
}

impl SourceArgs {
    /// Convert to the workspace configuration. Passing only
    /// `--index-file` implies the prebuilt path.
    pub fn to_workspace_config(&self) -> WorkspaceConfig {
        let use_prebuilt_index =
            self.use_prebuilt_index || (self.index_file.is_some() && self.file_list.is_none());

        WorkspaceConfig {
            backend: BackendConfig {
                verible_install_path: self.install_path.clone().unwrap_or_default(),
            },
            index_file_path: self.index_file.clone().unwrap_or_default(),
            file_list_path: self.file_list.clone().unwrap_or_default(),
            use_prebuilt_index,
        }
    }
}

/// Arguments specific to the `index` subcommand.
#[derive(Args, Debug)]
pub struct IndexArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Dump the resulting store to this SQLite file for debugging.
    #[arg(long = "dump")]
    pub dump: Option<PathBuf>,

    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Delegate to a running daemon at this base URL.
    #[arg(long = "server")]
    pub server: Option<String>,

    /// Ignore any configured server and run locally.
    #[arg(long = "no-server")]
    pub no_server: bool,
}

/// Shared shape of position-keyed query subcommands.
#[derive(Args, Debug)]
pub struct PositionArgs {
    /// Source file path, exactly as it appears in the index.
    pub file: PathBuf,

    /// 0-based line of the position.
    #[arg(long = "line")]
    pub line: u32,

    /// 0-based byte column of the position.
    #[arg(long = "char")]
    pub character: u32,

    #[command(flatten)]
    pub source: SourceArgs,

    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Delegate to a running daemon at this base URL.
    #[arg(long = "server")]
    pub server: Option<String>,

    /// Ignore any configured server and run locally.
    #[arg(long = "no-server")]
    pub no_server: bool,
}

/// Arguments specific to the `references` subcommand.
#[derive(Args, Debug)]
pub struct ReferencesArgs {
    #[command(flatten)]
    pub position: PositionArgs,

    /// Include the declaration anchor in the result list.
    #[arg(long = "include-declaration")]
    pub include_declaration: bool,
}

/// Arguments specific to the `rename` subcommand.
#[derive(Args, Debug)]
pub struct RenameArgs {
    #[command(flatten)]
    pub position: PositionArgs,

    /// Replacement identifier.
    #[arg(long = "new-name")]
    pub new_name: String,
}

/// Arguments specific to the `serve` subcommand.
#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Socket address to bind (default 127.0.0.1:7878, or the
    /// configured [serve] addr).
    #[arg(long = "addr")]
    pub addr: Option<String>,
}
